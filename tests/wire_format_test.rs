use senax_msgpack::{
    pack, unpack, CompatibilityMode, EncodingError, Error, LengthClass, Packer, WireValue,
};

fn modern(f: impl FnOnce(&mut Packer) -> senax_msgpack::Result<usize>) -> Vec<u8> {
    let mut packer = Packer::new();
    let written = f(&mut packer).unwrap();
    assert_eq!(written, packer.len());
    packer.as_slice().to_vec()
}

fn classic(f: impl FnOnce(&mut Packer) -> senax_msgpack::Result<usize>) -> Vec<u8> {
    let mut packer = Packer::with_mode(CompatibilityMode::Classic);
    f(&mut packer).unwrap();
    packer.as_slice().to_vec()
}

// =============================================================================
// Integers
// =============================================================================

#[test]
fn test_unsigned_boundaries_use_smallest_header() {
    let cases: Vec<(u64, Vec<u8>)> = vec![
        (0, vec![0x00]),
        (127, vec![0x7f]),
        (128, vec![0xcc, 0x80]),
        (255, vec![0xcc, 0xff]),
        (256, vec![0xcd, 0x01, 0x00]),
        (65535, vec![0xcd, 0xff, 0xff]),
        (65536, vec![0xce, 0x00, 0x01, 0x00, 0x00]),
        (u32::MAX as u64, vec![0xce, 0xff, 0xff, 0xff, 0xff]),
        (
            u32::MAX as u64 + 1,
            vec![0xcf, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00],
        ),
        (
            u64::MAX,
            vec![0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        ),
    ];
    for (value, expected) in cases {
        let bytes = modern(|p| p.pack_u64(value));
        assert_eq!(bytes, expected, "packing {}", value);
        assert_eq!(unpack(&bytes).unwrap(), WireValue::UInt(value));
    }
}

#[test]
fn test_signed_boundaries_use_smallest_header() {
    let cases: Vec<(i64, Vec<u8>)> = vec![
        (-1, vec![0xff]),
        (-32, vec![0xe0]),
        (-33, vec![0xd0, 0xdf]),
        (-128, vec![0xd0, 0x80]),
        (-129, vec![0xd1, 0xff, 0x7f]),
        (-32768, vec![0xd1, 0x80, 0x00]),
        (-32769, vec![0xd2, 0xff, 0xff, 0x7f, 0xff]),
        (i32::MIN as i64, vec![0xd2, 0x80, 0x00, 0x00, 0x00]),
        (
            i32::MIN as i64 - 1,
            vec![0xd3, 0xff, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff],
        ),
        (
            i64::MIN,
            vec![0xd3, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        ),
    ];
    for (value, expected) in cases {
        let bytes = modern(|p| p.pack_i64(value));
        assert_eq!(bytes, expected, "packing {}", value);
        assert_eq!(unpack(&bytes).unwrap(), WireValue::Int(value));
    }
}

#[test]
fn test_non_negative_signed_values_use_unsigned_tags() {
    assert_eq!(modern(|p| p.pack_i64(5)), vec![0x05]);
    assert_eq!(modern(|p| p.pack_i64(200)), vec![0xcc, 0xc8]);
    assert_eq!(modern(|p| p.pack_i64(i64::MAX)), {
        let mut v = vec![0xcf];
        v.extend_from_slice(&i64::MAX.to_be_bytes());
        v
    });
}

#[test]
fn test_classic_mode_uses_signed_tags() {
    assert_eq!(classic(|p| p.pack_u64(127)), vec![0x7f]);
    assert_eq!(classic(|p| p.pack_u64(128)), vec![0xd1, 0x00, 0x80]);
    assert_eq!(classic(|p| p.pack_u64(200)), vec![0xd1, 0x00, 0xc8]);
    assert_eq!(
        classic(|p| p.pack_u64(65535)),
        vec![0xd2, 0x00, 0x00, 0xff, 0xff]
    );
    assert_eq!(
        classic(|p| p.pack_i64(i64::MAX)),
        vec![0xd3, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    );
    // Only values beyond i64::MAX need the unsigned tag.
    assert_eq!(
        classic(|p| p.pack_u64(u64::MAX)),
        vec![0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    );
    assert_eq!(unpack(&classic(|p| p.pack_u64(200))).unwrap(), WireValue::UInt(200));
}

// =============================================================================
// Floats, nil, bool
// =============================================================================

#[test]
fn test_float_and_simple_values() {
    assert_eq!(modern(|p| p.pack_nil()), vec![0xc0]);
    assert_eq!(modern(|p| p.pack_bool(false)), vec![0xc2]);
    assert_eq!(modern(|p| p.pack_bool(true)), vec![0xc3]);
    assert_eq!(
        modern(|p| p.pack_f32(1.5)),
        vec![0xca, 0x3f, 0xc0, 0x00, 0x00]
    );
    assert_eq!(
        modern(|p| p.pack_f64(-2.0)),
        vec![0xcb, 0xc0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    assert_eq!(
        unpack(&[0xca, 0x3f, 0xc0, 0x00, 0x00]).unwrap(),
        WireValue::Float32(1.5)
    );
}

// =============================================================================
// Strings and binary
// =============================================================================

fn header_of(bytes: &[u8], payload_len: usize) -> &[u8] {
    &bytes[..bytes.len() - payload_len]
}

#[test]
fn test_string_boundaries() {
    let cases: Vec<(usize, Vec<u8>)> = vec![
        (0, vec![0xa0]),
        (31, vec![0xbf]),
        (32, vec![0xd9, 0x20]),
        (255, vec![0xd9, 0xff]),
        (256, vec![0xda, 0x01, 0x00]),
        (65535, vec![0xda, 0xff, 0xff]),
        (65536, vec![0xdb, 0x00, 0x01, 0x00, 0x00]),
    ];
    for (len, expected) in cases {
        let text = "x".repeat(len);
        let bytes = modern(|p| p.pack_str(&text));
        assert_eq!(header_of(&bytes, len), &expected[..], "str of {} bytes", len);
        let decoded = unpack(&bytes).unwrap();
        assert_eq!(decoded.as_str(), Some(text.as_str()));
    }
}

#[test]
fn test_binary_boundaries() {
    let cases: Vec<(usize, Vec<u8>)> = vec![
        (0, vec![0xc4, 0x00]),
        (255, vec![0xc4, 0xff]),
        (256, vec![0xc5, 0x01, 0x00]),
        (65535, vec![0xc5, 0xff, 0xff]),
        (65536, vec![0xc6, 0x00, 0x01, 0x00, 0x00]),
    ];
    for (len, expected) in cases {
        let data = vec![0x5a; len];
        let bytes = modern(|p| p.pack_bin(&data));
        assert_eq!(header_of(&bytes, len), &expected[..], "bin of {} bytes", len);
        assert_eq!(unpack(&bytes).unwrap().as_raw(), Some(&data[..]));
    }
}

#[test]
fn test_classic_mode_writes_raw_family() {
    // No str8 in the classic grammar: 32 bytes jump straight to raw16.
    let text = "y".repeat(32);
    let bytes = classic(|p| p.pack_str(&text));
    assert_eq!(header_of(&bytes, 32), &[0xda, 0x00, 0x20]);

    // Binary travels as raw, and still compares equal to the binary it came from.
    let bytes = classic(|p| p.pack_bin(b"abc"));
    assert_eq!(bytes, vec![0xa3, b'a', b'b', b'c']);
    let decoded = unpack(&bytes).unwrap();
    assert!(matches!(decoded, WireValue::Str(_)));
    assert_eq!(decoded, WireValue::Bin(bytes::Bytes::from_static(b"abc")));
}

#[test]
fn test_forced_length_classes() {
    assert_eq!(
        modern(|p| p.pack_str_with_class(b"hi", LengthClass::Bits16)),
        vec![0xda, 0x00, 0x02, b'h', b'i']
    );
    assert_eq!(
        modern(|p| p.pack_bin_with_class(b"hi", LengthClass::Bits32)),
        vec![0xc6, 0x00, 0x00, 0x00, 0x02, b'h', b'i']
    );
    assert_eq!(
        modern(|p| p.pack_array_header_with_class(3, LengthClass::Bits32)),
        vec![0xdd, 0x00, 0x00, 0x00, 0x03]
    );
    assert_eq!(
        modern(|p| p.pack_map_header_with_class(0, LengthClass::Bits16)),
        vec![0xde, 0x00, 0x00]
    );
}

#[test]
fn test_forced_class_too_small_is_reserved_length() {
    let mut packer = Packer::new();
    let err = packer
        .pack_str_with_class(&[b'z'; 32], LengthClass::Fix)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::ReservedLength {
            required: 32,
            available: 31
        })
    ));

    let err = packer
        .pack_array_header_with_class(16, LengthClass::Fix)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::ReservedLength {
            required: 16,
            available: 15
        })
    ));

    let err = packer
        .pack_str_with_class(&vec![0u8; 256], LengthClass::Bits8)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::ReservedLength { required: 256, .. })
    ));

    let err = packer
        .pack_ext_with_class(1, &[0u8; 256], LengthClass::Bits8)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::ReservedLength {
            required: 256,
            available: 255
        })
    ));
    // Failed writes leave nothing behind.
    assert!(packer.is_empty());
}

#[test]
fn test_forced_ext_classes() {
    // A 4-byte payload fits fixext4 but the forced class wins.
    assert_eq!(
        modern(|p| p.pack_ext_with_class(7, &[1, 2, 3, 4], LengthClass::Bits8)),
        vec![0xc7, 0x04, 0x07, 1, 2, 3, 4]
    );
    assert_eq!(
        modern(|p| p.pack_ext_with_class(-2, &[9], LengthClass::Bits16)),
        vec![0xc8, 0x00, 0x01, 0xfe, 9]
    );
    assert_eq!(
        modern(|p| p.pack_ext_with_class(0, &[], LengthClass::Bits32)),
        vec![0xc9, 0x00, 0x00, 0x00, 0x00, 0x00]
    );
    let bytes = modern(|p| p.pack_ext_with_class(7, &[1, 2, 3, 4], LengthClass::Bits8));
    assert_eq!(
        unpack(&bytes).unwrap(),
        unpack(&modern(|p| p.pack_ext(7, &[1, 2, 3, 4]))).unwrap()
    );
}

#[test]
fn test_classes_missing_from_the_grammar_are_incompatible() {
    let mut packer = Packer::new();
    let err = packer
        .pack_array_header_with_class(1, LengthClass::Bits8)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::IncompatibleEncoding { .. })
    ));

    let mut packer = Packer::with_mode(CompatibilityMode::Classic);
    let err = packer
        .pack_str_with_class(b"a", LengthClass::Bits8)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::IncompatibleEncoding {
            mode: CompatibilityMode::Classic,
            ..
        })
    ));
    assert!(packer.pack_bin_with_class(b"a", LengthClass::Bits8).is_err());
    assert!(packer.pack_ext(5, &[1, 2]).is_err());
    assert!(packer
        .pack_ext_with_class(5, &[1, 2], LengthClass::Bits8)
        .is_err());
}

#[test]
fn test_fix_class_for_bin_and_ext_is_incompatible() {
    let mut packer = Packer::new();
    let err = packer.pack_bin_with_class(b"ab", LengthClass::Fix).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::IncompatibleEncoding {
            what: "fix bin header",
            mode: CompatibilityMode::Modern
        })
    ));

    let err = packer
        .pack_ext_with_class(1, &[1, 2], LengthClass::Fix)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::IncompatibleEncoding {
            what: "fix ext header",
            ..
        })
    ));
    assert!(packer.is_empty());
}

// =============================================================================
// Collections
// =============================================================================

#[test]
fn test_array_boundaries() {
    for (len, expected) in [
        (0usize, vec![0x90]),
        (15, vec![0x9f]),
        (16, vec![0xdc, 0x00, 0x10]),
        (65535, vec![0xdc, 0xff, 0xff]),
        (65536, vec![0xdd, 0x00, 0x01, 0x00, 0x00]),
    ] {
        let value = WireValue::Array(vec![WireValue::Nil; len]);
        let bytes = pack(&value).unwrap();
        assert_eq!(header_of(&bytes, len), &expected[..], "array of {}", len);
        assert_eq!(unpack(&bytes).unwrap(), value);
    }
}

#[test]
fn test_map_boundaries() {
    for (len, expected) in [
        (0usize, vec![0x80]),
        (15, vec![0x8f]),
        (16, vec![0xde, 0x00, 0x10]),
        (65535, vec![0xde, 0xff, 0xff]),
        (65536, vec![0xdf, 0x00, 0x01, 0x00, 0x00]),
    ] {
        let value = WireValue::Map(
            (0..len)
                .map(|i| (WireValue::from(i as u64), WireValue::Nil))
                .collect(),
        );
        let bytes = pack(&value).unwrap();
        let header_len = expected.len();
        assert_eq!(&bytes[..header_len], &expected[..], "map of {}", len);
        assert_eq!(unpack(&bytes).unwrap(), value);
    }
}

#[test]
fn test_nested_value_layout() {
    let value = WireValue::Map(vec![
        (
            WireValue::from("a"),
            WireValue::Array(vec![WireValue::from(1u8), WireValue::Nil]),
        ),
        (WireValue::from("b"), WireValue::Bool(true)),
    ]);
    let bytes = pack(&value).unwrap();
    assert_eq!(
        &bytes[..],
        &[0x82, 0xa1, b'a', 0x92, 0x01, 0xc0, 0xa1, b'b', 0xc3]
    );
    assert_eq!(unpack(&bytes).unwrap(), value);
}

#[test]
fn test_deep_value_packs_without_recursion() {
    let mut value = WireValue::Nil;
    for _ in 0..5_000 {
        value = WireValue::Array(vec![value]);
    }
    let bytes = pack(&value).unwrap();
    assert_eq!(bytes.len(), 5_001);
    assert_eq!(bytes[0], 0x91);
    assert_eq!(bytes[5_000], 0xc0);
}
