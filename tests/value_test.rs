use bytes::Bytes;
use senax_msgpack::{
    pack, unpack, unpack_window, DecodeError, EncodingError, Error, ExtObject, StrEncoding,
    WireString, WireValue,
};

// =============================================================================
// Cross-width numeric equality
// =============================================================================

#[test]
fn test_integers_compare_by_value() {
    assert_eq!(WireValue::UInt(0), WireValue::Int(0));
    assert_eq!(WireValue::UInt(42), WireValue::Int(42));
    assert_ne!(WireValue::Int(-1), WireValue::UInt(u64::MAX));
    assert_ne!(WireValue::UInt(i64::MAX as u64 + 1), WireValue::Int(i64::MIN));
}

#[test]
fn test_integer_and_float_equality_is_exact() {
    assert_eq!(WireValue::UInt(0), WireValue::Float64(0.0));
    assert_eq!(WireValue::Int(-3), WireValue::Float32(-3.0));
    assert_eq!(WireValue::Float32(5.0), WireValue::UInt(5));
    assert_ne!(WireValue::UInt(5), WireValue::Float64(5.5));
    // 2^64 is not u64::MAX, even though u64::MAX as f64 rounds to it.
    assert_ne!(
        WireValue::UInt(u64::MAX),
        WireValue::Float64(18_446_744_073_709_551_616.0)
    );
    assert_ne!(WireValue::UInt(0), WireValue::Float64(f64::INFINITY));
}

#[test]
fn test_float_widths_compare_exactly() {
    assert_eq!(WireValue::Float32(1.5), WireValue::Float64(1.5));
    // 0.1 is not representable; the f32 and f64 roundings differ.
    assert_ne!(WireValue::Float32(0.1), WireValue::Float64(0.1));
    assert_ne!(WireValue::Float64(f64::NAN), WireValue::Float64(f64::NAN));
    assert_ne!(WireValue::Float32(f32::NAN), WireValue::Float64(f64::NAN));
}

#[test]
fn test_decoded_widths_compare_equal() {
    // uint8 200, int16 200, float64 200.0
    let a = unpack(&[0xcc, 0xc8]).unwrap();
    let b = unpack(&[0xd1, 0x00, 0xc8]).unwrap();
    let c = unpack(&[0xcb, 0x40, 0x69, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]).unwrap();
    assert_eq!(a, b);
    assert_eq!(b, c);
    assert!(matches!(a, WireValue::UInt(200)));
    assert!(matches!(b, WireValue::Int(200)));
}

// =============================================================================
// Raw family and structure
// =============================================================================

#[test]
fn test_str_equals_bin_with_same_bytes() {
    let text = WireValue::from("raw");
    let binary = WireValue::Bin(Bytes::from_static(b"raw"));
    assert_eq!(text, binary);
    assert_eq!(binary, text);
    assert_ne!(text, WireValue::Bin(Bytes::from_static(b"RAW")));
}

#[test]
fn test_invalid_utf8_str_is_kept_with_unknown_encoding() {
    let decoded = unpack(&[0xa2, 0xff, 0xfe]).unwrap();
    match &decoded {
        WireValue::Str(s) => {
            assert_eq!(s.encoding(), StrEncoding::Unknown);
            assert_eq!(s.as_bytes(), &[0xff, 0xfe]);
            assert_eq!(s.as_str(), None);
        }
        other => panic!("expected str, got {:?}", other),
    }
    assert_eq!(WireString::from("ok").encoding(), StrEncoding::Utf8);
}

#[test]
fn test_collections_compare_in_order() {
    let a = WireValue::Array(vec![WireValue::from(1u8), WireValue::from(2u8)]);
    let b = WireValue::Array(vec![WireValue::from(1i64), WireValue::from(2.0f64)]);
    let c = WireValue::Array(vec![WireValue::from(2u8), WireValue::from(1u8)]);
    assert_eq!(a, b);
    assert_ne!(a, c);

    let m1 = WireValue::Map(vec![
        (WireValue::from("x"), WireValue::Nil),
        (WireValue::from("y"), WireValue::Bool(true)),
    ]);
    let m2 = WireValue::Map(vec![
        (WireValue::from("y"), WireValue::Bool(true)),
        (WireValue::from("x"), WireValue::Nil),
    ]);
    assert_ne!(m1, m2);
    assert_eq!(m1.get("y"), Some(&WireValue::Bool(true)));
    assert_eq!(m1.get("z"), None);
}

#[test]
fn test_map_keeps_duplicate_keys_in_wire_order() {
    // {"k": 1, "k": 2}
    let decoded = unpack(&[0x82, 0xa1, b'k', 0x01, 0xa1, b'k', 0x02]).unwrap();
    let entries = decoded.as_map().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].1, WireValue::UInt(2));
    // Lookup returns the first occurrence.
    assert_eq!(decoded.get("k"), Some(&WireValue::UInt(1)));
}

#[test]
fn test_ext_values_compare_by_code_and_payload() {
    let a = WireValue::Ext(ExtObject::new(7, vec![1, 2]));
    assert_eq!(a, WireValue::Ext(ExtObject::new(7, vec![1, 2])));
    assert_ne!(a, WireValue::Ext(ExtObject::new(8, vec![1, 2])));
    assert_ne!(a, WireValue::Bin(Bytes::from_static(&[1, 2])));
}

// =============================================================================
// Accessors and conversions
// =============================================================================

#[test]
fn test_accessors() {
    assert_eq!(WireValue::Int(-5).as_i64(), Some(-5));
    assert_eq!(WireValue::Int(-5).as_u64(), None);
    assert_eq!(WireValue::UInt(u64::MAX).as_i64(), None);
    assert_eq!(WireValue::UInt(3).as_f64(), Some(3.0));
    assert_eq!(WireValue::Bool(true).as_bool(), Some(true));
    assert!(WireValue::Nil.is_nil());
    assert_eq!(WireValue::from(Some(4u8)), WireValue::UInt(4));
    assert_eq!(WireValue::from(None::<u8>), WireValue::Nil);
}

#[test]
fn test_narrowing_conversion_overflows() {
    assert_eq!(u8::try_from(&WireValue::UInt(255)).unwrap(), 255);
    let err = u8::try_from(&WireValue::UInt(256)).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::Overflow { target: "u8", .. })
    ));
    let err = i32::try_from(&WireValue::from("1")).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::TypeMismatch { expected: "integer", .. })
    ));
}

// =============================================================================
// Canonical text form
// =============================================================================

#[test]
fn test_display() {
    let value = WireValue::Map(vec![
        (WireValue::from("name"), WireValue::from("a\"b")),
        (
            WireValue::from("list"),
            WireValue::Array(vec![WireValue::UInt(1), WireValue::Int(-2), WireValue::Nil]),
        ),
        (WireValue::from("bin"), WireValue::Bin(Bytes::from_static(&[0x01, 0xab]))),
        (WireValue::from("ext"), WireValue::Ext(ExtObject::new(5, vec![0x0a, 0xff]))),
        (WireValue::from("f"), WireValue::Float64(1.5)),
    ]);
    assert_eq!(
        value.to_string(),
        r#"{"name": "a\"b", "list": [1, -2, nil], "bin": 0x01ab, "ext": ext(5, 0x0aff), "f": 1.5}"#
    );
    assert_eq!(WireValue::Bool(false).to_string(), "false");
    assert_eq!(WireValue::Float64(2.0).to_string(), "2.0");
}

// =============================================================================
// Windows
// =============================================================================

#[test]
fn test_unpack_window() {
    let mut buffer = vec![0xff, 0xff];
    buffer.extend_from_slice(&pack(&WireValue::from("mid")).unwrap());
    buffer.push(0xc1);
    assert_eq!(
        unpack_window(&buffer, 2, 4).unwrap(),
        WireValue::from("mid")
    );

    // A window that cuts the value short is truncated, not malformed.
    let err = unpack_window(&buffer, 2, 3).unwrap_err();
    assert!(err.is_truncated());

    let err = unpack_window(&buffer, 5, 10).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::WindowOutOfRange {
            offset: 5,
            len: 10,
            available: 7
        })
    ));
}
