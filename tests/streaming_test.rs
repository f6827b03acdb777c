use std::io::{self, Read};

use bytes::Bytes;
use senax_msgpack::{
    deserialize_from_reader, pack, unpack_from_reader, DecodeError, Error, ExtObject,
    SerializationContext, StreamUnpacker, Unpacker, WireValue,
};

fn sample() -> WireValue {
    WireValue::Map(vec![
        (
            WireValue::from("numbers"),
            WireValue::Array(vec![
                WireValue::UInt(1),
                WireValue::UInt(300),
                WireValue::Int(-70000),
                WireValue::UInt(u64::MAX),
                WireValue::Float64(0.25),
                WireValue::Float32(-1.0),
            ]),
        ),
        (WireValue::from("text"), WireValue::from("x".repeat(40))),
        (WireValue::from("bin"), WireValue::Bin(Bytes::from(vec![7u8; 300]))),
        (
            WireValue::from("ext"),
            WireValue::Array(vec![
                WireValue::Ext(ExtObject::new(1, vec![1])),
                WireValue::Ext(ExtObject::new(2, vec![0; 3])),
                WireValue::Ext(ExtObject::new(3, Vec::new())),
            ]),
        ),
        (
            WireValue::from("nested"),
            WireValue::Map(vec![(
                WireValue::Nil,
                WireValue::Array(vec![WireValue::Bool(true), WireValue::Map(Vec::new())]),
            )]),
        ),
    ])
}

/// Hands out at most one byte per read, with an interruption before every byte.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    interrupt: bool,
}

impl Trickle {
    fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            pos: 0,
            interrupt: true,
        }
    }
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.interrupt {
            self.interrupt = false;
            return Err(io::Error::new(io::ErrorKind::Interrupted, "again"));
        }
        self.interrupt = true;
        if self.pos >= self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        buf[0] = self.data[self.pos];
        self.pos += 1;
        Ok(1)
    }
}

// =============================================================================
// Incremental feeding
// =============================================================================

#[test]
fn test_byte_at_a_time_never_reports_malformed() {
    let value = sample();
    let bytes = pack(&value).unwrap();

    let mut unpacker = Unpacker::new();
    for (i, byte) in bytes.iter().enumerate() {
        unpacker.feed(&[*byte]);
        let result = unpacker.next_value();
        if i + 1 < bytes.len() {
            match result {
                Err(Error::Decode(DecodeError::Truncated { .. })) => {}
                other => panic!("byte {} of {}: expected Truncated, got {:?}", i, bytes.len(), other),
            }
        } else {
            assert_eq!(result.unwrap(), value);
        }
    }
    assert!(!unpacker.is_mid_value());
    assert!(!unpacker.has_remaining());
}

#[test]
fn test_split_at_every_position() {
    let value = sample();
    let bytes = pack(&value).unwrap();
    for split in 0..=bytes.len() {
        let mut unpacker = Unpacker::new();
        unpacker.feed(&bytes[..split]);
        let first = unpacker.next_value();
        if split < bytes.len() {
            assert!(first.unwrap_err().is_truncated(), "split at {}", split);
            unpacker.feed(&bytes[split..]);
            assert_eq!(unpacker.next_value().unwrap(), value, "split at {}", split);
        } else {
            assert_eq!(first.unwrap(), value);
        }
    }
}

#[test]
fn test_resumes_inside_collections() {
    let mut unpacker = Unpacker::new();
    unpacker.feed(&[0x93, 0x01]);
    assert!(unpacker.next_value().unwrap_err().is_truncated());
    assert!(unpacker.is_mid_value());
    unpacker.feed(&[0xa2, b'h']);
    assert!(unpacker.next_value().unwrap_err().is_truncated());
    unpacker.feed(&[b'i', 0xc3, 0x2a]);
    assert_eq!(
        unpacker.next_value().unwrap(),
        WireValue::Array(vec![
            WireValue::UInt(1),
            WireValue::from("hi"),
            WireValue::Bool(true)
        ])
    );
    assert!(!unpacker.is_mid_value());
    assert_eq!(unpacker.next_value().unwrap(), WireValue::UInt(42));
}

#[test]
fn test_typed_read_rewinds_on_truncation() {
    let ctx = SerializationContext::default();
    let bytes = ctx
        .serialize(&vec!["alpha".to_string(), "beta".to_string()])
        .unwrap();

    let mut unpacker = Unpacker::new();
    for byte in &bytes[..bytes.len() - 1] {
        unpacker.feed(&[*byte]);
        let err = unpacker.deserialize::<Vec<String>>(&ctx).unwrap_err();
        assert!(err.is_truncated());
        // Nothing consumed: the whole prefix is still buffered.
        assert!(!unpacker.is_mid_value());
    }
    unpacker.feed(&bytes[bytes.len() - 1..]);
    assert_eq!(
        unpacker.deserialize::<Vec<String>>(&ctx).unwrap(),
        vec!["alpha".to_string(), "beta".to_string()]
    );
}

#[test]
fn test_typed_read_refuses_pending_value() {
    let mut unpacker = Unpacker::new();
    unpacker.feed(&[0x92, 0x01]);
    assert!(unpacker.next_value().unwrap_err().is_truncated());
    let err = unpacker.unpack_as::<u8>().unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::Malformed(_))));
}

#[test]
fn test_consecutive_values() {
    let mut bytes = pack(&WireValue::from("a")).unwrap().to_vec();
    bytes.extend_from_slice(&pack(&WireValue::Nil).unwrap());
    bytes.extend_from_slice(&pack(&WireValue::Int(-5)).unwrap());

    let mut unpacker = Unpacker::from_slice(&bytes);
    assert_eq!(unpacker.next_value().unwrap(), WireValue::from("a"));
    assert_eq!(unpacker.next_value().unwrap(), WireValue::Nil);
    assert_eq!(unpacker.unpack_as::<i32>().unwrap(), -5);
    assert!(unpacker.next_value().unwrap_err().is_truncated());
}

// =============================================================================
// Blocking readers
// =============================================================================

#[test]
fn test_stream_unpacker_over_trickling_reader() {
    let first = sample();
    let second = WireValue::Array(vec![WireValue::UInt(9); 20]);
    let mut bytes = pack(&first).unwrap().to_vec();
    bytes.extend_from_slice(&pack(&second).unwrap());

    let mut stream = StreamUnpacker::new(Trickle::new(&bytes));
    assert_eq!(stream.next_value().unwrap(), Some(first));
    assert_eq!(stream.next_value().unwrap(), Some(second));
    assert_eq!(stream.next_value().unwrap(), None);
}

#[test]
fn test_stream_eof_inside_value_is_truncated() {
    let bytes = pack(&sample()).unwrap();
    let mut stream = StreamUnpacker::new(&bytes[..bytes.len() / 2]);
    let err = stream.next_value().unwrap_err();
    assert!(err.is_truncated());

    let err = unpack_from_reader(io::empty()).unwrap_err();
    assert!(err.is_truncated());
}

#[test]
fn test_stream_reader_errors_propagate() {
    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))
        }
    }
    let err = StreamUnpacker::new(Broken).next_value().unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn test_typed_stream_reads() {
    let ctx = SerializationContext::default();
    let mut bytes = ctx.serialize(&(1u8, "two".to_string())).unwrap().to_vec();
    bytes.extend_from_slice(&ctx.serialize(&3.5f64).unwrap());

    let mut stream = StreamUnpacker::new(Trickle::new(&bytes));
    let pair: (u8, String) = stream.deserialize(&ctx).unwrap();
    assert_eq!(pair, (1, "two".to_string()));
    let float: f64 = stream.deserialize(&ctx).unwrap();
    assert_eq!(float, 3.5);

    let value: Vec<i16> = deserialize_from_reader(&[0x92, 0xd1, 0x01, 0x00, 0xff][..]).unwrap();
    assert_eq!(value, vec![256, -1]);
}
