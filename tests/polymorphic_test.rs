use std::collections::{BTreeMap, HashMap};

use senax_msgpack::{
    DecodeError, Error, MessagePackObject, Polymorphic, ResolutionError, SerializationContext,
    TypeTagged,
};

trait Shape: TypeTagged {
    fn area(&self) -> u64;
}

#[derive(MessagePackObject, Debug, PartialEq)]
#[msgpack(type_tag = "circle")]
struct Circle {
    radius: u32,
}

impl Shape for Circle {
    fn area(&self) -> u64 {
        3 * u64::from(self.radius) * u64::from(self.radius)
    }
}

#[derive(MessagePackObject, Debug, PartialEq)]
#[msgpack(type_tag = "square")]
struct Square {
    side: u32,
}

impl Shape for Square {
    fn area(&self) -> u64 {
        u64::from(self.side) * u64::from(self.side)
    }
}

fn circle(c: Circle) -> Box<dyn Shape> {
    Box::new(c)
}

fn square(s: Square) -> Box<dyn Shape> {
    Box::new(s)
}

fn shapes_context() -> SerializationContext {
    let ctx = SerializationContext::default();
    ctx.register_subtype::<dyn Shape, Circle>("circle", circle);
    ctx.register_subtype::<dyn Shape, Square>("square", square);
    ctx
}

#[derive(MessagePackObject, Debug)]
struct Drawing {
    #[msgpack(runtime_type)]
    main: Polymorphic<dyn Shape>,
    #[msgpack(known_types("circle"))]
    round: Polymorphic<dyn Shape>,
    #[msgpack(runtime_type)]
    overlay: Option<Polymorphic<dyn Shape>>,
}

// =============================================================================
// Tagged forms
// =============================================================================

#[test]
fn test_runtime_tag_round_trip() {
    let ctx = shapes_context();
    let drawing = Drawing {
        main: Polymorphic::new(Box::new(Square { side: 4 })),
        round: Polymorphic::new(Box::new(Circle { radius: 1 })),
        overlay: None,
    };
    let bytes = ctx.serialize(&drawing).unwrap();
    let mut expected = vec![0x93, 0x92, 0xa6];
    expected.extend_from_slice(b"square");
    expected.extend_from_slice(&[0x91, 0x04, 0x92, 0xa6]);
    expected.extend_from_slice(b"circle");
    expected.extend_from_slice(&[0x91, 0x01, 0xc0]);
    assert_eq!(bytes, expected);

    let back: Drawing = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.main.type_tag(), "square");
    assert_eq!(back.main.area(), 16);
    assert_eq!(back.round.area(), 3);
    assert!(back.overlay.is_none());
}

#[test]
fn test_optional_polymorphic_member() {
    let ctx = shapes_context();
    let drawing = Drawing {
        main: Polymorphic::new(Box::new(Circle { radius: 2 })),
        round: Polymorphic::new(Box::new(Circle { radius: 2 })),
        overlay: Some(Polymorphic::new(Box::new(Square { side: 3 }))),
    };
    let bytes = ctx.serialize(&drawing).unwrap();
    let back: Drawing = ctx.deserialize(&bytes).unwrap();
    let overlay = back.overlay.unwrap();
    assert_eq!(overlay.type_tag(), "square");
    assert_eq!(overlay.area(), 9);
}

#[test]
fn test_known_types_reject_other_registered_tags() {
    let ctx = shapes_context();
    let mut bytes = vec![0x93, 0x92, 0xa6];
    bytes.extend_from_slice(b"circle");
    bytes.extend_from_slice(&[0x91, 0x01, 0x92, 0xa6]);
    bytes.extend_from_slice(b"square");
    bytes.extend_from_slice(&[0x91, 0x02, 0xc0]);

    let err = ctx.deserialize::<Drawing>(&bytes).unwrap_err();
    match err {
        Error::Decode(DecodeError::UnknownTypeTag { tag, .. }) => assert_eq!(tag, "square"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_unregistered_runtime_tag() {
    let ctx = shapes_context();
    let mut bytes = vec![0x93, 0x92, 0xa8];
    bytes.extend_from_slice(b"triangle");
    bytes.extend_from_slice(&[0x90, 0x92, 0xa6]);
    bytes.extend_from_slice(b"circle");
    bytes.extend_from_slice(&[0x91, 0x01, 0xc0]);

    let err = ctx.deserialize::<Drawing>(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::UnknownTypeTag { ref tag, .. }) if tag == "triangle"
    ));
}

#[test]
fn test_tagged_value_must_be_a_pair() {
    let ctx = shapes_context();
    let mut bytes = vec![0x93, 0x91, 0xa6];
    bytes.extend_from_slice(b"circle");
    bytes.extend_from_slice(&[0xc0, 0xc0]);
    let err = ctx.deserialize::<Drawing>(&bytes).unwrap_err();
    assert!(matches!(err, Error::Decode(DecodeError::Malformed(_))));
}

#[test]
fn test_known_type_must_be_registered() {
    let ctx = SerializationContext::default();
    ctx.register_subtype::<dyn Shape, Square>("square", square);
    let drawing = Drawing {
        main: Polymorphic::new(Box::new(Square { side: 1 })),
        round: Polymorphic::new(Box::new(Circle { radius: 1 })),
        overlay: None,
    };
    let err = ctx.serialize(&drawing).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolution(ResolutionError::Unconstructable {
            type_name: "Drawing",
            ..
        })
    ));
}

#[test]
fn test_top_level_polymorphic_value_is_tagged() {
    let ctx = shapes_context();
    let value: Polymorphic<dyn Shape> = Polymorphic::new(Box::new(Circle { radius: 5 }));
    let bytes = ctx.serialize(&value).unwrap();
    let mut expected = vec![0x92, 0xa6];
    expected.extend_from_slice(b"circle");
    expected.extend_from_slice(&[0x91, 0x05]);
    assert_eq!(bytes, expected);

    let back: Polymorphic<dyn Shape> = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.area(), 75);
    assert_eq!(format!("{:?}", back), "Polymorphic(circle)");
}

// =============================================================================
// Registered default type
// =============================================================================

#[derive(MessagePackObject, Debug)]
struct Tile {
    background: Polymorphic<dyn Shape>,
}

#[test]
fn test_registered_default_writes_the_bare_body() {
    let ctx = SerializationContext::default();
    ctx.register_default_type::<dyn Shape, Square>(square);

    let tile = Tile {
        background: Polymorphic::new(Box::new(Square { side: 6 })),
    };
    let bytes = ctx.serialize(&tile).unwrap();
    assert_eq!(bytes.as_ref(), &[0x91, 0x91, 0x06]);

    let back: Tile = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.background.type_tag(), "square");
    assert_eq!(back.background.area(), 36);
}

#[test]
fn test_abstract_member_without_any_policy() {
    let ctx = SerializationContext::default();
    let err = ctx.deserialize::<Tile>(&[0x91, 0x91, 0x06]).unwrap_err();
    assert!(matches!(
        err,
        Error::Resolution(ResolutionError::UnresolvableAbstractType {
            type_name: "Tile",
            member: "background"
        })
    ));
}

#[test]
fn test_registration_after_resolution_does_not_apply() {
    let ctx = SerializationContext::default();
    assert!(ctx.deserialize::<Tile>(&[0x91, 0x91, 0x06]).is_err());
    ctx.register_default_type::<dyn Shape, Square>(square);
    let err = ctx.deserialize::<Tile>(&[0x91, 0x91, 0x06]).unwrap_err();
    assert!(err.is_resolution());

    // A fresh context sees the registration.
    let fresh = SerializationContext::default();
    fresh.register_default_type::<dyn Shape, Square>(square);
    assert!(fresh.deserialize::<Tile>(&[0x91, 0x91, 0x06]).is_ok());
}

#[test]
fn test_default_type_is_fixed_at_resolution() {
    let ctx = SerializationContext::default();
    ctx.register_default_type::<dyn Shape, Square>(square);
    let back: Tile = ctx.deserialize(&[0x91, 0x91, 0x06]).unwrap();
    assert_eq!(back.background.type_tag(), "square");

    ctx.register_default_type::<dyn Shape, Circle>(circle);
    let again: Tile = ctx.deserialize(&[0x91, 0x91, 0x06]).unwrap();
    assert_eq!(again.background.type_tag(), "square");
    assert_eq!(again.background.area(), 36);
}

#[test]
fn test_tags_registered_after_resolution_are_not_accepted() {
    let ctx = SerializationContext::default();
    ctx.register_subtype::<dyn Shape, Circle>("circle", circle);
    let drawing = Drawing {
        main: Polymorphic::new(Box::new(Circle { radius: 1 })),
        round: Polymorphic::new(Box::new(Circle { radius: 1 })),
        overlay: None,
    };
    ctx.serialize(&drawing).unwrap();

    ctx.register_subtype::<dyn Shape, Square>("square", square);
    let mut bytes = vec![0x93, 0x92, 0xa6];
    bytes.extend_from_slice(b"square");
    bytes.extend_from_slice(&[0x91, 0x02, 0x92, 0xa6]);
    bytes.extend_from_slice(b"circle");
    bytes.extend_from_slice(&[0x91, 0x01, 0xc0]);
    let err = ctx.deserialize::<Drawing>(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::UnknownTypeTag { ref tag, .. }) if tag == "square"
    ));

    // Outside a member, the current registrations apply.
    let mut top = vec![0x92, 0xa6];
    top.extend_from_slice(b"square");
    top.extend_from_slice(&[0x91, 0x02]);
    let value: Polymorphic<dyn Shape> = ctx.deserialize(&top).unwrap();
    assert_eq!(value.area(), 4);
}

// =============================================================================
// Polymorphic values inside collections
// =============================================================================

#[derive(MessagePackObject, Debug)]
struct Layers {
    by_name: HashMap<String, Polymorphic<dyn Shape>>,
}

#[test]
fn test_dictionary_values_use_the_registered_default() {
    let ctx = SerializationContext::default();
    ctx.register_default_type::<dyn Shape, Square>(square);

    let mut by_name: HashMap<String, Polymorphic<dyn Shape>> = HashMap::new();
    by_name.insert("a".to_string(), Polymorphic::new(Box::new(Square { side: 2 })));
    let bytes = ctx.serialize(&Layers { by_name }).unwrap();
    assert_eq!(bytes.as_ref(), &[0x91, 0x81, 0xa1, b'a', 0x91, 0x02]);

    let back: Layers = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.by_name["a"].type_tag(), "square");
    assert_eq!(back.by_name["a"].area(), 4);
}

#[derive(MessagePackObject, Debug)]
struct Palette {
    #[msgpack(known_types("circle"))]
    by_rank: BTreeMap<u8, Polymorphic<dyn Shape>>,
    #[msgpack(known_types("circle"))]
    spare: Vec<Polymorphic<dyn Shape>>,
}

#[test]
fn test_dictionary_values_honour_known_types() {
    let ctx = shapes_context();
    let mut by_rank: BTreeMap<u8, Polymorphic<dyn Shape>> = BTreeMap::new();
    by_rank.insert(1, Polymorphic::new(Box::new(Circle { radius: 3 })));
    let palette = Palette {
        by_rank,
        spare: Vec::new(),
    };
    let bytes = ctx.serialize(&palette).unwrap();
    let back: Palette = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.by_rank[&1].area(), 27);

    // {1: ["square", [2]]}, []
    let mut bytes = vec![0x92, 0x81, 0x01, 0x92, 0xa6];
    bytes.extend_from_slice(b"square");
    bytes.extend_from_slice(&[0x91, 0x02, 0x90]);
    let err = ctx.deserialize::<Palette>(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Decode(DecodeError::UnknownTypeTag { ref tag, .. }) if tag == "square"
    ));
}

#[derive(MessagePackObject, Debug)]
struct Pair {
    both: (Polymorphic<dyn Shape>, Option<Polymorphic<dyn Shape>>),
}

#[test]
fn test_tuple_elements_use_the_registered_default() {
    let ctx = SerializationContext::default();
    ctx.register_default_type::<dyn Shape, Square>(square);
    let pair = Pair {
        both: (Polymorphic::new(Box::new(Square { side: 1 })), None),
    };
    let bytes = ctx.serialize(&pair).unwrap();
    assert_eq!(bytes.as_ref(), &[0x91, 0x92, 0x91, 0x01, 0xc0]);
    let back: Pair = ctx.deserialize(&bytes).unwrap();
    assert_eq!(back.both.0.area(), 1);
    assert!(back.both.1.is_none());
}
