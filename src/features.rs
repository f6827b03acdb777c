#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "serde_json")]
use serde_json::{Map, Number, Value};
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[allow(unused_imports)]
use crate::resolver::{TypeCategory, TypeFacts};
#[allow(unused_imports)]
use crate::serializer::{pack_elements, pack_entries, unpack_elements, unpack_entries};
#[allow(unused_imports)]
use crate::*;

// --- IndexSet ---
/// Encodes a set as an array, in insertion order.
#[cfg(feature = "indexmap")]
impl<T: MessagePackSerialize + Eq + std::hash::Hash, S> MessagePackSerialize for IndexSet<T, S> {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        pack_elements(self, self.len(), None, packer, ctx)
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        pack_elements(self, self.len(), Some(binding), packer, ctx)
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::wrapping(
            std::any::type_name::<Self>(),
            TypeCategory::Reference,
            T::type_facts(),
        )
    }
}
#[cfg(feature = "indexmap")]
impl<T, S> MessagePackDeserialize for IndexSet<T, S>
where
    T: MessagePackDeserialize + Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default,
{
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_index_set(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_index_set(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(IndexSet::default())
    }
}

#[cfg(feature = "indexmap")]
fn unpack_index_set<T, S>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<IndexSet<T, S>>
where
    T: MessagePackDeserialize + Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default,
{
    unpack_elements(
        binding,
        unpacker,
        ctx,
        |len| IndexSet::with_capacity_and_hasher(len, S::default()),
        |set, item| {
            set.insert(item);
        },
    )
}

// --- IndexMap ---
/// Encodes a map in insertion order. A repeated key on decode keeps its first position
/// and its last value.
#[cfg(feature = "indexmap")]
impl<K, V, S> MessagePackSerialize for IndexMap<K, V, S>
where
    K: MessagePackSerialize + Eq + std::hash::Hash,
    V: MessagePackSerialize,
{
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        pack_entries(self, self.len(), None, packer, ctx)
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        pack_entries(self, self.len(), Some(binding), packer, ctx)
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::combining(
            std::any::type_name::<Self>(),
            TypeCategory::Reference,
            [K::type_facts(), V::type_facts()],
        )
    }
}
#[cfg(feature = "indexmap")]
impl<K, V, S> MessagePackDeserialize for IndexMap<K, V, S>
where
    K: MessagePackDeserialize + Eq + std::hash::Hash,
    V: MessagePackDeserialize,
    S: std::hash::BuildHasher + Default,
{
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_index_map(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_index_map(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(IndexMap::default())
    }
}

#[cfg(feature = "indexmap")]
fn unpack_index_map<K, V, S>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<IndexMap<K, V, S>>
where
    K: MessagePackDeserialize + Eq + std::hash::Hash,
    V: MessagePackDeserialize,
    S: std::hash::BuildHasher + Default,
{
    unpack_entries(
        binding,
        unpacker,
        ctx,
        |len| IndexMap::with_capacity_and_hasher(len, S::default()),
        |map, k, v| {
            map.insert(k, v);
        },
    )
}

// --- DateTime<Utc> ---
/// Encodes a `chrono::DateTime<Utc>` as the timestamp extension (type -1).
#[cfg(feature = "chrono")]
impl MessagePackSerialize for DateTime<Utc> {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        Timestamp::try_from(*self)?.pack_to(packer, ctx)
    }
}
/// Decodes a `chrono::DateTime<Utc>` from the timestamp extension.
#[cfg(feature = "chrono")]
impl MessagePackDeserialize for DateTime<Utc> {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        let timestamp = Timestamp::unpack_from(unpacker, ctx)?;
        DateTime::from_timestamp(timestamp.seconds(), timestamp.nanoseconds()).ok_or_else(|| {
            DecodeError::Malformed(format!("timestamp {} is out of range for DateTime", timestamp))
                .into()
        })
    }

    fn member_default() -> Option<Self> {
        Some(DateTime::<Utc>::default())
    }
}

/// Fails with `Overflow` for a leap second, which the timestamp extension cannot carry.
#[cfg(feature = "chrono")]
impl TryFrom<DateTime<Utc>> for Timestamp {
    type Error = Error;

    fn try_from(value: DateTime<Utc>) -> Result<Self> {
        Timestamp::new(value.timestamp(), value.timestamp_subsec_nanos()).ok_or_else(|| {
            EncodingError::Overflow {
                target: "timestamp",
                value: value.to_string(),
            }
            .into()
        })
    }
}

// --- Uuid ---
/// Encodes a UUID as 16 bytes of binary.
#[cfg(feature = "uuid")]
impl MessagePackSerialize for Uuid {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_bin(self.as_bytes())?;
        Ok(())
    }
}
#[cfg(feature = "uuid")]
impl MessagePackDeserialize for Uuid {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        let bytes = unpacker.read_bin()?;
        Uuid::from_slice(&bytes).map_err(|_| {
            DecodeError::Malformed(format!("a UUID is 16 bytes, got {}", bytes.len())).into()
        })
    }

    fn member_default() -> Option<Self> {
        Some(Uuid::nil())
    }
}

// --- serde_json::Value ---
/// Converts JSON to a wire value. Numbers keep their integer or float nature.
#[cfg(feature = "serde_json")]
impl From<&Value> for WireValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => WireValue::Nil,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    WireValue::UInt(u)
                } else if let Some(i) = n.as_i64() {
                    WireValue::Int(i)
                } else {
                    WireValue::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => WireValue::from(s.as_str()),
            Value::Array(items) => WireValue::Array(items.iter().map(WireValue::from).collect()),
            Value::Object(obj) => WireValue::Map(
                obj.iter()
                    .map(|(k, v)| (WireValue::from(k.as_str()), WireValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Converts a wire value to JSON.
///
/// Non-finite floats become `null` and non-string map keys are rendered as text.
/// Binary and extension values have no JSON form.
#[cfg(feature = "serde_json")]
impl TryFrom<WireValue> for Value {
    type Error = Error;

    fn try_from(value: WireValue) -> Result<Self> {
        Ok(match value {
            WireValue::Nil => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::UInt(u) => Value::Number(u.into()),
            WireValue::Int(i) => Value::Number(i.into()),
            WireValue::Float32(f) => Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number),
            WireValue::Float64(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            WireValue::Str(s) => match s.as_str() {
                Some(text) => Value::String(text.to_string()),
                None => {
                    return Err(DecodeError::Malformed("invalid UTF-8 in str".to_string()).into())
                }
            },
            WireValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            WireValue::Map(entries) => {
                let mut obj = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match k.as_str() {
                        Some(text) => text.to_string(),
                        None => k.to_string(),
                    };
                    obj.insert(key, Value::try_from(v)?);
                }
                Value::Object(obj)
            }
            other @ (WireValue::Bin(_) | WireValue::Ext(_)) => {
                return Err(DecodeError::TypeMismatch {
                    expected: "JSON-compatible value",
                    found: other.kind_name(),
                }
                .into())
            }
        })
    }
}

/// Encodes JSON as the equivalent MessagePack value. `null` is nil.
#[cfg(feature = "serde_json")]
impl MessagePackSerialize for Value {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_value(&WireValue::from(self))?;
        Ok(())
    }

    fn is_nil(&self) -> bool {
        self.is_null()
    }

    fn type_facts() -> TypeFacts {
        TypeFacts {
            category: TypeCategory::Optional,
            ..TypeFacts::value("serde_json::Value")
        }
    }
}
#[cfg(feature = "serde_json")]
impl MessagePackDeserialize for Value {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        let value = unpacker.read_value()?;
        Value::try_from(value)
    }

    fn nil_value() -> Option<Self> {
        Some(Value::Null)
    }

    fn member_default() -> Option<Self> {
        Some(Value::Null)
    }
}

// --- SmolStr ---
#[cfg(feature = "smol_str")]
impl MessagePackSerialize for SmolStr {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_str(self.as_str())?;
        Ok(())
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::reference("SmolStr")
    }
}
#[cfg(feature = "smol_str")]
impl MessagePackDeserialize for SmolStr {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_str().map(SmolStr::new)
    }

    fn member_default() -> Option<Self> {
        Some(SmolStr::default())
    }
}
