//! Typed pack/unpack for built-in types.
//!
//! Scalars map onto the matching wire family, sequences onto arrays and dictionaries onto
//! maps. Dictionaries keep the last value for a duplicated key.

use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use crate::resolver::{MemberBinding, TypeCategory, TypeFacts};
use crate::{
    DecodeError, ExtObject, Packer, Result, SerializationContext, Timestamp, Unpacker, WireValue,
};

/// A type that can be written as MessagePack.
pub trait MessagePackSerialize {
    /// Writes the value.
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()>;

    /// Writes the value as the member described by `binding`.
    ///
    /// Only types whose wire form depends on the member binding (polymorphic members and
    /// wrappers around them) override this.
    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        let _ = binding;
        self.pack_to(packer, ctx)
    }

    /// True when the value is written as nil.
    fn is_nil(&self) -> bool {
        false
    }

    /// What the resolver needs to know about this type when it is used as a member.
    fn type_facts() -> TypeFacts
    where
        Self: Sized,
    {
        TypeFacts::value(std::any::type_name::<Self>())
    }
}

/// A type that can be read from MessagePack.
pub trait MessagePackDeserialize: Sized {
    /// Reads the value.
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self>;

    /// Reads the value as the member described by `binding`.
    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        let _ = binding;
        Self::unpack_from(unpacker, ctx)
    }

    /// The value wire nil stands for under the `Null` nil implication.
    fn nil_value() -> Option<Self> {
        None
    }

    /// The value used for nil or absent members under `MemberDefault`.
    fn member_default() -> Option<Self> {
        None
    }
}

impl<T: MessagePackSerialize + ?Sized> MessagePackSerialize for &T {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        (**self).pack_to(packer, ctx)
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        (**self).pack_with(binding, packer, ctx)
    }

    fn is_nil(&self) -> bool {
        (**self).is_nil()
    }
}

// --- Primitive types ---
impl MessagePackSerialize for bool {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_bool(*self)?;
        Ok(())
    }
}
impl MessagePackDeserialize for bool {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_bool()
    }

    fn member_default() -> Option<Self> {
        Some(false)
    }
}

macro_rules! impl_unsigned {
    ($($t:ty),*) => {
        $(
            impl MessagePackSerialize for $t {
                fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
                    packer.pack_u64(*self as u64)?;
                    Ok(())
                }
            }
            impl MessagePackDeserialize for $t {
                fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
                    unpacker.read_int()
                }

                fn member_default() -> Option<Self> {
                    Some(0)
                }
            }
        )*
    };
}
impl_unsigned!(u8, u16, u32, u64, usize);

macro_rules! impl_signed {
    ($($t:ty),*) => {
        $(
            impl MessagePackSerialize for $t {
                fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
                    packer.pack_i64(*self as i64)?;
                    Ok(())
                }
            }
            impl MessagePackDeserialize for $t {
                fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
                    unpacker.read_int()
                }

                fn member_default() -> Option<Self> {
                    Some(0)
                }
            }
        )*
    };
}
impl_signed!(i8, i16, i32, i64, isize);

impl MessagePackSerialize for f32 {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_f32(*self)?;
        Ok(())
    }
}
impl MessagePackDeserialize for f32 {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_f32()
    }

    fn member_default() -> Option<Self> {
        Some(0.0)
    }
}

impl MessagePackSerialize for f64 {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_f64(*self)?;
        Ok(())
    }
}
impl MessagePackDeserialize for f64 {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_f64()
    }

    fn member_default() -> Option<Self> {
        Some(0.0)
    }
}

// --- Text and binary ---
impl MessagePackSerialize for str {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_str(self)?;
        Ok(())
    }
}

impl MessagePackSerialize for String {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_str(self)?;
        Ok(())
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::reference("String")
    }
}
impl MessagePackDeserialize for String {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_str()
    }

    fn member_default() -> Option<Self> {
        Some(String::new())
    }
}

/// Binary data. Classic mode writes it with the raw (str) tags.
impl MessagePackSerialize for Bytes {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_bin(self)?;
        Ok(())
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::reference("Bytes")
    }
}
impl MessagePackDeserialize for Bytes {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_bin()
    }

    fn member_default() -> Option<Self> {
        Some(Bytes::new())
    }
}

// --- Sequences ---
pub(crate) fn pack_elements<'a, T, I>(
    items: I,
    len: usize,
    binding: Option<&MemberBinding>,
    packer: &mut Packer,
    ctx: &SerializationContext,
) -> Result<()>
where
    T: MessagePackSerialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    packer.pack_array_header(len)?;
    for item in items {
        match binding {
            Some(binding) => item.pack_with(binding, packer, ctx)?,
            None => item.pack_to(packer, ctx)?,
        }
    }
    Ok(())
}

/// Reads an array, element by element, into any collection.
pub(crate) fn unpack_elements<T, C>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
    collect: impl FnOnce(usize) -> C,
    mut insert: impl FnMut(&mut C, T),
) -> Result<C>
where
    T: MessagePackDeserialize,
{
    unpacker.nested(|unpacker| {
        let len = unpacker.read_array_len()?;
        let mut out = collect(len.min(unpacker.remaining()));
        for _ in 0..len {
            let item = match binding {
                Some(binding) => T::unpack_with(binding, unpacker, ctx)?,
                None => T::unpack_from(unpacker, ctx)?,
            };
            insert(&mut out, item);
        }
        Ok(out)
    })
}

/// Encodes a vector as an array of its elements.
impl<T: MessagePackSerialize> MessagePackSerialize for Vec<T> {
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
impl<T: MessagePackDeserialize> MessagePackDeserialize for Vec<T> {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_elements(None, unpacker, ctx, Vec::with_capacity, Vec::push)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_elements(Some(binding), unpacker, ctx, Vec::with_capacity, Vec::push)
    }

    fn member_default() -> Option<Self> {
        Some(Vec::new())
    }
}

/// Encodes a fixed-size array as an array; decoding requires exactly `N` elements.
impl<T: MessagePackSerialize, const N: usize> MessagePackSerialize for [T; N] {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        pack_elements(self, N, None, packer, ctx)
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        pack_elements(self, N, Some(binding), packer, ctx)
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::wrapping(std::any::type_name::<Self>(), TypeCategory::Value, T::type_facts())
    }
}

fn exactly<T, const N: usize>(items: Vec<T>) -> Result<[T; N]> {
    let len = items.len();
    items.try_into().map_err(|_| {
        DecodeError::Malformed(format!("expected an array of {} elements, got {}", N, len)).into()
    })
}

impl<T: MessagePackDeserialize, const N: usize> MessagePackDeserialize for [T; N] {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        exactly(Vec::unpack_from(unpacker, ctx)?)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        exactly(Vec::unpack_with(binding, unpacker, ctx)?)
    }
}

impl<T: MessagePackSerialize + Eq + Hash, S> MessagePackSerialize for HashSet<T, S> {
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
impl<T, S> MessagePackDeserialize for HashSet<T, S>
where
    T: MessagePackDeserialize + Eq + Hash,
    S: BuildHasher + Default,
{
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_hash_set(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_hash_set(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(HashSet::default())
    }
}

fn unpack_hash_set<T, S>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<HashSet<T, S>>
where
    T: MessagePackDeserialize + Eq + Hash,
    S: BuildHasher + Default,
{
    unpack_elements(
        binding,
        unpacker,
        ctx,
        |len| HashSet::with_capacity_and_hasher(len, S::default()),
        |set, item| {
            set.insert(item);
        },
    )
}

impl<T: MessagePackSerialize + Ord> MessagePackSerialize for BTreeSet<T> {
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
impl<T: MessagePackDeserialize + Ord> MessagePackDeserialize for BTreeSet<T> {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_btree_set(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_btree_set(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(BTreeSet::new())
    }
}

fn unpack_btree_set<T: MessagePackDeserialize + Ord>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<BTreeSet<T>> {
    unpack_elements(
        binding,
        unpacker,
        ctx,
        |_| BTreeSet::new(),
        |set, item| {
            set.insert(item);
        },
    )
}

// --- Tuples ---
macro_rules! impl_tuple {
    ($len:expr; $($T:ident : $idx:tt),+) => {
        /// Encodes a tuple as a fixed-length array.
        impl<$($T: MessagePackSerialize),+> MessagePackSerialize for ($($T,)+) {
            fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
                packer.pack_array_header($len)?;
                $(self.$idx.pack_to(packer, ctx)?;)+
                Ok(())
            }

            fn pack_with(
                &self,
                binding: &MemberBinding,
                packer: &mut Packer,
                ctx: &SerializationContext,
            ) -> Result<()> {
                packer.pack_array_header($len)?;
                $(self.$idx.pack_with(binding, packer, ctx)?;)+
                Ok(())
            }

            fn type_facts() -> TypeFacts {
                TypeFacts::combining(
                    std::any::type_name::<Self>(),
                    TypeCategory::Value,
                    [$($T::type_facts()),+],
                )
            }
        }
        impl<$($T: MessagePackDeserialize),+> MessagePackDeserialize for ($($T,)+) {
            fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
                unpacker.nested(|unpacker| {
                    expect_tuple_len(unpacker, $len)?;
                    Ok(($($T::unpack_from(unpacker, ctx)?,)+))
                })
            }

            fn unpack_with(
                binding: &MemberBinding,
                unpacker: &mut Unpacker,
                ctx: &SerializationContext,
            ) -> Result<Self> {
                unpacker.nested(|unpacker| {
                    expect_tuple_len(unpacker, $len)?;
                    Ok(($($T::unpack_with(binding, unpacker, ctx)?,)+))
                })
            }
        }
    };
}

fn expect_tuple_len(unpacker: &mut Unpacker, expected: usize) -> Result<()> {
    let len = unpacker.read_array_len()?;
    if len != expected {
        return Err(DecodeError::Malformed(format!(
            "expected a {}-tuple but got {} elements",
            expected, len
        ))
        .into());
    }
    Ok(())
}

impl_tuple!(1; T0: 0);
impl_tuple!(2; T0: 0, T1: 1);
impl_tuple!(3; T0: 0, T1: 1, T2: 2);
impl_tuple!(4; T0: 0, T1: 1, T2: 2, T3: 3);
impl_tuple!(5; T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_tuple!(6; T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);
impl_tuple!(7; T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6);
impl_tuple!(8; T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7);

// --- Dictionaries ---
/// Writes a map of entries. Inside a member, keys and values are written under its binding.
pub(crate) fn pack_entries<'a, K, V, I>(
    entries: I,
    len: usize,
    binding: Option<&MemberBinding>,
    packer: &mut Packer,
    ctx: &SerializationContext,
) -> Result<()>
where
    K: MessagePackSerialize + 'a,
    V: MessagePackSerialize + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    packer.pack_map_header(len)?;
    for (k, v) in entries {
        match binding {
            Some(binding) => {
                k.pack_with(binding, packer, ctx)?;
                v.pack_with(binding, packer, ctx)?;
            }
            None => {
                k.pack_to(packer, ctx)?;
                v.pack_to(packer, ctx)?;
            }
        }
    }
    Ok(())
}

/// Reads a map into any dictionary. A repeated key replaces the earlier value.
pub(crate) fn unpack_entries<K, V, C>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
    collect: impl FnOnce(usize) -> C,
    mut insert: impl FnMut(&mut C, K, V),
) -> Result<C>
where
    K: MessagePackDeserialize,
    V: MessagePackDeserialize,
{
    unpacker.nested(|unpacker| {
        let len = unpacker.read_map_len()?;
        let mut out = collect(len.min(unpacker.remaining() / 2));
        for _ in 0..len {
            let (k, v) = match binding {
                Some(binding) => (
                    K::unpack_with(binding, unpacker, ctx)?,
                    V::unpack_with(binding, unpacker, ctx)?,
                ),
                None => (K::unpack_from(unpacker, ctx)?, V::unpack_from(unpacker, ctx)?),
            };
            insert(&mut out, k, v);
        }
        Ok(out)
    })
}

/// Encodes a map as a MessagePack map of its entries.
impl<K, V, S> MessagePackSerialize for HashMap<K, V, S>
where
    K: MessagePackSerialize + Eq + Hash,
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
impl<K, V, S> MessagePackDeserialize for HashMap<K, V, S>
where
    K: MessagePackDeserialize + Eq + Hash,
    V: MessagePackDeserialize,
    S: BuildHasher + Default,
{
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_hash_map(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_hash_map(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(HashMap::default())
    }
}

fn unpack_hash_map<K, V, S>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<HashMap<K, V, S>>
where
    K: MessagePackDeserialize + Eq + Hash,
    V: MessagePackDeserialize,
    S: BuildHasher + Default,
{
    unpack_entries(
        binding,
        unpacker,
        ctx,
        |len| HashMap::with_capacity_and_hasher(len, S::default()),
        |map, k, v| {
            map.insert(k, v);
        },
    )
}

impl<K: MessagePackSerialize + Ord, V: MessagePackSerialize> MessagePackSerialize for BTreeMap<K, V> {
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
impl<K: MessagePackDeserialize + Ord, V: MessagePackDeserialize> MessagePackDeserialize
    for BTreeMap<K, V>
{
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_btree_map(None, unpacker, ctx)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        unpack_btree_map(Some(binding), unpacker, ctx)
    }

    fn member_default() -> Option<Self> {
        Some(BTreeMap::new())
    }
}

fn unpack_btree_map<K: MessagePackDeserialize + Ord, V: MessagePackDeserialize>(
    binding: Option<&MemberBinding>,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<BTreeMap<K, V>> {
    unpack_entries(
        binding,
        unpacker,
        ctx,
        |_| BTreeMap::new(),
        |map, k, v| {
            map.insert(k, v);
        },
    )
}

// --- Wrappers ---
/// `None` is written as nil.
impl<T: MessagePackSerialize> MessagePackSerialize for Option<T> {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        match self {
            Some(value) => value.pack_to(packer, ctx),
            None => {
                packer.pack_nil()?;
                Ok(())
            }
        }
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        match self {
            Some(value) => value.pack_with(binding, packer, ctx),
            None => {
                packer.pack_nil()?;
                Ok(())
            }
        }
    }

    fn is_nil(&self) -> bool {
        self.is_none()
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::wrapping(
            std::any::type_name::<Self>(),
            TypeCategory::Optional,
            T::type_facts(),
        )
    }
}
impl<T: MessagePackDeserialize> MessagePackDeserialize for Option<T> {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        if unpacker.try_read_nil()? {
            return Ok(None);
        }
        T::unpack_from(unpacker, ctx).map(Some)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        if unpacker.try_read_nil()? {
            return Ok(None);
        }
        T::unpack_with(binding, unpacker, ctx).map(Some)
    }

    fn nil_value() -> Option<Self> {
        Some(None)
    }

    fn member_default() -> Option<Self> {
        Some(None)
    }
}

macro_rules! impl_pointer {
    ($($ptr:ident),*) => {
        $(
            impl<T: MessagePackSerialize> MessagePackSerialize for $ptr<T> {
                fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
                    (**self).pack_to(packer, ctx)
                }

                fn pack_with(
                    &self,
                    binding: &MemberBinding,
                    packer: &mut Packer,
                    ctx: &SerializationContext,
                ) -> Result<()> {
                    (**self).pack_with(binding, packer, ctx)
                }

                fn is_nil(&self) -> bool {
                    (**self).is_nil()
                }

                fn type_facts() -> TypeFacts {
                    let inner = T::type_facts();
                    let category = match inner.category {
                        TypeCategory::Optional => TypeCategory::Optional,
                        _ => TypeCategory::Reference,
                    };
                    TypeFacts::wrapping(std::any::type_name::<Self>(), category, inner)
                }
            }
            impl<T: MessagePackDeserialize> MessagePackDeserialize for $ptr<T> {
                fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
                    T::unpack_from(unpacker, ctx).map($ptr::new)
                }

                fn unpack_with(
                    binding: &MemberBinding,
                    unpacker: &mut Unpacker,
                    ctx: &SerializationContext,
                ) -> Result<Self> {
                    T::unpack_with(binding, unpacker, ctx).map($ptr::new)
                }

                fn nil_value() -> Option<Self> {
                    T::nil_value().map($ptr::new)
                }

                fn member_default() -> Option<Self> {
                    T::member_default().map($ptr::new)
                }
            }
        )*
    };
}
impl_pointer!(Box, Arc);

// --- Dynamic values and extensions ---
/// A member of type [`WireValue`] accepts anything, including nil.
impl MessagePackSerialize for WireValue {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_value(self)?;
        Ok(())
    }

    fn is_nil(&self) -> bool {
        WireValue::is_nil(self)
    }

    fn type_facts() -> TypeFacts {
        TypeFacts {
            category: TypeCategory::Optional,
            ..TypeFacts::value("WireValue")
        }
    }
}
impl MessagePackDeserialize for WireValue {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_value()
    }

    fn nil_value() -> Option<Self> {
        Some(WireValue::Nil)
    }

    fn member_default() -> Option<Self> {
        Some(WireValue::Nil)
    }
}

impl MessagePackSerialize for ExtObject {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_ext_object(self)?;
        Ok(())
    }
}
impl MessagePackDeserialize for ExtObject {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        unpacker.read_ext()
    }
}

/// Encodes a timestamp as extension type -1.
impl MessagePackSerialize for Timestamp {
    fn pack_to(&self, packer: &mut Packer, _ctx: &SerializationContext) -> Result<()> {
        packer.pack_ext_object(&self.to_ext())?;
        Ok(())
    }
}
impl MessagePackDeserialize for Timestamp {
    fn unpack_from(unpacker: &mut Unpacker, _ctx: &SerializationContext) -> Result<Self> {
        let ext = unpacker.read_ext()?;
        Timestamp::from_ext(&ext)
    }

    fn member_default() -> Option<Self> {
        Some(Timestamp::UNIX_EPOCH)
    }
}
