//! Members typed by a trait object.
//!
//! A [`Polymorphic<dyn Trait>`] member is written in one of two forms, chosen when the owning
//! type is resolved:
//!
//! - tagged, `[type_tag, body]`, for runtime-tag and known-types members
//! - the bare body, for members whose abstract type has a registered default type
//!
//! Concrete types are registered on the context with
//! [`SerializationContext::register_subtype`] and
//! [`SerializationContext::register_default_type`]. A member reads the concrete types that
//! were registered when its owning type was resolved. A value outside any member reads the
//! context's current registrations.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::context::ConcreteTypes;
use crate::resolver::{MemberBinding, Polymorphism, TypeFacts};
use crate::{
    DecodeError, MessagePackDeserialize, MessagePackSerialize, Packer, Result,
    SerializationContext, Unpacker,
};

/// A concrete type that can travel behind a trait object.
///
/// Usually implemented with `#[msgpack(type_tag = "...")]`. Make it a supertrait of the
/// abstract trait so that `dyn Trait` can be packed.
pub trait TypeTagged {
    /// The tag written in front of the body.
    fn type_tag(&self) -> &'static str;

    /// Writes the concrete value without its tag.
    fn pack_body(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()>;
}

/// An owned trait object member.
pub struct Polymorphic<T: ?Sized>(pub Box<T>);

impl<T: ?Sized> Polymorphic<T> {
    pub fn new(value: Box<T>) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> Box<T> {
        self.0
    }
}

impl<T: ?Sized> Deref for Polymorphic<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> DerefMut for Polymorphic<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: ?Sized + TypeTagged> fmt::Debug for Polymorphic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Polymorphic({})", self.0.type_tag())
    }
}

fn pack_tagged<T: ?Sized + TypeTagged>(
    value: &T,
    packer: &mut Packer,
    ctx: &SerializationContext,
) -> Result<()> {
    packer.pack_array_header(2)?;
    packer.pack_str(value.type_tag())?;
    value.pack_body(packer, ctx)
}

/// Reads `[tag, body]`. With `types`, only the captured concrete types are accepted;
/// otherwise the context's current registrations are used.
fn unpack_tagged<T: ?Sized + 'static>(
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
    types: Option<&ConcreteTypes>,
) -> Result<Polymorphic<T>> {
    unpacker.nested(|unpacker| {
        let len = unpacker.read_array_len()?;
        if len != 2 {
            return Err(DecodeError::Malformed(format!(
                "a tagged value is a 2-element array, got {} elements",
                len
            ))
            .into());
        }
        let tag = unpacker.read_str()?;
        let value = match types {
            Some(types) => types.construct_tagged::<T>(&tag, unpacker, ctx)?,
            None => ctx.construct_subtype::<T>(&tag, unpacker)?,
        };
        value.map(Polymorphic).ok_or_else(|| {
            DecodeError::UnknownTypeTag {
                abstract_type: std::any::type_name::<T>(),
                tag,
            }
            .into()
        })
    })
}

/// Without a member binding, the tagged form is used.
impl<T: ?Sized + TypeTagged + 'static> MessagePackSerialize for Polymorphic<T> {
    fn pack_to(&self, packer: &mut Packer, ctx: &SerializationContext) -> Result<()> {
        pack_tagged(&*self.0, packer, ctx)
    }

    fn pack_with(
        &self,
        binding: &MemberBinding,
        packer: &mut Packer,
        ctx: &SerializationContext,
    ) -> Result<()> {
        match binding.polymorphism {
            Some(Polymorphism::RegisteredDefault) => self.0.pack_body(packer, ctx),
            _ => self.pack_to(packer, ctx),
        }
    }

    fn type_facts() -> TypeFacts {
        TypeFacts::abstract_of::<T>(std::any::type_name::<Self>())
    }
}

impl<T: ?Sized + 'static> MessagePackDeserialize for Polymorphic<T> {
    fn unpack_from(unpacker: &mut Unpacker, ctx: &SerializationContext) -> Result<Self> {
        unpack_tagged(unpacker, ctx, None)
    }

    fn unpack_with(
        binding: &MemberBinding,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Self> {
        let types = binding.concrete_types.as_ref();
        match (&binding.polymorphism, types) {
            (Some(Polymorphism::RegisteredDefault), Some(types)) => {
                match types.construct_default::<T>(unpacker, ctx)? {
                    Some(value) => Ok(Polymorphic(value)),
                    None => Err(DecodeError::UnknownTypeTag {
                        abstract_type: std::any::type_name::<T>(),
                        tag: String::new(),
                    }
                    .into()),
                }
            }
            _ => unpack_tagged(unpacker, ctx, types),
        }
    }
}
