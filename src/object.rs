//! Structured objects: the [`MessagePackObject`] trait and the helpers generated code uses
//! to walk a resolved member table.
//!
//! Versioning rules:
//!
//! - Array form: a short array leaves trailing members absent; extra elements are skipped,
//!   or captured by position when the type has an extension-data slot.
//! - Map form: unknown keys are skipped or captured; a repeated key overwrites the earlier
//!   value (last wins).
//! - Absent members resolve through their nil implication.
//! - Either wire form is accepted regardless of the type's own shape. A map is matched
//!   by member name (or array position for integer keys), an array by position.
//! - Captured members are written back in the form they were read in, so a type that
//!   keeps extension data loses nothing when it repacks a payload of the other shape.

use crate::resolver::{
    MemberBinding, NilImplication, ObjectLayout, SerializerDescriptor, TypeShape, WireShape,
};
use crate::unpacker::Header;
use crate::{
    DecodeError, EncodingError, MessagePackDeserialize, MessagePackSerialize, Packer, Result,
    SerializationContext, Unpacker, WireValue,
};

/// A structured type described by a [`TypeShape`]. Usually derived.
pub trait MessagePackObject: 'static {
    fn shape() -> TypeShape;
}

/// Members read from the wire that the type does not know, kept so they can be written back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionData {
    /// Array elements beyond (or between) the known positions.
    pub positional: Vec<(usize, WireValue)>,
    /// Map entries with unknown keys.
    pub keyed: Vec<(WireValue, WireValue)>,
}

impl ExtensionData {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyed.len()
    }

    fn positional_at(&self, position: usize) -> Option<&WireValue> {
        self.positional
            .iter()
            .find(|(p, _)| *p == position)
            .map(|(_, v)| v)
    }
}

fn layout_of(descriptor: &SerializerDescriptor) -> Result<&ObjectLayout> {
    descriptor.layout().ok_or_else(|| {
        DecodeError::Malformed(format!(
            "{} has no structural member table",
            descriptor.type_name
        ))
        .into()
    })
}

/// Writes an object's members in the descriptor's wire shape.
///
/// `pack` is called once per included member, in wire order. Array gaps are written as nil.
/// Captured extension data is written back in the form it was read in:
///
/// - positional captures alone keep (or switch to) the array form, at their positions
/// - keyed captures switch an array-shape type to the map form
/// - when both kinds are present, the map form is used and positional captures are keyed
///   by their position
pub fn pack_members<F>(
    packer: &mut Packer,
    descriptor: &SerializerDescriptor,
    extension: Option<&ExtensionData>,
    pack: F,
) -> Result<()>
where
    F: FnMut(&MemberBinding, &mut Packer) -> Result<()>,
{
    let layout = layout_of(descriptor)?;
    let empty = ExtensionData::default();
    let ext = extension.unwrap_or(&empty);
    let as_array = match layout.shape {
        WireShape::Array => ext.keyed.is_empty(),
        WireShape::Map => ext.keyed.is_empty() && !ext.positional.is_empty(),
    };
    if as_array {
        pack_array_form(packer, layout, ext, pack)
    } else {
        pack_map_form(packer, layout, ext, pack)
    }
}

fn pack_array_form<F>(
    packer: &mut Packer,
    layout: &ObjectLayout,
    ext: &ExtensionData,
    mut pack: F,
) -> Result<()>
where
    F: FnMut(&MemberBinding, &mut Packer) -> Result<()>,
{
    // A map-shape type read from an array holds its members at their declaration order.
    let known_len = match layout.shape {
        WireShape::Array => layout.array_len(),
        WireShape::Map => layout.bindings.len(),
    };
    let extra_end = ext.positional.iter().map(|(p, _)| p + 1).max().unwrap_or(0);
    let len = known_len.max(extra_end);
    packer.pack_array_header(len)?;
    for position in 0..len {
        let known = match layout.shape {
            WireShape::Array => layout.by_position.get(position).copied().flatten(),
            WireShape::Map => (position < layout.bindings.len()).then_some(position),
        };
        match known {
            Some(index) => pack(&layout.bindings[index], packer)?,
            None => match ext.positional_at(position) {
                Some(value) => {
                    packer.pack_value(value)?;
                }
                None => {
                    packer.pack_nil()?;
                }
            },
        }
    }
    Ok(())
}

fn pack_map_form<F>(
    packer: &mut Packer,
    layout: &ObjectLayout,
    ext: &ExtensionData,
    mut pack: F,
) -> Result<()>
where
    F: FnMut(&MemberBinding, &mut Packer) -> Result<()>,
{
    packer.pack_map_header(layout.bindings.len() + ext.len())?;
    for binding in &layout.bindings {
        packer.pack_str(binding.name_on_wire())?;
        pack(binding, packer)?;
    }
    for (k, v) in &ext.keyed {
        packer.pack_value(k)?;
        packer.pack_value(v)?;
    }
    for (position, v) in &ext.positional {
        packer.pack_u64(*position as u64)?;
        packer.pack_value(v)?;
    }
    Ok(())
}

/// Reads an object's members from either wire form.
///
/// `unpack` is called for each known member present on the wire. Unknown members are
/// captured into `extension` when given, and skipped otherwise.
pub fn unpack_members<F>(
    unpacker: &mut Unpacker,
    descriptor: &SerializerDescriptor,
    mut extension: Option<&mut ExtensionData>,
    mut unpack: F,
) -> Result<()>
where
    F: FnMut(&MemberBinding, &mut Unpacker) -> Result<()>,
{
    let layout = layout_of(descriptor)?;
    let owner = descriptor.type_name;
    unpacker.nested(|unpacker| {
        let (header, _) = unpacker.peek_header()?;
        match header {
            Header::Array(_) => {
                let len = unpacker.read_array_len()?;
                for position in 0..len {
                    let known = match layout.shape {
                        WireShape::Array => layout.by_position.get(position).copied().flatten(),
                        WireShape::Map => (position < layout.bindings.len()).then_some(position),
                    };
                    match known {
                        Some(index) => unpack(&layout.bindings[index], unpacker)?,
                        None => match extension.as_deref_mut() {
                            Some(ext) => {
                                let value = unpacker.read_value()?;
                                ext.positional.push((position, value));
                            }
                            None => {
                                log::trace!("{}: discarding unknown element at {}", owner, position);
                                unpacker.skip_value()?;
                            }
                        },
                    }
                }
            }
            Header::Map(_) => {
                let len = unpacker.read_map_len()?;
                for _ in 0..len {
                    let key = unpacker.read_value()?;
                    let index = match &key {
                        WireValue::Str(_) => key
                            .as_str()
                            .and_then(|name| layout.by_name.get(name).copied()),
                        WireValue::UInt(_) | WireValue::Int(_) => key
                            .as_u64()
                            .and_then(|p| layout.by_position.get(p as usize).copied().flatten()),
                        _ => None,
                    };
                    match index {
                        Some(index) => unpack(&layout.bindings[index], unpacker)?,
                        None => match extension.as_deref_mut() {
                            Some(ext) => {
                                let value = unpacker.read_value()?;
                                ext.keyed.push((key, value));
                            }
                            None => {
                                log::trace!("{}: discarding unknown member {}", owner, key);
                                unpacker.skip_value()?;
                            }
                        },
                    }
                }
            }
            other => {
                return Err(DecodeError::TypeMismatch {
                    expected: "array or map",
                    found: other.kind_name(),
                }
                .into())
            }
        }
        Ok(())
    })
}

/// Writes one member, refusing nil under `Prohibit`.
pub fn pack_member<M: MessagePackSerialize>(
    value: &M,
    binding: &MemberBinding,
    packer: &mut Packer,
    ctx: &SerializationContext,
) -> Result<()> {
    if binding.nil_implication == NilImplication::Prohibit && value.is_nil() {
        return Err(EncodingError::NilProhibited {
            type_name: binding.owner,
            member: binding.name,
        }
        .into());
    }
    value.pack_with(binding, packer, ctx)
}

/// The value a nil or absent member takes under its nil implication.
fn nil_outcome<M: MessagePackDeserialize>(binding: &MemberBinding) -> Result<M> {
    let outcome = match binding.nil_implication {
        NilImplication::MemberDefault => M::member_default(),
        NilImplication::Null => M::nil_value(),
        NilImplication::Prohibit => None,
    };
    outcome.ok_or_else(|| {
        DecodeError::UnexpectedNil {
            type_name: binding.owner,
            member: binding.name,
        }
        .into()
    })
}

/// Reads one member into its slot. A later occurrence overwrites an earlier one.
pub fn unpack_member<M: MessagePackDeserialize>(
    slot: &mut Option<M>,
    binding: &MemberBinding,
    unpacker: &mut Unpacker,
    ctx: &SerializationContext,
) -> Result<()> {
    let value = if unpacker.try_read_nil()? {
        nil_outcome(binding)?
    } else {
        M::unpack_with(binding, unpacker, ctx)?
    };
    *slot = Some(value);
    Ok(())
}

/// Takes a member's final value. Absent members resolve through the nil implication.
pub fn finish_member<M: MessagePackDeserialize>(
    slot: Option<M>,
    descriptor: &SerializerDescriptor,
    member_index: usize,
) -> Result<M> {
    if let Some(value) = slot {
        return Ok(value);
    }
    match descriptor.binding(member_index) {
        Some(binding) => nil_outcome(binding),
        None => M::member_default().ok_or_else(|| {
            DecodeError::Malformed(format!(
                "{} has no binding for member {}",
                descriptor.type_name, member_index
            ))
            .into()
        }),
    }
}
