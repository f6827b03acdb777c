//! Serializer resolution.
//!
//! A [`TypeShape`] is the declarative description of a type: its members, their keys and
//! nil policies, and the ways it can be constructed. Resolution turns a shape into a
//! [`SerializerDescriptor`] exactly once per type and context. The descriptor is the table
//! the generated pack/unpack code dispatches on; it never re-inspects the shape.
//!
//! Decision order:
//!
//! 1. Scalar, sequence and dictionary shapes use the built-in binding.
//! 2. A type with a custom hook uses it, even when it also describes members.
//! 3. Otherwise the member keys decide the wire shape (array or map), each member gets a nil
//!    implication, a constructor is chosen, abstract members get a polymorphism strategy,
//!    and nested object types are resolved eagerly.
//!
//! Any failure is raised at first use and cached as permanent for the type.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::object::MessagePackObject;
use crate::context::ConcreteTypes;
use crate::{ResolutionError, SerializationContext};

/// What kind of value a type is on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Scalar,
    Sequence,
    Dictionary,
    Object,
}

/// How an object's members are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationMethod {
    /// Positional. More compact; member order is part of the wire contract.
    #[default]
    Array,
    /// Keyed by member name. Tolerates added and removed members.
    Map,
}

/// How a member type behaves with respect to nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    /// A plain value that cannot be nil.
    Value,
    /// An explicit optional wrapper that can hold nil.
    Optional,
    /// An owned heap value (strings, collections, objects).
    Reference,
}

/// The per-member rule for wire nil and for absent members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NilImplication {
    /// Nil or absence decodes to the member type's default value.
    MemberDefault,
    /// Nil decodes to the member type's own nil (`None`). Only for optional members.
    Null,
    /// Nil or absence is an error, and so is packing a nil value.
    Prohibit,
}

/// An explicit member key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKey {
    Index(u32),
    Name(&'static str),
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKey::Index(i) => write!(f, "{}", i),
            MemberKey::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}

/// A nested object type a member may contain.
#[derive(Debug, Clone, Copy)]
pub struct ObjectRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub shape: fn() -> TypeShape,
}

impl ObjectRef {
    pub fn of<T: MessagePackObject>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            shape: T::shape,
        }
    }
}

/// An abstract (trait object) type a member holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbstractRef {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl AbstractRef {
    pub fn of<A: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
        }
    }
}

/// What the resolver needs to know about a member's type.
#[derive(Debug, Clone)]
pub struct TypeFacts {
    pub type_name: &'static str,
    pub category: TypeCategory,
    /// Object types reachable through this type, resolved eagerly with the owner.
    pub objects: Vec<ObjectRef>,
    pub abstract_type: Option<AbstractRef>,
}

impl TypeFacts {
    pub fn value(type_name: &'static str) -> Self {
        Self {
            type_name,
            category: TypeCategory::Value,
            objects: Vec::new(),
            abstract_type: None,
        }
    }

    pub fn reference(type_name: &'static str) -> Self {
        Self {
            category: TypeCategory::Reference,
            ..Self::value(type_name)
        }
    }

    pub fn object<T: MessagePackObject>() -> Self {
        Self {
            objects: vec![ObjectRef::of::<T>()],
            ..Self::reference(std::any::type_name::<T>())
        }
    }

    pub fn abstract_of<A: ?Sized + 'static>(type_name: &'static str) -> Self {
        Self {
            abstract_type: Some(AbstractRef::of::<A>()),
            ..Self::reference(type_name)
        }
    }

    /// Facts of a container of `inner`: nested objects and abstract types carry over.
    pub fn wrapping(type_name: &'static str, category: TypeCategory, inner: TypeFacts) -> Self {
        Self {
            type_name,
            category,
            objects: inner.objects,
            abstract_type: inner.abstract_type,
        }
    }

    /// Facts of a container of several element types, such as a map or a tuple.
    pub fn combining(
        type_name: &'static str,
        category: TypeCategory,
        parts: impl IntoIterator<Item = TypeFacts>,
    ) -> Self {
        let mut facts = Self {
            category,
            ..Self::value(type_name)
        };
        for part in parts {
            facts.objects.extend(part.objects);
            facts.abstract_type = facts.abstract_type.or(part.abstract_type);
        }
        facts
    }
}

/// One member as declared.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub name: &'static str,
    pub key: Option<MemberKey>,
    pub ignored: bool,
    pub nil: Option<NilImplication>,
    /// Whether the member can be assigned after construction.
    pub settable: bool,
    pub facts: TypeFacts,
    pub known_types: Vec<&'static str>,
    pub runtime_type: bool,
}

impl MemberInfo {
    pub fn new(name: &'static str, facts: TypeFacts) -> Self {
        Self {
            name,
            key: None,
            ignored: false,
            nil: None,
            settable: true,
            facts,
            known_types: Vec::new(),
            runtime_type: false,
        }
    }

    pub fn with_key(mut self, key: MemberKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_nil(mut self, nil: NilImplication) -> Self {
        self.nil = Some(nil);
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.settable = false;
        self
    }

    pub fn with_known_types(mut self, tags: &[&'static str]) -> Self {
        self.known_types = tags.to_vec();
        self
    }

    pub fn with_runtime_type(mut self) -> Self {
        self.runtime_type = true;
        self
    }
}

/// A constructor, described by its parameter names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorInfo {
    pub params: Vec<&'static str>,
}

impl ConstructorInfo {
    pub fn new(params: &[&'static str]) -> Self {
        Self {
            params: params.to_vec(),
        }
    }
}

/// The declarative description of a type.
#[derive(Debug, Clone)]
pub struct TypeShape {
    pub type_name: &'static str,
    pub kind: ShapeKind,
    pub custom_hook: bool,
    pub members: Vec<MemberInfo>,
    pub constructors: Vec<ConstructorInfo>,
    pub default_constructor: bool,
    pub extension_data: bool,
    /// Overrides the context's method when no member has an explicit key.
    pub method: Option<SerializationMethod>,
}

impl TypeShape {
    pub fn new(type_name: &'static str, kind: ShapeKind) -> Self {
        Self {
            type_name,
            kind,
            custom_hook: false,
            members: Vec::new(),
            constructors: Vec::new(),
            default_constructor: false,
            extension_data: false,
            method: None,
        }
    }

    pub fn object(type_name: &'static str) -> Self {
        Self::new(type_name, ShapeKind::Object)
    }

    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorInfo) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn with_default_constructor(mut self) -> Self {
        self.default_constructor = true;
        self
    }

    pub fn with_custom_hook(mut self) -> Self {
        self.custom_hook = true;
        self
    }

    pub fn with_extension_data(mut self) -> Self {
        self.extension_data = true;
        self
    }

    pub fn with_method(mut self, method: SerializationMethod) -> Self {
        self.method = Some(method);
        self
    }
}

/// How an abstract member finds its concrete type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polymorphism {
    /// Written as `[tag, body]`; any registered tag is accepted.
    RuntimeTag,
    /// Written as `[tag, body]`; only the listed tags are accepted.
    KnownTypes(Vec<&'static str>),
    /// Written as the bare body and read as the registered default type.
    RegisteredDefault,
}

/// The resolved binding of one member.
#[derive(Debug, Clone)]
pub struct MemberBinding {
    /// Index of the member in its [`TypeShape`], used by generated code for dispatch.
    pub member_index: usize,
    pub owner: &'static str,
    pub name: &'static str,
    pub key: MemberKey,
    pub nil_implication: NilImplication,
    /// Handles of the nested object descriptors in the owning context's cache.
    pub nested: Vec<TypeId>,
    pub polymorphism: Option<Polymorphism>,
    /// Concrete types of a polymorphic member, as registered when the owner was resolved.
    pub concrete_types: Option<ConcreteTypes>,
    pub constructor_param: bool,
}

impl MemberBinding {
    /// The map key of this member.
    pub fn name_on_wire(&self) -> &'static str {
        match self.key {
            MemberKey::Name(name) => name,
            MemberKey::Index(_) => self.name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireShape {
    Array,
    Map,
}

/// How instances are rebuilt on unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Construction {
    /// The constructor at `index`, fed the members at `params` (member indices).
    Constructor { index: usize, params: Vec<usize> },
    /// The no-argument constructor, then every member is set.
    DefaultThenSet,
}

/// The resolved member table of an object type.
#[derive(Debug, Clone)]
pub struct ObjectLayout {
    pub shape: WireShape,
    /// Included members in wire order.
    pub bindings: Vec<MemberBinding>,
    /// Array position to binding index. Gaps are `None` and travel as nil.
    pub by_position: Vec<Option<usize>>,
    /// Wire name to binding index, used for map keys in either shape.
    pub by_name: HashMap<&'static str, usize>,
    /// Declared member index to binding index. Ignored members are `None`.
    pub by_member: Vec<Option<usize>>,
    pub construction: Construction,
    pub extension_data: bool,
}

impl ObjectLayout {
    pub fn array_len(&self) -> usize {
        self.by_position.len()
    }
}

#[derive(Debug, Clone)]
pub enum DescriptorKind {
    BuiltIn,
    Custom,
    Object(ObjectLayout),
}

/// The cached result of resolving one type.
#[derive(Debug, Clone)]
pub struct SerializerDescriptor {
    pub type_name: &'static str,
    pub kind: DescriptorKind,
}

impl SerializerDescriptor {
    pub fn layout(&self) -> Option<&ObjectLayout> {
        match &self.kind {
            DescriptorKind::Object(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.kind, DescriptorKind::Custom)
    }

    /// The binding of the member declared at `member_index`, unless it is ignored.
    pub fn binding(&self, member_index: usize) -> Option<&MemberBinding> {
        let layout = self.layout()?;
        let index = layout.by_member.get(member_index).copied().flatten()?;
        layout.bindings.get(index)
    }

    /// How instances of an object type are rebuilt.
    pub fn construction(&self) -> Option<&Construction> {
        self.layout().map(|layout| &layout.construction)
    }

    pub fn wire_shape(&self) -> Option<WireShape> {
        self.layout().map(|layout| layout.shape)
    }
}

/// Resolves shapes against one context, tracking the types currently being resolved.
pub(crate) struct Resolver<'a> {
    ctx: &'a SerializationContext,
    in_progress: Vec<TypeId>,
}

type Resolved = std::result::Result<Arc<SerializerDescriptor>, ResolutionError>;

impl<'a> Resolver<'a> {
    pub(crate) fn new(ctx: &'a SerializationContext) -> Self {
        Self {
            ctx,
            in_progress: Vec::new(),
        }
    }

    /// Returns the cached descriptor of `object`, resolving and caching it first if needed.
    pub(crate) fn resolve(&mut self, object: ObjectRef) -> Resolved {
        if let Some(cached) = self.ctx.cached(object.type_id) {
            log::trace!("serializer cache hit for {}", object.type_name);
            return cached;
        }
        self.in_progress.push(object.type_id);
        let shape = (object.shape)();
        log::debug!("resolving serializer for {}", shape.type_name);
        let result = self.build(&shape).map(Arc::new);
        self.in_progress.pop();
        if let Err(e) = &result {
            log::warn!("serializer resolution failed for {}: {}", shape.type_name, e);
        }
        self.ctx.cache_insert(object.type_id, result)
    }

    fn build(&mut self, shape: &TypeShape) -> std::result::Result<SerializerDescriptor, ResolutionError> {
        let kind = match shape.kind {
            ShapeKind::Scalar | ShapeKind::Sequence | ShapeKind::Dictionary => DescriptorKind::BuiltIn,
            ShapeKind::Object if shape.custom_hook => DescriptorKind::Custom,
            ShapeKind::Object => DescriptorKind::Object(self.build_object(shape)?),
        };
        Ok(SerializerDescriptor {
            type_name: shape.type_name,
            kind,
        })
    }

    fn build_object(&mut self, shape: &TypeShape) -> std::result::Result<ObjectLayout, ResolutionError> {
        let type_name = shape.type_name;
        let included: Vec<(usize, &MemberInfo)> = shape
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                if m.ignored {
                    log::trace!("{}: member '{}' is ignored", type_name, m.name);
                }
                !m.ignored
            })
            .collect();

        let (wire_shape, keys) = self.assign_keys(shape, &included)?;
        let construction = choose_construction(shape, &included)?;
        let constructor_params: Vec<usize> = match &construction {
            Construction::Constructor { params, .. } => params.clone(),
            Construction::DefaultThenSet => Vec::new(),
        };

        let mut bindings = Vec::with_capacity(included.len());
        for ((member_index, member), key) in included.iter().zip(keys) {
            let nil_implication = self.nil_implication(type_name, member)?;
            let (polymorphism, concrete_types) = match self.polymorphism(type_name, member)? {
                Some((polymorphism, types)) => (Some(polymorphism), Some(types)),
                None => (None, None),
            };
            let mut nested = Vec::new();
            for object in &member.facts.objects {
                if !self.in_progress.contains(&object.type_id) {
                    self.resolve(*object)?;
                }
                nested.push(object.type_id);
            }
            bindings.push(MemberBinding {
                member_index: *member_index,
                owner: type_name,
                name: member.name,
                key,
                nil_implication,
                nested,
                polymorphism,
                concrete_types,
                constructor_param: constructor_params.contains(member_index),
            });
        }

        if wire_shape == WireShape::Array {
            bindings.sort_by_key(|b| match b.key {
                MemberKey::Index(i) => i,
                MemberKey::Name(_) => u32::MAX,
            });
        }
        let mut by_position = Vec::new();
        let mut by_name = HashMap::with_capacity(bindings.len());
        let mut by_member = vec![None; shape.members.len()];
        for (i, binding) in bindings.iter().enumerate() {
            by_member[binding.member_index] = Some(i);
            match binding.key {
                MemberKey::Index(position) => {
                    let position = position as usize;
                    if by_position.len() <= position {
                        by_position.resize(position + 1, None);
                    }
                    by_position[position] = Some(i);
                    by_name.insert(binding.name, i);
                }
                MemberKey::Name(name) => {
                    by_name.insert(name, i);
                }
            }
        }

        log::debug!(
            "{} resolved as {:?} shape with {} member(s)",
            type_name,
            wire_shape,
            bindings.len()
        );
        Ok(ObjectLayout {
            shape: wire_shape,
            bindings,
            by_position,
            by_name,
            by_member,
            construction,
            extension_data: shape.extension_data,
        })
    }

    /// Decides the wire shape and the final key of every included member.
    fn assign_keys(
        &self,
        shape: &TypeShape,
        included: &[(usize, &MemberInfo)],
    ) -> std::result::Result<(WireShape, Vec<MemberKey>), ResolutionError> {
        let type_name = shape.type_name;
        let keyed = included.iter().filter(|(_, m)| m.key.is_some()).count();
        if keyed == 0 {
            let method = shape.method.unwrap_or(self.ctx.options().method);
            let keys = match method {
                SerializationMethod::Array => (0..included.len() as u32).map(MemberKey::Index).collect(),
                SerializationMethod::Map => included.iter().map(|(_, m)| MemberKey::Name(m.name)).collect(),
            };
            let wire_shape = match method {
                SerializationMethod::Array => WireShape::Array,
                SerializationMethod::Map => WireShape::Map,
            };
            return Ok((wire_shape, keys));
        }
        if let Some((_, unkeyed)) = included.iter().find(|(_, m)| m.key.is_none()) {
            return Err(ResolutionError::PartialMemberOrder {
                type_name,
                member: unkeyed.name,
            });
        }

        let keys: Vec<MemberKey> = included.iter().filter_map(|(_, m)| m.key).collect();
        let indexed = keys.iter().filter(|k| matches!(k, MemberKey::Index(_))).count();
        let wire_shape = if indexed == keys.len() {
            WireShape::Array
        } else if indexed == 0 {
            WireShape::Map
        } else {
            return Err(ResolutionError::MixedMemberKeys { type_name });
        };
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].contains(key) {
                return Err(ResolutionError::DuplicateMemberKey {
                    type_name,
                    key: key.to_string(),
                });
            }
        }
        Ok((wire_shape, keys))
    }

    fn nil_implication(
        &self,
        type_name: &'static str,
        member: &MemberInfo,
    ) -> std::result::Result<NilImplication, ResolutionError> {
        let category = member.facts.category;
        match member.nil {
            Some(NilImplication::Null) if category != TypeCategory::Optional => {
                Err(ResolutionError::InvalidNilImplication {
                    type_name,
                    member: member.name,
                })
            }
            Some(explicit) => Ok(explicit),
            None => Ok(match category {
                TypeCategory::Value => NilImplication::Prohibit,
                TypeCategory::Optional => NilImplication::Null,
                TypeCategory::Reference => match self.ctx.options().default_nil {
                    // References cannot hold nil, so the context-wide Null falls back.
                    NilImplication::Null => NilImplication::MemberDefault,
                    other => other,
                },
            }),
        }
    }

    /// The strategy of an abstract member and the concrete types it may be read as.
    fn polymorphism(
        &self,
        type_name: &'static str,
        member: &MemberInfo,
    ) -> std::result::Result<Option<(Polymorphism, ConcreteTypes)>, ResolutionError> {
        let abstract_type = match member.facts.abstract_type {
            Some(abstract_type) => abstract_type,
            None => return Ok(None),
        };
        let registered = self.ctx.concrete_types(abstract_type.type_id);
        if member.runtime_type {
            return Ok(Some((Polymorphism::RuntimeTag, registered)));
        }
        if !member.known_types.is_empty() {
            if let Some(missing) = member.known_types.iter().find(|tag| !registered.has_tag(tag)) {
                return Err(ResolutionError::Unconstructable {
                    type_name,
                    reason: format!(
                        "known type '{}' of member '{}' is not registered for {}",
                        missing, member.name, abstract_type.type_name
                    ),
                });
            }
            return Ok(Some((
                Polymorphism::KnownTypes(member.known_types.clone()),
                registered.restrict_to(&member.known_types),
            )));
        }
        if registered.has_default() {
            return Ok(Some((Polymorphism::RegisteredDefault, registered.default_only())));
        }
        Err(ResolutionError::UnresolvableAbstractType {
            type_name,
            member: member.name,
        })
    }
}

/// Picks the constructor whose parameters cover the included members.
///
/// A constructor matches when every parameter names an included member and every included
/// member that cannot be set after construction is a parameter. Names compare
/// case-insensitively.
fn choose_construction(
    shape: &TypeShape,
    included: &[(usize, &MemberInfo)],
) -> std::result::Result<Construction, ResolutionError> {
    let type_name = shape.type_name;
    let find = |param: &str| {
        included
            .iter()
            .find(|(_, m)| m.name.eq_ignore_ascii_case(param))
            .map(|(i, _)| *i)
    };

    let mut candidates = Vec::new();
    for (index, constructor) in shape.constructors.iter().enumerate() {
        let params: Option<Vec<usize>> = constructor.params.iter().map(|p| find(p)).collect();
        let Some(params) = params else { continue };
        let covers_read_only = included
            .iter()
            .all(|(i, m)| m.settable || params.contains(i));
        if covers_read_only {
            candidates.push(Construction::Constructor { index, params });
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => {
            if !shape.default_constructor {
                return Err(ResolutionError::Unconstructable {
                    type_name,
                    reason: "no constructor matches its members and it has no default constructor"
                        .to_string(),
                });
            }
            if let Some((_, member)) = included.iter().find(|(_, m)| !m.settable) {
                return Err(ResolutionError::Unconstructable {
                    type_name,
                    reason: format!(
                        "member '{}' is not settable and no constructor takes it",
                        member.name
                    ),
                });
            }
            Ok(Construction::DefaultThenSet)
        }
        n => Err(ResolutionError::AmbiguousConstructor {
            type_name,
            candidates: n,
        }),
    }
}
