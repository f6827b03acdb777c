//! The serialization context: options, the resolved-serializer cache and the type registry.
//!
//! A context is cheap to clone and safe to share between threads. Several independently
//! configured contexts may coexist; [`SerializationContext::shared_default`] is only a
//! convenience for the free functions at the crate root.

use bytes::Bytes;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::{Arc, OnceLock, RwLock};

use crate::object::MessagePackObject;
use crate::resolver::{ObjectRef, Resolver};
use crate::{
    CompatibilityMode, MessagePackDeserialize, MessagePackSerialize, NilImplication, Packer,
    ResolutionError, Result, SerializationMethod, SerializerDescriptor, StreamUnpacker,
    Unpacker, UnpackingLimits,
};

/// Context-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    pub compatibility: CompatibilityMode,
    /// Nil implication of reference-typed members without an explicit policy.
    pub default_nil: NilImplication,
    /// Wire shape of objects whose members carry no explicit keys.
    pub method: SerializationMethod,
    pub limits: UnpackingLimits,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            compatibility: CompatibilityMode::Modern,
            default_nil: NilImplication::MemberDefault,
            method: SerializationMethod::Array,
            limits: UnpackingLimits::default(),
        }
    }
}

impl ContextOptions {
    pub fn with_compatibility(mut self, compatibility: CompatibilityMode) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn with_default_nil(mut self, default_nil: NilImplication) -> Self {
        self.default_nil = default_nil;
        self
    }

    pub fn with_method(mut self, method: SerializationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_limits(mut self, limits: UnpackingLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Builds a boxed concrete value for an abstract type. The `Box<dyn Any>` holds a `Box<A>`.
pub(crate) type Factory =
    Arc<dyn Fn(&mut Unpacker, &SerializationContext) -> Result<Box<dyn Any>> + Send + Sync>;

type Resolved = std::result::Result<Arc<SerializerDescriptor>, ResolutionError>;

#[derive(Default)]
struct Registry {
    defaults: HashMap<TypeId, Factory>,
    subtypes: HashMap<TypeId, HashMap<String, Factory>>,
}

struct ContextInner {
    options: ContextOptions,
    cache: RwLock<HashMap<TypeId, Resolved>>,
    registry: RwLock<Registry>,
}

/// Shared handle to one serialization configuration and its caches.
#[derive(Clone)]
pub struct SerializationContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for SerializationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializationContext")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl Default for SerializationContext {
    fn default() -> Self {
        Self::new(ContextOptions::default())
    }
}

/// The concrete types a polymorphic member reads, captured when its owner is resolved.
///
/// Registrations made after resolution do not reach members that were already resolved.
#[derive(Clone, Default)]
pub struct ConcreteTypes {
    default: Option<Factory>,
    tagged: HashMap<String, Factory>,
}

impl std::fmt::Debug for ConcreteTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tags: Vec<&str> = self.tagged.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("ConcreteTypes")
            .field("default", &self.default.is_some())
            .field("tags", &tags)
            .finish()
    }
}

impl ConcreteTypes {
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tagged.contains_key(tag)
    }

    /// Keeps only the listed tags and drops the default type.
    pub(crate) fn restrict_to(mut self, tags: &[&'static str]) -> Self {
        self.tagged.retain(|tag, _| tags.contains(&tag.as_str()));
        self.default = None;
        self
    }

    /// Drops the tagged types.
    pub(crate) fn default_only(mut self) -> Self {
        self.tagged.clear();
        self
    }

    /// Reads the type captured under `tag`. `None` if the tag is not among them.
    pub(crate) fn construct_tagged<A: ?Sized + 'static>(
        &self,
        tag: &str,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Option<Box<A>>> {
        match self.tagged.get(tag) {
            Some(factory) => Ok(downcast::<A>(factory(unpacker, ctx)?)),
            None => Ok(None),
        }
    }

    /// Reads the captured default type. `None` if there is none.
    pub(crate) fn construct_default<A: ?Sized + 'static>(
        &self,
        unpacker: &mut Unpacker,
        ctx: &SerializationContext,
    ) -> Result<Option<Box<A>>> {
        match &self.default {
            Some(factory) => Ok(downcast::<A>(factory(unpacker, ctx)?)),
            None => Ok(None),
        }
    }
}

fn make_factory<A, C>(upcast: fn(C) -> Box<A>) -> Factory
where
    A: ?Sized + 'static,
    C: MessagePackDeserialize + 'static,
{
    Arc::new(
        move |unpacker: &mut Unpacker, ctx: &SerializationContext| -> Result<Box<dyn Any>> {
            let concrete = C::unpack_from(unpacker, ctx)?;
            Ok(Box::new(upcast(concrete)))
        },
    )
}

fn downcast<A: ?Sized + 'static>(built: Box<dyn Any>) -> Option<Box<A>> {
    built.downcast::<Box<A>>().ok().map(|boxed| *boxed)
}

impl SerializationContext {
    pub fn new(options: ContextOptions) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                options,
                cache: RwLock::new(HashMap::new()),
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    /// The process-wide context with default options.
    pub fn shared_default() -> &'static SerializationContext {
        static SHARED: OnceLock<SerializationContext> = OnceLock::new();
        SHARED.get_or_init(SerializationContext::default)
    }

    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// Registers `C` under `tag` as a concrete type of the abstract type `A`.
    ///
    /// Registrations are configuration: make them before the first serialization. Members of
    /// types that were already resolved keep the concrete types they saw at resolution.
    pub fn register_subtype<A, C>(&self, tag: impl Into<String>, upcast: fn(C) -> Box<A>)
    where
        A: ?Sized + 'static,
        C: MessagePackDeserialize + 'static,
    {
        let tag = tag.into();
        log::debug!(
            "registering {} as '{}' for {}",
            std::any::type_name::<C>(),
            tag,
            std::any::type_name::<A>()
        );
        let mut registry = self.inner.registry.write().unwrap_or_else(|e| e.into_inner());
        registry
            .subtypes
            .entry(TypeId::of::<A>())
            .or_default()
            .insert(tag, make_factory(upcast));
    }

    /// Registers `C` as the concrete type used for untagged values of the abstract type `A`.
    pub fn register_default_type<A, C>(&self, upcast: fn(C) -> Box<A>)
    where
        A: ?Sized + 'static,
        C: MessagePackDeserialize + 'static,
    {
        log::debug!(
            "registering {} as the default type for {}",
            std::any::type_name::<C>(),
            std::any::type_name::<A>()
        );
        let mut registry = self.inner.registry.write().unwrap_or_else(|e| e.into_inner());
        registry
            .defaults
            .insert(TypeId::of::<A>(), make_factory(upcast));
    }

    /// A snapshot of the concrete types registered for `abstract_type`.
    pub(crate) fn concrete_types(&self, abstract_type: TypeId) -> ConcreteTypes {
        let registry = self.inner.registry.read().unwrap_or_else(|e| e.into_inner());
        ConcreteTypes {
            default: registry.defaults.get(&abstract_type).cloned(),
            tagged: registry.subtypes.get(&abstract_type).cloned().unwrap_or_default(),
        }
    }

    /// Reads the concrete type currently registered under `tag` for `A`. `None` if the tag
    /// is unknown. Used for values that are not members of a resolved type.
    pub(crate) fn construct_subtype<A: ?Sized + 'static>(
        &self,
        tag: &str,
        unpacker: &mut Unpacker,
    ) -> Result<Option<Box<A>>> {
        let factory = {
            let registry = self.inner.registry.read().unwrap_or_else(|e| e.into_inner());
            registry
                .subtypes
                .get(&TypeId::of::<A>())
                .and_then(|tags| tags.get(tag))
                .cloned()
        };
        match factory {
            Some(factory) => Ok(downcast::<A>(factory(unpacker, self)?)),
            None => Ok(None),
        }
    }

    /// The resolved descriptor of `T`, resolving it on first use.
    ///
    /// # Errors
    /// The resolution error of `T` (or of a nested type). Failures are cached, so every
    /// later call returns the same error.
    pub fn descriptor<T: MessagePackObject>(&self) -> Result<Arc<SerializerDescriptor>> {
        Ok(Resolver::new(self).resolve(ObjectRef::of::<T>())?)
    }

    /// True once `T` has been resolved (successfully or not) in this context.
    pub fn is_cached<T: 'static>(&self) -> bool {
        let cache = self.inner.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn cached(&self, type_id: TypeId) -> Option<Resolved> {
        let cache = self.inner.cache.read().unwrap_or_else(|e| e.into_inner());
        cache.get(&type_id).cloned()
    }

    /// Stores a resolution result unless another thread stored one first. Returns the
    /// stored result, so every caller observes the same outcome.
    pub(crate) fn cache_insert(&self, type_id: TypeId, result: Resolved) -> Resolved {
        let mut cache = self.inner.cache.write().unwrap_or_else(|e| e.into_inner());
        cache.entry(type_id).or_insert(result).clone()
    }

    pub fn packer(&self) -> Packer {
        Packer::with_mode(self.inner.options.compatibility)
    }

    pub fn unpacker(&self, bytes: &[u8]) -> Unpacker {
        Unpacker::from_slice(bytes).with_limits(self.inner.options.limits.clone())
    }

    pub fn serialize<T: MessagePackSerialize + ?Sized>(&self, value: &T) -> Result<Bytes> {
        let mut packer = self.packer();
        value.pack_to(&mut packer, self)?;
        Ok(packer.into_bytes())
    }

    /// Serializes into a writer. Returns the number of bytes written.
    pub fn serialize_to_writer<W: Write, T: MessagePackSerialize + ?Sized>(
        &self,
        writer: &mut W,
        value: &T,
    ) -> Result<usize> {
        let bytes = self.serialize(value)?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    pub fn deserialize<T: MessagePackDeserialize>(&self, bytes: &[u8]) -> Result<T> {
        self.unpacker(bytes).deserialize(self)
    }

    pub fn deserialize_window<T: MessagePackDeserialize>(
        &self,
        bytes: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<T> {
        Unpacker::from_window(bytes, offset, len)?
            .with_limits(self.inner.options.limits.clone())
            .deserialize(self)
    }

    pub fn deserialize_from_reader<T: MessagePackDeserialize, R: Read>(
        &self,
        reader: R,
    ) -> Result<T> {
        StreamUnpacker::with_limits(reader, self.inner.options.limits.clone()).deserialize(self)
    }
}
