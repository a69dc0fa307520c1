//! # Type Registry
//!
//! Process-wide table of type registrations, consumed by the encoder and decoder.
//!
//! Registrations are built ahead of use, either by hand through
//! [`TypeRegistration::builder`] or generated by the `binary_object!` macro. The table
//! is read-mostly: lookups take a shared lock, and registration of a name that is
//! already present keeps the first registration and discards the new one.
//!
//! ## Usage
//! ```rust
//! use afrs::metadata::{MemberSpec, TypeRef, TypeRegistration, TypeRegistry};
//! use afrs::metadata::descriptor::TypeCode;
//!
//! let registry = TypeRegistry::new();
//! let reg = TypeRegistration::builder("Point")
//!     .member(MemberSpec::field("x", TypeRef::Builtin(TypeCode::I32)))
//!     .member(MemberSpec::field("y", TypeRef::Builtin(TypeCode::I32)))
//!     .build()
//!     .unwrap();
//! registry.register(reg).unwrap();
//! assert!(registry.contains("Point"));
//! ```

use crate::core::bind::{BinaryObject, Describe};
use crate::error::{constants, ErrorCode, Result, SerializerError};
use crate::metadata::descriptor::{DescriptorFlags, TypeDescriptor, TypeRef};
use crate::metadata::member::{MemberBinding, MemberSpec};
use crate::transform::checksum::fnv1a32;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Default schema version for new registrations.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeKind {
    /// Value type.
    Struct,
    #[default]
    Object,
    Abstract,
    Interface,
}

impl TypeKind {
    pub fn is_instantiable(self) -> bool {
        matches!(self, TypeKind::Struct | TypeKind::Object)
    }
}

/// How a decoded instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConstructorKind {
    /// Zero-argument construction.
    #[default]
    Default,
    /// Construction through a registered custom binding.
    Custom,
    /// Not constructible; decoding this type fails.
    None,
}

/// Everything the engine knows about one user type.
#[derive(Debug, Clone)]
pub struct TypeRegistration {
    name: String,
    type_hash: u32,
    kind: TypeKind,
    descriptor: TypeDescriptor,
    /// Sorted by `order`, ignored members included.
    members: Vec<MemberBinding>,
    key_index: HashMap<u32, usize>,
    schema_version: u32,
    constructor: ConstructorKind,
    implements: Vec<String>,
}

impl TypeRegistration {
    pub fn builder(name: impl Into<String>) -> TypeRegistrationBuilder {
        TypeRegistrationBuilder {
            name: name.into(),
            kind: TypeKind::default(),
            schema_version: DEFAULT_SCHEMA_VERSION,
            constructor: None,
            implements: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Stable 32-bit identity of a type name.
    pub fn hash_name(name: &str) -> u32 {
        fnv1a32(name.as_bytes())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_hash(&self) -> u32 {
        self.type_hash
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn constructor(&self) -> ConstructorKind {
        self.constructor
    }

    pub fn implements(&self) -> &[String] {
        &self.implements
    }

    /// All members, in positional order.
    pub fn members(&self) -> &[MemberBinding] {
        &self.members
    }

    /// Members that travel on the wire: by `key` when keyed, else by `order`.
    pub fn bind(&self, keyed: bool) -> Vec<&MemberBinding> {
        let mut bound: Vec<&MemberBinding> =
            self.members.iter().filter(|m| !m.is_ignored()).collect();
        if keyed {
            bound.sort_by_key(|m| m.key());
        }
        bound
    }

    pub fn member(&self, name: &str) -> Option<&MemberBinding> {
        self.members.iter().find(|m| m.name() == name)
    }

    pub fn member_by_key(&self, key: u32) -> Option<&MemberBinding> {
        self.key_index.get(&key).map(|&i| &self.members[i])
    }

    /// Fail unless instances of this type may be created by the decoder.
    pub fn ensure_constructible(&self) -> Result<()> {
        if !self.kind.is_instantiable() {
            return Err(SerializerError::new(
                ErrorCode::AbstractTypeInstantiation,
                format!("{} is {:?} and cannot be instantiated", self.name, self.kind),
            ));
        }
        if self.constructor == ConstructorKind::None {
            return Err(SerializerError::new(
                ErrorCode::ConstructorNotFound,
                format!("{} has no default or custom constructor", self.name),
            ));
        }
        Ok(())
    }
}

pub struct TypeRegistrationBuilder {
    name: String,
    kind: TypeKind,
    schema_version: u32,
    constructor: Option<ConstructorKind>,
    implements: Vec<String>,
    members: Vec<MemberSpec>,
}

impl TypeRegistrationBuilder {
    pub fn kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn constructor(mut self, constructor: ConstructorKind) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// Declare that this type may stand in for `base` (an abstract or interface type).
    pub fn implements(mut self, base: impl Into<String>) -> Self {
        self.implements.push(base.into());
        self
    }

    pub fn member(mut self, member: MemberSpec) -> Self {
        self.members.push(member);
        self
    }

    pub fn build(self) -> Result<TypeRegistration> {
        if self.name.is_empty() {
            return Err(SerializerError::new(
                ErrorCode::InvalidArgument,
                "type name cannot be empty",
            ));
        }

        let mut names = HashSet::new();
        for spec in &self.members {
            if !names.insert(spec.name().to_string()) {
                return Err(SerializerError::new(
                    ErrorCode::InvalidArgument,
                    format!("{}: member '{}' declared twice", self.name, spec.name()),
                ));
            }
        }

        let mut members: Vec<MemberBinding> = self
            .members
            .into_iter()
            .enumerate()
            .map(|(i, spec)| spec.resolve(&self.name, i as u32))
            .collect();
        // Stable: equal orders keep declaration sequence.
        members.sort_by_key(|m| m.order());

        let mut key_index = HashMap::with_capacity(members.len());
        for (i, m) in members.iter().enumerate() {
            if let Some(&other) = key_index.get(&m.key()) {
                let other: &MemberBinding = &members[other];
                return Err(SerializerError::new(
                    ErrorCode::DuplicateMemberKey,
                    format!(
                        "{}: members '{}' and '{}' share key {}",
                        self.name,
                        other.name(),
                        m.name(),
                        m.key()
                    ),
                ));
            }
            key_index.insert(m.key(), i);
        }

        let constructor = match self.constructor {
            Some(c) => c,
            None if self.kind.is_instantiable() => ConstructorKind::Default,
            None => ConstructorKind::None,
        };

        let mut flags = match self.kind {
            TypeKind::Struct => DescriptorFlags::VALUE_TYPE,
            TypeKind::Object => DescriptorFlags::NULLABLE,
            TypeKind::Abstract => DescriptorFlags::NULLABLE | DescriptorFlags::ABSTRACT,
            TypeKind::Interface => DescriptorFlags::NULLABLE | DescriptorFlags::INTERFACE,
        };
        if constructor == ConstructorKind::Default {
            flags |= DescriptorFlags::HAS_DEFAULT_CONSTRUCTOR;
        }

        Ok(TypeRegistration {
            type_hash: TypeRegistration::hash_name(&self.name),
            descriptor: TypeDescriptor::user_type(self.name.clone(), flags),
            name: self.name,
            kind: self.kind,
            members,
            key_index,
            schema_version: self.schema_version,
            constructor,
            implements: self.implements,
        })
    }
}

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<TypeRegistration>>,
    by_hash: HashMap<u32, Arc<TypeRegistration>>,
}

/// Concurrent, read-mostly registration table.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
    descriptors: RwLock<HashMap<TypeId, Arc<TypeDescriptor>>>,
}

static GLOBAL_REGISTRY: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

/// Shared process-wide registry.
pub fn global() -> Arc<TypeRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `registration`. If its name is already registered the existing entry is
    /// returned unchanged.
    ///
    /// # Errors
    /// `DuplicateTypeHash` if a different name already owns the same hash.
    pub fn register(&self, registration: TypeRegistration) -> Result<Arc<TypeRegistration>> {
        let mut inner = self.inner.write().map_err(|_| {
            SerializerError::new(ErrorCode::InternalError, constants::ERR_REGISTRY_WRITE_LOCK)
        })?;

        if let Some(existing) = inner.by_name.get(registration.name()) {
            debug!(type_name = registration.name(), "type already registered, keeping first");
            return Ok(Arc::clone(existing));
        }
        if let Some(clash) = inner.by_hash.get(&registration.type_hash()) {
            warn!(
                type_name = registration.name(),
                existing = clash.name(),
                hash = registration.type_hash(),
                "type hash collision"
            );
            return Err(SerializerError::new(
                ErrorCode::DuplicateTypeHash,
                format!(
                    "type hash {:#010x} of '{}' collides with '{}'",
                    registration.type_hash(),
                    registration.name(),
                    clash.name()
                ),
            ));
        }

        let registration = Arc::new(registration);
        inner
            .by_name
            .insert(registration.name().to_string(), Arc::clone(&registration));
        inner
            .by_hash
            .insert(registration.type_hash(), Arc::clone(&registration));
        debug!(
            type_name = registration.name(),
            members = registration.members().len(),
            schema = registration.schema_version(),
            "type registered"
        );
        Ok(registration)
    }

    /// Register `T` and the registered types its members refer to.
    pub fn register_type<T: BinaryObject>(&self) -> Result<Arc<TypeRegistration>> {
        if let Some(existing) = self.get(T::TYPE_NAME) {
            return Ok(existing);
        }
        let registration = self.register(T::registration()?)?;
        // After self-registration, so self-referential types terminate.
        T::register_dependencies(self)?;
        Ok(registration)
    }

    pub fn get(&self, name: &str) -> Option<Arc<TypeRegistration>> {
        self.inner.read().ok()?.by_name.get(name).cloned()
    }

    pub fn get_by_hash(&self, hash: u32) -> Option<Arc<TypeRegistration>> {
        self.inner.read().ok()?.by_hash.get(&hash).cloned()
    }

    /// Like [`get`](Self::get), failing with `TypeNotSupported`.
    pub fn resolve(&self, name: &str) -> Result<Arc<TypeRegistration>> {
        self.get(name).ok_or_else(|| {
            SerializerError::new(
                ErrorCode::TypeNotSupported,
                format!("type '{name}' is not registered"),
            )
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.by_name.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .map(|i| i.by_name.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Descriptor for a Rust type, computed once per `TypeId`.
    pub fn describe<T: Describe + 'static>(&self) -> Result<Arc<TypeDescriptor>> {
        let id = TypeId::of::<T>();
        if let Some(found) = self.descriptors.read().ok().and_then(|m| m.get(&id).cloned()) {
            return Ok(found);
        }

        let descriptor = Arc::new(self.describe_ref(&T::type_ref())?);
        let mut memo = self.descriptors.write().map_err(|_| {
            SerializerError::new(ErrorCode::InternalError, constants::ERR_REGISTRY_WRITE_LOCK)
        })?;
        Ok(Arc::clone(memo.entry(id).or_insert(descriptor)))
    }

    /// Classify a declared type by shape.
    pub fn describe_ref(&self, type_ref: &TypeRef) -> Result<TypeDescriptor> {
        Ok(match type_ref {
            TypeRef::Builtin(code) => TypeDescriptor::builtin(*code),
            TypeRef::Enum => TypeDescriptor::enumeration(),
            TypeRef::Array(e) => TypeDescriptor::array((**e).clone()),
            TypeRef::List(e) => TypeDescriptor::collection((**e).clone()),
            TypeRef::Map(k, v) => TypeDescriptor::dictionary((**k).clone(), (**v).clone()),
            TypeRef::Named(name) => self.resolve(name)?.descriptor().clone(),
            TypeRef::Any => TypeDescriptor::any(),
        })
    }

    /// Members of `type_name` in wire order for the given layout.
    pub fn bind_members(&self, type_name: &str, keyed: bool) -> Result<Vec<MemberBinding>> {
        let registration = self.resolve(type_name)?;
        Ok(registration.bind(keyed).into_iter().cloned().collect())
    }

    /// Whether a value of `concrete` may be stored where `declared` is expected,
    /// following `implements` transitively.
    pub fn is_assignable(&self, concrete: &TypeRegistration, declared: &str) -> bool {
        if concrete.name() == declared {
            return true;
        }
        let mut visited = HashSet::new();
        let mut pending: Vec<String> = concrete.implements().to_vec();
        while let Some(base) = pending.pop() {
            if base == declared {
                return true;
            }
            if !visited.insert(base.clone()) {
                continue;
            }
            if let Some(reg) = self.get(&base) {
                pending.extend(reg.implements().iter().cloned());
            }
        }
        false
    }
}
