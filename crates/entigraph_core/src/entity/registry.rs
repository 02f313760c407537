//! Registered types and their managers.

use super::descriptor::TypeDescriptor;
use super::id::{IdFinder, IdManager};
use super::version::VersionManager;
use crate::error::{CoreError, CoreResult};
use crate::types::TypeName;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered type with the managers derived from its descriptor.
#[derive(Debug, Clone)]
pub struct RegisteredType {
    descriptor: Arc<TypeDescriptor>,
    ids: Option<IdManager>,
    versions: Option<VersionManager>,
}

impl RegisteredType {
    fn new(descriptor: TypeDescriptor) -> Self {
        let name = descriptor.name().clone();
        let ids = descriptor
            .id()
            .map(|id| IdManager::new(name.clone(), id.name.clone(), id.kind.setter()));
        let versions = descriptor
            .version()
            .map(|v| VersionManager::new(name.clone(), v.name.clone(), v.kind.incrementer()));
        Self {
            descriptor: Arc::new(descriptor),
            ids,
            versions,
        }
    }

    /// The descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// The type name.
    #[must_use]
    pub fn name(&self) -> &TypeName {
        self.descriptor.name()
    }

    /// The identifier manager, for entity types with an identifier.
    #[must_use]
    pub fn ids(&self) -> Option<&IdManager> {
        self.ids.as_ref()
    }

    /// The version manager, for versioned entity types.
    #[must_use]
    pub fn versions(&self) -> Option<&VersionManager> {
        self.versions.as_ref()
    }

    /// The finder a fresh collection of this type is indexed with.
    #[must_use]
    pub fn default_finder(&self) -> Option<IdFinder> {
        self.ids.as_ref().map(|ids| IdFinder::field(ids.field()))
    }
}

/// All registered types, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeName, RegisteredType>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type.
    ///
    /// # Errors
    ///
    /// `DuplicateRegistration` if the name is taken.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> CoreResult<&RegisteredType> {
        let name = descriptor.name().clone();
        if self.types.contains_key(&name) {
            return Err(CoreError::DuplicateRegistration { type_name: name });
        }
        Ok(self
            .types
            .entry(name)
            .or_insert_with(|| RegisteredType::new(descriptor)))
    }

    /// Drops a registration made by a write that was rolled back.
    pub(crate) fn unregister(&mut self, name: &str) -> Option<RegisteredType> {
        self.types.remove(name)
    }

    /// Looks up any registered type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredType> {
        self.types.get(name)
    }

    /// Looks up a registered entity type.
    ///
    /// # Errors
    ///
    /// `TypeNotRegistered` if the type is unknown or embedded.
    pub fn entity(&self, name: &str) -> CoreResult<&RegisteredType> {
        self.types
            .get(name)
            .filter(|t| t.descriptor.is_entity())
            .ok_or_else(|| CoreError::not_registered(name))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
