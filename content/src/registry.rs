//! Type resolver.
//!
//! [`TypeRegistry`] maps between runtime types and the tags written into
//! documents, creates fresh instances by type, and owns the schema cache.
//! Registration happens once during setup (`&mut self`); afterwards the
//! registry is shared by reference between writers, readers and loaders.
//!
//! Both tag forms resolve: the long-form name (plus any legacy aliases) and
//! the optional short numeric id.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CreateError, RegistryError, SchemaError};
use crate::object::{Serializable, SerializableType};
use crate::schema::{FieldDecl, SchemaDescriptor, SchemaRegistry};
use crate::value::TypeTag;

type Factory = Box<dyn Fn() -> Result<Box<dyn Serializable>, CreateError> + Send + Sync>;

/// Public description of a registered type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub tag: &'static str,
    pub short_id: Option<u32>,
    pub always_emit_type_tag: bool,
}

struct TypeEntry {
    info: TypeInfo,
    factory: Factory,
    decls: fn() -> Vec<FieldDecl>,
}

/// Registry of serializable types.
#[derive(Default)]
pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u32, usize>,
    schemas: SchemaRegistry,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T`, created through `T::default()`.
    pub fn register<T: SerializableType>(&mut self) -> Result<&mut Self, RegistryError> {
        self.register_with_factory::<T>(|| Ok(T::default()))
    }

    /// Register `T` with a custom, fallible constructor.
    pub fn register_with_factory<T: SerializableType>(
        &mut self,
        factory: impl Fn() -> Result<T, CreateError> + Send + Sync + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) || self.by_name.contains_key(T::TYPE_TAG) {
            return Err(RegistryError::DuplicateTag(T::TYPE_TAG.to_owned()));
        }
        if let Some(id) = T::SHORT_ID
            && let Some(&existing) = self.by_id.get(&id)
        {
            return Err(RegistryError::DuplicateShortId {
                id,
                existing: self.entries[existing].info.tag,
            });
        }
        for alias in T::ALIASES {
            if let Some(&existing) = self.by_name.get(*alias) {
                return Err(RegistryError::AliasClash {
                    alias: (*alias).to_owned(),
                    existing: self.entries[existing].info.tag,
                });
            }
        }

        let index = self.entries.len();
        self.entries.push(TypeEntry {
            info: TypeInfo {
                type_id,
                type_name: type_name::<T>(),
                tag: T::TYPE_TAG,
                short_id: T::SHORT_ID,
                always_emit_type_tag: T::ALWAYS_EMIT_TYPE_TAG,
            },
            factory: Box::new(move || factory().map(|v| Box::new(v) as Box<dyn Serializable>)),
            decls: T::field_decls,
        });
        self.by_type.insert(type_id, index);
        self.by_name.insert(T::TYPE_TAG.to_owned(), index);
        for alias in T::ALIASES {
            self.by_name.insert((*alias).to_owned(), index);
        }
        if let Some(id) = T::SHORT_ID {
            self.by_id.insert(id, index);
        }
        log::debug!("Registered content type '{}'", T::TYPE_TAG);
        Ok(self)
    }

    /// Make a legacy long-form name resolve to an already registered tag.
    pub fn register_alias(&mut self, alias: &str, tag: &str) -> Result<&mut Self, RegistryError> {
        if let Some(&existing) = self.by_name.get(alias) {
            return Err(RegistryError::AliasClash {
                alias: alias.to_owned(),
                existing: self.entries[existing].info.tag,
            });
        }
        let index = *self
            .by_name
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownAliasTarget(tag.to_owned()))?;
        self.by_name.insert(alias.to_owned(), index);
        Ok(self)
    }

    /// Look up the type a document tag refers to.
    pub fn resolve(&self, tag: &TypeTag) -> Option<&TypeInfo> {
        let index = match tag {
            TypeTag::Name(name) => self.by_name.get(name.as_str()),
            TypeTag::Id(id) => self.by_id.get(id),
        }?;
        Some(&self.entries[*index].info)
    }

    pub fn info(&self, type_id: TypeId) -> Option<&TypeInfo> {
        self.entry(type_id).map(|e| &e.info)
    }

    /// Long-form tag of a registered type.
    pub fn tag_for(&self, type_id: TypeId) -> Option<&'static str> {
        self.info(type_id).map(|info| info.tag)
    }

    pub fn is_registered(&self, type_id: TypeId) -> bool {
        self.by_type.contains_key(&type_id)
    }

    /// Create a new instance of a registered type.
    pub fn create_instance(&self, type_id: TypeId) -> Result<Box<dyn Serializable>, CreateError> {
        let entry = self.entry(type_id).ok_or(CreateError {
            type_tag: "<unregistered>",
            message: "type is not registered".into(),
        })?;
        (entry.factory)()
    }

    /// Schema of a registered type, built and cached on first use.
    pub fn schema_of(&self, type_id: TypeId) -> Result<Arc<SchemaDescriptor>, SchemaError> {
        let entry = self
            .entry(type_id)
            .ok_or_else(|| SchemaError::Unregistered {
                type_name: format!("{type_id:?}"),
            })?;
        self.schemas.get_or_build(type_id, || {
            SchemaDescriptor::build(
                entry.info.tag,
                type_id,
                entry.info.always_emit_type_tag,
                (entry.decls)(),
                |id| self.is_registered(id),
            )
        })
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Build every registered schema, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), SchemaError> {
        for entry in &self.entries {
            self.schema_of(entry.info.type_id)?;
        }
        Ok(())
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.entries.iter().map(|e| &e.info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, type_id: TypeId) -> Option<&TypeEntry> {
        self.by_type.get(&type_id).map(|&i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializable;

    #[derive(Default, Serializable)]
    #[serialize(tag = "test.Light", id = 4, alias = "Lamp")]
    struct Light {
        range: f32,
    }

    #[derive(Default, Serializable)]
    #[serialize(id = 4)]
    struct Clash {
        value: u32,
    }

    #[derive(Default, Serializable)]
    struct Holder {
        light: Option<crate::Ref<Light>>,
    }

    #[derive(Default, Serializable)]
    struct BadName {
        #[serialize(rename = "$type")]
        value: u32,
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Light>().unwrap();
        registry
    }

    #[test]
    fn resolves_name_id_and_alias() {
        let registry = registry();
        let by_name = registry.resolve(&TypeTag::Name("test.Light".into())).unwrap();
        let by_id = registry.resolve(&TypeTag::Id(4)).unwrap();
        let by_alias = registry.resolve(&TypeTag::Name("Lamp".into())).unwrap();
        assert_eq!(by_name.type_id, TypeId::of::<Light>());
        assert_eq!(by_id, by_name);
        assert_eq!(by_alias, by_name);
        assert!(registry.resolve(&TypeTag::Name("Light".into())).is_none());
        assert!(registry.resolve(&TypeTag::Id(5)).is_none());
        assert_eq!(registry.tag_for(TypeId::of::<Light>()), Some("test.Light"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        assert!(matches!(
            registry.register::<Light>(),
            Err(RegistryError::DuplicateTag(_))
        ));
        assert!(matches!(
            registry.register::<Clash>(),
            Err(RegistryError::DuplicateShortId {
                id: 4,
                existing: "test.Light"
            })
        ));
        assert!(matches!(
            registry.register_alias("test.Light", "Lamp"),
            Err(RegistryError::AliasClash { .. })
        ));
        assert!(matches!(
            registry.register_alias("OldLight", "Missing"),
            Err(RegistryError::UnknownAliasTarget(_))
        ));
        registry.register_alias("OldLight", "test.Light").unwrap();
        assert!(registry.resolve(&TypeTag::Name("OldLight".into())).is_some());
    }

    #[test]
    fn creates_instances() {
        let registry = registry();
        let instance = registry.create_instance(TypeId::of::<Light>()).unwrap();
        assert_eq!(instance.type_tag(), "test.Light");
        assert!(instance.is::<Light>());
        assert!(registry.create_instance(TypeId::of::<Holder>()).is_err());
    }

    #[test]
    fn factory_failure_is_recoverable() {
        let mut registry = TypeRegistry::new();
        registry
            .register_with_factory::<Light>(|| {
                Err(CreateError {
                    type_tag: Light::TYPE_TAG,
                    message: "device lost".into(),
                })
            })
            .unwrap();
        let err = registry.create_instance(TypeId::of::<Light>()).unwrap_err();
        assert_eq!(err.message, "device lost");
    }

    #[test]
    fn schema_requires_registered_field_types() {
        let mut registry = TypeRegistry::new();
        registry.register::<Holder>().unwrap();
        assert!(matches!(
            registry.validate(),
            Err(SchemaError::UnregisteredFieldType { field: "light", .. })
        ));

        registry.register::<Light>().unwrap();
        registry.validate().unwrap();
        assert_eq!(registry.schema().len(), 2);
    }

    #[test]
    fn schema_errors_surface_on_validate() {
        let mut registry = TypeRegistry::new();
        registry.register::<BadName>().unwrap();
        assert!(matches!(
            registry.validate(),
            Err(SchemaError::ReservedName { name: "$type", .. })
        ));
    }

    #[test]
    fn schema_is_cached() {
        let registry = registry();
        let a = registry.schema_of(TypeId::of::<Light>()).unwrap();
        let b = registry.schema_of(TypeId::of::<Light>()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.fields[0].serialized_name, "range");
    }
}
