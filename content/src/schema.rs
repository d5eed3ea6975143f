//! Per-type schemas.
//!
//! A [`SchemaDescriptor`] is the ordered list of serializable fields of one
//! concrete type. It is built from the descriptor table generated by
//! `#[derive(Serializable)]`, validated once, and then cached for the
//! lifetime of the owning [`TypeRegistry`](crate::TypeRegistry).

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SchemaError;
use crate::object::SerializableType;
use crate::value::RESERVED_KEYS;

/// Static type a field declares for the objects it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeclaredType {
    /// Any registered type. Nodes must carry a type tag.
    Any,
    Concrete { type_id: TypeId, tag: &'static str },
}

impl DeclaredType {
    pub fn of<T: SerializableType>() -> Self {
        DeclaredType::Concrete {
            type_id: TypeId::of::<T>(),
            tag: T::TYPE_TAG,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, DeclaredType::Any)
    }

    /// Whether an object of `type_id` satisfies this declaration exactly.
    pub fn accepts(&self, type_id: TypeId) -> bool {
        match self {
            DeclaredType::Any => true,
            DeclaredType::Concrete { type_id: id, .. } => *id == type_id,
        }
    }

    pub fn concrete_id(&self) -> Option<TypeId> {
        match self {
            DeclaredType::Any => None,
            DeclaredType::Concrete { type_id, .. } => Some(*type_id),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            DeclaredType::Any => "<any>",
            DeclaredType::Concrete { tag, .. } => tag,
        }
    }
}

/// Structural shape of a field's declared Rust type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldShape {
    Primitive,
    /// An owned object written inline.
    Embedded(DeclaredType),
    /// A shared object written inline, by path, or by identifier.
    Reference(DeclaredType),
    Sequence(Box<FieldShape>),
}

impl FieldShape {
    pub fn classification(&self) -> Classification {
        match self {
            FieldShape::Primitive => Classification::Primitive,
            FieldShape::Embedded(_) => Classification::EmbeddedObject,
            FieldShape::Reference(_) => Classification::Reference,
            FieldShape::Sequence(element) => {
                Classification::Sequence(Box::new(element.classification()))
            }
        }
    }

    /// Declared object type, looking through sequences.
    pub fn declared_type(&self) -> Option<DeclaredType> {
        match self {
            FieldShape::Primitive => None,
            FieldShape::Embedded(declared) | FieldShape::Reference(declared) => Some(*declared),
            FieldShape::Sequence(element) => element.declared_type(),
        }
    }

    /// The declared type does not determine the runtime type.
    pub fn is_polymorphic(&self) -> bool {
        self.declared_type().is_some_and(|d| d.is_any())
    }
}

/// How a field is written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    Primitive,
    EmbeddedObject,
    /// Elements are classified the same way, recursively.
    Sequence(Box<Classification>),
    Reference,
}

/// One entry of a type's generated descriptor table.
#[derive(Clone, Debug)]
pub struct FieldDecl {
    /// In-memory field name.
    pub name: &'static str,
    /// Wire name.
    pub serialized_name: &'static str,
    pub shape: FieldShape,
    /// `false` for fields that are written but never assigned on read.
    pub writable: bool,
}

/// Validated field metadata.
#[derive(Clone, Debug)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub serialized_name: &'static str,
    pub classification: Classification,
    pub shape: FieldShape,
    pub declared_type: Option<DeclaredType>,
    pub writable: bool,
    pub always_emit_type_tag: bool,
}

/// Ordered field list of one concrete type.
#[derive(Clone, Debug)]
pub struct SchemaDescriptor {
    pub type_tag: &'static str,
    pub type_id: TypeId,
    pub fields: Vec<FieldDescriptor>,
    /// Nodes of this type are always written with a type tag.
    pub always_emit_type_tag: bool,
}

impl SchemaDescriptor {
    /// Validate a descriptor table.
    ///
    /// `is_registered` reports whether a concrete declared type is known to
    /// the type registry.
    pub fn build(
        type_tag: &'static str,
        type_id: TypeId,
        always_emit_type_tag: bool,
        decls: Vec<FieldDecl>,
        is_registered: impl Fn(TypeId) -> bool,
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(decls.len());

        for decl in decls {
            if decl.serialized_name.is_empty() {
                return Err(SchemaError::EmptyName { type_tag });
            }
            if RESERVED_KEYS.contains(&decl.serialized_name) {
                return Err(SchemaError::ReservedName {
                    type_tag,
                    name: decl.serialized_name,
                });
            }
            if !seen.insert(decl.serialized_name) {
                return Err(SchemaError::DuplicateName {
                    type_tag,
                    name: decl.serialized_name,
                });
            }

            let declared_type = decl.shape.declared_type();
            if let Some(DeclaredType::Concrete { type_id, tag }) = declared_type
                && !is_registered(type_id)
            {
                return Err(SchemaError::UnregisteredFieldType {
                    type_tag,
                    field: decl.name,
                    declared: tag,
                });
            }

            fields.push(FieldDescriptor {
                name: decl.name,
                serialized_name: decl.serialized_name,
                classification: decl.shape.classification(),
                always_emit_type_tag: decl.shape.is_polymorphic(),
                declared_type,
                shape: decl.shape,
                writable: decl.writable,
            });
        }

        Ok(Self {
            type_tag,
            type_id,
            fields,
            always_emit_type_tag,
        })
    }

    /// Field by wire name.
    pub fn field(&self, serialized_name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.serialized_name == serialized_name)
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Process-scoped schema cache.
///
/// Entries are built outside the lock and published with insert-if-absent,
/// so a published schema is never mutated and concurrent readers only ever
/// see complete entries.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<TypeId, Arc<SchemaDescriptor>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_id: TypeId) -> Option<Arc<SchemaDescriptor>> {
        self.schemas.read().get(&type_id).cloned()
    }

    /// Cached schema for `type_id`, building it on first use.
    pub fn get_or_build(
        &self,
        type_id: TypeId,
        build: impl FnOnce() -> Result<SchemaDescriptor, SchemaError>,
    ) -> Result<Arc<SchemaDescriptor>, SchemaError> {
        if let Some(schema) = self.get(type_id) {
            return Ok(schema);
        }
        let built = Arc::new(build()?);
        log::trace!("Built schema for '{}'", built.type_tag);
        let mut schemas = self.schemas.write();
        Ok(schemas.entry(type_id).or_insert(built).clone())
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner;
    struct Target;

    fn concrete<T: 'static>(tag: &'static str) -> DeclaredType {
        DeclaredType::Concrete {
            type_id: TypeId::of::<T>(),
            tag,
        }
    }

    fn decl(name: &'static str, shape: FieldShape) -> FieldDecl {
        FieldDecl {
            name,
            serialized_name: name,
            shape,
            writable: true,
        }
    }

    fn build(decls: Vec<FieldDecl>) -> Result<SchemaDescriptor, SchemaError> {
        SchemaDescriptor::build("Owner", TypeId::of::<Owner>(), false, decls, |id| {
            id == TypeId::of::<Target>()
        })
    }

    #[test]
    fn classification_is_structural() {
        let schema = build(vec![
            decl("speed", FieldShape::Primitive),
            decl("child", FieldShape::Embedded(DeclaredType::Any)),
            decl(
                "targets",
                FieldShape::Sequence(Box::new(FieldShape::Reference(concrete::<Target>(
                    "Target",
                )))),
            ),
        ])
        .unwrap();

        let names: Vec<_> = schema.fields.iter().map(|f| f.serialized_name).collect();
        assert_eq!(names, ["speed", "child", "targets"]);

        assert_eq!(schema.fields[0].classification, Classification::Primitive);
        assert!(!schema.fields[0].always_emit_type_tag);

        assert_eq!(
            schema.fields[1].classification,
            Classification::EmbeddedObject
        );
        assert!(schema.fields[1].always_emit_type_tag);

        assert_eq!(
            schema.fields[2].classification,
            Classification::Sequence(Box::new(Classification::Reference))
        );
        assert!(!schema.fields[2].always_emit_type_tag);
        assert_eq!(
            schema.fields[2].declared_type,
            Some(concrete::<Target>("Target"))
        );
    }

    #[test]
    fn rejects_bad_names() {
        let dup = build(vec![
            decl("a", FieldShape::Primitive),
            decl("a", FieldShape::Primitive),
        ]);
        assert!(matches!(dup, Err(SchemaError::DuplicateName { name: "a", .. })));

        let reserved = build(vec![decl("$id", FieldShape::Primitive)]);
        assert!(matches!(reserved, Err(SchemaError::ReservedName { .. })));

        let empty = build(vec![decl("", FieldShape::Primitive)]);
        assert!(matches!(empty, Err(SchemaError::EmptyName { .. })));
    }

    #[test]
    fn rejects_unregistered_declared_type() {
        let result = build(vec![decl(
            "owner",
            FieldShape::Reference(concrete::<Owner>("Owner")),
        )]);
        assert!(matches!(
            result,
            Err(SchemaError::UnregisteredFieldType {
                field: "owner",
                declared: "Owner",
                ..
            })
        ));
    }

    #[test]
    fn cache_builds_once() {
        let registry = SchemaRegistry::new();
        let mut builds = 0;
        for _ in 0..3 {
            registry
                .get_or_build(TypeId::of::<Owner>(), || {
                    builds += 1;
                    build(vec![decl("a", FieldShape::Primitive)])
                })
                .unwrap();
        }
        assert_eq!(builds, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn failed_build_is_not_cached() {
        let registry = SchemaRegistry::new();
        let result = registry.get_or_build(TypeId::of::<Owner>(), || {
            build(vec![decl("", FieldShape::Primitive)])
        });
        assert!(result.is_err());
        assert!(registry.is_empty());
    }
}
