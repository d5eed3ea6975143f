//! Document writer.
//!
//! Walks an object graph from a root [`ObjectRef`] and produces a
//! [`Document`]. Shared objects are emitted once with their `$id`; later
//! encounters become `ReferenceGuid` links, and objects that live in their own
//! file (a content path is set) become `ReferenceFile` links. Owned embedded
//! objects are always written inline and carry no identity.
//!
//! A field that fails to convert is reported as a [`Diagnostic`] and omitted;
//! the rest of the object is still written. Schema problems abort the write.

use std::any::TypeId;
use std::collections::HashSet;

use crate::config::{ContentConfig, TagStyle};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::document::Document;
use crate::error::WriteError;
use crate::field::FieldRef;
use crate::identity::Identity;
use crate::object::{ObjectRef, Serializable, SerializableType};
use crate::registry::TypeRegistry;
use crate::schema::{DeclaredType, FieldShape};
use crate::value::{Link, ObjectNode, TypeTag, Value};

/// Result of a successful write.
#[derive(Debug)]
pub struct WriteOutput {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
}

/// Single-use document writer.
pub struct Writer<'r> {
    registry: &'r TypeRegistry,
    config: ContentConfig,
    written: HashSet<Identity>,
    root: Option<Identity>,
    diagnostics: DiagnosticSink,
}

impl<'r> Writer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            config: ContentConfig::default(),
            written: HashSet::new(),
            root: None,
            diagnostics: DiagnosticSink::default(),
        }
    }

    pub fn with_config(mut self, config: ContentConfig) -> Self {
        self.config = config;
        self
    }

    /// Write `root` with its type tag.
    pub fn write(self, root: &ObjectRef) -> Result<WriteOutput, WriteError> {
        self.write_root(root, DeclaredType::Any)
    }

    /// Write `root` as a `T` document. The type tag is omitted when the root
    /// is exactly a `T`.
    pub fn write_as<T: SerializableType>(self, root: &ObjectRef) -> Result<WriteOutput, WriteError> {
        self.write_root(root, DeclaredType::of::<T>())
    }

    fn write_root(mut self, root: &ObjectRef, declared: DeclaredType) -> Result<WriteOutput, WriteError> {
        let identity = root.identity();
        self.root = Some(identity);
        self.written.insert(identity);
        log::debug!("Writing '{}' document {identity}", root.type_tag());

        let value = self.write_shared(root, declared, "root", 0)?;
        let diagnostics = self.diagnostics.into_vec();
        log::trace!("Wrote {} objects", self.written.len());
        Ok(WriteOutput {
            document: Document::new(value),
            diagnostics,
        })
    }

    /// Inline a shared object with its `$id` header.
    fn write_shared(
        &mut self,
        object: &ObjectRef,
        declared: DeclaredType,
        path: &str,
        depth: usize,
    ) -> Result<Value, WriteError> {
        let data = object.read();
        let mut node = self.write_object(&*data, declared, path, depth)?;
        node.identity = Some(object.identity());
        Ok(node.into_value())
    }

    fn write_object(
        &mut self,
        object: &dyn Serializable,
        declared: DeclaredType,
        path: &str,
        depth: usize,
    ) -> Result<ObjectNode, WriteError> {
        let type_id = object.as_any().type_id();
        let schema = self.registry.schema_of(type_id)?;

        let type_tag = (declared.is_any()
            || schema.always_emit_type_tag
            || !declared.accepts(type_id))
        .then(|| self.type_tag(type_id, schema.type_tag));

        let mut fields = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let field_path = format!("{path}.{}", field.serialized_name);
            match object.field(field.name) {
                Ok(value) => {
                    let value = self.write_field(value, &field.shape, &field_path, depth + 1)?;
                    fields.push((field.serialized_name.to_owned(), value));
                }
                Err(err) => self.diagnostics.report(&field_path, DiagnosticKind::Field(err)),
            }
        }

        Ok(ObjectNode {
            type_tag,
            identity: None,
            fields,
        })
    }

    fn write_field(
        &mut self,
        value: FieldRef<'_>,
        shape: &FieldShape,
        path: &str,
        depth: usize,
    ) -> Result<Value, WriteError> {
        let declared = shape.declared_type().unwrap_or(DeclaredType::Any);
        match value {
            FieldRef::Primitive(value) => Ok(value),
            FieldRef::Embedded(None) | FieldRef::Reference(None) => Ok(Value::Null),
            FieldRef::Embedded(Some(object)) => {
                if self.exceeds_depth(path, depth) {
                    return Ok(Value::Null);
                }
                Ok(self.write_object(object, declared, path, depth)?.into_value())
            }
            FieldRef::Reference(Some(object)) => self.write_reference(object, declared, path, depth),
            FieldRef::Sequence(items) => {
                let element = match shape {
                    FieldShape::Sequence(element) => element.as_ref(),
                    other => other,
                };
                let mut list = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    list.push(self.write_field(item, element, &item_path, depth)?);
                }
                Ok(Value::List(list))
            }
        }
    }

    fn write_reference(
        &mut self,
        object: &ObjectRef,
        declared: DeclaredType,
        path: &str,
        depth: usize,
    ) -> Result<Value, WriteError> {
        let identity = object.identity();
        if let Some(content_path) = object.content_path()
            && self.root != Some(identity)
        {
            return Ok(Value::Link(Link::File(content_path.clone())));
        }
        if self.written.contains(&identity) {
            return Ok(Value::Link(Link::Guid(identity)));
        }
        if self.exceeds_depth(path, depth) {
            return Ok(Value::Null);
        }
        self.written.insert(identity);
        self.write_shared(object, declared, path, depth)
    }

    fn type_tag(&self, type_id: TypeId, name: &'static str) -> TypeTag {
        if self.config.tag_style == TagStyle::ShortId
            && let Some(id) = self.registry.info(type_id).and_then(|info| info.short_id)
        {
            return TypeTag::Id(id);
        }
        TypeTag::Name(name.to_owned())
    }

    fn exceeds_depth(&mut self, path: &str, depth: usize) -> bool {
        if depth > self.config.max_depth {
            self.diagnostics
                .report(path, DiagnosticKind::DepthLimit(self.config.max_depth));
            true
        } else {
            false
        }
    }
}
