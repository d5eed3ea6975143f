//! Document reader and reference resolver.
//!
//! A [`Reader`] turns a [`Document`] back into an object graph in one pass:
//!
//! 1. **Scanning**: the root node is located.
//! 2. **Constructing**: objects are created depth-first. Every shared object
//!    is entered into the per-read instance table *before* its fields are
//!    read, so a field may refer back to any ancestor.
//! 3. **Draining**: `ReferenceGuid` links that pointed forward are bound in
//!    the order they were met.
//!
//! Problems local to one node (unknown tags, failed external loads, type
//! mismatches, dangling identifiers) are recorded as [`Diagnostic`]s and the
//! affected field keeps its default. Only cancellation and schema errors end
//! the read.
//!
//! External references are handed to the installed
//! [`ExternalLoader`](crate::ExternalLoader). The reader suspends on the
//! loader's future and resumes once the object arrives.

mod deferred;
pub(crate) mod table;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use crate::cancellation::CancellationToken;
use crate::config::{ContentConfig, UnresolvedPolicy};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::document::Document;
use crate::error::{FieldError, ReadError};
use crate::field::FieldValue;
use crate::loader::ExternalLoader;
use crate::object::{ObjectRef, Ref, Serializable, SerializableType};
use crate::registry::TypeRegistry;
use crate::schema::{DeclaredType, FieldShape, SchemaDescriptor};
use crate::value::{ID_KEY, NodeView, RefShape, TYPE_KEY, Value};

use deferred::{BindingTarget, DeferredBinding, Pending};
use table::InstanceTable;

/// Upper bound on objects visited when narrowing a reference to a sub-part.
const NARROW_LIMIT: usize = 64;

type ReadFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ReadError>> + Send + 'a>>;

/// Result of a successful read.
#[derive(Debug)]
pub struct ReadOutput<R = ObjectRef> {
    pub root: R,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Idle,
    Scanning,
    Constructing,
    Draining,
    Done,
}

/// A field read from a node, not yet assigned.
struct FieldRead {
    name: &'static str,
    pending: Pending,
    path: String,
    writable: bool,
}

/// Where an owned embedded object sits below its nearest shared object.
#[derive(Clone)]
struct Site {
    owner: BindingTarget,
    field: &'static str,
    indices: Vec<usize>,
}

impl Site {
    fn target(&self) -> BindingTarget {
        self.owner.child(self.field, self.indices.clone())
    }
}

/// Single-use document reader.
pub struct Reader<'r> {
    registry: &'r TypeRegistry,
    loader: Option<&'r dyn ExternalLoader>,
    cancel: CancellationToken,
    config: ContentConfig,
    state: ReadState,
    table: InstanceTable,
    deferred: Vec<DeferredBinding>,
    diagnostics: DiagnosticSink,
}

impl<'r> Reader<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            loader: None,
            cancel: CancellationToken::new(),
            config: ContentConfig::default(),
            state: ReadState::Idle,
            table: InstanceTable::default(),
            deferred: Vec::new(),
            diagnostics: DiagnosticSink::default(),
        }
    }

    pub fn with_config(mut self, config: ContentConfig) -> Self {
        self.config = config;
        self
    }

    /// Install the loader used for `ReferenceFile` links.
    pub fn with_loader(mut self, loader: &'r dyn ExternalLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Checked before every object is constructed and every external load.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Read a document whose root carries a type tag.
    pub async fn read(self, document: &Document) -> Result<ReadOutput, ReadError> {
        self.read_declared(document, DeclaredType::Any).await
    }

    /// Read a `T` document. An untagged root is constructed as `T`.
    pub async fn read_as<T: SerializableType>(
        self,
        document: &Document,
    ) -> Result<ReadOutput<Ref<T>>, ReadError> {
        let output = self.read_declared(document, DeclaredType::of::<T>()).await?;
        let found = output.root.type_tag();
        let root = output
            .root
            .downcast::<T>()
            .map_err(|_| ReadError::InvalidRoot {
                expected: T::TYPE_TAG,
                found,
            })?;
        Ok(ReadOutput {
            root,
            diagnostics: output.diagnostics,
        })
    }

    /// [`read`](Self::read) driven to completion on the current thread.
    pub fn read_blocking(self, document: &Document) -> Result<ReadOutput, ReadError> {
        pollster::block_on(self.read(document))
    }

    pub(crate) async fn read_declared(
        mut self,
        document: &Document,
        declared: DeclaredType,
    ) -> Result<ReadOutput, ReadError> {
        self.transition(ReadState::Scanning);
        let Some(node) = document.root.as_node() else {
            return Err(ReadError::RootUnavailable {
                reason: format!("root is a {} node", document.root.kind_name()),
            });
        };

        self.transition(ReadState::Constructing);
        let root = self
            .construct_shared(node, declared, "root".to_owned(), 0)
            .await?;
        let Some(root) = root else {
            let reason = self
                .diagnostics
                .last()
                .map_or_else(|| "unknown".to_owned(), |d| d.kind.to_string());
            return Err(ReadError::RootUnavailable { reason });
        };

        self.transition(ReadState::Draining);
        self.drain();
        self.transition(ReadState::Done);

        log::debug!(
            "Read '{}' document: {} shared objects",
            root.type_tag(),
            self.table.len()
        );
        Ok(ReadOutput {
            root,
            diagnostics: self.diagnostics.into_vec(),
        })
    }

    fn transition(&mut self, next: ReadState) {
        log::trace!("Reader {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Construct a shared object, register it and read its fields.
    fn construct_shared<'a>(
        &'a mut self,
        node: NodeView<'a>,
        declared: DeclaredType,
        path: String,
        depth: usize,
    ) -> ReadFuture<'a, Option<ObjectRef>> {
        Box::pin(async move {
            self.cancel.check()?;
            if self.exceeds_depth(&path, depth) {
                return Ok(None);
            }
            self.check_headers(&node, &path);
            let Some(instance) = self.instantiate(&node, declared, &path) else {
                return Ok(None);
            };

            let object = ObjectRef::from_boxed(instance);
            let slot = self.table.insert(object.clone());
            if let Some(identity) = node.identity {
                if self.table.bind(identity, slot) {
                    let _ = object.assign_identity(identity);
                } else {
                    self.diagnostics
                        .report(&path, DiagnosticKind::DuplicateIdentity(identity));
                    self.table.bind(object.identity(), slot);
                }
            }

            let schema = self.registry.schema_of(object.type_id())?;
            let target = BindingTarget::shared(slot);
            let fields = self.read_fields(node, &schema, &target, &path, depth).await?;
            for field in fields {
                self.settle(&target, field, |name, value| {
                    object.write().set_field(name, value)
                });
            }
            Ok(Some(object))
        })
    }

    /// Construct an owned embedded object. It has no identity and is never
    /// entered into the instance table.
    fn construct_owned<'a>(
        &'a mut self,
        node: NodeView<'a>,
        declared: DeclaredType,
        target: BindingTarget,
        path: String,
        depth: usize,
    ) -> ReadFuture<'a, Option<Box<dyn Serializable>>> {
        Box::pin(async move {
            self.cancel.check()?;
            if self.exceeds_depth(&path, depth) {
                return Ok(None);
            }
            self.check_headers(&node, &path);
            let Some(mut instance) = self.instantiate(&node, declared, &path) else {
                return Ok(None);
            };
            if node.identity.is_some() {
                log::debug!("{path}: ignoring identity on embedded object");
            }

            let schema = self.registry.schema_of((*instance).as_any().type_id())?;
            let fields = self.read_fields(node, &schema, &target, &path, depth).await?;
            for field in fields {
                self.settle(&target, field, |name, value| instance.set_field(name, value));
            }
            Ok(Some(instance))
        })
    }

    /// Report header entries the decoder could not parse. They remain among
    /// the node's fields.
    fn check_headers(&mut self, node: &NodeView<'_>, path: &str) {
        for key in [TYPE_KEY, ID_KEY] {
            if let Some(value) = node.field(key) {
                let found = match value {
                    Value::String(text) => text.clone(),
                    other => other.kind_name().to_owned(),
                };
                self.diagnostics
                    .report(path, DiagnosticKind::MalformedHeader { key, found });
            }
        }
    }

    /// Resolve the runtime type of a node and create a fresh instance.
    fn instantiate(
        &mut self,
        node: &NodeView<'_>,
        declared: DeclaredType,
        path: &str,
    ) -> Option<Box<dyn Serializable>> {
        let type_id = match (node.type_tag, declared) {
            (Some(tag), _) => match self.registry.resolve(tag) {
                Some(info) => info.type_id,
                None => {
                    self.diagnostics
                        .report(path, DiagnosticKind::UnknownTypeTag(tag.clone()));
                    return None;
                }
            },
            (None, DeclaredType::Concrete { type_id, .. }) => type_id,
            (None, DeclaredType::Any) => {
                self.diagnostics.report(path, DiagnosticKind::MissingTypeTag);
                return None;
            }
        };

        match self.registry.create_instance(type_id) {
            Ok(instance) => Some(instance),
            Err(err) => {
                self.diagnostics.report(path, DiagnosticKind::CreateFailed(err));
                None
            }
        }
    }

    /// Read every schema field present in `node`, in schema order.
    fn read_fields<'a>(
        &'a mut self,
        node: NodeView<'a>,
        schema: &'a SchemaDescriptor,
        target: &'a BindingTarget,
        path: &'a str,
        depth: usize,
    ) -> ReadFuture<'a, Vec<FieldRead>> {
        Box::pin(async move {
            let mut fields = Vec::with_capacity(schema.fields.len());
            for field in &schema.fields {
                let Some(value) = node.field(field.serialized_name) else {
                    continue;
                };
                let field_path = format!("{path}.{}", field.serialized_name);
                let site = Site {
                    owner: target.clone(),
                    field: field.name,
                    indices: Vec::new(),
                };
                let pending = self
                    .read_value(value, &field.shape, site, field_path.clone(), depth + 1)
                    .await?;
                fields.push(FieldRead {
                    name: field.name,
                    pending,
                    path: field_path,
                    writable: field.writable,
                });
            }
            for (key, _) in node.fields {
                if schema.field(key).is_none() {
                    log::trace!("{path}: ignoring unknown field '{key}'");
                }
            }
            Ok(fields)
        })
    }

    /// Assign a read field now, or defer it if it waits on a forward link.
    ///
    /// Read-only fields are still read so that shared objects first written
    /// inside them are registered, but their value is dropped.
    fn settle(
        &mut self,
        target: &BindingTarget,
        field: FieldRead,
        assign: impl FnOnce(&'static str, FieldValue) -> Result<(), FieldError>,
    ) {
        if !field.writable {
            log::trace!("{}: read-only field not assigned", field.path);
        } else if field.pending.has_unresolved() {
            self.deferred.push(DeferredBinding {
                target: target.clone(),
                field: field.name,
                pending: field.pending,
                path: field.path,
            });
        } else if let Some(value) = field.pending.into_ready()
            && let Err(err) = assign(field.name, value)
        {
            self.diagnostics.report(&field.path, DiagnosticKind::Field(err));
        }
    }

    fn read_value<'a>(
        &'a mut self,
        value: &'a Value,
        shape: &'a FieldShape,
        site: Site,
        path: String,
        depth: usize,
    ) -> ReadFuture<'a, Pending> {
        Box::pin(async move {
            match shape {
                FieldShape::Primitive => Ok(Pending::Ready(FieldValue::Primitive(value.clone()))),
                FieldShape::Embedded(declared) => {
                    if value.is_null() {
                        return Ok(Pending::Ready(FieldValue::Embedded(None)));
                    }
                    let Some(node) = value.as_node() else {
                        self.unexpected(&path, "object", value);
                        return Ok(Pending::Skip);
                    };
                    let object = self
                        .construct_owned(node, *declared, site.target(), path, depth)
                        .await?;
                    Ok(match object {
                        Some(object) => Pending::Ready(FieldValue::Embedded(Some(object))),
                        None => Pending::Skip,
                    })
                }
                FieldShape::Reference(declared) => {
                    self.read_reference(value, *declared, path, depth).await
                }
                FieldShape::Sequence(element) => {
                    let items = match value {
                        Value::Null => return Ok(Pending::Sequence(Vec::new())),
                        Value::List(items) => items,
                        other => {
                            self.unexpected(&path, "list", other);
                            return Ok(Pending::Skip);
                        }
                    };
                    let mut out = Vec::with_capacity(items.len());
                    for (index, item) in items.iter().enumerate() {
                        let mut item_site = site.clone();
                        item_site.indices.push(out.len());
                        let item_path = format!("{path}[{index}]");
                        match self.read_value(item, element, item_site, item_path, depth).await? {
                            // Dropped elements of an embedded sequence shift
                            // later indices, so owned targets use `out.len()`.
                            Pending::Skip => {
                                if matches!(**element, FieldShape::Reference(_)) {
                                    out.push(Pending::Ready(FieldValue::Reference(None)));
                                }
                            }
                            pending => out.push(pending),
                        }
                    }
                    Ok(Pending::Sequence(out))
                }
            }
        })
    }

    fn read_reference<'a>(
        &'a mut self,
        value: &'a Value,
        declared: DeclaredType,
        path: String,
        depth: usize,
    ) -> ReadFuture<'a, Pending> {
        Box::pin(async move {
            let Some(shape) = value.as_reference() else {
                if value.is_null() {
                    return Ok(Pending::Ready(FieldValue::Reference(None)));
                }
                self.unexpected(&path, "reference", value);
                return Ok(Pending::Skip);
            };

            let object = match shape {
                RefShape::ExternalPath(content_path) => {
                    let Some(loader) = self.loader else {
                        self.diagnostics
                            .report(&path, DiagnosticKind::NoLoader(content_path.clone()));
                        return Ok(Pending::Skip);
                    };
                    self.cancel.check()?;
                    log::trace!("{path}: loading '{content_path}'");
                    match loader.load_by_path(content_path, declared).await {
                        Ok(object) => object,
                        Err(error) => {
                            self.diagnostics.report(
                                &path,
                                DiagnosticKind::ExternalLoadFailed {
                                    path: content_path.clone(),
                                    error,
                                },
                            );
                            return Ok(Pending::Skip);
                        }
                    }
                }
                RefShape::InternalIdentifier(identity) => match self.table.get(identity) {
                    Some(object) => object,
                    None => return Ok(Pending::Unresolved { identity, declared }),
                },
                RefShape::Embedded(node) => {
                    match self.construct_shared(node, declared, path.clone(), depth).await? {
                        Some(object) => object,
                        None => return Ok(Pending::Skip),
                    }
                }
            };

            Ok(match self.check_type(object, declared, &path) {
                Some(object) => Pending::Ready(FieldValue::Reference(Some(object))),
                None => Pending::Skip,
            })
        })
    }

    /// Accept `object` for a field declaring `declared`, narrowing to a
    /// matching sub-part when the object itself has another type.
    fn check_type(
        &mut self,
        object: ObjectRef,
        declared: DeclaredType,
        path: &str,
    ) -> Option<ObjectRef> {
        let DeclaredType::Concrete { type_id, tag } = declared else {
            return Some(object);
        };
        if object.type_id() == type_id {
            return Some(object);
        }
        if let Some(part) = narrow(&object, declared) {
            log::debug!(
                "{path}: narrowed '{}' to its '{tag}' part",
                object.type_tag()
            );
            return Some(part);
        }
        self.diagnostics.report(
            path,
            DiagnosticKind::TypeMismatch {
                expected: tag,
                found: object.type_tag(),
            },
        );
        None
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

    fn unexpected(&mut self, path: &str, expected: &'static str, found: &Value) {
        self.diagnostics.report(
            path,
            DiagnosticKind::UnexpectedNode {
                expected,
                found: found.kind_name(),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Deferred bindings
    // -----------------------------------------------------------------------

    fn drain(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        log::trace!("Draining {} deferred bindings", deferred.len());
        for binding in deferred {
            let DeferredBinding {
                target,
                field,
                pending,
                path,
            } = binding;
            if let Some(value) = self.resolve(pending, false, &path) {
                self.assign(&target, field, value, &path);
            }
        }
    }

    /// Resolve a pending value against the finished instance table.
    ///
    /// A reference that still does not resolve leaves a single field at its
    /// default, and becomes a null element inside a sequence.
    fn resolve(&mut self, pending: Pending, in_sequence: bool, path: &str) -> Option<FieldValue> {
        match pending {
            Pending::Ready(value) => Some(value),
            Pending::Skip => None,
            Pending::Sequence(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.extend(self.resolve(item, true, path));
                }
                Some(FieldValue::Sequence(values))
            }
            Pending::Unresolved { identity, declared } => {
                let resolved = match self.table.get(identity) {
                    Some(object) => self.check_type(object, declared, path),
                    None => {
                        match self.config.unresolved_references {
                            UnresolvedPolicy::Warn => self
                                .diagnostics
                                .report(path, DiagnosticKind::UnresolvedReference(identity)),
                            UnresolvedPolicy::Ignore => {
                                log::debug!("{path}: unresolved reference {identity}")
                            }
                        }
                        None
                    }
                };
                match resolved {
                    Some(object) => Some(FieldValue::Reference(Some(object))),
                    None => in_sequence.then_some(FieldValue::Reference(None)),
                }
            }
        }
    }

    fn assign(&mut self, target: &BindingTarget, field: &'static str, value: FieldValue, path: &str) {
        let object = self.table.object(target.slot).clone();
        let mut guard = object.write();
        let mut current: &mut (dyn Serializable + 'static) = &mut *guard;
        for segment in &target.path {
            let owner = current.type_tag();
            let Some(next) = current.embedded_mut(segment.field, &segment.indices) else {
                self.diagnostics.report(
                    path,
                    DiagnosticKind::Field(FieldError::UnknownField {
                        type_tag: owner,
                        field: segment.field.to_owned(),
                    }),
                );
                return;
            };
            current = next;
        }
        if let Err(err) = current.set_field(field, value) {
            self.diagnostics.report(path, DiagnosticKind::Field(err));
        }
    }
}

/// Breadth-first search of `object`'s parts for one of the declared type.
fn narrow(object: &ObjectRef, declared: DeclaredType) -> Option<ObjectRef> {
    let mut queue: VecDeque<ObjectRef> = object.read().parts().into();
    let mut visited = vec![object.clone()];
    while let Some(candidate) = queue.pop_front() {
        if visited.len() > NARROW_LIMIT {
            break;
        }
        if visited.iter().any(|seen| seen.ptr_eq(&candidate)) {
            continue;
        }
        if declared.accepts(candidate.type_id()) {
            return Some(candidate);
        }
        queue.extend(candidate.read().parts());
        visited.push(candidate);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Serializable;
    use crate::identity::Identity;
    use crate::value::{Link, ObjectNode, TypeTag};

    #[derive(Default, Serializable)]
    #[serialize(tag = "test.Node")]
    struct Node {
        name: String,
        next: Option<Ref<Node>>,
        children: Vec<Option<Ref<Node>>>,
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register::<Node>().unwrap();
        registry
    }

    fn node(tag: Option<&str>, id: Option<Identity>, fields: Vec<(&str, Value)>) -> Value {
        ObjectNode {
            type_tag: tag.map(|t| TypeTag::Name(t.to_owned())),
            identity: id,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
        .into_value()
    }

    #[test]
    fn forward_reference_is_drained() {
        let registry = registry();
        let later = Identity::new();
        let doc = Document::new(node(
            Some("test.Node"),
            None,
            vec![
                ("name", Value::String("a".into())),
                ("next", Value::Link(Link::Guid(later))),
                (
                    "children",
                    Value::List(vec![node(
                        None,
                        Some(later),
                        vec![("name", Value::String("b".into()))],
                    )]),
                ),
            ],
        ));

        let output = Reader::new(&registry).read_as::<Node>(&doc);
        let output = pollster::block_on(output).unwrap();
        assert!(output.diagnostics.is_empty());

        let root = output.root.read();
        let next = root.next.as_ref().unwrap();
        assert_eq!(next.read().name, "b");
        assert_eq!(next.identity(), later);
        assert!(root.children[0].as_ref().unwrap() == next);
    }

    #[test]
    fn unknown_root_tag_is_unavailable() {
        let registry = registry();
        let doc = Document::new(node(Some("Missing"), None, vec![]));
        let err = Reader::new(&registry).read_blocking(&doc).unwrap_err();
        assert!(matches!(err, ReadError::RootUnavailable { .. }));
    }

    #[test]
    fn scalar_root_is_unavailable() {
        let registry = registry();
        let err = Reader::new(&registry)
            .read_blocking(&Document::new(Value::U64(3)))
            .unwrap_err();
        assert!(matches!(err, ReadError::RootUnavailable { .. }));
    }

    #[test]
    fn cancelled_before_start() {
        let registry = registry();
        let token = CancellationToken::new();
        token.cancel();
        let doc = Document::new(node(Some("test.Node"), None, vec![]));
        let err = Reader::new(&registry)
            .with_cancellation(token)
            .read_blocking(&doc)
            .unwrap_err();
        assert!(matches!(err, ReadError::Cancelled(_)));
    }

    #[test]
    fn depth_limit_is_reported() {
        let registry = registry();
        let deep = node(
            None,
            None,
            vec![("next", node(None, None, vec![("next", node(None, None, vec![]))]))],
        );
        let doc = Document::new(deep);
        let config = ContentConfig {
            max_depth: 1,
            ..Default::default()
        };
        let output = pollster::block_on(
            Reader::new(&registry)
                .with_config(config)
                .read_as::<Node>(&doc),
        )
        .unwrap();
        assert!(
            output
                .diagnostics
                .iter()
                .any(|d| matches!(d.kind, DiagnosticKind::DepthLimit(1)))
        );
        let root = output.root.read();
        assert!(root.next.as_ref().unwrap().read().next.is_none());
    }
}
