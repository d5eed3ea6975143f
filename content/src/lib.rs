//! # RedLilium Content
//!
//! Serialization and reference resolution for content object graphs.
//!
//! ## Core Types
//!
//! - [`Serializable`] / [`SerializableType`]: object-safe field access and the
//!   static descriptor table, both implemented by `#[derive(Serializable)]`
//! - [`ObjectRef`] / [`Ref`]: shared handles carrying [`Identity`] and an
//!   optional [`ContentPath`]
//! - [`TypeRegistry`]: type tags, factories and the [`SchemaRegistry`] cache
//! - [`Document`] / [`Value`]: the format-agnostic document tree
//!
//! ## Writing and Reading
//!
//! - [`Writer`]: object graph to [`Document`]; shared objects are emitted once
//!   and referenced by `ReferenceGuid` or `ReferenceFile` afterwards
//! - [`Reader`]: [`Document`] to object graph; forward references are bound
//!   after construction and external files go through an [`ExternalLoader`]
//! - [`SourceLoader`]: caching loader over a [`ContentSource`]
//!   ([`MemorySource`], [`DirectorySource`])
//!
//! Node-local problems never abort a read or write. They are returned as
//! [`Diagnostic`]s next to the result and logged through `log`.
//!
//! ```ignore
//! #[derive(Default, Serializable)]
//! #[serialize(tag = "game.Material")]
//! struct Material {
//!     roughness: f32,
//!     albedo: Option<Ref<Texture>>,
//! }
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<Texture>()?.register::<Material>()?;
//!
//! let output = Writer::new(&registry).write(material.object())?;
//! let json = output.document.to_json_pretty()?;
//!
//! let document = Document::from_json(&json)?;
//! let back = Reader::new(&registry).read_as::<Material>(&document).await?;
//! ```

extern crate self as redlilium_content;

mod cancellation;
pub mod config;
mod diagnostics;
mod document;
mod error;
pub mod field;
mod format;
mod identity;
mod loader;
mod object;
mod reader;
mod registry;
pub mod schema;
mod source;
pub mod value;
mod writer;

pub use cancellation::{CancellationToken, Cancelled};
pub use config::{ContentConfig, TagStyle, UnresolvedPolicy, load_config};
pub use content_macro::Serializable;
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use document::Document;
pub use error::{
    ConfigError, CreateError, FieldError, FormatError, LoadError, PathError, ReadError,
    RegistryError, SchemaError, SourceError, WriteError,
};
pub use field::{Field, FieldRef, FieldValue};
pub use format::{Format, decode, encode};
pub use identity::{ContentPath, Identity};
pub use loader::{ExternalLoader, LoadFuture, SourceLoader};
pub use object::{AsAny, ObjectRef, Ref, Serializable, SerializableType};
pub use reader::{ReadOutput, Reader};
pub use registry::{TypeInfo, TypeRegistry};
pub use schema::{
    Classification, DeclaredType, FieldDecl, FieldDescriptor, FieldShape, SchemaDescriptor,
    SchemaRegistry,
};
pub use source::{ContentSource, DirectorySource, MemorySource, SourceFuture};
pub use value::{Link, NodeView, ObjectNode, RefShape, TypeTag, Value};
pub use writer::{WriteOutput, Writer};
