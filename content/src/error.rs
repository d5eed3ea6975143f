//! Error types for content serialization.
//!
//! Configuration errors (bad descriptors, duplicate registrations) are fatal
//! and surface through these types. Per-node problems met while walking a
//! document are not errors; they are recorded as
//! [`Diagnostic`](crate::Diagnostic)s and the walk continues.

use std::path::PathBuf;

use thiserror::Error;

use crate::cancellation::Cancelled;
use crate::identity::ContentPath;

/// Invalid identity or content path text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("empty content path")]
    Empty,
    #[error("path traversal (..) not allowed: {0}")]
    Traversal(String),
    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),
}

/// Failure converting a single field to or from its document form.
#[derive(Debug, Clone, Error)]
pub enum FieldError {
    #[error("type '{type_tag}' has no field '{field}'")]
    UnknownField {
        type_tag: &'static str,
        field: String,
    },
    #[error("expected {expected} value, found {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("expected object of type '{expected}', found '{found}'")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("value conversion failed: {0}")]
    Value(String),
}

/// A registered factory could not produce an instance.
#[derive(Debug, Clone, Error)]
#[error("failed to create instance of '{type_tag}': {message}")]
pub struct CreateError {
    pub type_tag: &'static str,
    pub message: String,
}

/// Type registration conflict.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("type tag '{0}' is already registered")]
    DuplicateTag(String),
    #[error("short id {id} is already used by '{existing}'")]
    DuplicateShortId { id: u32, existing: &'static str },
    #[error("alias '{alias}' clashes with registered tag '{existing}'")]
    AliasClash {
        alias: String,
        existing: &'static str,
    },
    #[error("alias target '{0}' is not registered")]
    UnknownAliasTarget(String),
}

/// A type's descriptor table cannot be turned into a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("type '{type_name}' is not registered")]
    Unregistered { type_name: String },
    #[error("'{type_tag}' declares serialized name '{name}' more than once")]
    DuplicateName {
        type_tag: &'static str,
        name: &'static str,
    },
    #[error("'{type_tag}' uses reserved serialized name '{name}'")]
    ReservedName {
        type_tag: &'static str,
        name: &'static str,
    },
    #[error("'{type_tag}' has a field with an empty serialized name")]
    EmptyName { type_tag: &'static str },
    #[error("field '{type_tag}.{field}' declares unregistered type '{declared}'")]
    UnregisteredFieldType {
        type_tag: &'static str,
        field: &'static str,
        declared: &'static str,
    },
}

/// Document text could not be encoded or decoded.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Fatal failure while writing a document.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Fatal failure while reading a document.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("read cancelled")]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// The top-level node did not produce an object.
    #[error("document root could not be constructed: {reason}")]
    RootUnavailable { reason: String },
    #[error("document root is '{found}', expected '{expected}'")]
    InvalidRoot {
        expected: &'static str,
        found: &'static str,
    },
}

/// Failure of a content source operation.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("source is read-only")]
    ReadOnly,
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SourceError::NotFound(err.to_string())
        } else {
            SourceError::Io(err)
        }
    }
}

/// Failure of an external load or store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to access '{path}': {source}")]
    Source {
        path: ContentPath,
        #[source]
        source: SourceError,
    },
    #[error("failed to decode '{path}': {source}")]
    Format {
        path: ContentPath,
        #[source]
        source: FormatError,
    },
    #[error("failed to read '{path}': {source}")]
    Read {
        path: ContentPath,
        #[source]
        source: ReadError,
    },
    #[error("failed to write '{path}': {source}")]
    Write {
        path: ContentPath,
        #[source]
        source: WriteError,
    },
    /// The path is already being loaded further up the current load chain.
    #[error("reference cycle through external file '{0}'")]
    Cycle(ContentPath),
}

/// Configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
