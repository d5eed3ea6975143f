//! Recoverable problems met while walking a document.

use std::fmt;

use crate::error::{CreateError, FieldError, LoadError};
use crate::identity::{ContentPath, Identity};
use crate::value::TypeTag;

/// What went wrong at one node.
#[derive(Debug)]
pub enum DiagnosticKind {
    UnknownTypeTag(TypeTag),
    /// A polymorphic node carried no type tag.
    MissingTypeTag,
    /// A `$type` or `$id` header that could not be parsed. The node is read
    /// without it.
    MalformedHeader {
        key: &'static str,
        found: String,
    },
    CreateFailed(CreateError),
    ExternalLoadFailed {
        path: ContentPath,
        error: LoadError,
    },
    /// An external reference was found but no loader is installed.
    NoLoader(ContentPath),
    /// An identifier reference never appeared in the document.
    UnresolvedReference(Identity),
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    UnexpectedNode {
        expected: &'static str,
        found: &'static str,
    },
    Field(FieldError),
    /// A second node claimed an identity already in use.
    DuplicateIdentity(Identity),
    DepthLimit(usize),
}

/// A recoverable problem and the document location it was found at.
#[derive(Debug)]
pub struct Diagnostic {
    /// Dotted field path from the root, e.g. `root.children[2].mesh`.
    pub path: String,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTypeTag(tag) => write!(f, "unknown type tag '{tag}'"),
            Self::MissingTypeTag => f.write_str("missing type tag on polymorphic node"),
            Self::MalformedHeader { key, found } => write!(f, "malformed '{key}' header: {found}"),
            Self::CreateFailed(err) => write!(f, "{err}"),
            Self::ExternalLoadFailed { path, error } => {
                write!(f, "failed to load '{path}': {error}")
            }
            Self::NoLoader(path) => write!(f, "no loader installed for '{path}'"),
            Self::UnresolvedReference(id) => write!(f, "unresolved reference {id}"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "expected '{expected}', found '{found}'")
            }
            Self::UnexpectedNode { expected, found } => {
                write!(f, "expected {expected} node, found {found}")
            }
            Self::Field(err) => write!(f, "{err}"),
            Self::DuplicateIdentity(id) => write!(f, "duplicate identity {id}"),
            Self::DepthLimit(depth) => write!(f, "nesting deeper than {depth}"),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Collects diagnostics and mirrors them to the log.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticSink {
    entries: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn report(&mut self, path: &str, kind: DiagnosticKind) {
        let diagnostic = Diagnostic::new(path, kind);
        log::warn!("{diagnostic}");
        self.entries.push(diagnostic);
    }

    pub fn last(&self) -> Option<&Diagnostic> {
        self.entries.last()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}
