//! External loader hook.
//!
//! [`ExternalLoader`] is the seam the [`Reader`] calls when a field holds a
//! `ReferenceFile` link. [`SourceLoader`] is the standard implementation: it
//! fetches bytes from a [`ContentSource`], reads them with a nested reader
//! that loads further external links through the same cache, and caches the
//! result by path. A file that refers back to one of the files still being
//! loaded above it fails with [`LoadError::Cycle`]. Loaded roots are marked read-only and keep their path, so
//! writing them again produces a link instead of a copy.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ContentConfig;
use crate::document::Document;
use crate::error::{LoadError, ReadError};
use crate::format::Format;
use crate::identity::ContentPath;
use crate::object::{ObjectRef, Ref, SerializableType};
use crate::reader::Reader;
use crate::registry::TypeRegistry;
use crate::schema::DeclaredType;
use crate::source::ContentSource;
use crate::writer::Writer;

/// A boxed, `Send` future resolving to a loaded object.
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<ObjectRef, LoadError>> + Send + 'a>>;

/// Loads objects stored outside the document being read.
pub trait ExternalLoader: Send + Sync {
    /// Load the object stored at `path`.
    ///
    /// `hint` is the type the referencing field declares. Loaders may use it
    /// for untagged documents; the reader checks the result either way.
    fn load_by_path<'a>(&'a self, path: &'a ContentPath, hint: DeclaredType) -> LoadFuture<'a>;
}

/// Loader backed by a [`ContentSource`], with a per-path cache.
pub struct SourceLoader<S> {
    source: S,
    registry: Arc<TypeRegistry>,
    config: ContentConfig,
    cache: Mutex<HashMap<ContentPath, ObjectRef>>,
}

impl<S: ContentSource> SourceLoader<S> {
    pub fn new(source: S, registry: Arc<TypeRegistry>) -> Self {
        Self {
            source,
            registry,
            config: ContentConfig::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: ContentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Load the document at `path`, or return the cached object.
    pub async fn load(&self, path: &ContentPath) -> Result<ObjectRef, LoadError> {
        self.load_by_path(path, DeclaredType::Any).await
    }

    /// Load a `T` document. Untagged roots are constructed as `T`.
    pub async fn load_as<T: SerializableType>(&self, path: &ContentPath) -> Result<Ref<T>, LoadError> {
        let object = self.load_by_path(path, DeclaredType::of::<T>()).await?;
        let found = object.type_tag();
        object.downcast::<T>().map_err(|_| LoadError::Read {
            path: path.clone(),
            source: ReadError::InvalidRoot {
                expected: T::TYPE_TAG,
                found,
            },
        })
    }

    /// [`load`](Self::load) driven to completion on the current thread.
    pub fn load_blocking(&self, path: &ContentPath) -> Result<ObjectRef, LoadError> {
        pollster::block_on(self.load(path))
    }

    /// Write `object` to `path` and remember it there.
    ///
    /// Afterwards the object carries `path`, so documents referencing it
    /// link to the file instead of inlining it.
    pub async fn store(&self, path: &ContentPath, object: &ObjectRef) -> Result<(), LoadError> {
        let output = Writer::new(&self.registry)
            .with_config(self.config.clone())
            .write(object)
            .map_err(|source| LoadError::Write {
                path: path.clone(),
                source,
            })?;
        let bytes = output
            .document
            .encode(Format::from_config(&self.config))
            .map_err(|source| LoadError::Format {
                path: path.clone(),
                source,
            })?;
        self.source
            .write(path, bytes)
            .await
            .map_err(|source| LoadError::Source {
                path: path.clone(),
                source,
            })?;

        if object.set_content_path(path.clone()).is_err()
            && let Some(existing) = object.content_path()
            && existing != path
        {
            log::warn!("Stored object from '{existing}' at '{path}'; it keeps its original path");
        }
        self.cache.lock().insert(path.clone(), object.clone());
        log::info!("Stored '{}' at '{path}'", object.type_tag());
        Ok(())
    }

    /// [`store`](Self::store) driven to completion on the current thread.
    pub fn store_blocking(&self, path: &ContentPath, object: &ObjectRef) -> Result<(), LoadError> {
        pollster::block_on(self.store(path, object))
    }

    pub fn cached(&self, path: &ContentPath) -> Option<ObjectRef> {
        self.cache.lock().get(path).cloned()
    }

    /// Drop a cached object so the next load reads the source again.
    pub fn evict(&self, path: &ContentPath) -> Option<ObjectRef> {
        self.cache.lock().remove(path)
    }

    /// Load `path` on behalf of a reader that is itself loading `chain`.
    async fn load_in_chain(
        &self,
        path: &ContentPath,
        hint: DeclaredType,
        chain: &[ContentPath],
    ) -> Result<ObjectRef, LoadError> {
        if chain.contains(path) {
            return Err(LoadError::Cycle(path.clone()));
        }
        if let Some(object) = self.cached(path) {
            log::trace!("Cache hit for '{path}'");
            return Ok(object);
        }

        let bytes = self
            .source
            .read(path)
            .await
            .map_err(|source| LoadError::Source {
                path: path.clone(),
                source,
            })?;
        let document =
            Document::decode(&bytes, Format::for_path(path)).map_err(|source| LoadError::Format {
                path: path.clone(),
                source,
            })?;

        let mut nested = chain.to_vec();
        nested.push(path.clone());
        let scope = LoadChain {
            loader: self,
            chain: nested,
        };
        let output = Reader::new(&self.registry)
            .with_config(self.config.clone())
            .with_loader(&scope)
            .read_declared(&document, hint)
            .await
            .map_err(|source| LoadError::Read {
                path: path.clone(),
                source,
            })?;
        if !output.diagnostics.is_empty() {
            log::warn!(
                "Loaded '{path}' with {} diagnostics",
                output.diagnostics.len()
            );
        }

        let root = output.root;
        let _ = root.set_content_path(path.clone());
        root.set_read_only(true);
        // A concurrent load of the same path may have finished first.
        let root = self
            .cache
            .lock()
            .entry(path.clone())
            .or_insert(root)
            .clone();
        log::debug!("Loaded '{}' from '{path}'", root.type_tag());
        Ok(root)
    }
}

impl<S: ContentSource> ExternalLoader for SourceLoader<S> {
    fn load_by_path<'a>(&'a self, path: &'a ContentPath, hint: DeclaredType) -> LoadFuture<'a> {
        Box::pin(self.load_in_chain(path, hint, &[]))
    }
}

/// Loader handed to the reader of a nested file. Remembers the files being
/// loaded above it so reference cycles through files end with an error.
struct LoadChain<'a, S> {
    loader: &'a SourceLoader<S>,
    chain: Vec<ContentPath>,
}

impl<S: ContentSource> ExternalLoader for LoadChain<'_, S> {
    fn load_by_path<'a>(&'a self, path: &'a ContentPath, hint: DeclaredType) -> LoadFuture<'a> {
        Box::pin(self.loader.load_in_chain(path, hint, &self.chain))
    }
}
