//! Byte sources for externally stored content.
//!
//! A [`ContentSource`] hands raw document bytes to the
//! [`SourceLoader`](crate::SourceLoader) by [`ContentPath`]. All methods
//! return boxed `Send + 'static` futures so a source can be driven by any
//! executor; the crate itself drives them with `pollster` in the blocking
//! entry points.
//!
//! - [`MemorySource`] keeps documents in a shared map (tests, embedded content)
//! - [`DirectorySource`] reads and writes files below a root directory

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::SourceError;
use crate::identity::ContentPath;

/// A boxed, `Send` future returning a `Result`.
pub type SourceFuture<T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send>>;

/// Storage backend for external content documents.
pub trait ContentSource: Send + Sync + 'static {
    /// Read the whole document stored at `path`.
    fn read(&self, path: &ContentPath) -> SourceFuture<Vec<u8>>;

    fn exists(&self, path: &ContentPath) -> SourceFuture<bool>;

    fn is_read_only(&self) -> bool {
        true
    }

    /// Store a document, replacing any previous one.
    fn write(&self, _path: &ContentPath, _data: Vec<u8>) -> SourceFuture<()> {
        Box::pin(async { Err(SourceError::ReadOnly) })
    }
}

// ---------------------------------------------------------------------------
// MemorySource
// ---------------------------------------------------------------------------

/// In-memory source. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemorySource {
    files: Arc<RwLock<HashMap<ContentPath, Vec<u8>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document, overwriting any existing one at the same path.
    pub fn insert(&self, path: ContentPath, data: impl Into<Vec<u8>>) {
        self.files.write().insert(path, data.into());
    }

    pub fn remove(&self, path: &ContentPath) -> Option<Vec<u8>> {
        self.files.write().remove(path)
    }

    /// Copy of the bytes stored at `path`.
    pub fn get(&self, path: &ContentPath) -> Option<Vec<u8>> {
        self.files.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl ContentSource for MemorySource {
    fn read(&self, path: &ContentPath) -> SourceFuture<Vec<u8>> {
        let files = self.files.clone();
        let path = path.clone();
        Box::pin(async move {
            let map = files.read();
            map.get(&path)
                .cloned()
                .ok_or_else(|| SourceError::NotFound(path.to_string()))
        })
    }

    fn exists(&self, path: &ContentPath) -> SourceFuture<bool> {
        let files = self.files.clone();
        let path = path.clone();
        Box::pin(async move { Ok(files.read().contains_key(&path)) })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, path: &ContentPath, data: Vec<u8>) -> SourceFuture<()> {
        let files = self.files.clone();
        let path = path.clone();
        Box::pin(async move {
            files.write().insert(path, data);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Source rooted at a directory on disk.
///
/// I/O is blocking `std::fs` inside the returned futures. Content paths are
/// already normalized and free of `..`, so they cannot escape the root.
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// The directory does not need to exist until the first access.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &ContentPath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

impl ContentSource for DirectorySource {
    fn read(&self, path: &ContentPath) -> SourceFuture<Vec<u8>> {
        let full_path = self.resolve(path);
        Box::pin(async move { Ok(std::fs::read(full_path)?) })
    }

    fn exists(&self, path: &ContentPath) -> SourceFuture<bool> {
        let full_path = self.resolve(path);
        Box::pin(async move { Ok(full_path.is_file()) })
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn write(&self, path: &ContentPath, data: Vec<u8>) -> SourceFuture<()> {
        let full_path = self.resolve(path);
        Box::pin(async move {
            if let Some(parent) = full_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full_path, data)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ContentPath {
        ContentPath::new(s).unwrap()
    }

    #[test]
    fn memory_read_write() {
        let source = MemorySource::new();
        assert!(!pollster::block_on(source.exists(&path("a.json"))).unwrap());

        pollster::block_on(source.write(&path("a.json"), b"{}".to_vec())).unwrap();
        assert!(pollster::block_on(source.exists(&path("a.json"))).unwrap());
        assert_eq!(
            pollster::block_on(source.read(&path("a.json"))).unwrap(),
            b"{}"
        );
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn memory_missing_is_not_found() {
        let source = MemorySource::new();
        let err = pollster::block_on(source.read(&path("gone.json"))).unwrap_err();
        assert!(matches!(err, SourceError::NotFound(p) if p == "gone.json"));
    }

    #[test]
    fn clones_share_storage() {
        let source = MemorySource::new();
        let other = source.clone();
        source.insert(path("x.json"), "null");
        assert_eq!(other.get(&path("x.json")).unwrap(), b"null");
    }

    #[test]
    fn directory_round_trip() {
        let root = std::env::temp_dir().join(format!(
            "redlilium-content-{}",
            uuid::Uuid::new_v4().simple()
        ));
        let source = DirectorySource::new(&root);
        let target = path("nested/dir/file.json");

        pollster::block_on(source.write(&target, b"[1]".to_vec())).unwrap();
        assert!(pollster::block_on(source.exists(&target)).unwrap());
        assert_eq!(pollster::block_on(source.read(&target)).unwrap(), b"[1]");

        let err = pollster::block_on(source.read(&path("missing.json"))).unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));

        std::fs::remove_dir_all(root).unwrap();
    }
}
