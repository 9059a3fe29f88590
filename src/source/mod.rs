//! Asset sources.
//!
//! Everything the importer reads goes through [`AssetSource`], keyed by a
//! data-relative path such as `R1/Mothership/Rl0/LOD0/Mothership.peo`.

pub mod big;

pub use big::{ArchiveChain, BigArchive};

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::format::normalize_path;
use crate::reader::Reader;

/// A place asset files can be read from.
pub trait AssetSource {
    /// Read a whole file. `Ok(None)` means the file does not exist here.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Whether `path` exists in this source.
    fn contains(&self, path: &str) -> bool {
        matches!(self.read(path), Ok(Some(_)))
    }
}

impl<S: AssetSource + ?Sized> AssetSource for Box<S> {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(path)
    }

    fn contains(&self, path: &str) -> bool {
        (**self).contains(path)
    }
}

/// Open `path` as an owned reader.
///
/// A missing or unreadable file is logged and yields an empty reader; every
/// read from it is clamped, so callers degrade instead of failing.
pub fn open_reader(source: &dyn AssetSource, path: &str) -> Reader<'static> {
    match source.read(path) {
        Ok(Some(data)) => Reader::owned(data),
        Ok(None) => {
            tracing::error!(target: "classic_importer::source", "{} could not be opened", path);
            Reader::empty()
        }
        Err(e) => {
            tracing::error!(
                target: "classic_importer::source",
                "{} could not be opened: {}",
                path,
                e
            );
            Reader::empty()
        }
    }
}

/// Load a source from a filesystem path.
///
/// Supports both data-root directories and BIG archives.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Box<dyn AssetSource>> {
    let path = path.as_ref();

    if path.is_dir() {
        Ok(Box::new(DataRoot::new(path)))
    } else {
        Ok(Box::new(BigArchive::open(path)?))
    }
}

/// Loose files under a data-root directory.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `path` under the root. `None` for paths that would leave it.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let mut resolved = self.root.clone();
        for part in path.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => return None,
                _ if part.contains(':') => return None,
                _ => resolved.push(part),
            }
        }
        Some(resolved)
    }
}

impl AssetSource for DataRoot {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(resolved) = self.resolve(path) else {
            tracing::warn!(
                target: "classic_importer::source",
                "{} leaves the data root, ignoring it",
                path
            );
            return Ok(None);
        };
        match std::fs::read(resolved) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(|p| p.is_file())
    }
}

/// In-memory files keyed by normalized path.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.insert(path, data);
        self
    }

    pub fn insert(&mut self, path: &str, data: Vec<u8>) {
        self.files.insert(normalize_path(path), data);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemorySource {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(&normalize_path(path)).cloned())
    }

    fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize_path(path))
    }
}

/// Several sources searched in order; the first that has a file wins.
#[derive(Default)]
pub struct LayeredSource {
    layers: Vec<Box<dyn AssetSource>>,
}

impl LayeredSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer<S: AssetSource + 'static>(mut self, layer: S) -> Self {
        self.push(layer);
        self
    }

    pub fn push<S: AssetSource + 'static>(&mut self, layer: S) {
        self.layers.push(Box::new(layer));
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl AssetSource for LayeredSource {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        for layer in &self.layers {
            if let Some(data) = layer.read(path)? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn contains(&self, path: &str) -> bool {
        self.layers.iter().any(|layer| layer.contains(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_root_reads_nested_paths() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("R1").join("Scout");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Scout.peo"), b"geo").unwrap();

        let root = DataRoot::new(dir.path());
        assert_eq!(root.read("R1/Scout/Scout.peo").unwrap(), Some(b"geo".to_vec()));
        assert_eq!(root.read("R1\\Scout\\Scout.peo").unwrap(), Some(b"geo".to_vec()));
        assert!(root.contains("R1/Scout/Scout.peo"));
        assert_eq!(root.read("R1/Scout/missing.lif").unwrap(), None);
    }

    #[test]
    fn test_data_root_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        std::fs::create_dir_all(root.join("R1")).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"outside").unwrap();
        std::fs::write(root.join("R1").join("a.lif"), b"inside").unwrap();

        let source = DataRoot::new(&root);
        assert_eq!(source.read("../secret.txt").unwrap(), None);
        assert_eq!(source.read("R1\\..\\..\\secret.txt").unwrap(), None);
        assert!(!source.contains("../secret.txt"));
        assert_eq!(source.read("./R1/a.lif").unwrap(), Some(b"inside".to_vec()));
    }

    #[test]
    fn test_memory_source_is_case_insensitive() {
        let source = MemorySource::new().with_file("R1\\Scout\\Scout.peo", vec![1, 2, 3]);
        assert_eq!(source.read("r1/scout/scout.peo").unwrap(), Some(vec![1, 2, 3]));
        assert!(!source.contains("r1/scout/glass.lif"));
    }

    #[test]
    fn test_layered_source_first_hit_wins() {
        let source = LayeredSource::new()
            .with_layer(MemorySource::new().with_file("a", vec![1]))
            .with_layer(MemorySource::new().with_file("a", vec![2]).with_file("b", vec![3]));

        assert_eq!(source.read("a").unwrap(), Some(vec![1]));
        assert_eq!(source.read("b").unwrap(), Some(vec![3]));
        assert_eq!(source.read("c").unwrap(), None);
    }

    #[test]
    fn test_open_reader_missing_file_is_empty() {
        let source = MemorySource::new();
        let reader = open_reader(&source, "nothing.lif");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_load_from_path_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("file.bin"), b"x").unwrap();
        let source = load_from_path(dir.path()).unwrap();
        assert_eq!(source.read("file.bin").unwrap(), Some(b"x".to_vec()));
    }
}
