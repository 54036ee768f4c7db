//! Where a loader reads the bytes of the units it owns.
//!
//! Names are dotted and fully qualified (`com.example.Outer$Inner`). A source answers
//! `Ok(None)` when it has no bytes for a name; errors are reserved for failures while
//! reading bytes that do exist.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::Result;

/// Supplies raw class-file bytes by name.
pub trait ByteSource: Send + Sync {
    /// Bytes of unit `name`, or `None` if this source does not have it.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the bytes exist but can not be read.
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Reads `<root>/a/b/C.class` for `a.b.C`.
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Source rooted at `root`
    pub fn new(root: impl AsRef<Path>) -> Self {
        DirectorySource {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Path the bytes of `name` are read from
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(name.split('.'));
        path.set_extension("class");
        path
    }
}

impl ByteSource for DirectorySource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_of(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

/// Units held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    units: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the bytes of `name`.
    #[must_use]
    pub fn with_unit(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }

    /// Add or replace the bytes of `name`.
    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.units.insert(name.to_string(), bytes);
    }

    /// Number of units held
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// `true` if no unit is held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl ByteSource for MemorySource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.units.get(name).cloned())
    }
}

/// Asks each source in order and returns the first hit.
#[derive(Default)]
pub struct ChainSource {
    sources: Vec<Box<dyn ByteSource>>,
}

impl ChainSource {
    /// Empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `source` after the existing ones.
    #[must_use]
    pub fn then<S: ByteSource + 'static>(mut self, source: S) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl ByteSource for ChainSource {
    fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for source in &self.sources {
            if let Some(bytes) = source.fetch(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_layout() {
        let root = std::env::temp_dir().join(format!("shadowloader-source-{}", std::process::id()));
        let source = DirectorySource::new(&root);
        let path = source.path_of("a.b.Outer$Inner");
        assert_eq!(path, root.join("a").join("b").join("Outer$Inner.class"));

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, [0xCA, 0xFE]).unwrap();
        assert_eq!(source.fetch("a.b.Outer$Inner").unwrap(), Some(vec![0xCA, 0xFE]));
        assert_eq!(source.fetch("a.b.Missing").unwrap(), None);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_chain_order() {
        let chain = ChainSource::new()
            .then(MemorySource::new().with_unit("a.First", vec![1]))
            .then(
                MemorySource::new()
                    .with_unit("a.First", vec![2])
                    .with_unit("a.Second", vec![3]),
            );

        assert_eq!(chain.fetch("a.First").unwrap(), Some(vec![1]));
        assert_eq!(chain.fetch("a.Second").unwrap(), Some(vec![3]));
        assert_eq!(chain.fetch("a.Third").unwrap(), None);
    }
}
