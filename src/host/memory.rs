use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use crate::{
    classfile::{ClassAccessFlags, ClassFile},
    host::Host,
    policy::UnitShape,
    Error, Result,
};

/// Which side of the host produced a unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Resolved by the parent loader
    Parent,
    /// Defined through [`Host::define`]
    Defined,
}

/// A unit held by [`MemoryHost`].
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryUnit {
    name: String,
    access: ClassAccessFlags,
    bytes: Vec<u8>,
    origin: Origin,
}

impl MemoryUnit {
    fn parse(bytes: Vec<u8>, origin: Origin) -> Result<Self> {
        let class = ClassFile::parse(&bytes)?;
        Ok(MemoryUnit {
            name: class.java_name(),
            access: class.access,
            bytes,
            origin,
        })
    }

    /// The bytes the unit was created from
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Which side produced the unit
    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Parse the bytes again.
    ///
    /// # Errors
    /// Never fails for units created by [`MemoryHost`], the bytes were parsed on creation.
    pub fn class(&self) -> Result<ClassFile> {
        ClassFile::parse(&self.bytes)
    }
}

impl UnitShape for MemoryUnit {
    fn unit_name(&self) -> &str {
        &self.name
    }

    fn access_flags(&self) -> ClassAccessFlags {
        self.access
    }
}

/// In-memory host.
///
/// The parent side is a fixed set of units registered up front; the parent hands out the
/// same `Arc` on every lookup. Definitions are recorded, counted and never replaced.
#[derive(Debug, Default)]
pub struct MemoryHost {
    parent: HashMap<String, Arc<MemoryUnit>>,
    defined: RwLock<HashMap<String, Arc<MemoryUnit>>>,
    definitions: AtomicUsize,
}

impl MemoryHost {
    /// Host with an empty parent
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the unit in `bytes` resolvable through the parent.
    ///
    /// # Errors
    /// Returns a parse error if `bytes` is not a class file.
    pub fn with_parent_unit(mut self, bytes: Vec<u8>) -> Result<Self> {
        let unit = MemoryUnit::parse(bytes, Origin::Parent)?;
        self.parent.insert(unit.name.clone(), Arc::new(unit));
        Ok(self)
    }

    /// Unit defined under `name`, if any.
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the definition table is poisoned.
    pub fn defined(&self, name: &str) -> Result<Option<Arc<MemoryUnit>>> {
        Ok(read_lock!(self.defined).get(name).cloned())
    }

    /// Number of successful definitions so far
    #[must_use]
    pub fn definition_count(&self) -> usize {
        self.definitions.load(Ordering::Acquire)
    }
}

impl Host for MemoryHost {
    type Handle = Arc<MemoryUnit>;

    fn load_parent(&self, name: &str) -> Result<Self::Handle> {
        self.parent
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn define(&self, name: &str, bytes: &[u8]) -> Result<Self::Handle> {
        let unit = MemoryUnit::parse(bytes.to_vec(), Origin::Defined)?;
        if unit.name != name {
            return Err(Error::InvariantViolation(format!(
                "bytes for {name} define {}",
                unit.name
            )));
        }

        let mut defined = write_lock!(self.defined);
        if defined.contains_key(name) {
            return Err(Error::InvariantViolation(format!("{name} is already defined")));
        }
        let unit = Arc::new(unit);
        defined.insert(name.to_string(), unit.clone());
        self.definitions.fetch_add(1, Ordering::AcqRel);
        Ok(unit)
    }
}
