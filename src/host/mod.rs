//! The execution environment units are defined into.
//!
//! A [`Host`] offers the two capabilities a loader needs from its surroundings: resolving a
//! name through the parent loader, and defining a unit from bytes. Defining the same name
//! twice is a permanent fault of the environment; the loader guarantees it never asks, and
//! [`MemoryHost`] reports it as [`crate::Error::InvariantViolation`].

mod memory;

pub use memory::{MemoryHost, MemoryUnit, Origin};

use crate::Result;

/// Parent resolution and unit definition.
pub trait Host: Send + Sync {
    /// Handle to a defined unit
    type Handle: Clone + Send + Sync;

    /// Resolve `name` through the parent loader.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if the parent does not know `name`.
    fn load_parent(&self, name: &str) -> Result<Self::Handle>;

    /// Define `name` from `bytes`.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a valid unit named `name`, or if `name` was
    /// already defined.
    fn define(&self, name: &str, bytes: &[u8]) -> Result<Self::Handle>;
}
