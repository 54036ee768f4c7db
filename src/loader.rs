//! The compiled-unit loader.
//!
//! [`Loader`] resolves names to host handles. Names its policy declines are delegated to
//! the host's parent; names it acquires are fetched from the byte source, optionally
//! rewritten by the [`Transformer`], and defined through the host. Either way the handle is
//! cached, and a name is defined at most once per loader.
//!
//! # Concurrency
//!
//! Each name owns a slot in a [`DashMap`]. Resolution of one name runs while holding that
//! slot's mutex, so concurrent callers for the same name wait for the first one and then
//! observe its cached handle. Different names resolve in parallel. A cached name is answered
//! without asking the policy. Otherwise the policy is asked before the slot is locked.
//!
//! # Example
//!
//! ```rust,no_run
//! use shadowloader::{
//!     DirectorySource, InstrumentationConfig, Loader, MemoryHost, PackagePolicy, Transformer,
//! };
//!
//! let loader = Loader::new(
//!     MemoryHost::new(),
//!     PackagePolicy::new().instrument_package("com.example"),
//!     DirectorySource::new("build/classes"),
//!     Transformer::new(InstrumentationConfig::default()),
//! );
//!
//! let unit = loader.resolve("com.example.Widget")?;
//! # Ok::<(), shadowloader::Error>(())
//! ```

use std::sync::{Arc, Mutex, TryLockError};

use dashmap::DashMap;
use log::{debug, trace};
use rayon::prelude::*;

use crate::{
    host::Host, instrument::Transformer, policy::AcquisitionPolicy, source::ByteSource, Error,
    Result,
};

type Slot<T> = Arc<Mutex<Option<T>>>;

/// Load-time instrumenting loader.
pub struct Loader<H, P, S>
where
    H: Host,
{
    host: H,
    policy: P,
    source: S,
    transformer: Transformer,
    slots: DashMap<String, Slot<H::Handle>>,
}

impl<H, P, S> Loader<H, P, S>
where
    H: Host,
    P: AcquisitionPolicy<H::Handle>,
    S: ByteSource,
{
    /// Create a loader.
    pub fn new(host: H, policy: P, source: S, transformer: Transformer) -> Self {
        Loader {
            host,
            policy,
            source,
            transformer,
            slots: DashMap::new(),
        }
    }

    /// The host units are defined into
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The byte source owned units are read from
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The transformer applied to instrumented units
    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    fn slot(&self, name: &str) -> Slot<H::Handle> {
        if let Some(slot) = self.slots.get(name) {
            return slot.clone();
        }
        self.slots.entry(name.to_string()).or_default().clone()
    }

    /// Resolve `name` (dotted, fully qualified) to a host handle.
    ///
    /// Returns the cached handle if `name` was resolved before.
    ///
    /// # Errors
    /// Every failure is reported as [`Error::ResolutionFailed`] wrapping the cause:
    /// [`Error::NotFound`] when an owned name has no bytes, [`Error::TransformFailure`] when
    /// the rewrite fails, [`Error::InvariantViolation`] for policy or host inconsistencies,
    /// or any host error. A poisoned slot is reported as [`Error::LockError`].
    pub fn resolve(&self, name: &str) -> Result<H::Handle> {
        trace!("resolve {name}");
        if let Some(handle) = self.cached(name) {
            return Ok(handle);
        }
        let acquire = self.policy.should_acquire(name);

        let slot = self.slot(name);
        let mut cached = lock!(slot);
        if let Some(handle) = cached.as_ref() {
            return Ok(handle.clone());
        }

        let resolved = if acquire {
            self.define_owned(name)
        } else {
            debug!("{name}: delegated to parent");
            self.host.load_parent(name)
        };
        let handle = resolved.map_err(|source| Error::ResolutionFailed {
            name: name.to_string(),
            source: Box::new(source),
        })?;

        *cached = Some(handle.clone());
        Ok(handle)
    }

    /// The cached handle for `name`, without waiting on a slot that is being resolved
    fn cached(&self, name: &str) -> Option<H::Handle> {
        let slot = self.slots.get(name).map(|slot| slot.clone())?;
        let cached = slot.try_lock().ok()?;
        cached.as_ref().cloned()
    }

    /// Fetch, inspect, optionally rewrite and define an owned name. Not cached here.
    fn define_owned(&self, name: &str) -> Result<H::Handle> {
        if !self.policy.should_acquire(name) {
            return Err(Error::InvariantViolation(format!(
                "{name} is defined by the loader but its policy does not acquire it"
            )));
        }

        let bytes = self
            .source
            .fetch(name)?
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        let original = self.host.load_parent(name)?;
        if self.policy.should_instrument(&original) {
            debug!("{name}: instrumenting {} bytes", bytes.len());
            let rewritten = self.transformer.transform(&bytes)?;
            self.host.define(name, &rewritten)
        } else {
            debug!("{name}: defining unchanged");
            self.host.define(name, &bytes)
        }
    }

    /// `true` if `name` has a cached handle.
    ///
    /// A name whose resolution is in progress on another thread reports `false`.
    pub fn is_resolved(&self, name: &str) -> bool {
        let Some(slot) = self.slots.get(name).map(|slot| slot.clone()) else {
            return false;
        };
        Self::holds_handle(&slot)
    }

    /// Number of names with a cached handle
    pub fn resolved_count(&self) -> usize {
        let slots: Vec<Slot<H::Handle>> =
            self.slots.iter().map(|entry| entry.value().clone()).collect();
        slots.iter().filter(|slot| Self::holds_handle(slot)).count()
    }

    fn holds_handle(slot: &Slot<H::Handle>) -> bool {
        match slot.try_lock() {
            Ok(cached) => cached.is_some(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
            Err(TryLockError::WouldBlock) => false,
        }
    }

    /// Resolve `names` in parallel.
    ///
    /// Results are returned in the order of `names`, with the same at-most-once guarantees
    /// as [`Loader::resolve`].
    pub fn preload(&self, names: &[&str]) -> Vec<Result<H::Handle>> {
        names.par_iter().map(|name| self.resolve(name)).collect()
    }
}
