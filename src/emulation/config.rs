/// Resource limits of the dispatch emulator.
///
/// # Default Values
///
/// | Limit | Default Value |
/// |-------|---------------|
/// | `max_instructions` | 1,000,000 |
/// | `max_call_depth` | 256 |
/// | `max_heap_objects` | 100,000 |
///
/// A value of 0 disables the corresponding limit.
///
/// ```rust
/// use shadowloader::emulation::EmulationLimits;
///
/// let limits = EmulationLimits::new()
///     .with_max_instructions(10_000)
///     .with_max_call_depth(16);
/// assert_eq!(limits.max_heap_objects, 100_000);
/// ```
#[derive(Clone, Debug)]
pub struct EmulationLimits {
    /// Maximum instructions executed over the emulator's lifetime.
    pub max_instructions: u64,

    /// Maximum nesting of emulated method calls.
    pub max_call_depth: usize,

    /// Maximum number of heap objects.
    pub max_heap_objects: usize,
}

impl Default for EmulationLimits {
    fn default() -> Self {
        EmulationLimits {
            max_instructions: 1_000_000,
            max_call_depth: 256,
            max_heap_objects: 100_000,
        }
    }
}

impl EmulationLimits {
    /// Default limits
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instruction limit.
    #[must_use]
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    /// Set the call depth limit.
    #[must_use]
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }

    /// Set the heap object limit.
    #[must_use]
    pub fn with_max_heap_objects(mut self, max: usize) -> Self {
        self.max_heap_objects = max;
        self
    }
}
