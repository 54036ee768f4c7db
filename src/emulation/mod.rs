//! Executing instrumented units without a host VM.
//!
//! The [`Emulator`] interprets the bytecode the transformer produces, enough to drive
//! dispatchers, split constructors and static initializer notifications end to end. Calls
//! into the dispatch hooks are forwarded to a [`crate::runtime::DispatchRuntime`].
//!
//! # Architecture
//!
//! - [`Value`] - operand stack, local and field values
//! - [`Heap`] / [`HeapObject`] - non-collecting object storage addressed by [`HeapRef`]
//! - [`EmulationLimits`] - instruction, call depth and heap bounds
//! - [`Emulator`] - class registry, static state and the interpreter loop
//!
//! Classes that were never loaded are not emulated. Their constructors are no-ops, and a
//! handful of library members (primitive wrappers, `Class.forName`, `Object.getClass`) are
//! built in; any other call into them fails with [`crate::Error::Emulation`].
//!
//! # Example
//!
//! ```rust,no_run
//! use shadowloader::{
//!     emulation::{Emulator, HeapRef, Value},
//!     DispatchRuntime, InstrumentationConfig, Invocation, Transformer,
//! };
//!
//! struct Answer;
//!
//! impl DispatchRuntime for Answer {
//!     fn should_call_directly(&self, _receiver: Option<HeapRef>) -> bool {
//!         false
//!     }
//!
//!     fn method_invoked(&self, _invocation: &Invocation<'_>) -> shadowloader::Result<Value> {
//!         Ok(Value::Int(42))
//!     }
//! }
//!
//! let original = std::fs::read("Widget.class")?;
//! let instrumented = Transformer::default().transform(&original)?;
//!
//! let mut emulator = Emulator::new(Answer, InstrumentationConfig::default());
//! let class = emulator.load(&instrumented)?;
//! let result = emulator.invoke_static(&class, "twice", "(I)I", &[Value::Int(1)])?;
//! assert_eq!(result, Some(Value::Int(42)));
//! # Ok::<(), shadowloader::Error>(())
//! ```

mod config;
mod engine;
mod heap;
mod value;

pub use config::EmulationLimits;
pub use engine::Emulator;
pub use heap::{Heap, HeapObject};
pub use value::{HeapRef, Value};
