//! Human-readable listings of class files.
//!
//! Used by the diagnostic trace of the instrumentation pass: when tracing is enabled for a
//! unit, the rewritten class is rendered with [`disassemble`] and logged. The listing has no
//! influence on what gets defined.
//!
//! # Example
//! ```rust
//! use shadowloader::classfile::ClassBuilder;
//! use shadowloader::disassembler::disassemble;
//!
//! let class = ClassBuilder::new("demo/Empty").default_constructor().build()?;
//! let listing = disassemble(&class)?;
//! assert!(listing.contains("invokespecial java/lang/Object.<init> : ()V"));
//! # Ok::<(), shadowloader::Error>(())
//! ```

mod textifier;

pub use textifier::{disassemble, disassemble_bytes};
