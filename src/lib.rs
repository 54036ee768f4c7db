// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(dead_code)]

//! # shadowloader
//!
//! Load-time instrumentation of compiled JVM units. A [`Loader`] acquires the units its
//! [`AcquisitionPolicy`] owns, rewrites them with the [`Transformer`] and defines the result
//! through a [`Host`]. Everything else is delegated to the host's parent.
//!
//! Instrumented units route every method and constructor through a dispatcher that asks
//! the runtime whether to run the original body or to hand the call to a handler, and
//! notify the runtime when their static initializer runs.
//!
//! ## Features
//!
//! - **Class-file model** - parse, modify and serialize class files, constant pools and
//!   `StackMapTable` frames
//! - **Bytecode assembly** - decode, encode and generate method bodies with label
//!   resolution and max stack tracking
//! - **Member transformation** - dispatchers, split constructors, static initializer
//!   notification, marker field and default constructor
//! - **Loading** - per-name at-most-once definition with concurrent resolution
//! - **Emulation** - run instrumented units against a Rust [`DispatchRuntime`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shadowloader::prelude::*;
//!
//! let loader = Loader::new(
//!     MemoryHost::new(),
//!     PackagePolicy::new().instrument_package("com.example"),
//!     DirectorySource::new("build/classes"),
//!     Transformer::new(InstrumentationConfig::default()),
//! );
//!
//! let widget = loader.resolve("com.example.Widget")?;
//! println!("{} defined by the loader", widget.unit_name());
//! # Ok::<(), shadowloader::Error>(())
//! ```
//!
//! ### Transforming a single unit
//!
//! ```rust,no_run
//! use shadowloader::{disassembler::disassemble_bytes, Transformer};
//!
//! let original = std::fs::read("Widget.class")?;
//! let instrumented = Transformer::default().transform(&original)?;
//! println!("{}", disassemble_bytes(&instrumented)?);
//! # Ok::<(), shadowloader::Error>(())
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: resolution decisions at `debug`, per-name
//! resolution at `trace`, and selected transformed units as full listings at `debug`
//! (see [`TraceConfig`]). Install any `log` implementation to see them.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust,no_run
//! use shadowloader::{Error, Transformer};
//!
//! match Transformer::default().transform(&std::fs::read("Widget.class")?) {
//!     Ok(bytes) => println!("{} bytes", bytes.len()),
//!     Err(Error::TransformFailure { unit, message }) => println!("{unit}: {message}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use shadowloader::prelude::*;
///
/// let config = InstrumentationConfig::default().with_marker_field("__shadow__");
/// let transformer = Transformer::new(config);
/// # Ok::<(), shadowloader::Error>(())
/// ```
pub mod prelude;

/// JVM bytecode: opcode tables, decoding, encoding and method body generation
///
/// # Key Types
///
/// - [`assembly::Instruction`] - a decoded instruction with operand and stack effect
/// - [`assembly::InstructionEncoder`] - emits bytecode with labels and max stack tracking
/// - [`assembly::MethodGenerator`] - higher level emission used for generated members
pub mod assembly;

/// The class-file model: constant pool, descriptors, members, attributes and frames
pub mod classfile;

/// Textual listings of class files, used for trace output
pub mod disassembler;

/// Running instrumented units against a [`DispatchRuntime`]
pub mod emulation;

/// The environment units are defined into
pub mod host;

/// The member transformer and its configuration
pub mod instrument;

/// The compiled-unit loader
pub mod loader;

/// Acquisition and instrumentation decisions
pub mod policy;

/// The dispatch runtime contract
pub mod runtime;

/// Byte sources for owned units
pub mod source;

/// `shadowloader` Result type
pub type Result<T> = std::result::Result<T, Error>;

/// `shadowloader` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Bounds-checked big-endian byte reader
pub use file::Parser;

/// The parsed class-file model
pub use classfile::ClassFile;

/// Member transformation
pub use instrument::{InstrumentationConfig, TraceConfig, Transformer};

/// Loading
pub use loader::Loader;

/// Dispatch contract
pub use runtime::{DispatchHooks, DispatchRuntime, InitializerTiming, Invocation};

/// Policies
pub use policy::{AcquisitionPolicy, PackagePolicy, UnitShape};

/// Byte sources
pub use source::{ByteSource, ChainSource, DirectorySource, MemorySource};

/// Hosts
pub use host::{Host, MemoryHost, MemoryUnit, Origin};

/// Emulation
pub use emulation::{EmulationLimits, Emulator, HeapRef, Value};
