//! # shadowloader Prelude
//!
//! The most commonly used types and traits, for glob imports.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all shadowloader operations
pub use crate::Error;

/// The result type used throughout shadowloader
pub use crate::Result;

// ================================================================================================
// Loading
// ================================================================================================

/// Loader and its collaborators
pub use crate::{
    AcquisitionPolicy, ByteSource, ChainSource, DirectorySource, Host, Loader, MemoryHost,
    MemorySource, MemoryUnit, Origin, PackagePolicy, UnitShape,
};

// ================================================================================================
// Transformation
// ================================================================================================

/// Member transformer and its configuration
pub use crate::{InstrumentationConfig, TraceConfig, Transformer};

/// Class-file model
pub use crate::classfile::{
    ClassAccessFlags, ClassFile, FieldInfo, MethodAccessFlags, MethodDescriptor, MethodInfo,
};

// ================================================================================================
// Runtime and Emulation
// ================================================================================================

/// Dispatch contract
pub use crate::{DispatchHooks, DispatchRuntime, InitializerTiming, Invocation};

/// Emulator
pub use crate::{EmulationLimits, Emulator, HeapRef, Value};
