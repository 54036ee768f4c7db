//! The JVM class-file model (JVMS §4).
//!
//! A [`ClassFile`] is parsed into owned, editable parts: the constant pool, access flags,
//! fields, methods and attributes. Attributes the instrumentation pass does not need to
//! understand are kept as raw bytes, and the pool is append-only. `CONSTANT_Utf8` entries
//! without an exact Rust string form are kept as their original bytes, so a unit that is
//! parsed and written back unchanged serializes to the same bytes.
//!
//! # Key Components
//!
//! - [`ClassFile`] - A complete compiled unit
//! - [`ConstantPool`] - Interning, append-only constant pool
//! - [`MethodInfo`] / [`FieldInfo`] - Declared members
//! - [`MethodDescriptor`] / [`FieldType`] - Parsed type descriptors
//! - [`CodeAttribute`] - A method body with its exception table
//! - [`StackMapTable`] - Expanded verification frames
//! - [`ClassBuilder`] - Assemble new classes with generated method bodies

pub mod access;
pub mod attributes;
mod builder;
pub mod constantpool;
pub mod descriptor;
pub mod member;
pub mod stackmap;
pub mod unit;

pub use access::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
pub use attributes::{Attribute, CodeAttribute, ExceptionHandler};
pub use builder::ClassBuilder;
pub use constantpool::{Constant, ConstantPool, ConstantTag, MemberRef};
pub use descriptor::{FieldType, MethodDescriptor, ReturnCategory, ReturnType};
pub use member::{FieldInfo, MethodInfo, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
pub use stackmap::{Frame, StackMapTable, VerificationType};
pub use unit::{internal_name, ClassFile};
