//! Byte-level access to compiled-unit data.
//!
//! Class files are plain big-endian byte sequences; this module provides the cursor
//! [`crate::file::parser::Parser`] used by every decoder in the crate and the
//! [`crate::file::io`] helpers used by the serializers.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - Bounds-checked cursor over a byte slice
//! - [`crate::file::io::ClassIO`] - Big-endian conversion for fixed-size primitives

pub mod io;
pub mod parser;

pub use parser::Parser;
