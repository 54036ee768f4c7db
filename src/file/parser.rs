//! Low-level byte stream parser for class-file and bytecode decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser for reading JVM class-file structures and method bytecode. Every read is
//! bounds-checked and big-endian, as mandated by the class format.
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::advance_by`] - Move forward by specified bytes
//! - [`crate::file::parser::Parser::pos`] - Get current position
//! - [`crate::file::parser::Parser::align`] - Align to byte boundaries (switch padding)
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_be`] - Read primitive types (big-endian)
//! - [`crate::file::parser::Parser::peek_byte`] - Peek at current byte without advancing
//! - [`crate::file::parser::Parser::read_bytes`] - Borrow a sub-slice and advance
//! - [`crate::file::parser::Parser::read_modified_utf8`] - Decode a `CONSTANT_Utf8` payload
//!
//! # Usage Examples
//!
//! ```rust
//! use shadowloader::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! assert_eq!(parser.read_be::<u16>()?, 0);
//! assert_eq!(parser.read_be::<u16>()?, 52);
//! # Ok::<(), shadowloader::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Result,
};

/// A generic binary data parser for reading class-file structures.
///
/// `Parser` maintains an internal position cursor and provides bounds checking
/// to prevent buffer overruns when reading malformed or truncated data.
///
/// # Examples
///
/// ```rust,no_run
/// use shadowloader::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut parser = Parser::new(&data);
///
/// let first = parser.read_be::<u32>()?;
/// assert_eq!(first, 0x01020304);
///
/// parser.seek(6)?;
/// let last_bytes = parser.read_be::<u16>()?;
/// assert_eq!(last_bytes, 0x0708);
/// # Ok::<(), shadowloader::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the data is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if self.position + step > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data buffer.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Number of bytes left between the cursor and the end of the data.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Peek at a value of type `T` in big-endian format without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading `T` would exceed the data length.
    pub fn peek_be<T: ClassIO>(&self) -> Result<T> {
        let mut temp_position = self.position;
        read_be_at::<T>(self.data, &mut temp_position)
    }

    /// Align the position to a specific boundary.
    ///
    /// `tableswitch` and `lookupswitch` pad their operands to a 4-byte boundary measured
    /// from the start of the method's code array, so the parser must wrap exactly that array.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if aligning would exceed the data length.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        if self.position + padding > self.data.len() {
            return Err(out_of_bounds_error!());
        }
        self.position += padding;
        Ok(())
    }

    /// Read a type `T` from the current position in big-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `length` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        if length > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let slice = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }

    /// Read a `u16`-length-prefixed modified UTF-8 string (`CONSTANT_Utf8_info` payload).
    ///
    /// Modified UTF-8 encodes NUL as `C0 80` and supplementary characters as surrogate
    /// pairs of three-byte sequences. Unpaired surrogates are replaced with U+FFFD.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated data, or
    /// [`crate::Error::Malformed`] on an invalid byte sequence.
    pub fn read_modified_utf8(&mut self) -> Result<String> {
        let length = self.read_be::<u16>()? as usize;
        let bytes = self.read_bytes(length)?;
        decode_modified_utf8(bytes)
    }
}

/// Decode modified UTF-8 into a Rust [`String`].
///
/// Lossy for unpaired surrogates. The constant pool keeps such entries as bytes.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the sequence is not valid modified UTF-8.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        let first = bytes[index];
        if first & 0x80 == 0 {
            if first == 0 {
                return Err(malformed_error!("Raw NUL byte in modified UTF-8"));
            }
            units.push(u16::from(first));
            index += 1;
        } else if first & 0xE0 == 0xC0 {
            let Some(&second) = bytes.get(index + 1) else {
                return Err(malformed_error!("Truncated two-byte sequence"));
            };
            if second & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation byte 0x{:02X}", second));
            }
            units.push((u16::from(first & 0x1F) << 6) | u16::from(second & 0x3F));
            index += 2;
        } else if first & 0xF0 == 0xE0 {
            let (Some(&second), Some(&third)) = (bytes.get(index + 1), bytes.get(index + 2)) else {
                return Err(malformed_error!("Truncated three-byte sequence"));
            };
            if second & 0xC0 != 0x80 || third & 0xC0 != 0x80 {
                return Err(malformed_error!("Invalid continuation in three-byte sequence"));
            }
            units.push(
                (u16::from(first & 0x0F) << 12)
                    | (u16::from(second & 0x3F) << 6)
                    | u16::from(third & 0x3F),
            );
            index += 3;
        } else {
            return Err(malformed_error!("Invalid modified UTF-8 lead byte 0x{:02X}", first));
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

/// Encode a Rust string as modified UTF-8 (without the length prefix).
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => {
                #[allow(clippy::cast_possible_truncation)]
                out.push(unit as u8);
            }
            0x0000 | 0x0080..=0x07FF => {
                #[allow(clippy::cast_possible_truncation)]
                {
                    out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
            }
            _ => {
                #[allow(clippy::cast_possible_truncation)]
                {
                    out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
            }
        }
    }
    out
}
