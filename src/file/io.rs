//! Low-level big-endian I/O for class-file primitives.
//!
//! The JVM class format (JVMS §4) stores every multi-byte quantity in big-endian order.
//! This module provides the [`ClassIO`] trait implemented for all fixed-size primitives used
//! by the format, together with bounds-checked reader and writer helpers that the
//! [`crate::file::parser::Parser`] and the class-file serializer are built on.
//!
//! # Examples
//!
//! ```rust,ignore
//! use shadowloader::file::io::{read_be_at, write_be};
//!
//! let mut buffer = Vec::new();
//! write_be(&mut buffer, 0xCAFE_BABE_u32);
//!
//! let mut offset = 0;
//! let magic: u32 = read_be_at(&buffer, &mut offset)?;
//! assert_eq!(magic, 0xCAFE_BABE);
//! # Ok::<(), shadowloader::Error>(())
//! ```

use crate::Result;

/// Trait for fixed-size primitives that can be read from and written to class-file data.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in big-endian byte order from the start of `data`.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Safely reads a value of type `T` in big-endian byte order at `offset`, advancing it.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Appends `value` to `buffer` in big-endian byte order.
pub fn write_be<T: ClassIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_be_bytes().as_ref());
}

/// Overwrites the bytes at `offset` with `value` in big-endian byte order.
///
/// Used to back-patch placeholders such as branch offsets and attribute lengths.
///
/// # Errors
///
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit at `offset`.
pub fn patch_be<T: ClassIO>(buffer: &mut [u8], offset: usize, value: T) -> Result<()> {
    let bytes = value.to_be_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(out_of_bounds_error!());
    };
    if end > buffer.len() {
        return Err(out_of_bounds_error!());
    }

    buffer[offset..end].copy_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_be_primitives() {
        let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34];
        let mut offset = 0;

        assert_eq!(read_be_at::<u32>(&data, &mut offset).unwrap(), 0xCAFE_BABE);
        assert_eq!(read_be_at::<u16>(&data, &mut offset).unwrap(), 52);
        assert_eq!(offset, 6);
    }

    #[test]
    fn test_read_be_out_of_bounds() {
        let data = [0x01, 0x02];
        let mut offset = 1;
        assert!(matches!(
            read_be_at::<u16>(&data, &mut offset),
            Err(Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_write_and_patch() {
        let mut buffer = Vec::new();
        write_be(&mut buffer, -2_i16);
        write_be(&mut buffer, 0_u32);
        patch_be(&mut buffer, 2, 0x0102_0304_u32).unwrap();

        assert_eq!(buffer, vec![0xFF, 0xFE, 0x01, 0x02, 0x03, 0x04]);
        assert!(patch_be(&mut buffer, 4, 0_u32).is_err());
    }

    #[test]
    fn test_float_bits_survive() {
        let mut buffer = Vec::new();
        write_be(&mut buffer, 1.5_f64);
        assert_eq!(read_be::<f64>(&buffer).unwrap(), 1.5);
    }
}
