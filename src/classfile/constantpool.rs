//! The class-file constant pool (JVMS §4.4).
//!
//! [`ConstantPool`] holds every entry of a parsed unit in its original order, so that
//! attributes kept as raw bytes continue to reference valid indices. New entries are only
//! ever appended and are interned: asking for an entry that already exists returns the
//! existing index instead of growing the pool.
//!
//! # Examples
//!
//! ```rust
//! use shadowloader::classfile::ConstantPool;
//!
//! let mut pool = ConstantPool::new();
//! let first = pool.add_method_ref("java/lang/Object", "<init>", "()V")?;
//! let again = pool.add_method_ref("java/lang/Object", "<init>", "()V")?;
//! assert_eq!(first, again);
//!
//! let member = pool.member_ref(first)?;
//! assert_eq!(member.owner, "java/lang/Object");
//! # Ok::<(), shadowloader::Error>(())
//! ```

use std::{borrow::Cow, collections::HashMap};

use strum::{Display, FromRepr};

use crate::{
    file::{
        io::write_be,
        parser::{decode_modified_utf8, encode_modified_utf8, Parser},
    },
    Error, Result,
};

/// Tag byte of a constant pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ConstantTag {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

/// One constant pool entry.
///
/// Floating point constants are stored as raw bits so entries stay hashable and round-trip
/// exactly (including NaN payloads). A `CONSTANT_Utf8` whose bytes have no exact Rust string
/// form, such as an unpaired surrogate, is kept as [`Constant::RawUtf8`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Constant {
    /// Index 0, and the second slot occupied by every `Long` and `Double`
    Unusable,
    Utf8(String),
    /// `CONSTANT_Utf8` bytes written back verbatim
    RawUtf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
}

impl Constant {
    /// Tag of this entry, `None` for [`Constant::Unusable`]
    #[must_use]
    pub fn tag(&self) -> Option<ConstantTag> {
        Some(match self {
            Constant::Unusable => return None,
            Constant::Utf8(_) | Constant::RawUtf8(_) => ConstantTag::Utf8,
            Constant::Integer(_) => ConstantTag::Integer,
            Constant::Float(_) => ConstantTag::Float,
            Constant::Long(_) => ConstantTag::Long,
            Constant::Double(_) => ConstantTag::Double,
            Constant::Class { .. } => ConstantTag::Class,
            Constant::String { .. } => ConstantTag::String,
            Constant::Fieldref { .. } => ConstantTag::Fieldref,
            Constant::Methodref { .. } => ConstantTag::Methodref,
            Constant::InterfaceMethodref { .. } => ConstantTag::InterfaceMethodref,
            Constant::NameAndType { .. } => ConstantTag::NameAndType,
            Constant::MethodHandle { .. } => ConstantTag::MethodHandle,
            Constant::MethodType { .. } => ConstantTag::MethodType,
            Constant::Dynamic { .. } => ConstantTag::Dynamic,
            Constant::InvokeDynamic { .. } => ConstantTag::InvokeDynamic,
            Constant::Module { .. } => ConstantTag::Module,
            Constant::Package { .. } => ConstantTag::Package,
        })
    }

    /// Classify the payload of a `CONSTANT_Utf8`.
    ///
    /// The entry is [`Constant::Utf8`] only if encoding the decoded text gives back exactly
    /// `bytes`. Unpaired surrogates and non-shortest forms stay [`Constant::RawUtf8`].
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is not modified UTF-8 at all.
    pub fn from_modified_utf8(bytes: &[u8]) -> Result<Self> {
        let text = decode_modified_utf8(bytes)?;
        if encode_modified_utf8(&text) == bytes {
            Ok(Constant::Utf8(text))
        } else {
            Ok(Constant::RawUtf8(bytes.to_vec()))
        }
    }

    /// `Long` and `Double` entries take two pool slots
    #[must_use]
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

/// A resolved `Fieldref`, `Methodref` or `InterfaceMethodref`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef<'a> {
    /// Internal name of the declaring class (`java/lang/Object`)
    pub owner: &'a str,
    /// Member name
    pub name: &'a str,
    /// Field or method descriptor
    pub descriptor: &'a str,
    /// `true` for `InterfaceMethodref`
    pub interface: bool,
}

/// Ordered, append-only and interning constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    /// Create an empty pool (containing only the reserved index 0).
    #[must_use]
    pub fn new() -> Self {
        ConstantPool {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// Parse `constant_pool_count` followed by the entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown tags or a zero count, and
    /// [`crate::Error::OutOfBounds`] on truncated data.
    pub fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("constant_pool_count must be at least 1"));
        }

        let mut pool = ConstantPool::new();
        while pool.entries.len() < count as usize {
            let tag_byte = parser.read_be::<u8>()?;
            let Some(tag) = ConstantTag::from_repr(tag_byte) else {
                return Err(malformed_error!(
                    "Unknown constant pool tag {} at index {}",
                    tag_byte,
                    pool.entries.len()
                ));
            };

            let entry = match tag {
                ConstantTag::Utf8 => {
                    let length = parser.read_be::<u16>()? as usize;
                    Constant::from_modified_utf8(parser.read_bytes(length)?)?
                }
                ConstantTag::Integer => Constant::Integer(parser.read_be()?),
                ConstantTag::Float => Constant::Float(parser.read_be()?),
                ConstantTag::Long => Constant::Long(parser.read_be()?),
                ConstantTag::Double => Constant::Double(parser.read_be()?),
                ConstantTag::Class => Constant::Class {
                    name_index: parser.read_be()?,
                },
                ConstantTag::String => Constant::String {
                    string_index: parser.read_be()?,
                },
                ConstantTag::Fieldref => Constant::Fieldref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                ConstantTag::Methodref => Constant::Methodref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                ConstantTag::InterfaceMethodref => Constant::InterfaceMethodref {
                    class_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                ConstantTag::NameAndType => Constant::NameAndType {
                    name_index: parser.read_be()?,
                    descriptor_index: parser.read_be()?,
                },
                ConstantTag::MethodHandle => Constant::MethodHandle {
                    reference_kind: parser.read_be()?,
                    reference_index: parser.read_be()?,
                },
                ConstantTag::MethodType => Constant::MethodType {
                    descriptor_index: parser.read_be()?,
                },
                ConstantTag::Dynamic => Constant::Dynamic {
                    bootstrap_method_attr_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                ConstantTag::InvokeDynamic => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: parser.read_be()?,
                    name_and_type_index: parser.read_be()?,
                },
                ConstantTag::Module => Constant::Module {
                    name_index: parser.read_be()?,
                },
                ConstantTag::Package => Constant::Package {
                    name_index: parser.read_be()?,
                },
            };

            let wide = entry.is_wide();
            pool.push_indexed(entry);
            if wide {
                if pool.entries.len() >= count as usize {
                    return Err(malformed_error!("Wide constant occupies the last pool slot"));
                }
                pool.entries.push(Constant::Unusable);
            }
        }

        Ok(pool)
    }

    /// Serialize `constant_pool_count` and all entries.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a UTF-8 entry exceeds 65535 encoded bytes.
    pub fn write(&self, buffer: &mut Vec<u8>) -> Result<()> {
        write_be(buffer, self.count()?);

        for entry in &self.entries {
            let Some(tag) = entry.tag() else {
                continue;
            };
            write_be(buffer, tag as u8);

            match entry {
                Constant::Unusable => {}
                Constant::Utf8(value) => write_utf8(buffer, &encode_modified_utf8(value))?,
                Constant::RawUtf8(bytes) => write_utf8(buffer, bytes)?,
                Constant::Integer(value) => write_be(buffer, *value),
                Constant::Float(bits) => write_be(buffer, *bits),
                Constant::Long(value) => write_be(buffer, *value),
                Constant::Double(bits) => write_be(buffer, *bits),
                Constant::Class { name_index }
                | Constant::Module { name_index }
                | Constant::Package { name_index } => write_be(buffer, *name_index),
                Constant::String { string_index } => write_be(buffer, *string_index),
                Constant::Fieldref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::Methodref {
                    class_index,
                    name_and_type_index,
                }
                | Constant::InterfaceMethodref {
                    class_index,
                    name_and_type_index,
                } => {
                    write_be(buffer, *class_index);
                    write_be(buffer, *name_and_type_index);
                }
                Constant::NameAndType {
                    name_index,
                    descriptor_index,
                } => {
                    write_be(buffer, *name_index);
                    write_be(buffer, *descriptor_index);
                }
                Constant::MethodHandle {
                    reference_kind,
                    reference_index,
                } => {
                    write_be(buffer, *reference_kind);
                    write_be(buffer, *reference_index);
                }
                Constant::MethodType { descriptor_index } => write_be(buffer, *descriptor_index),
                Constant::Dynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                }
                | Constant::InvokeDynamic {
                    bootstrap_method_attr_index,
                    name_and_type_index,
                } => {
                    write_be(buffer, *bootstrap_method_attr_index);
                    write_be(buffer, *name_and_type_index);
                }
            }
        }

        Ok(())
    }

    /// The `constant_pool_count` value: number of slots including index 0.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool outgrew the format's limit.
    pub fn count(&self) -> Result<u16> {
        u16::try_from(self.entries.len())
            .map_err(|_| Error::NotSupported("constant pool exceeds 65535 slots".to_string()))
    }

    /// Number of slots including index 0
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the pool holds no entry besides the reserved index 0
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Iterate over `(index, entry)` pairs, skipping unusable slots.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !matches!(entry, Constant::Unusable))
            .filter_map(|(index, entry)| u16::try_from(index).ok().map(|index| (index, entry)))
    }

    /// Get the entry at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, an out of range index, or the
    /// unusable upper slot of a wide constant.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(malformed_error!(
                "Invalid constant pool index {} (pool has {} slots)",
                index,
                self.entries.len()
            )),
            Some(entry) => Ok(entry),
        }
    }

    /// Resolve a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a UTF-8 entry.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            Constant::RawUtf8(_) => Err(malformed_error!(
                "Constant {} has no exact string form",
                index
            )),
            other => Err(malformed_error!(
                "Constant {} is {:?}, expected Utf8",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a `CONSTANT_Utf8` entry for display or emulation.
    ///
    /// Entries without an exact string form are decoded with unpaired surrogates replaced
    /// by U+FFFD. The pool itself is not changed.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a UTF-8 entry.
    pub fn utf8_lossy(&self, index: u16) -> Result<Cow<'_, str>> {
        match self.get(index)? {
            Constant::RawUtf8(bytes) => Ok(Cow::Owned(decode_modified_utf8(bytes)?)),
            _ => self.utf8(index).map(Cow::Borrowed),
        }
    }

    /// The modified UTF-8 bytes a `CONSTANT_Utf8` entry serializes to.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a UTF-8 entry.
    pub fn utf8_bytes(&self, index: u16) -> Result<Cow<'_, [u8]>> {
        match self.get(index)? {
            Constant::RawUtf8(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            _ => Ok(Cow::Owned(encode_modified_utf8(self.utf8(index)?))),
        }
    }

    /// Resolve a `CONSTANT_Class` entry to its internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a class entry.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            other => Err(malformed_error!(
                "Constant {} is {:?}, expected Class",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a `CONSTANT_NameAndType` entry to `(name, descriptor)`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a name-and-type entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(malformed_error!(
                "Constant {} is {:?}, expected NameAndType",
                index,
                other.tag()
            )),
        }
    }

    /// Resolve a field or method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or not a member reference.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>> {
        let (class_index, name_and_type_index, interface) = match self.get(index)? {
            Constant::Fieldref {
                class_index,
                name_and_type_index,
            }
            | Constant::Methodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, false),
            Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index, true),
            other => {
                return Err(malformed_error!(
                    "Constant {} is {:?}, expected a member reference",
                    index,
                    other.tag()
                ))
            }
        };

        let (name, descriptor) = self.name_and_type(name_and_type_index)?;
        Ok(MemberRef {
            owner: self.class_name(class_index)?,
            name,
            descriptor,
            interface,
        })
    }

    /// Resolve the `(name, descriptor)` of a `CONSTANT_InvokeDynamic` or `CONSTANT_Dynamic`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the index is invalid or of another kind.
    pub fn dynamic_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                name_and_type_index,
                ..
            }
            | Constant::Dynamic {
                name_and_type_index,
                ..
            } => self.name_and_type(*name_and_type_index),
            other => Err(malformed_error!(
                "Constant {} is {:?}, expected a dynamic constant",
                index,
                other.tag()
            )),
        }
    }

    /// Intern a `CONSTANT_Utf8`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(value.to_string()))
    }

    /// Intern a `CONSTANT_Utf8` given as modified UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is not modified UTF-8, or
    /// [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_modified_utf8(&mut self, bytes: &[u8]) -> Result<u16> {
        self.intern(Constant::from_modified_utf8(bytes)?)
    }

    /// Intern a `CONSTANT_String` whose value is given as modified UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `bytes` is not modified UTF-8, or
    /// [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_modified_string(&mut self, bytes: &[u8]) -> Result<u16> {
        let string_index = self.add_modified_utf8(bytes)?;
        self.intern(Constant::String { string_index })
    }

    /// Intern a `CONSTANT_Integer`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.intern(Constant::Integer(value))
    }

    /// Intern a `CONSTANT_Class` for an internal name or array descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name_index = self.add_utf8(internal_name)?;
        self.intern(Constant::Class { name_index })
    }

    /// Intern a `CONSTANT_String`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let string_index = self.add_utf8(value)?;
        self.intern(Constant::String { string_index })
    }

    /// Intern a `CONSTANT_NameAndType`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.intern(Constant::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    /// Intern a `CONSTANT_Fieldref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    /// Intern a `CONSTANT_Methodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    /// Intern a `CONSTANT_InterfaceMethodref`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if the pool is full.
    pub fn add_interface_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16> {
        let class_index = self.add_class(owner)?;
        let name_and_type_index = self.add_name_and_type(name, descriptor)?;
        self.intern(Constant::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    fn intern(&mut self, entry: Constant) -> Result<u16> {
        if let Some(&index) = self.lookup.get(&entry) {
            return Ok(index);
        }

        let slots = if entry.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > usize::from(u16::MAX) {
            return Err(Error::NotSupported(
                "constant pool exceeds 65535 slots".to_string(),
            ));
        }

        let wide = entry.is_wide();
        let index = self.push_indexed(entry);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    fn push_indexed(&mut self, entry: Constant) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let index = self.entries.len() as u16;
        // First occurrence wins so lookups return the lowest index for duplicated entries
        self.lookup.entry(entry.clone()).or_insert(index);
        self.entries.push(entry);
        index
    }
}

fn write_utf8(buffer: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let length = u16::try_from(bytes.len())
        .map_err(|_| malformed_error!("UTF-8 constant exceeds 65535 bytes"))?;
    write_be(buffer, length);
    buffer.extend_from_slice(bytes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_reuses_entries() {
        let mut pool = ConstantPool::new();
        let object = pool.add_class("java/lang/Object").unwrap();
        let utf8 = pool.add_utf8("java/lang/Object").unwrap();

        assert_eq!(object, 2);
        assert_eq!(utf8, 1);
        assert_eq!(pool.add_class("java/lang/Object").unwrap(), object);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_round_trip_with_wide_entries() {
        let mut pool = ConstantPool::new();
        pool.add_utf8("name").unwrap();
        pool.intern(Constant::Long(-7)).unwrap();
        pool.intern(Constant::Double(2.5_f64.to_bits())).unwrap();
        let method = pool.add_method_ref("a/B", "run", "(J)V").unwrap();

        let mut buffer = Vec::new();
        pool.write(&mut buffer).unwrap();

        let mut parser = Parser::new(&buffer);
        let parsed = ConstantPool::parse(&mut parser).unwrap();

        assert_eq!(parsed.len(), pool.len());
        assert_eq!(parsed.get(2).unwrap(), &Constant::Long(-7));
        assert!(parsed.get(3).is_err());
        let member = parsed.member_ref(method).unwrap();
        assert_eq!(member.owner, "a/B");
        assert_eq!(member.name, "run");
        assert_eq!(member.descriptor, "(J)V");
        assert!(!member.interface);
    }

    #[test]
    fn test_unpaired_surrogate_is_written_back_verbatim() {
        // "\uD800" and a non-shortest 'A'
        let lone = [0xED, 0xA0, 0x80];
        let overlong = [0xC1, 0x81];

        let mut pool = ConstantPool::new();
        let string = pool.add_modified_string(&lone).unwrap();
        let other = pool.add_modified_utf8(&overlong).unwrap();
        let plain = pool.add_modified_utf8(b"plain").unwrap();
        assert_eq!(pool.get(plain).unwrap(), &Constant::Utf8("plain".to_string()));

        let mut buffer = Vec::new();
        pool.write(&mut buffer).unwrap();
        let parsed = ConstantPool::parse(&mut Parser::new(&buffer)).unwrap();

        let Constant::String { string_index } = parsed.get(string).unwrap() else {
            panic!("expected a string constant");
        };
        assert_eq!(parsed.get(*string_index).unwrap(), &Constant::RawUtf8(lone.to_vec()));
        assert_eq!(parsed.utf8_bytes(*string_index).unwrap().as_ref(), &lone);
        assert_eq!(parsed.utf8_bytes(other).unwrap().as_ref(), &overlong);
        assert_eq!(parsed.utf8_lossy(*string_index).unwrap(), "\u{FFFD}");
        assert!(matches!(parsed.utf8(*string_index), Err(Error::Malformed { .. })));

        let mut again = Vec::new();
        parsed.write(&mut again).unwrap();
        assert_eq!(again, buffer);
    }

    #[test]
    fn test_type_mismatch_is_malformed() {
        let mut pool = ConstantPool::new();
        let index = pool.add_integer(5).unwrap();

        assert!(matches!(pool.utf8(index), Err(Error::Malformed { .. })));
        assert!(pool.class_name(0).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let data = [0x00, 0x02, 0x02, 0x00];
        let mut parser = Parser::new(&data);
        assert!(matches!(
            ConstantPool::parse(&mut parser),
            Err(Error::Malformed { .. })
        ));
    }
}
