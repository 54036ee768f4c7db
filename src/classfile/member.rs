//! Declared fields and methods (JVMS §4.5, §4.6).
//!
//! Members own their name and descriptor strings. Attributes stay raw bytes, and `Code` and
//! `Exceptions` are decoded on demand.

use crate::{
    classfile::{
        access::{FieldAccessFlags, MethodAccessFlags},
        attributes::{
            find_attribute, parse_attributes, parse_exceptions, write_attributes, Attribute,
            CodeAttribute, CODE, EXCEPTIONS,
        },
        constantpool::ConstantPool,
        descriptor::MethodDescriptor,
    },
    file::{io::write_be, parser::Parser},
    Result,
};

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of the static initializer
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// A field declared by a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Access flags
    pub access: FieldAccessFlags,
    /// Simple name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// Attributes, undecoded
    pub attributes: Vec<Attribute>,
}

impl FieldInfo {
    /// Create a field without attributes
    #[must_use]
    pub fn new(access: FieldAccessFlags, name: &str, descriptor: &str) -> Self {
        FieldInfo {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
        }
    }

    pub(crate) fn parse(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Self> {
        let access = FieldAccessFlags::from_bits_retain(parser.read_be()?);
        let name = pool.utf8(parser.read_be()?)?.to_string();
        let descriptor = pool.utf8(parser.read_be()?)?.to_string();
        let attributes = parse_attributes(parser, pool)?;

        Ok(FieldInfo {
            access,
            name,
            descriptor,
            attributes,
        })
    }

    pub(crate) fn write(&self, buffer: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<()> {
        write_be(buffer, self.access.bits());
        write_be(buffer, pool.add_utf8(&self.name)?);
        write_be(buffer, pool.add_utf8(&self.descriptor)?);
        write_attributes(&self.attributes, buffer, pool)
    }
}

/// A method declared by a class.
///
/// Name and descriptor are resolved strings; everything else the transformer does not look
/// into stays in `attributes` as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    /// Access flags
    pub access: MethodAccessFlags,
    /// Simple name, `<init>` or `<clinit>`
    pub name: String,
    /// Method descriptor string
    pub descriptor: String,
    /// Attributes, undecoded
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    /// Create a method without attributes
    #[must_use]
    pub fn new(access: MethodAccessFlags, name: &str, descriptor: &str) -> Self {
        MethodInfo {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
        }
    }

    pub(crate) fn parse(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Self> {
        let access = MethodAccessFlags::from_bits_retain(parser.read_be()?);
        let name = pool.utf8(parser.read_be()?)?.to_string();
        let descriptor = pool.utf8(parser.read_be()?)?.to_string();
        let attributes = parse_attributes(parser, pool)?;

        Ok(MethodInfo {
            access,
            name,
            descriptor,
            attributes,
        })
    }

    pub(crate) fn write(&self, buffer: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<()> {
        write_be(buffer, self.access.bits());
        write_be(buffer, pool.add_utf8(&self.name)?);
        write_be(buffer, pool.add_utf8(&self.descriptor)?);
        write_attributes(&self.attributes, buffer, pool)
    }

    /// `true` for `<init>`
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `true` for `<clinit>`
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }

    /// `true` if the method is `static`
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    /// Parse the descriptor string.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor> {
        self.descriptor.parse()
    }

    /// Find an attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }

    /// Decode the `Code` attribute, `None` for abstract and native methods.
    ///
    /// # Errors
    /// Returns an error if the attribute is malformed.
    pub fn code(&self, pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        self.attribute(CODE)
            .map(|attribute| CodeAttribute::parse(&attribute.info, pool))
            .transpose()
    }

    /// Replace (or add) the `Code` attribute.
    ///
    /// # Errors
    /// Returns an error if the code can not be serialized.
    pub fn set_code(&mut self, code: &CodeAttribute, pool: &mut ConstantPool) -> Result<()> {
        let attribute = code.to_attribute(pool)?;
        match self.attributes.iter_mut().find(|existing| existing.name == CODE) {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
        Ok(())
    }

    /// Declared exception class names from the `Exceptions` attribute.
    ///
    /// # Errors
    /// Returns an error if the attribute is malformed.
    pub fn exceptions(&self, pool: &ConstantPool) -> Result<Vec<String>> {
        match self.attribute(EXCEPTIONS) {
            Some(attribute) => parse_exceptions(&attribute.info, pool),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::attributes::exceptions_attribute;

    #[test]
    fn test_method_round_trip() {
        let mut pool = ConstantPool::new();
        let mut method = MethodInfo::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "run",
            "(I)V",
        );
        method
            .attributes
            .push(exceptions_attribute(&["java/lang/Exception".to_string()], &mut pool).unwrap());

        let mut buffer = Vec::new();
        method.write(&mut buffer, &mut pool).unwrap();

        let mut parser = Parser::new(&buffer);
        let parsed = MethodInfo::parse(&mut parser, &pool).unwrap();
        assert_eq!(parsed, method);
        assert!(parsed.is_static());
        assert!(parsed.code(&pool).unwrap().is_none());
        assert_eq!(parsed.exceptions(&pool).unwrap(), vec!["java/lang/Exception"]);
    }

    #[test]
    fn test_member_kinds() {
        let constructor = MethodInfo::new(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V");
        let initializer = MethodInfo::new(MethodAccessFlags::STATIC, STATIC_INITIALIZER_NAME, "()V");
        assert!(constructor.is_constructor());
        assert!(!constructor.is_static_initializer());
        assert!(initializer.is_static_initializer());
    }
}
