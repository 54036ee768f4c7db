//! The top-level `ClassFile` structure (JVMS §4.1).

use crate::{
    classfile::{
        access::ClassAccessFlags,
        attributes::{count_u16, parse_attributes, write_attributes, Attribute},
        constantpool::ConstantPool,
        member::{FieldInfo, MethodInfo},
    },
    file::{io::write_be, parser::Parser},
    Error, Result,
};

/// Magic number at the start of every class file
pub const MAGIC: u32 = 0xCAFE_BABE;
/// First major version whose verifier requires `StackMapTable` frames
pub const STACK_MAP_MAJOR: u16 = 50;
/// First major version that allows `ldc` of class constants
pub const CLASS_LITERAL_MAJOR: u16 = 49;

/// A parsed compiled unit.
///
/// `ClassFile` owns its constant pool. Callers that add members intern the constants they
/// need directly into [`ClassFile::pool`]; [`ClassFile::to_bytes`] interns the remaining
/// member names on a copy before writing.
///
/// # Examples
///
/// ```rust,no_run
/// use shadowloader::ClassFile;
///
/// let bytes = std::fs::read("Example.class")?;
/// let class = ClassFile::parse(&bytes)?;
/// println!("{} extends {:?}", class.name, class.super_name);
/// for method in &class.methods {
///     println!("  {}{}", method.name, method.descriptor);
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct ClassFile {
    /// Minor version
    pub minor_version: u16,
    /// Major version (52 = Java 8)
    pub major_version: u16,
    /// The constant pool
    pub pool: ConstantPool,
    /// Class access flags
    pub access: ClassAccessFlags,
    /// Internal name of this class (`a/b/Outer$Inner`)
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Internal names of directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields in order
    pub fields: Vec<FieldInfo>,
    /// Declared methods in order
    pub methods: Vec<MethodInfo>,
    /// Class-level attributes, undecoded
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse a class file from bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] for a
    /// wrong magic number, and [`crate::Error::Malformed`] / [`crate::Error::OutOfBounds`] for
    /// damaged data.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Empty);
        }

        let mut parser = Parser::new(data);
        let magic = parser.read_be::<u32>()?;
        if magic != MAGIC {
            return Err(Error::NotSupported(format!(
                "not a class file (magic 0x{magic:08X})"
            )));
        }

        let minor_version = parser.read_be::<u16>()?;
        let major_version = parser.read_be::<u16>()?;
        let pool = ConstantPool::parse(&mut parser)?;

        let access = ClassAccessFlags::from_bits_retain(parser.read_be()?);
        let name = pool.class_name(parser.read_be()?)?.to_string();
        let super_name = match parser.read_be::<u16>()? {
            0 => None,
            index => Some(pool.class_name(index)?.to_string()),
        };

        let interface_count = parser.read_be::<u16>()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(parser.read_be()?)?.to_string());
        }

        let field_count = parser.read_be::<u16>()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            fields.push(FieldInfo::parse(&mut parser, &pool)?);
        }

        let method_count = parser.read_be::<u16>()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(MethodInfo::parse(&mut parser, &pool)?);
        }

        let attributes = parse_attributes(&mut parser, &pool)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after class file",
                parser.remaining()
            ));
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            pool,
            access,
            name,
            super_name,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Serialize to class-file bytes.
    ///
    /// Existing pool indices are preserved; names introduced since parsing are appended.
    ///
    /// # Errors
    /// Returns an error if a table outgrows the format's limits.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut pool = self.pool.clone();
        let mut body = Vec::with_capacity(1024);

        write_be(&mut body, self.access.bits());
        write_be(&mut body, pool.add_class(&self.name)?);
        match &self.super_name {
            Some(super_name) => write_be(&mut body, pool.add_class(super_name)?),
            None => write_be(&mut body, 0_u16),
        }

        write_be(&mut body, count_u16(self.interfaces.len(), "interfaces")?);
        for interface in &self.interfaces {
            write_be(&mut body, pool.add_class(interface)?);
        }

        write_be(&mut body, count_u16(self.fields.len(), "fields")?);
        for field in &self.fields {
            field.write(&mut body, &mut pool)?;
        }

        write_be(&mut body, count_u16(self.methods.len(), "methods")?);
        for method in &self.methods {
            method.write(&mut body, &mut pool)?;
        }

        write_attributes(&self.attributes, &mut body, &mut pool)?;

        let mut out = Vec::with_capacity(body.len() + pool.len() * 8 + 10);
        write_be(&mut out, MAGIC);
        write_be(&mut out, self.minor_version);
        write_be(&mut out, self.major_version);
        pool.write(&mut out)?;
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// The dotted, fully-qualified name (`a.b.Outer$Inner`)
    #[must_use]
    pub fn java_name(&self) -> String {
        self.name.replace('/', ".")
    }

    /// `true` for interfaces (including annotation types)
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a method by name and descriptor
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodInfo> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }

    /// Find a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// `true` if the class file version requires `StackMapTable` frames
    #[must_use]
    pub fn requires_frames(&self) -> bool {
        self.major_version >= STACK_MAP_MAJOR
    }
}

/// Convert a dotted name to the internal slash form
#[must_use]
pub fn internal_name(java_name: &str) -> String {
    java_name.replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::factories::simple_class;

    #[test]
    fn test_parse_serialized_class() {
        let bytes = simple_class("p/Sample");
        let class = ClassFile::parse(&bytes).unwrap();

        assert_eq!(class.name, "p/Sample");
        assert_eq!(class.java_name(), "p.Sample");
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert!(class.method("<init>", "()V").is_some());
        assert!(!class.is_interface());
    }

    #[test]
    fn test_reserialize_is_stable() {
        let bytes = simple_class("p/Sample");
        let class = ClassFile::parse(&bytes).unwrap();
        let again = class.to_bytes().unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn test_bad_magic_and_empty() {
        assert!(matches!(ClassFile::parse(&[]), Err(Error::Empty)));
        assert!(matches!(
            ClassFile::parse(&[0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 52]),
            Err(Error::NotSupported(_))
        ));
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE, 0xBA]),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
