//! Attributes of classes, fields, methods and code (JVMS §4.7).
//!
//! Attributes are kept as raw `(name, info)` pairs unless the instrumentation pass needs to
//! look inside them. The few it does understand (`Code`, `Exceptions`, `LineNumberTable`,
//! `LocalVariableTable` and `LocalVariableTypeTable`) have typed views with parse and write
//! support. Raw attribute payloads reference constant pool indices; since the pool is
//! append-only those references stay valid through every rewrite.

use crate::{
    classfile::constantpool::ConstantPool,
    file::{io::write_be, parser::Parser},
    Result,
};

/// Name of the method body attribute
pub const CODE: &str = "Code";
/// Name of the declared-exceptions attribute
pub const EXCEPTIONS: &str = "Exceptions";
/// Name of the generic signature attribute
pub const SIGNATURE: &str = "Signature";
/// Name of the verification frame attribute
pub const STACK_MAP_TABLE: &str = "StackMapTable";
/// Name of the source line mapping attribute
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
/// Name of the local variable debug attribute
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
/// Name of the generic local variable debug attribute
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";

/// An attribute with its name resolved and its payload left undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name (`Code`, `Signature`, ...)
    pub name: String,
    /// Raw `info` bytes following `attribute_length`
    pub info: Vec<u8>,
}

impl Attribute {
    /// Create a new attribute from a name and payload
    #[must_use]
    pub fn new(name: &str, info: Vec<u8>) -> Self {
        Attribute {
            name: name.to_string(),
            info,
        }
    }

    /// Parse a single `attribute_info`.
    ///
    /// # Errors
    /// Returns an error on truncated data or an invalid name index.
    pub fn parse(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Self> {
        let name_index = parser.read_be::<u16>()?;
        let length = parser.read_be::<u32>()? as usize;
        let info = parser.read_bytes(length)?.to_vec();

        Ok(Attribute {
            name: pool.utf8(name_index)?.to_string(),
            info,
        })
    }

    /// Serialize this attribute, interning its name.
    ///
    /// # Errors
    /// Returns an error if the pool is full or the payload exceeds 4 GiB.
    pub fn write(&self, buffer: &mut Vec<u8>, pool: &mut ConstantPool) -> Result<()> {
        write_be(buffer, pool.add_utf8(&self.name)?);
        let length = u32::try_from(self.info.len())
            .map_err(|_| malformed_error!("Attribute '{}' is too large", self.name))?;
        write_be(buffer, length);
        buffer.extend_from_slice(&self.info);
        Ok(())
    }
}

/// Parse a `u16`-counted attribute list.
///
/// # Errors
/// Returns an error on truncated data or an invalid name index.
pub fn parse_attributes(parser: &mut Parser<'_>, pool: &ConstantPool) -> Result<Vec<Attribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        attributes.push(Attribute::parse(parser, pool)?);
    }
    Ok(attributes)
}

/// Serialize a `u16`-counted attribute list.
///
/// # Errors
/// Returns an error if the list or an attribute is too large, or the pool is full.
pub fn write_attributes(
    attributes: &[Attribute],
    buffer: &mut Vec<u8>,
    pool: &mut ConstantPool,
) -> Result<()> {
    write_be(buffer, count_u16(attributes.len(), "attributes")?);
    for attribute in attributes {
        attribute.write(buffer, pool)?;
    }
    Ok(())
}

/// Find an attribute by name
#[must_use]
pub fn find_attribute<'a>(attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|attribute| attribute.name == name)
}

pub(crate) fn count_u16(count: usize, what: &str) -> Result<u16> {
    u16::try_from(count).map_err(|_| malformed_error!("Too many {} ({})", what, count))
}

/// One entry of a `Code` attribute's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First covered offset (inclusive)
    pub start_pc: u16,
    /// Last covered offset (exclusive)
    pub end_pc: u16,
    /// Offset of the handler code
    pub handler_pc: u16,
    /// Class index of the caught type, 0 for `finally`
    pub catch_type: u16,
}

/// A decoded `Code` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Maximum operand stack depth in slots
    pub max_stack: u16,
    /// Number of local variable slots including parameters
    pub max_locals: u16,
    /// Raw bytecode
    pub code: Vec<u8>,
    /// Exception handlers in priority order
    pub exception_table: Vec<ExceptionHandler>,
    /// Nested attributes (`LineNumberTable`, `StackMapTable`, ...)
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decode the payload of a `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation and [`crate::Error::Malformed`] for
    /// an empty code array or an invalid nested attribute name.
    pub fn parse(info: &[u8], pool: &ConstantPool) -> Result<Self> {
        let mut parser = Parser::new(info);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;

        let code_length = parser.read_be::<u32>()? as usize;
        if code_length == 0 || code_length > 65535 {
            return Err(malformed_error!("Invalid code length {}", code_length));
        }
        let code = parser.read_bytes(code_length)?.to_vec();

        let handler_count = parser.read_be::<u16>()?;
        let mut exception_table = Vec::with_capacity(handler_count as usize);
        for _ in 0..handler_count {
            exception_table.push(ExceptionHandler {
                start_pc: parser.read_be()?,
                end_pc: parser.read_be()?,
                handler_pc: parser.read_be()?,
                catch_type: parser.read_be()?,
            });
        }

        let attributes = parse_attributes(&mut parser, pool)?;
        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after Code attribute",
                parser.remaining()
            ));
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// Serialize into a `Code` [`Attribute`], interning nested attribute names.
    ///
    /// # Errors
    /// Returns an error if a table is too large or the pool is full.
    pub fn to_attribute(&self, pool: &mut ConstantPool) -> Result<Attribute> {
        let mut info = Vec::with_capacity(self.code.len() + 32);
        write_be(&mut info, self.max_stack);
        write_be(&mut info, self.max_locals);
        let code_length = u32::try_from(self.code.len())
            .map_err(|_| malformed_error!("Code array is too large"))?;
        write_be(&mut info, code_length);
        info.extend_from_slice(&self.code);

        write_be(
            &mut info,
            count_u16(self.exception_table.len(), "exception handlers")?,
        );
        for handler in &self.exception_table {
            write_be(&mut info, handler.start_pc);
            write_be(&mut info, handler.end_pc);
            write_be(&mut info, handler.handler_pc);
            write_be(&mut info, handler.catch_type);
        }

        write_attributes(&self.attributes, &mut info, pool)?;
        Ok(Attribute::new(CODE, info))
    }

    /// Find a nested attribute by name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.attributes, name)
    }
}

/// Decode an `Exceptions` attribute into the declared exception class names.
///
/// # Errors
/// Returns an error on truncated data or an invalid class index.
pub fn parse_exceptions(info: &[u8], pool: &ConstantPool) -> Result<Vec<String>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        names.push(pool.class_name(parser.read_be()?)?.to_string());
    }
    Ok(names)
}

/// Encode an `Exceptions` attribute.
///
/// # Errors
/// Returns an error if the pool is full.
pub fn exceptions_attribute(names: &[String], pool: &mut ConstantPool) -> Result<Attribute> {
    let mut info = Vec::with_capacity(2 + names.len() * 2);
    write_be(&mut info, count_u16(names.len(), "exceptions")?);
    for name in names {
        write_be(&mut info, pool.add_class(name)?);
    }
    Ok(Attribute::new(EXCEPTIONS, info))
}

/// One `line_number_table` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    /// Offset at which the line starts
    pub start_pc: u16,
    /// Source line
    pub line: u16,
}

/// Decode a `LineNumberTable` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated data.
pub fn parse_line_numbers(info: &[u8]) -> Result<Vec<LineNumber>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut lines = Vec::with_capacity(count as usize);
    for _ in 0..count {
        lines.push(LineNumber {
            start_pc: parser.read_be()?,
            line: parser.read_be()?,
        });
    }
    Ok(lines)
}

/// Encode a `LineNumberTable` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 entries.
pub fn write_line_numbers(lines: &[LineNumber]) -> Result<Vec<u8>> {
    let mut info = Vec::with_capacity(2 + lines.len() * 4);
    write_be(&mut info, count_u16(lines.len(), "line numbers")?);
    for line in lines {
        write_be(&mut info, line.start_pc);
        write_be(&mut info, line.line);
    }
    Ok(info)
}

/// One entry of a `LocalVariableTable` or `LocalVariableTypeTable`.
///
/// The two tables share a layout; `descriptor_index` holds the signature index for the
/// type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    /// First offset where the variable is live
    pub start_pc: u16,
    /// Length of the live range
    pub length: u16,
    /// Name constant
    pub name_index: u16,
    /// Descriptor (or signature) constant
    pub descriptor_index: u16,
    /// Local slot
    pub index: u16,
}

/// Decode a `LocalVariableTable` or `LocalVariableTypeTable` payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncated data.
pub fn parse_local_variables(info: &[u8]) -> Result<Vec<LocalVariable>> {
    let mut parser = Parser::new(info);
    let count = parser.read_be::<u16>()?;
    let mut locals = Vec::with_capacity(count as usize);
    for _ in 0..count {
        locals.push(LocalVariable {
            start_pc: parser.read_be()?,
            length: parser.read_be()?,
            name_index: parser.read_be()?,
            descriptor_index: parser.read_be()?,
            index: parser.read_be()?,
        });
    }
    Ok(locals)
}

/// Encode a `LocalVariableTable` or `LocalVariableTypeTable` payload.
///
/// # Errors
/// Returns an error if there are more than 65535 entries.
pub fn write_local_variables(locals: &[LocalVariable]) -> Result<Vec<u8>> {
    let mut info = Vec::with_capacity(2 + locals.len() * 10);
    write_be(&mut info, count_u16(locals.len(), "local variables")?);
    for local in locals {
        write_be(&mut info, local.start_pc);
        write_be(&mut info, local.length);
        write_be(&mut info, local.name_index);
        write_be(&mut info, local.descriptor_index);
        write_be(&mut info, local.index);
    }
    Ok(info)
}
