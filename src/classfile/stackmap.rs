//! `StackMapTable` frames (JVMS §4.7.4).
//!
//! Frames are decoded into their expanded form: an absolute bytecode offset plus the complete
//! locals and operand stack at that offset. This makes the two rewrites the transformer needs
//! (offset remapping and type substitution) simple list operations. Encoding picks the
//! most compact frame kind relative to the previous frame.

use crate::{
    classfile::{
        attributes::count_u16,
        constantpool::ConstantPool,
        descriptor::{FieldType, MethodDescriptor},
    },
    file::{io::write_be, parser::Parser},
    Result,
};

/// A verification type (JVMS §4.10.1.2).
///
/// `Long` and `Double` are a single entry covering two local slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationType {
    /// tag 0
    Top,
    /// tag 1
    Integer,
    /// tag 2
    Float,
    /// tag 3
    Double,
    /// tag 4
    Long,
    /// tag 5
    Null,
    /// tag 6, the receiver of a constructor before the super call
    UninitializedThis,
    /// tag 7, class constant index
    Object(u16),
    /// tag 8, offset of the `new` instruction
    Uninitialized(u16),
}

impl VerificationType {
    fn parse(parser: &mut Parser<'_>) -> Result<Self> {
        Ok(match parser.read_be::<u8>()? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(parser.read_be()?),
            8 => VerificationType::Uninitialized(parser.read_be()?),
            tag => return Err(malformed_error!("Invalid verification type tag {}", tag)),
        })
    }

    fn write(self, buffer: &mut Vec<u8>) {
        match self {
            VerificationType::Top => write_be(buffer, 0_u8),
            VerificationType::Integer => write_be(buffer, 1_u8),
            VerificationType::Float => write_be(buffer, 2_u8),
            VerificationType::Double => write_be(buffer, 3_u8),
            VerificationType::Long => write_be(buffer, 4_u8),
            VerificationType::Null => write_be(buffer, 5_u8),
            VerificationType::UninitializedThis => write_be(buffer, 6_u8),
            VerificationType::Object(index) => {
                write_be(buffer, 7_u8);
                write_be(buffer, index);
            }
            VerificationType::Uninitialized(offset) => {
                write_be(buffer, 8_u8);
                write_be(buffer, offset);
            }
        }
    }

    /// Verification type of a value of `field_type`, interning class constants as needed.
    ///
    /// # Errors
    /// Returns an error if the pool is full.
    pub fn of(field_type: &FieldType, pool: &mut ConstantPool) -> Result<Self> {
        Ok(match field_type {
            FieldType::Boolean
            | FieldType::Byte
            | FieldType::Char
            | FieldType::Short
            | FieldType::Int => VerificationType::Integer,
            FieldType::Float => VerificationType::Float,
            FieldType::Long => VerificationType::Long,
            FieldType::Double => VerificationType::Double,
            FieldType::Object(_) | FieldType::Array(_) => {
                VerificationType::Object(pool.add_class(&field_type.cast_target())?)
            }
        })
    }
}

/// An expanded frame: absolute offset with complete locals and stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Bytecode offset this frame describes
    pub offset: u16,
    /// Local variable types
    pub locals: Vec<VerificationType>,
    /// Operand stack types, bottom first
    pub stack: Vec<VerificationType>,
}

/// The frames of one method, together with the implicit frame derived from its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackMapTable {
    /// Locals of the implicit initial frame
    pub initial: Vec<VerificationType>,
    /// Explicit frames, sorted by strictly increasing offset
    pub frames: Vec<Frame>,
}

/// Locals of the implicit initial frame of a method.
///
/// # Errors
/// Returns an error if the pool is full.
pub fn initial_locals(
    owner: &str,
    descriptor: &MethodDescriptor,
    is_static: bool,
    is_constructor: bool,
    pool: &mut ConstantPool,
) -> Result<Vec<VerificationType>> {
    let mut locals = Vec::with_capacity(descriptor.params.len() + 1);
    if is_constructor {
        locals.push(VerificationType::UninitializedThis);
    } else if !is_static {
        locals.push(VerificationType::Object(pool.add_class(owner)?));
    }
    for param in &descriptor.params {
        locals.push(VerificationType::of(param, pool)?);
    }
    Ok(locals)
}

impl StackMapTable {
    /// Decode a `StackMapTable` payload relative to the implicit initial frame.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] on reserved frame types or a chop past the
    /// start of the locals, [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse(info: &[u8], initial: Vec<VerificationType>) -> Result<Self> {
        let mut parser = Parser::new(info);
        let count = parser.read_be::<u16>()?;

        let mut frames: Vec<Frame> = Vec::with_capacity(count as usize);
        let mut locals = initial.clone();
        let mut previous: Option<u16> = None;

        for _ in 0..count {
            let frame_type = parser.read_be::<u8>()?;
            let (delta, stack) = match frame_type {
                0..=63 => (u16::from(frame_type), Vec::new()),
                64..=127 => (
                    u16::from(frame_type - 64),
                    vec![VerificationType::parse(&mut parser)?],
                ),
                247 => {
                    let delta = parser.read_be::<u16>()?;
                    (delta, vec![VerificationType::parse(&mut parser)?])
                }
                248..=250 => {
                    let delta = parser.read_be::<u16>()?;
                    let chop = usize::from(251 - frame_type);
                    if chop > locals.len() {
                        return Err(malformed_error!("Chop frame removes {} of {} locals", chop, locals.len()));
                    }
                    locals.truncate(locals.len() - chop);
                    (delta, Vec::new())
                }
                251 => (parser.read_be::<u16>()?, Vec::new()),
                252..=254 => {
                    let delta = parser.read_be::<u16>()?;
                    for _ in 0..(frame_type - 251) {
                        locals.push(VerificationType::parse(&mut parser)?);
                    }
                    (delta, Vec::new())
                }
                255 => {
                    let delta = parser.read_be::<u16>()?;
                    let local_count = parser.read_be::<u16>()?;
                    locals = (0..local_count)
                        .map(|_| VerificationType::parse(&mut parser))
                        .collect::<Result<_>>()?;
                    let stack_count = parser.read_be::<u16>()?;
                    let stack = (0..stack_count)
                        .map(|_| VerificationType::parse(&mut parser))
                        .collect::<Result<_>>()?;
                    (delta, stack)
                }
                reserved => return Err(malformed_error!("Reserved frame type {}", reserved)),
            };

            let offset = match previous {
                None => delta,
                Some(previous) => previous
                    .checked_add(delta)
                    .and_then(|value| value.checked_add(1))
                    .ok_or_else(|| malformed_error!("Frame offset overflow"))?,
            };
            previous = Some(offset);

            frames.push(Frame {
                offset,
                locals: locals.clone(),
                stack,
            });
        }

        Ok(StackMapTable { initial, frames })
    }

    /// Encode the frames, choosing the compact kind relative to the previous frame.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if offsets are not strictly increasing.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut info = Vec::with_capacity(2 + self.frames.len() * 4);
        write_be(&mut info, count_u16(self.frames.len(), "stack map frames")?);

        let mut locals = &self.initial;
        let mut previous: Option<u16> = None;

        for frame in &self.frames {
            let delta = match previous {
                None => frame.offset,
                Some(previous) if frame.offset > previous => frame.offset - previous - 1,
                Some(previous) => {
                    return Err(malformed_error!(
                        "Stack map frame at {} does not follow frame at {}",
                        frame.offset,
                        previous
                    ))
                }
            };
            previous = Some(frame.offset);

            let same_locals = frame.locals == *locals;
            #[allow(clippy::cast_possible_truncation)]
            match frame.stack.len() {
                0 if same_locals && delta <= 63 => write_be(&mut info, delta as u8),
                0 if same_locals => {
                    write_be(&mut info, 251_u8);
                    write_be(&mut info, delta);
                }
                1 if same_locals && delta <= 63 => {
                    write_be(&mut info, 64 + delta as u8);
                    frame.stack[0].write(&mut info);
                }
                1 if same_locals => {
                    write_be(&mut info, 247_u8);
                    write_be(&mut info, delta);
                    frame.stack[0].write(&mut info);
                }
                0 if frame.locals.len() < locals.len()
                    && locals.len() - frame.locals.len() <= 3
                    && locals.starts_with(&frame.locals) =>
                {
                    write_be(&mut info, 251 - (locals.len() - frame.locals.len()) as u8);
                    write_be(&mut info, delta);
                }
                0 if frame.locals.len() > locals.len()
                    && frame.locals.len() - locals.len() <= 3
                    && frame.locals.starts_with(locals) =>
                {
                    write_be(&mut info, 251 + (frame.locals.len() - locals.len()) as u8);
                    write_be(&mut info, delta);
                    for local in &frame.locals[locals.len()..] {
                        local.write(&mut info);
                    }
                }
                _ => {
                    write_be(&mut info, 255_u8);
                    write_be(&mut info, delta);
                    write_be(&mut info, count_u16(frame.locals.len(), "frame locals")?);
                    for local in &frame.locals {
                        local.write(&mut info);
                    }
                    write_be(&mut info, count_u16(frame.stack.len(), "frame stack")?);
                    for item in &frame.stack {
                        item.write(&mut info);
                    }
                }
            }

            locals = &frame.locals;
        }

        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(frames: Vec<Frame>) -> StackMapTable {
        StackMapTable {
            initial: vec![VerificationType::Object(3), VerificationType::Integer],
            frames,
        }
    }

    #[test]
    fn test_compact_encoding_round_trip() {
        let initial = vec![VerificationType::Object(3), VerificationType::Integer];
        let mut appended = initial.clone();
        appended.push(VerificationType::Long);

        let original = table(vec![
            Frame {
                offset: 5,
                locals: initial.clone(),
                stack: vec![],
            },
            Frame {
                offset: 200,
                locals: initial.clone(),
                stack: vec![VerificationType::Null],
            },
            Frame {
                offset: 210,
                locals: appended,
                stack: vec![],
            },
            Frame {
                offset: 220,
                locals: vec![VerificationType::Object(3)],
                stack: vec![],
            },
            Frame {
                offset: 230,
                locals: vec![VerificationType::Float],
                stack: vec![VerificationType::Uninitialized(7), VerificationType::Top],
            },
        ]);

        let bytes = original.to_bytes().unwrap();
        // same_frame for the first entry
        assert_eq!(bytes[2], 5);
        // same_locals_1_stack_item_extended for the second
        assert_eq!(bytes[3], 247);

        let parsed = StackMapTable::parse(&bytes, original.initial.clone()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_non_increasing_offsets_rejected() {
        let frame = Frame {
            offset: 4,
            locals: vec![],
            stack: vec![],
        };
        assert!(table(vec![frame.clone(), frame]).to_bytes().is_err());
    }

    #[test]
    fn test_initial_locals_for_constructor() {
        let mut pool = ConstantPool::new();
        let descriptor: MethodDescriptor = "(JLjava/lang/String;)V".parse().unwrap();
        let locals = initial_locals("a/B", &descriptor, false, true, &mut pool).unwrap();
        assert_eq!(locals[0], VerificationType::UninitializedThis);
        assert_eq!(locals[1], VerificationType::Long);
        assert!(matches!(locals[2], VerificationType::Object(_)));
        assert_eq!(locals.len(), 3);
    }
}
