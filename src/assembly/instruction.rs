//! Decoded JVM instruction representation and opcode metadata types.
//!
//! # Key Components
//!
//! - [`crate::assembly::Instruction`] - A decoded instruction at a bytecode offset
//! - [`crate::assembly::Operand`] - Type-safe operand representation
//! - [`crate::assembly::OperandType`] - How an opcode's operand is encoded
//! - [`crate::assembly::FlowType`] - Control flow behavior classification
//! - [`crate::assembly::StackEffect`] - Slot-counted stack behavior
//!
//! Branch operands are stored as absolute bytecode offsets, never as the relative
//! displacement found in the encoding. This keeps instructions meaningful after they have
//! been moved to a different position.

use std::fmt;

use crate::{
    assembly::opcodes::{
        GETFIELD, GETSTATIC, INVOKEDYNAMIC, INVOKEINTERFACE, INVOKESPECIAL, INVOKESTATIC,
        INVOKEVIRTUAL, MULTIANEWARRAY, PUTFIELD, PUTSTATIC,
    },
    classfile::{
        constantpool::ConstantPool,
        descriptor::{FieldType, MethodDescriptor},
    },
    Error, Result,
};

/// How an opcode's operand is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Signed byte (`bipush`)
    Byte,
    /// Signed short (`sipush`)
    Short,
    /// Unsigned byte pool index (`ldc`)
    ConstantByte,
    /// Unsigned short pool index
    Constant,
    /// Local variable index, widened by the `wide` prefix
    Local,
    /// Signed 16-bit branch displacement
    Branch16,
    /// Signed 32-bit branch displacement
    Branch32,
    /// Local index plus signed increment
    Iinc,
    /// Pool index, argument count and a zero byte
    InvokeInterface,
    /// Pool index and two zero bytes
    InvokeDynamic,
    /// Primitive array type code
    NewArray,
    /// Pool index and dimension count
    MultiANewArray,
    /// Padded jump table
    TableSwitch,
    /// Padded match/offset pairs
    LookupSwitch,
    /// Prefix widening the following local access
    Wide,
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch
    Switch,
    /// Exception throwing
    Throw,
    /// `jsr` / `jsr_w`
    Subroutine,
    /// `ret`
    SubroutineReturn,
}

/// Stack effect of an opcode, in slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Known from the opcode alone
    Fixed {
        /// Slots popped
        pops: u8,
        /// Slots pushed
        pushes: u8,
    },
    /// Depends on a descriptor or dimension count
    Variable,
}

/// A decoded operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// `bipush` value, or `newarray` type code
    Byte(i8),
    /// `sipush` value
    Short(i16),
    /// Local variable index
    Local(u16),
    /// Constant pool index
    Constant(u16),
    /// Absolute branch target offset
    Branch(u32),
    /// `iinc` local index and increment
    Iinc {
        /// Local variable index
        index: u16,
        /// Increment
        delta: i16,
    },
    /// `invokeinterface` pool index and argument slot count
    InvokeInterface {
        /// Constant pool index
        index: u16,
        /// Count byte as encoded
        count: u8,
    },
    /// `invokedynamic` pool index
    InvokeDynamic(u16),
    /// `newarray` element type code
    NewArray(u8),
    /// `multianewarray` pool index and dimensions
    MultiANewArray {
        /// Constant pool index
        index: u16,
        /// Number of dimensions popped
        dimensions: u8,
    },
    /// `tableswitch` with absolute targets
    TableSwitch {
        /// Default target
        default: u32,
        /// Lowest matched value
        low: i32,
        /// Highest matched value
        high: i32,
        /// Targets for `low..=high`
        targets: Vec<u32>,
    },
    /// `lookupswitch` with absolute targets
    LookupSwitch {
        /// Default target
        default: u32,
        /// `(match, target)` pairs sorted by match
        pairs: Vec<(i32, u32)>,
    },
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Byte(value) => write!(f, "{value}"),
            Operand::Short(value) => write!(f, "{value}"),
            Operand::Local(index) => write!(f, "{index}"),
            Operand::Constant(index) | Operand::InvokeDynamic(index) => write!(f, "#{index}"),
            Operand::Branch(target) => write!(f, "L{target}"),
            Operand::Iinc { index, delta } => write!(f, "{index} {delta}"),
            Operand::InvokeInterface { index, count } => write!(f, "#{index} {count}"),
            Operand::NewArray(code) => write!(f, "T{code}"),
            Operand::MultiANewArray { index, dimensions } => write!(f, "#{index} {dimensions}"),
            Operand::TableSwitch {
                default,
                low,
                high,
                ..
            } => write!(f, "{low}..{high} default L{default}"),
            Operand::LookupSwitch { default, pairs } => {
                write!(f, "{} cases default L{default}", pairs.len())
            }
        }
    }
}

/// A decoded JVM instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the first byte (the `wide` prefix, if any)
    pub offset: u32,
    /// Total encoded size in bytes, including prefix and padding
    pub size: u32,
    /// Opcode (the widened opcode when `wide` is set)
    pub opcode: u8,
    /// `true` if the instruction carried the `wide` prefix
    pub wide: bool,
    /// Mnemonic from the opcode table
    pub mnemonic: &'static str,
    /// Control-flow class
    pub flow: FlowType,
    /// Decoded operand
    pub operand: Operand,
    /// Stack effect from the opcode table
    pub stack: StackEffect,
}

impl Instruction {
    /// Check if this instruction can transfer control to another offset.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.flow,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Subroutine
        )
    }

    /// Check if execution never falls through to the next instruction.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Switch
                | FlowType::Throw
                | FlowType::SubroutineReturn
        )
    }

    /// Absolute offsets this instruction may branch to.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Operand::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Offset of the instruction that follows this one.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Compute `(pops, pushes)` in slots, resolving variable effects through `pool`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a referenced constant or descriptor is invalid.
    pub fn stack_effect(&self, pool: &ConstantPool) -> Result<(u16, u16)> {
        if let StackEffect::Fixed { pops, pushes } = self.stack {
            return Ok((u16::from(pops), u16::from(pushes)));
        }

        match (&self.operand, self.opcode) {
            (Operand::Constant(index), GETSTATIC | PUTSTATIC | GETFIELD | PUTFIELD) => {
                let member = pool.member_ref(*index)?;
                let size = member.descriptor.parse::<FieldType>()?.slot_size();
                Ok(match self.opcode {
                    GETSTATIC => (0, size),
                    PUTSTATIC => (size, 0),
                    GETFIELD => (1, size),
                    _ => (1 + size, 0),
                })
            }
            (Operand::Constant(index), INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC)
            | (Operand::InvokeInterface { index, .. }, INVOKEINTERFACE) => {
                let member = pool.member_ref(*index)?;
                let descriptor: MethodDescriptor = member.descriptor.parse()?;
                let receiver = u16::from(self.opcode != INVOKESTATIC);
                Ok((
                    descriptor.argument_slots() + receiver,
                    descriptor.ret.slot_size(),
                ))
            }
            (Operand::InvokeDynamic(index), INVOKEDYNAMIC) => {
                let (_, descriptor) = pool.dynamic_name_and_type(*index)?;
                let descriptor: MethodDescriptor = descriptor.parse()?;
                Ok((descriptor.argument_slots(), descriptor.ret.slot_size()))
            }
            (Operand::MultiANewArray { dimensions, .. }, MULTIANEWARRAY) => {
                Ok((u16::from(*dimensions), 1))
            }
            _ => Err(Error::NotSupported(format!(
                "no stack effect for '{}' with operand {:?}",
                self.mnemonic, self.operand
            ))),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.wide {
            write!(f, "wide ")?;
        }
        match self.operand {
            Operand::None => f.write_str(self.mnemonic),
            ref operand => write!(f, "{} {}", self.mnemonic, operand),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::{instruction, GOTO, TABLESWITCH};

    fn make(opcode: u8, operand: Operand) -> Instruction {
        let meta = instruction(opcode).unwrap();
        Instruction {
            offset: 10,
            size: 3,
            opcode,
            wide: false,
            mnemonic: meta.mnemonic,
            flow: meta.flow,
            operand,
            stack: meta.stack,
        }
    }

    #[test]
    fn test_branch_targets() {
        let goto = make(GOTO, Operand::Branch(40));
        assert!(goto.is_branch());
        assert!(goto.is_terminal());
        assert_eq!(goto.branch_targets(), vec![40]);

        let switch = make(
            TABLESWITCH,
            Operand::TableSwitch {
                default: 50,
                low: 0,
                high: 1,
                targets: vec![20, 30],
            },
        );
        assert_eq!(switch.branch_targets(), vec![50, 20, 30]);
    }

    #[test]
    fn test_variable_stack_effect() {
        let mut pool = ConstantPool::new();
        let method = pool.add_method_ref("a/B", "m", "(JI)D").unwrap();
        let field = pool.add_field_ref("a/B", "f", "J").unwrap();

        let invoke = make(INVOKEVIRTUAL, Operand::Constant(method));
        assert_eq!(invoke.stack_effect(&pool).unwrap(), (4, 2));

        let invoke = make(INVOKESTATIC, Operand::Constant(method));
        assert_eq!(invoke.stack_effect(&pool).unwrap(), (3, 2));

        let put = make(PUTFIELD, Operand::Constant(field));
        assert_eq!(put.stack_effect(&pool).unwrap(), (3, 0));
    }

    #[test]
    fn test_display() {
        let goto = make(GOTO, Operand::Branch(7));
        assert_eq!(goto.to_string(), "goto L7");
    }
}
