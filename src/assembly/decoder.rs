//! JVM bytecode decoding.
//!
//! # Key Components
//!
//! - [`crate::assembly::decode_instruction`] - Core single instruction decoder
//! - [`crate::assembly::decode_code`] - Linear decoder for a whole `Code` array
//!
//! # Usage Examples
//!
//! ```rust
//! use shadowloader::assembly::{decode_code, Operand};
//!
//! // aload_0; ifnull +5; iconst_1; ireturn; iconst_0; ireturn
//! let code = [0x2A, 0xC6, 0x00, 0x05, 0x04, 0xAC, 0x03, 0xAC];
//! let instructions = decode_code(&code)?;
//!
//! assert_eq!(instructions.len(), 6);
//! assert_eq!(instructions[1].mnemonic, "ifnull");
//! assert_eq!(instructions[1].operand, Operand::Branch(6));
//! # Ok::<(), shadowloader::Error>(())
//! ```
//!
//! The parser passed to [`decode_instruction`] must wrap exactly the code array: switch
//! padding is computed from the parser position, which the class format measures from the
//! start of the code.

use crate::{
    assembly::{
        instruction::{Instruction, Operand, OperandType},
        opcodes::{instruction, IINC},
    },
    file::parser::Parser,
    Error, Result,
};

fn branch_target(offset: u32, displacement: i32) -> Result<u32> {
    let target = i64::from(offset) + i64::from(displacement);
    u32::try_from(target).map_err(|_| {
        Error::InvalidBranch(format!(
            "displacement {displacement} at offset {offset} leaves the method"
        ))
    })
}

/// Decode one instruction at the parser's current position.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidOpcode`] for unassigned opcodes or an invalid `wide`
/// target, [`crate::Error::OutOfBounds`] on truncation, [`crate::Error::InvalidBranch`] for
/// targets before the start of the method and [`crate::Error::Malformed`] for inconsistent
/// switch tables.
pub fn decode_instruction(parser: &mut Parser<'_>) -> Result<Instruction> {
    let start = parser.pos();
    let offset = u32::try_from(start).map_err(|_| malformed_error!("Code offset exceeds u32"))?;

    let mut opcode = parser.read_be::<u8>()?;
    let mut meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
    let mut wide = false;

    if meta.op_type == OperandType::Wide {
        wide = true;
        opcode = parser.read_be::<u8>()?;
        meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        if meta.op_type != OperandType::Local && opcode != IINC {
            return Err(Error::InvalidOpcode(opcode));
        }
    }

    let operand = match meta.op_type {
        OperandType::None => Operand::None,
        OperandType::Byte => Operand::Byte(parser.read_be()?),
        OperandType::Short => Operand::Short(parser.read_be()?),
        OperandType::ConstantByte => Operand::Constant(u16::from(parser.read_be::<u8>()?)),
        OperandType::Constant => Operand::Constant(parser.read_be()?),
        OperandType::Local if wide => Operand::Local(parser.read_be()?),
        OperandType::Local => Operand::Local(u16::from(parser.read_be::<u8>()?)),
        OperandType::Branch16 => {
            Operand::Branch(branch_target(offset, i32::from(parser.read_be::<i16>()?))?)
        }
        OperandType::Branch32 => Operand::Branch(branch_target(offset, parser.read_be()?)?),
        OperandType::Iinc if wide => Operand::Iinc {
            index: parser.read_be()?,
            delta: parser.read_be()?,
        },
        OperandType::Iinc => Operand::Iinc {
            index: u16::from(parser.read_be::<u8>()?),
            delta: i16::from(parser.read_be::<i8>()?),
        },
        OperandType::InvokeInterface => {
            let index = parser.read_be()?;
            let count = parser.read_be()?;
            parser.advance_by(1)?;
            Operand::InvokeInterface { index, count }
        }
        OperandType::InvokeDynamic => {
            let index = parser.read_be()?;
            parser.advance_by(2)?;
            Operand::InvokeDynamic(index)
        }
        OperandType::NewArray => Operand::NewArray(parser.read_be()?),
        OperandType::MultiANewArray => Operand::MultiANewArray {
            index: parser.read_be()?,
            dimensions: parser.read_be()?,
        },
        OperandType::TableSwitch => {
            parser.align(4)?;
            let default = branch_target(offset, parser.read_be()?)?;
            let low = parser.read_be::<i32>()?;
            let high = parser.read_be::<i32>()?;
            if high < low {
                return Err(malformed_error!(
                    "tableswitch at {} has high {} below low {}",
                    offset,
                    high,
                    low
                ));
            }
            let count = usize::try_from(i64::from(high) - i64::from(low) + 1)
                .map_err(|_| malformed_error!("tableswitch range overflow"))?;
            if count.saturating_mul(4) > parser.remaining() {
                return Err(out_of_bounds_error!());
            }
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(branch_target(offset, parser.read_be()?)?);
            }
            Operand::TableSwitch {
                default,
                low,
                high,
                targets,
            }
        }
        OperandType::LookupSwitch => {
            parser.align(4)?;
            let default = branch_target(offset, parser.read_be()?)?;
            let count = parser.read_be::<i32>()?;
            let count = usize::try_from(count)
                .map_err(|_| malformed_error!("lookupswitch with negative pair count"))?;
            if count.saturating_mul(8) > parser.remaining() {
                return Err(out_of_bounds_error!());
            }
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let key = parser.read_be::<i32>()?;
                pairs.push((key, branch_target(offset, parser.read_be()?)?));
            }
            Operand::LookupSwitch { default, pairs }
        }
        OperandType::Wide => return Err(Error::InvalidOpcode(opcode)),
    };

    let size = u32::try_from(parser.pos() - start)
        .map_err(|_| malformed_error!("Instruction size exceeds u32"))?;

    Ok(Instruction {
        offset,
        size,
        opcode,
        wide,
        mnemonic: meta.mnemonic,
        flow: meta.flow,
        operand,
        stack: meta.stack,
    })
}

/// Decode a complete code array into instructions in offset order.
///
/// # Errors
///
/// Returns [`crate::Error::Empty`] for an empty array, and any error of
/// [`decode_instruction`]. Branch targets that do not start an instruction are reported as
/// [`crate::Error::InvalidBranch`].
pub fn decode_code(code: &[u8]) -> Result<Vec<Instruction>> {
    if code.is_empty() {
        return Err(Error::Empty);
    }

    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    while parser.has_more_data() {
        instructions.push(decode_instruction(&mut parser)?);
    }

    for instruction in &instructions {
        for target in instruction.branch_targets() {
            if instructions
                .binary_search_by_key(&target, |candidate| candidate.offset)
                .is_err()
            {
                return Err(Error::InvalidBranch(format!(
                    "'{}' at {} targets {} which is not an instruction boundary",
                    instruction.mnemonic, instruction.offset, target
                )));
            }
        }
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::opcodes::{ILOAD, LOOKUPSWITCH, TABLESWITCH};

    #[test]
    fn test_decode_wide_forms() {
        // wide iload 300; wide iinc 300 -2; return
        let code = [0xC4, 0x15, 0x01, 0x2C, 0xC4, 0x84, 0x01, 0x2C, 0xFF, 0xFE, 0xB1];
        let instructions = decode_code(&code).unwrap();

        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[0].opcode, ILOAD);
        assert!(instructions[0].wide);
        assert_eq!(instructions[0].operand, Operand::Local(300));
        assert_eq!(instructions[0].size, 4);
        assert_eq!(
            instructions[1].operand,
            Operand::Iinc {
                index: 300,
                delta: -2
            }
        );
        assert_eq!(instructions[2].offset, 10);
    }

    #[test]
    fn test_decode_tableswitch_with_padding() {
        // iload_0 at 0, tableswitch at 1 (2 bytes padding), default +27, 0..=1 -> +23, +25
        let mut code = vec![0x1A, 0xAA, 0x00, 0x00];
        code.extend_from_slice(&27_i32.to_be_bytes());
        code.extend_from_slice(&0_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());
        code.extend_from_slice(&23_i32.to_be_bytes());
        code.extend_from_slice(&25_i32.to_be_bytes());
        // offsets 24, 26, 28
        code.extend_from_slice(&[0x04, 0xAC, 0x05, 0xAC, 0x03, 0xAC]);

        let instructions = decode_code(&code).unwrap();
        assert_eq!(instructions[1].opcode, TABLESWITCH);
        assert_eq!(instructions[1].size, 23);
        assert_eq!(instructions[1].branch_targets(), vec![28, 24, 26]);
    }

    #[test]
    fn test_decode_lookupswitch() {
        // lookupswitch at 0 (3 bytes padding), default +20, one pair 7 -> +22
        let mut code = vec![0xAB, 0x00, 0x00, 0x00];
        code.extend_from_slice(&20_i32.to_be_bytes());
        code.extend_from_slice(&1_i32.to_be_bytes());
        code.extend_from_slice(&7_i32.to_be_bytes());
        code.extend_from_slice(&22_i32.to_be_bytes());
        code.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xB1, 0x00, 0xB1]);

        let instructions = decode_code(&code).unwrap();
        assert_eq!(instructions[0].opcode, LOOKUPSWITCH);
        assert_eq!(
            instructions[0].operand,
            Operand::LookupSwitch {
                default: 20,
                pairs: vec![(7, 22)]
            }
        );
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(decode_code(&[]), Err(Error::Empty)));
        assert!(matches!(decode_code(&[0xCB]), Err(Error::InvalidOpcode(0xCB))));
        // goto -1
        assert!(matches!(
            decode_code(&[0xA7, 0xFF, 0xFF]),
            Err(Error::InvalidBranch(_))
        ));
        // goto into the middle of itself
        assert!(matches!(
            decode_code(&[0xA7, 0x00, 0x01]),
            Err(Error::InvalidBranch(_))
        ));
        // wide on a non-local opcode
        assert!(matches!(
            decode_code(&[0xC4, 0x60]),
            Err(Error::InvalidOpcode(0x60))
        ));
    }
}
