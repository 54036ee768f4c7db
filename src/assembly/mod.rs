//! JVM bytecode assembly and disassembly primitives.
//!
//! This module covers everything below the class-file model that deals with instruction
//! streams: the opcode table, decoding a `Code` array into [`Instruction`]s, re-encoding
//! them with label resolution, and generating new method bodies with automatic
//! `max_stack` / `max_locals` computation.
//!
//! # Key Types
//! - [`Instruction`] - A decoded instruction with absolute branch targets
//! - [`Operand`] - Instruction operands (immediates, pool indices, targets)
//! - [`FlowType`] - How instructions affect control flow
//! - [`InstructionEncoder`] - Label-aware encoder with stack tracking
//! - [`MethodGenerator`] - Typed body generation bound to a constant pool
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction
//! - [`decode_code`] - Decode a whole code array
//!
//! # Example
//! ```rust
//! use shadowloader::assembly::{decode_instruction, opcodes::IRETURN};
//! use shadowloader::Parser;
//!
//! let bytecode = &[0x04, 0xAC]; // iconst_1, ireturn
//! let mut parser = Parser::new(bytecode);
//! let first = decode_instruction(&mut parser)?;
//! let second = decode_instruction(&mut parser)?;
//! assert_eq!(first.mnemonic, "iconst_1");
//! assert_eq!(second.opcode, IRETURN);
//! # Ok::<(), shadowloader::Error>(())
//! ```

pub(crate) mod decoder;
pub(crate) mod encoder;
pub(crate) mod generator;
pub(crate) mod instruction;
pub mod opcodes;

pub use decoder::{decode_code, decode_instruction};
pub use encoder::{offset_label, EncodedBody, InstructionEncoder};
pub use generator::{load_opcode, return_opcode, MethodGenerator};
pub use instruction::{FlowType, Instruction, Operand, OperandType, StackEffect};
