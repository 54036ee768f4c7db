//! Label-aware JVM instruction encoder.
//!
//! [`InstructionEncoder`] turns opcodes and operands into a code array, resolving branches
//! to named labels once all labels are known. In tracking mode (the default) it follows the
//! operand stack depth through every emitted instruction, validates that all paths reaching a
//! label agree on the depth, and reports `max_stack` / `max_locals` when finalized.
//!
//! The relocating mode re-encodes an existing, already verified body at a new layout
//! ([`InstructionEncoder::emit_decoded`]). Its branch targets are the labels `@<offset>` of
//! the original offsets and no stack tracking takes place; the caller keeps the original
//! limits.
//!
//! # Examples
//!
//! ```rust
//! use shadowloader::assembly::{opcodes, InstructionEncoder};
//!
//! let mut encoder = InstructionEncoder::new();
//! encoder.emit_local(opcodes::ILOAD, 0)?;
//! encoder.emit_branch(opcodes::IFEQ, "zero")?;
//! encoder.emit(opcodes::ICONST_1)?;
//! encoder.emit(opcodes::IRETURN)?;
//! encoder.define_label("zero")?;
//! encoder.emit(opcodes::ICONST_0)?;
//! encoder.emit(opcodes::IRETURN)?;
//!
//! let body = encoder.finalize()?;
//! assert_eq!(body.code, vec![0x1A, 0x99, 0x00, 0x05, 0x04, 0xAC, 0x03, 0xAC]);
//! assert_eq!(body.max_stack, 1);
//! assert_eq!(body.max_locals, 1);
//! # Ok::<(), shadowloader::Error>(())
//! ```

use std::collections::{BTreeMap, HashMap};

use crate::{
    assembly::{
        instruction::{FlowType, Instruction, Operand, OperandType, StackEffect},
        opcodes::{
            instruction, local_shorthand, DLOAD, DSTORE, GOTO, GOTO_W, IINC, INVOKEINTERFACE, JSR,
            JSR_W, LDC, LDC2_W, LDC_W, LLOAD, LOOKUPSWITCH, LSTORE, TABLESWITCH, WIDE,
        },
    },
    file::io::{patch_be, write_be},
    Error, Result,
};

/// Label name used by relocated code for an original bytecode offset
#[must_use]
pub fn offset_label(offset: u32) -> String {
    format!("@{offset}")
}

/// A branch displacement awaiting label resolution.
#[derive(Debug, Clone)]
struct LabelFixup {
    /// Target label
    label: String,
    /// Position of the displacement in the code array
    fixup_position: usize,
    /// Position of the branching instruction, displacements are relative to it
    instruction_position: usize,
    /// 2 or 4
    offset_size: u8,
}

/// Result of [`InstructionEncoder::finalize`].
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// The code array
    pub code: Vec<u8>,
    /// Maximum operand stack depth in slots (0 for relocated code)
    pub max_stack: u16,
    /// Local slots touched by emitted instructions
    pub max_locals: u16,
    /// Resolved label positions
    pub labels: HashMap<String, u32>,
    /// Offsets targeted by a branch, with the stack depth expected there
    pub branch_targets: BTreeMap<u32, u16>,
}

/// JVM instruction encoder with label resolution and stack tracking.
///
/// Not `Sync`; create one per method body.
pub struct InstructionEncoder {
    bytecode: Vec<u8>,
    labels: HashMap<String, u32>,
    fixups: Vec<LabelFixup>,
    track_stack: bool,
    current_stack_depth: i32,
    max_stack_depth: u16,
    max_locals: u16,
    label_stack_depths: HashMap<String, i32>,
    unreachable: bool,
}

impl Default for InstructionEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionEncoder {
    /// Create a tracking encoder for generated code.
    #[must_use]
    pub fn new() -> Self {
        InstructionEncoder {
            bytecode: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            track_stack: true,
            current_stack_depth: 0,
            max_stack_depth: 0,
            max_locals: 0,
            label_stack_depths: HashMap::new(),
            unreachable: false,
        }
    }

    /// Create a relocating encoder that does not track the operand stack.
    #[must_use]
    pub fn relocating() -> Self {
        InstructionEncoder {
            track_stack: false,
            ..Self::new()
        }
    }

    /// Current code position in bytes.
    #[must_use]
    pub fn current_position(&self) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let position = self.bytecode.len() as u32;
        position
    }

    /// Current operand stack depth in slots.
    #[must_use]
    pub fn current_stack_depth(&self) -> i32 {
        self.current_stack_depth
    }

    /// Resolved position of a label defined so far.
    #[must_use]
    pub fn label_offset(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    /// Reserve local slots that are live without being touched (the parameters).
    pub fn reserve_locals(&mut self, slots: u16) {
        self.max_locals = self.max_locals.max(slots);
    }

    /// Emit an instruction without operands whose stack effect is fixed.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for unassigned opcodes or opcodes that take an
    /// operand, and [`crate::Error::StackUnderflow`] if tracking detects an underflow.
    pub fn emit(&mut self, opcode: u8) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        if meta.op_type != OperandType::None {
            return Err(Error::InvalidOpcode(opcode));
        }
        self.bytecode.push(opcode);
        self.apply_fixed(opcode)
    }

    /// Emit an instruction with a pool index operand (`new`, `checkcast`, `getfield`, ...).
    ///
    /// Variable-effect opcodes take their slot counts from `pops` and `pushes`; fixed
    /// opcodes ignore them in favor of the table.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] if the opcode does not take a two-byte pool
    /// index, and [`crate::Error::StackUnderflow`] on underflow.
    pub fn emit_constant(&mut self, opcode: u8, index: u16, pops: u16, pushes: u16) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        if meta.op_type != OperandType::Constant {
            return Err(Error::InvalidOpcode(opcode));
        }
        self.bytecode.push(opcode);
        write_be(&mut self.bytecode, index);
        match meta.stack {
            StackEffect::Fixed { .. } => self.apply_fixed(opcode),
            StackEffect::Variable => {
                self.apply_effect(meta.mnemonic, meta.flow, i32::from(pops), i32::from(pushes))
            }
        }
    }

    /// Emit `invokeinterface`.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] on underflow.
    pub fn emit_invoke_interface(&mut self, index: u16, argument_slots: u16, pushes: u16) -> Result<()> {
        self.bytecode.push(INVOKEINTERFACE);
        write_be(&mut self.bytecode, index);
        #[allow(clippy::cast_possible_truncation)]
        self.bytecode.push((argument_slots + 1) as u8);
        self.bytecode.push(0);
        self.apply_effect(
            "invokeinterface",
            FlowType::Call,
            i32::from(argument_slots) + 1,
            i32::from(pushes),
        )
    }

    /// Emit `ldc` / `ldc_w` for a single-slot constant, or `ldc2_w` when `wide` is set.
    ///
    /// # Errors
    /// Propagates stack tracking errors.
    pub fn emit_ldc(&mut self, index: u16, wide: bool) -> Result<()> {
        if wide {
            self.bytecode.push(LDC2_W);
            write_be(&mut self.bytecode, index);
            return self.apply_fixed(LDC2_W);
        }

        match u8::try_from(index) {
            Ok(short) => {
                self.bytecode.push(LDC);
                self.bytecode.push(short);
                self.apply_fixed(LDC)
            }
            Err(_) => {
                self.bytecode.push(LDC_W);
                write_be(&mut self.bytecode, index);
                self.apply_fixed(LDC_W)
            }
        }
    }

    /// Emit a `bipush` / `sipush` / `newarray` style byte or short immediate.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] if the opcode takes no such operand.
    pub fn emit_immediate(&mut self, opcode: u8, value: i16) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        match meta.op_type {
            OperandType::Byte | OperandType::NewArray => {
                let byte = i8::try_from(value).map_err(|_| {
                    malformed_error!("Immediate {} does not fit '{}'", value, meta.mnemonic)
                })?;
                self.bytecode.push(opcode);
                write_be(&mut self.bytecode, byte);
            }
            OperandType::Short => {
                self.bytecode.push(opcode);
                write_be(&mut self.bytecode, value);
            }
            _ => return Err(Error::InvalidOpcode(opcode)),
        }
        self.apply_fixed(opcode)
    }

    /// Emit a local variable access using the shortest encoding for `index`.
    ///
    /// `opcode` is the long form (`iload`, `astore`, `ret`, ...).
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for non-local opcodes.
    pub fn emit_local(&mut self, opcode: u8, index: u16) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        if meta.op_type != OperandType::Local {
            return Err(Error::InvalidOpcode(opcode));
        }

        if let Some(short) = local_shorthand(opcode, index) {
            self.bytecode.push(short);
        } else if let Ok(byte) = u8::try_from(index) {
            self.bytecode.push(opcode);
            self.bytecode.push(byte);
        } else {
            self.bytecode.push(WIDE);
            self.bytecode.push(opcode);
            write_be(&mut self.bytecode, index);
        }

        let width = if matches!(opcode, LLOAD | DLOAD | LSTORE | DSTORE) { 2 } else { 1 };
        self.max_locals = self.max_locals.max(index.saturating_add(width));
        self.apply_fixed(opcode)
    }

    /// Emit `iinc`, widened when needed.
    ///
    /// # Errors
    /// Currently infallible.
    pub fn emit_iinc(&mut self, index: u16, delta: i16) -> Result<()> {
        match (u8::try_from(index), i8::try_from(delta)) {
            (Ok(index), Ok(delta)) => {
                self.bytecode.push(IINC);
                self.bytecode.push(index);
                write_be(&mut self.bytecode, delta);
            }
            _ => {
                self.bytecode.push(WIDE);
                self.bytecode.push(IINC);
                write_be(&mut self.bytecode, index);
                write_be(&mut self.bytecode, delta);
            }
        }
        self.max_locals = self.max_locals.max(index.saturating_add(1));
        Ok(())
    }

    /// Emit a branch to `label`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for non-branch opcodes and
    /// [`crate::Error::Malformed`] if the stack depth disagrees with an earlier branch to
    /// the same label.
    pub fn emit_branch(&mut self, opcode: u8, label: &str) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        let offset_size = match meta.op_type {
            OperandType::Branch16 => 2,
            OperandType::Branch32 => 4,
            _ => return Err(Error::InvalidOpcode(opcode)),
        };

        if matches!(opcode, JSR | JSR_W) {
            self.untracked_only(meta.mnemonic)?;
        }

        let instruction_position = self.bytecode.len();
        self.bytecode.push(opcode);
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            instruction_position,
            offset_size,
        });
        self.bytecode.extend(std::iter::repeat(0).take(offset_size as usize));

        self.apply_fixed(opcode)?;
        self.record_label_stack_depth(label)?;
        if matches!(opcode, GOTO | GOTO_W) {
            self.unreachable = true;
        }
        Ok(())
    }

    /// Emit `tableswitch` covering `low..=low + targets.len() - 1`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an empty or oversized table.
    pub fn emit_table_switch(&mut self, low: i32, default: &str, targets: &[&str]) -> Result<()> {
        if targets.is_empty() {
            return Err(malformed_error!("tableswitch without targets"));
        }
        let count = i32::try_from(targets.len())
            .map_err(|_| malformed_error!("tableswitch table too large"))?;
        let high = low
            .checked_add(count - 1)
            .ok_or_else(|| malformed_error!("tableswitch range overflow"))?;

        let instruction_position = self.start_switch(TABLESWITCH)?;
        self.push_switch_fixup(default, instruction_position);
        write_be(&mut self.bytecode, low);
        write_be(&mut self.bytecode, high);
        for target in targets {
            self.push_switch_fixup(target, instruction_position);
        }
        self.finish_switch(default, targets.iter().copied())
    }

    /// Emit `lookupswitch`; pairs are sorted by key as the format requires.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for duplicate keys.
    pub fn emit_lookup_switch(&mut self, default: &str, pairs: &[(i32, &str)]) -> Result<()> {
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        if sorted.windows(2).any(|pair| pair[0].0 == pair[1].0) {
            return Err(malformed_error!("lookupswitch with duplicate keys"));
        }

        let instruction_position = self.start_switch(LOOKUPSWITCH)?;
        self.push_switch_fixup(default, instruction_position);
        let count = i32::try_from(sorted.len())
            .map_err(|_| malformed_error!("lookupswitch table too large"))?;
        write_be(&mut self.bytecode, count);
        for (key, target) in &sorted {
            write_be(&mut self.bytecode, *key);
            self.push_switch_fixup(target, instruction_position);
        }
        self.finish_switch(default, sorted.iter().map(|(_, target)| *target))
    }

    fn start_switch(&mut self, opcode: u8) -> Result<usize> {
        let instruction_position = self.bytecode.len();
        self.bytecode.push(opcode);
        while self.bytecode.len() % 4 != 0 {
            self.bytecode.push(0);
        }
        self.apply_fixed(opcode)?;
        Ok(instruction_position)
    }

    fn push_switch_fixup(&mut self, label: &str, instruction_position: usize) {
        self.fixups.push(LabelFixup {
            label: label.to_string(),
            fixup_position: self.bytecode.len(),
            instruction_position,
            offset_size: 4,
        });
        write_be(&mut self.bytecode, 0_i32);
    }

    fn finish_switch<'a>(
        &mut self,
        default: &str,
        targets: impl Iterator<Item = &'a str>,
    ) -> Result<()> {
        self.record_label_stack_depth(default)?;
        for target in targets {
            self.record_label_stack_depth(target)?;
        }
        self.unreachable = true;
        Ok(())
    }

    /// Re-emit a decoded instruction, retargeting branches to `@<original offset>` labels.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidOpcode`] for inconsistent instruction data.
    pub fn emit_decoded(&mut self, decoded: &Instruction) -> Result<()> {
        match &decoded.operand {
            Operand::None => self.emit(decoded.opcode),
            Operand::Byte(value) => self.emit_immediate(decoded.opcode, i16::from(*value)),
            Operand::NewArray(code) => {
                self.bytecode.push(decoded.opcode);
                self.bytecode.push(*code);
                self.apply_fixed(decoded.opcode)
            }
            Operand::Short(value) => self.emit_immediate(decoded.opcode, *value),
            Operand::Local(index) => self.emit_local(decoded.opcode, *index),
            Operand::Constant(index) if matches!(decoded.opcode, LDC | LDC_W) => {
                self.emit_ldc(*index, false)
            }
            Operand::Constant(index) => {
                let (pops, pushes) = self.fixed_or_zero(decoded.stack);
                self.emit_constant(decoded.opcode, *index, pops, pushes)
            }
            Operand::Branch(target) => self.emit_branch(decoded.opcode, &offset_label(*target)),
            Operand::Iinc { index, delta } => self.emit_iinc(*index, *delta),
            Operand::InvokeInterface { index, count } => {
                self.bytecode.push(decoded.opcode);
                write_be(&mut self.bytecode, *index);
                self.bytecode.push(*count);
                self.bytecode.push(0);
                self.untracked_only(decoded.mnemonic)
            }
            Operand::InvokeDynamic(index) => {
                self.bytecode.push(decoded.opcode);
                write_be(&mut self.bytecode, *index);
                write_be(&mut self.bytecode, 0_u16);
                self.untracked_only(decoded.mnemonic)
            }
            Operand::MultiANewArray { index, dimensions } => {
                self.bytecode.push(decoded.opcode);
                write_be(&mut self.bytecode, *index);
                self.bytecode.push(*dimensions);
                self.untracked_only(decoded.mnemonic)
            }
            Operand::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                let default = offset_label(*default);
                let labels: Vec<String> = targets.iter().map(|target| offset_label(*target)).collect();
                let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
                self.emit_table_switch(*low, &default, &labels)
            }
            Operand::LookupSwitch { default, pairs } => {
                let default = offset_label(*default);
                let labels: Vec<(i32, String)> = pairs
                    .iter()
                    .map(|(key, target)| (*key, offset_label(*target)))
                    .collect();
                let labels: Vec<(i32, &str)> =
                    labels.iter().map(|(key, label)| (*key, label.as_str())).collect();
                self.emit_lookup_switch(&default, &labels)
            }
        }
    }

    fn fixed_or_zero(&self, stack: StackEffect) -> (u16, u16) {
        match stack {
            StackEffect::Fixed { pops, pushes } => (u16::from(pops), u16::from(pushes)),
            StackEffect::Variable => (0, 0),
        }
    }

    fn untracked_only(&mut self, mnemonic: &'static str) -> Result<()> {
        if self.track_stack {
            return Err(Error::NotSupported(format!(
                "'{mnemonic}' requires relocating mode"
            )));
        }
        Ok(())
    }

    /// Define `name` at the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateLabel`] if already defined, and
    /// [`crate::Error::Malformed`] if fall-through and branches disagree on the stack depth.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::DuplicateLabel(name.to_string()));
        }

        if self.track_stack {
            if let Some(&expected) = self.label_stack_depths.get(name) {
                if self.unreachable {
                    self.current_stack_depth = expected;
                } else if self.current_stack_depth != expected {
                    return Err(malformed_error!(
                        "Stack depth mismatch at label '{}': expected {} (from branch), got {} (current)",
                        name,
                        expected,
                        self.current_stack_depth
                    ));
                }
            } else if !self.unreachable {
                self.label_stack_depths
                    .insert(name.to_string(), self.current_stack_depth);
            } else {
                self.current_stack_depth = 0;
            }
        }

        self.unreachable = false;
        let position = self.current_position();
        self.labels.insert(name.to_string(), position);
        Ok(())
    }

    /// Resolve all branches and return the finished body.
    ///
    /// # Errors
    /// Returns [`crate::Error::UndefinedLabel`] for unresolved labels and
    /// [`crate::Error::InvalidBranch`] for displacements that do not fit their encoding.
    pub fn finalize(mut self) -> Result<EncodedBody> {
        let mut branch_targets = BTreeMap::new();

        for fixup in &self.fixups {
            let target = *self
                .labels
                .get(&fixup.label)
                .ok_or_else(|| Error::UndefinedLabel(fixup.label.clone()))?;

            let displacement = i64::from(target) - fixup.instruction_position as i64;
            match fixup.offset_size {
                2 => {
                    let short = i16::try_from(displacement).map_err(|_| {
                        Error::InvalidBranch(format!(
                            "displacement {displacement} to '{}' exceeds 16 bits",
                            fixup.label
                        ))
                    })?;
                    patch_be(&mut self.bytecode, fixup.fixup_position, short)?;
                }
                _ => {
                    let long = i32::try_from(displacement).map_err(|_| {
                        Error::InvalidBranch(format!("displacement to '{}' exceeds 32 bits", fixup.label))
                    })?;
                    patch_be(&mut self.bytecode, fixup.fixup_position, long)?;
                }
            }

            let depth = self
                .label_stack_depths
                .get(&fixup.label)
                .copied()
                .unwrap_or(0);
            branch_targets.insert(target, u16::try_from(depth).unwrap_or(0));
        }

        if self.bytecode.len() > 65535 {
            return Err(malformed_error!("Code array exceeds 65535 bytes"));
        }

        Ok(EncodedBody {
            code: self.bytecode,
            max_stack: self.max_stack_depth,
            max_locals: self.max_locals,
            labels: self.labels,
            branch_targets,
        })
    }

    fn apply_fixed(&mut self, opcode: u8) -> Result<()> {
        let meta = instruction(opcode).ok_or(Error::InvalidOpcode(opcode))?;
        match meta.stack {
            StackEffect::Fixed { pops, pushes } => {
                self.apply_effect(meta.mnemonic, meta.flow, i32::from(pops), i32::from(pushes))
            }
            StackEffect::Variable => self.untracked_only(meta.mnemonic),
        }
    }

    fn apply_effect(
        &mut self,
        mnemonic: &'static str,
        flow: FlowType,
        pops: i32,
        pushes: i32,
    ) -> Result<()> {
        if self.track_stack {
            self.current_stack_depth -= pops;
            if self.current_stack_depth < 0 {
                if !self.unreachable {
                    return Err(Error::StackUnderflow(mnemonic));
                }
                self.current_stack_depth = 0;
            }
            self.current_stack_depth += pushes;

            let depth = u16::try_from(self.current_stack_depth)
                .map_err(|_| malformed_error!("Stack depth exceeds u16 range"))?;
            self.max_stack_depth = self.max_stack_depth.max(depth);
        }

        if matches!(
            flow,
            FlowType::Return | FlowType::Throw | FlowType::SubroutineReturn
        ) {
            self.unreachable = true;
        }
        Ok(())
    }

    fn record_label_stack_depth(&mut self, label: &str) -> Result<()> {
        if !self.track_stack || self.unreachable {
            return Ok(());
        }

        let depth = self.current_stack_depth;
        match self.label_stack_depths.get(label) {
            Some(&expected) if expected != depth => Err(malformed_error!(
                "Stack depth mismatch for branch to '{}': expected {}, but branch has {}",
                label,
                expected,
                depth
            )),
            Some(_) => Ok(()),
            None => {
                self.label_stack_depths.insert(label.to_string(), depth);
                Ok(())
            }
        }
    }
}
