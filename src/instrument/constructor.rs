//! Turning a constructor body into a regular instance method.
//!
//! A constructor starts by pushing the receiver and calling the superclass (or another
//! own) constructor on it. The alias must not repeat that call: the synthesized
//! constructor performs it, and the alias runs afterwards on an initialized object. The
//! split removes the receiver load and replaces the `invokespecial <init>` with pops of the
//! arguments it would have consumed, so everything computed for the call still runs and
//! the operand stack stays balanced.
//!
//! The body is re-encoded, so every table that refers to bytecode offsets is remapped:
//! the exception table, `LineNumberTable`, `LocalVariableTable`, `LocalVariableTypeTable`
//! and `StackMapTable`. Frames describe the receiver as initialized. Other nested `Code`
//! attributes are dropped.

use std::collections::BTreeMap;

use log::debug;

use crate::{
    assembly::{
        decode_code, offset_label,
        opcodes::{ALOAD, ALOAD_0, INVOKESPECIAL, NEW, POP, POP2},
        EncodedBody, Instruction, InstructionEncoder, Operand,
    },
    classfile::{
        attributes::{
            parse_line_numbers, parse_local_variables, write_line_numbers,
            write_local_variables, Attribute, CodeAttribute, ExceptionHandler, LINE_NUMBER_TABLE,
            LOCAL_VARIABLE_TABLE, LOCAL_VARIABLE_TYPE_TABLE, STACK_MAP_TABLE,
        },
        constantpool::ConstantPool,
        descriptor::MethodDescriptor,
        member::{MethodInfo, CONSTRUCTOR_NAME},
        stackmap::{initial_locals, Frame, StackMapTable, VerificationType},
    },
    Result,
};

/// Position of the receiver load and the constructor call it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstructorCall {
    /// Index of the `aload_0` in the decoded instruction list
    pub receiver: usize,
    /// Index of the `invokespecial <init>`
    pub call: usize,
}

fn is_receiver_load(instruction: &Instruction) -> bool {
    instruction.opcode == ALOAD_0
        || (instruction.opcode == ALOAD && instruction.operand == Operand::Local(0))
}

/// Locate the receiver load and the superclass/this constructor call.
///
/// Scans linearly, tracking operand stack depth in slots. The call is the first
/// `invokespecial <init>` that consumes the entire stack, and the receiver is the last
/// instruction executed at depth 0 before it. Calls whose receiver is a `new` (objects
/// constructed before the super call) are skipped.
pub(crate) fn find_constructor_call(
    unit: &str,
    instructions: &[Instruction],
    handlers: &[ExceptionHandler],
    pool: &ConstantPool,
) -> Result<ConstructorCall> {
    let mut known_depths: BTreeMap<u32, i32> = handlers
        .iter()
        .map(|handler| (u32::from(handler.handler_pc), 1))
        .collect();
    let mut depth: Option<i32> = Some(0);
    let mut last_at_zero: Option<usize> = None;

    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(&known) = known_depths.get(&instruction.offset) {
            depth = Some(known);
        }
        let Some(current) = depth else {
            // unreachable without a recorded entry depth, nothing to learn here
            continue;
        };
        if current == 0 {
            last_at_zero = Some(index);
        }

        let (pops, pushes) = instruction.stack_effect(pool)?;
        let (pops, pushes) = (i32::from(pops), i32::from(pushes));

        if instruction.opcode == INVOKESPECIAL && pops == current {
            if let Operand::Constant(constant) = instruction.operand {
                let member = pool.member_ref(constant)?;
                if member.name == CONSTRUCTOR_NAME {
                    let receiver = last_at_zero
                        .ok_or_else(|| transform_error!(unit, "constructor call without receiver"))?;
                    if is_receiver_load(&instructions[receiver]) {
                        return Ok(ConstructorCall {
                            receiver,
                            call: index,
                        });
                    }
                    if instructions[receiver].opcode != NEW {
                        return Err(transform_error!(
                            unit,
                            "constructor call at {} does not consume the receiver",
                            instruction.offset
                        ));
                    }
                }
            }
        }

        if current < pops {
            return Err(transform_error!(
                unit,
                "operand stack underflow at {} ('{}')",
                instruction.offset,
                instruction.mnemonic
            ));
        }
        let after = current - pops + pushes;

        for target in instruction.branch_targets() {
            known_depths.entry(target).or_insert(after);
        }
        depth = if instruction.is_terminal() {
            None
        } else {
            Some(after)
        };
    }

    Err(transform_error!(
        unit,
        "constructor has no receiver load followed by a superclass constructor call"
    ))
}

/// Offset translation from the original body to the rewritten one.
struct OffsetMap<'a> {
    body: &'a EncodedBody,
}

impl OffsetMap<'_> {
    fn map(&self, offset: u16) -> Result<u16> {
        let position = self
            .body
            .labels
            .get(&offset_label(u32::from(offset)))
            .ok_or_else(|| malformed_error!("Offset {} is not an instruction boundary", offset))?;
        u16::try_from(*position).map_err(|_| malformed_error!("Rewritten code exceeds 65535 bytes"))
    }
}

fn remap_local_table(info: &[u8], offsets: &OffsetMap<'_>) -> Result<Vec<u8>> {
    let mut locals = parse_local_variables(info)?;
    for local in &mut locals {
        let start = offsets.map(local.start_pc)?;
        let end = offsets.map(local.start_pc.saturating_add(local.length))?;
        local.start_pc = start;
        local.length = end.saturating_sub(start);
    }
    write_local_variables(&locals)
}

fn remap_frames(
    info: &[u8],
    owner: &str,
    descriptor: &MethodDescriptor,
    split: (u32, u32),
    offsets: &OffsetMap<'_>,
    pool: &mut ConstantPool,
) -> Result<Vec<u8>> {
    let original = StackMapTable::parse(
        info,
        initial_locals(owner, descriptor, false, true, pool)?,
    )?;
    let this_class = VerificationType::Object(pool.add_class(owner)?);
    let (receiver_offset, call_offset) = split;

    let substitute = |entry: &VerificationType| -> Result<VerificationType> {
        Ok(match entry {
            VerificationType::UninitializedThis => this_class,
            VerificationType::Uninitialized(new_offset) => {
                VerificationType::Uninitialized(offsets.map(*new_offset)?)
            }
            other => *other,
        })
    };

    let mut frames: Vec<Frame> = Vec::with_capacity(original.frames.len());
    for frame in &original.frames {
        let offset = u32::from(frame.offset);
        let mut stack = frame.stack.as_slice();
        if offset > receiver_offset && offset <= call_offset && !stack.is_empty() {
            stack = &stack[1..];
        }

        let rewritten = Frame {
            offset: offsets.map(frame.offset)?,
            locals: frame.locals.iter().map(&substitute).collect::<Result<_>>()?,
            stack: stack.iter().map(&substitute).collect::<Result<_>>()?,
        };

        match frames.last_mut() {
            Some(last) if last.offset == rewritten.offset => *last = rewritten,
            _ => frames.push(rewritten),
        }
    }

    StackMapTable {
        initial: initial_locals(owner, descriptor, false, false, pool)?,
        frames,
    }
    .to_bytes()
}

/// Build the constructor alias: the original body minus receiver load and constructor call.
///
/// The alias keeps the original descriptor and attributes, is made public and renamed to
/// `alias`.
///
/// # Errors
/// Returns [`crate::Error::TransformFailure`] if the constructor has no body or no
/// recognizable receiver load and constructor call.
pub(crate) fn constructor_alias(
    unit: &str,
    owner: &str,
    constructor: &MethodInfo,
    alias: &str,
    pool: &mut ConstantPool,
) -> Result<MethodInfo> {
    let code = constructor
        .code(pool)?
        .ok_or_else(|| transform_error!(unit, "constructor {} has no code", constructor.descriptor))?;
    let instructions = decode_code(&code.code)?;
    let split = find_constructor_call(unit, &instructions, &code.exception_table, pool)?;

    let call = &instructions[split.call];
    let (pops, _) = call.stack_effect(pool)?;
    let call_descriptor: MethodDescriptor = match call.operand {
        Operand::Constant(index) => pool.member_ref(index)?.descriptor.parse()?,
        _ => return Err(transform_error!(unit, "constructor call without a method reference")),
    };
    debug_assert_eq!(pops, call_descriptor.argument_slots() + 1);

    let mut encoder = InstructionEncoder::relocating();
    for (index, instruction) in instructions.iter().enumerate() {
        encoder.define_label(&offset_label(instruction.offset))?;
        if index == split.receiver {
            continue;
        }
        if index == split.call {
            for param in call_descriptor.params.iter().rev() {
                encoder.emit(if param.slot_size() == 2 { POP2 } else { POP })?;
            }
            continue;
        }
        encoder.emit_decoded(instruction)?;
    }
    let end = u32::try_from(code.code.len()).map_err(|_| malformed_error!("Code too large"))?;
    encoder.define_label(&offset_label(end))?;
    let body = encoder.finalize()?;
    let offsets = OffsetMap { body: &body };

    let mut exception_table = Vec::with_capacity(code.exception_table.len());
    for handler in &code.exception_table {
        let start_pc = offsets.map(handler.start_pc)?;
        let end_pc = offsets.map(handler.end_pc)?;
        if start_pc < end_pc {
            exception_table.push(ExceptionHandler {
                start_pc,
                end_pc,
                handler_pc: offsets.map(handler.handler_pc)?,
                catch_type: handler.catch_type,
            });
        }
    }

    let descriptor = constructor.parsed_descriptor()?;
    let mut attributes = Vec::with_capacity(code.attributes.len());
    for attribute in &code.attributes {
        let info = match attribute.name.as_str() {
            LINE_NUMBER_TABLE => {
                let mut lines = parse_line_numbers(&attribute.info)?;
                for line in &mut lines {
                    line.start_pc = offsets.map(line.start_pc)?;
                }
                write_line_numbers(&lines)?
            }
            LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                remap_local_table(&attribute.info, &offsets)?
            }
            STACK_MAP_TABLE => remap_frames(
                &attribute.info,
                owner,
                &descriptor,
                (instructions[split.receiver].offset, call.offset),
                &offsets,
                pool,
            )?,
            other => {
                debug!("{unit}: dropping '{other}' from constructor alias {alias}");
                continue;
            }
        };
        attributes.push(Attribute::new(&attribute.name, info));
    }

    let rewritten = CodeAttribute {
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        code: body.code.clone(),
        exception_table,
        attributes,
    };

    let mut method = constructor.clone();
    method.name = alias.to_string();
    method.access = constructor.access.made_public();
    method.set_code(&rewritten, pool)?;
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::opcodes::{ILOAD, RETURN},
        classfile::{unit::ClassFile, ClassBuilder, FieldAccessFlags, MethodAccessFlags},
        test::factories::{
            constructor_with_argument_work, constructor_with_new_argument,
            delegating_constructor, inner_class,
        },
    };

    fn mnemonics(class: &ClassFile, method: &MethodInfo) -> Vec<&'static str> {
        let code = method.code(&class.pool).unwrap().unwrap();
        decode_code(&code.code)
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect()
    }

    fn alias_of(bytes: &[u8], descriptor: &str) -> (ClassFile, MethodInfo) {
        let mut class = ClassFile::parse(bytes).unwrap();
        let constructor = class.method(CONSTRUCTOR_NAME, descriptor).unwrap().clone();
        let name = class.name.clone();
        let alias =
            constructor_alias(&name, &name, &constructor, "__constructor__", &mut class.pool)
                .unwrap();
        (class, alias)
    }

    #[test]
    fn test_split_removes_receiver_and_super_call() {
        let bytes = ClassBuilder::new("p/Fielded")
            .field(FieldAccessFlags::PRIVATE, "value", "I")
            .method(MethodAccessFlags::empty(), CONSTRUCTOR_NAME, "(I)V", |gen| {
                gen.load_this()?;
                gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
                gen.load_this()?;
                gen.encoder().emit_local(ILOAD, 1)?;
                gen.put_field("p/Fielded", "value", "I")?;
                gen.emit(RETURN)
            })
            .to_bytes()
            .unwrap();

        let (class, alias) = alias_of(&bytes, "(I)V");
        assert_eq!(alias.name, "__constructor__");
        assert!(alias.access.contains(MethodAccessFlags::PUBLIC));

        let code = alias.code(&class.pool).unwrap().unwrap();
        let mnemonics: Vec<&str> = decode_code(&code.code)
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect();
        assert_eq!(mnemonics, vec!["aload_0", "iload_1", "putfield", "return"]);
    }

    #[test]
    fn test_arguments_of_super_call_are_popped() {
        let (class, alias) = alias_of(&constructor_with_argument_work("p/Derived"), "(JI)V");
        let code = alias.code(&class.pool).unwrap().unwrap();
        let instructions = decode_code(&code.code).unwrap();
        let mnemonics: Vec<&str> = instructions.iter().map(|i| i.mnemonic).collect();

        // super(value, flag ? 1 : 2) keeps its argument computation, the call becomes pops
        assert_eq!(mnemonics.first(), Some(&"lload_1"));
        assert!(!mnemonics.contains(&"invokespecial"));
        let pops: Vec<&&str> = mnemonics
            .iter()
            .filter(|mnemonic| mnemonic.starts_with("pop"))
            .collect();
        assert_eq!(pops, vec![&"pop", &"pop2"]);
        assert!(code.attribute(STACK_MAP_TABLE).is_some());
    }

    #[test]
    fn test_enclosing_instance_store_is_kept() {
        let (class, alias) = alias_of(&inner_class("p/Outer"), "(Lp/Outer;)V");

        // the store into this$0 ahead of super() stays, the second receiver load goes
        assert_eq!(
            mnemonics(&class, &alias),
            vec!["aload_0", "aload_1", "putfield", "return"]
        );
        let code = alias.code(&class.pool).unwrap().unwrap();
        let Operand::Constant(index) = decode_code(&code.code).unwrap()[2].operand else {
            panic!("putfield without a constant");
        };
        assert_eq!(class.pool.member_ref(index).unwrap().name, "this$0");
    }

    #[test]
    fn test_object_built_for_super_call_is_kept() {
        let (class, alias) = alias_of(&constructor_with_new_argument("p/Holder"), "()V");

        // new/dup/<init> of the argument survive, the argument itself is dropped
        assert_eq!(
            mnemonics(&class, &alias),
            vec!["new", "dup", "invokespecial", "pop", "return"]
        );
        let code = alias.code(&class.pool).unwrap().unwrap();
        let Operand::Constant(index) = decode_code(&code.code).unwrap()[2].operand else {
            panic!("invokespecial without a constant");
        };
        assert_eq!(class.pool.member_ref(index).unwrap().owner, "p/Part");
    }

    #[test]
    fn test_delegation_to_own_constructor_is_split() {
        let bytes = delegating_constructor("p/Delegating");

        let (class, alias) = alias_of(&bytes, "()V");
        assert_eq!(mnemonics(&class, &alias), vec!["iconst_0", "pop", "return"]);

        let (class, alias) = alias_of(&bytes, "(I)V");
        assert_eq!(mnemonics(&class, &alias), vec!["return"]);
    }

    #[test]
    fn test_missing_super_call_fails() {
        let bytes = ClassBuilder::new("p/Broken")
            .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V", |gen| {
                gen.emit(RETURN)
            })
            .to_bytes()
            .unwrap();
        let mut class = ClassFile::parse(&bytes).unwrap();
        let constructor = class.methods[0].clone();

        let error =
            constructor_alias("p.Broken", "p/Broken", &constructor, "__constructor__", &mut class.pool)
                .unwrap_err();
        assert!(matches!(error, crate::Error::TransformFailure { .. }));
    }
}
