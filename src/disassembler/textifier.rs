use std::fmt::Write;

use crate::{
    assembly::{decode_code, Instruction, Operand},
    classfile::{
        access::FieldAccessFlags,
        attributes::{parse_local_variables, LocalVariable, LOCAL_VARIABLE_TABLE, STACK_MAP_TABLE},
        constantpool::{Constant, ConstantPool},
        member::{FieldInfo, MethodInfo},
        stackmap::{initial_locals, StackMapTable, VerificationType},
        unit::ClassFile,
    },
    Result,
};

fn field_keywords(access: FieldAccessFlags) -> Vec<&'static str> {
    let mut words = Vec::new();
    for (flag, word) in [
        (FieldAccessFlags::PUBLIC, "public"),
        (FieldAccessFlags::PRIVATE, "private"),
        (FieldAccessFlags::PROTECTED, "protected"),
        (FieldAccessFlags::STATIC, "static"),
        (FieldAccessFlags::FINAL, "final"),
        (FieldAccessFlags::VOLATILE, "volatile"),
        (FieldAccessFlags::TRANSIENT, "transient"),
    ] {
        if access.contains(flag) {
            words.push(word);
        }
    }
    words
}

fn prefixed(words: &[&str]) -> String {
    let mut out = String::new();
    for word in words {
        out.push_str(word);
        out.push(' ');
    }
    out
}

/// Render a pool entry the way it reads in a listing.
fn constant(pool: &ConstantPool, index: u16) -> String {
    if let Ok(member) = pool.member_ref(index) {
        return format!("{}.{} : {}", member.owner, member.name, member.descriptor);
    }
    if let Ok((name, descriptor)) = pool.dynamic_name_and_type(index) {
        return format!("{name} : {descriptor}");
    }

    match pool.get(index) {
        Ok(Constant::Class { .. }) => pool.class_name(index).unwrap_or("?").to_string(),
        Ok(Constant::String { string_index }) => {
            match pool.utf8_lossy(*string_index) {
                Ok(text) => format!("{text:?}"),
                Err(_) => "?".to_string(),
            }
        }
        Ok(Constant::Integer(value)) => value.to_string(),
        Ok(Constant::Float(bits)) => format!("{}F", f32::from_bits(*bits)),
        Ok(Constant::Long(value)) => format!("{value}L"),
        Ok(Constant::Double(bits)) => format!("{}D", f64::from_bits(*bits)),
        Ok(other) => format!("#{index} {:?}", other.tag()),
        Err(_) => format!("#{index} <invalid>"),
    }
}

fn operand(pool: &ConstantPool, instruction: &Instruction) -> String {
    match &instruction.operand {
        Operand::Constant(index)
        | Operand::InvokeDynamic(index)
        | Operand::InvokeInterface { index, .. } => constant(pool, *index),
        Operand::MultiANewArray { index, dimensions } => {
            format!("{} {dimensions}", constant(pool, *index))
        }
        Operand::TableSwitch {
            default,
            low,
            targets,
            ..
        } => {
            let mut text = String::new();
            for (key, target) in (*low..).zip(targets) {
                let _ = write!(text, "\n          {key}: L{target}");
            }
            let _ = write!(text, "\n          default: L{default}");
            text
        }
        Operand::LookupSwitch { default, pairs } => {
            let mut text = String::new();
            for (key, target) in pairs {
                let _ = write!(text, "\n          {key}: L{target}");
            }
            let _ = write!(text, "\n          default: L{default}");
            text
        }
        other => other.to_string(),
    }
}

fn verification(pool: &ConstantPool, entry: &VerificationType) -> String {
    match entry {
        VerificationType::Object(index) => pool.class_name(*index).unwrap_or("?").to_string(),
        VerificationType::Uninitialized(offset) => format!("uninitialized L{offset}"),
        other => format!("{other:?}"),
    }
}

fn write_field(out: &mut String, field: &FieldInfo) {
    let _ = writeln!(
        out,
        "  {}{} {}",
        prefixed(&field_keywords(field.access)),
        field.descriptor,
        field.name
    );
}

fn write_method(out: &mut String, method: &MethodInfo, class: &ClassFile) -> Result<()> {
    let _ = writeln!(
        out,
        "\n  {}{}{}",
        prefixed(&method.access.keywords()),
        method.name,
        method.descriptor
    );

    let exceptions = method.exceptions(&class.pool)?;
    if !exceptions.is_empty() {
        let _ = writeln!(out, "    throws {}", exceptions.join(" "));
    }

    let Some(code) = method.code(&class.pool)? else {
        return Ok(());
    };

    for instruction in decode_code(&code.code)? {
        let text = operand(&class.pool, &instruction);
        let wide = if instruction.wide { "wide " } else { "" };
        if text.is_empty() {
            let _ = writeln!(out, "   L{}: {wide}{}", instruction.offset, instruction.mnemonic);
        } else {
            let _ = writeln!(
                out,
                "   L{}: {wide}{} {text}",
                instruction.offset, instruction.mnemonic
            );
        }
    }

    for handler in &code.exception_table {
        let catch = match handler.catch_type {
            0 => "any".to_string(),
            index => class.pool.class_name(index).unwrap_or("?").to_string(),
        };
        let _ = writeln!(
            out,
            "    TRYCATCHBLOCK L{} L{} L{} {catch}",
            handler.start_pc, handler.end_pc, handler.handler_pc
        );
    }

    if let Some(attribute) = code.attribute(LOCAL_VARIABLE_TABLE) {
        let locals: Vec<LocalVariable> = parse_local_variables(&attribute.info)?;
        for local in locals {
            let _ = writeln!(
                out,
                "    LOCALVARIABLE {} {} L{} L{} {}",
                class.pool.utf8(local.name_index).unwrap_or("?"),
                class.pool.utf8(local.descriptor_index).unwrap_or("?"),
                local.start_pc,
                u32::from(local.start_pc) + u32::from(local.length),
                local.index
            );
        }
    }

    if let Some(attribute) = code.attribute(STACK_MAP_TABLE) {
        // the implicit frame may intern the owner, so names resolve through a scratch pool
        let mut pool = class.pool.clone();
        let initial = initial_locals(
            &class.name,
            &method.parsed_descriptor()?,
            method.is_static(),
            method.is_constructor(),
            &mut pool,
        )?;
        let table = StackMapTable::parse(&attribute.info, initial)?;
        for frame in &table.frames {
            let render = |entries: &[VerificationType]| {
                entries
                    .iter()
                    .map(|entry| verification(&pool, entry))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let _ = writeln!(
                out,
                "    FRAME L{} locals=[{}] stack=[{}]",
                frame.offset,
                render(&frame.locals),
                render(&frame.stack)
            );
        }
    }

    let _ = writeln!(
        out,
        "    MAXSTACK = {}\n    MAXLOCALS = {}",
        code.max_stack, code.max_locals
    );
    Ok(())
}

/// Produce a text listing of `class`.
///
/// The listing shows the class header, every field, and every method with its decoded
/// instructions, exception handlers, local variables, stack map frames and computed sizes.
/// Branch targets and instruction positions are both written as `L<offset>`.
///
/// # Errors
/// Returns an error if a method body or one of its tables cannot be decoded.
pub fn disassemble(class: &ClassFile) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "// class version {}.{}",
        class.major_version, class.minor_version
    );

    let kind = if class.is_interface() { "interface" } else { "class" };
    let _ = write!(out, "{kind} {}", class.name);
    if let Some(super_name) = &class.super_name {
        let _ = write!(out, " extends {super_name}");
    }
    if !class.interfaces.is_empty() {
        let _ = write!(out, " implements {}", class.interfaces.join(", "));
    }
    out.push_str(" {\n");

    for field in &class.fields {
        write_field(&mut out, field);
    }
    for method in &class.methods {
        write_method(&mut out, method, class)?;
    }

    out.push_str("}\n");
    Ok(out)
}

/// Parse `bytes` and produce a text listing.
///
/// # Errors
/// Returns an error if the bytes are not a valid class file.
pub fn disassemble_bytes(bytes: &[u8]) -> Result<String> {
    disassemble(&ClassFile::parse(bytes)?)
}
