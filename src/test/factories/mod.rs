//! Compiled units shared by unit tests.
//!
//! Every factory returns serialized class-file bytes so tests exercise the parser as well.

use crate::{
    assembly::{
        opcodes::{
            ALOAD, DUP, GOTO, IADD, ICONST_0, ICONST_1, ICONST_2, IFEQ, ILOAD, INVOKESPECIAL,
            IRETURN, LLOAD, RETURN,
        },
        InstructionEncoder,
    },
    classfile::{
        attributes::{
            write_line_numbers, Attribute, CodeAttribute, LineNumber, LINE_NUMBER_TABLE,
            STACK_MAP_TABLE,
        },
        stackmap::{initial_locals, Frame, StackMapTable, VerificationType},
        ClassBuilder, FieldAccessFlags, MethodAccessFlags, MethodDescriptor, MethodInfo,
        CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME,
    },
};

/// `public class <name>` with only `public <init>()V`.
pub fn simple_class(name: &str) -> Vec<u8> {
    ClassBuilder::new(name)
        .default_constructor()
        .to_bytes()
        .unwrap()
}

/// A unit with one member of every kind.
///
/// - `private int count`
/// - `<init>(I)V` storing the argument into `count`
/// - `public int size()` returning `count`
/// - `static int twice(int)`
/// - an empty `<clinit>`
pub fn widget_class(name: &str) -> Vec<u8> {
    let owner = name.to_string();
    let reader = name.to_string();
    ClassBuilder::new(name)
        .field(FieldAccessFlags::PRIVATE, "count", "I")
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "(I)V", move |gen| {
            gen.load_this()?;
            gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
            gen.load_this()?;
            gen.encoder().emit_local(ILOAD, 1)?;
            gen.put_field(&owner, "count", "I")?;
            gen.emit(RETURN)
        })
        .method(MethodAccessFlags::PUBLIC, "size", "()I", move |gen| {
            gen.load_this()?;
            gen.get_field(&reader, "count", "I")?;
            gen.emit(IRETURN)
        })
        .method(MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "twice", "(I)I", |gen| {
            gen.encoder().emit_local(ILOAD, 0)?;
            gen.encoder().emit_local(ILOAD, 0)?;
            gen.emit(IADD)?;
            gen.emit(IRETURN)
        })
        .method(MethodAccessFlags::STATIC, STATIC_INITIALIZER_NAME, "()V", |gen| {
            gen.emit(RETURN)
        })
        .to_bytes()
        .unwrap()
}

/// `<name> extends p/Base` whose constructor `(JI)V` computes the superclass arguments
/// with a branch:
///
/// ```text
/// super(value, flag != 0 ? 1 : 2);
/// ```
///
/// The branch targets carry the uninitialized receiver on the operand stack, so the body
/// has a `StackMapTable` and a `LineNumberTable` that both need remapping.
pub fn constructor_with_argument_work(name: &str) -> Vec<u8> {
    let mut class = ClassBuilder::new(name).super_class("p/Base").build().unwrap();
    let pool = &mut class.pool;

    let super_call = pool.add_method_ref("p/Base", CONSTRUCTOR_NAME, "(JI)V").unwrap();
    let mut encoder = InstructionEncoder::relocating();
    encoder.emit_local(ALOAD, 0).unwrap();
    encoder.emit_local(LLOAD, 1).unwrap();
    encoder.emit_local(ILOAD, 3).unwrap();
    encoder.emit_branch(IFEQ, "else").unwrap();
    encoder.emit(ICONST_1).unwrap();
    encoder.emit_branch(GOTO, "end").unwrap();
    encoder.define_label("else").unwrap();
    encoder.emit(ICONST_2).unwrap();
    encoder.define_label("end").unwrap();
    encoder.emit_constant(INVOKESPECIAL, super_call, 4, 0).unwrap();
    encoder.emit(RETURN).unwrap();
    let body = encoder.finalize().unwrap();

    let else_offset = u16::try_from(body.labels["else"]).unwrap();
    let end_offset = u16::try_from(body.labels["end"]).unwrap();

    let descriptor: MethodDescriptor = "(JI)V".parse().unwrap();
    let initial = initial_locals(name, &descriptor, false, true, pool).unwrap();
    let frames = StackMapTable {
        initial: initial.clone(),
        frames: vec![
            Frame {
                offset: else_offset,
                locals: initial.clone(),
                stack: vec![VerificationType::UninitializedThis, VerificationType::Long],
            },
            Frame {
                offset: end_offset,
                locals: initial,
                stack: vec![
                    VerificationType::UninitializedThis,
                    VerificationType::Long,
                    VerificationType::Integer,
                ],
            },
        ],
    };
    let lines = write_line_numbers(&[
        LineNumber { start_pc: 0, line: 10 },
        LineNumber {
            start_pc: else_offset,
            line: 11,
        },
    ])
    .unwrap();

    let code = CodeAttribute {
        max_stack: 4,
        max_locals: 4,
        code: body.code,
        exception_table: Vec::new(),
        attributes: vec![
            Attribute::new(STACK_MAP_TABLE, frames.to_bytes().unwrap()),
            Attribute::new(LINE_NUMBER_TABLE, lines),
        ],
    };
    let mut constructor = MethodInfo::new(MethodAccessFlags::PROTECTED, CONSTRUCTOR_NAME, "(JI)V");
    constructor.set_code(&code, pool).unwrap();
    class.methods.push(constructor);
    class.to_bytes().unwrap()
}

/// `<outer>$Inner`, a non-static inner class. Its constructor stores the enclosing instance
/// before the superclass constructor runs:
///
/// ```text
/// aload_0; aload_1; putfield this$0; aload_0; invokespecial Object.<init>()V; return
/// ```
pub fn inner_class(outer: &str) -> Vec<u8> {
    let name = format!("{outer}$Inner");
    let enclosing = format!("L{outer};");
    let descriptor = format!("({enclosing})V");
    let owner = name.clone();
    let field_type = enclosing.clone();
    ClassBuilder::new(&name)
        .field(FieldAccessFlags::FINAL | FieldAccessFlags::SYNTHETIC, "this$0", &enclosing)
        .method(MethodAccessFlags::empty(), CONSTRUCTOR_NAME, &descriptor, move |gen| {
            gen.load_this()?;
            gen.encoder().emit_local(ALOAD, 1)?;
            gen.put_field(&owner, "this$0", &field_type)?;
            gen.load_this()?;
            gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
            gen.emit(RETURN)
        })
        .to_bytes()
        .unwrap()
}

/// `<name> extends p/Base` whose constructor passes a freshly built object up:
///
/// ```text
/// super(new p.Part());
/// ```
pub fn constructor_with_new_argument(name: &str) -> Vec<u8> {
    ClassBuilder::new(name)
        .super_class("p/Base")
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V", |gen| {
            gen.load_this()?;
            gen.new_instance("p/Part")?;
            gen.emit(DUP)?;
            gen.invoke_special("p/Part", CONSTRUCTOR_NAME, "()V")?;
            gen.invoke_special("p/Base", CONSTRUCTOR_NAME, "(Lp/Part;)V")?;
            gen.emit(RETURN)
        })
        .to_bytes()
        .unwrap()
}

/// `<name>` with a no-argument constructor delegating to another one:
///
/// ```text
/// <name>() { this(0); }
/// <name>(int value) { super(); }
/// ```
pub fn delegating_constructor(name: &str) -> Vec<u8> {
    let owner = name.to_string();
    ClassBuilder::new(name)
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V", move |gen| {
            gen.load_this()?;
            gen.emit(ICONST_0)?;
            gen.invoke_special(&owner, CONSTRUCTOR_NAME, "(I)V")?;
            gen.emit(RETURN)
        })
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "(I)V", |gen| {
            gen.load_this()?;
            gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
            gen.emit(RETURN)
        })
        .to_bytes()
        .unwrap()
}
