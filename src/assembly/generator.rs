//! Typed method body generation on top of [`InstructionEncoder`].
//!
//! [`MethodGenerator`] knows the owning class, the method descriptor and the class-file
//! version, so callers can think in terms of "load every argument", "box this value",
//! "push the class literal" rather than raw opcodes. Constants are interned into the pool
//! the generator borrows, and [`MethodGenerator::finish`] produces a complete
//! [`CodeAttribute`], including `StackMapTable` frames at branch targets when the class
//! version requires them.
//!
//! Frames are derived from the method's implicit initial frame, so bodies that branch must
//! not store into locals beyond the parameters.

use crate::{
    assembly::{
        encoder::InstructionEncoder,
        opcodes::{
            AASTORE, ACONST_NULL, ALOAD, ANEWARRAY, ARETURN, BIPUSH, CHECKCAST, DLOAD, DRETURN,
            DUP, FLOAD, FRETURN, GETFIELD, ICONST_0, ILOAD, INSTANCEOF, INVOKESPECIAL,
            INVOKESTATIC, INVOKEVIRTUAL, IRETURN, LLOAD, LRETURN, NEW, POP, POP2, PUTFIELD,
            RETURN, SIPUSH,
        },
    },
    classfile::{
        access::MethodAccessFlags,
        attributes::{Attribute, CodeAttribute, STACK_MAP_TABLE},
        constantpool::ConstantPool,
        descriptor::{FieldType, MethodDescriptor, ReturnCategory, ReturnType},
        member::CONSTRUCTOR_NAME,
        stackmap::{initial_locals, Frame, StackMapTable},
        unit::{CLASS_LITERAL_MAJOR, STACK_MAP_MAJOR},
    },
    Error, Result,
};

const OBJECT: &str = "java/lang/Object";

/// Load opcode (long form) for a value of `field_type`
#[must_use]
pub fn load_opcode(field_type: &FieldType) -> u8 {
    match field_type {
        FieldType::Long => LLOAD,
        FieldType::Float => FLOAD,
        FieldType::Double => DLOAD,
        FieldType::Object(_) | FieldType::Array(_) => ALOAD,
        _ => ILOAD,
    }
}

/// Return opcode for `ret`
#[must_use]
pub fn return_opcode(ret: &ReturnType) -> u8 {
    match ret {
        ReturnType::Void => RETURN,
        ReturnType::Value(FieldType::Long) => LRETURN,
        ReturnType::Value(FieldType::Float) => FRETURN,
        ReturnType::Value(FieldType::Double) => DRETURN,
        ReturnType::Value(FieldType::Object(_) | FieldType::Array(_)) => ARETURN,
        ReturnType::Value(_) => IRETURN,
    }
}

/// Builds one method body.
pub struct MethodGenerator<'p> {
    pool: &'p mut ConstantPool,
    encoder: InstructionEncoder,
    owner: String,
    descriptor: MethodDescriptor,
    is_static: bool,
    is_constructor: bool,
    major_version: u16,
    next_label: usize,
}

impl<'p> MethodGenerator<'p> {
    /// Start a body for method `name` of class `owner` (internal name).
    #[must_use]
    pub fn new(
        pool: &'p mut ConstantPool,
        owner: &str,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &MethodDescriptor,
        major_version: u16,
    ) -> Self {
        let is_static = access.contains(MethodAccessFlags::STATIC);
        let mut encoder = InstructionEncoder::new();
        encoder.reserve_locals(descriptor.argument_slots() + u16::from(!is_static));

        MethodGenerator {
            pool,
            encoder,
            owner: owner.to_string(),
            descriptor: descriptor.clone(),
            is_static,
            is_constructor: name == CONSTRUCTOR_NAME,
            major_version,
            next_label: 0,
        }
    }

    /// The constant pool constants are interned into
    pub fn pool(&mut self) -> &mut ConstantPool {
        self.pool
    }

    /// Direct access to the underlying encoder
    pub fn encoder(&mut self) -> &mut InstructionEncoder {
        &mut self.encoder
    }

    /// Allocate a fresh label name.
    pub fn new_label(&mut self) -> String {
        let label = format!("L{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// Define `label` at the current position.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateLabel`] or a stack depth mismatch.
    pub fn mark(&mut self, label: &str) -> Result<()> {
        self.encoder.define_label(label)
    }

    /// Emit a branch.
    ///
    /// # Errors
    /// Returns an error for non-branch opcodes or a stack depth mismatch.
    pub fn jump(&mut self, opcode: u8, label: &str) -> Result<()> {
        self.encoder.emit_branch(opcode, label)
    }

    /// Emit an operand-less instruction.
    ///
    /// # Errors
    /// Returns an error for opcodes with operands or on stack underflow.
    pub fn emit(&mut self, opcode: u8) -> Result<()> {
        self.encoder.emit(opcode)
    }

    /// Push the receiver.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] in a static method.
    pub fn load_this(&mut self) -> Result<()> {
        if self.is_static {
            return Err(Error::NotSupported(
                "no receiver in a static method".to_string(),
            ));
        }
        self.encoder.emit_local(ALOAD, 0)
    }

    /// Push the receiver, or `null` in a static method.
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_this_or_null(&mut self) -> Result<()> {
        if self.is_static {
            self.encoder.emit(ACONST_NULL)
        } else {
            self.encoder.emit_local(ALOAD, 0)
        }
    }

    /// Push local `index` holding a value of `field_type`.
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_local(&mut self, field_type: &FieldType, index: u16) -> Result<()> {
        self.encoder.emit_local(load_opcode(field_type), index)
    }

    /// Push every argument with its category-correct load opcode.
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn load_args(&mut self) -> Result<()> {
        let mut slot = u16::from(!self.is_static);
        for param in self.descriptor.params.clone() {
            self.load_local(&param, slot)?;
            slot += param.slot_size();
        }
        Ok(())
    }

    /// Push an `Object[]` holding every argument, primitives boxed.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn load_arg_array(&mut self) -> Result<()> {
        let params = self.descriptor.params.clone();
        self.push_int(i32::try_from(params.len()).unwrap_or(i32::MAX))?;
        self.new_array(OBJECT)?;

        let mut slot = u16::from(!self.is_static);
        for (position, param) in params.iter().enumerate() {
            self.emit(DUP)?;
            self.push_int(i32::try_from(position).unwrap_or(i32::MAX))?;
            self.load_local(param, slot)?;
            self.box_value(param)?;
            self.emit(AASTORE)?;
            slot += param.slot_size();
        }
        Ok(())
    }

    /// Box the primitive on top of the stack; references are left untouched.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn box_value(&mut self, field_type: &FieldType) -> Result<()> {
        if let Some(boxing) = field_type.boxing() {
            self.invoke_static(boxing.wrapper, "valueOf", boxing.value_of)?;
        }
        Ok(())
    }

    /// Convert the `Object` on top of the stack to `ret`.
    ///
    /// `void` pops it. Numeric primitives go through `java/lang/Number`, `boolean` and
    /// `char` through their wrappers. References are cast unless the target is `Object`.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn unbox(&mut self, ret: &ReturnType) -> Result<()> {
        let ReturnType::Value(value) = ret else {
            return self.emit(POP);
        };

        match ret.category() {
            ReturnCategory::Void => self.emit(POP),
            ReturnCategory::Reference => match value {
                FieldType::Object(name) if name == OBJECT => Ok(()),
                _ => self.check_cast(&value.cast_target()),
            },
            ReturnCategory::Primitive => {
                let (wrapper, accessor, descriptor) = match value {
                    FieldType::Boolean => ("java/lang/Boolean", "booleanValue", "()Z"),
                    FieldType::Char => ("java/lang/Character", "charValue", "()C"),
                    FieldType::Long => ("java/lang/Number", "longValue", "()J"),
                    FieldType::Float => ("java/lang/Number", "floatValue", "()F"),
                    FieldType::Double => ("java/lang/Number", "doubleValue", "()D"),
                    _ => ("java/lang/Number", "intValue", "()I"),
                };
                self.check_cast(wrapper)?;
                self.invoke_virtual(wrapper, accessor, descriptor)
            }
        }
    }

    /// Discard a value of `slots` size (1 or 2).
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn pop_slots(&mut self, slots: u16) -> Result<()> {
        match slots {
            0 => Ok(()),
            1 => self.emit(POP),
            _ => self.emit(POP2),
        }
    }

    /// Push an `int` constant with the shortest encoding.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn push_int(&mut self, value: i32) -> Result<()> {
        match value {
            -1..=5 => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let opcode = (i32::from(ICONST_0) + value) as u8;
                self.emit(opcode)
            }
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    self.encoder.emit_immediate(BIPUSH, i16::from(byte))
                } else if let Ok(short) = i16::try_from(value) {
                    self.encoder.emit_immediate(SIPUSH, short)
                } else {
                    let index = self.pool.add_integer(value)?;
                    self.encoder.emit_ldc(index, false)
                }
            }
        }
    }

    /// Push a string literal.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn push_string(&mut self, value: &str) -> Result<()> {
        let index = self.pool.add_string(value)?;
        self.encoder.emit_ldc(index, false)
    }

    /// Push `null`.
    ///
    /// # Errors
    /// Propagates encoder errors.
    pub fn push_null(&mut self) -> Result<()> {
        self.emit(ACONST_NULL)
    }

    /// Push the `java.lang.Class` for `internal_name`.
    ///
    /// Uses `ldc` of a class constant where the class version allows it, and
    /// `Class.forName` otherwise.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn push_class(&mut self, internal_name: &str) -> Result<()> {
        if self.major_version >= CLASS_LITERAL_MAJOR {
            let index = self.pool.add_class(internal_name)?;
            self.encoder.emit_ldc(index, false)
        } else {
            self.push_string(&internal_name.replace('/', "."))?;
            self.invoke_static(
                "java/lang/Class",
                "forName",
                "(Ljava/lang/String;)Ljava/lang/Class;",
            )
        }
    }

    /// Push a `String[]` containing `values`.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn push_string_array(&mut self, values: &[String]) -> Result<()> {
        self.push_int(i32::try_from(values.len()).unwrap_or(i32::MAX))?;
        self.new_array("java/lang/String")?;
        for (position, value) in values.iter().enumerate() {
            self.emit(DUP)?;
            self.push_int(i32::try_from(position).unwrap_or(i32::MAX))?;
            self.push_string(value)?;
            self.emit(AASTORE)?;
        }
        Ok(())
    }

    /// `anewarray` of `element` (internal name); pops the length.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn new_array(&mut self, element: &str) -> Result<()> {
        let index = self.pool.add_class(element)?;
        self.encoder.emit_constant(ANEWARRAY, index, 1, 1)
    }

    /// `new` of `class` (internal name).
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn new_instance(&mut self, class: &str) -> Result<()> {
        let index = self.pool.add_class(class)?;
        self.encoder.emit_constant(NEW, index, 0, 1)
    }

    /// `checkcast` to `target` (internal name or array descriptor).
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn check_cast(&mut self, target: &str) -> Result<()> {
        let index = self.pool.add_class(target)?;
        self.encoder.emit_constant(CHECKCAST, index, 1, 1)
    }

    /// `instanceof` `class`.
    ///
    /// # Errors
    /// Propagates encoder and pool errors.
    pub fn instance_of(&mut self, class: &str) -> Result<()> {
        let index = self.pool.add_class(class)?;
        self.encoder.emit_constant(INSTANCEOF, index, 1, 1)
    }

    /// `getfield owner.name:descriptor`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn get_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let size = descriptor.parse::<FieldType>()?.slot_size();
        let index = self.pool.add_field_ref(owner, name, descriptor)?;
        self.encoder.emit_constant(GETFIELD, index, 1, size)
    }

    /// `putfield owner.name:descriptor`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn put_field(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let size = descriptor.parse::<FieldType>()?.slot_size();
        let index = self.pool.add_field_ref(owner, name, descriptor)?;
        self.encoder.emit_constant(PUTFIELD, index, 1 + size, 0)
    }

    /// `invokestatic`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn invoke_static(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(INVOKESTATIC, owner, name, descriptor)
    }

    /// `invokespecial` (constructors, private and super calls).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn invoke_special(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(INVOKESPECIAL, owner, name, descriptor)
    }

    /// `invokevirtual`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid descriptor.
    pub fn invoke_virtual(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        self.invoke(INVOKEVIRTUAL, owner, name, descriptor)
    }

    fn invoke(&mut self, opcode: u8, owner: &str, name: &str, descriptor: &str) -> Result<()> {
        let parsed: MethodDescriptor = descriptor.parse()?;
        let receiver = u16::from(opcode != INVOKESTATIC);
        let index = self.pool.add_method_ref(owner, name, descriptor)?;
        self.encoder.emit_constant(
            opcode,
            index,
            parsed.argument_slots() + receiver,
            parsed.ret.slot_size(),
        )
    }

    /// Return the value on top of the stack with the opcode matching the method's return type.
    ///
    /// # Errors
    /// Returns [`crate::Error::StackUnderflow`] if the value is missing.
    pub fn return_value(&mut self) -> Result<()> {
        let opcode = return_opcode(&self.descriptor.ret);
        self.emit(opcode)
    }

    /// Resolve labels and produce the `Code` attribute.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if a branch target carries operand stack
    /// values and frames are required, and any encoder error.
    pub fn finish(self) -> Result<CodeAttribute> {
        let body = self.encoder.finalize()?;
        let mut attributes = Vec::new();

        if self.major_version >= STACK_MAP_MAJOR && !body.branch_targets.is_empty() {
            let initial = initial_locals(
                &self.owner,
                &self.descriptor,
                self.is_static,
                self.is_constructor,
                self.pool,
            )?;

            let mut frames = Vec::with_capacity(body.branch_targets.len());
            for (&offset, &depth) in &body.branch_targets {
                if depth != 0 {
                    return Err(Error::NotSupported(format!(
                        "frame with {depth} stack slots at offset {offset}"
                    )));
                }
                frames.push(Frame {
                    offset: u16::try_from(offset)
                        .map_err(|_| malformed_error!("Branch target exceeds u16"))?,
                    locals: initial.clone(),
                    stack: Vec::new(),
                });
            }

            let table = StackMapTable { initial, frames };
            attributes.push(Attribute::new(STACK_MAP_TABLE, table.to_bytes()?));
        }

        Ok(CodeAttribute {
            max_stack: body.max_stack,
            max_locals: body.max_locals,
            code: body.code,
            exception_table: Vec::new(),
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{decoder::decode_code, opcodes::IFEQ};

    fn descriptor(text: &str) -> MethodDescriptor {
        text.parse().unwrap()
    }

    #[test]
    fn test_load_args_by_category() {
        let mut pool = ConstantPool::new();
        let method = descriptor("(JILjava/lang/String;D)V");
        let mut generator =
            MethodGenerator::new(&mut pool, "a/B", MethodAccessFlags::empty(), "m", &method, 52);
        generator.load_args().unwrap();
        generator.emit(POP2).unwrap();
        generator.emit(POP).unwrap();
        generator.emit(POP).unwrap();
        generator.emit(POP2).unwrap();
        generator.return_value().unwrap();

        let code = generator.finish().unwrap();
        let mnemonics: Vec<_> = decode_code(&code.code)
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect();
        assert_eq!(
            &mnemonics[..4],
            &["lload_1", "iload_3", "aload", "dload"]
        );
        assert_eq!(code.max_locals, 7);
        assert_eq!(code.max_stack, 6);
    }

    #[test]
    fn test_arg_array_boxes_primitives() {
        let mut pool = ConstantPool::new();
        let method = descriptor("(Z)V");
        let mut generator = MethodGenerator::new(
            &mut pool,
            "a/B",
            MethodAccessFlags::STATIC,
            "m",
            &method,
            52,
        );
        generator.load_arg_array().unwrap();
        generator.emit(POP).unwrap();
        generator.return_value().unwrap();
        let code = generator.finish().unwrap();

        let instructions = decode_code(&code.code).unwrap();
        let invoke = instructions
            .iter()
            .find(|instruction| instruction.opcode == INVOKESTATIC)
            .unwrap();
        let crate::assembly::Operand::Constant(index) = invoke.operand else {
            panic!("expected constant operand");
        };
        let member = pool.member_ref(index).unwrap();
        assert_eq!(member.owner, "java/lang/Boolean");
        assert_eq!(member.descriptor, "(Z)Ljava/lang/Boolean;");
    }

    #[test]
    fn test_push_int_encodings() {
        let mut pool = ConstantPool::new();
        let method = descriptor("()V");
        let mut generator = MethodGenerator::new(
            &mut pool,
            "a/B",
            MethodAccessFlags::STATIC,
            "m",
            &method,
            52,
        );
        for value in [-1, 5, 100, -129, 70000] {
            generator.push_int(value).unwrap();
            generator.emit(POP).unwrap();
        }
        generator.return_value().unwrap();
        let code = generator.finish().unwrap();

        let mnemonics: Vec<_> = decode_code(&code.code)
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .filter(|mnemonic| *mnemonic != "pop")
            .collect();
        assert_eq!(mnemonics, vec!["iconst_m1", "iconst_5", "bipush", "sipush", "ldc", "return"]);
    }

    #[test]
    fn test_frames_emitted_for_branch_targets() {
        let mut pool = ConstantPool::new();
        let method = descriptor("(I)I");
        let mut generator =
            MethodGenerator::new(&mut pool, "a/B", MethodAccessFlags::empty(), "m", &method, 52);
        let other = generator.new_label();
        generator.load_local(&FieldType::Int, 1).unwrap();
        generator.jump(IFEQ, &other).unwrap();
        generator.push_int(1).unwrap();
        generator.return_value().unwrap();
        generator.mark(&other).unwrap();
        generator.push_int(0).unwrap();
        generator.return_value().unwrap();
        let code = generator.finish().unwrap();

        let frames = code.attribute(STACK_MAP_TABLE).unwrap();
        // one same_frame at offset 6
        assert_eq!(frames.info, vec![0x00, 0x01, 0x06]);

        let mut pool = ConstantPool::new();
        let mut old =
            MethodGenerator::new(&mut pool, "a/B", MethodAccessFlags::empty(), "m", &method, 49);
        let other = old.new_label();
        old.load_local(&FieldType::Int, 1).unwrap();
        old.jump(IFEQ, &other).unwrap();
        old.push_int(1).unwrap();
        old.return_value().unwrap();
        old.mark(&other).unwrap();
        old.push_int(0).unwrap();
        old.return_value().unwrap();
        assert!(old.finish().unwrap().attributes.is_empty());
    }

    #[test]
    fn test_unbox_reference_skips_object_cast() {
        let mut pool = ConstantPool::new();
        let method = descriptor("()Ljava/lang/Object;");
        let mut generator = MethodGenerator::new(
            &mut pool,
            "a/B",
            MethodAccessFlags::STATIC,
            "m",
            &method,
            52,
        );
        generator.push_null().unwrap();
        generator.unbox(&method.ret).unwrap();
        generator.return_value().unwrap();
        assert_eq!(generator.finish().unwrap().code, vec![0x01, 0xB0]);
    }
}
