//! The bytecode interpreter.
//!
//! Executes methods of loaded units one instruction at a time. Calls into units that were
//! not loaded are served by a small set of built-in members (`Object.<init>`, primitive
//! wrapper factories and accessors, `Class.forName`, `Object.getClass`) and by the dispatch
//! hooks, which are forwarded to the [`DispatchRuntime`].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use log::{debug, trace};

use crate::{
    assembly::{decode_code, opcodes::*, Instruction, Operand},
    classfile::{
        access::FieldAccessFlags,
        attributes::CodeAttribute,
        constantpool::Constant,
        descriptor::{FieldType, MethodDescriptor, ReturnType},
        internal_name,
        member::{MethodInfo, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME},
        unit::ClassFile,
    },
    emulation::{
        config::EmulationLimits,
        heap::{Heap, HeapObject},
        value::{HeapRef, Value},
    },
    instrument::InstrumentationConfig,
    runtime::{DispatchRuntime, InitializerTiming, Invocation},
    Error, Result,
};

const OBJECT: &str = "java/lang/Object";
const NUMERIC_WRAPPERS: [&str; 6] = [
    "java/lang/Byte",
    "java/lang/Short",
    "java/lang/Integer",
    "java/lang/Long",
    "java/lang/Float",
    "java/lang/Double",
];

fn emulation_error(message: impl Into<String>) -> Error {
    Error::Emulation(message.into())
}

/// How a method invocation ended.
enum Completion {
    Return(Option<Value>),
    Throw(HeapRef),
}

/// Locals and operand stack of one activation.
struct Frame {
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl Frame {
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| emulation_error("operand stack underflow"))
    }

    fn pop_int(&mut self) -> Result<i32> {
        match self.pop()? {
            Value::Int(value) => Ok(value),
            other => Err(emulation_error(format!("expected int, found {other}"))),
        }
    }

    fn pop_long(&mut self) -> Result<i64> {
        match self.pop()? {
            Value::Long(value) => Ok(value),
            other => Err(emulation_error(format!("expected long, found {other}"))),
        }
    }

    fn pop_float(&mut self) -> Result<f32> {
        match self.pop()? {
            Value::Float(value) => Ok(value),
            other => Err(emulation_error(format!("expected float, found {other}"))),
        }
    }

    fn pop_double(&mut self) -> Result<f64> {
        match self.pop()? {
            Value::Double(value) => Ok(value),
            other => Err(emulation_error(format!("expected double, found {other}"))),
        }
    }

    fn pop_ref(&mut self) -> Result<Option<HeapRef>> {
        match self.pop()? {
            Value::Null => Ok(None),
            Value::Ref(reference) => Ok(Some(reference)),
            other => Err(emulation_error(format!("expected reference, found {other}"))),
        }
    }

    fn local(&self, index: u16) -> Result<Value> {
        self.locals
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| emulation_error(format!("local {index} out of range")))
    }

    fn store(&mut self, index: u16, value: Value) -> Result<()> {
        let index = usize::from(index);
        let needed = index + if value.is_wide() { 2 } else { 1 };
        if needed > self.locals.len() {
            return Err(emulation_error(format!("local {index} out of range")));
        }
        self.locals[index] = value;
        if value.is_wide() {
            self.locals[index + 1] = Value::Top;
        }
        Ok(())
    }
}

/// Convert a primitive to the representation of `target`.
fn convert(value: Value, target: &FieldType) -> Value {
    let (int, long, float, double) = match value {
        Value::Int(v) => (v, i64::from(v), v as f32, f64::from(v)),
        Value::Long(v) => (v as i32, v, v as f32, v as f64),
        Value::Float(v) => (v as i32, v as i64, v, f64::from(v)),
        Value::Double(v) => (v as i32, v as i64, v as f32, v),
        other => return other,
    };
    match target {
        FieldType::Long => Value::Long(long),
        FieldType::Float => Value::Float(float),
        FieldType::Double => Value::Double(double),
        FieldType::Byte => Value::Int(i32::from(int as i8)),
        FieldType::Short => Value::Int(i32::from(int as i16)),
        FieldType::Char => Value::Int(i32::from(int as u16)),
        FieldType::Boolean => Value::Int(i32::from(int != 0)),
        FieldType::Int => Value::Int(int),
        FieldType::Object(_) | FieldType::Array(_) => value,
    }
}

/// Wrapper class for a primitive value without a declared type.
fn wrapper_of(value: Value) -> Option<&'static str> {
    match value {
        Value::Int(_) => Some("java/lang/Integer"),
        Value::Long(_) => Some("java/lang/Long"),
        Value::Float(_) => Some("java/lang/Float"),
        Value::Double(_) => Some("java/lang/Double"),
        _ => None,
    }
}

fn newarray_element(code: u8) -> Result<FieldType> {
    Ok(match code {
        T_BOOLEAN => FieldType::Boolean,
        T_CHAR => FieldType::Char,
        T_FLOAT => FieldType::Float,
        T_DOUBLE => FieldType::Double,
        T_BYTE => FieldType::Byte,
        T_SHORT => FieldType::Short,
        T_INT => FieldType::Int,
        T_LONG => FieldType::Long,
        other => return Err(emulation_error(format!("invalid newarray type {other}"))),
    })
}

/// Interpreter for instrumented units, driven by a [`DispatchRuntime`].
///
/// Class names passed to the emulator may be internal (`a/b/C`) or dotted (`a.b.C`).
///
/// # Examples
///
/// ```rust,ignore
/// let mut emulator = Emulator::new(runtime, InstrumentationConfig::default());
/// let class = emulator.load(&instrumented_bytes)?;
/// let widget = emulator.instantiate(&class, "(I)V", &[Value::Int(3)])?;
/// let size = emulator.invoke_virtual(widget, "size", "()I", &[])?;
/// ```
pub struct Emulator<R: DispatchRuntime> {
    runtime: R,
    config: InstrumentationConfig,
    limits: EmulationLimits,
    classes: HashMap<String, Arc<ClassFile>>,
    heap: Heap,
    statics: HashMap<(String, String), Value>,
    initialized: HashSet<String>,
    executed: u64,
    depth: usize,
}

impl<R: DispatchRuntime> Emulator<R> {
    /// Emulator with default limits whose hooks and aliases follow `config`.
    pub fn new(runtime: R, config: InstrumentationConfig) -> Self {
        Self::with_limits(runtime, config, EmulationLimits::default())
    }

    /// Emulator with explicit limits.
    pub fn with_limits(runtime: R, config: InstrumentationConfig, limits: EmulationLimits) -> Self {
        Emulator {
            runtime,
            config,
            heap: Heap::new(limits.max_heap_objects),
            limits,
            classes: HashMap::new(),
            statics: HashMap::new(),
            initialized: HashSet::new(),
            executed: 0,
            depth: 0,
        }
    }

    /// The runtime hooks are forwarded to
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Instructions executed so far
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Make a unit available, returning its internal name.
    ///
    /// Loading does not run the static initializer; that happens on first use.
    ///
    /// # Errors
    /// Returns a parse error for invalid bytes.
    pub fn load(&mut self, bytes: &[u8]) -> Result<String> {
        let class = ClassFile::parse(bytes)?;
        let name = class.name.clone();
        debug!("emulator: loaded {name}");
        self.classes.insert(name.clone(), Arc::new(class));
        Ok(name)
    }

    /// `true` if the static initializer of `class` has been triggered
    pub fn is_initialized(&self, class: &str) -> bool {
        self.initialized.contains(&internal_name(class))
    }

    /// Allocate an instance of `class` with default field values and no constructor call.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the heap is full or initialization fails.
    pub fn allocate(&mut self, class: &str) -> Result<HeapRef> {
        let class = internal_name(class);
        self.initialize(&class)?;
        self.new_instance(&class)
    }

    /// Allocate an instance of `class` and run its constructor `descriptor` with `args`.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the constructor fails or throws.
    pub fn instantiate(&mut self, class: &str, descriptor: &str, args: &[Value]) -> Result<HeapRef> {
        let instance = self.allocate(class)?;
        let class = internal_name(class);
        let completion =
            self.call_special(&class, CONSTRUCTOR_NAME, descriptor, Some(instance), args.to_vec())?;
        self.finish(completion)?;
        Ok(instance)
    }

    /// Call static method `name` of `class`.
    ///
    /// Returns `None` for `void` methods.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] on failures and uncaught exceptions.
    pub fn invoke_static(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let class = internal_name(class);
        self.initialize(&class)?;
        let completion = self.call_special(&class, name, descriptor, None, args.to_vec())?;
        self.finish(completion)
    }

    /// Call instance method `name` on `receiver`, selected by the receiver's runtime class.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] on failures and uncaught exceptions.
    pub fn invoke_virtual(
        &mut self,
        receiver: HeapRef,
        name: &str,
        descriptor: &str,
        args: &[Value],
    ) -> Result<Option<Value>> {
        let class = self.heap.get(receiver)?.class_name();
        let completion = self.call_special(&class, name, descriptor, Some(receiver), args.to_vec())?;
        self.finish(completion)
    }

    /// Read instance field `name`.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if `object` is not a class instance.
    pub fn get_field(&self, object: HeapRef, name: &str) -> Result<Value> {
        match self.heap.get(object)? {
            HeapObject::Instance { fields, .. } => Ok(fields.get(name).copied().unwrap_or(Value::Null)),
            other => Err(emulation_error(format!("{} has no fields", other.class_name()))),
        }
    }

    /// Write instance field `name`.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if `object` is not a class instance.
    pub fn set_field(&mut self, object: HeapRef, name: &str, value: Value) -> Result<()> {
        match self.heap.get_mut(object)? {
            HeapObject::Instance { fields, .. } => {
                fields.insert(name.to_string(), value);
                Ok(())
            }
            other => Err(emulation_error(format!("{} has no fields", other.class_name()))),
        }
    }

    /// Value of static field `name` of `class`, if it was initialized or written.
    pub fn get_static(&self, class: &str, name: &str) -> Option<Value> {
        self.statics.get(&(internal_name(class), name.to_string())).copied()
    }

    /// Interned string object.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the heap is full.
    pub fn string(&mut self, value: &str) -> Result<Value> {
        Ok(Value::Ref(self.heap.intern_string(value)?))
    }

    /// The class literal of `class`.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the heap is full.
    pub fn class_literal(&mut self, class: &str) -> Result<Value> {
        Ok(Value::Ref(self.heap.class_literal(&internal_name(class))?))
    }

    /// Box a primitive into its wrapper, leaving references untouched.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the heap is full.
    pub fn boxed(&mut self, value: Value) -> Result<Value> {
        match wrapper_of(value) {
            Some(wrapper) => Ok(Value::Ref(self.heap.alloc(HeapObject::Boxed {
                wrapper: wrapper.to_string(),
                value,
            })?)),
            None => Ok(value),
        }
    }

    fn finish(&self, completion: Completion) -> Result<Option<Value>> {
        match completion {
            Completion::Return(value) => Ok(value),
            Completion::Throw(exception) => Err(emulation_error(format!(
                "uncaught {}",
                self.heap.get(exception)?.class_name()
            ))),
        }
    }

    fn new_instance(&mut self, class: &str) -> Result<HeapRef> {
        let mut fields = HashMap::new();
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            let Some(unit) = self.classes.get(&name) else {
                break;
            };
            for field in unit.fields.iter().filter(|field| !field.access.contains(FieldAccessFlags::STATIC)) {
                let field_type: FieldType = field.descriptor.parse()?;
                fields
                    .entry(field.name.clone())
                    .or_insert_with(|| Value::default_for(&field_type));
            }
            current = unit.super_name.clone();
        }
        self.heap.alloc(HeapObject::Instance {
            class: class.to_string(),
            fields,
        })
    }

    /// Run static initialization of `class` and its loaded superclasses once.
    fn initialize(&mut self, class: &str) -> Result<()> {
        let Some(unit) = self.classes.get(class).cloned() else {
            return Ok(());
        };
        if !self.initialized.insert(class.to_string()) {
            return Ok(());
        }
        if let Some(super_name) = &unit.super_name {
            self.initialize(super_name)?;
        }

        for field in unit.fields.iter().filter(|field| field.access.contains(FieldAccessFlags::STATIC)) {
            let field_type: FieldType = field.descriptor.parse()?;
            self.statics
                .insert((class.to_string(), field.name.clone()), Value::default_for(&field_type));
        }

        if let Some(clinit) = unit.method(STATIC_INITIALIZER_NAME, "()V") {
            trace!("emulator: initializing {class}");
            let completion = self.execute(&unit, clinit, None, Vec::new())?;
            if let Completion::Throw(exception) = completion {
                return Err(emulation_error(format!(
                    "{} in static initializer of {class}",
                    self.heap.get(exception)?.class_name()
                )));
            }
        }
        Ok(())
    }

    /// Find `name descriptor` starting at `class` and walking up loaded superclasses.
    fn find_method(&self, class: &str, name: &str, descriptor: &str) -> Option<(Arc<ClassFile>, MethodInfo)> {
        let mut current = Some(class.to_string());
        while let Some(class_name) = current {
            let unit = self.classes.get(&class_name)?;
            if let Some(method) = unit.method(name, descriptor) {
                return Some((unit.clone(), method.clone()));
            }
            current = unit.super_name.clone();
        }
        None
    }

    fn is_subclass(&self, class: &str, target: &str) -> bool {
        if class == target || target == OBJECT {
            return true;
        }
        let Some(unit) = self.classes.get(class) else {
            return false;
        };
        unit.interfaces.iter().any(|interface| self.is_subclass(interface, target))
            || unit
                .super_name
                .as_deref()
                .is_some_and(|super_name| self.is_subclass(super_name, target))
    }

    fn is_instance(&self, reference: HeapRef, target: &str) -> Result<bool> {
        if target == OBJECT {
            return Ok(true);
        }
        Ok(match self.heap.get(reference)? {
            HeapObject::Instance { class, .. } => self.is_subclass(class, target),
            HeapObject::Boxed { wrapper, .. } => {
                wrapper == target
                    || (target == "java/lang/Number" && NUMERIC_WRAPPERS.contains(&wrapper.as_str()))
            }
            HeapObject::Str(_) => matches!(
                target,
                "java/lang/String" | "java/lang/CharSequence" | "java/lang/Comparable"
            ),
            HeapObject::ClassLiteral(_) => target == "java/lang/Class",
            array @ HeapObject::Array { .. } => array.class_name() == target,
        })
    }

    /// Invoke without virtual selection: `class` is where the lookup starts.
    fn call_special(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        receiver: Option<HeapRef>,
        args: Vec<Value>,
    ) -> Result<Completion> {
        self.call(class, name, descriptor, receiver, args, &ReturnType::Void)
    }

    fn call(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        receiver: Option<HeapRef>,
        args: Vec<Value>,
        caller_return: &ReturnType,
    ) -> Result<Completion> {
        match self.find_method(class, name, descriptor) {
            Some((unit, method)) => self.execute(&unit, &method, receiver, args),
            None => self.builtin(class, name, descriptor, receiver, args, caller_return),
        }
    }

    fn execute(
        &mut self,
        unit: &Arc<ClassFile>,
        method: &MethodInfo,
        receiver: Option<HeapRef>,
        args: Vec<Value>,
    ) -> Result<Completion> {
        let Some(code) = method.code(&unit.pool)? else {
            return Err(emulation_error(format!(
                "{}.{}{} has no code",
                unit.name, method.name, method.descriptor
            )));
        };
        if self.limits.max_call_depth != 0 && self.depth >= self.limits.max_call_depth {
            return Err(emulation_error(format!(
                "call depth limit of {} reached",
                self.limits.max_call_depth
            )));
        }

        let descriptor = method.parsed_descriptor()?;
        let needed = usize::from(descriptor.argument_slots()) + usize::from(!method.is_static());
        let mut frame = Frame {
            locals: vec![Value::Top; usize::from(code.max_locals).max(needed)],
            stack: Vec::with_capacity(usize::from(code.max_stack)),
        };

        let mut slot = 0_u16;
        if !method.is_static() {
            let receiver = receiver.ok_or_else(|| {
                emulation_error(format!("{}.{} called without receiver", unit.name, method.name))
            })?;
            frame.store(0, Value::Ref(receiver))?;
            slot = 1;
        }
        if args.len() != descriptor.params.len() {
            return Err(emulation_error(format!(
                "{}.{}{} called with {} arguments",
                unit.name,
                method.name,
                method.descriptor,
                args.len()
            )));
        }
        for (value, param) in args.into_iter().zip(&descriptor.params) {
            frame.store(slot, value)?;
            slot += param.slot_size();
        }

        trace!("emulator: enter {}.{}{}", unit.name, method.name, method.descriptor);
        self.depth += 1;
        let result = self.run(unit, &code, &descriptor.ret, &mut frame);
        self.depth -= 1;
        result
    }

    fn pool_member(unit: &ClassFile, instruction: &Instruction) -> Result<(String, String, String)> {
        let index = match instruction.operand {
            Operand::Constant(index) | Operand::InvokeInterface { index, .. } => index,
            _ => {
                return Err(emulation_error(format!(
                    "'{}' without a member reference",
                    instruction.mnemonic
                )))
            }
        };
        let member = unit.pool.member_ref(index)?;
        Ok((
            member.owner.to_string(),
            member.name.to_string(),
            member.descriptor.to_string(),
        ))
    }

    fn pool_class(unit: &ClassFile, instruction: &Instruction) -> Result<String> {
        match instruction.operand {
            Operand::Constant(index) => Ok(unit.pool.class_name(index)?.to_string()),
            _ => Err(emulation_error(format!(
                "'{}' without a class reference",
                instruction.mnemonic
            ))),
        }
    }

    fn jump(positions: &HashMap<u32, usize>, target: u32) -> Result<usize> {
        positions
            .get(&target)
            .copied()
            .ok_or_else(|| emulation_error(format!("branch to {target} is not an instruction")))
    }

    /// Index of the handler covering `offset` for `exception`, if any.
    fn find_handler(
        &self,
        unit: &ClassFile,
        code: &CodeAttribute,
        positions: &HashMap<u32, usize>,
        offset: u32,
        exception: HeapRef,
    ) -> Result<Option<usize>> {
        for handler in &code.exception_table {
            if offset < u32::from(handler.start_pc) || offset >= u32::from(handler.end_pc) {
                continue;
            }
            let caught = handler.catch_type == 0
                || self.is_instance(exception, unit.pool.class_name(handler.catch_type)?)?;
            if caught {
                return Ok(Some(Self::jump(positions, u32::from(handler.handler_pc))?));
            }
        }
        Ok(None)
    }

    fn count_instruction(&mut self) -> Result<()> {
        self.executed += 1;
        if self.limits.max_instructions != 0 && self.executed > self.limits.max_instructions {
            return Err(emulation_error(format!(
                "instruction limit of {} reached",
                self.limits.max_instructions
            )));
        }
        Ok(())
    }

    fn static_key(&self, owner: &str, name: &str) -> (String, String) {
        let mut current = Some(owner.to_string());
        while let Some(class) = current {
            let Some(unit) = self.classes.get(&class) else {
                break;
            };
            if unit.field(name).is_some() {
                return (class, name.to_string());
            }
            current = unit.super_name.clone();
        }
        (owner.to_string(), name.to_string())
    }

    fn array_values(&mut self, reference: Option<HeapRef>) -> Result<&mut Vec<Value>> {
        let reference = reference.ok_or_else(|| emulation_error("array access on null"))?;
        match self.heap.get_mut(reference)? {
            HeapObject::Array { values, .. } => Ok(values),
            other => Err(emulation_error(format!("{} is not an array", other.class_name()))),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn run(
        &mut self,
        unit: &Arc<ClassFile>,
        code: &CodeAttribute,
        ret: &ReturnType,
        frame: &mut Frame,
    ) -> Result<Completion> {
        let instructions = decode_code(&code.code)?;
        let positions: HashMap<u32, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.offset, index))
            .collect();

        let mut pc = 0_usize;
        loop {
            let instruction = instructions
                .get(pc)
                .ok_or_else(|| emulation_error(format!("execution left the code of {}", unit.name)))?;
            self.count_instruction()?;
            let mut next = pc + 1;
            let mut thrown: Option<HeapRef> = None;

            let (opcode, local) = match expand_shorthand(instruction.opcode) {
                Some((long_form, index)) => (long_form, Some(index)),
                None => match instruction.operand {
                    Operand::Local(index) => (instruction.opcode, Some(index)),
                    _ => (instruction.opcode, None),
                },
            };

            match opcode {
                NOP => {}
                ACONST_NULL => frame.push(Value::Null),
                ICONST_M1..=ICONST_5 => frame.push(Value::Int(i32::from(opcode) - i32::from(ICONST_0))),
                LCONST_0 | LCONST_1 => frame.push(Value::Long(i64::from(opcode - LCONST_0))),
                FCONST_0..=FCONST_2 => frame.push(Value::Float(f32::from(opcode - FCONST_0))),
                DCONST_0 | DCONST_1 => frame.push(Value::Double(f64::from(opcode - DCONST_0))),
                BIPUSH => match instruction.operand {
                    Operand::Byte(value) => frame.push(Value::Int(i32::from(value))),
                    _ => return Err(emulation_error("bipush without immediate")),
                },
                SIPUSH => match instruction.operand {
                    Operand::Short(value) => frame.push(Value::Int(i32::from(value))),
                    _ => return Err(emulation_error("sipush without immediate")),
                },
                LDC | LDC_W | LDC2_W => {
                    let Operand::Constant(index) = instruction.operand else {
                        return Err(emulation_error("ldc without constant"));
                    };
                    let value = match unit.pool.get(index)? {
                        Constant::Integer(value) => Value::Int(*value),
                        Constant::Float(bits) => Value::Float(f32::from_bits(*bits)),
                        Constant::Long(value) => Value::Long(*value),
                        Constant::Double(bits) => Value::Double(f64::from_bits(*bits)),
                        Constant::String { string_index } => {
                            let text = unit.pool.utf8_lossy(*string_index)?;
                            Value::Ref(self.heap.intern_string(&text)?)
                        }
                        Constant::Class { .. } => {
                            Value::Ref(self.heap.class_literal(unit.pool.class_name(index)?)?)
                        }
                        other => {
                            return Err(emulation_error(format!("ldc of unsupported {other:?}")))
                        }
                    };
                    frame.push(value);
                }
                ILOAD | LLOAD | FLOAD | DLOAD | ALOAD => {
                    let index = local.ok_or_else(|| emulation_error("load without local"))?;
                    let value = frame.local(index)?;
                    frame.push(value);
                }
                ISTORE | LSTORE | FSTORE | DSTORE | ASTORE => {
                    let index = local.ok_or_else(|| emulation_error("store without local"))?;
                    let value = frame.pop()?;
                    frame.store(index, value)?;
                }
                IINC => {
                    let Operand::Iinc { index, delta } = instruction.operand else {
                        return Err(emulation_error("iinc without operand"));
                    };
                    let Value::Int(value) = frame.local(index)? else {
                        return Err(emulation_error(format!("iinc of non-int local {index}")));
                    };
                    frame.store(index, Value::Int(value.wrapping_add(i32::from(delta))))?;
                }
                IALOAD | LALOAD | FALOAD | DALOAD | AALOAD | BALOAD | CALOAD | SALOAD => {
                    let index = frame.pop_int()?;
                    let array = frame.pop_ref()?;
                    let values = self.array_values(array)?;
                    let value = usize::try_from(index)
                        .ok()
                        .and_then(|index| values.get(index).copied())
                        .ok_or_else(|| emulation_error(format!("array index {index} out of bounds")))?;
                    frame.push(value);
                }
                IASTORE | LASTORE | FASTORE | DASTORE | AASTORE | BASTORE | CASTORE | SASTORE => {
                    let value = frame.pop()?;
                    let index = frame.pop_int()?;
                    let array = frame.pop_ref()?;
                    let values = self.array_values(array)?;
                    let slot = usize::try_from(index)
                        .ok()
                        .and_then(|index| values.get_mut(index))
                        .ok_or_else(|| emulation_error(format!("array index {index} out of bounds")))?;
                    *slot = value;
                }
                ARRAYLENGTH => {
                    let array = frame.pop_ref()?;
                    let length = self.array_values(array)?.len();
                    frame.push(Value::Int(i32::try_from(length).unwrap_or(i32::MAX)));
                }
                NEWARRAY | ANEWARRAY => {
                    let length = frame.pop_int()?;
                    let length = usize::try_from(length)
                        .map_err(|_| emulation_error(format!("negative array size {length}")))?;
                    let (element, default) = match instruction.operand {
                        Operand::NewArray(code) => {
                            let element = newarray_element(code)?;
                            let default = Value::default_for(&element);
                            (element.to_string(), default)
                        }
                        _ => (Self::pool_class(unit, instruction)?, Value::Null),
                    };
                    let array = self.heap.alloc(HeapObject::Array {
                        element,
                        values: vec![default; length],
                    })?;
                    frame.push(Value::Ref(array));
                }
                POP => {
                    frame.pop()?;
                }
                POP2 => {
                    if !frame.pop()?.is_wide() {
                        frame.pop()?;
                    }
                }
                DUP => {
                    let value = frame.pop()?;
                    frame.push(value);
                    frame.push(value);
                }
                DUP_X1 => {
                    let first = frame.pop()?;
                    let second = frame.pop()?;
                    frame.push(first);
                    frame.push(second);
                    frame.push(first);
                }
                DUP2 => {
                    let first = frame.pop()?;
                    if first.is_wide() {
                        frame.push(first);
                        frame.push(first);
                    } else {
                        let second = frame.pop()?;
                        frame.push(second);
                        frame.push(first);
                        frame.push(second);
                        frame.push(first);
                    }
                }
                SWAP => {
                    let first = frame.pop()?;
                    let second = frame.pop()?;
                    frame.push(first);
                    frame.push(second);
                }
                IADD | ISUB | IMUL | IDIV | IREM | IAND | IOR | IXOR | ISHL | ISHR | IUSHR => {
                    let right = frame.pop_int()?;
                    let left = frame.pop_int()?;
                    if matches!(opcode, IDIV | IREM) && right == 0 {
                        return Err(emulation_error("integer division by zero"));
                    }
                    frame.push(Value::Int(match opcode {
                        IADD => left.wrapping_add(right),
                        ISUB => left.wrapping_sub(right),
                        IMUL => left.wrapping_mul(right),
                        IDIV => left.wrapping_div(right),
                        IREM => left.wrapping_rem(right),
                        IAND => left & right,
                        IOR => left | right,
                        IXOR => left ^ right,
                        ISHL => left.wrapping_shl(right as u32 & 0x1F),
                        ISHR => left.wrapping_shr(right as u32 & 0x1F),
                        _ => ((left as u32) >> (right as u32 & 0x1F)) as i32,
                    }));
                }
                LADD | LSUB | LMUL | LDIV | LREM | LAND | LOR | LXOR => {
                    let right = frame.pop_long()?;
                    let left = frame.pop_long()?;
                    if matches!(opcode, LDIV | LREM) && right == 0 {
                        return Err(emulation_error("long division by zero"));
                    }
                    frame.push(Value::Long(match opcode {
                        LADD => left.wrapping_add(right),
                        LSUB => left.wrapping_sub(right),
                        LMUL => left.wrapping_mul(right),
                        LDIV => left.wrapping_div(right),
                        LREM => left.wrapping_rem(right),
                        LAND => left & right,
                        LOR => left | right,
                        _ => left ^ right,
                    }));
                }
                LSHL | LSHR | LUSHR => {
                    let shift = frame.pop_int()? as u32 & 0x3F;
                    let value = frame.pop_long()?;
                    frame.push(Value::Long(match opcode {
                        LSHL => value.wrapping_shl(shift),
                        LSHR => value.wrapping_shr(shift),
                        _ => ((value as u64) >> shift) as i64,
                    }));
                }
                FADD | FSUB | FMUL | FDIV | FREM => {
                    let right = frame.pop_float()?;
                    let left = frame.pop_float()?;
                    frame.push(Value::Float(match opcode {
                        FADD => left + right,
                        FSUB => left - right,
                        FMUL => left * right,
                        FDIV => left / right,
                        _ => left % right,
                    }));
                }
                DADD | DSUB | DMUL | DDIV | DREM => {
                    let right = frame.pop_double()?;
                    let left = frame.pop_double()?;
                    frame.push(Value::Double(match opcode {
                        DADD => left + right,
                        DSUB => left - right,
                        DMUL => left * right,
                        DDIV => left / right,
                        _ => left % right,
                    }));
                }
                INEG => {
                    let value = frame.pop_int()?;
                    frame.push(Value::Int(value.wrapping_neg()));
                }
                LNEG => {
                    let value = frame.pop_long()?;
                    frame.push(Value::Long(value.wrapping_neg()));
                }
                FNEG => {
                    let value = frame.pop_float()?;
                    frame.push(Value::Float(-value));
                }
                DNEG => {
                    let value = frame.pop_double()?;
                    frame.push(Value::Double(-value));
                }
                I2L | I2F | I2D | L2I | L2F | L2D | F2I | F2L | F2D | D2I | D2L | D2F | I2B
                | I2C | I2S => {
                    let value = frame.pop()?;
                    let target = match opcode {
                        I2L | F2L | D2L => FieldType::Long,
                        I2F | L2F | D2F => FieldType::Float,
                        I2D | L2D | F2D => FieldType::Double,
                        I2B => FieldType::Byte,
                        I2C => FieldType::Char,
                        I2S => FieldType::Short,
                        _ => FieldType::Int,
                    };
                    frame.push(convert(value, &target));
                }
                LCMP => {
                    let right = frame.pop_long()?;
                    let left = frame.pop_long()?;
                    frame.push(Value::Int(left.cmp(&right) as i32));
                }
                FCMPL | FCMPG | DCMPL | DCMPG => {
                    let (left, right) = if matches!(opcode, FCMPL | FCMPG) {
                        let right = frame.pop_float()?;
                        (f64::from(frame.pop_float()?), f64::from(right))
                    } else {
                        let right = frame.pop_double()?;
                        (frame.pop_double()?, right)
                    };
                    let nan = if matches!(opcode, FCMPG | DCMPG) { 1 } else { -1 };
                    frame.push(Value::Int(
                        left.partial_cmp(&right).map_or(nan, |ordering| ordering as i32),
                    ));
                }
                IFEQ | IFNE | IFLT | IFGE | IFGT | IFLE | IF_ICMPEQ | IF_ICMPNE | IF_ICMPLT
                | IF_ICMPGE | IF_ICMPGT | IF_ICMPLE => {
                    let right = if opcode >= IF_ICMPEQ { frame.pop_int()? } else { 0 };
                    let left = frame.pop_int()?;
                    let taken = match opcode {
                        IFEQ | IF_ICMPEQ => left == right,
                        IFNE | IF_ICMPNE => left != right,
                        IFLT | IF_ICMPLT => left < right,
                        IFGE | IF_ICMPGE => left >= right,
                        IFGT | IF_ICMPGT => left > right,
                        _ => left <= right,
                    };
                    if let (true, Operand::Branch(target)) = (taken, &instruction.operand) {
                        next = Self::jump(&positions, *target)?;
                    }
                }
                IF_ACMPEQ | IF_ACMPNE | IFNULL | IFNONNULL => {
                    let right = if matches!(opcode, IF_ACMPEQ | IF_ACMPNE) {
                        frame.pop_ref()?
                    } else {
                        None
                    };
                    let left = frame.pop_ref()?;
                    let equal = left == right;
                    let taken = if matches!(opcode, IF_ACMPEQ | IFNULL) { equal } else { !equal };
                    if let (true, Operand::Branch(target)) = (taken, &instruction.operand) {
                        next = Self::jump(&positions, *target)?;
                    }
                }
                GOTO | GOTO_W => {
                    if let Operand::Branch(target) = instruction.operand {
                        next = Self::jump(&positions, target)?;
                    }
                }
                TABLESWITCH | LOOKUPSWITCH => {
                    let key = frame.pop_int()?;
                    let target = match &instruction.operand {
                        Operand::TableSwitch {
                            default,
                            low,
                            targets,
                            ..
                        } => usize::try_from(i64::from(key) - i64::from(*low))
                            .ok()
                            .and_then(|index| targets.get(index).copied())
                            .unwrap_or(*default),
                        Operand::LookupSwitch { default, pairs } => pairs
                            .iter()
                            .find(|(value, _)| *value == key)
                            .map_or(*default, |(_, target)| *target),
                        _ => return Err(emulation_error("switch without table")),
                    };
                    next = Self::jump(&positions, target)?;
                }
                IRETURN | LRETURN | FRETURN | DRETURN | ARETURN => {
                    let value = frame.pop()?;
                    return Ok(Completion::Return(Some(value)));
                }
                RETURN => return Ok(Completion::Return(None)),
                GETSTATIC | PUTSTATIC => {
                    let (owner, name, descriptor) = Self::pool_member(unit, instruction)?;
                    self.initialize(&owner)?;
                    let key = self.static_key(&owner, &name);
                    if opcode == GETSTATIC {
                        let field_type: FieldType = descriptor.parse()?;
                        let value = self
                            .statics
                            .get(&key)
                            .copied()
                            .unwrap_or_else(|| Value::default_for(&field_type));
                        frame.push(value);
                    } else {
                        let value = frame.pop()?;
                        self.statics.insert(key, value);
                    }
                }
                GETFIELD => {
                    let (_, name, descriptor) = Self::pool_member(unit, instruction)?;
                    let object = frame
                        .pop_ref()?
                        .ok_or_else(|| emulation_error(format!("getfield {name} on null")))?;
                    let field_type: FieldType = descriptor.parse()?;
                    let value = match self.heap.get(object)? {
                        HeapObject::Instance { fields, .. } => fields
                            .get(&name)
                            .copied()
                            .unwrap_or_else(|| Value::default_for(&field_type)),
                        other => {
                            return Err(emulation_error(format!(
                                "getfield {name} on {}",
                                other.class_name()
                            )))
                        }
                    };
                    frame.push(value);
                }
                PUTFIELD => {
                    let (_, name, _) = Self::pool_member(unit, instruction)?;
                    let value = frame.pop()?;
                    let object = frame
                        .pop_ref()?
                        .ok_or_else(|| emulation_error(format!("putfield {name} on null")))?;
                    self.set_field(object, &name, value)?;
                }
                INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE => {
                    let (owner, name, descriptor) = Self::pool_member(unit, instruction)?;
                    let parsed: MethodDescriptor = descriptor.parse()?;
                    let mut args = Vec::with_capacity(parsed.params.len());
                    for _ in &parsed.params {
                        args.push(frame.pop()?);
                    }
                    args.reverse();

                    let (start, receiver) = if opcode == INVOKESTATIC {
                        self.initialize(&owner)?;
                        (owner, None)
                    } else {
                        let receiver = frame.pop_ref()?.ok_or_else(|| {
                            emulation_error(format!("{owner}.{name} invoked on null"))
                        })?;
                        let start = if opcode == INVOKESPECIAL {
                            owner
                        } else {
                            match self.heap.get(receiver)? {
                                HeapObject::Instance { class, .. } => class.clone(),
                                _ => owner,
                            }
                        };
                        (start, Some(receiver))
                    };

                    match self.call(&start, &name, &descriptor, receiver, args, ret)? {
                        Completion::Return(Some(value)) => frame.push(value),
                        Completion::Return(None) => {}
                        Completion::Throw(exception) => thrown = Some(exception),
                    }
                }
                NEW => {
                    let class = Self::pool_class(unit, instruction)?;
                    self.initialize(&class)?;
                    let instance = self.new_instance(&class)?;
                    frame.push(Value::Ref(instance));
                }
                CHECKCAST => {
                    let target = Self::pool_class(unit, instruction)?;
                    let value = frame.pop()?;
                    if let Value::Ref(reference) = value {
                        if !self.is_instance(reference, &target)? {
                            return Err(emulation_error(format!(
                                "{} cannot be cast to {target}",
                                self.heap.get(reference)?.class_name()
                            )));
                        }
                    }
                    frame.push(value);
                }
                INSTANCEOF => {
                    let target = Self::pool_class(unit, instruction)?;
                    let result = match frame.pop_ref()? {
                        Some(reference) => self.is_instance(reference, &target)?,
                        None => false,
                    };
                    frame.push(Value::Int(i32::from(result)));
                }
                ATHROW => {
                    let exception = frame
                        .pop_ref()?
                        .ok_or_else(|| emulation_error("athrow of null"))?;
                    thrown = Some(exception);
                }
                MONITORENTER | MONITOREXIT => {
                    frame.pop_ref()?;
                }
                _ => {
                    return Err(Error::NotSupported(format!(
                        "emulation of '{}'",
                        instruction.mnemonic
                    )))
                }
            }

            if let Some(exception) = thrown {
                match self.find_handler(unit, code, &positions, instruction.offset, exception)? {
                    Some(handler) => {
                        frame.stack.clear();
                        frame.push(Value::Ref(exception));
                        next = handler;
                    }
                    None => return Ok(Completion::Throw(exception)),
                }
            }
            pc = next;
        }
    }

    /// Members of units that were not loaded.
    fn builtin(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        receiver: Option<HeapRef>,
        args: Vec<Value>,
        caller_return: &ReturnType,
    ) -> Result<Completion> {
        if owner == self.config.hooks.owner {
            return self.hook(name, args, caller_return);
        }

        let parsed: MethodDescriptor = descriptor.parse()?;
        let value = match (owner, name) {
            (_, CONSTRUCTOR_NAME) => None,
            (_, "valueOf") if args.len() == 1 && parsed.params[0].is_primitive() => {
                let ReturnType::Value(FieldType::Object(wrapper)) = &parsed.ret else {
                    return Err(emulation_error(format!("{owner}.valueOf{descriptor}")));
                };
                let value = convert(args[0], &parsed.params[0]);
                Some(Value::Ref(self.heap.alloc(HeapObject::Boxed {
                    wrapper: wrapper.clone(),
                    value,
                })?))
            }
            (_, "booleanValue" | "charValue" | "byteValue" | "shortValue" | "intValue"
            | "longValue" | "floatValue" | "doubleValue") => {
                let receiver =
                    receiver.ok_or_else(|| emulation_error(format!("{name} without receiver")))?;
                let ReturnType::Value(target) = &parsed.ret else {
                    return Err(emulation_error(format!("{owner}.{name}{descriptor}")));
                };
                let unboxed = self.heap.unboxed(Value::Ref(receiver));
                if unboxed.is_reference() {
                    return Err(emulation_error(format!(
                        "{name} on {}",
                        self.heap.get(receiver)?.class_name()
                    )));
                }
                Some(convert(unboxed, target))
            }
            ("java/lang/Class", "forName") => {
                let class_name = args
                    .first()
                    .and_then(Value::as_heap_ref)
                    .and_then(|reference| self.heap.string(reference))
                    .map(internal_name)
                    .ok_or_else(|| emulation_error("Class.forName without a name"))?;
                Some(Value::Ref(self.heap.class_literal(&class_name)?))
            }
            (_, "getClass") => {
                let receiver =
                    receiver.ok_or_else(|| emulation_error("getClass without receiver"))?;
                let class_name = self.heap.get(receiver)?.class_name();
                Some(Value::Ref(self.heap.class_literal(&class_name)?))
            }
            _ => {
                return Err(emulation_error(format!(
                    "no implementation for {owner}.{name}{descriptor}"
                )))
            }
        };
        Ok(Completion::Return(value))
    }

    fn class_argument(&self, value: Option<&Value>) -> Result<String> {
        let reference = value
            .and_then(Value::as_heap_ref)
            .ok_or_else(|| emulation_error("expected a class literal"))?;
        match self.heap.get(reference)? {
            HeapObject::ClassLiteral(name) => Ok(name.clone()),
            other => Err(emulation_error(format!(
                "expected a class literal, found {}",
                other.class_name()
            ))),
        }
    }

    fn string_argument(&self, value: Option<&Value>) -> Result<String> {
        value
            .and_then(Value::as_heap_ref)
            .and_then(|reference| self.heap.string(reference))
            .map(str::to_string)
            .ok_or_else(|| emulation_error("expected a string"))
    }

    /// Box the handler result for a dispatcher returning `ret`.
    fn box_for(&mut self, value: Value, ret: &ReturnType) -> Result<Value> {
        if value.is_reference() {
            return Ok(value);
        }
        if value == Value::Top {
            return Ok(Value::Null);
        }
        if let ReturnType::Value(declared) = ret {
            if let Some(boxing) = declared.boxing() {
                return Ok(Value::Ref(self.heap.alloc(HeapObject::Boxed {
                    wrapper: boxing.wrapper.to_string(),
                    value: convert(value, declared),
                })?));
            }
        }
        self.boxed(value)
    }

    fn hook(&mut self, name: &str, args: Vec<Value>, caller_return: &ReturnType) -> Result<Completion> {
        let hooks = &self.config.hooks;
        if name == hooks.should_call_directly {
            let receiver = args.first().and_then(Value::as_heap_ref);
            let direct = self.runtime.should_call_directly(receiver);
            return Ok(Completion::Return(Some(Value::Int(i32::from(direct)))));
        }

        if name == hooks.method_invoked {
            let owner = self.class_argument(args.first())?.replace('/', ".");
            let member = self.string_argument(args.get(1))?;
            let receiver = args.get(2).and_then(Value::as_heap_ref);

            let param_types = match args.get(3).and_then(Value::as_heap_ref) {
                Some(array) => self
                    .heap
                    .array(array)
                    .unwrap_or_default()
                    .to_vec()
                    .iter()
                    .map(|value| self.string_argument(Some(value)))
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };
            let values: Vec<Value> = match args.get(4).and_then(Value::as_heap_ref) {
                Some(array) => self
                    .heap
                    .array(array)
                    .unwrap_or_default()
                    .iter()
                    .map(|value| self.heap.unboxed(*value))
                    .collect(),
                None => Vec::new(),
            };

            let invocation = Invocation {
                owner: &owner,
                member: &member,
                receiver,
                param_types: &param_types,
                args: &values,
            };
            debug!("emulator: {owner}.{member} routed to the handler");
            let result = self.runtime.method_invoked(&invocation)?;
            let boxed = self.box_for(result, caller_return)?;
            return Ok(Completion::Return(Some(boxed)));
        }

        if name == hooks.class_initializing {
            let class = self.class_argument(args.first())?;
            let timing = self.runtime.class_initializing(&class.replace('/', "."));
            if timing == InitializerTiming::Eager {
                let alias = self.config.static_initializer_alias.clone();
                if let Some((unit, method)) = self.find_method(&class, &alias, "()V") {
                    if let Completion::Throw(exception) = self.execute(&unit, &method, None, Vec::new())? {
                        return Ok(Completion::Throw(exception));
                    }
                }
            }
            return Ok(Completion::Return(None));
        }

        Err(emulation_error(format!("unknown hook {}.{name}", hooks.owner)))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::{
        classfile::{ClassBuilder, MethodAccessFlags},
        test::factories::widget_class,
    };

    #[derive(Default)]
    struct Recorder {
        direct: bool,
        calls: RefCell<Vec<String>>,
    }

    impl DispatchRuntime for Recorder {
        fn should_call_directly(&self, _receiver: Option<HeapRef>) -> bool {
            self.direct
        }

        fn method_invoked(&self, invocation: &Invocation<'_>) -> Result<Value> {
            self.calls
                .borrow_mut()
                .push(format!("{}.{}", invocation.owner, invocation.member));
            Ok(Value::Int(40))
        }
    }

    #[test]
    fn test_plain_code_runs() {
        let mut emulator = Emulator::new(Recorder::default(), InstrumentationConfig::default());
        let class = emulator.load(&widget_class("p/Widget")).unwrap();

        let widget = emulator.instantiate(&class, "(I)V", &[Value::Int(5)]).unwrap();
        assert_eq!(emulator.get_field(widget, "count").unwrap(), Value::Int(5));
        assert_eq!(
            emulator.invoke_virtual(widget, "size", "()I", &[]).unwrap(),
            Some(Value::Int(5))
        );
        assert_eq!(
            emulator.invoke_static("p.Widget", "twice", "(I)I", &[Value::Int(21)]).unwrap(),
            Some(Value::Int(42))
        );
        assert!(emulator.is_initialized("p/Widget"));
    }

    #[test]
    fn test_limits_are_enforced() {
        let looping = ClassBuilder::new("p/Spin")
            .method(MethodAccessFlags::STATIC, "spin", "()V", |gen| {
                let top = gen.new_label();
                gen.emit(NOP)?;
                gen.mark(&top)?;
                gen.jump(GOTO, &top)
            })
            .to_bytes()
            .unwrap();

        let mut emulator = Emulator::with_limits(
            Recorder::default(),
            InstrumentationConfig::default(),
            EmulationLimits::new().with_max_instructions(50),
        );
        emulator.load(&looping).unwrap();
        let error = emulator.invoke_static("p/Spin", "spin", "()V", &[]).unwrap_err();
        assert!(error.to_string().contains("instruction limit"));
    }

    #[test]
    fn test_handler_result_is_boxed_for_the_dispatcher() {
        let mut emulator = Emulator::new(Recorder::default(), InstrumentationConfig::default());
        let boxed = emulator
            .box_for(Value::Int(1), &ReturnType::Value(FieldType::Boolean))
            .unwrap();
        let Value::Ref(reference) = boxed else {
            panic!("expected a reference");
        };
        assert_eq!(emulator.heap().get(reference).unwrap().class_name(), "java/lang/Boolean");
        assert_eq!(
            emulator.box_for(Value::Top, &ReturnType::Void).unwrap(),
            Value::Null
        );
    }
}
