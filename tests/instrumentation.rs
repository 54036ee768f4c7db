//! End-to-end tests of instrumented units.
//!
//! Units are built with the class-file builder, rewritten by the transformer and executed by
//! the emulator against a recording dispatch runtime.

use std::sync::Mutex;

use shadowloader::{
    assembly::opcodes::{ARETURN, BIPUSH, IADD, ILOAD, IRETURN, PUTSTATIC, RETURN},
    classfile::{
        ClassAccessFlags, ClassBuilder, Constant, FieldAccessFlags, MethodAccessFlags,
        CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME,
    },
    prelude::*,
};

/// One `methodInvoked` call, copied out of the borrowed invocation.
#[derive(Debug, Clone, PartialEq)]
struct Recorded {
    owner: String,
    member: String,
    receiver: Option<HeapRef>,
    param_types: Vec<String>,
    args: Vec<Value>,
}

/// Answers every handler call with `answer` and records what it saw.
struct Recorder {
    direct: bool,
    answer: Value,
    timing: InitializerTiming,
    calls: Mutex<Vec<Recorded>>,
    initialized: Mutex<Vec<String>>,
}

impl Recorder {
    fn new(answer: Value) -> Self {
        Recorder {
            direct: false,
            answer,
            timing: InitializerTiming::Deferred,
            calls: Mutex::new(Vec::new()),
            initialized: Mutex::new(Vec::new()),
        }
    }

    fn direct(mut self) -> Self {
        self.direct = true;
        self
    }

    fn eager(mut self) -> Self {
        self.timing = InitializerTiming::Eager;
        self
    }

    fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }
}

impl DispatchRuntime for Recorder {
    fn should_call_directly(&self, _receiver: Option<HeapRef>) -> bool {
        self.direct
    }

    fn method_invoked(&self, invocation: &Invocation<'_>) -> Result<Value> {
        self.calls.lock().unwrap().push(Recorded {
            owner: invocation.owner.to_string(),
            member: invocation.member.to_string(),
            receiver: invocation.receiver,
            param_types: invocation.param_types.to_vec(),
            args: invocation.args.to_vec(),
        });
        Ok(self.answer)
    }

    fn class_initializing(&self, owner: &str) -> InitializerTiming {
        self.initialized.lock().unwrap().push(owner.to_string());
        self.timing
    }
}

/// `public class p.Counter` with `int getValue()`, `static int add(int, int)`, a `(I)V`
/// constructor storing into `value`, and a `<clinit>` setting `static int seed = 7`.
fn counter() -> Result<Vec<u8>> {
    ClassBuilder::new("p/Counter")
        .field(FieldAccessFlags::PRIVATE, "value", "I")
        .field(FieldAccessFlags::STATIC, "seed", "I")
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "(I)V", |gen| {
            gen.load_this()?;
            gen.invoke_special("java/lang/Object", CONSTRUCTOR_NAME, "()V")?;
            gen.load_this()?;
            gen.encoder().emit_local(ILOAD, 1)?;
            gen.put_field("p/Counter", "value", "I")?;
            gen.emit(RETURN)
        })
        .method(MethodAccessFlags::PUBLIC, "getValue", "()I", |gen| {
            gen.load_this()?;
            gen.get_field("p/Counter", "value", "I")?;
            gen.emit(IRETURN)
        })
        .method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "add",
            "(II)I",
            |gen| {
                gen.encoder().emit_local(ILOAD, 0)?;
                gen.encoder().emit_local(ILOAD, 1)?;
                gen.emit(IADD)?;
                gen.emit(IRETURN)
            },
        )
        .method(MethodAccessFlags::STATIC, STATIC_INITIALIZER_NAME, "()V", |gen| {
            gen.encoder().emit_immediate(BIPUSH, 7)?;
            let seed = gen.pool().add_field_ref("p/Counter", "seed", "I")?;
            gen.encoder().emit_constant(PUTSTATIC, seed, 1, 0)?;
            gen.emit(RETURN)
        })
        .to_bytes()
}

fn instrumented(bytes: &[u8]) -> Result<Vec<u8>> {
    Transformer::default().transform(bytes)
}

#[test]
fn test_handler_receives_no_argument_call() -> Result<()> {
    let mut emulator = Emulator::new(Recorder::new(Value::Int(99)), InstrumentationConfig::default());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    let counter = emulator.allocate(&class)?;
    let result = emulator.invoke_virtual(counter, "getValue", "()I", &[])?;

    assert_eq!(result, Some(Value::Int(99)));
    let calls = emulator.runtime().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].owner, "p.Counter");
    assert_eq!(calls[0].member, "getValue");
    assert_eq!(calls[0].receiver, Some(counter));
    assert!(calls[0].param_types.is_empty());
    assert!(calls[0].args.is_empty());
    Ok(())
}

#[test]
fn test_handler_receives_static_arguments() -> Result<()> {
    let mut emulator = Emulator::new(Recorder::new(Value::Int(5)), InstrumentationConfig::default());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    let result = emulator.invoke_static(&class, "add", "(II)I", &[Value::Int(2), Value::Int(3)])?;

    assert_eq!(result, Some(Value::Int(5)));
    let calls = emulator.runtime().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].member, "add");
    assert_eq!(calls[0].receiver, None);
    assert_eq!(calls[0].param_types, vec!["int".to_string(), "int".to_string()]);
    assert_eq!(calls[0].args, vec![Value::Int(2), Value::Int(3)]);
    Ok(())
}

#[test]
fn test_should_call_directly_runs_original_body() -> Result<()> {
    let runtime = Recorder::new(Value::Int(0)).direct();
    let mut emulator = Emulator::new(runtime, InstrumentationConfig::default());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    let result = emulator.invoke_static(&class, "add", "(II)I", &[Value::Int(20), Value::Int(22)])?;

    assert_eq!(result, Some(Value::Int(42)));
    assert!(emulator.runtime().calls().is_empty());
    Ok(())
}

#[test]
fn test_marker_field_takes_direct_path() -> Result<()> {
    let config = InstrumentationConfig::default();
    let mut emulator = Emulator::new(Recorder::new(Value::Int(-1)), config.clone());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    let counter = emulator.allocate(&class)?;
    emulator.invoke_virtual(counter, &config.constructor_alias, "(I)V", &[Value::Int(12)])?;
    emulator.set_field(counter, &config.marker_field, Value::Ref(counter))?;

    let result = emulator.invoke_virtual(counter, "getValue", "()I", &[])?;
    assert_eq!(result, Some(Value::Int(12)));
    assert!(emulator.runtime().calls().is_empty());
    Ok(())
}

#[test]
fn test_constructor_reports_sentinel() -> Result<()> {
    let config = InstrumentationConfig::default();
    let mut emulator = Emulator::new(Recorder::new(Value::Null), config.clone());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    let counter = emulator.instantiate(&class, "(I)V", &[Value::Int(3)])?;

    let calls = emulator.runtime().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].member, config.constructor_sentinel);
    assert_eq!(calls[0].param_types, vec!["int".to_string()]);
    assert_eq!(calls[0].args, vec![Value::Int(3)]);
    // the original body did not run
    assert_eq!(emulator.get_field(counter, "value")?, Value::Int(0));
    Ok(())
}

#[test]
fn test_compiler_default_constructor_reports_sentinel() -> Result<()> {
    let bytes = ClassBuilder::new("p/Plain").default_constructor().to_bytes()?;
    let config = InstrumentationConfig::default();
    let mut emulator = Emulator::new(Recorder::new(Value::Null), config.clone());
    let class = emulator.load(&instrumented(&bytes)?)?;

    emulator.instantiate(&class, "()V", &[])?;

    let calls = emulator.runtime().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].owner, "p.Plain");
    assert_eq!(calls[0].member, config.constructor_sentinel);
    Ok(())
}

#[test]
fn test_static_initializer_is_deferred() -> Result<()> {
    let mut emulator = Emulator::new(Recorder::new(Value::Null), InstrumentationConfig::default());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    emulator.allocate(&class)?;

    assert_eq!(*emulator.runtime().initialized.lock().unwrap(), vec!["p.Counter"]);
    assert_eq!(emulator.get_static(&class, "seed"), Some(Value::Int(0)));
    Ok(())
}

#[test]
fn test_static_initializer_runs_eagerly() -> Result<()> {
    let runtime = Recorder::new(Value::Null).eager();
    let mut emulator = Emulator::new(runtime, InstrumentationConfig::default());
    let class = emulator.load(&instrumented(&counter()?)?)?;

    emulator.allocate(&class)?;

    assert_eq!(*emulator.runtime().initialized.lock().unwrap(), vec!["p.Counter"]);
    assert_eq!(emulator.get_static(&class, "seed"), Some(Value::Int(7)));
    Ok(())
}

#[test]
fn test_instrumented_surface() -> Result<()> {
    let config = InstrumentationConfig::default();
    let class = Transformer::new(config.clone()).transform_class(ClassFile::parse(&counter()?)?)?;

    let marker = class.field(&config.marker_field).expect("marker field");
    assert!(marker.access.contains(FieldAccessFlags::PUBLIC));
    assert_eq!(marker.descriptor, "Ljava/lang/Object;");

    for (name, descriptor) in [("getValue", "()I"), ("add", "(II)I")] {
        assert!(class.method(name, descriptor).is_some());
        let alias = config.direct_name("p/Counter", name);
        assert!(class.method(&alias, descriptor).is_some(), "missing {alias}");
    }
    assert!(class.method(CONSTRUCTOR_NAME, "(I)V").is_some());
    assert!(class.method(&config.constructor_alias, "(I)V").is_some());
    assert!(class.method(STATIC_INITIALIZER_NAME, "()V").is_some());
    assert!(class.method(&config.static_initializer_alias, "()V").is_some());

    // no `()V` constructor before, so one is added
    let default = class.method(CONSTRUCTOR_NAME, "()V").expect("default constructor");
    assert!(default.access.contains(MethodAccessFlags::PUBLIC));
    assert_eq!(class.methods.len(), 9);
    Ok(())
}

#[test]
fn test_units_that_can_not_be_instrumented() -> Result<()> {
    let transformer = Transformer::default();

    let interface = ClassBuilder::new("p/Shape")
        .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT)
        .to_bytes()?;
    assert!(matches!(
        transformer.transform(&interface),
        Err(Error::TransformFailure { .. })
    ));

    let instrumented = transformer.transform(&counter()?)?;
    assert!(matches!(
        transformer.transform(&instrumented),
        Err(Error::TransformFailure { .. })
    ));

    let no_super_call = ClassBuilder::new("p/Broken")
        .method(MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V", |gen| gen.emit(RETURN))
        .to_bytes()?;
    match transformer.transform(&no_super_call) {
        Err(Error::TransformFailure { unit, .. }) => assert_eq!(unit, "p.Broken"),
        other => panic!("expected a transform failure, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_string_constant_with_lone_surrogate_keeps_its_bytes() -> Result<()> {
    // "\uD800" as a Java string literal
    const LONE_SURROGATE: [u8; 3] = [0xED, 0xA0, 0x80];
    const REPLACEMENT: [u8; 3] = [0xEF, 0xBF, 0xBD];

    let bytes = ClassBuilder::new("p/Surrogate")
        .default_constructor()
        .method(MethodAccessFlags::PUBLIC, "code", "()Ljava/lang/String;", |gen| {
            let index = gen.pool().add_modified_string(&LONE_SURROGATE)?;
            gen.encoder().emit_ldc(index, false)?;
            gen.emit(ARETURN)
        })
        .to_bytes()?;
    assert_eq!(ClassFile::parse(&bytes)?.to_bytes()?, bytes);

    let config = InstrumentationConfig::default();
    let instrumented = Transformer::new(config.clone()).transform(&bytes)?;
    let class = ClassFile::parse(&instrumented)?;
    assert!(class
        .method(&config.direct_name("p/Surrogate", "code"), "()Ljava/lang/String;")
        .is_some());

    let strings: Vec<Vec<u8>> = (1..class.pool.len())
        .filter_map(|index| u16::try_from(index).ok())
        .filter_map(|index| match class.pool.get(index) {
            Ok(Constant::String { string_index }) => Some(*string_index),
            _ => None,
        })
        .map(|index| class.pool.utf8_bytes(index).map(|bytes| bytes.into_owned()))
        .collect::<Result<_>>()?;
    assert!(strings.contains(&LONE_SURROGATE.to_vec()));
    assert!(!strings.contains(&REPLACEMENT.to_vec()));

    // the serialized entry is the original tag, length and payload
    let entry = [0x01, 0x00, 0x03, 0xED, 0xA0, 0x80];
    assert!(instrumented.windows(entry.len()).any(|window| window == entry));
    Ok(())
}
