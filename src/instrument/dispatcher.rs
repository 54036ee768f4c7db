//! Generation of the members that stand in for the originals.
//!
//! Every generated body goes through [`MethodGenerator`], so stack sizes, locals and
//! frames come out of the encoder.

use crate::{
    assembly::{
        opcodes::{IFEQ, IFNE, RETURN},
        MethodGenerator,
    },
    classfile::{
        access::MethodAccessFlags,
        attributes::{Attribute, EXCEPTIONS, SIGNATURE},
        constantpool::ConstantPool,
        descriptor::{MethodDescriptor, ReturnType},
        member::{MethodInfo, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME},
    },
    instrument::config::InstrumentationConfig,
    runtime::{CLASS_INITIALIZING_DESCRIPTOR, METHOD_INVOKED_DESCRIPTOR, SHOULD_CALL_DIRECTLY_DESCRIPTOR},
    Result,
};

const MARKER_DESCRIPTOR: &str = "Ljava/lang/Object;";

/// The unit a member is generated for.
pub(crate) struct UnitContext<'a> {
    /// Internal name
    pub name: &'a str,
    /// Internal name of the superclass
    pub super_name: &'a str,
    /// Class-file major version
    pub major_version: u16,
    /// Names emitted into generated code
    pub config: &'a InstrumentationConfig,
}

fn generate<F>(
    unit: &UnitContext<'_>,
    pool: &mut ConstantPool,
    access: MethodAccessFlags,
    name: &str,
    descriptor: &str,
    body: F,
) -> Result<MethodInfo>
where
    F: FnOnce(&mut MethodGenerator<'_>, &MethodDescriptor) -> Result<()>,
{
    let mut method = MethodInfo::new(access, name, descriptor);
    let parsed = method.parsed_descriptor()?;
    let mut gen = MethodGenerator::new(pool, unit.name, access, name, &parsed, unit.major_version);
    body(&mut gen, &parsed)?;
    let code = gen.finish()?;
    method.set_code(&code, pool)?;
    Ok(method)
}

/// Carry `Exceptions` and `Signature` over from `source`.
fn copy_declaration(source: &MethodInfo, target: &mut MethodInfo) {
    for name in [EXCEPTIONS, SIGNATURE] {
        if let Some(attribute) = source.attribute(name) {
            target
                .attributes
                .push(Attribute::new(name, attribute.info.clone()));
        }
    }
}

/// Push the `methodInvoked` arguments and call it, leaving its `Object` result on the stack.
fn call_handler(
    gen: &mut MethodGenerator<'_>,
    unit: &UnitContext<'_>,
    member: &str,
    descriptor: &MethodDescriptor,
) -> Result<()> {
    let hooks = &unit.config.hooks;
    gen.push_class(unit.name)?;
    gen.push_string(member)?;
    gen.load_this_or_null()?;
    gen.push_string_array(&descriptor.param_java_names())?;
    gen.load_arg_array()?;
    gen.invoke_static(&hooks.owner, &hooks.method_invoked, METHOD_INVOKED_DESCRIPTOR)
}

/// Dispatcher for a regular method whose original body now lives in `alias`.
///
/// Instance dispatchers first take the direct path when the receiver's marker field holds an
/// instance of the unit. Otherwise `shouldCallDirectly` decides between the alias and the
/// handler.
pub(crate) fn dispatcher(
    unit: &UnitContext<'_>,
    alias: &MethodInfo,
    original_name: &str,
    pool: &mut ConstantPool,
) -> Result<MethodInfo> {
    let access = alias
        .access
        .difference(MethodAccessFlags::NATIVE | MethodAccessFlags::ABSTRACT);
    let config = unit.config;
    let is_static = alias.is_static();

    let mut method = generate(unit, pool, access, original_name, &alias.descriptor, |gen, descriptor| {
        let direct = gen.new_label();
        let handler = gen.new_label();

        if !is_static {
            gen.load_this()?;
            gen.get_field(unit.name, &config.marker_field, MARKER_DESCRIPTOR)?;
            gen.instance_of(unit.name)?;
            gen.jump(IFNE, &direct)?;
        }

        gen.load_this_or_null()?;
        gen.invoke_static(
            &config.hooks.owner,
            &config.hooks.should_call_directly,
            SHOULD_CALL_DIRECTLY_DESCRIPTOR,
        )?;
        gen.jump(IFEQ, &handler)?;

        gen.mark(&direct)?;
        if is_static {
            gen.load_args()?;
            gen.invoke_static(unit.name, &alias.name, &alias.descriptor)?;
        } else {
            gen.load_this()?;
            gen.load_args()?;
            gen.invoke_special(unit.name, &alias.name, &alias.descriptor)?;
        }
        gen.return_value()?;

        gen.mark(&handler)?;
        call_handler(gen, unit, original_name, descriptor)?;
        gen.unbox(&descriptor.ret)?;
        gen.return_value()
    })?;

    copy_declaration(alias, &mut method);
    Ok(method)
}

/// Constructor replacing the one moved to `alias`.
///
/// Calls the superclass no-argument constructor, then reports the construction to the
/// handler under the constructor sentinel. There is no direct path.
pub(crate) fn constructor(
    unit: &UnitContext<'_>,
    alias: &MethodInfo,
    pool: &mut ConstantPool,
) -> Result<MethodInfo> {
    let super_name = unit.super_name;
    let sentinel = unit.config.constructor_sentinel.as_str();

    let mut method = generate(unit, pool, alias.access, CONSTRUCTOR_NAME, &alias.descriptor, |gen, descriptor| {
        gen.load_this()?;
        gen.invoke_special(super_name, CONSTRUCTOR_NAME, "()V")?;
        call_handler(gen, unit, sentinel, descriptor)?;
        gen.unbox(&ReturnType::Void)?;
        gen.emit(RETURN)
    })?;

    copy_declaration(alias, &mut method);
    Ok(method)
}

/// `<clinit>` that only notifies `classInitializing`.
pub(crate) fn static_initializer_notifier(
    unit: &UnitContext<'_>,
    pool: &mut ConstantPool,
) -> Result<MethodInfo> {
    let hooks = &unit.config.hooks;
    generate(unit, pool, MethodAccessFlags::STATIC, STATIC_INITIALIZER_NAME, "()V", |gen, _| {
        gen.push_class(unit.name)?;
        gen.invoke_static(&hooks.owner, &hooks.class_initializing, CLASS_INITIALIZING_DESCRIPTOR)?;
        gen.emit(RETURN)
    })
}

/// `public <init>()V` calling the superclass no-argument constructor.
pub(crate) fn default_constructor(
    unit: &UnitContext<'_>,
    pool: &mut ConstantPool,
) -> Result<MethodInfo> {
    let super_name = unit.super_name;
    generate(unit, pool, MethodAccessFlags::PUBLIC, CONSTRUCTOR_NAME, "()V", |gen, _| {
        gen.load_this()?;
        gen.invoke_special(super_name, CONSTRUCTOR_NAME, "()V")?;
        gen.emit(RETURN)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::decode_code,
        classfile::{attributes::STACK_MAP_TABLE, stackmap::StackMapTable},
    };

    fn mnemonics(method: &MethodInfo, pool: &ConstantPool) -> Vec<&'static str> {
        let code = method.code(pool).unwrap().unwrap();
        decode_code(&code.code)
            .unwrap()
            .iter()
            .map(|instruction| instruction.mnemonic)
            .collect()
    }

    #[test]
    fn test_instance_dispatcher_layout() {
        let config = InstrumentationConfig::default();
        let unit = UnitContext {
            name: "p/Widget",
            super_name: "java/lang/Object",
            major_version: 52,
            config: &config,
        };
        let mut pool = ConstantPool::new();
        let alias = MethodInfo::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE,
            "__direct__p_Widget__size",
            "(J)I",
        );

        let method = dispatcher(&unit, &alias, "size", &mut pool).unwrap();
        assert_eq!(method.name, "size");
        assert_eq!(method.access, MethodAccessFlags::PUBLIC);

        let listing = mnemonics(&method, &pool);
        assert_eq!(
            &listing[..5],
            &["aload_0", "getfield", "instanceof", "ifne", "aload_0"]
        );
        assert!(listing.contains(&"invokespecial"));
        assert!(listing.contains(&"lload_1"));
        assert_eq!(listing.last(), Some(&"ireturn"));

        let code = method.code(&pool).unwrap().unwrap();
        let frames = code.attribute(STACK_MAP_TABLE).unwrap();
        let table = StackMapTable::parse(&frames.info, Vec::new()).unwrap();
        assert_eq!(table.frames.len(), 2);
    }

    #[test]
    fn test_static_dispatcher_skips_marker_check() {
        let config = InstrumentationConfig::default();
        let unit = UnitContext {
            name: "p/Util",
            super_name: "java/lang/Object",
            major_version: 49,
            config: &config,
        };
        let mut pool = ConstantPool::new();
        let alias = MethodInfo::new(
            MethodAccessFlags::STATIC,
            "__direct__p_Util__join",
            "(Ljava/lang/String;)V",
        );

        let method = dispatcher(&unit, &alias, "join", &mut pool).unwrap();
        let listing = mnemonics(&method, &pool);
        assert_eq!(listing[..3], ["aconst_null", "invokestatic", "ifeq"]);
        assert!(!listing.contains(&"getfield"));

        let code = method.code(&pool).unwrap().unwrap();
        assert!(code.attribute(STACK_MAP_TABLE).is_none());
    }

    #[test]
    fn test_notifier_and_default_constructor() {
        let config = InstrumentationConfig::default();
        let unit = UnitContext {
            name: "p/Quiet",
            super_name: "p/Base",
            major_version: 52,
            config: &config,
        };
        let mut pool = ConstantPool::new();

        let notifier = static_initializer_notifier(&unit, &mut pool).unwrap();
        assert_eq!(notifier.access, MethodAccessFlags::STATIC);
        assert_eq!(mnemonics(&notifier, &pool), vec!["ldc", "invokestatic", "return"]);

        let constructor = default_constructor(&unit, &mut pool).unwrap();
        assert_eq!(
            mnemonics(&constructor, &pool),
            vec!["aload_0", "invokespecial", "return"]
        );
    }
}
