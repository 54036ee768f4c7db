//! Class builder for assembling compiled units from scratch.
//!
//! [`ClassBuilder`] collects fields and method bodies and produces a [`ClassFile`] or its
//! serialized bytes. Method bodies are written against [`MethodGenerator`], so stack sizes,
//! locals and frames are computed automatically.

use crate::{
    assembly::{opcodes::RETURN, MethodGenerator},
    classfile::{
        access::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags},
        attributes::{exceptions_attribute, Attribute, SIGNATURE},
        constantpool::ConstantPool,
        member::{FieldInfo, MethodInfo, CONSTRUCTOR_NAME},
        unit::ClassFile,
    },
    Result,
};

/// Type alias for method body implementation closures
type ImplementationFn = Box<dyn FnOnce(&mut MethodGenerator<'_>) -> Result<()>>;

struct PendingMethod {
    access: MethodAccessFlags,
    name: String,
    descriptor: String,
    exceptions: Vec<String>,
    signature: Option<String>,
    implementation: Option<ImplementationFn>,
}

/// Builder for complete class files.
///
/// # Examples
///
/// ```rust
/// use shadowloader::classfile::{ClassBuilder, ClassFile, MethodAccessFlags};
/// use shadowloader::assembly::opcodes::IRETURN;
///
/// let bytes = ClassBuilder::new("demo/Counter")
///     .default_constructor()
///     .method(MethodAccessFlags::PUBLIC, "answer", "()I", |gen| {
///         gen.push_int(42)?;
///         gen.emit(IRETURN)
///     })
///     .to_bytes()?;
///
/// let class = ClassFile::parse(&bytes)?;
/// assert!(class.method("answer", "()I").is_some());
/// # Ok::<(), shadowloader::Error>(())
/// ```
pub struct ClassBuilder {
    name: String,
    super_name: String,
    access: ClassAccessFlags,
    major_version: u16,
    interfaces: Vec<String>,
    fields: Vec<FieldInfo>,
    methods: Vec<PendingMethod>,
}

impl ClassBuilder {
    /// Start a public class named `name` (internal form) extending `java/lang/Object`,
    /// targeting Java 8 (major 52).
    #[must_use]
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            super_name: "java/lang/Object".to_string(),
            access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            major_version: 52,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Set the superclass.
    #[must_use]
    pub fn super_class(mut self, super_name: &str) -> Self {
        self.super_name = super_name.to_string();
        self
    }

    /// Replace the class access flags.
    #[must_use]
    pub fn access(mut self, access: ClassAccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Set the major class-file version.
    #[must_use]
    pub fn version(mut self, major_version: u16) -> Self {
        self.major_version = major_version;
        self
    }

    /// Add an implemented interface.
    #[must_use]
    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, access: FieldAccessFlags, name: &str, descriptor: &str) -> Self {
        self.fields.push(FieldInfo::new(access, name, descriptor));
        self
    }

    /// Add a method whose body is produced by `implementation`.
    #[must_use]
    pub fn method<F>(
        mut self,
        access: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        implementation: F,
    ) -> Self
    where
        F: FnOnce(&mut MethodGenerator<'_>) -> Result<()> + 'static,
    {
        self.methods.push(PendingMethod {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: Vec::new(),
            signature: None,
            implementation: Some(Box::new(implementation)),
        });
        self
    }

    /// Add a method without a `Code` attribute (`native` or `abstract`).
    #[must_use]
    pub fn bodiless_method(mut self, access: MethodAccessFlags, name: &str, descriptor: &str) -> Self {
        self.methods.push(PendingMethod {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            exceptions: Vec::new(),
            signature: None,
            implementation: None,
        });
        self
    }

    /// Declare checked exceptions on the most recently added method.
    #[must_use]
    pub fn throws(mut self, exceptions: &[&str]) -> Self {
        if let Some(method) = self.methods.last_mut() {
            method
                .exceptions
                .extend(exceptions.iter().map(|name| (*name).to_string()));
        }
        self
    }

    /// Attach a generic `Signature` to the most recently added method.
    #[must_use]
    pub fn signature(mut self, signature: &str) -> Self {
        if let Some(method) = self.methods.last_mut() {
            method.signature = Some(signature.to_string());
        }
        self
    }

    /// Add `public <init>()V` calling the superclass no-argument constructor.
    #[must_use]
    pub fn default_constructor(self) -> Self {
        let super_name = self.super_name.clone();
        self.method(
            MethodAccessFlags::PUBLIC,
            CONSTRUCTOR_NAME,
            "()V",
            move |gen| {
                gen.load_this()?;
                gen.invoke_special(&super_name, CONSTRUCTOR_NAME, "()V")?;
                gen.emit(RETURN)
            },
        )
    }

    /// Generate every method body and assemble the class.
    ///
    /// # Errors
    /// Returns the first error raised by a method implementation, the encoder or the
    /// constant pool.
    pub fn build(self) -> Result<ClassFile> {
        let mut pool = ConstantPool::new();
        pool.add_class(&self.name)?;
        pool.add_class(&self.super_name)?;

        let mut methods = Vec::with_capacity(self.methods.len());
        for pending in self.methods {
            let mut method = MethodInfo::new(pending.access, &pending.name, &pending.descriptor);

            if let Some(implementation) = pending.implementation {
                let descriptor = method.parsed_descriptor()?;
                let mut gen = MethodGenerator::new(
                    &mut pool,
                    &self.name,
                    pending.access,
                    &pending.name,
                    &descriptor,
                    self.major_version,
                );
                implementation(&mut gen)?;
                let code = gen.finish()?;
                method.set_code(&code, &mut pool)?;
            }

            if !pending.exceptions.is_empty() {
                method
                    .attributes
                    .push(exceptions_attribute(&pending.exceptions, &mut pool)?);
            }
            if let Some(signature) = pending.signature {
                let index = pool.add_utf8(&signature)?;
                method
                    .attributes
                    .push(Attribute::new(SIGNATURE, index.to_be_bytes().to_vec()));
            }
            methods.push(method);
        }

        Ok(ClassFile {
            minor_version: 0,
            major_version: self.major_version,
            pool,
            access: self.access,
            name: self.name,
            super_name: Some(self.super_name),
            interfaces: self.interfaces,
            fields: self.fields,
            methods,
            attributes: Vec::new(),
        })
    }

    /// Build and serialize.
    ///
    /// # Errors
    /// See [`ClassBuilder::build`].
    pub fn to_bytes(self) -> Result<Vec<u8>> {
        self.build()?.to_bytes()
    }
}
