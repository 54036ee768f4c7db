//! Load-time rewriting of compiled units.
//!
//! [`Transformer`] applies the member rewrite to one unit at a time:
//!
//! - every regular method moves to its direct alias and a dispatcher takes its place
//! - every constructor moves to the constructor alias, minus the superclass constructor
//!   call, and a synthesized constructor reports construction to the handler
//! - the static initializer moves to its alias and a notifier takes its place
//! - the marker field is appended, and a default constructor when there was none
//!
//! The rewrite works on a snapshot of the original method list, so synthesized members are
//! never visited again. A member the rewrite can not handle fails the whole unit with
//! [`crate::Error::TransformFailure`].
//!
//! # Example
//!
//! ```rust,no_run
//! use shadowloader::{InstrumentationConfig, Transformer};
//!
//! let transformer = Transformer::new(InstrumentationConfig::default());
//! let original = std::fs::read("Widget.class")?;
//! let instrumented = transformer.transform(&original)?;
//! # Ok::<(), shadowloader::Error>(())
//! ```

mod config;
mod constructor;
mod dispatcher;

pub use config::{InstrumentationConfig, TraceConfig};

use log::debug;

use crate::{
    classfile::{
        access::FieldAccessFlags,
        member::{FieldInfo, MethodInfo},
        unit::ClassFile,
    },
    disassembler::disassemble,
    Result,
};

use dispatcher::UnitContext;

/// Rewrites units for dispatch through the hooks named in its configuration.
#[derive(Clone, Debug, Default)]
pub struct Transformer {
    config: InstrumentationConfig,
}

impl Transformer {
    /// Create a transformer emitting the names in `config`.
    #[must_use]
    pub fn new(config: InstrumentationConfig) -> Self {
        Transformer { config }
    }

    /// The configuration in use
    #[must_use]
    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// Parse, rewrite and serialize one unit.
    ///
    /// # Errors
    /// Returns parse errors for invalid input and [`crate::Error::TransformFailure`] for
    /// units or members the rewrite can not handle.
    pub fn transform(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let class = self.transform_class(ClassFile::parse(bytes)?)?;
        self.trace(&class)?;
        class.to_bytes()
    }

    /// Rewrite a parsed unit.
    ///
    /// # Errors
    /// Returns [`crate::Error::TransformFailure`] for interfaces, units that already carry
    /// the marker field, units without a superclass, and constructors without a recognizable
    /// superclass constructor call.
    pub fn transform_class(&self, mut class: ClassFile) -> Result<ClassFile> {
        let unit_name = class.java_name();
        if class.is_interface() {
            return Err(transform_error!(unit_name, "interfaces are not instrumented"));
        }
        if class.field(&self.config.marker_field).is_some() {
            return Err(transform_error!(
                unit_name,
                "already carries the marker field '{}'",
                self.config.marker_field
            ));
        }
        let Some(super_name) = class.super_name.clone() else {
            return Err(transform_error!(unit_name, "unit has no superclass"));
        };

        let name = class.name.clone();
        let unit = UnitContext {
            name: &name,
            super_name: &super_name,
            major_version: class.major_version,
            config: &self.config,
        };
        let pool = &mut class.pool;

        let originals = std::mem::take(&mut class.methods);
        let mut aliases: Vec<MethodInfo> = Vec::with_capacity(originals.len());
        let mut generated: Vec<MethodInfo> = Vec::with_capacity(originals.len() + 1);
        let mut has_default_constructor = false;

        for method in originals {
            if method.is_constructor() {
                has_default_constructor |= method.descriptor == "()V";
                let alias = constructor::constructor_alias(
                    &unit_name,
                    &name,
                    &method,
                    &self.config.constructor_alias,
                    pool,
                )?;
                generated.push(dispatcher::constructor(&unit, &alias, pool)?);
                aliases.push(alias);
            } else if method.is_static_initializer() {
                let mut alias = method;
                alias.name.clone_from(&self.config.static_initializer_alias);
                generated.push(dispatcher::static_initializer_notifier(&unit, pool)?);
                aliases.push(alias);
            } else {
                let original_name = method.name.clone();
                let mut alias = method;
                alias.name = self.config.direct_name(&unit_name, &original_name);
                generated.push(dispatcher::dispatcher(&unit, &alias, &original_name, pool)?);
                aliases.push(alias);
            }
        }

        if !has_default_constructor {
            generated.push(dispatcher::default_constructor(&unit, pool)?);
        }

        debug!(
            "{unit_name}: {} members aliased, {} generated",
            aliases.len(),
            generated.len()
        );

        aliases.append(&mut generated);
        class.methods = aliases;
        class.fields.push(FieldInfo::new(
            FieldAccessFlags::PUBLIC,
            &self.config.marker_field,
            "Ljava/lang/Object;",
        ));
        Ok(class)
    }

    /// Listing of `class` when tracing is enabled for it.
    ///
    /// The listing is also logged at `debug` level.
    ///
    /// # Errors
    /// Returns an error if a method body can not be decoded.
    pub fn trace(&self, class: &ClassFile) -> Result<Option<String>> {
        let unit_name = class.java_name();
        if !self.config.trace.should_trace(&unit_name) {
            return Ok(None);
        }
        let listing = disassemble(class)?;
        debug!("{unit_name}:\n{listing}");
        Ok(Some(listing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::{
            ClassAccessFlags, ClassBuilder, MethodAccessFlags, CONSTRUCTOR_NAME,
            STATIC_INITIALIZER_NAME,
        },
        test::factories::{
            constructor_with_new_argument, delegating_constructor, inner_class, simple_class,
            widget_class,
        },
        Error,
    };

    #[test]
    fn test_surface_of_instrumented_unit() {
        let transformer = Transformer::default();
        let bytes = transformer.transform(&widget_class("p/Widget")).unwrap();
        let class = ClassFile::parse(&bytes).unwrap();

        let marker = class.field("__shadow_data__").unwrap();
        assert_eq!(marker.access, FieldAccessFlags::PUBLIC);
        assert_eq!(marker.descriptor, "Ljava/lang/Object;");

        for (name, descriptor) in [
            ("__direct__p_Widget__size", "()I"),
            ("size", "()I"),
            ("__constructor__", "(I)V"),
            (CONSTRUCTOR_NAME, "(I)V"),
            ("__staticInitializer__", "()V"),
            (STATIC_INITIALIZER_NAME, "()V"),
            (CONSTRUCTOR_NAME, "()V"),
        ] {
            assert!(
                class.method(name, descriptor).is_some(),
                "missing {name}{descriptor}"
            );
        }
        assert_eq!(
            class.method(STATIC_INITIALIZER_NAME, "()V").unwrap().access,
            MethodAccessFlags::STATIC
        );
    }

    #[test]
    fn test_existing_default_constructor_is_not_duplicated() {
        let class = Transformer::default()
            .transform_class(ClassFile::parse(&simple_class("p/Plain")).unwrap())
            .unwrap();

        let constructors = class
            .methods
            .iter()
            .filter(|method| method.is_constructor())
            .count();
        assert_eq!(constructors, 1);
        assert!(class.method("__constructor__", "()V").is_some());
    }

    #[test]
    fn test_compiler_constructor_shapes_are_aliased() {
        let transformer = Transformer::default();
        for (bytes, descriptors) in [
            (inner_class("p/Outer"), vec!["(Lp/Outer;)V"]),
            (constructor_with_new_argument("p/Holder"), vec!["()V"]),
            (delegating_constructor("p/Delegating"), vec!["()V", "(I)V"]),
        ] {
            let class = transformer
                .transform_class(ClassFile::parse(&bytes).unwrap())
                .unwrap();
            for descriptor in descriptors {
                assert!(class.method(CONSTRUCTOR_NAME, descriptor).is_some());
                assert!(
                    class.method("__constructor__", descriptor).is_some(),
                    "{}: no alias for {descriptor}",
                    class.name
                );
            }
        }
    }

    #[test]
    fn test_rejected_units() {
        let transformer = Transformer::default();

        let interface = ClassBuilder::new("p/Shape")
            .access(ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT)
            .build()
            .unwrap();
        assert!(matches!(
            transformer.transform_class(interface),
            Err(Error::TransformFailure { .. })
        ));

        let twice = transformer
            .transform_class(ClassFile::parse(&simple_class("p/Twice")).unwrap())
            .unwrap();
        let error = transformer.transform_class(twice).unwrap_err();
        assert!(error.to_string().contains("p.Twice"));
    }

    #[test]
    fn test_trace_follows_filter() {
        let class = ClassFile::parse(&simple_class("p/ExampleView")).unwrap();
        assert!(Transformer::default().trace(&class).unwrap().is_none());

        let traced = Transformer::new(InstrumentationConfig::new().with_trace_filter("Example"));
        let listing = traced.trace(&class).unwrap().unwrap();
        assert!(listing.contains("class p/ExampleView"));
    }
}
