//! The dispatch runtime contract.
//!
//! Instrumented code calls three static entry points at run time. [`DispatchHooks`] names
//! the class that declares them, as it is emitted into generated bytecode; the descriptors
//! are fixed. [`DispatchRuntime`] is the same contract expressed as a Rust trait, implemented
//! by collaborators that drive instrumented units through the
//! [`crate::emulation::Emulator`].
//!
//! | Entry point | Descriptor |
//! |-------------|------------|
//! | `shouldCallDirectly` | `(Ljava/lang/Object;)Z` |
//! | `methodInvoked` | `(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/Object;[Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;` |
//! | `classInitializing` | `(Ljava/lang/Class;)V` |

use crate::{
    emulation::{HeapRef, Value},
    Result,
};

/// Descriptor of `shouldCallDirectly`
pub const SHOULD_CALL_DIRECTLY_DESCRIPTOR: &str = "(Ljava/lang/Object;)Z";
/// Descriptor of `methodInvoked`
pub const METHOD_INVOKED_DESCRIPTOR: &str = "(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/Object;[Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/Object;";
/// Descriptor of `classInitializing`
pub const CLASS_INITIALIZING_DESCRIPTOR: &str = "(Ljava/lang/Class;)V";

/// Where generated code finds the dispatch entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchHooks {
    /// Internal name of the class declaring the three static methods
    pub owner: String,
    /// Name of the direct-call predicate
    pub should_call_directly: String,
    /// Name of the handler entry point
    pub method_invoked: String,
    /// Name of the static initialization notification
    pub class_initializing: String,
}

impl Default for DispatchHooks {
    fn default() -> Self {
        DispatchHooks {
            owner: "shadowloader/bytecode/ShadowInternals".to_string(),
            should_call_directly: "shouldCallDirectly".to_string(),
            method_invoked: "methodInvoked".to_string(),
            class_initializing: "classInitializing".to_string(),
        }
    }
}

impl DispatchHooks {
    /// Hooks declared by `owner` under their default method names.
    #[must_use]
    pub fn new(owner: &str) -> Self {
        DispatchHooks {
            owner: owner.to_string(),
            ..Self::default()
        }
    }
}

/// When the renamed static initializer body runs.
///
/// The transformer only guarantees that the alias exists; whoever implements
/// [`DispatchRuntime::class_initializing`] decides its timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InitializerTiming {
    /// Do not run the original initializer now
    #[default]
    Deferred,
    /// Run the original initializer immediately after the notification returns
    Eager,
}

/// Arguments of one `methodInvoked` call.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation<'a> {
    /// Dotted name of the declaring unit
    pub owner: &'a str,
    /// Original member name, or the constructor sentinel
    pub member: &'a str,
    /// Receiver, `None` for static members
    pub receiver: Option<HeapRef>,
    /// Parameter types in Java source form (`int`, `java.lang.String`, `int[]`)
    pub param_types: &'a [String],
    /// Arguments with primitive wrappers unwrapped
    pub args: &'a [Value],
}

/// Rust-side implementation of the three dispatch entry points.
pub trait DispatchRuntime {
    /// Decide whether a call on `receiver` (`None` for static members) goes straight to the
    /// original implementation.
    fn should_call_directly(&self, receiver: Option<HeapRef>) -> bool;

    /// Handle a call routed away from the original implementation.
    ///
    /// The result is converted to the member's declared return type by the generated code;
    /// it is ignored for `void` members and constructors.
    ///
    /// # Errors
    /// Any error aborts the emulated call.
    fn method_invoked(&self, invocation: &Invocation<'_>) -> Result<Value>;

    /// A unit's static initializer ran. `owner` is the dotted unit name.
    fn class_initializing(&self, owner: &str) -> InitializerTiming {
        let _ = owner;
        InitializerTiming::Deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hooks_default_names() {
        let hooks = DispatchHooks::new("a/Hooks");
        assert_eq!(hooks.owner, "a/Hooks");
        assert_eq!(hooks.method_invoked, "methodInvoked");
        assert_eq!(DispatchHooks::default().should_call_directly, "shouldCallDirectly");
    }

    #[test]
    fn test_descriptors_parse() {
        use crate::classfile::MethodDescriptor;

        let invoked: MethodDescriptor = METHOD_INVOKED_DESCRIPTOR.parse().unwrap();
        assert_eq!(invoked.params.len(), 5);
        assert!(SHOULD_CALL_DIRECTLY_DESCRIPTOR.parse::<MethodDescriptor>().is_ok());
        assert!(CLASS_INITIALIZING_DESCRIPTOR.parse::<MethodDescriptor>().is_ok());
    }
}
