//! Instrumentation configuration.
//!
//! [`InstrumentationConfig`] fixes every name the transformer emits into rewritten units:
//! the marker field, the direct-alias scheme, the constructor and static-initializer aliases,
//! the constructor sentinel passed to the handler, and the dispatch hooks. The defaults
//! produce the standard layout; tests and embedders can override individual names with the
//! `with_*` builders.
//!
//! # Example
//!
//! ```rust
//! use shadowloader::{DispatchHooks, InstrumentationConfig};
//!
//! let config = InstrumentationConfig::new()
//!     .with_hooks(DispatchHooks::new("my/test/Hooks"))
//!     .with_trace_filter("Example");
//!
//! assert_eq!(config.marker_field, "__shadow_data__");
//! assert!(config.trace.should_trace("demo.ExampleView"));
//! ```

use crate::runtime::DispatchHooks;

/// Diagnostic listing of generated units.
#[derive(Clone, Debug, Default)]
pub struct TraceConfig {
    /// Trace every instrumented unit
    pub enabled: bool,
    /// Trace units whose dotted name contains this text, even when `enabled` is off
    pub filter: Option<String>,
}

impl TraceConfig {
    /// `true` if the unit `name` (dotted) should be traced
    #[must_use]
    pub fn should_trace(&self, name: &str) -> bool {
        self.enabled
            || self
                .filter
                .as_deref()
                .is_some_and(|filter| name.contains(filter))
    }
}

/// Names and switches used by the transformer.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `marker_field` | `__shadow_data__` |
/// | `direct_prefix` | `__direct__` |
/// | `constructor_alias` | `__constructor__` |
/// | `static_initializer_alias` | `__staticInitializer__` |
/// | `constructor_sentinel` | `__constructor__` |
/// | `hooks` | [`DispatchHooks::default`] |
/// | `trace` | disabled |
#[derive(Clone, Debug)]
pub struct InstrumentationConfig {
    /// Name of the synthetic `Ljava/lang/Object;` instance field
    pub marker_field: String,

    /// Prefix of regular-method aliases.
    ///
    /// The alias is `<prefix><class>__<name>` where `<class>` is the dotted unit name with
    /// `.`, `/` and `$` replaced by `_`.
    pub direct_prefix: String,

    /// Name the original constructor bodies are moved to
    pub constructor_alias: String,

    /// Name the original static initializer is moved to
    pub static_initializer_alias: String,

    /// Member name reported to `methodInvoked` by synthesized constructors
    pub constructor_sentinel: String,

    /// Entry points called from generated code
    pub hooks: DispatchHooks,

    /// Diagnostic listing control
    pub trace: TraceConfig,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        InstrumentationConfig {
            marker_field: "__shadow_data__".to_string(),
            direct_prefix: "__direct__".to_string(),
            constructor_alias: "__constructor__".to_string(),
            static_initializer_alias: "__staticInitializer__".to_string(),
            constructor_sentinel: "__constructor__".to_string(),
            hooks: DispatchHooks::default(),
            trace: TraceConfig::default(),
        }
    }
}

impl InstrumentationConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker field name.
    #[must_use]
    pub fn with_marker_field(mut self, name: &str) -> Self {
        self.marker_field = name.to_string();
        self
    }

    /// Set the direct-alias prefix.
    #[must_use]
    pub fn with_direct_prefix(mut self, prefix: &str) -> Self {
        self.direct_prefix = prefix.to_string();
        self
    }

    /// Set the constructor sentinel.
    #[must_use]
    pub fn with_constructor_sentinel(mut self, sentinel: &str) -> Self {
        self.constructor_sentinel = sentinel.to_string();
        self
    }

    /// Set the dispatch hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: DispatchHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Trace every instrumented unit.
    #[must_use]
    pub fn with_trace(mut self, enabled: bool) -> Self {
        self.trace.enabled = enabled;
        self
    }

    /// Trace units whose name contains `filter`.
    #[must_use]
    pub fn with_trace_filter(mut self, filter: &str) -> Self {
        self.trace.filter = Some(filter.to_string());
        self
    }

    /// Direct alias of method `name` in the unit `class` (internal or dotted form).
    #[must_use]
    pub fn direct_name(&self, class: &str, name: &str) -> String {
        let mangled: String = class
            .chars()
            .map(|c| if matches!(c, '.' | '/' | '$') { '_' } else { c })
            .collect();
        format!("{}{mangled}__{name}", self.direct_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_name_mangling() {
        let config = InstrumentationConfig::default();
        assert_eq!(
            config.direct_name("a/b/Outer$Inner", "run"),
            "__direct__a_b_Outer_Inner__run"
        );
        assert_eq!(
            config.direct_name("a.b.Plain", "get"),
            "__direct__a_b_Plain__get"
        );
    }

    #[test]
    fn test_trace_selection() {
        let config = InstrumentationConfig::new();
        assert!(!config.trace.should_trace("a.Example"));

        let filtered = config.clone().with_trace_filter("Example");
        assert!(filtered.trace.should_trace("a.ExampleTest"));
        assert!(!filtered.trace.should_trace("a.Other"));

        assert!(config.with_trace(true).trace.should_trace("a.Other"));
    }
}
