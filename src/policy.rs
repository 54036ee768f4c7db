//! Deciding which units a loader owns and which of those it rewrites.
//!
//! [`AcquisitionPolicy`] is consulted twice per name: [`should_acquire`] before any bytes
//! are read, and [`should_instrument`] once the original unit can be inspected. Both are
//! expected to be pure, the loader calls them outside its per-name lock.
//!
//! [`PackagePolicy`] acquires everything under a set of package prefixes and instruments
//! every acquired concrete or abstract class.
//!
//! [`should_acquire`]: AcquisitionPolicy::should_acquire
//! [`should_instrument`]: AcquisitionPolicy::should_instrument

use std::sync::Arc;

use crate::classfile::ClassAccessFlags;

/// Structural view of a unit a policy may inspect.
pub trait UnitShape {
    /// Dotted, fully-qualified name
    fn unit_name(&self) -> &str;

    /// Class access flags
    fn access_flags(&self) -> ClassAccessFlags;

    /// `true` for interfaces and annotation types
    fn is_interface(&self) -> bool {
        self.access_flags().contains(ClassAccessFlags::INTERFACE)
    }

    /// `true` for annotation types
    fn is_annotation(&self) -> bool {
        self.access_flags().contains(ClassAccessFlags::ANNOTATION)
    }
}

impl<T: UnitShape + ?Sized> UnitShape for Arc<T> {
    fn unit_name(&self) -> &str {
        (**self).unit_name()
    }

    fn access_flags(&self) -> ClassAccessFlags {
        (**self).access_flags()
    }
}

/// Ownership and instrumentation decisions for a loader whose units are `H`.
pub trait AcquisitionPolicy<H>: Send + Sync {
    /// `true` if the loader defines `name` itself instead of delegating to its parent.
    fn should_acquire(&self, name: &str) -> bool;

    /// `true` if the acquired `original` is rewritten before it is defined.
    fn should_instrument(&self, original: &H) -> bool;
}

/// Packages that are never acquired.
pub const ALWAYS_DELEGATED: [&str; 5] = ["java.", "javax.", "sun.", "jdk.", "shadowloader."];

/// Prefix-based policy.
///
/// A name is acquired if it starts with one of the instrumented packages and with none of
/// the excluded prefixes ([`ALWAYS_DELEGATED`] included). Acquired units are instrumented
/// unless they are interfaces or annotations.
///
/// # Examples
///
/// ```rust
/// use shadowloader::PackagePolicy;
///
/// let policy = PackagePolicy::new()
///     .instrument_package("com.example")
///     .exclude("com.example.generated");
///
/// assert!(policy.acquires("com.example.View"));
/// assert!(!policy.acquires("com.example.generated.R"));
/// assert!(!policy.acquires("java.lang.String"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct PackagePolicy {
    packages: Vec<String>,
    excluded: Vec<String>,
}

fn under(name: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('.');
    name.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.') || rest.starts_with('$'))
}

impl PackagePolicy {
    /// Policy acquiring nothing
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every unit in `package` and its subpackages.
    #[must_use]
    pub fn instrument_package(mut self, package: &str) -> Self {
        self.packages.push(package.to_string());
        self
    }

    /// Delegate every unit under `prefix` even if its package is instrumented.
    #[must_use]
    pub fn exclude(mut self, prefix: &str) -> Self {
        self.excluded.push(prefix.to_string());
        self
    }

    /// The name decision, shared by every unit type.
    #[must_use]
    pub fn acquires(&self, name: &str) -> bool {
        if ALWAYS_DELEGATED.iter().any(|prefix| under(name, prefix))
            || self.excluded.iter().any(|prefix| under(name, prefix))
        {
            return false;
        }
        self.packages.iter().any(|package| under(name, package))
    }
}

impl<H: UnitShape> AcquisitionPolicy<H> for PackagePolicy {
    fn should_acquire(&self, name: &str) -> bool {
        self.acquires(name)
    }

    fn should_instrument(&self, original: &H) -> bool {
        !(original.is_interface() || original.is_annotation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shape(ClassAccessFlags);

    impl UnitShape for Shape {
        fn unit_name(&self) -> &str {
            "a.Shape"
        }

        fn access_flags(&self) -> ClassAccessFlags {
            self.0
        }
    }

    #[test]
    fn test_package_boundaries() {
        let policy = PackagePolicy::new().instrument_package("com.example.");

        assert!(policy.acquires("com.example.View"));
        assert!(policy.acquires("com.example.ui.Button$Listener"));
        assert!(!policy.acquires("com.examples.View"));
        assert!(!policy.acquires("org.other.View"));
    }

    #[test]
    fn test_library_packages_are_always_delegated() {
        let policy = PackagePolicy::new()
            .instrument_package("java")
            .instrument_package("shadowloader");

        assert!(!policy.acquires("java.lang.Object"));
        assert!(!policy.acquires("shadowloader.bytecode.ShadowInternals"));
    }

    #[test]
    fn test_interfaces_and_annotations_are_not_instrumented() {
        let policy = PackagePolicy::new();
        let plain = Shape(ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER);
        let interface = Shape(ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT);
        let annotation = Shape(
            ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT | ClassAccessFlags::ANNOTATION,
        );

        assert!(policy.should_instrument(&plain));
        assert!(!policy.should_instrument(&interface));
        assert!(!policy.should_instrument(&annotation));
    }
}
