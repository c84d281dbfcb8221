//! Structural views of code units.
//!
//! A [`StructuralView`] is the cheap-to-query shape of one unit: its name, the context it
//! belongs to, its superclass and interfaces, and the behaviors (methods and constructors)
//! it declares. Views are built once, either reflectively from a resolved
//! [`crate::unit::TypeHandle`] or by parsing a [`crate::unit::Binary`], and then shared
//! behind an [`Arc`] across any number of match evaluations.

use std::{fmt, sync::Arc};

use bitflags::bitflags;

use crate::unit::{normalize_name, LoadingContext};

/// A reference-counted, immutable structural view.
pub type StructuralViewRc = Arc<StructuralView>;

/// Name of instance initializers.
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of class initializers.
pub const CLASS_INITIALIZER_NAME: &str = "<clinit>";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access and property flags of units and behaviors
    pub struct AccessFlags: u16 {
        /// Accessible from everywhere
        const PUBLIC = 0x0001;
        /// Accessible only from the declaring unit
        const PRIVATE = 0x0002;
        /// Accessible from subtypes and the same package
        const PROTECTED = 0x0004;
        /// Belongs to the unit rather than to instances
        const STATIC = 0x0008;
        /// Cannot be overridden or subclassed
        const FINAL = 0x0010;
        /// Invocation is wrapped in a monitor
        const SYNCHRONIZED = 0x0020;
        /// Bridge method generated by the compiler
        const BRIDGE = 0x0040;
        /// Accepts a variable number of arguments
        const VARARGS = 0x0080;
        /// Implemented outside the managed runtime
        const NATIVE = 0x0100;
        /// Unit is an interface
        const INTERFACE = 0x0200;
        /// No implementation is provided
        const ABSTRACT = 0x0400;
        /// Generated by the compiler, not present in source
        const SYNTHETIC = 0x1000;
        /// Unit is an annotation type
        const ANNOTATION = 0x2000;
        /// Unit is an enumeration
        const ENUM = 0x4000;
    }
}

/// How a view was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewOrigin {
    /// Introspection of a resolved type handle
    Reflective,
    /// Parse of a binary representation
    Parsed,
}

/// A behavior (method or constructor) declared by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Behavior {
    name: String,
    parameter_types: Vec<String>,
    return_type: String,
    access: AccessFlags,
}

impl Behavior {
    /// Creates a behavior named `name` returning `return_type`.
    pub fn new(name: impl Into<String>, return_type: impl Into<String>) -> Self {
        Behavior {
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: return_type.into(),
            access: AccessFlags::PUBLIC,
        }
    }

    /// Appends a parameter of type `type_name`.
    #[must_use]
    pub fn with_parameter(mut self, type_name: impl Into<String>) -> Self {
        self.parameter_types.push(type_name.into());
        self
    }

    /// Replaces the access flags.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Simple name of the behavior.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter type names, in declaration order.
    #[must_use]
    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    /// Return type name.
    #[must_use]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Access and property flags.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Signature code identifying this behavior within its unit, e.g. `bar(int,java.lang.String)`.
    ///
    /// This is the form matchers report in [`crate::matcher::MatchingResult`] and the weaver
    /// receives to select the behaviors it rewrites.
    #[must_use]
    pub fn sign_code(&self) -> String {
        format!("{}({})", self.name, self.parameter_types.join(","))
    }

    /// Returns `true` for instance initializers.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns `true` for class initializers.
    #[must_use]
    pub fn is_class_initializer(&self) -> bool {
        self.name == CLASS_INITIALIZER_NAME
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.return_type, self.sign_code())
    }
}

/// Derived, queryable description of a unit's members and hierarchy.
#[derive(Debug, Clone)]
pub struct StructuralView {
    name: String,
    loader: LoadingContext,
    origin: ViewOrigin,
    access: AccessFlags,
    superclass: Option<String>,
    interfaces: Vec<String>,
    behaviors: Vec<Behavior>,
}

impl StructuralView {
    /// Creates an empty view of unit `name` defined in `loader`.
    ///
    /// The name is normalized to its dotted form.
    pub fn new(name: &str, loader: LoadingContext, origin: ViewOrigin) -> Self {
        StructuralView {
            name: normalize_name(name).into_owned(),
            loader,
            origin,
            access: AccessFlags::PUBLIC,
            superclass: None,
            interfaces: Vec::new(),
            behaviors: Vec::new(),
        }
    }

    /// Replaces the access flags of the unit.
    #[must_use]
    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    /// Sets the superclass.
    #[must_use]
    pub fn with_superclass(mut self, name: &str) -> Self {
        self.superclass = Some(normalize_name(name).into_owned());
        self
    }

    /// Adds a directly implemented interface.
    #[must_use]
    pub fn with_interface(mut self, name: &str) -> Self {
        self.interfaces.push(normalize_name(name).into_owned());
        self
    }

    /// Adds a declared behavior.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Dotted name of the unit.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Simple name, without the package.
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// The loading context that defines (or will define) the unit.
    #[must_use]
    pub fn loader(&self) -> &LoadingContext {
        &self.loader
    }

    /// How the view was obtained.
    #[must_use]
    pub fn origin(&self) -> ViewOrigin {
        self.origin
    }

    /// Access and property flags of the unit.
    #[must_use]
    pub fn access(&self) -> AccessFlags {
        self.access
    }

    /// Direct superclass, `None` for the root type and for interfaces without one.
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// Directly implemented interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Declared behaviors.
    #[must_use]
    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    /// Looks up a declared behavior by its signature code.
    #[must_use]
    pub fn behavior(&self, sign_code: &str) -> Option<&Behavior> {
        self.behaviors.iter().find(|b| b.sign_code() == sign_code)
    }

    /// Returns `true` if the unit directly implements `interface`.
    #[must_use]
    pub fn implements(&self, interface: &str) -> bool {
        let interface = normalize_name(interface);
        self.interfaces.iter().any(|i| i.as_str() == interface.as_ref())
    }

    /// Returns `true` for interfaces and annotation types.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foo_view() -> StructuralView {
        StructuralView::new(
            "com/example/Foo",
            LoadingContext::new(3, "app"),
            ViewOrigin::Parsed,
        )
        .with_superclass("java/lang/Object")
        .with_interface("java/lang/Runnable")
        .with_behavior(Behavior::new("<init>", "void"))
        .with_behavior(
            Behavior::new("bar", "int")
                .with_parameter("int")
                .with_parameter("java.lang.String"),
        )
    }

    #[test]
    fn names_are_normalized() {
        let view = foo_view();
        assert_eq!(view.name(), "com.example.Foo");
        assert_eq!(view.simple_name(), "Foo");
        assert_eq!(view.superclass(), Some("java.lang.Object"));
        assert!(view.implements("java/lang/Runnable"));
        assert!(view.implements("java.lang.Runnable"));
    }

    #[test]
    fn behaviors_by_sign_code() {
        let view = foo_view();
        let bar = view.behavior("bar(int,java.lang.String)").unwrap();
        assert_eq!(bar.return_type(), "int");
        assert!(!bar.is_constructor());
        assert!(view.behavior("<init>()").unwrap().is_constructor());
        assert!(view.behavior("bar()").is_none());
    }

    #[test]
    fn access_flags() {
        let native =
            Behavior::new("hash", "int").with_access(AccessFlags::PUBLIC | AccessFlags::NATIVE);
        assert!(native.access().contains(AccessFlags::NATIVE));
        assert!(!foo_view().is_interface());
    }
}
