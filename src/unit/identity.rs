//! Identity of code units and the contexts they are loaded in.
//!
//! A unit name alone is not unique: the same name can be defined by several loading
//! contexts, and reloaded over the lifetime of the runtime. Identity is therefore the
//! pair (loading context, name), or the [`TypeHandle`] the runtime assigned once the
//! unit has been resolved.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Reserved identifier of the bootstrap loading context.
pub const BOOTSTRAP_LOADER_ID: u64 = 0;

/// A loading context, the scoping mechanism that isolates groups of units from each other.
///
/// Two contexts are equal when their runtime identifiers are equal; the name is only
/// descriptive (usually the implementation type of the loader) and is used for family
/// classification and logging.
#[derive(Clone)]
pub struct LoadingContext {
    id: u64,
    name: Arc<str>,
}

impl LoadingContext {
    /// Creates a loading context with the runtime assigned `id`.
    ///
    /// The identifier [`BOOTSTRAP_LOADER_ID`] is reserved; passing it yields a context
    /// that compares equal to [`LoadingContext::bootstrap`].
    pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
        LoadingContext {
            id,
            name: name.into(),
        }
    }

    /// The bootstrap loading context that loads the runtime's own core units.
    #[must_use]
    pub fn bootstrap() -> Self {
        LoadingContext {
            id: BOOTSTRAP_LOADER_ID,
            name: Arc::from("bootstrap"),
        }
    }

    /// Runtime identifier of this context.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Descriptive name of this context.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the bootstrap loading context.
    #[must_use]
    pub fn is_bootstrap(&self) -> bool {
        self.id == BOOTSTRAP_LOADER_ID
    }
}

impl PartialEq for LoadingContext {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LoadingContext {}

impl Hash for LoadingContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for LoadingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LoadingContext({}@{})", self.name, self.id)
    }
}

impl fmt::Display for LoadingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bootstrap() {
            f.write_str("bootstrap")
        } else {
            write!(f, "{}@{}", self.name, self.id)
        }
    }
}

/// Handle of a unit the runtime has already resolved.
///
/// Handles are only ever created by the runtime; equality and hashing use the runtime
/// assigned identifier, so two handles for units with the same name in different loading
/// contexts never collide.
#[derive(Clone)]
pub struct TypeHandle {
    id: u64,
    name: Arc<str>,
    loader: LoadingContext,
}

impl TypeHandle {
    /// Creates a handle for the resolved unit `name` defined by `loader`.
    pub fn new(id: u64, name: impl Into<Arc<str>>, loader: LoadingContext) -> Self {
        TypeHandle {
            id,
            name: name.into(),
            loader,
        }
    }

    /// Runtime identifier of the resolved unit.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the resolved unit, as the runtime reports it.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The context that defined the unit.
    #[must_use]
    pub fn loader(&self) -> &LoadingContext {
        &self.loader
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle(#{} {} in {})", self.id, self.name, self.loader)
    }
}

/// Security scope the runtime attaches to a unit being defined.
///
/// It is passed through the hook untouched; the pipeline never inspects it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionDomain {
    /// Location the unit was loaded from, if the runtime knows it.
    pub code_source: Option<String>,
}

impl ProtectionDomain {
    /// Creates a protection domain for units loaded from `code_source`.
    pub fn new(code_source: impl Into<String>) -> Self {
        ProtectionDomain {
            code_source: Some(code_source.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn loader_identity_ignores_name() {
        let a = LoadingContext::new(7, "AppClassLoader");
        let b = LoadingContext::new(7, "renamed");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn bootstrap() {
        let bootstrap = LoadingContext::bootstrap();
        assert!(bootstrap.is_bootstrap());
        assert_eq!(bootstrap, LoadingContext::new(BOOTSTRAP_LOADER_ID, "other"));
        assert_eq!(bootstrap.to_string(), "bootstrap");
        assert!(!LoadingContext::new(1, "app").is_bootstrap());
    }

    #[test]
    fn type_handles_with_same_name_differ() {
        let first = TypeHandle::new(1, "com.example.Foo", LoadingContext::new(1, "a"));
        let second = TypeHandle::new(2, "com.example.Foo", LoadingContext::new(2, "b"));
        assert_ne!(first, second);
        assert_eq!(first, first.clone());
    }
}
