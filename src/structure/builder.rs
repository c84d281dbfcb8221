use std::sync::Arc;

use crate::{
    unit::{Binary, LoadingContext, StructuralView, TypeHandle},
    Result,
};

/// A shared, type-erased structure builder.
pub type StructureBuilderRc = Arc<dyn StructureBuilder>;

/// Turns units into structural views.
///
/// The two entry points must expose the same query surface regardless of origin: a unit
/// matched through a view built from its binary must match identically once it is resolved
/// and viewed reflectively.
pub trait StructureBuilder: Send + Sync {
    /// Builds a view of an already resolved unit by introspection.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime can no longer describe the unit.
    fn from_resolved(&self, handle: &TypeHandle) -> Result<StructuralView>;

    /// Builds a view by parsing the binary of a unit about to be defined in `loader`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`], [`crate::Error::Empty`] or
    /// [`crate::Error::NotSupported`] if the binary cannot be parsed.
    fn from_binary(&self, binary: &Binary, loader: &LoadingContext) -> Result<StructuralView>;
}
