use std::{collections::BTreeSet, sync::Arc};

use crate::{
    transform::EventTypes,
    unit::{Binary, LoadingContext},
    Result,
};

/// A shared, type-erased weaver.
pub type WeaverRc = Arc<dyn Weaver>;

/// Everything a weaver needs to rewrite one unit.
#[derive(Debug, Clone, Copy)]
pub struct WeaveRequest<'a> {
    /// Loading context the unit is defined in
    pub loader: &'a LoadingContext,
    /// Dotted name of the unit
    pub unit: &'a str,
    /// Binary to rewrite
    pub binary: &'a Binary,
    /// Signature codes of the behaviors to instrument
    pub sign_codes: &'a BTreeSet<String>,
    /// Namespace of the owning registration
    pub namespace: &'a str,
    /// Identity embedded into the rewritten code for event routing
    pub listener_id: u32,
    /// Events the rewritten code raises
    pub event_types: EventTypes,
    /// Prefix for renaming wrapped native behaviors, if enabled
    pub native_prefix: Option<&'a str>,
}

/// Rewrites binaries to raise events at matched behaviors.
pub trait Weaver: Send + Sync {
    /// Rewrites `request.binary`.
    ///
    /// Returning a binary that shares storage with the input ([`Binary::same_storage`])
    /// signals that nothing had to change, for example because the binary was already
    /// rewritten for the same behaviors.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Weave`] if the binary cannot be rewritten. Nothing is
    /// installed in that case.
    fn weave(&self, request: &WeaveRequest<'_>) -> Result<Binary>;
}
