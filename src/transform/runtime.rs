use std::sync::Arc;

use crate::{unit::TypeHandle, Error, Result};

/// A shared, type-erased runtime handle.
pub type InstrumentationRc = Arc<dyn Instrumentation>;

/// Services the host runtime offers to the pipeline.
///
/// Calls may synchronously re-enter the transform hook on the calling thread, so callers
/// must not hold any lock the hook needs.
pub trait Instrumentation: Send + Sync {
    /// Asks the runtime to redeliver an already loaded unit through the transform hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RetransformRejected`] if the unit cannot be retransformed, for
    /// example because it was unloaded.
    fn retransform(&self, handle: &TypeHandle) -> Result<()>;

    /// Returns `true` if native behaviors can be wrapped by renaming them with a prefix.
    fn is_native_method_prefix_supported(&self) -> bool {
        false
    }

    /// Installs `prefix` as the native method prefix used by the registration `watch_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCapability`] if the runtime cannot do this.
    fn set_native_method_prefix(&self, watch_id: u32, prefix: &str) -> Result<()> {
        let _ = (watch_id, prefix);
        Err(Error::UnsupportedCapability("native method prefix"))
    }
}
