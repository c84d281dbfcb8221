//! The transform pipeline invoked by the runtime's loading hook.
//!
//! Every time the runtime loads or redelivers a unit it calls a [`UnitTransformer`]. The
//! pipeline behind it decides whether the unit belongs to the active [`Registration`], and
//! if so returns a rewritten binary that raises events for the registration's listener.
//!
//! # Architecture
//!
//! The synchronous path runs entirely on the hook's calling thread:
//!
//! 1. **Bootstrap check** - bootstrap units are rejected unless unsafe rewriting is enabled
//! 2. **Guard** - [`ReentrancyGuard`] rejects units of the rewriting system itself
//! 3. **View** - the unit's [`crate::unit::StructuralView`] comes from the thread's last
//!    view or the [`crate::structure::StructureCache`]
//! 4. **Decision** - [`TransformDecisionEngine`] matches, weaves and records statistics
//!
//! [`RetransformingTransformer`] moves steps 2 to 4 onto a dedicated worker and installs
//! the result through retransformation.
//!
//! # Failure Handling
//!
//! The hook never fails. Parse errors, matcher and weaver failures, rejected
//! retransformations and panics of collaborators are logged and leave the unit unchanged.
//! Only setting up a [`Registration`] can fail, with [`crate::Error::UnsupportedCapability`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weavehook::prelude::*;
//!
//! let ids = ListenerIds::new();
//! let registration = Registration::builder(1, "tracer", matcher, listener, runtime)
//!     .event_types(EventTypes::AROUND)
//!     .build(&ids)?;
//! let hook = SyncTransformer::new(Arc::new(registration), builder, weaver);
//!
//! if let Some(rewritten) = hook.transform(&loader, "com/example/Foo", None, None, &binary) {
//!     // install `rewritten` instead of `binary`
//! }
//! ```

mod decision;
mod guard;
mod listener;
mod protect;
mod registration;
mod retransform;
mod runtime;
mod statistic;
mod sync;
mod weaver;

use crate::unit::{Binary, LoadingContext, ProtectionDomain, TypeHandle};

pub use decision::{DecisionOutcome, TransformDecision, TransformDecisionEngine};
pub use guard::{ReentrancyGuard, SelfFamily};
pub use listener::{Event, EventListener, EventListenerRc, EventType, EventTypes, ListenerIds};
pub use protect::ProtectScope;
pub use registration::{Registration, RegistrationBuilder, DEFAULT_NAMESPACE};
pub use retransform::{CachedOutcome, RetransformingTransformer};
pub use runtime::{Instrumentation, InstrumentationRc};
pub use statistic::{AffectSnapshot, AffectStatistic};
pub use sync::SyncTransformer;
pub use weaver::{WeaveRequest, Weaver, WeaverRc};

/// The runtime's loading hook.
pub trait UnitTransformer: Send + Sync {
    /// Called for every unit the runtime loads or redelivers.
    ///
    /// # Arguments
    ///
    /// * `loader` - Loading context defining the unit.
    /// * `name` - Unit name, in internal or dotted form.
    /// * `redefined` - The resolved unit when it is being redelivered; `None` on first load.
    /// * `protection` - Protection domain of the unit, if the runtime reports one.
    /// * `binary` - The unit's current binary.
    ///
    /// Returns the binary to install instead, or `None` to keep `binary`. A returned binary
    /// sharing storage with `binary` also keeps it.
    fn transform(
        &self,
        loader: &LoadingContext,
        name: &str,
        redefined: Option<&TypeHandle>,
        protection: Option<&ProtectionDomain>,
        binary: &Binary,
    ) -> Option<Binary>;
}
