//! One active instrumentation intent and the state it owns.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::{
    config::TransformConfig,
    matcher::MatcherRc,
    transform::{AffectStatistic, EventListenerRc, EventTypes, InstrumentationRc, ListenerIds},
    Error, Result,
};

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// The bundle of matcher, listener, event types and namespace one module asked for.
///
/// A registration lives from [`RegistrationBuilder::build`] until [`Registration::teardown`];
/// its [`AffectStatistic`] grows over that lifetime.
pub struct Registration {
    watch_id: u32,
    unique_id: String,
    matcher: MatcherRc,
    listener: EventListenerRc,
    listener_id: u32,
    event_types: EventTypes,
    namespace: String,
    config: TransformConfig,
    instrumentation: InstrumentationRc,
    statistic: AffectStatistic,
    native_enhanced: AtomicBool,
}

/// Builder for [`Registration`].
pub struct RegistrationBuilder {
    watch_id: u32,
    unique_id: String,
    matcher: MatcherRc,
    listener: EventListenerRc,
    instrumentation: InstrumentationRc,
    event_types: EventTypes,
    namespace: String,
    config: TransformConfig,
}

impl RegistrationBuilder {
    /// Replaces the subscribed events (default: before, return and throws).
    #[must_use]
    pub fn event_types(mut self, event_types: EventTypes) -> Self {
        self.event_types = event_types;
        self
    }

    /// Replaces the namespace (default: [`DEFAULT_NAMESPACE`]).
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replaces the pipeline configuration.
    #[must_use]
    pub fn config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates the registration against the runtime and assigns its listener id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCapability`] if a native method prefix is configured
    /// but the runtime cannot rename native behaviors.
    pub fn build(self, ids: &ListenerIds) -> Result<Registration> {
        if self.config.native_method_prefix.is_some()
            && !self.instrumentation.is_native_method_prefix_supported()
        {
            return Err(Error::UnsupportedCapability("native method prefix"));
        }

        let listener_id = ids.identity(&self.listener);
        info!(
            watch_id = self.watch_id,
            module = %self.unique_id,
            listener_id,
            "registration created"
        );

        Ok(Registration {
            watch_id: self.watch_id,
            unique_id: self.unique_id,
            matcher: self.matcher,
            listener: self.listener,
            listener_id,
            event_types: self.event_types,
            namespace: self.namespace,
            config: self.config,
            instrumentation: self.instrumentation,
            statistic: AffectStatistic::new(),
            native_enhanced: AtomicBool::new(false),
        })
    }
}

impl Registration {
    /// Starts building a registration.
    ///
    /// # Arguments
    ///
    /// * `watch_id` - Identity of this registration within its module.
    /// * `unique_id` - Identity of the owning module.
    /// * `matcher` - Selects the behaviors to instrument.
    /// * `listener` - Receives the events of rewritten code.
    /// * `instrumentation` - The runtime the registration is installed into.
    pub fn builder(
        watch_id: u32,
        unique_id: impl Into<String>,
        matcher: MatcherRc,
        listener: EventListenerRc,
        instrumentation: InstrumentationRc,
    ) -> RegistrationBuilder {
        RegistrationBuilder {
            watch_id,
            unique_id: unique_id.into(),
            matcher,
            listener,
            instrumentation,
            event_types: EventTypes::AROUND,
            namespace: DEFAULT_NAMESPACE.to_string(),
            config: TransformConfig::default(),
        }
    }

    /// Identity of this registration within its module.
    #[must_use]
    pub fn watch_id(&self) -> u32 {
        self.watch_id
    }

    /// Identity of the owning module.
    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// The registration's own matcher, without the runtime-safety pre-filter.
    #[must_use]
    pub fn matcher(&self) -> &MatcherRc {
        &self.matcher
    }

    /// The listener receiving the events.
    #[must_use]
    pub fn listener(&self) -> &EventListenerRc {
        &self.listener
    }

    /// Identity of the listener embedded into rewritten binaries.
    #[must_use]
    pub fn listener_id(&self) -> u32 {
        self.listener_id
    }

    /// The subscribed events.
    #[must_use]
    pub fn event_types(&self) -> EventTypes {
        self.event_types
    }

    /// Namespace of the registration.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Returns `true` if bootstrap units may be rewritten.
    #[must_use]
    pub fn is_unsafe_enabled(&self) -> bool {
        self.config.enable_unsafe
    }

    /// The native method prefix, if native behaviors are wrapped.
    #[must_use]
    pub fn native_method_prefix(&self) -> Option<&str> {
        self.config.native_method_prefix.as_deref()
    }

    /// The runtime this registration is installed into.
    #[must_use]
    pub fn instrumentation(&self) -> &InstrumentationRc {
        &self.instrumentation
    }

    /// What this registration has rewritten so far.
    #[must_use]
    pub fn statistic(&self) -> &AffectStatistic {
        &self.statistic
    }

    /// Returns `true` once the native method prefix is installed on the runtime.
    #[must_use]
    pub fn is_native_method_enhanced(&self) -> bool {
        self.native_enhanced.load(Ordering::Acquire)
    }

    /// Installs the native method prefix on the runtime, once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedCapability`] if no prefix is configured or the runtime
    /// cannot rename native behaviors, or the runtime's error if installing fails.
    pub fn mark_native_method_enhance(&self) -> Result<()> {
        let Some(prefix) = self.native_method_prefix() else {
            return Err(Error::UnsupportedCapability("native method prefix"));
        };
        if !self.instrumentation.is_native_method_prefix_supported() {
            return Err(Error::UnsupportedCapability("native method prefix"));
        }

        if self
            .native_enhanced
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        if let Err(error) = self
            .instrumentation
            .set_native_method_prefix(self.watch_id, prefix)
        {
            self.native_enhanced.store(false, Ordering::Release);
            return Err(error);
        }
        debug!(watch_id = self.watch_id, prefix, "native method prefix installed");
        Ok(())
    }

    /// Ends the registration: forgets its listener id and resets its statistic.
    pub fn teardown(&self, ids: &ListenerIds) {
        ids.remove(self.listener_id);
        self.statistic.reset();
        info!(
            watch_id = self.watch_id,
            module = %self.unique_id,
            "registration torn down"
        );
    }
}
