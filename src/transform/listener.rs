//! Listeners, the events they subscribe to, and the identity table that routes events
//! raised by rewritten code back to them.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use bitflags::bitflags;
use dashmap::DashMap;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoEnumIterator};

use crate::transform::ProtectScope;

/// Points in a behavior's execution at which rewritten code raises an event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// Behavior entered
    Before,
    /// Behavior returned normally
    Return,
    /// Behavior completed by throwing
    Throws,
    /// A source line is about to execute
    Line,
    /// A call to another behavior is about to happen
    CallBefore,
    /// A call to another behavior returned
    CallReturn,
    /// A call to another behavior threw
    CallThrows,
    /// A listener forced an immediate return
    ImmediatelyReturn,
    /// A listener forced an immediate throw
    ImmediatelyThrows,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// A set of [`EventType`]s a listener subscribes to
    pub struct EventTypes: u16 {
        /// See [`EventType::Before`]
        const BEFORE = 0x0001;
        /// See [`EventType::Return`]
        const RETURN = 0x0002;
        /// See [`EventType::Throws`]
        const THROWS = 0x0004;
        /// See [`EventType::Line`]
        const LINE = 0x0008;
        /// See [`EventType::CallBefore`]
        const CALL_BEFORE = 0x0010;
        /// See [`EventType::CallReturn`]
        const CALL_RETURN = 0x0020;
        /// See [`EventType::CallThrows`]
        const CALL_THROWS = 0x0040;
        /// See [`EventType::ImmediatelyReturn`]
        const IMMEDIATELY_RETURN = 0x0080;
        /// See [`EventType::ImmediatelyThrows`]
        const IMMEDIATELY_THROWS = 0x0100;
    }
}

impl From<EventType> for EventTypes {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Before => EventTypes::BEFORE,
            EventType::Return => EventTypes::RETURN,
            EventType::Throws => EventTypes::THROWS,
            EventType::Line => EventTypes::LINE,
            EventType::CallBefore => EventTypes::CALL_BEFORE,
            EventType::CallReturn => EventTypes::CALL_RETURN,
            EventType::CallThrows => EventTypes::CALL_THROWS,
            EventType::ImmediatelyReturn => EventTypes::IMMEDIATELY_RETURN,
            EventType::ImmediatelyThrows => EventTypes::IMMEDIATELY_THROWS,
        }
    }
}

impl FromIterator<EventType> for EventTypes {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        iter.into_iter()
            .fold(EventTypes::empty(), |set, event_type| set | event_type.into())
    }
}

impl EventTypes {
    /// The events around a behavior's own execution.
    pub const AROUND: EventTypes = EventTypes::BEFORE
        .union(EventTypes::RETURN)
        .union(EventTypes::THROWS);

    /// Returns `true` if `event_type` is part of the set.
    #[must_use]
    pub fn has(&self, event_type: EventType) -> bool {
        self.contains(event_type.into())
    }

    /// The members of the set, in declaration order.
    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        EventType::iter().filter(|event_type| self.has(*event_type))
    }
}

/// One event raised by rewritten code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// What happened
    pub event_type: EventType,
    /// Unit whose behavior raised the event
    pub unit: String,
    /// Signature code of the behavior that raised the event
    pub sign_code: String,
}

impl Event {
    /// Creates an event.
    pub fn new(
        event_type: EventType,
        unit: impl Into<String>,
        sign_code: impl Into<String>,
    ) -> Self {
        Event {
            event_type,
            unit: unit.into(),
            sign_code: sign_code.into(),
        }
    }
}

/// Receives events raised by code rewritten for one registration.
pub trait EventListener: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &Event);
}

/// A shared, type-erased listener.
pub type EventListenerRc = Arc<dyn EventListener>;

/// Assigns stable integer identities to listeners.
///
/// The identity is what the weaver embeds into rewritten binaries; rewritten code hands it
/// back with every event so [`ListenerIds::dispatch`] can find the listener. Identity follows
/// the shared handle, so the same listener registered twice gets the same id. Ids are never
/// reused, even after [`ListenerIds::remove`].
#[derive(Default)]
pub struct ListenerIds {
    next: AtomicU32,
    listeners: DashMap<u32, EventListenerRc>,
    ids: DashMap<usize, u32>,
}

impl ListenerIds {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `listener`, allocating one on first use.
    pub fn identity(&self, listener: &EventListenerRc) -> u32 {
        *self
            .ids
            .entry(Self::address(listener))
            .or_insert_with(|| {
                let id = self.next.fetch_add(1, Ordering::Relaxed);
                self.listeners.insert(id, listener.clone());
                id
            })
    }

    /// Returns the listener registered under `id`.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<EventListenerRc> {
        self.listeners.get(&id).map(|listener| listener.clone())
    }

    /// Forgets the listener registered under `id`.
    pub fn remove(&self, id: u32) -> Option<EventListenerRc> {
        let (_, listener) = self.listeners.remove(&id)?;
        self.ids.remove(&Self::address(&listener));
        Some(listener)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns `true` if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Delivers `event` to the listener registered under `id`.
    ///
    /// Events raised while the current thread runs pipeline code, including a listener
    /// itself, are dropped. Returns `true` if the event was delivered.
    pub fn dispatch(&self, id: u32, event: &Event) -> bool {
        if ProtectScope::is_protecting() {
            return false;
        }
        let Some(listener) = self.get(id) else {
            return false;
        };

        let _scope = ProtectScope::enter();
        listener.on_event(event);
        true
    }

    fn address(listener: &EventListenerRc) -> usize {
        Arc::as_ptr(listener).cast::<()>() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use crate::test::factories::RecordingListener;

    #[test]
    fn event_type_names() {
        assert_eq!(EventType::CallBefore.to_string(), "CALL_BEFORE");
        assert_eq!(
            EventType::from_str("IMMEDIATELY_THROWS").unwrap(),
            EventType::ImmediatelyThrows
        );
        assert_eq!(EventType::COUNT, 9);
    }

    #[test]
    fn event_type_sets() {
        let set: EventTypes = [EventType::Before, EventType::Line].into_iter().collect();
        assert!(set.has(EventType::Line));
        assert!(!set.has(EventType::Return));
        assert_eq!(
            set.event_types().collect::<Vec<_>>(),
            vec![EventType::Before, EventType::Line]
        );
        assert_eq!(EventTypes::all().event_types().count(), EventType::COUNT);
        assert!(EventTypes::AROUND.has(EventType::Throws));
    }

    #[test]
    fn identities_are_stable() {
        let ids = ListenerIds::new();
        let first: EventListenerRc = Arc::new(RecordingListener::default());
        let second: EventListenerRc = Arc::new(RecordingListener::default());

        let id = ids.identity(&first);
        assert_eq!(ids.identity(&first.clone()), id);
        assert_ne!(ids.identity(&second), id);
        assert_eq!(ids.len(), 2);

        assert!(ids.remove(id).is_some());
        assert!(ids.get(id).is_none());
        assert_ne!(ids.identity(&first), id);
    }

    #[test]
    fn dispatch_suppressed_inside_pipeline() {
        let ids = ListenerIds::new();
        let recorder = Arc::new(RecordingListener::default());
        let listener: EventListenerRc = recorder.clone();
        let id = ids.identity(&listener);
        let event = Event::new(EventType::Before, "com.example.Foo", "bar()");

        assert!(ids.dispatch(id, &event));
        {
            let _scope = ProtectScope::enter();
            assert!(!ids.dispatch(id, &event));
        }
        assert!(!ids.dispatch(id + 100, &event));
        assert_eq!(recorder.events(), vec![event]);
    }
}
