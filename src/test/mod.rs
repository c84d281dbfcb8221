//! Shared fixtures for unit tests.
//!
//! The factories stand in for everything the host runtime normally provides: a structure
//! builder over a tiny textual binary format, weavers, a runtime that can redeliver units
//! through a hook, and a listener that records events.

pub mod factories;
