//! Building and caching structural views.
//!
//! Turning a unit into a [`crate::unit::StructuralView`] is the expensive part of every
//! hook invocation: it means introspecting a resolved type or parsing a binary. This module
//! provides the seam to the builders that do that work ([`StructureBuilder`]) and the
//! [`StructureCache`] that makes repeated requests cheap.
//!
//! # Architecture
//!
//! ```text
//!            StructureCache::get(loader, handle?, binary)
//!                       │
//!          ┌────────────┴─────────────┐
//!          ▼                          ▼
//!   handle present              first load, no handle
//!   resolved cache              parsed cache
//!   key: TypeHandle             key: (BinaryKey, LoadingContext)
//!          │                          │
//!          ▼                          ▼
//!   StructureBuilder::         StructureBuilder::
//!     from_resolved              from_binary
//! ```

mod builder;
mod cache;

pub use builder::{StructureBuilder, StructureBuilderRc};
pub use cache::StructureCache;
