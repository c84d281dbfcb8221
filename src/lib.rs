// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # weavehook
//!
//! A concurrent decision pipeline for runtime instrumentation agents. The host runtime
//! calls a transform hook for every code unit it loads; `weavehook` decides, per unit,
//! whether the active registration wants the unit instrumented and hands the matching
//! behaviors to a weaver that rewrites the unit's binary.
//!
//! ## Features
//!
//! - **🛡️ Fail-open hook** - Parse, match and weave failures never abort class loading
//! - **🔁 Re-entrancy safe** - The rewriting system never rewrites its own units
//! - **⚡ Cached structure** - Structural views are memoized per resolved type and per binary
//! - **🧵 Concurrent** - Safe under many loading threads, no global serialization
//! - **⏱️ Non-blocking variant** - Rewrite in the background, install through retransformation
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! weavehook = "0.3"
//! ```
//!
//! The host provides four collaborators:
//!
//! | Trait | Provides |
//! |-------|----------|
//! | [`structure::StructureBuilder`] | Structural views from resolved types and binaries |
//! | [`matcher::Matcher`] | The behaviors a registration wants instrumented |
//! | [`transform::Weaver`] | Rewritten binaries |
//! | [`transform::Instrumentation`] | Retransformation and native method prefixes |
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use weavehook::prelude::*;
//!
//! let ids = ListenerIds::new();
//! let registration = Registration::builder(
//!     1,
//!     "tracer",
//!     Arc::new(PatternMatcher::new("com.example.*", "handle*")),
//!     listener,
//!     runtime,
//! )
//! .build(&ids)?;
//!
//! let hook = SyncTransformer::new(Arc::new(registration), builder, weaver);
//! let rewritten = hook.transform(&loader, "com/example/Service", None, None, &binary);
//! ```
//!
//! ## Architecture
//!
//! - [`unit`] - Loading contexts, type handles, binaries and structural views
//! - [`matcher`] - Behavior selection and the runtime-safety pre-filter
//! - [`structure`] - View building seam and the view cache
//! - [`transform`] - Guard, decision engine, hooks and registrations
//! - [`config`] - Pipeline configuration
//!
//! ## Logging
//!
//! Diagnostics are emitted through [`tracing`]. The crate never installs a subscriber.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// ```rust
/// use weavehook::prelude::*;
///
/// let loader = LoadingContext::new(7, "AppClassLoader");
/// assert!(!loader.is_bootstrap());
/// ```
pub mod prelude;

pub mod config;
pub mod matcher;
pub mod structure;
pub mod transform;
pub mod unit;
pub mod utils;

/// `weavehook` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `weavehook` Error type
///
/// Per-unit failures are swallowed at the hook boundary; this type surfaces through the
/// traits implemented by the host and through registration setup.
///
/// ```rust
/// use weavehook::Error;
///
/// match Error::QueueFull {
///     Error::UnsupportedCapability(what) => println!("cannot set up: {what}"),
///     error => println!("unit skipped: {error}"),
/// }
/// ```
pub use error::Error;
