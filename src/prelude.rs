//! # weavehook Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the weavehook library. Import it to get the hook, its collaborators and the unit
//! model in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all weavehook operations
pub use crate::Error;

/// The result type used throughout weavehook
pub use crate::Result;

/// Pipeline configuration
pub use crate::config::{CacheConfig, TransformConfig};

// ================================================================================================
// Code Units
// ================================================================================================

/// Identity and encoded form of units
pub use crate::unit::{Binary, BinaryIdentity, LoadingContext, ProtectionDomain, TypeHandle};

/// Structural description of units
pub use crate::unit::{AccessFlags, Behavior, StructuralView, StructuralViewRc, ViewOrigin};

// ================================================================================================
// Matching and Structure
// ================================================================================================

/// Behavior selection
pub use crate::matcher::{Matcher, MatcherRc, MatchingResult, PatternMatcher};

/// View building and caching
pub use crate::structure::{StructureBuilder, StructureBuilderRc, StructureCache};

// ================================================================================================
// Transform Pipeline
// ================================================================================================

/// The hooks
pub use crate::transform::{RetransformingTransformer, SyncTransformer, UnitTransformer};

/// Registrations and listeners
pub use crate::transform::{
    Event, EventListener, EventListenerRc, EventType, EventTypes, ListenerIds, Registration,
};

/// Host runtime collaborators
pub use crate::transform::{Instrumentation, InstrumentationRc, WeaveRequest, Weaver, WeaverRc};

/// Outcomes and observability
pub use crate::transform::{AffectSnapshot, DecisionOutcome, TransformDecision};
