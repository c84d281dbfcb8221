//! Factories for units, views and fake host collaborators.

mod runtime;
mod units;

pub use runtime::*;
pub use units::*;
