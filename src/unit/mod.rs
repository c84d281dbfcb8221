//! Code units as the runtime hands them to the transform hook.
//!
//! This module holds the data model every other part of the pipeline speaks:
//!
//! - [`LoadingContext`] and [`TypeHandle`] identify a unit and the scope it lives in
//! - [`Binary`] is the encoded form of a unit at one point in time, with
//!   [`BinaryKey`] deriving cache identity from it
//! - [`StructuralView`] and [`Behavior`] describe the shape of a unit for matching
//!
//! # Naming
//!
//! Runtimes report unit names either in internal form (`com/example/Foo`) or in dotted
//! form (`com.example.Foo`). Everything stored or compared by this crate uses the dotted
//! form; [`normalize_name`] converts at the boundary.

mod binary;
mod identity;
mod view;

use std::borrow::Cow;

pub use binary::{Binary, BinaryIdentity, BinaryKey, FINGERPRINT_LEN};
pub use identity::{LoadingContext, ProtectionDomain, TypeHandle, BOOTSTRAP_LOADER_ID};
pub use view::{
    AccessFlags, Behavior, StructuralView, StructuralViewRc, ViewOrigin, CLASS_INITIALIZER_NAME,
    CONSTRUCTOR_NAME,
};

/// Converts a unit name from internal (`/`-separated) to dotted form.
///
/// Names already in dotted form are returned borrowed.
///
/// # Examples
///
/// ```rust
/// use weavehook::unit::normalize_name;
///
/// assert_eq!(normalize_name("com/example/Foo"), "com.example.Foo");
/// assert_eq!(normalize_name("com.example.Foo"), "com.example.Foo");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> Cow<'_, str> {
    if name.contains('/') {
        Cow::Owned(name.replace('/', "."))
    } else {
        Cow::Borrowed(name)
    }
}
