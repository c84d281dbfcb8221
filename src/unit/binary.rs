//! Binary representation of a code unit and the identity used to cache views of it.
//!
//! A [`Binary`] is an immutable, reference-counted byte buffer. Cloning it never copies the
//! bytes, which gives two cheap notions of identity:
//!
//! - **Storage identity**: two binaries share the same allocation. The runtime hands the
//!   same buffer back while a unit's bytes are unchanged, and the weaver returns the very
//!   buffer it was given when it has nothing to change.
//! - **Content identity**: two binaries hold the same bytes, established through a SHA-1
//!   fingerprint.
//!
//! [`BinaryKey`] keeps the binary alive while it is used as a storage key, so an allocation
//! cannot be freed and reused for different bytes while a cache entry still refers to it.

use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
    sync::Arc,
};

use sha1::{Digest, Sha1};

/// Length of a content fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 20;

/// An immutable byte sequence holding a unit's encoded form at one point in time.
#[derive(Clone)]
pub struct Binary(Arc<[u8]>);

impl Binary {
    /// Wraps `bytes` into a new binary with its own storage.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Binary(Arc::from(bytes.into()))
    }

    /// The encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns `true` if both binaries share the same storage.
    ///
    /// This is the no-op sentinel of the weaver: a rewrite that returns the storage it was
    /// handed has not changed anything.
    #[must_use]
    pub fn same_storage(&self, other: &Binary) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// SHA-1 fingerprint of the content.
    #[must_use]
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&Sha1::digest(&self.0));
        fingerprint
    }

    fn storage_address(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<u8>() as usize
    }
}

impl Deref for Binary {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Binary {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Binary(Arc::from(bytes))
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Binary(Arc::from(bytes))
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Binary({} bytes @ {:#x})",
            self.0.len(),
            self.storage_address()
        )
    }
}

/// How two binaries are decided to be the same when used as cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinaryIdentity {
    /// Same storage means same content. Costs one pointer comparison, but misses when the
    /// runtime hands out identical bytes in fresh storage.
    #[default]
    Storage,
    /// Same SHA-1 fingerprint means same content. Costs one hash over the bytes per lookup.
    Content,
}

/// Cache key derived from a [`Binary`] under a [`BinaryIdentity`] policy.
#[derive(Clone)]
pub enum BinaryKey {
    /// Keyed by storage; holds the binary so its storage stays reserved.
    Storage(Binary),
    /// Keyed by content fingerprint.
    Content([u8; FINGERPRINT_LEN]),
}

impl BinaryKey {
    /// Derives the key for `binary` under `identity`.
    #[must_use]
    pub fn new(binary: &Binary, identity: BinaryIdentity) -> Self {
        match identity {
            BinaryIdentity::Storage => BinaryKey::Storage(binary.clone()),
            BinaryIdentity::Content => BinaryKey::Content(binary.fingerprint()),
        }
    }
}

impl PartialEq for BinaryKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BinaryKey::Storage(a), BinaryKey::Storage(b)) => a.same_storage(b),
            (BinaryKey::Content(a), BinaryKey::Content(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for BinaryKey {}

impl Hash for BinaryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            BinaryKey::Storage(binary) => {
                0u8.hash(state);
                binary.storage_address().hash(state);
            }
            BinaryKey::Content(digest) => {
                1u8.hash(state);
                digest.hash(state);
            }
        }
    }
}

impl fmt::Debug for BinaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryKey::Storage(binary) => write!(f, "BinaryKey::Storage({binary:?})"),
            BinaryKey::Content(digest) => {
                f.write_str("BinaryKey::Content(")?;
                for byte in digest {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str(")")
            }
        }
    }
}
