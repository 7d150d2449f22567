//! # Key Transforms
//!
//! Purpose: Rewrite a caller's key before it is sharded and sent, so that keys
//! always satisfy the server's length limit.
//!
//! ## Design Principles
//! 1. **Copy Semantics**: Every transform returns a fresh owned `KeyBuf`; the
//!    caller's buffer is never retained past the call.
//! 2. **Fallible Allocation**: Buffers are reserved with `try_reserve_exact` so an
//!    allocation failure surfaces as an error instead of aborting.
//! 3. **Strategy Pattern**: Built-ins and caller closures share one trait.

use md5::{Digest, Md5};
use serde::Deserialize;
use thiserror::Error;

use emc_common::{KeyBuf, MAX_KEY_LEN};

/// Length of a hex-encoded 128-bit digest.
pub const DIGEST_HEX_LEN: usize = 32;

/// Reasons a key transform could not produce a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The new key buffer could not be allocated.
    #[error("allocation failure while transforming key")]
    AllocationFailure,
}

/// Rewrites a key into a new owned buffer.
pub trait KeyTransform {
    fn transform(&self, key: &[u8]) -> Result<KeyBuf, KeyError>;
}

impl<F> KeyTransform for F
where
    F: Fn(&[u8]) -> Result<KeyBuf, KeyError>,
{
    fn transform(&self, key: &[u8]) -> Result<KeyBuf, KeyError> {
        self(key)
    }
}

/// Returns an unchanged copy of the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl KeyTransform for Identity {
    fn transform(&self, key: &[u8]) -> Result<KeyBuf, KeyError> {
        copy_key(key)
    }
}

/// Keeps at most `limit` leading bytes of the key.
#[derive(Debug, Clone, Copy)]
pub struct Truncate {
    pub limit: usize,
}

impl Default for Truncate {
    fn default() -> Self {
        Truncate {
            limit: MAX_KEY_LEN,
        }
    }
}

impl KeyTransform for Truncate {
    fn transform(&self, key: &[u8]) -> Result<KeyBuf, KeyError> {
        let end = key.len().min(self.limit);
        copy_key(&key[..end])
    }
}

/// Replaces the key with the lowercase hex MD5 digest of its bytes.
///
/// Output is always 32 bytes, whatever the input size.
#[derive(Debug, Clone, Copy, Default)]
pub struct Md5Hex;

impl KeyTransform for Md5Hex {
    fn transform(&self, key: &[u8]) -> Result<KeyBuf, KeyError> {
        let digest = Md5::digest(key);
        let mut hex_digest = [0u8; DIGEST_HEX_LEN];
        // 16 digest bytes always fill the 32-byte buffer exactly.
        hex::encode_to_slice(digest, &mut hex_digest)
            .map_err(|_| KeyError::AllocationFailure)?;
        copy_key(&hex_digest)
    }
}

/// Built-in transform names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyTransformKind {
    /// `Identity`
    None,
    /// `Truncate` at 250 bytes
    Len250,
    /// `Md5Hex`
    Md5,
}

impl KeyTransformKind {
    /// Instantiates the named transform.
    pub fn transform(self) -> Box<dyn KeyTransform> {
        match self {
            KeyTransformKind::None => Box::new(Identity),
            KeyTransformKind::Len250 => Box::new(Truncate::default()),
            KeyTransformKind::Md5 => Box::new(Md5Hex),
        }
    }
}

/// Copies `key` into a fallibly allocated buffer.
pub(crate) fn copy_key(key: &[u8]) -> Result<KeyBuf, KeyError> {
    let mut out = Vec::new();
    out.try_reserve_exact(key.len())
        .map_err(|_| KeyError::AllocationFailure)?;
    out.extend_from_slice(key);
    Ok(KeyBuf::new(out))
}
