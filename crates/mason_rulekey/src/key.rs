//! Rule-key digests and the global key seed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A deterministic digest identifying a build rule's recipe and relevant
/// inputs at a point in time.
///
/// Equality of two `RuleKey`s is the engine's reuse signal: a rule whose
/// current key matches a cached one may have its cached output reused.
/// Keys are produced only by the key builder; callers never construct one
/// from raw bytes, and a produced key is immutable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleKey([u8; 16]);

impl RuleKey {
    /// Wraps a finished XXH3-128 digest. Crate-internal: only the key
    /// builder produces keys.
    pub(crate) fn from_digest(digest: u128) -> Self {
        Self(digest.to_le_bytes())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// A global salt folded into every key computation.
///
/// Changing the seed invalidates every cached key across the entire build
/// universe, which is how schema or versioning bumps force full rebuilds.
/// The seed is passed explicitly through [`RuleKeyFactories`] and set once
/// per build invocation; there is no process-wide global.
///
/// [`RuleKeyFactories`]: crate::RuleKeyFactories
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct KeySeed(u64);

impl KeySeed {
    /// Creates a seed from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw seed value.
    pub fn value(self) -> u64 {
        self.0
    }
}
