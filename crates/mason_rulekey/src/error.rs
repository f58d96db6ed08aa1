//! Error types for rule-key computation.

use mason_common::RuleId;
use std::path::PathBuf;

/// Errors that can occur while computing a rule key.
///
/// Resolution failures (`UnknownRule`, `MissingOutput`, `FileHash`) are
/// fatal for the key being computed: a key must never be produced from
/// partial data, so the in-progress digest is discarded and the error
/// propagates. `SizeLimitExceeded` and `MissingManifest` are recoverable
/// signals telling the caller to fall back to another strategy; see
/// [`is_recoverable`](RuleKeyError::is_recoverable).
///
/// All variants are `Clone` so the key cache can propagate one computation
/// failure to every concurrent waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RuleKeyError {
    /// A referenced rule is not present in the build graph.
    #[error("rule {id} is not present in the build graph")]
    UnknownRule {
        /// The unresolvable rule identity.
        id: RuleId,
    },

    /// A referenced rule declares no output path, so its output cannot be
    /// folded into a key.
    #[error("rule {id} declares no output path")]
    MissingOutput {
        /// The rule that lacks an output.
        id: RuleId,
    },

    /// A file's content could not be hashed.
    #[error("failed to hash {path}: {reason}")]
    FileHash {
        /// The path that could not be hashed.
        path: PathBuf,
        /// Description of the underlying failure.
        reason: String,
    },

    /// The accumulated size of hashed inputs exceeded the configured limit
    /// for input-based keys. The caller should fall back to the default key.
    #[error("hashed input size {total} exceeds the configured limit of {limit} bytes")]
    SizeLimitExceeded {
        /// The configured size limit in bytes.
        limit: u64,
        /// The accumulated input size that tripped the limit.
        total: u64,
    },

    /// No dependency-file manifest has been recorded for the rule. The
    /// caller should execute the rule and record a fresh manifest.
    #[error("no dependency-file manifest recorded for rule {id}")]
    MissingManifest {
        /// The rule without a recorded manifest.
        id: RuleId,
    },

    /// The in-flight computation for this rule was abandoned before it
    /// produced a key or a failure. Reported to callers that were already
    /// waiting on it; the next request starts over.
    #[error("rule key computation for {id} was abandoned")]
    Abandoned {
        /// The rule whose computation was abandoned.
        id: RuleId,
    },
}

impl RuleKeyError {
    /// Builds a [`FileHash`](RuleKeyError::FileHash) error from an I/O
    /// failure on the given path.
    pub fn file_hash(path: impl Into<PathBuf>, source: &std::io::Error) -> Self {
        Self::FileHash {
            path: path.into(),
            reason: source.to_string(),
        }
    }

    /// Returns `true` for conditions that signal "use another key strategy"
    /// rather than a hard resolution failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SizeLimitExceeded { .. } | Self::MissingManifest { .. }
        )
    }
}
