//! Collaborator interfaces consumed by the rule-key core.
//!
//! The core never touches the filesystem or the build graph directly. File
//! hashing, path resolution, and dependency-file manifests are supplied by
//! the surrounding engine through these traits; their own caching and
//! invalidation are out of scope here.

use crate::error::RuleKeyError;
use crate::field::BuildRule;
use mason_common::{ContentHash, RuleId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Process-wide provider of file content hashes.
///
/// Implementations typically cache hashes and invalidate entries on
/// filesystem change notifications.
pub trait FileHasher: Send + Sync {
    /// Returns the content hash of the file at `path`.
    fn hash(&self, path: &Path) -> Result<ContentHash, RuleKeyError>;

    /// Returns the size of the file at `path` in bytes.
    ///
    /// The input-based factory checks sizes against its limit before
    /// hashing, so oversized inputs are rejected without reading them.
    fn size(&self, path: &Path) -> Result<u64, RuleKeyError>;
}

/// Resolves rule identities to rules and to their declared output paths.
pub trait RuleResolver: Send + Sync {
    /// Looks up the rule with the given identity.
    fn rule(&self, id: &RuleId) -> Option<Arc<dyn BuildRule>>;

    /// Returns the declared output path of the rule with the given
    /// identity, if it declares one.
    fn output_path(&self, id: &RuleId) -> Option<PathBuf>;
}

/// Supplies per-rule dependency-file manifests recorded by the execution
/// engine after a real build.
pub trait ManifestProvider: Send + Sync {
    /// Returns the recorded manifest for the rule, or `None` if the rule
    /// has never executed or its manifest was invalidated.
    fn manifest_for(&self, id: &RuleId) -> Option<DepFileManifest>;
}

/// The subset of a rule's input files actually read during a previous
/// successful execution.
///
/// Recorded by the execution engine, not computed by this core. The file
/// order is the order the execution reported and must be stable for a
/// given recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepFileManifest {
    /// Paths actually read, in recorded order, without duplicates.
    pub files: Vec<PathBuf>,
}

impl DepFileManifest {
    /// Creates a manifest over the given paths.
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }
}
