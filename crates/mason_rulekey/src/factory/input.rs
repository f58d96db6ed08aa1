//! The input-based rule-key factory: fingerprints over consumed bytes.

use crate::builder::{FileFold, KeyBuilder, RefFolder, RuleFold};
use crate::error::RuleKeyError;
use crate::field::{BuildRule, FieldContribution, FileRef};
use crate::key::{KeySeed, RuleKey};
use crate::provider::{FileHasher, RuleResolver};
use mason_common::{ContentHash, RuleId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::trace;

/// Produces a key over the rule's own fields plus the actual resolved
/// input files it will read.
///
/// Where the default factory folds a referenced rule's structural key,
/// this factory folds the referenced rule's produced output content hash.
/// An upstream change that leaves output bytes untouched (a comment edit
/// in a recipe, say) therefore does not disturb this key, while any change
/// in consumed bytes does.
///
/// Every hashed file's size accrues against the configured limit; a rule
/// whose inputs exceed it gets [`RuleKeyError::SizeLimitExceeded`] rather
/// than a silently truncated key, and the caller falls back to the default
/// key. Results are intentionally never cached: the key is cheap, narrow,
/// and recomputed per lookup.
pub struct InputKeyFactory {
    seed: KeySeed,
    hasher: Arc<dyn FileHasher>,
    resolver: Arc<dyn RuleResolver>,
    size_limit: u64,
}

impl InputKeyFactory {
    /// Creates a factory over the given collaborators and size limit.
    pub fn new(
        seed: KeySeed,
        hasher: Arc<dyn FileHasher>,
        resolver: Arc<dyn RuleResolver>,
        size_limit: u64,
    ) -> Self {
        Self {
            seed,
            hasher,
            resolver,
            size_limit,
        }
    }

    /// Computes the rule's input-based key.
    pub fn key(&self, rule: &dyn BuildRule) -> Result<RuleKey, RuleKeyError> {
        trace!(rule = %rule.id(), "computing input-based rule key");
        let mut builder = KeyBuilder::new(self.seed);
        let mut folder = InputFolder::new(
            self.hasher.as_ref(),
            self.resolver.as_ref(),
            self.size_limit,
        );

        builder.add_contribution(&FieldContribution::new(".kind", "input"), &mut folder)?;
        builder.add_contribution(&FieldContribution::new(".id", rule.id().as_str()), &mut folder)?;
        for field in rule.key_fields() {
            builder.add_contribution(&field, &mut folder)?;
        }

        Ok(builder.finish())
    }
}

/// Consumed-bytes recursion: every reference resolves to file content, and
/// every hashed file counts against the size limit.
pub(crate) struct InputFolder<'a> {
    hasher: &'a dyn FileHasher,
    resolver: &'a dyn RuleResolver,
    limit: u64,
    total: u64,
}

impl<'a> InputFolder<'a> {
    pub(crate) fn new(hasher: &'a dyn FileHasher, resolver: &'a dyn RuleResolver, limit: u64) -> Self {
        Self {
            hasher,
            resolver,
            limit,
            total: 0,
        }
    }

    /// Hashes a file after charging its size against the limit.
    pub(crate) fn hash_counted(&mut self, path: &Path) -> Result<ContentHash, RuleKeyError> {
        let size = self.hasher.size(path)?;
        self.total = self.total.saturating_add(size);
        if self.total > self.limit {
            return Err(RuleKeyError::SizeLimitExceeded {
                limit: self.limit,
                total: self.total,
            });
        }
        self.hasher.hash(path)
    }

    /// Resolves a rule's declared output path.
    pub(crate) fn output_path(&self, id: &RuleId) -> Result<PathBuf, RuleKeyError> {
        self.resolver
            .output_path(id)
            .ok_or_else(|| RuleKeyError::MissingOutput { id: id.clone() })
    }
}

impl RefFolder for InputFolder<'_> {
    fn rule_ref(&mut self, id: &RuleId) -> Result<RuleFold, RuleKeyError> {
        let path = self.output_path(id)?;
        self.hash_counted(&path).map(RuleFold::OutputContent)
    }

    fn file_ref(&mut self, file: &FileRef) -> Result<FileFold, RuleKeyError> {
        match file {
            FileRef::Path(path) => self.hash_counted(path).map(FileFold::Content),
            FileRef::RuleOutput(id) => {
                let path = self.output_path(id)?;
                self.hash_counted(&path).map(FileFold::OutputContent)
            }
        }
    }
}
