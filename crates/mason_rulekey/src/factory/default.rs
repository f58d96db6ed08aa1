//! The default rule-key factory: the canonical, complete fingerprint.

use crate::builder::{FileFold, KeyBuilder, KeyTrace, RefFolder, RuleFold};
use crate::cache::KeyCache;
use crate::error::RuleKeyError;
use crate::field::{BuildRule, FieldContribution, FieldValue, FileRef};
use crate::key::{KeySeed, RuleKey};
use crate::provider::{FileHasher, RuleResolver};
use mason_common::RuleId;
use std::sync::Arc;
use tracing::trace;

/// Produces a rule's full structural key: recipe, the recursive default
/// keys of all declared dependencies, and the content hashes of all input
/// files.
///
/// Two rules with identical default keys have identical recipes and
/// identical transitive input content. This is the strongest and most
/// conservative reuse signal; its cost is proportional to the transitive
/// dependency closure, mitigated by per-rule memoization in the shared
/// [`KeyCache`].
pub struct DefaultKeyFactory {
    seed: KeySeed,
    hasher: Arc<dyn FileHasher>,
    resolver: Arc<dyn RuleResolver>,
    cache: Arc<KeyCache>,
}

impl DefaultKeyFactory {
    /// Creates a factory over the given collaborators.
    pub fn new(
        seed: KeySeed,
        hasher: Arc<dyn FileHasher>,
        resolver: Arc<dyn RuleResolver>,
        cache: Arc<KeyCache>,
    ) -> Self {
        Self {
            seed,
            hasher,
            resolver,
            cache,
        }
    }

    /// Computes the rule's default key, memoized per rule identity for the
    /// lifetime of the cache.
    pub fn key(&self, rule: &dyn BuildRule) -> Result<RuleKey, RuleKeyError> {
        self.cache
            .get_or_compute(rule.id(), || Ok(self.compute(rule, false)?.0))
    }

    /// Computes the rule's default key together with its full contribution
    /// trace, for "why did this rebuild" diagnostics.
    ///
    /// The key is byte-identical to [`key`](Self::key); the computation is
    /// rerun rather than served from the cache so the trace is complete.
    pub fn key_with_trace(&self, rule: &dyn BuildRule) -> Result<(RuleKey, KeyTrace), RuleKeyError> {
        self.compute(rule, true)
    }

    fn compute(
        &self,
        rule: &dyn BuildRule,
        traced: bool,
    ) -> Result<(RuleKey, KeyTrace), RuleKeyError> {
        trace!(rule = %rule.id(), "computing default rule key");
        let mut builder = KeyBuilder::with_tracing(self.seed, traced);
        let mut folder = StructuralFolder { factory: self };

        builder.add_contribution(&FieldContribution::new(".kind", "default"), &mut folder)?;
        builder.add_contribution(&FieldContribution::new(".id", rule.id().as_str()), &mut folder)?;
        for field in rule.key_fields() {
            builder.add_contribution(&field, &mut folder)?;
        }
        let deps: Vec<FieldValue> = rule.deps().into_iter().map(FieldValue::Rule).collect();
        builder.add_contribution(
            &FieldContribution::new(".deps", FieldValue::List(deps)),
            &mut folder,
        )?;

        Ok(builder.finish_traced())
    }

    fn dep_key(&self, id: &RuleId) -> Result<RuleKey, RuleKeyError> {
        let rule = self
            .resolver
            .rule(id)
            .ok_or_else(|| RuleKeyError::UnknownRule { id: id.clone() })?;
        self.key(rule.as_ref())
    }
}

/// Structural recursion: rule references (and rule-output file references)
/// fold the producing rule's own default key; plain files fold content.
struct StructuralFolder<'a> {
    factory: &'a DefaultKeyFactory,
}

impl RefFolder for StructuralFolder<'_> {
    fn rule_ref(&mut self, id: &RuleId) -> Result<RuleFold, RuleKeyError> {
        self.factory.dep_key(id).map(RuleFold::Key)
    }

    fn file_ref(&mut self, file: &FileRef) -> Result<FileFold, RuleKeyError> {
        match file {
            FileRef::Path(path) => self.factory.hasher.hash(path).map(FileFold::Content),
            // Output bytes need not exist before the producer has run; its
            // structural key is the pre-execution identity of those bytes.
            FileRef::RuleOutput(id) => self.factory.dep_key(id).map(FileFold::ProducerKey),
        }
    }
}
