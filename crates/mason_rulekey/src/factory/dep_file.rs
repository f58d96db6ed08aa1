//! The dependency-file rule-key factory: keys scoped to inputs a prior
//! execution actually read.

use crate::builder::{FileFold, KeyBuilder, RefFolder, RuleFold};
use crate::error::RuleKeyError;
use crate::factory::input::InputFolder;
use crate::field::{BuildRule, FieldContribution, FieldValue, FileRef};
use crate::key::{KeySeed, RuleKey};
use crate::provider::{DepFileManifest, FileHasher, ManifestProvider, RuleResolver};
use mason_common::RuleId;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::trace;

/// The pair of keys produced for a rule with a recorded manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepFileKeys {
    /// Key over the rule's recipe and the manifest's file set as hashed
    /// now. Unchanged means none of the files the rule actually read last
    /// time have changed.
    pub manifest_key: RuleKey,
    /// Key over the declared-but-unused input set. A change here means the
    /// manifest itself may be stale (an input the rule skipped last time
    /// might matter now).
    pub unused_inputs_key: RuleKey,
}

/// Produces keys restricted to a rule-supplied manifest of inputs actually
/// used during a prior execution.
///
/// A rule with dozens of declared-but-unused optional inputs (header files
/// not transitively included by a particular compile, say) avoids
/// invalidation on changes to inputs it never read. Rules without a
/// recorded manifest get [`RuleKeyError::MissingManifest`], signalling the
/// engine to execute and record one. Results are never cached.
pub struct DepFileKeyFactory {
    seed: KeySeed,
    hasher: Arc<dyn FileHasher>,
    resolver: Arc<dyn RuleResolver>,
    manifests: Arc<dyn ManifestProvider>,
    size_limit: u64,
}

/// Which side of the used/unused split a filtered key covers.
#[derive(Clone, Copy, PartialEq, Eq)]
enum FileScope {
    Used,
    Unused,
}

impl DepFileKeyFactory {
    /// Creates a factory over the given collaborators and size limit.
    pub fn new(
        seed: KeySeed,
        hasher: Arc<dyn FileHasher>,
        resolver: Arc<dyn RuleResolver>,
        manifests: Arc<dyn ManifestProvider>,
        size_limit: u64,
    ) -> Self {
        Self {
            seed,
            hasher,
            resolver,
            manifests,
            size_limit,
        }
    }

    /// Computes the manifest-scoped key pair for the rule.
    pub fn keys(&self, rule: &dyn BuildRule) -> Result<DepFileKeys, RuleKeyError> {
        let manifest =
            self.manifests
                .manifest_for(rule.id())
                .ok_or_else(|| RuleKeyError::MissingManifest {
                    id: rule.id().clone(),
                })?;
        trace!(rule = %rule.id(), files = manifest.files.len(), "computing dep-file rule keys");
        let used: BTreeSet<PathBuf> = manifest.files.iter().cloned().collect();

        let manifest_key = self.filtered_key(rule, &used, FileScope::Used, Some(&manifest))?;
        let unused_inputs_key = self.filtered_key(rule, &used, FileScope::Unused, None)?;
        Ok(DepFileKeys {
            manifest_key,
            unused_inputs_key,
        })
    }

    fn filtered_key(
        &self,
        rule: &dyn BuildRule,
        used: &BTreeSet<PathBuf>,
        scope: FileScope,
        manifest: Option<&DepFileManifest>,
    ) -> Result<RuleKey, RuleKeyError> {
        let mut builder = KeyBuilder::new(self.seed);
        let mut folder = DepFileFolder {
            inner: InputFolder::new(
                self.hasher.as_ref(),
                self.resolver.as_ref(),
                self.size_limit,
            ),
            used,
            scope,
            seen: BTreeSet::new(),
        };

        let kind = match scope {
            FileScope::Used => "dep-file",
            FileScope::Unused => "dep-file-unused",
        };
        builder.add_contribution(&FieldContribution::new(".kind", kind), &mut folder)?;
        builder.add_contribution(&FieldContribution::new(".id", rule.id().as_str()), &mut folder)?;
        for field in rule.key_fields() {
            builder.add_contribution(&field, &mut folder)?;
        }

        if let Some(manifest) = manifest {
            // Manifest entries no longer matched by any declared input
            // (removed sources, vanished files) still shift the key, so a
            // drifted manifest always forces re-execution.
            let extras: Vec<FieldValue> = manifest
                .files
                .iter()
                .filter(|path| !folder.seen.contains(*path))
                .map(|path| FieldValue::File(FileRef::Path(path.clone())))
                .collect();
            builder.add_contribution(
                &FieldContribution::new(".manifest-extras", FieldValue::List(extras)),
                &mut folder,
            )?;
        }

        Ok(builder.finish())
    }
}

/// Filters file references to one side of the used/unused split; hashing
/// and size accounting are delegated to the input folder.
struct DepFileFolder<'a> {
    inner: InputFolder<'a>,
    used: &'a BTreeSet<PathBuf>,
    scope: FileScope,
    /// Declared paths folded under `Used` scope, for manifest drift
    /// detection.
    seen: BTreeSet<PathBuf>,
}

impl RefFolder for DepFileFolder<'_> {
    fn rule_ref(&mut self, id: &RuleId) -> Result<RuleFold, RuleKeyError> {
        self.inner.rule_ref(id)
    }

    fn file_ref(&mut self, file: &FileRef) -> Result<FileFold, RuleKeyError> {
        let path = match file {
            FileRef::Path(path) => path.clone(),
            FileRef::RuleOutput(id) => self.inner.output_path(id)?,
        };
        let in_used = self.used.contains(&path);
        let wanted = match self.scope {
            FileScope::Used => in_used,
            FileScope::Unused => !in_used,
        };
        if !wanted {
            return Ok(FileFold::Skip(path));
        }
        if self.scope == FileScope::Used {
            self.seen.insert(path.clone());
        }
        match self.inner.hash_counted(&path) {
            Ok(hash) => Ok(match file {
                FileRef::Path(_) => FileFold::Content(hash),
                FileRef::RuleOutput(_) => FileFold::OutputContent(hash),
            }),
            // A file the manifest still names but that can no longer be
            // hashed folds a distinct marker: the key differs from any key
            // recorded while the file existed, forcing a rebuild.
            Err(RuleKeyError::FileHash { .. }) => Ok(FileFold::Missing(path)),
            Err(other) => Err(other),
        }
    }
}
