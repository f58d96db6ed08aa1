//! In-memory build-graph fixtures shared by factory tests.

use crate::error::RuleKeyError;
use crate::field::{BuildRule, FieldContribution, FieldValue};
use crate::provider::{DepFileManifest, FileHasher, ManifestProvider, RuleResolver};
use mason_common::{ContentHash, RuleId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A build rule declared directly in a test.
pub(crate) struct TestRule {
    id: RuleId,
    fields: Vec<FieldContribution>,
    deps: Vec<RuleId>,
}

impl TestRule {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: RuleId::new(id),
            fields: Vec::new(),
            deps: Vec::new(),
        }
    }

    pub(crate) fn field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push(FieldContribution::new(name, value));
        self
    }

    pub(crate) fn dep(mut self, id: &str) -> Self {
        self.deps.push(RuleId::new(id));
        self
    }
}

impl BuildRule for TestRule {
    fn id(&self) -> &RuleId {
        &self.id
    }

    fn key_fields(&self) -> Vec<FieldContribution> {
        self.fields.clone()
    }

    fn deps(&self) -> Vec<RuleId> {
        self.deps.clone()
    }
}

/// An in-memory filesystem, build graph, and manifest store in one.
///
/// Implements all three collaborator traits so tests can hand out the same
/// `Arc<TestEnv>` as hasher, resolver, and manifest provider. Interior
/// mutability lets a test change file content or manifests mid-scenario.
#[derive(Default)]
pub(crate) struct TestEnv {
    rules: Mutex<HashMap<RuleId, Arc<TestRule>>>,
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    outputs: Mutex<HashMap<RuleId, PathBuf>>,
    manifests: Mutex<HashMap<RuleId, DepFileManifest>>,
}

impl TestEnv {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_rule(&self, rule: TestRule) -> Arc<TestRule> {
        let rule = Arc::new(rule);
        self.rules
            .lock()
            .unwrap()
            .insert(rule.id.clone(), Arc::clone(&rule));
        rule
    }

    pub(crate) fn write_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), content.to_vec());
    }

    pub(crate) fn remove_file(&self, path: &str) {
        self.files.lock().unwrap().remove(Path::new(path));
    }

    pub(crate) fn set_output(&self, id: &str, path: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(RuleId::new(id), PathBuf::from(path));
    }

    pub(crate) fn set_manifest(&self, id: &str, files: &[&str]) {
        self.manifests.lock().unwrap().insert(
            RuleId::new(id),
            DepFileManifest::new(files.iter().map(PathBuf::from).collect()),
        );
    }
}

impl FileHasher for TestEnv {
    fn hash(&self, path: &Path) -> Result<ContentHash, RuleKeyError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|content| ContentHash::from_bytes(content))
            .ok_or_else(|| RuleKeyError::FileHash {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })
    }

    fn size(&self, path: &Path) -> Result<u64, RuleKeyError> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .map(|content| content.len() as u64)
            .ok_or_else(|| RuleKeyError::FileHash {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })
    }
}

impl RuleResolver for TestEnv {
    fn rule(&self, id: &RuleId) -> Option<Arc<dyn BuildRule>> {
        self.rules
            .lock()
            .unwrap()
            .get(id)
            .map(|rule| Arc::clone(rule) as Arc<dyn BuildRule>)
    }

    fn output_path(&self, id: &RuleId) -> Option<PathBuf> {
        self.outputs.lock().unwrap().get(id).cloned()
    }
}

impl ManifestProvider for TestEnv {
    fn manifest_for(&self, id: &RuleId) -> Option<DepFileManifest> {
        self.manifests.lock().unwrap().get(id).cloned()
    }
}
