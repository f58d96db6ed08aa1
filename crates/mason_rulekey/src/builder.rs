//! The key builder: canonical encoding of field contributions into a digest.
//!
//! A builder is a streaming XXH3-128 state seeded by the [`KeySeed`]. Each
//! contribution appends its length-prefixed name, a one-byte type tag, and
//! the value bytes. Nested sequences and collection elements are hashed
//! independently into 16-byte sub-keys before being folded, which prevents
//! field-boundary ambiguity and keeps cost proportional to depth. Unordered
//! sets are canonically ordered by their element sub-keys, so insertion
//! order never changes the result.
//!
//! How file and rule references fold is the one thing the three factories
//! disagree on, so the builder delegates those two cases to a per-factory
//! [`RefFolder`]. Any resolution failure aborts the whole key: the
//! in-progress digest is dropped, never published.

use crate::error::RuleKeyError;
use crate::field::{FieldContribution, FieldValue, FileRef};
use crate::key::{KeySeed, RuleKey};
use mason_common::{ContentHash, RuleId};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::Xxh3;

const TAG_ABSENT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_NESTED: u8 = 0x05;
const TAG_LIST: u8 = 0x06;
const TAG_SET: u8 = 0x07;
const TAG_PLAIN_FILE: u8 = 0x08;
const TAG_RULE_OUTPUT: u8 = 0x09;
const TAG_RULE: u8 = 0x0a;
const TAG_MISSING_FILE: u8 = 0x0b;
const TAG_SKIPPED_FILE: u8 = 0x0c;

/// What a rule reference folds into the key.
pub(crate) enum RuleFold {
    /// The referenced rule's own key (default factory: structural
    /// recursion).
    Key(RuleKey),
    /// The content hash of the referenced rule's produced output
    /// (input-based and dep-file factories).
    OutputContent(ContentHash),
}

/// What a file reference folds into the key.
pub(crate) enum FileFold {
    /// A plain file's content hash.
    Content(ContentHash),
    /// The producing rule's key stands in for output bytes that need not
    /// exist yet (default factory).
    ProducerKey(RuleKey),
    /// The content hash of the producing rule's output (input-based and
    /// dep-file factories).
    OutputContent(ContentHash),
    /// The file could not be resolved, but the key must still differ from
    /// any key computed while it existed (dep-file manifests).
    Missing(PathBuf),
    /// The file's content is excluded from this key (dep-file filtering).
    /// Folds a bare marker tag so the value slot is never empty.
    Skip(PathBuf),
}

/// Per-factory policy for folding file and rule references.
pub(crate) trait RefFolder {
    /// Resolves a rule reference to the bytes that represent it in the key.
    fn rule_ref(&mut self, id: &RuleId) -> Result<RuleFold, RuleKeyError>;

    /// Resolves a file reference to the bytes that represent it in the key.
    fn file_ref(&mut self, file: &FileRef) -> Result<FileFold, RuleKeyError>;
}

/// One recorded contribution in a key's diagnostics trace.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    /// Nesting depth below the rule's top-level contributions.
    pub depth: usize,
    /// The contribution name, or `[]` for a collection element.
    pub name: String,
    /// Human-readable rendering of what was folded.
    pub detail: String,
}

/// The full contribution trace of one key computation, for human-facing
/// "why did this rebuild" explanations.
#[derive(Debug, Clone, Default)]
pub struct KeyTrace {
    /// Entries in fold order.
    pub entries: Vec<TraceEntry>,
}

/// A stateful accumulator folding field contributions into a [`RuleKey`].
pub(crate) struct KeyBuilder {
    seed: KeySeed,
    state: Xxh3,
    trace: Option<Vec<TraceEntry>>,
}

impl KeyBuilder {
    /// Creates a builder seeded by the given key seed.
    pub(crate) fn new(seed: KeySeed) -> Self {
        Self::with_tracing(seed, false)
    }

    /// Creates a builder that also records a diagnostics trace.
    pub(crate) fn with_tracing(seed: KeySeed, traced: bool) -> Self {
        Self {
            seed,
            state: Xxh3::with_seed(seed.value()),
            trace: traced.then(Vec::new),
        }
    }

    fn sub_builder(&self) -> Self {
        Self::with_tracing(self.seed, self.trace.is_some())
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state.update(bytes);
    }

    fn write_tag(&mut self, tag: u8) {
        self.state.update(&[tag]);
    }

    fn write_str(&mut self, s: &str) {
        self.write(&(s.len() as u64).to_le_bytes());
        self.write(s.as_bytes());
    }

    fn write_path(&mut self, path: &Path) {
        self.write_str(&path.to_string_lossy());
    }

    fn detail(&self, f: impl FnOnce() -> String) -> String {
        match self.trace {
            Some(_) => f(),
            None => String::new(),
        }
    }

    fn absorb(&mut self, children: Vec<TraceEntry>, depth: usize) {
        if let Some(trace) = &mut self.trace {
            trace.extend(children.into_iter().map(|mut e| {
                e.depth += depth;
                e
            }));
        }
    }

    /// Folds one named contribution. Fails without side effects on the
    /// produced key if any reference cannot be resolved.
    pub(crate) fn add_contribution(
        &mut self,
        contribution: &FieldContribution,
        folder: &mut dyn RefFolder,
    ) -> Result<(), RuleKeyError> {
        self.write_str(&contribution.name);
        let at = self.trace.as_ref().map(Vec::len);
        let detail = self.fold_value(&contribution.value, folder, 1)?;
        if let Some(at) = at {
            if let Some(trace) = &mut self.trace {
                trace.insert(
                    at,
                    TraceEntry {
                        depth: 0,
                        name: contribution.name.clone(),
                        detail,
                    },
                );
            }
        }
        Ok(())
    }

    /// Hashes one collection element into its own sub-key.
    fn element_key(
        &self,
        item: &FieldValue,
        folder: &mut dyn RefFolder,
    ) -> Result<(RuleKey, Vec<TraceEntry>), RuleKeyError> {
        let mut sub = self.sub_builder();
        let detail = sub.fold_value(item, folder, 1)?;
        if let Some(trace) = &mut sub.trace {
            trace.insert(
                0,
                TraceEntry {
                    depth: 0,
                    name: "[]".to_string(),
                    detail,
                },
            );
        }
        Ok(sub.finish_parts())
    }

    fn fold_value(
        &mut self,
        value: &FieldValue,
        folder: &mut dyn RefFolder,
        depth: usize,
    ) -> Result<String, RuleKeyError> {
        match value {
            FieldValue::Absent => {
                self.write_tag(TAG_ABSENT);
                Ok(self.detail(|| "absent".to_string()))
            }
            FieldValue::Bool(b) => {
                self.write_tag(TAG_BOOL);
                self.write(&[*b as u8]);
                Ok(self.detail(|| format!("bool:{b}")))
            }
            FieldValue::Int(i) => {
                self.write_tag(TAG_INT);
                self.write(&i.to_le_bytes());
                Ok(self.detail(|| format!("int:{i}")))
            }
            FieldValue::Float(x) => {
                self.write_tag(TAG_FLOAT);
                self.write(&x.to_bits().to_le_bytes());
                Ok(self.detail(|| format!("float:{x}")))
            }
            FieldValue::Str(s) => {
                self.write_tag(TAG_STR);
                self.write_str(s);
                Ok(self.detail(|| format!("str:{s:?}")))
            }
            FieldValue::Nested(fields) => {
                let mut sub = self.sub_builder();
                for contribution in fields {
                    sub.add_contribution(contribution, folder)?;
                }
                let (key, children) = sub.finish_parts();
                self.write_tag(TAG_NESTED);
                self.write(key.as_bytes());
                self.absorb(children, depth);
                Ok(self.detail(|| format!("nested:{key}")))
            }
            FieldValue::List(items) => {
                self.write_tag(TAG_LIST);
                self.write(&(items.len() as u64).to_le_bytes());
                for item in items {
                    let (key, children) = self.element_key(item, folder)?;
                    self.write(key.as_bytes());
                    self.absorb(children, depth);
                }
                Ok(self.detail(|| format!("list:{}", items.len())))
            }
            FieldValue::Set(items) => {
                let mut keyed = Vec::with_capacity(items.len());
                for item in items {
                    keyed.push(self.element_key(item, folder)?);
                }
                keyed.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
                self.write_tag(TAG_SET);
                self.write(&(keyed.len() as u64).to_le_bytes());
                for (key, children) in keyed {
                    self.write(key.as_bytes());
                    self.absorb(children, depth);
                }
                Ok(self.detail(|| format!("set:{}", items.len())))
            }
            FieldValue::File(file) => match folder.file_ref(file)? {
                FileFold::Content(hash) => {
                    self.write_tag(TAG_PLAIN_FILE);
                    self.write(hash.as_bytes());
                    Ok(self.detail(|| format!("file:{file:?}={hash}")))
                }
                FileFold::ProducerKey(key) => {
                    self.write_tag(TAG_RULE_OUTPUT);
                    self.write(key.as_bytes());
                    Ok(self.detail(|| format!("rule-output:{file:?}={key}")))
                }
                FileFold::OutputContent(hash) => {
                    self.write_tag(TAG_RULE_OUTPUT);
                    self.write(hash.as_bytes());
                    Ok(self.detail(|| format!("rule-output:{file:?}={hash}")))
                }
                FileFold::Missing(path) => {
                    self.write_tag(TAG_MISSING_FILE);
                    self.write_path(&path);
                    Ok(self.detail(|| format!("missing:{}", path.display())))
                }
                FileFold::Skip(path) => {
                    self.write_tag(TAG_SKIPPED_FILE);
                    Ok(self.detail(|| format!("skipped:{}", path.display())))
                }
            },
            FieldValue::Rule(id) => {
                self.write_tag(TAG_RULE);
                match folder.rule_ref(id)? {
                    RuleFold::Key(key) => {
                        self.write(key.as_bytes());
                        Ok(self.detail(|| format!("rule:{id}={key}")))
                    }
                    RuleFold::OutputContent(hash) => {
                        self.write(hash.as_bytes());
                        Ok(self.detail(|| format!("rule-output:{id}={hash}")))
                    }
                }
            }
        }
    }

    fn finish_parts(self) -> (RuleKey, Vec<TraceEntry>) {
        let key = RuleKey::from_digest(self.state.digest128());
        (key, self.trace.unwrap_or_default())
    }

    /// Consumes the builder and returns the finished key.
    pub(crate) fn finish(self) -> RuleKey {
        self.finish_parts().0
    }

    /// Consumes the builder and returns the key with its recorded trace.
    pub(crate) fn finish_traced(self) -> (RuleKey, KeyTrace) {
        let (key, entries) = self.finish_parts();
        (key, KeyTrace { entries })
    }
}
