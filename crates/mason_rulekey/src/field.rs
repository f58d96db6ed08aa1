//! The field-contribution model: what a rule exposes for keying.
//!
//! Every rule type implements [`BuildRule::key_fields`] and returns its own
//! ordered list of named, typed contributions. There is no runtime
//! introspection; the contract is carried by the trait.

use mason_common::RuleId;
use std::path::PathBuf;

/// A reference to a file that contributes content to a rule key.
///
/// Resolves either to a plain filesystem path or to another rule's declared
/// output. The two cases are discriminated at the point of folding, so a
/// plain file and a rule output with identical content never produce the
/// same contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRef {
    /// A plain filesystem path.
    Path(PathBuf),
    /// The declared output of another rule.
    RuleOutput(RuleId),
}

/// A typed value folded into a rule key.
///
/// Emission order of non-permutation-invariant containers is significant
/// and must be stable across runs; [`Set`](FieldValue::Set) is the one
/// container whose insertion order never affects the key.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An absent optional value. Distinct from every present value.
    Absent,
    /// A boolean scalar.
    Bool(bool),
    /// An integer scalar.
    Int(i64),
    /// A floating-point scalar, folded via its bit pattern.
    Float(f64),
    /// A string scalar, length-prefixed when folded.
    Str(String),
    /// A nested sequence of named contributions, hashed into a sub-key.
    Nested(Vec<FieldContribution>),
    /// An ordered collection; element order affects the key.
    List(Vec<FieldValue>),
    /// An unordered collection; elements are canonically ordered by their
    /// sub-keys before folding, so insertion order never affects the key.
    Set(Vec<FieldValue>),
    /// A file reference; folds the file's content hash.
    File(FileRef),
    /// A reference to another rule; how it folds depends on the factory.
    Rule(RuleId),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<FileRef> for FieldValue {
    fn from(v: FileRef) -> Self {
        Self::File(v)
    }
}

/// One named, typed unit of data folded into a rule's key.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldContribution {
    /// The field name, folded ahead of the value to keep contributions
    /// unambiguous.
    pub name: String,
    /// The typed value.
    pub value: FieldValue,
}

impl FieldContribution {
    /// Creates a named contribution.
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A build rule as seen by the rule-key core.
///
/// Supplied by the build-graph collaborator; the core only reads it. Both
/// `key_fields` and `deps` must return the same ordered content on every
/// call within a build invocation, or keys lose their determinism.
pub trait BuildRule: Send + Sync {
    /// The rule's unique identity within the build graph.
    fn id(&self) -> &RuleId;

    /// The rule's declared key-relevant fields, in declaration order.
    fn key_fields(&self) -> Vec<FieldContribution>;

    /// The rule's declared dependencies, in declaration order.
    fn deps(&self) -> Vec<RuleId>;
}
