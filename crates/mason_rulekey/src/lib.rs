//! Rule-key computation and caching for incremental builds.
//!
//! This crate decides, for every build rule, a compact fingerprint covering
//! the rule's recipe plus everything that can affect its output. The build
//! engine compares fingerprints against its cache to decide whether a rule's
//! output can be reused instead of re-executed.
//!
//! Three fingerprint strategies are provided, trading completeness for
//! precision:
//!
//! - [`DefaultKeyFactory`] — the full structural key: recipe, recursive keys
//!   of all declared dependencies, and content hashes of all input files.
//!   The conservative baseline; memoized per rule via [`KeyCache`].
//! - [`InputKeyFactory`] — a key over the bytes the rule actually consumes,
//!   folding upstream rules' produced output hashes instead of their
//!   structural keys, bounded by a configurable size limit.
//! - [`DepFileKeyFactory`] — a key scoped to the inputs a prior execution
//!   reported as actually used, for narrower invalidation.
//!
//! [`RuleKeyFactories`] wires the three factories over shared collaborators
//! so that seed and resolver identity can never diverge between them.

#![warn(missing_docs)]

pub mod builder;
pub mod cache;
pub mod error;
pub mod factories;
pub mod factory;
pub mod field;
pub mod key;
pub mod provider;

#[cfg(test)]
pub(crate) mod testutil;

pub use builder::{KeyTrace, TraceEntry};
pub use cache::KeyCache;
pub use error::RuleKeyError;
pub use factories::{KeyConfig, RuleKeyFactories};
pub use factory::default::DefaultKeyFactory;
pub use factory::dep_file::{DepFileKeyFactory, DepFileKeys};
pub use factory::input::InputKeyFactory;
pub use field::{BuildRule, FieldContribution, FieldValue, FileRef};
pub use key::{KeySeed, RuleKey};
pub use provider::{DepFileManifest, FileHasher, ManifestProvider, RuleResolver};
