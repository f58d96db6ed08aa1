//! Shared foundational types used across the Mason build engine.
//!
//! This crate provides the core identity and hashing types consumed by the
//! rule-key subsystem and its collaborators: content hashes for file data
//! and cheap-to-clone rule identities.

#![warn(missing_docs)]

pub mod hash;
pub mod rule_id;

pub use hash::ContentHash;
pub use rule_id::RuleId;
