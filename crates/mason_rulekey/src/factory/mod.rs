//! The three rule-key factories.
//!
//! Each factory answers "has anything that matters to this rule changed?"
//! with a different notion of what matters: the full structural closure
//! ([`default`]), the bytes actually consumed ([`input`]), or the files a
//! prior execution reported reading ([`dep_file`]).

pub mod default;
pub mod dep_file;
pub mod input;
