//! Query parameter entry.
//!
//! [`ParameterFiller`] resolves an input through an ordered fallback chain
//! and commits a value, re-reading the field after each commit method; a
//! value the UI rewrote counts as a failure.

pub mod errors;
pub mod filler;
pub mod model;
mod redact;

pub use errors::FillError;
pub use filler::ParameterFiller;
pub use model::{values_match, CommitMethod, FieldSpec, FillReport};
