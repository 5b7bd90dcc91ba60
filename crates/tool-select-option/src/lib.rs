//! Reporting-window selection.
//!
//! [`RangeSelector`] opens the window control, matches an option against the
//! window's aliases (exact, then case-insensitive, then containment), clicks
//! it and waits until either the control's label or a refresh marker shows
//! the change.

pub mod errors;
pub mod model;
pub mod selector;

pub use errors::SelectError;
pub use model::{default_aliases, label_shows, match_option, MatchKind, RangeSpec, SelectReport};
pub use selector::RangeSelector;
