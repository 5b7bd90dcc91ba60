//! Polling primitives shared by every query stage.
//!
//! - [`StabilizingWaiter`]: the single bounded retry loop, driven by a
//!   [`WaitPolicy`] (interval, backoff, attempt and time ceilings)
//! - [`Transient`]: which probe errors deserve another poll
//! - [`settle`]: best-effort network-quiet wait after page actions

pub mod errors;
mod settle;
mod waiting;

pub use errors::*;
pub use settle::*;
pub use waiting::*;
