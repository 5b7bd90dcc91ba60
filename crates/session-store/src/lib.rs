//! Persisted login session with a fixed time-to-live.
//!
//! The store never logs in by itself: an absent, corrupt or expired session
//! comes back as "no usable session" and the caller decides what to do.

pub mod errors;
pub mod model;
pub mod persist;
pub mod store;

pub use errors::SessionStoreError;
pub use model::{Session, SessionStatus, SESSION_FORMAT_VERSION};
pub use store::{SessionStore, DEFAULT_TTL};
