use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dashprobe_core_types::SerializedState;
use serde::{Deserialize, Serialize};

pub const SESSION_FORMAT_VERSION: &str = "1.0";

/// Serialized browser state plus the moment it was persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub state: SerializedState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(state: SerializedState) -> Self {
        Self {
            state,
            created_at: Utc::now(),
        }
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// On-disk layout of the session file.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SessionFile {
    pub storage_state: SerializedState,
    pub saved_at: DateTime<Utc>,
    pub version: String,
}

impl From<&Session> for SessionFile {
    fn from(session: &Session) -> Self {
        Self {
            storage_state: session.state.clone(),
            saved_at: session.created_at,
            version: SESSION_FORMAT_VERSION.to_string(),
        }
    }
}

impl From<SessionFile> for Session {
    fn from(file: SessionFile) -> Self {
        Self {
            state: file.storage_state,
            created_at: file.saved_at,
        }
    }
}

/// Snapshot for `session status`.
#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub readable: bool,
    pub valid: bool,
    pub saved_at: Option<DateTime<Utc>>,
    /// Human-readable age, e.g. `3h 12m`.
    pub age: Option<String>,
    /// Human-readable time left before expiry; `None` once expired.
    pub expires_in: Option<String>,
    pub cookie_count: usize,
}
