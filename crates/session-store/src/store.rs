use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashprobe_core_types::SerializedState;
use tracing::{debug, info};

use crate::errors::SessionStoreError;
use crate::model::{Session, SessionStatus};
use crate::persist;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// File-backed session store. One file, one session.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the persisted session, or `None` when absent or unreadable.
    /// Expiry is not checked here.
    pub fn load(&self) -> Option<Session> {
        let session = persist::load(&self.path);
        debug!(target: "session-store", found = session.is_some(), "session loaded");
        session
    }

    pub fn is_valid(&self, session: &Session) -> bool {
        self.is_valid_at(session, Utc::now())
    }

    /// Valid iff younger than the TTL and the state carries cookies.
    /// A `created_at` in the future counts as age zero.
    pub fn is_valid_at(&self, session: &Session, now: DateTime<Utc>) -> bool {
        if !session.state.is_well_formed() {
            return false;
        }
        let age = session.age_at(now).to_std().unwrap_or(Duration::ZERO);
        age < self.ttl
    }

    /// Load and validate in one step.
    pub fn load_valid(&self) -> Option<Session> {
        self.load().filter(|session| self.is_valid(session))
    }

    /// Stamps the save time and writes atomically.
    pub fn save(&self, state: SerializedState) -> Result<Session, SessionStoreError> {
        self.save_at(state, Utc::now())
    }

    pub fn save_at(
        &self,
        state: SerializedState,
        now: DateTime<Utc>,
    ) -> Result<Session, SessionStoreError> {
        let session = Session {
            state,
            created_at: now,
        };
        persist::store(&self.path, &session)?;
        info!(
            target: "session-store",
            path = %self.path.display(),
            cookies = session.state.cookies().len(),
            "session saved"
        );
        Ok(session)
    }

    /// Removes the session file. Returns whether a file was present.
    pub fn clear(&self) -> Result<bool, SessionStoreError> {
        let removed = persist::remove(&self.path)?;
        if removed {
            info!(target: "session-store", path = %self.path.display(), "session cleared");
        }
        Ok(removed)
    }

    pub fn status(&self) -> SessionStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> SessionStatus {
        let exists = self.path.exists();
        let session = if exists { self.load() } else { None };
        match session {
            Some(session) => {
                let age = session.age_at(now).to_std().unwrap_or(Duration::ZERO);
                let valid = self.is_valid_at(&session, now);
                let remaining = self.ttl.checked_sub(age).filter(|_| valid);
                SessionStatus {
                    path: self.path.clone(),
                    exists,
                    readable: true,
                    valid,
                    saved_at: Some(session.created_at),
                    age: Some(format_span(age)),
                    expires_in: remaining.map(format_span),
                    cookie_count: session.state.cookies().len(),
                }
            }
            None => SessionStatus {
                path: self.path.clone(),
                exists,
                readable: false,
                valid: false,
                saved_at: None,
                age: None,
                expires_in: None,
                cookie_count: 0,
            },
        }
    }
}

fn format_span(span: Duration) -> String {
    humantime::format_duration(Duration::from_secs(span.as_secs())).to_string()
}
