//! SSO sign-in: the login collaborator the orchestrator calls when no
//! usable session is stored.

use std::time::Duration;

use action_flow::{LoginFailure, LoginProvider};
use action_primitives::{StabilizingWaiter, WaitPolicy};
use async_trait::async_trait;
use cdp_adapter::{AdapterError, AnchorDescriptor, BrowserPage, ElementRef, FrameRef};
use dashprobe_core_types::SerializedState;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::LoginSettings;

/// Pause between filling the account and the password.
const FIELD_PAUSE: Duration = Duration::from_millis(500);
/// Pause after submitting before looking for the welcome marker.
const SUBMIT_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("SSO credentials are not configured; set SSO_USERNAME and SSO_PASSWORD (e.g. in .env)")]
    MissingCredentials,
    #[error("login form field {0} not found")]
    FieldMissing(String),
    #[error("login produced no session cookies")]
    NoSession,
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

pub struct SsoLogin {
    settings: LoginSettings,
}

impl SsoLogin {
    pub fn new(settings: LoginSettings) -> Self {
        Self { settings }
    }

    fn credentials(&self) -> Result<(&str, &str), LoginError> {
        match (self.settings.username.as_deref(), self.settings.password.as_deref()) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => Ok((user, password)),
            _ => Err(LoginError::MissingCredentials),
        }
    }

    #[instrument(skip_all, fields(url = %self.settings.url))]
    pub async fn sign_in(&self, page: &dyn BrowserPage) -> Result<SerializedState, LoginError> {
        let (user, password) = self.credentials()?;
        page.navigate(&self.settings.url, Duration::from_millis(self.settings.navigation_timeout_ms))
            .await?;
        let main = main_frame(page).await?;

        let account = self.field(page, &main, &self.settings.account_selector).await?;
        page.fill(&main, &account, user).await?;
        tokio::time::sleep(FIELD_PAUSE).await;
        let secret = self.field(page, &main, &self.settings.password_selector).await?;
        page.fill(&main, &secret, password).await?;

        let submit = AnchorDescriptor::text(self.settings.submit_text.clone());
        let button = page
            .query(&main, None, &submit)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LoginError::FieldMissing(submit.to_string()))?;
        page.click(&main, &button).await?;
        tokio::time::sleep(SUBMIT_PAUSE).await;

        if !self.wait_welcome(page, &main).await? {
            warn!(target: "login", marker = %self.settings.success_text, "welcome marker not seen; continuing");
        }

        let state = page.storage_state().await?.cookies_only();
        if !state.is_well_formed() {
            return Err(LoginError::NoSession);
        }
        info!(target: "login", cookies = state.cookies().len(), "signed in");
        Ok(state)
    }

    async fn field(&self, page: &dyn BrowserPage, frame: &FrameRef, selector: &str) -> Result<ElementRef, LoginError> {
        page.query(frame, None, &AnchorDescriptor::css(selector))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LoginError::FieldMissing(selector.to_string()))
    }

    /// Best effort: a missing marker does not fail the login.
    async fn wait_welcome(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<bool, AdapterError> {
        let waiter = StabilizingWaiter::new(WaitPolicy::fixed(
            Duration::from_millis(500),
            Duration::from_millis(self.settings.success_timeout_ms),
        ));
        let marker = AnchorDescriptor::text_contains(self.settings.success_text.clone());
        match waiter
            .until_some("welcome marker", || marker_probe(page, frame, &marker))
            .await
        {
            Ok(()) => Ok(true),
            Err(action_primitives::WaitError::Aborted { cause, .. }) => Err(cause),
            Err(action_primitives::WaitError::Timeout { .. }) => Ok(false),
        }
    }
}

async fn marker_probe(page: &dyn BrowserPage, frame: &FrameRef, marker: &AnchorDescriptor) -> Result<Option<()>, AdapterError> {
    Ok((!page.query(frame, None, marker).await?.is_empty()).then_some(()))
}

async fn main_frame(page: &dyn BrowserPage) -> Result<FrameRef, AdapterError> {
    page.frames()
        .await?
        .into_iter()
        .find(|info| info.is_main())
        .map(|info| info.frame)
        .ok_or_else(|| AdapterError::new(cdp_adapter::AdapterErrorKind::TargetNotFound).with_hint("main frame"))
}

#[async_trait]
impl LoginProvider for SsoLogin {
    async fn perform_login(&self, page: &dyn BrowserPage) -> Result<SerializedState, LoginFailure> {
        Ok(self.sign_in(page).await?)
    }
}
