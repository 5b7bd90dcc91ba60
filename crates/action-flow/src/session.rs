//! Login collaborator port and the post-navigation session check.

use std::error::Error;

use async_trait::async_trait;
use cdp_adapter::{AdapterError, AnchorDescriptor, BrowserPage};
use dashprobe_core_types::SerializedState;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub type LoginFailure = Box<dyn Error + Send + Sync + 'static>;

/// Produces a fresh authenticated state. Only called when the stored
/// session is absent, expired or rejected by the dashboard.
#[async_trait]
pub trait LoginProvider: Send + Sync {
    async fn perform_login(&self, page: &dyn BrowserPage) -> Result<SerializedState, LoginFailure>;
}

/// How to tell, after navigating, that the dashboard refused the session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCheck {
    /// Landing on this host means we were redirected to sign in.
    pub login_host: Option<String>,
    /// Element only the sign-in form renders.
    pub login_marker: Option<AnchorDescriptor>,
}

impl SessionCheck {
    pub fn new(login_host: Option<String>, login_marker: Option<AnchorDescriptor>) -> Self {
        Self {
            login_host,
            login_marker,
        }
    }

    /// `Some(reason)` when the page shows the sign-in flow instead of the
    /// dashboard.
    pub async fn rejected(&self, page: &dyn BrowserPage) -> Result<Option<String>, AdapterError> {
        let current = page.current_url().await?;
        if let Some(host) = &self.login_host {
            let landed = host_of(&current);
            if landed.as_deref() == Some(host.as_str()) {
                return Ok(Some(format!("redirected to {current}")));
            }
        }
        if let Some(marker) = &self.login_marker {
            let main = page
                .frames()
                .await?
                .into_iter()
                .find(|info| info.is_main())
                .map(|info| info.frame);
            if let Some(frame) = main {
                if !page.query(&frame, None, marker).await?.is_empty() {
                    return Ok(Some(format!("login form ({marker}) shown at {current}")));
                }
            }
        }
        debug!(target: "session", url = %current, "session accepted");
        Ok(None)
    }
}

/// Host part of an absolute URL; `None` for anything unparseable.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()?
        .host_str()
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::fake::{FakeNode, FakePage};

    #[test]
    fn host_is_extracted() {
        assert_eq!(host_of("https://Login.Example.com:8443/sso?x=1").as_deref(), Some("login.example.com"));
        assert_eq!(host_of("about:blank"), None);
    }

    #[tokio::test]
    async fn redirect_to_login_host_is_rejection() {
        let page = FakePage::new("https://login.example.com/sso?redirect=ops");
        let check = SessionCheck::new(Some("login.example.com".into()), None);
        assert!(check.rejected(&page).await.unwrap().is_some());

        let page = FakePage::new("https://ops.example.com/sign");
        assert!(check.rejected(&page).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn login_marker_is_rejection() {
        let page = FakePage::new("https://ops.example.com/sign");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(&main, None, FakeNode::input().matches("#account"));
        });
        let check = SessionCheck::new(None, Some(AnchorDescriptor::css("#account")));
        let reason = check.rejected(&page).await.unwrap().unwrap();
        assert!(reason.contains("#account"), "{reason}");
    }
}
