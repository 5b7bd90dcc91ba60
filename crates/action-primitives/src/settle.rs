//! Best-effort network settling after actions that trigger requests.

use std::time::Duration;

use cdp_adapter::{AdapterError, BrowserPage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// How long the network must stay quiet.
    pub quiet_ms: u64,
    pub timeout_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            quiet_ms: 500,
            timeout_ms: 10_000,
        }
    }
}

/// Wait for the network to go quiet. A page that never settles is logged and
/// tolerated; only fatal page faults are returned.
pub async fn settle(page: &dyn BrowserPage, policy: &SettlePolicy) -> Result<(), AdapterError> {
    match page
        .wait_network_idle(
            Duration::from_millis(policy.quiet_ms),
            Duration::from_millis(policy.timeout_ms),
        )
        .await
    {
        Ok(()) => {
            debug!(target: "settle", quiet_ms = policy.quiet_ms, "network quiet");
            Ok(())
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(target: "settle", %err, "network did not settle; continuing");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::fake::FakePage;

    #[tokio::test]
    async fn settle_surfaces_only_fatal_faults() {
        let page = FakePage::new("about:blank");
        settle(&page, &SettlePolicy::default()).await.unwrap();

        page.crash();
        let err = settle(&page, &SettlePolicy::default()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
