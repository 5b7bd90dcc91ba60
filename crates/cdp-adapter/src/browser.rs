use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::page::CdpPage;
use crate::transport::{CdpTransport, ChromiumTransport, CommandTarget, TransportEvent};

/// Liveness and network bookkeeping for one attached page session, fed by the
/// browser's event pump.
pub(crate) struct PageSignals {
    inflight: Mutex<HashSet<String>>,
    last_activity: Mutex<Instant>,
    crashed: AtomicBool,
    closed: AtomicBool,
    /// Isolated-world execution context per frame id.
    pub(crate) contexts: DashMap<String, i64>,
}

impl PageSignals {
    pub(crate) fn new() -> Self {
        Self {
            inflight: Mutex::new(HashSet::new()),
            last_activity: Mutex::new(Instant::now()),
            crashed: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            contexts: DashMap::new(),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub(crate) fn request_started(&self, request_id: &str) {
        self.inflight.lock().insert(request_id.to_string());
        self.touch();
    }

    pub(crate) fn request_done(&self, request_id: &str) {
        self.inflight.lock().remove(request_id);
        self.touch();
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inflight.lock().len()
    }

    pub(crate) fn quiet_for(&self) -> std::time::Duration {
        Instant::now().saturating_duration_since(*self.last_activity.lock())
    }

    pub(crate) fn mark_crashed(&self) {
        self.crashed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Fatal page state, if any.
    pub(crate) fn fault(&self) -> Option<AdapterError> {
        if self.crashed.load(Ordering::SeqCst) {
            return Some(AdapterError::new(AdapterErrorKind::PageCrashed).with_hint("renderer crashed"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Some(
                AdapterError::new(AdapterErrorKind::ConnectionClosed).with_hint("page session detached"),
            );
        }
        None
    }
}

/// A Chromium instance driven over one CDP connection.
pub struct CdpBrowser {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    sessions: Arc<DashMap<String, Arc<PageSignals>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl CdpBrowser {
    /// Launch Chromium (or attach to `websocket_url`) and start the event pump.
    pub async fn launch(cfg: CdpConfig) -> Result<Self, AdapterError> {
        let transport: Arc<dyn CdpTransport> = Arc::new(ChromiumTransport::connect(&cfg).await?);
        Self::with_transport(cfg, transport).await
    }

    pub async fn with_transport(
        cfg: CdpConfig,
        transport: Arc<dyn CdpTransport>,
    ) -> Result<Self, AdapterError> {
        transport.start().await?;
        let sessions: Arc<DashMap<String, Arc<PageSignals>>> = Arc::new(DashMap::new());
        let pump = tokio::spawn(Self::pump(transport.clone(), sessions.clone()));
        info!(target: "cdp-browser", attached = cfg.websocket_url.is_some(), "browser ready");
        Ok(Self {
            cfg,
            transport,
            sessions,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Open a blank tab and attach a flattened session to it.
    pub async fn new_page(&self) -> Result<CdpPage, AdapterError> {
        let created = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.createTarget",
                json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("createTarget missing targetId")
            })?
            .to_string();

        let attached = self
            .transport
            .send_command(
                CommandTarget::Browser,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("attachToTarget missing sessionId")
            })?
            .to_string();

        let signals = Arc::new(PageSignals::new());
        self.sessions.insert(session_id.clone(), signals.clone());
        debug!(target: "cdp-browser", %target_id, %session_id, "page attached");

        let page = CdpPage::new(
            self.cfg.clone(),
            self.transport.clone(),
            target_id,
            session_id,
            signals,
        );
        page.enable().await?;
        Ok(page)
    }

    pub async fn shutdown(&self) {
        if let Err(err) = self
            .transport
            .send_command(CommandTarget::Browser, "Browser.close", json!({}))
            .await
        {
            debug!(target: "cdp-browser", ?err, "browser close command failed");
        }
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }

    async fn pump(
        transport: Arc<dyn CdpTransport>,
        sessions: Arc<DashMap<String, Arc<PageSignals>>>,
    ) {
        while let Some(event) = transport.next_event().await {
            Self::dispatch(&sessions, event);
        }
        warn!(target: "cdp-browser", "event stream ended; marking pages closed");
        for entry in sessions.iter() {
            entry.value().mark_closed();
        }
    }

    pub(crate) fn dispatch(sessions: &DashMap<String, Arc<PageSignals>>, event: TransportEvent) {
        if event.method == "Target.detachedFromTarget" {
            if let Some(session) = event.params.get("sessionId").and_then(Value::as_str) {
                if let Some(signals) = sessions.get(session) {
                    signals.mark_closed();
                }
            }
            return;
        }

        let Some(session) = event.session_id.as_deref() else {
            return;
        };
        let Some(signals) = sessions.get(session).map(|entry| entry.value().clone()) else {
            return;
        };

        let request_id = || event.params.get("requestId").and_then(Value::as_str);
        match event.method.as_str() {
            "Network.requestWillBeSent" => {
                if let Some(id) = request_id() {
                    signals.request_started(id);
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = request_id() {
                    signals.request_done(id);
                }
            }
            "Inspector.targetCrashed" => {
                warn!(target: "cdp-browser", %session, "renderer crashed");
                signals.mark_crashed();
            }
            "Inspector.detached" => signals.mark_closed(),
            "Page.frameNavigated" => {
                if let Some(frame_id) = event
                    .params
                    .get("frame")
                    .and_then(|frame| frame.get("id"))
                    .and_then(Value::as_str)
                {
                    signals.contexts.remove(frame_id);
                }
            }
            "Page.frameDetached" => {
                if let Some(frame_id) = event.params.get("frameId").and_then(Value::as_str) {
                    signals.contexts.remove(frame_id);
                }
            }
            _ => {}
        }
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(method: &str, session: Option<&str>, params: Value) -> TransportEvent {
        TransportEvent {
            method: method.to_string(),
            params,
            session_id: session.map(str::to_string),
        }
    }

    #[test]
    fn network_events_track_inflight_requests() {
        let sessions = DashMap::new();
        let signals = Arc::new(PageSignals::new());
        sessions.insert("s1".to_string(), signals.clone());

        CdpBrowser::dispatch(
            &sessions,
            event("Network.requestWillBeSent", Some("s1"), json!({ "requestId": "r1" })),
        );
        // Redirect hops reuse the request id.
        CdpBrowser::dispatch(
            &sessions,
            event("Network.requestWillBeSent", Some("s1"), json!({ "requestId": "r1" })),
        );
        CdpBrowser::dispatch(
            &sessions,
            event("Network.requestWillBeSent", Some("s1"), json!({ "requestId": "r2" })),
        );
        assert_eq!(signals.inflight(), 2);

        CdpBrowser::dispatch(
            &sessions,
            event("Network.loadingFinished", Some("s1"), json!({ "requestId": "r1" })),
        );
        CdpBrowser::dispatch(
            &sessions,
            event("Network.loadingFailed", Some("s1"), json!({ "requestId": "r2" })),
        );
        assert_eq!(signals.inflight(), 0);
    }

    #[test]
    fn crash_and_detach_become_faults() {
        let sessions = DashMap::new();
        let signals = Arc::new(PageSignals::new());
        sessions.insert("s1".to_string(), signals.clone());
        assert!(signals.fault().is_none());

        CdpBrowser::dispatch(&sessions, event("Inspector.targetCrashed", Some("s1"), json!({})));
        let fault = signals.fault().unwrap();
        assert_eq!(fault.kind, AdapterErrorKind::PageCrashed);

        let other = Arc::new(PageSignals::new());
        sessions.insert("s2".to_string(), other.clone());
        CdpBrowser::dispatch(
            &sessions,
            event("Target.detachedFromTarget", None, json!({ "sessionId": "s2" })),
        );
        assert_eq!(other.fault().unwrap().kind, AdapterErrorKind::ConnectionClosed);
    }

    #[test]
    fn frame_navigation_drops_cached_world() {
        let sessions = DashMap::new();
        let signals = Arc::new(PageSignals::new());
        signals.contexts.insert("F1".to_string(), 7);
        signals.contexts.insert("F2".to_string(), 8);
        sessions.insert("s1".to_string(), signals.clone());

        CdpBrowser::dispatch(
            &sessions,
            event("Page.frameNavigated", Some("s1"), json!({ "frame": { "id": "F1" } })),
        );
        CdpBrowser::dispatch(
            &sessions,
            event("Page.frameDetached", Some("s1"), json!({ "frameId": "F2" })),
        );
        assert!(signals.contexts.is_empty());
    }
}
