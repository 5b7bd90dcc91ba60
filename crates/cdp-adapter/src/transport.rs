//! One DevTools websocket, either to a Chromium we launched or to one already
//! running at `websocket_url`. A background pump owns the socket; callers talk
//! to it through a command channel and get replies on oneshots.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::async_process::Child;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::target::SessionId as CdpSessionId;
use chromiumoxide::cdp::events::CdpEventMessage;
use chromiumoxide::conn::Connection;
use chromiumoxide::error::CdpError;
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Message, MethodId, Response};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::util::extract_ws_url;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const HEARTBEAT_REPLY_CEILING: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct TransportEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug)]
pub enum CommandTarget {
    Browser,
    Session(String),
}

/// Raw protocol access. [`CdpBrowser`](crate::CdpBrowser) and
/// [`CdpPage`](crate::CdpPage) are written against this so they can be
/// exercised with a scripted transport.
#[async_trait]
pub trait CdpTransport: Send + Sync {
    async fn start(&self) -> Result<(), AdapterError>;
    async fn next_event(&self) -> Option<TransportEvent>;
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError>;
}

type Reply = oneshot::Sender<Result<Value, AdapterError>>;

struct Outgoing {
    target: CommandTarget,
    method: String,
    params: Value,
    reply: Reply,
}

pub struct ChromiumTransport {
    deadline: Duration,
    commands: mpsc::Sender<Outgoing>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    connected: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
    child: Mutex<Option<Child>>,
}

impl ChromiumTransport {
    /// Launch (or attach), open the websocket and start the pump.
    pub async fn connect(cfg: &CdpConfig) -> Result<Self, AdapterError> {
        let (child, ws_url) = match &cfg.websocket_url {
            Some(url) => (None, url.clone()),
            None => {
                let mut child = launch_options(cfg)?.launch().map_err(|err| {
                    AdapterError::new(AdapterErrorKind::Internal)
                        .with_hint(format!("failed to launch chromium: {err}"))
                })?;
                let ws_url = extract_ws_url(&mut child).await?;
                (Some(child), ws_url)
            }
        };

        let conn = Connection::<CdpEventMessage>::connect(&ws_url)
            .await
            .map_err(|err| {
                AdapterError::new(AdapterErrorKind::CdpIo).with_hint(format!("connecting to {ws_url}: {err}"))
            })?;

        let (commands, command_rx) = mpsc::channel(128);
        let (event_tx, events) = mpsc::channel(512);
        let connected = Arc::new(AtomicBool::new(true));
        let deadline = Duration::from_millis(cfg.default_deadline_ms);

        let mut tasks = Vec::with_capacity(2);
        let pump_flag = connected.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = Pump::new(conn, command_rx, event_tx).run().await;
            pump_flag.store(false, Ordering::SeqCst);
            match outcome {
                Ok(()) => debug!(target: "cdp-transport", "devtools websocket closed"),
                Err(err) => warn!(target: "cdp-transport", ?err, "devtools connection lost"),
            }
        }));
        if let Some(heartbeat) = spawn_heartbeat(
            commands.clone(),
            connected.clone(),
            Duration::from_millis(cfg.heartbeat_interval_ms),
            deadline,
        ) {
            tasks.push(heartbeat);
        }

        info!(
            target: "cdp-transport",
            url = %ws_url,
            launched = child.is_some(),
            "devtools connection established"
        );

        Ok(Self {
            deadline,
            commands,
            events: Mutex::new(events),
            connected,
            tasks,
            child: Mutex::new(child),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn call(&self, target: CommandTarget, method: &str, params: Value) -> Result<Value, AdapterError> {
        if !self.is_connected() {
            return Err(closed("devtools connection is gone"));
        }
        request(&self.commands, target, method, params, self.deadline).await
    }
}

#[async_trait]
impl CdpTransport for ChromiumTransport {
    async fn start(&self) -> Result<(), AdapterError> {
        // Target lifecycle events only; pages are attached explicitly.
        self.call(
            CommandTarget::Browser,
            "Target.setDiscoverTargets",
            json!({ "discover": true }),
        )
        .await
        .map(|_| ())
    }

    async fn next_event(&self) -> Option<TransportEvent> {
        self.events.lock().await.recv().await
    }

    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value, AdapterError> {
        self.call(target, method, params).await
    }
}

impl Drop for ChromiumTransport {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        for task in &self.tasks {
            task.abort();
        }
        let Some(mut child) = self.child.get_mut().take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = child.kill().await {
                        warn!(target: "cdp-transport", ?err, "failed to kill chromium");
                    }
                });
            }
            Err(_) => debug!(target: "cdp-transport", "no runtime left to reap chromium"),
        }
    }
}

fn closed(hint: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::ConnectionClosed).with_hint(hint)
}

async fn request(
    commands: &mpsc::Sender<Outgoing>,
    target: CommandTarget,
    method: &str,
    params: Value,
    deadline: Duration,
) -> Result<Value, AdapterError> {
    let (reply, answer) = oneshot::channel();
    commands
        .send(Outgoing {
            target,
            method: method.to_string(),
            params,
            reply,
        })
        .await
        .map_err(|_| closed("command channel closed"))?;

    match timeout(deadline, answer).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(closed(format!("{method}: reply dropped before the browser answered"))),
        Err(_) => Err(AdapterError::new(AdapterErrorKind::NavTimeout)
            .with_hint(format!("{method} got no reply within {}ms", deadline.as_millis()))),
    }
}

/// Periodic `Browser.getVersion`; the first miss marks the connection gone.
fn spawn_heartbeat(
    commands: mpsc::Sender<Outgoing>,
    connected: Arc<AtomicBool>,
    every: Duration,
    deadline: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    let deadline = deadline.min(HEARTBEAT_REPLY_CEILING);

    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        while connected.load(Ordering::SeqCst) {
            ticker.tick().await;
            let probe = request(
                &commands,
                CommandTarget::Browser,
                "Browser.getVersion",
                json!({}),
                deadline,
            )
            .await;
            if let Err(err) = probe {
                warn!(target: "cdp-transport", ?err, "heartbeat failed; browser considered gone");
                connected.store(false, Ordering::SeqCst);
                break;
            }
        }
    }))
}

struct Pump {
    conn: Connection<CdpEventMessage>,
    commands: mpsc::Receiver<Outgoing>,
    events: mpsc::Sender<TransportEvent>,
    pending: HashMap<CallId, Reply>,
}

impl Pump {
    fn new(
        conn: Connection<CdpEventMessage>,
        commands: mpsc::Receiver<Outgoing>,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        Self {
            conn,
            commands,
            events,
            pending: HashMap::new(),
        }
    }

    async fn run(mut self) -> Result<(), AdapterError> {
        loop {
            tokio::select! {
                Some(outgoing) = self.commands.recv() => self.submit(outgoing),
                message = self.conn.next() => match message {
                    Some(Ok(Message::Response(response))) => self.settle(response),
                    Some(Ok(Message::Event(event))) => self.forward(event).await,
                    Some(Err(err)) => {
                        let err = map_cdp_error(err);
                        self.fail_pending(&err);
                        return Err(err);
                    }
                    None => {
                        self.fail_pending(&closed("devtools websocket closed"));
                        return Ok(());
                    }
                },
            }
        }
    }

    fn submit(&mut self, outgoing: Outgoing) {
        let session = match outgoing.target {
            CommandTarget::Browser => None,
            CommandTarget::Session(id) => Some(CdpSessionId::from(id)),
        };
        let method: MethodId = outgoing.method.clone().into();
        match self.conn.submit_command(method, session, outgoing.params) {
            Ok(call_id) => {
                self.pending.insert(call_id, outgoing.reply);
            }
            Err(err) => {
                let err = AdapterError::new(AdapterErrorKind::CdpIo)
                    .with_hint(format!("submitting {}: {err}", outgoing.method));
                let _ = outgoing.reply.send(Err(err));
            }
        }
    }

    fn settle(&mut self, response: Response) {
        match self.pending.remove(&response.id) {
            Some(reply) => {
                let _ = reply.send(response_payload(response));
            }
            None => debug!(target: "cdp-transport", "reply for unknown call dropped"),
        }
    }

    async fn forward(&mut self, event: CdpEventMessage) {
        let raw: CdpJsonEventMessage = match event.try_into() {
            Ok(raw) => raw,
            Err(err) => {
                debug!(target: "cdp-transport", %err, "undecodable event dropped");
                return;
            }
        };
        let event = TransportEvent {
            method: raw.method.into_owned(),
            params: raw.params,
            session_id: raw.session_id,
        };
        if self.events.send(event).await.is_err() {
            debug!(target: "cdp-transport", "event receiver gone");
        }
    }

    fn fail_pending(&mut self, err: &AdapterError) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(err.clone()));
        }
    }
}

fn response_payload(response: Response) -> Result<Value, AdapterError> {
    match (response.result, response.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(classify_protocol_error(error.code, &error.message)),
        (None, None) => Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("empty cdp response")),
    }
}

fn map_cdp_error(err: CdpError) -> AdapterError {
    let hint = err.to_string();
    match err {
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => closed(hint),
        CdpError::Timeout => AdapterError::new(AdapterErrorKind::NavTimeout).with_hint(hint),
        CdpError::FrameNotFound(_) => AdapterError::stale(hint),
        CdpError::JavascriptException(_) => AdapterError::new(AdapterErrorKind::Script).with_hint(hint),
        CdpError::Serde(_) => AdapterError::new(AdapterErrorKind::Internal).with_hint(hint),
        _ => AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(hint)
            .retriable(true),
    }
}

/// Map a protocol-level error reply onto the adapter taxonomy. Replies naming
/// a vanished frame, node or execution context mean the handle went stale.
pub(crate) fn classify_protocol_error(code: i64, message: &str) -> AdapterError {
    let hint = format!("cdp error {code}: {message}");
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find context")
        || lower.contains("execution context was destroyed")
        || lower.contains("no frame")
        || lower.contains("frame with the given id was not found")
        || lower.contains("no node")
        || lower.contains("could not find node")
    {
        return AdapterError::stale(hint);
    }
    if lower.contains("target closed") || lower.contains("session with given id not found") {
        return closed(hint);
    }
    AdapterError::new(AdapterErrorKind::CdpIo)
        .with_hint(hint)
        .retriable(code >= 500)
}

/// Command-line switches for a dashboard session. Report iframes must share
/// the page process so one flattened session reaches every frame.
fn chromium_args(headless: bool) -> Vec<&'static str> {
    let mut args = vec![
        "--disable-background-networking",
        "--disable-background-timer-throttling",
        "--disable-breakpad",
        "--disable-component-update",
        "--disable-default-apps",
        "--disable-dev-shm-usage",
        "--disable-extensions",
        "--disable-popup-blocking",
        "--disable-sync",
        "--no-first-run",
        "--no-default-browser-check",
        "--password-store=basic",
        "--remote-allow-origins=*",
        "--use-mock-keychain",
        "--disable-features=site-per-process,IsolateOrigins",
        "--disable-site-isolation-trials",
    ];
    if headless {
        args.extend(["--headless=new", "--hide-scrollbars", "--mute-audio"]);
    }
    args
}

fn profile_dir(cfg: &CdpConfig) -> Result<PathBuf, AdapterError> {
    if cfg.user_data_dir.is_absolute() {
        return Ok(cfg.user_data_dir.clone());
    }
    let cwd = std::env::current_dir().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("resolving profile directory: {err}"))
    })?;
    Ok(cwd.join(&cfg.user_data_dir))
}

fn launch_options(cfg: &CdpConfig) -> Result<BrowserConfig, AdapterError> {
    let has_executable = !cfg.executable.as_os_str().is_empty();
    if has_executable && !cfg.executable.exists() {
        return Err(AdapterError::new(AdapterErrorKind::CdpIo)
            .with_hint(format!("chrome executable not found at {}", cfg.executable.display()))
            .with_data(json!({
                "expected": cfg.executable,
                "hint": "Set DASHPROBE_CHROME or BROWSER_CHANNEL to a Chromium-family browser.",
            })));
    }

    let profile = profile_dir(cfg)?;
    fs::create_dir_all(&profile).map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal)
            .with_hint(format!("creating profile directory {}: {err}", profile.display()))
    })?;

    let mut builder = BrowserConfig::builder()
        .request_timeout(Duration::from_millis(cfg.default_deadline_ms))
        .launch_timeout(LAUNCH_TIMEOUT)
        .window_size(cfg.viewport.width, cfg.viewport.height)
        .args(chromium_args(cfg.headless))
        .user_data_dir(profile);
    if !cfg.headless {
        builder = builder.with_head();
    }
    if cfg.no_sandbox {
        builder = builder.no_sandbox();
    }
    if has_executable {
        builder = builder.chrome_executable(cfg.executable.clone());
    }

    builder.build().map_err(|err| {
        AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("browser config error: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_for_vanished_contexts_are_stale() {
        let err = classify_protocol_error(-32000, "Cannot find context with specified id");
        assert_eq!(err.kind, AdapterErrorKind::StaleHandle);
        assert!(err.is_transient());

        let err = classify_protocol_error(-32000, "No frame for given id found");
        assert_eq!(err.kind, AdapterErrorKind::StaleHandle);
    }

    #[test]
    fn closed_sessions_are_fatal() {
        let err = classify_protocol_error(-32001, "Session with given id not found.");
        assert!(err.is_fatal());
    }

    #[test]
    fn other_protocol_errors_stay_io() {
        let err = classify_protocol_error(-32602, "Invalid parameters");
        assert_eq!(err.kind, AdapterErrorKind::CdpIo);
        assert!(!err.retriable);
    }

    #[test]
    fn launch_keeps_frames_in_process() {
        let headed = chromium_args(false);
        assert!(headed.contains(&"--disable-site-isolation-trials"));
        assert!(!headed.contains(&"--headless=new"));
        assert!(chromium_args(true).contains(&"--headless=new"));
    }

    #[test]
    fn relative_profile_resolves_against_cwd() {
        let cfg = CdpConfig {
            user_data_dir: PathBuf::from("profile-x"),
            ..CdpConfig::default()
        };
        let resolved = profile_dir(&cfg).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("profile-x"));
    }

    #[tokio::test]
    async fn closed_command_channel_is_fatal() {
        let (commands, receiver) = mpsc::channel(1);
        drop(receiver);
        let err = request(&commands, CommandTarget::Browser, "Page.enable", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn dropped_reply_is_fatal() {
        let (commands, mut receiver) = mpsc::channel::<Outgoing>(1);
        tokio::spawn(async move {
            drop(receiver.recv().await);
        });
        let err = request(&commands, CommandTarget::Browser, "Page.enable", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::ConnectionClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_command_times_out() {
        let (commands, mut receiver) = mpsc::channel::<Outgoing>(1);
        let holder = tokio::spawn(async move {
            let held = receiver.recv().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(held);
        });
        let err = request(
            &commands,
            CommandTarget::Session("S1".into()),
            "Runtime.evaluate",
            json!({}),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NavTimeout);
        assert!(err.hint.unwrap_or_default().contains("Runtime.evaluate"));
        holder.abort();
    }
}
