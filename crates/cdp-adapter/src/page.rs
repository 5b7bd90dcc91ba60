use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashprobe_core_types::SerializedState;
use serde_json::{json, Number, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use crate::anchor::AnchorDescriptor;
use crate::browser::PageSignals;
use crate::config::CdpConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::script;
use crate::surface::{BrowserPage, ElementRef, FrameInfo, FrameRef};
use crate::transport::{CdpTransport, CommandTarget};

const WORLD_NAME: &str = "dashprobe";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One Chromium tab behind a flattened CDP session.
pub struct CdpPage {
    cfg: CdpConfig,
    transport: Arc<dyn CdpTransport>,
    target_id: String,
    session_id: String,
    signals: Arc<PageSignals>,
}

impl CdpPage {
    pub(crate) fn new(
        cfg: CdpConfig,
        transport: Arc<dyn CdpTransport>,
        target_id: String,
        session_id: String,
        signals: Arc<PageSignals>,
    ) -> Self {
        Self {
            cfg,
            transport,
            target_id,
            session_id,
            signals,
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub(crate) async fn enable(&self) -> Result<(), AdapterError> {
        self.send("Page.enable", json!({})).await?;
        self.send("Network.enable", json!({})).await?;
        self.send("Inspector.enable", json!({})).await?;
        self.send(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": self.cfg.viewport.width,
                "height": self.cfg.viewport.height,
                "deviceScaleFactor": 0,
                "mobile": false,
            }),
        )
        .await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<(), AdapterError> {
        self.transport
            .send_command(
                CommandTarget::Browser,
                "Target.closeTarget",
                json!({ "targetId": self.target_id }),
            )
            .await
            .map(|_| ())
    }

    async fn send(&self, method: &str, params: Value) -> Result<Value, AdapterError> {
        if let Some(fault) = self.signals.fault() {
            return Err(fault);
        }
        let result = self
            .transport
            .send_command(CommandTarget::Session(self.session_id.clone()), method, params)
            .await;
        match result {
            Err(err) if !err.is_fatal() => match self.signals.fault() {
                Some(fault) => Err(fault),
                None => Err(err),
            },
            other => other,
        }
    }

    async fn isolated_world(&self, frame: &FrameRef) -> Result<i64, AdapterError> {
        if let Some(context) = self.signals.contexts.get(&frame.0) {
            return Ok(*context);
        }
        let response = self
            .send(
                "Page.createIsolatedWorld",
                json!({
                    "frameId": frame.0,
                    "worldName": WORLD_NAME,
                    "grantUniveralAccess": true,
                }),
            )
            .await?;
        let context = response
            .get("executionContextId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal)
                    .with_hint("createIsolatedWorld missing executionContextId")
            })?;
        self.signals.contexts.insert(frame.0.clone(), context);
        Ok(context)
    }

    async fn evaluate_in(&self, context: Option<i64>, expression: &str) -> Result<Value, AdapterError> {
        let mut params = json!({
            "expression": expression,
            "returnByValue": true,
        });
        if let Some(id) = context {
            params["contextId"] = json!(id);
        }
        let response = self.send("Runtime.evaluate", params).await?;
        if let Some(details) = response.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|exc| exc.get("description"))
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script exception");
            return Err(AdapterError::new(AdapterErrorKind::Script).with_hint(text.to_string()));
        }
        Ok(response
            .get("result")
            .and_then(|res| res.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Run one page helper in the frame's isolated world. A world that
    /// vanished with a navigation is recreated once.
    async fn helper(&self, frame: &FrameRef, op: &str, args: Value) -> Result<Value, AdapterError> {
        let expression = script::call(op, &args);
        let mut recreated = false;
        loop {
            let context = self.isolated_world(frame).await?;
            match self.evaluate_in(Some(context), &expression).await {
                Ok(value) => return script::outcome(op, value),
                Err(err) if err.kind == AdapterErrorKind::StaleHandle && !recreated => {
                    debug!(target: "cdp-page", frame = %frame, op, "isolated world gone; recreating");
                    self.signals.contexts.remove(&frame.0);
                    recreated = true;
                }
                Err(err) => {
                    if err.kind == AdapterErrorKind::StaleHandle {
                        self.signals.contexts.remove(&frame.0);
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn wait_for_dom_ready(&self, deadline: Instant) -> Result<(), AdapterError> {
        loop {
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint("document did not reach readyState interactive"));
            }

            let ready = match self.evaluate_in(None, "document.readyState").await {
                Ok(value) => value
                    .as_str()
                    .map(|state| matches!(state, "interactive" | "complete"))
                    .unwrap_or(false),
                Err(err) if err.is_transient() || err.kind == AdapterErrorKind::Script => false,
                Err(err) => return Err(err),
            };

            if ready {
                return Ok(());
            }

            sleep(POLL_INTERVAL).await;
        }
    }

    async fn frame_tree(&self) -> Result<Vec<FrameInfo>, AdapterError> {
        let response = self.send("Page.getFrameTree", json!({})).await?;
        let tree = response.get("frameTree").ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint("getFrameTree missing frameTree")
        })?;
        let mut frames = Vec::new();
        flatten_frame_tree(tree, &mut frames);
        Ok(frames)
    }

    /// Offset of the frame's viewport inside the top-level viewport.
    async fn frame_offset(&self, frame: &FrameRef) -> Result<(f64, f64), AdapterError> {
        let frames = self.frame_tree().await?;
        let mut offset = (0.0, 0.0);
        let mut current = frames.iter().find(|info| &info.frame == frame).cloned().ok_or_else(|| {
            AdapterError::stale(format!("frame {frame} no longer in frame tree"))
        })?;

        while let Some(parent) = current.parent.clone() {
            let owner = self
                .send("DOM.getFrameOwner", json!({ "frameId": current.frame.0 }))
                .await?;
            let backend = owner.get("backendNodeId").and_then(Value::as_i64).ok_or_else(|| {
                AdapterError::new(AdapterErrorKind::Internal).with_hint("getFrameOwner missing backendNodeId")
            })?;
            let model = self
                .send("DOM.getBoxModel", json!({ "backendNodeId": backend }))
                .await?;
            let content = model
                .get("model")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AdapterError::new(AdapterErrorKind::Internal).with_hint("getBoxModel missing content quad")
                })?;
            let x = content.first().and_then(Value::as_f64).unwrap_or(0.0);
            let y = content.get(1).and_then(Value::as_f64).unwrap_or(0.0);
            offset.0 += x;
            offset.1 += y;

            current = frames
                .iter()
                .find(|info| info.frame == parent)
                .cloned()
                .ok_or_else(|| AdapterError::stale(format!("parent frame {parent} vanished")))?;
        }
        Ok(offset)
    }

    async fn mouse_click(&self, x: f64, y: f64) -> Result<(), AdapterError> {
        self.send(
            "Input.dispatchMouseEvent",
            json!({ "type": "mouseMoved", "x": x, "y": y }),
        )
        .await?;
        for kind in ["mousePressed", "mouseReleased"] {
            self.send(
                "Input.dispatchMouseEvent",
                json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "buttons": 1,
                    "clickCount": 1,
                    "pointerType": "mouse",
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn key_event(&self, payload: Value) -> Result<(), AdapterError> {
        self.send("Input.dispatchKeyEvent", payload).await.map(|_| ())
    }
}

fn flatten_frame_tree(node: &Value, out: &mut Vec<FrameInfo>) {
    if let Some(frame) = node.get("frame") {
        let id = frame.get("id").and_then(Value::as_str).unwrap_or_default();
        out.push(FrameInfo {
            frame: FrameRef(id.to_string()),
            name: frame
                .get("name")
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            url: frame
                .get("url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            parent: frame
                .get("parentId")
                .and_then(Value::as_str)
                .map(|id| FrameRef(id.to_string())),
        });
    }
    if let Some(children) = node.get("childFrames").and_then(Value::as_array) {
        for child in children {
            flatten_frame_tree(child, out);
        }
    }
}

/// `(key, code, windowsVirtualKeyCode, char text)` for the named keys the
/// query plans press.
fn key_definition(key: &str) -> Option<(&'static str, &'static str, i64, Option<&'static str>)> {
    match key {
        "Enter" => Some(("Enter", "Enter", 13, Some("\r"))),
        "Tab" => Some(("Tab", "Tab", 9, None)),
        "Escape" => Some(("Escape", "Escape", 27, None)),
        "Backspace" => Some(("Backspace", "Backspace", 8, None)),
        _ => None,
    }
}

fn cookie_param(cookie: &Value) -> Option<Value> {
    let name = cookie.get("name").and_then(Value::as_str)?;
    let value = cookie.get("value").and_then(Value::as_str)?;
    let mut map = serde_json::Map::new();
    map.insert("name".into(), Value::String(name.to_string()));
    map.insert("value".into(), Value::String(value.to_string()));
    for key in ["domain", "path", "url", "sameSite"] {
        if let Some(text) = cookie.get(key).and_then(Value::as_str) {
            map.insert(key.into(), Value::String(text.to_string()));
        }
    }
    // Session cookies carry expires = -1 and must be sent without it.
    if let Some(expires) = cookie.get("expires").and_then(Value::as_f64) {
        if expires > 0.0 {
            if let Some(number) = Number::from_f64(expires) {
                map.insert("expires".into(), Value::Number(number));
            }
        }
    }
    for key in ["httpOnly", "secure"] {
        if let Some(flag) = cookie.get(key).and_then(Value::as_bool) {
            map.insert(key.into(), Value::Bool(flag));
        }
    }
    Some(Value::Object(map))
}

#[async_trait]
impl BrowserPage for CdpPage {
    #[instrument(skip(self), fields(session = %self.session_id))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        let response = self.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(error) = response
            .get("errorText")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            return Err(AdapterError::new(AdapterErrorKind::NavFailed)
                .with_hint(format!("{url}: {error}"))
                .retriable(true));
        }
        self.signals.contexts.clear();
        self.wait_for_dom_ready(deadline).await
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let frames = self.frame_tree().await?;
        frames
            .into_iter()
            .find(FrameInfo::is_main)
            .map(|info| info.url)
            .ok_or_else(|| AdapterError::new(AdapterErrorKind::Internal).with_hint("no main frame"))
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>, AdapterError> {
        self.frame_tree().await
    }

    async fn query(
        &self,
        frame: &FrameRef,
        scope: Option<&ElementRef>,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, AdapterError> {
        let value = self
            .helper(
                frame,
                "query",
                json!({ "scope": scope.map(|el| el.0.clone()), "anchor": anchor }),
            )
            .await?;
        let refs = value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|id| ElementRef(id.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(refs)
    }

    async fn closest(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
        css: &str,
    ) -> Result<Option<ElementRef>, AdapterError> {
        let value = self
            .helper(frame, "closest", json!({ "element": element.0, "css": css }))
            .await?;
        Ok(value.as_str().map(|id| ElementRef(id.to_string())))
    }

    async fn read_text(&self, frame: &FrameRef, element: &ElementRef) -> Result<String, AdapterError> {
        let value = self.helper(frame, "text", json!({ "element": element.0 })).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn read_value(&self, frame: &FrameRef, element: &ElementRef) -> Result<String, AdapterError> {
        let value = self.helper(frame, "value", json!({ "element": element.0 })).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_interactable(&self, frame: &FrameRef, element: &ElementRef) -> Result<bool, AdapterError> {
        let value = self
            .helper(frame, "interactable", json!({ "element": element.0 }))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn fill(&self, frame: &FrameRef, element: &ElementRef, value: &str) -> Result<(), AdapterError> {
        self.helper(frame, "fill", json!({ "element": element.0, "value": value }))
            .await
            .map(|_| ())
    }

    async fn type_text(&self, frame: &FrameRef, element: &ElementRef, text: &str) -> Result<(), AdapterError> {
        self.helper(frame, "clear", json!({ "element": element.0 })).await?;
        let delay = Duration::from_millis(self.cfg.keystroke_delay_ms);
        for ch in text.chars() {
            let key = ch.to_string();
            self.key_event(json!({ "type": "keyDown", "text": key, "unmodifiedText": key, "key": key }))
                .await?;
            self.key_event(json!({ "type": "keyUp", "key": key })).await?;
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn click(&self, frame: &FrameRef, element: &ElementRef) -> Result<(), AdapterError> {
        let center = self.helper(frame, "center", json!({ "element": element.0 })).await?;
        let x = center.get("x").and_then(Value::as_f64);
        let y = center.get("y").and_then(Value::as_f64);
        let (Some(x), Some(y)) = (x, y) else {
            return Err(AdapterError::new(AdapterErrorKind::Internal).with_hint("element center unavailable"));
        };

        match self.frame_offset(frame).await {
            Ok((dx, dy)) => self.mouse_click(x + dx, y + dy).await,
            Err(err) if !err.is_fatal() => {
                warn!(target: "cdp-page", frame = %frame, ?err, "frame offset unavailable; synthetic click");
                self.helper(frame, "click", json!({ "element": element.0 }))
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    async fn press_key(&self, frame: &FrameRef, element: Option<&ElementRef>, key: &str) -> Result<(), AdapterError> {
        if let Some(element) = element {
            self.helper(frame, "focus", json!({ "element": element.0 })).await?;
        }
        let (name, code, vk, text) = key_definition(key).ok_or_else(|| {
            AdapterError::new(AdapterErrorKind::Internal).with_hint(format!("unsupported key {key}"))
        })?;
        self.key_event(json!({
            "type": "rawKeyDown",
            "key": name,
            "code": code,
            "windowsVirtualKeyCode": vk,
            "nativeVirtualKeyCode": vk,
        }))
        .await?;
        if let Some(text) = text {
            self.key_event(json!({ "type": "char", "text": text, "key": name }))
                .await?;
        }
        self.key_event(json!({
            "type": "keyUp",
            "key": name,
            "code": code,
            "windowsVirtualKeyCode": vk,
            "nativeVirtualKeyCode": vk,
        }))
        .await
    }

    async fn wait_network_idle(&self, quiet_window: Duration, timeout: Duration) -> Result<(), AdapterError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(fault) = self.signals.fault() {
                return Err(fault);
            }
            if self.signals.inflight() == 0 && self.signals.quiet_for() >= quiet_window {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AdapterError::new(AdapterErrorKind::NavTimeout)
                    .with_hint(format!("{} requests still in flight", self.signals.inflight())));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn storage_state(&self) -> Result<SerializedState, AdapterError> {
        let response = self.send("Network.getAllCookies", json!({})).await?;
        let cookies = response
            .get("cookies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(SerializedState::from_cookies(cookies))
    }

    async fn apply_storage_state(&self, state: &SerializedState) -> Result<(), AdapterError> {
        let payload: Vec<Value> = state.cookies().iter().filter_map(cookie_param).collect();
        if payload.is_empty() {
            return Ok(());
        }
        self.send("Network.setCookies", json!({ "cookies": payload }))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportEvent;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct MockTransport {
        commands: Mutex<Vec<(String, Value)>>,
        responses: Mutex<VecDeque<Result<Value, AdapterError>>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                commands: Mutex::new(Vec::new()),
                responses: Mutex::new(VecDeque::new()),
            })
        }

        async fn push(&self, value: Value) {
            self.responses.lock().await.push_back(Ok(value));
        }

        async fn push_err(&self, err: AdapterError) {
            self.responses.lock().await.push_back(Err(err));
        }

        async fn methods(&self) -> Vec<String> {
            self.commands.lock().await.iter().map(|(m, _)| m.clone()).collect()
        }
    }

    #[async_trait]
    impl CdpTransport for MockTransport {
        async fn start(&self) -> Result<(), AdapterError> {
            Ok(())
        }

        async fn next_event(&self) -> Option<TransportEvent> {
            None
        }

        async fn send_command(
            &self,
            _target: CommandTarget,
            method: &str,
            params: Value,
        ) -> Result<Value, AdapterError> {
            self.commands.lock().await.push((method.to_string(), params));
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
    }

    fn page(transport: Arc<MockTransport>) -> (CdpPage, Arc<PageSignals>) {
        let signals = Arc::new(PageSignals::new());
        let mut cfg = CdpConfig::default();
        cfg.keystroke_delay_ms = 0;
        (
            CdpPage::new(cfg, transport, "T1".into(), "S1".into(), signals.clone()),
            signals,
        )
    }

    #[test]
    fn frame_tree_flattens_in_document_order() {
        let tree = json!({
            "frame": { "id": "main", "url": "https://ops.example.com/report" },
            "childFrames": [
                {
                    "frame": { "id": "a", "parentId": "main", "name": "nav", "url": "about:blank" },
                    "childFrames": [
                        { "frame": { "id": "a1", "parentId": "a", "url": "https://x" } }
                    ]
                },
                { "frame": { "id": "b", "parentId": "main", "name": "", "url": "https://sls.example.com/dashboard" } }
            ]
        });
        let mut frames = Vec::new();
        flatten_frame_tree(&tree, &mut frames);
        let ids: Vec<_> = frames.iter().map(|f| f.frame.0.as_str()).collect();
        assert_eq!(ids, vec!["main", "a", "a1", "b"]);
        assert!(frames[0].is_main());
        assert_eq!(frames[1].name.as_deref(), Some("nav"));
        assert_eq!(frames[3].name, None);
        assert_eq!(frames[3].host().as_deref(), Some("sls.example.com"));
    }

    #[test]
    fn session_cookies_drop_expiry() {
        let param = cookie_param(&json!({
            "name": "sid", "value": "abc", "domain": ".example.com", "path": "/",
            "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax", "size": 6
        }))
        .unwrap();
        assert!(param.get("expires").is_none());
        assert!(param.get("size").is_none());
        assert_eq!(param["httpOnly"], true);
        assert!(cookie_param(&json!({ "value": "nameless" })).is_none());
    }

    #[tokio::test]
    async fn helper_runs_in_isolated_world_and_caches_it() {
        let transport = MockTransport::new();
        let (page, signals) = page(transport.clone());
        transport.push(json!({ "executionContextId": 42 })).await;
        transport
            .push(json!({ "result": { "value": { "ok": ["r-1", "r-2"] } } }))
            .await;
        transport.push(json!({ "result": { "value": { "ok": "hello" } } })).await;

        let frame = FrameRef("F".into());
        let found = page
            .query(&frame, None, &AnchorDescriptor::css("#PartnerId"))
            .await
            .unwrap();
        assert_eq!(found, vec![ElementRef("r-1".into()), ElementRef("r-2".into())]);
        let text = page.read_text(&frame, &found[0]).await.unwrap();
        assert_eq!(text, "hello");

        let methods = transport.methods().await;
        assert_eq!(
            methods,
            vec!["Page.createIsolatedWorld", "Runtime.evaluate", "Runtime.evaluate"]
        );
        assert_eq!(signals.contexts.get("F").map(|c| *c), Some(42));
    }

    #[tokio::test]
    async fn vanished_world_is_recreated_once() {
        let transport = MockTransport::new();
        let (page, _signals) = page(transport.clone());
        transport.push(json!({ "executionContextId": 1 })).await;
        transport
            .push_err(AdapterError::stale("Cannot find context with specified id"))
            .await;
        transport.push(json!({ "executionContextId": 2 })).await;
        transport.push(json!({ "result": { "value": { "ok": "v" } } })).await;

        let value = page
            .read_value(&FrameRef("F".into()), &ElementRef("r".into()))
            .await
            .unwrap();
        assert_eq!(value, "v");
        let methods = transport.methods().await;
        assert_eq!(methods.iter().filter(|m| *m == "Page.createIsolatedWorld").count(), 2);
    }

    #[tokio::test]
    async fn stale_element_surfaces_as_stale_handle() {
        let transport = MockTransport::new();
        let (page, _signals) = page(transport.clone());
        transport.push(json!({ "executionContextId": 1 })).await;
        transport.push(json!({ "result": { "value": { "stale": true } } })).await;

        let err = page
            .click(&FrameRef("F".into()), &ElementRef("gone".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::StaleHandle);
    }

    #[tokio::test]
    async fn crashed_page_rejects_commands() {
        let transport = MockTransport::new();
        let (page, signals) = page(transport.clone());
        signals.mark_crashed();
        let err = page.current_url().await.unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::PageCrashed);
        assert!(transport.methods().await.is_empty());
    }

    #[tokio::test]
    async fn navigate_reports_net_errors() {
        let transport = MockTransport::new();
        let (page, _signals) = page(transport.clone());
        transport
            .push(json!({ "frameId": "main", "errorText": "net::ERR_NAME_NOT_RESOLVED" }))
            .await;
        let err = page
            .navigate("https://nowhere.invalid", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::NavFailed);
    }

    #[tokio::test]
    async fn press_enter_sends_char_event() {
        let transport = MockTransport::new();
        let (page, _signals) = page(transport.clone());
        page.press_key(&FrameRef("F".into()), None, "Enter").await.unwrap();
        let commands = transport.commands.lock().await.clone();
        let types: Vec<_> = commands
            .iter()
            .map(|(_, params)| params["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(types, vec!["rawKeyDown", "char", "keyUp"]);
    }

    #[tokio::test]
    async fn storage_state_round_trips_cookie_jar() {
        let transport = MockTransport::new();
        let (page, _signals) = page(transport.clone());
        transport
            .push(json!({ "cookies": [{ "name": "sid", "value": "1", "domain": "a", "path": "/", "expires": -1 }] }))
            .await;
        let state = page.storage_state().await.unwrap();
        assert!(state.is_well_formed());

        page.apply_storage_state(&state).await.unwrap();
        let commands = transport.commands.lock().await.clone();
        let (method, params) = commands.last().unwrap();
        assert_eq!(method, "Network.setCookies");
        assert_eq!(params["cookies"][0]["name"], "sid");
    }
}
