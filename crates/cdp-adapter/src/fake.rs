//! In-memory page used by the engine's tests.
//!
//! Nodes declare the CSS selectors they answer to rather than being matched
//! by a selector engine, so a scenario states exactly which lookups succeed.
//! Text anchors match a node's own text; `read_text` returns the node's text
//! followed by its descendants' text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashprobe_core_types::SerializedState;
use parking_lot::Mutex;
use serde_json::Value;

use crate::anchor::{normalize_text, AnchorDescriptor};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::surface::{BrowserPage, ElementRef, FrameInfo, FrameRef};

pub type Effect = Arc<dyn Fn(&mut FakeDom) + Send + Sync>;
pub type Transform = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Declarative description of one element.
#[derive(Clone)]
pub struct FakeNode {
    tag: String,
    selectors: Vec<String>,
    role: Option<(String, String)>,
    text: String,
    value: Option<String>,
    visible: bool,
    disabled: bool,
    hidden_probes: u32,
    fill_transform: Option<Transform>,
    type_transform: Option<Transform>,
}

impl FakeNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            selectors: Vec::new(),
            role: None,
            text: String::new(),
            value: None,
            visible: true,
            disabled: false,
            hidden_probes: 0,
            fill_transform: None,
            type_transform: None,
        }
    }

    /// Editable input, value initially empty.
    pub fn input() -> Self {
        Self::new("input").value("")
    }

    pub fn matches(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>, name: impl Into<String>) -> Self {
        self.role = Some((role.into(), name.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    /// Absent from the first `probes` lookups that would have matched it.
    pub fn appears_after(mut self, probes: u32) -> Self {
        self.hidden_probes = probes;
        self
    }

    /// Rewrites values committed through `fill`.
    pub fn on_fill<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.fill_transform = Some(Arc::new(transform));
        self
    }

    /// Rewrites values committed through keystroke typing.
    pub fn on_type<F>(mut self, transform: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.type_transform = Some(Arc::new(transform));
        self
    }
}

struct NodeRecord {
    node: FakeNode,
    frame: usize,
    parent: Option<usize>,
    children: Vec<usize>,
    attached: bool,
    on_click: Vec<Effect>,
    on_key: Vec<(String, Effect)>,
}

struct FrameRecord {
    name: Option<String>,
    url: String,
    parent: Option<usize>,
    attached: bool,
    hidden_probes: u32,
}

#[derive(Clone, Debug)]
struct LoginGate {
    login_url: String,
    cookie: String,
}

/// Record of what the engine did to the page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FakeCalls {
    pub navigations: Vec<String>,
    pub applied_states: usize,
    pub fills: Vec<(String, String)>,
    pub typed: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub keys: Vec<String>,
}

pub struct FakeDom {
    nodes: Vec<NodeRecord>,
    frames: Vec<FrameRecord>,
    cookies: Vec<Value>,
    login_gate: Option<LoginGate>,
    routes: Vec<(String, Effect)>,
    focused: Option<usize>,
    stale_budget: u32,
    crashed: bool,
    calls: FakeCalls,
}

fn frame_ref(index: usize) -> FrameRef {
    FrameRef(format!("frame-{index}"))
}

fn element_ref(index: usize) -> ElementRef {
    ElementRef(format!("node-{index}"))
}

fn parse_index(raw: &str, prefix: &str) -> Option<usize> {
    raw.strip_prefix(prefix).and_then(|rest| rest.parse().ok())
}

impl FakeDom {
    fn new(url: &str) -> Self {
        Self {
            nodes: Vec::new(),
            frames: vec![FrameRecord {
                name: None,
                url: url.to_string(),
                parent: None,
                attached: true,
                hidden_probes: 0,
            }],
            cookies: Vec::new(),
            login_gate: None,
            routes: Vec::new(),
            focused: None,
            stale_budget: 0,
            crashed: false,
            calls: FakeCalls::default(),
        }
    }

    pub fn main_frame(&self) -> FrameRef {
        frame_ref(0)
    }

    pub fn add_frame(&mut self, parent: &FrameRef, name: &str, url: &str) -> FrameRef {
        self.add_frame_after(parent, name, url, 0)
    }

    /// Child frame listed only after `probes` frame scans.
    pub fn add_frame_after(&mut self, parent: &FrameRef, name: &str, url: &str, probes: u32) -> FrameRef {
        let parent = parse_index(&parent.0, "frame-");
        self.frames.push(FrameRecord {
            name: (!name.is_empty()).then(|| name.to_string()),
            url: url.to_string(),
            parent,
            attached: true,
            hidden_probes: probes,
        });
        frame_ref(self.frames.len() - 1)
    }

    pub fn set_frame_url(&mut self, frame: &FrameRef, url: &str) {
        if let Some(record) = parse_index(&frame.0, "frame-").and_then(|i| self.frames.get_mut(i)) {
            record.url = url.to_string();
        }
    }

    /// Detach a frame; handles into it go stale.
    pub fn remove_frame(&mut self, frame: &FrameRef) {
        if let Some(index) = parse_index(&frame.0, "frame-") {
            if let Some(record) = self.frames.get_mut(index) {
                record.attached = false;
            }
            for node in self.nodes.iter_mut().filter(|node| node.frame == index) {
                node.attached = false;
            }
        }
    }

    pub fn add(&mut self, frame: &FrameRef, parent: Option<&ElementRef>, node: FakeNode) -> ElementRef {
        let frame = parse_index(&frame.0, "frame-").unwrap_or(0);
        let parent = parent.and_then(|el| parse_index(&el.0, "node-"));
        let index = self.nodes.len();
        self.nodes.push(NodeRecord {
            node,
            frame,
            parent,
            children: Vec::new(),
            attached: true,
            on_click: Vec::new(),
            on_key: Vec::new(),
        });
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.push(index);
        }
        element_ref(index)
    }

    pub fn on_click<F>(&mut self, element: &ElementRef, effect: F)
    where
        F: Fn(&mut FakeDom) + Send + Sync + 'static,
    {
        if let Some(record) = self.record_mut(element) {
            record.on_click.push(Arc::new(effect));
        }
    }

    pub fn on_key<F>(&mut self, element: &ElementRef, key: &str, effect: F)
    where
        F: Fn(&mut FakeDom) + Send + Sync + 'static,
    {
        if let Some(record) = self.record_mut(element) {
            record.on_key.push((key.to_string(), Arc::new(effect)));
        }
    }

    /// Run `effect` whenever navigation lands on a URL starting with `prefix`.
    pub fn on_navigate<F>(&mut self, prefix: &str, effect: F)
    where
        F: Fn(&mut FakeDom) + Send + Sync + 'static,
    {
        self.routes.push((prefix.to_string(), Arc::new(effect)));
    }

    /// Navigations without `cookie` in the jar land on `login_url` instead.
    pub fn require_cookie(&mut self, cookie: &str, login_url: &str) {
        self.login_gate = Some(LoginGate {
            login_url: login_url.to_string(),
            cookie: cookie.to_string(),
        });
    }

    pub fn set_text(&mut self, element: &ElementRef, text: &str) {
        if let Some(record) = self.record_mut(element) {
            record.node.text = text.to_string();
        }
    }

    pub fn set_value(&mut self, element: &ElementRef, value: &str) {
        if let Some(record) = self.record_mut(element) {
            record.node.value = Some(value.to_string());
        }
    }

    pub fn show(&mut self, element: &ElementRef) {
        if let Some(record) = self.record_mut(element) {
            record.node.visible = true;
        }
    }

    pub fn hide(&mut self, element: &ElementRef) {
        if let Some(record) = self.record_mut(element) {
            record.node.visible = false;
        }
    }

    /// Detach the element and its subtree.
    pub fn remove(&mut self, element: &ElementRef) {
        let Some(index) = parse_index(&element.0, "node-") else {
            return;
        };
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            if let Some(record) = self.nodes.get_mut(current) {
                record.attached = false;
                stack.extend(record.children.iter().copied());
            }
        }
    }

    /// Detach every child of `element`.
    pub fn clear_children(&mut self, element: &ElementRef) {
        let children = parse_index(&element.0, "node-")
            .and_then(|i| self.nodes.get(i))
            .map(|record| record.children.clone())
            .unwrap_or_default();
        for child in children {
            self.remove(&element_ref(child));
        }
    }

    pub fn value_of(&self, element: &ElementRef) -> Option<String> {
        self.record(element).and_then(|record| record.node.value.clone())
    }

    pub fn text_of(&self, element: &ElementRef) -> Option<String> {
        parse_index(&element.0, "node-").map(|i| self.text_content(i))
    }

    pub fn set_cookies(&mut self, cookies: Vec<Value>) {
        self.cookies = cookies;
    }

    pub fn url(&self) -> &str {
        &self.frames[0].url
    }

    fn record(&self, element: &ElementRef) -> Option<&NodeRecord> {
        parse_index(&element.0, "node-").and_then(|i| self.nodes.get(i))
    }

    fn record_mut(&mut self, element: &ElementRef) -> Option<&mut NodeRecord> {
        parse_index(&element.0, "node-").and_then(move |i| self.nodes.get_mut(i))
    }

    fn check_alive(&self) -> Result<(), AdapterError> {
        if self.crashed {
            return Err(AdapterError::new(AdapterErrorKind::PageCrashed).with_hint("fake page crashed"));
        }
        Ok(())
    }

    fn frame_index(&self, frame: &FrameRef) -> Result<usize, AdapterError> {
        self.check_alive()?;
        match parse_index(&frame.0, "frame-") {
            Some(index) if self.frames.get(index).map(|f| f.attached).unwrap_or(false) => Ok(index),
            _ => Err(AdapterError::stale(format!("frame {frame} detached"))),
        }
    }

    /// Resolve an element handle, consuming one injected stale fault if any.
    fn live_node(&mut self, frame: &FrameRef, element: &ElementRef) -> Result<usize, AdapterError> {
        let frame = self.frame_index(frame)?;
        if self.stale_budget > 0 {
            self.stale_budget -= 1;
            return Err(AdapterError::stale(format!("injected stale handle for {element}")));
        }
        match parse_index(&element.0, "node-") {
            Some(index)
                if self
                    .nodes
                    .get(index)
                    .map(|n| n.attached && n.frame == frame)
                    .unwrap_or(false) =>
            {
                Ok(index)
            }
            _ => Err(AdapterError::stale(format!("element {element} detached"))),
        }
    }

    fn document_order(&self, frame: usize) -> Vec<usize> {
        let mut order = Vec::new();
        let roots: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.frame == frame && n.parent.is_none())
            .map(|(i, _)| i)
            .collect();
        let mut stack: Vec<usize> = roots.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            let record = &self.nodes[current];
            if !record.attached {
                continue;
            }
            order.push(current);
            stack.extend(record.children.iter().rev().copied());
        }
        order
    }

    fn is_descendant(&self, node: usize, ancestor: usize) -> bool {
        let mut current = self.nodes[node].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes[parent].parent;
        }
        false
    }

    fn text_content(&self, index: usize) -> String {
        let record = &self.nodes[index];
        let mut parts = vec![record.node.text.clone()];
        for child in &record.children {
            if self.nodes[*child].attached {
                parts.push(self.text_content(*child));
            }
        }
        normalize_text(&parts.join(" "))
    }

    fn anchor_matches(&self, index: usize, anchor: &AnchorDescriptor) -> bool {
        let node = &self.nodes[index].node;
        match anchor {
            AnchorDescriptor::Css(selector) => {
                node.selectors.iter().any(|s| s == selector) || &node.tag == selector
            }
            AnchorDescriptor::Aria { role, name } => node
                .role
                .as_ref()
                .map(|(r, n)| {
                    r.eq_ignore_ascii_case(role)
                        && normalize_text(n).to_lowercase() == normalize_text(name).to_lowercase()
                })
                .unwrap_or(false),
            AnchorDescriptor::Text { content, exact } => {
                let own = normalize_text(&node.text);
                let want = normalize_text(content);
                if *exact {
                    !own.is_empty() && own == want
                } else {
                    own.contains(&want)
                }
            }
        }
    }

    fn visible_chain(&self, index: usize) -> bool {
        let mut current = Some(index);
        while let Some(i) = current {
            if !self.nodes[i].node.visible {
                return false;
            }
            current = self.nodes[i].parent;
        }
        true
    }

    fn interactable(&self, index: usize) -> bool {
        self.visible_chain(index) && !self.nodes[index].node.disabled
    }

    fn navigate_to(&mut self, url: &str) {
        self.calls.navigations.push(url.to_string());
        let mut landing = url.to_string();
        if let Some(gate) = self.login_gate.clone() {
            let has_cookie = self
                .cookies
                .iter()
                .any(|c| c.get("name").and_then(Value::as_str) == Some(gate.cookie.as_str()));
            if !has_cookie && !url.starts_with(&gate.login_url) {
                landing = gate.login_url;
            }
        }
        self.frames[0].url = landing.clone();
        let effects: Vec<Effect> = self
            .routes
            .iter()
            .filter(|(prefix, _)| landing.starts_with(prefix.as_str()))
            .map(|(_, effect)| effect.clone())
            .collect();
        for effect in effects {
            effect(self);
        }
    }
}

/// Cloneable handle to a shared in-memory page.
#[derive(Clone)]
pub struct FakePage {
    dom: Arc<Mutex<FakeDom>>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        Self {
            dom: Arc::new(Mutex::new(FakeDom::new(url))),
        }
    }

    /// Mutate the page, e.g. to build a scenario.
    pub fn with_dom<R>(&self, f: impl FnOnce(&mut FakeDom) -> R) -> R {
        let mut dom = self.dom.lock();
        f(&mut *dom)
    }

    pub fn main_frame(&self) -> FrameRef {
        frame_ref(0)
    }

    pub fn calls(&self) -> FakeCalls {
        self.dom.lock().calls.clone()
    }

    /// Every later operation fails with `PageCrashed`.
    pub fn crash(&self) {
        self.dom.lock().crashed = true;
    }

    /// The next `count` element operations fail with `StaleHandle`.
    pub fn inject_stale(&self, count: u32) {
        self.dom.lock().stale_budget = count;
    }

    pub fn cookies(&self) -> Vec<Value> {
        self.dom.lock().cookies.clone()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        dom.check_alive()?;
        dom.navigate_to(url);
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AdapterError> {
        let dom = self.dom.lock();
        dom.check_alive()?;
        Ok(dom.url().to_string())
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>, AdapterError> {
        let mut dom = self.dom.lock();
        dom.check_alive()?;
        let mut listed = Vec::new();
        // Depth-first from the main frame, children in creation order.
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let record = &mut dom.frames[index];
            if !record.attached {
                continue;
            }
            if record.hidden_probes > 0 {
                record.hidden_probes -= 1;
                continue;
            }
            listed.push(index);
            let children: Vec<usize> = dom
                .frames
                .iter()
                .enumerate()
                .filter(|(_, f)| f.parent == Some(index))
                .map(|(i, _)| i)
                .rev()
                .collect();
            stack.extend(children);
        }
        Ok(listed
            .into_iter()
            .map(|index| {
                let record = &dom.frames[index];
                FrameInfo {
                    frame: frame_ref(index),
                    name: record.name.clone(),
                    url: record.url.clone(),
                    parent: record.parent.map(frame_ref),
                }
            })
            .collect())
    }

    async fn query(
        &self,
        frame: &FrameRef,
        scope: Option<&ElementRef>,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, AdapterError> {
        let mut dom = self.dom.lock();
        let frame_index = dom.frame_index(frame)?;
        let scope = match scope {
            Some(element) => Some(dom.live_node(frame, element)?),
            None => None,
        };

        let candidates: Vec<usize> = dom
            .document_order(frame_index)
            .into_iter()
            .filter(|&i| scope.map(|s| dom.is_descendant(i, s)).unwrap_or(true))
            .filter(|&i| dom.anchor_matches(i, anchor))
            .collect();

        let innermost: Vec<usize> = match anchor {
            AnchorDescriptor::Text { .. } => candidates
                .iter()
                .copied()
                .filter(|&i| {
                    !dom.nodes[i]
                        .children
                        .iter()
                        .any(|&c| dom.nodes[c].attached && dom.anchor_matches(c, anchor))
                })
                .collect(),
            _ => candidates,
        };

        let mut found = Vec::new();
        for index in innermost {
            let record = &mut dom.nodes[index];
            if record.node.hidden_probes > 0 {
                record.node.hidden_probes -= 1;
                continue;
            }
            found.push(element_ref(index));
        }
        Ok(found)
    }

    async fn closest(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
        css: &str,
    ) -> Result<Option<ElementRef>, AdapterError> {
        let mut dom = self.dom.lock();
        let mut current = Some(dom.live_node(frame, element)?);
        let anchor = AnchorDescriptor::css(css);
        while let Some(index) = current {
            if dom.anchor_matches(index, &anchor) {
                return Ok(Some(element_ref(index)));
            }
            current = dom.nodes[index].parent;
        }
        Ok(None)
    }

    async fn read_text(&self, frame: &FrameRef, element: &ElementRef) -> Result<String, AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        Ok(dom.text_content(index))
    }

    async fn read_value(&self, frame: &FrameRef, element: &ElementRef) -> Result<String, AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        Ok(match &dom.nodes[index].node.value {
            Some(value) => value.clone(),
            None => dom.text_content(index),
        })
    }

    async fn is_interactable(&self, frame: &FrameRef, element: &ElementRef) -> Result<bool, AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        Ok(dom.interactable(index))
    }

    async fn fill(&self, frame: &FrameRef, element: &ElementRef, value: &str) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        if !dom.interactable(index) {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable).with_hint(element.0.clone()));
        }
        let committed = match &dom.nodes[index].node.fill_transform {
            Some(transform) => transform(value),
            None => value.to_string(),
        };
        dom.nodes[index].node.value = Some(committed);
        dom.focused = Some(index);
        dom.calls.fills.push((element.0.clone(), value.to_string()));
        Ok(())
    }

    async fn type_text(&self, frame: &FrameRef, element: &ElementRef, text: &str) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        if !dom.interactable(index) {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable).with_hint(element.0.clone()));
        }
        let committed = match &dom.nodes[index].node.type_transform {
            Some(transform) => transform(text),
            None => text.to_string(),
        };
        dom.nodes[index].node.value = Some(committed);
        dom.focused = Some(index);
        dom.calls.typed.push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn click(&self, frame: &FrameRef, element: &ElementRef) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        let index = dom.live_node(frame, element)?;
        if !dom.interactable(index) {
            return Err(AdapterError::new(AdapterErrorKind::NotInteractable).with_hint(element.0.clone()));
        }
        dom.focused = Some(index);
        dom.calls.clicks.push(element.0.clone());
        let effects = dom.nodes[index].on_click.clone();
        for effect in effects {
            effect(&mut *dom);
        }
        Ok(())
    }

    async fn press_key(&self, frame: &FrameRef, element: Option<&ElementRef>, key: &str) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        let target = match element {
            Some(element) => Some(dom.live_node(frame, element)?),
            None => {
                dom.frame_index(frame)?;
                dom.focused
            }
        };
        dom.calls.keys.push(key.to_string());
        if let Some(index) = target {
            let effects: Vec<Effect> = dom.nodes[index]
                .on_key
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, effect)| effect.clone())
                .collect();
            for effect in effects {
                effect(&mut *dom);
            }
        }
        Ok(())
    }

    async fn wait_network_idle(&self, _quiet_window: Duration, _timeout: Duration) -> Result<(), AdapterError> {
        self.dom.lock().check_alive()
    }

    async fn storage_state(&self) -> Result<SerializedState, AdapterError> {
        let dom = self.dom.lock();
        dom.check_alive()?;
        Ok(SerializedState::from_cookies(dom.cookies.clone()))
    }

    async fn apply_storage_state(&self, state: &SerializedState) -> Result<(), AdapterError> {
        let mut dom = self.dom.lock();
        dom.check_alive()?;
        dom.cookies = state.cookies().to_vec();
        dom.calls.applied_states += 1;
        Ok(())
    }
}
