//! The capability set every query stage drives the browser through.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use dashprobe_core_types::SerializedState;
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorDescriptor;
use crate::error::AdapterError;

/// Opaque handle to a frame. Invalid once the frame navigates away or detaches.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FrameRef(pub String);

/// Opaque handle to an element inside one frame.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ElementRef(pub String);

impl fmt::Display for FrameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame: FrameRef,
    pub name: Option<String>,
    pub url: String,
    pub parent: Option<FrameRef>,
}

impl FrameInfo {
    pub fn is_main(&self) -> bool {
        self.parent.is_none()
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }
}

/// One browser page. Implementations must be safe to share, but callers
/// serialize access: a page runs one query at a time.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), AdapterError>;

    async fn current_url(&self) -> Result<String, AdapterError>;

    /// Frames in document order, main frame first.
    async fn frames(&self) -> Result<Vec<FrameInfo>, AdapterError>;

    async fn query(
        &self,
        frame: &FrameRef,
        scope: Option<&ElementRef>,
        anchor: &AnchorDescriptor,
    ) -> Result<Vec<ElementRef>, AdapterError>;

    /// Nearest ancestor (or the element itself) matching `css`.
    async fn closest(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
        css: &str,
    ) -> Result<Option<ElementRef>, AdapterError>;

    async fn read_text(&self, frame: &FrameRef, element: &ElementRef)
        -> Result<String, AdapterError>;

    async fn read_value(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
    ) -> Result<String, AdapterError>;

    async fn is_interactable(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
    ) -> Result<bool, AdapterError>;

    /// Replace the element's value in one step.
    async fn fill(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
        value: &str,
    ) -> Result<(), AdapterError>;

    /// Clear the element, then enter `text` keystroke by keystroke.
    async fn type_text(
        &self,
        frame: &FrameRef,
        element: &ElementRef,
        text: &str,
    ) -> Result<(), AdapterError>;

    async fn click(&self, frame: &FrameRef, element: &ElementRef) -> Result<(), AdapterError>;

    /// Press a named key (`Enter`, `Tab`, `Escape`) on the element, or on the
    /// focused element when none is given.
    async fn press_key(
        &self,
        frame: &FrameRef,
        element: Option<&ElementRef>,
        key: &str,
    ) -> Result<(), AdapterError>;

    /// Resolve once no request has been in flight for `quiet_window`.
    async fn wait_network_idle(
        &self,
        quiet_window: Duration,
        timeout: Duration,
    ) -> Result<(), AdapterError>;

    async fn storage_state(&self) -> Result<SerializedState, AdapterError>;

    async fn apply_storage_state(&self, state: &SerializedState) -> Result<(), AdapterError>;
}
