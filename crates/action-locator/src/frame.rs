//! Report frame location by content, never by index or URL.

use action_primitives::{StabilizingWaiter, WaitError};
use cdp_adapter::{AdapterError, BrowserPage, FrameInfo};
use tracing::{debug, info, instrument};

use crate::errors::LocatorError;
use crate::types::{FrameSignature, LocatedFrame};

/// Upper bound on frames examined per scan.
pub const DEFAULT_MAX_FRAMES: usize = 64;

pub struct FrameLocator {
    signature: FrameSignature,
    max_frames: usize,
}

impl FrameLocator {
    pub fn new(signature: FrameSignature) -> Self {
        Self {
            signature,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }

    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = max_frames.max(1);
        self
    }

    pub fn signature(&self) -> &FrameSignature {
        &self.signature
    }

    /// One bounded scan over the currently attached frames. Frames whose
    /// probe errors (detached mid-scan, context gone) are skipped.
    pub async fn scan(&self, page: &dyn BrowserPage) -> Result<Option<LocatedFrame>, AdapterError> {
        Ok(self.scan_counted(page).await?.0)
    }

    async fn scan_counted(
        &self,
        page: &dyn BrowserPage,
    ) -> Result<(Option<LocatedFrame>, usize), AdapterError> {
        let frames = page.frames().await?;
        let mut scanned = 0;
        for info in frames.into_iter().take(self.max_frames) {
            scanned += 1;
            match self.matching_anchor(page, &info).await {
                Ok(Some(matched)) => {
                    debug!(target: "frame-locator", frame = %info.frame, url = %info.url, %matched, "signature matched");
                    return Ok((Some(LocatedFrame { info, matched }), scanned));
                }
                Ok(None) => {}
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    debug!(target: "frame-locator", frame = %info.frame, %err, "frame skipped");
                }
            }
        }
        Ok((None, scanned))
    }

    /// Single scan; no match is `FrameNotFound`. Retrying is the caller's
    /// business.
    pub async fn locate(&self, page: &dyn BrowserPage) -> Result<LocatedFrame, LocatorError> {
        match self.scan_counted(page).await? {
            (Some(found), _) => Ok(found),
            (None, scanned) => Err(LocatorError::FrameNotFound {
                signature: self.signature.to_string(),
                scanned,
            }),
        }
    }

    /// Whether the frame shows any of the readiness markers.
    pub async fn is_ready(&self, page: &dyn BrowserPage, info: &FrameInfo) -> Result<bool, AdapterError> {
        if self.signature.ready_when.is_empty() {
            return Ok(true);
        }
        for anchor in &self.signature.ready_when {
            if !page.query(&info.frame, None, anchor).await?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Poll until a frame matches the signature and reports ready.
    #[instrument(skip_all, fields(signature = %self.signature))]
    pub async fn wait_ready(
        &self,
        page: &dyn BrowserPage,
        waiter: &StabilizingWaiter,
    ) -> Result<LocatedFrame, LocatorError> {
        let outcome = waiter
            .until_some("report frame", move || self.ready_probe(page))
            .await;
        match outcome {
            Ok(found) => {
                info!(target: "frame-locator", frame = %found.info.frame, url = %found.info.url, "report frame ready");
                Ok(found)
            }
            Err(WaitError::Timeout { state, .. }) => Err(LocatorError::FrameNotFound {
                signature: self.signature.to_string(),
                scanned: state.attempts as usize,
            }),
            Err(WaitError::Aborted { cause, .. }) => Err(LocatorError::Adapter(cause)),
        }
    }

    async fn ready_probe(&self, page: &dyn BrowserPage) -> Result<Option<LocatedFrame>, AdapterError> {
        let Some(found) = self.scan(page).await? else {
            return Ok(None);
        };
        Ok(self.is_ready(page, &found.info).await?.then_some(found))
    }

    async fn matching_anchor(
        &self,
        page: &dyn BrowserPage,
        info: &FrameInfo,
    ) -> Result<Option<cdp_adapter::AnchorDescriptor>, AdapterError> {
        for anchor in &self.signature.any_of {
            if !page.query(&info.frame, None, anchor).await?.is_empty() {
                return Ok(Some(anchor.clone()));
            }
        }
        Ok(None)
    }
}
