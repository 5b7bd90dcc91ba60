use action_primitives::{StabilizingWaiter, WaitError};
use cdp_adapter::{AdapterError, AnchorDescriptor, BrowserPage, ElementRef, FrameRef};
use tracing::{debug, info, instrument, warn};

use crate::errors::SelectError;
use crate::model::{label_shows, match_option, RangeSpec, SelectReport};

/// Drives the reporting-window control and confirms the choice stuck.
pub struct RangeSelector {
    spec: RangeSpec,
    waiter: StabilizingWaiter,
}

/// Snapshot read while waiting for confirmation.
#[derive(Debug)]
struct Observed {
    label: String,
    refreshed: bool,
}

impl RangeSelector {
    pub fn new(spec: RangeSpec, waiter: StabilizingWaiter) -> Self {
        Self { spec, waiter }
    }

    pub fn spec(&self) -> &RangeSpec {
        &self.spec
    }

    /// `true` once the window is applied; failures are logged.
    pub async fn select(&self, page: &dyn BrowserPage, frame: &FrameRef, label: &str) -> bool {
        match self.apply(page, frame, label).await {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "range", label, %err, "range selection failed");
                false
            }
        }
    }

    #[instrument(skip_all, fields(label = %label))]
    pub async fn apply(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        label: &str,
    ) -> Result<SelectReport, SelectError> {
        let wanted = self.spec.texts_for(label);
        let trigger = self.wait_trigger(page, frame).await?;
        let before = page.read_text(frame, &trigger).await?;
        if label_shows(&before, &wanted) {
            info!(target: "range", label, shown = %before, "window already applied");
            return Ok(SelectReport {
                label: label.to_string(),
                option_text: None,
                matched: None,
                unchanged: true,
                via_refresh: false,
            });
        }
        let marker_before = self.marker_text(page, frame).await?;

        page.click(frame, &trigger).await?;
        let options = self.wait_options(page, frame, label, &wanted).await?;
        let texts: Vec<String> = options.iter().map(|(_, text)| text.clone()).collect();
        let Some((index, kind)) = match_option(&texts, &wanted) else {
            debug!(target: "range", options = ?texts, "no option matched; dismissing");
            if let Err(err) = page.press_key(frame, None, &self.spec.dismiss_key).await {
                if err.is_fatal() {
                    return Err(err.into());
                }
            }
            return Err(SelectError::OptionMissing {
                label: label.to_string(),
                tried: wanted,
            });
        };
        let (option, option_text) = &options[index];
        page.click(frame, option).await?;
        debug!(target: "range", option = %option_text, matched = ?kind, "option clicked");

        let observed = self
            .waiter
            .until(
                "range applied",
                || self.observe(page, frame, marker_before.as_deref()),
                |seen: &Observed| seen.refreshed || label_shows(&seen.label, &wanted),
            )
            .await;
        match observed {
            Ok(seen) => {
                let via_refresh = !label_shows(&seen.label, &wanted);
                info!(target: "range", label, option = %option_text, via_refresh, "window applied");
                Ok(SelectReport {
                    label: label.to_string(),
                    option_text: Some(option_text.clone()),
                    matched: Some(kind),
                    unchanged: false,
                    via_refresh,
                })
            }
            Err(WaitError::Timeout { state, .. }) => Err(SelectError::NotApplied {
                label: label.to_string(),
                observed: state.last.map(|seen| seen.label).unwrap_or(before),
            }),
            Err(WaitError::Aborted { cause, .. }) => Err(cause.into()),
        }
    }

    async fn wait_trigger(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<ElementRef, SelectError> {
        let anchor = AnchorDescriptor::css(self.spec.trigger_selector.clone());
        match self
            .waiter
            .until_some("range control", || first_interactable(page, frame, &anchor))
            .await
        {
            Ok(trigger) => Ok(trigger),
            Err(WaitError::Timeout { .. }) => Err(SelectError::ControlMissing {
                control: self.spec.trigger_selector.clone(),
            }),
            Err(WaitError::Aborted { cause, .. }) => Err(cause.into()),
        }
    }

    /// Visible options with their text, once the list has opened.
    async fn wait_options(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        label: &str,
        wanted: &[String],
    ) -> Result<Vec<(ElementRef, String)>, SelectError> {
        let anchor = AnchorDescriptor::css(self.spec.option_selector.clone());
        match self
            .waiter
            .until_some("range options", || visible_options(page, frame, &anchor))
            .await
        {
            Ok(options) => Ok(options),
            Err(WaitError::Timeout { .. }) => Err(SelectError::OptionMissing {
                label: label.to_string(),
                tried: wanted.to_vec(),
            }),
            Err(WaitError::Aborted { cause, .. }) => Err(cause.into()),
        }
    }

    async fn marker_text(&self, page: &dyn BrowserPage, frame: &FrameRef) -> Result<Option<String>, AdapterError> {
        let Some(selector) = &self.spec.refresh_marker else {
            return Ok(None);
        };
        let found = page.query(frame, None, &AnchorDescriptor::css(selector.clone())).await?;
        match found.first() {
            Some(marker) => Ok(Some(page.read_text(frame, marker).await?)),
            None => Ok(None),
        }
    }

    /// Re-resolves the trigger every time: the control may re-render.
    async fn observe(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        marker_before: Option<&str>,
    ) -> Result<Option<Observed>, AdapterError> {
        let anchor = AnchorDescriptor::css(self.spec.trigger_selector.clone());
        let Some(trigger) = page.query(frame, None, &anchor).await?.into_iter().next() else {
            return Ok(None);
        };
        let label = page.read_text(frame, &trigger).await?;
        let refreshed = match (marker_before, self.marker_text(page, frame).await?) {
            (Some(before), Some(now)) => before != now,
            _ => false,
        };
        Ok(Some(Observed { label, refreshed }))
    }
}

async fn first_interactable(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    anchor: &AnchorDescriptor,
) -> Result<Option<ElementRef>, AdapterError> {
    for element in page.query(frame, None, anchor).await? {
        if page.is_interactable(frame, &element).await? {
            return Ok(Some(element));
        }
    }
    Ok(None)
}

async fn visible_options(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    anchor: &AnchorDescriptor,
) -> Result<Option<Vec<(ElementRef, String)>>, AdapterError> {
    let mut options = Vec::new();
    for element in page.query(frame, None, anchor).await? {
        if page.is_interactable(frame, &element).await? {
            let text = page.read_text(frame, &element).await?;
            options.push((element, text));
        }
    }
    Ok((!options.is_empty()).then_some(options))
}
