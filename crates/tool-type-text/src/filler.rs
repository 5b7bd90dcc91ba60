use action_locator::{FallbackResolver, Resolution};
use action_primitives::{StabilizingWaiter, WaitError};
use cdp_adapter::{AdapterError, BrowserPage, ElementRef, FrameRef};
use tracing::{debug, info, instrument, warn};

use crate::errors::FillError;
use crate::model::{values_match, CommitMethod, FieldSpec, FillReport};
use crate::redact;

const PREVIEW_CHARS: usize = 32;

/// Finds a query input through its fallback chain and commits a value,
/// reading it back after every attempt.
pub struct ParameterFiller {
    waiter: StabilizingWaiter,
}

impl ParameterFiller {
    /// `waiter` bounds how long the field may take to become usable.
    pub fn new(waiter: StabilizingWaiter) -> Self {
        Self { waiter }
    }

    /// `true` once the field holds `value`. Every failure, including an
    /// exhausted fallback chain, is logged and reported as `false`.
    pub async fn fill(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        spec: &FieldSpec,
        value: &str,
    ) -> bool {
        match self.commit(page, frame, spec, value).await {
            Ok(_) => true,
            Err(err) => {
                warn!(target: "filler", field = %spec.name, %err, "fill failed");
                false
            }
        }
    }

    /// Detailed form of [`fill`](Self::fill).
    #[instrument(skip_all, fields(field = %spec.name))]
    pub async fn commit(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        spec: &FieldSpec,
        value: &str,
    ) -> Result<FillReport, FillError> {
        let resolver = FallbackResolver::from_steps(&spec.locate);
        let mut resolution = self.resolve(page, frame, spec, &resolver).await?;
        let mut last_read: Option<String> = None;
        let mut last_error: Option<AdapterError> = None;

        for method in &spec.commit {
            match apply(page, frame, &resolution.element, *method, value).await {
                Ok(actual) if values_match(value, &actual) => {
                    let submitted = submit(page, frame, &resolution.element, spec).await?;
                    info!(
                        target: "filler",
                        strategy = %resolution.strategy,
                        method = method.name(),
                        value = %redact::value(value, PREVIEW_CHARS),
                        submitted,
                        "field committed"
                    );
                    return Ok(FillReport {
                        field: spec.name.clone(),
                        element: resolution.element,
                        strategy: resolution.strategy,
                        method: *method,
                        committed: actual,
                        submitted,
                    });
                }
                Ok(actual) => {
                    debug!(
                        target: "filler",
                        method = method.name(),
                        actual = %redact::value(&actual, PREVIEW_CHARS),
                        "read-back differs"
                    );
                    last_read = Some(actual);
                }
                Err(err) if err.is_fatal() => {
                    return Err(FillError::Adapter {
                        field: spec.name.clone(),
                        source: err,
                    })
                }
                Err(err) => {
                    debug!(target: "filler", method = method.name(), %err, "commit attempt failed; re-resolving");
                    last_error = Some(err);
                    resolution = self.resolve(page, frame, spec, &resolver).await?;
                }
            }
        }

        match (last_read, last_error) {
            (Some(actual), _) => Err(FillError::CommitMismatch {
                field: spec.name.clone(),
                expected: value.to_string(),
                actual,
            }),
            (None, Some(source)) => Err(FillError::Adapter {
                field: spec.name.clone(),
                source,
            }),
            (None, None) => Err(FillError::NotResolvable {
                field: spec.name.clone(),
            }),
        }
    }

    async fn resolve(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        spec: &FieldSpec,
        resolver: &FallbackResolver,
    ) -> Result<Resolution, FillError> {
        let label = format!("field {}", spec.name);
        match self
            .waiter
            .until_some(&label, || resolver.resolve(page, frame))
            .await
        {
            Ok(resolution) => Ok(resolution),
            Err(WaitError::Timeout { .. }) => Err(FillError::NotResolvable {
                field: spec.name.clone(),
            }),
            Err(WaitError::Aborted { cause, .. }) => Err(FillError::Adapter {
                field: spec.name.clone(),
                source: cause,
            }),
        }
    }
}

/// Push `value` with `method` and return what the field now holds.
async fn apply(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    element: &ElementRef,
    method: CommitMethod,
    value: &str,
) -> Result<String, AdapterError> {
    match method {
        CommitMethod::Fill => page.fill(frame, element, value).await?,
        CommitMethod::Type => page.type_text(frame, element, value).await?,
    }
    page.read_value(frame, element).await
}

async fn submit(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    element: &ElementRef,
    spec: &FieldSpec,
) -> Result<bool, FillError> {
    let Some(key) = &spec.submit_key else {
        return Ok(false);
    };
    page.press_key(frame, Some(element), key)
        .await
        .map_err(|source| FillError::Adapter {
            field: spec.name.clone(),
            source,
        })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_locator::{LocateStep, LocatorStrategy, StructuralHint};
    use action_primitives::WaitPolicy;
    use cdp_adapter::fake::{FakeNode, FakePage};
    use dashprobe_core_types::FailureKind;
    use std::time::Duration;

    fn filler() -> ParameterFiller {
        ParameterFiller::new(StabilizingWaiter::new(
            WaitPolicy::fixed(Duration::from_millis(100), Duration::from_secs(2)).with_max_attempts(3),
        ))
    }

    fn pid_spec() -> FieldSpec {
        FieldSpec::new(
            "pid",
            vec![
                LocateStep::Css("span.obviz-base-filterInput input[autocomplete=\"off\"]".into()),
                LocateStep::Aria {
                    role: "textbox".into(),
                    name: "pid".into(),
                },
                LocateStep::Structural(StructuralHint {
                    label_text: "pid".into(),
                    label_selector: Some("span.obviz-base-filterText".into()),
                    container_selector: "div.obviz-base-easy-select-inner".into(),
                    input_selector: "input".into(),
                    activate_selector: None,
                }),
            ],
        )
        .submit_with("Enter")
    }

    #[tokio::test(start_paused = true)]
    async fn fill_returns_false_when_chain_exhausted() {
        let page = FakePage::new("about:blank");
        let ok = filler()
            .fill(&page, &page.main_frame(), &pid_spec(), "100000103722927")
            .await;
        assert!(!ok);
        assert!(page.calls().fills.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn commits_through_role_lookup_and_submits() {
        let page = FakePage::new("about:blank");
        let input = page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(&main, None, FakeNode::input().role("textbox", "pid"))
        });
        let report = filler()
            .commit(&page, &page.main_frame(), &pid_spec(), "100000103722927")
            .await
            .unwrap();
        assert_eq!(report.strategy, LocatorStrategy::AriaAx);
        assert_eq!(report.method, CommitMethod::Fill);
        assert!(report.submitted);
        assert_eq!(page.with_dom(|dom| dom.value_of(&input)).as_deref(), Some("100000103722927"));
        assert_eq!(page.calls().keys, vec!["Enter".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_fill_falls_back_to_typing() {
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(
                &main,
                None,
                FakeNode::input()
                    .matches("#PartnerId")
                    .on_fill(|_| String::new()),
            );
        });
        let spec = FieldSpec::new("PartnerId", vec![LocateStep::Css("#PartnerId".into())]);
        let report = filler()
            .commit(&page, &page.main_frame(), &spec, "100000103722927")
            .await
            .unwrap();
        assert_eq!(report.method, CommitMethod::Type);
        assert!(!report.submitted);
        assert_eq!(page.calls().typed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transformed_value_is_a_commit_mismatch() {
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(
                &main,
                None,
                FakeNode::input()
                    .matches("#SignName")
                    .on_fill(|v| v.to_uppercase())
                    .on_type(|v| v.to_uppercase()),
            );
        });
        let spec = FieldSpec::new("SignName", vec![LocateStep::Css("#SignName".into())]);
        let err = filler()
            .commit(&page, &page.main_frame(), &spec, "guoneng")
            .await
            .unwrap_err();
        match &err {
            FillError::CommitMismatch { actual, .. } => assert_eq!(actual, "GUONENG"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.failure_kind(), FailureKind::FieldCommitMismatch);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_handle_during_lookup_is_polled_again() {
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(&main, None, FakeNode::input().matches("#PartnerId"));
        });
        let spec = FieldSpec::new("PartnerId", vec![LocateStep::Css("#PartnerId".into())]);
        page.inject_stale(1);
        let report = filler()
            .commit(&page, &page.main_frame(), &spec, "42")
            .await
            .unwrap();
        assert_eq!(report.committed, "42");
        assert_eq!(page.calls().fills.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_page_is_unexpected_failure() {
        let page = FakePage::new("about:blank");
        page.crash();
        let spec = FieldSpec::new("PartnerId", vec![LocateStep::Css("#PartnerId".into())]);
        let err = filler()
            .commit(&page, &page.main_frame(), &spec, "42")
            .await
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::UnexpectedAutomationFailure);
    }
}
