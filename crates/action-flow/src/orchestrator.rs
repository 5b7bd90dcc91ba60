//! The query state machine.
//!
//! `NotStarted → SessionEnsured → FrameReady → ParametersSet → RangeSet →
//! TableReady → Extracted`. Each stage runs under its own deadline and
//! polls through the stage's waiter; a retryable failure restarts the
//! machine at `FrameReady` after the policy's backoff, and a rejected
//! session forces one fresh login and a full restart.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use action_locator::{FrameLocator, LocatorError};
use action_primitives::settle;
use cdp_adapter::{AdapterError, AdapterErrorKind, AnchorDescriptor, BrowserPage, FrameRef};
use dashprobe_core_types::{
    ExtractionResult, FailureKind, QueryId, QueryKind, QueryRequest, QueryStage, ReportWindow,
};
use dashprobe_session_store::SessionStore;
use perceiver_table::TableExtractor;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::errors::FlowError;
use crate::plan::{QueryPlan, QueryPlans};
use crate::policy::FlowPolicy;
use crate::session::{LoginProvider, SessionCheck};
use tool_select_option::RangeSelector;
use tool_type_text::ParameterFiller;

/// Runs ticket and success-rate queries against one page, one at a time.
pub struct QueryOrchestrator {
    page: Arc<dyn BrowserPage>,
    /// Held for the whole query: the page is a single shared resource.
    lane: Mutex<()>,
    store: SessionStore,
    login: Arc<dyn LoginProvider>,
    plans: QueryPlans,
    policy: FlowPolicy,
    session_check: SessionCheck,
}

impl QueryOrchestrator {
    pub fn new(
        page: Arc<dyn BrowserPage>,
        store: SessionStore,
        login: Arc<dyn LoginProvider>,
        plans: QueryPlans,
    ) -> Self {
        Self {
            page,
            lane: Mutex::new(()),
            store,
            login,
            plans,
            policy: FlowPolicy::default(),
            session_check: SessionCheck::default(),
        }
    }

    pub fn with_policy(mut self, policy: FlowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_session_check(mut self, check: SessionCheck) -> Self {
        self.session_check = check;
        self
    }

    pub fn policy(&self) -> &FlowPolicy {
        &self.policy
    }

    pub fn plans(&self) -> &QueryPlans {
        &self.plans
    }

    pub async fn find_ticket(&self, request: &QueryRequest) -> ExtractionResult {
        self.run(QueryKind::Ticket, request).await
    }

    pub async fn find_success_rate(&self, request: &QueryRequest) -> ExtractionResult {
        self.run(QueryKind::SuccessRate, request).await
    }

    /// Run one query to a terminal outcome. Never panics and never returns a
    /// raw lower-level error: every failure is folded into the result.
    pub async fn run(&self, kind: QueryKind, request: &QueryRequest) -> ExtractionResult {
        let query_id = QueryId::new();
        let _lane = self.lane.lock().await;
        self.execute(&query_id, self.plans.get(kind), request)
            .await
            .with_query_id(query_id)
    }

    #[instrument(skip_all, fields(query_id = %query_id, kind = %plan.kind))]
    async fn execute(&self, query_id: &QueryId, plan: &QueryPlan, request: &QueryRequest) -> ExtractionResult {
        let window = plan
            .range
            .as_ref()
            .map(|_| request.window.clone().unwrap_or_default());
        let mut reached = QueryStage::NotStarted;
        let mut attempt = 1u32;
        let mut relogged = false;
        let mut force_login = false;

        loop {
            let outcome = self
                .attempt(plan, request, window.as_ref(), &mut reached, force_login)
                .await;
            force_login = false;

            let err = match outcome {
                Ok(result) => {
                    info!(
                        target: "flow",
                        success = result.success,
                        total = result.total_count,
                        attempt,
                        "query finished"
                    );
                    return result.with_window(window).with_attempts(attempt);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            if kind == FailureKind::SessionInvalid && !relogged && matches!(err, FlowError::SessionInvalid(_)) {
                warn!(target: "flow", %err, "session rejected; logging in again");
                relogged = true;
                force_login = true;
                reached = QueryStage::NotStarted;
                continue;
            }
            if kind.is_retryable() && self.policy.should_retry(attempt) {
                let pause = self.policy.backoff(attempt);
                warn!(
                    target: "flow",
                    %err,
                    attempt,
                    pause_ms = pause.as_millis() as u64,
                    "stage failed; restarting from frame"
                );
                sleep(pause).await;
                attempt += 1;
                reached = reached.min(QueryStage::SessionEnsured);
                continue;
            }

            warn!(target: "flow", %err, kind = %kind, attempt, "query failed");
            return ExtractionResult::failed(plan.kind, err.to_failure())
                .with_window(window)
                .with_attempts(attempt);
        }
    }

    /// One pass from the furthest stable stage to extraction.
    async fn attempt(
        &self,
        plan: &QueryPlan,
        request: &QueryRequest,
        window: Option<&ReportWindow>,
        reached: &mut QueryStage,
        force_login: bool,
    ) -> Result<ExtractionResult, FlowError> {
        let page = self.page.as_ref();

        if *reached < QueryStage::SessionEnsured {
            self.within(
                QueryStage::SessionEnsured,
                self.policy.stages.budget(QueryStage::SessionEnsured),
                self.ensure_session(page, force_login),
            )
            .await?;
            self.within(
                QueryStage::SessionEnsured,
                Duration::from_millis(self.policy.stages.navigation_ms),
                self.open_dashboard(page, plan),
            )
            .await?;
            advance(reached, QueryStage::SessionEnsured);
        }

        let frame = self
            .within_stage(QueryStage::FrameReady, self.frame_ready(page, plan))
            .await?;
        advance(reached, QueryStage::FrameReady);

        self.within_stage(
            QueryStage::ParametersSet,
            self.set_parameters(page, &frame, plan, request),
        )
        .await?;
        advance(reached, QueryStage::ParametersSet);

        if let (Some(range), Some(window)) = (&plan.range, window) {
            let selector = RangeSelector::new(range.clone(), self.policy.waits.waiter(QueryStage::RangeSet));
            self.within_stage(QueryStage::RangeSet, self.set_range(page, &frame, &selector, window))
                .await?;
        }
        advance(reached, QueryStage::RangeSet);

        let extractor = TableExtractor::new(plan.table.clone(), self.policy.waits.waiter(QueryStage::TableReady));
        let rows = self
            .within_stage(QueryStage::TableReady, async {
                extractor
                    .wait_ready(page, &frame)
                    .await
                    .map_err(|err| FlowError::stage(QueryStage::TableReady, err.failure_kind(), err))
            })
            .await?;
        debug!(target: "flow", rows, "table settled");
        advance(reached, QueryStage::TableReady);

        let result = self
            .within_stage(QueryStage::Extracted, async {
                extractor
                    .extract(page, &frame, plan.kind, request)
                    .await
                    .map_err(|err| FlowError::stage(QueryStage::Extracted, err.failure_kind(), err))
            })
            .await?;
        advance(reached, QueryStage::Extracted);
        Ok(result)
    }

    async fn within<T, F>(&self, stage: QueryStage, budget: Duration, work: F) -> Result<T, FlowError>
    where
        F: Future<Output = Result<T, FlowError>>,
    {
        match timeout(budget, work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FlowError::StageTimeout {
                stage,
                budget_ms: budget.as_millis() as u64,
            }),
        }
    }

    async fn within_stage<T, F>(&self, stage: QueryStage, work: F) -> Result<T, FlowError>
    where
        F: Future<Output = Result<T, FlowError>>,
    {
        self.within(stage, self.policy.stages.budget(stage), work).await
    }

    /// Reuse the stored session when valid, otherwise log in once and
    /// persist the result before it is applied to the page.
    async fn ensure_session(&self, page: &dyn BrowserPage, force_login: bool) -> Result<(), FlowError> {
        let stored = if force_login { None } else { self.store.load_valid() };
        let state = match stored {
            Some(session) => {
                info!(target: "flow", saved_at = %session.created_at, "reusing stored session");
                session.state
            }
            None => {
                info!(target: "flow", forced = force_login, "no usable session; logging in");
                let state = self
                    .login
                    .perform_login(page)
                    .await
                    .map_err(|err| FlowError::Login(err.to_string()))?;
                if !state.is_well_formed() {
                    return Err(FlowError::Login("login produced no cookies".to_string()));
                }
                let saved = self.store.save(state)?;
                info!(target: "flow", path = %self.store.path().display(), "session persisted");
                saved.state
            }
        };
        page.apply_storage_state(&state.cookies_only())
            .await
            .map_err(|err| adapter_failure(QueryStage::SessionEnsured, err))
    }

    async fn open_dashboard(&self, page: &dyn BrowserPage, plan: &QueryPlan) -> Result<(), FlowError> {
        let stage = QueryStage::SessionEnsured;
        page.navigate(&plan.url, Duration::from_millis(self.policy.navigation_timeout_ms))
            .await
            .map_err(|err| adapter_failure(stage, err))?;
        settle(page, &self.policy.settle)
            .await
            .map_err(|err| adapter_failure(stage, err))?;
        if let Some(reason) = self
            .session_check
            .rejected(page)
            .await
            .map_err(|err| adapter_failure(stage, err))?
        {
            return Err(FlowError::SessionInvalid(reason));
        }
        if let Some(menu) = &plan.menu_item {
            let main = main_frame(page).await.map_err(|err| adapter_failure(stage, err))?;
            if click_if_present(page, &main, menu)
                .await
                .map_err(|err| adapter_failure(stage, err))?
            {
                settle(page, &self.policy.settle)
                    .await
                    .map_err(|err| adapter_failure(stage, err))?;
            }
        }
        Ok(())
    }

    /// A frame that never shows up may mean the session lapsed mid-flow;
    /// that is checked before reporting `FrameNotFound`.
    async fn frame_ready(&self, page: &dyn BrowserPage, plan: &QueryPlan) -> Result<FrameRef, FlowError> {
        let locator = FrameLocator::new(plan.frame.clone());
        match locator
            .wait_ready(page, &self.policy.waits.waiter(QueryStage::FrameReady))
            .await
        {
            Ok(found) => Ok(found.info.frame),
            Err(err) => {
                if !err.is_fatal() {
                    if let Ok(Some(reason)) = self.session_check.rejected(page).await {
                        return Err(FlowError::SessionInvalid(reason));
                    }
                }
                Err(locator_failure(err))
            }
        }
    }

    async fn set_parameters(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        plan: &QueryPlan,
        request: &QueryRequest,
    ) -> Result<(), FlowError> {
        let stage = QueryStage::ParametersSet;
        let filler = ParameterFiller::new(self.policy.waits.waiter(stage));
        for planned in &plan.fields {
            let Some(value) = planned.source.value(request) else {
                debug!(target: "flow", field = %planned.field.name, "no value; field left alone");
                continue;
            };
            filler
                .commit(page, frame, &planned.field, value)
                .await
                .map_err(|err| FlowError::stage(stage, err.failure_kind(), err))?;
        }
        for anchor in &plan.submit {
            if click_if_present(page, frame, anchor)
                .await
                .map_err(|err| adapter_failure(stage, err))?
            {
                debug!(target: "flow", submit = %anchor, "query submitted");
                break;
            }
        }
        settle(page, &self.policy.settle)
            .await
            .map_err(|err| adapter_failure(stage, err))
    }

    async fn set_range(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        selector: &RangeSelector,
        window: &ReportWindow,
    ) -> Result<(), FlowError> {
        let stage = QueryStage::RangeSet;
        let report = selector
            .apply(page, frame, window.label())
            .await
            .map_err(|err| FlowError::stage(stage, err.failure_kind(), err))?;
        if !report.unchanged {
            settle(page, &self.policy.settle)
                .await
                .map_err(|err| adapter_failure(stage, err))?;
        }
        Ok(())
    }
}

fn advance(reached: &mut QueryStage, stage: QueryStage) {
    if stage > *reached {
        debug!(target: "flow", stage = %stage, "stage reached");
        *reached = stage;
    }
}

fn adapter_failure(stage: QueryStage, err: AdapterError) -> FlowError {
    let kind = if err.is_fatal() {
        FailureKind::UnexpectedAutomationFailure
    } else {
        FailureKind::Timeout
    };
    FlowError::stage(stage, kind, err)
}

fn locator_failure(err: LocatorError) -> FlowError {
    let kind = if err.is_fatal() {
        FailureKind::UnexpectedAutomationFailure
    } else {
        FailureKind::FrameNotFound
    };
    FlowError::stage(QueryStage::FrameReady, kind, err)
}

async fn main_frame(page: &dyn BrowserPage) -> Result<FrameRef, AdapterError> {
    page.frames()
        .await?
        .into_iter()
        .find(|info| info.is_main())
        .map(|info| info.frame)
        .ok_or_else(|| AdapterError::new(AdapterErrorKind::TargetNotFound).with_hint("main frame"))
}

/// Click the first interactable match, if any. Non-fatal failures are
/// logged and read as "not present".
async fn click_if_present(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    anchor: &AnchorDescriptor,
) -> Result<bool, AdapterError> {
    let attempt = async {
        for element in page.query(frame, None, anchor).await? {
            if page.is_interactable(frame, &element).await? {
                page.click(frame, &element).await?;
                return Ok(true);
            }
        }
        Ok::<bool, AdapterError>(false)
    };
    match attempt.await {
        Ok(clicked) => Ok(clicked),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(target: "flow", %anchor, %err, "optional click skipped");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LoginFailure;
    use action_primitives::WaitPolicy;
    use async_trait::async_trait;
    use cdp_adapter::fake::{FakeNode, FakePage};
    use dashprobe_core_types::SerializedState;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    const BASE: &str = "https://ops.example.com";
    const LOGIN: &str = "https://login.example.com/sso";

    struct CountingLogin {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LoginProvider for CountingLogin {
        async fn perform_login(&self, _page: &dyn BrowserPage) -> Result<SerializedState, LoginFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SerializedState::from_cookies(vec![json!({"name": "SSO_TICKET", "value": "fresh"})]))
        }
    }

    fn quick_policy() -> FlowPolicy {
        let quick = WaitPolicy::fixed(Duration::from_millis(100), Duration::from_secs(1)).with_max_attempts(3);
        let mut policy = FlowPolicy::default();
        policy.waits.frame = quick.clone();
        policy.waits.field = quick.clone();
        policy.waits.range = quick.clone();
        policy.waits.table = quick;
        policy.backoff_ms = 100;
        policy
    }

    /// Success-rate page whose range list closes without applying.
    fn stubborn_range_page() -> FakePage {
        let plan = QueryPlan::success_rate(BASE);
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            let report = dom.add_frame(&main, "", "https://sls.example.com/report");
            dom.add(&report, None, FakeNode::new("span").matches("span.obviz-base-filterText").text("pid"));
            let filter = dom.add(&report, None, FakeNode::new("span").matches("span.obviz-base-filterInput"));
            dom.add(
                &report,
                Some(&filter),
                FakeNode::input().matches("span.obviz-base-filterInput input[autocomplete=\"off\"]"),
            );
            let range = plan.range.as_ref().map(|r| r.trigger_selector.clone()).unwrap_or_default();
            let trigger = dom.add(&report, None, FakeNode::new("div").matches(range.as_str()).text("7天"));
            let option = dom.add(&report, None, FakeNode::new("li").matches("li.obviz-base-li-block").text("30天").hidden());
            let shown = option.clone();
            dom.on_click(&trigger, move |dom| dom.show(&shown));
            let closed = option.clone();
            dom.on_click(&option, move |dom| dom.hide(&closed));
        });
        page
    }

    #[tokio::test(start_paused = true)]
    async fn range_failure_restarts_from_frame_without_renavigating() {
        let dir = TempDir::new().unwrap();
        let page = stubborn_range_page();
        let login = Arc::new(CountingLogin { calls: AtomicU32::new(0) });
        let orchestrator = QueryOrchestrator::new(
            Arc::new(page.clone()),
            SessionStore::new(dir.path().join("session.json")),
            login.clone(),
            QueryPlans::for_base_url(BASE),
        )
        .with_policy(quick_policy());

        let result = orchestrator.find_success_rate(&QueryRequest::new("100000103722927")).await;
        assert!(!result.success);
        assert_eq!(result.failure_kind(), Some(FailureKind::RangeSelectionFailed));
        assert_eq!(result.error.as_ref().and_then(|e| e.stage), Some(QueryStage::RangeSet));
        assert_eq!(result.attempts, 3);
        assert_eq!(result.window, Some(ReportWindow::default()));
        let calls = page.calls();
        assert_eq!(calls.navigations.len(), 1);
        assert_eq!(calls.fills.len(), 3, "parameters re-committed on each pass");
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_session_logs_in_once_more_then_gives_up() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        store
            .save(SerializedState::from_cookies(vec![json!({"name": "OLD", "value": "x"})]))
            .unwrap();
        let page = FakePage::new("about:blank");
        // The dashboard always bounces to the login page.
        page.with_dom(|dom| dom.require_cookie("NEVER_ISSUED", LOGIN));
        let login = Arc::new(CountingLogin { calls: AtomicU32::new(0) });
        let orchestrator = QueryOrchestrator::new(
            Arc::new(page.clone()),
            store,
            login.clone(),
            QueryPlans::for_base_url(BASE),
        )
        .with_policy(quick_policy())
        .with_session_check(SessionCheck::new(Some("login.example.com".into()), None));

        let result = orchestrator
            .find_ticket(&QueryRequest::new("100").with_sign_name("S"))
            .await;
        assert_eq!(result.failure_kind(), Some(FailureKind::SessionInvalid));
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
        assert_eq!(page.calls().navigations.len(), 2);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_page_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let page = FakePage::new("about:blank");
        page.crash();
        let login = Arc::new(CountingLogin { calls: AtomicU32::new(0) });
        let orchestrator = QueryOrchestrator::new(
            Arc::new(page),
            SessionStore::new(dir.path().join("session.json")),
            login,
            QueryPlans::for_base_url(BASE),
        )
        .with_policy(quick_policy());
        let result = orchestrator.find_ticket(&QueryRequest::new("100")).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::UnexpectedAutomationFailure));
        assert_eq!(result.attempts, 1);
    }
}
