//! End-to-end query scenarios against the in-memory page.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use action_flow::{LoginFailure, LoginProvider, QueryOrchestrator, QueryPlans, SessionCheck};
use action_primitives::WaitPolicy;
use async_trait::async_trait;
use cdp_adapter::fake::{FakeNode, FakePage};
use cdp_adapter::{BrowserPage, ElementRef};
use dashprobe_core_types::{FailureKind, QueryRequest, QueryStage, ReportWindow, SerializedState};
use dashprobe_session_store::SessionStore;
use serde_json::json;
use tempfile::TempDir;

const BASE: &str = "https://ops.example.com";
const LOGIN_URL: &str = "https://login.example.com/sso";
const SESSION_COOKIE: &str = "SSO_TICKET";

const TICKET_ROW: &str = "tr.dumbo-antd-0-1-18-table-row:not([aria-hidden='true'])";
const TICKET_CELL: &str = "td.dumbo-antd-0-1-18-table-cell";

struct CountingLogin {
    calls: AtomicU32,
}

impl CountingLogin {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginProvider for CountingLogin {
    async fn perform_login(&self, _page: &dyn BrowserPage) -> Result<SerializedState, LoginFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SerializedState::from_cookies(vec![
            json!({"name": SESSION_COOKIE, "value": "fresh", "domain": ".example.com"}),
        ]))
    }
}

fn quick_policy() -> action_flow::FlowPolicy {
    let quick = WaitPolicy::fixed(Duration::from_millis(100), Duration::from_secs(1)).with_max_attempts(4);
    let mut policy = action_flow::FlowPolicy::default();
    policy.waits.frame = quick.clone();
    policy.waits.field = quick.clone();
    policy.waits.range = quick.clone();
    policy.waits.table = quick;
    policy.backoff_ms = 100;
    policy
}

fn orchestrator(page: &FakePage, store: SessionStore, login: Arc<CountingLogin>) -> QueryOrchestrator {
    QueryOrchestrator::new(Arc::new(page.clone()), store, login, QueryPlans::for_base_url(BASE))
        .with_policy(quick_policy())
        .with_session_check(SessionCheck::new(Some("login.example.com".into()), None))
}

/// Signature search page with one table row per `(ticket, sign, modified)`.
fn ticket_page(rows: &[(&str, &str, &str)]) -> FakePage {
    let page = FakePage::new("about:blank");
    page.with_dom(|dom| {
        let main = dom.main_frame();
        dom.add(&main, None, FakeNode::input().matches("#PartnerId"));
        dom.add(&main, None, FakeNode::input().matches("#SignName"));
        dom.add(&main, None, FakeNode::new("button").text("查 询"));
        let body = dom.add(&main, None, FakeNode::new("tbody"));
        for (ticket, sign, modified) in rows {
            let row = dom.add(&main, Some(&body), FakeNode::new("tr").matches(TICKET_ROW));
            for text in [*ticket, *sign, *modified] {
                dom.add(&main, Some(&row), FakeNode::new("td").matches(TICKET_CELL).text(text));
            }
        }
    });
    page
}

fn store_in(dir: &TempDir) -> SessionStore {
    SessionStore::new(dir.path().join("session.json"))
}

#[tokio::test(start_paused = true)]
async fn latest_ticket_for_sign_is_selected_after_first_login() {
    let dir = TempDir::new().unwrap();
    let page = ticket_page(&[
        ("工单 3301", "国能e购", "2024-01-10 09:00:00"),
        ("工单 3302", "国能e购", "2024-01-12 18:30:00"),
        ("工单 3303", "其他签名", "2024-02-01 08:00:00"),
    ]);
    let login = CountingLogin::new();
    let store = store_in(&dir);
    assert!(store.load().is_none());

    let result = orchestrator(&page, store_in(&dir), login.clone())
        .find_ticket(&QueryRequest::new("100000103722927").with_sign_name("国能e购"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.ticket_id(), Some("3302"));
    assert_eq!(result.total_count, 2);
    assert_eq!(result.attempts, 1);
    assert!(result.window.is_none());
    assert_eq!(login.calls(), 1);
    assert!(dir.path().join("session.json").exists());
    assert!(store.load_valid().is_some());

    let calls = page.calls();
    assert_eq!(calls.applied_states, 1);
    assert_eq!(
        calls.fills.iter().map(|(_, value)| value.as_str()).collect::<Vec<_>>(),
        vec!["100000103722927", "国能e购"]
    );
}

#[tokio::test(start_paused = true)]
async fn stored_session_is_reused() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store
        .save(SerializedState::from_cookies(vec![json!({"name": SESSION_COOKIE, "value": "kept"})]))
        .unwrap();
    let page = ticket_page(&[("9", "S", "2024-03-01")]);
    page.with_dom(|dom| dom.require_cookie(SESSION_COOKIE, LOGIN_URL));
    let login = CountingLogin::new();

    let result = orchestrator(&page, store, login.clone())
        .find_ticket(&QueryRequest::new("1"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.ticket_id(), Some("9"));
    assert_eq!(login.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_matching_rows_is_terminal_and_not_retried() {
    let dir = TempDir::new().unwrap();
    let page = ticket_page(&[("1", "别的签名", "2024-01-10"), ("2", "别的签名", "2024-01-11")]);
    let result = orchestrator(&page, store_in(&dir), CountingLogin::new())
        .find_ticket(&QueryRequest::new("100").with_sign_name("国能e购"))
        .await;

    assert!(!result.success);
    assert!(result.is_no_data());
    assert_eq!(result.failure_kind(), Some(FailureKind::NoMatchingData));
    assert_eq!(result.attempts, 1);
    assert_eq!(page.calls().navigations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_cookie_triggers_one_relogin_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store
        .save(SerializedState::from_cookies(vec![json!({"name": "LEGACY", "value": "stale"})]))
        .unwrap();
    let page = ticket_page(&[("77", "S", "2024-01-10")]);
    page.with_dom(|dom| dom.require_cookie(SESSION_COOKIE, LOGIN_URL));
    let login = CountingLogin::new();

    let result = orchestrator(&page, store, login.clone())
        .find_ticket(&QueryRequest::new("1"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(login.calls(), 1);
    assert_eq!(result.attempts, 1);
    let calls = page.calls();
    assert_eq!(calls.navigations.len(), 2);
    assert_eq!(calls.applied_states, 2);
    let saved = store_in(&dir).load_valid().unwrap();
    assert!(saved.state.cookies().iter().any(|c| c["name"] == SESSION_COOKIE));
}

#[tokio::test(start_paused = true)]
async fn missing_frame_is_retried_then_reported() {
    let dir = TempDir::new().unwrap();
    let page = FakePage::new("about:blank");
    let result = orchestrator(&page, store_in(&dir), CountingLogin::new())
        .find_ticket(&QueryRequest::new("1"))
        .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::FrameNotFound));
    assert_eq!(result.error.as_ref().and_then(|e| e.stage), Some(QueryStage::FrameReady));
    assert_eq!(result.attempts, 3);
    assert_eq!(page.calls().navigations.len(), 1);
}

/// Success-rate dashboard: a log-service report frame holding the pid
/// filter, the window control and two charts, only one of which counts.
fn success_rate_page(rows: &[[&str; 11]]) -> FakePage {
    let page = FakePage::new("about:blank");
    page.with_dom(|dom| {
        let main = dom.main_frame();
        dom.add(&main, None, FakeNode::new("a").text("求德大盘"));
        let report = dom.add_frame(&main, "", "https://sls.example.com/report");

        dom.add(&report, None, FakeNode::new("span").matches("span.obviz-base-filterText").text("pid"));
        let filter = dom.add(&report, None, FakeNode::new("span").matches("span.obviz-base-filterInput"));
        dom.add(
            &report,
            Some(&filter),
            FakeNode::input().matches("span.obviz-base-filterInput input[autocomplete=\"off\"]"),
        );

        let trigger = dom.add(
            &report,
            None,
            FakeNode::new("div").matches("div[data-spm-click*=\"time\"]").text("7天"),
        );
        let list = dom.add(&report, None, FakeNode::new("ul").hidden());
        for label in ["当天", "7天", "30天"] {
            let option = dom.add(&report, Some(&list), FakeNode::new("li").matches("li.obviz-base-li-block").text(label));
            let (shown, list) = (trigger.clone(), list.clone());
            dom.on_click(&option, move |dom| {
                dom.set_text(&shown, label);
                dom.hide(&list);
            });
        }
        let opened = list.clone();
        dom.on_click(&trigger, move |dom| dom.show(&opened));

        add_chart(dom, &report, "sls_chart_1", "客户维度汇总", &[["other", "x", "", "", "", "", "", "1%", "", "", ""]]);
        add_chart(dom, &report, "sls_chart_2", "客户签名视角 -剔除重试过程", rows);
    });
    page
}

fn add_chart(
    dom: &mut cdp_adapter::fake::FakeDom,
    frame: &cdp_adapter::FrameRef,
    id: &str,
    title: &str,
    rows: &[[&str; 11]],
) {
    let chart = dom.add(frame, None, FakeNode::new("div").matches(format!("#{id}")).matches("div[id^=\"sls_chart_\"]"));
    dom.add(frame, Some(&chart), FakeNode::new("div").matches("div[class*=\"title\"]").text(title));
    let body = dom.add(frame, Some(&chart), FakeNode::new("div"));
    let header = ["pid", "signname", "sms_type", "submit_count", "receipt_count", "receipt_success_count",
        "receipt_rate", "receipt_success_rate", "receipt_rate_10s", "receipt_rate_30s", "receipt_rate_60s"];
    let mut all: Vec<[&str; 11]> = vec![header];
    all.extend_from_slice(rows);
    for cells in all {
        let row: ElementRef = dom.add(
            frame,
            Some(&body),
            FakeNode::new("div").matches("div.obviz-base-easyTable-body div.obviz-base-easyTable-row"),
        );
        for text in cells {
            dom.add(frame, Some(&row), FakeNode::new("div").matches("div.obviz-base-easyTable-cell").text(text));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn success_rate_reads_titled_chart_for_customer() {
    let dir = TempDir::new().unwrap();
    let page = success_rate_page(&[
        ["100000103722927", "国能e购", "验证码", "120", "118", "117", "98%", "97.5%", "90%", "95%", "96%"],
        ["100000103722927", "国能商城", "通知", "40", "40", "39", "100%", "97.5%", "88%", "92%", "97%"],
        ["200", "别家", "验证码", "5", "5", "5", "100%", "100%", "100%", "100%", "100%"],
    ]);
    let login = CountingLogin::new();

    let result = orchestrator(&page, store_in(&dir), login.clone())
        .find_success_rate(&QueryRequest::new("100000103722927"))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.total_count, 2);
    assert_eq!(result.success_rate.as_deref(), Some("97.5%"));
    assert_eq!(result.window, Some(ReportWindow::default()));
    assert_eq!(result.rows.len(), 2);
    assert_eq!(login.calls(), 1);
    let calls = page.calls();
    assert!(calls.keys.iter().any(|key| key == "Enter"));
    assert_eq!(calls.navigations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn crashed_browser_fails_fast() {
    let dir = TempDir::new().unwrap();
    let page = ticket_page(&[("1", "S", "2024-01-10")]);
    page.crash();
    let result = orchestrator(&page, store_in(&dir), CountingLogin::new())
        .find_ticket(&QueryRequest::new("1"))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::UnexpectedAutomationFailure));
    assert_eq!(result.attempts, 1);
}
