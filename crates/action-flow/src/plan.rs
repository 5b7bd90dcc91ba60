//! One pipeline, two parameterizations: what differs between the ticket
//! query and the success-rate query is data, not code.

use action_locator::{FrameSignature, LocateStep, StructuralHint};
use cdp_adapter::AnchorDescriptor;
use dashprobe_core_types::{QueryKind, QueryRequest};
use perceiver_table::{ChartTitle, ColumnRole, TableColumn, TableSpec};
use serde::{Deserialize, Serialize};
use tool_select_option::RangeSpec;
use tool_type_text::FieldSpec;

/// Which request value feeds a field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamSource {
    CustomerId,
    SignName,
}

impl ParamSource {
    /// `None` means the field is left alone for this request.
    pub fn value<'a>(&self, request: &'a QueryRequest) -> Option<&'a str> {
        match self {
            ParamSource::CustomerId => Some(request.customer_id.trim()).filter(|id| !id.is_empty()),
            ParamSource::SignName => request.sign_filter(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanField {
    pub source: ParamSource,
    pub field: FieldSpec,
}

/// Selectors and layout for one query kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub kind: QueryKind,
    pub url: String,
    /// Clicked after navigation when present, e.g. a dashboard tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_item: Option<AnchorDescriptor>,
    pub frame: FrameSignature,
    pub fields: Vec<PlanField>,
    /// Any one of these is clicked after the fields, when present.
    #[serde(default)]
    pub submit: Vec<AnchorDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangeSpec>,
    pub table: TableSpec,
}

const TICKET_PATH: &str = "/dysms/dysms_sa/analyze_search/sign";
const SUCCESS_RATE_PATH: &str = "/dysms/dysms_schedule_data_center/dysms_datacenter_recommend_failure";

impl QueryPlan {
    /// Signature search page: inputs live in the main document and the table
    /// lists tickets with their last-modified time.
    pub fn ticket(base_url: &str) -> Self {
        let cell = "td.dumbo-antd-0-1-18-table-cell";
        Self {
            kind: QueryKind::Ticket,
            url: join(base_url, TICKET_PATH),
            menu_item: None,
            frame: FrameSignature::new(vec![AnchorDescriptor::css("#PartnerId")]),
            fields: vec![
                PlanField {
                    source: ParamSource::CustomerId,
                    field: FieldSpec::new(
                        "PartnerId",
                        vec![
                            LocateStep::Css("#PartnerId".into()),
                            LocateStep::Css("input[placeholder*=\"PID\"]".into()),
                        ],
                    ),
                },
                PlanField {
                    source: ParamSource::SignName,
                    field: FieldSpec::new(
                        "SignName",
                        vec![
                            LocateStep::Css("#SignName".into()),
                            LocateStep::Aria {
                                role: "textbox".into(),
                                name: "签名名称".into(),
                            },
                        ],
                    ),
                },
            ],
            submit: vec![AnchorDescriptor::text("查 询"), AnchorDescriptor::text("搜 索")],
            range: None,
            table: TableSpec::new(
                "tr.dumbo-antd-0-1-18-table-row:not([aria-hidden='true'])",
                cell,
                vec![
                    TableColumn::role("ticket", ColumnRole::Ticket),
                    TableColumn::role("sign_name", ColumnRole::SignName),
                    TableColumn::role("modified", ColumnRole::Modified),
                ],
            ),
        }
    }

    /// Success-rate dashboard: an embedded log-service report with a `pid`
    /// filter, a time-window control and a per-signature table.
    pub fn success_rate(base_url: &str) -> Self {
        Self {
            kind: QueryKind::SuccessRate,
            url: join(base_url, SUCCESS_RATE_PATH),
            menu_item: Some(AnchorDescriptor::text("求德大盘")),
            frame: FrameSignature::new(vec![AnchorDescriptor::css("span.obviz-base-filterText")])
                .ready_when(vec![
                    AnchorDescriptor::css("input"),
                    AnchorDescriptor::css("span.obviz-base-filterText"),
                ]),
            fields: vec![PlanField {
                source: ParamSource::CustomerId,
                field: FieldSpec::new(
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
                            activate_selector: Some("div.obviz-base-easy-select-value".into()),
                        }),
                    ],
                )
                .submit_with("Enter"),
            }],
            submit: Vec::new(),
            range: Some(RangeSpec::new("div[data-spm-click*=\"time\"]", "li.obviz-base-li-block")),
            table: TableSpec::new(
                "div.obviz-base-easyTable-body div.obviz-base-easyTable-row",
                "div.obviz-base-easyTable-cell",
                [
                    ("pid", Some(ColumnRole::Customer)),
                    ("signname", Some(ColumnRole::SignName)),
                    ("sms_type", None),
                    ("submit_count", None),
                    ("receipt_count", None),
                    ("receipt_success_count", None),
                    ("receipt_rate", None),
                    ("receipt_success_rate", Some(ColumnRole::SuccessRate)),
                    ("receipt_rate_10s", None),
                    ("receipt_rate_30s", None),
                    ("receipt_rate_60s", None),
                ]
                .into_iter()
                .map(|(name, role)| match role {
                    Some(role) => TableColumn::role(name, role),
                    None => TableColumn::field(name),
                })
                .collect(),
            )
            .under_title(ChartTitle {
                selector: "div[class*=\"title\"]".into(),
                text: "客户签名视角 -剔除重试过程".into(),
                container_selector: "div[id^=\"sls_chart_\"]".into(),
            })
            .prefer_text_in("div[class*=\"split-container\"] span")
            .header_when(0, &["pid", "客户pid"])
            .header_when(1, &["signname", "签名"]),
        }
    }
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Both plans the orchestrator can run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryPlans {
    pub ticket: QueryPlan,
    pub success_rate: QueryPlan,
}

impl QueryPlans {
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            ticket: QueryPlan::ticket(base_url),
            success_rate: QueryPlan::success_rate(base_url),
        }
    }

    pub fn get(&self, kind: QueryKind) -> &QueryPlan {
        match kind {
            QueryKind::Ticket => &self.ticket,
            QueryKind::SuccessRate => &self.success_rate,
        }
    }
}
