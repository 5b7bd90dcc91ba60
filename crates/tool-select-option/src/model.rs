use std::collections::BTreeMap;

use cdp_adapter::normalize_text;
use serde::{Deserialize, Serialize};

/// Reporting-window control description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeSpec {
    /// Opens the option list; its text is the currently applied window.
    pub trigger_selector: String,
    pub option_selector: String,
    /// Element whose text changes when the report reloads, if any.
    #[serde(default)]
    pub refresh_marker: Option<String>,
    /// Window label to the option texts that stand for it.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Key sent to dismiss the list when no option matched.
    #[serde(default = "default_dismiss_key")]
    pub dismiss_key: String,
}

fn default_dismiss_key() -> String {
    "Escape".to_string()
}

pub fn default_aliases() -> BTreeMap<String, Vec<String>> {
    [
        ("当天", vec!["当天", "今天", "今日"]),
        ("本周", vec!["本周", "本周（相对）"]),
        ("一周", vec!["一周", "7天", "7天（相对）"]),
        ("上周", vec!["上周", "上周（相对）"]),
        ("30天", vec!["30天", "30天（相对）"]),
    ]
    .into_iter()
    .map(|(label, texts)| {
        (
            label.to_string(),
            texts.into_iter().map(str::to_string).collect(),
        )
    })
    .collect()
}

impl RangeSpec {
    pub fn new(trigger_selector: impl Into<String>, option_selector: impl Into<String>) -> Self {
        Self {
            trigger_selector: trigger_selector.into(),
            option_selector: option_selector.into(),
            refresh_marker: None,
            aliases: default_aliases(),
            dismiss_key: default_dismiss_key(),
        }
    }

    pub fn with_refresh_marker(mut self, selector: impl Into<String>) -> Self {
        self.refresh_marker = Some(selector.into());
        self
    }

    /// Option texts accepted for `label`; the label itself when unmapped.
    pub fn texts_for(&self, label: &str) -> Vec<String> {
        let label = label.trim();
        match self.aliases.get(label) {
            Some(texts) if !texts.is_empty() => texts.clone(),
            _ => vec![label.to_string()],
        }
    }
}

/// How an option's text was matched.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
    Contains,
}

/// Pick the option for `wanted`: exact over every alias first, then
/// case-insensitive, then containment.
pub fn match_option(options: &[String], wanted: &[String]) -> Option<(usize, MatchKind)> {
    let options: Vec<String> = options.iter().map(|o| normalize_text(o)).collect();
    let wanted: Vec<String> = wanted.iter().map(|w| normalize_text(w)).collect();

    let passes: [(MatchKind, fn(&str, &str) -> bool); 3] = [
        (MatchKind::Exact, |option, want| option == want),
        (MatchKind::CaseInsensitive, |option, want| {
            option.to_lowercase() == want.to_lowercase()
        }),
        (MatchKind::Contains, |option, want| {
            !want.is_empty() && option.to_lowercase().contains(&want.to_lowercase())
        }),
    ];
    for (kind, matches) in passes {
        for want in &wanted {
            if let Some(index) = options.iter().position(|option| matches(option, want)) {
                return Some((index, kind));
            }
        }
    }
    None
}

/// Whether the control's visible label already shows one of `wanted`.
pub fn label_shows(label: &str, wanted: &[String]) -> bool {
    let label = normalize_text(label).to_lowercase();
    !label.is_empty()
        && wanted
            .iter()
            .map(|w| normalize_text(w).to_lowercase())
            .any(|w| !w.is_empty() && label.contains(&w))
}

/// What a successful selection looked like.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectReport {
    pub label: String,
    pub option_text: Option<String>,
    pub matched: Option<MatchKind>,
    /// Already applied; nothing was clicked.
    pub unchanged: bool,
    /// Confirmed through the refresh marker rather than the label.
    pub via_refresh: bool,
}
