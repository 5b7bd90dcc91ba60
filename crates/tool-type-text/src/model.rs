use action_locator::{LocateStep, LocatorStrategy};
use cdp_adapter::ElementRef;
use serde::{Deserialize, Serialize};

/// How a value is pushed into the field.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMethod {
    /// Set the value in one step and fire input/change.
    Fill,
    /// Clear, then type keystroke by keystroke.
    Type,
}

impl CommitMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CommitMethod::Fill => "fill",
            CommitMethod::Type => "type",
        }
    }
}

fn default_commit() -> Vec<CommitMethod> {
    vec![CommitMethod::Fill, CommitMethod::Type]
}

/// One query input: how to find it and how to commit to it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Lookup strategies in fallback order.
    pub locate: Vec<LocateStep>,
    /// Commit methods tried in order until the read-back matches.
    #[serde(default = "default_commit")]
    pub commit: Vec<CommitMethod>,
    /// Key pressed on the field after a verified commit, e.g. `Enter`.
    #[serde(default)]
    pub submit_key: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, locate: Vec<LocateStep>) -> Self {
        Self {
            name: name.into(),
            locate,
            commit: default_commit(),
            submit_key: None,
        }
    }

    pub fn submit_with(mut self, key: impl Into<String>) -> Self {
        self.submit_key = Some(key.into());
        self
    }

    pub fn commit_with(mut self, methods: Vec<CommitMethod>) -> Self {
        self.commit = methods;
        self
    }
}

/// What a successful commit looked like.
#[derive(Clone, Debug, PartialEq)]
pub struct FillReport {
    pub field: String,
    pub element: ElementRef,
    pub strategy: LocatorStrategy,
    pub method: CommitMethod,
    pub committed: String,
    pub submitted: bool,
}

/// Committed and expected values agree once surrounding whitespace is ignored.
pub fn values_match(expected: &str, actual: &str) -> bool {
    expected.trim() == actual.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_spec_defaults_to_fill_then_type() {
        let spec: FieldSpec = serde_json::from_str(
            r##"{"name": "PartnerId", "locate": [{"css": "#PartnerId"}]}"##,
        )
        .unwrap();
        assert_eq!(spec.commit, vec![CommitMethod::Fill, CommitMethod::Type]);
        assert!(spec.submit_key.is_none());
    }

    #[test]
    fn values_match_ignores_outer_whitespace_only() {
        assert!(values_match("100000103722927", " 100000103722927 "));
        assert!(!values_match("100000103722927", "100 000103722927"));
    }
}
