use serde::{Deserialize, Serialize};
use std::fmt;

/// How an element is looked up on the page.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum AnchorDescriptor {
    /// CSS selector evaluated relative to the scope.
    Css(String),
    /// ARIA role plus accessible name (case-insensitive, trimmed).
    Aria { role: String, name: String },
    /// Visible text of the innermost element carrying it.
    Text { content: String, exact: bool },
}

impl AnchorDescriptor {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn aria(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Aria {
            role: role.into(),
            name: name.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            exact: true,
        }
    }

    pub fn text_contains(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            exact: false,
        }
    }

    /// Short label used in logs.
    pub fn strategy(&self) -> &'static str {
        match self {
            AnchorDescriptor::Css(_) => "css",
            AnchorDescriptor::Aria { .. } => "aria",
            AnchorDescriptor::Text { .. } => "text",
        }
    }
}

impl fmt::Display for AnchorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnchorDescriptor::Css(selector) => write!(f, "css={selector}"),
            AnchorDescriptor::Aria { role, name } => write!(f, "aria={role}[name={name:?}]"),
            AnchorDescriptor::Text { content, exact } => {
                if *exact {
                    write!(f, "text={content:?}")
                } else {
                    write!(f, "text~={content:?}")
                }
            }
        }
    }
}

/// Collapse whitespace runs and trim; the comparison form for text anchors.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
