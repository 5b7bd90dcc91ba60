//! Core types for frame and element location

use std::fmt;

use cdp_adapter::{AnchorDescriptor, ElementRef, FrameInfo};
use serde::{Deserialize, Serialize};

/// Lookup strategies, in the order a fallback chain normally tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Precise attribute / CSS match
    Css,
    /// Role plus accessible name
    AriaAx,
    /// Visible text
    Text,
    /// Label, container, then the input inside it
    Structural,
}

impl LocatorStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Css => "css",
            LocatorStrategy::AriaAx => "aria-ax",
            LocatorStrategy::Text => "text",
            LocatorStrategy::Structural => "structural",
        }
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Positional heuristic: find a label by its text, climb to the enclosing
/// container, take the input inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralHint {
    /// Label text, compared trimmed and case-insensitively.
    pub label_text: String,
    /// Narrows label candidates; without it any element whose own text
    /// matches is a label.
    #[serde(default)]
    pub label_selector: Option<String>,
    pub container_selector: String,
    #[serde(default = "default_input_selector")]
    pub input_selector: String,
    /// Clicked inside the container when the input is present but hidden.
    #[serde(default)]
    pub activate_selector: Option<String>,
}

fn default_input_selector() -> String {
    "input".to_string()
}

/// One link of a fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocateStep {
    Css(String),
    Aria { role: String, name: String },
    Text(String),
    Structural(StructuralHint),
}

impl LocateStep {
    pub fn strategy(&self) -> LocatorStrategy {
        match self {
            LocateStep::Css(_) => LocatorStrategy::Css,
            LocateStep::Aria { .. } => LocatorStrategy::AriaAx,
            LocateStep::Text(_) => LocatorStrategy::Text,
            LocateStep::Structural(_) => LocatorStrategy::Structural,
        }
    }

    /// Anchor for the single-query steps; `None` for structural.
    pub fn anchor(&self) -> Option<AnchorDescriptor> {
        match self {
            LocateStep::Css(selector) => Some(AnchorDescriptor::css(selector.clone())),
            LocateStep::Aria { role, name } => Some(AnchorDescriptor::aria(role.clone(), name.clone())),
            LocateStep::Text(content) => Some(AnchorDescriptor::text(content.clone())),
            LocateStep::Structural(_) => None,
        }
    }
}

impl fmt::Display for LocateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateStep::Structural(hint) => write!(
                f,
                "structural(label={:?} -> {} -> {})",
                hint.label_text, hint.container_selector, hint.input_selector
            ),
            other => match other.anchor() {
                Some(anchor) => write!(f, "{anchor}"),
                None => Ok(()),
            },
        }
    }
}

/// Content-based identity of the report frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSignature {
    /// The frame matches when any of these finds at least one element.
    pub any_of: Vec<AnchorDescriptor>,
    /// Extra elements whose presence means the frame finished rendering.
    /// Empty means a signature match is enough.
    #[serde(default)]
    pub ready_when: Vec<AnchorDescriptor>,
}

impl FrameSignature {
    pub fn new(any_of: Vec<AnchorDescriptor>) -> Self {
        Self {
            any_of,
            ready_when: Vec::new(),
        }
    }

    pub fn ready_when(mut self, anchors: Vec<AnchorDescriptor>) -> Self {
        self.ready_when = anchors;
        self
    }
}

impl fmt::Display for FrameSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.any_of.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", parts.join(" | "))
    }
}

/// Outcome of a successful chain walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub element: ElementRef,
    pub strategy: LocatorStrategy,
    /// Position of the winning step in the chain.
    pub step: usize,
    /// The input had to be revealed by clicking an activator first.
    pub activated: bool,
}

/// A located frame together with how it was recognised.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedFrame {
    pub info: FrameInfo,
    pub matched: AnchorDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_deserialize_from_config_shape() {
        let raw = r#"[
            {"css": "span.obviz-base-filterInput input[autocomplete=\"off\"]"},
            {"aria": {"role": "textbox", "name": "pid"}},
            {"structural": {
                "label_text": "pid",
                "label_selector": "span.obviz-base-filterText",
                "container_selector": "div.obviz-base-easy-select-inner",
                "activate_selector": "div.obviz-base-easy-select-value"
            }}
        ]"#;
        let steps: Vec<LocateStep> = serde_json::from_str(raw).unwrap();
        let strategies: Vec<_> = steps.iter().map(LocateStep::strategy).collect();
        assert_eq!(
            strategies,
            vec![LocatorStrategy::Css, LocatorStrategy::AriaAx, LocatorStrategy::Structural]
        );
        match &steps[2] {
            LocateStep::Structural(hint) => assert_eq!(hint.input_selector, "input"),
            other => panic!("unexpected step {other:?}"),
        }
        assert!(steps[2].anchor().is_none());
    }
}
