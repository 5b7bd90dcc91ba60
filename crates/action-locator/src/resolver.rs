//! Ordered fallback chain over independent lookup strategies.

use std::sync::Arc;

use async_trait::async_trait;
use cdp_adapter::{normalize_text, AdapterError, AnchorDescriptor, BrowserPage, ElementRef, FrameRef};
use tracing::{debug, info, warn};

use crate::types::{LocateStep, LocatorStrategy, Resolution, StructuralHint};

/// What one strategy found: interactable matches plus whether an activator
/// had to be clicked.
#[derive(Debug, Default)]
pub struct Candidates {
    pub elements: Vec<ElementRef>,
    pub activated: bool,
}

/// One independent way of finding an element.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Interactable elements this strategy resolves to in `frame`.
    async fn candidates(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
    ) -> Result<Candidates, AdapterError>;

    fn strategy_type(&self) -> LocatorStrategy;

    fn describe(&self) -> String;
}

/// CSS, ARIA or text lookup: a single query, filtered to interactable hits.
pub struct AnchorStrategy {
    anchor: AnchorDescriptor,
    strategy: LocatorStrategy,
}

impl AnchorStrategy {
    pub fn new(anchor: AnchorDescriptor, strategy: LocatorStrategy) -> Self {
        Self { anchor, strategy }
    }
}

#[async_trait]
impl Strategy for AnchorStrategy {
    async fn candidates(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
    ) -> Result<Candidates, AdapterError> {
        let found = page.query(frame, None, &self.anchor).await?;
        Ok(Candidates {
            elements: interactable(page, frame, found).await?,
            activated: false,
        })
    }

    fn strategy_type(&self) -> LocatorStrategy {
        self.strategy
    }

    fn describe(&self) -> String {
        self.anchor.to_string()
    }
}

/// Label text, then enclosing container, then the input inside it.
pub struct StructuralStrategy {
    hint: StructuralHint,
}

impl StructuralStrategy {
    pub fn new(hint: StructuralHint) -> Self {
        Self { hint }
    }

    async fn labels(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
    ) -> Result<Vec<ElementRef>, AdapterError> {
        let want = normalize_text(&self.hint.label_text).to_lowercase();
        let Some(selector) = &self.hint.label_selector else {
            return page
                .query(frame, None, &AnchorDescriptor::text(self.hint.label_text.clone()))
                .await;
        };
        let mut labels = Vec::new();
        for label in page.query(frame, None, &AnchorDescriptor::css(selector.clone())).await? {
            let text = normalize_text(&page.read_text(frame, &label).await?).to_lowercase();
            if text == want {
                labels.push(label);
            }
        }
        Ok(labels)
    }

    /// Input inside `container`, clicking the activator first when the
    /// input exists but is not yet usable.
    async fn input_in(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
        container: &ElementRef,
    ) -> Result<(Option<ElementRef>, bool), AdapterError> {
        let input_anchor = AnchorDescriptor::css(self.hint.input_selector.clone());
        let Some(input) = page
            .query(frame, Some(container), &input_anchor)
            .await?
            .into_iter()
            .next()
        else {
            return Ok((None, false));
        };
        if page.is_interactable(frame, &input).await? {
            return Ok((Some(input), false));
        }
        let Some(activator) = &self.hint.activate_selector else {
            return Ok((None, false));
        };
        let activators = page
            .query(frame, Some(container), &AnchorDescriptor::css(activator.clone()))
            .await?;
        let Some(activator) = activators.first() else {
            return Ok((None, false));
        };
        debug!(target: "locator", %activator, "activating hidden input");
        page.click(frame, activator).await?;
        if page.is_interactable(frame, &input).await? {
            Ok((Some(input), true))
        } else {
            Ok((None, true))
        }
    }
}

#[async_trait]
impl Strategy for StructuralStrategy {
    async fn candidates(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
    ) -> Result<Candidates, AdapterError> {
        let mut found = Candidates::default();
        for label in self.labels(page, frame).await? {
            let Some(container) = page
                .closest(frame, &label, &self.hint.container_selector)
                .await?
            else {
                continue;
            };
            let (input, activated) = self.input_in(page, frame, &container).await?;
            found.activated |= activated;
            if let Some(input) = input {
                if !found.elements.contains(&input) {
                    found.elements.push(input);
                }
            }
        }
        Ok(found)
    }

    fn strategy_type(&self) -> LocatorStrategy {
        LocatorStrategy::Structural
    }

    fn describe(&self) -> String {
        LocateStep::Structural(self.hint.clone()).to_string()
    }
}

async fn interactable(
    page: &dyn BrowserPage,
    frame: &FrameRef,
    elements: Vec<ElementRef>,
) -> Result<Vec<ElementRef>, AdapterError> {
    let mut usable = Vec::with_capacity(elements.len());
    for element in elements {
        if page.is_interactable(frame, &element).await? {
            usable.push(element);
        }
    }
    Ok(usable)
}

fn strategy_for(step: &LocateStep) -> Arc<dyn Strategy> {
    match step {
        LocateStep::Css(selector) => Arc::new(AnchorStrategy::new(
            AnchorDescriptor::css(selector.clone()),
            LocatorStrategy::Css,
        )),
        LocateStep::Aria { role, name } => Arc::new(AnchorStrategy::new(
            AnchorDescriptor::aria(role.clone(), name.clone()),
            LocatorStrategy::AriaAx,
        )),
        LocateStep::Text(content) => Arc::new(AnchorStrategy::new(
            AnchorDescriptor::text(content.clone()),
            LocatorStrategy::Text,
        )),
        LocateStep::Structural(hint) => Arc::new(StructuralStrategy::new(hint.clone())),
    }
}

/// Walks strategies in order; the first yielding exactly one interactable
/// element wins.
pub struct FallbackResolver {
    chain: Vec<Arc<dyn Strategy>>,
}

impl FallbackResolver {
    pub fn new(chain: Vec<Arc<dyn Strategy>>) -> Self {
        Self { chain }
    }

    pub fn from_steps(steps: &[LocateStep]) -> Self {
        Self {
            chain: steps.iter().map(strategy_for).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// `Ok(None)` once every strategy missed or was ambiguous. Only fatal
    /// page faults are returned as errors; other strategy errors count as a
    /// miss for that strategy.
    pub async fn resolve(
        &self,
        page: &dyn BrowserPage,
        frame: &FrameRef,
    ) -> Result<Option<Resolution>, AdapterError> {
        for (step, strategy) in self.chain.iter().enumerate() {
            let kind = strategy.strategy_type();
            match strategy.candidates(page, frame).await {
                Ok(mut found) if found.elements.len() == 1 => {
                    let element = found.elements.remove(0);
                    info!(target: "locator", strategy = %kind, step, %element, "element resolved");
                    return Ok(Some(Resolution {
                        element,
                        strategy: kind,
                        step,
                        activated: found.activated,
                    }));
                }
                Ok(found) if found.elements.is_empty() => {
                    debug!(target: "locator", strategy = %kind, lookup = %strategy.describe(), "no candidates");
                }
                Ok(found) => {
                    warn!(
                        target: "locator",
                        strategy = %kind,
                        count = found.elements.len(),
                        lookup = %strategy.describe(),
                        "ambiguous match; trying next strategy"
                    );
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(target: "locator", strategy = %kind, %err, "strategy failed");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::fake::{FakeNode, FakePage};

    fn pid_chain() -> Vec<LocateStep> {
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
        ]
    }

    #[tokio::test]
    async fn precise_strategy_wins_when_present() {
        let page = FakePage::new("about:blank");
        let input = page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(
                &main,
                None,
                FakeNode::input()
                    .matches("span.obviz-base-filterInput input[autocomplete=\"off\"]")
                    .role("textbox", "pid"),
            )
        });
        let resolver = FallbackResolver::from_steps(&pid_chain());
        let resolution = resolver.resolve(&page, &page.main_frame()).await.unwrap().unwrap();
        assert_eq!(resolution.element, input);
        assert_eq!(resolution.strategy, LocatorStrategy::Css);
        assert_eq!(resolution.step, 0);
    }

    #[tokio::test]
    async fn ambiguous_match_falls_through_to_role() {
        let page = FakePage::new("about:blank");
        let target = page.with_dom(|dom| {
            let main = dom.main_frame();
            let css = "span.obviz-base-filterInput input[autocomplete=\"off\"]";
            dom.add(&main, None, FakeNode::input().matches(css));
            dom.add(&main, None, FakeNode::input().matches(css).role("textbox", "PID "))
        });
        let resolver = FallbackResolver::from_steps(&pid_chain());
        let resolution = resolver.resolve(&page, &page.main_frame()).await.unwrap().unwrap();
        assert_eq!(resolution.element, target);
        assert_eq!(resolution.strategy, LocatorStrategy::AriaAx);
    }

    #[tokio::test]
    async fn structural_fallback_activates_hidden_input() {
        let page = FakePage::new("about:blank");
        let input = page.with_dom(|dom| {
            let main = dom.main_frame();
            let inner = dom.add(&main, None, FakeNode::new("div").matches("div.obviz-base-easy-select-inner"));
            dom.add(
                &main,
                Some(&inner),
                FakeNode::new("span").matches("span.obviz-base-filterText").text(" PID "),
            );
            let value = dom.add(
                &main,
                Some(&inner),
                FakeNode::new("div").matches("div.obviz-base-easy-select-value"),
            );
            let input = dom.add(&main, Some(&inner), FakeNode::input().hidden());
            let reveal = input.clone();
            dom.on_click(&value, move |dom| dom.show(&reveal));
            input
        });
        let resolver = FallbackResolver::from_steps(&pid_chain());
        let resolution = resolver.resolve(&page, &page.main_frame()).await.unwrap().unwrap();
        assert_eq!(resolution.element, input);
        assert_eq!(resolution.strategy, LocatorStrategy::Structural);
        assert!(resolution.activated);
        assert_eq!(page.calls().clicks.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_is_none() {
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(&main, None, FakeNode::input().matches("#other"));
        });
        let resolver = FallbackResolver::from_steps(&pid_chain());
        assert!(resolver.resolve(&page, &page.main_frame()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn disabled_elements_do_not_count() {
        let page = FakePage::new("about:blank");
        page.with_dom(|dom| {
            let main = dom.main_frame();
            dom.add(&main, None, FakeNode::input().matches("#PartnerId").disabled());
        });
        let resolver = FallbackResolver::from_steps(&[LocateStep::Css("#PartnerId".into())]);
        assert!(resolver.resolve(&page, &page.main_frame()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fatal_fault_propagates() {
        let page = FakePage::new("about:blank");
        page.crash();
        let resolver = FallbackResolver::from_steps(&pid_chain());
        let err = resolver.resolve(&page, &page.main_frame()).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
