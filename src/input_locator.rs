use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId};
use crate::selector::SelectorList;

/// Input selectors, most specific first.
pub const INPUT_SELECTORS: &[&str] = &[
    // typing-test inputs
    "#wordsInput",
    ".inputField",
    "input[style*=\"opacity: 0\"]",
    "#typing-input",
    ".typing-input",
    "input[placeholder*=\"type\"]",
    "input[placeholder*=\"Type\"]",
    "textarea[placeholder*=\"type\"]",
    "input[class*=\"test\"]",
    "textarea[class*=\"test\"]",
    "input[type=\"text\"]",
    "textarea",
    "div[contenteditable=\"true\"]",
    "input.typing-input",
    "input#typing-input",
    ".typing-area input",
    "[data-testid=\"typing-input\"]",
    "input[class*=\"typing\"]",
    "textarea[class*=\"typing\"]",
    // generic
    "input:not([type=\"hidden\"]):not([type=\"submit\"]):not([type=\"button\"])",
    "textarea:not([readonly])",
    "[contenteditable=\"true\"]",
    "[contenteditable=\"\"]",
];

#[derive(Debug, Clone)]
pub struct InputDetectionConfig {
    pub selectors: Vec<String>,
    pub fallback_selector: String,
    pub relaxed_selector: String,
}

impl Default for InputDetectionConfig {
    fn default() -> Self {
        Self {
            selectors: INPUT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            fallback_selector: "input, textarea, [contenteditable=\"true\"]".to_string(),
            relaxed_selector: "input, textarea, [contenteditable=\"true\"], [contenteditable=\"\"]"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InputLocator {
    config: InputDetectionConfig,
}

impl InputLocator {
    pub fn new(config: InputDetectionConfig) -> Self {
        Self { config }
    }

    pub fn locate(&self, doc: &Document) -> Option<NodeId> {
        for selector in &self.config.selectors {
            let Some(list) = parse_or_warn(selector) else {
                continue;
            };
            let Some(node) = doc.select(&list).into_iter().next() else {
                continue;
            };
            if is_valid_input(doc, node) {
                info!(%selector, element = %doc.describe(node), "found input field");
                return Some(node);
            }
            debug!(%selector, element = %doc.describe(node), "input not usable (hidden/disabled)");
        }

        if let Some(list) = parse_or_warn(&self.config.fallback_selector) {
            if let Some(node) = doc
                .select(&list)
                .into_iter()
                .find(|&n| is_valid_input(doc, n))
            {
                info!(element = %doc.describe(node), "found fallback input field");
                return Some(node);
            }
        }

        if let Some(list) = parse_or_warn(&self.config.relaxed_selector) {
            let relaxed = doc.select(&list).into_iter().find(|&n| {
                let shown = doc
                    .computed_style(n)
                    .is_some_and(|style| style.display != "none");
                let usable = doc.element(n).is_some_and(|el| {
                    !el.is_disabled() && (el.is_text_control() || el.is_editable_region())
                });
                shown && usable
            });
            if let Some(node) = relaxed {
                info!(element = %doc.describe(node), "found input field with relaxed check");
                return Some(node);
            }
        }

        debug!("no input field found");
        None
    }
}

fn parse_or_warn(selector: &str) -> Option<SelectorList> {
    match SelectorList::parse(selector) {
        Ok(list) => Some(list),
        Err(err) => {
            warn!(%err, "skipping input selector");
            None
        }
    }
}

/// Rendered, enabled, and either an editable region or a text control.
///
/// Read-only text controls are accepted: some typing widgets pair a read-only
/// display field with a hidden real input.
pub fn is_valid_input(doc: &Document, node: NodeId) -> bool {
    let Some(el) = doc.element(node) else {
        return false;
    };
    if !doc.is_rendered(node) || el.is_disabled() {
        return false;
    }
    el.is_editable_region() || el.is_text_control()
}

pub fn locate_input_element(doc: &Document) -> Option<NodeId> {
    InputLocator::default().locate(doc)
}
