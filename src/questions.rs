use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dom::{Document, NodeId};
use crate::selector::{is_plain_identifier, SelectorList};

/// Prefix of an answer that records a failed request.
pub const ANSWER_ERROR_PREFIX: &str = "Error: ";

const MIN_QUESTION_LEN: usize = 10;
const SIBLING_SCAN: usize = 5;
const CONTEXT_SIBLING_SCAN: usize = 3;
const MAX_INPUT_DISTANCE_PX: f64 = 200.0;

const EDITABLE_CONTROLS: &str =
    "input[type=\"text\"], input:not([type]), textarea, [contenteditable=\"true\"]";
const INPUT_CONTAINERS: &str = "div, form, section, li, tr";
const CONTEXT_CONTAINERS: &str = "div, section, form, article";
const HEADINGS: &str = "h1, h2, h3, h4, h5, h6";
const NON_CONTENT: &str = "script, style, noscript";

static QUESTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\?[^a-z]*$",
        r"(?i)^(what|how|why|when|where|which|who)\s",
        r"(?i)^(explain|describe|define|compare|analyze)\s",
        r"(?i)^(calculate|solve|find|determine)\s",
        r"(?i)(true or false|t/f)",
        r"(?i)^(select|choose|pick)\s",
        r"(?i)fill\s+(in|out)\s+the",
        r"(?i)complete\s+the\s+following",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("question pattern must compile"))
    .collect()
});

static SELECTORS: LazyLock<QuestionSelectors> = LazyLock::new(|| QuestionSelectors {
    editable: parse_static(EDITABLE_CONTROLS),
    input_containers: parse_static(INPUT_CONTAINERS),
    context_containers: parse_static(CONTEXT_CONTAINERS),
    headings: parse_static(HEADINGS),
    non_content: parse_static(NON_CONTENT),
});

struct QuestionSelectors {
    editable: SelectorList,
    input_containers: SelectorList,
    context_containers: SelectorList,
    headings: SelectorList,
    non_content: SelectorList,
}

fn parse_static(source: &str) -> SelectorList {
    SelectorList::parse(source).expect("built-in selector must parse")
}

/// A question found on the page together with the field its answer goes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedQuestion {
    pub id: String,
    pub text: String,
    /// Selector that resolves to the answer field.
    #[serde(rename = "inputField")]
    pub input_selector: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl DetectedQuestion {
    /// The answer, unless it is missing or a recorded failure.
    pub fn usable_answer(&self) -> Option<&str> {
        self.answer
            .as_deref()
            .filter(|a| !a.starts_with(ANSWER_ERROR_PREFIX))
    }
}

pub fn is_question_text(text: &str) -> bool {
    QUESTION_PATTERNS.iter().any(|re| re.is_match(text))
}

/// Scan the page's text for questions that have an answer field nearby.
pub fn detect_questions(doc: &Document) -> Vec<DetectedQuestion> {
    let text_nodes: Vec<NodeId> = doc
        .text_nodes()
        .into_iter()
        .filter(|&n| !inside_non_content(doc, n))
        .filter(|&n| {
            doc.text(n)
                .is_some_and(|t| t.trim().chars().count() > MIN_QUESTION_LEN)
        })
        .collect();
    debug!(count = text_nodes.len(), "text nodes to analyze");

    let mut questions = Vec::new();
    for (index, node) in text_nodes.into_iter().enumerate() {
        let Some(text) = doc.text(node).map(str::trim) else {
            continue;
        };
        if !is_question_text(text) {
            continue;
        }
        let Some(parent) = doc.parent(node) else {
            continue;
        };
        let Some(input) = find_nearby_input(doc, parent) else {
            debug!(question = %preview(text), "question without an input field");
            continue;
        };

        info!(question = %preview(text), input = %doc.describe(input), "found question");
        questions.push(DetectedQuestion {
            id: format!("q_{index}"),
            text: text.to_string(),
            input_selector: element_selector(doc, input),
            context: extract_question_context(doc, parent),
            answer: None,
        });
    }

    info!(count = questions.len(), "questions with input fields detected");
    questions
}

fn inside_non_content(doc: &Document, node: NodeId) -> bool {
    doc.parent(node)
        .is_some_and(|p| doc.closest(p, &SELECTORS.non_content).is_some())
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

/// The answer field for the question held by `question`.
///
/// Tried in order: the first editable control in the closest container, the
/// next five element siblings (or their contents), then the nearest control
/// by corner distance if under 200 px.
pub fn find_nearby_input(doc: &Document, question: NodeId) -> Option<NodeId> {
    let selectors = &*SELECTORS;

    if let Some(container) = doc.closest(question, &selectors.input_containers) {
        if let Some(input) = doc
            .select_within(container, &selectors.editable)
            .into_iter()
            .next()
        {
            return Some(input);
        }
    }

    let mut next = doc.next_element_sibling(question);
    for _ in 0..SIBLING_SCAN {
        let Some(sibling) = next else {
            break;
        };
        if let Some(input) = doc
            .select_within(sibling, &selectors.editable)
            .into_iter()
            .next()
        {
            return Some(input);
        }
        if selectors.editable.matches(doc, sibling) {
            return Some(sibling);
        }
        next = doc.next_element_sibling(sibling);
    }

    let question_rect = doc.element(question)?.rect;
    let mut closest = None;
    let mut min_distance = MAX_INPUT_DISTANCE_PX;
    for input in doc.select(&selectors.editable) {
        let Some(el) = doc.element(input) else {
            continue;
        };
        let dy = question_rect.bottom() - el.rect.top();
        let dx = question_rect.left() - el.rect.left();
        let distance = (dy * dy + dx * dx).sqrt();
        if distance < min_distance {
            min_distance = distance;
            closest = Some(input);
        }
    }
    closest
}

/// Section heading, a nearby instruction paragraph and the page title,
/// joined with `" | "`.
pub fn extract_question_context(doc: &Document, question: NodeId) -> String {
    let selectors = &*SELECTORS;
    let mut parts = Vec::new();

    if let Some(container) = doc.closest(question, &selectors.context_containers) {
        if let Some(heading) = doc
            .select_within(container, &selectors.headings)
            .into_iter()
            .next()
        {
            parts.push(format!("Section: {}", doc.text_content(heading).trim()));
        }
    }

    let mut prev = doc.previous_element_sibling(question);
    for _ in 0..CONTEXT_SIBLING_SCAN {
        let Some(sibling) = prev else {
            break;
        };
        let text = doc.text_content(sibling);
        let text = text.trim();
        let len = text.chars().count();
        if len > 20 && len < 500 {
            parts.push(format!("Context: {text}"));
            break;
        }
        prev = doc.previous_element_sibling(sibling);
    }

    if !doc.title().is_empty() {
        parts.push(format!("Page: {}", doc.title()));
    }

    parts.join(" | ")
}

/// A selector that resolves back to `node`: `#id` or `tag.class` when either
/// is unique on the page, otherwise an `nth-child` path from `<body>`.
pub fn element_selector(doc: &Document, node: NodeId) -> String {
    let Some(el) = doc.element(node) else {
        return String::new();
    };

    if let Some(id) = el.id().filter(|id| is_plain_identifier(id)) {
        let selector = format!("#{id}");
        if resolves_uniquely(doc, &selector, node) {
            return selector;
        }
    }

    let classes: Vec<&str> = el.classes().collect();
    if !classes.is_empty() && classes.iter().all(|c| is_plain_identifier(c)) {
        let selector = format!("{}.{}", el.tag, classes.join("."));
        if resolves_uniquely(doc, &selector, node) {
            return selector;
        }
    }

    let mut steps = Vec::new();
    let mut current = node;
    while current != doc.body() {
        let (Some(tag), Some(index)) = (doc.tag(current), doc.element_index(current)) else {
            break;
        };
        steps.push(format!("{tag}:nth-child({index})"));
        match doc.parent(current) {
            Some(parent) => current = parent,
            None => break,
        }
    }
    steps.push("body".to_string());
    steps.reverse();
    steps.join(" > ")
}

fn resolves_uniquely(doc: &Document, selector: &str, node: NodeId) -> bool {
    matches!(doc.query_selector_all(selector).as_deref(), Ok([only]) if *only == node)
}
