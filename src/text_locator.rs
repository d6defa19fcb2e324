use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId};
use crate::selector::SelectorList;
use crate::text_repair::{
    attempt_space_insertion, has_word_duplication, normalize_whitespace, remove_duplicate_words,
};

/// Text container selectors, most specific first. Plain unlabelled containers
/// come last because they produce the most false positives.
pub const TEXT_SELECTORS: &[&str] = &[
    // typing-test word containers
    "#words",
    ".words",
    "#wordsWrapper .words",
    // clean text containers
    "textarea[readonly]",
    "pre",
    "div.text-to-type",
    "div.typing-text",
    "div.test-text",
    "div#text",
    ".quote",
    ".typing-quote",
    "div[data-testid=\"text\"]",
    // styled containers
    "div[style*=\"border\"]:not(:has(span))",
    "p.text",
    "div[class*=\"text\"]:not(:has(span))",
    "p[class*=\"text\"]",
    // containers that may hold word spans
    ".typing-area .text",
    "#typing-test-text",
    "div.words:not(:has(span))",
    "main p",
    "article p",
    ".content p",
    // word-level markup, most prone to duplication
    "div[style*=\"border\"]",
    "div > div[style]",
    "span.word",
    "div.word",
    ".words > span",
    ".words > div",
    "div.words",
    "div:not([class]):not([id])",
];

pub const SKIP_PHRASES: &[&str] = &[
    "click here",
    "sign up",
    "log in",
    "menu",
    "navigation",
    "copyright",
    "©",
    "privacy",
    "terms",
    "cookie",
    "admin",
    "login",
    "register",
    "home",
    "about",
    "contact",
];

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]").expect("sentence regex must compile"));

static ENGLISH_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)the\s+\w+",
        r"(?i)and\s+\w+",
        r"(?i)\w+\s+of\s+\w+",
        r"(?i)\w+\s+to\s+\w+",
        r"(?i)\w+ing\s",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("english pattern must compile"))
    .collect()
});

/// Thresholds and weights for text detection. The defaults are empirical.
#[derive(Debug, Clone)]
pub struct TextDetectionConfig {
    pub selectors: Vec<String>,
    pub skip_phrases: Vec<String>,
    pub min_length: usize,
    pub min_words: usize,
    pub max_word_length: usize,
    pub accept_min_length: usize,
    pub accept_max_length: usize,
    pub many_words: usize,
    /// Flattened or reconstructed text must be longer than this to be used as is.
    pub clean_text_min_length: usize,
    pub space_insertion_min_length: usize,
    pub max_word_element_length: usize,
    pub candidate_selector: String,
    pub min_candidate_width: f64,
    pub min_candidate_height: f64,
    pub min_candidate_words: usize,
    pub typing_name_weight: i64,
    pub border_weight: i64,
    pub background_weight: i64,
    pub max_candidates: usize,
    pub fallback_selector: String,
}

impl Default for TextDetectionConfig {
    fn default() -> Self {
        Self {
            selectors: TEXT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            skip_phrases: SKIP_PHRASES.iter().map(|s| s.to_string()).collect(),
            min_length: 20,
            min_words: 5,
            max_word_length: 15,
            accept_min_length: 50,
            accept_max_length: 2000,
            many_words: 15,
            clean_text_min_length: 20,
            space_insertion_min_length: 50,
            max_word_element_length: 20,
            candidate_selector: "div, p, span, pre, textarea".to_string(),
            min_candidate_width: 100.0,
            min_candidate_height: 20.0,
            min_candidate_words: 10,
            typing_name_weight: 50,
            border_weight: 20,
            background_weight: 10,
            max_candidates: 5,
            fallback_selector: "p, div, span, article, main".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionCandidate {
    pub source_selector: String,
    pub raw_text: String,
    pub score: i64,
    #[serde(skip)]
    pub node: NodeId,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub elements_found: usize,
    pub best_candidate: Option<String>,
    pub raw_text: String,
    pub all_candidates: Vec<CandidateTrace>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CandidateTrace {
    Evaluated(EvaluatedCandidate),
    Failed { selector: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatedCandidate {
    pub selector: String,
    pub index: usize,
    pub text_preview: String,
    pub text_length: usize,
    pub word_count: usize,
    pub has_duplication: bool,
    pub is_valid: bool,
    pub element: String,
    pub has_word_spans: bool,
}

/// Result of a diagnostic detection pass.
#[derive(Debug, Clone, Serialize)]
pub struct DebugDetection {
    pub text: Option<String>,
    pub debug: DetectionReport,
}

#[derive(Debug, Clone, Default)]
pub struct TextLocator {
    config: TextDetectionConfig,
}

impl TextLocator {
    pub fn new(config: TextDetectionConfig) -> Self {
        Self { config }
    }

    /// Best-guess typing text: selector sweep, then scored candidates, then the
    /// longest valid block on the page.
    pub fn locate(&self, doc: &Document) -> Option<String> {
        if let Some(text) = self.selector_sweep(doc) {
            return Some(text);
        }

        for candidate in self.heuristic_candidates(doc) {
            let text = remove_duplicate_words(&self.extract_text_from_element(doc, candidate.node));
            if self.is_valid_typing_text(&text) {
                info!(
                    element = %candidate.source_selector,
                    score = candidate.score,
                    preview = %preview(&text),
                    "found text using heuristic detection"
                );
                return Some(text);
            }
        }

        let fallback = self.largest_text_block(doc);
        if let Some(text) = &fallback {
            info!(preview = %preview(text), "using largest text block");
        }
        fallback
    }

    fn selector_sweep(&self, doc: &Document) -> Option<String> {
        for selector in &self.config.selectors {
            let list = match SelectorList::parse(selector) {
                Ok(list) => list,
                Err(err) => {
                    warn!(%err, "skipping text selector");
                    continue;
                }
            };

            for node in doc.select(&list) {
                let text = remove_duplicate_words(&self.extract_text_from_element(doc, node));
                if self.is_valid_typing_text(&text) {
                    info!(%selector, preview = %preview(&text), "found text using selector");
                    return Some(text);
                }
            }
        }
        None
    }

    /// Sized, visible, styled or typing-named elements ranked by score; at most
    /// `max_candidates` of them.
    pub fn heuristic_candidates(&self, doc: &Document) -> Vec<DetectionCandidate> {
        let cfg = &self.config;
        let list = match SelectorList::parse(&cfg.candidate_selector) {
            Ok(list) => list,
            Err(err) => {
                warn!(%err, "candidate selector is invalid");
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for node in doc.select(&list) {
            let (Some(el), Some(style)) = (doc.element(node), doc.computed_style(node)) else {
                continue;
            };
            if el.rect.width < cfg.min_candidate_width || el.rect.height < cfg.min_candidate_height
            {
                continue;
            }
            if style.is_hidden() {
                continue;
            }

            let class = el.class_name().to_lowercase();
            let id = el.id().unwrap_or("").to_lowercase();
            let typing_named = ["typ", "text"]
                .iter()
                .any(|needle| class.contains(needle) || id.contains(needle));
            let has_border = style.has_border();
            let has_background = style.has_background();

            let raw_text = doc.text_content(node).trim().to_string();
            let word_count = raw_text.split_whitespace().count();

            if !(has_border || has_background || typing_named) || word_count < cfg.min_candidate_words
            {
                continue;
            }

            let mut score = word_count as i64;
            if typing_named {
                score += cfg.typing_name_weight;
            }
            if has_border {
                score += cfg.border_weight;
            }
            if has_background {
                score += cfg.background_weight;
            }

            candidates.push(DetectionCandidate {
                source_selector: doc.describe(node),
                raw_text,
                score,
                node,
            });
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        candidates.truncate(cfg.max_candidates);
        debug!(count = candidates.len(), "heuristic text candidates");
        candidates
    }

    fn largest_text_block(&self, doc: &Document) -> Option<String> {
        let list = match SelectorList::parse(&self.config.fallback_selector) {
            Ok(list) => list,
            Err(err) => {
                warn!(%err, "fallback selector is invalid");
                return None;
            }
        };

        let mut largest: Option<(usize, String)> = None;
        for node in doc.select(&list) {
            let text = self.extract_text_from_element(doc, node);
            if !self.is_valid_typing_text(&text) {
                continue;
            }
            let len = text.chars().count();
            if largest.as_ref().map_or(true, |(best, _)| len > *best) {
                largest = Some((len, text));
            }
        }
        largest.map(|(_, text)| text)
    }

    pub fn extract_text_from_element(&self, doc: &Document, node: NodeId) -> String {
        let cfg = &self.config;
        let Some(el) = doc.element(node) else {
            return doc.text(node).map(normalize_whitespace).unwrap_or_default();
        };

        if el.is_text_control() {
            return match el.value.as_deref().filter(|v| !v.is_empty()) {
                Some(value) => value.to_string(),
                None => el.placeholder().unwrap_or("").to_string(),
            };
        }

        let direct = normalize_whitespace(&doc.text_content(node));
        let direct_len = direct.chars().count();
        let has_space = direct.contains(' ');

        if direct_len > cfg.clean_text_min_length && has_space && !has_word_duplication(&direct) {
            return direct;
        }

        if let Some(words) = self.immediate_word_text(doc, node) {
            return words;
        }

        if has_space && direct_len > cfg.clean_text_min_length {
            return remove_duplicate_words(&direct);
        }

        if !has_space && direct_len > cfg.space_insertion_min_length {
            return attempt_space_insertion(&direct);
        }

        direct
    }

    /// Rebuild text from word-like children that are not nested inside another
    /// word element.
    fn immediate_word_text(&self, doc: &Document, node: NodeId) -> Option<String> {
        const WORD_TAGS: [&str; 3] = ["span", "div", "p"];
        let is_word_tag = |n: NodeId| doc.tag(n).is_some_and(|t| WORD_TAGS.contains(&t));

        let words: Vec<String> = doc
            .descendants(node)
            .into_iter()
            .filter(|&d| is_word_tag(d))
            .filter(|&d| match doc.parent(d) {
                Some(parent) => parent == node || !is_word_tag(parent),
                None => false,
            })
            .map(|d| doc.text_content(d).trim().to_string())
            .filter(|w| !w.is_empty() && w.chars().count() <= self.config.max_word_element_length)
            .collect();

        if words.is_empty() {
            return None;
        }

        let text = normalize_whitespace(&words.join(" "));
        (!has_word_duplication(&text) && text.chars().count() > self.config.clean_text_min_length)
            .then_some(text)
    }

    pub fn is_valid_typing_text(&self, text: &str) -> bool {
        let cfg = &self.config;
        let len = text.chars().count();
        if len < cfg.min_length {
            return false;
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        if words.len() < cfg.min_words {
            return false;
        }

        let lower = text.to_lowercase();
        if let Some(phrase) = cfg
            .skip_phrases
            .iter()
            .find(|p| lower.contains(p.to_lowercase().as_str()))
        {
            debug!(%phrase, preview = %preview(text), "rejecting text with boilerplate phrase");
            return false;
        }

        if words.iter().any(|w| w.chars().count() > cfg.max_word_length) {
            return false;
        }

        if has_word_duplication(text) {
            debug!(preview = %preview(text), "rejecting text due to word duplication");
            return false;
        }

        let reasonable_length = (cfg.accept_min_length..=cfg.accept_max_length).contains(&len);
        let looks_like_prose = SENTENCE_END.is_match(text)
            || ENGLISH_PATTERNS.iter().any(|p| p.is_match(text))
            || words.len() >= cfg.many_words;

        reasonable_length && looks_like_prose
    }

    /// Every selector-sweep candidate with its measurements, plus the result of
    /// a full detection pass.
    pub fn debug_detection(&self, doc: &Document) -> DebugDetection {
        let mut report = DetectionReport::default();
        let word_spans = SelectorList::parse("span, div").ok();

        for selector in &self.config.selectors {
            let list = match SelectorList::parse(selector) {
                Ok(list) => list,
                Err(err) => {
                    report.all_candidates.push(CandidateTrace::Failed {
                        selector: selector.clone(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            let nodes = doc.select(&list);
            report.elements_found += nodes.len();

            for (index, node) in nodes.into_iter().enumerate() {
                let text = self.extract_text_from_element(doc, node);
                let is_valid = self.is_valid_typing_text(&text);
                let has_word_spans = word_spans
                    .as_ref()
                    .is_some_and(|spans| !doc.select_within(node, spans).is_empty());

                report
                    .all_candidates
                    .push(CandidateTrace::Evaluated(EvaluatedCandidate {
                        selector: selector.clone(),
                        index,
                        text_preview: format!("{}...", preview(&text)),
                        text_length: text.chars().count(),
                        word_count: text.split_whitespace().count(),
                        has_duplication: has_word_duplication(&text),
                        is_valid,
                        element: doc.describe(node),
                        has_word_spans,
                    }));

                if is_valid && report.best_candidate.is_none() {
                    report.best_candidate = Some(format!("{selector} ({index})"));
                    report.raw_text = text;
                }
            }
        }

        DebugDetection {
            text: self.locate(doc),
            debug: report,
        }
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

pub fn locate_typing_text(doc: &Document) -> Option<String> {
    TextLocator::default().locate(doc)
}

pub fn is_valid_typing_text(text: &str) -> bool {
    TextLocator::default().is_valid_typing_text(text)
}

pub fn extract_text_from_element(doc: &Document, node: NodeId) -> String {
    TextLocator::default().extract_text_from_element(doc, node)
}

pub fn debug_detection(doc: &Document) -> DebugDetection {
    TextLocator::default().debug_detection(doc)
}
