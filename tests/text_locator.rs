use autotype::dom::{Document, ElementSpec, StyleOverride};
use autotype::text_locator::{
    debug_detection, extract_text_from_element, is_valid_typing_text, locate_typing_text,
    CandidateTrace, TextLocator,
};
use pretty_assertions::assert_eq;

const OAK: &str =
    "The old oak tree had stood at the edge of the meadow for longer than anyone could remember.";

fn word_spans(text: &str) -> Vec<ElementSpec> {
    text.split(' ')
        .map(|w| ElementSpec::new("span").class("word").text(w))
        .collect()
}

fn page(body: ElementSpec) -> Document {
    Document::new("Typing Test", body)
}

#[test]
fn rebuilds_text_from_word_spans() {
    let doc = page(
        ElementSpec::new("body").child(ElementSpec::new("div").id("words").children(word_spans(OAK))),
    );

    assert_eq!(locate_typing_text(&doc).as_deref(), Some(OAK));
}

#[test]
fn collapses_whitespace_in_preformatted_text() {
    let doc = page(ElementSpec::new("body").child(ElementSpec::new("pre").text(
        "The old oak tree had stood\n   at the edge of the meadow\n\tfor longer than anyone could remember.",
    )));

    assert_eq!(locate_typing_text(&doc).as_deref(), Some(OAK));
}

#[test]
fn reads_readonly_textarea_value() {
    let doc = page(
        ElementSpec::new("body").child(
            ElementSpec::new("textarea")
                .attr("readonly", "")
                .text(OAK),
        ),
    );
    let textarea = doc.query_selector("textarea").unwrap().unwrap();

    assert_eq!(extract_text_from_element(&doc, textarea), OAK);
    assert_eq!(locate_typing_text(&doc).as_deref(), Some(OAK));
}

#[test]
fn rejects_boilerplate_and_fragments() {
    assert!(!is_valid_typing_text("Click here to sign up now"));
    assert!(!is_valid_typing_text("Too short"));
    assert!(!is_valid_typing_text(
        "Read our privacy policy before continuing with the rest of this long page."
    ));
    assert!(!is_valid_typing_text(
        "This sentence has an incomprehensibilities word that is far too long to type."
    ));
    assert!(!is_valid_typing_text(
        "The quick quick brown fox jumps over the lazy dog near the river bank."
    ));
    assert!(is_valid_typing_text(OAK));
}

#[test]
fn heuristic_pass_picks_bordered_block() {
    let bordered = StyleOverride {
        border: Some("1px solid rgb(0, 0, 0)".to_string()),
        ..Default::default()
    };
    let doc = page(
        ElementSpec::new("body").child(
            ElementSpec::new("div")
                .class("passage")
                .rect(0.0, 0.0, 600.0, 120.0)
                .computed(bordered)
                .text(OAK),
        ),
    );

    let locator = TextLocator::default();
    let candidates = locator.heuristic_candidates(&doc);
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].source_selector, "DIV.passage");
    assert_eq!(candidates[0].score, 18 + 20);

    assert_eq!(locator.locate(&doc).as_deref(), Some(OAK));
}

#[test]
fn falls_back_to_longest_valid_block() {
    let shorter = "A small bird sang quietly from the top of the fence post.";
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("p").text(shorter))
            .child(ElementSpec::new("p").text(OAK)),
    );

    assert_eq!(locate_typing_text(&doc).as_deref(), Some(OAK));
}

#[test]
fn nothing_found_on_empty_page() {
    let doc = page(ElementSpec::new("body").child(ElementSpec::new("nav").text("Home")));
    assert_eq!(locate_typing_text(&doc), None);
}

#[test]
fn detection_is_idempotent() {
    let doc = page(
        ElementSpec::new("body").child(ElementSpec::new("div").id("words").children(word_spans(OAK))),
    );
    let locator = TextLocator::default();

    assert_eq!(locator.locate(&doc), locator.locate(&doc));
}

#[test]
fn debug_report_names_the_winning_selector() {
    let doc = page(
        ElementSpec::new("body").child(ElementSpec::new("div").id("words").children(word_spans(OAK))),
    );

    let result = debug_detection(&doc);
    assert_eq!(result.text.as_deref(), Some(OAK));
    assert_eq!(result.debug.best_candidate.as_deref(), Some("#words (0)"));
    assert_eq!(result.debug.raw_text, OAK);
    assert!(result.debug.elements_found >= 1);

    let first = result
        .debug
        .all_candidates
        .iter()
        .find_map(|c| match c {
            CandidateTrace::Evaluated(e) => Some(e),
            CandidateTrace::Failed { .. } => None,
        })
        .expect("at least one evaluated candidate");
    assert_eq!(first.selector, "#words");
    assert!(first.is_valid);
    assert!(first.has_word_spans);
    assert_eq!(first.word_count, 18);
}
