use autotype::dom::{Document, ElementSpec};
use autotype::selector::SelectorList;
use pretty_assertions::assert_eq;

fn sample() -> Document {
    Document::new(
        "Selectors",
        ElementSpec::new("body")
            .child(
                ElementSpec::new("div")
                    .id("wordsWrapper")
                    .child(
                        ElementSpec::new("div")
                            .class("words active")
                            .child(ElementSpec::new("span").class("word").text("one"))
                            .child(ElementSpec::new("span").class("word").text("two")),
                    ),
            )
            .child(
                ElementSpec::new("div")
                    .class("text-plain")
                    .style("border: 1px solid")
                    .text("plain"),
            )
            .child(
                ElementSpec::new("input")
                    .attr("type", "text")
                    .attr("placeholder", "Type here"),
            )
            .child(ElementSpec::new("input")),
    )
}

fn describe_all(doc: &Document, selector: &str) -> Vec<String> {
    doc.query_selector_all(selector)
        .unwrap()
        .into_iter()
        .map(|n| doc.describe(n))
        .collect()
}

#[test]
fn matches_descendant_and_child_combinators() {
    let doc = sample();
    assert_eq!(
        describe_all(&doc, "#wordsWrapper .words"),
        vec!["DIV.words active"]
    );
    assert_eq!(
        describe_all(&doc, ".words > span"),
        vec!["SPAN.word", "SPAN.word"]
    );
    assert!(describe_all(&doc, "#wordsWrapper > span").is_empty());
}

#[test]
fn matches_attribute_operators() {
    let doc = sample();
    assert_eq!(describe_all(&doc, "div[class*=\"text\"]"), vec!["DIV.text-plain"]);
    assert_eq!(describe_all(&doc, "div[class^=text]"), vec!["DIV.text-plain"]);
    assert_eq!(describe_all(&doc, "div[class~=\"active\"]"), vec!["DIV.words active"]);
    assert_eq!(describe_all(&doc, "input[placeholder$=\"here\"]"), vec!["INPUT"]);
    assert_eq!(describe_all(&doc, "input[placeholder*=\"type\"]"), Vec::<String>::new());
}

#[test]
fn not_and_has_pseudo_classes() {
    let doc = sample();
    assert_eq!(
        describe_all(&doc, "div[style*=\"border\"]:not(:has(span))"),
        vec!["DIV.text-plain"]
    );
    assert_eq!(describe_all(&doc, "div:has(span.word)").len(), 2);
    assert_eq!(describe_all(&doc, "input:not([type])").len(), 1);
}

#[test]
fn nth_child_counts_element_siblings() {
    let doc = sample();
    assert_eq!(
        describe_all(&doc, "body > div:nth-child(1) > div:nth-child(1) > span:nth-child(2)"),
        vec!["SPAN.word"]
    );
    assert_eq!(describe_all(&doc, "body > input:nth-child(3)"), vec!["INPUT"]);
}

#[test]
fn selector_lists_return_document_order() {
    let doc = sample();
    assert_eq!(
        describe_all(&doc, "input, .text-plain"),
        vec!["DIV.text-plain", "INPUT", "INPUT"]
    );
}

#[test]
fn rejects_malformed_selectors() {
    for bad in ["", "div[", "div >", ":hover", "a:nth-child(0)", "[data-x=\"open"] {
        assert!(SelectorList::parse(bad).is_err(), "{bad:?} should not parse");
    }
}
