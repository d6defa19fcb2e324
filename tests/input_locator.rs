use autotype::dom::{Document, ElementSpec};
use autotype::input_locator::{is_valid_input, locate_input_element};

fn page(body: ElementSpec) -> Document {
    Document::new("Typing Test", body)
}

fn describe_located(doc: &Document) -> Option<String> {
    locate_input_element(doc).map(|n| doc.describe(n))
}

#[test]
fn prefers_typing_test_input_even_when_transparent() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "text").id("search"))
            .child(
                ElementSpec::new("input")
                    .id("wordsInput")
                    .style("opacity: 0"),
            ),
    );

    assert_eq!(describe_located(&doc).as_deref(), Some("INPUT#wordsInput"));
}

#[test]
fn skips_hidden_inputs() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "hidden").id("token"))
            .child(ElementSpec::new("input").attr("type", "text").id("answer")),
    );

    assert_eq!(describe_located(&doc).as_deref(), Some("INPUT#answer"));
}

#[test]
fn skips_controls_inside_undisplayed_containers() {
    let doc = page(
        ElementSpec::new("body")
            .child(
                ElementSpec::new("div")
                    .style("display: none")
                    .child(ElementSpec::new("textarea").id("old")),
            )
            .child(
                ElementSpec::new("div")
                    .attr("contenteditable", "true")
                    .id("editor"),
            ),
    );

    assert_eq!(describe_located(&doc).as_deref(), Some("DIV#editor"));
}

#[test]
fn disabled_controls_are_invalid_but_readonly_ones_are_not() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "text").attr("disabled", "").id("a"))
            .child(ElementSpec::new("input").attr("type", "text").attr("readonly", "").id("b")),
    );
    let a = doc.query_selector("#a").unwrap().unwrap();
    let b = doc.query_selector("#b").unwrap().unwrap();

    assert!(!is_valid_input(&doc, a));
    assert!(is_valid_input(&doc, b));
    assert_eq!(describe_located(&doc).as_deref(), Some("INPUT#b"));
}

#[test]
fn relaxed_pass_accepts_invisible_but_displayed_input() {
    let doc = page(
        ElementSpec::new("body").child(
            ElementSpec::new("input")
                .attr("type", "text")
                .id("ghost")
                .style("visibility: hidden"),
        ),
    );
    let ghost = doc.query_selector("#ghost").unwrap().unwrap();

    assert!(!is_valid_input(&doc, ghost));
    assert_eq!(locate_input_element(&doc), Some(ghost));
}

#[test]
fn plain_elements_are_never_inputs() {
    let doc = page(ElementSpec::new("body").child(ElementSpec::new("p").text("Nothing to type in")));
    let p = doc.query_selector("p").unwrap().unwrap();

    assert!(!is_valid_input(&doc, p));
    assert_eq!(locate_input_element(&doc), None);
}

#[test]
fn non_text_inputs_are_skipped() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "checkbox").id("agree"))
            .child(ElementSpec::new("input").attr("type", "submit").id("go"))
            .child(ElementSpec::new("textarea").id("notes")),
    );
    let agree = doc.query_selector("#agree").unwrap().unwrap();

    assert!(!is_valid_input(&doc, agree));
    assert_eq!(describe_located(&doc).as_deref(), Some("TEXTAREA#notes"));
}

#[test]
fn page_with_only_buttons_and_boxes_has_no_input() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "radio").id("r"))
            .child(ElementSpec::new("input").attr("type", "checkbox").id("c"))
            .child(ElementSpec::new("input").attr("type", "button").id("b")),
    );

    assert_eq!(locate_input_element(&doc), None);
}

#[test]
fn search_and_untyped_inputs_are_text_controls() {
    let doc = page(
        ElementSpec::new("body")
            .child(ElementSpec::new("input").attr("type", "Search").id("s"))
            .child(ElementSpec::new("input").id("plain")),
    );
    let s = doc.query_selector("#s").unwrap().unwrap();
    let plain = doc.query_selector("#plain").unwrap().unwrap();

    assert!(is_valid_input(&doc, s));
    assert!(is_valid_input(&doc, plain));
}
