use autotype::text_repair::{
    attempt_space_insertion, has_word_duplication, normalize_whitespace, remove_duplicate_words,
};
use pretty_assertions::assert_eq;

#[test]
fn removes_consecutive_duplicates() {
    assert_eq!(
        remove_duplicate_words("the the quick fox fox jumps"),
        "the quick fox jumps"
    );
}

#[test]
fn non_adjacent_repeats_are_kept() {
    assert_eq!(
        remove_duplicate_words("the cat saw the dog"),
        "the cat saw the dog"
    );
}

#[test]
fn detects_duplication_of_longer_words_only() {
    assert!(has_word_duplication("test test case"));
    assert!(has_word_duplication("Quick quick brown fox"));
    assert!(!has_word_duplication("a cat sat on the mat"));
    assert!(!has_word_duplication("we go go home"));
}

#[test]
fn normalizes_whitespace_runs() {
    assert_eq!(
        normalize_whitespace("  one\n\ttwo   three \r\n"),
        "one two three"
    );
}

#[test]
fn reinserts_spaces_into_concatenated_words() {
    let repaired = attempt_space_insertion(
        "Theoldoaktreehadstoodattheedgeofthemeadowforlongerthananyonecouldremember",
    );
    assert_eq!(
        repaired,
        "The old oak tree had stood at the edge of the meadow for longer than anyone could remember"
    );
}

#[test]
fn lowercase_input_stays_lowercase() {
    let repaired = attempt_space_insertion("theoldoaktreehadstoodhere");
    assert!(repaired.starts_with("the old oak tree had stood"), "{repaired}");
}

#[test]
fn returns_original_when_too_few_words_found() {
    assert_eq!(attempt_space_insertion("xyzzyplughfoo"), "xyzzyplughfoo");
}
