//! Repairs for artifacts of DOM text extraction: collapsed whitespace, words
//! read twice from word-per-span markup, and word runs with no spaces at all.

/// Words used to re-segment text that was extracted without spaces.
///
/// Best effort only; the list is small and English-specific.
pub const COMMON_WORDS: &[&str] = &[
    "the", "and", "of", "to", "a", "in", "that", "have", "it", "for", "not", "on", "with", "he",
    "as", "you", "do", "at", "this", "but", "his", "by", "from", "they", "she", "or", "an",
    "will", "my", "one", "all", "would", "there", "their", "had", "stood", "tree", "oak", "old",
    "edge", "meadow", "longer", "anyone", "could", "remember", "massive", "branches", "stretched",
    "skyward", "shelter", "birds", "squirrels",
];

/// Collapse newlines, tabs and runs of whitespace into single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when two consecutive words are equal (case-insensitive) and longer than
/// two characters, e.g. `"test test case"`.
pub fn has_word_duplication(text: &str) -> bool {
    let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();
    words
        .windows(2)
        .any(|pair| pair[0] == pair[1] && pair[0].chars().count() > 2)
}

/// Drop every token that is case-insensitively identical to the token before it.
pub fn remove_duplicate_words(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut prev: Option<String> = None;

    for word in text.split_whitespace() {
        let lower = word.to_lowercase();
        if prev.as_deref() != Some(lower.as_str()) {
            kept.push(word);
        }
        prev = Some(lower);
    }

    kept.join(" ")
}

/// Insert spaces into a run of text that lost them during extraction, using
/// [`COMMON_WORDS`].
///
/// Longer dictionary words claim their characters first; a shorter word may not
/// start or end inside an already claimed span. A boundary is only inserted
/// when a letter follows the word. Returns the original text unless the result
/// has at least three tokens.
pub fn attempt_space_insertion(text: &str) -> String {
    let lower: Vec<char> = text.to_lowercase().chars().collect();
    let n = lower.len();
    let mut claimed = vec![false; n];
    let mut break_after = vec![false; n];

    let mut words: Vec<Vec<char>> = COMMON_WORDS.iter().map(|w| w.chars().collect()).collect();
    words.sort_by(|a, b| b.len().cmp(&a.len()));

    for word in &words {
        let len = word.len();
        if len == 0 || len > n {
            continue;
        }

        let mut i = 0usize;
        while i + len <= n {
            let end = i + len;
            let fits = lower[i..end] == word[..]
                && !claimed[i..end].iter().any(|c| *c)
                && end < n
                && lower[end].is_ascii_lowercase();
            if fits {
                claimed[i..end].iter_mut().for_each(|c| *c = true);
                break_after[end - 1] = true;
                i = end;
            } else {
                i += 1;
            }
        }
    }

    let mut result = String::with_capacity(n + n / 4);
    for (idx, c) in lower.iter().enumerate() {
        result.push(*c);
        if break_after[idx] {
            result.push(' ');
        }
    }
    let mut result = normalize_whitespace(&result);

    if result.split(' ').count() < 3 {
        return text.to_string();
    }

    if let Some(first) = text.chars().next() {
        if first.is_uppercase() {
            let mut chars = result.chars();
            if let Some(c) = chars.next() {
                result = c.to_uppercase().chain(chars).collect();
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_repeated_words_are_not_duplication() {
        assert!(!has_word_duplication("it is is fine"));
        assert!(has_word_duplication("this this"));
    }

    #[test]
    fn remove_duplicate_words_is_case_insensitive() {
        assert_eq!(remove_duplicate_words("The the end"), "The end");
    }
}
