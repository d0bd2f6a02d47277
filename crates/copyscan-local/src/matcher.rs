//! Containment checks of a sentence against snippet / page text.

use crate::textprep::{normalize, words};

/// Sentences shorter than this (in words) only get the exact containment check.
pub const PARTIAL_MIN_WORDS: usize = 5;
/// Smallest accepted prefix window, as tenths of the sentence's word count.
const PARTIAL_RATIO_TENTHS: usize = 7;
const PARTIAL_MIN_WINDOW: usize = 3;

/// `ceil(0.7 * n)` in integer arithmetic, floored at 3.
pub fn min_partial_window(word_count: usize) -> usize {
    let ceil = (PARTIAL_RATIO_TENTHS * word_count).div_ceil(10);
    ceil.max(PARTIAL_MIN_WINDOW)
}

/// Snippet phase: normalized sentence is a substring of the normalized snippet.
pub fn snippet_contains(snippet: &str, normalized_sentence: &str) -> bool {
    if normalized_sentence.is_empty() || snippet.trim().is_empty() {
        return false;
    }
    normalize(snippet).contains(normalized_sentence)
}

/// Page phase: exact containment, then a prefix-window partial match.
///
/// The partial check tries prefixes of the sentence's words from the full length down to
/// [`min_partial_window`]. The first prefix found decides the result; smaller windows are
/// not searched past it.
pub fn page_contains(page_text: &str, sentence: &str) -> bool {
    let sentence_n = normalize(sentence);
    if sentence_n.is_empty() {
        return false;
    }
    let page_n = normalize(page_text);
    if page_n.contains(&sentence_n) {
        return true;
    }

    let ws = words(&sentence_n);
    let n = ws.len();
    if n < PARTIAL_MIN_WORDS {
        return false;
    }
    let floor = min_partial_window(n);
    for window in (floor..=n).rev() {
        let prefix = ws[..window].join(" ");
        if page_n.contains(&prefix) {
            return window * 10 >= PARTIAL_RATIO_TENTHS * n;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTENCE: &str = "One two three four five six seven eight nine ten.";

    #[test]
    fn min_window_is_seventy_percent_rounded_up() {
        assert_eq!(min_partial_window(5), 4);
        assert_eq!(min_partial_window(10), 7);
        assert_eq!(min_partial_window(11), 8);
        assert_eq!(min_partial_window(20), 14);
        assert_eq!(min_partial_window(3), 3);
    }

    #[test]
    fn exact_match_ignores_case_and_punctuation() {
        let page = "Header text... ONE, two; three four FIVE six seven eight nine ten!!! footer";
        assert!(page_contains(page, SENTENCE));
    }

    #[test]
    fn partial_prefix_at_threshold_matches() {
        let n = 10;
        let k = min_partial_window(n);
        let prefix = words(&normalize(SENTENCE))[..k].join(" ");
        let page = format!("unrelated intro {prefix} and then something else");
        assert!(page_contains(&page, SENTENCE));
    }

    #[test]
    fn partial_prefix_below_threshold_does_not_match() {
        let k = min_partial_window(10) - 1;
        let prefix = words(&normalize(SENTENCE))[..k].join(" ");
        let page = format!("unrelated intro {prefix} and then something else");
        assert!(!page_contains(&page, SENTENCE));
    }

    #[test]
    fn threshold_holds_for_a_range_of_lengths() {
        for n in PARTIAL_MIN_WORDS..40 {
            let ws: Vec<String> = (0..n).map(|i| format!("w{i}")).collect();
            let sentence = ws.join(" ");
            let k = min_partial_window(n);
            let hit = format!("xx {} yy", ws[..k].join(" "));
            let miss = format!("xx {} yy", ws[..k - 1].join(" "));
            assert!(page_contains(&hit, &sentence), "n={n} k={k}");
            assert!(!page_contains(&miss, &sentence), "n={n} k={k}");
        }
    }

    #[test]
    fn short_sentences_need_exact_containment() {
        let sentence = "alpha beta gamma delta";
        assert!(!page_contains("alpha beta gamma", sentence));
        assert!(page_contains("xx alpha beta gamma delta yy", sentence));
    }

    #[test]
    fn suffix_overlap_alone_is_not_a_match() {
        let page = "two three four five six seven eight nine ten";
        assert!(!page_contains(page, SENTENCE));
    }

    #[test]
    fn empty_sentence_never_matches() {
        assert!(!page_contains("anything at all", "?!..."));
        assert!(!snippet_contains("anything at all", ""));
    }

    #[test]
    fn snippet_match_requires_full_sentence() {
        let s = normalize("It rained all day yesterday in the city.");
        assert!(snippet_contains(
            "News: it rained ALL day yesterday in the city, residents said",
            &s
        ));
        assert!(!snippet_contains("It rained all day.", &s));
        assert!(!snippet_contains("   ", &s));
    }
}
