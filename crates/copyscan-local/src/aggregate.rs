use copyscan_core::{Highlight, Report, SentenceOutcome};
use std::time::Duration;

/// Fold per-sentence outcomes (any order) into a [`Report`] in document order.
///
/// `sentence_count` is the number of segmented sentences. Sentences without an outcome
/// are counted as unmatched and reported through `incomplete`.
pub fn build_report(
    mut outcomes: Vec<SentenceOutcome>,
    sentence_count: usize,
    workers: usize,
    elapsed: Duration,
) -> Report {
    outcomes.sort_by_key(|o| o.index);
    let incomplete = sentence_count.saturating_sub(outcomes.len());

    let highlights: Vec<Highlight> = outcomes
        .into_iter()
        .filter(SentenceOutcome::is_match)
        .map(|o| Highlight {
            start: o.start,
            end: o.end,
            text: o.text,
            confidence: 1.0,
            sources: o.matched_urls,
        })
        .collect();

    let score = if sentence_count == 0 {
        0.0
    } else {
        (highlights.len() as f64 / sentence_count as f64).clamp(0.0, 1.0)
    };

    Report {
        score,
        highlights,
        sentence_count,
        elapsed,
        workers,
        incomplete,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn outcome(index: usize, matched: bool) -> SentenceOutcome {
        SentenceOutcome {
            index,
            text: format!("sentence number {index}"),
            start: index * 100,
            end: index * 100 + 20,
            matched_urls: if matched {
                vec![format!("https://src.test/{index}")]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn restores_document_order() {
        let outcomes = vec![outcome(3, true), outcome(1, true), outcome(2, false), outcome(4, true)];
        let r = build_report(outcomes, 4, 2, Duration::from_millis(5));
        let starts: Vec<usize> = r.highlights.iter().map(|h| h.start).collect();
        assert_eq!(starts, vec![100, 300, 400]);
        assert_eq!(r.score, 0.75);
        assert_eq!(r.incomplete, 0);
        assert!(r.highlights.iter().all(|h| h.confidence == 1.0));
        assert_eq!(r.highlights[0].sources, vec!["https://src.test/1"]);
    }

    #[test]
    fn missing_outcomes_count_against_denominator() {
        let r = build_report(vec![outcome(2, true)], 4, 4, Duration::ZERO);
        assert_eq!(r.score, 0.25);
        assert_eq!(r.incomplete, 3);
    }

    #[test]
    fn zero_sentences_scores_zero() {
        let r = build_report(Vec::new(), 0, 0, Duration::ZERO);
        assert_eq!(r.score, 0.0);
        assert!(r.highlights.is_empty());
    }

    proptest! {
        #[test]
        fn score_is_bounded_and_highlights_are_ordered(flags in proptest::collection::vec(any::<bool>(), 1..40)) {
            let n = flags.len();
            let mut outcomes: Vec<SentenceOutcome> = flags
                .iter()
                .enumerate()
                .map(|(i, m)| outcome(i + 1, *m))
                .collect();
            outcomes.reverse();
            let r = build_report(outcomes, n, 8, Duration::ZERO);
            prop_assert!((0.0..=1.0).contains(&r.score));
            prop_assert_eq!(r.highlights.len(), flags.iter().filter(|m| **m).count());
            prop_assert!(r.highlights.windows(2).all(|w| w[0].start < w[1].start));
        }
    }
}
