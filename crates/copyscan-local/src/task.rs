//! Per-sentence search: snippet phase first, page visits only when no snippet matches.

use crate::candidates::filter_candidates;
use crate::matcher::{page_contains, snippet_contains};
use crate::segment::preview;
use crate::textprep::normalize;
use copyscan_core::{CheckConfig, Result, Sentence, SentenceOutcome, Session};

/// Query string sent to the search engine: the sentence with quote characters removed.
pub fn search_query(sentence: &str) -> String {
    sentence
        .chars()
        .filter(|c| !matches!(c, '"' | '\u{201C}' | '\u{201D}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Look for `sentence` on the web using `session`.
///
/// Never fails: any error along the way means "no evidence found" for this sentence.
pub async fn search_sentence<S>(session: &mut S, sentence: &Sentence, cfg: &CheckConfig) -> SentenceOutcome
where
    S: Session + ?Sized,
{
    match try_search_sentence(session, sentence, cfg).await {
        Ok(urls) if !urls.is_empty() => SentenceOutcome::matched(sentence, urls),
        Ok(_) => {
            tracing::info!(index = sentence.index, "no match");
            SentenceOutcome::unmatched(sentence)
        }
        Err(e) => {
            tracing::warn!(index = sentence.index, error = %e, "sentence search failed");
            SentenceOutcome::unmatched(sentence)
        }
    }
}

async fn try_search_sentence<S>(session: &mut S, sentence: &Sentence, cfg: &CheckConfig) -> Result<Vec<String>>
where
    S: Session + ?Sized,
{
    let normalized = normalize(&sentence.text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let raw = session.search(&search_query(&sentence.text)).await?;
    let candidates = filter_candidates(raw, &cfg.deny_domains, cfg.max_search_results);
    tracing::debug!(index = sentence.index, candidates = candidates.len(), "search results");

    let snippet_hits: Vec<String> = candidates
        .iter()
        .filter(|c| snippet_contains(&c.snippet, &normalized))
        .map(|c| c.url.clone())
        .collect();
    if !snippet_hits.is_empty() {
        tracing::info!(
            index = sentence.index,
            sources = snippet_hits.len(),
            sentence = %preview(&sentence.text),
            "snippet match"
        );
        return Ok(snippet_hits);
    }

    for c in candidates.iter().take(cfg.max_pages_to_visit) {
        if let Err(e) = session.navigate(&c.url).await {
            tracing::debug!(url = %c.url, error = %e, "page visit failed");
            continue;
        }
        match session.page_text().await {
            Ok(text) if page_contains(&text, &sentence.text) => {
                tracing::info!(index = sentence.index, url = %c.url, "page match");
                return Ok(vec![c.url.clone()]);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(url = %c.url, error = %e, "page text unavailable"),
        }
    }
    Ok(Vec::new())
}


#[cfg(test)]
mod tests {
    use super::stub::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    const TEXT: &str = "The quick brown fox jumps over the lazy dog near the river.";

    fn sentence() -> Sentence {
        Sentence {
            index: 1,
            text: TEXT.to_string(),
            start: 0,
            end: TEXT.len(),
        }
    }

    fn session(script: Script) -> (StubSession, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (StubSession::new(Arc::new(script), counters.clone()), counters)
    }

    #[test]
    fn query_strips_straight_and_curly_quotes() {
        assert_eq!(search_query("He said \u{201C}hi\u{201D} and \"bye\""), "He said hi and bye");
    }

    #[tokio::test]
    async fn snippet_match_skips_page_visits() {
        let mut script = Script::default();
        script.results.insert(
            TEXT.to_string(),
            vec![
                hit("https://a.test/1", "unrelated text"),
                hit("https://b.test/2", "... the quick brown fox jumps over the lazy dog near the river ..."),
                hit("https://c.test/3", "THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG NEAR THE RIVER!"),
            ],
        );
        let (mut s, counters) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert_eq!(out.matched_urls, vec!["https://b.test/2", "https://c.test/3"]);
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn page_phase_stops_at_first_hit() {
        let mut script = Script::default();
        script.results.insert(
            TEXT.to_string(),
            vec![
                hit("https://a.test/1", "nothing here"),
                hit("https://b.test/2", "nothing here either"),
            ],
        );
        script.pages.insert(
            "https://a.test/1".to_string(),
            format!("Intro paragraph. {TEXT} Outro."),
        );
        script
            .pages
            .insert("https://b.test/2".to_string(), TEXT.to_string());
        let (mut s, counters) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert_eq!(out.matched_urls, vec!["https://a.test/1"]);
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deny_listed_and_excess_candidates_are_not_visited() {
        let mut script = Script::default();
        script.results.insert(
            TEXT.to_string(),
            vec![
                hit("https://www.facebook.com/x", TEXT),
                hit("https://a.test/1", ""),
                hit("https://b.test/2", ""),
                hit("https://c.test/3", ""),
            ],
        );
        script.pages.insert("https://c.test/3".to_string(), TEXT.to_string());
        let (mut s, counters) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert!(!out.is_match());
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn navigation_failures_yield_empty_outcome() {
        let mut script = Script::default();
        script.results.insert(
            TEXT.to_string(),
            vec![hit("https://a.test/1", ""), hit("https://b.test/2", "")],
        );
        let (mut s, _) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert_eq!(out, SentenceOutcome::unmatched(&sentence()));
    }

    #[tokio::test]
    async fn search_failure_yields_unmatched_outcome() {
        let script = Script {
            search_error: Some("HTTP 429".to_string()),
            ..Script::default()
        };
        let (mut s, counters) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert_eq!(out, SentenceOutcome::unmatched(&sentence()));
        assert_eq!(counters.searches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn extraction_failure_moves_on_to_next_candidate() {
        let mut script = Script::default();
        script.results.insert(
            TEXT.to_string(),
            vec![hit("https://a.test/1", ""), hit("https://b.test/2", "")],
        );
        script.pages.insert("https://a.test/1".to_string(), TEXT.to_string());
        script
            .pages
            .insert("https://b.test/2".to_string(), format!("Copied: {TEXT}"));
        script.text_error.insert("https://a.test/1".to_string());
        let (mut s, counters) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert_eq!(out.matched_urls, vec!["https://b.test/2"]);
        assert_eq!(counters.navigations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn extraction_failure_on_every_page_yields_unmatched_outcome() {
        let mut script = Script::default();
        script
            .results
            .insert(TEXT.to_string(), vec![hit("https://a.test/1", "")]);
        script.pages.insert("https://a.test/1".to_string(), TEXT.to_string());
        script.text_error.insert("https://a.test/1".to_string());
        let (mut s, _) = session(script);
        let out = search_sentence(&mut s, &sentence(), &CheckConfig::default()).await;
        assert!(!out.is_match());
    }

    #[tokio::test]
    async fn punctuation_only_sentence_is_not_searched() {
        let (mut s, counters) = session(Script::default());
        let punct = Sentence {
            index: 4,
            text: "?!?!?!?!?!?!?!?!".to_string(),
            start: 0,
            end: 16,
        };
        let out = search_sentence(&mut s, &punct, &CheckConfig::default()).await;
        assert!(!out.is_match());
        assert_eq!(counters.searches.load(Ordering::SeqCst), 0);
    }
}
