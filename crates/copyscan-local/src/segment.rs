//! Sentence segmentation with offsets into the original document.
//!
//! Pipeline:
//! - repair missing breaks (`end.Next` -> `end. Next`)
//! - tokenize (UAX #29 sentence boundaries by default, titles and initials rejoined;
//!   punctuation regex on tokenizer error)
//! - trim + minimum-length filter
//! - resolve each sentence back to a byte range of the *original* document
//!
//! Segmentation never fails: a sentence whose text cannot be located is dropped.

use copyscan_core::{Result, Sentence};
use regex::Regex;
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

pub trait SentenceTokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;
}

/// Unicode (UAX #29) sentence boundaries, with title abbreviations and initials rejoined.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeSentences;

impl SentenceTokenizer for UnicodeSentences {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        Ok(merge_abbreviations(
            text.unicode_sentences().map(|s| s.to_string()),
        ))
    }
}

// Tokens that end a UAX #29 "sentence" but almost never end a real one: they precede a
// name or an example ("Dr. Smith", "e.g. Paris").
const NON_TERMINAL_ABBREVIATIONS: &[&str] = &[
    "Dr.", "Mr.", "Mrs.", "Ms.", "Prof.", "Sr.", "Jr.", "St.", "Mt.", "Rev.", "Gen.", "Col.",
    "Capt.", "Lt.", "Sgt.", "Hon.", "Gov.", "Sen.", "Rep.", "e.g.", "i.e.", "cf.", "vs.",
];

fn ends_with_abbreviation(piece: &str) -> bool {
    let Some(last) = piece.split_whitespace().last() else {
        return false;
    };
    let word = last.trim_start_matches(['(', '[', '"', '\'', '\u{201C}', '\u{2018}']);
    if NON_TERMINAL_ABBREVIATIONS.contains(&word) {
        return true;
    }
    // Single initial: "J." in "J. K. Rowling".
    let mut chars = word.chars();
    matches!(
        (chars.next(), chars.next(), chars.next()),
        (Some(c), Some('.'), None) if c.is_uppercase()
    )
}

/// Join each piece ending in a known abbreviation or an initial onto the piece after it.
///
/// Pieces keep their trailing whitespace, so a merged piece is still a verbatim slice of the
/// tokenized text.
fn merge_abbreviations(pieces: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut carry = false;
    for piece in pieces {
        match out.last_mut() {
            Some(prev) if carry => prev.push_str(&piece),
            _ => out.push(piece),
        }
        carry = out.last().is_some_and(|p| ends_with_abbreviation(p));
    }
    out
}

fn break_repair_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]\p{Lu}").ok()).as_ref()
}

fn fallback_split_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s*").ok()).as_ref()
}

/// Document with missing breaks repaired, and where the spaces were inserted.
struct Repaired {
    text: String,
    /// Byte positions in `text` of inserted spaces, ascending.
    inserted: Vec<usize>,
}

impl Repaired {
    fn new(document: &str) -> Self {
        let Some(re) = break_repair_re() else {
            return Self {
                text: document.to_string(),
                inserted: Vec::new(),
            };
        };
        let mut text = String::with_capacity(document.len() + 16);
        let mut inserted = Vec::new();
        let mut last = 0usize;
        for m in re.find_iter(document) {
            // The stop is ASCII, so one byte past it is a char boundary.
            let at = m.start() + 1;
            text.push_str(&document[last..at]);
            inserted.push(text.len());
            text.push(' ');
            last = at;
        }
        text.push_str(&document[last..]);
        Self { text, inserted }
    }

    /// Map a byte position in the repaired text back to the original document.
    fn to_original(&self, pos: usize) -> usize {
        pos - self.inserted.partition_point(|&q| q < pos)
    }
}

/// Insert a space after `.`, `!`, `?` when an uppercase letter follows immediately.
pub fn repair_breaks(text: &str) -> String {
    Repaired::new(text).text
}

/// Punctuation-based split used when the tokenizer errors.
pub fn fallback_split(text: &str) -> Vec<String> {
    match fallback_split_re() {
        Some(re) => re.split(text).map(|s| s.to_string()).collect(),
        None => vec![text.to_string()],
    }
}

pub struct Segmenter {
    tokenizer: Box<dyn SentenceTokenizer>,
    min_len: usize,
}

impl Segmenter {
    pub fn new(min_len: usize) -> Self {
        Self::with_tokenizer(min_len, UnicodeSentences)
    }

    pub fn with_tokenizer(min_len: usize, tokenizer: impl SentenceTokenizer + 'static) -> Self {
        Self {
            tokenizer: Box::new(tokenizer),
            min_len,
        }
    }

    pub fn segment(&self, document: &str) -> Vec<Sentence> {
        let repaired = Repaired::new(document);
        let pieces = match self.tokenizer.tokenize(&repaired.text) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "sentence tokenizer failed; using punctuation split");
                fallback_split(&repaired.text)
            }
        };
        let out = resolve_offsets(document, &repaired, &pieces, self.min_len);
        tracing::info!(sentences = out.len(), "document segmented");
        out
    }
}

/// Locate each piece in the repaired text, scanning forward from the previous match, and
/// map the span back onto `document`.
///
/// If a piece is not found after the cursor, the whole text is searched for an occurrence
/// that does not overlap an already-placed sentence. Pieces that cannot be placed are
/// dropped. Sentence text is the original slice, so a repaired "J. K." reads "J.K." again.
/// The result is ordered by `start` and indexed from 1.
fn resolve_offsets(document: &str, repaired: &Repaired, pieces: &[String], min_len: usize) -> Vec<Sentence> {
    let text = repaired.text.as_str();
    let mut placed: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0usize;

    for piece in pieces {
        let t = piece.trim();
        if t.is_empty() {
            continue;
        }
        let from_cursor = text
            .get(cursor..)
            .and_then(|rest| rest.find(t))
            .map(|i| i + cursor);
        let Some(start) = from_cursor.or_else(|| find_unplaced(text, t, &placed)) else {
            tracing::debug!(sentence = %preview(t), "sentence not found in document; dropped");
            continue;
        };
        let end = start + t.len();
        cursor = cursor.max(end);
        placed.push((start, end));
    }

    placed.sort_unstable();
    placed
        .into_iter()
        .map(|(s, e)| (repaired.to_original(s), repaired.to_original(e)))
        .filter(|&(s, e)| document[s..e].chars().count() >= min_len)
        .enumerate()
        .map(|(i, (start, end))| Sentence {
            index: i + 1,
            text: document[start..end].to_string(),
            start,
            end,
        })
        .collect()
}

fn find_unplaced(document: &str, needle: &str, placed: &[(usize, usize)]) -> Option<usize> {
    document
        .match_indices(needle)
        .map(|(i, _)| i)
        .find(|&s| {
            let e = s + needle.len();
            placed.iter().all(|&(ps, pe)| e <= ps || s >= pe)
        })
}

pub(crate) fn preview(s: &str) -> String {
    let mut out: String = s.chars().take(50).collect();
    if s.chars().count() > 50 {
        out.push_str("...");
    }
    out
}
