//! JSON response shape of `copyscan check`.

use copyscan_core::{Highlight, Report};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub(crate) struct WireReport<'a> {
    pub plagiarism_score: f64,
    pub highlights: &'a [Highlight],
    /// Seconds.
    pub processing_time: f64,
    pub sentences_checked: usize,
    pub parallel_workers: usize,
    pub incomplete: usize,
}

impl<'a> From<&'a Report> for WireReport<'a> {
    fn from(r: &'a Report) -> Self {
        Self {
            plagiarism_score: r.score,
            highlights: &r.highlights,
            processing_time: r.elapsed.as_secs_f64(),
            sentences_checked: r.sentence_count,
            parallel_workers: r.workers,
            incomplete: r.incomplete,
        }
    }
}

/// Human-readable summary, one line per flagged sentence.
pub(crate) fn render_text(r: &Report) -> String {
    let mut out = format!(
        "{}% plagiarized ({}/{} sentences), {}% original, {:.1}s\n",
        r.percentage(),
        r.highlights.len(),
        r.sentence_count,
        r.original_percentage(),
        r.elapsed.as_secs_f64()
    );
    if r.incomplete > 0 {
        out.push_str(&format!(
            "warning: {} sentence(s) were not checked before the deadline\n",
            r.incomplete
        ));
    }
    for h in &r.highlights {
        out.push_str(&format!("- [{}..{}] {}\n", h.start, h.end, h.text));
        for s in &h.sources {
            out.push_str(&format!("    {s}\n"));
        }
    }
    out
}
