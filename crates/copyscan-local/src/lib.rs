//! Sentence-level web plagiarism checking.
//!
//! [`Checker`] segments a document, searches every sentence on a fixed-size worker pool
//! (one reusable [`Session`](copyscan_core::Session) per worker) and folds the outcomes
//! into a [`Report`] in document order.

use copyscan_core::{CheckConfig, Error, Report, Result, SessionFactory};
use std::time::Instant;

pub mod aggregate;
pub mod candidates;
pub mod fetch;
pub mod matcher;
pub mod pool;
pub mod render_playwright;
pub mod search;
pub mod segment;
pub mod task;
pub mod textprep;

pub use fetch::{HttpSession, HttpSessionFactory};
pub use pool::WorkerPool;
pub use render_playwright::{PlaywrightSession, PlaywrightSessionFactory};
pub use segment::Segmenter;

pub struct Checker<F: SessionFactory> {
    cfg: CheckConfig,
    pool: WorkerPool<F>,
}

impl<F: SessionFactory> Checker<F> {
    pub fn new(factory: F, cfg: CheckConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            pool: WorkerPool::new(factory),
        })
    }

    pub fn config(&self) -> &CheckConfig {
        &self.cfg
    }

    pub fn backend(&self) -> &'static str {
        self.pool.factory().name()
    }

    pub async fn check(&self, document: &str) -> Result<Report> {
        self.check_with(document, &self.cfg).await
    }

    /// Like [`Checker::check`] with a per-call configuration.
    ///
    /// Sessions already parked in the pool keep the options they were created with.
    pub async fn check_with(&self, document: &str, cfg: &CheckConfig) -> Result<Report> {
        let started = Instant::now();
        if document.trim().is_empty() {
            return Err(Error::InvalidInput("no text provided".to_string()));
        }
        cfg.validate()?;

        let sentences = Segmenter::new(cfg.min_sentence_length).segment(document);
        let sentence_count = sentences.len();
        if sentence_count == 0 {
            tracing::info!("no sentences long enough to check");
            return Ok(Report::empty(started.elapsed()));
        }

        let run = self.pool.run_all(sentences, cfg).await;
        let report =
            aggregate::build_report(run.outcomes, sentence_count, run.workers, started.elapsed());
        tracing::info!(
            sentences = report.sentence_count,
            matched = report.highlights.len(),
            incomplete = report.incomplete,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "check complete"
        );
        Ok(report)
    }

    /// Release every pooled session.
    pub async fn shutdown(&self) -> usize {
        self.pool.shutdown().await
    }
}
