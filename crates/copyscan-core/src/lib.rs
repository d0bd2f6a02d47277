use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("navigation failed: {0}")]
    Navigate(String),
    #[error("text extraction failed: {0}")]
    Extract(String),
    #[error("session error: {0}")]
    Session(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// One segmented unit of the input document.
///
/// `start..end` is a byte range into the original document and
/// `&document[start..end] == text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// 1-based position in document order.
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// A single search-engine hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceOutcome {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// Empty means "no evidence found", never "verified original".
    pub matched_urls: Vec<String>,
}

impl SentenceOutcome {
    pub fn unmatched(s: &Sentence) -> Self {
        Self {
            index: s.index,
            text: s.text.clone(),
            start: s.start,
            end: s.end,
            matched_urls: Vec::new(),
        }
    }

    pub fn matched(s: &Sentence, urls: Vec<String>) -> Self {
        Self {
            matched_urls: urls,
            ..Self::unmatched(s)
        }
    }

    pub fn is_match(&self) -> bool {
        !self.matched_urls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Binary match model: always 1.0.
    pub confidence: f64,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// `highlights.len() / sentence_count`, in `[0, 1]`.
    pub score: f64,
    pub highlights: Vec<Highlight>,
    pub sentence_count: usize,
    pub elapsed: Duration,
    /// Parallel workers used for the run.
    pub workers: usize,
    /// Sentences that produced no outcome (caught panic or deadline); counted as unmatched.
    pub incomplete: usize,
}

impl Report {
    pub fn empty(elapsed: Duration) -> Self {
        Self {
            score: 0.0,
            highlights: Vec::new(),
            sentence_count: 0,
            elapsed,
            workers: 0,
            incomplete: 0,
        }
    }

    /// Rounded plagiarism percentage (0..=100).
    pub fn percentage(&self) -> u32 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u32
    }

    pub fn original_percentage(&self) -> u32 {
        100 - self.percentage()
    }
}

pub const DEFAULT_MAX_PAGE_BYTES: usize = 5 * 1024 * 1024;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Search engines, non-indexable and social aggregator hosts. Matched as a
/// substring of the candidate's host.
pub const DEFAULT_DENY_DOMAINS: &[&str] = &[
    "duckduckgo.com",
    "google.com",
    "bing.com",
    "yahoo.com",
    "duck.co",
    "boredpanda.com",
    "pinterest.com",
    "instagram.com",
    "twitter.com",
    "facebook.com",
    "tiktok.com",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// Candidates kept per sentence after filtering.
    pub max_search_results: usize,
    /// Minimum trimmed sentence length, in chars.
    pub min_sentence_length: usize,
    pub navigation_timeout: Duration,
    /// Fixed wait after loading a results page.
    pub search_settle: Duration,
    /// Fixed wait after navigating to a candidate page.
    pub page_settle: Duration,
    pub max_pages_to_visit: usize,
    pub worker_count: usize,
    pub deny_domains: Vec<String>,
    pub user_agent: String,
    /// Page bodies are truncated to this many bytes before text extraction.
    pub max_page_bytes: usize,
    /// Request-level deadline. Unfinished sentences count as unmatched.
    pub deadline: Option<Duration>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            max_search_results: 3,
            min_sentence_length: 15,
            navigation_timeout: Duration::from_secs(6),
            search_settle: Duration::from_millis(1_500),
            page_settle: Duration::from_millis(500),
            max_pages_to_visit: 2,
            worker_count: 8,
            deny_domains: DEFAULT_DENY_DOMAINS.iter().map(|s| s.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_page_bytes: DEFAULT_MAX_PAGE_BYTES,
            deadline: None,
        }
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_usize(key: &str) -> Option<usize> {
    env(key).and_then(|s| s.parse::<usize>().ok())
}

fn env_ms(key: &str) -> Option<Duration> {
    env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

impl CheckConfig {
    /// Defaults overlaid with `COPYSCAN_*` environment variables.
    ///
    /// Empty or unparsable values are treated as unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = env_usize("COPYSCAN_MAX_SEARCH_RESULTS") {
            cfg.max_search_results = n;
        }
        if let Some(n) = env_usize("COPYSCAN_MIN_SENTENCE_LENGTH") {
            cfg.min_sentence_length = n;
        }
        if let Some(d) = env_ms("COPYSCAN_NAVIGATION_TIMEOUT_MS") {
            cfg.navigation_timeout = d;
        }
        if let Some(d) = env_ms("COPYSCAN_SEARCH_SETTLE_MS") {
            cfg.search_settle = d;
        }
        if let Some(d) = env_ms("COPYSCAN_PAGE_SETTLE_MS") {
            cfg.page_settle = d;
        }
        if let Some(n) = env_usize("COPYSCAN_MAX_PAGES_TO_VISIT") {
            cfg.max_pages_to_visit = n;
        }
        if let Some(n) = env_usize("COPYSCAN_WORKERS") {
            cfg.worker_count = n;
        }
        if let Some(v) = env("COPYSCAN_DENY_DOMAINS") {
            cfg.deny_domains = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(ua) = env("COPYSCAN_USER_AGENT") {
            cfg.user_agent = ua;
        }
        if let Some(n) = env_usize("COPYSCAN_MAX_PAGE_BYTES") {
            cfg.max_page_bytes = n;
        }
        if let Some(d) = env_ms("COPYSCAN_DEADLINE_MS") {
            cfg.deadline = Some(d);
        }
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::InvalidConfig("worker_count must be >= 1".to_string()));
        }
        if self.max_search_results == 0 {
            return Err(Error::InvalidConfig(
                "max_search_results must be >= 1".to_string(),
            ));
        }
        if self.navigation_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "navigation_timeout must be non-zero".to_string(),
            ));
        }
        if self.max_page_bytes == 0 {
            return Err(Error::InvalidConfig("max_page_bytes must be >= 1".to_string()));
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            navigation_timeout: self.navigation_timeout,
            search_settle: self.search_settle,
            page_settle: self.page_settle,
            user_agent: self.user_agent.clone(),
            max_page_bytes: self.max_page_bytes,
        }
    }
}

/// The subset of [`CheckConfig`] a session needs at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub navigation_timeout: Duration,
    pub search_settle: Duration,
    pub page_settle: Duration,
    pub user_agent: String,
    pub max_page_bytes: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        CheckConfig::default().session_options()
    }
}

/// A reusable, expensive-to-create browsing/search handle owned by exactly one worker.
#[async_trait::async_trait]
pub trait Session: Send {
    /// Issue `query` against the search service and return hits in result order.
    async fn search(&mut self, query: &str) -> Result<Vec<Candidate>>;
    /// Load `url`; returns once the settle delay has elapsed.
    async fn navigate(&mut self, url: &str) -> Result<()>;
    /// Visible text of the currently loaded page.
    async fn page_text(&mut self) -> Result<String>;
    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
    /// `false` once the session can no longer serve requests (e.g. its browser died).
    fn is_alive(&mut self) -> bool {
        true
    }
}

#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Session + 'static;

    fn name(&self) -> &'static str;
    async fn create(&self, worker_id: usize, opts: &SessionOptions) -> Result<Self::Session>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub timeout_ms: Option<u64>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            timeout_ms: None,
        }
    }
}

#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, q: &SearchQuery) -> Result<Vec<Candidate>>;
}

/// Lower-cased host of `url`, if it parses.
pub fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}
