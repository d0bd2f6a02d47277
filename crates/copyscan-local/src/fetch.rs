//! Plain-HTTP session backend: search through a [`SearchProvider`], load pages with reqwest.
//!
//! Nothing is rendered, so the page settle delay is not applied. The search settle delay is,
//! since it also paces requests to the search engine.

use copyscan_core::{
    Candidate, Error, Result, SearchProvider, SearchQuery, Session, SessionFactory, SessionOptions,
};
use std::sync::Arc;
use std::time::Duration;

fn strip_tag_blocks(html: &str, tag: &str) -> String {
    // Minimal stripper for <tag ...> ... </tag> blocks; only removes when a close tag exists.
    let open_pat = format!("<{}", tag.to_ascii_lowercase());
    let close_pat = format!("</{}>", tag.to_ascii_lowercase());

    let mut out = String::new();
    let mut i = 0usize;
    let lower = html.to_ascii_lowercase();
    while let Some(rel_start) = lower[i..].find(&open_pat) {
        let start = i + rel_start;
        let after_open = start + open_pat.len();
        if let Some(rel_end) = lower[after_open..].find(&close_pat) {
            let end = after_open + rel_end + close_pat.len();
            out.push_str(&html[i..start]);
            i = end;
        } else {
            break;
        }
    }
    out.push_str(&html[i..]);
    out
}

/// Visible text of an HTML document (body only when present), whitespace-collapsed.
pub fn visible_text(html: &str) -> String {
    let mut cleaned = html.to_string();
    for tag in ["script", "style", "noscript", "template"] {
        cleaned = strip_tag_blocks(&cleaned, tag);
    }
    let doc = html_scraper::Html::parse_document(&cleaned);
    let body = html_scraper::Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next());
    let parts: Vec<&str> = match body {
        Some(b) => b.text().collect(),
        None => doc.root_element().text().collect(),
    };
    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct HttpSessionFactory {
    provider: Arc<dyn SearchProvider>,
}

impl HttpSessionFactory {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }

    pub fn from_env() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Session(e.to_string()))?;
        Ok(Self::new(crate::search::provider_from_env(client)?))
    }
}

#[async_trait::async_trait]
impl SessionFactory for HttpSessionFactory {
    type Session = HttpSession;

    fn name(&self) -> &'static str {
        "http"
    }

    async fn create(&self, worker_id: usize, opts: &SessionOptions) -> Result<HttpSession> {
        let client = reqwest::Client::builder()
            .user_agent(opts.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(opts.navigation_timeout)
            .timeout(opts.navigation_timeout)
            .build()
            .map_err(|e| Error::Session(e.to_string()))?;
        tracing::debug!(worker_id, provider = self.provider.name(), "http session created");
        Ok(HttpSession {
            client,
            provider: self.provider.clone(),
            navigation_timeout: opts.navigation_timeout,
            search_settle: opts.search_settle,
            max_page_bytes: opts.max_page_bytes,
            html: None,
        })
    }
}

pub struct HttpSession {
    client: reqwest::Client,
    provider: Arc<dyn SearchProvider>,
    navigation_timeout: Duration,
    search_settle: Duration,
    max_page_bytes: usize,
    html: Option<String>,
}

/// Read a response body, keeping at most `max_bytes` of it.
async fn read_capped(resp: reqwest::Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    use futures_util::StreamExt;
    let mut bytes = Vec::new();
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Navigate(e.to_string()))?;
        if bytes.len().saturating_add(chunk.len()) > max_bytes {
            let can_take = max_bytes.saturating_sub(bytes.len());
            bytes.extend_from_slice(&chunk[..can_take]);
            return Ok((bytes, true));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok((bytes, false))
}

#[async_trait::async_trait]
impl Session for HttpSession {
    async fn search(&mut self, query: &str) -> Result<Vec<Candidate>> {
        let mut q = SearchQuery::new(query);
        q.timeout_ms = Some(self.navigation_timeout.as_millis() as u64);
        let out = self.provider.search(&q).await;
        if !self.search_settle.is_zero() {
            tokio::time::sleep(self.search_settle).await;
        }
        out
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.html = None;
        let resp = self
            .client
            .get(url)
            .timeout(self.navigation_timeout)
            .send()
            .await
            .map_err(|e| Error::Navigate(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Navigate(format!("HTTP {status} for {url}")));
        }
        let (bytes, truncated) = read_capped(resp, self.max_page_bytes).await?;
        if truncated {
            tracing::debug!(url, max_bytes = self.max_page_bytes, "page body truncated");
        }
        self.html = Some(String::from_utf8_lossy(&bytes).into_owned());
        Ok(())
    }

    async fn page_text(&mut self) -> Result<String> {
        let html = self
            .html
            .as_deref()
            .ok_or_else(|| Error::Extract("no page loaded".to_string()))?;
        Ok(visible_text(html))
    }

    async fn release(&mut self) -> Result<()> {
        self.html = None;
        Ok(())
    }
}
