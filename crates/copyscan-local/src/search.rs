use copyscan_core::{Candidate, Error, Result, SearchProvider, SearchQuery};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_DDG_HTML_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
/// Raw hits kept from a SearXNG response; candidate filtering narrows them further.
const SEARXNG_MAX_RESULTS: usize = 10;

fn timeout_ms_from_query(q: &SearchQuery) -> u64 {
    // Provider requests can hang indefinitely without an explicit timeout.
    q.timeout_ms.unwrap_or(20_000).clamp(1_000, 60_000)
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn ddg_endpoint_from_env() -> Option<String> {
    env("COPYSCAN_DDG_ENDPOINT")
}

pub fn searxng_endpoints_from_env() -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    // Comma/whitespace-separated list for simple load spreading.
    if let Some(v) = env("COPYSCAN_SEARXNG_ENDPOINTS") {
        for raw in v.split(|c: char| c == ',' || c.is_whitespace()) {
            let s = raw.trim();
            if s.is_empty() {
                continue;
            }
            let s = s.to_string();
            if !out.contains(&s) {
                out.push(s);
            }
        }
    }

    if let Some(s) = env("COPYSCAN_SEARXNG_ENDPOINT") {
        if !out.contains(&s) {
            out.push(s);
        }
    }

    out
}

/// Search provider named by `COPYSCAN_SEARCH_PROVIDER` (`duckduckgo` by default).
pub fn provider_from_env(client: reqwest::Client) -> Result<Arc<dyn SearchProvider>> {
    let name = env("COPYSCAN_SEARCH_PROVIDER")
        .unwrap_or_else(|| "duckduckgo".to_string())
        .to_ascii_lowercase();
    match name.as_str() {
        "duckduckgo" | "ddg" => Ok(Arc::new(DuckDuckGoHtml::from_env(client))),
        "searxng" => Ok(Arc::new(SearxngSearchProvider::from_env(client)?)),
        other => Err(Error::NotSupported(format!(
            "unknown search provider {other:?} (expected duckduckgo|searxng)"
        ))),
    }
}

/// Results page URL for the interactive DuckDuckGo front end (used by rendered sessions).
pub fn duckduckgo_results_url(query: &str) -> Result<String> {
    url::Url::parse_with_params(
        "https://duckduckgo.com/",
        &[("q", query), ("t", "h_"), ("ia", "web")],
    )
    .map(|u| u.to_string())
    .map_err(|e| Error::InvalidUrl(e.to_string()))
}

fn norm_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: &html_scraper::ElementRef) -> String {
    norm_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Resolve a result href to the target URL.
///
/// DuckDuckGo wraps outbound links as `//duckduckgo.com/l/?uddg=<encoded target>`.
pub fn unwrap_result_href(href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let base = url::Url::parse("https://duckduckgo.com/").ok()?;
    let u = base.join(href).ok()?;
    let is_ddg = u
        .host_str()
        .map(|h| h.ends_with("duckduckgo.com"))
        .unwrap_or(false);
    if is_ddg && u.path().starts_with("/l/") {
        if let Some((_, target)) = u.query_pairs().find(|(k, _)| k == "uddg") {
            return Some(target.into_owned());
        }
    }
    Some(u.to_string())
}

fn select_results(
    doc: &html_scraper::Html,
    container: &str,
    link: &str,
    snippets: &[&str],
) -> Vec<Candidate> {
    let (Ok(container), Ok(link)) = (
        html_scraper::Selector::parse(container),
        html_scraper::Selector::parse(link),
    ) else {
        return Vec::new();
    };
    let snippet_sels: Vec<html_scraper::Selector> = snippets
        .iter()
        .filter_map(|s| html_scraper::Selector::parse(s).ok())
        .collect();

    let mut out = Vec::new();
    for item in doc.select(&container) {
        let Some(a) = item.select(&link).next() else {
            continue;
        };
        let Some(url) = a.value().attr("href").and_then(unwrap_result_href) else {
            continue;
        };
        let snippet = snippet_sels
            .iter()
            .find_map(|sel| item.select(sel).next())
            .map(|el| element_text(&el))
            .unwrap_or_default();
        out.push(Candidate { url, snippet });
    }
    out
}

/// Extract `(url, snippet)` pairs from a DuckDuckGo results page.
///
/// Tries the current layout first and falls back to the legacy `.result` layout when the
/// current one yields nothing.
pub fn parse_duckduckgo_results(html: &str) -> Vec<Candidate> {
    let doc = html_scraper::Html::parse_document(html);
    let primary = select_results(
        &doc,
        r#"article[data-testid="result"]"#,
        r#"a[data-testid="result-title-a"]"#,
        &[r#"[data-result="snippet"]"#, "span"],
    );
    if !primary.is_empty() {
        return primary;
    }
    select_results(&doc, ".result", "a.result__a", &[".result__snippet"])
}

#[derive(Debug, Clone)]
pub struct DuckDuckGoHtml {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGoHtml {
    pub fn from_env(client: reqwest::Client) -> Self {
        let endpoint = ddg_endpoint_from_env().unwrap_or_else(|| DEFAULT_DDG_HTML_ENDPOINT.to_string());
        Self { client, endpoint }
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait::async_trait]
impl SearchProvider for DuckDuckGoHtml {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<Candidate>> {
        let timeout_ms = timeout_ms_from_query(q);
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", q.query.as_str())])
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("duckduckgo search HTTP {status}")));
        }
        let html = resp.text().await.map_err(|e| Error::Search(e.to_string()))?;
        Ok(parse_duckduckgo_results(&html))
    }
}

#[derive(Debug, Clone)]
pub struct SearxngSearchProvider {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl SearxngSearchProvider {
    pub fn from_env(client: reqwest::Client) -> Result<Self> {
        let endpoints = searxng_endpoints_from_env();
        if endpoints.is_empty() {
            return Err(Error::NotConfigured(
                "missing COPYSCAN_SEARXNG_ENDPOINT (or COPYSCAN_SEARXNG_ENDPOINTS)".to_string(),
            ));
        }
        Ok(Self { client, endpoints })
    }

    pub fn with_endpoints(client: reqwest::Client, endpoints: Vec<String>) -> Self {
        Self { client, endpoints }
    }

    fn endpoint_search_for(base_endpoint: &str) -> String {
        // Accept either a base URL (…/), or a full /search endpoint.
        let mut base = base_endpoint.trim().trim_end_matches('/').to_string();
        if !base.ends_with("/search") {
            base.push_str("/search");
        }
        base
    }

    fn stable_hash64(query: &SearchQuery) -> u64 {
        // FNV-1a; stable across runs unlike RandomState.
        let mut h: u64 = 1469598103934665603;
        for b in query.query.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        h
    }

    fn pick_endpoint_index(&self, q: &SearchQuery) -> usize {
        if self.endpoints.is_empty() {
            return 0;
        }
        (Self::stable_hash64(q) as usize) % self.endpoints.len()
    }
}

#[derive(Debug, Deserialize)]
struct SearxngSearchResponse {
    results: Option<Vec<SearxngResult>>,
}

#[derive(Debug, Deserialize)]
struct SearxngResult {
    url: Option<String>,
    // SearXNG uses `content` for snippets in JSON format.
    content: Option<String>,
}

#[async_trait::async_trait]
impl SearchProvider for SearxngSearchProvider {
    fn name(&self) -> &'static str {
        "searxng"
    }

    async fn search(&self, q: &SearchQuery) -> Result<Vec<Candidate>> {
        let idx = self.pick_endpoint_index(q);
        let base_endpoint = self.endpoints.get(idx).map(|s| s.as_str()).unwrap_or("");

        let resp = self
            .client
            .get(Self::endpoint_search_for(base_endpoint))
            .query(&[("q", q.query.as_str()), ("format", "json")])
            .timeout(std::time::Duration::from_millis(timeout_ms_from_query(q)))
            .send()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Search(format!("searxng search HTTP {status}")));
        }
        let parsed: SearxngSearchResponse = resp
            .json()
            .await
            .map_err(|e| Error::Search(e.to_string()))?;

        let mut out = Vec::new();
        for r in parsed.results.unwrap_or_default().into_iter().take(SEARXNG_MAX_RESULTS) {
            let Some(url) = r.url else { continue };
            out.push(Candidate {
                url,
                snippet: r.content.unwrap_or_default(),
            });
        }
        Ok(out)
    }
}
