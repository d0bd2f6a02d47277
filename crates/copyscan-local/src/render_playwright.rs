//! Headless-browser session backed by a long-lived Node.js + Playwright child process.
//!
//! One child per worker. The child launches Chromium once and then serves newline-delimited
//! JSON requests on stdin (`search`, `goto`, `text`, `close`), answering one JSON line per
//! request on stdout. Every request has a hard wall-clock timeout on the Rust side; a timed-out
//! child is killed and the session reports itself dead so the pool can replace it.
//!
//! Expected setup:
//! - Node.js present (`node`, or `COPYSCAN_NODE`)
//! - `playwright` npm package resolvable by Node (global, `NODE_PATH`, or `COPYSCAN_NODE_PATH`)
//! - Chromium installed for Playwright (`npx playwright install chromium`)

use copyscan_core::{Candidate, Error, Result, Session, SessionFactory, SessionOptions};
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};

const JS: &str = r#"
const readline = require('readline');

function out(obj) { process.stdout.write(JSON.stringify(obj) + '\n'); }
function bad(code, message, hint) { out({ ok: false, error: { code, message, hint } }); }

const EXTRACT_RESULTS = () => {
  const results = [];
  document.querySelectorAll('article[data-testid="result"]').forEach((article) => {
    const link = article.querySelector('a[data-testid="result-title-a"]');
    let snippet = article.querySelector('[data-result="snippet"]');
    if (!snippet) snippet = article.querySelector('span');
    if (link && link.href) results.push({ url: link.href, snippet: snippet ? snippet.innerText : '' });
  });
  if (results.length === 0) {
    document.querySelectorAll('.result').forEach((result) => {
      const link = result.querySelector('a.result__a');
      const snippet = result.querySelector('.result__snippet');
      if (link && link.href) results.push({ url: link.href, snippet: snippet ? snippet.innerText : '' });
    });
  }
  return results;
};

const PAGE_TEXT = () => document.body ? (document.body.innerText || document.body.textContent || '') : '';

async function main() {
  const rl = readline.createInterface({ input: process.stdin, crlfDelay: Infinity });
  const lines = rl[Symbol.asyncIterator]();

  const first = await lines.next();
  let cfg;
  try { cfg = JSON.parse(first.value || '{}'); } catch (e) { return bad('invalid_params', 'bad session config', 'Internal error: could not parse session config.'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('not_configured',
      'Playwright is not installed for Node.js (require("playwright") failed)',
      'Install Playwright (Node): `npm i -g playwright` and then `npx playwright install chromium`.');
  }

  let browser;
  let page;
  try {
    browser = await pw.chromium.launch({
      headless: true,
      args: ['--disable-blink-features=AutomationControlled', '--disable-dev-shm-usage', '--disable-gpu', '--disable-extensions', '--no-sandbox'],
    });
    const context = await browser.newContext({
      userAgent: String(cfg.user_agent || ''),
      viewport: { width: 1920, height: 1080 },
      serviceWorkers: 'block',
    });
    await context.addInitScript(() => {
      Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    });
    await context.route('**/*', (route) => {
      const rt = route.request().resourceType();
      if (rt === 'image' || rt === 'stylesheet' || rt === 'font' || rt === 'media') return route.abort();
      return route.continue();
    });
    page = await context.newPage();
    page.setDefaultNavigationTimeout(Number(cfg.navigation_timeout_ms || 6000));
  } catch (e) {
    try { if (browser) await browser.close(); } catch (_) {}
    return bad('not_configured', String(e && e.message ? e.message : e), 'Chromium failed to launch. Try `npx playwright install chromium`.');
  }
  out({ ok: true, ready: true });

  for (;;) {
    const next = await lines.next();
    if (next.done) break;
    let req;
    try { req = JSON.parse(next.value); } catch (e) { bad('invalid_params', 'bad JSON request'); continue; }
    try {
      if (req.op === 'search' || req.op === 'goto') {
        const resp = await page.goto(String(req.url || ''), { waitUntil: 'domcontentloaded' });
        await page.waitForTimeout(Number(req.settle_ms || 0));
        if (req.op === 'search') {
          out({ ok: true, results: await page.evaluate(EXTRACT_RESULTS) });
        } else {
          out({ ok: true, final_url: page.url(), status: resp ? resp.status() : null });
        }
      } else if (req.op === 'text') {
        out({ ok: true, text: await page.evaluate(PAGE_TEXT) });
      } else if (req.op === 'close') {
        break;
      } else {
        bad('invalid_params', 'unknown op ' + String(req.op));
      }
    } catch (e) {
      bad('fetch_failed', String(e && e.message ? e.message : e));
    }
  }
  try { await browser.close(); } catch (_) {}
  out({ ok: true, closed: true });
}

main().then(() => process.exit(0)).catch((e) => { bad('fetch_failed', String(e && e.message ? e.message : e)); process.exit(0); });
"#;

/// Slack added on top of the navigation timeout + settle delay for each request.
const OP_SLACK: Duration = Duration::from_secs(5);
/// Browser launch budget for a new session.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_truthy(k: &str) -> bool {
    matches!(
        env(k).unwrap_or_default().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn node_path_has_playwright(np: &str) -> bool {
    np.split(':')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|p| std::path::Path::new(p).join("playwright").is_dir())
}

fn global_node_roots() -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(
            home.join(".npm-global")
                .join("lib")
                .join("node_modules")
                .to_string_lossy()
                .to_string(),
        );
    }
    out.push("/opt/homebrew/lib/node_modules".to_string());
    out.push("/usr/local/lib/node_modules".to_string());
    out.push("/usr/lib/node_modules".to_string());
    out
}

fn npm_root_g() -> Option<String> {
    let out = std::process::Command::new("npm")
        .args(["root", "-g"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    node_path_has_playwright(&s).then_some(s)
}

/// `NODE_PATH` value that makes a globally installed Playwright resolvable.
///
/// `None` means "leave NODE_PATH alone" (already fine, or nothing found).
pub fn node_path_for_playwright() -> Option<String> {
    if let Some(v) = env("COPYSCAN_NODE_PATH") {
        return Some(v);
    }
    let existing = std::env::var("NODE_PATH").unwrap_or_default();
    if node_path_has_playwright(&existing) {
        return None;
    }
    let found = npm_root_g().or_else(|| {
        global_node_roots()
            .into_iter()
            .find(|root| node_path_has_playwright(root))
    })?;
    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

pub fn node_bin() -> String {
    env("COPYSCAN_NODE").unwrap_or_else(|| "node".to_string())
}

#[derive(Debug, Clone)]
pub struct PlaywrightSessionFactory {
    node_bin: String,
    /// Resolved once here; discovery may shell out to `npm root -g`.
    node_path: Option<String>,
}

impl PlaywrightSessionFactory {
    pub fn from_env() -> Self {
        Self {
            node_bin: node_bin(),
            node_path: node_path_for_playwright(),
        }
    }
}

#[async_trait::async_trait]
impl SessionFactory for PlaywrightSessionFactory {
    type Session = PlaywrightSession;

    fn name(&self) -> &'static str {
        "playwright"
    }

    async fn create(&self, worker_id: usize, opts: &SessionOptions) -> Result<PlaywrightSession> {
        if env_truthy("COPYSCAN_RENDER_DISABLE") {
            return Err(Error::NotConfigured(
                "render backend disabled (COPYSCAN_RENDER_DISABLE)".to_string(),
            ));
        }

        let mut cmd = tokio::process::Command::new(&self.node_bin);
        if let Some(node_path) = &self.node_path {
            cmd.env("NODE_PATH", node_path);
        }
        let mut child = cmd
            .arg("-e")
            .arg(JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::NotConfigured(format!(
                    "Playwright sessions require Node.js (`{}`) and the Playwright npm package: {e}",
                    self.node_bin
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Session("missing stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Session("missing stdout pipe".to_string()))?;

        let mut session = PlaywrightSession {
            worker_id,
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            navigation_timeout: opts.navigation_timeout,
            search_settle: opts.search_settle,
            page_settle: opts.page_settle,
            dead: false,
        };

        let cfg = serde_json::json!({
            "user_agent": opts.user_agent,
            "navigation_timeout_ms": opts.navigation_timeout.as_millis() as u64,
        });
        session
            .exchange(&cfg, LAUNCH_TIMEOUT + opts.navigation_timeout)
            .await
            .map_err(|e| match e {
                Error::NotConfigured(m) => Error::NotConfigured(m),
                other => Error::Session(other.to_string()),
            })?;
        tracing::info!(worker_id, "browser session created");
        Ok(session)
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    code: Option<String>,
    message: Option<String>,
    hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    ok: bool,
    error: Option<WireError>,
    results: Option<Vec<Candidate>>,
    text: Option<String>,
}

#[derive(Clone, Copy)]
enum Op {
    Search,
    Goto,
    Text,
}

impl Op {
    fn error(self, message: String) -> Error {
        match self {
            Op::Search => Error::Search(message),
            Op::Goto => Error::Navigate(message),
            Op::Text => Error::Extract(message),
        }
    }
}

pub struct PlaywrightSession {
    worker_id: usize,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    navigation_timeout: Duration,
    search_settle: Duration,
    page_settle: Duration,
    dead: bool,
}

impl PlaywrightSession {
    async fn kill(&mut self) {
        self.dead = true;
        let _ = self.child.kill().await;
    }

    /// Write one request line and wait (bounded) for one response line.
    async fn exchange(&mut self, req: &serde_json::Value, timeout: Duration) -> Result<WireResponse> {
        if self.dead {
            return Err(Error::Session("browser session is closed".to_string()));
        }
        let mut line = req.to_string();
        line.push('\n');
        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            self.kill().await;
            return Err(Error::Session(format!("browser session write failed: {e}")));
        }
        let _ = self.stdin.flush().await;

        let read = match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Ok(r) => r,
            Err(_) => {
                self.kill().await;
                return Err(Error::Session(format!(
                    "browser session hard timeout after {}ms",
                    timeout.as_millis()
                )));
            }
        };
        let raw = match read {
            Ok(Some(l)) => l,
            Ok(None) => {
                self.kill().await;
                return Err(Error::Session("browser session exited".to_string()));
            }
            Err(e) => {
                self.kill().await;
                return Err(Error::Session(format!("browser session read failed: {e}")));
            }
        };
        let resp: WireResponse = serde_json::from_str(raw.trim()).map_err(|e| {
            Error::Session(format!("browser session returned invalid JSON: {e}"))
        })?;
        if resp.ok {
            return Ok(resp);
        }
        let err = resp.error.unwrap_or(WireError {
            code: None,
            message: None,
            hint: None,
        });
        let mut message = err.message.unwrap_or_else(|| "browser request failed".to_string());
        if let Some(hint) = err.hint.filter(|h| !h.trim().is_empty()) {
            message = format!("{message}. {hint}");
        }
        Err(match err.code.as_deref() {
            Some("not_configured") => Error::NotConfigured(message),
            Some("invalid_params") => Error::InvalidUrl(message),
            _ => Error::Session(message),
        })
    }

    async fn request(&mut self, op: Op, req: serde_json::Value, timeout: Duration) -> Result<WireResponse> {
        self.exchange(&req, timeout).await.map_err(|e| match e {
            Error::Session(m) => op.error(m),
            other => other,
        })
    }

    fn op_timeout(&self, settle: Duration) -> Duration {
        self.navigation_timeout + settle + OP_SLACK
    }
}

#[async_trait::async_trait]
impl Session for PlaywrightSession {
    async fn search(&mut self, query: &str) -> Result<Vec<Candidate>> {
        let url = crate::search::duckduckgo_results_url(query)?;
        let req = serde_json::json!({
            "op": "search",
            "url": url,
            "settle_ms": self.search_settle.as_millis() as u64,
        });
        let timeout = self.op_timeout(self.search_settle);
        let resp = self.request(Op::Search, req, timeout).await?;
        let results = resp.results.unwrap_or_default();
        // The page resolves hrefs, but legacy layouts still wrap outbound links.
        Ok(results
            .into_iter()
            .filter_map(|c| {
                crate::search::unwrap_result_href(&c.url).map(|url| Candidate {
                    url,
                    snippet: c.snippet,
                })
            })
            .collect())
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let req = serde_json::json!({
            "op": "goto",
            "url": url,
            "settle_ms": self.page_settle.as_millis() as u64,
        });
        let timeout = self.op_timeout(self.page_settle);
        self.request(Op::Goto, req, timeout).await.map(|_| ())
    }

    async fn page_text(&mut self) -> Result<String> {
        let timeout = self.op_timeout(Duration::ZERO);
        let resp = self
            .request(Op::Text, serde_json::json!({ "op": "text" }), timeout)
            .await?;
        Ok(resp.text.unwrap_or_default())
    }

    async fn release(&mut self) -> Result<()> {
        if self.dead {
            return Ok(());
        }
        let closed = self
            .exchange(&serde_json::json!({ "op": "close" }), OP_SLACK)
            .await;
        self.dead = true;
        match tokio::time::timeout(OP_SLACK, self.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = self.child.kill().await;
            }
        }
        tracing::debug!(worker_id = self.worker_id, ok = closed.is_ok(), "browser session released");
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        !self.dead && matches!(self.child.try_wait(), Ok(None))
    }
}
