use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copyscan_core::{CheckConfig, Report, SessionFactory};
use copyscan_local::render_playwright::{node_bin, node_path_for_playwright};
use copyscan_local::{Checker, HttpSessionFactory, PlaywrightSessionFactory};
use std::io::Read;
use std::process::ExitCode;
use std::time::{Duration, Instant};

mod envelope;
mod wire;

#[derive(Parser, Debug)]
#[command(name = "copyscan")]
#[command(about = "Check a document for sentences copied from the web", long_about = None)]
struct Cli {
    /// Log per-sentence progress to stderr (same as COPYSCAN_LOG=info).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a document (--text, --file, or stdin) and print a report.
    Check(CheckCmd),
    /// Diagnose configuration/backend availability (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Headless Chromium through Node.js + Playwright.
    Playwright,
    /// Plain HTTP: search provider + reqwest page loads.
    Http,
}

impl Backend {
    fn as_str(self) -> &'static str {
        match self {
            Self::Playwright => "playwright",
            Self::Http => "http",
        }
    }
}

#[derive(clap::Args, Debug)]
struct CheckCmd {
    /// Read the document from this file.
    #[arg(long, conflicts_with = "text")]
    file: Option<std::path::PathBuf>,
    /// Document text (otherwise --file, otherwise stdin).
    #[arg(long)]
    text: Option<String>,
    #[arg(long, value_enum, env = "COPYSCAN_BACKEND", default_value = "playwright")]
    backend: Backend,
    /// Parallel workers (one browser session each).
    #[arg(long)]
    workers: Option<usize>,
    /// Search results considered per sentence.
    #[arg(long)]
    max_results: Option<usize>,
    /// Pages visited per sentence when no snippet matches.
    #[arg(long)]
    max_pages: Option<usize>,
    /// Minimum sentence length (chars) worth checking.
    #[arg(long)]
    min_length: Option<usize>,
    #[arg(long)]
    nav_timeout_ms: Option<u64>,
    #[arg(long)]
    search_settle_ms: Option<u64>,
    #[arg(long)]
    page_settle_ms: Option<u64>,
    /// Page bodies larger than this are truncated before matching.
    #[arg(long)]
    max_page_bytes: Option<usize>,
    /// Stop after this long and report what was checked.
    #[arg(long)]
    deadline_ms: Option<u64>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

impl CheckCmd {
    fn config(&self) -> CheckConfig {
        let mut cfg = CheckConfig::from_env();
        if let Some(n) = self.workers {
            cfg.worker_count = n;
        }
        if let Some(n) = self.max_results {
            cfg.max_search_results = n;
        }
        if let Some(n) = self.max_pages {
            cfg.max_pages_to_visit = n;
        }
        if let Some(n) = self.min_length {
            cfg.min_sentence_length = n;
        }
        if let Some(ms) = self.nav_timeout_ms {
            cfg.navigation_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.search_settle_ms {
            cfg.search_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = self.page_settle_ms {
            cfg.page_settle = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_page_bytes {
            cfg.max_page_bytes = n;
        }
        if let Some(ms) = self.deadline_ms {
            cfg.deadline = Some(Duration::from_millis(ms));
        }
        cfg
    }

    fn document(&self) -> Result<String> {
        if let Some(t) = &self.text {
            return Ok(t.clone());
        }
        if let Some(p) = &self.file {
            return std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()));
        }
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read document from stdin")?;
        Ok(buf)
    }
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Timeout for each availability check (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = std::env::var("COPYSCAN_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(if verbose { "info" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn check_with<F: SessionFactory>(factory: F, cfg: CheckConfig, document: &str) -> Result<Report> {
    let checker = Checker::new(factory, cfg)?;
    let res = checker.check(document).await;
    checker.shutdown().await;
    Ok(res?)
}

async fn run_check(args: &CheckCmd) -> Result<()> {
    let document = args.document()?;
    let cfg = args.config();
    tracing::debug!(backend = args.backend.as_str(), workers = cfg.worker_count, "check requested");
    let report = match args.backend {
        Backend::Playwright => {
            check_with(PlaywrightSessionFactory::from_env(), cfg, &document).await?
        }
        Backend::Http => check_with(HttpSessionFactory::from_env()?, cfg, &document).await?,
    };
    match args.output.to_ascii_lowercase().as_str() {
        "text" => print!("{}", wire::render_text(&report)),
        _ => println!("{}", serde_json::to_string(&wire::WireReport::from(&report))?),
    }
    Ok(())
}

async fn check_command(cmd: &str, args: &[&str], node_path: Option<&str>, timeout: Duration) -> (bool, String) {
    let mut c = tokio::process::Command::new(cmd);
    c.args(args).kill_on_drop(true).stdin(std::process::Stdio::null());
    if let Some(np) = node_path {
        c.env("NODE_PATH", np);
    }
    match tokio::time::timeout(timeout, c.output()).await {
        Ok(Ok(out)) if out.status.success() => {
            (true, String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(Ok(out)) => (false, String::from_utf8_lossy(&out.stderr).trim().to_string()),
        Ok(Err(e)) => (false, e.to_string()),
        Err(_) => (false, format!("timed out after {}ms", timeout.as_millis())),
    }
}

async fn run_doctor(args: &DoctorCmd) -> Result<()> {
    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = Instant::now();
    let timeout = Duration::from_millis(args.timeout_ms.max(1));
    let cfg = CheckConfig::from_env();
    let config_error = cfg.validate().err().map(|e| e.to_string());

    let node = node_bin();
    let (node_ok, node_msg) = check_command(&node, &["--version"], None, timeout).await;
    let node_path = node_path_for_playwright();
    let (pw_ok, pw_msg) = if node_ok {
        check_command(
            &node,
            &["-e", "console.log(require.resolve('playwright'))"],
            node_path.as_deref(),
            timeout,
        )
        .await
    } else {
        (false, "node unavailable".to_string())
    };

    let checks = vec![
        serde_json::json!({
            "name": "node",
            "ok": node_ok,
            "message": node_msg,
            "hint": if node_ok { "" } else { "Install Node.js or set COPYSCAN_NODE to its path." },
        }),
        serde_json::json!({
            "name": "playwright_module",
            "ok": pw_ok,
            "message": pw_msg,
            "hint": if pw_ok { "" } else { "npm i -g playwright && npx playwright install chromium (or set COPYSCAN_NODE_PATH)." },
        }),
        serde_json::json!({
            "name": "config_valid",
            "ok": config_error.is_none(),
            "message": config_error.clone().unwrap_or_default(),
        }),
    ];

    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": config_error.is_none(),
        "name": "copyscan",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "backend": std::env::var("COPYSCAN_BACKEND").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "playwright".to_string()),
            "search_provider": std::env::var("COPYSCAN_SEARCH_PROVIDER").ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| "duckduckgo".to_string()),
            "searxng": has_env("COPYSCAN_SEARXNG_ENDPOINT") || has_env("COPYSCAN_SEARXNG_ENDPOINTS"),
            "ddg_endpoint_override": has_env("COPYSCAN_DDG_ENDPOINT"),
            "render_disabled": has_env("COPYSCAN_RENDER_DISABLE"),
        },
        "config": {
            "worker_count": cfg.worker_count,
            "max_search_results": cfg.max_search_results,
            "max_pages_to_visit": cfg.max_pages_to_visit,
            "min_sentence_length": cfg.min_sentence_length,
            "navigation_timeout_ms": cfg.navigation_timeout.as_millis() as u64,
            "search_settle_ms": cfg.search_settle.as_millis() as u64,
            "page_settle_ms": cfg.page_settle.as_millis() as u64,
            "max_page_bytes": cfg.max_page_bytes,
            "deadline_ms": cfg.deadline.map(|d| d.as_millis() as u64),
            "deny_domains": cfg.deny_domains,
        },
        "checks": checks,
    });

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("copyscan {}", env!("CARGO_PKG_VERSION"));
            for c in &checks {
                let name = c["name"].as_str().unwrap_or("");
                let ok = c["ok"].as_bool().unwrap_or(false);
                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
            }
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check(args) => run_check(&args).await,
        Commands::Doctor(args) => run_doctor(&args).await,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "copyscan",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("copyscan {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let text_errors = matches!(&cli.command, Commands::Check(c) if c.output.eq_ignore_ascii_case("text"));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if text_errors {
                eprintln!("error: {e:#}");
            } else {
                println!("{}", envelope::error_payload(&e));
            }
            ExitCode::FAILURE
        }
    }
}
