use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;

const DOC: &str =
    "The sky is blue. It rained all day yesterday in the city. Cats are small mammals that purr.";

fn result_item(href: &str, snippet: &str) -> String {
    format!(
        r#"<div class="result"><a class="result__a" href="{href}">title</a><div class="result__snippet">{snippet}</div></div>"#
    )
}

async fn ddg(
    State(addr): State<SocketAddr>,
    Query(q): Query<HashMap<String, String>>,
) -> axum::response::Html<String> {
    let query = q.get("q").cloned().unwrap_or_default();
    let mut items = String::new();
    if query.contains("rained") {
        items.push_str(&result_item(
            "https://www.pinterest.com/pin/1",
            "It rained all day yesterday in the city.",
        ));
        items.push_str(&result_item(
            &format!("http://{addr}/weather"),
            "It rained all day yesterday in the city.",
        ));
    } else if query.contains("Cats") {
        items.push_str(&result_item(&format!("http://{addr}/broken"), "pets"));
        items.push_str(&result_item(&format!("http://{addr}/pets"), "All about pets"));
    }
    axum::response::Html(format!("<html><body>{items}</body></html>"))
}

async fn pets() -> axum::response::Html<&'static str> {
    axum::response::Html(
        "<html><body><h1>Pets</h1><p>Everyone knows that cats are small mammals that purr loudly.</p></body></html>",
    )
}

async fn broken() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

#[tokio::test(flavor = "multi_thread")]
async fn check_http_backend_end_to_end() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/html/", get(ddg))
        .route("/pets", get(pets))
        .route("/broken", get(broken))
        .with_state(addr);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let out = tokio::task::spawn_blocking(move || {
        let bin = assert_cmd::cargo::cargo_bin!("copyscan");
        std::process::Command::new(bin)
            .args([
                "check",
                "--backend",
                "http",
                "--workers",
                "2",
                "--deadline-ms",
                "20000",
                "--text",
                DOC,
            ])
            .env("COPYSCAN_SEARCH_PROVIDER", "duckduckgo")
            .env("COPYSCAN_DDG_ENDPOINT", format!("http://{addr}/html/"))
            .env_remove("HTTP_PROXY")
            .env_remove("HTTPS_PROXY")
            .env_remove("ALL_PROXY")
            .env_remove("http_proxy")
            .env_remove("https_proxy")
            .env_remove("all_proxy")
            .output()
            .expect("run copyscan check")
    })
    .await
    .unwrap();

    assert!(
        out.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("report json");
    assert_eq!(v["sentences_checked"].as_u64(), Some(3));
    assert_eq!(v["parallel_workers"].as_u64(), Some(2));
    assert_eq!(v["incomplete"].as_u64(), Some(0));

    let highlights = v["highlights"].as_array().expect("highlights");
    assert_eq!(highlights.len(), 2);

    // Snippet match; the deny-listed host never shows up as a source.
    let rain = &highlights[0];
    let (s, e) = (
        rain["start"].as_u64().unwrap() as usize,
        rain["end"].as_u64().unwrap() as usize,
    );
    assert_eq!(&DOC[s..e], "It rained all day yesterday in the city.");
    assert_eq!(
        rain["sources"],
        serde_json::json!([format!("http://{addr}/weather")])
    );

    // Page-visit match after the first candidate failed to load.
    let cats = &highlights[1];
    assert_eq!(cats["text"].as_str(), Some("Cats are small mammals that purr."));
    assert_eq!(
        cats["sources"],
        serde_json::json!([format!("http://{addr}/pets")])
    );

    let score = v["plagiarism_score"].as_f64().unwrap();
    assert!((score - 2.0 / 3.0).abs() < 1e-9);
}
