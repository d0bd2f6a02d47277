use copyscan_core::{host_of, Candidate};
use std::collections::BTreeSet;

/// http(s) URL whose host does not contain any deny-listed domain.
pub fn is_checkable_url(url: &str, deny_domains: &[String]) -> bool {
    let Ok(u) = url::Url::parse(url.trim()) else {
        return false;
    };
    if !matches!(u.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = host_of(url.trim()) else {
        return false;
    };
    !deny_domains
        .iter()
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .any(|d| host.contains(&d))
}

/// Drop unusable/deny-listed URLs, dedup by URL, keep at most `max` in result order.
pub fn filter_candidates(raw: Vec<Candidate>, deny_domains: &[String], max: usize) -> Vec<Candidate> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for c in raw {
        if out.len() >= max {
            break;
        }
        if !is_checkable_url(&c.url, deny_domains) {
            continue;
        }
        if !seen.insert(c.url.clone()) {
            continue;
        }
        out.push(c);
    }
    out
}
