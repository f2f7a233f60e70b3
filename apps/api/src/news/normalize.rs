//! Canonical URL form used as the first dedup key and for citation merging.

use url::{form_urlencoded, Url};

const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
    "ref",
    "ref_src",
    "cmpid",
    "ocid",
    "taid",
    "guccounter",
];

const HOST_PREFIXES: &[&str] = &["www.", "m.", "amp."];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Normalizes an article URL so that syndicated, mobile, AMP and tracked
/// variants of the same page compare equal. Returns `None` for anything that
/// is not an absolute http(s) URL with a host.
pub fn normalize_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let mut host = url.host_str()?.to_ascii_lowercase();
    for prefix in HOST_PREFIXES {
        if let Some(stripped) = host.strip_prefix(prefix) {
            if !stripped.is_empty() {
                host = stripped.to_string();
            }
            break;
        }
    }

    // Default ports are already dropped by the parser; 443 is default once
    // the scheme is forced to https.
    let port = match url.port() {
        Some(443) | None => String::new(),
        Some(p) => format!(":{p}"),
    };

    let mut path = url.path().to_string();
    loop {
        if let Some(stripped) = path.strip_suffix("/amp") {
            path = stripped.to_string();
        } else if let Some(stripped) = path.strip_suffix('/') {
            path = stripped.to_string();
        } else {
            break;
        }
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("?{encoded}")
    };

    Some(format!("https://{host}{port}{path}{query}"))
}
