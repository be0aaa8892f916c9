//! Best-effort page titles for source links.
//!
//! Each lookup is bounded by a timeout and yields `None` on any failure;
//! callers show the raw URL instead. Lookups for one result run in parallel
//! so a slow host never holds up the other entries.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

const USER_AGENT: &str = concat!("factcheck/", env!("CARGO_PKG_VERSION"));
const MAX_TITLE_BODY_BYTES: u64 = 256 * 1024;
const MAX_TITLE_CHARS: usize = 120;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").expect("valid title regex"));

pub trait TitleResolver {
    /// One entry per URL, in the same order.
    fn resolve_titles(&self, urls: &[String]) -> Vec<Option<String>>;
}

pub struct TitleFetcher {
    agent: ureq::Agent,
    cache: Mutex<HashMap<String, Option<String>>>,
}

impl TitleFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn fetch_title(&self, url: &str) -> Option<String> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return None;
        }

        let response = match self.agent.get(url).header("User-Agent", USER_AGENT).call() {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url, error = %err, "Title fetch failed");
                return None;
            }
        };

        let mut body = Vec::new();
        let mut reader = response.into_body().into_reader().take(MAX_TITLE_BODY_BYTES);
        if let Err(err) = reader.read_to_end(&mut body) {
            tracing::debug!(url, error = %err, "Title body read failed");
            return None;
        }
        extract_title(&String::from_utf8_lossy(&body))
    }

    fn cached(&self, url: &str) -> Option<Option<String>> {
        self.cache.lock().ok()?.get(url).cloned()
    }
}

impl TitleResolver for TitleFetcher {
    fn resolve_titles(&self, urls: &[String]) -> Vec<Option<String>> {
        thread::scope(|scope| {
            let handles: Vec<_> = urls
                .iter()
                .map(|url| match self.cached(url) {
                    Some(title) => Err(title),
                    None => Ok(scope.spawn(move || self.fetch_title(url))),
                })
                .collect();

            urls.iter()
                .zip(handles)
                .map(|(url, handle)| match handle {
                    Err(cached) => cached,
                    Ok(handle) => {
                        let title = handle.join().ok().flatten();
                        if let Ok(mut cache) = self.cache.lock() {
                            cache.insert(url.clone(), title.clone());
                        }
                        title
                    }
                })
                .collect()
        })
    }
}

/// Pulls the `<title>` text out of an HTML document, decoding the common
/// entities and collapsing whitespace.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ");
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }

    if collapsed.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS - 3).collect();
        return Some(format!("{}...", truncated.trim_end()));
    }
    Some(collapsed)
}
