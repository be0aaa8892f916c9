//! Parsing of the free-text analysis payload.
//!
//! The service is prompted to answer in a fixed layout:
//!
//! ```text
//! 87%
//!
//! Short summary of the verdict.
//!
//! Sources:
//! 1. https://first.example/article
//! 2. ...
//! ```
//!
//! Models drift from that layout, so parsing is lenient. The first integer
//! directly followed by `%` is the percentage. The summary is everything
//! between that line and a bare `Sources:` label line. URLs are collected
//! from the label onward. Fewer than five sources is accepted as a degraded
//! result.

use factcheck_protocol::{CheckResult, MAX_SOURCES};
use once_cell::sync::Lazy;
use regex::Regex;

static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s*%").expect("valid percent regex"));
static SOURCES_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\s#*_>]*sources?[*_]*\s*:?[*_]*\s*$").expect("valid marker regex"));
static SUMMARY_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s#*_]*summary[*_]*\s*:[*_]*\s*").expect("valid summary label regex")
});
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'`\[\]{}|\\^]+"#).expect("valid url regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"', '*', '_'];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("response was empty")]
    Empty,

    #[error("no percentage found in response")]
    MissingPercentage,

    #[error("no summary found after the percentage")]
    MissingSummary,
}

pub fn parse_response(raw: &str) -> Result<CheckResult, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ParseError::Empty);
    }

    let lines: Vec<&str> = raw.lines().collect();
    let (percent_line, percentage) = lines
        .iter()
        .enumerate()
        .find_map(|(index, line)| {
            PERCENT_RE
                .captures(line)
                .and_then(|caps| caps.get(1))
                .map(|digits| (index, parse_percentage(digits.as_str())))
        })
        .ok_or(ParseError::MissingPercentage)?;

    let rest = &lines[percent_line + 1..];
    let marker = rest.iter().position(|line| SOURCES_MARKER_RE.is_match(line));
    let (summary_lines, source_lines): (Vec<&str>, &[&str]) = match marker {
        Some(index) => (rest[..index].to_vec(), &rest[index..]),
        None => (
            rest.iter()
                .copied()
                .filter(|line| !URL_RE.is_match(line))
                .collect(),
            rest,
        ),
    };

    let summary = build_summary(&summary_lines);
    if summary.is_empty() {
        return Err(ParseError::MissingSummary);
    }

    let sources = collect_sources(source_lines);
    if sources.len() < MAX_SOURCES {
        tracing::debug!(found = sources.len(), "Fewer sources than requested");
    }

    Ok(CheckResult::new(percentage, summary, sources))
}

fn parse_percentage(digits: &str) -> u64 {
    // Anything too long for u64 is far above 100 and clamps anyway.
    digits.parse::<u64>().unwrap_or(u64::MAX)
}

fn build_summary(lines: &[&str]) -> String {
    let mut kept: Vec<&str> = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect();

    if let Some(first) = kept.first_mut() {
        let line: &str = *first;
        if let Some(label) = SUMMARY_LABEL_RE.find(line) {
            *first = line[label.end()..].trim();
        }
    }
    kept.retain(|line| !line.is_empty());
    kept.join("\n")
}

/// Strips trailing punctuation and closing parentheses that the URL did not
/// open, as in `[title](https://host/page)` or `(see https://host/page)`.
fn trim_url(found: &str) -> &str {
    let mut url = found;
    loop {
        let trimmed = url.trim_end_matches(TRAILING_PUNCTUATION);
        let unbalanced = trimmed.ends_with(')')
            && trimmed.matches(')').count() > trimmed.matches('(').count();
        let next = if unbalanced {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if next.len() == url.len() {
            return url;
        }
        url = next;
    }
}

fn collect_sources(lines: &[&str]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for line in lines {
        for found in URL_RE.find_iter(line) {
            let url = trim_url(found.as_str());
            let has_host = url
                .split_once("://")
                .map(|(_, rest)| !rest.is_empty())
                .unwrap_or(false);
            if !has_host || sources.iter().any(|existing| existing == url) {
                continue;
            }
            sources.push(url.to_string());
            if sources.len() == MAX_SOURCES {
                return sources;
            }
        }
    }
    sources
}
