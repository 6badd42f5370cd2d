/*
 * uri.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Histofeed, a keep-alive HTTPS feed fetcher.
 *
 * Histofeed is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Histofeed is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Histofeed.  If not, see <http://www.gnu.org/licenses/>.
 */

//! URL splitting and paginated feed queries.
//!
//! Feed listings are paged with `start-index` and `max-results`. Values outside the ranges
//! the API accepts are clamped (and logged) rather than rejected.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use tracing::info;

/// Query component safe set: encode separators so keys and values stay intact.
const QUERY_COMPONENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?');

pub const DEFAULT_START_INDEX: u32 = 1;
pub const MAX_START_INDEX: u32 = 1_000_000;
pub const DEFAULT_MAX_RESULTS: u32 = 26;
pub const MAX_MAX_RESULTS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("unsupported scheme in '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("no host in '{0}'")]
    MissingHost(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
}

/// An http(s) URL split into what a `Request` needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    pub tls: bool,
    pub host: String,
    pub port: u16,
    /// Path and query, always starting with '/'.
    pub path: String,
}

/// Split `https://host[:port]/path?query`. The port defaults to 443 for https, 80 for http.
pub fn parse_url(url: &str) -> Result<ParsedUrl, UrlError> {
    let (tls, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(UrlError::UnsupportedScheme(url.to_string()));
    };
    let (authority, path) = match rest.find(|c: char| c == '/' || c == '?') {
        Some(i) if rest.as_bytes()[i] == b'?' => (&rest[..i], format!("/{}", &rest[i..])),
        Some(i) => (&rest[..i], rest[i..].to_string()),
        None => (rest, "/".to_string()),
    };
    // Drop any userinfo; credentials travel as a bearer token.
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| UrlError::InvalidPort(port.to_string()))?;
            (host, port)
        }
        None => (authority, if tls { 443 } else { 80 }),
    };
    if host.is_empty() {
        return Err(UrlError::MissingHost(url.to_string()));
    }
    Ok(ParsedUrl {
        tls,
        host: host.to_string(),
        port,
        path,
    })
}

/// Leading integer of `raw`, 0 when there is none.
fn leading_int(raw: &str) -> i64 {
    let raw = raw.trim_start();
    let (neg, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let n = digits[..end].parse::<i64>().unwrap_or(if end == 0 { 0 } else { i64::MAX });
    if neg {
        -n
    } else {
        n
    }
}

fn clamp_logged(name: &str, raw: &str, value: i64, min: u32, max: u32) -> u32 {
    let clamped = value.clamp(i64::from(min), i64::from(max));
    if clamped != value {
        info!("limiting {} '{}' -> {} -> {}", name, raw, value, clamped);
    }
    clamped as u32
}

/// Pagination and extra parameters for a feed listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    start_index: u32,
    max_results: u32,
    extra: Vec<(String, String)>,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            start_index: DEFAULT_START_INDEX,
            max_results: DEFAULT_MAX_RESULTS,
            extra: Vec::new(),
        }
    }
}

impl FeedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pagination from a raw query string such as `start-index=27&max-results=10`.
    /// Unknown keys are kept as extra parameters; non-numeric values count as 0.
    pub fn from_query_str(query: &str) -> Self {
        let mut q = Self::new();
        for pair in query.trim_start_matches('?').split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode_str(key).decode_utf8_lossy();
            let value = percent_decode_str(value).decode_utf8_lossy();
            match &*key {
                "start-index" => q.start_index = clamp_logged("start-index", &value, leading_int(&value), 1, MAX_START_INDEX),
                "max-results" => q.max_results = clamp_logged("max-results", &value, leading_int(&value), 1, MAX_MAX_RESULTS),
                _ => q.extra.push((key.into_owned(), value.into_owned())),
            }
        }
        q
    }

    pub fn start_index(mut self, n: i64) -> Self {
        self.start_index = clamp_logged("start-index", &n.to_string(), n, 1, MAX_START_INDEX);
        self
    }

    pub fn max_results(mut self, n: i64) -> Self {
        self.max_results = clamp_logged("max-results", &n.to_string(), n, 1, MAX_MAX_RESULTS);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn get_start_index(&self) -> u32 {
        self.start_index
    }

    pub fn get_max_results(&self) -> u32 {
        self.max_results
    }

    /// Query for the page after this one.
    pub fn next_page(&self) -> Self {
        let mut next = self.clone();
        next.start_index = self
            .start_index
            .saturating_add(self.max_results)
            .min(MAX_START_INDEX);
        next
    }

    /// `base` with the extra parameters, start-index and max-results appended.
    pub fn to_path(&self, base: &str) -> String {
        let mut path = base.to_string();
        let mut sep = if base.contains('?') { '&' } else { '?' };
        for (k, v) in &self.extra {
            path.push(sep);
            path.push_str(&utf8_percent_encode(k, QUERY_COMPONENT).to_string());
            path.push('=');
            path.push_str(&utf8_percent_encode(v, QUERY_COMPONENT).to_string());
            sep = '&';
        }
        path.push(sep);
        path.push_str(&format!(
            "start-index={}&max-results={}",
            self.start_index, self.max_results
        ));
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn https_default_port() {
        let u = parse_url("https://api.example.com/feeds/x?v=2").unwrap();
        assert!(u.tls);
        assert_eq!(u.host, "api.example.com");
        assert_eq!(u.port, 443);
        assert_eq!(u.path, "/feeds/x?v=2");
    }

    #[test]
    fn explicit_port_and_bare_host() {
        let u = parse_url("http://localhost:8080").unwrap();
        assert!(!u.tls);
        assert_eq!(u.port, 8080);
        assert_eq!(u.path, "/");
        let u = parse_url("http://h?a=1").unwrap();
        assert_eq!(u.path, "/?a=1");
    }

    #[test]
    fn bad_urls() {
        assert!(matches!(parse_url("ftp://h/"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(parse_url("https:///x"), Err(UrlError::MissingHost(_))));
        assert!(matches!(parse_url("https://h:99999/"), Err(UrlError::InvalidPort(_))));
    }

    #[test]
    fn defaults() {
        assert_eq!(
            FeedQuery::new().to_path("/feeds/api/users/default/watch_history?v=2"),
            "/feeds/api/users/default/watch_history?v=2&start-index=1&max-results=26"
        );
    }

    #[test]
    #[traced_test]
    fn values_are_clamped() {
        let q = FeedQuery::from_query_str("start-index=0&max-results=500");
        assert_eq!(q.get_start_index(), 1);
        assert_eq!(q.get_max_results(), 50);
        assert!(logs_contain("limiting max-results"));
        let q = FeedQuery::new().start_index(2_000_000).max_results(-3);
        assert_eq!(q.get_start_index(), MAX_START_INDEX);
        assert_eq!(q.get_max_results(), 1);
    }

    #[test]
    fn non_numeric_counts_as_zero() {
        let q = FeedQuery::from_query_str("?start-index=abc&max-results=12x");
        assert_eq!(q.get_start_index(), 1);
        assert_eq!(q.get_max_results(), 12);
    }

    #[test]
    fn extras_are_encoded() {
        let path = FeedQuery::new()
            .param("q", "cats & dogs")
            .max_results(10)
            .to_path("/feeds");
        assert_eq!(path, "/feeds?q=cats%20%26%20dogs&start-index=1&max-results=10");
    }

    #[test]
    fn next_page_advances() {
        let q = FeedQuery::new().start_index(27).max_results(26).next_page();
        assert_eq!(q.get_start_index(), 53);
    }
}
