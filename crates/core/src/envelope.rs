//! Parse header-bearing API passthrough output (`gh api -i`) into a
//! `{status, headers, body}` envelope.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub status: u16,
    /// Lowercased header names. Repeated headers keep the last value.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

fn status_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^HTTP/[0-9.]+\s+(\d{3})").unwrap())
}

fn stderr_status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(HTTP (\d{3})\)").unwrap())
}

impl Envelope {
    /// Parse raw stdout. Returns `None` when the output does not start with a
    /// status line (e.g. the command failed before any response was received).
    pub fn parse(raw: &str) -> Option<Envelope> {
        let mut rest = raw.trim_start_matches('\u{feff}');
        let mut parsed: Option<(u16, BTreeMap<String, String>)> = None;

        while let Some(caps) = status_line_re().captures(rest) {
            let status: u16 = caps[1].parse().ok()?;
            let (head, tail) = split_head(rest);
            let mut headers = BTreeMap::new();
            for line in head.lines().skip(1) {
                let line = line.trim_end_matches('\r');
                if let Some((name, value)) = line.split_once(':') {
                    headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                }
            }
            parsed = Some((status, headers));
            rest = tail;
        }

        let (status, headers) = parsed?;
        Some(Envelope { status, headers, body: rest.to_string() })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header("etag").filter(|v| !v.is_empty())
    }

    /// `Retry-After` in seconds (fractional values allowed).
    pub fn retry_after(&self) -> Option<Duration> {
        let raw = self.header("retry-after")?;
        let secs: f64 = raw.trim().parse().ok()?;
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    }

    /// Seconds until the primary rate-limit window resets, when exhausted.
    pub fn rate_limit_reset_in(&self, now_epoch_secs: i64) -> Option<Duration> {
        if self.header("x-ratelimit-remaining")? != "0" {
            return None;
        }
        let reset: i64 = self.header("x-ratelimit-reset")?.parse().ok()?;
        Some(Duration::from_secs(reset.saturating_sub(now_epoch_secs).max(0) as u64))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Split at the first blank line (`\r\n\r\n` or `\n\n`).
fn split_head(text: &str) -> (&str, &str) {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((idx, len)) => (&text[..idx], &text[idx + len..]),
        None => (text, ""),
    }
}

/// Recover an HTTP status from CLI error text such as `gh: Not Found (HTTP 404)`.
pub fn status_from_stderr(stderr: &str) -> Option<u16> {
    stderr_status_re().captures(stderr).and_then(|c| c[1].parse().ok())
}
