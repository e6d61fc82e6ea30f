//! Heuristic detection of script-injection probes.
//!
//! Looks for script-like tokens (`javascript`, `onerror`, `document.` and
//! similar) in the raw query string, `User-Agent` and `Referer`. This is a
//! coarse filter for noisy scanners, not an XSS defence; it is off unless
//! `BLOCK_SUSPICIOUS_REQUESTS=true`.

use regex::Regex;

const SUSPICIOUS_PATTERN: &str =
    r"(?i)(script|javascript|vbscript|onload|onerror|eval|alert|confirm|prompt|document\.|window\.)";

/// Which part of the request matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspiciousSource {
    QueryString,
    UserAgent,
    Referer,
}

impl SuspiciousSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspiciousSource::QueryString => "query_string",
            SuspiciousSource::UserAgent => "user_agent",
            SuspiciousSource::Referer => "referer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuspiciousRequestDetector {
    pattern: Regex,
}

impl SuspiciousRequestDetector {
    /// Compile the detector.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error (the pattern is fixed, so this only
    /// fails if the regex engine rejects it).
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(SUSPICIOUS_PATTERN)?,
        })
    }

    /// First request component containing a suspicious token, if any.
    ///
    /// Components are checked in the order query string, `User-Agent`,
    /// `Referer`.
    pub fn inspect(
        &self,
        query: Option<&str>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Option<SuspiciousSource> {
        let hit = |value: Option<&str>| value.is_some_and(|v| self.pattern.is_match(v));

        if hit(query) {
            Some(SuspiciousSource::QueryString)
        } else if hit(user_agent) {
            Some(SuspiciousSource::UserAgent)
        } else if hit(referer) {
            Some(SuspiciousSource::Referer)
        } else {
            None
        }
    }
}
