//! Remote retrieval: bounded retry with exponential backoff, spooled to a local temp file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use ureq::ResponseExt;
use ureq::http::Uri;

use crate::error::{PipelineError, PipelineResult};

use super::locator::{SourceLocator, SourcePolicy};

/// Retry and timeout settings for remote fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    /// Upper bound on a single delay.
    pub max_backoff: Duration,
    /// Whole-request timeout for one attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Outcome of one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Worth retrying: 429, 5xx, timeouts, connection and mid-stream I/O failures.
    Transient(String),
    /// Retrying cannot help: other 4xx, unknown hosts, TLS, bad urls, disallowed redirects.
    Permanent(String),
}

/// Run `op` until it succeeds, fails permanently, or `policy.max_attempts` is spent.
///
/// `op` receives the 1-based attempt number. The returned error names the attempt count.
pub fn retry_with_backoff<T>(
    policy: &RetryPolicy,
    what: &str,
    mut op: impl FnMut(u32) -> Result<T, AttemptError>,
) -> Result<T, String> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(v) => return Ok(v),
            Err(AttemptError::Permanent(msg)) => {
                return Err(format!("{what} failed permanently on attempt {attempt}: {msg}"));
            }
            Err(AttemptError::Transient(msg)) if attempt >= attempts => {
                return Err(format!("{what} failed after {attempt} attempt(s): {msg}"));
            }
            Err(AttemptError::Transient(msg)) => {
                let delay = policy.backoff_for(attempt);
                warn!(attempt, ?delay, error = %msg, "{what} failed, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

/// Download `url` into a fresh temp file, retrying transient failures.
///
/// The locator must already have passed the allow-list check. Redirects are followed, but the
/// host the request lands on must pass `sources` too. The returned file is deleted when dropped.
pub fn fetch_to_spool(
    url: &str,
    suffix: &str,
    retry: &RetryPolicy,
    sources: &SourcePolicy,
) -> PipelineResult<NamedTempFile> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(retry.timeout))
        .https_only(true)
        .build()
        .into();

    retry_with_backoff(retry, "download", |attempt| {
        debug!(url, attempt, "fetching remote source");
        let response = agent.get(url).call().map_err(classify)?;
        check_landing(sources, response.get_uri())?;

        let spool = tempfile::Builder::new()
            .prefix("tabular-certify-")
            .suffix(suffix)
            .tempfile()
            .map_err(|e| AttemptError::Permanent(format!("cannot create spool file: {e}")))?;
        let file: &File = spool.as_file();
        let mut writer = BufWriter::new(file);
        let mut body = response.into_body().into_reader();
        let bytes = io::copy(&mut body, &mut writer)
            .and_then(|n| writer.flush().map(|()| n))
            .map_err(|e| AttemptError::Transient(format!("interrupted transfer: {e}")))?;
        drop(writer);
        debug!(url, bytes, "remote source spooled");
        Ok(spool)
    })
    .map_err(|message| PipelineError::source_read(url, message))
}

/// Re-check the final url of a (possibly redirected) request against the allow-list.
fn check_landing(sources: &SourcePolicy, landed: &Uri) -> Result<(), AttemptError> {
    let landed = landed.to_string();
    SourceLocator::parse(&landed)
        .and_then(|locator| sources.check(&locator))
        .map_err(|e| AttemptError::Permanent(format!("redirected outside the allow-list: {e}")))
}

fn classify(err: ureq::Error) -> AttemptError {
    match err {
        ureq::Error::StatusCode(code) if code == 429 || (500..600).contains(&code) => {
            AttemptError::Transient(format!("http status {code}"))
        }
        ureq::Error::StatusCode(code) => AttemptError::Permanent(format!("http status {code}")),
        e @ (ureq::Error::Io(_) | ureq::Error::Timeout(_) | ureq::Error::ConnectionFailed) => {
            AttemptError::Transient(e.to_string())
        }
        other => AttemptError::Permanent(other.to_string()),
    }
}
