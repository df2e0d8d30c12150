// transitive-net/src/http.rs
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};
use transitive_common::config::Config;
use transitive_common::error::{ResolveError, Result};

use crate::validation::validate_url;

const USER_AGENT_STRING: &str = "transitive resolver (Rust)";
const BACKOFF_BASE_MS: u64 = 100;
const BACKOFF_JITTER_MS: u64 = 50;

/// Result of a single repository lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(Vec<u8>),
    /// The repository answered, and it does not have the file.
    Missing,
}

pub fn build_http_client(config: &Config) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_STRING));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(config.connect_timeout)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| ResolveError::Config(format!("Failed to build HTTP client: {e}")))
}

/// GETs `url`, retrying transport failures and unexpected statuses up to
/// `retries` extra times. 404 and 410 are answers, not failures, and are
/// never retried. Every attempt is bounded by `timeout`; `on_attempt` is
/// called once per request actually sent.
pub async fn fetch_with_retry(
    client: &Client,
    url: &str,
    subject: &str,
    timeout: Duration,
    retries: u32,
    on_attempt: impl Fn(),
) -> Result<FetchOutcome> {
    validate_url(url)?;

    let mut last_error = None;
    for attempt in 0..=retries {
        if attempt > 0 {
            let jitter = rand::rng().random_range(0..=BACKOFF_JITTER_MS);
            let delay = BACKOFF_BASE_MS * (1 << (attempt - 1).min(6)) + jitter;
            debug!("Retrying {} in {}ms (attempt {})", url, delay, attempt + 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        on_attempt();
        match tokio::time::timeout(timeout, fetch_once(client, url)).await {
            Ok(Ok(outcome)) => return Ok(outcome),
            Ok(Err(message)) => {
                warn!("Fetch attempt {} failed for {}: {}", attempt + 1, url, message);
                last_error = Some(message);
            }
            Err(_) => {
                warn!(
                    "Fetch attempt {} for {} timed out after {:?}",
                    attempt + 1,
                    url,
                    timeout
                );
                last_error = Some(format!("timed out after {timeout:?}"));
            }
        }
    }

    Err(ResolveError::network(
        subject,
        format!(
            "{url}: {}",
            last_error.unwrap_or_else(|| "all attempts failed".to_string())
        ),
    ))
}

async fn fetch_once(client: &Client, url: &str) -> std::result::Result<FetchOutcome, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("HTTP request failed: {e}"))?;
    let status = response.status();
    debug!("Received HTTP status: {} for {}", status, url);

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Ok(FetchOutcome::Missing),
        s if s.is_success() => {
            let content = response
                .bytes()
                .await
                .map_err(|e| format!("Failed to read response body bytes: {e}"))?;
            Ok(FetchOutcome::Found(content.to_vec()))
        }
        s => Err(format!("HTTP error {s}")),
    }
}
