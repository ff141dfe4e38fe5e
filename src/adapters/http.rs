//! Shared per-request hygiene for every plain-HTTP adapter: one client per
//! provider, a counting semaphore capping in-flight requests, a global
//! per-request timeout and a bounded retry on transient transport errors.
//! 4xx responses are never retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::AdapterError;
use crate::stats::Stats;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

pub struct HttpFetcher {
    client: Client,
    semaphore: Arc<Semaphore>,
    provider: &'static str,
    stats: Arc<Stats>,
}

impl HttpFetcher {
    pub fn new(
        provider: &'static str,
        timeout: Duration,
        max_in_flight: usize,
        stats: Arc<Stats>,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .unwrap_or_default();
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(max_in_flight.max(1))),
            provider,
            stats,
        }
    }

    /// GET a JSON document. Transient transport failures (connect errors,
    /// timeouts, 5xx) are retried with growing backoff; client errors are
    /// returned immediately.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<Value, AdapterError> {
        // Closed only at shutdown, when failing the request is fine.
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AdapterError::parse("request semaphore closed"))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            Stats::bump(&self.stats.requests_total);
            match self.try_get(url, query).await {
                Ok(body) => return self.decode(url, body),
                Err(err) if attempt < RETRY_ATTEMPTS && is_transient(&err) => {
                    Stats::bump(&self.stats.request_errors);
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    debug!(
                        provider = self.provider,
                        url,
                        attempt,
                        "transient fetch error ({}), retrying in {:?}",
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    Stats::bump(&self.stats.request_errors);
                    return Err(err);
                }
            }
        }
    }

    async fn try_get(&self, url: &str, query: &[(&str, String)]) -> Result<String, AdapterError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() {
                return Err(AdapterError::Status(status));
            }
            let body = response.text().await.unwrap_or_default();
            warn!(provider = self.provider, url, %status, "upstream rejected request: {}", sample(&body));
            return Err(AdapterError::Status(status));
        }
        Ok(response.text().await?)
    }

    fn decode(&self, url: &str, body: String) -> Result<Value, AdapterError> {
        serde_json::from_str(&body).map_err(|e| {
            warn!(
                provider = self.provider,
                url,
                "undecodable body ({}): {}",
                e,
                sample(&body)
            );
            AdapterError::parse(format!("{}: {}", url, e))
        })
    }
}

fn is_transient(err: &AdapterError) -> bool {
    match err {
        AdapterError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        AdapterError::Status(status) => status.is_server_error(),
        _ => false,
    }
}

/// First bytes of a body for log lines; upstream bodies can be megabytes.
fn sample(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transience() {
        assert!(is_transient(&AdapterError::Status(
            reqwest::StatusCode::BAD_GATEWAY
        )));
        assert!(!is_transient(&AdapterError::Status(
            reqwest::StatusCode::FORBIDDEN
        )));
        assert!(!is_transient(&AdapterError::parse("bad json")));
    }

    #[test]
    fn sample_respects_char_boundaries() {
        let body = "š".repeat(300);
        assert_eq!(sample(&body).chars().count(), 200);
        assert_eq!(sample("short"), "short");
    }
}
