//! Retrying REST client for the Xeggex HTTP API.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::warn;

use crate::constants::{API_CALL_TIMEOUT, API_MAX_RETRIES, REST_URL};
use crate::errors::{MarketDataError, Result};

/// Outcome of one HTTP attempt, before the retry decision.
struct Attempt {
    status: Option<u16>,
    payload: Value,
    failed: bool,
}

/// REST client with bounded randomized-backoff retry.
///
/// A shared `reqwest::Client` can be injected so concurrent callers reuse
/// one connection pool; without one, each call builds a private client that
/// is dropped on every exit path when the call completes.
#[derive(Clone, Debug)]
pub struct RestClient {
    base_url: String,
    shared: Option<Client>,
    max_retries: u32,
}

impl Default for RestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RestClient {
    pub fn new() -> Self {
        Self {
            base_url: REST_URL.to_string(),
            shared: None,
            max_retries: API_MAX_RETRIES,
        }
    }

    /// Client reusing a caller-supplied connection pool.
    pub fn with_client(client: Client) -> Self {
        Self {
            shared: Some(client),
            ..Self::new()
        }
    }

    /// Point the client at a different base URL (tests, mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Issue `method` against `endpoint`, retrying transient failures with
    /// super-exponential backoff and failing with [`MarketDataError::Api`]
    /// once the budget is exhausted.
    ///
    /// A non-2xx response whose body carries an `error` key is an
    /// application-level error from the exchange, not a transport failure:
    /// the parsed body is returned to the caller as-is.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<&[(&str, String)]>,
    ) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut try_count: u32 = 0;
        loop {
            let attempt = self.attempt(&method, &url, params).await;
            if !attempt.failed {
                return Ok(attempt.payload);
            }
            if try_count >= self.max_retries {
                return Err(MarketDataError::Api {
                    status: attempt.status,
                    payload: attempt.payload,
                });
            }
            try_count += 1;
            let pause = retry_sleep_time(try_count);
            warn!(
                url = %url,
                status = ?attempt.status,
                try_count,
                "REST call failed, retrying in {:.0}s",
                pause.as_secs_f64()
            );
            tokio::time::sleep(pause).await;
        }
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        params: Option<&[(&str, String)]>,
    ) -> Attempt {
        let private;
        let http = match &self.shared {
            Some(client) => client,
            None => {
                private = Client::new();
                &private
            }
        };

        let mut request = http
            .request(method.clone(), url)
            .header("Content-Type", "application/json")
            .timeout(API_CALL_TIMEOUT);
        if let Some(params) = params {
            request = request.query(params);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return Attempt {
                    status: err.status().map(|s| s.as_u16()),
                    payload: Value::String(err.to_string()),
                    failed: true,
                }
            }
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => classify(status, &body),
            Err(err) => Attempt {
                status: Some(status),
                payload: Value::String(err.to_string()),
                failed: true,
            },
        }
    }
}

/// Classify one HTTP response. Failure means: the body does not parse as
/// JSON, or the status is outside {200, 201} with no `error` key in the
/// parsed body.
fn classify(status: u16, body: &str) -> Attempt {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => {
            let failed = !matches!(status, 200 | 201) && parsed.get("error").is_none();
            Attempt {
                status: Some(status),
                payload: parsed,
                failed,
            }
        }
        Err(_) => Attempt {
            status: Some(status),
            payload: Value::String(truncate(body)),
            failed: true,
        },
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() > 100 {
        let head: String = body.chars().take(100).collect();
        format!("{head} ... (truncated)")
    } else {
        body.to_string()
    }
}

/// Sleep before retry number `try_count`: `2 + jitter * (1 + n^n)` seconds
/// with jitter drawn uniformly from [1.01, 1.10]. Repeated hard failures
/// back off to minutes within the retry budget.
pub(crate) fn retry_sleep_time(try_count: u32) -> Duration {
    let jitter = 1.0 + rand::thread_rng().gen_range(1..=10) as f64 / 100.0;
    let growth = (try_count as f64).powi(try_count as i32);
    Duration::from_secs_f64(2.0 + jitter * (1.0 + growth))
}
