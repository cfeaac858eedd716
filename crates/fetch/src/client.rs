//! The cached client: replay first, record once, retry transient failures.

use std::collections::BTreeMap;
use std::str::FromStr;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, info, warn};

use crate::cassette::{Cassette, CassetteStore};
use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::retry::{backoff_delay, is_idempotent, RetryPolicy};

/// A replayed or freshly recorded response.
///
/// Always materialized from the cassette representation, so a recording run
/// observes exactly the same (redacted) bytes a replay run will.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    fn from_cassette(cassette: &Cassette) -> Result<Self, FetchError> {
        Ok(Self {
            status: cassette.status,
            headers: cassette.headers.clone(),
            body: cassette.body_bytes()?,
        })
    }

    pub fn text(&self) -> Result<String, FetchError> {
        String::from_utf8(self.body.clone())
            .map_err(|e| FetchError::Transport(format!("non-utf8 body: {e}")))
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP client with a content-addressed cassette cache in front of it.
pub struct CachedHttpClient {
    config: FetchConfig,
    store: CassetteStore,
    client: reqwest::Client,
}

impl CachedHttpClient {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let store = CassetteStore::new(&config.cache_dir);
        Ok(Self {
            config,
            store,
            client,
        })
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<FetchResponse, FetchError> {
        self.request("GET", url, headers, b"").await
    }

    /// POST is permitted for query-style endpoints (SPARQL) but is never
    /// retried; only idempotent methods enter the backoff loop.
    pub async fn post(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<FetchResponse, FetchError> {
        self.request("POST", url, headers, body).await
    }

    pub async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<FetchResponse, FetchError> {
        let upper = method.to_ascii_uppercase();
        if !matches!(upper.as_str(), "GET" | "HEAD" | "OPTIONS" | "POST") {
            return Err(FetchError::NotReplayable(upper));
        }

        let key = CassetteStore::key(&upper, url, headers, body);
        if let Some(cassette) = self.store.load(&key)? {
            debug!(key = %key, url, "cassette_replay");
            return FetchResponse::from_cassette(&cassette);
        }
        if !self.config.allow_record {
            return Err(FetchError::Offline(key));
        }

        let cassette = self.record(&upper, url, headers, body).await?;
        self.store.store(&key, &cassette)?;
        info!(key = %key, url, status = cassette.status, "cassette_recorded");
        FetchResponse::from_cassette(&cassette)
    }

    async fn record(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<Cassette, FetchError> {
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: self.config.base_delay,
            max_delay: self.config.max_delay,
            jitter: true,
        };
        let retryable = is_idempotent(method);
        let mut last_err: Option<FetchError> = None;

        for attempt in 0..=policy.max_retries {
            match self.send_once(method, url, headers, body).await {
                Ok(cassette) => return Ok(cassette),
                Err(err) => {
                    let transient = err.is_transient();
                    if !retryable || !transient || attempt == policy.max_retries {
                        return Err(err);
                    }
                    let delay = backoff_delay(&policy, attempt);
                    warn!(url, attempt, delay_ms = delay.as_millis() as u64, error = %err, "fetch_retry");
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(FetchError::Timeout(policy.max_retries)))
    }

    async fn send_once(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &[u8],
    ) -> Result<Cassette, FetchError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_str(name)
                .map_err(|e| FetchError::Transport(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Transport(format!("header value: {e}")))?;
            header_map.insert(name, value);
        }

        let request = self
            .client
            .request(
                reqwest::Method::from_bytes(method.as_bytes())
                    .map_err(|e| FetchError::Transport(e.to_string()))?,
                url,
            )
            .headers(header_map)
            .body(body.to_vec());

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(1)
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let response_headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if status >= 400 {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(Cassette::from_parts(status, &response_headers, &bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(dir: &std::path::Path, allow_record: bool) -> CachedHttpClient {
        CachedHttpClient::new(FetchConfig::new(dir).with_recording(allow_record)).unwrap()
    }

    #[tokio::test]
    async fn offline_miss_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let c = client(dir.path(), false);
        let err = c
            .get("https://api.example.test/v1/things", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Offline(_)));
    }

    #[tokio::test]
    async fn seeded_cassette_replays_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://api.example.test/v1/things";
        let headers = BTreeMap::new();
        let key = CassetteStore::key("GET", url, &headers, b"");
        let store = CassetteStore::new(dir.path());
        store
            .store(
                &key,
                &Cassette::from_parts(200, &BTreeMap::new(), br#"{"ok":true}"#),
            )
            .unwrap();

        let c = client(dir.path(), false);
        let response = c.get(url, &headers).await.unwrap();
        assert_eq!(response.status, 200);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn unsupported_method_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let c = client(dir.path(), true);
        let err = c
            .request("DELETE", "https://api.example.test/v1/x", &BTreeMap::new(), b"")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotReplayable(_)));
    }

    #[test]
    fn transient_classification() {
        assert!(FetchError::Transport("reset".into()).is_transient());
        assert!(FetchError::Status {
            status: 503,
            url: "u".into()
        }
        .is_transient());
        assert!(!FetchError::Status {
            status: 404,
            url: "u".into()
        }
        .is_transient());
        assert!(!FetchError::Offline("k".into()).is_transient());
    }
}
