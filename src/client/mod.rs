//! Authenticated JSON client for the TV's network API.
//!
//! One instance performs calls against a single endpoint with one set of
//! Digest credentials. Callers construct a fresh client per operation from
//! the store, so a re-pairing between commands is always picked up.

use async_trait::async_trait;
use diqwest::WithDigestAuth;
use diqwest::error::Error as DigestError;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::RetryPolicy;
use crate::dispatch::PrimaryControl;
use crate::error::ClientError;
use crate::store::{DeviceCredential, DeviceEndpoint};

/// Current audio state as reported by `audio/volume`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VolumeStatus {
    pub current: u32,
    pub max: u32,
    pub muted: bool,
}

/// JSON-over-HTTPS client for one device endpoint.
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    retry: RetryPolicy,
}

/// Outcome classification for a single attempt.
enum CallFailure {
    /// Connection-level: worth retrying within the bounded policy.
    Transient(String),
    /// Anything the retry loop must not swallow.
    Terminal(ClientError),
}

impl DeviceClient {
    /// Client for a paired device, authenticating with its stored credential.
    pub fn new(
        endpoint: &DeviceEndpoint,
        credential: &DeviceCredential,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        Self::with_base_url(
            endpoint.base_url(),
            Some((credential.username.clone(), credential.password.clone())),
            retry,
        )
    }

    /// Unauthenticated client, used only for the pairing request step.
    pub fn unauthenticated(
        endpoint: &DeviceEndpoint,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        Self::with_base_url(endpoint.base_url(), None, retry)
    }

    /// Client with explicit credentials not yet persisted, used for the
    /// pairing grant step.
    pub fn with_credentials(
        endpoint: &DeviceEndpoint,
        username: String,
        password: String,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        Self::with_base_url(endpoint.base_url(), Some((username, password)), retry)
    }

    /// Client against an explicit base URL. This is the seam the simulated
    /// device tests use; production constructors always build an HTTPS URL.
    pub fn with_base_url(
        base_url: impl Into<String>,
        credentials: Option<(String, String)>,
        retry: RetryPolicy,
    ) -> Result<Self, ClientError> {
        // The TV presents a self-signed certificate with no meaningful
        // hostname, so chain and hostname validation are disabled. This is
        // a closed local-network protocol, not a general web client.
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(retry.timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            credentials,
            retry,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Perform one API call and parse the response body as JSON
    /// (`Value::Null` for an empty body).
    ///
    /// Connection-level failures are retried up to the policy's bound with a
    /// fixed delay. A non-success HTTP status fails immediately with
    /// `ClientError::Remote`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        payload: Option<&Value>,
    ) -> Result<Value, ClientError> {
        let url = self.url(path);
        let attempts = self.retry.retries + 1;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            tracing::debug!(%url, %method, attempt, attempts, "TV API request");
            let mut request = self.http.request(method.clone(), &url);
            if let Some(body) = payload {
                request = request.json(body);
            }

            let outcome = match &self.credentials {
                Some((username, password)) => request
                    .send_with_digest_auth(username, password)
                    .await
                    .map_err(classify_digest),
                None => request.send().await.map_err(classify_reqwest),
            };

            match outcome {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    if !status.is_success() {
                        return Err(ClientError::Remote {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    tracing::debug!(%url, "TV API ok");
                    if body.trim().is_empty() {
                        return Ok(Value::Null);
                    }
                    return serde_json::from_str(&body)
                        .map_err(|e| ClientError::Http(format!("invalid JSON from TV: {e}")));
                }
                Err(CallFailure::Transient(reason)) => {
                    last_reason = reason;
                    if attempt < attempts {
                        tracing::debug!(reason = %last_reason, "retrying after connection failure");
                        tokio::time::sleep(self.retry.retry_delay).await;
                    }
                }
                Err(CallFailure::Terminal(err)) => return Err(err),
            }
        }

        Err(ClientError::Transport {
            url,
            attempts,
            reason: last_reason,
        })
    }

    /// Set absolute volume and unmute.
    pub async fn set_volume(&self, level: u32) -> Result<(), ClientError> {
        let payload = json!({ "current": level, "muted": false });
        self.call(Method::PUT, "audio/volume", Some(&payload))
            .await
            .map(|_| ())
    }

    /// Read the current audio state.
    pub async fn volume(&self) -> Result<VolumeStatus, ClientError> {
        let value = self.call(Method::GET, "audio/volume", None).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::Http(format!("unexpected volume payload: {e}")))
    }

    /// Send a named virtual remote key.
    pub async fn send_key(&self, key: &str) -> Result<(), ClientError> {
        let payload = json!({ "key": key });
        self.call(Method::POST, "input/key", Some(&payload))
            .await
            .map(|_| ())
    }

    /// Switch the active source. Some firmware has no `sources/current`
    /// endpoint and answers 404; those models take the identical payload on
    /// `activities/launch`. Any other failure propagates unchanged.
    pub async fn set_source(&self, source_id: &str) -> Result<(), ClientError> {
        let payload = json!({ "id": source_id });
        match self
            .call(Method::PUT, "sources/current", Some(&payload))
            .await
        {
            Ok(_) => Ok(()),
            Err(ClientError::Remote { status: 404, .. }) => {
                tracing::debug!(source_id, "sources/current missing, using activities/launch");
                self.call(Method::POST, "activities/launch", Some(&payload))
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Current source id (e.g. `hdmi1`), lowercased. Not all firmware
    /// exposes this endpoint; absence or failure reads as `None` rather
    /// than an error.
    pub async fn current_source(&self) -> Option<String> {
        match self.call(Method::GET, "sources/current", None).await {
            Ok(Value::Object(map)) => map
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_lowercase()),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(%err, "could not read current source");
                None
            }
        }
    }
}

fn classify_reqwest(err: reqwest::Error) -> CallFailure {
    if err.is_connect() || err.is_timeout() {
        CallFailure::Transient(err.to_string())
    } else {
        CallFailure::Terminal(ClientError::Http(err.to_string()))
    }
}

fn classify_digest(err: DigestError) -> CallFailure {
    match err {
        DigestError::Reqwest(err) => classify_reqwest(err),
        other => CallFailure::Terminal(ClientError::Http(other.to_string())),
    }
}

#[async_trait]
impl PrimaryControl for DeviceClient {
    async fn send_key(&self, key: &str) -> Result<(), ClientError> {
        DeviceClient::send_key(self, key).await
    }

    async fn set_source(&self, source_id: &str) -> Result<(), ClientError> {
        DeviceClient::set_source(self, source_id).await
    }

    async fn current_source(&self) -> Option<String> {
        DeviceClient::current_source(self).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), ClientError> {
        DeviceClient::set_volume(self, level).await
    }

    async fn volume(&self) -> Result<VolumeStatus, ClientError> {
        DeviceClient::volume(self).await
    }
}
