//! The two-step pairing handshake.
//!
//! Pairing registers this tool as a trusted device on the television:
//! `pair/request` obtains a short-lived authentication key and puts a PIN on
//! the TV screen, `pair/grant` confirms it with an HMAC-SHA1 signature over
//! the request timestamp and the PIN. The resulting device-id/key pair is
//! the Digest credential for every authenticated call afterwards.

use std::io;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::rngs::OsRng;
use serde_json::{Value, json};
use sha1::Sha1;

use crate::config::RetryPolicy;
use crate::error::{ClientError, PairingError};
use crate::client::DeviceClient;
use crate::store::{DeviceCredential, DeviceEndpoint, Store};

type HmacSha1 = Hmac<Sha1>;

/// Vendor-published signing secret shared by all JointSpace v6 devices,
/// base64-encoded. Decoded it is the HMAC key for the grant signature.
const SECRET_KEY_B64: &str =
    "ZmVay1EQVFOaZhwQ4Kv81ypLAZNczV9sG4KkseXWn1NEk6cXmPKO/MCa9sryslvLCFMnNe4Z4CPXzToowvhHvA==";

const DEVICE_ID_LEN: usize = 16;
const DEVICE_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Grant signature: base64 of the lowercase-hex HMAC-SHA1 digest of
/// `timestamp ∥ pin`. The hex string itself is what gets base64-encoded,
/// not the raw digest bytes.
pub fn auth_signature(timestamp: &str, pin: &str) -> String {
    let key = BASE64
        .decode(SECRET_KEY_B64)
        .expect("signing secret is valid base64");
    let mut mac = HmacSha1::new_from_slice(&key).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(pin.as_bytes());
    let digest_hex = hex::encode(mac.finalize().into_bytes());
    BASE64.encode(digest_hex.as_bytes())
}

/// Fresh 16-character alphanumeric device id. Generated once per pairing
/// and persisted as the Digest username.
pub fn random_device_id() -> String {
    let mut rng = OsRng;
    (0..DEVICE_ID_LEN)
        .map(|_| DEVICE_ID_CHARSET[rng.gen_range(0..DEVICE_ID_CHARSET.len())] as char)
        .collect()
}

/// The device descriptor sent in both handshake steps.
fn device_descriptor(device_id: &str) -> Value {
    json!({
        "device_name": "tvctl",
        "device_os": "Linux",
        "app_name": "tvctl",
        "app_id": "tvctl.jointspace",
        "type": "native",
        "id": device_id,
    })
}

/// Some firmwares return the grant timestamp as a number, others as a
/// string. Keep the raw value for echoing back and stringify only for
/// the signature.
fn timestamp_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// State carried from `pair/request` to `pair/grant` while the user reads
/// the PIN off the screen.
#[derive(Debug, Clone)]
pub struct PendingPairing {
    pub device_id: String,
    timestamp: Value,
    auth_key: String,
    endpoint: DeviceEndpoint,
}

/// Runs the handshake and persists the resulting credential.
pub struct Pairing<'a> {
    store: &'a Store,
    retry: RetryPolicy,
    base_url: Option<String>,
}

impl<'a> Pairing<'a> {
    pub fn new(store: &'a Store, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            base_url: None,
        }
    }

    /// Handshake against an explicit base URL. This is the seam the
    /// simulated device tests use; production callers derive the URL from
    /// the endpoint.
    pub fn with_base_url(
        store: &'a Store,
        retry: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            retry,
            base_url: Some(base_url.into()),
        }
    }

    fn client(
        &self,
        endpoint: &DeviceEndpoint,
        credentials: Option<(String, String)>,
    ) -> Result<DeviceClient, ClientError> {
        if let Some(url) = &self.base_url {
            return DeviceClient::with_base_url(url.clone(), credentials, self.retry);
        }
        match credentials {
            Some((username, password)) => {
                DeviceClient::with_credentials(endpoint, username, password, self.retry)
            }
            None => DeviceClient::unauthenticated(endpoint, self.retry),
        }
    }

    /// Step one: ask the TV to start pairing. On success the TV shows a
    /// PIN on screen and hands back a timestamp plus the auth key that
    /// will become the Digest password.
    pub async fn request(&self, endpoint: DeviceEndpoint) -> Result<PendingPairing, PairingError> {
        let device_id = random_device_id();
        let body = json!({
            "scope": ["read", "write", "control"],
            "device": device_descriptor(&device_id),
        });

        tracing::info!(host = %endpoint.host, "requesting pairing, watch the TV for a PIN");
        let client = self
            .client(&endpoint, None)
            .map_err(PairingError::Protocol)?;
        let response = client
            .call(reqwest::Method::POST, "pair/request", Some(&body))
            .await
            .map_err(PairingError::Protocol)?;

        let auth_key = response
            .get("auth_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PairingError::Protocol(ClientError::Http(
                    "pairing response carried no auth_key".to_string(),
                ))
            })?
            .to_string();
        let timestamp = response.get("timestamp").cloned().unwrap_or(Value::Null);

        Ok(PendingPairing {
            device_id,
            timestamp,
            auth_key,
            endpoint,
        })
    }

    /// Step two: confirm the PIN. The grant call itself authenticates with
    /// the provisional credential from step one; on success that credential
    /// becomes permanent and is written to the store.
    pub async fn grant(
        &self,
        pending: PendingPairing,
        pin: &str,
    ) -> Result<DeviceCredential, PairingError> {
        let signature = auth_signature(&timestamp_string(&pending.timestamp), pin);
        let body = json!({
            "auth": {
                "pin": pin,
                "auth_timestamp": pending.timestamp,
                "auth_signature": signature,
                "auth_AppId": 1,
            },
            "device": device_descriptor(&pending.device_id),
        });

        let client = self
            .client(
                &pending.endpoint,
                Some((pending.device_id.clone(), pending.auth_key.clone())),
            )
            .map_err(PairingError::Protocol)?;
        client
            .call(reqwest::Method::POST, "pair/grant", Some(&body))
            .await
            .map_err(|err| match err {
                ClientError::Remote { status, body } => PairingError::Rejected { status, body },
                other => PairingError::Protocol(other),
            })?;

        let credential = DeviceCredential {
            username: pending.device_id,
            password: pending.auth_key,
            paired_at: Utc::now(),
        };
        self.store.save_pairing(&pending.endpoint, &credential)?;
        tracing::info!(host = %pending.endpoint.host, "pairing complete, credential stored");
        Ok(credential)
    }

    /// Full handshake: request, obtain the PIN from the caller, grant.
    pub async fn pair(
        &self,
        endpoint: DeviceEndpoint,
        read_pin: impl FnOnce() -> io::Result<String>,
    ) -> Result<DeviceCredential, PairingError> {
        let pending = self.request(endpoint).await?;
        let pin = read_pin()?;
        self.grant(pending, pin.trim()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vectors computed independently from the published secret.
    #[test]
    fn signature_matches_known_vector() {
        assert_eq!(
            auth_signature("1234567890", "5678"),
            "MDY1MWQ5ZDNlMDA1NGYzNzFjNjI5ZDFmYTJlNGI2OTM5MzJjYTliMw=="
        );
    }

    #[test]
    fn signature_matches_second_vector() {
        assert_eq!(
            auth_signature("42", "0000"),
            "NWU4MjZlMzI2NDY3NmY2YTMxZjNlZmNmOTAwYzNiMTY1ODQwOGJlOQ=="
        );
    }

    #[test]
    fn signature_encodes_the_hex_digest_not_raw_bytes() {
        let decoded = BASE64.decode(auth_signature("1", "2")).unwrap();
        // SHA-1 digest is 20 bytes, so its hex form is 40 ASCII chars.
        assert_eq!(decoded.len(), 40);
        assert!(
            decoded
                .iter()
                .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        );
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(auth_signature("100", "1234"), auth_signature("100", "1234"));
        assert_ne!(auth_signature("100", "1234"), auth_signature("100", "1235"));
    }

    #[test]
    fn device_ids_are_sixteen_alphanumeric_chars() {
        let id = random_device_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        // Two draws colliding would mean the generator is broken.
        assert_ne!(id, random_device_id());
    }

    #[test]
    fn timestamp_string_keeps_strings_and_stringifies_numbers() {
        assert_eq!(timestamp_string(&Value::String("99".into())), "99");
        assert_eq!(timestamp_string(&json!(99)), "99");
    }

    #[test]
    fn descriptor_carries_the_device_id() {
        let descriptor = device_descriptor("abc123");
        assert_eq!(descriptor["id"], "abc123");
        assert_eq!(descriptor["type"], "native");
    }
}
