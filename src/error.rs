//! Error types for tvctl.

use std::path::PathBuf;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Persisted settings / credential store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Not paired. Run `tvctl pair <ip>` first")]
    NotPaired,

    #[error("TV settings not found. Pair first")]
    NotConfigured,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid record: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Device network API client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection-level failure that survived the bounded retry.
    #[error("Request to {url} failed after {attempts} attempt(s): {reason}")]
    Transport {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Non-success HTTP status from the TV. Never retried: the TV answered,
    /// so repeating the same request will not change the outcome.
    #[error("TV returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// Request construction or Digest negotiation failure.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl ClientError {
    /// HTTP status carried by this error, if it is a `Remote` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pairing handshake errors.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// The request step failed: endpoint unreachable or non-success status.
    #[error("Pair request failed: {0}")]
    Protocol(#[source] ClientError),

    /// The TV refused the grant step (wrong PIN, expired session).
    /// Prior credentials, if any, are left untouched.
    #[error("TV rejected pairing (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to read PIN: {0}")]
    PinInput(#[from] std::io::Error),

    #[error("Failed to persist credential: {0}")]
    Persist(#[from] StoreError),
}

/// Command queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Something that is not a FIFO occupies the queue path.
    #[error("Queue path {path} exists but is not a FIFO")]
    Occupied { path: PathBuf },

    #[error("Failed to create queue FIFO at {path}: {reason}")]
    Create { path: PathBuf, reason: String },

    #[error("Queue IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode queued command: {0}")]
    Encode(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_carries_status_and_body() {
        let err = ClientError::Remote {
            status: 404,
            body: "Not Found".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("Not Found"));
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = ClientError::Transport {
            url: "https://tv:1926/6/audio/volume".to_string(),
            attempts: 3,
            reason: "connection refused".to_string(),
        };
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn pairing_rejected_display() {
        let err = PairingError::Rejected {
            status: 401,
            body: "invalid pin".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("invalid pin"));
    }

    #[test]
    fn top_level_from_conversions() {
        let err: Error = StoreError::NotPaired.into();
        assert!(matches!(err, Error::Store(StoreError::NotPaired)));

        let err: Error = QueueError::Occupied {
            path: PathBuf::from("/tmp/x"),
        }
        .into();
        assert!(matches!(err, Error::Queue(_)));
    }
}
