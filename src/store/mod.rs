//! Persisted pairing settings and device credential.
//!
//! Two JSON records under a configurable base directory:
//! `tv_settings.json` (endpoint + ADB flags) and `tv_auth.json` (the
//! credential issued by pairing). The store is the sole writer of both;
//! every other component re-reads per operation so pairing and settings
//! edits between calls are always picked up.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{self, DEFAULT_ADB_PORT, DEFAULT_API_PORT};
use crate::error::StoreError;

pub const SETTINGS_FILE: &str = "tv_settings.json";
pub const AUTH_FILE: &str = "tv_auth.json";
pub const QUEUE_FILE: &str = "tvctl.queue";

/// Target of the TV's primary network API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    pub host: String,
    pub port: u16,
}

impl DeviceEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Base URL of the JointSpace v6 API on this endpoint.
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/6", self.host, self.port)
    }
}

/// Credential issued by a successful pairing.
///
/// Valid only for the endpoint it was issued against; pairing to another
/// TV replaces both records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredential {
    /// Device identifier generated at pair time; Digest username.
    pub username: String,
    /// Authorization key returned by the TV; Digest password.
    pub password: String,
    #[serde(rename = "pairedAt")]
    pub paired_at: DateTime<Utc>,
}

/// ADB auxiliary transport settings. Independent of the credential: the
/// transport needs only network reachability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdbSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Prefer ADB over the network API for every mappable operation.
    pub use_for_all: bool,
}

impl Default for AdbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: DEFAULT_ADB_PORT,
            use_for_all: false,
        }
    }
}

/// On-disk layout of the settings record: the endpoint and the ADB flags
/// flattened into one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsRecord {
    #[serde(default)]
    ip: String,
    #[serde(default = "default_api_port")]
    port: u16,
    #[serde(default)]
    adb_enabled: bool,
    #[serde(default)]
    adb_host: String,
    #[serde(default = "default_adb_port")]
    adb_port: u16,
    #[serde(default)]
    adb_use_for_all: bool,
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_adb_port() -> u16 {
    DEFAULT_ADB_PORT
}

/// File-backed store for endpoint, credential, and auxiliary settings.
#[derive(Debug, Clone)]
pub struct Store {
    base: PathBuf,
}

impl Store {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Store rooted at the configured base directory (env override, else
    /// the executable's own directory).
    pub fn open_default() -> Self {
        Self::new(config::base_dir())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn settings_path(&self) -> PathBuf {
        self.base.join(SETTINGS_FILE)
    }

    fn auth_path(&self) -> PathBuf {
        self.base.join(AUTH_FILE)
    }

    /// Path of the command queue FIFO for this store's device.
    pub fn queue_path(&self) -> PathBuf {
        self.base.join(QUEUE_FILE)
    }

    fn read_settings(&self) -> Result<Option<SettingsRecord>, StoreError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write_settings(&self, record: &SettingsRecord) -> Result<(), StoreError> {
        fs::create_dir_all(&self.base)?;
        let raw = serde_json::to_string_pretty(record)?;
        fs::write(self.settings_path(), raw)?;
        Ok(())
    }

    /// Endpoint of the paired TV. `NotConfigured` until a pairing succeeded.
    pub fn load_endpoint(&self) -> Result<DeviceEndpoint, StoreError> {
        let record = self.read_settings()?.ok_or(StoreError::NotConfigured)?;
        if record.ip.is_empty() {
            return Err(StoreError::NotConfigured);
        }
        Ok(DeviceEndpoint::new(record.ip, record.port))
    }

    /// Credential issued by the last successful pairing.
    pub fn load_credential(&self) -> Result<DeviceCredential, StoreError> {
        let path = self.auth_path();
        if !path.exists() {
            return Err(StoreError::NotPaired);
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the outcome of a successful pairing, replacing any prior
    /// endpoint and credential. ADB settings in the record are preserved.
    pub fn save_pairing(
        &self,
        endpoint: &DeviceEndpoint,
        credential: &DeviceCredential,
    ) -> Result<(), StoreError> {
        let mut record = self.read_settings()?.unwrap_or_default();
        record.ip = endpoint.host.clone();
        record.port = endpoint.port;
        self.write_settings(&record)?;

        fs::create_dir_all(&self.base)?;
        let raw = serde_json::to_string_pretty(credential)?;
        fs::write(self.auth_path(), raw)?;
        Ok(())
    }

    /// Auxiliary transport settings. A missing or incomplete record yields
    /// the disabled defaults; an unset ADB host falls back to the TV's IP.
    pub fn load_adb(&self) -> AdbSettings {
        let record = match self.read_settings() {
            Ok(Some(record)) => record,
            Ok(None) => return AdbSettings::default(),
            Err(err) => {
                tracing::warn!(%err, "unreadable settings record, treating ADB as disabled");
                return AdbSettings::default();
            }
        };
        let host = if record.adb_host.is_empty() {
            record.ip.clone()
        } else {
            record.adb_host.clone()
        };
        AdbSettings {
            enabled: record.adb_enabled,
            host,
            port: record.adb_port,
            use_for_all: record.adb_use_for_all,
        }
    }

    /// Load-modify-save of the ADB settings, preserving the endpoint fields.
    pub fn update_adb(
        &self,
        apply: impl FnOnce(&mut AdbSettings),
    ) -> Result<AdbSettings, StoreError> {
        let mut record = self.read_settings()?.unwrap_or_default();
        let mut adb = AdbSettings {
            enabled: record.adb_enabled,
            host: record.adb_host.clone(),
            port: record.adb_port,
            use_for_all: record.adb_use_for_all,
        };
        apply(&mut adb);
        record.adb_enabled = adb.enabled;
        record.adb_host = adb.host.clone();
        record.adb_port = adb.port;
        record.adb_use_for_all = adb.use_for_all;
        self.write_settings(&record)?;
        Ok(adb)
    }
}
