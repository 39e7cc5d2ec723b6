//! Command routing across the primary and auxiliary transports.
//!
//! Each logical command resolves to an ordered plan of transport attempts
//! with a stop-on-first-success rule, instead of nested fallback branches.
//! The plan is a pure function of the dispatch configuration and whether
//! the action is representable on the auxiliary transport, which keeps the
//! policy testable independent of any transport implementation.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::VolumeStatus;
use crate::error::ClientError;
use crate::keymap;

/// The device's structured network API (JointSpace).
#[async_trait]
pub trait PrimaryControl: Send + Sync {
    async fn send_key(&self, key: &str) -> Result<(), ClientError>;
    async fn set_source(&self, source_id: &str) -> Result<(), ClientError>;
    /// Lowercased current source id, `None` when the firmware does not
    /// expose it or the read fails.
    async fn current_source(&self) -> Option<String>;
    async fn set_volume(&self, level: u32) -> Result<(), ClientError>;
    async fn volume(&self) -> Result<VolumeStatus, ClientError>;
}

/// The best-effort shell transport. Failure is a boolean, never an error:
/// callers treat `false` as "try the other transport".
#[async_trait]
pub trait AuxControl: Send + Sync {
    async fn send_keycode(&self, code: u32) -> bool;
    async fn switch_hdmi_input(&self, input: u32) -> bool;
}

/// Per-device routing configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchConfig {
    /// Whether the auxiliary transport may be used at all.
    pub aux_enabled: bool,
    /// Try the auxiliary transport first for every mappable action.
    pub prefer_aux_for_all: bool,
}

/// One transport attempt within an ordered fallback plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Auxiliary,
    Primary,
}

/// Ordered transports to attempt for one action. `mappable` is whether the
/// action is representable on the auxiliary transport at all.
pub(crate) fn route_plan(config: &DispatchConfig, mappable: bool) -> Vec<Route> {
    let aux = config.aux_enabled && mappable;
    if aux && config.prefer_aux_for_all {
        vec![Route::Auxiliary, Route::Primary]
    } else if aux {
        vec![Route::Primary, Route::Auxiliary]
    } else {
        vec![Route::Primary]
    }
}

/// Verbs accepted over the command queue and by direct dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandVerb {
    /// `args: [key_name, count?]`
    Key,
    /// `args: [level]`
    Volume,
    /// `args: []`, result is logged
    GetVolume,
    /// `args: [input_number]`
    Hdmi,
    /// `args: []`, composite toggle
    PowerHdmi1,
}

/// A single command submission. Created by a caller, consumed by the
/// dispatcher (directly or via the queue), dropped after execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub verb: CommandVerb,
    #[serde(default)]
    pub args: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

impl CommandRequest {
    pub fn new(verb: CommandVerb, args: Vec<String>) -> Self {
        Self {
            verb,
            args,
            submitted_at: Utc::now(),
        }
    }
}

/// Routes logical commands to the right transport(s) and implements the
/// composite operations.
pub struct CommandDispatcher {
    primary: Arc<dyn PrimaryControl>,
    aux: Arc<dyn AuxControl>,
    config: DispatchConfig,
}

impl CommandDispatcher {
    pub fn new(
        primary: Arc<dyn PrimaryControl>,
        aux: Arc<dyn AuxControl>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            primary,
            aux,
            config,
        }
    }

    /// Send one named key press, walking the fallback plan. When every
    /// route fails, the primary transport's error is the one surfaced;
    /// auxiliary failures are expected and only logged.
    pub async fn send_key(&self, key: &str) -> Result<(), ClientError> {
        let keycode = keymap::keycode_for(key);
        let mut primary_err = None;

        for route in route_plan(&self.config, keycode.is_some()) {
            match route {
                Route::Auxiliary => {
                    if let Some(code) = keycode {
                        if self.aux.send_keycode(code).await {
                            tracing::debug!(key, "key sent via auxiliary transport");
                            return Ok(());
                        }
                        tracing::debug!(key, "auxiliary transport failed, trying next route");
                    }
                }
                Route::Primary => match self.primary.send_key(key).await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        tracing::debug!(key, %err, "primary transport failed");
                        primary_err = Some(err);
                    }
                },
            }
        }

        Err(primary_err.unwrap_or_else(|| ClientError::Http("no transport available".to_string())))
    }

    /// Repeated key presses. A non-positive count is a no-op, not an error.
    pub async fn send_key_times(&self, key: &str, count: i64) -> Result<(), ClientError> {
        if count <= 0 {
            tracing::debug!(key, count, "no key presses requested");
            return Ok(());
        }
        for _ in 0..count {
            self.send_key(key).await?;
        }
        Ok(())
    }

    /// Switch the active source, mirroring the key-press fallback policy
    /// with HDMI switching as the auxiliary action.
    pub async fn switch_source(&self, source_id: &str) -> Result<(), ClientError> {
        let hdmi_input = hdmi_input_number(source_id);
        let mut primary_err = None;

        for route in route_plan(&self.config, hdmi_input.is_some()) {
            match route {
                Route::Auxiliary => {
                    if let Some(input) = hdmi_input {
                        if self.aux.switch_hdmi_input(input).await {
                            tracing::debug!(source_id, "source switched via auxiliary transport");
                            return Ok(());
                        }
                        tracing::debug!(source_id, "auxiliary HDMI switch failed, trying next route");
                    }
                }
                Route::Primary => match self.primary.set_source(source_id).await {
                    Ok(()) => return Ok(()),
                    Err(err) => {
                        tracing::debug!(source_id, %err, "primary source switch failed");
                        primary_err = Some(err);
                    }
                },
            }
        }

        Err(primary_err.unwrap_or_else(|| ClientError::Http("no transport available".to_string())))
    }

    /// Switch to the given HDMI input (clamped to at least 1).
    pub async fn switch_to_hdmi(&self, input: u32) -> Result<(), ClientError> {
        let input = input.max(1);
        self.switch_source(&format!("hdmi{input}")).await
    }

    /// Composite: switch to HDMI1 unless already there, in which case send
    /// Standby. Two steps with no lock between them; when serialization
    /// matters, submit through the command queue.
    pub async fn toggle_hdmi1_or_standby(&self) -> Result<(), ClientError> {
        let current = self
            .primary
            .current_source()
            .await
            .unwrap_or_else(|| "unknown".to_string());
        if current.eq_ignore_ascii_case("hdmi1") {
            tracing::debug!("already on hdmi1, sending Standby");
            self.send_key("Standby").await
        } else {
            tracing::debug!(%current, "switching to hdmi1");
            self.switch_to_hdmi(1).await
        }
    }

    /// Set absolute volume (primary transport only).
    pub async fn set_volume(&self, level: u32) -> Result<(), ClientError> {
        self.primary.set_volume(level).await
    }

    /// Read the current audio state (primary transport only).
    pub async fn volume(&self) -> Result<VolumeStatus, ClientError> {
        self.primary.volume().await
    }

    /// Execute one decoded command request.
    pub async fn execute(&self, request: &CommandRequest) -> anyhow::Result<()> {
        match request.verb {
            CommandVerb::Key => {
                let key = request.args.first().context("key command needs a key name")?;
                let count = match request.args.get(1) {
                    Some(raw) => raw.parse().context("key count must be an integer")?,
                    None => 1,
                };
                self.send_key_times(key, count).await?;
            }
            CommandVerb::Volume => {
                let level = request
                    .args
                    .first()
                    .context("volume command needs a level")?
                    .parse()
                    .context("volume level must be an integer")?;
                self.set_volume(level).await?;
            }
            CommandVerb::GetVolume => {
                let status = self.volume().await?;
                tracing::info!(
                    current = status.current,
                    max = status.max,
                    muted = status.muted,
                    "volume status"
                );
            }
            CommandVerb::Hdmi => {
                let input = request
                    .args
                    .first()
                    .context("hdmi command needs an input number")?
                    .parse()
                    .context("hdmi input must be an integer")?;
                self.switch_to_hdmi(input).await?;
            }
            CommandVerb::PowerHdmi1 => {
                self.toggle_hdmi1_or_standby().await?;
            }
        }
        Ok(())
    }
}

/// `hdmi3` → 3. Non-HDMI source ids are not representable on the
/// auxiliary transport.
fn hdmi_input_number(source_id: &str) -> Option<u32> {
    source_id.strip_prefix("hdmi").and_then(|n| n.parse().ok())
}
