//! Best-effort shell transport over the Android Debug Bridge.
//!
//! Every operation here resolves to a boolean instead of an error: the
//! bridge is an optional side channel and the dispatcher treats a `false`
//! as "fall through to the network API". The `adb` binary must be on the
//! PATH; a missing binary is reported the same way as an unreachable
//! device.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::dispatch::AuxControl;
use crate::keymap::KEYCODE_HOME;
use crate::store::AdbSettings;

const ADB_TIMEOUT: Duration = Duration::from_secs(10);
const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Google TV activity that exposes the physical HDMI inputs.
const HDMI_ACTIVITY: &str = "com.google.android.videos/.TvInputActivity";

pub struct AdbTransport {
    settings: AdbSettings,
}

impl AdbTransport {
    pub fn new(settings: AdbSettings) -> Self {
        Self { settings }
    }

    /// Run `adb` with the given arguments, capturing combined output.
    /// Returns success plus whatever the tool printed; a missing binary
    /// or a timeout is a failure with a descriptive message.
    async fn run(args: &[&str], timeout: Duration) -> (bool, String) {
        let child = Command::new("adb")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr);
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(stderr);
                }
                (output.status.success(), text)
            }
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                (false, "adb binary not found in PATH".to_string())
            }
            Ok(Err(err)) => (false, format!("failed to run adb: {err}")),
            Err(_) => (false, format!("adb timed out after {}s", timeout.as_secs())),
        }
    }

    /// Run a shell command on the configured device, connecting first.
    /// The connect step is best-effort; `adb connect` to an already
    /// connected device is a cheap no-op.
    async fn shell(&self, args: &[&str]) -> bool {
        if !self.settings.enabled {
            tracing::debug!("adb transport disabled, skipping");
            return false;
        }
        if self.settings.host.is_empty() {
            tracing::warn!("adb transport enabled but no host configured");
            return false;
        }

        let target = format!("{}:{}", self.settings.host, self.settings.port);
        let (connected, detail) = Self::run(&["connect", &target], ADB_TIMEOUT).await;
        if !connected {
            tracing::debug!(%target, %detail, "adb connect failed");
        }

        let mut full = vec!["-s", target.as_str(), "shell"];
        full.extend_from_slice(args);
        let (ok, output) = Self::run(&full, ADB_TIMEOUT).await;
        if ok {
            tracing::debug!(%target, ?args, "adb shell succeeded");
        } else {
            tracing::debug!(%target, ?args, %output, "adb shell failed");
        }
        ok
    }

    /// Whether the `adb` binary itself is usable, with its version banner
    /// or the failure reason. Does not touch any device.
    pub async fn check_availability() -> (bool, String) {
        Self::run(&["version"], CHECK_TIMEOUT).await
    }
}

#[async_trait]
impl AuxControl for AdbTransport {
    async fn send_keycode(&self, code: u32) -> bool {
        let code = code.to_string();
        self.shell(&["input", "keyevent", &code]).await
    }

    /// Launch the HDMI input activity for the given port. When the launch
    /// fails (activity missing on this firmware), send Home so the screen
    /// lands somewhere sane, then report failure so the caller can fall
    /// back to the network API.
    async fn switch_hdmi_input(&self, input: u32) -> bool {
        let activity = format!("{HDMI_ACTIVITY}#HDMI{input}");
        if self.shell(&["am", "start", "-n", &activity]).await {
            return true;
        }
        tracing::debug!(input, "HDMI activity launch failed, sending Home");
        let home = KEYCODE_HOME.to_string();
        self.shell(&["input", "keyevent", &home]).await;
        false
    }
}
