//! CLI command handling.
//!
//! Provides subcommands for:
//! - Pairing with a television (`pair`)
//! - Volume control (`volume`, `get-volume`, `volume-up`, `volume-down`)
//! - Key presses (`key`)
//! - Source switching (`hdmi`) and the power toggle (`power-hdmi1`)
//! - ADB transport management (`adb check`, `adb setup`, `adb enable`,
//!   `adb use-for-all`)
//! - The command-queue server (`serve`)
//!
//! Mutating commands are submitted through the command queue when a serve
//! loop is running, so concurrent invocations execute one at a time in
//! order. Without a running server (or with `--no-queue`) they execute
//! directly.

mod adb;

pub use adb::{AdbCommand, run_adb_command};

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use crate::adb::AdbTransport;
use crate::client::DeviceClient;
use crate::config::{DEFAULT_API_PORT, RetryPolicy};
use crate::dispatch::{CommandDispatcher, CommandRequest, CommandVerb, DispatchConfig};
use crate::pairing::Pairing;
use crate::queue::{CommandQueue, CommandSink};
use crate::store::{DeviceEndpoint, Store};

#[derive(Parser, Debug)]
#[command(name = "tvctl")]
#[command(about = "Pair with and remote-control a Philips Android TV over JointSpace")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Bypass the command queue and talk to the TV directly
    #[arg(long, global = true)]
    pub no_queue: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Pair with a TV (shows a PIN on the TV screen)
    Pair {
        /// TV IP address
        ip: String,
        /// JointSpace API port
        #[arg(default_value_t = DEFAULT_API_PORT)]
        port: u16,
    },

    /// Set the absolute volume level
    Volume {
        level: u32,
        /// Override the stored API port for this call
        port: Option<u16>,
    },

    /// Print the current volume and mute state
    GetVolume { port: Option<u16> },

    /// Press VolumeUp one or more times
    VolumeUp {
        #[arg(default_value_t = 1)]
        steps: u32,
        port: Option<u16>,
    },

    /// Press VolumeDown one or more times
    VolumeDown {
        #[arg(default_value_t = 1)]
        steps: u32,
        port: Option<u16>,
    },

    /// Switch to an HDMI input
    Hdmi {
        input: u32,
        port: Option<u16>,
    },

    /// Press a named remote key (VolumeUp, Mute, Standby, Back, Home, ...)
    Key {
        name: String,
        /// Press the key this many times
        #[arg(default_value_t = 1)]
        count: u32,
        port: Option<u16>,
    },

    /// Switch to HDMI1, or send Standby if already there
    PowerHdmi1 { port: Option<u16> },

    /// Manage the ADB side channel
    #[command(subcommand)]
    Adb(AdbCommand),

    /// Run the command-queue server
    Serve,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = Store::open_default();

    match &cli.command {
        Command::Pair { ip, port } => run_pair(&store, ip, *port).await,
        Command::Volume { level, port } => {
            let request = CommandRequest::new(CommandVerb::Volume, vec![level.to_string()]);
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::GetVolume { port } => {
            // Read-only, never queued: the caller wants the answer now.
            let dispatcher = build_dispatcher(&store, *port)?;
            let status = dispatcher.volume().await?;
            println!(
                "volume {} / {}{}",
                status.current,
                status.max,
                if status.muted { " (muted)" } else { "" }
            );
            Ok(())
        }
        Command::VolumeUp { steps, port } => {
            let request = CommandRequest::new(
                CommandVerb::Key,
                vec!["VolumeUp".to_string(), steps.to_string()],
            );
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::VolumeDown { steps, port } => {
            let request = CommandRequest::new(
                CommandVerb::Key,
                vec!["VolumeDown".to_string(), steps.to_string()],
            );
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::Hdmi { input, port } => {
            let request = CommandRequest::new(CommandVerb::Hdmi, vec![input.to_string()]);
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::Key { name, count, port } => {
            let request = CommandRequest::new(
                CommandVerb::Key,
                vec![name.clone(), count.to_string()],
            );
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::PowerHdmi1 { port } => {
            let request = CommandRequest::new(CommandVerb::PowerHdmi1, vec![]);
            dispatch_or_enqueue(&store, &cli, request, *port).await
        }
        Command::Adb(cmd) => run_adb_command(&store, cmd).await,
        Command::Serve => run_serve(store).await,
    }
}

async fn run_pair(store: &Store, ip: &str, port: u16) -> anyhow::Result<()> {
    let endpoint = DeviceEndpoint::new(ip, port);
    let pairing = Pairing::new(store, RetryPolicy::default());
    let credential = pairing
        .pair(endpoint, || {
            print!("Enter the PIN shown on the TV: ");
            use std::io::Write;
            std::io::stdout().flush()?;
            let mut pin = String::new();
            std::io::stdin().lock().read_line(&mut pin)?;
            Ok(pin)
        })
        .await?;
    println!("Paired as device {}.", credential.username);
    Ok(())
}

/// Build a dispatcher from the stored endpoint, credential, and ADB
/// settings. An explicit port overrides the stored one for this call.
fn build_dispatcher(store: &Store, port: Option<u16>) -> anyhow::Result<CommandDispatcher> {
    let mut endpoint = store.load_endpoint()?;
    if let Some(port) = port {
        endpoint.port = port;
    }
    let credential = store.load_credential()?;
    let adb = store.load_adb();

    let config = DispatchConfig {
        aux_enabled: adb.enabled,
        prefer_aux_for_all: adb.use_for_all,
    };
    let client = DeviceClient::new(&endpoint, &credential, RetryPolicy::default())
        .context("failed to build device client")?;
    Ok(CommandDispatcher::new(
        Arc::new(client),
        Arc::new(AdbTransport::new(adb)),
        config,
    ))
}

/// Hand the command to a running serve loop when possible, otherwise
/// execute it directly. Port overrides always execute directly since a
/// queued command would run against the stored endpoint.
async fn dispatch_or_enqueue(
    store: &Store,
    cli: &Cli,
    request: CommandRequest,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if port.is_none() && !cli.no_queue {
        let queue = CommandQueue::new(store.queue_path());
        if queue.enqueue(&request).await? {
            tracing::debug!("command handed to queue server");
            return Ok(());
        }
    }
    let dispatcher = build_dispatcher(store, port)?;
    dispatcher.execute(&request).await
}

/// Queue sink that builds a fresh dispatcher per command, so settings
/// changes (re-pairing, ADB toggles) apply without restarting the server.
struct StoreSink {
    store: Store,
}

#[async_trait]
impl CommandSink for StoreSink {
    async fn execute(&self, request: &CommandRequest) -> anyhow::Result<()> {
        let dispatcher = build_dispatcher(&self.store, None)?;
        dispatcher.execute(request).await
    }
}

async fn run_serve(store: Store) -> anyhow::Result<()> {
    // Fail early with the pairing hint rather than on the first command.
    store.load_endpoint()?;
    store.load_credential()?;

    let queue = CommandQueue::new(store.queue_path());
    let sink = StoreSink { store };
    queue.serve(&sink).await?;
    Ok(())
}
