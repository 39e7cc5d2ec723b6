//! ADB transport management CLI commands.

use clap::Subcommand;

use crate::adb::AdbTransport;
use crate::config::DEFAULT_ADB_PORT;
use crate::store::Store;

/// ADB side-channel configuration.
#[derive(Subcommand, Debug)]
pub enum AdbCommand {
    /// Check whether the adb binary is usable.
    Check,
    /// Configure and enable the ADB transport for a device.
    Setup {
        /// Device IP address (defaults to the paired TV's address).
        ip: Option<String>,
        /// ADB port on the device.
        #[arg(long, default_value_t = DEFAULT_ADB_PORT)]
        port: u16,
    },
    /// Enable or disable the ADB transport.
    Enable {
        /// Pass `false` to disable.
        #[arg(action = clap::ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },
    /// Prefer ADB over the network API for every mappable command.
    UseForAll {
        /// Pass `false` to go back to network-first routing.
        #[arg(action = clap::ArgAction::Set, default_value_t = true)]
        enabled: bool,
    },
}

pub async fn run_adb_command(store: &Store, cmd: &AdbCommand) -> anyhow::Result<()> {
    match cmd {
        AdbCommand::Check => {
            let (ok, detail) = AdbTransport::check_availability().await;
            if ok {
                println!("adb available:\n{detail}");
            } else {
                println!("adb unavailable: {detail}");
            }
        }
        AdbCommand::Setup { ip, port } => {
            let settings = store.update_adb(|adb| {
                if let Some(ip) = ip {
                    adb.host = ip.clone();
                }
                adb.port = *port;
                adb.enabled = true;
            })?;
            println!(
                "ADB transport enabled for {}:{}",
                settings.host, settings.port
            );
        }
        AdbCommand::Enable { enabled } => {
            store.update_adb(|adb| adb.enabled = *enabled)?;
            println!(
                "ADB transport {}.",
                if *enabled { "enabled" } else { "disabled" }
            );
        }
        AdbCommand::UseForAll { enabled } => {
            let settings = store.update_adb(|adb| {
                adb.use_for_all = *enabled;
                if *enabled {
                    adb.enabled = true;
                }
            })?;
            if settings.use_for_all {
                println!("ADB is now the preferred transport for mappable commands.");
            } else {
                println!("Network API is now the preferred transport.");
            }
        }
    }
    Ok(())
}
