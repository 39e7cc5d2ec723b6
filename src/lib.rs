//! Pair with and remote-control Philips Android TVs over the JointSpace
//! v6 API, with an ADB side channel for commands the network API handles
//! poorly on some firmwares.
//!
//! The building blocks:
//! - [`pairing`]: the two-step PIN handshake that mints a Digest credential
//! - [`client`]: the authenticated HTTPS client with bounded retry
//! - [`adb`]: the best-effort shell transport
//! - [`dispatch`]: routing between the two transports with fallback
//! - [`queue`]: serialized command delivery over a named FIFO
//! - [`store`]: persisted endpoint, credential, and ADB settings

pub mod adb;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keymap;
pub mod pairing;
pub mod queue;
pub mod store;

pub use error::{ClientError, Error, PairingError, QueueError, StoreError};
