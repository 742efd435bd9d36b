//! Pure Rust async remote admin console for Squad servers, speaking the
//! [Source RCON protocol](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol).
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod packet;
pub mod players;
pub mod query;
pub mod server;

pub use client::Client;
pub use error::{ErrorKind, RconError};
