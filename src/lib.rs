//! # craft-protocol
//!
//! Client-side core of a versioned block-game network protocol.
//!
//! The crate turns a TCP byte stream into typed events:
//!
//! - [`core`]: wire primitives, NBT and the frame codec
//! - [`protocol`]: Login → Configuration ⇄ Play state machine, chat signing, registries
//! - [`terrain`]: paletted chunk sections and light
//! - [`transport`]: the connection with its reader and consumer tasks
//!
//! ## Quick Start
//! ```no_run
//! use craft_protocol::config::ClientConfig;
//! use craft_protocol::protocol::NoopHandler;
//! use craft_protocol::transport::{ConnectOptions, Connection};
//! use std::sync::Arc;
//!
//! # async fn run() -> craft_protocol::error::Result<()> {
//! let config = ClientConfig::from_file("client.toml")?;
//! craft_protocol::utils::logging::init_logging(&config.logging)?;
//!
//! let mut connection = Connection::connect(&config, Arc::new(NoopHandler), ConnectOptions::default()).await?;
//! connection.send_chat("hello").await?;
//! connection.wait().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod terrain;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
