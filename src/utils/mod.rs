//! # Utility Modules
//!
//! Supporting utilities for compression, cryptography, logging, and timing.
//!
//! ## Components
//! - **Compression**: zlib frame bodies with exact-size inflation
//! - **Crypto**: AES-128/CFB8 stream ciphers, RSA, server hash, signature checks
//! - **Logging**: `tracing-subscriber` initialisation from [`crate::config::LoggingConfig`]
//! - **Metrics**: per-connection atomic counters
//! - **Time**: epoch timestamps for chat signing and key expiry

pub mod compression;
pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod time;

pub use metrics::{Metrics, MetricsSnapshot};
