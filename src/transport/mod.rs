//! # Transport Layer
//!
//! The TCP connection and the dispatch loop that feeds it into the protocol.
//!
//! Framing, compression and encryption are handled by
//! [`FrameCodec`](crate::core::frame::FrameCodec); this layer owns the socket
//! halves and the tasks around them.

pub mod connection;

pub use connection::{ConnectOptions, Connection};
