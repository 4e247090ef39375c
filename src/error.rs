//! # Error Types
//!
//! Error handling for the client protocol core.
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! is [`ProtocolError`]. Variants fall into a handful of categories that the
//! dispatch loop treats differently.
//!
//! ## Error Categories
//! - **Transport Errors**: socket failures, closed streams, corrupt compressed frames
//! - **Decode Errors**: truncated buffers, unknown discriminators, out-of-range palette indices
//! - **Protocol Errors**: oversized VarInts, unmapped packet types, unsupported versions
//! - **Session Errors**: login rejection, session service failures
//! - **Cryptographic Errors**: cipher setup and RSA failures
//!
//! Transport errors are converted into a "connection lost" report by the
//! dispatch loop. Everything else surfacing from a packet interpreter is wrapped
//! in [`ProtocolError::PacketFailed`] with packet context and ends the connection.
//!
//! ## Example Usage
//! ```rust
//! use craft_protocol::core::codec::PacketReader;
//! use craft_protocol::error::{ProtocolError, Result};
//!
//! fn read_header(bytes: &[u8]) -> Result<i32> {
//!     let mut reader = PacketReader::new(bytes);
//!     reader.read_varint()
//! }
//!
//! match read_header(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]) {
//!     Err(ProtocolError::VarIntTooLarge) => {}
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Cryptographic errors
    pub const ERR_CIPHER_INIT: &str = "Failed to initialise AES/CFB8 cipher";
    pub const ERR_SHARED_SECRET: &str = "Failed to generate shared secret";
    pub const ERR_RSA_PUBLIC_KEY: &str = "Invalid RSA public key";

    /// Session errors
    pub const ERR_SESSION_FAILED: &str = "Failed to authenticate with the session server";
    pub const ERR_SESSION_NO_SERVICE: &str = "Server requires authentication but no session service is configured";

    /// Timing errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";

    /// Chat errors
    pub const ERR_NO_SIGNER: &str = "Signed chat requested without a message signer";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("VarInt is too big")]
    VarIntTooLarge,

    #[error("VarLong is too big")]
    VarLongTooLarge,

    #[error("Unexpected end of packet: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Invalid string data: {0}")]
    InvalidString(String),

    #[error("Failed to decode NBT: Unknown field type {0}")]
    UnknownNbtTag(u8),

    #[error("Failed to decode NBT: unexpected root tag {0}")]
    InvalidNbtRoot(u8),

    #[error("Failed to decode NBT: nested deeper than {0} levels")]
    NbtTooDeep(usize),

    #[error("Cannot encode NBT list mixing tag {expected} and tag {found}")]
    MixedNbtList { expected: u8, found: u8 },

    #[error("Unknown Metadata Type ID {0}")]
    UnknownMetadataType(i32),

    #[error("Unexpected slot format: {0}")]
    UnexpectedSlotFormat(String),

    #[error("Unknown recipe type: {0}")]
    UnknownRecipeType(String),

    #[error("Unknown vibration source type: {0}")]
    UnknownVibrationSource(String),

    #[error("Block ID {id} is outside Palette range 0-{max}! (bitsPerBlock: {bits}, blockNumber: {block})")]
    PaletteIndexOutOfRange {
        id: u32,
        max: i64,
        bits: u8,
        block: usize,
    },

    #[error("Biome ID {id} is outside Palette range 0-{max}! (bitsPerEntry: {bits}, cellIndex: {cell})")]
    BiomeIndexOutOfRange {
        id: u32,
        max: i64,
        bits: u8,
        cell: usize,
    },

    #[error("Invalid bits per entry: {0}")]
    InvalidBitsPerEntry(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Decompressed size mismatch: declared {declared}, got {actual}")]
    UncompressedSizeMismatch { declared: usize, actual: usize },

    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    #[error("Packet type {0} has no id in the active palette")]
    UnmappedPacket(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(i32),

    #[error("Login rejected: {0}")]
    LoginRejected(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("packet of type {packet} (id=0x{id:02X}, protocol={version}, state={state}) failed: {source}")]
    PacketFailed {
        packet: String,
        id: i32,
        version: i32,
        state: String,
        source: Box<ProtocolError>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error is a link failure rather than a decode failure.
    ///
    /// Link failures end the connection with a "connection lost" report;
    /// everything else is a fatal protocol desynchronisation.
    pub fn is_transport(&self) -> bool {
        match self {
            ProtocolError::Io(_)
            | ProtocolError::ConnectionClosed
            | ProtocolError::DecompressionFailure
            | ProtocolError::UncompressedSizeMismatch { .. } => true,
            ProtocolError::PacketFailed { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
