//! zlib packet compression.
//!
//! Once the server announces a threshold, every frame body starts with a
//! VarInt "data length". Zero means the rest is plain; anything else is the
//! exact size the zlib stream inflates to.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Maximum output size for decompression
pub const MAX_DECOMPRESSION_SIZE: usize = MAX_PAYLOAD_SIZE;

/// Compress `data` into a zlib stream at the given level (0-9)
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if the encoder fails
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|_| ProtocolError::CompressionFailure)?;
    encoder.finish().map_err(|_| ProtocolError::CompressionFailure)
}

/// Inflate a zlib stream that must produce exactly `expected` bytes.
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if the stream is corrupt or
/// the declared size exceeds `limit`, and `UncompressedSizeMismatch` if the
/// output length differs from the declared one.
pub fn decompress_exact(data: &[u8], expected: usize, limit: usize) -> Result<Vec<u8>> {
    if expected > limit.min(MAX_DECOMPRESSION_SIZE) {
        return Err(ProtocolError::DecompressionFailure);
    }

    let mut out = Vec::with_capacity(expected);
    // Read one byte past the declared size so an overlong stream is detected
    let mut decoder = ZlibDecoder::new(data).take(expected as u64 + 1);
    let mut buffer = [0u8; 8192];
    loop {
        match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buffer[..n]),
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }

    if out.len() != expected {
        return Err(ProtocolError::UncompressedSizeMismatch {
            declared: expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

/// Compress `packet` if it reaches `threshold`, otherwise return it unchanged.
/// Returns the output bytes and a flag indicating whether compression was applied.
pub fn maybe_compress(packet: &[u8], threshold: usize, level: u32) -> Result<(Vec<u8>, bool)> {
    if packet.len() < threshold {
        Ok((packet.to_vec(), false))
    } else {
        Ok((compress(packet, level)?, true))
    }
}
