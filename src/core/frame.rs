//! # Frame Codec
//!
//! Tokio codec turning the socket byte stream into [`RawPacket`]s and back.
//!
//! ## Decoding
//! 1. Decrypt newly arrived bytes when encryption is active
//! 2. Read the VarInt frame length and wait for the whole body
//! 3. With compression active, read the VarInt data length; zero means plain,
//!    otherwise inflate to exactly that size
//! 4. Read the VarInt packet id; the remainder is the payload
//!
//! Encoding mirrors these steps. Frames at or above the threshold are
//! compressed, smaller ones get a zero data length.
//!
//! Each direction owns its own codec instance, so the reader half only ever
//! uses the decryptor and the writer half the encryptor.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::core::codec::{peek_varint, PacketReader, WriteExt};
use crate::core::packet::RawPacket;
use crate::error::{ProtocolError, Result};
use crate::utils::compression;
use crate::utils::crypto::{self, Aes128Cfb8Dec, Aes128Cfb8Enc, SharedSecret};
use crate::utils::metrics::Metrics;
use bytes::{Buf, BytesMut};
use std::sync::Arc;
use tokio_util::codec::{Decoder, Encoder};

/// Compression disabled marker
pub const COMPRESSION_DISABLED: i32 = -1;

/// Length-prefixed frame codec with optional zlib and AES/CFB8
pub struct FrameCodec {
    compression_threshold: i32,
    compression_level: u32,
    max_frame_size: usize,
    encryptor: Option<Aes128Cfb8Enc>,
    decryptor: Option<Aes128Cfb8Dec>,
    /// Bytes at the front of the read buffer that are already plaintext
    decrypted: usize,
    metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for FrameCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCodec")
            .field("compression_threshold", &self.compression_threshold)
            .field("max_frame_size", &self.max_frame_size)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            compression_threshold: COMPRESSION_DISABLED,
            compression_level: 6,
            max_frame_size,
            encryptor: None,
            decryptor: None,
            decrypted: 0,
            metrics: None,
        }
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set the compression threshold; negative disables compression
    pub fn set_compression_threshold(&mut self, threshold: i32) {
        self.compression_threshold = if threshold < 0 { COMPRESSION_DISABLED } else { threshold };
    }

    pub fn compression_threshold(&self) -> i32 {
        self.compression_threshold
    }

    /// Switch this direction to AES/CFB8 with key = IV = `secret`.
    ///
    /// Bytes already buffered are treated as plaintext; the server only starts
    /// encrypting after it has received our encryption response.
    pub fn enable_encryption(&mut self, secret: &SharedSecret) -> Result<()> {
        let (enc, dec) = crypto::cipher_pair(secret)?;
        self.encryptor = Some(enc);
        self.decryptor = Some(dec);
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    fn decrypt_pending(&mut self, src: &mut BytesMut) {
        if let Some(dec) = self.decryptor.as_mut() {
            if src.len() > self.decrypted {
                crypto::decrypt_in_place(dec, &mut src[self.decrypted..]);
            }
        }
        self.decrypted = src.len();
    }

    fn decode_body(&self, body: BytesMut) -> Result<RawPacket> {
        let body = body.freeze();
        let mut compressed = false;

        let plain = if self.compression_threshold >= 0 {
            let mut reader = PacketReader::new(&body);
            let data_length = reader.read_varint()?;
            if data_length == 0 {
                body.slice(reader.position()..)
            } else {
                let declared = usize::try_from(data_length).map_err(|_| ProtocolError::DecompressionFailure)?;
                compressed = true;
                compression::decompress_exact(reader.read_rest(), declared, self.max_frame_size)?.into()
            }
        } else {
            body
        };

        let mut reader = PacketReader::new(&plain);
        let id = reader.read_varint()?;
        let payload = plain.slice(reader.position()..);

        if let Some(metrics) = &self.metrics {
            metrics.packet_received(plain.len() as u64, compressed);
        }
        Ok(RawPacket { id, payload })
    }
}

impl Decoder for FrameCodec {
    type Item = RawPacket;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawPacket>> {
        self.decrypt_pending(src);

        let Some((length, header)) = peek_varint(src)? else {
            return Ok(None);
        };
        let length = usize::try_from(length).map_err(|_| ProtocolError::OversizedPacket(0))?;
        if length > self.max_frame_size {
            return Err(ProtocolError::OversizedPacket(length));
        }

        if src.len() < header + length {
            src.reserve(header + length - src.len());
            return Ok(None);
        }

        src.advance(header);
        let body = src.split_to(length);
        self.decrypted -= header + length;
        self.decode_body(body).map(Some)
    }
}

impl Encoder<RawPacket> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: RawPacket, dst: &mut BytesMut) -> Result<()> {
        let body = packet.body();
        let start = dst.len();

        if self.compression_threshold >= 0 {
            let (data, compressed) =
                compression::maybe_compress(&body, self.compression_threshold as usize, self.compression_level)?;
            let data_length = if compressed { body.len() as i32 } else { 0 };
            let mut framed = BytesMut::with_capacity(data.len() + 5);
            framed.put_varint(data_length);
            framed.extend_from_slice(&data);

            dst.reserve(framed.len() + 5);
            dst.put_varint(framed.len() as i32);
            dst.extend_from_slice(&framed);
        } else {
            dst.reserve(body.len() + 5);
            dst.put_varint(body.len() as i32);
            dst.extend_from_slice(&body);
        }

        if let Some(metrics) = &self.metrics {
            metrics.packet_sent((dst.len() - start) as u64);
        }
        if let Some(enc) = self.encryptor.as_mut() {
            crypto::encrypt_in_place(enc, &mut dst[start..]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_plain_frame_roundtrip() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(RawPacket::new(0x26, vec![1, 2, 3]), &mut buf).unwrap();
        assert_eq!(&buf[..], &[4, 0x26, 1, 2, 3]);

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id, 0x26);
        assert_eq!(&packet.payload[..], &[1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_partial_frame_waits() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[5u8, 0x01, 0xAA][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&[0xBB, 0xCC, 0xDD]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id, 1);
        assert_eq!(&packet.payload[..], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_compressed_frame_above_threshold() {
        let mut codec = FrameCodec::default();
        codec.set_compression_threshold(64);

        let payload = vec![9u8; 200];
        let mut buf = BytesMut::new();
        codec.encode(RawPacket::new(0x27, payload.clone()), &mut buf).unwrap();

        // data length is the uncompressed body size: id byte + payload
        let mut reader = PacketReader::new(&buf);
        let _frame_len = reader.read_varint().unwrap();
        assert_eq!(reader.read_varint().unwrap(), 201);

        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.id, 0x27);
        assert_eq!(packet.payload.to_vec(), payload);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_small_frame_bypasses_compression() {
        let mut codec = FrameCodec::default();
        codec.set_compression_threshold(64);

        let mut buf = BytesMut::new();
        codec.encode(RawPacket::new(0x10, vec![0u8; 9]), &mut buf).unwrap();
        assert_eq!(buf[0], 11);
        assert_eq!(buf[1], 0);
        assert_eq!(buf[2], 0x10);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.put_varint(4096);
        assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::OversizedPacket(4096))));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_encrypted_roundtrip_across_reads() {
        let secret = [7u8; 16];
        let mut writer = FrameCodec::default();
        let mut reader = FrameCodec::default();
        writer.enable_encryption(&secret).unwrap();
        reader.enable_encryption(&secret).unwrap();

        let mut wire = BytesMut::new();
        writer.encode(RawPacket::new(1, vec![1, 2, 3, 4]), &mut wire).unwrap();
        writer.encode(RawPacket::new(2, vec![5, 6]), &mut wire).unwrap();
        assert_ne!(&wire[..6], &[5, 1, 1, 2, 3, 4]);

        // Deliver the ciphertext in two uneven chunks
        let tail = wire.split_off(4);
        let mut buf = wire;
        assert!(reader.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&tail);

        let first = reader.decode(&mut buf).unwrap().unwrap();
        let second = reader.decode(&mut buf).unwrap().unwrap();
        assert_eq!((first.id, first.payload.to_vec()), (1, vec![1, 2, 3, 4]));
        assert_eq!((second.id, second.payload.to_vec()), (2, vec![5, 6]));
        assert!(reader.decode(&mut buf).unwrap().is_none());
    }
}
