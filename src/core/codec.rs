//! # Wire Codec
//!
//! Primitive encoders and decoders for the game protocol.
//!
//! Reading goes through [`PacketReader`], an explicit cursor over an
//! immutable byte slice. Writing goes through the [`WriteExt`] extension
//! trait, implemented for every [`bytes::BufMut`].
//!
//! ## Layout
//! - Fixed-width integers and floats are big-endian
//! - VarInt/VarLong: 7 bits per byte, least significant group first, high bit continues
//! - Strings and byte arrays: VarInt length prefix then raw bytes
//! - UUID: 16 bytes, big-endian 128-bit value
//! - Block position: one 64-bit word, x in bits 63..38, z in 37..12, y in 11..0

use crate::error::{ProtocolError, Result};
use bytes::BufMut;
use uuid::Uuid;

/// Maximum encoded size of a VarInt
pub const VARINT_MAX_BYTES: usize = 5;

/// Maximum encoded size of a VarLong
pub const VARLONG_MAX_BYTES: usize = 10;

/// Block coordinate packed into a single 64-bit word on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Pack into the 26/26/12 bit layout
    pub fn pack(&self) -> u64 {
        ((self.x as u64 & 0x3FF_FFFF) << 38) | ((self.z as u64 & 0x3FF_FFFF) << 12) | (self.y as u64 & 0xFFF)
    }

    /// Unpack from the 26/26/12 bit layout, sign-extending each field
    pub fn unpack(value: u64) -> Self {
        let mut x = (value >> 38) as i32;
        let mut y = (value & 0xFFF) as i32;
        let mut z = ((value >> 12) & 0x3FF_FFFF) as i32;

        if x >= 1 << 25 {
            x -= 1 << 26;
        }
        if y >= 1 << 11 {
            y -= 1 << 12;
        }
        if z >= 1 << 25 {
            z -= 1 << 26;
        }

        Self { x, y, z }
    }
}

/// Number of bytes `value` occupies as a VarInt
#[inline]
pub fn varint_len(value: i32) -> usize {
    let mut v = value as u32;
    let mut len = 1;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Try to read a VarInt from the front of `buf` without consuming it.
///
/// Returns `Ok(None)` when the buffer ends before the VarInt does, and the
/// value together with its encoded length otherwise.
pub fn peek_varint(buf: &[u8]) -> Result<Option<(i32, usize)>> {
    let mut value: u32 = 0;
    for (i, byte) in buf.iter().take(VARINT_MAX_BYTES).enumerate() {
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((value as i32, i + 1)));
        }
    }

    if buf.len() >= VARINT_MAX_BYTES {
        Err(ProtocolError::VarIntTooLarge)
    } else {
        Ok(None)
    }
}

/// Cursor over an immutable packet buffer.
///
/// Every read advances the position; reading past the end fails with
/// [`ProtocolError::UnexpectedEof`] and leaves the position unchanged.
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ProtocolError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    #[inline]
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Consume and return everything left in the buffer
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub fn read_uuid(&mut self) -> Result<Uuid> {
        Ok(Uuid::from_u128(u128::from_be_bytes(self.take_array()?)))
    }

    pub fn read_varint(&mut self) -> Result<i32> {
        let mut value: u32 = 0;
        for i in 0..VARINT_MAX_BYTES {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::VarIntTooLarge)
    }

    pub fn read_varlong(&mut self) -> Result<i64> {
        let mut value: u64 = 0;
        for i in 0..VARLONG_MAX_BYTES {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value as i64);
            }
        }
        Err(ProtocolError::VarLongTooLarge)
    }

    pub fn skip_varint(&mut self) -> Result<()> {
        self.read_varint().map(|_| ())
    }

    /// Read a VarInt that must be a non-negative length
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        usize::try_from(len).map_err(|_| ProtocolError::InvalidString(format!("negative length {len}")))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::InvalidString(e.to_string()))
    }

    pub fn read_byte_array(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        Ok(self.take(len)?.to_vec())
    }

    /// VarInt-prefixed array of big-endian longs
    pub fn read_long_array(&mut self) -> Result<Vec<u64>> {
        let len = self.read_len()?;
        let mut out = Vec::with_capacity(len.min(self.remaining() / 8));
        for _ in 0..len {
            out.push(self.read_u64()?);
        }
        Ok(out)
    }

    pub fn read_position(&mut self) -> Result<BlockPos> {
        Ok(BlockPos::unpack(self.read_u64()?))
    }

    /// Read a boolean presence flag followed by the value when set
    pub fn read_optional<T, F>(&mut self, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.read_bool()? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Protocol-level write helpers for any [`BufMut`]
pub trait WriteExt: BufMut {
    fn put_varint(&mut self, value: i32) {
        let mut v = value as u32;
        loop {
            if v & !0x7F == 0 {
                self.put_u8(v as u8);
                return;
            }
            self.put_u8(((v & 0x7F) | 0x80) as u8);
            v >>= 7;
        }
    }

    fn put_varlong(&mut self, value: i64) {
        let mut v = value as u64;
        loop {
            if v & !0x7F == 0 {
                self.put_u8(v as u8);
                return;
            }
            self.put_u8(((v & 0x7F) | 0x80) as u8);
            v >>= 7;
        }
    }

    fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    fn put_string(&mut self, value: &str) {
        self.put_varint(value.len() as i32);
        self.put_slice(value.as_bytes());
    }

    fn put_byte_array(&mut self, value: &[u8]) {
        self.put_varint(value.len() as i32);
        self.put_slice(value);
    }

    fn put_uuid(&mut self, value: &Uuid) {
        self.put_u128(value.as_u128());
    }

    fn put_position(&mut self, pos: &BlockPos) {
        self.put_u64(pos.pack());
    }

    fn put_long_array(&mut self, values: &[u64]) {
        self.put_varint(values.len() as i32);
        for v in values {
            self.put_u64(*v);
        }
    }
}

impl<B: BufMut + ?Sized> WriteExt for B {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_varint_known_encodings() {
        let cases: &[(i32, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7F]),
            (128, &[0x80, 0x01]),
            (255, &[0xFF, 0x01]),
            (25565, &[0xDD, 0xC7, 0x01]),
            (2_147_483_647, &[0xFF, 0xFF, 0xFF, 0xFF, 0x07]),
            (-1, &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, bytes) in cases {
            let mut buf = Vec::new();
            buf.put_varint(*value);
            assert_eq!(buf.as_slice(), *bytes, "encoding {value}");
            assert_eq!(varint_len(*value), bytes.len());
            assert_eq!(PacketReader::new(bytes).read_varint().unwrap(), *value);
        }
    }

    #[test]
    fn test_varint_too_large() {
        let mut reader = PacketReader::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(matches!(reader.read_varint(), Err(ProtocolError::VarIntTooLarge)));
    }

    #[test]
    fn test_varlong_too_large() {
        let bytes = [0xFFu8; 11];
        let mut reader = PacketReader::new(&bytes);
        assert!(matches!(reader.read_varlong(), Err(ProtocolError::VarLongTooLarge)));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_peek_varint_partial() {
        assert_eq!(peek_varint(&[]).unwrap(), None);
        assert_eq!(peek_varint(&[0x80]).unwrap(), None);
        assert_eq!(peek_varint(&[0xDD, 0xC7, 0x01, 0x55]).unwrap(), Some((25565, 3)));
        assert!(peek_varint(&[0xFF; 5]).is_err());
    }

    #[test]
    fn test_read_past_end_reports_remaining() {
        let mut reader = PacketReader::new(&[0x00, 0x01]);
        match reader.read_i32() {
            Err(ProtocolError::UnexpectedEof { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        // A failed read must not move the cursor
        assert_eq!(reader.position(), 0);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_empty_string_is_single_zero_byte() {
        let mut buf = Vec::new();
        buf.put_string("");
        assert_eq!(buf, vec![0x00]);
        assert_eq!(PacketReader::new(&buf).read_string().unwrap(), "");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_position_extremes() {
        let corners = [
            BlockPos::new(-33_554_432, -2048, -33_554_432),
            BlockPos::new(33_554_431, 2047, 33_554_431),
            BlockPos::new(18_357_644, 831, -20_882_616),
            BlockPos::new(0, 0, 0),
            BlockPos::new(-1, -1, -1),
        ];
        for pos in corners {
            assert_eq!(BlockPos::unpack(pos.pack()), pos);
        }

        // Reference value from the protocol documentation
        let packed: u64 = 0b01000110000001110110001100_10110000010101101101001000_001100111111;
        assert_eq!(BlockPos::unpack(packed), BlockPos::new(18_357_644, 831, -20_882_616));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_uuid_big_endian() {
        let id = Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap();
        let mut buf = Vec::new();
        buf.put_uuid(&id);
        assert_eq!(&buf[..4], &[0x06, 0x9a, 0x79, 0xf4]);
        assert_eq!(PacketReader::new(&buf).read_uuid().unwrap(), id);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_optional() {
        let mut reader = PacketReader::new(&[0x01, 0x05, 0x00]);
        assert_eq!(reader.read_optional(|r| r.read_varint()).unwrap(), Some(5));
        assert_eq!(reader.read_optional(|r| r.read_varint()).unwrap(), None);
        assert!(reader.is_empty());
    }
}
