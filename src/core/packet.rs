use crate::core::codec::{PacketReader, WriteExt};
use bytes::{Bytes, BytesMut};

/// One decoded frame: a version-relative packet id plus its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub id: i32,
    pub payload: Bytes,
}

impl RawPacket {
    pub fn new(id: i32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Cursor over the payload
    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader::new(&self.payload)
    }

    /// `VarInt(id) ++ payload`, the uncompressed frame body
    pub fn body(&self) -> BytesMut {
        let mut body = BytesMut::with_capacity(self.payload.len() + 5);
        body.put_varint(self.id);
        body.extend_from_slice(&self.payload);
        body
    }
}
