//! # Core Protocol Components
//!
//! Low-level wire handling shared by every protocol state.
//!
//! ## Components
//! - **Codec**: cursor reader and `BufMut` writer for protocol primitives
//! - **NBT**: uncompressed tagged-tree reader and writer
//! - **Packet**: `(id, payload)` unit produced by the framer
//! - **Frame**: Tokio codec for length-prefixed, optionally compressed and encrypted frames
//!
//! ## Wire Format
//! ```text
//! [Length: VarInt] [DataLength: VarInt, only with compression] [PacketId: VarInt] [Payload]
//! ```

pub mod codec;
pub mod frame;
pub mod nbt;
pub mod packet;

pub use codec::{BlockPos, PacketReader, WriteExt};
pub use frame::FrameCodec;
pub use packet::RawPacket;
