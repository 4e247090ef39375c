//! # Tagged Tree (NBT)
//!
//! Uncompressed Named Binary Tag reader and writer.
//!
//! A tree is decoded into an [`NbtCompound`], an ordered map from field name
//! to [`NbtTag`]. Two root layouts exist on the wire:
//!
//! - **Named root** (before 1.20.2): `TAG_Compound`, a u16-prefixed root name, then fields
//! - **Anonymous root** (1.20.2+): `TAG_Compound` without a name, or a bare
//!   `TAG_String` which decodes to a compound holding the string under the key `""`
//!
//! A non-empty root name is kept under the key `""` so it survives re-encoding.
//! An empty tree is a single `TAG_End` byte in both directions.
//!
//! Lists and compounds may nest at most [`MAX_NBT_DEPTH`] levels below the root.

use crate::core::codec::PacketReader;
use crate::error::{ProtocolError, Result};
use bytes::BufMut;
use std::collections::BTreeMap;

pub const TAG_END: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_SHORT: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_LONG: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_BYTE_ARRAY: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_COMPOUND: u8 = 10;
pub const TAG_INT_ARRAY: u8 = 11;
pub const TAG_LONG_ARRAY: u8 = 12;

/// Deepest list/compound nesting accepted by the reader
pub const MAX_NBT_DEPTH: usize = 512;

/// Field map of a compound tag
pub type NbtCompound = BTreeMap<String, NbtTag>;

/// A single NBT value
#[derive(Debug, Clone, PartialEq)]
pub enum NbtTag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    /// Homogeneous list; encoding fails if element tags differ
    List(Vec<NbtTag>),
    Compound(NbtCompound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtTag {
    /// Wire tag id of this value
    pub fn id(&self) -> u8 {
        match self {
            NbtTag::Byte(_) => TAG_BYTE,
            NbtTag::Short(_) => TAG_SHORT,
            NbtTag::Int(_) => TAG_INT,
            NbtTag::Long(_) => TAG_LONG,
            NbtTag::Float(_) => TAG_FLOAT,
            NbtTag::Double(_) => TAG_DOUBLE,
            NbtTag::ByteArray(_) => TAG_BYTE_ARRAY,
            NbtTag::String(_) => TAG_STRING,
            NbtTag::List(_) => TAG_LIST,
            NbtTag::Compound(_) => TAG_COMPOUND,
            NbtTag::IntArray(_) => TAG_INT_ARRAY,
            NbtTag::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NbtTag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[NbtTag]> {
        match self {
            NbtTag::List(l) => Some(l),
            _ => None,
        }
    }

    /// Any integral tag widened to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NbtTag::Byte(v) => Some(*v as i64),
            NbtTag::Short(v) => Some(*v as i64),
            NbtTag::Int(v) => Some(*v as i64),
            NbtTag::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NbtTag::Float(v) => Some(*v as f64),
            NbtTag::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }
}

fn read_name(reader: &mut PacketReader<'_>) -> Result<String> {
    let len = reader.read_u16()? as usize;
    let bytes = reader.read_bytes(len)?;
    String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::InvalidString(e.to_string()))
}

fn read_array_len(reader: &mut PacketReader<'_>) -> Result<usize> {
    let len = reader.read_i32()?;
    usize::try_from(len).map_err(|_| ProtocolError::InvalidString(format!("negative NBT array length {len}")))
}

/// Read a root tree from the cursor
pub fn read_nbt(reader: &mut PacketReader<'_>, anonymous: bool) -> Result<NbtCompound> {
    let root = reader.read_u8()?;
    if root == TAG_END {
        return Ok(NbtCompound::new());
    }

    let mut compound = NbtCompound::new();
    match (root, anonymous) {
        (TAG_COMPOUND, false) => {
            let name = read_name(reader)?;
            if !name.is_empty() {
                compound.insert(String::new(), NbtTag::String(name));
            }
        }
        (TAG_COMPOUND, true) => {}
        (TAG_STRING, true) => {
            compound.insert(String::new(), NbtTag::String(read_name(reader)?));
            return Ok(compound);
        }
        (other, _) => return Err(ProtocolError::InvalidNbtRoot(other)),
    }

    read_compound_body(reader, &mut compound, 0)?;
    Ok(compound)
}

fn read_compound_body(reader: &mut PacketReader<'_>, compound: &mut NbtCompound, depth: usize) -> Result<()> {
    if depth > MAX_NBT_DEPTH {
        return Err(ProtocolError::NbtTooDeep(MAX_NBT_DEPTH));
    }
    loop {
        let tag = reader.read_u8()?;
        if tag == TAG_END {
            return Ok(());
        }
        let name = read_name(reader)?;
        let value = read_payload(reader, tag, depth)?;
        // Later duplicates replace earlier ones
        compound.insert(name, value);
    }
}

/// `depth` is the nesting level of the container holding this payload
fn read_payload(reader: &mut PacketReader<'_>, tag: u8, depth: usize) -> Result<NbtTag> {
    Ok(match tag {
        TAG_BYTE => NbtTag::Byte(reader.read_i8()?),
        TAG_SHORT => NbtTag::Short(reader.read_i16()?),
        TAG_INT => NbtTag::Int(reader.read_i32()?),
        TAG_LONG => NbtTag::Long(reader.read_i64()?),
        TAG_FLOAT => NbtTag::Float(reader.read_f32()?),
        TAG_DOUBLE => NbtTag::Double(reader.read_f64()?),
        TAG_BYTE_ARRAY => {
            let len = read_array_len(reader)?;
            NbtTag::ByteArray(reader.read_bytes(len)?.to_vec())
        }
        TAG_STRING => NbtTag::String(read_name(reader)?),
        TAG_LIST => {
            if depth >= MAX_NBT_DEPTH {
                return Err(ProtocolError::NbtTooDeep(MAX_NBT_DEPTH));
            }
            let elem = reader.read_u8()?;
            let len = read_array_len(reader)?;
            if elem == TAG_END && len > 0 {
                return Err(ProtocolError::UnknownNbtTag(elem));
            }
            let mut items = Vec::with_capacity(len.min(reader.remaining()));
            for _ in 0..len {
                items.push(read_payload(reader, elem, depth + 1)?);
            }
            NbtTag::List(items)
        }
        TAG_COMPOUND => {
            let mut nested = NbtCompound::new();
            read_compound_body(reader, &mut nested, depth + 1)?;
            NbtTag::Compound(nested)
        }
        TAG_INT_ARRAY => {
            let len = read_array_len(reader)?;
            let mut items = Vec::with_capacity(len.min(reader.remaining() / 4));
            for _ in 0..len {
                items.push(reader.read_i32()?);
            }
            NbtTag::IntArray(items)
        }
        TAG_LONG_ARRAY => {
            let len = read_array_len(reader)?;
            let mut items = Vec::with_capacity(len.min(reader.remaining() / 8));
            for _ in 0..len {
                items.push(reader.read_i64()?);
            }
            NbtTag::LongArray(items)
        }
        other => return Err(ProtocolError::UnknownNbtTag(other)),
    })
}

/// Parse a standalone root tree from a byte slice
pub fn parse_nbt(bytes: &[u8], anonymous: bool) -> Result<NbtCompound> {
    read_nbt(&mut PacketReader::new(bytes), anonymous)
}

fn put_name<B: BufMut + ?Sized>(buf: &mut B, name: &str) {
    buf.put_u16(name.len() as u16);
    buf.put_slice(name.as_bytes());
}

/// Write a root tree.
///
/// With `anonymous` set the root carries no name; otherwise a non-empty
/// string stored under `""` becomes the root name. Any other value under
/// `""` is written as an ordinary field.
pub fn write_nbt<B: BufMut + ?Sized>(buf: &mut B, nbt: &NbtCompound, anonymous: bool) -> Result<()> {
    if nbt.is_empty() {
        buf.put_u8(TAG_END);
        return Ok(());
    }

    buf.put_u8(TAG_COMPOUND);
    let root_name = match nbt.get("").and_then(NbtTag::as_str) {
        Some(name) if !anonymous && !name.is_empty() => Some(name),
        _ => None,
    };
    if !anonymous {
        put_name(buf, root_name.unwrap_or(""));
    }

    for (name, value) in nbt {
        if name.is_empty() && root_name.is_some() {
            continue;
        }
        write_field(buf, name, value)?;
    }
    buf.put_u8(TAG_END);
    Ok(())
}

/// Encode a root tree into a fresh buffer
pub fn to_bytes(nbt: &NbtCompound, anonymous: bool) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_nbt(&mut out, nbt, anonymous)?;
    Ok(out)
}

fn write_field<B: BufMut + ?Sized>(buf: &mut B, name: &str, value: &NbtTag) -> Result<()> {
    buf.put_u8(value.id());
    put_name(buf, name);
    write_payload(buf, value)
}

fn write_payload<B: BufMut + ?Sized>(buf: &mut B, value: &NbtTag) -> Result<()> {
    match value {
        NbtTag::Byte(v) => buf.put_i8(*v),
        NbtTag::Short(v) => buf.put_i16(*v),
        NbtTag::Int(v) => buf.put_i32(*v),
        NbtTag::Long(v) => buf.put_i64(*v),
        NbtTag::Float(v) => buf.put_f32(*v),
        NbtTag::Double(v) => buf.put_f64(*v),
        NbtTag::ByteArray(v) => {
            buf.put_i32(v.len() as i32);
            buf.put_slice(v);
        }
        NbtTag::String(v) => put_name(buf, v),
        NbtTag::List(items) => {
            let elem = items.first().map(NbtTag::id).unwrap_or(TAG_END);
            if let Some(bad) = items.iter().find(|item| item.id() != elem) {
                return Err(ProtocolError::MixedNbtList {
                    expected: elem,
                    found: bad.id(),
                });
            }
            buf.put_u8(elem);
            buf.put_i32(items.len() as i32);
            for item in items {
                write_payload(buf, item)?;
            }
        }
        NbtTag::Compound(fields) => {
            for (name, field) in fields {
                write_field(buf, name, field)?;
            }
            buf.put_u8(TAG_END);
        }
        NbtTag::IntArray(v) => {
            buf.put_i32(v.len() as i32);
            for item in v {
                buf.put_i32(*item);
            }
        }
        NbtTag::LongArray(v) => {
            buf.put_i32(v.len() as i32);
            for item in v {
                buf.put_i64(*item);
            }
        }
    }
    Ok(())
}
