//! # Composite Records
//!
//! Version-branched readers for the structured values embedded in play
//! packets: item slots, entity spawns, entity metadata, particles, villager
//! trades and recipes.
//!
//! Each reader is a fixed sequence of primitive reads chosen by the
//! connection's [`WireProfile`]. Unknown discriminators are decode errors,
//! except particle ids, which decode as [`ParticleData::None`].

use crate::core::codec::{BlockPos, PacketReader};
use crate::core::nbt::{self, NbtCompound};
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::TextComponent;
use crate::protocol::registry::Registries;
use crate::protocol::version::{
    MetadataType, SlotFormat, WireProfile, MC_1_17, MC_1_17_1, MC_1_18_2, MC_1_19, MC_1_19_2,
    MC_1_19_3, MC_1_19_4, MC_1_20_4, MC_1_20_6,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A non-empty item stack
#[derive(Debug, Clone, PartialEq)]
pub struct ItemStack {
    pub item_id: i32,
    pub count: i32,
    /// Legacy tag data, absent when the item carries none
    pub nbt: Option<NbtCompound>,
    /// Component type ids the server removed from the item's defaults
    pub removed_components: Vec<i32>,
}

/// Read an item slot; `None` is an empty slot
pub fn read_slot(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Option<ItemStack>> {
    match profile.slot_format() {
        SlotFormat::Legacy => read_legacy_slot(reader, profile),
        SlotFormat::Components => read_component_slot(reader),
    }
}

fn read_legacy_slot(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Option<ItemStack>> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let item_id = reader.read_varint()?;
    if item_id == -1 {
        return Ok(None);
    }
    let count = i32::from(reader.read_i8()?);
    let tag = nbt::read_nbt(reader, profile.anonymous_nbt())?;
    Ok(Some(ItemStack {
        item_id,
        count,
        nbt: (!tag.is_empty()).then_some(tag),
        removed_components: Vec::new(),
    }))
}

fn read_component_slot(reader: &mut PacketReader<'_>) -> Result<Option<ItemStack>> {
    let count = reader.read_varint()?;
    if count <= 0 {
        return Ok(None);
    }
    let item_id = reader.read_varint()?;
    let added = reader.read_varint()?;
    let removed = reader.read_len()?;
    if added > 0 {
        // component payloads are only self-delimiting with the full component registry
        return Err(ProtocolError::UnexpectedSlotFormat(format!(
            "item {item_id} carries {added} structured components"
        )));
    }
    let removed_components = (0..removed)
        .map(|_| reader.read_varint())
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(ItemStack {
        item_id,
        count,
        nbt: None,
        removed_components,
    }))
}

/// Entity spawn data shared by Spawn Entity and Spawn Living Entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySpawn {
    pub entity_id: i32,
    pub uuid: Uuid,
    pub entity_type: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: u8,
    pub pitch: u8,
    pub head_yaw: u8,
    /// Object data, -1 for living entities
    pub data: i32,
}

/// Read an entity spawn record. `living` selects the Spawn Living Entity layout.
pub fn read_entity(reader: &mut PacketReader<'_>, profile: &dyn WireProfile, living: bool) -> Result<EntitySpawn> {
    let entity_id = reader.read_varint()?;
    let uuid = reader.read_uuid()?;
    let entity_type = reader.read_varint()?;
    let (x, y, z) = (reader.read_f64()?, reader.read_f64()?, reader.read_f64()?);

    let (yaw, pitch, head_yaw, data) = if living {
        let yaw = reader.read_u8()?;
        let pitch = reader.read_u8()?;
        let head_yaw = reader.read_u8()?;
        (yaw, pitch, head_yaw, -1)
    } else {
        let pitch = reader.read_u8()?;
        let yaw = reader.read_u8()?;
        if profile.at_least(MC_1_19) {
            let head_yaw = reader.read_u8()?;
            (yaw, pitch, head_yaw, reader.read_varint()?)
        } else {
            (yaw, pitch, yaw, reader.read_i32()?)
        }
    };

    Ok(EntitySpawn {
        entity_id,
        uuid,
        entity_type,
        x,
        y,
        z,
        yaw,
        pitch,
        head_yaw,
        data,
    })
}

/// Decoded particle options
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleData {
    None,
    Block { state: i32 },
    Dust { color: [f32; 3], scale: f32 },
    DustColorTransition { from: [f32; 3], to: [f32; 3], scale: f32 },
    EntityEffect { argb: i32 },
    Item(Option<ItemStack>),
    SculkCharge { roll: f32 },
    Shriek { delay: i32 },
    Vibration { destination: VibrationTarget, ticks: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VibrationTarget {
    Block(BlockPos),
    Entity { entity_id: i32, eye_height: f32 },
    /// 1.17 layout: free-floating destination coordinates
    Point { x: f64, y: f64, z: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParticleKind {
    Block,
    Dust,
    DustColorTransition,
    EntityEffect,
    Item,
    SculkCharge,
    Shriek,
    Vibration,
}

/// Particle ids with options, per registry generation
fn particle_kind(version: i32, id: i32) -> Option<ParticleKind> {
    use ParticleKind as K;
    let legacy = version < MC_1_17;
    let v1_17 = version == MC_1_17 || version == MC_1_17_1;
    let v1_18 = version > MC_1_17_1 && version < MC_1_19_3;
    let v1_19_3 = version >= MC_1_19_3 && version < MC_1_20_6;
    let v1_20_6 = version >= MC_1_20_6;

    let kind = match id {
        1 if v1_20_6 => K::Block,
        2 if v1_18 || v1_19_3 || v1_20_6 => K::Block,
        3 if legacy || v1_18 || v1_19_3 => K::Block,
        4 if v1_17 => K::Block,
        13 if v1_20_6 => K::Dust,
        14 if legacy || v1_18 || v1_19_3 => K::Dust,
        14 if v1_20_6 => K::DustColorTransition,
        15 if v1_17 => K::Dust,
        15 if v1_18 || v1_19_3 => K::DustColorTransition,
        16 if v1_17 => K::DustColorTransition,
        20 if v1_20_6 => K::EntityEffect,
        23 if legacy => K::Block,
        24 if v1_18 => K::Block,
        25 if v1_17 || v1_19_3 => K::Block,
        28 if v1_20_6 => K::Block,
        30 if v1_19_3 => K::SculkCharge,
        32 if legacy => K::Item,
        35 if v1_20_6 => K::SculkCharge,
        36 if v1_17 => K::Item,
        36 if v1_18 => K::Vibration,
        37 if v1_17 => K::Vibration,
        39 if v1_19_3 => K::Item,
        40 if v1_19_3 => K::Vibration,
        44 if v1_20_6 => K::Item,
        45 if v1_20_6 => K::Vibration,
        99 if v1_20_6 => K::Shriek,
        105 if v1_20_6 => K::Block,
        _ => return None,
    };
    Some(kind)
}

/// Read a particle id followed by its options
pub fn read_particle(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<ParticleData> {
    let id = reader.read_varint()?;
    read_particle_options(reader, profile, id)
}

/// Read the options of a particle whose id was already consumed
pub fn read_particle_options(reader: &mut PacketReader<'_>, profile: &dyn WireProfile, id: i32) -> Result<ParticleData> {
    let version = profile.protocol_version();
    let Some(kind) = particle_kind(version, id) else {
        return Ok(ParticleData::None);
    };

    let rgb = |r: &mut PacketReader<'_>| -> Result<[f32; 3]> { Ok([r.read_f32()?, r.read_f32()?, r.read_f32()?]) };

    let data = match kind {
        ParticleKind::Block => ParticleData::Block {
            state: reader.read_varint()?,
        },
        ParticleKind::Dust => {
            let color = rgb(reader)?;
            ParticleData::Dust {
                color,
                scale: reader.read_f32()?,
            }
        }
        ParticleKind::DustColorTransition => {
            let from = rgb(reader)?;
            let scale = reader.read_f32()?;
            let to = rgb(reader)?;
            ParticleData::DustColorTransition { from, to, scale }
        }
        ParticleKind::EntityEffect => ParticleData::EntityEffect {
            argb: reader.read_i32()?,
        },
        ParticleKind::Item => ParticleData::Item(read_slot(reader, profile)?),
        ParticleKind::SculkCharge => ParticleData::SculkCharge {
            roll: reader.read_f32()?,
        },
        ParticleKind::Shriek => ParticleData::Shriek {
            delay: reader.read_varint()?,
        },
        ParticleKind::Vibration => read_vibration(reader, version)?,
    };
    Ok(data)
}

fn read_vibration(reader: &mut PacketReader<'_>, version: i32) -> Result<ParticleData> {
    if version <= MC_1_17_1 {
        // origin, then destination, as doubles
        reader.skip(24)?;
        let (x, y, z) = (reader.read_f64()?, reader.read_f64()?, reader.read_f64()?);
        let ticks = reader.read_i32()?;
        return Ok(ParticleData::Vibration {
            destination: VibrationTarget::Point { x, y, z },
            ticks,
        });
    }

    if version <= MC_1_18_2 {
        reader.read_position()?;
    }

    let block_source = if version < MC_1_20_6 {
        match reader.read_string()?.as_str() {
            "minecraft:block" | "block" => true,
            "minecraft:entity" | "entity" => false,
            other => return Err(ProtocolError::UnknownVibrationSource(other.to_string())),
        }
    } else {
        match reader.read_varint()? {
            0 => true,
            1 => false,
            other => return Err(ProtocolError::UnknownVibrationSource(other.to_string())),
        }
    };

    let destination = if block_source {
        VibrationTarget::Block(reader.read_position()?)
    } else {
        let entity_id = reader.read_varint()?;
        let eye_height = if version >= MC_1_19_2 { reader.read_f32()? } else { 0.0 };
        VibrationTarget::Entity { entity_id, eye_height }
    };
    let ticks = reader.read_varint()?;
    Ok(ParticleData::Vibration { destination, ticks })
}

/// One entity metadata value
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(i8),
    VarInt(i32),
    VarLong(i64),
    Float(f32),
    String(String),
    Chat(TextComponent),
    OptionalChat(Option<TextComponent>),
    Slot(Option<ItemStack>),
    Boolean(bool),
    Rotation([f32; 3]),
    Position(BlockPos),
    OptionalPosition(Option<BlockPos>),
    Direction(i32),
    OptionalUuid(Option<Uuid>),
    BlockId(i32),
    OptionalBlockId(i32),
    Nbt(NbtCompound),
    Particle(ParticleData),
    Particles(Vec<ParticleData>),
    VillagerData { kind: i32, profession: i32, level: i32 },
    OptionalVarInt(Option<i32>),
    Pose(i32),
    /// Cat, wolf, frog and painting variants, sniffer and armadillo states
    Variant(i32),
    OptionalGlobalPos(Option<(String, BlockPos)>),
    Vector3([f32; 3]),
    Quaternion([f32; 4]),
}

pub type EntityMetadata = BTreeMap<u8, MetadataValue>;

const METADATA_END: u8 = 0xFF;

/// Read entity metadata up to its 0xFF terminator
pub fn read_metadata(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<EntityMetadata> {
    let mut data = EntityMetadata::new();
    loop {
        let key = reader.read_u8()?;
        if key == METADATA_END {
            return Ok(data);
        }
        let type_id = reader.read_varint()?;
        let value_type = profile
            .metadata_type(type_id)
            .ok_or(ProtocolError::UnknownMetadataType(type_id))?;
        data.insert(key, read_metadata_value(reader, profile, value_type)?);
    }
}

fn read_f32s<const N: usize>(reader: &mut PacketReader<'_>) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for value in out.iter_mut() {
        *value = reader.read_f32()?;
    }
    Ok(out)
}

fn read_metadata_value(
    reader: &mut PacketReader<'_>,
    profile: &dyn WireProfile,
    value_type: MetadataType,
) -> Result<MetadataValue> {
    use MetadataType as T;
    use MetadataValue as V;

    let value = match value_type {
        T::Byte => V::Byte(reader.read_i8()?),
        T::VarInt => V::VarInt(reader.read_varint()?),
        T::VarLong => V::VarLong(reader.read_varlong()?),
        T::Float => V::Float(reader.read_f32()?),
        T::String => V::String(reader.read_string()?),
        T::Chat => V::Chat(TextComponent::read(reader, profile)?),
        T::OptionalChat => V::OptionalChat(reader.read_optional(|r| TextComponent::read(r, profile))?),
        T::Slot => V::Slot(read_slot(reader, profile)?),
        T::Boolean => V::Boolean(reader.read_bool()?),
        T::Rotation => V::Rotation(read_f32s(reader)?),
        T::Position => V::Position(reader.read_position()?),
        T::OptionalPosition => V::OptionalPosition(reader.read_optional(|r| r.read_position())?),
        T::Direction => V::Direction(reader.read_varint()?),
        T::OptionalUuid => V::OptionalUuid(reader.read_optional(|r| r.read_uuid())?),
        T::BlockId => V::BlockId(reader.read_varint()?),
        T::OptionalBlockId => V::OptionalBlockId(reader.read_varint()?),
        T::Nbt => V::Nbt(nbt::read_nbt(reader, profile.anonymous_nbt())?),
        T::Particle => V::Particle(read_particle(reader, profile)?),
        T::Particles => {
            let count = reader.read_len()?;
            V::Particles(
                (0..count)
                    .map(|_| read_particle(reader, profile))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        T::VillagerData => V::VillagerData {
            kind: reader.read_varint()?,
            profession: reader.read_varint()?,
            level: reader.read_varint()?,
        },
        T::OptionalVarInt => V::OptionalVarInt(reader.read_optional(|r| r.read_varint())?),
        T::Pose => V::Pose(reader.read_varint()?),
        T::CatVariant
        | T::WolfVariant
        | T::FrogVariant
        | T::PaintingVariant
        | T::SnifferState
        | T::ArmadilloState => V::Variant(reader.read_varint()?),
        T::OptionalGlobalPos => V::OptionalGlobalPos(reader.read_optional(|r| {
            let dimension = r.read_string()?;
            Ok((dimension, r.read_position()?))
        })?),
        T::Vector3 => V::Vector3(read_f32s(reader)?),
        T::Quaternion => V::Quaternion(read_f32s(reader)?),
    };
    Ok(value)
}

/// One villager trade offer
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub input1: Option<ItemStack>,
    pub output: Option<ItemStack>,
    pub input2: Option<ItemStack>,
    pub disabled: bool,
    pub uses: i32,
    pub max_uses: i32,
    pub xp: i32,
    pub special_price: i32,
    pub price_multiplier: f32,
    pub demand: i32,
}

/// 1.20.5+ trade cost: id, count and a component patch without removals
fn read_trade_item(reader: &mut PacketReader<'_>) -> Result<Option<ItemStack>> {
    let item_id = reader.read_varint()?;
    let count = reader.read_varint()?;
    let components = reader.read_varint()?;
    if components > 0 {
        return Err(ProtocolError::UnexpectedSlotFormat(format!(
            "trade item {item_id} carries {components} structured components"
        )));
    }
    Ok(Some(ItemStack {
        item_id,
        count,
        nbt: None,
        removed_components: Vec::new(),
    }))
}

pub fn read_trade(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Trade> {
    let (input1, output, input2) = match profile.slot_format() {
        SlotFormat::Components => {
            let input1 = read_trade_item(reader)?;
            let output = read_slot(reader, profile)?;
            let input2 = reader.read_optional(read_trade_item)?.flatten();
            (input1, output, input2)
        }
        SlotFormat::Legacy => {
            let input1 = read_slot(reader, profile)?;
            let output = read_slot(reader, profile)?;
            let input2 = if profile.at_least(MC_1_19_3) || reader.read_bool()? {
                read_slot(reader, profile)?
            } else {
                None
            };
            (input1, output, input2)
        }
    };

    Ok(Trade {
        input1,
        output,
        input2,
        disabled: reader.read_bool()?,
        uses: reader.read_i32()?,
        max_uses: reader.read_i32()?,
        xp: reader.read_i32()?,
        special_price: reader.read_i32()?,
        price_multiplier: reader.read_f32()?,
        demand: reader.read_i32()?,
    })
}

/// Alternatives accepted for one recipe input
pub type Ingredient = Vec<Option<ItemStack>>;

/// Layout family of a recipe serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    CraftingShaped,
    CraftingShapeless,
    CraftingSpecial,
    Cooking,
    Stonecutting,
    Smithing,
    SmithingTransform,
    SmithingTrim,
}

impl RecipeKind {
    pub fn from_serializer(name: &str) -> Result<Self> {
        let path = name.strip_prefix("minecraft:").unwrap_or(name);
        let kind = match path {
            "crafting_shaped" => RecipeKind::CraftingShaped,
            "crafting_shapeless" => RecipeKind::CraftingShapeless,
            "smelting" | "blasting" | "smoking" | "campfire_cooking" => RecipeKind::Cooking,
            "stonecutting" => RecipeKind::Stonecutting,
            "smithing" => RecipeKind::Smithing,
            "smithing_transform" => RecipeKind::SmithingTransform,
            "smithing_trim" => RecipeKind::SmithingTrim,
            p if p.starts_with("crafting_special_") || p == "crafting_decorated_pot" => {
                RecipeKind::CraftingSpecial
            }
            _ => return Err(ProtocolError::UnknownRecipeType(name.to_string())),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecipeData {
    CraftingShaped {
        group: String,
        category: i32,
        width: usize,
        height: usize,
        ingredients: Vec<Ingredient>,
        result: Option<ItemStack>,
        show_notification: bool,
    },
    CraftingShapeless {
        group: String,
        category: i32,
        ingredients: Vec<Ingredient>,
        result: Option<ItemStack>,
    },
    CraftingSpecial {
        category: i32,
    },
    Cooking {
        group: String,
        category: i32,
        ingredient: Ingredient,
        result: Option<ItemStack>,
        experience: f32,
        cooking_time: i32,
    },
    Stonecutting {
        group: String,
        ingredient: Ingredient,
        result: Option<ItemStack>,
    },
    Smithing {
        base: Ingredient,
        addition: Ingredient,
        result: Option<ItemStack>,
    },
    SmithingTransform {
        template: Ingredient,
        base: Ingredient,
        addition: Ingredient,
        result: Option<ItemStack>,
    },
    SmithingTrim {
        template: Ingredient,
        base: Ingredient,
        addition: Ingredient,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub serializer: String,
    pub data: RecipeData,
}

fn read_ingredient(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Ingredient> {
    let count = reader.read_len()?;
    (0..count).map(|_| read_slot(reader, profile)).collect()
}

fn read_ingredients(reader: &mut PacketReader<'_>, profile: &dyn WireProfile, count: usize) -> Result<Vec<Ingredient>> {
    (0..count).map(|_| read_ingredient(reader, profile)).collect()
}

/// Read one recipe of a Declare Recipes packet.
///
/// The serializer is a name before 1.20.5 and a registry index afterwards.
pub fn read_recipe(reader: &mut PacketReader<'_>, profile: &dyn WireProfile, registries: &Registries) -> Result<Recipe> {
    let (serializer, id) = if profile.at_least(MC_1_20_6) {
        let id = reader.read_string()?;
        let type_id = reader.read_varint()?;
        let serializer = registries
            .recipe_serializer(type_id)
            .ok_or_else(|| ProtocolError::UnknownRecipeType(type_id.to_string()))?
            .to_string();
        (serializer, id)
    } else {
        let serializer = reader.read_string()?;
        (serializer, reader.read_string()?)
    };

    let has_category = profile.at_least(MC_1_19_3);
    let category = |r: &mut PacketReader<'_>| -> Result<i32> { if has_category { r.read_varint() } else { Ok(0) } };

    let data = match RecipeKind::from_serializer(&serializer)? {
        RecipeKind::CraftingShaped => {
            let dims_first = !profile.at_least(MC_1_20_4);
            let mut dims = (0usize, 0usize);
            if dims_first {
                dims = (reader.read_len()?, reader.read_len()?);
            }
            let group = reader.read_string()?;
            let category = category(reader)?;
            if !dims_first {
                dims = (reader.read_len()?, reader.read_len()?);
            }
            let (width, height) = dims;
            let ingredients = read_ingredients(reader, profile, width * height)?;
            let result = read_slot(reader, profile)?;
            let show_notification = !profile.at_least(MC_1_19_4) || reader.read_bool()?;
            RecipeData::CraftingShaped {
                group,
                category,
                width,
                height,
                ingredients,
                result,
                show_notification,
            }
        }
        RecipeKind::CraftingShapeless => {
            let group = reader.read_string()?;
            let category = category(reader)?;
            let count = reader.read_len()?;
            let ingredients = read_ingredients(reader, profile, count)?;
            RecipeData::CraftingShapeless {
                group,
                category,
                ingredients,
                result: read_slot(reader, profile)?,
            }
        }
        RecipeKind::CraftingSpecial => RecipeData::CraftingSpecial {
            category: category(reader)?,
        },
        RecipeKind::Cooking => {
            let group = reader.read_string()?;
            let category = category(reader)?;
            RecipeData::Cooking {
                group,
                category,
                ingredient: read_ingredient(reader, profile)?,
                result: read_slot(reader, profile)?,
                experience: reader.read_f32()?,
                cooking_time: reader.read_varint()?,
            }
        }
        RecipeKind::Stonecutting => RecipeData::Stonecutting {
            group: reader.read_string()?,
            ingredient: read_ingredient(reader, profile)?,
            result: read_slot(reader, profile)?,
        },
        RecipeKind::Smithing => RecipeData::Smithing {
            base: read_ingredient(reader, profile)?,
            addition: read_ingredient(reader, profile)?,
            result: read_slot(reader, profile)?,
        },
        RecipeKind::SmithingTransform => RecipeData::SmithingTransform {
            template: read_ingredient(reader, profile)?,
            base: read_ingredient(reader, profile)?,
            addition: read_ingredient(reader, profile)?,
            result: read_slot(reader, profile)?,
        },
        RecipeKind::SmithingTrim => RecipeData::SmithingTrim {
            template: read_ingredient(reader, profile)?,
            base: read_ingredient(reader, profile)?,
            addition: read_ingredient(reader, profile)?,
        },
    };

    Ok(Recipe { id, serializer, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::WriteExt;
    use crate::core::nbt::NbtTag;
    use crate::protocol::version::{ProfileTable, MC_1_16_5, MC_1_19_2, MC_1_20_2, MC_1_21};
    use bytes::{BufMut, BytesMut};

    fn profile(version: i32) -> ProfileTable {
        match ProfileTable::new(version) {
            Ok(p) => p,
            Err(e) => panic!("{e}"),
        }
    }

    fn put_legacy_slot(buf: &mut BytesMut, item: i32, count: i8) {
        buf.put_bool(true);
        buf.put_varint(item);
        buf.put_i8(count);
        buf.put_u8(0); // TAG_End: no data
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_legacy_slot_with_nbt() {
        let p = profile(MC_1_19_2);
        let mut tag = NbtCompound::new();
        tag.insert("Damage".into(), NbtTag::Int(3));

        let mut buf = BytesMut::new();
        buf.put_bool(true);
        buf.put_varint(812);
        buf.put_i8(1);
        nbt::write_nbt(&mut buf, &tag, false).unwrap();
        buf.put_bool(false);

        let mut reader = PacketReader::new(&buf);
        let stack = read_slot(&mut reader, &p).unwrap().unwrap();
        assert_eq!(stack.item_id, 812);
        assert_eq!(stack.nbt, Some(tag));
        assert_eq!(read_slot(&mut reader, &p).unwrap(), None);
        assert!(reader.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_component_slot() {
        let p = profile(MC_1_21);
        let mut buf = BytesMut::new();
        buf.put_varint(0); // empty
        buf.put_varint(16);
        buf.put_varint(42);
        buf.put_varint(0);
        buf.put_varint(1);
        buf.put_varint(7);

        let mut reader = PacketReader::new(&buf);
        assert_eq!(read_slot(&mut reader, &p).unwrap(), None);
        let stack = read_slot(&mut reader, &p).unwrap().unwrap();
        assert_eq!((stack.item_id, stack.count), (42, 16));
        assert_eq!(stack.removed_components, vec![7]);
    }

    #[test]
    fn test_component_slot_with_added_components_is_rejected() {
        let p = profile(MC_1_21);
        let mut buf = BytesMut::new();
        buf.put_varint(1);
        buf.put_varint(42);
        buf.put_varint(1);
        buf.put_varint(0);
        let mut reader = PacketReader::new(&buf);
        assert!(matches!(
            read_slot(&mut reader, &p),
            Err(ProtocolError::UnexpectedSlotFormat(_))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_object_entity_layout_by_version() {
        for (version, expected_head) in [(MC_1_16_5, 20u8), (MC_1_19_2, 30u8)] {
            let p = profile(version);
            let mut buf = BytesMut::new();
            buf.put_varint(7);
            buf.put_u128(0xABCD);
            buf.put_varint(2);
            buf.put_f64(1.0);
            buf.put_f64(64.0);
            buf.put_f64(-3.5);
            buf.put_u8(10); // pitch
            buf.put_u8(20); // yaw
            if version >= MC_1_19 {
                buf.put_u8(30);
                buf.put_varint(5);
            } else {
                buf.put_i32(5);
            }
            let mut reader = PacketReader::new(&buf);
            let entity = read_entity(&mut reader, &p, false).unwrap();
            assert_eq!((entity.pitch, entity.yaw, entity.head_yaw), (10, 20, expected_head));
            assert_eq!(entity.data, 5);
            assert!(reader.is_empty());
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_metadata_until_terminator() {
        let p = profile(MC_1_20_2);
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_varint(0); // byte
        buf.put_i8(0x20);
        buf.put_u8(2);
        buf.put_varint(6); // optional chat
        buf.put_bool(true);
        buf.put_string(r#"{"text":"Bob"}"#);
        buf.put_u8(8);
        buf.put_varint(11); // optional position
        buf.put_bool(false);
        buf.put_u8(0xFF);

        let mut reader = PacketReader::new(&buf);
        let meta = read_metadata(&mut reader, &p).unwrap();
        assert_eq!(meta.get(&0), Some(&MetadataValue::Byte(0x20)));
        match meta.get(&2) {
            Some(MetadataValue::OptionalChat(Some(name))) => assert_eq!(name.to_plain(), "Bob"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(meta.get(&8), Some(&MetadataValue::OptionalPosition(None)));
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unknown_metadata_type() {
        let p = profile(MC_1_20_2);
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_varint(99);
        let mut reader = PacketReader::new(&buf);
        assert!(matches!(
            read_metadata(&mut reader, &p),
            Err(ProtocolError::UnknownMetadataType(99))
        ));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_particle_ids_shift_between_versions() {
        let mut buf = BytesMut::new();
        buf.put_varint(14);
        buf.put_f32(1.0);
        buf.put_f32(0.0);
        buf.put_f32(0.0);
        buf.put_f32(2.0);

        let mut reader = PacketReader::new(&buf);
        let dust = read_particle(&mut reader, &profile(MC_1_19_2)).unwrap();
        assert_eq!(
            dust,
            ParticleData::Dust {
                color: [1.0, 0.0, 0.0],
                scale: 2.0
            }
        );

        // id 14 has no options in 1.17
        let mut reader = PacketReader::new(&buf);
        assert_eq!(
            read_particle(&mut reader, &profile(MC_1_17)).unwrap(),
            ParticleData::None
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_vibration_unknown_source() {
        let mut buf = BytesMut::new();
        buf.put_varint(40);
        buf.put_string("minecraft:ghost");
        let mut reader = PacketReader::new(&buf);
        assert!(matches!(
            read_particle(&mut reader, &profile(MC_1_20_2)),
            Err(ProtocolError::UnknownVibrationSource(_))
        ));

        let mut buf = BytesMut::new();
        buf.put_varint(45);
        buf.put_varint(1);
        buf.put_varint(12);
        buf.put_f32(1.5);
        buf.put_varint(40);
        let mut reader = PacketReader::new(&buf);
        let particle = read_particle(&mut reader, &profile(MC_1_21)).unwrap();
        assert_eq!(
            particle,
            ParticleData::Vibration {
                destination: VibrationTarget::Entity {
                    entity_id: 12,
                    eye_height: 1.5
                },
                ticks: 40
            }
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_trade_second_input_gate() {
        let p = profile(MC_1_19_2);
        let mut buf = BytesMut::new();
        put_legacy_slot(&mut buf, 1, 5);
        put_legacy_slot(&mut buf, 2, 1);
        buf.put_bool(false);
        buf.put_bool(false);
        buf.put_i32(0);
        buf.put_i32(12);
        buf.put_i32(2);
        buf.put_i32(0);
        buf.put_f32(0.05);
        buf.put_i32(0);

        let mut reader = PacketReader::new(&buf);
        let trade = read_trade(&mut reader, &p).unwrap();
        assert_eq!(trade.input2, None);
        assert_eq!(trade.max_uses, 12);
        assert!(reader.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_shaped_recipe_field_order() {
        let p = profile(MC_1_19_2);
        let registries = Registries::new(&p);
        let mut buf = BytesMut::new();
        buf.put_string("minecraft:crafting_shaped");
        buf.put_string("minecraft:stick");
        buf.put_varint(1);
        buf.put_varint(2);
        buf.put_string("sticks");
        for _ in 0..2 {
            buf.put_varint(1);
            put_legacy_slot(&mut buf, 23, 1);
        }
        put_legacy_slot(&mut buf, 800, 4);

        let mut reader = PacketReader::new(&buf);
        let recipe = read_recipe(&mut reader, &p, &registries).unwrap();
        assert!(reader.is_empty());
        match recipe.data {
            RecipeData::CraftingShaped {
                width,
                height,
                ingredients,
                show_notification,
                ..
            } => {
                assert_eq!((width, height), (1, 2));
                assert_eq!(ingredients.len(), 2);
                assert!(show_notification);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_numeric_recipe_type() {
        let p = profile(MC_1_21);
        let registries = Registries::new(&p);
        let mut buf = BytesMut::new();
        buf.put_string("minecraft:map_cloning");
        buf.put_varint(4);
        buf.put_varint(3);
        let mut reader = PacketReader::new(&buf);
        let recipe = read_recipe(&mut reader, &p, &registries).unwrap();
        assert_eq!(recipe.data, RecipeData::CraftingSpecial { category: 3 });

        let mut buf = BytesMut::new();
        buf.put_string("x:y");
        buf.put_varint(500);
        let mut reader = PacketReader::new(&buf);
        assert!(matches!(
            read_recipe(&mut reader, &p, &registries),
            Err(ProtocolError::UnknownRecipeType(_))
        ));
    }
}
