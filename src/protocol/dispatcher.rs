//! # Packet Dispatcher
//!
//! [`ClientProtocol`] owns everything a connection learns from the server and
//! interprets one frame at a time against the current [`ConnectionState`].
//!
//! The login interpreter lives in [`crate::protocol::login`] and the play
//! interpreter in [`crate::protocol::play`]; both extend `ClientProtocol` with
//! further `impl` blocks. The configuration phase is small enough to live here.
//!
//! ## Error Attribution
//! A failure inside an interpreter is wrapped in [`ProtocolError::PacketFailed`]
//! naming the logical packet type, raw id, protocol version and state. Link
//! failures pass through untouched so the dispatch loop can report them as a
//! lost connection.

use crate::config::{ChatConfig, ClientConfig};
use crate::core::codec::{PacketReader, WriteExt};
use crate::core::frame::FrameCodec;
use crate::core::nbt;
use crate::core::packet::RawPacket;
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::{TextComponent, Translations};
use crate::protocol::handler::{DisconnectReason, Handler, PlayerInfo, ResourcePackOffer};
use crate::protocol::login;
use crate::protocol::palette::{
    palette_for_version, ConfigPacketIn, ConfigPacketOut, PacketTypePalette, PaletteTable, PlayPacketOut,
};
use crate::protocol::registry::{read_registry_entries, Registries};
use crate::protocol::signing::{MessageSigner, SigningState};
use crate::protocol::state::ConnectionState;
use crate::protocol::version::{wire_profile, WireProfile, MC_1_17, MC_1_18_1, MC_1_20_4, MC_1_20_6};
use crate::terrain::ColumnTracker;
use crate::utils::crypto::SharedSecret;
use crate::utils::metrics::Metrics;
use bytes::{BufMut, BytesMut};
use futures::future::BoxFuture;
use futures::SinkExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Framer change requested by a packet, applied by the reader before the next frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    None,
    /// New compression threshold; negative disables compression
    Compression(i32),
    /// Encryption starts with this shared secret
    Encryption(SharedSecret),
    /// The server ended the connection
    Disconnect(DisconnectReason, String),
}

/// Type-erased write half of the socket
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serialised access to the outbound framer.
///
/// Outbound packets are written immediately; the lock only orders writers and
/// lets login switch compression and encryption between two frames.
pub struct PacketWriter {
    inner: Mutex<FramedWrite<BoxedWriter, FrameCodec>>,
}

impl std::fmt::Debug for PacketWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketWriter").finish_non_exhaustive()
    }
}

impl PacketWriter {
    pub fn new<W>(writer: W, codec: FrameCodec) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Mutex::new(FramedWrite::new(Box::new(writer) as BoxedWriter, codec)),
        }
    }

    /// Encode and flush one packet
    pub async fn send(&self, packet: RawPacket) -> Result<()> {
        let mut framed = self.inner.lock().await;
        framed.send(packet).await
    }

    pub async fn set_compression_threshold(&self, threshold: i32) {
        self.inner.lock().await.encoder_mut().set_compression_threshold(threshold);
    }

    pub async fn enable_encryption(&self, secret: &SharedSecret) -> Result<()> {
        self.inner.lock().await.encoder_mut().enable_encryption(secret)
    }

    /// Flush and shut down the write half
    pub async fn close(&self) -> Result<()> {
        let mut framed = self.inner.lock().await;
        framed.close().await
    }
}

/// Joins the account session on behalf of the client during login
pub trait SessionService: Send + Sync {
    /// Announce the join for `server_hash`; an error rejects the login
    fn join_session<'a>(&'a self, server_hash: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Client settings reported to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInformation {
    pub locale: String,
    pub view_distance: i8,
    /// 0 enabled, 1 commands only, 2 hidden
    pub chat_mode: i32,
    pub chat_colors: bool,
    /// Displayed skin layers bitmask
    pub skin_parts: u8,
    /// 0 left, 1 right
    pub main_hand: i32,
}

impl Default for ClientInformation {
    fn default() -> Self {
        Self {
            locale: "en_us".into(),
            view_distance: 8,
            chat_mode: 0,
            chat_colors: true,
            skin_parts: 0x7F,
            main_hand: 1,
        }
    }
}

impl ClientInformation {
    pub fn encode(&self, buf: &mut BytesMut, profile: &dyn WireProfile) {
        buf.put_string(&self.locale);
        buf.put_i8(self.view_distance);
        buf.put_varint(self.chat_mode);
        buf.put_bool(self.chat_colors);
        buf.put_u8(self.skin_parts);
        buf.put_varint(self.main_hand);
        if profile.at_least(MC_1_17) {
            // 1.17 asked to disable filtering, 1.18 flipped the flag to enable it
            buf.put_bool(!profile.at_least(MC_1_18_1));
        }
        if profile.at_least(MC_1_18_1) {
            buf.put_bool(true);
        }
    }
}

/// Running estimate of chunk decode cost, fed back to the server after each batch
#[derive(Debug, Clone)]
pub(super) struct ChunkBatchTimer {
    pub(super) start: Option<Instant>,
    pub(super) nanos_per_chunk: f64,
    pub(super) weight: u32,
}

impl Default for ChunkBatchTimer {
    fn default() -> Self {
        Self {
            start: None,
            nanos_per_chunk: 2_000_000.0,
            weight: 1,
        }
    }
}

impl ChunkBatchTimer {
    const MAX_WEIGHT: u32 = 49;
    const TARGET_NANOS: f64 = 7_000_000.0;

    pub(super) fn started(&mut self) {
        self.start = Some(Instant::now());
    }

    /// Fold in a finished batch and return the desired chunks per tick
    pub(super) fn finished(&mut self, batch_size: i32) -> f32 {
        if let (Some(start), true) = (self.start.take(), batch_size > 0) {
            let elapsed = start.elapsed().as_nanos() as f64;
            self.record(elapsed / f64::from(batch_size));
        }
        (Self::TARGET_NANOS / self.nanos_per_chunk) as f32
    }

    fn record(&mut self, nanos: f64) {
        let clamped = nanos.clamp(self.nanos_per_chunk / 3.0, self.nanos_per_chunk * 3.0);
        let weight = f64::from(self.weight);
        self.nanos_per_chunk = (self.nanos_per_chunk * weight + clamped) / (weight + 1.0);
        self.weight = (self.weight + 1).min(Self::MAX_WEIGHT);
    }
}

/// Per-connection protocol state and packet interpreters
pub struct ClientProtocol {
    pub(super) profile: Arc<dyn WireProfile>,
    pub(super) palette: Box<dyn PacketTypePalette>,
    pub(super) state: ConnectionState,
    pub(super) handler: Arc<dyn Handler>,
    pub(super) writer: Arc<PacketWriter>,
    pub(super) chat: ChatConfig,
    pub(super) registries: Registries,
    pub(super) terrain: ColumnTracker,
    pub(super) signing: SigningState,
    pub(super) signer: Option<Arc<dyn MessageSigner>>,
    pub(super) session_service: Option<Arc<dyn SessionService>>,
    pub(super) players: HashMap<Uuid, PlayerInfo>,
    pub(super) translations: Translations,
    pub(super) metrics: Arc<Metrics>,
    pub(super) capture: bool,
    pub(super) client_information: ClientInformation,
    pub(super) username: String,
    pub(super) uuid: Option<Uuid>,
    pub(super) server_host: String,
    pub(super) server_port: u16,
    pub(super) chunk_batch: ChunkBatchTimer,
}

impl std::fmt::Debug for ClientProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProtocol")
            .field("version", &self.profile.protocol_version())
            .field("state", &self.state)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ClientProtocol {
    /// Build the protocol state for a fresh connection.
    ///
    /// The palette comes from `connection.palette_file` when set, otherwise
    /// from the built-in table for the negotiated version.
    pub fn new(config: &ClientConfig, handler: Arc<dyn Handler>, writer: Arc<PacketWriter>) -> Result<Self> {
        let version = config.connection.protocol_version;
        let profile = wire_profile(version)?;
        let custom = match &config.connection.palette_file {
            Some(path) => Some(PaletteTable::from_file(path)?),
            None => None,
        };
        let palette = palette_for_version(version, custom)?;

        Ok(Self {
            registries: Registries::new(profile.as_ref()),
            signing: SigningState::new(profile.signing_generation(), profile.last_seen_window()),
            profile,
            palette,
            state: ConnectionState::Login,
            handler,
            writer,
            chat: config.chat.clone(),
            terrain: ColumnTracker::new(),
            signer: None,
            session_service: None,
            players: HashMap::new(),
            translations: Translations::default(),
            metrics: Arc::new(Metrics::new()),
            capture: config.transport.capture_packets,
            client_information: ClientInformation::default(),
            username: config.connection.username.clone(),
            uuid: None,
            server_host: config
                .connection
                .handshake_host
                .clone()
                .unwrap_or_else(|| config.connection.host.clone()),
            server_port: config.connection.port,
            chunk_batch: ChunkBatchTimer::default(),
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_session_service(mut self, service: Arc<dyn SessionService>) -> Self {
        self.session_service = Some(service);
        self
    }

    pub fn with_palette(mut self, palette: Box<dyn PacketTypePalette>) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_translations(mut self, translations: Translations) -> Self {
        self.translations = translations;
        self
    }

    /// Account uuid announced in Login Start (1.19.1+)
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_client_information(mut self, information: ClientInformation) -> Self {
        self.client_information = information;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn profile(&self) -> &dyn WireProfile {
        self.profile.as_ref()
    }

    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    pub fn terrain(&self) -> &ColumnTracker {
        &self.terrain
    }

    pub fn signing(&self) -> &SigningState {
        &self.signing
    }

    pub fn players(&self) -> &HashMap<Uuid, PlayerInfo> {
        &self.players
    }

    /// Player uuid, known once login succeeds
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn writer(&self) -> &Arc<PacketWriter> {
        &self.writer
    }

    /// Interpret one inbound frame against the current state
    pub async fn handle_packet(&mut self, packet: RawPacket) -> Result<Transition> {
        if self.capture {
            self.handler
                .on_network_packet(packet.id, &packet.payload, self.state, true);
        }

        let state = self.state;
        let result = match state {
            ConnectionState::Login => self.handle_login(&packet).await,
            ConnectionState::Configuration => self.handle_configuration(&packet).await,
            ConnectionState::Play => self.handle_play(&packet).await,
        };
        result.map_err(|e| self.packet_failed(state, &packet, e))
    }

    fn packet_failed(&self, state: ConnectionState, packet: &RawPacket, source: ProtocolError) -> ProtocolError {
        if source.is_transport() {
            return source;
        }
        self.metrics.decode_failure();

        let name = match state {
            ConnectionState::Login => login::packet_name(packet.id).to_string(),
            ConnectionState::Configuration => format!("{:?}", self.palette.configuration_in(packet.id)),
            ConnectionState::Play => format!("{:?}", self.palette.play_in(packet.id)),
        };
        let version = self.profile.protocol_version();
        error!(packet = %name, packet_id = packet.id, version, %state, error = %source, "Packet failed");

        ProtocolError::PacketFailed {
            packet: name,
            id: packet.id,
            version,
            state: state.to_string(),
            source: Box::new(source),
        }
    }

    /// Switch state and tell the handler; entering Configuration reports client settings
    pub(super) async fn enter_state(&mut self, state: ConnectionState) -> Result<()> {
        info!(from = %self.state, to = %state, "Connection state changed");
        self.state = state;
        self.handler.on_state_changed(state);

        if state == ConnectionState::Configuration {
            let mut buf = BytesMut::new();
            self.client_information.encode(&mut buf, self.profile.as_ref());
            self.send_config(ConfigPacketOut::ClientInformation, buf).await?;
        }
        Ok(())
    }

    /// Send a raw frame, mirroring it to the handler when capture is on
    pub(super) async fn send_raw(&self, packet: RawPacket) -> Result<()> {
        if self.capture {
            self.handler
                .on_network_packet(packet.id, &packet.payload, self.state, false);
        }
        self.writer.send(packet).await
    }

    pub(super) async fn send_config(&self, packet: ConfigPacketOut, payload: BytesMut) -> Result<()> {
        let id = self
            .palette
            .configuration_out(packet)
            .ok_or_else(|| ProtocolError::UnmappedPacket(format!("{packet:?}")))?;
        self.send_raw(RawPacket::new(id, payload)).await
    }

    pub(super) async fn send_play(&self, packet: PlayPacketOut, payload: BytesMut) -> Result<()> {
        let id = self
            .palette
            .play_out(packet)
            .ok_or_else(|| ProtocolError::UnmappedPacket(format!("{packet:?}")))?;
        self.send_raw(RawPacket::new(id, payload)).await
    }

    /// Report client settings again, e.g. after the user changes them
    pub async fn send_client_information(&mut self, information: ClientInformation) -> Result<()> {
        self.client_information = information;
        let mut buf = BytesMut::new();
        self.client_information.encode(&mut buf, self.profile.as_ref());
        match self.state {
            ConnectionState::Configuration => self.send_config(ConfigPacketOut::ClientInformation, buf).await,
            ConnectionState::Play => self.send_play(PlayPacketOut::ClientSettings, buf).await,
            ConnectionState::Login => Ok(()),
        }
    }

    /// Answer a cookie request from the handler's store
    pub(super) async fn handle_cookie_request(&self, reader: &mut PacketReader<'_>, play: bool) -> Result<()> {
        let key = reader.read_string()?;
        let cookie = self.handler.get_cookie(&key);

        let mut buf = BytesMut::new();
        buf.put_string(&key);
        buf.put_bool(cookie.is_some());
        if let Some(cookie) = &cookie {
            buf.put_byte_array(cookie);
        }

        if play {
            self.send_play(PlayPacketOut::CookieResponse, buf).await
        } else {
            self.send_config(ConfigPacketOut::CookieResponse, buf).await
        }
    }

    /// Resource pack offer, shared by Configuration and Play
    pub(super) async fn handle_resource_pack(&self, reader: &mut PacketReader<'_>, play: bool) -> Result<()> {
        let id = if self.profile.at_least(MC_1_20_4) {
            Some(reader.read_uuid()?)
        } else {
            None
        };
        let url = reader.read_string()?;
        let hash = reader.read_string()?;
        let forced = reader.read_bool()?;
        let prompt = if self.profile.at_least(MC_1_17) && reader.read_bool()? {
            Some(TextComponent::read(reader, self.profile.as_ref())?)
        } else {
            None
        };

        // some plugins probe clients with bogus offers
        if !url.starts_with("http") && hash.len() != 40 {
            warn!(%url, "Ignoring malformed resource pack offer");
            return Ok(());
        }

        let offer = ResourcePackOffer {
            id,
            url,
            hash,
            forced,
            prompt,
        };
        if self.handler.accept_resource_pack(&offer) {
            self.send_resource_pack_status(id, ResourcePackStatus::Accepted, play).await?;
            self.send_resource_pack_status(id, ResourcePackStatus::Loaded, play).await
        } else {
            self.send_resource_pack_status(id, ResourcePackStatus::Declined, play).await
        }
    }

    async fn send_resource_pack_status(&self, id: Option<Uuid>, status: ResourcePackStatus, play: bool) -> Result<()> {
        let mut buf = BytesMut::new();
        if let Some(id) = &id {
            buf.put_uuid(id);
        }
        buf.put_varint(status as i32);

        if play {
            self.send_play(PlayPacketOut::ResourcePackStatus, buf).await
        } else {
            self.send_config(ConfigPacketOut::ResourcePackResponse, buf).await
        }
    }

    /// Configuration-state interpreter
    pub(super) async fn handle_configuration(&mut self, packet: &RawPacket) -> Result<Transition> {
        let mut reader = packet.reader();
        let packet_type = self.palette.configuration_in(packet.id);
        debug!(packet_id = packet.id, ?packet_type, "Configuration packet");

        match packet_type {
            ConfigPacketIn::CookieRequest => self.handle_cookie_request(&mut reader, false).await?,
            ConfigPacketIn::Disconnect => {
                let reason = TextComponent::read(&mut reader, self.profile.as_ref())?;
                let message = self.translations.render(&reason);
                return Ok(Transition::Disconnect(DisconnectReason::InGameKick, message));
            }
            ConfigPacketIn::FinishConfiguration => {
                self.send_config(ConfigPacketOut::FinishConfiguration, BytesMut::new())
                    .await?;
                self.enter_state(ConnectionState::Play).await?;
            }
            ConfigPacketIn::KeepAlive => {
                let id = reader.read_i64()?;
                let mut buf = BytesMut::with_capacity(8);
                buf.put_i64(id);
                self.send_config(ConfigPacketOut::KeepAlive, buf).await?;
                self.handler.on_keep_alive(id);
            }
            ConfigPacketIn::Ping => {
                let id = reader.read_i32()?;
                let mut buf = BytesMut::with_capacity(4);
                buf.put_i32(id);
                self.send_config(ConfigPacketOut::Pong, buf).await?;
            }
            ConfigPacketIn::RegistryData => {
                if self.profile.at_least(MC_1_20_6) {
                    let registry = reader.read_string()?;
                    let entries = read_registry_entries(&mut reader, self.profile.as_ref())?;
                    self.registries.apply_registry_entries(&registry, entries);
                } else {
                    let codec = nbt::read_nbt(&mut reader, self.profile.anonymous_nbt())?;
                    self.registries.apply_registry_codec(&codec)?;
                }
            }
            ConfigPacketIn::ResetChat => self.signing.reset(),
            ConfigPacketIn::RemoveResourcePack => {
                let id = reader.read_optional(|r| r.read_uuid())?;
                self.handler.on_resource_pack_removed(id);
            }
            ConfigPacketIn::ResourcePack => self.handle_resource_pack(&mut reader, false).await?,
            ConfigPacketIn::StoreCookie => {
                let key = reader.read_string()?;
                let value = reader.read_byte_array()?;
                self.handler.set_cookie(&key, value);
            }
            ConfigPacketIn::Transfer => {
                let host = reader.read_string()?;
                let port = reader.read_varint()?;
                self.handler.on_transfer(&host, port);
            }
            ConfigPacketIn::KnownDataPacks => {
                let count = reader.read_len()?;
                let mut buf = BytesMut::new();
                buf.put_varint(count as i32);
                for _ in 0..count {
                    buf.put_string(&reader.read_string()?);
                    buf.put_string(&reader.read_string()?);
                    buf.put_string(&reader.read_string()?);
                }
                self.send_config(ConfigPacketOut::KnownDataPacks, buf).await?;
            }
            ConfigPacketIn::PluginMessage
            | ConfigPacketIn::FeatureFlags
            | ConfigPacketIn::UpdateTags
            | ConfigPacketIn::CustomReportDetails
            | ConfigPacketIn::ServerLinks
            | ConfigPacketIn::Unknown => self.metrics.packet_ignored(),
        }
        Ok(Transition::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourcePackStatus {
    Loaded = 0,
    Declined = 1,
    Accepted = 3,
}
