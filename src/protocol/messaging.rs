//! # Chat Messaging
//!
//! Incoming player and system chat for every signing generation, and the
//! outgoing chat and command packets.
//!
//! Every received message is delivered, verified or not. Signed messages are
//! recorded with the [`SigningState`](crate::protocol::signing::SigningState),
//! which decides when the server must be told what the client has seen.

use crate::core::codec::{PacketReader, WriteExt};
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::{render_chat_message, ChatMessage, TextComponent};
use crate::protocol::dispatcher::ClientProtocol;
use crate::protocol::palette::PlayPacketOut;
use crate::protocol::signing::{
    body_digest_1_19_2, header_data_1_19_2, signed_data_1_19, signed_data_1_19_3, AckAction, Acknowledgment,
    MessageSigner, PreviousSignature, SignedEntry, ACK_BITSET_BYTES, SIGNATURE_LEN,
};
use crate::protocol::version::{SigningGeneration, MC_1_16, MC_1_19, MC_1_19_2, MC_1_19_3, MC_1_20_6};
use crate::utils::time::current_timestamp_millis;
use bytes::{BufMut, BytesMut};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Filter mask value for a message hidden from the recipient
const FILTER_FULL: i32 = 1;
/// Filter mask value carrying a bitset of hidden characters
const FILTER_PARTIAL: i32 = 2;

/// Legacy chat positions (before 1.19)
const POSITION_CHAT: i8 = 0;
const POSITION_GAME_INFO: i8 = 2;

/// 1.19 system chat type for the action bar
const SYSTEM_TYPE_GAME_INFO: i32 = 2;

fn read_filter(reader: &mut PacketReader<'_>) -> Result<i32> {
    let filter = reader.read_varint()?;
    if filter == FILTER_PARTIAL {
        let _mask = reader.read_long_array()?;
    }
    Ok(filter)
}

fn read_json_component(reader: &mut PacketReader<'_>) -> Result<TextComponent> {
    Ok(TextComponent::from_json_str(&reader.read_string()?))
}

/// A 1.19.3+ message id: cache index + 1, or 0 followed by the full signature
fn read_previous_signature(reader: &mut PacketReader<'_>) -> Result<PreviousSignature> {
    let id = reader.read_varint()? - 1;
    if id == -1 {
        return Ok(PreviousSignature::Inline(reader.read_bytes(SIGNATURE_LEN)?.to_vec()));
    }
    usize::try_from(id)
        .map(PreviousSignature::Cached)
        .map_err(|_| ProtocolError::Custom(format!("invalid message id {id}")))
}

/// Collapse runs of whitespace the way the server tokenises commands
fn normalize_command(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What an outgoing chat or command packet reports about seen messages
enum SeenReport {
    None,
    /// 1.19.1 - 1.19.2 acknowledgment, already consumed
    Acknowledgment(Acknowledgment),
    /// 1.19.3+ count and bitset
    Seen {
        message_count: u32,
        bitset: [u8; ACK_BITSET_BYTES],
        /// Signatures of the acknowledged messages, oldest first
        previous: Vec<Vec<u8>>,
    },
}

impl ClientProtocol {
    pub(super) async fn handle_player_chat(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        match self.signing.generation() {
            SigningGeneration::V1_19_3 => self.read_chat_1_19_3(reader).await,
            SigningGeneration::V1_19_2 => self.read_chat_1_19_2(reader).await,
            SigningGeneration::V1_19 => self.read_chat_1_19(reader),
            SigningGeneration::None => self.read_chat_legacy(reader),
        }
    }

    /// Before 1.19: pre-formatted JSON with a display position
    fn read_chat_legacy(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let content = TextComponent::read(reader, self.profile.as_ref())?;
        let position = reader.read_i8()?;
        let sender = if self.profile.at_least(MC_1_16) {
            Some(reader.read_uuid()?)
        } else {
            None
        };

        let message = if position == POSITION_CHAT {
            ChatMessage {
                sender: sender.filter(|uuid| !uuid.is_nil()),
                system: false,
                ..ChatMessage::system(content, false)
            }
        } else {
            ChatMessage::system(content, position == POSITION_GAME_INFO)
        };
        self.deliver_chat(message);
        Ok(())
    }

    fn read_chat_1_19(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let signed_json = reader.read_string()?;
        let unsigned_content = reader.read_optional(read_json_component)?;
        let chat_type = reader.read_varint()?;
        let sender = reader.read_uuid()?;
        let sender_name = read_json_component(reader)?;
        let team_name = reader.read_optional(read_json_component)?;
        let timestamp = reader.read_i64()?;
        let salt = reader.read_i64()?;
        let signature = reader.read_byte_array()?;

        let verified = self.chat.verify_incoming
            && self
                .signing
                .verify_1_19(sender, &signed_json, timestamp, salt, &signature);

        let message = ChatMessage {
            content: TextComponent::from_json_str(&signed_json),
            unsigned_content,
            sender_name: self.sender_display_name(sender, sender_name),
            team_name,
            sender: Some(sender),
            chat_type,
            timestamp: Some(timestamp),
            signature: Some(signature),
            verified,
            system: false,
            overlay: false,
        };
        self.deliver_chat(message);
        Ok(())
    }

    async fn read_chat_1_19_2(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let preceding = reader.read_optional(|r| r.read_byte_array())?;
        let sender = reader.read_uuid()?;
        let header_signature = reader.read_byte_array()?;
        let plain = reader.read_string()?;
        let decorated = reader.read_optional(read_json_component)?;
        let timestamp = reader.read_i64()?;
        let salt = reader.read_i64()?;

        let count = reader.read_len()?;
        let mut last_seen = Vec::with_capacity(count.min(5));
        for _ in 0..count {
            let uuid = reader.read_uuid()?;
            last_seen.push(SignedEntry::new(uuid, reader.read_byte_array()?));
        }

        let unsigned_content = reader.read_optional(read_json_component)?;
        let filter = read_filter(reader)?;
        let chat_type = reader.read_varint()?;
        let sender_name = read_json_component(reader)?;
        let team_name = reader.read_optional(read_json_component)?;

        let checked = self.signing.verify_1_19_2(
            sender,
            preceding.as_deref(),
            &header_signature,
            &plain,
            timestamp,
            salt,
            &last_seen,
        );

        if self.signing.is_online() && !sender.is_nil() {
            let entry = SignedEntry::new(sender, header_signature.clone());
            let action = self.signing.acknowledge(entry, filter != FILTER_FULL);
            self.send_acknowledgment(action).await?;
        }

        let message = ChatMessage {
            content: decorated.unwrap_or_else(|| TextComponent::plain(plain)),
            unsigned_content,
            sender_name: self.sender_display_name(sender, sender_name),
            team_name,
            sender: Some(sender),
            chat_type,
            timestamp: Some(timestamp),
            signature: Some(header_signature),
            verified: self.chat.verify_incoming && checked,
            system: false,
            overlay: false,
        };
        self.deliver_chat(message);
        Ok(())
    }

    async fn read_chat_1_19_3(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let sender = reader.read_uuid()?;
        let index = reader.read_varint()?;
        let signature = reader.read_optional(|r| r.read_bytes(SIGNATURE_LEN).map(<[u8]>::to_vec))?;
        let body = reader.read_string()?;
        let timestamp = reader.read_i64()?;
        let salt = reader.read_i64()?;

        let count = reader.read_len()?;
        let mut previous = Vec::with_capacity(count.min(20));
        for _ in 0..count {
            previous.push(read_previous_signature(reader)?);
        }

        let unsigned_content = reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?;
        let filter = read_filter(reader)?;
        let chat_type = reader.read_varint()?;
        let sender_name = TextComponent::read(reader, profile.as_ref())?;
        let team_name = reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?;

        // the cache must see every message, so check even when verification is off
        let checked = self.signing.verify_1_19_3(
            sender,
            index,
            &body,
            timestamp,
            salt,
            &previous,
            signature.as_deref(),
        );
        let own = self.signing.is_online() && signature.is_some() && sender == self.signing.player();
        let verified = self.chat.verify_incoming && (checked || own);

        if let Some(signature) = &signature {
            let entry = SignedEntry::new(sender, signature.clone());
            let action = self.signing.acknowledge(entry, filter != FILTER_FULL);
            self.send_acknowledgment(action).await?;
        }

        let message = ChatMessage {
            content: TextComponent::plain(body),
            unsigned_content,
            sender_name: self.sender_display_name(sender, sender_name),
            team_name,
            sender: Some(sender),
            chat_type,
            timestamp: Some(timestamp),
            signature,
            verified,
            system: false,
            overlay: false,
        };
        self.deliver_chat(message);
        Ok(())
    }

    /// 1.19.1 - 1.19.2 header for a message the client will not see in full
    pub(super) async fn handle_message_header(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let preceding = reader.read_optional(|r| r.read_byte_array())?;
        let sender = reader.read_uuid()?;
        let header_signature = reader.read_byte_array()?;
        let body_digest = reader.read_byte_array()?;

        let valid = self
            .signing
            .verify_header_1_19_2(sender, preceding.as_deref(), &header_signature, &body_digest);
        trace!(%sender, valid, "Message header");

        if self.signing.is_online() && !sender.is_nil() {
            let action = self
                .signing
                .acknowledge(SignedEntry::new(sender, header_signature), false);
            self.send_acknowledgment(action).await?;
        }
        Ok(())
    }

    pub(super) fn handle_system_chat(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let content = TextComponent::read(reader, self.profile.as_ref())?;
        let overlay = if self.profile.at_least(MC_1_19_2) {
            reader.read_bool()?
        } else {
            reader.read_varint()? == SYSTEM_TYPE_GAME_INFO
        };
        self.deliver_chat(ChatMessage::system(content, overlay));
        Ok(())
    }

    /// Unsigned chat using a chat type but no sender profile (1.19.3+)
    pub(super) fn handle_profileless_chat(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let profile = Arc::clone(&self.profile);
        let content = TextComponent::read(reader, profile.as_ref())?;
        let chat_type = reader.read_varint()?;
        let sender_name = TextComponent::read(reader, profile.as_ref())?;
        let team_name = reader.read_optional(|r| TextComponent::read(r, profile.as_ref()))?;

        self.deliver_chat(ChatMessage {
            content,
            unsigned_content: None,
            sender_name,
            team_name,
            sender: None,
            chat_type,
            timestamp: None,
            signature: None,
            verified: false,
            system: false,
            overlay: false,
        });
        Ok(())
    }

    pub(super) fn handle_hide_message(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let signature = if self.profile.at_least(MC_1_19_3) {
            match read_previous_signature(reader)? {
                PreviousSignature::Inline(signature) => Some(signature),
                PreviousSignature::Cached(index) => self.signing.cache().get(index).map(<[u8]>::to_vec),
            }
        } else {
            Some(reader.read_byte_array()?)
        };

        match signature {
            Some(signature) => self.handler.on_message_hidden(&signature),
            None => debug!("Hidden message is no longer cached"),
        }
        Ok(())
    }

    /// Fall back to the player list when the server sends an empty sender name
    fn sender_display_name(&self, sender: Uuid, name: TextComponent) -> TextComponent {
        if !self.translations.render(&name).trim().is_empty() {
            return name;
        }
        match self.players.get(&sender) {
            Some(player) => player
                .display_name
                .clone()
                .unwrap_or_else(|| TextComponent::plain(player.name.clone())),
            None => name,
        }
    }

    fn deliver_chat(&self, message: ChatMessage) {
        if message.system && !message.overlay && !self.chat.display_system_messages {
            trace!("System message suppressed");
            return;
        }
        if message.signature.is_some() && !message.verified {
            self.metrics.unverified_message();
        }

        let rendered = if message.system {
            self.translations.render(&message.content)
        } else {
            render_chat_message(
                &message,
                self.registries.chat_kind(message.chat_type),
                &self.translations,
                self.chat.show_modified_chat,
            )
        };
        self.handler.on_text_received(&message, &rendered);
    }

    async fn send_acknowledgment(&self, action: AckAction) -> Result<()> {
        let mut buf = BytesMut::new();
        match action {
            AckAction::None => return Ok(()),
            AckAction::MessageCount(count) => buf.put_varint(count as i32),
            AckAction::Acknowledge(ack) => ack.encode(&mut buf, self.signing.is_online()),
        }
        debug!("Acknowledging seen messages");
        self.send_play(PlayPacketOut::MessageAcknowledgment, buf).await
    }

    /// The signer to use when `enabled` and the server verifies chat
    fn active_signer(&self, enabled: bool) -> Option<Arc<dyn MessageSigner>> {
        if enabled && self.signing.is_online() {
            self.signer.clone()
        } else {
            None
        }
    }

    /// Acknowledgment state attached to an outgoing chat or command packet
    fn take_seen_report(&mut self) -> SeenReport {
        match self.signing.generation() {
            SigningGeneration::V1_19_3 => {
                let update = self.signing.collect_seen();
                SeenReport::Seen {
                    message_count: update.message_count,
                    bitset: update.bitset,
                    previous: update.entries.into_iter().map(|e| e.signature).collect(),
                }
            }
            SigningGeneration::V1_19_2 => SeenReport::Acknowledgment(self.signing.consume_acknowledgment()),
            SigningGeneration::V1_19 | SigningGeneration::None => SeenReport::None,
        }
    }

    fn put_seen_report(&self, buf: &mut BytesMut, report: &SeenReport) {
        match report {
            SeenReport::None => {}
            SeenReport::Acknowledgment(ack) => ack.encode(buf, self.signing.is_online()),
            SeenReport::Seen { message_count, bitset, .. } => {
                buf.put_varint(*message_count as i32);
                buf.put_slice(bitset);
            }
        }
    }

    /// Signature for `content` under the current generation, or `None` if
    /// signing is not possible
    fn sign_content(
        &mut self,
        signer: &dyn MessageSigner,
        content: &str,
        timestamp: i64,
        salt: i64,
        report: &SeenReport,
    ) -> Result<Option<Vec<u8>>> {
        let player = self.signing.player();
        let data = match (self.signing.generation(), report) {
            (SigningGeneration::V1_19, _) => signed_data_1_19(player, content, timestamp, salt),
            (SigningGeneration::V1_19_2, SeenReport::Acknowledgment(ack)) => {
                let digest = body_digest_1_19_2(content, timestamp, salt, &ack.last_seen);
                header_data_1_19_2(None, player, &digest)
            }
            (SigningGeneration::V1_19_3, SeenReport::Seen { previous, .. }) => {
                let Some(session) = self.signing.session_mut() else {
                    warn!("No chat session started, sending unsigned");
                    return Ok(None);
                };
                let session_id = session.session_id;
                let index = session.next_index();
                signed_data_1_19_3(
                    player,
                    session_id,
                    index,
                    content,
                    timestamp,
                    salt,
                    previous,
                )
            }
            _ => return Ok(None),
        };
        signer.sign(&data).map(Some)
    }

    fn put_signature(&self, buf: &mut BytesMut, signature: Option<&[u8]>) {
        if self.profile.at_least(MC_1_19_3) {
            buf.put_bool(signature.is_some());
            if let Some(signature) = signature {
                buf.put_slice(signature);
            }
        } else {
            buf.put_byte_array(signature.unwrap_or_default());
        }
    }

    /// Send a chat line. From 1.19 a leading `/` sends it as a command.
    pub async fn send_chat_message(&mut self, message: &str) -> Result<()> {
        if message.is_empty() {
            return Ok(());
        }
        if self.profile.at_least(MC_1_19) {
            if let Some(command) = message.strip_prefix('/') {
                return self.send_chat_command(command, &[]).await;
            }
        }

        let mut buf = BytesMut::new();
        buf.put_string(message);
        if !self.profile.at_least(MC_1_19) {
            return self.send_play(PlayPacketOut::ChatMessage, buf).await;
        }

        let report = self.take_seen_report();
        let timestamp = current_timestamp_millis()?;
        let signer = self.active_signer(self.chat.sign_chat);
        let (salt, signature) = match signer {
            Some(signer) => {
                let salt: i64 = rand::random();
                let signature = self.sign_content(signer.as_ref(), message, timestamp, salt, &report)?;
                (salt, signature)
            }
            None => (0, None),
        };

        buf.put_i64(timestamp);
        buf.put_i64(if signature.is_some() { salt } else { 0 });
        self.put_signature(&mut buf, signature.as_deref());
        if !self.profile.at_least(MC_1_19_3) {
            buf.put_bool(false); // signed preview
        }
        self.put_seen_report(&mut buf, &report);

        debug!(signed = signature.is_some(), "Sending chat message");
        self.send_play(PlayPacketOut::ChatMessage, buf).await
    }

    /// Send a command without its leading `/`.
    ///
    /// `signed_arguments` lists the (argument name, value) pairs the server's
    /// command tree marks as signed; they are signed only when chat signing
    /// is possible and enabled for commands.
    pub async fn send_chat_command(&mut self, command: &str, signed_arguments: &[(&str, &str)]) -> Result<()> {
        let command = normalize_command(command);
        if command.is_empty() {
            return Ok(());
        }

        let signer = self
            .active_signer(self.chat.sign_commands)
            .filter(|_| !signed_arguments.is_empty());

        if self.profile.at_least(MC_1_20_6) && signer.is_none() {
            let mut buf = BytesMut::new();
            buf.put_string(&command);
            return self.send_play(PlayPacketOut::ChatCommand, buf).await;
        }

        let report = self.take_seen_report();
        let timestamp = current_timestamp_millis()?;

        let mut signatures = Vec::new();
        let mut salt = 0;
        if let Some(signer) = signer {
            salt = rand::random();
            for (name, value) in signed_arguments {
                if let Some(signature) = self.sign_content(signer.as_ref(), value, timestamp, salt, &report)? {
                    signatures.push((*name, signature));
                }
            }
        }

        let mut buf = BytesMut::new();
        buf.put_string(&command);
        buf.put_i64(timestamp);
        buf.put_i64(if signatures.is_empty() { 0 } else { salt });
        buf.put_varint(signatures.len() as i32);
        for (name, signature) in &signatures {
            buf.put_string(name);
            if self.profile.at_least(MC_1_19_3) {
                buf.put_slice(signature);
            } else {
                buf.put_byte_array(signature);
            }
        }
        if !self.profile.at_least(MC_1_19_3) {
            buf.put_bool(false); // signed preview
        }
        self.put_seen_report(&mut buf, &report);

        let packet = if self.profile.at_least(MC_1_20_6) {
            PlayPacketOut::SignedChatCommand
        } else {
            PlayPacketOut::ChatCommand
        };
        debug!(%command, signed = signatures.len(), "Sending chat command");
        self.send_play(packet, buf).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::core::frame::FrameCodec;
    use crate::core::packet::RawPacket;
    use crate::protocol::dispatcher::PacketWriter;
    use crate::protocol::handler::{Handler, PlayerInfo};
    use crate::protocol::palette::PlayPacketIn;
    use crate::protocol::signing::PlayerPublicKey;
    use crate::protocol::state::ConnectionState;
    use crate::protocol::version::MC_1_21;
    use futures::StreamExt;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;
    use tokio_util::codec::FramedRead;

    #[derive(Default)]
    struct ChatLog {
        messages: Mutex<Vec<(ChatMessage, String)>>,
    }

    impl Handler for ChatLog {
        fn on_text_received(&self, message: &ChatMessage, rendered: &str) {
            if let Ok(mut messages) = self.messages.lock() {
                messages.push((message.clone(), rendered.to_string()));
            }
        }
    }

    #[derive(Debug)]
    struct FixedSigner {
        key: PlayerPublicKey,
    }

    impl MessageSigner for FixedSigner {
        fn sign(&self, _data: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![0xAB; SIGNATURE_LEN])
        }

        fn public_key(&self) -> &PlayerPublicKey {
            &self.key
        }
    }

    fn nbt_string(buf: &mut BytesMut, text: &str) {
        buf.put_u8(8);
        buf.put_u16(text.len() as u16);
        buf.put_slice(text.as_bytes());
    }

    #[allow(clippy::unwrap_used)]
    fn chat_protocol(handler: Arc<dyn Handler>) -> (ClientProtocol, FramedRead<DuplexStream, FrameCodec>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let writer = Arc::new(PacketWriter::new(client, FrameCodec::default()));
        let config = ClientConfig::default_with_overrides(|c| c.connection.protocol_version = MC_1_21);
        let mut protocol = ClientProtocol::new(&config, handler, writer).unwrap();
        protocol.state = ConnectionState::Play;
        (protocol, FramedRead::new(server, FrameCodec::default()))
    }

    #[allow(clippy::unwrap_used)]
    fn play_id(protocol: &ClientProtocol, packet: PlayPacketIn) -> i32 {
        (0..0x80).find(|&id| protocol.palette.play_in(id) == packet).unwrap()
    }

    #[test]
    fn test_command_whitespace_is_collapsed() {
        assert_eq!(normalize_command("tp  @s \t 0 64   0 "), "tp @s 0 64 0");
        assert_eq!(normalize_command("   "), "");
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_previous_signature_ids() {
        let mut buf = BytesMut::new();
        buf.put_varint(0);
        buf.put_slice(&[7u8; SIGNATURE_LEN]);
        buf.put_varint(5);
        let mut reader = PacketReader::new(&buf);

        assert_eq!(
            read_previous_signature(&mut reader).unwrap(),
            PreviousSignature::Inline(vec![7; SIGNATURE_LEN])
        );
        assert_eq!(read_previous_signature(&mut reader).unwrap(), PreviousSignature::Cached(4));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_system_chat_overlay() {
        let log = Arc::new(ChatLog::default());
        let (mut protocol, _server) = chat_protocol(log.clone());

        let mut payload = BytesMut::new();
        nbt_string(&mut payload, "Server restarting");
        payload.put_bool(true);
        let id = play_id(&protocol, PlayPacketIn::SystemChat);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let messages = log.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].0.system);
        assert!(messages[0].0.overlay);
        assert_eq!(messages[0].1, "Server restarting");
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_unsigned_player_chat_uses_player_list_name() {
        let log = Arc::new(ChatLog::default());
        let (mut protocol, _server) = chat_protocol(log.clone());
        let sender = Uuid::from_u128(77);
        protocol.players.insert(
            sender,
            PlayerInfo {
                uuid: sender,
                name: "Steve".into(),
                ..PlayerInfo::default()
            },
        );

        let mut payload = BytesMut::new();
        payload.put_uuid(&sender);
        payload.put_varint(0); // index
        payload.put_bool(false); // unsigned
        payload.put_string("hello");
        payload.put_i64(1_700_000_000_000);
        payload.put_i64(0);
        payload.put_varint(0); // previous messages
        payload.put_bool(false); // unsigned content
        payload.put_varint(0); // pass through
        payload.put_varint(-1); // raw chat type
        nbt_string(&mut payload, "");
        payload.put_bool(false);
        let id = play_id(&protocol, PlayPacketIn::ChatMessage);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        let messages = log.messages.lock().unwrap();
        let (message, rendered) = &messages[0];
        assert!(!message.verified);
        assert_eq!(message.sender, Some(sender));
        assert_eq!(message.sender_name, TextComponent::plain("Steve"));
        assert_eq!(rendered, "hello");
        assert_eq!(protocol.metrics().snapshot().unverified_messages, 0);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_signed_chat_is_cached_and_counted() {
        let log = Arc::new(ChatLog::default());
        let (mut protocol, _server) = chat_protocol(log.clone());
        protocol.signing.set_online(true);

        let mut payload = BytesMut::new();
        payload.put_uuid(&Uuid::from_u128(5));
        payload.put_varint(0);
        payload.put_bool(true);
        payload.put_slice(&[1u8; SIGNATURE_LEN]);
        payload.put_string("signed");
        payload.put_i64(0);
        payload.put_i64(0);
        payload.put_varint(0);
        payload.put_bool(false);
        payload.put_varint(0);
        payload.put_varint(0);
        nbt_string(&mut payload, "Alex");
        payload.put_bool(false);
        let id = play_id(&protocol, PlayPacketIn::ChatMessage);
        protocol.handle_packet(RawPacket::new(id, payload)).await.unwrap();

        // unknown sender key: delivered unverified, signature remembered
        assert!(!log.messages.lock().unwrap()[0].0.verified);
        assert_eq!(protocol.metrics().snapshot().unverified_messages, 1);
        assert_eq!(protocol.signing().cache().index_of(&[1u8; SIGNATURE_LEN]), Some(0));
        assert_eq!(protocol.signing().collector().message_count(), 1);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_offline_chat_layout() {
        let (mut protocol, mut server) = chat_protocol(Arc::new(ChatLog::default()));
        protocol.send_chat_message("hi").await.unwrap();

        let sent = server.next().await.unwrap().unwrap();
        assert_eq!(Some(sent.id), protocol.palette.play_out(PlayPacketOut::ChatMessage));
        let mut reader = sent.reader();
        assert_eq!(reader.read_string().unwrap(), "hi");
        let _timestamp = reader.read_i64().unwrap();
        assert_eq!(reader.read_i64().unwrap(), 0);
        assert!(!reader.read_bool().unwrap());
        assert_eq!(reader.read_varint().unwrap(), 0);
        assert_eq!(reader.read_bytes(3).unwrap(), &[0, 0, 0]);
        assert!(reader.is_empty());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_unsigned_command_uses_plain_packet() {
        let (mut protocol, mut server) = chat_protocol(Arc::new(ChatLog::default()));
        protocol.send_chat_message("/gamemode   creative").await.unwrap();

        let sent = server.next().await.unwrap().unwrap();
        assert_eq!(Some(sent.id), protocol.palette.play_out(PlayPacketOut::ChatCommand));
        let mut reader = sent.reader();
        assert_eq!(reader.read_string().unwrap(), "gamemode creative");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_signed_chat_with_session() {
        let (mut protocol, mut server) = chat_protocol(Arc::new(ChatLog::default()));
        let signer = FixedSigner {
            key: PlayerPublicKey {
                der: vec![1, 2, 3],
                expires_at: i64::MAX,
                signature: Vec::new(),
                signature_v2: vec![4, 5],
            },
        };
        protocol = protocol.with_signer(Arc::new(signer));
        protocol.signing.set_online(true);

        protocol.send_player_session().await.unwrap();
        let session = server.next().await.unwrap().unwrap();
        assert_eq!(Some(session.id), protocol.palette.play_out(PlayPacketOut::PlayerSession));

        protocol.send_chat_message("signed hello").await.unwrap();
        let sent = server.next().await.unwrap().unwrap();
        let mut reader = sent.reader();
        assert_eq!(reader.read_string().unwrap(), "signed hello");
        let _timestamp = reader.read_i64().unwrap();
        let _salt = reader.read_i64().unwrap();
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_bytes(SIGNATURE_LEN).unwrap(), &[0xAB; SIGNATURE_LEN][..]);
    }
}
