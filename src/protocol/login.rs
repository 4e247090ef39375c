//! # Login Exchange
//!
//! Handshake, Login Start and the Login-state interpreter.
//!
//! ## Sequence
//! 1. Handshake with intent "login", then Login Start
//! 2. Optional Set Compression and Encryption Request, in either order
//! 3. Any number of plugin or cookie requests
//! 4. Login Success, or a Disconnect carrying the rejection reason
//!
//! Login packet ids are identical in every supported version, so they are
//! constants here instead of palette entries.

use crate::core::codec::{PacketReader, WriteExt};
use crate::core::packet::RawPacket;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::chat::TextComponent;
use crate::protocol::dispatcher::{ClientProtocol, Transition};
use crate::protocol::handler::{DisconnectReason, ProfileProperty};
use crate::protocol::signing::PlayerPublicKey;
use crate::protocol::state::ConnectionState;
use crate::protocol::version::{WireProfile, MC_1_16, MC_1_19, MC_1_19_2, MC_1_20_2, MC_1_20_6};
use crate::utils::crypto::{generate_shared_secret, parse_public_key, rsa_encrypt, server_hash};
use bytes::{BufMut, BytesMut};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Handshake packet, sent before the Login state
pub const HANDSHAKE: i32 = 0x00;
/// Handshake intent selecting the Login state
pub const LOGIN_INTENT: i32 = 2;

// serverbound
pub const LOGIN_START: i32 = 0x00;
pub const ENCRYPTION_RESPONSE: i32 = 0x01;
pub const PLUGIN_RESPONSE: i32 = 0x02;
pub const LOGIN_ACKNOWLEDGED: i32 = 0x03;
pub const COOKIE_RESPONSE: i32 = 0x04;

// clientbound
pub const DISCONNECT: i32 = 0x00;
pub const ENCRYPTION_REQUEST: i32 = 0x01;
pub const LOGIN_SUCCESS: i32 = 0x02;
pub const SET_COMPRESSION: i32 = 0x03;
pub const PLUGIN_REQUEST: i32 = 0x04;
pub const COOKIE_REQUEST: i32 = 0x05;

/// Profile properties as sent in Login Success and Player Info
pub(super) fn read_properties(reader: &mut PacketReader<'_>) -> Result<Vec<ProfileProperty>> {
    let count = reader.read_len()?;
    let mut properties = Vec::with_capacity(count.min(16));
    for _ in 0..count {
        properties.push(ProfileProperty {
            name: reader.read_string()?,
            value: reader.read_string()?,
            signature: reader.read_optional(|r| r.read_string())?,
        });
    }
    Ok(properties)
}

/// Name of a clientbound login packet, for diagnostics
pub fn packet_name(id: i32) -> &'static str {
    match id {
        DISCONNECT => "LoginDisconnect",
        ENCRYPTION_REQUEST => "EncryptionRequest",
        LOGIN_SUCCESS => "LoginSuccess",
        SET_COMPRESSION => "SetCompression",
        PLUGIN_REQUEST => "LoginPluginRequest",
        COOKIE_REQUEST => "LoginCookieRequest",
        _ => "Unknown",
    }
}

/// Handshake body announcing a login
pub fn handshake_payload(profile: &dyn WireProfile, host: &str, port: u16) -> BytesMut {
    let mut buf = BytesMut::with_capacity(host.len() + 16);
    buf.put_varint(profile.protocol_version());
    buf.put_string(host);
    buf.put_u16(port);
    buf.put_varint(LOGIN_INTENT);
    buf
}

/// Login Start body.
///
/// 1.19 and 1.19.2 may carry the player's chat key; 1.19.2 - 1.20.1 an
/// optional account uuid; 1.20.2+ a mandatory one.
pub fn login_start_payload(
    profile: &dyn WireProfile,
    username: &str,
    uuid: Option<Uuid>,
    key: Option<&PlayerPublicKey>,
) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_string(username);

    let version = profile.protocol_version();
    if (MC_1_19..=MC_1_19_2).contains(&version) {
        buf.put_bool(key.is_some());
        if let Some(key) = key {
            buf.put_i64(key.expires_at);
            buf.put_byte_array(&key.der);
            if version >= MC_1_19_2 {
                buf.put_byte_array(&key.signature_v2);
            } else {
                buf.put_byte_array(&key.signature);
            }
        }
    }

    if profile.at_least(MC_1_20_2) {
        buf.put_uuid(&uuid.unwrap_or_else(Uuid::new_v4));
    } else if profile.at_least(MC_1_19_2) {
        buf.put_bool(uuid.is_some());
        if let Some(uuid) = &uuid {
            buf.put_uuid(uuid);
        }
    }
    buf
}

impl ClientProtocol {
    /// Send Handshake and Login Start
    #[instrument(skip(self), fields(version = self.profile.protocol_version(), username = %self.username))]
    pub async fn start_login(&mut self) -> Result<()> {
        let handshake = handshake_payload(self.profile.as_ref(), &self.server_host, self.server_port);
        self.send_raw(RawPacket::new(HANDSHAKE, handshake)).await?;

        let key = self.signer.as_ref().map(|s| s.public_key().clone());
        let start = login_start_payload(self.profile.as_ref(), &self.username, self.uuid, key.as_ref());
        self.send_raw(RawPacket::new(LOGIN_START, start)).await?;
        debug!("Login started");
        Ok(())
    }

    /// Login-state interpreter
    pub(super) async fn handle_login(&mut self, packet: &RawPacket) -> Result<Transition> {
        let mut reader = packet.reader();
        debug!(packet_id = packet.id, packet = packet_name(packet.id), "Login packet");

        match packet.id {
            DISCONNECT => {
                let reason = TextComponent::from_json_str(&reader.read_string()?);
                let message = self.translations.render(&reason);
                warn!(%message, "Login rejected");
                Ok(Transition::Disconnect(DisconnectReason::LoginRejected, message))
            }
            ENCRYPTION_REQUEST => self.handle_encryption_request(&mut reader).await,
            LOGIN_SUCCESS => {
                self.handle_login_success(&mut reader).await?;
                Ok(Transition::None)
            }
            SET_COMPRESSION => {
                let threshold = reader.read_varint()?;
                self.writer.set_compression_threshold(threshold).await;
                debug!(threshold, "Compression threshold set");
                Ok(Transition::Compression(threshold))
            }
            PLUGIN_REQUEST => {
                let message_id = reader.read_varint()?;
                let channel = reader.read_string()?;
                debug!(message_id, %channel, "Declining login plugin request");

                let mut buf = BytesMut::with_capacity(6);
                buf.put_varint(message_id);
                buf.put_bool(false);
                self.send_raw(RawPacket::new(PLUGIN_RESPONSE, buf)).await?;
                Ok(Transition::None)
            }
            COOKIE_REQUEST => {
                let key = reader.read_string()?;
                let cookie = self.handler.get_cookie(&key);

                let mut buf = BytesMut::new();
                buf.put_string(&key);
                buf.put_bool(cookie.is_some());
                if let Some(cookie) = &cookie {
                    buf.put_byte_array(cookie);
                }
                self.send_raw(RawPacket::new(COOKIE_RESPONSE, buf)).await?;
                Ok(Transition::None)
            }
            _ => {
                self.metrics.packet_ignored();
                Ok(Transition::None)
            }
        }
    }

    async fn handle_encryption_request(&mut self, reader: &mut PacketReader<'_>) -> Result<Transition> {
        let server_id = reader.read_string()?;
        let public_key_der = reader.read_byte_array()?;
        let verify_token = reader.read_byte_array()?;
        if self.profile.at_least(MC_1_20_6) {
            let should_authenticate = reader.read_bool()?;
            debug!(should_authenticate, "Encryption requested");
        }

        let public_key = parse_public_key(&public_key_der)?;
        let secret = generate_shared_secret()?;

        // "-" marks an offline-mode server; anything else needs a session join
        let authenticate = server_id != "-";
        self.signing.set_online(authenticate);
        if authenticate {
            let hash = server_hash(&server_id, &secret, &public_key_der);
            let Some(service) = self.session_service.clone() else {
                return Ok(Transition::Disconnect(
                    DisconnectReason::LoginRejected,
                    constants::ERR_SESSION_NO_SERVICE.to_string(),
                ));
            };
            if let Err(e) = service.join_session(&hash).await {
                warn!(error = %e, "Session join failed");
                return Ok(Transition::Disconnect(
                    DisconnectReason::LoginRejected,
                    format!("{}: {e}", constants::ERR_SESSION_FAILED),
                ));
            }
        }

        let mut buf = BytesMut::with_capacity(300);
        buf.put_byte_array(&rsa_encrypt(&public_key, &secret)?);

        let version = self.profile.protocol_version();
        if (MC_1_19..=MC_1_19_2).contains(&version) {
            match &self.signer {
                Some(signer) => {
                    let salt: i64 = rand::random();
                    let mut signed = verify_token.clone();
                    signed.put_i64(salt);
                    buf.put_bool(false);
                    buf.put_i64(salt);
                    buf.put_byte_array(&signer.sign(&signed)?);
                }
                None => {
                    buf.put_bool(true);
                    buf.put_byte_array(&rsa_encrypt(&public_key, &verify_token)?);
                }
            }
        } else {
            buf.put_byte_array(&rsa_encrypt(&public_key, &verify_token)?);
        }

        self.send_raw(RawPacket::new(ENCRYPTION_RESPONSE, buf)).await?;
        self.writer.enable_encryption(&secret).await?;
        info!(online = authenticate, "Encryption enabled");
        Ok(Transition::Encryption(secret))
    }

    async fn handle_login_success(&mut self, reader: &mut PacketReader<'_>) -> Result<()> {
        let uuid = if self.profile.at_least(MC_1_16) {
            reader.read_uuid()?
        } else {
            let text = reader.read_string()?;
            Uuid::parse_str(&text).map_err(|e| ProtocolError::InvalidString(format!("{text}: {e}")))?
        };
        let name = reader.read_string()?;

        let properties = if self.profile.at_least(MC_1_19) {
            read_properties(reader)?
        } else {
            Vec::new()
        };
        if self.profile.at_least(MC_1_20_6) {
            let strict = reader.read_bool()?;
            debug!(strict, "Strict error handling");
        }

        info!(%uuid, %name, "Login succeeded");
        self.uuid = Some(uuid);
        self.signing.set_player(uuid);
        self.handler.on_login_success(uuid, &name, &properties);

        if self.profile.has_configuration_phase() {
            self.send_raw(RawPacket::new(LOGIN_ACKNOWLEDGED, BytesMut::new()))
                .await?;
            self.enter_state(ConnectionState::Configuration).await
        } else {
            self.enter_state(ConnectionState::Play).await
        }
    }
}
