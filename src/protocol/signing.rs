//! # Message Signing Chain
//!
//! Acknowledgment bookkeeping and signature checks for signed chat.
//!
//! ## Generations
//! - **1.19**: each message is signed on its own over salt, sender, timestamp
//!   and content
//! - **1.19.1 - 1.19.2**: messages form a header chain; every header names the
//!   sender's preceding signature and signs a digest of the body, which in turn
//!   covers up to 5 last-seen entries. The client acknowledges by sending its
//!   last-seen list once more than 64 messages are pending.
//! - **1.19.3+**: messages carry a session id and index; previously seen
//!   signatures are referenced through a 128 entry [`SignatureCache`]. The
//!   client attaches a 20 bit "seen" bitset and a message count to every
//!   outgoing chat packet, and sends a standalone count once it passes 64.
//!
//! Failed checks never drop a message. It is delivered unverified and, when
//! a previously valid chain breaks, a warning is logged.

use crate::core::codec::WriteExt;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::version::SigningGeneration;
use crate::utils::crypto::{self, parse_public_key};
use crate::utils::time::is_expired;
use bytes::BufMut;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Fixed signature size from 1.19.3
pub const SIGNATURE_LEN: usize = 256;

/// Pending acknowledgments tolerated before the client reports them
pub const ACK_FLUSH_THRESHOLD: u32 = 64;

/// Size of the signature cache kept from 1.19.3
pub const SIGNATURE_CACHE_SIZE: usize = 128;

/// Bytes in the 20 bit acknowledgment bitset
pub const ACK_BITSET_BYTES: usize = 3;

/// Separator written between hashed fields in 1.19.2 bodies
const HASH_SEPARATOR: u8 = 0x46;

/// A signed message the client has seen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEntry {
    pub sender: Uuid,
    pub signature: Vec<u8>,
    /// Not yet reported to the server
    pub pending: bool,
}

impl SignedEntry {
    pub fn new(sender: Uuid, signature: Vec<u8>) -> Self {
        Self {
            sender,
            signature,
            pending: true,
        }
    }
}

/// What a 1.19.3+ chat packet reports about seen messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenUpdate {
    pub entries: Vec<SignedEntry>,
    pub bitset: [u8; ACK_BITSET_BYTES],
    /// Messages received since the last report
    pub message_count: u32,
}

/// Rolling window of the most recently seen signed messages.
///
/// 1.19.1 - 1.19.2 keep a most-recent-first list with one entry per sender.
/// 1.19.3+ keep a ring buffer whose slots map onto the acknowledgment bitset.
#[derive(Debug, Clone)]
pub struct LastSeenCollector {
    capacity: usize,
    recent: VecDeque<SignedEntry>,
    ring: Vec<Option<SignedEntry>>,
    next_index: usize,
    last_signature: Option<Vec<u8>>,
    message_count: u32,
}

impl LastSeenCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity),
            ring: vec![None; capacity],
            next_index: 0,
            last_signature: None,
            message_count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries currently held by the window
    pub fn len(&self) -> usize {
        self.recent.len() + self.ring.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a message for 1.19.1 - 1.19.2; a sender's newer message replaces its older one
    pub fn add_1_19_2(&mut self, entry: SignedEntry) {
        self.recent.retain(|e| e.sender != entry.sender);
        self.recent.push_front(entry);
        self.recent.truncate(self.capacity);
    }

    /// The 1.19.2 window, most recent first
    pub fn last_seen(&self) -> impl Iterator<Item = &SignedEntry> {
        self.recent.iter()
    }

    /// Record a message for 1.19.3+.
    ///
    /// Returns `false` for an immediate duplicate of the previous signature.
    /// Messages that were not displayed advance the ring without occupying it.
    pub fn add_1_19_3(&mut self, entry: SignedEntry, displayed: bool) -> bool {
        if self.last_signature.as_deref() == Some(entry.signature.as_slice()) {
            return false;
        }
        if self.capacity == 0 {
            return false;
        }
        let index = self.next_index;
        self.next_index = (index + 1) % self.capacity;
        self.message_count += 1;
        self.last_signature = Some(entry.signature.clone());
        self.ring[index] = displayed.then_some(entry);
        true
    }

    /// Messages received since the last report
    pub fn message_count(&self) -> u32 {
        self.message_count
    }

    pub fn reset_message_count(&mut self) -> u32 {
        std::mem::take(&mut self.message_count)
    }

    /// Build the seen-message report for an outgoing 1.19.3+ chat packet
    pub fn collect_1_19_3(&mut self) -> SeenUpdate {
        let message_count = self.reset_message_count();
        let mut bitset = [0u8; ACK_BITSET_BYTES];
        let mut entries = Vec::with_capacity(self.capacity);

        for offset in 0..self.capacity {
            let slot = (self.next_index + offset) % self.capacity;
            if let Some(entry) = self.ring[slot].as_mut() {
                bitset[offset / 8] |= 1 << (offset % 8);
                entries.push(entry.clone());
                entry.pending = false;
            }
        }

        SeenUpdate {
            entries,
            bitset,
            message_count,
        }
    }
}

/// 1.19.1 - 1.19.2 acknowledgment: the last-seen window plus the last message received
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acknowledgment {
    pub last_seen: Vec<SignedEntry>,
    pub last_received: Option<SignedEntry>,
}

impl Acknowledgment {
    /// Encode the acknowledgment; offline sessions report nothing
    pub fn encode<B: BufMut + ?Sized>(&self, buf: &mut B, online: bool) {
        if !online {
            buf.put_varint(0);
            buf.put_bool(false);
            return;
        }
        buf.put_varint(self.last_seen.len() as i32);
        for entry in &self.last_seen {
            buf.put_uuid(&entry.sender);
            buf.put_byte_array(&entry.signature);
        }
        match &self.last_received {
            Some(entry) => {
                buf.put_bool(true);
                buf.put_uuid(&entry.sender);
                buf.put_byte_array(&entry.signature);
            }
            None => buf.put_bool(false),
        }
    }
}

/// Recently seen signatures, addressable by index from 1.19.3 chat packets
#[derive(Debug, Clone)]
pub struct SignatureCache {
    entries: Vec<Option<Vec<u8>>>,
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self {
            entries: vec![None; SIGNATURE_CACHE_SIZE],
        }
    }
}

impl SignatureCache {
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.entries.get(index).and_then(|e| e.as_deref())
    }

    /// Index of a cached signature
    pub fn index_of(&self, signature: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.as_deref() == Some(signature))
    }

    /// Push a message's previous signatures followed by its own signature.
    ///
    /// The newest signature lands in slot 0; displaced entries that were not
    /// pushed again shift towards the end and fall off past the last slot.
    pub fn push(&mut self, previous: &[Vec<u8>], signature: Option<&[u8]>) {
        let mut queue: VecDeque<Vec<u8>> = previous.iter().cloned().collect();
        if let Some(sig) = signature {
            queue.push_back(sig.to_vec());
        }
        let pushed: HashSet<Vec<u8>> = queue.iter().cloned().collect();

        for slot in self.entries.iter_mut() {
            let Some(next) = queue.pop_back() else {
                break;
            };
            if let Some(old) = slot.replace(next) {
                if !pushed.contains(&old) {
                    queue.push_front(old);
                }
            }
        }
    }
}

/// Previous-message reference in a 1.19.3+ chat packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviousSignature {
    /// Index into the signature cache
    Cached(usize),
    /// Signature sent in full
    Inline(Vec<u8>),
}

/// Identity used for outgoing signed chat.
///
/// Implemented by the owner of the player's key pair; the core only asks for
/// signatures and never touches private key material.
pub trait MessageSigner: Send + Sync + fmt::Debug {
    /// SHA256withRSA signature over `data`
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn public_key(&self) -> &PlayerPublicKey;
}

/// Public half of the player's chat key as issued by the account service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerPublicKey {
    /// X.509 SubjectPublicKeyInfo DER
    pub der: Vec<u8>,
    /// Expiry, milliseconds since the epoch
    pub expires_at: i64,
    /// Service signature used by 1.19
    pub signature: Vec<u8>,
    /// Service signature used from 1.19.1
    pub signature_v2: Vec<u8>,
}

/// A sender's chat key and the state of their message chain
#[derive(Debug, Clone)]
pub struct SenderKey {
    key: Option<RsaPublicKey>,
    expires_at: i64,
    /// Chat session id from 1.19.3
    pub session_id: Option<Uuid>,
    chain_valid: bool,
    preceding: Option<Vec<u8>>,
    last_index: Option<i32>,
}

impl SenderKey {
    /// Parse a sender key from its DER encoding. Unparseable keys verify nothing.
    pub fn new(der: &[u8], expires_at: i64, session_id: Option<Uuid>) -> Self {
        let key = match parse_public_key(der) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable chat key");
                None
            }
        };
        Self::from_key(key, expires_at, session_id)
    }

    pub fn from_key(key: Option<RsaPublicKey>, expires_at: i64, session_id: Option<Uuid>) -> Self {
        Self {
            chain_valid: key.is_some(),
            key,
            expires_at,
            session_id,
            preceding: None,
            last_index: None,
        }
    }

    fn usable(&self) -> Option<&RsaPublicKey> {
        self.key.as_ref().filter(|_| !is_expired(self.expires_at))
    }

    pub fn chain_valid(&self) -> bool {
        self.chain_valid
    }

    /// Check a standalone 1.19 signature
    pub fn verify_1_19(&self, sender: Uuid, content: &str, timestamp_ms: i64, salt: i64, signature: &[u8]) -> bool {
        let Some(key) = self.usable() else {
            return false;
        };
        let data = signed_data_1_19(sender, content, timestamp_ms, salt);
        crypto::verify_sha256_rsa(key, &data, signature)
    }

    /// Check a 1.19.2 header against its body digest and advance the chain
    pub fn verify_header_1_19_2(
        &mut self,
        sender: Uuid,
        preceding: Option<&[u8]>,
        header_signature: &[u8],
        body_digest: &[u8],
    ) -> bool {
        if !self.chain_valid {
            return false;
        }
        let Some(key) = self.usable().cloned() else {
            self.chain_valid = false;
            return false;
        };
        if let Some(expected) = &self.preceding {
            if preceding != Some(expected.as_slice()) {
                self.chain_valid = false;
                return false;
            }
        }

        let data = header_data_1_19_2(preceding, sender, body_digest);
        let valid = crypto::verify_sha256_rsa(&key, &data, header_signature);
        self.chain_valid = valid;
        self.preceding = Some(header_signature.to_vec());
        valid
    }

    /// Check a full 1.19.2 message and advance the chain
    #[allow(clippy::too_many_arguments)]
    pub fn verify_1_19_2(
        &mut self,
        sender: Uuid,
        preceding: Option<&[u8]>,
        header_signature: &[u8],
        content: &str,
        timestamp_ms: i64,
        salt: i64,
        last_seen: &[SignedEntry],
    ) -> bool {
        let digest = body_digest_1_19_2(content, timestamp_ms, salt, last_seen);
        self.verify_header_1_19_2(sender, preceding, header_signature, &digest)
    }

    /// Check a 1.19.3+ message. Indices must increase within a session.
    #[allow(clippy::too_many_arguments)]
    pub fn verify_1_19_3(
        &mut self,
        sender: Uuid,
        index: i32,
        content: &str,
        timestamp_ms: i64,
        salt: i64,
        previous: &[Vec<u8>],
        signature: &[u8],
    ) -> bool {
        let Some(session_id) = self.session_id else {
            return false;
        };
        let Some(key) = self.usable().cloned() else {
            return false;
        };
        if self.last_index.is_some_and(|last| index <= last) {
            self.chain_valid = false;
            return false;
        }
        let data = signed_data_1_19_3(sender, session_id, index, content, timestamp_ms, salt, previous);
        let valid = crypto::verify_sha256_rsa(&key, &data, signature);
        if valid {
            self.last_index = Some(index);
        }
        self.chain_valid = valid;
        valid
    }
}

/// 1.19 signed payload: salt, sender, timestamp seconds, content
pub fn signed_data_1_19(sender: Uuid, content: &str, timestamp_ms: i64, salt: i64) -> Vec<u8> {
    let mut data = Vec::with_capacity(32 + content.len());
    data.put_i64(salt);
    data.put_uuid(&sender);
    data.put_i64(timestamp_ms / 1000);
    data.extend_from_slice(content.as_bytes());
    data
}

/// 1.19.2 body digest over salt, timestamp, content and the last-seen entries
pub fn body_digest_1_19_2(content: &str, timestamp_ms: i64, salt: i64, last_seen: &[SignedEntry]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt.to_be_bytes());
    hasher.update((timestamp_ms / 1000).to_be_bytes());
    hasher.update(content.as_bytes());
    hasher.update([HASH_SEPARATOR]);
    for entry in last_seen {
        hasher.update([HASH_SEPARATOR]);
        hasher.update(entry.sender.as_u128().to_be_bytes());
        hasher.update(&entry.signature);
    }
    hasher.finalize().to_vec()
}

/// 1.19.2 header payload: preceding signature, sender, body digest
pub fn header_data_1_19_2(preceding: Option<&[u8]>, sender: Uuid, body_digest: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 + body_digest.len() + preceding.map_or(0, <[u8]>::len));
    if let Some(preceding) = preceding {
        data.extend_from_slice(preceding);
    }
    data.put_uuid(&sender);
    data.extend_from_slice(body_digest);
    data
}

/// 1.19.3+ signed payload: link (sender, session, index) then body
pub fn signed_data_1_19_3(
    sender: Uuid,
    session_id: Uuid,
    index: i32,
    content: &str,
    timestamp_ms: i64,
    salt: i64,
    previous: &[Vec<u8>],
) -> Vec<u8> {
    let mut data = Vec::with_capacity(64 + content.len() + previous.len() * SIGNATURE_LEN);
    data.put_i32(1);
    data.put_uuid(&sender);
    data.put_uuid(&session_id);
    data.put_i32(index);
    data.put_i64(salt);
    data.put_i64(timestamp_ms / 1000);
    data.put_i32(content.len() as i32);
    data.extend_from_slice(content.as_bytes());
    data.put_i32(previous.len() as i32);
    for signature in previous {
        data.extend_from_slice(signature);
    }
    data
}

/// The client's own 1.19.3+ chat session
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub session_id: Uuid,
    next_index: i32,
}

impl ChatSession {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            next_index: 0,
        }
    }

    pub fn next_index(&mut self) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }
}

/// Outcome of receiving a signed message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckAction {
    None,
    /// 1.19.3+: report this many received messages
    MessageCount(u32),
    /// 1.19.1 - 1.19.2: send the full acknowledgment
    Acknowledge(Acknowledgment),
}

/// Per-connection signed chat state
#[derive(Debug)]
pub struct SigningState {
    generation: SigningGeneration,
    online: bool,
    player: Uuid,
    collector: LastSeenCollector,
    last_received: Option<SignedEntry>,
    pending: u32,
    cache: SignatureCache,
    senders: HashMap<Uuid, SenderKey>,
    session: Option<ChatSession>,
}

impl SigningState {
    pub fn new(generation: SigningGeneration, window: usize) -> Self {
        Self {
            generation,
            online: false,
            player: Uuid::nil(),
            collector: LastSeenCollector::new(window),
            last_received: None,
            pending: 0,
            cache: SignatureCache::default(),
            senders: HashMap::new(),
            session: None,
        }
    }

    pub fn generation(&self) -> SigningGeneration {
        self.generation
    }

    /// The server authenticated this session
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_player(&mut self, player: Uuid) {
        self.player = player;
    }

    pub fn player(&self) -> Uuid {
        self.player
    }

    /// Forget the chain after joining a (new) world; keys stay known
    pub fn reset(&mut self) {
        self.collector = LastSeenCollector::new(self.collector.capacity());
        self.last_received = None;
        self.pending = 0;
        self.cache = SignatureCache::default();
        if let Some(session) = &self.session {
            self.session = Some(ChatSession::new(session.session_id));
        }
    }

    pub fn collector(&self) -> &LastSeenCollector {
        &self.collector
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    pub fn pending(&self) -> u32 {
        self.pending
    }

    pub fn set_sender_key(&mut self, sender: Uuid, key: SenderKey) {
        self.senders.insert(sender, key);
    }

    pub fn remove_sender(&mut self, sender: &Uuid) {
        self.senders.remove(sender);
    }

    pub fn sender_key(&self, sender: &Uuid) -> Option<&SenderKey> {
        self.senders.get(sender)
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn start_session(&mut self, session_id: Uuid) -> &ChatSession {
        self.session.insert(ChatSession::new(session_id))
    }

    pub fn session_mut(&mut self) -> Option<&mut ChatSession> {
        self.session.as_mut()
    }

    /// Verify a 1.19 message
    pub fn verify_1_19(&self, sender: Uuid, content: &str, timestamp_ms: i64, salt: i64, signature: &[u8]) -> bool {
        if !self.online {
            return false;
        }
        if sender == self.player {
            return true;
        }
        self.senders
            .get(&sender)
            .is_some_and(|key| key.verify_1_19(sender, content, timestamp_ms, salt, signature))
    }

    /// Verify a 1.19.2 header-only message
    pub fn verify_header_1_19_2(
        &mut self,
        sender: Uuid,
        preceding: Option<&[u8]>,
        header_signature: &[u8],
        body_digest: &[u8],
    ) -> bool {
        self.verify_chain(sender, |key| {
            key.verify_header_1_19_2(sender, preceding, header_signature, body_digest)
        })
    }

    /// Verify a full 1.19.2 message
    #[allow(clippy::too_many_arguments)]
    pub fn verify_1_19_2(
        &mut self,
        sender: Uuid,
        preceding: Option<&[u8]>,
        header_signature: &[u8],
        content: &str,
        timestamp_ms: i64,
        salt: i64,
        last_seen: &[SignedEntry],
    ) -> bool {
        self.verify_chain(sender, |key| {
            key.verify_1_19_2(sender, preceding, header_signature, content, timestamp_ms, salt, last_seen)
        })
    }

    /// Resolve cached references in a 1.19.3+ previous-message list
    pub fn resolve_previous(&self, previous: &[PreviousSignature]) -> Option<Vec<Vec<u8>>> {
        previous
            .iter()
            .map(|p| match p {
                PreviousSignature::Inline(sig) => Some(sig.clone()),
                PreviousSignature::Cached(index) => self.cache.get(*index).map(<[u8]>::to_vec),
            })
            .collect()
    }

    /// Verify a 1.19.3+ message and push its signatures into the cache
    #[allow(clippy::too_many_arguments)]
    pub fn verify_1_19_3(
        &mut self,
        sender: Uuid,
        index: i32,
        content: &str,
        timestamp_ms: i64,
        salt: i64,
        previous: &[PreviousSignature],
        signature: Option<&[u8]>,
    ) -> bool {
        let resolved = self.resolve_previous(previous);
        if let Some(resolved) = &resolved {
            self.cache.push(resolved, signature);
        }

        let (Some(signature), Some(resolved)) = (signature, resolved) else {
            if signature.is_some() {
                debug!(%sender, "Chat references signatures missing from the cache");
            }
            return false;
        };
        if !self.online {
            return false;
        }
        let Some(key) = self.senders.get_mut(&sender) else {
            return false;
        };
        let was_valid = key.chain_valid();
        let valid = key.verify_1_19_3(sender, index, content, timestamp_ms, salt, &resolved, signature);
        if was_valid && !valid {
            warn!(%sender, "Chat message chain broken");
        }
        valid
    }

    fn verify_chain<F>(&mut self, sender: Uuid, check: F) -> bool
    where
        F: FnOnce(&mut SenderKey) -> bool,
    {
        if !self.online {
            return false;
        }
        if sender == self.player {
            return true;
        }
        let Some(key) = self.senders.get_mut(&sender) else {
            return false;
        };
        let was_valid = key.chain_valid();
        let valid = was_valid && check(key);
        if was_valid && !valid {
            warn!(%sender, "Chat message chain broken");
        }
        valid
    }

    /// Record a received signed message and decide whether to acknowledge now
    pub fn acknowledge(&mut self, entry: SignedEntry, displayed: bool) -> AckAction {
        match self.generation {
            SigningGeneration::V1_19_3 => {
                if self.collector.add_1_19_3(entry, displayed)
                    && self.collector.message_count() > ACK_FLUSH_THRESHOLD
                {
                    let count = self.collector.reset_message_count();
                    return AckAction::MessageCount(count);
                }
                AckAction::None
            }
            SigningGeneration::V1_19_2 => {
                if displayed {
                    self.collector.add_1_19_2(entry);
                    self.last_received = None;
                } else {
                    self.last_received = Some(entry);
                }
                self.pending += 1;
                if self.pending > ACK_FLUSH_THRESHOLD {
                    return AckAction::Acknowledge(self.consume_acknowledgment());
                }
                AckAction::None
            }
            SigningGeneration::V1_19 | SigningGeneration::None => AckAction::None,
        }
    }

    /// Take the 1.19.2 acknowledgment, clearing the pending count
    pub fn consume_acknowledgment(&mut self) -> Acknowledgment {
        self.pending = 0;
        Acknowledgment {
            last_seen: self.collector.last_seen().cloned().collect(),
            last_received: self.last_received.clone(),
        }
    }

    /// Seen-message report for an outgoing 1.19.3+ packet
    pub fn collect_seen(&mut self) -> SeenUpdate {
        self.collector.collect_1_19_3()
    }
}

/// Sign data with a signer, or fail when none is configured
pub fn require_signer(signer: Option<&dyn MessageSigner>) -> Result<&dyn MessageSigner> {
    signer.ok_or_else(|| ProtocolError::SessionError(constants::ERR_NO_SIGNER.into()))
}
