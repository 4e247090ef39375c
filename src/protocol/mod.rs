//! # Protocol Layer
//!
//! Connection state machine and packet interpreters.
//!
//! ## Components
//! - **Version**: protocol numbers and the per-connection [`WireProfile`]
//! - **Palette**: raw packet id to logical packet type, per version
//! - **Dispatcher**: [`ClientProtocol`], the per-connection state and Configuration interpreter
//! - **Login / Play / Messaging**: interpreters for the remaining states and for chat
//! - **Registry**: chat types, dimension types and biomes learned from the server
//! - **Signing**: chat signature verification and seen-message acknowledgment
//! - **Handler**: the callback surface decoded events are delivered to
//!
//! ## States
//! ```text
//! Login ──► Configuration ⇄ Play      (1.20.2+)
//! Login ──► Play                      (before 1.20.2)
//! ```

pub mod chat;
pub mod dispatcher;
pub mod handler;
pub mod login;
pub mod messaging;
pub mod palette;
pub mod play;
pub mod records;
pub mod registry;
pub mod signing;
pub mod state;
pub mod version;

pub use chat::{ChatKind, ChatMessage, TextComponent, Translations};
pub use dispatcher::{ClientInformation, ClientProtocol, PacketWriter, SessionService, Transition};
pub use handler::{DisconnectReason, Handler, NoopHandler};
pub use palette::{PacketTypePalette, PaletteTable, PlayPacketIn, PlayPacketOut};
pub use registry::{Dimension, Registries};
pub use signing::{MessageSigner, PlayerPublicKey, SigningState};
pub use state::ConnectionState;
pub use version::{wire_profile, WireProfile};
