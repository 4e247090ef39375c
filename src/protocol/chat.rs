//! # Chat Text
//!
//! Text components and their plain-text rendering.
//!
//! Components arrive as JSON strings before 1.20.3 and as NBT afterwards.
//! Both are normalised to a [`serde_json::Value`] so the renderer only walks
//! one shape. Rendering drops colours and styles; `translate` keys are resolved
//! through a [`Translations`] table with `%s`, `%d` and `%1$s` interpolation.

use crate::core::codec::PacketReader;
use crate::core::nbt::{self, NbtCompound, NbtTag};
use crate::error::{ProtocolError, Result};
use crate::protocol::version::WireProfile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A chat component in its structured form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextComponent(pub Value);

impl TextComponent {
    /// A component holding only literal text
    pub fn plain(text: impl Into<String>) -> Self {
        Self(Value::String(text.into()))
    }

    /// Read a component in the wire form used by `profile`
    pub fn read(reader: &mut PacketReader<'_>, profile: &dyn WireProfile) -> Result<Self> {
        if profile.chat_as_nbt() {
            let root = nbt::read_nbt(reader, profile.anonymous_nbt())?;
            Ok(Self::from_nbt(&root))
        } else {
            let json = reader.read_string()?;
            Ok(Self::from_json_str(&json))
        }
    }

    /// Parse a JSON component; text that is not JSON is kept as a literal
    pub fn from_json_str(json: &str) -> Self {
        match serde_json::from_str::<Value>(json) {
            Ok(value) => Self(value),
            Err(_) => Self::plain(json),
        }
    }

    /// Convert an NBT component. A bare string root becomes a string value.
    pub fn from_nbt(root: &NbtCompound) -> Self {
        if root.len() == 1 {
            if let Some(NbtTag::String(text)) = root.get("") {
                return Self::plain(text.clone());
            }
        }
        Self(compound_to_json(root))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    /// Render without formatting codes using the built-in translations
    pub fn to_plain(&self) -> String {
        Translations::default().render(self)
    }

    /// `open_url` targets of click events, in document order
    pub fn links(&self) -> Vec<String> {
        let mut links = Vec::new();
        collect_links(&self.0, &mut links);
        links
    }
}

impl fmt::Display for TextComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain())
    }
}

fn compound_to_json(compound: &NbtCompound) -> Value {
    let map: Map<String, Value> = compound
        .iter()
        .map(|(name, tag)| (name.clone(), tag_to_json(tag)))
        .collect();
    Value::Object(map)
}

fn tag_to_json(tag: &NbtTag) -> Value {
    match tag {
        NbtTag::Byte(v) => Value::from(*v),
        NbtTag::Short(v) => Value::from(*v),
        NbtTag::Int(v) => Value::from(*v),
        NbtTag::Long(v) => Value::from(*v),
        NbtTag::Float(v) => Value::from(f64::from(*v)),
        NbtTag::Double(v) => Value::from(*v),
        NbtTag::ByteArray(v) => Value::from(v.clone()),
        NbtTag::String(v) => Value::String(v.clone()),
        NbtTag::List(items) => Value::Array(items.iter().map(tag_to_json).collect()),
        NbtTag::Compound(c) => compound_to_json(c),
        NbtTag::IntArray(v) => Value::from(v.clone()),
        NbtTag::LongArray(v) => Value::from(v.clone()),
    }
}

fn collect_links(value: &Value, links: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::Object(click)) = map.get("clickEvent") {
                let is_url = click.get("action").and_then(Value::as_str) == Some("open_url");
                if let (true, Some(url)) = (is_url, click.get("value").and_then(Value::as_str)) {
                    if !url.is_empty() {
                        links.push(url.to_string());
                    }
                }
            }
            for key in ["extra", "with", "using"] {
                if let Some(child) = map.get(key) {
                    collect_links(child, links);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_links(item, links)),
        _ => {}
    }
}

/// Translation rules used to resolve `translate` components
#[derive(Debug, Clone)]
pub struct Translations {
    rules: HashMap<String, String>,
}

impl Default for Translations {
    fn default() -> Self {
        let rules = [
            ("chat.type.admin", "[%s: %s]"),
            ("chat.type.announcement", "[%s] %s"),
            ("chat.type.emote", "* %s %s"),
            ("chat.type.text", "<%s> %s"),
            ("chat.type.team.text", "%s <%s> %s"),
            ("chat.type.team.sent", "-> %s <%s> %s"),
            ("multiplayer.player.joined", "%s joined the game."),
            ("multiplayer.player.left", "%s left the game."),
            ("commands.message.display.incoming", "%s whispers to you: %s"),
            ("commands.message.display.outgoing", "You whisper to %s: %s"),
        ];
        Self {
            rules: rules
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl Translations {
    /// Built-in rules overlaid with a flat `{"key": "template"}` language file
    pub fn from_json_str(json: &str) -> Result<Self> {
        let extra: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| ProtocolError::ConfigError(format!("invalid language file: {e}")))?;
        let mut translations = Self::default();
        translations.rules.extend(extra);
        Ok(translations)
    }

    pub fn insert(&mut self, key: impl Into<String>, template: impl Into<String>) {
        self.rules.insert(key.into(), template.into());
    }

    /// Apply a rule to its arguments.
    ///
    /// Missing rules render as `[key] arg1 arg2`.
    pub fn translate(&self, key: &str, args: &[String]) -> String {
        match self.rules.get(key) {
            Some(template) => interpolate(template, args),
            None if args.is_empty() => format!("[{key}]"),
            None => format!("[{key}] {}", args.join(" ")),
        }
    }

    /// Render a component as plain text
    pub fn render(&self, component: &TextComponent) -> String {
        self.render_value(&component.0)
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            Value::Array(items) => items.iter().map(|v| self.render_value(v)).collect(),
            Value::Object(map) => {
                let extra: String = map
                    .get("extra")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().map(|v| self.render_value(v)).collect())
                    .unwrap_or_default();

                if let Some(text) = map.get("text").or_else(|| map.get("")) {
                    return self.render_value(text) + &extra;
                }

                if let Some(key) = map.get("translate").and_then(Value::as_str) {
                    let args: Vec<String> = map
                        .get("with")
                        .or_else(|| map.get("using"))
                        .and_then(Value::as_array)
                        .map(|items| items.iter().map(|v| self.render_value(v)).collect())
                        .unwrap_or_default();
                    return self.translate(key, &args) + &extra;
                }

                extra
            }
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }
}

fn interpolate(template: &str, args: &[String]) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] == '%' && i + 1 < chars.len() {
            let spec = chars[i + 1];
            if spec == 's' || spec == 'd' {
                if let Some(arg) = args.get(next) {
                    out.push_str(arg);
                    next += 1;
                    i += 2;
                    continue;
                }
            } else if let Some(digit) = spec.to_digit(10) {
                // %1$s positional form
                let positional = i + 3 < chars.len()
                    && chars[i + 2] == '$'
                    && (chars[i + 3] == 's' || chars[i + 3] == 'd');
                let arg = (digit as usize).checked_sub(1).and_then(|idx| args.get(idx));
                if let (true, Some(arg)) = (positional, arg) {
                    out.push_str(arg);
                    next += 1;
                    i += 4;
                    continue;
                }
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// How a signed chat message is framed when displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatKind {
    Chat,
    SayCommand,
    MsgCommandIncoming,
    MsgCommandOutgoing,
    TeamMsgCommandIncoming,
    TeamMsgCommandOutgoing,
    EmoteCommand,
    /// Content shown as-is, used for chat that carries no chat type
    Raw,
}

impl ChatKind {
    /// Map a chat type registry name; unknown names display like chat
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "minecraft:chat" => ChatKind::Chat,
            "minecraft:say_command" => ChatKind::SayCommand,
            "minecraft:msg_command_incoming" => ChatKind::MsgCommandIncoming,
            "minecraft:msg_command_outgoing" => ChatKind::MsgCommandOutgoing,
            "minecraft:team_msg_command_incoming" => ChatKind::TeamMsgCommandIncoming,
            "minecraft:team_msg_command_outgoing" => ChatKind::TeamMsgCommandOutgoing,
            "minecraft:emote_command" => ChatKind::EmoteCommand,
            _ => return None,
        };
        Some(kind)
    }

    fn rule(&self) -> Option<&'static str> {
        match self {
            ChatKind::Chat => Some("chat.type.text"),
            ChatKind::SayCommand => Some("chat.type.announcement"),
            ChatKind::MsgCommandIncoming => Some("commands.message.display.incoming"),
            ChatKind::MsgCommandOutgoing => Some("commands.message.display.outgoing"),
            ChatKind::TeamMsgCommandIncoming => Some("chat.type.team.text"),
            ChatKind::TeamMsgCommandOutgoing => Some("chat.type.team.sent"),
            ChatKind::EmoteCommand => Some("chat.type.emote"),
            ChatKind::Raw => None,
        }
    }
}

/// Chat type id used for messages that bypass chat type formatting
pub const RAW_CHAT_TYPE: i32 = -1;

/// A chat message received from the server, signed or not
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// Message body as signed by the sender, or the full text for system chat
    pub content: TextComponent,
    /// Server-side replacement for the signed body
    pub unsigned_content: Option<TextComponent>,
    /// Display name of the sender
    pub sender_name: TextComponent,
    /// Team name for team message kinds
    pub team_name: Option<TextComponent>,
    pub sender: Option<Uuid>,
    /// Chat type registry id, or [`RAW_CHAT_TYPE`]
    pub chat_type: i32,
    /// Milliseconds since the epoch, when the server supplied one
    pub timestamp: Option<i64>,
    pub signature: Option<Vec<u8>>,
    /// Signature checked against the sender's chat key
    pub verified: bool,
    /// System message rather than player chat
    pub system: bool,
    /// Shown in the action bar rather than the chat log
    pub overlay: bool,
}

impl ChatMessage {
    /// A system message
    pub fn system(content: TextComponent, overlay: bool) -> Self {
        Self {
            content,
            unsigned_content: None,
            sender_name: TextComponent::plain(""),
            team_name: None,
            sender: None,
            chat_type: RAW_CHAT_TYPE,
            timestamp: None,
            signature: None,
            verified: false,
            system: true,
            overlay,
        }
    }
}

/// Render a player chat message the way the vanilla client frames it.
///
/// `kind` is the chat type resolved from the connection's registry; `None`
/// for an unknown id, which is shown like ordinary chat.
pub fn render_chat_message(
    message: &ChatMessage,
    kind: Option<ChatKind>,
    translations: &Translations,
    show_modified_chat: bool,
) -> String {
    let sender = translations.render(&message.sender_name);
    let content = match (&message.unsigned_content, show_modified_chat) {
        (Some(unsigned), true) => translations.render(unsigned),
        _ => translations.render(&message.content),
    };

    let kind = if message.chat_type == RAW_CHAT_TYPE {
        ChatKind::Raw
    } else {
        kind.unwrap_or(ChatKind::Chat)
    };

    let Some(rule) = kind.rule() else {
        return content;
    };

    let args = match kind {
        ChatKind::TeamMsgCommandIncoming | ChatKind::TeamMsgCommandOutgoing => {
            let team = message
                .team_name
                .as_ref()
                .map(|t| translations.render(t))
                .unwrap_or_default();
            vec![team, sender, content]
        }
        _ => vec![sender, content],
    };
    translations.translate(rule, &args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::WriteExt;
    use crate::protocol::version::{ProfileTable, MC_1_20_2, MC_1_21};
    use bytes::BytesMut;
    use serde_json::json;

    #[test]
    fn test_render_text_and_extra() {
        let component = TextComponent(json!({
            "text": "Hello ",
            "extra": [{"text": "world", "color": "red"}, "!"]
        }));
        assert_eq!(component.to_plain(), "Hello world!");
    }

    #[test]
    fn test_render_translate_with_args() {
        let component = TextComponent(json!({
            "translate": "chat.type.text",
            "with": [{"text": "Steve"}, "hi there"]
        }));
        assert_eq!(component.to_plain(), "<Steve> hi there");
    }

    #[test]
    fn test_missing_rule_lists_arguments() {
        let translations = Translations::default();
        assert_eq!(
            translations.translate("death.attack.cactus", &["Alex".into()]),
            "[death.attack.cactus] Alex"
        );
        assert_eq!(translations.translate("gui.done", &[]), "[gui.done]");
    }

    #[test]
    fn test_positional_interpolation() {
        let args = vec!["a".to_string(), "b".to_string()];
        assert_eq!(interpolate("%2$s then %1$s", &args), "b then a");
        assert_eq!(interpolate("100%", &args), "100%");
        assert_eq!(interpolate("%s %s %s", &args), "a b %s");
    }

    #[test]
    fn test_invalid_json_kept_as_literal() {
        let component = TextComponent::from_json_str("plain words");
        assert_eq!(component.to_plain(), "plain words");
    }

    #[test]
    fn test_links_collected() {
        let component = TextComponent(json!({
            "text": "",
            "extra": [{"text": "site", "clickEvent": {"action": "open_url", "value": "https://example.org"}}]
        }));
        assert_eq!(component.links(), vec!["https://example.org".to_string()]);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_read_json_and_nbt_forms() {
        let old = ProfileTable::new(MC_1_20_2).unwrap();
        let mut buf = BytesMut::new();
        buf.put_string(r#"{"text":"json"}"#);
        let mut reader = PacketReader::new(&buf);
        assert_eq!(TextComponent::read(&mut reader, &old).unwrap().to_plain(), "json");

        let new = ProfileTable::new(MC_1_21).unwrap();
        let mut root = NbtCompound::new();
        root.insert(String::new(), NbtTag::String("nbt text".into()));
        let bytes = nbt::to_bytes(&root, true).unwrap();
        let mut reader = PacketReader::new(&bytes);
        assert_eq!(TextComponent::read(&mut reader, &new).unwrap().to_plain(), "nbt text");
    }

    #[test]
    fn test_signed_chat_rendering() {
        let translations = Translations::default();
        let mut message = ChatMessage::system(TextComponent::plain("original"), false);
        message.system = false;
        message.chat_type = 0;
        message.sender_name = TextComponent::plain("Steve");
        message.unsigned_content = Some(TextComponent::plain("filtered"));

        let chat = render_chat_message(&message, Some(ChatKind::Chat), &translations, false);
        assert_eq!(chat, "<Steve> original");

        let modified = render_chat_message(&message, Some(ChatKind::Chat), &translations, true);
        assert_eq!(modified, "<Steve> filtered");

        let unknown = render_chat_message(&message, None, &translations, false);
        assert_eq!(unknown, "<Steve> original");

        message.team_name = Some(TextComponent::plain("Red"));
        let team = render_chat_message(
            &message,
            Some(ChatKind::TeamMsgCommandOutgoing),
            &translations,
            false,
        );
        assert_eq!(team, "-> Red <Steve> original");

        message.chat_type = RAW_CHAT_TYPE;
        assert_eq!(
            render_chat_message(&message, Some(ChatKind::Chat), &translations, false),
            "original"
        );
    }
}
