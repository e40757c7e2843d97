use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::config::DEFAULT_MAX_MEMORY;
use crate::utils::now_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerEntry {
    pub name: String,
    pub url: String,
}

/// One participant of an observer group.
///
/// `original_name` is the identity the model uses to speak as this member and must be
/// unique within the group. `group_nickname` is display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub id: String,
    pub original_name: String,
    pub group_nickname: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub avatar_frame: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub group_title: String,
}

impl GroupMember {
    pub fn can_moderate(&self) -> bool {
        self.is_owner || self.is_admin
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    /// History window replayed to the model.
    #[serde(default = "default_max_memory")]
    pub max_memory: usize,
    #[serde(default)]
    pub sticker_library: Vec<StickerEntry>,
    #[serde(default)]
    pub linked_world_book_ids: Vec<String>,
    #[serde(default)]
    pub linked_memories: Vec<String>,
    #[serde(default)]
    pub group_announcement: String,
    #[serde(default)]
    pub group_avatar: String,
    #[serde(default)]
    pub background: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub custom_css: String,
}

fn default_max_memory() -> usize {
    DEFAULT_MAX_MEMORY
}

fn default_theme() -> String {
    "default".to_string()
}

fn default_font_size() -> u32 {
    13
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            max_memory: DEFAULT_MAX_MEMORY,
            sticker_library: Vec::new(),
            linked_world_book_ids: Vec::new(),
            linked_memories: Vec::new(),
            group_announcement: String::new(),
            group_avatar: String::new(),
            background: String::new(),
            theme: default_theme(),
            font_size: default_font_size(),
            custom_css: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObserverPhase {
    Idle,
    Generating,
}

/// Persisted mirror of the group's generation state, read back by the UI on reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverState {
    #[serde(default)]
    pub is_generating: bool,
}

impl ObserverState {
    pub fn phase(&self) -> ObserverPhase {
        if self.is_generating {
            ObserverPhase::Generating
        } else {
            ObserverPhase::Idle
        }
    }
}

/// Older clients wrote `undefined` bodies (omitted) or `null`; both load as empty text.
fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    Sticker {
        #[serde(default, deserialize_with = "string_or_default")]
        sticker_name: String,
        #[serde(default, deserialize_with = "string_or_default")]
        sticker_url: String,
    },
    #[serde(rename_all = "camelCase")]
    AiImage {
        #[serde(default, deserialize_with = "string_or_default")]
        description: String,
        /// Filled in later by the image collaborator.
        #[serde(default, deserialize_with = "string_or_default")]
        image_url: String,
    },
    VoiceMessage {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    QuoteReply {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
        #[serde(default)]
        quoted_timestamp: Option<u64>,
    },
    System {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
    },
    Narrative {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
    },
    ShareCard {
        #[serde(default, deserialize_with = "string_or_default")]
        content: String,
    },
    /// Any message type this engine does not know (red packets, transfers, ...).
    /// Loads without a body and saves back as `unsupported`.
    #[serde(other)]
    Unsupported,
}

impl MessageKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageKind::Text { .. } => "text",
            MessageKind::Sticker { .. } => "sticker",
            MessageKind::AiImage { .. } => "ai_image",
            MessageKind::VoiceMessage { .. } => "voice_message",
            MessageKind::QuoteReply { .. } => "quote_reply",
            MessageKind::System { .. } => "system",
            MessageKind::Narrative { .. } => "narrative",
            MessageKind::ShareCard { .. } => "share_card",
            MessageKind::Unsupported => "unsupported",
        }
    }

    /// Best textual stand-in for the message body.
    pub fn display_text(&self) -> &str {
        match self {
            MessageKind::Text { content }
            | MessageKind::VoiceMessage { content }
            | MessageKind::QuoteReply { content, .. }
            | MessageKind::System { content }
            | MessageKind::Narrative { content }
            | MessageKind::ShareCard { content } => content,
            MessageKind::Sticker { sticker_name, .. } => sticker_name,
            MessageKind::AiImage { description, .. } => description,
            MessageKind::Unsupported => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub timestamp: u64,
    #[serde(default)]
    pub is_ai: bool,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(flatten)]
    pub kind: MessageKind,
}

fn default_role() -> String {
    "assistant".to_string()
}

fn new_message_id() -> String {
    format!("msg_{}", Uuid::new_v4())
}

impl GroupMessage {
    /// A model-authored message spoken by `member`.
    pub fn from_member(member: &GroupMember, kind: MessageKind) -> Self {
        Self {
            id: new_message_id(),
            role: "assistant".to_string(),
            sender_name: Some(member.original_name.clone()),
            sender_id: Some(member.id.clone()),
            timestamp: now_millis().unwrap_or(0),
            is_ai: true,
            is_hidden: false,
            kind,
        }
    }

    /// A control message generated by the engine itself.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role: "system".to_string(),
            sender_name: None,
            sender_id: None,
            timestamp: now_millis().unwrap_or(0),
            is_ai: false,
            is_hidden: false,
            kind: MessageKind::System {
                content: content.into(),
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObserverGroup {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub is_group: bool,
    #[serde(default)]
    pub is_observer_group: bool,
    #[serde(default)]
    pub user_knows_members: bool,
    #[serde(default)]
    pub initial_scene: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub members: Vec<GroupMember>,
    #[serde(default)]
    pub settings: GroupSettings,
    #[serde(default)]
    pub observer_state: ObserverState,
    #[serde(default)]
    pub history: Vec<GroupMessage>,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

fn default_true() -> bool {
    true
}

impl ObserverGroup {
    pub fn new(id: impl Into<String>, name: impl Into<String>, members: Vec<GroupMember>) -> Self {
        let now = now_millis().unwrap_or(0);
        Self {
            id: id.into(),
            name: name.into(),
            is_group: true,
            is_observer_group: true,
            user_knows_members: false,
            initial_scene: String::new(),
            owner_id: None,
            members,
            settings: GroupSettings::default(),
            observer_state: ObserverState::default(),
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member_by_original_name(&self, name: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.original_name == name)
    }

    pub fn has_ai_messages(&self) -> bool {
        self.history.iter().any(|m| m.is_ai)
    }
}
