//! Decoding of the model's reply into observer actions.
//!
//! The reply is expected to be a JSON array of action objects, possibly wrapped in a
//! markdown fence or surrounded by prose. Elements are decoded leniently: every field is
//! optional and shape problems are left to the dispatcher, which rejects per action.

use serde_json::Value;

use crate::error::ObserverError;

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverAction {
    Text {
        name: Option<String>,
        message: Option<String>,
        /// Older replies put the text here instead of `message`.
        content: Option<String>,
    },
    Sticker {
        name: Option<String>,
        sticker_name: Option<String>,
    },
    AiImage {
        name: Option<String>,
        description: Option<String>,
    },
    VoiceMessage {
        name: Option<String>,
        content: Option<String>,
    },
    SendAndRecall {
        name: Option<String>,
        content: Option<String>,
    },
    QuoteReply {
        name: Option<String>,
        target_timestamp: Option<u64>,
        reply_content: Option<String>,
    },
    PatMember {
        name: Option<String>,
        target_name: Option<String>,
        suffix: Option<String>,
    },
    SetGroupTitle {
        name: Option<String>,
        target_name: Option<String>,
        title: Option<String>,
    },
    SetGroupAnnouncement {
        name: Option<String>,
        content: Option<String>,
    },
    Unrecognized {
        action_type: String,
        raw: Value,
    },
}

impl ObserverAction {
    pub fn type_name(&self) -> &str {
        match self {
            ObserverAction::Text { .. } => "text",
            ObserverAction::Sticker { .. } => "sticker",
            ObserverAction::AiImage { .. } => "ai_image",
            ObserverAction::VoiceMessage { .. } => "voice_message",
            ObserverAction::SendAndRecall { .. } => "send_and_recall",
            ObserverAction::QuoteReply { .. } => "quote_reply",
            ObserverAction::PatMember { .. } => "pat_member",
            ObserverAction::SetGroupTitle { .. } => "set_group_title",
            ObserverAction::SetGroupAnnouncement { .. } => "set_group_announcement",
            ObserverAction::Unrecognized { action_type, .. } => action_type,
        }
    }

    /// `originalName` of the member the model wants to act as, if non-blank.
    pub fn actor_name(&self) -> Option<&str> {
        let name = match self {
            ObserverAction::Text { name, .. }
            | ObserverAction::Sticker { name, .. }
            | ObserverAction::AiImage { name, .. }
            | ObserverAction::VoiceMessage { name, .. }
            | ObserverAction::SendAndRecall { name, .. }
            | ObserverAction::QuoteReply { name, .. }
            | ObserverAction::PatMember { name, .. }
            | ObserverAction::SetGroupTitle { name, .. }
            | ObserverAction::SetGroupAnnouncement { name, .. } => name.as_deref(),
            ObserverAction::Unrecognized { raw, .. } => raw.get("name").and_then(Value::as_str),
        };
        name.filter(|n| !n.trim().is_empty())
    }
}

/// Read a field as text. Numbers and booleans are stringified, anything else is absent.
fn text_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Millisecond timestamp given either as a JSON number or a numeric string.
fn timestamp_field(obj: &Value, key: &str) -> Option<u64> {
    match obj.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

pub fn decode_action(raw: Value) -> ObserverAction {
    let action_type = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let name = text_field(&raw, "name");

    match action_type.as_str() {
        "text" => ObserverAction::Text {
            name,
            message: text_field(&raw, "message"),
            content: text_field(&raw, "content"),
        },
        "sticker" => ObserverAction::Sticker {
            name,
            sticker_name: text_field(&raw, "sticker_name"),
        },
        "ai_image" => ObserverAction::AiImage {
            name,
            description: text_field(&raw, "description"),
        },
        "voice_message" => ObserverAction::VoiceMessage {
            name,
            content: text_field(&raw, "content"),
        },
        "send_and_recall" => ObserverAction::SendAndRecall {
            name,
            content: text_field(&raw, "content"),
        },
        "quote_reply" => ObserverAction::QuoteReply {
            name,
            target_timestamp: timestamp_field(&raw, "target_timestamp"),
            reply_content: text_field(&raw, "reply_content"),
        },
        "pat_member" => ObserverAction::PatMember {
            name,
            target_name: text_field(&raw, "targetName"),
            suffix: text_field(&raw, "suffix"),
        },
        "set_group_title" => ObserverAction::SetGroupTitle {
            name,
            target_name: text_field(&raw, "targetName"),
            title: text_field(&raw, "title"),
        },
        "set_group_announcement" => ObserverAction::SetGroupAnnouncement {
            name,
            content: text_field(&raw, "content"),
        },
        _ => ObserverAction::Unrecognized { action_type, raw },
    }
}

/// Remove a leading ```` ```json ```` / ```` ``` ```` fence and a trailing ```` ``` ````.
fn strip_code_fence(reply: &str) -> &str {
    let mut text = reply.trim_start();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    let text = text.trim_end();
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Narrow the text to the outermost `[...]` span when one exists.
fn slice_json_array(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

pub fn parse_actions(reply: &str) -> Result<Vec<ObserverAction>, ObserverError> {
    let candidate = slice_json_array(strip_code_fence(reply));
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| ObserverError::Format(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items.into_iter().map(decode_action).collect()),
        other => Err(ObserverError::Format(format!(
            "expected a JSON array of actions, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
