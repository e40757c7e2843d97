//! Observer prompt compilation.
//!
//! Pure functions: everything external (world book entries, linked memories, reply
//! count, clock) arrives through [`PromptInputs`].

use serde::{Deserialize, Serialize};

use super::types::{GroupMessage, MessageKind, ObserverGroup};
use crate::config::DEFAULT_REPLY_COUNT;
use crate::storage_manager::world_books::{WorldBookEntry, WorldBookPosition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPrompt {
    pub system_prompt: String,
    pub history_payload: Vec<PromptMessage>,
}

#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub world_book_entries: Vec<WorldBookEntry>,
    pub linked_memories: Vec<String>,
    pub reply_count: u32,
    /// Local time rendered for the situational-awareness rule.
    pub current_time: String,
}

impl Default for PromptInputs {
    fn default() -> Self {
        Self {
            world_book_entries: Vec::new(),
            linked_memories: Vec::new(),
            reply_count: DEFAULT_REPLY_COUNT,
            current_time: String::new(),
        }
    }
}

pub fn local_time_string() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M, %A")
        .to_string()
}

const ACTION_GRAMMAR: &str = r#"# Available actions (elements of the JSON array)
- Send text: `{"type": "text", "name": "originalName", "message": "text content"}`
- Send then immediately recall: `{"type": "send_and_recall", "name": "originalName", "content": "words that vanish right after being sent"}`
- Send a sticker: `{"type": "sticker", "name": "originalName", "sticker_name": "sticker name"}`
- Send an image: `{"type": "ai_image", "name": "originalName", "description": "detailed description of the picture"}`
- Send a voice message: `{"type": "voice_message", "name": "originalName", "content": "spoken text"}`
- Quote and reply: `{"type": "quote_reply", "name": "originalName", "target_timestamp": 1700000000000, "reply_content": "reply text"}`
- Pat a member: `{"type": "pat_member", "name": "your originalName", "targetName": "originalName of the member being patted", "suffix": "(optional) suffix"}`
- Set a group title: `{"type": "set_group_title", "name": "your originalName", "targetName": "target originalName", "title": "new title"}` (owner or admins only)
- Change the group announcement: `{"type": "set_group_announcement", "name": "your originalName", "content": "new announcement..."}` (owner or admins only)"#;

const OUTPUT_EXAMPLE: &str = r#"# Standard output example
[
  {
    "type": "text",
    "name": "originalName",
    "message": "text content"
  },
  {
    "type": "sticker",
    "name": "originalName",
    "sticker_name": "sticker name"
  }
]"#;

fn world_book_section(entries: &[WorldBookEntry], position: WorldBookPosition) -> Option<String> {
    let body = entries
        .iter()
        .filter(|e| e.position == position)
        .map(|e| e.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if body.is_empty() {
        return None;
    }
    let heading = match position {
        WorldBookPosition::Top => "# World setting (top)",
        WorldBookPosition::Middle => "# World setting (middle)",
        WorldBookPosition::Bottom => "# World setting (bottom)",
    };
    Some(format!("{}\n{}", heading, body))
}

fn rule_block(reply_count: u32) -> String {
    let reply_count = if reply_count == 0 {
        DEFAULT_REPLY_COUNT
    } else {
        reply_count
    };
    format!(
        r#"# Role
You are the engine of an observer group chat. You play every member of the group and make them interact naturally.

# Pacing rules (critical)
Your reply must imitate how real people type. Never send one long block of text: split what the members say into {reply_count} short message bubbles, ideally under 30 characters each.
Speaking order is not fixed and members may interleave, for example A, B, B, A, C. Nobody has to finish before someone else speaks, and the members must actually talk to each other.

# Identity rules (highest priority)
1. You may only play the members explicitly listed under "Members and personas".
2. Observer mode: the user is not in this group and is only watching. Never write a message for the user.
3. Never play anyone who is not on the member list.
4. Output format:
   - Your reply must be a JSON array and nothing else.
   - Every element of the array must be a JSON object.
   - Every object must have a "name" field whose value is the member's originalName from the list below.
   - Objects without a "name" field are invalid and will be rejected.
5. Follow every member's persona strictly."#
    )
}

fn roster_section(group: &ObserverGroup) -> String {
    let lines = group
        .members
        .iter()
        .map(|m| {
            format!(
                "- **{}**: (nickname: {}) persona: {}",
                m.original_name, m.group_nickname, m.persona
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "# Members and personas (the name field must use the originalName in bold)\n{}",
        lines
    )
}

fn moderation_section(group: &ObserverGroup) -> String {
    let owner = group
        .owner_id
        .as_deref()
        .and_then(|id| group.members.iter().find(|m| m.id == id))
        .or_else(|| group.members.iter().find(|m| m.is_owner));

    let mut lines = vec!["# Owner and admins".to_string()];
    match owner {
        Some(owner) => lines.push(format!("- Owner: {}", owner.original_name)),
        None => lines.push("- This group has no owner".to_string()),
    }
    let admins = group
        .members
        .iter()
        .filter(|m| m.is_admin)
        .map(|m| m.original_name.as_str())
        .collect::<Vec<_>>();
    if !admins.is_empty() {
        lines.push(format!("- Admins: {}", admins.join(", ")));
    }
    lines.join("\n")
}

fn scene_section(group: &ObserverGroup) -> String {
    let scene = group.initial_scene.trim();
    if scene.is_empty() {
        "# Scene\nNo fixed scene: the members can chat about anything they find interesting."
            .to_string()
    } else {
        format!("# Scene\nCurrent scene: {}", scene)
    }
}

fn user_awareness_section(group: &ObserverGroup, linked_memories: &[String]) -> String {
    if group.user_knows_members {
        let mut out = "# About the user\nThe members know the user. The user is not here, but the members may talk about them.".to_string();
        let memories = linked_memories
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .map(|m| format!("- {}", m))
            .collect::<Vec<_>>();
        if !memories.is_empty() {
            out.push_str("\n\n# Linked memories\n");
            out.push_str(&memories.join("\n"));
        }
        out
    } else {
        "# Important\nThe members do not know the user at all and are unaware the user exists. Never mention the user.".to_string()
    }
}

fn immersion_section(current_time: &str) -> String {
    let mut out = "6. Stay in character: never reveal that you are an AI or a model, and never mention \"playing\" or \"generating\". This is an online chat: members must not keep asking to meet, and the story must never move offline.".to_string();
    if !current_time.trim().is_empty() {
        out.push_str(&format!(
            "\n7. Situational awareness: the current time is {}.",
            current_time.trim()
        ));
    }
    out
}

/// Compile the system prompt for one observer round.
pub fn build_system_prompt(group: &ObserverGroup, inputs: &PromptInputs) -> String {
    let entries = &inputs.world_book_entries;
    let mut sections: Vec<String> = Vec::new();

    if let Some(top) = world_book_section(entries, WorldBookPosition::Top) {
        sections.push(top);
    }
    sections.push(rule_block(inputs.reply_count));
    sections.push(roster_section(group));
    if let Some(middle) = world_book_section(entries, WorldBookPosition::Middle) {
        sections.push(middle);
    }
    sections.push(moderation_section(group));
    sections.push(scene_section(group));
    sections.push(user_awareness_section(group, &inputs.linked_memories));
    sections.push(immersion_section(&inputs.current_time));
    sections.push(OUTPUT_EXAMPLE.to_string());
    sections.push(ACTION_GRAMMAR.to_string());

    let announcement = group.settings.group_announcement.trim();
    if !announcement.is_empty() {
        sections.push(format!("# Group announcement\n{}", announcement));
    }

    if !group.settings.sticker_library.is_empty() {
        let names = group
            .settings
            .sticker_library
            .iter()
            .map(|s| format!("\"{}\"", s.name))
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!("# Group stickers\nAvailable sticker names: {}", names));
    }

    if let Some(bottom) = world_book_section(entries, WorldBookPosition::Bottom) {
        sections.push(bottom);
    }

    sections.push(
        "Now let the members of the group interact naturally and carry the conversation forward."
            .to_string(),
    );

    sections.join("\n\n")
}

fn is_replayable(message: &GroupMessage) -> bool {
    !message.is_hidden && !matches!(message.kind, MessageKind::ShareCard { .. })
}

/// Render one history entry as a single timestamped line.
pub fn render_history_line(message: &GroupMessage) -> String {
    match &message.kind {
        MessageKind::System { content } => format!("[System message: {}]", content),
        MessageKind::Narrative { content } => {
            format!("(Timestamp: {}) [Narration: {}]", message.timestamp, content)
        }
        kind => {
            let sender = message.sender_name.as_deref().unwrap_or("Unknown");
            let text = kind.display_text();
            let body = if text.trim().is_empty() {
                "[message]"
            } else {
                text
            };
            format!("(Timestamp: {}) {}: {}", message.timestamp, sender, body)
        }
    }
}

/// Last `maxMemory` history entries, hidden / non-replayable ones dropped, all as `user`.
pub fn build_history_payload(group: &ObserverGroup) -> Vec<PromptMessage> {
    let window = group.settings.max_memory;
    let start = group.history.len().saturating_sub(window);
    group.history[start..]
        .iter()
        .filter(|m| is_replayable(m))
        .map(|m| PromptMessage {
            role: "user".to_string(),
            content: render_history_line(m),
        })
        .collect()
}

pub fn compile_prompt(group: &ObserverGroup, inputs: &PromptInputs) -> CompiledPrompt {
    CompiledPrompt {
        system_prompt: build_system_prompt(group, inputs),
        history_payload: build_history_payload(group),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_manager::types::{GroupMember, StickerEntry};

    fn member(id: &str, name: &str, nickname: &str) -> GroupMember {
        GroupMember {
            id: id.into(),
            original_name: name.into(),
            group_nickname: nickname.into(),
            persona: format!("{} persona", name),
            avatar: String::new(),
            avatar_frame: String::new(),
            is_owner: false,
            is_admin: false,
            group_title: String::new(),
        }
    }

    fn make_group() -> ObserverGroup {
        let mut mika = member("c1", "Mika", "Mimi");
        mika.is_owner = true;
        let mut leo = member("c2", "Leo", "Lion");
        leo.is_admin = true;
        let mut group = ObserverGroup::new("g1", "Night Owls", vec![mika, leo]);
        group.owner_id = Some("c1".into());
        group
    }

    fn entry(position: WorldBookPosition, content: &str) -> WorldBookEntry {
        WorldBookEntry {
            id: format!("e-{}", content),
            world_book_id: "wb1".into(),
            position,
            content: content.into(),
            display_order: 0,
        }
    }

    fn text_message(sender: &str, content: &str, ts: u64) -> GroupMessage {
        GroupMessage {
            id: format!("m{}", ts),
            role: "assistant".into(),
            sender_name: Some(sender.into()),
            sender_id: None,
            timestamp: ts,
            is_ai: true,
            is_hidden: false,
            kind: MessageKind::Text {
                content: content.into(),
            },
        }
    }

    #[test]
    fn test_roster_uses_original_name_and_nickname() {
        let prompt = build_system_prompt(&make_group(), &PromptInputs::default());
        assert!(prompt.contains("- **Mika**: (nickname: Mimi) persona: Mika persona"));
        assert!(prompt.contains("- **Leo**: (nickname: Lion) persona: Leo persona"));
        assert!(prompt.contains("- Owner: Mika"));
        assert!(prompt.contains("- Admins: Leo"));
    }

    #[test]
    fn test_reply_count_is_injected() {
        let inputs = PromptInputs {
            reply_count: 7,
            ..PromptInputs::default()
        };
        let prompt = build_system_prompt(&make_group(), &inputs);
        assert!(prompt.contains("into 7 short message bubbles"));
    }

    #[test]
    fn test_world_book_positions_are_ordered() {
        let inputs = PromptInputs {
            world_book_entries: vec![
                entry(WorldBookPosition::Bottom, "BOTTOM-LORE"),
                entry(WorldBookPosition::Top, "TOP-LORE"),
                entry(WorldBookPosition::Middle, "MIDDLE-LORE"),
            ],
            ..PromptInputs::default()
        };
        let prompt = build_system_prompt(&make_group(), &inputs);
        let top = prompt.find("TOP-LORE").unwrap();
        let rules = prompt.find("# Pacing rules").unwrap();
        let roster = prompt.find("# Members and personas").unwrap();
        let middle = prompt.find("MIDDLE-LORE").unwrap();
        let owners = prompt.find("# Owner and admins").unwrap();
        let grammar = prompt.find("# Available actions").unwrap();
        let bottom = prompt.find("BOTTOM-LORE").unwrap();
        assert!(top < rules && rules < roster && roster < middle);
        assert!(middle < owners && owners < grammar && grammar < bottom);
    }

    #[test]
    fn test_scene_falls_back_to_free_topic() {
        let mut group = make_group();
        let prompt = build_system_prompt(&group, &PromptInputs::default());
        assert!(prompt.contains("No fixed scene"));

        group.initial_scene = "A rainy night at the cafe".into();
        let prompt = build_system_prompt(&group, &PromptInputs::default());
        assert!(prompt.contains("Current scene: A rainy night at the cafe"));
    }

    #[test]
    fn test_user_awareness_toggles_memories() {
        let mut group = make_group();
        let inputs = PromptInputs {
            linked_memories: vec!["User loves cats".into()],
            ..PromptInputs::default()
        };

        let prompt = build_system_prompt(&group, &inputs);
        assert!(prompt.contains("do not know the user"));
        assert!(!prompt.contains("User loves cats"));

        group.user_knows_members = true;
        let prompt = build_system_prompt(&group, &inputs);
        assert!(prompt.contains("The members know the user"));
        assert!(prompt.contains("- User loves cats"));
    }

    #[test]
    fn test_announcement_and_sticker_whitelist() {
        let mut group = make_group();
        group.settings.group_announcement = "No spoilers".into();
        group.settings.sticker_library = vec![
            StickerEntry {
                name: "wave".into(),
                url: "u1".into(),
            },
            StickerEntry {
                name: "cry".into(),
                url: "u2".into(),
            },
        ];
        let prompt = build_system_prompt(&group, &PromptInputs::default());
        assert!(prompt.contains("# Group announcement\nNo spoilers"));
        assert!(prompt.contains("Available sticker names: \"wave\", \"cry\""));
    }

    #[test]
    fn test_owner_falls_back_to_flag_and_none() {
        let mut group = make_group();
        group.owner_id = None;
        assert!(build_system_prompt(&group, &PromptInputs::default()).contains("- Owner: Mika"));

        for m in group.members.iter_mut() {
            m.is_owner = false;
        }
        assert!(build_system_prompt(&group, &PromptInputs::default())
            .contains("This group has no owner"));
    }

    #[test]
    fn test_history_window_and_filters() {
        let mut group = make_group();
        group.settings.max_memory = 3;
        group.history.push(text_message("Mika", "too old", 1));
        group.history.push(GroupMessage::system("Mika patted Leo"));
        let mut hidden = text_message("Leo", "secret", 3);
        hidden.is_hidden = true;
        group.history.push(hidden);
        group.history.push(text_message("Leo", "hello", 4));

        let payload = build_history_payload(&group);
        assert_eq!(payload.len(), 2);
        assert!(payload.iter().all(|m| m.role == "user"));
        assert_eq!(payload[0].content, "[System message: Mika patted Leo]");
        assert_eq!(payload[1].content, "(Timestamp: 4) Leo: hello");
    }

    #[test]
    fn test_history_line_variants() {
        let mut sticker = text_message("Mika", "", 9);
        sticker.kind = MessageKind::Sticker {
            sticker_name: "wave".into(),
            sticker_url: "u".into(),
        };
        assert_eq!(render_history_line(&sticker), "(Timestamp: 9) Mika: wave");

        let mut image = text_message("Leo", "", 12);
        image.kind = MessageKind::AiImage {
            description: "a latte with a heart".into(),
            image_url: String::new(),
        };
        assert_eq!(
            render_history_line(&image),
            "(Timestamp: 12) Leo: a latte with a heart"
        );

        let mut quote = text_message("Leo", "", 13);
        quote.kind = MessageKind::QuoteReply {
            content: "agreed".into(),
            quoted_timestamp: Some(9),
        };
        assert_eq!(render_history_line(&quote), "(Timestamp: 13) Leo: agreed");

        let mut narration = text_message("Mika", "", 10);
        narration.kind = MessageKind::Narrative {
            content: "Rain starts".into(),
        };
        assert_eq!(
            render_history_line(&narration),
            "(Timestamp: 10) [Narration: Rain starts]"
        );

        let mut anonymous = text_message("x", "", 11);
        anonymous.sender_name = None;
        assert_eq!(render_history_line(&anonymous), "(Timestamp: 11) Unknown: [message]");
    }

    #[test]
    fn test_share_cards_are_not_replayed() {
        let mut group = make_group();
        let mut card = text_message("Mika", "", 5);
        card.kind = MessageKind::ShareCard {
            content: "card".into(),
        };
        group.history.push(card);
        assert!(build_history_payload(&group).is_empty());
    }
}
