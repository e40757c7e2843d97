use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat_manager::types::{GroupMember, GroupMessage, ObserverGroup};
use crate::error::ObserverError;
use crate::utils::log_info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Character,
    Npc,
}

/// A contact picked for a new group: either a full character or an NPC from some
/// character's NPC library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub avatar_frame: String,
    pub kind: ContactKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupOptions {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub admin_ids: Vec<String>,
    #[serde(default)]
    pub user_knows_members: bool,
    #[serde(default)]
    pub initial_scene: String,
}

fn member_from_contact(contact: &ContactRecord) -> GroupMember {
    GroupMember {
        id: contact.id.clone(),
        original_name: contact.name.clone(),
        group_nickname: contact.name.clone(),
        persona: contact.persona.clone(),
        avatar: contact.avatar.clone(),
        // NPCs have no frame of their own
        avatar_frame: match contact.kind {
            ContactKind::Character => contact.avatar_frame.clone(),
            ContactKind::Npc => String::new(),
        },
        is_owner: false,
        is_admin: false,
        group_title: String::new(),
    }
}

/// Build members in contact order, then flag owner and admins by id.
pub fn build_members(
    contacts: &[ContactRecord],
    options: &CreateGroupOptions,
) -> Result<Vec<GroupMember>, ObserverError> {
    let mut members: Vec<GroupMember> = contacts.iter().map(member_from_contact).collect();
    validate_roster(&members)?;

    if let Some(owner_id) = options.owner_id.as_deref() {
        if let Some(owner) = members.iter_mut().find(|m| m.id == owner_id) {
            owner.is_owner = true;
        }
    }
    for admin_id in &options.admin_ids {
        if let Some(admin) = members.iter_mut().find(|m| &m.id == admin_id) {
            admin.is_admin = true;
        }
    }
    Ok(members)
}

/// `originalName` is the speaker key the model answers with, so it must be unique.
pub fn validate_roster(members: &[GroupMember]) -> Result<(), ObserverError> {
    if members.is_empty() {
        return Err(ObserverError::InvalidRoster(
            "an observer group needs at least one member".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for member in members {
        if member.original_name.trim().is_empty() {
            return Err(ObserverError::InvalidRoster(format!(
                "member {} has no name",
                member.id
            )));
        }
        if !seen.insert(member.original_name.as_str()) {
            return Err(ObserverError::InvalidRoster(format!(
                "duplicate member name \"{}\"",
                member.original_name
            )));
        }
    }
    Ok(())
}

fn creation_notice(members: &[GroupMember], owner: Option<&GroupMember>, scene: &str) -> String {
    let names = members
        .iter()
        .map(|m| format!("\"{}\"", m.group_nickname))
        .collect::<Vec<_>>()
        .join(", ");
    let mut notice = format!("Observer group created, members: {}.", names);
    if let Some(owner) = owner {
        notice.push_str(&format!("\nOwner: {}", owner.group_nickname));
    }
    if !scene.trim().is_empty() {
        notice.push_str(&format!("\nScene: {}", scene));
    }
    notice
}

/// Assemble a new observer group with its creation notice as the first history entry.
///
/// The caller persists the returned group.
pub fn create_observer_group(
    name: &str,
    contacts: &[ContactRecord],
    options: &CreateGroupOptions,
) -> Result<ObserverGroup, ObserverError> {
    let members = build_members(contacts, options)?;
    let owner_id = options
        .owner_id
        .as_ref()
        .filter(|id| members.iter().any(|m| &m.id == *id))
        .cloned();

    let mut group = ObserverGroup::new(
        format!("observer_group_{}", Uuid::new_v4()),
        name,
        members,
    );
    group.owner_id = owner_id;
    group.user_knows_members = options.user_knows_members;
    group.initial_scene = options.initial_scene.clone();

    let owner = group
        .owner_id
        .as_deref()
        .and_then(|id| group.members.iter().find(|m| m.id == id));
    let notice = creation_notice(&group.members, owner, &group.initial_scene);
    group.history.push(GroupMessage::system(notice));

    log_info(
        "observer_roster",
        format!(
            "created observer group {} with {} members",
            group.id,
            group.members.len()
        ),
    );
    Ok(group)
}
