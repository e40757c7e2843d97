use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;

use super::actions::ObserverAction;
use crate::abort_manager::GenerationFlag;
use crate::chat_manager::types::{GroupMember, GroupMessage, MessageKind, ObserverGroup};
use crate::config::{DEFAULT_PACING_MS, DEFAULT_RECALL_DELAY_MS};
use crate::error::ObserverError;
use crate::storage_manager::GroupStore;
use crate::transport::RenderSink;
use crate::utils::{log_debug, log_info, log_warn, now_millis};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ActionOutcome {
    Applied,
    Rejected { reason: String },
    /// Not attempted because generation was paused first.
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    /// One entry per parsed action, in reply order.
    pub outcomes: Vec<ActionOutcome>,
    pub interrupted: bool,
}

impl DispatchReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ActionOutcome::Applied))
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ActionOutcome::Rejected { .. }))
            .count()
    }
}

fn reject(reason: impl Into<String>) -> ActionOutcome {
    ActionOutcome::Rejected {
        reason: reason.into(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Applies parsed actions to a group one at a time.
///
/// Every appended message is persisted before it is rendered. The generation flag is
/// checked before each action, after the pacing delay, so a pause never cuts an action
/// in half.
pub struct ActionDispatcher {
    store: Arc<dyn GroupStore>,
    sink: Arc<dyn RenderSink>,
    flag: Arc<GenerationFlag>,
    displayed_group_id: Option<String>,
    pacing: Duration,
    recall_delay: Duration,
}

impl ActionDispatcher {
    pub fn new(
        store: Arc<dyn GroupStore>,
        sink: Arc<dyn RenderSink>,
        flag: Arc<GenerationFlag>,
    ) -> Self {
        Self {
            store,
            sink,
            flag,
            displayed_group_id: None,
            pacing: Duration::from_millis(DEFAULT_PACING_MS),
            recall_delay: Duration::from_millis(DEFAULT_RECALL_DELAY_MS),
        }
    }

    /// Group currently on screen; only its messages reach the render sink.
    pub fn displayed_group(mut self, group_id: Option<&str>) -> Self {
        self.displayed_group_id = group_id.map(str::to_string);
        self
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn recall_delay(mut self, delay: Duration) -> Self {
        self.recall_delay = delay;
        self
    }

    pub async fn apply(
        &self,
        group: &mut ObserverGroup,
        actions: Vec<ObserverAction>,
    ) -> Result<DispatchReport, ObserverError> {
        let total = actions.len();
        let mut report = DispatchReport::default();

        for (index, action) in actions.into_iter().enumerate() {
            if index > 0 && !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
            if !self.flag.is_generating() {
                log_info(
                    "observer_dispatch",
                    format!(
                        "group {} paused, skipping {} remaining actions",
                        group.id,
                        total - index
                    ),
                );
                report.interrupted = true;
                report.outcomes.resize(total, ActionOutcome::Skipped);
                break;
            }

            let outcome = self.apply_one(group, action).await?;
            if let ActionOutcome::Rejected { reason } = &outcome {
                log_warn(
                    "observer_dispatch",
                    format!("group {} action {} rejected: {}", group.id, index, reason),
                );
            }
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn apply_one(
        &self,
        group: &mut ObserverGroup,
        action: ObserverAction,
    ) -> Result<ActionOutcome, ObserverError> {
        let Some(name) = action.actor_name() else {
            return Ok(reject(format!(
                "{} action has no member name",
                action.type_name()
            )));
        };
        let Some(actor) = group.member_by_original_name(name).cloned() else {
            return Ok(reject(format!("\"{}\" is not a member of this group", name)));
        };
        log_debug(
            "observer_dispatch",
            format!("{} -> {}", actor.original_name, action.type_name()),
        );

        match action {
            ObserverAction::Text {
                message, content, ..
            } => {
                let Some(body) = non_blank(message).or_else(|| non_blank(content)) else {
                    return Ok(reject("text action has no content"));
                };
                let kind = MessageKind::Text { content: body };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
            }
            ObserverAction::Sticker { sticker_name, .. } => {
                let requested = sticker_name.unwrap_or_default();
                let Some(sticker) = group
                    .settings
                    .sticker_library
                    .iter()
                    .find(|s| s.name == requested)
                    .cloned()
                else {
                    return Ok(reject(format!(
                        "sticker \"{}\" is not in the group library",
                        requested
                    )));
                };
                let kind = MessageKind::Sticker {
                    sticker_name: sticker.name,
                    sticker_url: sticker.url,
                };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
            }
            ObserverAction::AiImage { description, .. } => {
                let kind = MessageKind::AiImage {
                    description: description.unwrap_or_default(),
                    image_url: String::new(),
                };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
            }
            ObserverAction::VoiceMessage { content, .. } => {
                let kind = MessageKind::VoiceMessage {
                    content: content.unwrap_or_default(),
                };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
            }
            ObserverAction::SendAndRecall { content, .. } => {
                let kind = MessageKind::Text {
                    content: content.unwrap_or_default(),
                };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
                if !self.recall_delay.is_zero() {
                    sleep(self.recall_delay).await;
                }
                // the original stays in history; the notice is narrative only
                let notice = format!("{} recalled a message", actor.group_nickname);
                self.append(group, GroupMessage::system(notice))?;
            }
            ObserverAction::QuoteReply {
                target_timestamp,
                reply_content,
                ..
            } => {
                let kind = MessageKind::QuoteReply {
                    content: reply_content.unwrap_or_default(),
                    quoted_timestamp: target_timestamp,
                };
                self.append(group, GroupMessage::from_member(&actor, kind))?;
            }
            ObserverAction::PatMember {
                target_name,
                suffix,
                ..
            } => {
                let Some(target) = resolve_target(group, target_name.as_deref()) else {
                    return Ok(reject(format!(
                        "pat target \"{}\" is not a member",
                        target_name.unwrap_or_default()
                    )));
                };
                let mut notice = format!("{} patted {}", actor.group_nickname, target.group_nickname);
                if let Some(suffix) = non_blank(suffix) {
                    notice.push(' ');
                    notice.push_str(&suffix);
                }
                self.append(group, GroupMessage::system(notice))?;
            }
            ObserverAction::SetGroupTitle {
                target_name, title, ..
            } => {
                if !actor.can_moderate() {
                    return Ok(reject(format!(
                        "{} is not the owner or an admin",
                        actor.original_name
                    )));
                }
                let Some(target) = resolve_target(group, target_name.as_deref()) else {
                    return Ok(reject(format!(
                        "title target \"{}\" is not a member",
                        target_name.unwrap_or_default()
                    )));
                };
                let title = title.unwrap_or_default();
                if let Some(member) = group.members.iter_mut().find(|m| m.id == target.id) {
                    member.group_title = title.clone();
                }
                let notice = format!(
                    "{} set {}'s title to \"{}\"",
                    actor.group_nickname, target.group_nickname, title
                );
                self.append(group, GroupMessage::system(notice))?;
            }
            ObserverAction::SetGroupAnnouncement { content, .. } => {
                if !actor.can_moderate() {
                    return Ok(reject(format!(
                        "{} is not the owner or an admin",
                        actor.original_name
                    )));
                }
                group.settings.group_announcement = content.unwrap_or_default();
                let notice = format!("{} updated the group announcement", actor.group_nickname);
                self.append(group, GroupMessage::system(notice))?;
            }
            ObserverAction::Unrecognized { action_type, .. } => {
                return Ok(reject(format!("unsupported action type \"{}\"", action_type)));
            }
        }

        Ok(ActionOutcome::Applied)
    }

    /// Append, persist, then render if the group is on screen.
    fn append(&self, group: &mut ObserverGroup, message: GroupMessage) -> Result<(), ObserverError> {
        group.history.push(message);
        group.updated_at = now_millis().unwrap_or(group.updated_at);
        self.store.put(group).map_err(ObserverError::Storage)?;

        if self.displayed_group_id.as_deref() == Some(group.id.as_str()) {
            if let Some(message) = group.history.last() {
                self.sink.on_message_appended(message, group);
            }
        }
        Ok(())
    }
}

fn resolve_target(group: &ObserverGroup, target_name: Option<&str>) -> Option<GroupMember> {
    target_name.and_then(|name| group.member_by_original_name(name).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort_manager::GenerationRegistry;
    use crate::chat_manager::types::StickerEntry;
    use crate::observer_group_manager::actions::parse_actions;
    use crate::observer_group_manager::test_support::{member, RecordingSink};
    use crate::storage_manager::MemoryGroupStore;

    fn group() -> ObserverGroup {
        let mut mika = member("Mika");
        mika.is_owner = true;
        let mut group = ObserverGroup::new("g1", "Cafe", vec![mika, member("Leo")]);
        group.settings.sticker_library = vec![StickerEntry {
            name: "wave".into(),
            url: "https://cdn.example.com/wave.png".into(),
        }];
        group
    }

    struct Harness {
        store: Arc<MemoryGroupStore>,
        sink: Arc<RecordingSink>,
        registry: GenerationRegistry,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(MemoryGroupStore::new()),
                sink: Arc::new(RecordingSink::default()),
                registry: GenerationRegistry::new(),
            }
        }

        fn dispatcher(&self, flag: Arc<GenerationFlag>, displayed: Option<&str>) -> ActionDispatcher {
            ActionDispatcher::new(self.store.clone(), self.sink.clone(), flag)
                .displayed_group(displayed)
                .pacing(Duration::ZERO)
                .recall_delay(Duration::ZERO)
        }
    }

    #[tokio::test]
    async fn test_mika_text_applied_leo_title_rejected() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"text\",\"name\":\"Mika\",\"message\":\"hi\"},{\"type\":\"set_group_title\",\"name\":\"Leo\",\"targetName\":\"Mika\",\"title\":\"VIP\"}]",
        )
        .unwrap();

        let report = h
            .dispatcher(guard.flag(), Some("g1"))
            .apply(&mut g, actions)
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.rejected_count(), 1);
        assert!(!report.interrupted);
        assert_eq!(g.history.len(), 1);
        assert_eq!(g.history[0].sender_name.as_deref(), Some("Mika"));
        assert!(g.history[0].is_ai);
        assert_eq!(g.members[0].group_title, "");
        assert_eq!(h.store.get("g1").unwrap().unwrap().history.len(), 1);
        assert_eq!(h.sink.appended().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_member_and_missing_name_rejected() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"text\",\"name\":\"Stranger\",\"message\":\"hi\"},{\"type\":\"text\",\"message\":\"who am i\"},{\"type\":\"dance\",\"name\":\"Leo\"}]",
        )
        .unwrap();
        let report = h
            .dispatcher(guard.flag(), Some("g1"))
            .apply(&mut g, actions)
            .await
            .unwrap();
        assert_eq!(report.rejected_count(), 3);
        assert!(g.history.is_empty());
        assert_eq!(h.store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sticker_is_rejected_and_known_sticker_resolves_url() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"sticker\",\"name\":\"Leo\",\"sticker_name\":\"dance\"},{\"type\":\"sticker\",\"name\":\"Leo\",\"sticker_name\":\"wave\"}]",
        )
        .unwrap();
        let report = h
            .dispatcher(guard.flag(), None)
            .apply(&mut g, actions)
            .await
            .unwrap();
        assert_eq!(
            report.outcomes[0],
            ActionOutcome::Rejected {
                reason: "sticker \"dance\" is not in the group library".into()
            }
        );
        assert_eq!(g.history.len(), 1);
        match &g.history[0].kind {
            MessageKind::Sticker { sticker_url, .. } => {
                assert_eq!(sticker_url, "https://cdn.example.com/wave.png")
            }
            other => panic!("unexpected kind {:?}", other),
        }
        // not the displayed group
        assert!(h.sink.appended().is_empty());
    }

    #[tokio::test]
    async fn test_send_and_recall_keeps_original() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        g.members[1].group_nickname = "Leo-kun".into();
        let actions =
            parse_actions("[{\"type\":\"send_and_recall\",\"name\":\"Leo\",\"content\":\"oops\"}]")
                .unwrap();
        h.dispatcher(guard.flag(), Some("g1"))
            .apply(&mut g, actions)
            .await
            .unwrap();

        assert_eq!(g.history.len(), 2);
        assert_eq!(g.history[0].kind.display_text(), "oops");
        assert!(g.history[0].is_ai);
        assert_eq!(g.history[1].kind.display_text(), "Leo-kun recalled a message");
        assert!(!g.history[1].is_ai);
        assert_eq!(h.store.put_count(), 2);
    }

    #[tokio::test]
    async fn test_owner_moderation_actions() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        let actions = parse_actions(
            r#"[
              {"type":"set_group_title","name":"Mika","targetName":"Leo","title":"Barista"},
              {"type":"set_group_announcement","name":"Mika","content":"Open mic tonight"},
              {"type":"set_group_announcement","name":"Leo","content":"Free coffee"},
              {"type":"pat_member","name":"Leo","targetName":"Mika","suffix":"on the head"},
              {"type":"pat_member","name":"Leo","targetName":"Nobody"}
            ]"#,
        )
        .unwrap();
        let report = h
            .dispatcher(guard.flag(), Some("g1"))
            .apply(&mut g, actions)
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 3);
        assert_eq!(g.members[1].group_title, "Barista");
        assert_eq!(g.settings.group_announcement, "Open mic tonight");
        let notices: Vec<&str> = g.history.iter().map(|m| m.kind.display_text()).collect();
        assert_eq!(
            notices,
            vec![
                "Mika set Leo's title to \"Barista\"",
                "Mika updated the group announcement",
                "Leo patted Mika on the head",
            ]
        );
        assert!(g.history.iter().all(|m| !m.is_ai));
    }

    #[tokio::test]
    async fn test_quote_reply_and_text_fallback_to_content() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let mut g = group();
        let actions = parse_actions(
            r#"[{"type":"quote_reply","name":"Leo","target_timestamp":"123","reply_content":"agreed"},
                {"type":"text","name":"Mika","content":"fallback body"},
                {"type":"text","name":"Mika","message":"   "}]"#,
        )
        .unwrap();
        let report = h
            .dispatcher(guard.flag(), None)
            .apply(&mut g, actions)
            .await
            .unwrap();
        assert_eq!(report.applied_count(), 2);
        assert_eq!(
            g.history[0].kind,
            MessageKind::QuoteReply {
                content: "agreed".into(),
                quoted_timestamp: Some(123)
            }
        );
        assert_eq!(g.history[1].kind.display_text(), "fallback body");
    }

    #[tokio::test]
    async fn test_paused_flag_skips_everything() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let flag = guard.flag();
        assert!(h.registry.pause("g1"));
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"text\",\"name\":\"Mika\",\"message\":\"a\"},{\"type\":\"text\",\"name\":\"Leo\",\"message\":\"b\"}]",
        )
        .unwrap();
        let report = h.dispatcher(flag, Some("g1")).apply(&mut g, actions).await.unwrap();
        assert!(report.interrupted);
        assert_eq!(report.outcomes, vec![ActionOutcome::Skipped, ActionOutcome::Skipped]);
        assert!(g.history.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_pacing_sleep_skips_rest() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let dispatcher = ActionDispatcher::new(h.store.clone(), h.sink.clone(), guard.flag())
            .displayed_group(Some("g1"));
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"text\",\"name\":\"Mika\",\"message\":\"a\"},{\"type\":\"text\",\"name\":\"Leo\",\"message\":\"b\"}]",
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let (report, _) = tokio::join!(dispatcher.apply(&mut g, actions), async {
            sleep(Duration::from_millis(100)).await;
            assert!(h.registry.pause("g1"));
        });
        let report = report.unwrap();
        let elapsed = started.elapsed();

        assert!(report.interrupted);
        assert_eq!(report.outcomes, vec![ActionOutcome::Applied, ActionOutcome::Skipped]);
        assert_eq!(g.history.len(), 1);
        assert_eq!(g.history[0].kind.display_text(), "a");
        assert_eq!(h.store.get("g1").unwrap().unwrap().history.len(), 1);
        assert!(elapsed >= Duration::from_millis(DEFAULT_PACING_MS));
        assert!(elapsed < Duration::from_millis(2 * DEFAULT_PACING_MS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_delays_space_out_actions() {
        let h = Harness::new();
        let guard = h.registry.try_begin("g1").unwrap();
        let dispatcher = ActionDispatcher::new(h.store.clone(), h.sink.clone(), guard.flag());
        let mut g = group();
        let actions = parse_actions(
            "[{\"type\":\"send_and_recall\",\"name\":\"Leo\",\"content\":\"oops\"},{\"type\":\"text\",\"name\":\"Mika\",\"message\":\"saw that\"}]",
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        let report = dispatcher.apply(&mut g, actions).await.unwrap();

        assert_eq!(report.applied_count(), 2);
        assert_eq!(g.history.len(), 3);
        assert!(
            started.elapsed()
                >= Duration::from_millis(DEFAULT_RECALL_DELAY_MS + DEFAULT_PACING_MS)
        );
    }

    #[tokio::test]
    async fn test_dispatched_text_reloads_from_sqlite_store() {
        let pool = crate::storage_manager::db::open_in_memory().unwrap();
        let store = Arc::new(crate::storage_manager::SqliteGroupStore::new(pool));
        let registry = GenerationRegistry::new();
        let guard = registry.try_begin("g1").unwrap();
        let dispatcher = ActionDispatcher::new(
            store.clone(),
            Arc::new(RecordingSink::default()),
            guard.flag(),
        )
        .pacing(Duration::ZERO);
        let mut g = group();
        let actions =
            parse_actions("[{\"type\":\"text\",\"name\":\"Mika\",\"message\":\"hi\"}]")
                .unwrap();

        dispatcher.apply(&mut g, actions).await.unwrap();

        let reloaded = store.get("g1").unwrap().unwrap();
        assert_eq!(reloaded.history.len(), 1);
        let message = &reloaded.history[0];
        assert_eq!(message.sender_name.as_deref(), Some("Mika"));
        assert_eq!(message.kind.display_text(), "hi");
        assert_eq!(message.kind.type_name(), "text");
        assert!(message.is_ai);
    }
}
