//! Observer Group Manager
//!
//! Runs "observer" group chats: every member is played by the model and the user only
//! watches. One round is compile prompt, call the backend, parse the action array, then
//! dispatch the actions with pacing. Rounds are single-writer per group through the
//! [`GenerationRegistry`].

pub mod actions;
pub mod dispatcher;
pub mod roster;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::abort_manager::{GenerationFlag, GenerationRegistry};
use crate::chat_manager::gateway::{ChatBackend, HttpChatBackend};
use crate::chat_manager::prompt_engine::{compile_prompt, local_time_string, PromptInputs};
use crate::chat_manager::types::{GroupMessage, ObserverGroup};
use crate::config::ObserverSettings;
use crate::error::ObserverError;
use crate::storage_manager::db::DbPool;
use crate::storage_manager::{GroupStore, SqliteGroupStore, SqliteWorldBookSource, WorldBookSource};
use crate::transport::RenderSink;
use crate::utils::{log_debug, log_error, log_info, now_millis};

pub use actions::{parse_actions, ObserverAction};
pub use dispatcher::{ActionDispatcher, ActionOutcome, DispatchReport};
pub use roster::{create_observer_group, ContactKind, ContactRecord, CreateGroupOptions};

// ============================================================================
// Types
// ============================================================================

/// Which observer controls are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonState {
    pub can_start: bool,
    pub can_pause: bool,
    pub can_continue: bool,
    pub can_resay: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    Completed(DispatchReport),
    NotObserverGroup,
    NothingToResay,
}

/// While generating only pause is available. Resay needs an AI message somewhere in
/// history, not necessarily at the tail.
pub fn button_state(group: &ObserverGroup) -> ButtonState {
    if group.observer_state.is_generating {
        ButtonState {
            can_start: false,
            can_pause: true,
            can_continue: false,
            can_resay: false,
        }
    } else {
        ButtonState {
            can_start: true,
            can_pause: false,
            can_continue: true,
            can_resay: group.has_ai_messages(),
        }
    }
}

/// Length of the trailing run of model-authored messages.
pub fn trailing_ai_run(history: &[GroupMessage]) -> usize {
    history.iter().rev().take_while(|m| m.is_ai).count()
}

// ============================================================================
// Controller
// ============================================================================

pub struct ObserverController {
    store: Arc<dyn GroupStore>,
    backend: Arc<dyn ChatBackend>,
    world_books: Arc<dyn WorldBookSource>,
    sink: Arc<dyn RenderSink>,
    registry: GenerationRegistry,
    settings: ObserverSettings,
}

impl ObserverController {
    pub fn new(
        store: Arc<dyn GroupStore>,
        backend: Arc<dyn ChatBackend>,
        world_books: Arc<dyn WorldBookSource>,
        sink: Arc<dyn RenderSink>,
        settings: ObserverSettings,
    ) -> Self {
        Self {
            store,
            backend,
            world_books,
            sink,
            registry: GenerationRegistry::new(),
            settings,
        }
    }

    /// SQLite-backed store and lore, HTTP backend.
    pub fn with_sqlite(
        pool: DbPool,
        sink: Arc<dyn RenderSink>,
        settings: ObserverSettings,
    ) -> Result<Self, ObserverError> {
        let backend = HttpChatBackend::new(settings.request_timeout_ms)?;
        Ok(Self::new(
            Arc::new(SqliteGroupStore::new(pool.clone())),
            Arc::new(backend),
            Arc::new(SqliteWorldBookSource::new(pool)),
            sink,
            settings,
        ))
    }

    pub fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    pub fn registry(&self) -> &GenerationRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn GroupStore> {
        &self.store
    }

    fn load(&self, group_id: &str) -> Result<ObserverGroup, ObserverError> {
        self.store
            .get(group_id)
            .map_err(ObserverError::Storage)?
            .ok_or_else(|| ObserverError::GroupNotFound(group_id.to_string()))
    }

    fn persist(&self, group: &mut ObserverGroup) -> Result<(), ObserverError> {
        group.updated_at = now_millis().unwrap_or(group.updated_at);
        self.store.put(group).map_err(ObserverError::Storage)
    }

    /// Persist a freshly created group.
    pub fn register_group(&self, group: &ObserverGroup) -> Result<(), ObserverError> {
        self.store.put(group).map_err(ObserverError::Storage)
    }

    pub fn button_state(&self, group_id: &str) -> Result<ButtonState, ObserverError> {
        Ok(button_state(&self.load(group_id)?))
    }

    /// Run one round for `group_id`.
    ///
    /// `displayed_group_id` is the group currently on screen; messages of other groups
    /// are persisted but not rendered.
    pub async fn start(
        &self,
        group_id: &str,
        displayed_group_id: Option<&str>,
    ) -> Result<RoundOutcome, ObserverError> {
        let mut group = self.load(group_id)?;
        if !group.is_observer_group {
            return Ok(RoundOutcome::NotObserverGroup);
        }
        let guard = self
            .registry
            .try_begin(group_id)
            .ok_or_else(|| ObserverError::AlreadyGenerating(group_id.to_string()))?;

        log_info("observer", format!("round started for group {}", group_id));
        group.observer_state.is_generating = true;
        if let Err(err) = self.persist(&mut group) {
            return Err(self.fail(group_id, err));
        }
        self.sink.on_state_changed(&group, button_state(&group));

        let result = self
            .run_round(&mut group, guard.flag(), displayed_group_id)
            .await;

        group.observer_state.is_generating = false;
        drop(guard);
        let persisted = self.persist(&mut group);
        self.sink.on_state_changed(&group, button_state(&group));

        match (result, persisted) {
            (Ok(report), Ok(())) => {
                log_info(
                    "observer",
                    format!(
                        "round finished for group {}: {} applied, {} rejected{}",
                        group_id,
                        report.applied_count(),
                        report.rejected_count(),
                        if report.interrupted { ", paused" } else { "" }
                    ),
                );
                Ok(RoundOutcome::Completed(report))
            }
            (Err(err), _) | (Ok(_), Err(err)) => Err(self.fail(group_id, err)),
        }
    }

    /// Same entry point as [`start`](Self::start); the history carries the continuity.
    pub async fn continue_conversation(
        &self,
        group_id: &str,
        displayed_group_id: Option<&str>,
    ) -> Result<RoundOutcome, ObserverError> {
        self.start(group_id, displayed_group_id).await
    }

    /// Stop dispatching further actions. An in-flight backend call still completes, its
    /// reply is then skipped. Plain chat groups are left untouched.
    pub fn pause(&self, group_id: &str) -> Result<(), ObserverError> {
        let mut group = self.load(group_id)?;
        if !group.is_observer_group {
            log_debug("observer", format!("pause ignored for plain group {}", group_id));
            return Ok(());
        }
        let had_round = self.registry.pause(group_id);
        group.observer_state.is_generating = false;
        self.persist(&mut group)?;
        self.sink.on_state_changed(&group, button_state(&group));
        log_info(
            "observer",
            format!("group {} paused (round running: {})", group_id, had_round),
        );
        Ok(())
    }

    /// Drop the trailing run of AI messages and generate a fresh round in its place.
    pub async fn resay(
        &self,
        group_id: &str,
        displayed_group_id: Option<&str>,
    ) -> Result<RoundOutcome, ObserverError> {
        if self.registry.is_registered(group_id) {
            return Err(ObserverError::AlreadyGenerating(group_id.to_string()));
        }
        let mut group = self.load(group_id)?;
        if !group.is_observer_group {
            return Ok(RoundOutcome::NotObserverGroup);
        }
        let run = trailing_ai_run(&group.history);
        if run == 0 {
            return Ok(RoundOutcome::NothingToResay);
        }

        let keep = group.history.len() - run;
        group.history.truncate(keep);
        self.persist(&mut group)?;
        log_info(
            "observer",
            format!("resay removed {} messages from group {}", run, group_id),
        );
        self.sink.on_history_reset(&group);

        self.start(group_id, displayed_group_id).await
    }

    async fn run_round(
        &self,
        group: &mut ObserverGroup,
        flag: Arc<GenerationFlag>,
        displayed_group_id: Option<&str>,
    ) -> Result<DispatchReport, ObserverError> {
        let world_book_entries = self
            .world_books
            .world_book_entries(&group.settings.linked_world_book_ids)?;
        let linked_memories = if group.user_knows_members {
            self.world_books
                .linked_memories(&group.settings.linked_memories)?
        } else {
            Vec::new()
        };
        let inputs = PromptInputs {
            world_book_entries,
            linked_memories,
            reply_count: self.settings.reply_count,
            current_time: local_time_string(),
        };
        let compiled = compile_prompt(group, &inputs);

        let reply = self
            .backend
            .invoke(
                &compiled.system_prompt,
                &compiled.history_payload,
                &self.settings.api,
            )
            .await?;
        let actions = parse_actions(&reply)?;

        ActionDispatcher::new(Arc::clone(&self.store), Arc::clone(&self.sink), flag)
            .displayed_group(displayed_group_id)
            .pacing(Duration::from_millis(self.settings.pacing_ms))
            .recall_delay(Duration::from_millis(self.settings.recall_delay_ms))
            .apply(group, actions)
            .await
    }

    fn fail(&self, group_id: &str, err: ObserverError) -> ObserverError {
        log_error(
            "observer",
            format!("round failed for group {}: {}", group_id, err),
        );
        self.sink.on_error(group_id, &err.to_string());
        err
    }
}
