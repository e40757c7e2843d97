use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

use crate::chat_manager::types::{GroupMessage, ObserverGroup};
use crate::error::ObserverError;
use crate::observer_group_manager::ButtonState;
use crate::utils::log_warn;

pub fn build_client(timeout_ms: Option<u64>) -> Result<reqwest::Client, ObserverError> {
    let mut builder = reqwest::Client::builder();
    if let Some(ms) = timeout_ms {
        builder = builder.timeout(Duration::from_millis(ms));
    }
    builder.build().map_err(ObserverError::from)
}

/// UI-side hooks notified by the observer engine.
///
/// Message hooks only fire for the group currently on screen; state and error hooks fire
/// for every group.
pub trait RenderSink: Send + Sync {
    fn on_message_appended(&self, message: &GroupMessage, group: &ObserverGroup);
    fn on_history_reset(&self, group: &ObserverGroup);
    fn on_state_changed(&self, group: &ObserverGroup, buttons: ButtonState);
    fn on_error(&self, group_id: &str, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderSink;

impl RenderSink for NoopRenderSink {
    fn on_message_appended(&self, _message: &GroupMessage, _group: &ObserverGroup) {}
    fn on_history_reset(&self, _group: &ObserverGroup) {}
    fn on_state_changed(&self, _group: &ObserverGroup, _buttons: ButtonState) {}
    fn on_error(&self, _group_id: &str, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderEvent {
    #[serde(rename_all = "camelCase")]
    MessageAppended {
        group_id: String,
        message: GroupMessage,
    },
    #[serde(rename_all = "camelCase")]
    HistoryReset {
        group_id: String,
        history_len: usize,
    },
    #[serde(rename_all = "camelCase")]
    StateChanged {
        group_id: String,
        buttons: ButtonState,
    },
    #[serde(rename_all = "camelCase")]
    Error { group_id: String, message: String },
}

impl RenderEvent {
    pub fn group_id(&self) -> &str {
        match self {
            RenderEvent::MessageAppended { group_id, .. }
            | RenderEvent::HistoryReset { group_id, .. }
            | RenderEvent::StateChanged { group_id, .. }
            | RenderEvent::Error { group_id, .. } => group_id,
        }
    }

    /// Channel name a frontend bridge would emit this event on.
    pub fn channel(&self) -> String {
        format!("observer://{}", self.group_id())
    }

    pub fn to_payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "type": "unserializable" }))
    }
}

/// Forwards every hook as a [`RenderEvent`] over an unbounded tokio channel.
pub struct ChannelRenderSink {
    tx: UnboundedSender<RenderEvent>,
}

impl ChannelRenderSink {
    pub fn new(tx: UnboundedSender<RenderEvent>) -> Self {
        Self { tx }
    }

    fn emit(&self, event: RenderEvent) {
        if self.tx.send(event).is_err() {
            log_warn("transport", "render channel closed, dropping event");
        }
    }
}

impl RenderSink for ChannelRenderSink {
    fn on_message_appended(&self, message: &GroupMessage, group: &ObserverGroup) {
        self.emit(RenderEvent::MessageAppended {
            group_id: group.id.clone(),
            message: message.clone(),
        });
    }

    fn on_history_reset(&self, group: &ObserverGroup) {
        self.emit(RenderEvent::HistoryReset {
            group_id: group.id.clone(),
            history_len: group.history.len(),
        });
    }

    fn on_state_changed(&self, group: &ObserverGroup, buttons: ButtonState) {
        self.emit(RenderEvent::StateChanged {
            group_id: group.id.clone(),
            buttons,
        });
    }

    fn on_error(&self, group_id: &str, message: &str) {
        self.emit(RenderEvent::Error {
            group_id: group_id.to_string(),
            message: message.to_string(),
        });
    }
}
