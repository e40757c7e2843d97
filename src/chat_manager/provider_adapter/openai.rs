use std::collections::HashMap;

use serde_json::{json, Value};

use super::{OpenAIChatMessage, OpenAIChatRequest, ProviderAdapter, WireProtocol};
use crate::chat_manager::prompt_engine::PromptMessage;
use crate::chat_manager::request::{chat_completions_endpoint, extract_chat_completion_text};

pub struct OpenAIAdapter;

impl ProviderAdapter for OpenAIAdapter {
    fn protocol(&self) -> WireProtocol {
        WireProtocol::ChatCompletions
    }

    fn build_url(&self, endpoint_url: &str, _model: &str, _api_key: &str) -> String {
        chat_completions_endpoint(endpoint_url)
    }

    fn headers(&self, api_key: &str) -> HashMap<String, String> {
        let mut out = HashMap::new();
        out.insert("Content-Type".into(), "application/json".into());
        out.insert("Authorization".into(), format!("Bearer {}", api_key.trim()));
        out
    }

    fn body(
        &self,
        model: &str,
        system_prompt: &str,
        history: &[PromptMessage],
        temperature: f64,
    ) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(OpenAIChatMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(history.iter().map(|m| OpenAIChatMessage {
            role: &m.role,
            content: &m.content,
        }));

        let request = OpenAIChatRequest {
            model,
            messages,
            temperature,
            stream: false,
        };

        serde_json::to_value(request).unwrap_or_else(|_| json!({}))
    }

    fn extract_reply(&self, data: &Value) -> Option<String> {
        extract_chat_completion_text(data)
    }
}
