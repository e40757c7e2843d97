use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::chat_manager::prompt_engine::PromptMessage;
use crate::config::ApiConfig;

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    /// `contents` / `parts` protocol with a separate system instruction.
    GeminiContents,
    /// Generic chat-completion protocol.
    ChatCompletions,
}

pub trait ProviderAdapter {
    fn protocol(&self) -> WireProtocol;

    /// Complete request URL, including model name and query parameters where the
    /// protocol puts them there.
    fn build_url(&self, endpoint_url: &str, model: &str, api_key: &str) -> String;

    fn headers(&self, api_key: &str) -> HashMap<String, String>;

    fn body(
        &self,
        model: &str,
        system_prompt: &str,
        history: &[PromptMessage],
        temperature: f64,
    ) -> Value;

    /// Reply text from a 2xx response body. `None` when any step of the path is missing
    /// or the text is blank.
    fn extract_reply(&self, data: &Value) -> Option<String>;
}

// Shared OpenAI-style request.
#[derive(Serialize)]
pub(crate) struct OpenAIChatRequest<'a> {
    pub(crate) model: &'a str,
    pub(crate) messages: Vec<OpenAIChatMessage<'a>>,
    pub(crate) temperature: f64,
    pub(crate) stream: bool,
}

#[derive(Serialize)]
pub(crate) struct OpenAIChatMessage<'a> {
    pub(crate) role: &'a str,
    pub(crate) content: &'a str,
}

mod google_gemini;
mod openai;

pub use google_gemini::GoogleGeminiAdapter;
pub use openai::OpenAIAdapter;

/// Host marker of the `contents` / `parts` vendor.
pub const GEMINI_HOST_MARKER: &str = "generativelanguage.googleapis.com";

/// Path segment of the same host's chat-completions compatible API.
const GEMINI_OPENAI_COMPAT_SEGMENT: &str = "/openai";

pub fn protocol_for(config: &ApiConfig) -> WireProtocol {
    let endpoint = config
        .endpoint_url
        .trim()
        .trim_end_matches('/')
        .to_ascii_lowercase();
    if endpoint.contains(GEMINI_HOST_MARKER) && !endpoint.contains(GEMINI_OPENAI_COMPAT_SEGMENT) {
        WireProtocol::GeminiContents
    } else {
        WireProtocol::ChatCompletions
    }
}

pub fn adapter_for(config: &ApiConfig) -> Box<dyn ProviderAdapter + Send + Sync> {
    match protocol_for(config) {
        WireProtocol::GeminiContents => Box::new(GoogleGeminiAdapter),
        WireProtocol::ChatCompletions => Box::new(OpenAIAdapter),
    }
}
