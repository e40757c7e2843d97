use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::{ProviderAdapter, WireProtocol};
use crate::chat_manager::prompt_engine::PromptMessage;
use crate::chat_manager::request::extract_gemini_text;

pub struct GoogleGeminiAdapter;

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiSystemInstruction<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
}

#[derive(Serialize)]
struct GeminiChatRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
    #[serde(rename = "systemInstruction")]
    system_instruction: GeminiSystemInstruction<'a>,
}

fn models_base(endpoint_url: &str) -> String {
    let trimmed = endpoint_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/models") {
        trimmed.to_string()
    } else if trimmed.contains("/v1beta") || trimmed.contains("/v1") {
        format!("{}/models", trimmed)
    } else {
        format!("{}/v1beta/models", trimmed)
    }
}

impl ProviderAdapter for GoogleGeminiAdapter {
    fn protocol(&self) -> WireProtocol {
        WireProtocol::GeminiContents
    }

    fn build_url(&self, endpoint_url: &str, model: &str, api_key: &str) -> String {
        // {base}/models/{model}:generateContent?key={api_key}
        format!(
            "{}/{}:generateContent?key={}",
            models_base(endpoint_url),
            model.trim(),
            api_key.trim()
        )
    }

    fn headers(&self, _api_key: &str) -> HashMap<String, String> {
        // API key travels in the query string.
        let mut out = HashMap::new();
        out.insert("Content-Type".into(), "application/json".into());
        out
    }

    fn body(
        &self,
        _model: &str,
        system_prompt: &str,
        history: &[PromptMessage],
        temperature: f64,
    ) -> Value {
        let contents = history
            .iter()
            .map(|msg| GeminiContent {
                // Gemini only knows "user" and "model" in contents.
                role: match msg.role.as_str() {
                    "assistant" | "model" => "model",
                    _ => "user",
                },
                parts: vec![GeminiPart { text: &msg.content }],
            })
            .collect();

        let body = GeminiChatRequest {
            contents,
            generation_config: GeminiGenerationConfig { temperature },
            system_instruction: GeminiSystemInstruction {
                parts: vec![GeminiPart {
                    text: system_prompt,
                }],
            },
        };

        serde_json::to_value(body).unwrap_or_else(|_| json!({}))
    }

    fn extract_reply(&self, data: &Value) -> Option<String> {
        extract_gemini_text(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<PromptMessage> {
        vec![
            PromptMessage {
                role: "user".into(),
                content: "(Timestamp: 1) Mika: hi".into(),
            },
            PromptMessage {
                role: "assistant".into(),
                content: "earlier reply".into(),
            },
        ]
    }

    #[test]
    fn test_build_url_appends_model_and_key() {
        let adapter = GoogleGeminiAdapter;
        assert_eq!(
            adapter.build_url(
                "https://generativelanguage.googleapis.com/v1beta/models",
                "gemini-2.5-flash",
                "KEY"
            ),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=KEY"
        );
        assert_eq!(
            adapter.build_url("https://generativelanguage.googleapis.com/", "g", "K"),
            "https://generativelanguage.googleapis.com/v1beta/models/g:generateContent?key=K"
        );
    }

    #[test]
    fn test_body_maps_roles_and_system_instruction() {
        let body = GoogleGeminiAdapter.body("gemini", "SYSTEM", &history(), 0.8);
        assert_eq!(
            body,
            json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "(Timestamp: 1) Mika: hi" }] },
                    { "role": "model", "parts": [{ "text": "earlier reply" }] }
                ],
                "generationConfig": { "temperature": 0.8 },
                "systemInstruction": { "parts": [{ "text": "SYSTEM" }] }
            })
        );
    }

    #[test]
    fn test_headers_do_not_carry_key() {
        let headers = GoogleGeminiAdapter.headers("secret");
        assert!(headers.values().all(|v| !v.contains("secret")));
    }
}
