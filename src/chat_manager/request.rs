use serde_json::Value;

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") || trimmed.ends_with("/openai") {
        // already a versioned chat-completions base
        format!("{}/chat/completions", trimmed)
    } else {
        format!("{}/v1/chat/completions", trimmed)
    }
}

fn non_blank(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// `candidates[0].content.parts[0].text`
pub fn extract_gemini_text(data: &Value) -> Option<String> {
    data.get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .get(0)?
        .get("text")?
        .as_str()
        .and_then(non_blank)
}

/// `choices[0].message.content`
pub fn extract_chat_completion_text(data: &Value) -> Option<String> {
    data.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .and_then(non_blank)
}

pub fn parse_body_to_value(text: &str) -> Value {
    if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_completions_endpoint_variants() {
        assert_eq!(
            chat_completions_endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_endpoint("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_endpoint("https://x.dev/v1/chat/completions"),
            "https://x.dev/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_endpoint("https://generativelanguage.googleapis.com/v1beta/openai/"),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn test_extract_gemini_text() {
        let data = json!({
            "candidates": [{ "content": { "parts": [{ "text": "[{}]" }], "role": "model" } }]
        });
        assert_eq!(extract_gemini_text(&data), Some("[{}]".to_string()));
        assert_eq!(extract_gemini_text(&json!({ "candidates": [] })), None);
        assert_eq!(
            extract_gemini_text(&json!({ "candidates": [{ "finishReason": "SAFETY" }] })),
            None
        );
    }

    #[test]
    fn test_extract_chat_completion_text() {
        let data = json!({ "choices": [{ "message": { "role": "assistant", "content": "hi" } }] });
        assert_eq!(extract_chat_completion_text(&data), Some("hi".to_string()));
        let blank = json!({ "choices": [{ "message": { "content": "   " } }] });
        assert_eq!(extract_chat_completion_text(&blank), None);
        let null_content = json!({ "choices": [{ "message": { "content": null } }] });
        assert_eq!(extract_chat_completion_text(&null_content), None);
    }

    #[test]
    fn test_parse_body_to_value_keeps_plain_text() {
        assert_eq!(parse_body_to_value(""), Value::Null);
        assert_eq!(parse_body_to_value("oops"), Value::String("oops".into()));
        assert_eq!(parse_body_to_value("{\"a\":1}"), json!({ "a": 1 }));
    }
}
