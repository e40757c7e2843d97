use std::time::{SystemTime, UNIX_EPOCH};

pub const SERVICE: &str = "observer-chat";

pub fn now_millis() -> Result<u64, String> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?
        .as_millis() as u64)
}

pub fn log_info(scope: &str, message: impl AsRef<str>) {
    tracing::info!(target: "observer_chat", scope, "{}", message.as_ref());
}

pub fn log_warn(scope: &str, message: impl AsRef<str>) {
    tracing::warn!(target: "observer_chat", scope, "{}", message.as_ref());
}

pub fn log_error(scope: &str, message: impl AsRef<str>) {
    tracing::error!(target: "observer_chat", scope, "{}", message.as_ref());
}

pub fn log_debug(scope: &str, message: impl AsRef<str>) {
    tracing::debug!(target: "observer_chat", scope, "{}", message.as_ref());
}

pub fn truncate_for_log(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max).collect();
        format!("{}…", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_keeps_short_text() {
        assert_eq!(truncate_for_log("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_for_log_counts_chars_not_bytes() {
        assert_eq!(truncate_for_log("你好世界", 2), "你好…");
    }
}
