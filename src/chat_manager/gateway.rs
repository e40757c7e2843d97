//! Model gateway: validates the API configuration, sends the compiled prompt through the
//! matching wire protocol and normalizes the reply text.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::prompt_engine::PromptMessage;
use super::provider_adapter::{adapter_for, ProviderAdapter};
use super::request::parse_body_to_value;
use crate::config::ApiConfig;
use crate::error::ObserverError;
use crate::transport::build_client;
use crate::utils::{log_info, log_warn, truncate_for_log, SERVICE};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[PromptMessage],
        config: &ApiConfig,
    ) -> Result<String, ObserverError>;
}

pub fn validate_config(config: &ApiConfig) -> Result<(), ObserverError> {
    let missing = config.missing_fields();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ObserverError::Config(format!(
            "missing {}; configure the API in settings first",
            missing.join(", ")
        )))
    }
}

/// A fully built request, independent of the HTTP client.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

pub fn prepare_request(
    adapter: &dyn ProviderAdapter,
    system_prompt: &str,
    history: &[PromptMessage],
    config: &ApiConfig,
) -> PreparedRequest {
    let mut headers: Vec<(String, String)> = adapter.headers(&config.api_key).into_iter().collect();
    headers.push(("User-Agent".into(), format!("{}/0.1", SERVICE)));
    headers.sort();
    PreparedRequest {
        url: adapter.build_url(&config.endpoint_url, &config.model, &config.api_key),
        headers,
        body: adapter.body(
            config.model.trim(),
            system_prompt,
            history,
            config.effective_temperature(),
        ),
    }
}

pub struct HttpChatBackend {
    client: reqwest::Client,
}

impl HttpChatBackend {
    pub fn new(timeout_ms: Option<u64>) -> Result<Self, ObserverError> {
        Ok(Self {
            client: build_client(timeout_ms)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => log_warn("model_gateway", format!("skipping invalid header {}", key)),
        }
    }
    map
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[PromptMessage],
        config: &ApiConfig,
    ) -> Result<String, ObserverError> {
        validate_config(config)?;

        let adapter = adapter_for(config);
        let prepared = prepare_request(adapter.as_ref(), system_prompt, history, config);

        log_info(
            "model_gateway",
            format!(
                "sending {:?} request: model={} messages={}",
                adapter.protocol(),
                config.model,
                history.len()
            ),
        );

        let response = self
            .client
            .post(&prepared.url)
            .headers(header_map(&prepared.headers))
            .json(&prepared.body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            log_warn(
                "model_gateway",
                format!(
                    "backend returned {}: {}",
                    status.as_u16(),
                    truncate_for_log(&text, 512)
                ),
            );
            return Err(ObserverError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let data = parse_body_to_value(&text);
        let reply = adapter
            .extract_reply(&data)
            .ok_or(ObserverError::EmptyReply)?;

        log_info(
            "model_gateway",
            format!("reply received: {}", truncate_for_log(&reply, 256)),
        );
        Ok(reply)
    }
}
