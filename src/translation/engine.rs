use crate::utils::config::EngineConfig;
use crate::utils::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Failure reported by an engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Timeouts, dropped connections, driver hiccups. Worth retrying.
    Transient(String),
    /// The engine session is unusable; retrying will not help.
    Fatal(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Transient(msg) => write!(f, "transient: {}", msg),
            EngineError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Translated(String),
    /// The engine ran but produced no result.
    Empty,
    Failed(EngineError),
}

#[async_trait]
pub trait TranslationEngine: Send + Sync {
    async fn submit(&self, text: &str) -> EngineOutcome;
}

/// Engine that posts text to an HTTP translation endpoint.
pub struct HttpTranslationEngine {
    client: Client,
    endpoint: String,
    source_lang: String,
    target_lang: String,
}

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_lang: &'a str,
    target_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translation: Option<String>,
}

impl HttpTranslationEngine {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.call_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint_url.clone(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
        })
    }

    async fn call_api(&self, text: &str) -> EngineOutcome {
        let request = TranslateRequest {
            text,
            source_lang: &self.source_lang,
            target_lang: &self.target_lang,
        };

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) => response,
            Err(e) => return EngineOutcome::Failed(classify_transport_error(&e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return EngineOutcome::Failed(classify_status(status, &body));
        }

        match response.json::<TranslateResponse>().await {
            Ok(TranslateResponse {
                translation: Some(text),
            }) if !text.trim().is_empty() => EngineOutcome::Translated(text),
            Ok(_) => EngineOutcome::Empty,
            Err(e) if e.is_timeout() => EngineOutcome::Failed(classify_transport_error(&e)),
            Err(e) => EngineOutcome::Failed(EngineError::Fatal(format!(
                "Undecodable response: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl TranslationEngine for HttpTranslationEngine {
    async fn submit(&self, text: &str) -> EngineOutcome {
        self.call_api(text).await
    }
}

fn classify_transport_error(e: &reqwest::Error) -> EngineError {
    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        EngineError::Transient(e.to_string())
    } else {
        EngineError::Fatal(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> EngineError {
    let msg = format!("Engine returned {}: {}", status, body);
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        EngineError::Transient(msg)
    } else {
        EngineError::Fatal(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            EngineError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream"),
            EngineError::Transient(_)
        ));
    }

    #[test]
    fn client_errors_are_fatal() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            EngineError::Fatal(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, ""),
            EngineError::Fatal(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient() {
        let config = EngineConfig {
            endpoint_url: "http://127.0.0.1:9/translate".to_string(),
            call_timeout_secs: 2,
            ..EngineConfig::default()
        };
        let engine = HttpTranslationEngine::new(&config).unwrap();
        match engine.submit("Hello").await {
            EngineOutcome::Failed(EngineError::Transient(_)) => {}
            other => panic!("expected transient failure, got {:?}", other),
        }
    }
}
