// oracle-client-rs/src/http_oracle.rs
//
// HTTP adapter for an OpenAI-compatible chat-completions backend.
//
// This module provides:
// - Real HTTP calls to the oracle provider via reqwest
// - Exponential backoff retry mechanism for resilient operation
// - Error classification into retryable vs. non-retryable failures
// - Configuration via environment variables
//
// Configuration:
// - ORACLE_API_KEY: API key for the provider
// - ORACLE_API_URL: API endpoint URL (defaults to OpenAI compatible endpoint)
// - ORACLE_MODEL: Model to use (e.g. "gpt-4o-mini")
// - ORACLE_MAX_RETRIES: Maximum number of retry attempts (default: 3)
// - ORACLE_INITIAL_RETRY_DELAY_MS: Initial delay between retries in ms (default: 1000)
// - ORACLE_MAX_RETRY_DELAY_MS: Maximum delay between retries in ms (default: 30000)
// - ORACLE_TIMEOUT_SECS: Per-request HTTP timeout (default: 30)

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{parse_hypothesis_json, HypothesisOracle, OracleError, OracleHypothesis};

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// System prompt pinning the completion to the oracle wire contract.
const SYSTEM_PROMPT: &str = "You are a diagnostic reasoning assistant for a payment \
processing pipeline. Respond with a single JSON object with keys \
primary_hypothesis (string), confidence (number in (0,1)), reasoning_chain \
(array of {observation, inference}), and alternative_explanations (array of \
{explanation, confidence, why_less_likely} with at least two entries). \
Do not include any text outside the JSON object.";

/// Connection and retry configuration for the HTTP oracle.
#[derive(Debug, Clone)]
pub struct HttpOracleConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl HttpOracleConfig {
    /// Read configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        fn get_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
            env::var(name)
                .ok()
                .and_then(|v| v.parse::<T>().ok())
                .unwrap_or(default)
        }

        Self {
            api_url: env::var("ORACLE_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            api_key: env::var("ORACLE_API_KEY").unwrap_or_default(),
            model: env::var("ORACLE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            max_retries: get_env_var("ORACLE_MAX_RETRIES", 3),
            initial_retry_delay_ms: get_env_var("ORACLE_INITIAL_RETRY_DELAY_MS", 1000),
            max_retry_delay_ms: get_env_var("ORACLE_MAX_RETRY_DELAY_MS", 30000),
            request_timeout_secs: get_env_var("ORACLE_TIMEOUT_SECS", 30),
        }
    }
}

/// Live oracle adapter for an OpenAI-compatible chat-completions API.
#[derive(Debug)]
pub struct HttpHypothesisOracle {
    client: Client,
    cfg: HttpOracleConfig,
    provider: String,
}

impl HttpHypothesisOracle {
    /// Construct from explicit configuration.
    pub fn new(cfg: HttpOracleConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()
            .unwrap_or_default();

        let provider = Self::determine_provider(&cfg.api_url);
        log::info!(
            "hypothesis oracle initialized (provider: {}, model: {})",
            provider,
            cfg.model
        );

        Self {
            client,
            cfg,
            provider,
        }
    }

    /// Construct with configuration from environment variables.
    pub fn from_env() -> Self {
        Self::new(HttpOracleConfig::from_env())
    }

    /// Determine the provider from the API URL, for logging and the
    /// response `source` tag.
    fn determine_provider(api_url: &str) -> String {
        if api_url.contains("openai.com") {
            "openai".to_string()
        } else if api_url.contains("openrouter.ai") {
            "openrouter".to_string()
        } else if api_url.contains("googleapis.com") {
            "gemini".to_string()
        } else if api_url.contains("localhost:11434") {
            "ollama".to_string()
        } else {
            "default".to_string()
        }
    }

    /// Exponential backoff policy with jitter.
    ///
    /// 1. Start with the initial delay
    /// 2. Double the delay after each failed attempt
    /// 3. Randomize to avoid thundering-herd retries
    /// 4. Cap the per-attempt delay and the total elapsed retry time
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.cfg.initial_retry_delay_ms))
            .with_max_interval(Duration::from_millis(self.cfg.max_retry_delay_ms))
            .with_multiplier(2.0)
            .with_max_elapsed_time(Some(Duration::from_secs(120)))
            .with_randomization_factor(0.5)
            .build()
    }

    pub fn is_configured(&self) -> bool {
        !self.cfg.api_key.is_empty()
    }

    // Execute a single request attempt.
    async fn execute_request(
        &self,
        request_body: &ChatCompletionRequest,
    ) -> Result<OracleHypothesis, OracleError> {
        if self.cfg.api_key.is_empty() {
            return Err(OracleError::InvalidRequest(
                "ORACLE_API_KEY is not set".to_string(),
            ));
        }

        let response = match self
            .client
            .post(&self.cfg.api_url)
            .header("Authorization", format!("Bearer {}", self.cfg.api_key))
            .header("Content-Type", "application/json")
            .json(request_body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                if err.is_timeout() {
                    return Err(OracleError::NetworkError(format!(
                        "request timed out: {err}"
                    )));
                } else if err.is_connect() {
                    return Err(OracleError::NetworkError(format!(
                        "connection failed: {err}"
                    )));
                } else {
                    return Err(OracleError::NetworkError(format!("network error: {err}")));
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            return match status.as_u16() {
                400 => Err(OracleError::InvalidRequest(format!("bad request: {text}"))),
                401 => Err(OracleError::InvalidRequest(format!("unauthorized: {text}"))),
                403 => Err(OracleError::InvalidRequest(format!("forbidden: {text}"))),
                404 => Err(OracleError::InvalidRequest(format!("not found: {text}"))),
                429 => Err(OracleError::RateLimited(text)),
                500 | 502 | 503 | 504 => Err(OracleError::ServerError(format!(
                    "server error ({status}): {text}"
                ))),
                _ => Err(OracleError::Unknown(format!(
                    "unexpected status ({status}): {text}"
                ))),
            };
        }

        let data: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(format!("failed to parse response: {e}")))?;

        let choice = data
            .choices
            .first()
            .ok_or_else(|| OracleError::ParseError("no choices in response".to_string()))?;

        if let Some(usage) = &data.usage {
            log::info!("oracle request completed, {} tokens used", usage.total_tokens);
        }

        let mut hypothesis = parse_hypothesis_json(&choice.message.content)?;
        if hypothesis.source.is_empty() {
            hypothesis.source = self.provider.clone();
        }
        Ok(hypothesis)
    }
}

#[async_trait]
impl HypothesisOracle for HttpHypothesisOracle {
    /// Generate a hypothesis with exponential backoff on transient failures.
    async fn generate(&self, prompt: &str) -> Result<OracleHypothesis, OracleError> {
        let mut backoff = self.create_backoff();
        let mut attempt = 0;

        let request_body = ChatCompletionRequest {
            model: self.cfg.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(0.2),
            max_tokens: Some(1000),
        };

        log::info!(
            "preparing oracle request to {} (model: {})",
            self.cfg.api_url,
            self.cfg.model
        );

        loop {
            attempt += 1;

            if attempt > 1 {
                log::info!("retry attempt {} for oracle request", attempt);
            }

            match self.execute_request(&request_body).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if !err.is_retryable() || attempt > self.cfg.max_retries {
                        log::error!("oracle request failed after {} attempts: {}", attempt, err);
                        return Err(err);
                    }

                    if let Some(backoff_duration) = backoff.next_backoff() {
                        log::warn!("retryable error: {}. retrying in {:?}", err, backoff_duration);

                        // Small extra jitter so concurrent cycles don't retry in step.
                        let jitter = rand::thread_rng().gen_range(0..=200);
                        let jittered = backoff_duration + Duration::from_millis(jitter);
                        tokio::time::sleep(jittered).await;
                    } else {
                        log::error!("exceeded maximum backoff time: {}", err);
                        return Err(err);
                    }
                }
            }
        }
    }
}
