//! Streaming generation client for OpenAI-compatible chat endpoints.
//!
//! A generation run is a small state machine:
//!
//! ```text
//! Idle -> PromptSent -> StreamingTokens -> Completed
//!                    \                  \-> Failed
//!                     \-> Failed         \-> TimedOut
//! ```
//!
//! `Completed`, `Failed`, and `TimedOut` are terminal. Whatever text
//! accumulated before a failure or timeout is preserved in the outcome so
//! callers can persist a partial answer. There are no retries; a failed run
//! surfaces as a failed run.
//!
//! Tokens arrive as server-sent events, one `data: {json}` line per delta,
//! terminated by `data: [DONE]`. An idle window (90s by default) between
//! received stream chunks finalizes the run as timed out.

use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::GenerationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    PromptSent,
    StreamingTokens,
    Completed,
    Failed,
    TimedOut,
}

impl GenerationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GenerationState::Completed | GenerationState::Failed | GenerationState::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationState::Idle => "idle",
            GenerationState::PromptSent => "prompt_sent",
            GenerationState::StreamingTokens => "streaming_tokens",
            GenerationState::Completed => "completed",
            GenerationState::Failed => "failed",
            GenerationState::TimedOut => "timed_out",
        }
    }
}

/// Terminal result of a generation run. `answer` holds everything received,
/// which may be partial when `state` is `Failed` or `TimedOut`.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub state: GenerationState,
    pub answer: String,
    pub error: Option<String>,
}

pub struct GenerationClient {
    config: GenerationConfig,
    client: reqwest::Client,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        // No overall request timeout: streams legitimately run for minutes.
        // Liveness is enforced per chunk through the idle window instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Runs one generation to a terminal state.
    ///
    /// Each received token is forwarded on `tokens` when a sender is given;
    /// if the receiving side goes away mid-stream, forwarding stops but the
    /// stream keeps being consumed so the full answer still lands in the
    /// outcome.
    pub async fn generate(
        &self,
        prompt: &str,
        tokens: Option<mpsc::Sender<String>>,
    ) -> GenerationOutcome {
        let mut state = GenerationState::Idle;
        let mut answer = String::new();
        debug!(state = state.as_str(), prompt_chars = prompt.len(), "generation run created");

        let body = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.config.temperature,
            "stream": true,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.url))
            .header("Content-Type", "application/json");
        if let Some(env_name) = &self.config.api_key_env {
            match std::env::var(env_name) {
                Ok(key) => {
                    request = request.header("Authorization", format!("Bearer {}", key));
                }
                Err(_) => {
                    return GenerationOutcome {
                        state: GenerationState::Failed,
                        answer,
                        error: Some(format!("API key environment variable {} not set", env_name)),
                    };
                }
            }
        }

        state = GenerationState::PromptSent;
        debug!(state = state.as_str(), model = %self.config.model, "generation started");

        let response = match request.json(&body).send().await {
            Ok(r) => r,
            Err(e) => {
                return GenerationOutcome {
                    state: GenerationState::Failed,
                    answer,
                    error: Some(format!("Generation request failed: {}", e)),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return GenerationOutcome {
                state: GenerationState::Failed,
                answer,
                error: Some(format!("Generation endpoint error {}: {}", status, body_text)),
            };
        }

        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut forward = tokens;

        loop {
            let next = match tokio::time::timeout(idle, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(
                        received_chars = answer.len(),
                        idle_secs = self.config.idle_timeout_secs,
                        "generation stream idle window elapsed"
                    );
                    return GenerationOutcome {
                        state: GenerationState::TimedOut,
                        answer,
                        error: Some(format!(
                            "No tokens received for {}s",
                            self.config.idle_timeout_secs
                        )),
                    };
                }
            };

            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    return GenerationOutcome {
                        state: GenerationState::Failed,
                        answer,
                        error: Some(format!("Generation stream error: {}", e)),
                    };
                }
                // Stream ended without a [DONE] marker; treat what we have
                // as the completed answer.
                None => break,
            };

            buffer.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    state = GenerationState::Completed;
                    debug!(
                        state = state.as_str(),
                        answer_chars = answer.len(),
                        "generation completed"
                    );
                    return GenerationOutcome {
                        state,
                        answer,
                        error: None,
                    };
                }

                match parse_delta(data) {
                    Some(token) if !token.is_empty() => {
                        if state != GenerationState::StreamingTokens {
                            state = GenerationState::StreamingTokens;
                            debug!(state = state.as_str(), "first token received");
                        }
                        answer.push_str(&token);
                        if let Some(tx) = &forward {
                            if tx.send(token).await.is_err() {
                                debug!("token receiver dropped, continuing to accumulate");
                                forward = None;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        GenerationOutcome {
            state: GenerationState::Completed,
            answer,
            error: None,
        }
    }
}

/// Extracts the content delta from one SSE payload, tolerating payloads
/// without content (role deltas, finish markers).
fn parse_delta(data: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    json.get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!GenerationState::Idle.is_terminal());
        assert!(!GenerationState::PromptSent.is_terminal());
        assert!(!GenerationState::StreamingTokens.is_terminal());
        assert!(GenerationState::Completed.is_terminal());
        assert!(GenerationState::Failed.is_terminal());
        assert!(GenerationState::TimedOut.is_terminal());
    }

    #[test]
    fn test_parse_delta_content() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(data), Some("Hello".to_string()));
    }

    #[test]
    fn test_parse_delta_role_only() {
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_delta(data), None);
    }

    #[test]
    fn test_parse_delta_finish_marker() {
        let data = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_delta(data), None);
    }

    #[test]
    fn test_parse_delta_garbage() {
        assert_eq!(parse_delta("not json"), None);
        assert_eq!(parse_delta("{}"), None);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_without_retry() {
        let config = GenerationConfig {
            url: "http://127.0.0.1:1/v1".to_string(),
            ..Default::default()
        };
        let client = GenerationClient::new(config);

        let started = std::time::Instant::now();
        let outcome = client.generate("prompt", None).await;
        assert_eq!(outcome.state, GenerationState::Failed);
        assert!(outcome.answer.is_empty());
        assert!(outcome.error.is_some());
        // A single attempt, no backoff loop.
        assert!(started.elapsed() < Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_missing_api_key_env_fails() {
        let config = GenerationConfig {
            api_key_env: Some("DOCQA_TEST_KEY_THAT_DOES_NOT_EXIST".to_string()),
            ..Default::default()
        };
        let client = GenerationClient::new(config);
        let outcome = client.generate("prompt", None).await;
        assert_eq!(outcome.state, GenerationState::Failed);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("DOCQA_TEST_KEY_THAT_DOES_NOT_EXIST"));
    }
}
