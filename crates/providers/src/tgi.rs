//! Text Generation Inference (TGI) client.
//!
//! Talks to a HuggingFace text-generation-inference server:
//! - `POST /generate` for whole completions
//! - `POST /generate_stream` for server-sent token events
//!
//! TGI echoes a matched stop sequence at the end of the text; it is
//! stripped before the completion is handed to the agent.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sqlpilot_config::GenerationConfig;
use sqlpilot_core::{FragmentStream, GenerationError, GenerationRequest, Generator};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A `Generator` backed by a TGI server.
pub struct TextGenInference {
    base_url: String,
    max_new_tokens: u32,
    temperature: f32,
    repetition_penalty: f32,
    stop_sequences: Vec<String>,
    client: reqwest::Client,
}

impl TextGenInference {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GenerationError> {
        Self::from_config(&GenerationConfig {
            inference_server_url: base_url.into(),
            ..GenerationConfig::default()
        })
    }

    pub fn from_config(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let base_url = config.inference_server_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(GenerationError::NotConfigured(
                "inference_server_url is empty".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            repetition_penalty: config.repetition_penalty,
            stop_sequences: config.stop_sequences.clone(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn body(&self, request: &GenerationRequest) -> TgiRequest {
        let mut stop = request.stop.clone();
        for s in &self.stop_sequences {
            if !stop.contains(s) {
                stop.push(s.clone());
            }
        }

        // TGI rejects a temperature of zero; greedy decoding is the default.
        let temperature = request.temperature.unwrap_or(self.temperature);

        TgiRequest {
            inputs: request.prompt.clone(),
            parameters: TgiParameters {
                max_new_tokens: request.max_new_tokens.unwrap_or(self.max_new_tokens),
                temperature: (temperature > 0.0).then_some(temperature),
                repetition_penalty: self.repetition_penalty,
                stop,
            },
        }
    }

    async fn post(
        &self,
        path: &str,
        body: &TgiRequest,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Inference server returned error");
            return Err(GenerationError::Api {
                status_code: status,
                message: error_body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for TextGenInference {
    fn name(&self) -> &str {
        "tgi"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let body = self.body(&request);
        debug!(
            url = %self.base_url,
            prompt_chars = body.inputs.len(),
            max_new_tokens = body.parameters.max_new_tokens,
            "Sending generation request"
        );

        let response = self.post("/generate", &body).await?;
        let parsed: TgiResponse = response.json().await.map_err(|e| GenerationError::Api {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(strip_stop_suffix(&parsed.generated_text, &body.parameters.stop).to_string())
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<FragmentStream, GenerationError> {
        let body = self.body(&request);
        debug!(url = %self.base_url, "Sending streaming generation request");

        let response = self.post("/generate_stream", &body).await?;
        let stop = body.parameters.stop;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward token text
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            // Bytes, not text: a multibyte character may straddle two chunks.
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GenerationError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                    let line = String::from_utf8_lossy(&raw[..line_end]);
                    let line = line.trim_end_matches('\r');

                    match parse_sse_line(line, &stop) {
                        SseLine::Skip => {}
                        SseLine::Token(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Stop => return,
                        SseLine::Error(message) => {
                            let _ = tx.send(Err(GenerationError::StreamInterrupted(message))).await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, GenerationError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// What one SSE line means for the fragment stream.
#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Token(String),
    /// A stop sequence or the final event arrived.
    Stop,
    Error(String),
}

fn parse_sse_line(line: &str, stop: &[String]) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };

    let event: StreamEvent = match serde_json::from_str(data.trim()) {
        Ok(event) => event,
        Err(e) => {
            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
            return SseLine::Skip;
        }
    };

    if let Some(message) = event.error {
        return SseLine::Error(message);
    }
    let Some(token) = event.token else {
        return SseLine::Skip;
    };
    if token.special {
        return if event.generated_text.is_some() {
            SseLine::Stop
        } else {
            SseLine::Skip
        };
    }
    if stop.iter().any(|s| token.text.trim() == s.trim()) {
        return SseLine::Stop;
    }
    SseLine::Token(token.text)
}

fn strip_stop_suffix<'a>(text: &'a str, stop: &[String]) -> &'a str {
    stop.iter()
        .filter(|s| !s.is_empty())
        .find_map(|s| text.strip_suffix(s.as_str()))
        .unwrap_or(text)
}

// --- TGI API types (internal) ---

#[derive(Debug, Serialize)]
struct TgiRequest {
    inputs: String,
    parameters: TgiParameters,
}

#[derive(Debug, Serialize)]
struct TgiParameters {
    max_new_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    repetition_penalty: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TgiResponse {
    generated_text: String,
}

/// A single SSE `data: {...}` event from `/generate_stream`.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    token: Option<StreamToken>,
    #[serde(default)]
    generated_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamToken {
    text: String,
    #[serde(default)]
    special: bool,
}
