//! Client for the local inference endpoint.
//!
//! The [`ModelClient`] trait decouples the session from the HTTP backend
//! (currently an Ollama-compatible `/api/chat`). Tests use scripted clients
//! that return predetermined completions without touching the network.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::RawCompletion;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Failure to obtain a completion. Never folded into empty text.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach model endpoint {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("model request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model endpoint reported an error: {0}")]
    Endpoint(String),
    #[error("malformed response from model endpoint: {0}")]
    Malformed(String),
}

/// Receives completion text fragments as they stream in.
pub type ChunkSink<'a> = &'a mut dyn FnMut(&str);

/// Abstraction over inference backends.
///
/// Implementations hold no task state, so one client serves both the
/// generation and the analysis round-trip.
pub trait ModelClient {
    /// Send `prompt` to `model` and return the full completion.
    ///
    /// `on_chunk` sees each fragment in arrival order; the returned text is
    /// their concatenation.
    fn complete(
        &self,
        model: &str,
        prompt: &str,
        on_chunk: ChunkSink<'_>,
    ) -> Result<RawCompletion, TransportError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// One line of the newline-delimited JSON stream.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Ollama `/api/chat` client using blocking HTTP and streamed responses.
pub struct OllamaClient {
    endpoint: String,
    http: HttpClient,
}

impl OllamaClient {
    /// Create a client for `endpoint` (`host:port` or a full URL).
    ///
    /// `timeout` bounds each request end to end; `None` blocks until the
    /// model finishes.
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let endpoint = normalize_endpoint(endpoint);
        // The blocking client defaults to a 30s timeout; local models are often slower.
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { endpoint, http })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                endpoint: self.endpoint.clone(),
            }
        } else {
            TransportError::Unreachable {
                endpoint: self.endpoint.clone(),
                source: err,
            }
        }
    }
}

impl ModelClient for OllamaClient {
    #[instrument(skip_all, fields(model = %model, endpoint = %self.endpoint, prompt_len = prompt.len()))]
    fn complete(
        &self,
        model: &str,
        prompt: &str,
        on_chunk: ChunkSink<'_>,
    ) -> Result<RawCompletion, TransportError> {
        let url = format!("{}/api/chat", self.endpoint);
        let request = ChatRequest {
            model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };

        info!("requesting completion");
        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "model endpoint returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let text = read_chat_stream(BufReader::new(response), on_chunk).map_err(|e| match e {
            StreamError::Io(err) if is_timeout(&err) => TransportError::Timeout {
                endpoint: self.endpoint.clone(),
            },
            StreamError::Io(err) => TransportError::Malformed(format!("read stream: {err}")),
            StreamError::Transport(t) => t,
        })?;
        debug!(completion_len = text.len(), "completion received");
        Ok(RawCompletion::new(text))
    }
}

enum StreamError {
    Io(std::io::Error),
    Transport(TransportError),
}

fn is_timeout(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::TimedOut
}

/// Concatenate `message.content` fragments from an NDJSON chat stream.
///
/// A stream that ends before its `done` chunk is an error: the partial text
/// may hold an unclosed fence that would otherwise parse as a whole artifact.
fn read_chat_stream<R: BufRead>(
    reader: R,
    on_chunk: ChunkSink<'_>,
) -> Result<String, StreamError> {
    let mut text = String::new();
    let mut saw_done = false;
    for line in reader.lines() {
        let line = line.map_err(StreamError::Io)?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChatChunk = serde_json::from_str(&line).map_err(|e| {
            StreamError::Transport(TransportError::Malformed(format!("{e}: {line}")))
        })?;
        if let Some(error) = chunk.error {
            return Err(StreamError::Transport(TransportError::Endpoint(error)));
        }
        if let Some(message) = chunk.message
            && !message.content.is_empty()
        {
            on_chunk(&message.content);
            text.push_str(&message.content);
        }
        if chunk.done {
            saw_done = true;
            break;
        }
    }
    if !saw_done {
        warn!(completion_len = text.len(), "model stream ended early");
        return Err(StreamError::Transport(TransportError::Malformed(
            "stream ended before done".to_string(),
        )));
    }
    Ok(text)
}

fn normalize_endpoint(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(stream: &str) -> (Result<String, StreamError>, Vec<String>) {
        let mut seen = Vec::new();
        let result = read_chat_stream(stream.as_bytes(), &mut |c: &str| seen.push(c.to_string()));
        (result, seen)
    }

    #[test]
    fn stream_fragments_are_concatenated_in_order() {
        let stream = concat!(
            r#"{"message":{"role":"assistant","content":"```\n"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"ls\n"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"```"},"done":false}"#,
            "\n",
            r#"{"done":true}"#,
            "\n"
        );
        let (result, seen) = collect(stream);
        assert_eq!(result.ok().as_deref(), Some("```\nls\n```"));
        assert_eq!(seen, vec!["```\n", "ls\n", "```"]);
    }

    #[test]
    fn error_chunk_is_a_transport_error() {
        let (result, _) = collect("{\"error\":\"model 'nope' not found\"}\n");
        match result {
            Err(StreamError::Transport(TransportError::Endpoint(msg))) => {
                assert!(msg.contains("not found"));
            }
            _ => panic!("expected endpoint error"),
        }
    }

    #[test]
    fn stream_cut_before_done_is_an_error() {
        let stream = concat!(
            r#"{"message":{"role":"assistant","content":"```\nrm -rf ./build"},"done":false}"#,
            "\n"
        );
        let (result, seen) = collect(stream);
        match result {
            Err(StreamError::Transport(TransportError::Malformed(msg))) => {
                assert!(msg.contains("before done"));
            }
            _ => panic!("expected malformed stream error"),
        }
        assert_eq!(seen, vec!["```\nrm -rf ./build"]);
    }

    #[test]
    fn empty_stream_is_an_error() {
        let (result, _) = collect("");
        assert!(matches!(
            result,
            Err(StreamError::Transport(TransportError::Malformed(_)))
        ));
    }

    #[test]
    fn garbage_line_is_malformed() {
        let (result, _) = collect("not json\n");
        assert!(matches!(
            result,
            Err(StreamError::Transport(TransportError::Malformed(_)))
        ));
    }

    #[test]
    fn endpoint_without_scheme_gets_http() {
        assert_eq!(normalize_endpoint("localhost:11434"), "http://localhost:11434");
        assert_eq!(
            normalize_endpoint("https://llm.internal/"),
            "https://llm.internal"
        );
    }

    #[test]
    fn unreachable_endpoint_is_reported_not_empty() {
        // Port 9 (discard) is essentially never bound to an HTTP server.
        let client = OllamaClient::new("127.0.0.1:9", Some(Duration::from_secs(2))).expect("client");
        let err = client
            .complete("llama3", "hi", &mut |_: &str| {})
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unreachable { .. } | TransportError::Timeout { .. }
        ));
    }
}
