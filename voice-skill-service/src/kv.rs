//! Key-value access for pairings and bindings.
//!
//! The external store speaks a pipelined-command HTTP protocol: one POST to
//! `/pipeline` carries an ordered array of commands and returns an array of
//! `{ "result": .. }` / `{ "error": .. }` objects aligned with them. Every
//! failure degrades to "no value" / "not stored"; callers treat an unavailable
//! store exactly like a missing key.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::KvConfig;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store is not configured")]
    NotConfigured,
    #[error("key-value transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("key-value store answered with status {0}")]
    Status(u16),
    #[error("malformed pipeline response: {0}")]
    Malformed(String),
    #[error("command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

/// Minimal store contract used by the binding layer
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    /// Store `value`, optionally expiring after `ttl`. Returns whether every
    /// command was accepted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool;
}

#[derive(Debug, Deserialize)]
struct PipelineReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Store client for the HTTP pipeline protocol
pub struct PipelineKvStore {
    client: reqwest::Client,
    endpoint: Option<String>,
    token: Option<String>,
}

impl PipelineKvStore {
    pub fn new(client: reqwest::Client, rest_url: Option<String>, token: Option<String>) -> Self {
        let endpoint = rest_url.map(|url| format!("{}/pipeline", url.trim_end_matches('/')));
        Self {
            client,
            endpoint,
            token,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &KvConfig) -> Self {
        Self::new(client, config.rest_url.clone(), config.rest_token.clone())
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some() && self.token.is_some()
    }

    /// Send one pipeline request and return the per-command results in order
    async fn pipeline(&self, commands: &[Value]) -> Result<Vec<Option<Value>>, KvError> {
        let (Some(endpoint), Some(token)) = (&self.endpoint, &self.token) else {
            return Err(KvError::NotConfigured);
        };

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(token)
            .json(commands)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(KvError::Status(status.as_u16()));
        }

        let replies: Vec<PipelineReply> = response
            .json()
            .await
            .map_err(|e| KvError::Malformed(e.to_string()))?;

        if replies.len() != commands.len() {
            return Err(KvError::Malformed(format!(
                "expected {} replies, got {}",
                commands.len(),
                replies.len()
            )));
        }

        replies
            .into_iter()
            .zip(commands)
            .map(|(reply, command)| match reply.error {
                Some(message) => Err(KvError::Command {
                    command: command_name(command),
                    message,
                }),
                None => Ok(reply.result),
            })
            .collect()
    }
}

fn command_name(command: &Value) -> String {
    command
        .get(0)
        .and_then(Value::as_str)
        .unwrap_or("?")
        .to_string()
}

#[async_trait]
impl KvStore for PipelineKvStore {
    async fn get(&self, key: &str) -> Option<String> {
        match self.pipeline(&[json!(["GET", key])]).await {
            Ok(mut results) => match results.pop().flatten() {
                Some(Value::String(value)) => Some(value),
                Some(Value::Null) | None => None,
                Some(other) if other.is_number() => Some(other.to_string()),
                Some(_) => {
                    debug!(key = %key, "Ignoring non-scalar GET result");
                    None
                }
            },
            Err(e) => {
                warn!(key = %key, error = %e, "KV get failed, treating key as absent");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let mut commands = vec![json!(["SET", key, value])];
        if let Some(ttl) = ttl {
            commands.push(json!(["EXPIRE", key, ttl.as_secs()]));
        }

        match self.pipeline(&commands).await {
            Ok(_) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "KV set failed, value not stored");
                false
            }
        }
    }
}

/// Process-local store with TTL support, for local runs and tests
#[derive(Clone, Default)]
pub struct InMemoryKvStore {
    entries: Arc<DashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining lifetime of a key; `None` for missing or non-expiring keys
    pub fn expires_in(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .and_then(|entry| entry.1)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) if deadline <= Instant::now() => true,
                _ => return Some(entry.0.clone()),
            },
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), (value.to_string(), deadline));
        true
    }
}
