use super::Provider;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,

    /// Seconds since UNIX epoch.
    pub created_at: u64,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: now_secs(),
        }
    }

    /// Append streamed text to an in-progress assistant message.
    pub fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }
}

/// Everything needed to start one chat request.
///
/// Built fresh per send and moved into the client; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub provider: Provider,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct CatalogSpec {
    pub provider: Provider,
    pub endpoint: String,
    pub api_key: String,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Serialize a conversation into the provider-agnostic
/// `[{"role":..,"content":..}]` list.
///
/// Empty assistant placeholders (a response that has not started yet) are skipped.
pub fn messages_json(messages: &[ChatMessage]) -> anyhow::Result<String> {
    let wire: Vec<WireMessage<'_>> = messages
        .iter()
        .filter(|m| !(m.role == Role::Assistant && m.content.is_empty()))
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        })
        .collect();
    Ok(serde_json::to_string(&wire)?)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
