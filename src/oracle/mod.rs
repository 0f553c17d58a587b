//! Oracle gateway — integration with the external LLM completion service.
//!
//! Defines the client trait and message types for one-shot chat
//! completions. Two implementations:
//! - `OpenAiOracle`: calls an OpenAI-compatible chat-completions API (production)
//! - `MockOracle`: returns scripted replies (testing)
//!
//! The oracle is treated as a stateless text transform: an ordered message
//! list in, a single content string out. No retries, no streaming, one
//! blocking round trip per call. Failures are a typed error, so callers can
//! never mistake a transport failure for assistant content.

mod openai;

pub use openai::OpenAiOracle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Speaker of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Parse a persisted role string. Unknown roles are rejected so
    /// malformed snapshot entries can be dropped.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single transcript entry, also the oracle wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Errors from oracle calls.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("API key not configured (set OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("provider returned no content")]
    Empty,
}

/// Client trait for the LLM completion service.
///
/// Abstracts over transport (HTTP, mock) so the conversation controller
/// and extraction helpers don't depend on how the oracle is reached.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send an ordered message list and return the assistant's reply text.
    ///
    /// By convention the list begins with a system instruction; this is
    /// not enforced.
    async fn ask(&self, messages: &[ChatMessage]) -> Result<String, OracleError>;
}

enum Scripted {
    Reply(String),
    Failure,
}

/// Mock oracle for testing: pops scripted replies in FIFO order, with an
/// optional fallback reply once the script is exhausted.
pub struct MockOracle {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
        }
    }

    /// Queue a scripted reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(reply.into()));
        self
    }

    /// Queue a scripted failure.
    pub fn with_failure(self) -> Self {
        self.script.lock().unwrap().push_back(Scripted::Failure);
        self
    }

    /// Reply to return once the script is exhausted.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Number of scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn ask(&self, _messages: &[ChatMessage]) -> Result<String, OracleError> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Failure) => Err(OracleError::Api {
                status: 500,
                body: "scripted failure".to_string(),
            }),
            None => match &self.fallback {
                Some(text) => Ok(text.clone()),
                None => Err(OracleError::Empty),
            },
        }
    }
}
