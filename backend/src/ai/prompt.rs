//! Prompt construction for per-row generation.
//!
//! Every request carries the same three messages: the system directive, the
//! run's instruction, and the cell text. Nothing is rewritten or interpreted.

use serde::{Deserialize, Serialize};

/// Default system directive.
pub const DEFAULT_DIRECTIVE: &str = "You are a helpful AI assistant.";

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message
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
}

/// One generation request: directive, instruction and row text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRequest<'a> {
    pub directive: &'a str,
    pub instruction: &'a str,
    pub text: &'a str,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(directive: &'a str, instruction: &'a str, text: &'a str) -> Self {
        Self {
            directive,
            instruction,
            text,
        }
    }

    /// Messages in the order the service receives them.
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.directive),
            ChatMessage::user(self.instruction),
            ChatMessage::user(self.text),
        ]
    }
}
