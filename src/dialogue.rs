//! Conversation history and context-constrained prompt assembly.

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::constants::FALLBACK_REPLY;

/// One user message and the assistant's reply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
    /// Local `HH:MM:SS` when the reply arrived. Display only.
    #[serde(default)]
    pub timestamp: String,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
            timestamp: Local::now().format("%H:%M:%S").to_string(),
        }
    }
}

/// Append-only transcript of a single session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The most recent `size` turns, oldest first.
    pub fn window(&self, size: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(size);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// The two messages sent to the model for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn system_instruction(chapter_text: &str) -> String {
    format!(
        "You are a reflective reading assistant. Only use the chapter below to answer.\n\
        Help the user reflect deeply, make connections to life, think critically, and explore key ideas.\n\
        Do not use any external knowledge. If unsure or irrelevant, respond: '{}'\n\n\
        Chapter Context:\n{}",
        FALLBACK_REPLY, chapter_text
    )
}

/// Renders the windowed history as `User:`/`Assistant:` pairs followed by an open
/// `Assistant:` line for the new message.
pub fn format_chat_prompt(message: &str, history: &ConversationHistory, window: usize) -> String {
    let mut prompt = String::new();
    for turn in history.window(window) {
        prompt.push_str(&format!("User: {}\nAssistant: {}\n", turn.user, turn.assistant));
    }
    prompt.push_str(&format!("User: {}\nAssistant:", message));
    prompt
}

pub fn build_prompt(
    chapter_text: &str,
    history: &ConversationHistory,
    message: &str,
    window: usize,
) -> Prompt {
    Prompt {
        system: system_instruction(chapter_text),
        user: format_chat_prompt(message, history, window),
    }
}
