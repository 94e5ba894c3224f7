//! Reflective reading assistant: answers questions using only the text of a selected chapter.

pub mod chapters;
pub mod chat;
pub mod completion;
pub mod config;
pub mod constants;
pub mod dialogue;
pub mod error;
pub mod session;
pub mod web_server;

pub use chapters::{Chapter, ChapterStore};
pub use completion::{CompletionClient, OpenAiClient};
pub use dialogue::{build_prompt, ConversationHistory, ConversationTurn, Prompt};
pub use error::ChatError;
pub use session::ChatSession;
