use tracing::{debug, info, warn};

use crate::chapters::ChapterStore;
use crate::completion::CompletionClient;
use crate::dialogue::{build_prompt, ConversationHistory, ConversationTurn};
use crate::error::Result;

/// State owned by one UI session: selected chapter, pending input and transcript.
///
/// The chapter store is borrowed per call and never mutated.
#[derive(Debug, Clone)]
pub struct ChatSession {
    chapter: String,
    input_buffer: String,
    history: ConversationHistory,
    window: usize,
}

impl ChatSession {
    pub fn new(store: &ChapterStore, window: usize) -> Self {
        Self {
            chapter: store.default_chapter().to_string(),
            input_buffer: String::new(),
            history: ConversationHistory::new(),
            window,
        }
    }

    /// Resumes a session from a transcript kept by the client.
    pub fn with_history(store: &ChapterStore, window: usize, history: ConversationHistory) -> Self {
        Self { history, ..Self::new(store, window) }
    }

    pub fn chapter(&self) -> &str {
        &self.chapter
    }

    /// Unknown names are accepted here and ignored at submit time.
    pub fn select_chapter(&mut self, name: impl Into<String>) {
        self.chapter = name.into();
    }

    pub fn input(&self) -> &str {
        &self.input_buffer
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input_buffer = text.into();
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Answers `message` from the selected chapter.
    ///
    /// Returns `Ok(None)` without contacting the model when the selected chapter is
    /// unknown or empty. On error the history is left untouched.
    pub async fn respond<C: CompletionClient>(
        &mut self,
        store: &ChapterStore,
        client: &C,
        message: &str,
    ) -> Result<Option<ConversationTurn>> {
        let chapter_text = match store.get(&self.chapter) {
            Some(text) if !text.is_empty() => text,
            _ => {
                debug!(chapter = %self.chapter, "No chapter text for selection, skipping reply");
                return Ok(None);
            }
        };

        let prompt = build_prompt(chapter_text, &self.history, message, self.window);
        let reply = client.complete(&prompt.system, &prompt.user).await?;

        let turn = ConversationTurn::new(message, reply);
        self.history.push(turn.clone());
        info!(chapter = %self.chapter, turns = self.history.len(), "Reply appended to transcript");
        Ok(Some(turn))
    }

    /// Submits the input buffer.
    ///
    /// The buffer is cleared once the submit completes, including the silent no-chapter
    /// case. A failed submit keeps the buffer so it can be retried.
    pub async fn submit<C: CompletionClient>(
        &mut self,
        store: &ChapterStore,
        client: &C,
    ) -> Result<Option<ConversationTurn>> {
        let message = self.input_buffer.clone();
        match self.respond(store, client, &message).await {
            Ok(turn) => {
                self.input_buffer.clear();
                Ok(turn)
            }
            Err(e) => {
                warn!(error = %e, "Submit failed, keeping input");
                Err(e)
            }
        }
    }

    /// Resets the input and the transcript.
    pub fn clear(&mut self) {
        self.input_buffer.clear();
        self.history.clear();
    }
}
