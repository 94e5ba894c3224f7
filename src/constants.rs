// Fixed defaults. Anything a user may override is exposed through the CLI in `config`.

/// Environment variable holding the chat-completion credential.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Number of recent turns replayed into each prompt.
pub const DEFAULT_WINDOW: usize = 5;

/// What the assistant is told to say when the chapter does not cover a question.
pub const FALLBACK_REPLY: &str = "I don't know.";

// Chapter files are `chapter_*.txt` or `Chapter_*.txt`.
pub const CHAPTER_PREFIXES: [&str; 2] = ["chapter_", "Chapter_"];
pub const CHAPTER_EXTENSION: &str = ".txt";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7860;
pub const DEFAULT_TITLE: &str = "Reflective Chatbot";

pub const TEMPLATE_DIR: &str = "templates";
pub const STATIC_DIR: &str = "static";
