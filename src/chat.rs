// Line-oriented chat for the terminal. Drives a single session over any async reader/writer.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::chapters::ChapterStore;
use crate::completion::CompletionClient;
use crate::session::ChatSession;

#[derive(Debug, PartialEq)]
enum Command<'a> {
    Ask(&'a str),
    Chapters,
    Select(&'a str),
    Clear,
    Quit,
}

fn parse_command(line: &str) -> Command<'_> {
    match line.split_once(char::is_whitespace) {
        Some(("/chapter", name)) => Command::Select(name.trim()),
        _ => match line {
            "/chapters" => Command::Chapters,
            "/clear" => Command::Clear,
            "/quit" | "/exit" => Command::Quit,
            text => Command::Ask(text),
        },
    }
}

pub async fn run_terminal_chat<R, W, C>(
    input: R,
    mut output: W,
    store: &ChapterStore,
    client: &C,
    window: usize,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    C: CompletionClient,
{
    info!("Starting terminal chat session...");
    let mut session = ChatSession::new(store, window);
    output
        .write_all(
            format!(
                "Chapter: {}\nCommands: /chapters, /chapter <name>, /clear, /quit\n",
                session.chapter()
            )
            .as_bytes(),
        )
        .await?;

    let mut lines = input.lines();
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let text = match parse_command(line) {
            Command::Quit => break,
            Command::Chapters => store
                .names()
                .into_iter()
                .map(|name| {
                    let marker = if name == session.chapter() { "*" } else { " " };
                    format!("{} {}\n", marker, name)
                })
                .collect::<String>(),
            Command::Select(name) => {
                if store.get(name).is_some() {
                    session.select_chapter(name);
                    format!("Chapter: {}\n", name)
                } else {
                    format!("Unknown chapter: {}\n", name)
                }
            }
            Command::Clear => {
                session.clear();
                "Conversation cleared.\n".to_string()
            }
            Command::Ask(message) => {
                session.set_input(message);
                match session.submit(store, client).await {
                    Ok(Some(turn)) => format!("Assistant: {}\n", turn.assistant),
                    Ok(None) => String::new(),
                    Err(e) => {
                        warn!("Completion failed: {}", e);
                        format!("Error: {}\n", e)
                    }
                }
            }
        };
        output.write_all(text.as_bytes()).await?;
    }

    output.flush().await?;
    info!(turns = session.history().len(), "Terminal chat session finished.");
    Ok(())
}
