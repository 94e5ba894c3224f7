use anyhow::{Context, Result};
use chapter_chat::{
    chat,
    config::{LibraryArgs, ModelArgs},
    constants::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TITLE, STATIC_DIR, TEMPLATE_DIR},
    web_server::{self, AppState, WebOptions},
    ChapterStore, OpenAiClient,
};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf};
use tokio::io::BufReader;
use tracing::{error, info};

// Define the command-line interface structure using clap
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand)]
enum Commands {
    /// Start the web server with the chapter chat page.
    Serve {
        #[command(flatten)]
        library: LibraryArgs,
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long, default_value = DEFAULT_HOST, help = "Address to bind the web server to.")]
        host: String,
        #[arg(long, default_value_t = DEFAULT_PORT, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = DEFAULT_TITLE, help = "Heading shown on the chat page.")]
        title: String,
        #[arg(long, default_value = TEMPLATE_DIR, help = "Directory to load page templates from.")]
        template_dir: PathBuf,
        #[arg(long, default_value = STATIC_DIR, help = "Directory served under /static.")]
        static_dir: PathBuf,
    },
    /// Chat about a chapter in the terminal.
    Chat {
        #[command(flatten)]
        library: LibraryArgs,
        #[command(flatten)]
        model: ModelArgs,
    },
    /// List the chapter files that would be loaded.
    Chapters {
        #[command(flatten)]
        library: LibraryArgs,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Chat { .. } => "chat",
            Commands::Chapters { .. } => "chapters",
        }
    }
}

// The main entry point of the application, using tokio's async runtime
#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for environment variables like API keys)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG environment variable (e.g., RUST_LOG=info,chapter_chat=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("chapter-chat starting with command: {}", cli.command.name());

    match cli.command {
        Commands::Serve { library, model, host, port, title, template_dir, static_dir } => {
            // Credential first, then chapters: either missing is fatal.
            let settings = model.resolve().context("Missing completion credentials")?;
            let store = ChapterStore::load(&library.dir).context("Failed to load chapters")?;
            let client = OpenAiClient::new(settings).context("Failed to build completion client")?;
            info!(model = client.model(), chapters = store.len(), "Completion client ready");

            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .context(format!("Invalid listen address {}:{}", host, port))?;
            let state = AppState::new(
                store,
                client,
                WebOptions { title, window: model.window, template_dir, static_dir },
            );

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(addr, state).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            // Pin the ctrl_c future to the stack so its address is stable
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { library, model } => {
            let settings = model.resolve().context("Missing completion credentials")?;
            let store = ChapterStore::load(&library.dir).context("Failed to load chapters")?;
            let client = OpenAiClient::new(settings).context("Failed to build completion client")?;
            info!(model = client.model(), chapters = store.len(), "Completion client ready");

            chat::run_terminal_chat(
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                &store,
                &client,
                model.window,
            )
            .await
            .context("Chat session failed")?;
        }
        Commands::Chapters { library } => {
            let store = ChapterStore::load(&library.dir).context("Failed to load chapters")?;
            for chapter in store.iter() {
                println!("{}\t{} bytes", chapter.name, chapter.text.len());
            }
        }
    }

    Ok(())
}
