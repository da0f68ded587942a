//! SAMAAN Chat - Terminal Driver
//!
//! Drives the conversation engine from a terminal. A page extraction saved
//! as JSON stands in for the browser tab, so the same prompts the side panel
//! would send can be tried from a shell.
//!
//! # Usage
//!
//! ```bash
//! # One question about a saved page
//! samaan-chat --page article.json "Summarise the main points"
//!
//! # Interactive session (/clear, /reload, /quit)
//! samaan-chat --page article.json
//!
//! # Print the final answer as HTML instead of plain text
//! samaan-chat --html "What is a monad?"
//!
//! # Check that the endpoint answers
//! samaan-chat --check
//! ```
//!
//! # Environment Variables
//!
//! - `SAMAAN_BASE_URL`, `SAMAAN_MODEL`, `SAMAAN_API_KEY`: endpoint overrides
//! - `SAMAAN_CONFIG`: config file path
//! - `RUST_LOG`: Log filter (overrides `--log-level`)
//!
//! Ctrl-C cancels the answer in flight; a second Ctrl-C at the prompt exits.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use samaan_conductor::{
    load_config, load_config_from_path, render, CompletionBackend, Conductor, ConductorMessage,
    ExtractionResponse, OpenAiBackend, Progress, TurnOutcome,
};

/// SAMAAN Chat - ask questions about a web page from the terminal
#[derive(Parser, Debug)]
#[command(name = "samaan-chat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "SAMAAN_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Page extraction result (JSON) to use as context
    #[arg(short = 'p', long, value_name = "FILE")]
    page: Option<PathBuf>,

    /// Print final answers as HTML
    #[arg(long)]
    html: bool,

    /// Check the endpoint and exit
    #[arg(long)]
    check: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "SAMAAN_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Question to ask; starts an interactive session when omitted
    prompt: Option<String>,
}

/// A line typed at the interactive prompt
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Quit,
    Clear,
    Reload,
    Ask(String),
    Nothing,
}

impl Command {
    fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Nothing,
            "/quit" | "/exit" => Self::Quit,
            "/clear" => Self::Clear,
            "/reload" => Self::Reload,
            text => Self::Ask(text.to_string()),
        }
    }
}

/// Where a surface message goes on the terminal
#[derive(Debug, PartialEq, Eq)]
enum Output {
    /// Streamed text, no trailing newline
    Inline(String),
    /// A full line on stdout
    Line(String),
    /// A full line on stderr
    Status(String),
}

/// Map an engine message to terminal output
fn present(msg: &ConductorMessage, html: bool) -> Option<Output> {
    match msg {
        ConductorMessage::Token { text, .. } => Some(Output::Inline(text.clone())),
        ConductorMessage::Render {
            document,
            complete: true,
            ..
        } => Some(if html {
            Output::Line(format!("\n{}", document.to_html()))
        } else {
            Output::Line(String::new())
        }),
        ConductorMessage::Notice { content, .. } => {
            Some(Output::Status(render(content).plain_text()))
        }
        ConductorMessage::Welcome { content } => Some(Output::Line(render(content).plain_text())),
        ConductorMessage::ContextStatus { text, .. } => Some(Output::Status(format!("[{text}]"))),
        ConductorMessage::State { state } => {
            debug!(state = state.description(), "State");
            None
        }
        _ => None,
    }
}

/// Write everything the engine has sent so far
fn flush_messages(rx: &mut mpsc::Receiver<ConductorMessage>, html: bool) {
    let mut stdout = std::io::stdout().lock();
    while let Ok(msg) = rx.try_recv() {
        match present(&msg, html) {
            Some(Output::Inline(text)) => {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
            Some(Output::Line(line)) => {
                let _ = writeln!(stdout, "{line}");
            }
            Some(Output::Status(line)) => eprintln!("{line}"),
            None => {}
        }
    }
}

/// Read a saved page extraction
fn read_page(path: &Path) -> Result<ExtractionResponse> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read page file: {path:?}"))?;
    ExtractionResponse::from_json(&json)
        .with_context(|| format!("Invalid page extraction in {path:?}"))
}

/// Load the page file (if any) into the conductor
async fn load_context<B: CompletionBackend>(
    conductor: &mut Conductor<B>,
    page: Option<&Path>,
) -> Result<()> {
    let response = match page {
        Some(path) => read_page(path)?,
        None => ExtractionResponse {
            success: false,
            data: None,
            error: Some("No page file given".into()),
        },
    };
    conductor.refresh_context(response).await;
    Ok(())
}

/// Run one turn to completion, printing as it streams
async fn ask<B: CompletionBackend>(
    conductor: &mut Conductor<B>,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    text: &str,
    html: bool,
) -> Result<TurnOutcome> {
    conductor.submit(text).await?;
    let Some(cancel) = conductor.cancel_handle() else {
        anyhow::bail!("turn was not started");
    };
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C, cancelling response");
            cancel.cancel();
        }
    });

    let outcome = loop {
        let progress = conductor.step().await;
        flush_messages(rx, html);
        match progress {
            Progress::Finished(outcome) => break Ok(outcome),
            Progress::Idle => break Err(anyhow::anyhow!("no active turn")),
            Progress::Fragment | Progress::Painted => {}
        }
    };
    watcher.abort();
    outcome
}

/// Interactive session on stdin
async fn repl<B: CompletionBackend>(
    conductor: &mut Conductor<B>,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    args: &Args,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match Command::parse(&line) {
            Command::Nothing => {}
            Command::Quit => break,
            Command::Clear => conductor.reset().await,
            Command::Reload => {
                if let Err(e) = load_context(conductor, args.page.as_deref()).await {
                    warn!(error = %e, "Reload failed");
                    eprintln!("{e:#}");
                }
            }
            Command::Ask(text) => {
                ask(conductor, rx, &text, args.html).await?;
            }
        }
        flush_messages(rx, args.html);
    }

    Ok(())
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "samaan_chat={level},samaan_conductor={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match args.config {
        Some(ref path) => load_config_from_path(path)
            .with_context(|| format!("Failed to load config: {path:?}"))?,
        None => load_config().context("Failed to load config")?,
    };
    info!(base_url = %config.base_url, model = %config.model, "Configuration loaded");

    let backend = OpenAiBackend::from_config(&config);
    if args.check {
        if backend.health_check().await {
            println!("{} is reachable", config.base_url);
            return Ok(());
        }
        anyhow::bail!("{} did not answer", config.base_url);
    }

    let (tx, mut rx) = mpsc::channel(256);
    let mut conductor = Conductor::new(backend, config, tx);
    load_context(&mut conductor, args.page.as_deref()).await?;

    match args.prompt {
        Some(ref prompt) => {
            while rx.try_recv().is_ok() {}
            let outcome = ask(&mut conductor, &mut rx, prompt, args.html).await?;
            if let TurnOutcome::Failed { error, .. } = outcome {
                anyhow::bail!(error);
            }
        }
        None => {
            flush_messages(&mut rx, args.html);
            repl(&mut conductor, &mut rx, &args).await?;
        }
    }

    conductor.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use samaan_conductor::{Document, TurnId};

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("  "), Command::Nothing);
        assert_eq!(Command::parse("/clear"), Command::Clear);
        assert_eq!(Command::parse("/reload\n"), Command::Reload);
        assert_eq!(Command::parse("/exit"), Command::Quit);
        assert_eq!(
            Command::parse("  what is this?  "),
            Command::Ask("what is this?".into())
        );
    }

    #[test]
    fn test_present_messages() {
        let token = ConductorMessage::Token {
            turn_id: TurnId::new(),
            text: "Hel".into(),
        };
        assert_eq!(present(&token, false), Some(Output::Inline("Hel".into())));

        let done = ConductorMessage::Render {
            turn_id: TurnId::new(),
            document: render("**hi**"),
            complete: true,
        };
        assert_eq!(
            present(&done, true),
            Some(Output::Line(
                "\n<span class=\"md-line\"><strong>hi</strong></span><br>".into()
            ))
        );

        let partial = ConductorMessage::Render {
            turn_id: TurnId::new(),
            document: Document::default(),
            complete: false,
        };
        assert_eq!(present(&partial, false), None);

        let status = ConductorMessage::ContextStatus {
            loaded: true,
            text: "Example · 3 chars".into(),
        };
        assert_eq!(
            present(&status, false),
            Some(Output::Status("[Example · 3 chars]".into()))
        );
    }

    #[test]
    fn test_read_page() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"success":true,"data":{{"url":"https://example.com","title":"Example"}}}}"#
        )
        .unwrap();

        let response = read_page(file.path()).unwrap();
        assert!(response.success);
        assert_eq!(response.data.unwrap().title, "Example");

        assert!(read_page(Path::new("/nonexistent/page.json")).is_err());
    }
}
