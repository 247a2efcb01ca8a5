//! Terminal chat client: ask who covers a topic and watch the answer stream in.
//! Run with: cargo run --bin covers-chat -- --query "Who covers AI at TechCrunch?"

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use covers_agent::config::AppConfig;
use covers_agent::conversation::dispatcher::UnknownFunction;
use covers_agent::conversation::{
    Conversation, FileKvStore, KeyValueStore, PruneWorker, RecentQueries, Role, SessionManager,
    StreamReducer, ToolDispatcher, TranscriptObserver, TranscriptStore, TurnOutcome,
};
use covers_agent::execution::{AssistantsClient, ExecutionService};
use covers_agent::search::SearchService;

#[derive(Parser, Debug)]
#[command(name = "covers-chat", version, about = "Find journalists and publications covering a topic")]
struct Cli {
    /// Send this query as soon as the session starts
    #[arg(long)]
    query: Option<String>,
    /// List recent queries and exit
    #[arg(long)]
    recent: bool,
    /// Forget the current thread and transcript before starting
    #[arg(long)]
    reset: bool,
    /// Directory holding the persisted conversation
    #[arg(long, env = "COVERS_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.data_dir {
        config.transcript.data_dir = dir;
    }

    let storage: Arc<dyn KeyValueStore> = Arc::new(
        FileKvStore::open(&config.transcript.data_dir)
            .with_context(|| format!("cannot open {}", config.transcript.data_dir.display()))?,
    );

    if cli.recent {
        let mut out = std::io::stdout().lock();
        for query in RecentQueries::new(storage).list()? {
            writeln!(out, "{query}")?;
        }
        return Ok(());
    }

    let assistant_id = config.execution.require_assistant_id()?.to_string();
    let service: Arc<dyn ExecutionService> = Arc::new(AssistantsClient::new(config.execution.assistants())?);
    let session = SessionManager::new(service, assistant_id).with_policy(config.session.poll_policy());
    let search = Arc::new(SearchService::new(config.search.clone())?);
    let dispatcher = ToolDispatcher::with_search(search, Arc::new(UnknownFunction));
    let transcript = TranscriptStore::load(Arc::clone(&storage), config.transcript.retention(), Utc::now())?;

    let mut conversation = Conversation::new(session, dispatcher, transcript, storage)
        .with_reducer(StreamReducer::new(config.transcript.file_route.clone()));
    if cli.reset {
        conversation.reset().await?;
    }

    let worker = PruneWorker::new(conversation.transcript(), config.transcript.prune());
    let shutdown = worker.shutdown_notifier();
    let prune_task = worker.spawn();

    let mut renderer = TerminalRenderer::default();
    renderer.replay(&*conversation.transcript().lock().await)?;

    if let Some(query) = cli.query {
        send(&conversation, &mut renderer, &query).await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/reset" => {
                conversation.reset().await?;
                renderer = TerminalRenderer::default();
                writeln!(std::io::stdout(), "Conversation cleared.")?;
            }
            "/recent" => {
                let mut out = std::io::stdout().lock();
                for query in conversation.recent().list()? {
                    writeln!(out, "  {query}")?;
                }
            }
            text => send(&conversation, &mut renderer, text).await?,
        }
    }

    shutdown.notify_one();
    let _ = prune_task.await;
    Ok(())
}

async fn send(
    conversation: &Conversation<dyn ExecutionService>,
    renderer: &mut TerminalRenderer,
    text: &str,
) -> anyhow::Result<()> {
    let outcome = conversation.send(text, renderer).await;
    if outcome == TurnOutcome::Rejected {
        writeln!(std::io::stdout(), "(nothing sent)")?;
        return Ok(());
    }
    renderer.finish()?;
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}

/// Prints assistant text as it streams; user input is already on screen and
/// code messages are not shown.
#[derive(Default)]
struct TerminalRenderer {
    current: usize,
    printed: String,
}

impl TerminalRenderer {
    fn replay(&mut self, transcript: &TranscriptStore) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        for message in transcript.messages() {
            match message.role {
                Role::User => writeln!(out, "> {}", message.text)?,
                Role::Assistant => writeln!(out, "{}\n", message.text)?,
                Role::Code => {}
            }
        }
        self.current = transcript.len();
        self.printed.clear();
        Ok(())
    }

    fn finish(&mut self) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();
        if !self.printed.is_empty() {
            writeln!(out, "\n")?;
        }
        self.current += 1;
        self.printed.clear();
        out.flush()
    }

    fn render(&mut self, transcript: &TranscriptStore) -> std::io::Result<()> {
        let messages = transcript.messages();
        if messages.len() < self.current {
            self.current = messages.len();
            self.printed.clear();
        }

        let mut out = std::io::stdout().lock();
        while self.current < messages.len() {
            let message = &messages[self.current];
            if message.role == Role::Assistant {
                match message.text.strip_prefix(self.printed.as_str()) {
                    Some(rest) => write!(out, "{rest}")?,
                    None => write!(out, "\r{}", message.text)?,
                }
                self.printed.clone_from(&message.text);
            }

            if self.current + 1 == messages.len() {
                break;
            }
            if !self.printed.is_empty() {
                writeln!(out, "\n")?;
            }
            self.current += 1;
            self.printed.clear();
        }
        out.flush()
    }
}

impl TranscriptObserver for TerminalRenderer {
    fn on_update(&mut self, transcript: &TranscriptStore) {
        if let Err(err) = self.render(transcript) {
            tracing::warn!(%err, "Failed to render transcript");
        }
    }

    fn on_searching(&mut self, active: bool) {
        if active {
            let _ = writeln!(std::io::stdout(), "\n(searching the web...)");
        }
    }
}
