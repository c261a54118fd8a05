use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use ponder_core::llm::{MockBackend, RawDelta};
use ponder_core::state::{ChatSession, MessageContent};
use ponder_core::stream::LiveEvent;
use ponder_core::telemetry;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Ponder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises a full streamed turn.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let backend = MockBackend::scripted(vec![
        RawDelta::reasoning("the user is pinging me; "),
        RawDelta::reasoning("a short reply will do"),
        RawDelta::content("pong"),
        RawDelta::content("!"),
    ]);
    let session = ChatSession::new(Arc::new(backend));
    session.select_model("mock", "mock-model")?;

    let mut reasoning_events = 0usize;
    let mut content_events = 0usize;
    let message = runtime.block_on(session.submit_turn(
        "ping from xtask",
        Vec::new(),
        |event| match event {
            LiveEvent::Reasoning { .. } => reasoning_events += 1,
            LiveEvent::Content { .. } => content_events += 1,
        },
    ))?;

    ensure!(reasoning_events == 2, "expected two reasoning events");
    ensure!(content_events == 2, "expected two content events");
    ensure!(
        matches!(message.content, MessageContent::Phased { .. }),
        "expected a phased assistant message"
    );
    ensure!(session.history().len() == 2, "expected two history entries");

    info!(
        "messages" = session.history().len(),
        "smoke test conversation completed"
    );

    Ok(())
}
