//! Waterfall CLI
//!
//! Drives the four-phase pipeline from the terminal, and serves scripted runs
//! for local development.

mod api;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use waterfall_core::config::ClientConfig;
use waterfall_core::models::LlmProvider;
use waterfall_core::waterfall::{
    FileRef, HttpTransport, Phase, PhaseStatus, PipelineState, RunOutcome, StepOutcome,
    WaterfallController, WorkspaceContext,
};

use api::replay::{run_replay_server, ReplayScript};

type Controller = WaterfallController<HttpTransport>;

#[derive(Parser, Clone)]
#[command(
    author,
    version,
    about = "Waterfall - staged Architect/Reasoner/Executor/Reviewer pipeline"
)]
struct Args {
    /// Waterfall server base URL (overrides config and WATERFALL_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// LLM provider to request
    #[arg(long, global = true)]
    provider: Option<LlmProvider>,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Stream a full waterfall run
    Run {
        /// The prompt to build from
        prompt: String,
        /// Skip the server-side gate for this request
        #[arg(long)]
        force_proceed: bool,
        /// Proceed through gates without asking
        #[arg(short, long)]
        yes: bool,
        /// Notepad file sent as context
        #[arg(long)]
        notepad: Option<PathBuf>,
        /// Open files sent as context
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Run a single phase via the step endpoint
    Step {
        /// architect, reasoner, executor or reviewer
        phase: Phase,
        /// Step input (parsed as JSON when possible)
        input: String,
    },
    /// Serve a scripted run on localhost
    Replay {
        /// JSONL file with one frame per line
        #[arg(long)]
        script: PathBuf,
        /// Port to listen on
        #[arg(short, long, default_value = "8787")]
        port: u16,
        /// Pause between frames
        #[arg(long, default_value = "250")]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        CliCommand::Replay {
            script,
            port,
            delay_ms,
        } => {
            let script = ReplayScript::load(&script).await?;
            run_replay_server(script, port, Duration::from_millis(delay_ms)).await
        }
        CliCommand::Run {
            prompt,
            force_proceed,
            yes,
            notepad,
            files,
        } => {
            let config = resolve_config(args.base_url, args.provider).await?;
            let context = load_context(notepad, files).await?;
            run_pipeline(&config, &prompt, force_proceed, yes, context).await
        }
        CliCommand::Step { phase, input } => {
            let config = resolve_config(args.base_url, args.provider).await?;
            run_step(&config, phase, &input).await
        }
    }
}

async fn resolve_config(
    base_url: Option<String>,
    provider: Option<LlmProvider>,
) -> Result<ClientConfig> {
    let mut config = ClientConfig::load().await?;
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if let Some(provider) = provider {
        config.provider = provider;
    }
    Ok(config)
}

async fn load_context(notepad: Option<PathBuf>, files: Vec<PathBuf>) -> Result<WorkspaceContext> {
    let notepad_content = match notepad {
        Some(path) => Some(
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read notepad: {:?}", path))?,
        ),
        None => None,
    };

    let mut open_files = Vec::with_capacity(files.len());
    for path in files {
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read file: {:?}", path))?;
        open_files.push(FileRef {
            name: path.file_name().map(|n| n.to_string_lossy().to_string()),
            path: path.to_string_lossy().to_string(),
            content: Some(content),
        });
    }

    Ok(WorkspaceContext {
        notepad_content,
        open_files,
    })
}

async fn run_pipeline(
    config: &ClientConfig,
    prompt: &str,
    force_proceed: bool,
    yes: bool,
    context: WorkspaceContext,
) -> Result<()> {
    let controller = Controller::from_config(config)?.with_context(context);
    let printer = tokio::spawn(print_updates(controller.subscribe()));

    println!("🚀 Running waterfall via {} ({})", config.base_url, config.provider.display_name());
    let mut outcome =
        with_interrupt(&controller, controller.run_full_waterfall(prompt, force_proceed)).await;

    let result = loop {
        match outcome {
            RunOutcome::Paused { phase, reason } => {
                println!("⏸  {} gated: {}", phase.display_name(), reason);
                if !yes && !confirm("   Proceed? [y/N] ").await? {
                    println!("   Stopped at the gate.");
                    break Ok(());
                }
                outcome = with_interrupt(&controller, controller.proceed_with_waterfall()).await;
            }
            RunOutcome::Completed(payload) => {
                println!("✅ Waterfall complete");
                for phase in Phase::ALL {
                    if let Some(data) = payload.get(phase) {
                        println!("── {} ──", phase.display_name());
                        println!("{}", serde_json::to_string_pretty(data)?);
                    }
                }
                break Ok(());
            }
            RunOutcome::Incomplete => {
                println!("⚠️  Stream ended before the final result");
                break Ok(());
            }
            RunOutcome::Cancelled => {
                println!("🛑 Cancelled");
                break Ok(());
            }
            RunOutcome::Failed(message) => {
                break Err(anyhow::anyhow!("Waterfall failed: {}", message))
            }
        }
    };

    drop(controller);
    let _ = printer.await;
    result
}

async fn run_step(config: &ClientConfig, phase: Phase, input: &str) -> Result<()> {
    let controller = Controller::from_config(config)?;
    let input = serde_json::from_str::<Value>(input)
        .unwrap_or_else(|_| Value::String(input.to_string()));

    println!("▶ Running {} step", phase.display_name());
    match with_interrupt(&controller, controller.run_waterfall_step(phase, input)).await {
        StepOutcome::Completed(payload) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        StepOutcome::Cancelled => {
            println!("🛑 Cancelled");
            Ok(())
        }
        StepOutcome::Failed(message) => Err(anyhow::anyhow!(
            "{} step failed: {}",
            phase.display_name(),
            message
        )),
    }
}

/// Await `fut`, cancelling the active run on Ctrl-C
async fn with_interrupt<F: Future>(controller: &Controller, fut: F) -> F::Output {
    tokio::pin!(fut);
    tokio::select! {
        output = &mut fut => output,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel_waterfall();
            fut.await
        }
    }
}

async fn confirm(question: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(question.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Print each phase status change until the controller is dropped
async fn print_updates(mut rx: watch::Receiver<PipelineState>) {
    let mut last = rx.borrow_and_update().clone();
    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        for phase in Phase::ALL {
            let (before, after) = (&last.phases[phase], &state.phases[phase]);
            if before.status == after.status && before.error == after.error {
                continue;
            }
            match after.status {
                PhaseStatus::Processing => println!("▶ {}", phase.display_name()),
                PhaseStatus::Completed => println!("✓ {}", phase.display_name()),
                PhaseStatus::Error => println!(
                    "✗ {}: {}",
                    phase.display_name(),
                    after.error.as_deref().unwrap_or("unknown error")
                ),
                PhaseStatus::Paused | PhaseStatus::Idle => {}
            }
        }
        last = state;
    }
}
