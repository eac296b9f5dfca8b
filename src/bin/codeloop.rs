use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use codeloop::api::{ApiClient, ModelService};
use codeloop::config::Config;
use codeloop::state::{
    ConversationState, ModeConfig, ModeController, Orchestrator, PromptConfirmation,
    SessionStore, StreamingSink,
};
use codeloop::tools::default_registry;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const RULE_WIDTH: usize = 50;
const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "codeloop")]
#[command(about = "Conversational coding assistant that works through tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Working directory for the agent (default: current directory)
    #[arg(short = 'd', long = "dir", global = true)]
    dir: Option<PathBuf>,

    /// Model identifier
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Execution mode: normal, plan, yolo or build
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Stream tokens and tool activity as they happen
    #[arg(long, global = true, overrides_with = "no_stream")]
    stream: bool,

    #[arg(long = "no-stream", global = true)]
    no_stream: bool,

    /// Ask before each tool call in modes that require confirmation
    #[arg(long, global = true)]
    confirm_tools: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on a task (interactive when no task is given)
    Run {
        task: Vec<String>,
    },
    /// Start an interactive session
    Interactive {
        /// Resume or create the session with this id
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
    /// Show version information
    Version,
    /// List execution modes
    Modes,
    /// List saved sessions
    Sessions,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("CODELOOP_LOG")
        .unwrap_or_else(|_| EnvFilter::new("codeloop=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.global)?;

    match cli.command {
        Some(Commands::Version) => {
            println!("codeloop version {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Modes) => {
            let modes = ModeController::new(&config.mode).unwrap_or_default();
            println!("{}", modes.list_modes());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Sessions) => {
            let store = SessionStore::new(&config.session_dir)?;
            let ids = store.list()?;
            if ids.is_empty() {
                println!("No saved sessions in {}", store.storage_dir().display());
            }
            for id in ids {
                println!("{id}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Run { task }) if !task.is_empty() => {
            run_task(&config, &cli.global, &task.join(" ")).await
        }
        Some(Commands::Run { .. }) => interactive(&config, &cli.global, None).await,
        Some(Commands::Interactive { session }) => {
            interactive(&config, &cli.global, session.as_deref()).await
        }
        None => interactive(&config, &cli.global, None).await,
    }
}

fn load_config(args: &GlobalArgs) -> Result<Config> {
    let mut config = Config::load()?;
    if let Some(dir) = &args.dir {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Invalid working directory '{}'", dir.display()))?;
        config.set_working_dir(dir);
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(api_key) = args.api_key.as_deref().filter(|v| !v.trim().is_empty()) {
        config.api_key = Some(api_key.to_string());
    }
    if let Some(mode) = &args.mode {
        config.mode = mode.clone();
    }
    if args.stream {
        config.streaming = true;
    }
    if args.no_stream {
        config.streaming = false;
    }
    Ok(config)
}

fn build_orchestrator(config: &Config, args: &GlobalArgs) -> Result<Orchestrator> {
    config.validate()?;

    let model: Arc<dyn ModelService> = Arc::new(ApiClient::new(config)?);
    let registry = default_registry(config.working_dir.clone());
    let modes = ModeController::new(&config.mode).unwrap_or_default();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("interrupt received");
        interrupt.cancel();
        // A second Ctrl-C while a turn is still winding down exits at once.
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted");
            std::process::exit(INTERRUPT_EXIT_CODE);
        }
    });

    let mut orchestrator = Orchestrator::new(model, registry)
        .with_modes(modes)
        .with_cancellation(cancel);
    if config.streaming {
        orchestrator = orchestrator.with_sink(Box::new(StreamingSink::stdout()));
    }
    if args.confirm_tools {
        orchestrator =
            orchestrator.with_confirmation(Box::new(PromptConfirmation::new(io::stdin(), io::stderr())));
    }
    Ok(orchestrator)
}

async fn run_task(config: &Config, args: &GlobalArgs, task: &str) -> Result<ExitCode> {
    let mut orchestrator = build_orchestrator(config, args)?;
    let working_dir = config.working_dir.display().to_string();

    println!("Running task: {task}");
    println!("{}", "-".repeat(RULE_WIDTH));

    match orchestrator.run(task, &working_dir).await {
        Ok(response) => {
            if orchestrator.is_streaming() {
                println!();
            } else {
                println!("\nAgent Response:");
                println!("{}", "-".repeat(RULE_WIDTH));
                println!("{response}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            eprintln!("Error: {error}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn interactive(
    config: &Config,
    args: &GlobalArgs,
    session_id: Option<&str>,
) -> Result<ExitCode> {
    let working_dir = config.working_dir.display().to_string();
    let mut store = SessionStore::new(&config.session_dir)?;
    let restored = match session_id {
        Some(id) => store.load(id)?.map(|record| record.restore_messages()),
        None => None,
    };
    let resumed = restored.is_some();
    if !resumed {
        store.create(session_id, &working_dir);
    }
    if let Some(record) = store.current_mut() {
        record.set_metadata("model", serde_json::json!(config.model));
    }
    let session_label = store
        .current()
        .map(|record| record.session_id.clone())
        .unwrap_or_default();

    let mut orchestrator = build_orchestrator(config, args)?.with_sessions(store);
    if let Some(messages) = restored {
        orchestrator.resume(ConversationState::with_messages(messages, working_dir.as_str()));
    }

    let rule = "=".repeat(RULE_WIDTH);
    println!("codeloop interactive agent");
    println!("{rule}");
    println!("Working directory: {working_dir}");
    println!("Model: {}", config.model);
    println!("{}", orchestrator.modes().get_mode_info());
    if resumed {
        println!("Resumed session: {session_label}");
    } else {
        println!("Session: {session_label}");
    }
    println!("Modes: {}", ModeConfig::names().join(", "));
    println!("Type /help for commands, 'exit' to quit");
    println!("{rule}");

    orchestrator
        .run_interactive(&working_dir, io::stdin(), io::stdout())
        .await?;

    println!("\nGoodbye!");
    io::stdout().flush().ok();
    Ok(ExitCode::SUCCESS)
}
