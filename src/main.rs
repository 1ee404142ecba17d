mod audio;
mod io;
mod pipeline;
mod session;
mod state;
mod ui;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncBufReadExt;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use io::{CpalDevices, LiveConnector};
use session::context::{build_system_instruction, load_listings};
use session::{AgentConfig, ControllerOptions, SessionController};
use state::VoiceState;

const DEFAULT_LISTINGS: &str = "config/listings.json";

#[derive(Parser, Debug)]
#[command(name = "voice-concierge")]
#[command(about = "Talk to a real-estate voice agent over the Gemini Live API")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "VOICE_CONCIERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Listings JSON, overrides `context.listings` from the config
    #[arg(short, long)]
    listings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Start a voice session (default)
    Talk,
    /// List the models visible to the API key
    Models,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_concierge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = AgentConfig::load(args.config.as_deref())?;
    if let Some(listings) = args.listings {
        config.context.listings = Some(listings);
    }
    config.validate()?;
    info!("Config: {:?}", config);

    match args.command.unwrap_or(Command::Talk) {
        Command::Talk => talk(config).await,
        Command::Models => models(config).await,
    }
}

async fn talk(config: AgentConfig) -> Result<()> {
    let default_listings = Path::new(DEFAULT_LISTINGS);
    let listings = match &config.context.listings {
        Some(path) => load_listings(path)?,
        None if default_listings.exists() => load_listings(default_listings)?,
        None => {
            warn!("No listings configured, the agent will have no inventory");
            Vec::new()
        }
    };
    let instruction = build_system_instruction(&config.context.agency, &listings)
        .context("Failed to build system instruction")?;

    let state = VoiceState::new();
    let controller = SessionController::new(
        LiveConnector::from_config(&config),
        CpalDevices,
        state.clone(),
        config.session_config(instruction),
        ControllerOptions::from_config(&config),
    );

    let ui = tokio::spawn(ui::terminal::run(state.clone()));

    let started = tokio::select! {
        started = controller.start_voice() => started,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted while connecting");
            ui.abort();
            return Ok(());
        }
    };
    if let Err(e) = started {
        // Let the UI print the final status before leaving.
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        ui.abort();
        return Err(e).context("Could not start the voice session");
    }

    println!("Talking to the {} agent. Press Enter or Ctrl+C to hang up.", config.context.agency);

    let mut status = state.subscribe_status();
    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = stdin.next_line() => info!("Hanging up"),
        _ = status.wait_for(|s| s.is_terminal()) => {}
    }

    controller.end_voice().await;
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    ui.abort();

    println!();
    println!("Session ended: {}", state.status());
    Ok(())
}

async fn models(config: AgentConfig) -> Result<()> {
    let models = io::models::list_models(io::models::MODELS_ENDPOINT, &config.api_key).await?;
    if models.is_empty() {
        println!("No models available for this key.");
        return Ok(());
    }

    println!("Available models:");
    for model in models {
        let live = if model.supports_live() { "  (live)" } else { "" };
        println!("- {}{}", model.name, live);
    }
    Ok(())
}
