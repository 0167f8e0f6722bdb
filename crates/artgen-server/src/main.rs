use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use artgen_contracts::storage::{StorageSelector, StorageTarget};
use artgen_server::http::default_filename;
use artgen_server::{AppState, Config};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "artgen", version, about = "Prompt-to-image acquisition backend")]
struct Cli {
    #[arg(long, global = true, default_value = "artgen.toml")]
    config: PathBuf,
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve(ServeArgs),
    Generate(GenerateArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    /// Overrides `server.bind` from the config file.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    size: Option<String>,
    #[arg(long)]
    filename: Option<String>,
    /// Storage uid; 0 selects the default storage.
    #[arg(long, default_value_t = 0)]
    storage: u32,
    #[arg(long)]
    folder: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("artgen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let (config, validation) = Config::load_from(&cli.config)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    match cli.command {
        Command::Serve(args) => run_serve(&config, args),
        Command::Generate(args) => run_generate(&config, args),
    }
}

/// Logs go to stderr so `generate` output on stdout stays machine-readable.
fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn run_serve(config: &Config, args: ServeArgs) -> Result<i32> {
    let bind = args.bind.unwrap_or(config.server.bind);
    // Blocking HTTP clients must be built before the runtime exists.
    let state = AppState::from_config(config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    // The runtime drops before `state`, so the blocking clients are released
    // outside of it.
    runtime.block_on(artgen_server::serve(state.clone(), bind))?;
    Ok(0)
}

fn run_generate(config: &Config, args: GenerateArgs) -> Result<i32> {
    let state = AppState::from_config(config)?;
    let generated = state
        .generator()
        .generate(&args.prompt, args.size.as_deref())?;
    info!(source_url = %generated.source_url, "image generated");

    let folder = args
        .folder
        .unwrap_or_else(|| config.acquisition.default_folder.clone());
    let filename = args.filename.unwrap_or_else(default_filename);
    let target = StorageTarget::new(
        StorageSelector::from_wire(Some(args.storage)),
        &folder,
        &filename,
    )?;
    let file = state.pipeline().commit(&generated.source_url, &target)?;

    let summary = json!({
        "fileUid": file.uid,
        "storage": file.storage_uid,
        "identifier": file.identifier,
        "sha256": file.sha256,
        "prompt": generated.prompt,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(0)
}
