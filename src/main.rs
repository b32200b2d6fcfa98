use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracesync::{parse_script, Config, LoopHandle, MemorySurfaceFactory, ScriptRunner};

#[derive(Debug, Parser)]
#[command(name = "tracesync", version, about = "Replay trace sync scripts against an in-memory client")]
struct Cli {
    /// Config file (default: ~/.tracesync/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a JSONL script and print every delivered wire message to stdout
    Replay {
        script: PathBuf,

        /// Write the captured outgoing messages as JSON to this path
        #[arg(long)]
        debug_dump: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load(),
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .with_context(|| format!("invalid log filter {:?}", config.log_filter))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    match cli.command {
        Command::Replay { script, debug_dump } => {
            let text = fs::read_to_string(&script)
                .with_context(|| format!("reading script {}", script.display()))?;
            let steps = parse_script(&text).with_context(|| format!("parsing {}", script.display()))?;

            if debug_dump.is_some() {
                config.debug_capture = true;
            }

            let factory = Arc::new(MemorySurfaceFactory::new().with_stdout_echo());
            let mut runner = ScriptRunner::new(LoopHandle::current(), &config, factory);
            runner.run(&steps).await?;
            let surfaces = runner.factory().surfaces().len();
            let export = runner.finish().await;
            tracing::info!(steps = steps.len(), surfaces, "replay finished");

            if let Some(path) = debug_dump {
                match export {
                    Some(json) => fs::write(&path, json)
                        .with_context(|| format!("writing debug dump to {}", path.display()))?,
                    None => tracing::warn!(path = %path.display(), "no messages captured, debug dump not written"),
                }
            }
        }
    }

    Ok(())
}
