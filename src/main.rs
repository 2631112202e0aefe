use std::{
    io::{self, IsTerminal},
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use planbridge::{Bridge, BridgeError, Config, FallbackIdPolicy, Mode};

#[derive(Parser)]
#[command(name = "planbridge", version, about = "Run one plan or task entry point over stdin/stdout")]
struct Cli {
    /// Which entry point to call
    #[arg(long, value_enum)]
    mode: Mode,

    /// Path to the user script
    #[arg(long)]
    script: PathBuf,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Template for task fallback ids, must contain {task_name}
    #[arg(long, env = "PLANBRIDGE_FALLBACK_ID_TEMPLATE")]
    fallback_id_template: Option<String>,
}

fn main() -> ExitCode {
    // stdout carries the payload, so diagnostics only go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("planbridge=info,warn")))
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mode = cli.mode;
    let script = cli.script.display().to_string();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%mode, %script, class = err.class(), "{err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<(), BridgeError> {
    let config = match &cli.config {
        Some(path) => Config::create(path)?,
        None => Config::default(),
    };
    let policy = match cli.fallback_id_template {
        Some(template) => FallbackIdPolicy::new(template)?,
        None => config.bridge.fallback_id_template,
    };
    debug!(fallback_id_template = policy.template(), "starting bridge");

    let bridge = Bridge::new(policy);
    bridge.run(cli.mode, &cli.script, io::stdin().lock(), io::stdout().lock())
}
