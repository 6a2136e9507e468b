use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use fdc_sim::{ControllerConfig, DriverOptions, ScriptDriver, TcpProtocol};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "controller_cli",
    version,
    about = "Scriptable fake device controller for exercising a DGI"
)]
struct Cli {
    /// Controller configuration file.
    #[arg(short, long, default_value = "controller.cfg")]
    config: PathBuf,

    /// Script of enable/disable/dieHorribly/sleep commands.
    #[arg(short, long, default_value = "dsp-script.txt")]
    script: PathBuf,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Politely disconnect from the DGI once the script is exhausted.
    #[arg(long, default_value_t = false)]
    disconnect_on_exit: bool,
}

// The main entry point for the command-line controller application.
fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("{}", "==================================".cyan());
    println!("{}", "  FREEDM Fake Device Controller".bold());
    println!("{}", "==================================".cyan());

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = ControllerConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;
    let script = fs::read_to_string(&cli.script)
        .with_context(|| format!("reading script {}", cli.script.display()))?;

    let endpoint = config.endpoint();
    info!(
        dgi = %format!("{}:{}", endpoint.peer_host, endpoint.peer_port),
        listen_port = endpoint.listen_port,
        "Controller starting"
    );

    let protocol = TcpProtocol::new(config.heartbeat_timing(), config.retry_policy());
    let options = DriverOptions {
        disconnect_on_exit: cli.disconnect_on_exit,
    };
    let mut driver = ScriptDriver::new(protocol, endpoint, options);
    let stats = driver
        .run(script.lines())
        .with_context(|| format!("running script {}", cli.script.display()))?;

    info!(
        commands = stats.commands,
        handshakes = stats.handshakes,
        heartbeats = stats.heartbeats,
        disconnects = stats.disconnects,
        recoveries = stats.recoveries,
        "Script complete"
    );
    Ok(())
}
