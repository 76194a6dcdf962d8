//! xrpane compositor: a floating 2-D UI surface in an XR session.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use xrpane_compositor::backend::{self, headless::HeadlessConfig};
use xrpane_compositor::config::CompositorConfig;

#[derive(Parser, Debug)]
#[command(name = "xrpane-compositor", about = "XR compositor for a controller-driven 2-D UI surface")]
struct Cli {
    /// Backend to use: headless or auto
    #[arg(long, default_value = "auto")]
    backend: String,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// YAML input script for the headless backend (default: built-in demo)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Background command sent at startup, e.g. `none`, `grid`, `dds|sky.dds`
    #[arg(long)]
    background: Option<String>,

    /// Headless display interval in milliseconds
    #[arg(long, default_value = "11")]
    frame_interval_ms: u64,

    /// Override startup.first-frame-timeout-ms
    #[arg(long)]
    first_frame_timeout_ms: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let backend_type = backend::BackendType::parse(&cli.backend)
        .ok_or_else(|| anyhow::anyhow!("unknown backend: {}. Use: headless or auto", cli.backend))?;

    let mut config = match &cli.config {
        Some(path) => CompositorConfig::from_yaml_file(path)?,
        None => CompositorConfig::default(),
    };
    if let Some(ms) = cli.first_frame_timeout_ms {
        config.startup.first_frame_timeout_ms = ms;
    }
    let config = config.validated()?;

    backend::run(
        backend_type,
        HeadlessConfig {
            compositor: config,
            script: cli.script,
            background: cli.background,
            frame_interval: Duration::from_millis(cli.frame_interval_ms.max(1)),
        },
    )
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("xrpane-compositor {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "xrpane_compositor=info".into()),
        )
        .init();

    info!("xrpane-compositor v{} starting", env!("CARGO_PKG_VERSION"));
    info!("backend: {}", cli.backend);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
