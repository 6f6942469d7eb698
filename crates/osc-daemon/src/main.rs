//! The daemon binary. No HTTP server is started here (§6.2): this process
//! exists to prove the bootstrap wiring runs and keeps the HeadSync and
//! TreeSyncer background tasks alive until told to stop. A façade crate
//! wraps `Daemon`'s route methods in whatever HTTP framework it chooses.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use osc_core::config::CoreConfig;
use osc_daemon::Daemon;

#[derive(Parser)]
#[command(name = "osc-daemon")]
#[command(about = "Object Sync Core daemon", long_about = None)]
struct Cli {
    /// Root directory for changes/acl/keys/users/identity.json.
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// TOML config file, merged under `OSC_*` environment overrides.
    #[arg(long, default_value = "./osc-config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = CoreConfig::load(&cli.config)?;
    if cli.data_dir != PathBuf::from("./data") {
        config.data_dir = cli.data_dir;
    }

    let daemon = Daemon::start(config).await?;
    tracing::info!(aid = %daemon.identity.record.aid, "osc-daemon started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    daemon.close();
    Ok(())
}
