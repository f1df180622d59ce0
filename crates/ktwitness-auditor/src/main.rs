//! ktwitness auditor entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ktwitness_auditor::{Auditor, Config, FileStateRepository, SystemClock, TcpClient};

#[derive(Parser)]
#[command(
    name = "ktwitness-auditor",
    about = "Third-party auditor for a key transparency service"
)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ktwitness.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    let keys = config.auditor_keys()?;

    let client = TcpClient::new(config.transport.addr.clone());
    let repository = FileStateRepository::new(config.storage.file.path.clone());
    let auditor = Auditor::new(
        client,
        repository,
        SystemClock,
        keys,
        config.auditor.batch_size,
        config.signature_interval(),
        config.auditor.signature.page_size,
    );

    auditor
        .load_stored_state()
        .await
        .context("restoring persisted auditor state")?;

    info!(
        addr = %config.transport.addr,
        interval_secs = config.auditor.interval_secs,
        "starting audit loop"
    );
    auditor.run(config.tick_interval()).await?;
    Ok(())
}
