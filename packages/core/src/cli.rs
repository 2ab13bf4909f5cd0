use std::net::SocketAddr;

use clap::Parser;

/// Missed-bolus detector CLI arguments
///
/// Everything else comes from the environment (or a `.env` file).
#[derive(Debug, Parser)]
#[command(
    name = "missed-bolus-detector",
    version,
    about = "Watches CGM data for glucose rises with no recorded bolus and notifies a caregiver"
)]
pub struct Cli {
    /// Poll interval in seconds (overrides POLL_INTERVAL_SECONDS)
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Alert state database URL (overrides STATE_DB_URL)
    #[arg(long)]
    pub state_db: Option<String>,

    /// Address for the /health, /metrics and /alerts/history endpoints (overrides METRICS_ADDR)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,
}
