//! CLI argument parsing.

use clap::Parser;

#[derive(Parser)]
#[command(name = "relayer")]
#[command(about = "Single-room WebSocket chat relayer")]
pub struct Cli {
    /// Address to listen on
    #[arg(value_name = "HOST:PORT")]
    pub addr: String,

    /// Number of runtime worker threads [default: one per core]
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,
}
