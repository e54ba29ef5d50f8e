//! CLI argument parsing.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "loadgen")]
#[command(about = "Chat relayer client: load generator and interactive chat")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open many connections and send chat messages from each
    Load {
        /// Relayer address, including scheme (e.g. ws://127.0.0.1:8000/)
        #[arg(long, value_name = "URL")]
        addr: String,

        /// Number of connections
        #[arg(short = 'c', long = "conns", default_value_t = 1)]
        conns: usize,

        /// Messages sent by each connection
        #[arg(long = "mpc", default_value_t = 1)]
        msgs_per_conn: usize,

        /// Start sending only after every worker has connected
        #[arg(long)]
        same_start: bool,

        /// Print the total elapsed seconds
        #[arg(long)]
        time: bool,

        /// Check what the relayer sends back and print a report
        #[arg(long)]
        test: bool,

        /// Max seconds to connect, and to send/receive, per worker
        #[arg(long, value_name = "SECS", default_value_t = 60)]
        test_timeout: u64,
    },

    /// Interactive chat: stdin lines are sent, everything received is printed
    Chat {
        /// Relayer address, including scheme
        #[arg(long, value_name = "URL")]
        addr: String,
    },
}
