//! Chat relayer client tooling.

use std::time::Duration;

use clap::Parser;
use loadgen::{chat, cli, load};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();

    match cli.command {
        cli::Commands::Load {
            addr,
            conns,
            msgs_per_conn,
            same_start,
            time,
            test,
            test_timeout,
        } => {
            tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(
                addr.as_str(),
            )
            .map_err(|e| anyhow::anyhow!("bad address: {}", e))?;
            let opts = load::LoadOptions {
                addr,
                conns,
                msgs_per_conn,
                same_start,
                test,
                test_timeout: Duration::from_secs(test_timeout),
            };
            let outcome = load::run(opts).await;
            if let Some(report) = &outcome.report {
                print!("{}", report);
            }
            if time {
                println!("{:.6}", outcome.elapsed.as_secs_f64());
            }
        }
        cli::Commands::Chat { addr } => {
            chat::run(&addr).await?;
        }
    }

    Ok(())
}
