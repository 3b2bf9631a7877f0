use clap::Parser;
use client::{render, run_query};
use log::info;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Query a game server's status port", long_about = None)]
struct Args {
    /// Query address of the game server (ip:queryport)
    #[arg(short = 's', long)]
    server: SocketAddr,

    /// Time to wait for the complete response in milliseconds
    #[arg(short = 't', long, default_value = "2000")]
    timeout_ms: u64,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for detailed logging");
    }

    let args = Args::parse();
    info!("Querying {}", args.server);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let report = run_query(args.server, Duration::from_millis(args.timeout_ms), &cancel).await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", render(&report));
    }

    Ok(())
}
