use std::net::Ipv4Addr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use wirelink_client::EchoClient;
use wirelink_common::{config::Endpoint, net};

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Wirelink echo client")]
struct Args {
    /// Server address (defaults to WIRELINK_ADDR or loopback)
    #[arg(short, long)]
    addr: Option<Ipv4Addr>,

    /// Server port (defaults to WIRELINK_PORT or the built-in port)
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a text payload and print the echoed reply
    Send {
        /// Payload text to send
        payload: String,
    },
    /// Time the round trip of a fixed-size payload
    Probe {
        /// Payload size in bytes
        #[arg(short, long, default_value_t = 1024)]
        size: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    net::init().context("socket subsystem startup failed")?;

    let mut endpoint = Endpoint::from_env(Ipv4Addr::LOCALHOST);
    if let Some(addr) = args.addr {
        endpoint.addr = addr;
    }
    if let Some(port) = args.port {
        endpoint.port = port;
    }

    let result = run(&args.command, endpoint);
    net::cleanup();
    result
}

fn run(command: &Commands, endpoint: Endpoint) -> Result<()> {
    let client = EchoClient::connect(endpoint.addr, endpoint.port)
        .context("failed to connect to echo server")?;

    match command {
        Commands::Send { payload } => {
            let reply = client
                .roundtrip(payload.as_bytes())
                .context("round trip failed")?;
            println!("{}", String::from_utf8_lossy(&reply));
        }
        Commands::Probe { size } => {
            let payload = vec![0xA5u8; *size];
            let started = Instant::now();
            let reply = client.roundtrip(&payload).context("round trip failed")?;
            let elapsed = started.elapsed();
            println!("echoed {} of {} bytes in {elapsed:?}", reply.len(), size);
        }
    }

    client.close().context("failed to close connection")
}
