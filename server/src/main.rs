use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use clap::Parser;
use wirelink_common::{
    config::{Endpoint, DEFAULT_BACKLOG},
    interrupt, net,
};
use wirelink_server::EchoServer;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Wirelink echo server")]
struct Args {
    /// Address to bind (defaults to WIRELINK_ADDR or the wildcard address)
    #[arg(short, long)]
    addr: Option<Ipv4Addr>,

    /// Port to bind (defaults to WIRELINK_PORT or the built-in port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen backlog
    #[arg(short, long, default_value_t = DEFAULT_BACKLOG)]
    backlog: i32,

    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    net::init().context("socket subsystem startup failed")?;

    let mut endpoint = Endpoint::from_env(Ipv4Addr::UNSPECIFIED);
    if let Some(addr) = args.addr {
        endpoint.addr = addr;
    }
    if let Some(port) = args.port {
        endpoint.port = port;
    }

    let (interrupter, token) =
        interrupt::channel().context("failed to create interrupt channel")?;
    ctrlc::set_handler(move || {
        tracing::info!("received shutdown signal");
        let _ = interrupter.interrupt();
    })
    .context("failed to set signal handler")?;

    let server = EchoServer::bind(endpoint, args.backlog).context("failed to bind echo server")?;
    let result = server.serve(&token);

    net::cleanup();
    result
}
