use std::net::Ipv4Addr;
use std::thread;

use anyhow::{Context, Result};
use tracing::{error, info};
use wirelink_common::{
    config::{Endpoint, DEFAULT_BACKLOG},
    interrupt, net,
};
use wirelink_server::EchoServer;

/// Daemon example with signal handling and graceful shutdown
fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("=== Wirelink Echo Daemon Example ===");
    println!("This example demonstrates a long-running server with signal handling");

    net::init().context("socket subsystem startup failed")?;

    // Set up signal handling for graceful shutdown
    let (interrupter, token) =
        interrupt::channel().context("Failed to create interrupt channel")?;

    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping server...");
        let _ = interrupter.interrupt();
    })
    .context("Failed to set signal handler")?;

    let endpoint = Endpoint::from_env(Ipv4Addr::UNSPECIFIED);
    let server = EchoServer::bind(endpoint, DEFAULT_BACKLOG).context("Failed to bind echo server")?;
    let (addr, port) = server.local_addr().context("Failed to read bound address")?;

    println!("✓ Echo server listening on {addr}:{port}");
    println!("Press Ctrl+C to stop the server gracefully");
    println!();

    let server_handle = thread::spawn(move || match server.serve(&token) {
        Ok(()) => info!("Server stopped normally"),
        Err(e) => error!("Server error: {e}"),
    });

    // serve() only returns once the interrupt fires, so joining here waits
    // for Ctrl+C.
    match server_handle.join() {
        Ok(()) => info!("Server thread finished successfully"),
        Err(_) => error!("Server thread panicked"),
    }

    net::cleanup();
    println!("✓ Server shutdown completed");
    Ok(())
}
