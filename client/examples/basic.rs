use std::net::Ipv4Addr;

use anyhow::Result;
use wirelink_client::EchoClient;
use wirelink_common::{config::Endpoint, net};

fn main() -> Result<()> {
    println!("=== Wirelink Echo Client Basic Example ===");

    net::init()?;

    let endpoint = Endpoint::from_env(Ipv4Addr::LOCALHOST);
    println!("Connecting to {}:{}...", endpoint.addr, endpoint.port);
    println!("(start the wirelink-server binary first)");

    let client = EchoClient::connect(endpoint.addr, endpoint.port)?;

    println!("Sending payload...");
    let reply = client.roundtrip(b"hello from the basic example")?;
    println!("Server echoed: {}", String::from_utf8_lossy(&reply));

    client.close()?;
    net::cleanup();

    println!("✓ Example completed successfully");
    Ok(())
}
