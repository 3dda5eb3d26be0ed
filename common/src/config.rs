use std::env;
use std::net::Ipv4Addr;

/// Port the demo server and client use when none is given.
pub const DEFAULT_PORT: u16 = 27031;

/// Listen backlog used by the demo server.
pub const DEFAULT_BACKLOG: i32 = 16;

const ADDR_ENV: &str = "WIRELINK_ADDR";
const PORT_ENV: &str = "WIRELINK_PORT";

/// Endpoint the server binds and the client connects to.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// IPv4 address, host byte order
    pub addr: Ipv4Addr,
    /// TCP port, host byte order
    pub port: u16,
}

impl Endpoint {
    pub fn new(addr: Ipv4Addr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Endpoint taken from `WIRELINK_ADDR` / `WIRELINK_PORT`, falling back
    /// to `default_addr` and [`DEFAULT_PORT`]. Values that fail to parse
    /// are treated like absent ones.
    pub fn from_env(default_addr: Ipv4Addr) -> Self {
        let addr = env::var(ADDR_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(default_addr);
        let port = env::var(PORT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self { addr, port }
    }
}
