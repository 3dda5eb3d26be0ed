use std::io;
use std::net::{Ipv4Addr, Shutdown};

use anyhow::{Context, Result};
use wirelink_common::net::{self, Socket};

/// Client side of the echo demo: connects, pushes a payload, and reads the
/// echoed bytes back.
pub struct EchoClient {
    conn: Socket,
}

impl EchoClient {
    /// Connects to the echo server at `addr:port`.
    pub fn connect(addr: Ipv4Addr, port: u16) -> Result<Self> {
        let conn = net::connect(addr, port)
            .with_context(|| format!("failed to connect to {addr}:{port}"))?;
        tracing::debug!("connected to {addr}:{port}");
        Ok(Self { conn })
    }

    /// Sends `payload` and reads back exactly as many echoed bytes.
    ///
    /// The reply is shorter than the payload only if the server closed the
    /// connection mid-echo.
    pub fn roundtrip(&self, payload: &[u8]) -> io::Result<Vec<u8>> {
        self.conn.send_all(payload)?;
        let mut reply = vec![0u8; payload.len()];
        let n = self.conn.recv_exact(&mut reply)?;
        reply.truncate(n);
        Ok(reply)
    }

    /// Orderly teardown: disable both directions, then release the
    /// descriptor.
    pub fn close(self) -> Result<()> {
        if let Err(err) = self.conn.shutdown(Shutdown::Both) {
            tracing::debug!("shutdown on close: {err}");
        }
        self.conn.close().context("failed to close connection")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Once;
    use std::thread;

    use super::*;

    fn net_init() {
        static INIT: Once = Once::new();
        INIT.call_once(|| net::init().expect("subsystem init"));
    }

    #[test]
    fn roundtrips_payload_through_echo_peer() {
        net_init();
        let listener = net::listen(Ipv4Addr::LOCALHOST, 0, 1).expect("listen");
        let (_, port) = listener.local_addr().expect("local_addr");

        let peer = thread::spawn(move || {
            let conn = listener.accept().expect("accept");
            let mut buf = [0u8; 64];
            loop {
                let n = conn.recv(&mut buf).expect("recv");
                if n == 0 {
                    break;
                }
                conn.send_all(&buf[..n]).expect("send_all");
            }
            conn.close().expect("close peer side");
            listener.close().expect("close listener");
        });

        let client = EchoClient::connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        let reply = client.roundtrip(b"ping over the wire").expect("roundtrip");
        assert_eq!(reply, b"ping over the wire");
        client.close().expect("close");

        peer.join().expect("peer thread");
    }
}
