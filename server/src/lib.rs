use std::io;
use std::net::{Ipv4Addr, Shutdown};
use std::thread;

use anyhow::{Context, Result};
use wirelink_common::{
    config::Endpoint,
    interrupt::InterruptToken,
    net::{self, Socket},
};

/// A TCP server that relays every received byte back to its sender.
///
/// The accept loop blocks only in the interruptible wait, so a signal on
/// the paired [`Interrupter`](wirelink_common::Interrupter) stops the
/// server between connections. Each accepted connection is relayed on its
/// own thread; the transport itself stays single-call blocking throughout.
pub struct EchoServer {
    listener: Socket,
}

impl EchoServer {
    /// Binds the listening socket for `endpoint` with the given backlog.
    pub fn bind(endpoint: Endpoint, backlog: i32) -> Result<Self> {
        let listener = net::listen(endpoint.addr, endpoint.port, backlog).with_context(|| {
            format!("failed to listen on {}:{}", endpoint.addr, endpoint.port)
        })?;
        Ok(Self { listener })
    }

    /// Address the listener actually bound, e.g. after binding port 0.
    pub fn local_addr(&self) -> io::Result<(Ipv4Addr, u16)> {
        self.listener.local_addr()
    }

    /// Serves connections until the interrupt token fires, then closes the
    /// listener.
    pub fn serve(self, token: &InterruptToken) -> Result<()> {
        let (addr, port) = self
            .listener
            .local_addr()
            .context("failed to read bound address")?;
        tracing::info!("echo server listening on {addr}:{port}");

        loop {
            if !token.wait_readable(&self.listener) {
                tracing::info!("shutdown requested, leaving accept loop");
                break;
            }
            match self.listener.accept() {
                Ok(conn) => {
                    tracing::info!("accepted connection");
                    thread::spawn(move || {
                        if let Err(err) = relay(&conn) {
                            tracing::warn!("connection ended with error: {err}");
                        }
                        if let Err(err) = conn.shutdown(Shutdown::Both) {
                            tracing::debug!("shutdown after relay: {err}");
                        }
                        if let Err(err) = conn.close() {
                            tracing::warn!("closing connection failed: {err}");
                        }
                    });
                }
                Err(err) => {
                    tracing::error!("accept failed: {err}");
                }
            }
        }

        self.listener
            .close()
            .context("failed to close listener")?;
        Ok(())
    }
}

/// Echoes bytes back until the peer closes its sending side.
fn relay(conn: &Socket) -> io::Result<()> {
    let mut buf = [0u8; 4096];
    loop {
        let n = conn.recv(&mut buf)?;
        if n == 0 {
            return Ok(());
        }
        conn.send_all(&buf[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Once;
    use std::thread;

    use wirelink_common::interrupt;

    use super::*;

    fn net_init() {
        static INIT: Once = Once::new();
        INIT.call_once(|| net::init().expect("subsystem init"));
    }

    #[test]
    fn echoes_payload_and_stops_on_interrupt() {
        net_init();
        let server = EchoServer::bind(Endpoint::new(Ipv4Addr::LOCALHOST, 0), 4).expect("bind");
        let (addr, port) = server.local_addr().expect("local_addr");
        let (interrupter, token) = interrupt::channel().expect("channel");

        let handle = thread::spawn(move || server.serve(&token));

        let conn = net::connect(addr, port).expect("connect");
        let payload = b"walk the bytes around the loop";
        conn.send_all(payload).expect("send_all");
        let mut reply = vec![0u8; payload.len()];
        let n = conn.recv_exact(&mut reply).expect("recv_exact");
        assert_eq!(n, payload.len());
        assert_eq!(&reply, payload);
        conn.close().expect("close");

        interrupter.interrupt().expect("interrupt");
        handle
            .join()
            .expect("server thread")
            .expect("serve result");
    }

    #[test]
    fn serves_sequential_connections() {
        net_init();
        let server = EchoServer::bind(Endpoint::new(Ipv4Addr::LOCALHOST, 0), 4).expect("bind");
        let (addr, port) = server.local_addr().expect("local_addr");
        let (interrupter, token) = interrupt::channel().expect("channel");

        let handle = thread::spawn(move || server.serve(&token));

        for round in 0u8..3 {
            let conn = net::connect(addr, port).expect("connect");
            let payload = [round; 128];
            conn.send_all(&payload).expect("send_all");
            let mut reply = [0u8; 128];
            let n = conn.recv_exact(&mut reply).expect("recv_exact");
            assert_eq!(n, 128);
            assert_eq!(reply, payload);
            conn.close().expect("close");
        }

        interrupter.interrupt().expect("interrupt");
        handle
            .join()
            .expect("server thread")
            .expect("serve result");
    }
}
