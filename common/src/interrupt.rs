//! Cross-thread cancellation for blocking socket waits.
//!
//! Blocking `accept`/`recv` calls have no built-in cancellation. To make an
//! operation cancellable, a thread blocks in
//! [`InterruptToken::wait_readable`] on the target socket together with the
//! read end of an anonymous pipe, and only performs the (now non-blocking)
//! operation once the socket is reported readable. A controlling thread
//! holds the matching [`Interrupter`] and wakes every waiter by writing a
//! byte to the pipe, or simply by dropping the `Interrupter`, which closes
//! the write end.

use std::io;
#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
#[cfg(windows)]
use std::os::windows::io::{AsRawSocket, FromRawSocket, OwnedSocket};

use crate::net::{sys, NetError, Socket};

#[cfg(unix)]
type PipeEnd = OwnedFd;
#[cfg(windows)]
type PipeEnd = OwnedSocket;

/// Creates the interrupt channel: an anonymous byte pipe on POSIX, a
/// connected loopback socket pair on Windows.
///
/// Both ends release their descriptor when dropped.
pub fn channel() -> Result<(Interrupter, InterruptToken), NetError> {
    let (read_raw, write_raw) = sys::pipe().map_err(|err| {
        tracing::error!("interrupt pipe creation failed: {err}");
        NetError::Pipe(err)
    })?;
    // SAFETY: both descriptors were just created and are owned exclusively
    // by the wrappers constructed here.
    let (read_end, write_end) = unsafe { (wrap(read_raw), wrap(write_raw)) };
    Ok((Interrupter { end: write_end }, InterruptToken { end: read_end }))
}

#[cfg(unix)]
unsafe fn wrap(raw: sys::RawPipe) -> PipeEnd {
    OwnedFd::from_raw_fd(raw)
}

#[cfg(windows)]
unsafe fn wrap(raw: sys::RawPipe) -> PipeEnd {
    OwnedSocket::from_raw_socket(raw as std::os::windows::io::RawSocket)
}

/// Write end of the interrupt channel.
///
/// The signal is sticky: once fired, every subsequent wait on the paired
/// [`InterruptToken`] reports cancellation. Dropping the `Interrupter`
/// closes the write end, which wakes waiters exactly like an explicit
/// [`interrupt`](Interrupter::interrupt) call.
#[derive(Debug)]
pub struct Interrupter {
    end: PipeEnd,
}

impl Interrupter {
    /// Signals cancellation by writing one byte into the channel.
    ///
    /// The byte carries no payload semantics; only the readiness it causes
    /// matters.
    pub fn interrupt(&self) -> io::Result<()> {
        sys::pipe_write(self.raw(), 1)
    }

    #[cfg(unix)]
    fn raw(&self) -> sys::RawPipe {
        self.end.as_raw_fd()
    }

    #[cfg(windows)]
    fn raw(&self) -> sys::RawPipe {
        self.end.as_raw_socket() as sys::RawPipe
    }
}

/// Read end of the interrupt channel, paired with a data socket in
/// [`wait_readable`](InterruptToken::wait_readable).
#[derive(Debug)]
pub struct InterruptToken {
    end: PipeEnd,
}

impl InterruptToken {
    /// Blocks until `socket` is readable or the channel is signaled.
    ///
    /// Returns `true` when the socket is readable and the channel has not
    /// fired: the next `recv`/`accept` on it will not block. Returns
    /// `false` on cancellation; the caller should abandon the operation
    /// and unwind. When both are ready at once, cancellation wins. A
    /// failure of the underlying wait is conservatively reported as
    /// cancellation rather than risking an unbounded block.
    pub fn wait_readable(&self, socket: &Socket) -> bool {
        match sys::wait_readable(socket.raw(), self.raw()) {
            Ok(proceed) => proceed,
            Err(err) => {
                tracing::warn!("interruptible wait failed, treating as cancelled: {err}");
                false
            }
        }
    }

    #[cfg(unix)]
    fn raw(&self) -> sys::RawPipe {
        self.end.as_raw_fd()
    }

    #[cfg(windows)]
    fn raw(&self) -> sys::RawPipe {
        self.end.as_raw_socket() as sys::RawPipe
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::net;

    fn idle_listener() -> net::Socket {
        static INIT: Once = Once::new();
        INIT.call_once(|| net::init().expect("subsystem init"));
        net::listen(Ipv4Addr::LOCALHOST, 0, 4).expect("listen")
    }

    #[test]
    fn interrupt_wins_over_idle_socket() {
        let listener = idle_listener();
        let (interrupter, token) = channel().expect("channel");

        interrupter.interrupt().expect("interrupt");
        assert!(!token.wait_readable(&listener));
        // The signal stays latched.
        assert!(!token.wait_readable(&listener));
    }

    #[test]
    fn interrupt_beats_later_data_readiness() {
        let listener = idle_listener();
        let (_, port) = listener.local_addr().expect("local_addr");
        let (interrupter, token) = channel().expect("channel");

        interrupter.interrupt().expect("interrupt");
        let conn = net::connect(Ipv4Addr::LOCALHOST, port).expect("connect");

        // Both descriptors are now readable; cancellation must win.
        assert!(!token.wait_readable(&listener));
        conn.close().expect("close");
    }

    #[test]
    fn data_readiness_wins_when_not_interrupted() {
        let listener = idle_listener();
        let (_, port) = listener.local_addr().expect("local_addr");
        let (_interrupter, token) = channel().expect("channel");

        let conn = net::connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        assert!(token.wait_readable(&listener));

        let accepted = listener.accept().expect("accept");
        accepted.close().expect("close accepted");
        conn.close().expect("close");
    }

    #[test]
    fn dropping_interrupter_wakes_blocked_waiter() {
        let listener = idle_listener();
        let (interrupter, token) = channel().expect("channel");

        let waiter = thread::spawn(move || token.wait_readable(&listener));
        thread::sleep(Duration::from_millis(50));
        drop(interrupter);

        assert!(!waiter.join().expect("waiter thread"));
    }
}
