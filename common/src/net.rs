use std::io;
use std::mem;
use std::net::{Ipv4Addr, Shutdown};

use thiserror::Error;

/// Errors reported by socket setup operations.
///
/// Transfer operations (`recv`/`send` and their fully-blocking variants)
/// return plain [`io::Error`]s instead and are not logged by this layer;
/// setup failures are logged where they occur.
#[derive(Debug, Error)]
pub enum NetError {
    /// Platform socket subsystem could not be started
    #[error("socket subsystem startup failed: {0}")]
    Startup(#[source] io::Error),

    /// A new socket descriptor could not be allocated
    #[error("socket allocation failed: {0}")]
    Allocate(#[source] io::Error),

    /// The connection attempt was rejected or timed out
    #[error("connect to {addr}:{port} failed: {source}")]
    Connect {
        addr: Ipv4Addr,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The local endpoint could not be bound
    #[error("bind to {addr}:{port} failed: {source}")]
    Bind {
        addr: Ipv4Addr,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The bound socket could not be marked passive
    #[error("listen failed: {0}")]
    Listen(#[source] io::Error),

    /// No connection could be accepted on the listener
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The interrupt channel could not be created
    #[error("interrupt pipe creation failed: {0}")]
    Pipe(#[source] io::Error),
}

/// One-time startup of the platform socket subsystem.
///
/// Must be called once per process, before any other operation in this
/// module. Repeated calls are not guaranteed to be idempotent. A no-op on
/// POSIX platforms; on Windows this runs `WSAStartup` and the subsystem
/// must not be used if it fails.
pub fn init() -> Result<(), NetError> {
    sys::startup().map_err(|err| {
        tracing::error!("socket subsystem startup failed: {err}");
        NetError::Startup(err)
    })
}

/// Releases the subsystem state acquired by [`init`].
///
/// Call at most once, after every socket has been closed. A no-op on POSIX
/// platforms.
pub fn cleanup() {
    sys::teardown();
}

/// Opens a TCP connection to `addr:port`.
///
/// The endpoint is given in host byte order and converted internally. The
/// call blocks for the platform's default TCP connect timeout; no timeout
/// is applied by this layer. On failure the partially created descriptor
/// is closed before the error is returned.
pub fn connect(addr: Ipv4Addr, port: u16) -> Result<Socket, NetError> {
    let raw = sys::socket_stream().map_err(|err| {
        tracing::error!("socket allocation failed: {err}");
        NetError::Allocate(err)
    })?;

    if let Err(err) = sys::connect(raw, addr, port) {
        tracing::error!("connect to {addr}:{port} failed: {err}");
        let _ = sys::close(raw);
        return Err(NetError::Connect { addr, port, source: err });
    }

    Ok(Socket { raw })
}

/// Opens a listening socket bound to `addr:port` with the given backlog.
///
/// `SO_REUSEADDR` is set before binding; failure to set it is logged and
/// otherwise ignored. Binding to [`Ipv4Addr::UNSPECIFIED`] behaves exactly
/// like binding to a specific address. On any failure the partially
/// created descriptor is closed before the error is returned.
pub fn listen(addr: Ipv4Addr, port: u16, backlog: i32) -> Result<Socket, NetError> {
    let raw = sys::socket_stream().map_err(|err| {
        tracing::error!("socket allocation failed: {err}");
        NetError::Allocate(err)
    })?;

    if let Err(err) = sys::set_reuse_addr(raw) {
        tracing::warn!("failed to set SO_REUSEADDR: {err}");
    }

    if let Err(err) = sys::bind(raw, addr, port) {
        tracing::error!("bind to {addr}:{port} failed: {err}");
        let _ = sys::close(raw);
        return Err(NetError::Bind { addr, port, source: err });
    }

    if let Err(err) = sys::listen(raw, backlog) {
        tracing::error!("listen on {addr}:{port} failed: {err}");
        let _ = sys::close(raw);
        return Err(NetError::Listen(err));
    }

    Ok(Socket { raw })
}

/// An open TCP endpoint owned by the caller.
///
/// The descriptor is released exactly once: explicitly through
/// [`Socket::close`], which consumes the value and reports the OS result,
/// or implicitly when the value is dropped. A closed socket cannot be
/// used again; `close` takes `self`, so such code does not compile.
#[derive(Debug)]
pub struct Socket {
    raw: sys::RawSocket,
}

impl Socket {
    /// Blocks until a pending connection is available on this listener and
    /// returns the accepted connection.
    ///
    /// The peer address is collected by the underlying call and discarded.
    /// Fails if the listener was closed or shut down concurrently.
    pub fn accept(&self) -> Result<Socket, NetError> {
        let raw = sys::accept(self.raw).map_err(|err| {
            tracing::error!("accept failed: {err}");
            NetError::Accept(err)
        })?;
        Ok(Socket { raw })
    }

    /// One best-effort receive into `buf`.
    ///
    /// `Ok(0)` means the peer closed its sending side in an orderly way.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        sys::recv(self.raw, buf, false)
    }

    /// Blocks until `buf` is completely filled, the connection closes, or
    /// an error occurs.
    ///
    /// Delegates to the platform's full-buffer receive flag rather than
    /// looping. If the peer closes mid-read, the short count reported by
    /// the platform primitive is returned as-is and the remainder of the
    /// stream is lost; this mirrors the primitive's own semantics.
    pub fn recv_exact(&self, buf: &mut [u8]) -> io::Result<usize> {
        sys::recv(self.raw, buf, true)
    }

    /// One best-effort send; returns the number of bytes actually written.
    pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
        sys::send(self.raw, buf)
    }

    /// Sends the whole buffer, looping over best-effort sends.
    ///
    /// On success every byte of `buf` has been handed to the transport. On
    /// failure the number of bytes already transmitted is not reported;
    /// callers cannot resume a partial send. Each iteration either advances
    /// the write cursor or returns an error, so the loop cannot spin.
    pub fn send_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            let written = sys::send(self.raw, buf)?;
            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "send made no progress",
                ));
            }
            buf = &buf[written..];
        }
        Ok(())
    }

    /// Disables further receives and/or sends without releasing the
    /// descriptor.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        sys::shutdown(self.raw, how)
    }

    /// Returns the locally bound address, e.g. the port assigned by the OS
    /// after binding port 0.
    pub fn local_addr(&self) -> io::Result<(Ipv4Addr, u16)> {
        sys::local_addr(self.raw)
    }

    /// Releases the descriptor and reports the OS result.
    ///
    /// Consuming `self` makes a second close, or any use after close, a
    /// compile error.
    pub fn close(self) -> io::Result<()> {
        let raw = self.raw;
        mem::forget(self);
        sys::close(raw)
    }

    pub(crate) fn raw(&self) -> sys::RawSocket {
        self.raw
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = sys::close(self.raw);
    }
}

#[cfg(unix)]
pub(crate) mod sys {
    use std::io;
    use std::mem;
    use std::net::{Ipv4Addr, Shutdown};
    use std::os::fd::{BorrowedFd, RawFd};
    use std::ptr;

    use nix::sys::socket::{setsockopt, sockopt::ReuseAddr};

    pub(crate) type RawSocket = RawFd;
    pub(crate) type RawPipe = RawFd;

    // Linux delivers SIGPIPE on a send to a closed peer unless it is
    // suppressed at the call site.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    const SEND_FLAGS: libc::c_int = 0;

    pub(crate) fn startup() -> io::Result<()> {
        Ok(())
    }

    pub(crate) fn teardown() {}

    fn sockaddr_in(addr: Ipv4Addr, port: u16) -> libc::sockaddr_in {
        // SAFETY: sockaddr_in is plain old data; all-zero is a valid value.
        let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
        sin.sin_family = libc::AF_INET as libc::sa_family_t;
        sin.sin_addr = libc::in_addr {
            s_addr: u32::from(addr).to_be(),
        };
        sin.sin_port = port.to_be();
        sin
    }

    pub(crate) fn socket_stream() -> io::Result<RawSocket> {
        // SAFETY: no pointer arguments.
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(fd)
    }

    pub(crate) fn connect(fd: RawSocket, addr: Ipv4Addr, port: u16) -> io::Result<()> {
        let sin = sockaddr_in(addr, port);
        // SAFETY: `sin` is a valid sockaddr_in and the length matches it.
        let rc = unsafe {
            libc::connect(
                fd,
                &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn set_reuse_addr(fd: RawSocket) -> io::Result<()> {
        // SAFETY: `fd` is open and stays owned by the caller for the
        // duration of the borrow.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        setsockopt(&fd, ReuseAddr, &true).map_err(io::Error::from)
    }

    pub(crate) fn bind(fd: RawSocket, addr: Ipv4Addr, port: u16) -> io::Result<()> {
        let sin = sockaddr_in(addr, port);
        // SAFETY: `sin` is a valid sockaddr_in and the length matches it.
        let rc = unsafe {
            libc::bind(
                fd,
                &sin as *const libc::sockaddr_in as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn listen(fd: RawSocket, backlog: i32) -> io::Result<()> {
        // SAFETY: no pointer arguments.
        let rc = unsafe { libc::listen(fd, backlog) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn accept(fd: RawSocket) -> io::Result<RawSocket> {
        // SAFETY: `peer` and `len` are valid out-parameters sized for a
        // sockaddr_in; all-zero is a valid initial value for both.
        let conn = unsafe {
            let mut peer: libc::sockaddr_in = mem::zeroed();
            let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            libc::accept(
                fd,
                &mut peer as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        };
        if conn < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(conn)
    }

    pub(crate) fn recv(fd: RawSocket, buf: &mut [u8], wait_all: bool) -> io::Result<usize> {
        let flags = if wait_all { libc::MSG_WAITALL } else { 0 };
        // SAFETY: the pointer and length come from a valid mutable slice.
        let n = unsafe {
            libc::recv(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                flags,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub(crate) fn send(fd: RawSocket, buf: &[u8]) -> io::Result<usize> {
        // SAFETY: the pointer and length come from a valid slice.
        let n = unsafe {
            libc::send(
                fd,
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                SEND_FLAGS,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(n as usize)
    }

    pub(crate) fn shutdown(fd: RawSocket, how: Shutdown) -> io::Result<()> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        // SAFETY: no pointer arguments.
        let rc = unsafe { libc::shutdown(fd, how) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn close(fd: RawSocket) -> io::Result<()> {
        // SAFETY: `fd` is owned by the caller and is not used again after
        // this call.
        let rc = unsafe { libc::close(fd) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub(crate) fn local_addr(fd: RawSocket) -> io::Result<(Ipv4Addr, u16)> {
        // SAFETY: `sin` and `len` are valid out-parameters sized for a
        // sockaddr_in.
        let (sin, rc) = unsafe {
            let mut sin: libc::sockaddr_in = mem::zeroed();
            let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let rc = libc::getsockname(
                fd,
                &mut sin as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            );
            (sin, rc)
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((
            Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
            u16::from_be(sin.sin_port),
        ))
    }

    pub(crate) fn pipe() -> io::Result<(RawPipe, RawPipe)> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a valid two-element out array.
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((fds[0], fds[1]))
    }

    pub(crate) fn pipe_write(fd: RawPipe, byte: u8) -> io::Result<()> {
        // SAFETY: writing one byte from a valid stack location.
        let n = unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until `data` or `intr` is readable. `Ok(false)` means the
    /// interrupt descriptor fired; `Ok(true)` means `data` is readable and
    /// the interrupt descriptor is not set.
    pub(crate) fn wait_readable(data: RawSocket, intr: RawPipe) -> io::Result<bool> {
        // SAFETY: the fd_set lives on this stack frame and both
        // descriptors are open for the duration of the call.
        unsafe {
            let mut rfds: libc::fd_set = mem::zeroed();
            libc::FD_ZERO(&mut rfds);
            libc::FD_SET(data, &mut rfds);
            libc::FD_SET(intr, &mut rfds);

            let nfds = data.max(intr) + 1;
            let ready = libc::select(
                nfds,
                &mut rfds,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null_mut(),
            );
            if ready < 0 {
                return Err(io::Error::last_os_error());
            }
            // A blocking select only returns 0 on timeout, and none is set.
            debug_assert!(ready > 0);
            if libc::FD_ISSET(intr, &rfds) {
                return Ok(false);
            }
            debug_assert!(libc::FD_ISSET(data, &rfds));
            Ok(true)
        }
    }
}

#[cfg(windows)]
pub(crate) mod sys {
    use std::io;
    use std::mem;
    use std::net::{Ipv4Addr, Shutdown};
    use std::ptr;

    use windows_sys::Win32::Networking::WinSock;

    pub(crate) type RawSocket = WinSock::SOCKET;
    pub(crate) type RawPipe = WinSock::SOCKET;

    fn last_error() -> io::Error {
        // SAFETY: no arguments.
        io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() })
    }

    pub(crate) fn startup() -> io::Result<()> {
        // SAFETY: `wsa` is a valid out-parameter for WSAStartup.
        let rc = unsafe {
            let mut wsa: WinSock::WSADATA = mem::zeroed();
            WinSock::WSAStartup(0x0202, &mut wsa)
        };
        if rc != 0 {
            // WSAStartup reports its error directly; WSAGetLastError is not
            // usable before startup has succeeded.
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(())
    }

    pub(crate) fn teardown() {
        // SAFETY: no arguments.
        unsafe {
            WinSock::WSACleanup();
        }
    }

    fn sockaddr_in(addr: Ipv4Addr, port: u16) -> WinSock::SOCKADDR_IN {
        // SAFETY: SOCKADDR_IN is plain old data; all-zero is a valid value.
        let mut sin: WinSock::SOCKADDR_IN = unsafe { mem::zeroed() };
        sin.sin_family = WinSock::AF_INET;
        sin.sin_port = port.to_be();
        sin.sin_addr = WinSock::IN_ADDR {
            S_un: WinSock::IN_ADDR_0 {
                S_addr: u32::from(addr).to_be(),
            },
        };
        sin
    }

    pub(crate) fn socket_stream() -> io::Result<RawSocket> {
        // SAFETY: no pointer arguments.
        let sock = unsafe { WinSock::socket(WinSock::AF_INET as i32, WinSock::SOCK_STREAM, 0) };
        if sock == WinSock::INVALID_SOCKET {
            return Err(last_error());
        }
        Ok(sock)
    }

    pub(crate) fn connect(sock: RawSocket, addr: Ipv4Addr, port: u16) -> io::Result<()> {
        let sin = sockaddr_in(addr, port);
        // SAFETY: `sin` is a valid SOCKADDR_IN and the length matches it.
        let rc = unsafe {
            WinSock::connect(
                sock,
                &sin as *const WinSock::SOCKADDR_IN as *const WinSock::SOCKADDR,
                mem::size_of::<WinSock::SOCKADDR_IN>() as i32,
            )
        };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn set_reuse_addr(sock: RawSocket) -> io::Result<()> {
        let enable: i32 = 1;
        // SAFETY: `optval` points at a live i32 and the length matches.
        let rc = unsafe {
            WinSock::setsockopt(
                sock,
                WinSock::SOL_SOCKET,
                WinSock::SO_REUSEADDR,
                &enable as *const i32 as *const u8,
                mem::size_of::<i32>() as i32,
            )
        };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn bind(sock: RawSocket, addr: Ipv4Addr, port: u16) -> io::Result<()> {
        let sin = sockaddr_in(addr, port);
        // SAFETY: `sin` is a valid SOCKADDR_IN and the length matches it.
        let rc = unsafe {
            WinSock::bind(
                sock,
                &sin as *const WinSock::SOCKADDR_IN as *const WinSock::SOCKADDR,
                mem::size_of::<WinSock::SOCKADDR_IN>() as i32,
            )
        };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn listen(sock: RawSocket, backlog: i32) -> io::Result<()> {
        // SAFETY: no pointer arguments.
        let rc = unsafe { WinSock::listen(sock, backlog) };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn accept(sock: RawSocket) -> io::Result<RawSocket> {
        // SAFETY: `peer` and `len` are valid out-parameters sized for a
        // SOCKADDR_IN; all-zero is a valid initial value for both.
        let conn = unsafe {
            let mut peer: WinSock::SOCKADDR_IN = mem::zeroed();
            let mut len = mem::size_of::<WinSock::SOCKADDR_IN>() as i32;
            WinSock::accept(
                sock,
                &mut peer as *mut WinSock::SOCKADDR_IN as *mut WinSock::SOCKADDR,
                &mut len,
            )
        };
        if conn == WinSock::INVALID_SOCKET {
            return Err(last_error());
        }
        Ok(conn)
    }

    pub(crate) fn recv(sock: RawSocket, buf: &mut [u8], wait_all: bool) -> io::Result<usize> {
        let flags = if wait_all { WinSock::MSG_WAITALL } else { 0 };
        let len = buf.len().min(i32::MAX as usize) as i32;
        // SAFETY: the pointer and length come from a valid mutable slice.
        let n = unsafe { WinSock::recv(sock, buf.as_mut_ptr(), len, flags) };
        if n == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(n as usize)
    }

    pub(crate) fn send(sock: RawSocket, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len().min(i32::MAX as usize) as i32;
        // SAFETY: the pointer and length come from a valid slice.
        let n = unsafe { WinSock::send(sock, buf.as_ptr(), len, 0) };
        if n == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(n as usize)
    }

    pub(crate) fn shutdown(sock: RawSocket, how: Shutdown) -> io::Result<()> {
        let how = match how {
            Shutdown::Read => WinSock::SD_RECEIVE,
            Shutdown::Write => WinSock::SD_SEND,
            Shutdown::Both => WinSock::SD_BOTH,
        };
        // SAFETY: no pointer arguments.
        let rc = unsafe { WinSock::shutdown(sock, how) };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn close(sock: RawSocket) -> io::Result<()> {
        // SAFETY: `sock` is owned by the caller and is not used again after
        // this call.
        let rc = unsafe { WinSock::closesocket(sock) };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        Ok(())
    }

    pub(crate) fn local_addr(sock: RawSocket) -> io::Result<(Ipv4Addr, u16)> {
        // SAFETY: `sin` and `len` are valid out-parameters sized for a
        // SOCKADDR_IN.
        let (sin, rc) = unsafe {
            let mut sin: WinSock::SOCKADDR_IN = mem::zeroed();
            let mut len = mem::size_of::<WinSock::SOCKADDR_IN>() as i32;
            let rc = WinSock::getsockname(
                sock,
                &mut sin as *mut WinSock::SOCKADDR_IN as *mut WinSock::SOCKADDR,
                &mut len,
            );
            (sin, rc)
        };
        if rc == WinSock::SOCKET_ERROR {
            return Err(last_error());
        }
        // SAFETY: S_addr is the union's full 32-bit view and always valid.
        let raw_addr = unsafe { sin.sin_addr.S_un.S_addr };
        Ok((
            Ipv4Addr::from(u32::from_be(raw_addr)),
            u16::from_be(sin.sin_port),
        ))
    }

    /// WinSock `select` only observes sockets, so the interrupt channel is
    /// a connected loopback socket pair rather than a CRT pipe. Readiness
    /// semantics are identical: writing to (or closing) the write end makes
    /// the read end readable.
    pub(crate) fn pipe() -> io::Result<(RawPipe, RawPipe)> {
        let listener = socket_stream()?;
        let result = (|| {
            bind(listener, Ipv4Addr::LOCALHOST, 0)?;
            listen(listener, 1)?;
            let (_, port) = local_addr(listener)?;

            let write_end = socket_stream()?;
            if let Err(err) = connect(write_end, Ipv4Addr::LOCALHOST, port) {
                let _ = close(write_end);
                return Err(err);
            }
            match accept(listener) {
                Ok(read_end) => Ok((read_end, write_end)),
                Err(err) => {
                    let _ = close(write_end);
                    Err(err)
                }
            }
        })();
        let _ = close(listener);
        result
    }

    pub(crate) fn pipe_write(sock: RawPipe, byte: u8) -> io::Result<()> {
        send(sock, &[byte]).map(|_| ())
    }

    /// Blocks until `data` or `intr` is readable. `Ok(false)` means the
    /// interrupt descriptor fired; `Ok(true)` means `data` is readable and
    /// the interrupt descriptor is not set.
    pub(crate) fn wait_readable(data: RawSocket, intr: RawPipe) -> io::Result<bool> {
        // SAFETY: the FD_SET lives on this stack frame and both sockets are
        // open for the duration of the call.
        unsafe {
            let mut rfds: WinSock::FD_SET = mem::zeroed();
            rfds.fd_count = 2;
            rfds.fd_array[0] = data;
            rfds.fd_array[1] = intr;

            // The first parameter is ignored by WinSock.
            let ready = WinSock::select(
                0,
                &mut rfds,
                ptr::null_mut(),
                ptr::null_mut(),
                ptr::null(),
            );
            if ready == WinSock::SOCKET_ERROR {
                return Err(last_error());
            }
            // A blocking select only returns 0 on timeout, and none is set.
            debug_assert!(ready > 0);
            let set = &rfds.fd_array[..rfds.fd_count as usize];
            if set.contains(&intr) {
                return Ok(false);
            }
            debug_assert!(set.contains(&data));
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Shutdown};
    use std::sync::Once;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn net_init() {
        static INIT: Once = Once::new();
        INIT.call_once(|| init().expect("subsystem init"));
    }

    fn loopback_listener(backlog: i32) -> (Socket, u16) {
        net_init();
        let listener = listen(Ipv4Addr::LOCALHOST, 0, backlog).expect("listen");
        let (_, port) = listener.local_addr().expect("local_addr");
        (listener, port)
    }

    #[test]
    fn connect_then_close_releases_handle() {
        let (listener, port) = loopback_listener(4);
        let conn = connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        let accepted = listener.accept().expect("accept");
        conn.close().expect("close connection");
        accepted.close().expect("close accepted");
        listener.close().expect("close listener");
    }

    #[test]
    fn wildcard_listen_accepts_loopback_connect() {
        net_init();
        let listener = listen(Ipv4Addr::UNSPECIFIED, 0, 4).expect("listen on wildcard");
        let (_, port) = listener.local_addr().expect("local_addr");
        let conn = connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        let accepted = listener.accept().expect("accept");
        accepted.close().expect("close accepted");
        conn.close().expect("close connection");
        listener.close().expect("close listener");
    }

    #[test]
    fn send_all_delivers_every_byte() {
        let (listener, port) = loopback_listener(4);
        let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();

        let receiver = thread::spawn(move || {
            let conn = listener.accept().expect("accept");
            let mut received = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = conn.recv(&mut buf).expect("recv");
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            conn.close().expect("close receiver side");
            received
        });

        let conn = connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        conn.send_all(&payload).expect("send_all");
        conn.shutdown(Shutdown::Write).expect("shutdown write");

        let received = receiver.join().expect("receiver thread");
        assert_eq!(received, expected);
        conn.close().expect("close");
    }

    #[test]
    fn recv_exact_waits_for_full_buffer() {
        const N: usize = 64 * 1024;
        let (listener, port) = loopback_listener(4);

        let sender = thread::spawn(move || {
            let conn = listener.accept().expect("accept");
            let payload = vec![7u8; N];
            for chunk in payload.chunks(N / 4) {
                conn.send_all(chunk).expect("send chunk");
                thread::sleep(Duration::from_millis(10));
            }
            // Hold the connection open so a short read cannot be excused by
            // an early close.
            thread::sleep(Duration::from_millis(100));
            conn.close().expect("close sender side");
        });

        let conn = connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        let mut buf = vec![0u8; N];
        let n = conn.recv_exact(&mut buf).expect("recv_exact");
        assert_eq!(n, N);
        assert!(buf.iter().all(|&b| b == 7));

        sender.join().expect("sender thread");
        conn.close().expect("close");
    }

    #[test]
    fn backlog_queues_second_connection() {
        let (listener, port) = loopback_listener(1);

        let first = connect(Ipv4Addr::LOCALHOST, port).expect("first connect");
        let second = connect(Ipv4Addr::LOCALHOST, port).expect("second connect");

        let a = listener.accept().expect("first accept");
        let b = listener.accept().expect("second accept");

        a.close().expect("close first accepted");
        b.close().expect("close second accepted");
        first.close().expect("close first");
        second.close().expect("close second");
        listener.close().expect("close listener");
    }

    #[test]
    fn shutdown_write_signals_eof_to_peer() {
        let (listener, port) = loopback_listener(4);
        let conn = connect(Ipv4Addr::LOCALHOST, port).expect("connect");
        let accepted = listener.accept().expect("accept");

        conn.shutdown(Shutdown::Write).expect("shutdown write");
        let mut buf = [0u8; 8];
        assert_eq!(accepted.recv(&mut buf).expect("recv"), 0);

        accepted.close().expect("close accepted");
        conn.close().expect("close connection");
        listener.close().expect("close listener");
    }

    #[test]
    fn connect_reports_refused_connection() {
        let (listener, port) = loopback_listener(1);
        listener.close().expect("close listener");

        let err = connect(Ipv4Addr::LOCALHOST, port).expect_err("connect must fail");
        assert!(matches!(err, NetError::Connect { .. }));
    }
}
