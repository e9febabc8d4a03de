use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::os::fd::{AsRawFd, RawFd};

use log::{debug, info};

use super::address::ResolvedAddress;
use super::reliable_io::WriteReady;
use crate::configuration::Protocol;
use crate::error_handling::types::NetworkError;

#[derive(Debug)]
enum Socket {
    Stream(TcpStream),
    Datagram(UdpSocket),
}

impl Socket {
    fn raw_fd(&self) -> RawFd {
        match self {
            Socket::Stream(s) => s.as_raw_fd(),
            Socket::Datagram(s) => s.as_raw_fd(),
        }
    }
}

/// An owned, named network connection.
///
/// The name identifies the side of the session the connection belongs to
/// ("L", "R", ...) and is what recorders see as the from/to identity. The
/// descriptor is released when the endpoint is closed or dropped, whichever
/// comes first.
#[derive(Debug)]
pub struct Endpoint {
    name: String,
    socket: Option<Socket>,
}

impl Endpoint {
    /// Wraps an already established stream connection.
    pub fn from_stream(name: &str, stream: TcpStream) -> Self {
        Self {
            name: name.to_string(),
            socket: Some(Socket::Stream(stream)),
        }
    }

    /// Connects to `addr`, trying each resolved candidate in turn.
    ///
    /// A datagram endpoint is "connected" in the `connect(2)` sense: it only
    /// exchanges datagrams with that one peer.
    pub fn connect(
        name: &str,
        protocol: Protocol,
        addr: &ResolvedAddress,
    ) -> Result<Self, NetworkError> {
        let mut last_error = None;
        for candidate in addr.addrs() {
            let attempt = match protocol {
                Protocol::TCP => TcpStream::connect(candidate).map(Socket::Stream),
                Protocol::UDP => {
                    let local: SocketAddr = if candidate.is_ipv4() {
                        (Ipv4Addr::UNSPECIFIED, 0).into()
                    } else {
                        (Ipv6Addr::UNSPECIFIED, 0).into()
                    };
                    UdpSocket::bind(local)
                        .and_then(|s| s.connect(candidate).map(|_| Socket::Datagram(s)))
                }
            };
            match attempt {
                Ok(socket) => {
                    info!("{} endpoint connected to {} ({:?})", name, candidate, protocol);
                    return Ok(Self {
                        name: name.to_string(),
                        socket: Some(socket),
                    });
                }
                Err(e) => {
                    debug!("{} endpoint could not connect to {}: {}", name, candidate, e);
                    last_error = Some(e);
                }
            }
        }
        Err(NetworkError::ConnectFailed(
            addr.to_string(),
            last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    pub fn is_datagram(&self) -> bool {
        matches!(self.socket, Some(Socket::Datagram(_)))
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.socket.as_ref().map(Socket::raw_fd)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        match &self.socket {
            Some(Socket::Stream(s)) => s.set_nonblocking(nonblocking),
            Some(Socket::Datagram(s)) => s.set_nonblocking(nonblocking),
            None => Err(self.not_connected()),
        }
    }

    /// Sends as much of `buf` as the transport takes in one call.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write(buf)
    }

    /// Receives one chunk, retrying if a signal interrupts the call.
    /// Zero means the peer closed.
    pub fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    /// Stops reading; the peer may still be written to.
    pub fn shutdown_read(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Read)
    }

    /// Signals end-of-stream to the peer while still accepting its data.
    pub fn shutdown_write(&self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match &self.socket {
            Some(Socket::Stream(s)) => match s.shutdown(how) {
                Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
            // Datagram peers have no notion of a half-closed connection.
            Some(Socket::Datagram(_)) => Ok(()),
            None => Ok(()),
        }
    }

    /// Closes the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(socket) = self.socket.take() {
            if let Socket::Stream(s) = &socket {
                let _ = s.shutdown(Shutdown::Both);
            }
            debug!("{} endpoint closed", self.name);
        }
    }

    fn not_connected(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotConnected,
            format!("{} endpoint is closed", self.name),
        )
    }
}

impl Read for Endpoint {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.socket {
            Some(Socket::Stream(s)) => s.read(buf),
            Some(Socket::Datagram(s)) => s.recv(buf),
            None => Err(self.not_connected()),
        }
    }
}

impl Write for Endpoint {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.socket {
            Some(Socket::Stream(s)) => s.write(buf),
            Some(Socket::Datagram(s)) => s.send(buf),
            None => Err(self.not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.socket {
            Some(Socket::Stream(s)) => s.flush(),
            _ => Ok(()),
        }
    }
}

impl WriteReady for Endpoint {
    fn wait_writable(&self) -> io::Result<()> {
        let fd = self.raw_fd().ok_or_else(|| self.not_connected())?;
        let mut fds = [libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        }];
        loop {
            match poll_ready(&mut fds, -1) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
                Ok(_) => return Ok(()),
            }
        }
    }
}

/// Blocks in `poll(2)` until one of `fds` is ready or `timeout_ms` passes
/// (`-1` waits forever). Returns the number of ready descriptors.
///
/// An interrupted wait is reported as `ErrorKind::Interrupted`; callers
/// decide whether to re-issue it.
pub fn poll_ready(fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<usize> {
    // SAFETY: `fds` is a valid, exclusively borrowed slice of pollfd for the
    // duration of the call and its length is passed alongside it.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// A listening socket waiting for the R side to connect.
#[derive(Debug)]
pub struct ServiceEndpoint {
    name: String,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ServiceEndpoint {
    /// Binds and listens on the first candidate of `addr` that accepts it.
    /// Port `0` lets the kernel choose; see [`ServiceEndpoint::local_addr`].
    ///
    /// The descriptor is close-on-exec, so spawned children never inherit it.
    pub fn listen(name: &str, addr: &ResolvedAddress) -> Result<Self, NetworkError> {
        let mut last_error = None;
        for candidate in addr.addrs() {
            match TcpListener::bind(candidate) {
                Ok(listener) => {
                    let local_addr = listener.local_addr().map_err(NetworkError::SockError)?;
                    info!("{} listening on {}", name, local_addr);
                    return Ok(Self {
                        name: name.to_string(),
                        listener,
                        local_addr,
                    });
                }
                Err(e) => {
                    debug!("{} could not bind {}: {}", name, candidate, e);
                    last_error = Some(e);
                }
            }
        }
        Err(NetworkError::BindError(
            last_error.unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable)),
        ))
    }

    /// Address the kernel actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until a peer connects and returns it as an endpoint called `name`.
    pub fn accept(&self, name: &str) -> Result<Endpoint, NetworkError> {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("{} accepted {} side connection from {}", self.name, name, peer);
                    return Ok(Endpoint::from_stream(name, stream));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(NetworkError::AcceptFailed(e)),
            }
        }
    }

    /// Stops listening. Established connections are unaffected.
    pub fn close(self) {
        debug!("{} stopped listening on {}", self.name, self.local_addr);
    }
}
