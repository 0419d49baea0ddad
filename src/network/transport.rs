use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tracing::{debug, trace};

use crate::core::error::os_code;
use crate::core::{Config, LibraryCode, Role, MAX_PACKET_SIZE, MAX_SOCKETS};
use crate::util::hex;
use super::blocking::NonBlocking;
use super::resolver::{AddressResolver, ResolveError};

/// Largest payload an IPv4 UDP datagram can carry
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Errors produced by the socket table
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("socket index {0} out of range")]
    HandleOutOfRange(usize),

    #[error("socket index {0} already open")]
    HandleInUse(usize),

    #[error("socket index {0} not open")]
    HandleInvalid(usize),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("unable to allocate socket for NTP: {0}")]
    SocketCreate(io::Error),

    #[error("unable to bind socket for NTP: {0}")]
    Bind(io::Error),

    #[error("unable to set permission to broadcast: {0}")]
    BroadcastPermission(io::Error),

    #[error("unable to send NTP packet: {0}")]
    Send(io::Error),

    #[error("unable to receive NTP packet: {0}")]
    Receive(io::Error),

    #[error("unable to change blocking mode: {0}")]
    Flush(io::Error),

    #[error("unable to close NTP socket: {0}")]
    Close(io::Error),

    #[error("receive timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Position of this error in the signed code space
    pub fn code(&self) -> i32 {
        match self {
            TransportError::HandleOutOfRange(_)
            | TransportError::HandleInUse(_)
            | TransportError::HandleInvalid(_) => LibraryCode::Internal.code(),
            TransportError::Resolve(e) => e.code(),
            TransportError::SocketCreate(e)
            | TransportError::Bind(e)
            | TransportError::BroadcastPermission(e)
            | TransportError::Send(e)
            | TransportError::Receive(e)
            | TransportError::Flush(e)
            | TransportError::Close(e) => os_code(e),
            TransportError::Timeout(_) => libc::ETIMEDOUT,
        }
    }

    /// Whether nothing arrived within the wait bound
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// A received datagram and its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Bytes,
    pub from: SocketAddrV4,
}

/// Totals discarded by a flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drained {
    pub packets: usize,
    pub bytes: usize,
}

/// One bound slot of the table
#[derive(Debug)]
struct Endpoint {
    socket: UdpSocket,
    local: SocketAddrV4,
    /// Reply target; unset in server roles until the first read
    peer: Option<SocketAddrV4>,
    role: Role,
}

/// Fixed-capacity table of UDP endpoints addressed by a small index
pub struct Transport {
    slots: [Option<Endpoint>; MAX_SOCKETS],
    resolver: AddressResolver,
}

impl Transport {
    /// Creates an empty table.
    ///
    /// The table owns a private tokio runtime for name resolution, so it must
    /// be created, used and dropped outside any other tokio runtime. Inside
    /// async code, move it to `tokio::task::spawn_blocking` or a plain thread.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Transport {
            slots: std::array::from_fn(|_| None),
            resolver: AddressResolver::new()?,
        })
    }

    /// Resolves the peer and binds a UDP endpoint into slot `handle`.
    ///
    /// Server and Listen roles bind the configured port; other roles bind an
    /// ephemeral one. Broadcast role targets the broadcast address and gets
    /// permission to send there.
    pub fn open(
        &mut self,
        handle: usize,
        hostname: Option<&str>,
        timeout: Duration,
        config: &Config,
    ) -> Result<(), TransportError> {
        if handle >= MAX_SOCKETS {
            return Err(TransportError::HandleOutOfRange(handle));
        }
        if self.slots[handle].is_some() {
            return Err(TransportError::HandleInUse(handle));
        }

        self.resolver.set_canonical_names(config.verbose > 0);
        let resolution = self.resolver.resolve(hostname, config.port, timeout)?;
        let role = config.role;

        let local_port = if role.binds_port() { resolution.port } else { 0 };
        let local = SocketAddrV4::new(resolution.wildcard, local_port);
        let peer = match role {
            Role::Broadcast => Some(SocketAddrV4::new(resolution.broadcast, resolution.port)),
            _ if resolution.is_wildcard() => None,
            _ => Some(resolution.peer_addr()),
        };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(TransportError::SocketCreate)?;
        socket
            .bind(&SocketAddr::V4(local).into())
            .map_err(TransportError::Bind)?;
        if role == Role::Broadcast {
            socket
                .set_broadcast(true)
                .map_err(TransportError::BroadcastPermission)?;
        }

        let socket: UdpSocket = socket.into();
        let local = match socket.local_addr() {
            Ok(SocketAddr::V4(bound)) => bound,
            _ => local,
        };
        debug!(
            "socket {} open as {:?}: here={}/{} there={}",
            handle,
            role,
            hex(&local.ip().octets()),
            hex(&local.port().to_be_bytes()),
            peer.map_or_else(|| "unset".to_string(), |p| format!("{}/{}", hex(&p.ip().octets()), hex(&p.port().to_be_bytes()))),
        );

        self.slots[handle] = Some(Endpoint {
            socket,
            local,
            peer,
            role,
        });
        Ok(())
    }

    /// Sends `payload` as one datagram to the slot's peer.
    ///
    /// A short send is an error; nothing is retried.
    pub fn write(&self, handle: usize, payload: &[u8]) -> Result<(), TransportError> {
        let endpoint = self.endpoint(handle)?;
        let peer = endpoint
            .peer
            .ok_or_else(|| TransportError::Send(io::Error::from_raw_os_error(libc::ENOTCONN)))?;

        let sent = endpoint
            .socket
            .send_to(payload, peer)
            .map_err(TransportError::Send)?;
        if sent != payload.len() {
            return Err(TransportError::Send(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send of {} out of {} bytes", sent, payload.len()),
            )));
        }

        trace!("sent {} bytes to {} on socket {}", sent, peer, handle);
        Ok(())
    }

    /// Receives one datagram of at most `max_len` bytes.
    ///
    /// Client role waits up to `wait` for data; every other role polls and
    /// returns [`TransportError::Timeout`] at once when nothing is queued.
    /// Server and Listen roles remember the sender as the reply target.
    pub fn read(
        &mut self,
        handle: usize,
        max_len: usize,
        wait: Duration,
    ) -> Result<Datagram, TransportError> {
        let endpoint = self.endpoint_mut(handle)?;
        let wait = if endpoint.role.waits_on_read() {
            wait
        } else {
            Duration::ZERO
        };

        if let Err(e) = wait_readable(endpoint.socket.as_raw_fd(), wait) {
            if e.is_timeout() {
                trace!("receive on socket {} timed out after {:?}", handle, wait);
            }
            return Err(e);
        }

        let mut buffer = BytesMut::zeroed(max_len.min(MAX_DATAGRAM_SIZE));
        let (len, from) = endpoint
            .socket
            .recv_from(&mut buffer)
            .map_err(TransportError::Receive)?;
        buffer.truncate(len);

        let from = match from {
            SocketAddr::V4(from) => from,
            SocketAddr::V6(from) => {
                return Err(TransportError::Receive(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("datagram from non-IPv4 sender {}", from),
                )))
            }
        };
        if endpoint.role.records_sender() {
            endpoint.peer = Some(from);
        }

        trace!(
            "packet of length {} received from {}/{}",
            len,
            hex(&from.ip().octets()),
            hex(&from.port().to_be_bytes()),
        );
        Ok(Datagram {
            payload: buffer.freeze(),
            from,
        })
    }

    /// Discards every datagram already queued on the slot, without blocking.
    ///
    /// The descriptor's blocking mode is the same afterwards as before, even
    /// when a receive fails partway through.
    pub fn flush(&mut self, handle: usize) -> Result<Drained, TransportError> {
        let endpoint = self.endpoint(handle)?;
        let socket = &endpoint.socket;
        let drained = drain(socket.as_raw_fd(), |buffer| {
            socket.recv_from(buffer).map(|(len, _)| len)
        })?;

        debug!(
            "flushed {} packets totalling {} bytes from socket {}",
            drained.packets, drained.bytes, handle
        );
        Ok(drained)
    }

    /// Releases the slot. Closing a slot that is not open succeeds.
    pub fn close(&mut self, handle: usize) -> Result<(), TransportError> {
        if handle >= MAX_SOCKETS {
            return Err(TransportError::HandleOutOfRange(handle));
        }
        let endpoint = match self.slots[handle].take() {
            Some(endpoint) => endpoint,
            None => return Ok(()),
        };

        let fd = endpoint.socket.into_raw_fd();
        nix::unistd::close(fd).map_err(|e| TransportError::Close(e.into()))?;
        debug!("socket {} closed", handle);
        Ok(())
    }

    /// Whether slot `handle` is bound
    pub fn is_open(&self, handle: usize) -> bool {
        self.slots.get(handle).map_or(false, Option::is_some)
    }

    /// Local address the slot is bound to
    pub fn local_addr(&self, handle: usize) -> Result<SocketAddrV4, TransportError> {
        Ok(self.endpoint(handle)?.local)
    }

    /// Current reply target of the slot
    pub fn peer(&self, handle: usize) -> Result<Option<SocketAddrV4>, TransportError> {
        Ok(self.endpoint(handle)?.peer)
    }

    /// Role the slot was opened with
    pub fn role(&self, handle: usize) -> Result<Role, TransportError> {
        Ok(self.endpoint(handle)?.role)
    }

    /// The resolver used by [`Transport::open`]
    pub fn resolver(&self) -> &AddressResolver {
        &self.resolver
    }

    fn endpoint(&self, handle: usize) -> Result<&Endpoint, TransportError> {
        self.slots
            .get(handle)
            .ok_or(TransportError::HandleOutOfRange(handle))?
            .as_ref()
            .ok_or(TransportError::HandleInvalid(handle))
    }

    fn endpoint_mut(&mut self, handle: usize) -> Result<&mut Endpoint, TransportError> {
        self.slots
            .get_mut(handle)
            .ok_or(TransportError::HandleOutOfRange(handle))?
            .as_mut()
            .ok_or(TransportError::HandleInvalid(handle))
    }
}

/// Waits for `fd` to become readable, resuming after signals until `wait`
/// is used up
fn wait_readable(fd: RawFd, wait: Duration) -> Result<(), TransportError> {
    let deadline = Instant::now().checked_add(wait);
    let mut remaining = wait;

    loop {
        let millis = i32::try_from((remaining.as_micros() + 999) / 1000).unwrap_or(i32::MAX);
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];

        match poll(&mut fds, millis) {
            Ok(0) => return Err(TransportError::Timeout(wait)),
            Ok(_) => return Ok(()),
            Err(Errno::EINTR) => {
                if let Some(deadline) = deadline {
                    remaining = deadline.saturating_duration_since(Instant::now());
                }
                trace!("poll interrupted, {:?} left", remaining);
            }
            Err(errno) => return Err(TransportError::Receive(errno.into())),
        }
    }
}

/// Receives and discards until the queue is empty, with `fd` non-blocking
fn drain<F>(fd: RawFd, mut receive: F) -> Result<Drained, TransportError>
where
    F: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mode = NonBlocking::enable(fd).map_err(TransportError::Flush)?;
    let mut drained = Drained::default();
    let mut buffer = [0u8; MAX_PACKET_SIZE];

    let outcome = loop {
        match receive(&mut buffer) {
            Ok(len) => {
                drained.packets += 1;
                drained.bytes += len;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => break Err(e),
        }
    };

    mode.restore().map_err(TransportError::Flush)?;
    outcome.map_err(TransportError::Receive)?;
    Ok(drained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::blocking::is_nonblocking;
    use std::net::Ipv4Addr;

    fn peer_socket() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        socket
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        (socket, port)
    }

    fn loopback(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    /// A UDP port that was free a moment ago
    fn free_port() -> u16 {
        let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    /// Reads from a polling slot, giving the datagram a moment to land
    fn read_polling(transport: &mut Transport, handle: usize) -> Datagram {
        for _ in 0..50 {
            match transport.read(handle, 128, Duration::ZERO) {
                Ok(datagram) => return datagram,
                Err(e) if e.is_timeout() => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => panic!("unexpected receive error: {e}"),
            }
        }
        panic!("no datagram arrived");
    }

    #[test]
    fn test_out_of_range_handles() {
        let mut transport = Transport::new().unwrap();
        let config = Config::client(123);

        for handle in [MAX_SOCKETS, MAX_SOCKETS + 1, usize::MAX] {
            // An invalid literal would surface if the resolver were reached
            assert!(matches!(
                transport.open(handle, Some("1.2.3"), Duration::from_secs(1), &config),
                Err(TransportError::HandleOutOfRange(h)) if h == handle
            ));
            assert!(matches!(transport.write(handle, b"x"), Err(TransportError::HandleOutOfRange(_))));
            assert!(matches!(
                transport.read(handle, 48, Duration::from_millis(10)),
                Err(TransportError::HandleOutOfRange(_))
            ));
            assert!(matches!(transport.flush(handle), Err(TransportError::HandleOutOfRange(_))));
            assert!(matches!(transport.close(handle), Err(TransportError::HandleOutOfRange(_))));
            assert!(!transport.is_open(handle));
        }
        assert!(!transport.resolver().is_armed());
    }

    #[test]
    fn test_unopened_handle_is_invalid() {
        let mut transport = Transport::new().unwrap();
        let err = transport.write(2, b"x").unwrap_err();
        assert!(matches!(err, TransportError::HandleInvalid(2)));
        assert_eq!(err.code(), LibraryCode::Internal.code());
        assert!(matches!(
            transport.read(2, 48, Duration::ZERO),
            Err(TransportError::HandleInvalid(2))
        ));
        assert!(matches!(transport.flush(2), Err(TransportError::HandleInvalid(2))));
    }

    #[test]
    fn test_handle_reuse() {
        let mut transport = Transport::new().unwrap();
        let config = Config::client(123);
        let timeout = Duration::from_secs(1);

        transport.open(1, Some("127.0.0.1"), timeout, &config).unwrap();
        assert!(matches!(
            transport.open(1, Some("127.0.0.1"), timeout, &config),
            Err(TransportError::HandleInUse(1))
        ));
        transport.close(1).unwrap();
        assert!(!transport.is_open(1));
        transport.open(1, Some("127.0.0.1"), timeout, &config).unwrap();
        assert!(transport.is_open(1));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut transport = Transport::new().unwrap();
        assert!(transport.close(3).is_ok());

        transport
            .open(3, Some("127.0.0.1"), Duration::from_secs(1), &Config::client(123))
            .unwrap();
        assert!(transport.close(3).is_ok());
        assert!(transport.close(3).is_ok());
    }

    #[test]
    fn test_failed_resolution_leaves_slot_unset() {
        let mut transport = Transport::new().unwrap();
        let err = transport
            .open(0, Some("999.0.0.1"), Duration::from_secs(1), &Config::client(123))
            .unwrap_err();
        assert!(matches!(err, TransportError::Resolve(ResolveError::InvalidIpLiteral(_))));
        assert_eq!(err.code(), LibraryCode::IpAddress.code());
        assert!(!transport.is_open(0));
    }

    #[test]
    fn test_client_round_trip() {
        let (server, port) = peer_socket();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, Some("127.0.0.1"), Duration::from_secs(1), &Config::client(port))
            .unwrap();
        assert_eq!(transport.peer(0).unwrap(), Some(loopback(port)));
        assert_eq!(transport.role(0).unwrap(), Role::Client);

        transport.write(0, b"request").unwrap();
        let mut buffer = [0u8; 64];
        let (len, client) = server.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"request");
        server.send_to(b"reply", client).unwrap();

        let datagram = transport.read(0, 64, Duration::from_secs(2)).unwrap();
        assert_eq!(&datagram.payload[..], b"reply");
        assert_eq!(datagram.from, loopback(port));
        // Client role keeps its configured peer
        assert_eq!(transport.peer(0).unwrap(), Some(loopback(port)));
    }

    #[test]
    fn test_read_truncates_to_max_len() {
        let (server, port) = peer_socket();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, Some("127.0.0.1"), Duration::from_secs(1), &Config::client(port))
            .unwrap();
        let client = transport.local_addr(0).unwrap().port();

        server.send_to(&[7u8; 100], loopback(client)).unwrap();
        let datagram = transport.read(0, 48, Duration::from_secs(2)).unwrap();
        assert_eq!(datagram.payload.len(), 48);
    }

    #[test]
    fn test_read_with_unbounded_max_len() {
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, None, Duration::from_secs(1), &Config::server(0))
            .unwrap();
        let port = transport.local_addr(0).unwrap().port();

        let (client, _) = peer_socket();
        client.send_to(b"req", loopback(port)).unwrap();

        let mut datagram = None;
        for _ in 0..50 {
            match transport.read(0, usize::MAX, Duration::ZERO) {
                Ok(received) => {
                    datagram = Some(received);
                    break;
                }
                Err(e) if e.is_timeout() => std::thread::sleep(Duration::from_millis(10)),
                Err(e) => panic!("unexpected receive error: {e}"),
            }
        }
        assert_eq!(&datagram.unwrap().payload[..], b"req");
    }

    #[test]
    fn test_client_read_times_out_within_bound() {
        let (_server, port) = peer_socket();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, Some("127.0.0.1"), Duration::from_secs(1), &Config::client(port))
            .unwrap();

        let wait = Duration::from_millis(100);
        let started = Instant::now();
        let err = transport.read(0, 48, wait).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, TransportError::Timeout(w) if w == wait));
        assert_eq!(err.code(), libc::ETIMEDOUT);
        assert!(elapsed >= Duration::from_millis(90));
        assert!(elapsed < wait + Duration::from_millis(500));
    }

    extern "C" fn ignore_signal(_: libc::c_int) {}

    #[test]
    fn test_wait_resumes_after_signal() {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore_signal as usize;
            libc::sigemptyset(&mut action.sa_mask);
            assert_eq!(libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut()), 0);
        }

        let (socket, _) = peer_socket();
        let target = unsafe { libc::pthread_self() };
        let interrupter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            unsafe { libc::pthread_kill(target, libc::SIGUSR1) };
        });

        let wait = Duration::from_millis(300);
        let started = Instant::now();
        let err = wait_readable(socket.as_raw_fd(), wait).unwrap_err();
        let elapsed = started.elapsed();
        interrupter.join().unwrap();

        assert!(matches!(err, TransportError::Timeout(w) if w == wait));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < wait + Duration::from_millis(500));
    }

    #[test]
    fn test_server_read_does_not_wait() {
        let port = free_port();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, None, Duration::from_secs(5), &Config::server(port))
            .unwrap();
        assert_eq!(transport.local_addr(0).unwrap().port(), port);

        let started = Instant::now();
        let err = transport.read(0, 48, Duration::from_secs(5)).unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_server_replies_to_last_sender() {
        let port = free_port();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, None, Duration::from_secs(5), &Config::server(port))
            .unwrap();
        let local = transport.local_addr(0).unwrap();
        assert_eq!(*local.ip(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(local.port(), port);
        assert_eq!(transport.peer(0).unwrap(), None);

        // No sender recorded yet
        let err = transport.write(0, b"too early").unwrap_err();
        assert!(matches!(err, TransportError::Send(_)));
        assert_eq!(err.code(), libc::ENOTCONN);

        let (client, client_port) = peer_socket();
        client.send_to(b"request", loopback(local.port())).unwrap();
        let datagram = read_polling(&mut transport, 0);
        assert_eq!(&datagram.payload[..], b"request");
        assert_eq!(datagram.from, loopback(client_port));
        assert_eq!(transport.peer(0).unwrap(), Some(loopback(client_port)));

        transport.write(0, b"reply").unwrap();
        let mut buffer = [0u8; 64];
        let (len, _) = client.recv_from(&mut buffer).unwrap();
        assert_eq!(&buffer[..len], b"reply");
    }

    #[test]
    fn test_broadcast_role() {
        let mut transport = Transport::new().unwrap();
        let config = Config::client(4123).with_role(Role::Broadcast);
        transport
            .open(4, None, Duration::from_secs(1), &config)
            .unwrap();

        assert_eq!(
            transport.peer(4).unwrap(),
            Some(SocketAddrV4::new(Ipv4Addr::BROADCAST, 4123))
        );
        assert_ne!(transport.local_addr(4).unwrap().port(), 4123);
        let endpoint = transport.endpoint(4).unwrap();
        assert!(endpoint.socket.broadcast().unwrap());
    }

    #[test]
    fn test_flush_discards_queued_datagrams() {
        let (sender, _) = peer_socket();
        let mut transport = Transport::new().unwrap();
        transport
            .open(0, Some("127.0.0.1"), Duration::from_secs(1), &Config::client(123))
            .unwrap();
        let target = loopback(transport.local_addr(0).unwrap().port());

        sender.send_to(&[1u8; 10], target).unwrap();
        sender.send_to(&[2u8; 20], target).unwrap();
        sender.send_to(&[3u8; 30], target).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let drained = transport.flush(0).unwrap();
        assert_eq!(drained, Drained { packets: 3, bytes: 60 });

        let fd = transport.endpoint(0).unwrap().socket.as_raw_fd();
        assert!(!is_nonblocking(fd).unwrap());
        assert_eq!(transport.flush(0).unwrap(), Drained::default());
    }

    #[test]
    fn test_drain_restores_mode_after_receive_failure() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let fd = socket.as_raw_fd();

        let mut calls = 0;
        let result = drain(fd, |_| {
            calls += 1;
            assert!(is_nonblocking(fd).unwrap());
            match calls {
                1 => Ok(12),
                2 => Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
                _ => Err(io::Error::from_raw_os_error(libc::ECONNREFUSED)),
            }
        });

        let err = result.unwrap_err();
        assert!(matches!(err, TransportError::Receive(_)));
        assert_eq!(err.code(), libc::ECONNREFUSED);
        assert_eq!(calls, 3);
        assert!(!is_nonblocking(fd).unwrap());
    }

    #[test]
    fn test_drain_preserves_nonblocking_mode() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let fd = socket.as_raw_fd();

        let drained = drain(fd, |buffer| socket.recv_from(buffer).map(|(len, _)| len)).unwrap();
        assert_eq!(drained, Drained::default());
        assert!(is_nonblocking(fd).unwrap());
    }

    #[test]
    fn test_drain_reports_mode_failure() {
        let err = drain(-1, |_| Ok(0)).unwrap_err();
        assert!(matches!(err, TransportError::Flush(_)));
        assert_eq!(err.code(), libc::EBADF);
    }
}
