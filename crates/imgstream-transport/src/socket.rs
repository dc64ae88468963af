use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use crate::codec::{decode_message, encode_message, frame_len, HEADER_SIZE};
use crate::endpoint::{resolve, Endpoint, Role};
use crate::error::{Result, TransportError};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on a single dial attempt made while polling for a peer.
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(250);

/// A message-oriented duplex socket with exactly one peer.
///
/// Messages are discrete: what one side sends with [`send`](Self::send) the
/// other side receives whole from [`try_recv`](Self::try_recv). The peer link
/// is established lazily, so either side may come up first. A bound socket
/// accepts its peer while polling; a connecting socket redials on every poll
/// until the peer is listening.
pub struct MessageSocket {
    role: Role,
    listener: Option<TcpListener>,
    targets: Vec<SocketAddr>,
    peer_label: String,
    stream: Option<TcpStream>,
    rx: BytesMut,
    max_message: usize,
    write_timeout: Option<Duration>,
}

impl MessageSocket {
    /// Open a socket for `endpoint`.
    ///
    /// Binding fails immediately if the address is in use; dialing fails
    /// immediately only if the address cannot be resolved.
    pub fn open(endpoint: &Endpoint, max_message: usize) -> Result<Self> {
        match endpoint {
            Endpoint::Bind(addr) => Self::bind(*addr, max_message),
            Endpoint::Connect(addr) => Self::connect(addr, max_message),
        }
    }

    /// Listen on `addr` (non-blocking accept).
    pub fn bind(addr: SocketAddr, max_message: usize) -> Result<Self> {
        let listener =
            TcpListener::bind(addr).map_err(|source| TransportError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local = listener.local_addr().unwrap_or(addr);
        info!(addr = %local, "listening for peer");

        Ok(Self {
            role: Role::Bind,
            listener: Some(listener),
            targets: Vec::new(),
            peer_label: local.to_string(),
            stream: None,
            rx: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_message,
            write_timeout: None,
        })
    }

    /// Prepare to dial `addr`. The first dial is attempted right away.
    pub fn connect(addr: &str, max_message: usize) -> Result<Self> {
        let targets = resolve(addr)?;
        info!(%addr, "connecting to peer");

        let mut socket = Self {
            role: Role::Connect,
            listener: None,
            targets,
            peer_label: addr.to_string(),
            stream: None,
            rx: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            max_message,
            write_timeout: None,
        };
        socket.ensure_peer()?;
        Ok(socket)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Local address of a bound socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Bound the time a single message write may block.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
        if let Some(stream) = &self.stream {
            let _ = stream.set_write_timeout(timeout);
        }
    }

    /// Non-blocking check that a peer link exists, establishing it if possible.
    pub fn ensure_peer(&mut self) -> Result<bool> {
        if self.stream.is_some() {
            return Ok(true);
        }

        let stream = match self.role {
            Role::Bind => self.try_accept()?,
            Role::Connect => self.try_dial()?,
        };

        if let Some(stream) = stream {
            stream.set_nodelay(true)?;
            stream.set_write_timeout(self.write_timeout)?;
            self.stream = Some(stream);
            return Ok(true);
        }
        Ok(false)
    }

    fn try_accept(&mut self) -> Result<Option<TcpStream>> {
        let Some(listener) = &self.listener else {
            return Ok(None);
        };
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false).map_err(TransportError::Accept)?;
                debug!(%peer, "accepted peer");
                Ok(Some(stream))
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
            Err(err) => Err(TransportError::Accept(err)),
        }
    }

    fn try_dial(&mut self) -> Result<Option<TcpStream>> {
        let mut last_err = None;
        for target in &self.targets {
            match TcpStream::connect_timeout(target, CONNECT_ATTEMPT_TIMEOUT) {
                Ok(stream) => {
                    debug!(peer = %target, "connected to peer");
                    return Ok(Some(stream));
                }
                Err(err) => last_err = Some(err),
            }
        }

        match last_err {
            Some(err) if is_peer_absent(&err) => Ok(None),
            Some(source) => Err(TransportError::Connect {
                addr: self.peer_label.clone(),
                source,
            }),
            None => Ok(None),
        }
    }

    /// Send one message. The peer link must already be established.
    pub fn send(&mut self, body: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::Disconnected(format!(
                "no peer on {}",
                self.peer_label
            )));
        };

        let mut wire = BytesMut::with_capacity(HEADER_SIZE + body.len());
        encode_message(body, &mut wire)?;
        match stream.write_all(&wire).and_then(|()| stream.flush()) {
            Ok(()) => {
                debug!(bytes = body.len(), "sent message");
                Ok(())
            }
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                Err(TransportError::Timeout {
                    waited: self.write_timeout.unwrap_or_default(),
                })
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Non-blocking receive of the next whole message, if one has arrived.
    pub fn try_recv(&mut self) -> Result<Option<Bytes>> {
        if let Some(body) = decode_message(&mut self.rx, self.max_message)? {
            return Ok(Some(body));
        }
        if !self.ensure_peer()? {
            return Ok(None);
        }

        self.fill_available()?;
        decode_message(&mut self.rx, self.max_message)
    }

    /// Pull bytes the peer has already delivered, without blocking.
    ///
    /// Reading stops once a whole message is buffered; the receive buffer
    /// never holds more than one maximum-size message plus its header.
    fn fill_available(&mut self) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        let limit = HEADER_SIZE + self.max_message;
        stream.set_nonblocking(true)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let outcome = loop {
            let buffered = self.rx.len();
            if frame_len(&self.rx).is_some_and(|total| buffered >= total) || buffered >= limit {
                break Ok(false);
            }
            let room = (limit - buffered).min(READ_CHUNK_SIZE);
            match stream.read(&mut chunk[..room]) {
                Ok(0) => break Ok(true),
                Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break Ok(false),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => break Err(err),
            }
        };
        let restored = stream.set_nonblocking(false);

        let peer_closed = outcome?;
        restored?;
        if peer_closed {
            self.drop_peer()?;
        }
        Ok(())
    }

    /// Forget a peer that hung up. Bytes of a message cut short are an error;
    /// complete messages still buffered remain readable.
    fn drop_peer(&mut self) -> Result<()> {
        self.stream = None;
        let mut pending = self.rx.clone();
        while decode_message(&mut pending, self.max_message)?.is_some() {}
        if !pending.is_empty() {
            return Err(TransportError::Disconnected(format!(
                "{} hung up inside a message ({} bytes pending)",
                self.peer_label,
                pending.len()
            )));
        }
        debug!(peer = %self.peer_label, "peer hung up, waiting for reconnect");
        Ok(())
    }

    /// Release the peer link and the listener.
    pub fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        self.listener = None;
    }
}

fn is_peer_absent(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::TimedOut
            | ErrorKind::WouldBlock
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::Interrupted
    )
}

impl std::fmt::Debug for MessageSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSocket")
            .field("role", &self.role)
            .field("peer", &self.peer_label)
            .field("connected", &self.stream.is_some())
            .field("buffered", &self.rx.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::codec::DEFAULT_MAX_MESSAGE;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn recv_within(socket: &mut MessageSocket, limit: Duration) -> Option<Bytes> {
        let started = Instant::now();
        while started.elapsed() < limit {
            if let Some(body) = socket.try_recv().unwrap() {
                return Some(body);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        None
    }

    fn link(server: &mut MessageSocket, client: &mut MessageSocket) {
        let started = Instant::now();
        while !(server.ensure_peer().unwrap() && client.ensure_peer().unwrap()) {
            assert!(started.elapsed() < Duration::from_secs(5), "link timeout");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn bind_connect_exchange() {
        let mut server = MessageSocket::bind(loopback(), DEFAULT_MAX_MESSAGE).unwrap();
        let port = server.local_addr().unwrap().port();
        let mut client =
            MessageSocket::connect(&format!("tcp://127.0.0.1:{port}"), DEFAULT_MAX_MESSAGE)
                .unwrap();
        link(&mut server, &mut client);

        client.send(b"hello").unwrap();
        let body = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        assert_eq!(body.as_ref(), b"hello");

        server.send(b"OK").unwrap();
        let ack = recv_within(&mut client, Duration::from_secs(5)).unwrap();
        assert_eq!(ack.as_ref(), b"OK");
    }

    #[test]
    fn messages_stay_discrete() {
        let mut server = MessageSocket::bind(loopback(), DEFAULT_MAX_MESSAGE).unwrap();
        let port = server.local_addr().unwrap().port();
        let mut client =
            MessageSocket::connect(&format!("127.0.0.1:{port}"), DEFAULT_MAX_MESSAGE).unwrap();
        link(&mut server, &mut client);

        client.send(b"one").unwrap();
        client.send(&vec![7u8; 100_000]).unwrap();
        client.send(b"three").unwrap();

        let first = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        let second = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        let third = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        assert_eq!(first.as_ref(), b"one");
        assert_eq!(second.len(), 100_000);
        assert_eq!(third.as_ref(), b"three");
    }

    #[test]
    fn connect_before_bind_links_later() {
        let port = {
            let listener = TcpListener::bind(loopback()).unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut client =
            MessageSocket::connect(&format!("127.0.0.1:{port}"), DEFAULT_MAX_MESSAGE).unwrap();
        assert!(!client.ensure_peer().unwrap());

        let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let mut server = MessageSocket::bind(addr, DEFAULT_MAX_MESSAGE).unwrap();
        link(&mut server, &mut client);

        client.send(b"late").unwrap();
        let body = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        assert_eq!(body.as_ref(), b"late");
    }

    #[test]
    fn bind_twice_fails() {
        let first = MessageSocket::bind(loopback(), DEFAULT_MAX_MESSAGE).unwrap();
        let addr = first.local_addr().unwrap();
        let second = MessageSocket::bind(addr, DEFAULT_MAX_MESSAGE);
        assert!(matches!(second, Err(TransportError::Bind { .. })));
    }

    #[test]
    fn send_without_peer_is_disconnected() {
        let mut server = MessageSocket::bind(loopback(), DEFAULT_MAX_MESSAGE).unwrap();
        let result = server.send(b"nobody");
        assert!(matches!(result, Err(TransportError::Disconnected(_))));
    }

    #[test]
    fn peer_hangup_between_messages_keeps_buffered_data() {
        let mut server = MessageSocket::bind(loopback(), DEFAULT_MAX_MESSAGE).unwrap();
        let port = server.local_addr().unwrap().port();
        let mut client =
            MessageSocket::connect(&format!("127.0.0.1:{port}"), DEFAULT_MAX_MESSAGE).unwrap();
        link(&mut server, &mut client);

        client.send(b"last words").unwrap();
        client.shutdown();

        let body = recv_within(&mut server, Duration::from_secs(5)).unwrap();
        assert_eq!(body.as_ref(), b"last words");
        assert!(server.try_recv().unwrap().is_none());
    }

    #[test]
    fn receive_buffer_holds_at_most_one_message() {
        const MAX: usize = 1024;
        let mut server = MessageSocket::bind(loopback(), MAX).unwrap();
        let port = server.local_addr().unwrap().port();
        let mut client =
            MessageSocket::connect(&format!("127.0.0.1:{port}"), DEFAULT_MAX_MESSAGE).unwrap();
        link(&mut server, &mut client);

        for i in 0..64u8 {
            client.send(&[i; 1000]).unwrap();
        }
        std::thread::sleep(Duration::from_millis(100));

        for i in 0..64u8 {
            let body = recv_within(&mut server, Duration::from_secs(5)).unwrap();
            assert!(server.rx.len() <= HEADER_SIZE + MAX, "buffered {}", server.rx.len());
            assert_eq!(body.as_ref(), &[i; 1000][..]);
        }
    }
}
