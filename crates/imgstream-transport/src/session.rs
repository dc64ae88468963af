use std::io::{Read, Write};
use std::net::SocketAddr;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::{Reliability, SessionConfig};
use crate::endpoint::{Endpoint, Role};
use crate::error::{Result, TransportError};
use crate::poll::{CloseHandle, Poller};
use crate::socket::MessageSocket;

/// Acknowledgment message returned for every received message in confirmed mode.
pub const ACK: &[u8; 2] = b"OK";

/// Lifecycle state of a session. A session that failed to open never exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closed,
}

/// A byte stream carried over discrete socket messages.
///
/// Writes accumulate in a send buffer that is handed to the socket as one
/// message when it fills up or on [`flush`](Self::flush). Reads drain one
/// received message at a time. Every blocking point polls at the configured
/// interval and gives up after the configured wait bound.
///
/// A session is single-use: one transfer, one role, then [`close`](Self::close).
pub struct TransportSession {
    socket: Option<MessageSocket>,
    role: Role,
    config: SessionConfig,
    poller: Poller,
    close: CloseHandle,
    send_buf: BytesMut,
    recv_buf: Bytes,
    bytes_written: u64,
    bytes_read: u64,
}

impl TransportSession {
    /// Open a session on `endpoint`.
    pub fn open(endpoint: &Endpoint, config: SessionConfig) -> Result<Self> {
        let mut socket = MessageSocket::open(endpoint, config.max_message_size)?;
        socket.set_write_timeout(Some(config.wait_timeout));

        let close = CloseHandle::new();
        let poller = Poller::new(config.poll_interval, config.wait_timeout, close.clone());
        debug!(%endpoint, ?config.reliability, "session open");

        Ok(Self {
            socket: Some(socket),
            role: endpoint.role(),
            send_buf: BytesMut::with_capacity(config.buffer_size),
            recv_buf: Bytes::new(),
            config,
            poller,
            close,
            bytes_written: 0,
            bytes_read: 0,
        })
    }

    /// Listen on `port` on all interfaces.
    pub fn bind(port: u16, config: SessionConfig) -> Result<Self> {
        Self::open(&Endpoint::bind_port(port), config)
    }

    /// Dial `addr` (`host:port`, optionally `tcp://`-prefixed).
    pub fn connect(addr: &str, config: SessionConfig) -> Result<Self> {
        Self::open(&Endpoint::connect(addr), config)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.socket.is_none() || self.close.is_closed() {
            SessionState::Closed
        } else {
            SessionState::Open
        }
    }

    /// Local address of a bound session.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(MessageSocket::local_addr)
    }

    /// Handle for closing this session from another thread.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Bytes accepted by the write side so far (flushed or not).
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Bytes handed out by the read side so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte])
    }

    /// Append to the send buffer, shipping it as a message each time it fills.
    pub fn write_bytes(&mut self, mut buf: &[u8]) -> Result<()> {
        let capacity = self.config.buffer_size.max(1);
        while !buf.is_empty() {
            let room = capacity - self.send_buf.len();
            let take = room.min(buf.len());
            self.send_buf.extend_from_slice(&buf[..take]);
            self.bytes_written += take as u64;
            buf = &buf[take..];

            if self.send_buf.len() == capacity {
                self.ship()?;
            }
        }
        Ok(())
    }

    /// Ship any buffered bytes as one message.
    pub fn flush(&mut self) -> Result<()> {
        if self.send_buf.is_empty() {
            return Ok(());
        }
        self.ship()
    }

    fn ship(&mut self) -> Result<()> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;

        let linked = self.poller.poll(|| Ok(socket.ensure_peer()?.then_some(())))?;
        if linked.is_none() {
            return Err(TransportError::Timeout {
                waited: self.poller.timeout(),
            });
        }

        socket.send(&self.send_buf)?;

        if self.config.reliability == Reliability::Confirmed {
            let reply = self.poller.poll(|| socket.try_recv())?;
            match reply {
                Some(reply) if reply.as_ref() == ACK => {
                    debug!(bytes = self.send_buf.len(), "message confirmed");
                }
                Some(reply) => {
                    warn!(received = reply.len(), "unexpected confirmation");
                    return Err(TransportError::BrokenAck {
                        received: reply.len(),
                    });
                }
                None => {
                    return Err(TransportError::AckTimeout {
                        waited: self.poller.timeout(),
                    })
                }
            }
        }

        // The buffer is only reused once the message is known to be delivered.
        self.send_buf.clear();
        Ok(())
    }

    /// Read one byte, or `None` at end of stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read_bytes(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Fill `buf` from the current message, fetching the next one if needed.
    ///
    /// Returns `Ok(0)` at end of stream, i.e. when no message arrives within
    /// the wait bound. Callers are expected to know how many bytes to expect.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.recv_buf.has_remaining() && !self.fetch()? {
            return Ok(0);
        }

        let n = self.recv_buf.remaining().min(buf.len());
        self.recv_buf.copy_to_slice(&mut buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }

    fn fetch(&mut self) -> Result<bool> {
        let socket = self.socket.as_mut().ok_or(TransportError::Closed)?;

        loop {
            let Some(message) = self.poller.poll(|| socket.try_recv())? else {
                debug!(
                    waited = ?self.poller.timeout(),
                    "no message within wait bound, end of stream"
                );
                return Ok(false);
            };

            if self.config.reliability == Reliability::Confirmed {
                socket.send(ACK)?;
            }
            if message.is_empty() {
                continue;
            }

            debug!(bytes = message.len(), "received message");
            self.recv_buf = message;
            return Ok(true);
        }
    }

    /// Release the socket. Idempotent; buffered unsent bytes are discarded.
    pub fn close(&mut self) {
        self.close.close();
        if let Some(mut socket) = self.socket.take() {
            socket.shutdown();
            debug!(
                written = self.bytes_written,
                read = self.bytes_read,
                "session closed"
            );
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Write for TransportSession {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        TransportSession::flush(self).map_err(Into::into)
    }
}

impl Read for TransportSession {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.read_bytes(buf).map_err(Into::into)
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("role", &self.role)
            .field("state", &self.state())
            .field("reliability", &self.config.reliability)
            .field("buffered", &self.send_buf.len())
            .finish()
    }
}
