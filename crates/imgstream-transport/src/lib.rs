//! Message socket and buffered byte-stream sessions.
//!
//! This is the lowest layer of imgstream. A [`MessageSocket`] moves discrete
//! messages between exactly two peers over TCP; a [`TransportSession`] turns
//! that into an ordered byte stream with bounded waits and, in confirmed mode,
//! a per-message acknowledgment so a send buffer is never reused while its
//! contents are still in flight.

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod poll;
pub mod session;
pub mod socket;

pub use codec::{decode_message, encode_message, DEFAULT_MAX_MESSAGE, HEADER_SIZE};
pub use config::{
    Reliability, SessionConfig, DEFAULT_BUFFER_SIZE, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT,
};
pub use endpoint::{Endpoint, Role};
pub use error::{Result, TransportError};
pub use poll::{CloseHandle, Poller};
pub use session::{SessionState, TransportSession, ACK};
pub use socket::MessageSocket;
