//! One-call transfers: open a session, stream one array, close.
//!
//! Both initiation patterns produce the same bytes on the wire:
//!
//! | sender      | receiver    |
//! |-------------|-------------|
//! | [`send`]    | [`receive`] |
//! | [`serve`]   | [`request`] |

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use imgstream_codec::{
    prepare, read_array_with, ArrayAllocator, CodecError, DecodeLimits, Image, ImageAllocator,
    NoProgress, ProgressCallback, RawArray, Stage,
};
use imgstream_transport::{
    Endpoint, Reliability, SessionConfig, TransportSession, DEFAULT_BUFFER_SIZE,
    DEFAULT_POLL_INTERVAL,
};

use crate::error::{Result, StreamError};

/// Wait bound of the one-call transfers.
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a single transfer.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Bound on every blocking wait, including waiting for the peer.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Send buffer size, i.e. the largest message put on the wire.
    pub buffer_size: usize,
    pub reliability: Reliability,
    /// Ceiling on what a received header may ask to allocate.
    pub limits: DecodeLimits,
    #[serde(skip, default = "silent")]
    pub progress: Arc<dyn ProgressCallback + Send + Sync>,
}

fn silent() -> Arc<dyn ProgressCallback + Send + Sync> {
    Arc::new(NoProgress)
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TRANSFER_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_size: DEFAULT_BUFFER_SIZE,
            reliability: Reliability::default(),
            limits: DecodeLimits::default(),
            progress: silent(),
        }
    }
}

impl TransferOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn with_limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressCallback + Send + Sync + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// Session configuration carrying these options.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            wait_timeout: self.timeout,
            poll_interval: self.poll_interval,
            buffer_size: self.buffer_size,
            reliability: self.reliability,
            ..SessionConfig::default()
        }
    }
}

impl std::fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferOptions")
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("buffer_size", &self.buffer_size)
            .field("reliability", &self.reliability)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Dial `addr` and push `array` to a receiver listening there.
///
/// Returns the number of stream bytes sent.
pub fn send<A>(array: &A, addr: &str, options: &TransferOptions) -> Result<u64>
where
    A: RawArray + ?Sized,
{
    send_to(array, &Endpoint::connect(addr), options)
}

/// Listen on `port` and hand `array` to the first peer that requests it.
pub fn serve<A>(array: &A, port: u16, options: &TransferOptions) -> Result<u64>
where
    A: RawArray + ?Sized,
{
    send_to(array, &Endpoint::bind_port(port), options)
}

/// Stream `array` through a session opened on `endpoint`.
///
/// The array is validated and its envelope encoded before the session is
/// opened, so an invalid array never touches the network.
pub fn send_to<A>(array: &A, endpoint: &Endpoint, options: &TransferOptions) -> Result<u64>
where
    A: RawArray + ?Sized,
{
    let prepared = prepare(array)?;
    let mut session = open(endpoint, options)?;
    info!(
        %endpoint,
        descriptor = %array.descriptor(),
        length = prepared.stream_length(),
        "sending image"
    );

    prepared.write_to(array, &mut session, options.progress.as_ref())?;
    session.close();

    debug!(%endpoint, bytes = prepared.stream_length(), "image sent");
    Ok(prepared.stream_length())
}

/// Listen on `port` and receive one array pushed by a sender.
pub fn receive(port: u16, options: &TransferOptions) -> Result<Image> {
    receive_from(&Endpoint::bind_port(port), options)
}

/// Dial `addr` and fetch the array a sender is serving there.
pub fn request(addr: &str, options: &TransferOptions) -> Result<Image> {
    receive_from(&Endpoint::connect(addr), options)
}

/// Receive one array into an [`Image`].
pub fn receive_from(endpoint: &Endpoint, options: &TransferOptions) -> Result<Image> {
    receive_with(endpoint, &ImageAllocator, options)
}

/// Receive one array into storage obtained from `allocator`.
///
/// The destination is allocated only once the header has been decoded.
pub fn receive_with<F>(endpoint: &Endpoint, allocator: &F, options: &TransferOptions) -> Result<F::Array>
where
    F: ArrayAllocator + ?Sized,
{
    let mut session = open(endpoint, options)?;
    info!(%endpoint, "waiting for image");

    let result = read_array_with(
        &mut session,
        allocator,
        &options.limits,
        options.progress.as_ref(),
    );
    let received = session.bytes_read();
    session.close();

    match result {
        Ok(array) => {
            debug!(%endpoint, bytes = received, "image received");
            Ok(array)
        }
        // Nothing at all arrived within the wait bound.
        Err(CodecError::ShortStream { stage, .. }) if received == 0 => {
            Err(StreamError::Timeout {
                stage,
                waited: options.timeout,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn open(endpoint: &Endpoint, options: &TransferOptions) -> Result<TransportSession> {
    TransportSession::open(endpoint, options.session_config())
        .map_err(|err| StreamError::transport(Stage::Transport, err))
}
