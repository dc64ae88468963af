//! Stream N-dimensional numeric arrays between processes.
//!
//! imgstream sends an array as a self-describing byte stream (text header,
//! metadata block, big-endian payload) over a TCP message socket. Either side
//! may listen or dial, and either side may start first.
//!
//! # Crate Structure
//!
//! - [`transport`]: message socket and buffered byte-stream sessions
//! - [`codec`]: header, metadata and layout-aware payload codecs
//! - [`send`], [`serve`], [`receive`], [`request`]: one-call transfers
//!
//! ```no_run
//! use imgstream::codec::{ArrayDescriptor, ElementType, Image, Layout};
//! use imgstream::TransferOptions;
//!
//! # fn main() -> imgstream::Result<()> {
//! let desc = ArrayDescriptor::new(vec![64, 64], ElementType::UInt16, Layout::Contiguous);
//! let image = Image::from_fn(desc, |p| (p[0] * p[1]) as f64)?;
//! imgstream::send(&image, "localhost:7000", &TransferOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod transfer;

/// Re-export transport types.
pub mod transport {
    pub use imgstream_transport::*;
}

/// Re-export codec types.
pub mod codec {
    pub use imgstream_codec::*;
}

pub use error::{Result, StreamError};
pub use transfer::{
    receive, receive_from, receive_with, request, send, send_to, serve, TransferOptions,
    DEFAULT_TRANSFER_TIMEOUT,
};
