//! Self-describing byte streams for N-dimensional numeric arrays.
//!
//! A stream is a text header naming shape, element type and storage layout,
//! a small binary metadata block, and the raw elements in big-endian order
//! walked block by block (one block for contiguous arrays, one per plane for
//! sliced arrays, one per tile for tiled arrays). Writers know the exact
//! stream length up front, see [`PreparedStream::stream_length`].
//!
//! The codec never touches the network; anything implementing
//! [`std::io::Write`] or [`std::io::Read`] will do.

pub mod array;
mod counting;
pub mod element;
pub mod envelope;
pub mod error;
pub mod header;
pub mod image;
pub mod metadata;
pub mod payload;
pub mod progress;

pub use array::{
    ArrayAllocator, ArrayDescriptor, Block, DecodeLimits, Layout, LayoutKind, RawArray,
    RawArrayMut, DEFAULT_MAX_BLOCKS, DEFAULT_MAX_ELEMENTS,
};
pub use element::{Buffer, ElementType};
pub use envelope::{
    prepare, read_array, read_array_with, stream_length, write_array, PreparedStream,
};
pub use error::{CodecError, Result, Stage};
pub use image::{Image, ImageAllocator};
pub use metadata::{Metadata, MAX_METADATA_LEN};
pub use payload::{strategy_for, PayloadCodec, SampleStrategy};
pub use progress::{NoProgress, ProgressCallback, TracingProgress};
