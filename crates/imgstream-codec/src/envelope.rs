//! Complete image stream: header, metadata and payload.
//!
//! ```text
//! <u16 headerLen><header text><u16 metadataLen><metadata block><payload>
//! ```
//! Both length prefixes are big-endian. The writer precomputes the total
//! length before emitting a byte, so the transport can announce it.

use std::io::{Read, Write};

use tracing::{debug, info};

use crate::array::{ArrayAllocator, ArrayDescriptor, DecodeLimits, RawArray, RawArrayMut};
use crate::counting::{CountingReader, CountingWriter};
use crate::error::{CodecError, Result, Stage};
use crate::header::{self, MAX_HEADER_LEN};
use crate::metadata::Metadata;
use crate::payload::PayloadCodec;
use crate::progress::ProgressCallback;

/// Bytes taken by each of the two length prefixes.
const LEN_PREFIX: u64 = 2;

/// Total stream length for `descriptor` with a metadata block of
/// `metadata_len` bytes.
pub fn stream_length(descriptor: &ArrayDescriptor, metadata_len: usize) -> Result<u64> {
    let header_len = header::encode(descriptor).len() as u64;
    Ok(LEN_PREFIX + header_len + LEN_PREFIX + metadata_len as u64 + descriptor.payload_len()?)
}

/// A validated array with its header and metadata already encoded.
#[derive(Debug, Clone)]
pub struct PreparedStream {
    header: String,
    metadata: Vec<u8>,
    payload: PayloadCodec,
}

/// Validate `array` and encode everything but the payload.
///
/// Nothing is written here; an empty or inconsistent array fails before the
/// caller has touched its sink.
pub fn prepare<A: RawArray + ?Sized>(array: &A) -> Result<PreparedStream> {
    let descriptor = array.descriptor();
    descriptor.validate()?;

    let payload = PayloadCodec::new(descriptor)?;
    payload.check(array.buffers())?;

    let header = header::encode(descriptor);
    if header.len() > MAX_HEADER_LEN {
        return Err(CodecError::validation(format!(
            "header is {} bytes, limit is {MAX_HEADER_LEN}",
            header.len()
        )));
    }
    let metadata = array.metadata().encode()?;

    Ok(PreparedStream {
        header,
        metadata,
        payload,
    })
}

impl PreparedStream {
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Exact number of bytes [`write_to`](Self::write_to) will emit.
    pub fn stream_length(&self) -> u64 {
        LEN_PREFIX
            + self.header.len() as u64
            + LEN_PREFIX
            + self.metadata.len() as u64
            + self.payload.payload_len()
    }

    /// Emit the stream for `array`, which must be the array this was
    /// prepared from.
    pub fn write_to<A, W>(&self, array: &A, out: W, progress: &dyn ProgressCallback) -> Result<()>
    where
        A: RawArray + ?Sized,
        W: Write,
    {
        let mut out = CountingWriter::new(out);

        write_block(&mut out, self.header.as_bytes(), Stage::Header)?;
        let expected = LEN_PREFIX + self.header.len() as u64;
        verify(Stage::Header, expected, out.count())?;
        progress.info(&format!("header: {}", self.header));
        info!(header = %self.header, "header streamed");

        write_block(&mut out, &self.metadata, Stage::Metadata)?;
        let expected = expected + LEN_PREFIX + self.metadata.len() as u64;
        verify(Stage::Metadata, expected, out.count())?;

        self.payload
            .write(array.buffers(), &mut out, progress)
            .map_err(|err| shift(err, expected))?;
        verify(Stage::Payload, self.stream_length(), out.count())?;

        out.flush().map_err(|err| {
            CodecError::from_io(Stage::Payload, out.count(), self.stream_length(), err)
        })?;
        debug!(bytes = out.count(), "image stream written");
        Ok(())
    }
}

/// Validate, prepare and write `array` in one go.
pub fn write_array<A, W>(array: &A, out: W, progress: &dyn ProgressCallback) -> Result<u64>
where
    A: RawArray + ?Sized,
    W: Write,
{
    let prepared = prepare(array)?;
    prepared.write_to(array, out, progress)?;
    Ok(prepared.stream_length())
}

/// Decode a stream into an array obtained from `allocator`, under the
/// default [`DecodeLimits`].
pub fn read_array<R, F>(input: R, allocator: &F, progress: &dyn ProgressCallback) -> Result<F::Array>
where
    R: Read,
    F: ArrayAllocator + ?Sized,
{
    read_array_with(input, allocator, &DecodeLimits::default(), progress)
}

/// Decode a stream into an array obtained from `allocator`.
///
/// The decoded descriptor must fit within `limits` before anything is
/// allocated for it.
pub fn read_array_with<R, F>(
    input: R,
    allocator: &F,
    limits: &DecodeLimits,
    progress: &dyn ProgressCallback,
) -> Result<F::Array>
where
    R: Read,
    F: ArrayAllocator + ?Sized,
{
    let mut input = CountingReader::new(input);

    let header_bytes = read_block(&mut input, Stage::Header)?;
    let header_text = String::from_utf8_lossy(&header_bytes);
    let descriptor = header::decode(&header_text)?;
    descriptor.validate()?;
    descriptor.check_limits(limits)?;
    progress.info(&format!("header: {}", header_text.trim_end()));
    info!(descriptor = %descriptor, "receiving image");

    let metadata_bytes = read_block(&mut input, Stage::Metadata)?;
    let metadata = Metadata::decode(&metadata_bytes)?;
    let payload_start = input.count();

    let payload = PayloadCodec::new(&descriptor)?;
    let mut array = allocator.allocate(&descriptor)?;
    array.apply_metadata(metadata);
    payload
        .read(&mut input, array.buffers_mut(), progress)
        .map_err(|err| shift(err, payload_start))?;

    debug!(bytes = input.count(), "image stream read");
    Ok(array)
}

fn write_block<W: Write>(out: &mut CountingWriter<W>, block: &[u8], stage: Stage) -> Result<()> {
    let len = u16::try_from(block.len()).map_err(|_| {
        CodecError::validation(format!("{stage} block of {} bytes is too long", block.len()))
    })?;
    let expected = out.count() + LEN_PREFIX + block.len() as u64;
    out.write_all(&len.to_be_bytes())
        .and_then(|()| out.write_all(block))
        .map_err(|err| CodecError::from_io(stage, out.count(), expected, err))
}

fn read_block<R: Read>(input: &mut CountingReader<R>, stage: Stage) -> Result<Vec<u8>> {
    let mut prefix = [0u8; 2];
    let start = input.count();
    input
        .read_exact(&mut prefix)
        .map_err(|err| CodecError::from_io(stage, input.count(), start + LEN_PREFIX, err))?;
    let len = u16::from_be_bytes(prefix) as usize;

    let mut block = vec![0u8; len];
    let expected = input.count() + len as u64;
    input
        .read_exact(&mut block)
        .map_err(|err| CodecError::from_io(stage, input.count(), expected, err))?;
    Ok(block)
}

fn verify(stage: Stage, expected: u64, actual: u64) -> Result<()> {
    if expected != actual {
        return Err(CodecError::LengthMismatch {
            stage,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Rebase payload-relative offsets onto the whole stream.
fn shift(err: CodecError, base: u64) -> CodecError {
    match err {
        CodecError::ShortStream {
            stage,
            offset,
            expected,
        } => CodecError::ShortStream {
            stage,
            offset: base + offset,
            expected: base + expected,
        },
        CodecError::LengthMismatch {
            stage,
            expected,
            actual,
        } => CodecError::LengthMismatch {
            stage,
            expected: base + expected,
            actual: base + actual,
        },
        CodecError::Io {
            stage,
            offset,
            source,
        } => CodecError::Io {
            stage,
            offset: base + offset,
            source,
        },
        other => other,
    }
}
