//! Raw element payload, streamed block by block in layout order.
//!
//! A [`SampleStrategy`] moves the elements of one buffer to or from the wire
//! in big-endian order; 8-bit buffers are copied verbatim. [`PayloadCodec`]
//! drives the strategy over every plane or tile of the layout.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::array::{ArrayDescriptor, Block};
use crate::counting::{CountingReader, CountingWriter};
use crate::element::{Buffer, ElementType};
use crate::error::{CodecError, Result, Stage};
use crate::progress::ProgressCallback;

/// Elements are staged through a chunk of this many bytes.
const CHUNK_BYTES: usize = 8 * 1024;

/// Moves the elements of one buffer to or from a byte stream.
pub trait SampleStrategy: Sync {
    fn name(&self) -> &'static str;

    fn write(&self, buffer: &Buffer, out: &mut dyn Write) -> io::Result<()>;

    fn read(&self, input: &mut dyn Read, buffer: &mut Buffer) -> io::Result<()>;
}

/// Strategy for `element_type`. Signed and unsigned bytes share one.
pub fn strategy_for(element_type: ElementType) -> &'static dyn SampleStrategy {
    match element_type {
        ElementType::Int8 | ElementType::UInt8 => &ByteStrategy,
        ElementType::Int16 => &ShortStrategy,
        ElementType::UInt16 => &UnsignedShortStrategy,
        ElementType::Float32 => &FloatStrategy,
        ElementType::Float64 => &DoubleStrategy,
    }
}

fn mismatch(strategy: &str, buffer: &Buffer) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!(
            "{strategy} strategy cannot handle a {} buffer",
            buffer.element_type()
        ),
    )
}

struct ByteStrategy;

impl SampleStrategy for ByteStrategy {
    fn name(&self) -> &'static str {
        "byte"
    }

    fn write(&self, buffer: &Buffer, out: &mut dyn Write) -> io::Result<()> {
        match buffer {
            Buffer::UInt8(values) => out.write_all(values),
            Buffer::Int8(values) => {
                let mut chunk = [0u8; CHUNK_BYTES];
                for part in values.chunks(CHUNK_BYTES) {
                    for (dst, src) in chunk.iter_mut().zip(part) {
                        *dst = *src as u8;
                    }
                    out.write_all(&chunk[..part.len()])?;
                }
                Ok(())
            }
            other => Err(mismatch(self.name(), other)),
        }
    }

    fn read(&self, input: &mut dyn Read, buffer: &mut Buffer) -> io::Result<()> {
        match buffer {
            Buffer::UInt8(values) => input.read_exact(values),
            Buffer::Int8(values) => {
                let mut chunk = [0u8; CHUNK_BYTES];
                for part in values.chunks_mut(CHUNK_BYTES) {
                    input.read_exact(&mut chunk[..part.len()])?;
                    for (dst, src) in part.iter_mut().zip(&chunk) {
                        *dst = *src as i8;
                    }
                }
                Ok(())
            }
            other => Err(mismatch(self.name(), other)),
        }
    }
}

/// Generates a strategy that (de)serializes each element individually.
macro_rules! wide_strategy {
    ($strategy:ident, $name:literal, $variant:ident, $ty:ty) => {
        struct $strategy;

        impl SampleStrategy for $strategy {
            fn name(&self) -> &'static str {
                $name
            }

            fn write(&self, buffer: &Buffer, out: &mut dyn Write) -> io::Result<()> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let Buffer::$variant(values) = buffer else {
                    return Err(mismatch(self.name(), buffer));
                };
                let mut chunk = [0u8; CHUNK_BYTES];
                for part in values.chunks(CHUNK_BYTES / WIDTH) {
                    for (dst, value) in chunk.chunks_exact_mut(WIDTH).zip(part) {
                        dst.copy_from_slice(&value.to_be_bytes());
                    }
                    out.write_all(&chunk[..part.len() * WIDTH])?;
                }
                Ok(())
            }

            fn read(&self, input: &mut dyn Read, buffer: &mut Buffer) -> io::Result<()> {
                const WIDTH: usize = std::mem::size_of::<$ty>();
                let values = match buffer {
                    Buffer::$variant(values) => values,
                    other => return Err(mismatch(self.name(), other)),
                };
                let mut chunk = [0u8; CHUNK_BYTES];
                for part in values.chunks_mut(CHUNK_BYTES / WIDTH) {
                    let bytes = &mut chunk[..part.len() * WIDTH];
                    input.read_exact(bytes)?;
                    for (value, src) in part.iter_mut().zip(bytes.chunks_exact(WIDTH)) {
                        let mut raw = [0u8; WIDTH];
                        raw.copy_from_slice(src);
                        *value = <$ty>::from_be_bytes(raw);
                    }
                }
                Ok(())
            }
        }
    };
}

wide_strategy!(ShortStrategy, "short", Int16, i16);
wide_strategy!(UnsignedShortStrategy, "unsigned short", UInt16, u16);
wide_strategy!(FloatStrategy, "float", Float32, f32);
wide_strategy!(DoubleStrategy, "double", Float64, f64);

/// Layout driver: runs the element strategy over every storage block.
#[derive(Clone)]
pub struct PayloadCodec {
    element_type: ElementType,
    strategy: &'static dyn SampleStrategy,
    blocks: Vec<Block>,
    payload_len: u64,
}

impl PayloadCodec {
    /// Resolve the strategy and block order for `descriptor`.
    pub fn new(descriptor: &ArrayDescriptor) -> Result<Self> {
        descriptor.validate()?;
        Ok(Self {
            element_type: descriptor.element_type,
            strategy: strategy_for(descriptor.element_type),
            blocks: descriptor.blocks(),
            payload_len: descriptor.payload_len()?,
        })
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> u64 {
        self.payload_len
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Check that `buffers` match the block partition exactly.
    pub fn check(&self, buffers: &[Buffer]) -> Result<()> {
        if buffers.len() != self.blocks.len() {
            return Err(CodecError::validation(format!(
                "layout has {} blocks, array exposes {} buffers",
                self.blocks.len(),
                buffers.len()
            )));
        }
        for (index, (buffer, block)) in buffers.iter().zip(&self.blocks).enumerate() {
            if buffer.element_type() != self.element_type {
                return Err(CodecError::validation(format!(
                    "buffer {index} holds {} elements, array declares {}",
                    buffer.element_type(),
                    self.element_type
                )));
            }
            if buffer.len() != block.len() {
                return Err(CodecError::validation(format!(
                    "buffer {index} holds {} elements, block needs {}",
                    buffer.len(),
                    block.len()
                )));
            }
        }
        Ok(())
    }

    /// Stream every buffer in layout order.
    pub fn write<W: Write>(
        &self,
        buffers: &[Buffer],
        out: W,
        progress: &dyn ProgressCallback,
    ) -> Result<()> {
        self.check(buffers)?;
        let mut out = CountingWriter::new(out);
        let mut done = 0usize;
        let total = self.element_total();

        for buffer in buffers {
            self.strategy
                .write(buffer, &mut out)
                .map_err(|err| self.io_error(out.count(), err))?;
            done += buffer.len();
            progress.set_progress(done as f32 / total as f32);
        }

        if out.count() != self.payload_len {
            return Err(CodecError::LengthMismatch {
                stage: Stage::Payload,
                expected: self.payload_len,
                actual: out.count(),
            });
        }
        debug!(
            strategy = self.strategy.name(),
            blocks = self.blocks.len(),
            bytes = self.payload_len,
            "payload written"
        );
        Ok(())
    }

    /// Fill every buffer from the stream in layout order.
    pub fn read<R: Read>(
        &self,
        input: R,
        buffers: &mut [Buffer],
        progress: &dyn ProgressCallback,
    ) -> Result<()> {
        self.check(buffers)?;
        let mut input = CountingReader::new(input);
        let mut done = 0usize;
        let total = self.element_total();

        for buffer in buffers.iter_mut() {
            self.strategy
                .read(&mut input, buffer)
                .map_err(|err| self.io_error(input.count(), err))?;
            done += buffer.len();
            progress.set_progress(done as f32 / total as f32);
        }
        debug!(
            strategy = self.strategy.name(),
            blocks = self.blocks.len(),
            bytes = input.count(),
            "payload read"
        );
        Ok(())
    }

    fn element_total(&self) -> usize {
        self.blocks.iter().map(Block::len).sum::<usize>().max(1)
    }

    fn io_error(&self, offset: u64, err: io::Error) -> CodecError {
        CodecError::from_io(Stage::Payload, offset, self.payload_len, err)
    }
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("strategy", &self.strategy.name())
            .field("blocks", &self.blocks.len())
            .field("payload_len", &self.payload_len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::array::Layout;
    use crate::progress::NoProgress;

    fn buffers_for(desc: &ArrayDescriptor, fill: impl Fn(usize) -> f64) -> Vec<Buffer> {
        let mut next = 0usize;
        desc.blocks()
            .iter()
            .map(|block| {
                let mut buffer = Buffer::zeros(desc.element_type, block.len());
                for i in 0..block.len() {
                    buffer.set(i, fill(next));
                    next += 1;
                }
                buffer
            })
            .collect()
    }

    #[test]
    fn wide_elements_are_big_endian() {
        let desc = ArrayDescriptor::new(vec![2], ElementType::UInt16, Layout::Contiguous);
        let codec = PayloadCodec::new(&desc).unwrap();
        let mut wire = Vec::new();
        codec
            .write(&[Buffer::UInt16(vec![0x0102, 0xA0B0])], &mut wire, &NoProgress)
            .unwrap();
        assert_eq!(wire, vec![0x01, 0x02, 0xA0, 0xB0]);
    }

    #[test]
    fn signed_bytes_are_copied_verbatim() {
        let desc = ArrayDescriptor::new(vec![3], ElementType::Int8, Layout::Contiguous);
        let codec = PayloadCodec::new(&desc).unwrap();
        let mut wire = Vec::new();
        codec
            .write(&[Buffer::Int8(vec![-1, 0, 127])], &mut wire, &NoProgress)
            .unwrap();
        assert_eq!(wire, vec![0xFF, 0x00, 0x7F]);
    }

    #[test]
    fn double_matches_ieee_bits() {
        let desc = ArrayDescriptor::new(vec![1], ElementType::Float64, Layout::Contiguous);
        let codec = PayloadCodec::new(&desc).unwrap();
        let mut wire = Vec::new();
        codec
            .write(&[Buffer::Float64(vec![1.5])], &mut wire, &NoProgress)
            .unwrap();
        assert_eq!(wire, 1.5f64.to_be_bytes().to_vec());
    }

    #[test]
    fn every_type_and_layout_survives_the_wire() {
        let layouts = [
            Layout::Contiguous,
            Layout::Sliced,
            Layout::Tiled(vec![50, 20, 5]),
        ];
        for ty in ElementType::ALL {
            for layout in &layouts {
                let desc = ArrayDescriptor::new(vec![200, 100, 5], ty, layout.clone());
                let codec = PayloadCodec::new(&desc).unwrap();
                let source = buffers_for(&desc, |i| (i % 100) as f64);

                let mut wire = Vec::new();
                codec.write(&source, &mut wire, &NoProgress).unwrap();
                assert_eq!(wire.len() as u64, desc.payload_len().unwrap());

                let mut decoded: Vec<Buffer> = desc
                    .blocks()
                    .iter()
                    .map(|b| Buffer::zeros(ty, b.len()))
                    .collect();
                codec
                    .read(Cursor::new(wire), &mut decoded, &NoProgress)
                    .unwrap();
                assert_eq!(decoded, source, "{ty} {layout:?}");
            }
        }
    }

    #[test]
    fn tiled_encoding_is_deterministic() {
        let desc = ArrayDescriptor::new(vec![9, 7], ElementType::Float32, Layout::Tiled(vec![4, 3]));
        let codec = PayloadCodec::new(&desc).unwrap();
        let source = buffers_for(&desc, |i| i as f64 * 0.25);

        let mut first = Vec::new();
        let mut second = Vec::new();
        codec.write(&source, &mut first, &NoProgress).unwrap();
        codec.write(&source, &mut second, &NoProgress).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mismatched_buffers_fail_before_writing() {
        let desc = ArrayDescriptor::new(vec![4, 2], ElementType::Int16, Layout::Sliced);
        let codec = PayloadCodec::new(&desc).unwrap();
        let mut wire = Vec::new();

        let wrong_count = vec![Buffer::Int16(vec![0; 8])];
        let err = codec.write(&wrong_count, &mut wire, &NoProgress).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));

        let wrong_type = vec![Buffer::UInt16(vec![0; 4]), Buffer::UInt16(vec![0; 4])];
        let err = codec.write(&wrong_type, &mut wire, &NoProgress).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));

        let wrong_len = vec![Buffer::Int16(vec![0; 4]), Buffer::Int16(vec![0; 3])];
        let err = codec.write(&wrong_len, &mut wire, &NoProgress).unwrap_err();
        assert!(matches!(err, CodecError::Validation(_)));

        assert!(wire.is_empty());
    }

    #[test]
    fn short_payload_is_an_error() {
        let desc = ArrayDescriptor::new(vec![4, 2], ElementType::Int16, Layout::Sliced);
        let codec = PayloadCodec::new(&desc).unwrap();
        let mut buffers = vec![Buffer::Int16(vec![0; 4]), Buffer::Int16(vec![0; 4])];

        let err = codec
            .read(Cursor::new(vec![0u8; 11]), &mut buffers, &NoProgress)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShortStream {
                stage: Stage::Payload,
                offset: 11,
                expected: 16
            }
        ));
    }

    #[test]
    fn strategies_are_shared_for_bytes() {
        assert_eq!(strategy_for(ElementType::Int8).name(), "byte");
        assert_eq!(strategy_for(ElementType::UInt8).name(), "byte");
        assert_eq!(strategy_for(ElementType::UInt16).name(), "unsigned short");
    }
}
