//! Auxiliary array attributes carried between header and payload.
//!
//! Block layout, all integers 4-byte big-endian signed:
//! ```text
//! <nameLen><name bytes><sourceLen><source bytes><validBits>
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CodecError, Result};

/// Largest metadata block the 2-byte length prefix can describe.
pub const MAX_METADATA_LEN: usize = u16::MAX as usize;

/// Attributes transferred alongside the voxel data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub source: String,
    pub valid_bits: i32,
}

impl Metadata {
    pub fn new(name: impl Into<String>, source: impl Into<String>, valid_bits: i32) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            valid_bits,
        }
    }

    /// Size of the encoded block.
    pub fn encoded_len(&self) -> usize {
        4 + self.name.len() + 4 + self.source.len() + 4
    }

    /// Pack into the binary metadata block.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = self.encoded_len();
        if len > MAX_METADATA_LEN {
            return Err(CodecError::validation(format!(
                "metadata block is {len} bytes, limit is {MAX_METADATA_LEN}"
            )));
        }

        let mut block = BytesMut::with_capacity(len);
        put_string(&mut block, &self.name);
        put_string(&mut block, &self.source);
        block.put_i32(self.valid_bits);
        Ok(block.to_vec())
    }

    /// Unpack a binary metadata block.
    pub fn decode(block: &[u8]) -> Result<Self> {
        let mut cursor = block;
        let name = take_string(&mut cursor, block.len(), "name")?;
        let source = take_string(&mut cursor, block.len(), "source")?;
        let valid_bits = take_i32(&mut cursor, block.len(), "validBits")?;

        if cursor.has_remaining() {
            debug!(
                trailing = cursor.remaining(),
                "ignoring trailing metadata bytes"
            );
        }

        Ok(Self {
            name,
            source,
            valid_bits,
        })
    }
}

fn put_string(dst: &mut BytesMut, value: &str) {
    dst.put_i32(value.len() as i32);
    dst.put_slice(value.as_bytes());
}

fn take_i32(cursor: &mut &[u8], total: usize, field: &str) -> Result<i32> {
    let offset = total - cursor.len();
    if cursor.remaining() < 4 {
        return Err(CodecError::Metadata {
            offset,
            reason: format!("block ends before the {field} field"),
        });
    }
    Ok(cursor.get_i32())
}

fn take_string(cursor: &mut &[u8], total: usize, field: &str) -> Result<String> {
    let declared = take_i32(cursor, total, field)?;
    let offset = total - cursor.len();

    let len = usize::try_from(declared).map_err(|_| CodecError::Metadata {
        offset: offset - 4,
        reason: format!("negative {field} length {declared}"),
    })?;
    if cursor.remaining() < len {
        return Err(CodecError::Metadata {
            offset,
            reason: format!(
                "{field} declares {len} bytes, only {} remain",
                cursor.remaining()
            ),
        });
    }

    let text = String::from_utf8_lossy(&cursor[..len]).into_owned();
    cursor.advance(len);
    Ok(text)
}
