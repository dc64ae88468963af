//! Text envelope describing an array.
//!
//! Grammar (space-separated, decimal numbers):
//! ```text
//! v1 dimNumber <n> <d0> … <d(n-1)> <typeName> <layoutName> [<tile0> … <tile(n-1)>]
//! ```
//! The tile shape is present only for the tiled layout.

use crate::array::{ArrayDescriptor, Layout, LayoutKind};
use crate::element::ElementType;
use crate::error::{CodecError, Result};

pub const PROTOCOL_TAG: &str = "v1";
pub const DIM_TAG: &str = "dimNumber";

/// Largest header the 2-byte length prefix can describe.
pub const MAX_HEADER_LEN: usize = u16::MAX as usize;

/// Render the header text for `descriptor`.
pub fn encode(descriptor: &ArrayDescriptor) -> String {
    let mut tokens: Vec<String> = Vec::with_capacity(6 + 2 * descriptor.ndim());
    tokens.push(PROTOCOL_TAG.to_string());
    tokens.push(DIM_TAG.to_string());
    tokens.push(descriptor.ndim().to_string());
    tokens.extend(descriptor.shape.iter().map(ToString::to_string));
    tokens.push(descriptor.element_type.token().to_string());
    tokens.push(descriptor.layout.token().to_string());
    if let Layout::Tiled(tile) = &descriptor.layout {
        tokens.extend(tile.iter().map(ToString::to_string));
    }
    tokens.join(" ")
}

/// Parse header text back into a descriptor.
///
/// Purely positional: tokens beyond the grammar are ignored.
pub fn decode(text: &str) -> Result<ArrayDescriptor> {
    let mut tokens = Tokens::new(text);

    let (pos, tag) = tokens.next("protocol version")?;
    if tag != PROTOCOL_TAG {
        return Err(CodecError::protocol(
            pos,
            tag,
            format!("unknown protocol, expecting {PROTOCOL_TAG}"),
        ));
    }
    let (pos, tag) = tokens.next("dimensionality tag")?;
    if tag != DIM_TAG {
        return Err(CodecError::protocol(
            pos,
            tag,
            format!("expecting {DIM_TAG}"),
        ));
    }

    let (pos, token) = tokens.next("dimension count")?;
    let ndim = match token.parse::<usize>() {
        Ok(0) => {
            return Err(CodecError::protocol(pos, token, "dimension count must be positive"));
        }
        Ok(n) => n,
        Err(_) => {
            return Err(CodecError::protocol(pos, token, "dimension count is not a number"));
        }
    };
    let shape = (0..ndim)
        .map(|_| tokens.next_usize("dimension size"))
        .collect::<Result<Vec<_>>>()?;

    let (pos, type_token) = tokens.next("element type")?;
    let element_type = ElementType::from_token(type_token)
        .ok_or_else(|| CodecError::protocol(pos, type_token, "unsupported element type"))?;

    let (pos, layout_token) = tokens.next("layout")?;
    let layout = match LayoutKind::from_token(layout_token) {
        Some(LayoutKind::Contiguous) => Layout::Contiguous,
        Some(LayoutKind::Sliced) => Layout::Sliced,
        Some(LayoutKind::Tiled) => Layout::Tiled(
            (0..ndim)
                .map(|_| tokens.next_usize("tile size"))
                .collect::<Result<Vec<_>>>()?,
        ),
        None => {
            return Err(CodecError::protocol(
                pos,
                layout_token,
                "unsupported storage layout",
            ))
        }
    };

    Ok(ArrayDescriptor {
        shape,
        element_type,
        layout,
    })
}

struct Tokens<'a> {
    inner: std::str::SplitWhitespace<'a>,
    position: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.split_whitespace(),
            position: 0,
        }
    }

    fn next(&mut self, expected: &str) -> Result<(usize, &'a str)> {
        let pos = self.position;
        let token = self.inner.next().ok_or_else(|| {
            CodecError::protocol(pos, "", format!("header ends before the {expected}"))
        })?;
        self.position += 1;
        Ok((pos, token))
    }

    fn next_usize(&mut self, expected: &str) -> Result<usize> {
        let (pos, token) = self.next(expected)?;
        token
            .parse()
            .map_err(|_| CodecError::protocol(pos, token, format!("{expected} is not a number")))
    }
}
