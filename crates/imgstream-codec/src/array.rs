use std::fmt;

use serde::{Deserialize, Serialize};

use crate::element::{Buffer, ElementType};
use crate::error::{CodecError, Result};
use crate::metadata::Metadata;

/// Physical partitioning of an array's storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Layout {
    /// One buffer holding every element.
    Contiguous,
    /// One buffer per index of the outermost axis.
    Sliced,
    /// A grid of fixed-shape tiles, one buffer per tile. Edge tiles are cut
    /// short where the tile shape does not divide the array shape.
    Tiled(Vec<usize>),
}

impl Layout {
    /// Header token naming this layout.
    pub fn token(&self) -> &'static str {
        match self {
            Layout::Contiguous => "Contiguous",
            Layout::Sliced => "Sliced",
            Layout::Tiled(_) => "Tiled",
        }
    }

    pub fn tile_shape(&self) -> Option<&[usize]> {
        match self {
            Layout::Tiled(tile) => Some(tile),
            _ => None,
        }
    }
}

/// Layout kind named by a header token, before any tile shape is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Contiguous,
    Sliced,
    Tiled,
}

impl LayoutKind {
    /// Resolve a layout token. The backend names `ArrayImg`, `PlanarImg` and
    /// `CellImg` are accepted as aliases.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "Contiguous" | "ArrayImg" => Some(LayoutKind::Contiguous),
            "Sliced" | "PlanarImg" => Some(LayoutKind::Sliced),
            "Tiled" | "CellImg" => Some(LayoutKind::Tiled),
            _ => None,
        }
    }
}

/// A rectangular region of the array stored in one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Coordinates of the block's first element.
    pub origin: Vec<usize>,
    /// Extent along each axis.
    pub dims: Vec<usize>,
}

impl Block {
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Default ceiling on the element count of a decoded array.
pub const DEFAULT_MAX_ELEMENTS: u64 = 1 << 32;

/// Default ceiling on the number of planes or tiles of a decoded array.
pub const DEFAULT_MAX_BLOCKS: u64 = 1 << 20;

/// Ceilings applied to a descriptor received from a peer, before anything
/// is allocated for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_elements: u64,
    pub max_blocks: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

/// Shape, element type and layout of an array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayDescriptor {
    pub shape: Vec<usize>,
    pub element_type: ElementType,
    pub layout: Layout,
}

impl ArrayDescriptor {
    pub fn new(shape: impl Into<Vec<usize>>, element_type: ElementType, layout: Layout) -> Self {
        Self {
            shape: shape.into(),
            element_type,
            layout,
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Check the descriptor describes a non-empty, addressable array.
    pub fn validate(&self) -> Result<()> {
        if self.shape.is_empty() {
            return Err(CodecError::validation("array must have at least one dimension"));
        }
        if let Some(axis) = self.shape.iter().position(|&d| d == 0) {
            return Err(CodecError::validation(format!(
                "refusing to stream an empty array (axis {axis} has size 0)"
            )));
        }
        if let Layout::Tiled(tile) = &self.layout {
            if tile.len() != self.ndim() {
                return Err(CodecError::validation(format!(
                    "tile shape has {} dimensions, array has {}",
                    tile.len(),
                    self.ndim()
                )));
            }
            if tile.iter().any(|&d| d == 0) {
                return Err(CodecError::validation("tile shape must be positive"));
            }
        }
        self.block_count()?;
        self.payload_len().map(|_| ())
    }

    /// Reject descriptors larger than `limits` allow.
    pub fn check_limits(&self, limits: &DecodeLimits) -> Result<()> {
        let elements = self.element_count()?;
        if elements > limits.max_elements {
            return Err(CodecError::validation(format!(
                "{self} holds {elements} elements, limit is {}",
                limits.max_elements
            )));
        }
        let blocks = self.block_count()?;
        if blocks > limits.max_blocks {
            return Err(CodecError::validation(format!(
                "{self} splits into {blocks} blocks, limit is {}",
                limits.max_blocks
            )));
        }
        Ok(())
    }

    /// Number of entries [`blocks`](Self::blocks) yields, computed without
    /// building them.
    pub fn block_count(&self) -> Result<u64> {
        let n = self.ndim();
        match &self.layout {
            Layout::Contiguous => Ok(1),
            Layout::Sliced if n <= 1 => Ok(1),
            Layout::Sliced => Ok(self.shape[n - 1] as u64),
            Layout::Tiled(tile) if tile.len() != n || tile.contains(&0) => Err(
                CodecError::validation("tile shape must match the array rank and be positive"),
            ),
            Layout::Tiled(tile) => tile_grid(&self.shape, tile).iter().try_fold(1u64, |acc, &d| {
                acc.checked_mul(d as u64)
                    .ok_or_else(|| CodecError::validation("tile count overflows"))
            }),
        }
    }

    /// Total number of elements.
    pub fn element_count(&self) -> Result<u64> {
        self.shape.iter().try_fold(1u64, |acc, &d| {
            acc.checked_mul(d as u64)
                .ok_or_else(|| CodecError::validation("element count overflows"))
        })
    }

    /// Payload size in bytes.
    pub fn payload_len(&self) -> Result<u64> {
        self.element_count()?
            .checked_mul(self.element_type.size() as u64)
            .ok_or_else(|| CodecError::validation("payload size overflows"))
    }

    /// Storage blocks in stream order.
    ///
    /// Sliced arrays yield one plane per index of the last axis (a 1-D array
    /// is a single plane). Tiled arrays yield tiles walking the tile grid with
    /// axis 0 varying fastest, the same order as elements within a block.
    pub fn blocks(&self) -> Vec<Block> {
        let n = self.ndim();
        match &self.layout {
            Layout::Contiguous => vec![Block {
                origin: vec![0; n],
                dims: self.shape.clone(),
            }],
            Layout::Sliced if n <= 1 => vec![Block {
                origin: vec![0; n],
                dims: self.shape.clone(),
            }],
            Layout::Sliced => (0..self.shape[n - 1])
                .map(|plane| {
                    let mut origin = vec![0; n];
                    origin[n - 1] = plane;
                    let mut dims = self.shape.clone();
                    dims[n - 1] = 1;
                    Block { origin, dims }
                })
                .collect(),
            Layout::Tiled(tile) => {
                let grid = tile_grid(&self.shape, tile);
                let count: usize = grid.iter().product();
                (0..count)
                    .map(|index| {
                        let cell = unravel(index, &grid);
                        tile_block(&self.shape, tile, &cell)
                    })
                    .collect()
            }
        }
    }

    /// Map element coordinates to `(block index, offset within block)`.
    pub fn locate(&self, pos: &[usize]) -> Option<(usize, usize)> {
        if pos.len() != self.ndim() || pos.iter().zip(&self.shape).any(|(p, d)| p >= d) {
            return None;
        }
        let n = self.ndim();
        match &self.layout {
            Layout::Contiguous => Some((0, ravel(pos, &self.shape))),
            Layout::Sliced if n <= 1 => Some((0, ravel(pos, &self.shape))),
            Layout::Sliced => Some((pos[n - 1], ravel(&pos[..n - 1], &self.shape[..n - 1]))),
            Layout::Tiled(tile) => {
                let grid = tile_grid(&self.shape, tile);
                let cell: Vec<usize> = pos.iter().zip(tile).map(|(p, t)| p / t).collect();
                let block = tile_block(&self.shape, tile, &cell);
                let local: Vec<usize> = pos.iter().zip(&block.origin).map(|(p, o)| p - o).collect();
                Some((ravel(&cell, &grid), ravel(&local, &block.dims)))
            }
        }
    }
}

impl fmt::Display for ArrayDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.shape.iter().map(ToString::to_string).collect();
        write!(f, "{} {} {}", dims.join("x"), self.element_type, self.layout.token())?;
        if let Layout::Tiled(tile) = &self.layout {
            let tile: Vec<String> = tile.iter().map(ToString::to_string).collect();
            write!(f, " ({})", tile.join("x"))?;
        }
        Ok(())
    }
}

fn tile_grid(shape: &[usize], tile: &[usize]) -> Vec<usize> {
    shape.iter().zip(tile).map(|(d, t)| d.div_ceil(*t)).collect()
}

fn tile_block(shape: &[usize], tile: &[usize], cell: &[usize]) -> Block {
    let origin: Vec<usize> = cell.iter().zip(tile).map(|(c, t)| c * t).collect();
    let dims = origin
        .iter()
        .zip(shape.iter().zip(tile))
        .map(|(o, (d, t))| (*t).min(d - o))
        .collect();
    Block { origin, dims }
}

/// Linear index with axis 0 varying fastest.
fn ravel(pos: &[usize], dims: &[usize]) -> usize {
    pos.iter()
        .zip(dims)
        .rev()
        .fold(0, |acc, (p, d)| acc * d + p)
}

fn unravel(mut index: usize, dims: &[usize]) -> Vec<usize> {
    dims.iter()
        .map(|d| {
            let p = index % d;
            index /= d;
            p
        })
        .collect()
}

/// Read access to an array's raw storage, as supplied by the array library.
pub trait RawArray {
    fn descriptor(&self) -> &ArrayDescriptor;

    fn metadata(&self) -> &Metadata;

    /// Storage buffers, one per entry of [`ArrayDescriptor::blocks`], in the
    /// same order.
    fn buffers(&self) -> &[Buffer];
}

/// Write access to a freshly allocated destination array.
pub trait RawArrayMut: RawArray {
    fn buffers_mut(&mut self) -> &mut [Buffer];

    fn apply_metadata(&mut self, metadata: Metadata);
}

/// Allocates destination arrays once a header has been decoded.
pub trait ArrayAllocator {
    type Array: RawArrayMut;

    fn allocate(&self, descriptor: &ArrayDescriptor) -> Result<Self::Array>;
}
