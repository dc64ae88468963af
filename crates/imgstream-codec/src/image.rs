//! In-memory array backed by one buffer per storage block.

use crate::array::{ArrayAllocator, ArrayDescriptor, RawArray, RawArrayMut};
use crate::element::Buffer;
use crate::error::{CodecError, Result};
use crate::metadata::Metadata;

/// Owned n-dimensional array with a fixed storage layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    descriptor: ArrayDescriptor,
    metadata: Metadata,
    buffers: Vec<Buffer>,
}

impl Image {
    /// Zero-filled image for `descriptor`.
    pub fn allocate(descriptor: ArrayDescriptor) -> Result<Self> {
        descriptor.validate()?;
        let buffers = descriptor
            .blocks()
            .iter()
            .map(|block| Buffer::try_zeros(descriptor.element_type, block.len()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            descriptor,
            metadata: Metadata::default(),
            buffers,
        })
    }

    /// Image whose element at each position is `f(position)`.
    pub fn from_fn(descriptor: ArrayDescriptor, mut f: impl FnMut(&[usize]) -> f64) -> Result<Self> {
        let mut image = Self::allocate(descriptor)?;
        let blocks = image.descriptor.blocks();
        for (buffer, block) in image.buffers.iter_mut().zip(&blocks) {
            let mut pos = block.origin.clone();
            for index in 0..block.len() {
                buffer.set(index, f(&pos));
                advance(&mut pos, &block.origin, &block.dims);
            }
        }
        Ok(image)
    }

    /// Wrap existing buffers, checking they match the layout.
    pub fn from_buffers(descriptor: ArrayDescriptor, buffers: Vec<Buffer>) -> Result<Self> {
        descriptor.validate()?;
        let blocks = descriptor.blocks();
        if blocks.len() != buffers.len()
            || blocks
                .iter()
                .zip(&buffers)
                .any(|(b, buf)| b.len() != buf.len() || buf.element_type() != descriptor.element_type)
        {
            return Err(CodecError::validation(format!(
                "buffers do not match the {} layout of {descriptor}",
                descriptor.layout.token()
            )));
        }
        Ok(Self {
            descriptor,
            metadata: Metadata::default(),
            buffers,
        })
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    /// Element at `pos`, widened to `f64`.
    pub fn get(&self, pos: &[usize]) -> Option<f64> {
        let (block, offset) = self.descriptor.locate(pos)?;
        self.buffers[block].get(offset)
    }

    /// Store `value` at `pos`. Returns `false` when `pos` is out of bounds.
    pub fn set(&mut self, pos: &[usize], value: f64) -> bool {
        match self.descriptor.locate(pos) {
            Some((block, offset)) => self.buffers[block].set(offset, value),
            None => false,
        }
    }

    /// All elements in logical order, axis 0 fastest.
    pub fn to_vec_f64(&self) -> Vec<f64> {
        let shape = &self.descriptor.shape;
        let total: usize = shape.iter().product();
        let origin = vec![0; shape.len()];
        let mut pos = origin.clone();
        let mut out = Vec::with_capacity(total);
        for _ in 0..total {
            out.push(self.get(&pos).unwrap_or_default());
            advance(&mut pos, &origin, shape);
        }
        out
    }

    pub fn into_buffers(self) -> Vec<Buffer> {
        self.buffers
    }
}

/// Step `pos` to the next position inside the box, axis 0 fastest.
fn advance(pos: &mut [usize], origin: &[usize], dims: &[usize]) {
    for axis in 0..pos.len() {
        pos[axis] += 1;
        if pos[axis] < origin[axis] + dims[axis] {
            return;
        }
        pos[axis] = origin[axis];
    }
}

impl RawArray for Image {
    fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }
}

impl RawArrayMut for Image {
    fn buffers_mut(&mut self) -> &mut [Buffer] {
        &mut self.buffers
    }

    fn apply_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }
}

/// Allocates zero-filled [`Image`]s in whatever layout the stream declares.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAllocator;

impl ArrayAllocator for ImageAllocator {
    type Array = Image;

    fn allocate(&self, descriptor: &ArrayDescriptor) -> Result<Image> {
        Image::allocate(descriptor.clone())
    }
}
