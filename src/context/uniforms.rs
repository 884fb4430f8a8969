//! Per-submission uniform arena
//!
//! Every constant block upload lands in a fresh 256-byte aligned slice, so two draws
//! recorded before the same submit never observe each other's constants. Slices are
//! recycled wholesale when the arena is reset after a submit.

use crate::backend::{BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend};
use crate::error::{RendererError, RendererResult};

/// Minimum uniform buffer offset alignment guaranteed by every wgpu adapter
pub const UNIFORM_ALIGNMENT: u64 = 256;

const CHUNK_SIZE: u64 = 1 << 20;

/// A slice of the arena holding one uploaded constant block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformSlice {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
    pub epoch: u64,
}

/// Bump allocator over a growing list of uniform buffers
#[derive(Debug, Default)]
pub struct UniformArena {
    chunks: Vec<BufferHandle>,
    current: usize,
    cursor: u64,
    epoch: u64,
}

fn align_up(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

impl UniformArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submission counter. Slices from an older epoch may have been overwritten.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Copy `data` into a fresh slice
    pub fn upload<B: GraphicsBackend>(
        &mut self,
        backend: &mut B,
        data: &[u8],
    ) -> RendererResult<UniformSlice> {
        let size = align_up(data.len().max(16) as u64, 16);
        if size > CHUNK_SIZE {
            return Err(RendererError::InvalidParameter(format!(
                "constant block of {} bytes exceeds the uniform arena chunk",
                data.len()
            )));
        }

        let mut offset = align_up(self.cursor, UNIFORM_ALIGNMENT);
        if self.chunks.is_empty() || offset + size > CHUNK_SIZE {
            if !self.chunks.is_empty() {
                self.current += 1;
            }
            offset = 0;
            if self.current == self.chunks.len() {
                let buffer = backend.create_buffer(&BufferDescriptor {
                    label: Some(format!("Uniform Arena {}", self.chunks.len())),
                    size: CHUNK_SIZE,
                    usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                })?;
                log::debug!("Uniform arena grew to {} chunks", self.chunks.len() + 1);
                self.chunks.push(buffer);
            }
        }

        let buffer = self.chunks[self.current];
        if data.len() as u64 == size {
            backend.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(size as usize, 0);
            backend.write_buffer(buffer, offset, &padded);
        }
        self.cursor = offset + size;

        Ok(UniformSlice {
            buffer,
            offset,
            size,
            epoch: self.epoch,
        })
    }

    /// Recycle every slice. Only valid once the work reading them has been submitted.
    pub fn reset(&mut self) {
        self.current = 0;
        self.cursor = 0;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    #[test]
    fn test_slices_are_aligned_and_distinct() {
        let mut backend = DummyBackend::new(8, 8);
        let mut arena = UniformArena::new();

        let a = arena.upload(&mut backend, &[1u8; 64]).unwrap();
        let b = arena.upload(&mut backend, &[2u8; 4]).unwrap();

        assert_eq!(a.offset, 0);
        assert_eq!(b.offset % UNIFORM_ALIGNMENT, 0);
        assert!(b.offset >= a.offset + a.size);
        assert_eq!(b.size, 16);
    }

    #[test]
    fn test_reset_bumps_epoch_and_reuses_space() {
        let mut backend = DummyBackend::new(8, 8);
        let mut arena = UniformArena::new();

        let first = arena.upload(&mut backend, &[0u8; 32]).unwrap();
        arena.reset();
        let second = arena.upload(&mut backend, &[0u8; 32]).unwrap();

        assert_eq!(first.offset, second.offset);
        assert_eq!(first.buffer, second.buffer);
        assert_eq!(second.epoch, first.epoch + 1);
    }

    #[test]
    fn test_grows_when_chunk_is_full() {
        let mut backend = DummyBackend::new(8, 8);
        let mut arena = UniformArena::new();

        let per_chunk = (CHUNK_SIZE / UNIFORM_ALIGNMENT) as usize;
        for _ in 0..=per_chunk {
            arena.upload(&mut backend, &[0u8; 16]).unwrap();
        }
        assert_eq!(arena.chunk_count(), 2);
    }

    #[test]
    fn test_rejects_oversized_block() {
        let mut backend = DummyBackend::new(8, 8);
        let mut arena = UniformArena::new();
        let data = vec![0u8; CHUNK_SIZE as usize + 1];
        assert!(arena.upload(&mut backend, &data).is_err());
    }
}
