//! Queue-family ownership of buffers shared between graphics and compute.
//!
//! # Overview
//!
//! The compute particle buffer is written by a dispatch on the compute queue
//! and read as vertex input on the graphics queue. [`BufferOwnership`] tracks
//! which family owns it while commands are recorded; each transition returns
//! an [`OwnershipTransfer`] describing the barrier to record, and the two
//! transitions are only reachable in order through
//! [`BufferOwnership::with_compute_ownership`].
//!
//! ```text
//!            release_to_compute
//!  Graphics ---------------------> Compute
//!     ^                               |
//!     +-------------------------------+
//!            return_to_graphics
//! ```
//!
//! # Example
//!
//! ```no_run
//! # fn demo(cmd: &vbparts_rhi::command::CommandBuffer, buffer: ash::vk::Buffer) -> vbparts_rhi::RhiResult<()> {
//! use vbparts_rhi::ownership::BufferOwnership;
//!
//! let mut ownership = BufferOwnership::new(0, 1);
//! ownership.with_compute_ownership(cmd, buffer, |cmd| cmd.dispatch(4, 1, 1))?;
//! # Ok(())
//! # }
//! ```

use ash::vk;

use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};

/// Queue family currently allowed to access the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOwner {
    Graphics,
    Compute,
}

/// A barrier handing a whole buffer from one queue family to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnershipTransfer {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_family: u32,
    pub dst_family: u32,
}

impl OwnershipTransfer {
    /// Builds the buffer memory barrier covering all of `buffer`.
    pub fn barrier(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier<'static> {
        vk::BufferMemoryBarrier::default()
            .src_access_mask(self.src_access)
            .dst_access_mask(self.dst_access)
            .src_queue_family_index(self.src_family)
            .dst_queue_family_index(self.dst_family)
            .buffer(buffer)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }

    /// Records the barrier into `cmd`.
    pub fn record(&self, cmd: &CommandBuffer, buffer: vk::Buffer) {
        cmd.pipeline_barrier(self.src_stage, self.dst_stage, &[self.barrier(buffer)], &[]);
    }
}

/// Two-state ownership machine for one shared buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOwnership {
    owner: QueueOwner,
    graphics_family: u32,
    compute_family: u32,
}

impl BufferOwnership {
    /// Starts owned by graphics, where the buffer is first read as vertices.
    pub fn new(graphics_family: u32, compute_family: u32) -> Self {
        Self {
            owner: QueueOwner::Graphics,
            graphics_family,
            compute_family,
        }
    }

    #[inline]
    pub fn owner(&self) -> QueueOwner {
        self.owner
    }

    /// Vertex-attribute reads finish before shader writes on the compute family.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OwnershipError`] if compute already owns the buffer.
    pub fn release_to_compute(&mut self) -> RhiResult<OwnershipTransfer> {
        if self.owner != QueueOwner::Graphics {
            return Err(RhiError::OwnershipError(
                "buffer is already owned by compute".to_string(),
            ));
        }
        self.owner = QueueOwner::Compute;
        Ok(OwnershipTransfer {
            src_access: vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            dst_access: vk::AccessFlags::SHADER_WRITE,
            src_stage: vk::PipelineStageFlags::VERTEX_INPUT,
            dst_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            src_family: self.graphics_family,
            dst_family: self.compute_family,
        })
    }

    /// Shader writes finish before vertex-attribute reads on the graphics family.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OwnershipError`] if graphics already owns the buffer.
    pub fn return_to_graphics(&mut self) -> RhiResult<OwnershipTransfer> {
        if self.owner != QueueOwner::Compute {
            return Err(RhiError::OwnershipError(
                "buffer is already owned by graphics".to_string(),
            ));
        }
        self.owner = QueueOwner::Graphics;
        Ok(OwnershipTransfer {
            src_access: vk::AccessFlags::SHADER_WRITE,
            dst_access: vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
            src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
            dst_stage: vk::PipelineStageFlags::VERTEX_INPUT,
            src_family: self.compute_family,
            dst_family: self.graphics_family,
        })
    }

    /// Records release, `dispatch`, then return into `cmd`.
    ///
    /// The buffer ends owned by graphics again, so the recorded sequence can
    /// be resubmitted every frame.
    ///
    /// Both halves of each transfer are recorded here, into the compute
    /// command buffer. No matching acquire is recorded on the graphics queue,
    /// and no semaphore orders the compute submission before the graphics
    /// one; the compute fence wait at the end of the frame is the only
    /// ordering.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::OwnershipError`] if compute owns the buffer on entry.
    pub fn with_compute_ownership<F>(
        &mut self,
        cmd: &CommandBuffer,
        buffer: vk::Buffer,
        dispatch: F,
    ) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.release_to_compute()?.record(cmd, buffer);
        dispatch(cmd);
        self.return_to_graphics()?.record(cmd, buffer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_owned_by_graphics() {
        let ownership = BufferOwnership::new(0, 2);
        assert_eq!(ownership.owner(), QueueOwner::Graphics);
    }

    #[test]
    fn test_release_then_return() {
        let mut ownership = BufferOwnership::new(0, 2);

        let release = ownership.release_to_compute().unwrap();
        assert_eq!(ownership.owner(), QueueOwner::Compute);
        assert_eq!(release.src_family, 0);
        assert_eq!(release.dst_family, 2);
        assert_eq!(release.src_access, vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
        assert_eq!(release.dst_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(release.src_stage, vk::PipelineStageFlags::VERTEX_INPUT);
        assert_eq!(release.dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);

        let back = ownership.return_to_graphics().unwrap();
        assert_eq!(ownership.owner(), QueueOwner::Graphics);
        assert_eq!(back.src_family, 2);
        assert_eq!(back.dst_family, 0);
        assert_eq!(back.src_access, release.dst_access);
        assert_eq!(back.dst_access, release.src_access);
        assert_eq!(back.src_stage, release.dst_stage);
        assert_eq!(back.dst_stage, release.src_stage);
    }

    #[test]
    fn test_double_release_rejected() {
        let mut ownership = BufferOwnership::new(0, 1);
        ownership.release_to_compute().unwrap();
        assert!(matches!(
            ownership.release_to_compute(),
            Err(RhiError::OwnershipError(_))
        ));
    }

    #[test]
    fn test_return_without_release_rejected() {
        let mut ownership = BufferOwnership::new(0, 1);
        assert!(matches!(
            ownership.return_to_graphics(),
            Err(RhiError::OwnershipError(_))
        ));
        assert_eq!(ownership.owner(), QueueOwner::Graphics);
    }

    #[test]
    fn test_transfer_pair_restores_graphics_every_frame() {
        let mut ownership = BufferOwnership::new(0, 2);
        for _ in 0..3 {
            let release = ownership.release_to_compute().unwrap();
            let back = ownership.return_to_graphics().unwrap();
            assert_eq!(
                (release.src_family, back.dst_family),
                (0, 0),
                "each frame starts and ends on the graphics family"
            );
            assert_eq!(ownership.owner(), QueueOwner::Graphics);
        }
    }

    #[test]
    fn test_barrier_covers_whole_buffer() {
        let mut ownership = BufferOwnership::new(0, 1);
        let barrier = ownership
            .release_to_compute()
            .unwrap()
            .barrier(vk::Buffer::null());
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.size, vk::WHOLE_SIZE);
        assert_eq!(barrier.src_queue_family_index, 0);
        assert_eq!(barrier.dst_queue_family_index, 1);
    }
}
