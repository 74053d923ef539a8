//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No GPU exposes graphics, present and compute queues
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Missing or malformed shader bytecode
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Unsupported binding kind or mismatched binding resources
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    /// Queue ownership transfer requested from the wrong owner
    #[error("Ownership error: {0}")]
    OwnershipError(String),

    /// Unsupported image layout transition or bad image data
    #[error("Image error: {0}")]
    ImageError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
