//! Renderer error types.

use thiserror::Error;

use vbparts_resources::ResourceError;
use vbparts_rhi::RhiError;

/// Errors raised while building techniques or driving frames.
#[derive(Error, Debug)]
pub enum RendererError {
    /// GPU object creation or command failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Texture or mesh data could not be prepared
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Settings or defines-file failure
    #[error(transparent)]
    Core(#[from] vbparts_core::Error),

    /// Queue submission or presentation result other than out-of-date/suboptimal
    #[error("Fatal: {0}")]
    Fatal(String),
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = std::result::Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wraps_rhi_error() {
        let err: RendererError = RhiError::NoSuitableGpu.into();
        assert!(matches!(err, RendererError::Rhi(_)));
        assert_eq!(err.to_string(), "No suitable GPU found");
    }

    #[test]
    fn test_wraps_config_error() {
        let err: RendererError = vbparts_core::Error::Config("complexity 7".to_string()).into();
        assert_eq!(err.to_string(), "Config error: complexity 7");
    }
}
