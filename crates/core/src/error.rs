//! Errors shared by the settings, platform and defines-file layers.

use thiserror::Error;

/// Error raised below the Vulkan layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Surface creation failed
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Shader bytecode or defines-file errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command-line values or out-of-range settings
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the renderer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_message() {
        let err = Error::Config("bad width".to_string());
        assert_eq!(err.to_string(), "Config error: bad width");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
