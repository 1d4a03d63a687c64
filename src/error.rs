use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqueezeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    ImageProcessing(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("WebP encoding error: {0}")]
    WebpEncoding(String),

    #[error("GIF encoding error: {0}")]
    GifEncoding(String),

    #[error("GIF optimizer not found: {0}")]
    OptimizerMissing(String),

    #[error("GIF optimizer exited with status {status}: {stderr}")]
    OptimizerFailed { status: String, stderr: String },

    #[error("Remote compression failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid palette size: {0}. Must be between 2 and 256")]
    InvalidPaletteSize(u16),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("Invalid file name: {0}")]
    InvalidFileName(PathBuf),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No backend available for .{0} files")]
    NoBackendAvailable(String),

    #[error(
        "No API key configured for the remote compression service. \
         Run `squeeze-dir config --key <KEY>` or set SQUEEZE_API_KEY"
    )]
    MissingApiKey,

    #[error("Cannot read directory {dir}: {source}")]
    Discovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to commit result to {target}: {source}")]
    Commit {
        target: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("Compression timed out after {0:?}")]
    Timeout(Duration),

    #[error("Compression aborted: codec panicked")]
    CodecPanicked,

    #[error("Cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SqueezeError {
    /// Errors that stop the whole batch instead of failing a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SqueezeError::MissingApiKey
                | SqueezeError::Discovery { .. }
                | SqueezeError::InvalidQuality(_)
                | SqueezeError::InvalidPaletteSize(_)
                | SqueezeError::Config(_)
        )
    }
}

/// Failures reported by the remote compression service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("credentials were rejected (HTTP 401)")]
    Unauthorized,

    #[error("compression quota exceeded (HTTP 429)")]
    QuotaExceeded,

    #[error("request rejected (HTTP {status}): {message}")]
    Client { status: u16, message: String },

    #[error("service error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Network(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SqueezeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SqueezeError::MissingApiKey.is_fatal());
        assert!(SqueezeError::Discovery {
            dir: PathBuf::from("/nope"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .is_fatal());

        assert!(!SqueezeError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!SqueezeError::Remote(RemoteError::Unauthorized).is_fatal());
        assert!(!SqueezeError::Commit {
            target: PathBuf::from("a.png"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .is_fatal());
    }

    #[test]
    fn test_missing_api_key_mentions_remediation() {
        let msg = SqueezeError::MissingApiKey.to_string();
        assert!(msg.contains("config --key"));
        assert!(msg.contains("SQUEEZE_API_KEY"));
    }
}
