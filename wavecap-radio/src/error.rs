//! Error types for wavecap-radio

use thiserror::Error;

/// Main error type for frame source operations
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Radiotap error: {message}")]
    Radiotap { message: String },

    #[error("Capture file error: {message}")]
    CaptureFile { message: String },

    #[error("Unsupported link type: {linktype}")]
    UnsupportedLinkType { linktype: u32 },

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;
