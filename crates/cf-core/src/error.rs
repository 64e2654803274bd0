//! Error types for ClipForge

use thiserror::Error;

/// Engine error type.
///
/// Every variant maps onto one of the numeric codes surfaced at the session
/// boundary; `code()` performs that mapping.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No such file: {0}")]
    NoSuchFile(String),

    #[error("Not supported media: {0}")]
    NotSupportedMedia(String),

    #[error("Not supported effect: {0}")]
    NotSupportedEffect(String),

    #[error("Not supported effect attribute: {0}")]
    NotSupportedEffectAttr(String),

    #[error("Invalid effect attribute value: {0}")]
    InvalidEffectAttrValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Numeric code delivered through the session error callback.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidParameter(_) => -1,
            Error::InvalidOperation(_) => -2,
            Error::PermissionDenied(_) => -3,
            Error::InvalidState(_) => -4,
            Error::NoSuchFile(_) => -5,
            Error::NotSupportedMedia(_) => -6,
            Error::NotSupportedEffect(_) => -7,
            Error::NotSupportedEffectAttr(_) => -8,
            Error::InvalidEffectAttrValue(_) => -9,
            Error::Io(_) => -2,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
