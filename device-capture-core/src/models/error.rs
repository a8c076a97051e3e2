use thiserror::Error;

/// Errors that can occur during device and screen capture operations.
///
/// Most setup problems (missing ports, a failed can-add check) are logged and
/// skipped by the sessions instead of being returned. The variants reported by
/// [`CaptureError::is_fatal`] abort the operation that produced them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("device not available")]
    DeviceNotAvailable,

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("unable to lock {device} for configuration: {reason}")]
    ConfigurationLockFailed { device: String, reason: String },

    #[error("device input unavailable: {0}")]
    InputUnavailable(String),

    #[error("no shareable display available")]
    NoShareableDisplay,

    #[error("screen stream failed: {0}")]
    StreamFailed(String),

    #[error("queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Whether this error leaves the hardware or environment unusable for the
    /// operation that produced it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigurationLockFailed { .. } | Self::NoShareableDisplay
        )
    }
}
