use super::error::CaptureError;

/// Lifecycle of a `CaptureDeviceSession`.
///
/// ```text
/// uninitialized → ports resolved → outputs configured → connections built
///                                        → preview attached → active → torn down
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeviceSessionState {
    Uninitialized,
    PortsResolved,
    OutputsConfigured,
    ConnectionsBuilt,
    PreviewAttached,
    Active,
    TornDown,
}

impl DeviceSessionState {
    pub fn is_torn_down(&self) -> bool {
        matches!(self, Self::TornDown)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Lifecycle of a `ScreenCaptureSession`.
///
/// ```text
/// idle → enumerating → configured → streaming → stopped
///             ↓             ↓            ↓
///             └─────────────┴──→ stopped with error
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenCaptureState {
    Idle,
    Enumerating,
    Configured,
    Streaming,
    Stopped,
    StoppedWithError(CaptureError),
}

impl ScreenCaptureState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Whether `start()` may be called from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped | Self::StoppedWithError(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::StoppedWithError(_))
    }
}
