use std::sync::Arc;

use crate::models::error::CaptureError;
use crate::models::format::{Dimensions, FrameDuration, VideoFormat};
use crate::models::graph::{InputPort, ObserverToken, PortId};

/// Callback fired when a port's format description changes. Receives the new
/// video dimensions, or `None` when the description could not be read.
pub type FormatChangeCallback = Arc<dyn Fn(Option<Dimensions>) + Send + Sync + 'static>;

/// Exclusive configuration access to a device. Dropping the guard unlocks
/// the device.
pub trait DeviceConfiguration {
    fn set_active_format(&mut self, format: &VideoFormat);

    fn set_active_frame_duration(&mut self, min: FrameDuration, max: FrameDuration);
}

/// A physical capture device, owned by the platform.
///
/// Implemented by platform backends. The orchestrator never owns the
/// device itself, only `Arc` handles to it.
pub trait CaptureDevice: Send + Sync {
    /// Stable identity, unique among connected devices.
    fn unique_id(&self) -> &str;

    fn model_id(&self) -> &str;

    fn manufacturer(&self) -> &str;

    fn localized_name(&self) -> &str;

    /// Every format the device supports, in device order.
    fn formats(&self) -> Vec<VideoFormat>;

    fn active_format(&self) -> Option<VideoFormat>;

    /// Lock the device for configuration.
    ///
    /// Fails with [`CaptureError::ConfigurationLockFailed`] when another
    /// client holds the device.
    fn lock_for_configuration(&self) -> Result<Box<dyn DeviceConfiguration + '_>, CaptureError>;

    /// Open the device as a session input and list its ports.
    fn input_ports(&self) -> Result<Vec<InputPort>, CaptureError>;

    /// Current video dimensions flowing through `port`, if known.
    fn format_description(&self, port: PortId) -> Option<Dimensions>;

    /// Subscribe to format description changes on `port`.
    fn add_format_observer(&self, port: PortId, callback: FormatChangeCallback) -> ObserverToken;

    /// Remove a subscription. Once this returns the callback no longer fires.
    fn remove_format_observer(&self, token: ObserverToken);
}
