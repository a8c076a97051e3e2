use crate::models::device_family::DeviceFamily;
use crate::models::graph::PreviewLayer;
use crate::models::sample_buffer::SampleBuffer;
use crate::models::source::SourceKind;

/// Event delegate for device capture notifications.
///
/// Frame callbacks run on the producing device's serial queue: frames of one
/// device arrive in order, frames of different devices may arrive
/// concurrently. Lifecycle callbacks run on the orchestrator's configuration
/// queue. Implementations should marshal to the UI thread if needed.
pub trait DeviceEvents: Send + Sync {
    /// Video frame from the primary (mobile) source.
    fn on_device_frame(&self, buffer: &SampleBuffer);

    /// Video frame from the secondary source.
    fn on_capture_frame(&self, buffer: &SampleBuffer);

    /// A displayable preview layer is ready (or was resized) for `source`.
    fn on_preview_layer_ready(&self, layer: &PreviewLayer, source: SourceKind);

    /// The primary slot became occupied (`true`) or empty (`false`).
    fn on_primary_active_changed(&self, is_active: bool);

    /// A device's aspect-ratio classification changed.
    fn on_device_family_detected(&self, family: DeviceFamily);

    /// The primary device disconnected and has been fully removed.
    fn on_primary_lost(&self);
}
