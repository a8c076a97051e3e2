use crate::models::error::CaptureError;
use crate::models::format::{Dimensions, FrameDuration, VideoFormat, VideoSpec};
use crate::traits::capture_device::CaptureDevice;

/// Picks the active format of a device from its supported format list.
///
/// Pure selection works on slices so it can be exercised without hardware;
/// [`DeviceFormatSelector::apply`] performs the lock/apply/unlock side effect.
pub struct DeviceFormatSelector;

impl DeviceFormatSelector {
    /// Formats with at least one frame-rate range containing `fps`, in
    /// candidate order.
    pub fn formats_for_fps(candidates: &[VideoFormat], fps: f64) -> Vec<&VideoFormat> {
        candidates
            .iter()
            .filter(|format| format.supports_frame_rate(fps))
            .collect()
    }

    /// Format with the largest width. Uses `>=`, so among equally wide
    /// formats the last one wins.
    pub fn highest_resolution<'a>(candidates: &[&'a VideoFormat]) -> Option<&'a VideoFormat> {
        let mut max_width = 0;
        let mut selected = None;
        for format in candidates {
            if format.dimensions.width >= max_width {
                max_width = format.dimensions.width;
                selected = Some(*format);
            }
        }
        selected
    }

    /// First format whose width and height both meet or exceed `size`.
    pub fn first_meeting_size<'a>(
        candidates: &[&'a VideoFormat],
        size: Dimensions,
    ) -> Option<&'a VideoFormat> {
        candidates
            .iter()
            .find(|format| format.dimensions.covers(&size))
            .copied()
    }

    /// Format to activate for `spec`, or `None` when nothing qualifies.
    pub fn select(candidates: &[VideoFormat], spec: &VideoSpec) -> Option<VideoFormat> {
        let filtered: Vec<&VideoFormat> = match spec.fps {
            Some(fps) => Self::formats_for_fps(candidates, fps as f64),
            None => candidates.iter().collect(),
        };

        let selected = match spec.size {
            Some(size) => Self::first_meeting_size(&filtered, size),
            None => Self::highest_resolution(&filtered),
        };
        selected.cloned()
    }

    /// Select a format for `spec` and make it the device's active format.
    ///
    /// Returns `Ok(None)` without touching the device when no format
    /// qualifies. When `spec.fps` is set, both the minimum and maximum frame
    /// durations are pinned to `1/fps`. A device that cannot be locked yields
    /// [`CaptureError::ConfigurationLockFailed`].
    pub fn apply(
        device: &dyn CaptureDevice,
        spec: &VideoSpec,
    ) -> Result<Option<VideoFormat>, CaptureError> {
        let Some(format) = Self::select(&device.formats(), spec) else {
            log::debug!(
                "No format of {} matches {:?}, keeping the active format",
                device.unique_id(),
                spec
            );
            return Ok(None);
        };

        {
            let mut configuration = device.lock_for_configuration()?;
            configuration.set_active_format(&format);
            if let Some(fps) = spec.fps {
                let duration = FrameDuration::from_fps(fps);
                configuration.set_active_frame_duration(duration, duration);
            }
        }

        log::info!(
            "Selected {}x{} for {}",
            format.dimensions.width,
            format.dimensions.height,
            device.unique_id()
        );
        Ok(Some(format))
    }
}
