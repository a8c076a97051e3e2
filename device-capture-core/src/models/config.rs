use serde::{Deserialize, Serialize};

use super::format::{PixelFormat, VideoSpec};
use super::screen::DisplayId;

/// Quality preset applied to the shared session before it starts running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPreset {
    #[default]
    High,
    Medium,
    Low,
}

/// Where a device's audio goes once attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioRouting {
    /// Monitor through the system output via an audio preview tap, gated by
    /// the pass-through volume. Falls back to the data tap when the preview
    /// tap cannot be added.
    #[default]
    Preview,
    /// Deliver audio buffers to the data tap only.
    DataOutput,
}

/// Configuration for a `CaptureOrchestrator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfiguration {
    /// Model identity reported by tethered mobile devices (default: "iOS Device").
    pub primary_model_id: String,

    /// Manufacturer whose non-mobile cameras are ignored (default: "Apple Inc.").
    pub host_vendor: String,

    /// Preset applied when the shared session starts (default: high).
    pub session_preset: SessionPreset,

    /// Format request for every device, or None for the highest resolution.
    pub video_spec: Option<VideoSpec>,

    /// Pixel format requested from video data taps (default: BGRA).
    pub video_pixel_format: PixelFormat,

    /// Audio routing for attached devices (default: preview).
    pub audio_routing: AudioRouting,

    /// Initial audio pass-through state for the primary device (default: true).
    pub audio_passthrough: bool,

    /// Opt in to screen-capture devices so tethered mobile devices are
    /// enumerated (default: true).
    pub allow_screen_capture_devices: bool,
}

impl OrchestratorConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.primary_model_id.trim().is_empty() {
            return Err("primary model id must not be empty".into());
        }
        if let Some(spec) = &self.video_spec {
            if spec.fps == Some(0) {
                return Err("video spec fps must be positive".into());
            }
            if let Some(size) = spec.size {
                if size.width == 0 || size.height == 0 {
                    return Err(format!(
                        "video spec size must be non-zero: {}x{}",
                        size.width, size.height
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for OrchestratorConfiguration {
    fn default() -> Self {
        Self {
            primary_model_id: "iOS Device".into(),
            host_vendor: "Apple Inc.".into(),
            session_preset: SessionPreset::High,
            video_spec: None,
            video_pixel_format: PixelFormat::Bgra32,
            audio_routing: AudioRouting::Preview,
            audio_passthrough: true,
            allow_screen_capture_devices: true,
        }
    }
}

/// Configuration for a `ScreenCaptureSession`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCaptureConfiguration {
    /// Display to capture, or None for the first shareable display.
    pub display_id: Option<DisplayId>,

    /// Output width in pixels (default: 1920).
    pub width: u32,

    /// Output height in pixels (default: 1080).
    pub height: u32,

    /// Output pixel format (default: BGRA).
    pub pixel_format: PixelFormat,

    /// Frame rate cap; the minimum frame interval is 1/fps (default: 60).
    pub max_frame_rate: u32,

    /// Draw the cursor into captured frames (default: true).
    pub shows_cursor: bool,

    /// Capture system audio alongside video (default: false).
    pub captures_audio: bool,

    /// Audio sample rate in Hz (default: 48000).
    pub sample_rate: u32,

    /// Audio channel count (default: 2).
    pub channel_count: u16,

    /// Bundle identifier of the consuming application, excluded from capture.
    pub excluded_bundle_identifier: Option<String>,
}

impl ScreenCaptureConfiguration {
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "output resolution must be non-zero: {}x{}",
                self.width, self.height
            ));
        }
        if self.max_frame_rate == 0 {
            return Err("frame rate must be positive".into());
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if ![1, 2].contains(&self.channel_count) {
            return Err(format!("unsupported channel count: {}", self.channel_count));
        }
        Ok(())
    }
}

impl Default for ScreenCaptureConfiguration {
    fn default() -> Self {
        Self {
            display_id: None,
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Bgra32,
            max_frame_rate: 60,
            shows_cursor: true,
            captures_audio: false,
            sample_rate: 48000,
            channel_count: 2,
            excluded_bundle_identifier: None,
        }
    }
}
