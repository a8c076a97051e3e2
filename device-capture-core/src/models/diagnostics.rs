use chrono::{DateTime, Utc};

use super::device_family::{DeviceFamily, VideoGeometry};
use super::graph::SessionId;
use super::source::SourceKind;
use super::state::DeviceSessionState;

/// Point-in-time view of one active device session.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveDevice {
    pub session_id: SessionId,
    pub unique_id: String,
    pub model_id: String,
    pub localized_name: String,
    pub kind: SourceKind,
    pub state: DeviceSessionState,
    pub geometry: VideoGeometry,
    pub device_family: Option<DeviceFamily>,
    pub audio_preview_volume: Option<f32>,
    pub has_video_connection: bool,
    pub has_audio_connection: bool,
    pub preview_active: bool,
}

/// Per-device counters.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDiagnostics {
    pub unique_id: String,
    pub kind: SourceKind,
    pub frames_delivered: u64,
    pub attached_at: Option<DateTime<Utc>>,
}

/// Diagnostics for debugging the shared session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureDiagnostics {
    pub attach_count: u64,
    pub detach_count: u64,
    /// Can-add checks that failed inside attach transactions.
    pub skipped_attach_steps: u64,
    pub devices: Vec<DeviceDiagnostics>,
}

impl CaptureDiagnostics {
    pub fn device(&self, unique_id: &str) -> Option<&DeviceDiagnostics> {
        self.devices.iter().find(|d| d.unique_id == unique_id)
    }
}
