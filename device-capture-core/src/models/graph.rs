//! Value types describing the shared session graph: device inputs and their
//! ports, output taps, preview layers and the connections between them.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::format::PixelFormat;
use super::sample_buffer::SampleBuffer;

macro_rules! graph_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

graph_id!(
    /// Identifies one `CaptureDeviceSession` inside an orchestrator.
    SessionId
);
graph_id!(InputId);
graph_id!(OutputId);
graph_id!(ConnectionId);
graph_id!(
    /// Assigned by the device backend when it exposes its input ports.
    PortId
);
graph_id!(
    /// Opaque handle to a displayable video layer owned by the backend.
    PreviewLayerHandle
);
graph_id!(
    /// Identifies one port format observer registered on a device.
    ObserverToken
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Muxed,
}

/// One port of a device input, tagged with the media it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputPort {
    pub id: PortId,
    pub media_type: MediaType,
}

impl InputPort {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            id: PortId::new(),
            media_type,
        }
    }
}

/// A device opened as a session input, with its resolved ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInput {
    pub id: InputId,
    pub device_unique_id: String,
    pub ports: Vec<InputPort>,
}

impl DeviceInput {
    pub fn new(device_unique_id: impl Into<String>, ports: Vec<InputPort>) -> Self {
        Self {
            id: InputId::new(),
            device_unique_id: device_unique_id.into(),
            ports,
        }
    }

    /// Last port carrying `media_type`.
    pub fn port(&self, media_type: MediaType) -> Option<InputPort> {
        self.ports
            .iter()
            .rev()
            .find(|port| port.media_type == media_type)
            .copied()
    }
}

/// Settings requested from a video data tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDataSettings {
    pub always_discards_late_video_frames: bool,
    pub pixel_format: PixelFormat,
    pub gpu_compatible: bool,
}

impl Default for VideoDataSettings {
    fn default() -> Self {
        Self {
            always_discards_late_video_frames: true,
            pixel_format: PixelFormat::Bgra32,
            gpu_compatible: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    VideoData(VideoDataSettings),
    AudioData,
    /// Plays audio through the system output at the tap's volume.
    AudioPreview,
}

/// Receives buffers produced by an output tap, with the connection that fed it.
pub type SampleBufferReceiver = Arc<dyn Fn(SampleBuffer, ConnectionId) + Send + Sync + 'static>;

struct TapInner {
    id: OutputId,
    kind: OutputKind,
    volume: Mutex<f32>,
    receiver: Mutex<Option<SampleBufferReceiver>>,
}

/// An output of the shared session. Clones share the same tap, so the backend
/// and the owning device session observe the same volume and receiver.
#[derive(Clone)]
pub struct OutputTap {
    inner: Arc<TapInner>,
}

impl OutputTap {
    fn with_kind(kind: OutputKind, volume: f32) -> Self {
        Self {
            inner: Arc::new(TapInner {
                id: OutputId::new(),
                kind,
                volume: Mutex::new(volume),
                receiver: Mutex::new(None),
            }),
        }
    }

    pub fn video_data(settings: VideoDataSettings) -> Self {
        Self::with_kind(OutputKind::VideoData(settings), 1.0)
    }

    pub fn audio_data() -> Self {
        Self::with_kind(OutputKind::AudioData, 1.0)
    }

    pub fn audio_preview(volume: f32) -> Self {
        Self::with_kind(OutputKind::AudioPreview, volume.clamp(0.0, 1.0))
    }

    pub fn id(&self) -> OutputId {
        self.inner.id
    }

    pub fn kind(&self) -> OutputKind {
        self.inner.kind
    }

    pub fn media_type(&self) -> MediaType {
        match self.inner.kind {
            OutputKind::VideoData(_) => MediaType::Video,
            OutputKind::AudioData | OutputKind::AudioPreview => MediaType::Audio,
        }
    }

    pub fn volume(&self) -> f32 {
        *self.inner.volume.lock()
    }

    pub fn set_volume(&self, volume: f32) {
        *self.inner.volume.lock() = volume.clamp(0.0, 1.0);
    }

    pub fn set_sample_buffer_receiver(&self, receiver: SampleBufferReceiver) {
        *self.inner.receiver.lock() = Some(receiver);
    }

    pub fn clear_sample_buffer_receiver(&self) {
        self.inner.receiver.lock().take();
    }

    pub fn has_receiver(&self) -> bool {
        self.inner.receiver.lock().is_some()
    }

    /// Hand a buffer to the registered receiver. Returns `false` when no
    /// receiver is registered and the buffer was dropped.
    pub fn deliver(&self, buffer: SampleBuffer, connection: ConnectionId) -> bool {
        let receiver = self.inner.receiver.lock().clone();
        match receiver {
            Some(receiver) => {
                receiver(buffer, connection);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for OutputTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputTap")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("volume", &self.volume())
            .field("has_receiver", &self.has_receiver())
            .finish()
    }
}

impl PartialEq for OutputTap {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionTarget {
    Output(OutputId),
    PreviewLayer(PreviewLayerHandle),
}

/// Routing link from one input port to an output tap or a preview layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub id: ConnectionId,
    pub input_port: PortId,
    pub media_type: MediaType,
    pub target: ConnectionTarget,
}

impl Connection {
    pub fn to_output(port: InputPort, output: &OutputTap) -> Self {
        Self {
            id: ConnectionId::new(),
            input_port: port.id,
            media_type: port.media_type,
            target: ConnectionTarget::Output(output.id()),
        }
    }

    pub fn to_preview_layer(port: InputPort, layer: PreviewLayerHandle) -> Self {
        Self {
            id: ConnectionId::new(),
            input_port: port.id,
            media_type: port.media_type,
            target: ConnectionTarget::PreviewLayer(layer),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Rect = Rect {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn from_size(width: f64, height: f64) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoGravity {
    Resize,
    ResizeAspect,
    #[default]
    ResizeAspectFill,
}

/// A ready-to-display video layer handed to the UI sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewLayer {
    pub handle: PreviewLayerHandle,
    pub frame: Rect,
    pub gravity: VideoGravity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tap_clones_share_volume() {
        let tap = OutputTap::audio_preview(1.0);
        let backend_copy = tap.clone();
        tap.set_volume(0.0);
        assert_eq!(backend_copy.volume(), 0.0);
        assert_eq!(tap, backend_copy);
    }

    #[test]
    fn volume_is_clamped() {
        let tap = OutputTap::audio_preview(3.0);
        assert_eq!(tap.volume(), 1.0);
        tap.set_volume(-1.0);
        assert_eq!(tap.volume(), 0.0);
    }

    #[test]
    fn deliver_without_receiver_drops() {
        let tap = OutputTap::video_data(VideoDataSettings::default());
        assert!(!tap.deliver(SampleBuffer::video(1, 1, 0), ConnectionId::new()));
    }

    #[test]
    fn cleared_receiver_stops_delivery() {
        let tap = OutputTap::video_data(VideoDataSettings::default());
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        tap.set_sample_buffer_receiver(Arc::new(move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(tap.deliver(SampleBuffer::video(1, 1, 0), ConnectionId::new()));
        tap.clear_sample_buffer_receiver();
        assert!(!tap.deliver(SampleBuffer::video(1, 1, 1), ConnectionId::new()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_input_port_lookup() {
        let video = InputPort::new(MediaType::Video);
        let audio = InputPort::new(MediaType::Audio);
        let input = DeviceInput::new("cam", vec![video, audio]);
        assert_eq!(input.port(MediaType::Video), Some(video));
        assert_eq!(input.port(MediaType::Audio), Some(audio));
        assert_eq!(input.port(MediaType::Muxed), None);
    }

    #[test]
    fn video_data_defaults_discard_late_frames() {
        let settings = VideoDataSettings::default();
        assert!(settings.always_discards_late_video_frames);
        assert!(settings.gpu_compatible);
        assert_eq!(settings.pixel_format, PixelFormat::Bgra32);
    }
}
