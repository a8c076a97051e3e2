//! # device-capture-core
//!
//! Platform-agnostic capture device orchestration.
//!
//! Attaches and detaches capture devices to one shared, running capture
//! session, classifies tethered mobile devices by stream geometry, and runs
//! an independent screen capture pipeline. Platform backends implement the
//! inbound traits (`CaptureDevice`, `DeviceDiscovery`, `SharedCaptureSession`,
//! `HotplugSource`, `ScreenCaptureBackend`); consumers implement
//! `DeviceEvents` and `ScreenEvents`.
//!
//! ## Architecture
//!
//! ```text
//! device-capture-core (this crate)
//! ├── traits/       ← CaptureDevice, DeviceDiscovery, SharedCaptureSession, HotplugSource,
//! │                   ScreenCaptureBackend, DeviceEvents, ScreenEvents
//! ├── models/       ← CaptureError, DeviceFamily, VideoSpec, graph ids/taps/connections, configs
//! ├── processing/   ← DeviceFormatSelector, SerialQueue
//! └── session/      ← CaptureDeviceSession, CaptureOrchestrator, HotplugWatcher,
//!                     ScreenCaptureSession
//! ```
//!
//! ## Data flow
//!
//! ```text
//! [device] → taps → [device queue] → SignalRouter → DeviceEvents
//!                                          ↑
//! [HotplugSource] → HotplugWatcher → CaptureOrchestrator → [capture-session-config]
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use models::config::{
    AudioRouting, OrchestratorConfiguration, ScreenCaptureConfiguration, SessionPreset,
};
pub use models::device_family::{DeviceFamily, Orientation, VideoGeometry};
pub use models::diagnostics::{ActiveDevice, CaptureDiagnostics, DeviceDiagnostics};
pub use models::error::CaptureError;
pub use models::format::{Dimensions, FrameDuration, FrameRateRange, PixelFormat, VideoFormat, VideoSpec};
pub use models::graph::{
    Connection, ConnectionId, ConnectionTarget, DeviceInput, InputPort, MediaType, OutputKind,
    OutputTap, PreviewLayer, PreviewLayerHandle, SessionId,
};
pub use models::sample_buffer::{CapturedFrame, SampleBuffer};
pub use models::screen::{ContentFilter, Display, DisplayId, ShareableContent, StreamConfiguration, StreamOutputType};
pub use models::source::SourceKind;
pub use models::state::{DeviceSessionState, ScreenCaptureState};
pub use processing::format_selector::DeviceFormatSelector;
pub use processing::serial_queue::{QueueHandle, SerialQueue};
pub use session::device::{CaptureDeviceSession, DeviceSignal, DeviceSignalSink};
pub use session::hotplug::HotplugWatcher;
pub use session::orchestrator::CaptureOrchestrator;
pub use session::screen::{ScreenCaptureSession, ScreenStreamOutput, StreamId};
pub use traits::capture_device::{CaptureDevice, DeviceConfiguration, FormatChangeCallback};
pub use traits::device_discovery::{DeviceDiscovery, DeviceType, DiscoveryQuery};
pub use traits::device_events::DeviceEvents;
pub use traits::hotplug_source::{ChannelHotplugSource, HotplugEvent, HotplugPoll, HotplugSender, HotplugSource};
pub use traits::screen_capture::{ScreenCaptureBackend, ScreenEvents, ScreenStream};
pub use traits::shared_session::SharedCaptureSession;
