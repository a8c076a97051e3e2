use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::AudioRouting;
use crate::models::device_family::{DeviceFamily, VideoGeometry};
use crate::models::diagnostics::ActiveDevice;
use crate::models::error::CaptureError;
use crate::models::format::{Dimensions, PixelFormat, VideoFormat, VideoSpec};
use crate::models::graph::{
    Connection, ConnectionId, DeviceInput, InputPort, MediaType, ObserverToken, OutputTap,
    PreviewLayer, Rect, SessionId, VideoDataSettings, VideoGravity,
};
use crate::models::sample_buffer::SampleBuffer;
use crate::models::source::SourceKind;
use crate::models::state::DeviceSessionState;
use crate::processing::format_selector::DeviceFormatSelector;
use crate::processing::serial_queue::{QueueHandle, SerialQueue};
use crate::traits::capture_device::CaptureDevice;
use crate::traits::shared_session::SharedCaptureSession;

/// What a device session reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSignal {
    /// A buffer from the session's video connection.
    VideoSample(SampleBuffer),
    /// The preview layer was attached or resized.
    PreviewLayerReady(PreviewLayer),
    /// Aspect-ratio classification changed.
    FamilyDetected(DeviceFamily),
}

/// Receiver of [`DeviceSignal`]s, keyed by the posting session's id.
///
/// Sessions never hold a reference to the orchestrator; they post through
/// this sink and the owner resolves the id in its own routing table.
pub trait DeviceSignalSink: Send + Sync {
    fn post(&self, session: SessionId, signal: DeviceSignal);
}

/// Per-device settings taken from the orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceSessionOptions {
    pub video_spec: Option<VideoSpec>,
    pub pixel_format: PixelFormat,
    pub audio_routing: AudioRouting,
}

#[derive(Debug, Default)]
struct DetectionState {
    geometry: VideoGeometry,
    family: Option<DeviceFamily>,
    preview_layer: Option<PreviewLayer>,
}

impl DetectionState {
    /// Record a new geometry and reclassify. Returns the family when the
    /// classification changed; repeated dimensions are ignored.
    fn observe(&mut self, width: u32, height: u32) -> Option<DeviceFamily> {
        if width == self.geometry.width && height == self.geometry.height {
            return None;
        }
        self.geometry = VideoGeometry::new(width, height);

        let ratio = self.geometry.aspect_ratio_x100()?;
        let family = DeviceFamily::nearest(ratio);
        log::debug!(
            "Classified {}x{} (ratio {}) as {}",
            width,
            height,
            ratio,
            family.raw()
        );
        if self.family == Some(family) {
            return None;
        }
        self.family = Some(family);
        Some(family)
    }
}

#[derive(Debug, Default)]
struct ConnectionRoutes {
    video: Option<ConnectionId>,
    audio: Option<ConnectionId>,
}

/// State reachable from tap receivers and format observers. Everything here
/// is touched from the device queue as well as the configuration queue.
struct SessionShared {
    id: SessionId,
    unique_id: String,
    sink: Arc<dyn DeviceSignalSink>,
    torn_down: AtomicBool,
    routes: Mutex<ConnectionRoutes>,
    detection: Mutex<DetectionState>,
}

impl SessionShared {
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    fn on_sample_buffer(&self, buffer: SampleBuffer, connection: ConnectionId) {
        if self.is_torn_down() {
            return;
        }
        let routes = self.routes.lock();
        if routes.video == Some(connection) {
            drop(routes);
            self.sink.post(self.id, DeviceSignal::VideoSample(buffer));
        } else if routes.audio == Some(connection) {
            // Monitored through the audio preview tap.
            log::trace!("Dropping audio buffer {} from {}", buffer.sequence, self.unique_id);
        }
    }

    fn auto_detect(&self, width: u32, height: u32) -> Option<DeviceFamily> {
        let family = self.detection.lock().observe(width, height)?;
        log::info!("Detected {} on {}", family.raw(), self.unique_id);
        self.sink.post(self.id, DeviceSignal::FamilyDetected(family));
        Some(family)
    }

    fn on_format_change(&self, dimensions: Option<Dimensions>) {
        if self.is_torn_down() {
            return;
        }
        let Some(dimensions) = dimensions else {
            log::warn!("Unable to read format description of {}", self.unique_id);
            return;
        };
        self.auto_detect(dimensions.width, dimensions.height);

        let layer = {
            let mut detection = self.detection.lock();
            let Some(layer) = detection.preview_layer.as_mut() else {
                return;
            };
            layer.frame = Rect::from_size(dimensions.width as f64, dimensions.height as f64);
            *layer
        };
        self.sink.post(self.id, DeviceSignal::PreviewLayerReady(layer));
    }

    fn publish_preview_layer(&self) {
        let layer = self.detection.lock().preview_layer;
        if let Some(layer) = layer {
            self.sink.post(self.id, DeviceSignal::PreviewLayerReady(layer));
        }
    }
}

/// One physical device bound into the shared session.
///
/// The session owns every input, tap and connection it creates. The owner
/// adds them to the shared session and removes them again before calling
/// [`CaptureDeviceSession::teardown`]. Sample buffers and format changes are
/// handled on a private serial queue labelled with the device's unique id.
pub struct CaptureDeviceSession {
    device: Option<Arc<dyn CaptureDevice>>,
    model_id: String,
    localized_name: String,
    options: DeviceSessionOptions,
    state: DeviceSessionState,

    input: Option<DeviceInput>,
    video_port: Option<InputPort>,
    audio_port: Option<InputPort>,

    video_output: Option<OutputTap>,
    audio_output: Option<OutputTap>,
    audio_preview_output: Option<OutputTap>,

    video_connection: Option<Connection>,
    audio_connection: Option<Connection>,
    preview_connection: Option<Connection>,
    preview_active: bool,

    observers: Vec<ObserverToken>,
    queue: Option<SerialQueue>,
    shared: Arc<SessionShared>,
}

impl CaptureDeviceSession {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        sink: Arc<dyn DeviceSignalSink>,
        options: DeviceSessionOptions,
    ) -> Result<Self, CaptureError> {
        let unique_id = device.unique_id().to_string();
        let queue = SerialQueue::new(unique_id.clone())?;

        Ok(Self {
            model_id: device.model_id().to_string(),
            localized_name: device.localized_name().to_string(),
            device: Some(device),
            options,
            state: DeviceSessionState::Uninitialized,
            input: None,
            video_port: None,
            audio_port: None,
            video_output: None,
            audio_output: None,
            audio_preview_output: None,
            video_connection: None,
            audio_connection: None,
            preview_connection: None,
            preview_active: false,
            observers: Vec::new(),
            queue: Some(queue),
            shared: Arc::new(SessionShared {
                id: SessionId::new(),
                unique_id,
                sink,
                torn_down: AtomicBool::new(false),
                routes: Mutex::new(ConnectionRoutes::default()),
                detection: Mutex::new(DetectionState::default()),
            }),
        })
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn unique_id(&self) -> &str {
        &self.shared.unique_id
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn state(&self) -> DeviceSessionState {
        self.state
    }

    pub fn input(&self) -> Option<&DeviceInput> {
        self.input.as_ref()
    }

    pub fn video_output(&self) -> Option<&OutputTap> {
        self.video_output.as_ref()
    }

    pub fn audio_output(&self) -> Option<&OutputTap> {
        self.audio_output.as_ref()
    }

    pub fn audio_preview_output(&self) -> Option<&OutputTap> {
        self.audio_preview_output.as_ref()
    }

    pub fn video_connection(&self) -> Option<&Connection> {
        self.video_connection.as_ref()
    }

    pub fn audio_connection(&self) -> Option<&Connection> {
        self.audio_connection.as_ref()
    }

    pub fn preview_connection(&self) -> Option<&Connection> {
        self.preview_connection.as_ref()
    }

    pub fn is_preview_active(&self) -> bool {
        self.preview_active
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.shared.detection.lock().geometry
    }

    pub fn device_family(&self) -> Option<DeviceFamily> {
        self.shared.detection.lock().family
    }

    pub fn preview_layer(&self) -> Option<PreviewLayer> {
        self.shared.detection.lock().preview_layer
    }

    /// Select and apply a format for `spec`.
    pub fn apply_video_spec(&self, spec: &VideoSpec) -> Result<Option<VideoFormat>, CaptureError> {
        let device = self.device.as_ref().ok_or(CaptureError::DeviceNotAvailable)?;
        DeviceFormatSelector::apply(device.as_ref(), spec)
    }

    /// Apply the configured format, open the device input and subscribe to
    /// format changes on its video port.
    ///
    /// Failures are logged; a session whose input cannot be opened stays
    /// uninitialized with no input, and the orchestrator does not attach it.
    pub fn initialize(&mut self) {
        let Some(device) = self.device.clone() else {
            log::warn!("initialize called on torn-down session {}", self.unique_id());
            return;
        };

        if !device.formats().is_empty() {
            let spec = self.options.video_spec.unwrap_or_default();
            if let Err(e) = self.apply_video_spec(&spec) {
                log::error!("Unable to configure format of {}: {}", self.model_id, e);
            }
        }

        let ports = match device.input_ports() {
            Ok(ports) => ports,
            Err(e) => {
                log::warn!("Couldn't open input for {}: {}", self.unique_id(), e);
                return;
            }
        };

        let input = DeviceInput::new(self.unique_id(), ports);
        self.video_port = input.port(MediaType::Video).or_else(|| input.port(MediaType::Muxed));
        self.audio_port = input.port(MediaType::Audio);
        self.input = Some(input);

        if let Some(port) = self.video_port {
            let shared = Arc::clone(&self.shared);
            let handle = self.queue.as_ref().map(SerialQueue::handle);
            let token = device.add_format_observer(
                port.id,
                Arc::new(move |dimensions| {
                    let Some(handle) = &handle else { return };
                    let shared = Arc::clone(&shared);
                    handle.dispatch(move || shared.on_format_change(dimensions));
                }),
            );
            self.observers.push(token);
        } else {
            log::warn!("{} has no video port", self.unique_id());
        }

        self.state = DeviceSessionState::PortsResolved;
    }

    /// Create the video data tap and the audio sinks, and register the
    /// sample receiver on the device queue.
    pub fn configure_outputs(&mut self) {
        let Some(queue) = self.queue.as_ref() else {
            return;
        };

        let video_output = OutputTap::video_data(VideoDataSettings {
            pixel_format: self.options.pixel_format,
            ..VideoDataSettings::default()
        });
        let audio_output = OutputTap::audio_data();

        for tap in [&video_output, &audio_output] {
            let handle = queue.handle();
            let shared = Arc::clone(&self.shared);
            tap.set_sample_buffer_receiver(Arc::new(move |buffer, connection| {
                let shared = Arc::clone(&shared);
                handle.dispatch(move || shared.on_sample_buffer(buffer, connection));
            }));
        }

        if self.audio_port.is_some() && self.options.audio_routing == AudioRouting::Preview {
            self.audio_preview_output = Some(OutputTap::audio_preview(1.0));
        }
        self.video_output = Some(video_output);
        self.audio_output = Some(audio_output);
        self.state = DeviceSessionState::OutputsConfigured;
    }

    /// Link resolved ports to their taps. Missing ports are skipped.
    pub fn build_connections(&mut self) {
        if let (Some(port), Some(output)) = (self.video_port, self.video_output.as_ref()) {
            self.video_connection = Some(Connection::to_output(port, output));
        }

        let audio_sink = self
            .audio_preview_output
            .as_ref()
            .or(self.audio_output.as_ref());
        if let (Some(port), Some(sink)) = (self.audio_port, audio_sink) {
            self.audio_connection = Some(Connection::to_output(port, sink));
        }

        *self.shared.routes.lock() = ConnectionRoutes {
            video: self.video_connection.map(|c| c.id),
            audio: self.audio_connection.map(|c| c.id),
        };
        self.state = DeviceSessionState::ConnectionsBuilt;
    }

    /// Create a preview layer on `session` and a connection feeding it from
    /// the video port. Returns `None` for devices without video.
    pub fn attach_preview(&mut self, session: &dyn SharedCaptureSession) -> Option<Connection> {
        let Some(port) = self.video_port else {
            log::warn!("No video port on {}, skipping preview", self.unique_id());
            return None;
        };

        let handle = session.create_preview_layer();
        let geometry = self.geometry();
        let layer = PreviewLayer {
            handle,
            frame: Rect::from_size(geometry.width as f64, geometry.height as f64),
            gravity: VideoGravity::ResizeAspectFill,
        };
        self.shared.detection.lock().preview_layer = Some(layer);

        let connection = Connection::to_preview_layer(port, handle);
        self.preview_connection = Some(connection);
        self.preview_active = true;
        self.state = DeviceSessionState::PreviewAttached;
        log::debug!("Preview layer attached for {}", self.unique_id());
        Some(connection)
    }

    /// Abandon the audio preview tap and route audio into the data tap
    /// instead. Returns the rebuilt audio connection.
    pub fn fallback_audio_to_data_output(&mut self) -> Option<Connection> {
        self.audio_preview_output = None;
        let (Some(port), Some(output)) = (self.audio_port, self.audio_output.as_ref()) else {
            self.audio_connection = None;
            self.shared.routes.lock().audio = None;
            return None;
        };
        let connection = Connection::to_output(port, output);
        self.audio_connection = Some(connection);
        self.shared.routes.lock().audio = Some(connection.id);
        Some(connection)
    }

    pub fn mark_active(&mut self) {
        self.state = DeviceSessionState::Active;
    }

    /// Re-post the current preview layer, if one is attached.
    pub fn send_preview_layer(&self) {
        self.shared.publish_preview_layer();
    }

    /// Reclassify for a newly observed geometry. Only acts when width or
    /// height differ from the last observed values; posts
    /// [`DeviceSignal::FamilyDetected`] when the family changes.
    pub fn auto_detect_process(&self, width: u32, height: u32) -> Option<DeviceFamily> {
        self.shared.auto_detect(width, height)
    }

    /// Gate the audio preview tap. Returns `false` when there is none.
    pub fn set_audio_preview_volume(&self, volume: f32) -> bool {
        match &self.audio_preview_output {
            Some(tap) => {
                tap.set_volume(volume);
                true
            }
            None => false,
        }
    }

    /// Handle to the device queue, `None` once torn down.
    pub fn queue_handle(&self) -> Option<QueueHandle> {
        self.queue.as_ref().map(SerialQueue::handle)
    }

    /// Wait until jobs already queued on the device queue have run.
    pub fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.sync(|| ());
        }
    }

    pub fn snapshot(&self, kind: SourceKind) -> ActiveDevice {
        let detection = self.shared.detection.lock();
        ActiveDevice {
            session_id: self.id(),
            unique_id: self.unique_id().to_string(),
            model_id: self.model_id.clone(),
            localized_name: self.localized_name.clone(),
            kind,
            state: self.state,
            geometry: detection.geometry,
            device_family: detection.family,
            audio_preview_volume: self.audio_preview_output.as_ref().map(OutputTap::volume),
            has_video_connection: self.video_connection.is_some(),
            has_audio_connection: self.audio_connection.is_some(),
            preview_active: self.preview_active,
        }
    }

    /// Release everything the session owns.
    ///
    /// Format observers are removed first, then queued jobs are drained with
    /// delivery disabled, then graph objects are dropped and the device
    /// handle is released last. Calling this twice logs and does nothing.
    pub fn teardown(&mut self) {
        if self.state.is_torn_down() {
            log::warn!("Teardown requested twice for {}", self.unique_id());
            return;
        }

        if let Some(device) = &self.device {
            for token in self.observers.drain(..) {
                device.remove_format_observer(token);
            }
        }
        self.shared.torn_down.store(true, Ordering::SeqCst);

        for tap in [&self.video_output, &self.audio_output].into_iter().flatten() {
            tap.clear_sample_buffer_receiver();
        }
        if let Some(mut queue) = self.queue.take() {
            queue.shutdown();
        }

        self.audio_connection = None;
        self.video_connection = None;
        self.preview_connection = None;
        self.preview_active = false;
        self.video_output = None;
        self.audio_output = None;
        self.audio_preview_output = None;
        self.input = None;
        self.audio_port = None;
        self.video_port = None;
        *self.shared.routes.lock() = ConnectionRoutes::default();
        self.shared.detection.lock().preview_layer = None;
        self.device = None;

        self.state = DeviceSessionState::TornDown;
        log::info!("Tore down {}", self.unique_id());
    }
}

impl Drop for CaptureDeviceSession {
    fn drop(&mut self) {
        if !self.state.is_torn_down() {
            self.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device_family::Orientation;
    use crate::models::format::FrameRateRange;
    use crate::models::graph::{ConnectionTarget, OutputKind};
    use crate::testing::{MockDevice, MockSession, RecordingSink};

    fn session_for(device: Arc<MockDevice>) -> (CaptureDeviceSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let session = CaptureDeviceSession::new(
            device,
            Arc::clone(&sink) as Arc<dyn DeviceSignalSink>,
            DeviceSessionOptions::default(),
        )
        .unwrap();
        (session, sink)
    }

    fn prepared(device: Arc<MockDevice>) -> (CaptureDeviceSession, Arc<RecordingSink>) {
        let (mut session, sink) = session_for(device);
        session.initialize();
        session.configure_outputs();
        session.build_connections();
        (session, sink)
    }

    #[test]
    fn classification_table() {
        let (session, sink) = session_for(Arc::new(MockDevice::mobile("phone")));
        assert_eq!(session.auto_detect_process(1920, 1080), Some(DeviceFamily::IPhoneLegacy));
        assert_eq!(session.auto_detect_process(2048, 1536), Some(DeviceFamily::IPad));
        assert_eq!(session.auto_detect_process(2388, 1668), Some(DeviceFamily::IPadPro11));
        assert_eq!(session.auto_detect_process(2796, 1290), Some(DeviceFamily::IPhoneXSeries));
        assert_eq!(
            sink.families(),
            vec![
                DeviceFamily::IPhoneLegacy,
                DeviceFamily::IPad,
                DeviceFamily::IPadPro11,
                DeviceFamily::IPhoneXSeries
            ]
        );
    }

    #[test]
    fn repeated_geometry_does_not_reclassify() {
        let (session, sink) = session_for(Arc::new(MockDevice::mobile("phone")));
        session.auto_detect_process(1080, 1920);
        assert_eq!(session.auto_detect_process(1080, 1920), None);
        assert_eq!(sink.families().len(), 1);
        assert_eq!(session.geometry().orientation, Orientation::Portrait);
    }

    #[test]
    fn rotation_keeps_family_without_notifying() {
        let (session, sink) = session_for(Arc::new(MockDevice::mobile("phone")));
        session.auto_detect_process(1080, 1920);
        assert_eq!(session.auto_detect_process(1920, 1080), None);
        assert_eq!(session.geometry().orientation, Orientation::Landscape);
        assert_eq!(sink.families(), vec![DeviceFamily::IPhoneLegacy]);
    }

    #[test]
    fn zero_geometry_is_recorded_but_not_classified() {
        let (session, sink) = session_for(Arc::new(MockDevice::mobile("phone")));
        assert_eq!(session.auto_detect_process(0, 1080), None);
        assert_eq!(session.geometry().height, 1080);
        assert!(sink.families().is_empty());
        assert_eq!(session.device_family(), None);
    }

    #[test]
    fn initialize_resolves_ports_and_subscribes() {
        let device = Arc::new(MockDevice::camera("cam", "Cam Link 4K", "Elgato"));
        let (mut session, _) = session_for(Arc::clone(&device));
        session.initialize();

        assert_eq!(session.state(), DeviceSessionState::PortsResolved);
        let input = session.input().unwrap();
        assert_eq!(input.ports.len(), 2);
        assert_eq!(device.observer_count(), 1);
    }

    #[test]
    fn initialize_applies_highest_resolution() {
        let formats = vec![
            VideoFormat::new(1280, 720, vec![FrameRateRange::new(1.0, 30.0)]),
            VideoFormat::new(1920, 1080, vec![FrameRateRange::new(1.0, 30.0)]),
        ];
        let device = Arc::new(MockDevice::camera("cam", "Cam Link 4K", "Elgato").with_formats(formats));
        let (mut session, _) = session_for(Arc::clone(&device));
        session.initialize();
        assert_eq!(
            device.active_format().map(|f| f.dimensions),
            Some(Dimensions::new(1920, 1080))
        );
    }

    #[test]
    fn lock_failure_does_not_block_initialize() {
        let formats = vec![VideoFormat::new(1920, 1080, vec![FrameRateRange::new(1.0, 30.0)])];
        let device = Arc::new(
            MockDevice::camera("cam", "Cam Link 4K", "Elgato")
                .with_formats(formats)
                .failing_lock(),
        );
        let (mut session, _) = session_for(Arc::clone(&device));
        session.initialize();
        assert_eq!(session.state(), DeviceSessionState::PortsResolved);
        assert!(session.apply_video_spec(&VideoSpec::default()).is_err());
    }

    #[test]
    fn failed_input_leaves_session_uninitialized() {
        let device = Arc::new(MockDevice::camera("cam", "Cam", "Elgato").failing_input());
        let (mut session, _) = session_for(device);
        session.initialize();
        assert_eq!(session.state(), DeviceSessionState::Uninitialized);
        assert!(session.input().is_none());
    }

    #[test]
    fn outputs_prefer_audio_preview() {
        let (session, _) = prepared(Arc::new(MockDevice::mobile("phone")));
        let preview = session.audio_preview_output().unwrap();
        assert_eq!(preview.kind(), OutputKind::AudioPreview);
        assert_eq!(preview.volume(), 1.0);
        assert!(session.audio_output().is_some());

        let audio = session.audio_connection().unwrap();
        assert_eq!(audio.target, ConnectionTarget::Output(preview.id()));
        assert!(session.video_output().unwrap().has_receiver());
    }

    #[test]
    fn data_output_routing_skips_preview_tap() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = CaptureDeviceSession::new(
            Arc::new(MockDevice::mobile("phone")),
            sink,
            DeviceSessionOptions {
                audio_routing: AudioRouting::DataOutput,
                ..Default::default()
            },
        )
        .unwrap();
        session.initialize();
        session.configure_outputs();
        session.build_connections();

        assert!(session.audio_preview_output().is_none());
        let audio_output = session.audio_output().unwrap().id();
        assert_eq!(
            session.audio_connection().unwrap().target,
            ConnectionTarget::Output(audio_output)
        );
    }

    #[test]
    fn video_only_device_skips_audio_connection() {
        let device = Arc::new(MockDevice::camera("cam", "Cam", "Elgato").with_ports(&[MediaType::Video]));
        let (session, _) = prepared(device);
        assert!(session.video_connection().is_some());
        assert!(session.audio_connection().is_none());
        assert!(session.audio_preview_output().is_none());
    }

    #[test]
    fn audio_only_device_has_no_preview() {
        let device = Arc::new(MockDevice::camera("mic", "Mic", "Shure").with_ports(&[MediaType::Audio]));
        let (mut session, _) = prepared(device);
        assert!(session.video_connection().is_none());
        assert!(session.audio_connection().is_some());
        assert!(session.attach_preview(&MockSession::default()).is_none());
        assert!(!session.is_preview_active());
    }

    #[test]
    fn video_samples_are_posted_in_order() {
        let (session, sink) = prepared(Arc::new(MockDevice::camera("cam", "Cam", "Elgato")));
        let video = *session.video_connection().unwrap();
        let audio = *session.audio_connection().unwrap();
        let tap = session.video_output().unwrap().clone();
        let audio_tap = session.audio_preview_output().unwrap().clone();

        for seq in 0..5 {
            tap.deliver(SampleBuffer::video(1920, 1080, seq), video.id);
        }
        // Preview taps have no receiver; audio goes nowhere.
        assert!(!audio_tap.deliver(SampleBuffer::audio(99), audio.id));
        session.flush();

        let sequences: Vec<u64> = sink
            .signals()
            .into_iter()
            .filter_map(|s| match s {
                DeviceSignal::VideoSample(b) => Some(b.sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn audio_data_buffers_are_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let mut session = CaptureDeviceSession::new(
            Arc::new(MockDevice::mobile("phone")),
            Arc::clone(&sink) as Arc<dyn DeviceSignalSink>,
            DeviceSessionOptions {
                audio_routing: AudioRouting::DataOutput,
                ..Default::default()
            },
        )
        .unwrap();
        session.initialize();
        session.configure_outputs();
        session.build_connections();

        let audio = *session.audio_connection().unwrap();
        assert!(session.audio_output().unwrap().deliver(SampleBuffer::audio(0), audio.id));
        session.flush();
        assert!(sink.signals().is_empty());
    }

    #[test]
    fn format_change_reclassifies_and_resizes_preview() {
        let device = Arc::new(MockDevice::mobile("phone"));
        let (mut session, sink) = prepared(Arc::clone(&device));
        session.attach_preview(&MockSession::default()).unwrap();

        device.emit_format_change(MediaType::Video, Some(Dimensions::new(1290, 2796)));
        device.emit_format_change(MediaType::Video, Some(Dimensions::new(1290, 2796)));
        session.flush();

        assert_eq!(session.device_family(), Some(DeviceFamily::IPhoneXSeries));
        assert_eq!(sink.families(), vec![DeviceFamily::IPhoneXSeries]);
        let layers: Vec<PreviewLayer> = sink
            .signals()
            .into_iter()
            .filter_map(|s| match s {
                DeviceSignal::PreviewLayerReady(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].frame, Rect::from_size(1290.0, 2796.0));
        assert_eq!(layers[0].gravity, VideoGravity::ResizeAspectFill);
    }

    #[test]
    fn fallback_rebuilds_audio_connection() {
        let (mut session, _) = prepared(Arc::new(MockDevice::mobile("phone")));
        let before = *session.audio_connection().unwrap();
        let rebuilt = session.fallback_audio_to_data_output().unwrap();

        assert_ne!(before.id, rebuilt.id);
        assert_eq!(
            rebuilt.target,
            ConnectionTarget::Output(session.audio_output().unwrap().id())
        );
        assert!(session.audio_preview_output().is_none());
        assert!(!session.set_audio_preview_volume(0.0));
    }

    #[test]
    fn teardown_unsubscribes_and_silences() {
        let device = Arc::new(MockDevice::mobile("phone"));
        let (mut session, sink) = prepared(Arc::clone(&device));
        let video = *session.video_connection().unwrap();
        let tap = session.video_output().unwrap().clone();

        session.teardown();

        assert_eq!(device.observer_count(), 0);
        assert_eq!(session.state(), DeviceSessionState::TornDown);
        assert!(session.input().is_none());
        assert!(session.video_connection().is_none());
        assert!(!tap.deliver(SampleBuffer::video(1, 1, 0), video.id));
        device.emit_format_change(MediaType::Video, Some(Dimensions::new(2048, 1536)));
        assert!(sink.signals().is_empty());
    }

    #[test]
    fn teardown_twice_is_guarded() {
        let (mut session, _) = prepared(Arc::new(MockDevice::mobile("phone")));
        session.teardown();
        session.teardown();
        assert_eq!(session.state(), DeviceSessionState::TornDown);
    }

    #[test]
    fn drop_releases_observers() {
        let device = Arc::new(MockDevice::mobile("phone"));
        let (session, _) = prepared(Arc::clone(&device));
        drop(session);
        assert_eq!(device.observer_count(), 0);
    }
}
