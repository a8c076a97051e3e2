#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use device_capture_core::{
    CaptureError, CaptureOrchestrator, DeviceEvents, DeviceFamily, OrchestratorConfiguration,
    PreviewLayer, SampleBuffer, ScreenEvents, SourceKind,
};
use device_capture_virtual::{DeviceRegistry, VirtualCaptureSession, VirtualDevice};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    DeviceFrame(u64),
    CaptureFrame(u64),
    PreviewLayer(SourceKind, PreviewLayer),
    PrimaryActive(bool),
    Family(DeviceFamily),
    PrimaryLost,
    ScreenFrame(u64),
    StreamStopped(CaptureError),
}

/// Delegate that records every callback in arrival order.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, filter: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| filter(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
    }
}

impl DeviceEvents for Recorder {
    fn on_device_frame(&self, buffer: &SampleBuffer) {
        self.push(Event::DeviceFrame(buffer.sequence));
    }

    fn on_capture_frame(&self, buffer: &SampleBuffer) {
        self.push(Event::CaptureFrame(buffer.sequence));
    }

    fn on_preview_layer_ready(&self, layer: &PreviewLayer, source: SourceKind) {
        self.push(Event::PreviewLayer(source, *layer));
    }

    fn on_primary_active_changed(&self, is_active: bool) {
        self.push(Event::PrimaryActive(is_active));
    }

    fn on_device_family_detected(&self, family: DeviceFamily) {
        self.push(Event::Family(family));
    }

    fn on_primary_lost(&self) {
        self.push(Event::PrimaryLost);
    }
}

impl ScreenEvents for Recorder {
    fn on_screen_frame(&self, buffer: &SampleBuffer) {
        self.push(Event::ScreenFrame(buffer.sequence));
    }

    fn on_stream_stopped(&self, error: &CaptureError) {
        self.push(Event::StreamStopped(error.clone()));
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub struct Rig {
    pub registry: Arc<DeviceRegistry>,
    pub graph: Arc<VirtualCaptureSession>,
    pub orchestrator: CaptureOrchestrator,
    pub recorder: Arc<Recorder>,
}

impl Rig {
    pub fn new(devices: Vec<Arc<VirtualDevice>>) -> Self {
        Self::with_config(devices, OrchestratorConfiguration::default())
    }

    pub fn with_config(devices: Vec<Arc<VirtualDevice>>, config: OrchestratorConfiguration) -> Self {
        init_logging();
        let registry = Arc::new(DeviceRegistry::with_devices(devices));
        let graph = Arc::new(VirtualCaptureSession::new());
        let orchestrator = CaptureOrchestrator::new(graph.clone(), registry.clone(), config)
            .expect("valid configuration");
        let recorder = Arc::new(Recorder::default());
        orchestrator.set_delegate(recorder.clone());
        Self {
            registry,
            graph,
            orchestrator,
            recorder,
        }
    }

    /// Start the shared session and attach everything discoverable.
    pub fn start(&self) {
        self.orchestrator.start();
        // Discovery only lists mobiles once start has opted in.
        self.orchestrator.flush();
        self.orchestrator.refresh_devices();
        self.orchestrator.flush();
    }
}
