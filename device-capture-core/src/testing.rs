//! Hand-rolled test doubles shared by the inline test modules.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::SessionPreset;
use crate::models::device_family::DeviceFamily;
use crate::models::error::CaptureError;
use crate::models::format::{Dimensions, FrameDuration, VideoFormat};
use crate::models::graph::{
    Connection, ConnectionId, ConnectionTarget, DeviceInput, InputId, InputPort, MediaType,
    ObserverToken, OutputId, OutputKind, OutputTap, PortId, PreviewLayer, PreviewLayerHandle,
    SessionId,
};
use crate::models::sample_buffer::SampleBuffer;
use crate::models::source::SourceKind;
use crate::session::device::{DeviceSignal, DeviceSignalSink};
use crate::traits::capture_device::{CaptureDevice, DeviceConfiguration, FormatChangeCallback};
use crate::traits::device_discovery::{DeviceDiscovery, DiscoveryQuery};
use crate::traits::device_events::DeviceEvents;
use crate::traits::shared_session::SharedCaptureSession;

#[derive(Default)]
struct MockDeviceState {
    active_format: Option<VideoFormat>,
    frame_durations: Option<(FrameDuration, FrameDuration)>,
    locked: bool,
    dimensions: Option<Dimensions>,
    observers: HashMap<ObserverToken, (PortId, FormatChangeCallback)>,
}

pub struct MockDevice {
    unique_id: String,
    model_id: String,
    manufacturer: String,
    formats: Vec<VideoFormat>,
    ports: Vec<InputPort>,
    fail_lock: bool,
    fail_input: bool,
    state: Mutex<MockDeviceState>,
}

impl MockDevice {
    /// Camera with one video and one audio port.
    pub fn camera(unique_id: &str, model_id: &str, manufacturer: &str) -> Self {
        Self {
            unique_id: unique_id.into(),
            model_id: model_id.into(),
            manufacturer: manufacturer.into(),
            formats: Vec::new(),
            ports: vec![InputPort::new(MediaType::Video), InputPort::new(MediaType::Audio)],
            fail_lock: false,
            fail_input: false,
            state: Mutex::new(MockDeviceState::default()),
        }
    }

    pub fn mobile(unique_id: &str) -> Self {
        Self::camera(unique_id, "iOS Device", "Apple Inc.")
    }

    pub fn with_formats(mut self, formats: Vec<VideoFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn with_ports(mut self, media_types: &[MediaType]) -> Self {
        self.ports = media_types.iter().map(|m| InputPort::new(*m)).collect();
        self
    }

    pub fn failing_lock(mut self) -> Self {
        self.fail_lock = true;
        self
    }

    pub fn failing_input(mut self) -> Self {
        self.fail_input = true;
        self
    }

    pub fn into_arc(self) -> Arc<dyn CaptureDevice> {
        Arc::new(self)
    }

    pub fn frame_durations(&self) -> Option<(FrameDuration, FrameDuration)> {
        self.state.lock().frame_durations
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Fire every observer registered on `media_type`'s port.
    pub fn emit_format_change(&self, media_type: MediaType, dimensions: Option<Dimensions>) {
        let Some(port) = self.ports.iter().find(|p| p.media_type == media_type) else {
            return;
        };
        let callbacks: Vec<FormatChangeCallback> = {
            let mut state = self.state.lock();
            state.dimensions = dimensions;
            state
                .observers
                .values()
                .filter(|(observed, _)| *observed == port.id)
                .map(|(_, cb)| Arc::clone(cb))
                .collect()
        };
        for callback in callbacks {
            callback(dimensions);
        }
    }
}

struct MockConfiguration<'a> {
    device: &'a MockDevice,
}

impl DeviceConfiguration for MockConfiguration<'_> {
    fn set_active_format(&mut self, format: &VideoFormat) {
        self.device.state.lock().active_format = Some(format.clone());
    }

    fn set_active_frame_duration(&mut self, min: FrameDuration, max: FrameDuration) {
        self.device.state.lock().frame_durations = Some((min, max));
    }
}

impl Drop for MockConfiguration<'_> {
    fn drop(&mut self) {
        self.device.state.lock().locked = false;
    }
}

impl CaptureDevice for MockDevice {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    fn localized_name(&self) -> &str {
        &self.model_id
    }

    fn formats(&self) -> Vec<VideoFormat> {
        self.formats.clone()
    }

    fn active_format(&self) -> Option<VideoFormat> {
        self.state.lock().active_format.clone()
    }

    fn lock_for_configuration(&self) -> Result<Box<dyn DeviceConfiguration + '_>, CaptureError> {
        if self.fail_lock {
            return Err(CaptureError::ConfigurationLockFailed {
                device: self.unique_id.clone(),
                reason: "held by another client".into(),
            });
        }
        self.state.lock().locked = true;
        Ok(Box::new(MockConfiguration { device: self }))
    }

    fn input_ports(&self) -> Result<Vec<InputPort>, CaptureError> {
        if self.fail_input {
            return Err(CaptureError::InputUnavailable(self.unique_id.clone()));
        }
        Ok(self.ports.clone())
    }

    fn format_description(&self, _port: PortId) -> Option<Dimensions> {
        self.state.lock().dimensions
    }

    fn add_format_observer(&self, port: PortId, callback: FormatChangeCallback) -> ObserverToken {
        let token = ObserverToken::new();
        self.state.lock().observers.insert(token, (port, callback));
        token
    }

    fn remove_format_observer(&self, token: ObserverToken) {
        self.state.lock().observers.remove(&token);
    }
}

#[derive(Default)]
struct MockSessionState {
    preset: Option<SessionPreset>,
    running: bool,
    depth: u32,
    commits: u32,
    inputs: Vec<DeviceInput>,
    outputs: Vec<OutputTap>,
    connections: Vec<Connection>,
    layers: Vec<PreviewLayerHandle>,
    reject_audio_preview: bool,
    reject_inputs: bool,
}

/// Shared session double with real add/remove bookkeeping.
#[derive(Default)]
pub struct MockSession {
    state: Mutex<MockSessionState>,
}

impl MockSession {
    pub fn rejecting_audio_preview(self) -> Self {
        self.state.lock().reject_audio_preview = true;
        self
    }

    pub fn rejecting_inputs(self) -> Self {
        self.state.lock().reject_inputs = true;
        self
    }

    pub fn preset(&self) -> Option<SessionPreset> {
        self.state.lock().preset
    }

    pub fn input_count(&self) -> usize {
        self.state.lock().inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.state.lock().outputs.len()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn has_connection(&self, id: ConnectionId) -> bool {
        self.state.lock().connections.iter().any(|c| c.id == id)
    }

    pub fn has_output_kind(&self, kind: fn(&OutputKind) -> bool) -> bool {
        self.state.lock().outputs.iter().any(|o| kind(&o.kind()))
    }

    pub fn configuration_depth(&self) -> u32 {
        self.state.lock().depth
    }

    pub fn commits(&self) -> u32 {
        self.state.lock().commits
    }

    /// Feed `buffer` into every output connected to `port`.
    pub fn push_sample(&self, port: PortId, buffer: SampleBuffer) -> usize {
        let targets: Vec<(OutputTap, ConnectionId)> = {
            let state = self.state.lock();
            state
                .connections
                .iter()
                .filter(|c| c.input_port == port)
                .filter_map(|c| match c.target {
                    ConnectionTarget::Output(id) => state
                        .outputs
                        .iter()
                        .find(|o| o.id() == id)
                        .map(|o| (o.clone(), c.id)),
                    ConnectionTarget::PreviewLayer(_) => None,
                })
                .collect()
        };
        targets
            .into_iter()
            .filter(|(tap, connection)| tap.deliver(buffer.clone(), *connection))
            .count()
    }

    /// First video port of the attached input for `unique_id`.
    pub fn video_port_of(&self, unique_id: &str) -> Option<PortId> {
        self.state
            .lock()
            .inputs
            .iter()
            .find(|i| i.device_unique_id == unique_id)
            .and_then(|i| i.port(MediaType::Video))
            .map(|p| p.id)
    }
}

impl SharedCaptureSession for MockSession {
    fn set_session_preset(&self, preset: SessionPreset) {
        self.state.lock().preset = Some(preset);
    }

    fn start_running(&self) {
        self.state.lock().running = true;
    }

    fn stop_running(&self) {
        self.state.lock().running = false;
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn begin_configuration(&self) {
        self.state.lock().depth += 1;
    }

    fn commit_configuration(&self) {
        let mut state = self.state.lock();
        state.depth = state.depth.saturating_sub(1);
        state.commits += 1;
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        let state = self.state.lock();
        !state.reject_inputs
            && !state
                .inputs
                .iter()
                .any(|i| i.device_unique_id == input.device_unique_id)
    }

    fn add_input_with_no_connections(&self, input: &DeviceInput) {
        self.state.lock().inputs.push(input.clone());
    }

    fn remove_input(&self, input: InputId) {
        self.state.lock().inputs.retain(|i| i.id != input);
    }

    fn can_add_output(&self, output: &OutputTap) -> bool {
        let state = self.state.lock();
        if state.reject_audio_preview && output.kind() == OutputKind::AudioPreview {
            return false;
        }
        !state.outputs.contains(output)
    }

    fn add_output_with_no_connections(&self, output: &OutputTap) {
        self.state.lock().outputs.push(output.clone());
    }

    fn remove_output(&self, output: OutputId) {
        self.state.lock().outputs.retain(|o| o.id() != output);
    }

    fn outputs(&self) -> Vec<OutputId> {
        self.state.lock().outputs.iter().map(|o| o.id()).collect()
    }

    fn can_add_connection(&self, connection: &Connection) -> bool {
        let state = self.state.lock();
        let port_known = state
            .inputs
            .iter()
            .any(|i| i.ports.iter().any(|p| p.id == connection.input_port));
        let target_known = match connection.target {
            ConnectionTarget::Output(id) => state.outputs.iter().any(|o| o.id() == id),
            ConnectionTarget::PreviewLayer(handle) => state.layers.contains(&handle),
        };
        port_known && target_known && !state.connections.iter().any(|c| c.id == connection.id)
    }

    fn add_connection(&self, connection: &Connection) {
        self.state.lock().connections.push(*connection);
    }

    fn remove_connection(&self, connection: ConnectionId) {
        self.state.lock().connections.retain(|c| c.id != connection);
    }

    fn create_preview_layer(&self) -> PreviewLayerHandle {
        let handle = PreviewLayerHandle::new();
        self.state.lock().layers.push(handle);
        handle
    }
}

/// Discovery returning a fixed list for every query.
#[derive(Default)]
pub struct MockDiscovery {
    devices: Mutex<Vec<Arc<dyn CaptureDevice>>>,
    screen_capture_allowed: Mutex<Option<bool>>,
}

impl MockDiscovery {
    pub fn with_devices(devices: Vec<Arc<dyn CaptureDevice>>) -> Self {
        Self {
            devices: Mutex::new(devices),
            screen_capture_allowed: Mutex::new(None),
        }
    }

    pub fn screen_capture_allowed(&self) -> Option<bool> {
        *self.screen_capture_allowed.lock()
    }
}

impl DeviceDiscovery for MockDiscovery {
    fn devices(&self, _query: &DiscoveryQuery) -> Vec<Arc<dyn CaptureDevice>> {
        self.devices.lock().clone()
    }

    fn allow_screen_capture_devices(&self, allow: bool) {
        *self.screen_capture_allowed.lock() = Some(allow);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    DeviceFrame(u64),
    CaptureFrame(u64),
    PreviewLayer(SourceKind, PreviewLayer),
    PrimaryActive(bool),
    Family(DeviceFamily),
    PrimaryLost,
}

/// Delegate recording every callback in arrival order.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn count(&self, filter: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().iter().filter(|e| filter(e)).count()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl DeviceEvents for RecordingEvents {
    fn on_device_frame(&self, buffer: &SampleBuffer) {
        self.push(Recorded::DeviceFrame(buffer.sequence));
    }

    fn on_capture_frame(&self, buffer: &SampleBuffer) {
        self.push(Recorded::CaptureFrame(buffer.sequence));
    }

    fn on_preview_layer_ready(&self, layer: &PreviewLayer, source: SourceKind) {
        self.push(Recorded::PreviewLayer(source, *layer));
    }

    fn on_primary_active_changed(&self, is_active: bool) {
        self.push(Recorded::PrimaryActive(is_active));
    }

    fn on_device_family_detected(&self, family: DeviceFamily) {
        self.push(Recorded::Family(family));
    }

    fn on_primary_lost(&self) {
        self.push(Recorded::PrimaryLost);
    }
}

/// Signal sink recording what a device session posts.
#[derive(Default)]
pub struct RecordingSink {
    signals: Mutex<Vec<(SessionId, DeviceSignal)>>,
}

impl RecordingSink {
    pub fn signals(&self) -> Vec<DeviceSignal> {
        self.signals.lock().iter().map(|(_, s)| s.clone()).collect()
    }

    pub fn families(&self) -> Vec<DeviceFamily> {
        self.signals
            .lock()
            .iter()
            .filter_map(|(_, s)| match s {
                DeviceSignal::FamilyDetected(f) => Some(*f),
                _ => None,
            })
            .collect()
    }
}

impl DeviceSignalSink for RecordingSink {
    fn post(&self, session: SessionId, signal: DeviceSignal) {
        self.signals.lock().push((session, signal));
    }
}
