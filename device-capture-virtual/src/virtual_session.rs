//! In-memory shared capture session.
//!
//! Keeps the same bookkeeping a platform session keeps (inputs, taps,
//! connections, preview layers) and routes frames pushed for a device
//! through its connections to the taps. Frames are only delivered while the
//! session is running.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use device_capture_core::models::graph::{InputId, OutputId};
use device_capture_core::{
    Connection, ConnectionId, ConnectionTarget, DeviceInput, HotplugEvent, HotplugSender,
    MediaType, OutputKind, OutputTap, PreviewLayerHandle, SampleBuffer, SessionPreset,
    SharedCaptureSession,
};

/// A can-add check the session can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    Inputs,
    VideoOutputs,
    AudioPreviewOutputs,
    PreviewConnections,
}

/// Counts of what the session currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphSummary {
    pub inputs: usize,
    pub outputs: usize,
    pub connections: usize,
    pub preview_layers: usize,
    pub running: bool,
    pub configuration_depth: u32,
    pub commits: u32,
}

#[derive(Default)]
struct GraphState {
    preset: Option<SessionPreset>,
    running: bool,
    depth: u32,
    commits: u32,
    inputs: Vec<DeviceInput>,
    outputs: Vec<OutputTap>,
    connections: Vec<Connection>,
    layers: Vec<PreviewLayerHandle>,
    rejections: HashSet<Rejection>,
    lifecycle: Option<HotplugSender>,
}

/// A [`SharedCaptureSession`] held in memory.
#[derive(Default)]
pub struct VirtualCaptureSession {
    state: Mutex<GraphState>,
    monitored_audio: AtomicU64,
}

impl VirtualCaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `SessionStarted`/`SessionStopped` on `sender` whenever the
    /// running state changes.
    pub fn set_lifecycle_sender(&self, sender: HotplugSender) {
        self.state.lock().lifecycle = Some(sender);
    }

    pub fn reject(&self, rejection: Rejection) {
        self.state.lock().rejections.insert(rejection);
    }

    pub fn accept(&self, rejection: Rejection) {
        self.state.lock().rejections.remove(&rejection);
    }

    pub fn preset(&self) -> Option<SessionPreset> {
        self.state.lock().preset
    }

    pub fn summary(&self) -> GraphSummary {
        let state = self.state.lock();
        GraphSummary {
            inputs: state.inputs.len(),
            outputs: state.outputs.len(),
            connections: state.connections.len(),
            preview_layers: state.layers.len(),
            running: state.running,
            configuration_depth: state.depth,
            commits: state.commits,
        }
    }

    pub fn has_input(&self, unique_id: &str) -> bool {
        self.state
            .lock()
            .inputs
            .iter()
            .any(|i| i.device_unique_id == unique_id)
    }

    pub fn has_output_kind(&self, kind: fn(&OutputKind) -> bool) -> bool {
        self.state.lock().outputs.iter().any(|o| kind(&o.kind()))
    }

    /// Audio buffers that reached an audible preview tap.
    pub fn monitored_audio_buffers(&self) -> u64 {
        self.monitored_audio.load(Ordering::Relaxed)
    }

    /// Route `buffer` from `unique_id`'s port for the buffer's media type to
    /// every connected tap. Video falls back to the muxed port. Returns the
    /// number of taps that took the buffer.
    pub fn push_sample(&self, unique_id: &str, buffer: SampleBuffer) -> usize {
        let targets: Vec<(OutputTap, ConnectionId)> = {
            let state = self.state.lock();
            if !state.running {
                return 0;
            }
            let Some(input) = state.inputs.iter().find(|i| i.device_unique_id == unique_id) else {
                return 0;
            };
            let port = match buffer.media_type {
                MediaType::Audio => input.port(MediaType::Audio),
                MediaType::Video | MediaType::Muxed => input
                    .port(MediaType::Video)
                    .or_else(|| input.port(MediaType::Muxed)),
            };
            let Some(port) = port else {
                return 0;
            };
            state
                .connections
                .iter()
                .filter(|c| c.input_port == port.id)
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
            .filter(|(tap, connection)| match tap.kind() {
                OutputKind::AudioPreview => {
                    let audible = tap.volume() > 0.0;
                    if audible {
                        self.monitored_audio.fetch_add(1, Ordering::Relaxed);
                    }
                    audible
                }
                _ => tap.deliver(buffer.clone(), *connection),
            })
            .count()
    }

    fn set_running(&self, running: bool) {
        let sender = {
            let mut state = self.state.lock();
            if state.running == running {
                return;
            }
            state.running = running;
            state.lifecycle.clone()
        };
        log::info!(
            "Virtual capture session {}",
            if running { "started" } else { "stopped" }
        );
        if let Some(sender) = sender {
            let event = if running {
                HotplugEvent::SessionStarted
            } else {
                HotplugEvent::SessionStopped
            };
            if !sender.send(event) {
                log::debug!("Lifecycle listener gone");
            }
        }
    }
}

impl SharedCaptureSession for VirtualCaptureSession {
    fn set_session_preset(&self, preset: SessionPreset) {
        self.state.lock().preset = Some(preset);
    }

    fn start_running(&self) {
        self.set_running(true);
    }

    fn stop_running(&self) {
        self.set_running(false);
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn begin_configuration(&self) {
        self.state.lock().depth += 1;
    }

    fn commit_configuration(&self) {
        let mut state = self.state.lock();
        if state.depth == 0 {
            log::warn!("Commit without a matching begin");
            return;
        }
        state.depth -= 1;
        state.commits += 1;
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        let state = self.state.lock();
        !state.rejections.contains(&Rejection::Inputs)
            && !state
                .inputs
                .iter()
                .any(|i| i.id == input.id || i.device_unique_id == input.device_unique_id)
    }

    fn add_input_with_no_connections(&self, input: &DeviceInput) {
        self.state.lock().inputs.push(input.clone());
    }

    fn remove_input(&self, input: InputId) {
        self.state.lock().inputs.retain(|i| i.id != input);
    }

    fn can_add_output(&self, output: &OutputTap) -> bool {
        let state = self.state.lock();
        let rejected = match output.kind() {
            OutputKind::VideoData(_) => state.rejections.contains(&Rejection::VideoOutputs),
            OutputKind::AudioPreview => state.rejections.contains(&Rejection::AudioPreviewOutputs),
            OutputKind::AudioData => false,
        };
        !rejected && !state.outputs.contains(output)
    }

    fn add_output_with_no_connections(&self, output: &OutputTap) {
        self.state.lock().outputs.push(output.clone());
    }

    fn remove_output(&self, output: OutputId) {
        let mut state = self.state.lock();
        state.outputs.retain(|o| o.id() != output);
        // Connections die with their target.
        state
            .connections
            .retain(|c| c.target != ConnectionTarget::Output(output));
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
            ConnectionTarget::PreviewLayer(handle) => {
                !state.rejections.contains(&Rejection::PreviewConnections)
                    && state.layers.contains(&handle)
            }
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
