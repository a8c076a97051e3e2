use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::models::config::OrchestratorConfiguration;
use crate::models::diagnostics::{ActiveDevice, CaptureDiagnostics, DeviceDiagnostics};
use crate::models::error::CaptureError;
use crate::models::graph::{MediaType, SessionId};
use crate::models::source::SourceKind;
use crate::processing::serial_queue::{QueueHandle, SerialQueue};
use crate::session::device::{
    CaptureDeviceSession, DeviceSessionOptions, DeviceSignal, DeviceSignalSink,
};
use crate::traits::capture_device::CaptureDevice;
use crate::traits::device_discovery::{DeviceDiscovery, DiscoveryQuery};
use crate::traits::device_events::DeviceEvents;
use crate::traits::shared_session::SharedCaptureSession;

/// Label of the queue serializing shared-session configuration.
pub const CONFIGURATION_QUEUE_LABEL: &str = "capture-session-config";

struct Route {
    kind: SourceKind,
    unique_id: String,
    frames: AtomicU64,
}

/// Resolves posting sessions to their role and forwards to the delegate.
#[derive(Default)]
struct SignalRouter {
    routes: RwLock<HashMap<SessionId, Route>>,
    delegate: RwLock<Option<Arc<dyn DeviceEvents>>>,
}

impl SignalRouter {
    fn register(&self, session: SessionId, kind: SourceKind, unique_id: &str) {
        self.routes.write().insert(
            session,
            Route {
                kind,
                unique_id: unique_id.to_string(),
                frames: AtomicU64::new(0),
            },
        );
    }

    fn unregister(&self, session: SessionId) {
        if let Some(route) = self.routes.write().remove(&session) {
            log::debug!(
                "Unrouted {} after {} frames",
                route.unique_id,
                route.frames.load(Ordering::Relaxed)
            );
        }
    }

    fn delegate(&self) -> Option<Arc<dyn DeviceEvents>> {
        self.delegate.read().clone()
    }

    fn frames_delivered(&self, session: SessionId) -> u64 {
        self.routes
            .read()
            .get(&session)
            .map(|route| route.frames.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl DeviceSignalSink for SignalRouter {
    fn post(&self, session: SessionId, signal: DeviceSignal) {
        let kind = {
            let routes = self.routes.read();
            let Some(route) = routes.get(&session) else {
                log::trace!("Dropping signal from unrouted session {}", session);
                return;
            };
            if matches!(signal, DeviceSignal::VideoSample(_)) {
                route.frames.fetch_add(1, Ordering::Relaxed);
            }
            route.kind
        };

        let Some(delegate) = self.delegate() else {
            return;
        };
        match signal {
            DeviceSignal::VideoSample(buffer) if kind.is_primary() => {
                delegate.on_device_frame(&buffer)
            }
            DeviceSignal::VideoSample(buffer) => delegate.on_capture_frame(&buffer),
            DeviceSignal::PreviewLayerReady(layer) => delegate.on_preview_layer_ready(&layer, kind),
            DeviceSignal::FamilyDetected(family) => delegate.on_device_family_detected(family),
        }
    }
}

struct ActiveSession {
    kind: SourceKind,
    attached_at: DateTime<Utc>,
    session: CaptureDeviceSession,
}

#[derive(Default)]
struct OrchestratorState {
    sessions: Vec<ActiveSession>,
    primary: Option<SessionId>,
    secondary: Option<SessionId>,
    audio_passthrough: bool,
    attach_count: u64,
    detach_count: u64,
    skipped_attach_steps: u64,
}

impl OrchestratorState {
    fn slot(&self, kind: SourceKind) -> Option<SessionId> {
        match kind {
            SourceKind::Primary => self.primary,
            SourceKind::Secondary => self.secondary,
        }
    }

    fn set_slot(&mut self, kind: SourceKind, session: Option<SessionId>) {
        match kind {
            SourceKind::Primary => self.primary = session,
            SourceKind::Secondary => self.secondary = session,
        }
    }

    fn find(&self, kind: SourceKind) -> Option<&ActiveSession> {
        let id = self.slot(kind)?;
        self.sessions.iter().find(|active| active.session.id() == id)
    }

    /// Take the slotted session for `unique_id` out of the active list.
    fn take_slotted(&mut self, unique_id: &str) -> Option<ActiveSession> {
        let index = self.sessions.iter().position(|active| {
            active.session.unique_id() == unique_id
                && self.slot(active.kind) == Some(active.session.id())
        })?;
        let active = self.sessions.remove(index);
        self.set_slot(active.kind, None);
        Some(active)
    }
}

fn passthrough_volume(enabled: bool) -> f32 {
    if enabled {
        1.0
    } else {
        0.0
    }
}

struct OrchestratorCore {
    graph: Arc<dyn SharedCaptureSession>,
    discovery: Arc<dyn DeviceDiscovery>,
    config: OrchestratorConfiguration,
    state: Mutex<OrchestratorState>,
    router: Arc<SignalRouter>,
}

impl OrchestratorCore {
    fn delegate(&self) -> Option<Arc<dyn DeviceEvents>> {
        self.router.delegate()
    }

    fn options(&self) -> DeviceSessionOptions {
        DeviceSessionOptions {
            video_spec: self.config.video_spec,
            pixel_format: self.config.video_pixel_format,
            audio_routing: self.config.audio_routing,
        }
    }

    fn start(&self) {
        self.discovery
            .allow_screen_capture_devices(self.config.allow_screen_capture_devices);
        self.graph.set_session_preset(self.config.session_preset);
        self.graph.start_running();
        log::info!("Shared capture session running");
    }

    fn device_found(&self, device: Arc<dyn CaptureDevice>) {
        log::debug!(
            "Found {} (model {}, manufacturer {})",
            device.unique_id(),
            device.model_id(),
            device.manufacturer()
        );
        let Some(kind) = SourceKind::classify(
            device.model_id(),
            device.manufacturer(),
            &self.config.primary_model_id,
            &self.config.host_vendor,
        ) else {
            log::debug!("Ignoring host camera {}", device.unique_id());
            return;
        };

        {
            let state = self.state.lock();
            if state.slot(kind).is_some() {
                log::debug!("{:?} slot occupied, ignoring {}", kind, device.unique_id());
                return;
            }
            if state
                .sessions
                .iter()
                .any(|active| active.session.unique_id() == device.unique_id())
            {
                log::debug!("{} already active", device.unique_id());
                return;
            }
        }

        let sink: Arc<dyn DeviceSignalSink> = Arc::clone(&self.router) as Arc<dyn DeviceSignalSink>;
        let mut session = match CaptureDeviceSession::new(device, sink, self.options()) {
            Ok(session) => session,
            Err(e) => {
                log::error!("Unable to create session: {}", e);
                return;
            }
        };
        self.router.register(session.id(), kind, session.unique_id());

        session.initialize();
        if session.input().is_none() {
            log::warn!("No input for {}, not attaching", session.unique_id());
            self.router.unregister(session.id());
            session.teardown();
            return;
        }
        session.configure_outputs();
        session.build_connections();
        let Some(skipped) = self.attach(&mut session) else {
            self.router.unregister(session.id());
            session.teardown();
            self.state.lock().skipped_attach_steps += 1;
            return;
        };

        session.send_preview_layer();

        {
            let mut state = self.state.lock();
            if kind.is_primary() {
                session.set_audio_preview_volume(passthrough_volume(state.audio_passthrough));
            }
            state.set_slot(kind, Some(session.id()));
            state.attach_count += 1;
            state.skipped_attach_steps += skipped;
            log::info!("Attached {} as {:?}", session.unique_id(), kind);
            state.sessions.push(ActiveSession {
                kind,
                attached_at: Utc::now(),
                session,
            });
        }

        if kind.is_primary() {
            if let Some(delegate) = self.delegate() {
                delegate.on_primary_active_changed(true);
            }
        }
    }

    /// Add the session's graph objects inside one configuration bracket.
    /// Failed connection and audio checks skip their step; nothing already
    /// added is rolled back. Returns the number of skipped steps, or `None`
    /// when the input/output check failed and the device was not attached.
    fn attach(&self, session: &mut CaptureDeviceSession) -> Option<u64> {
        let graph = self.graph.as_ref();
        let mut skipped = 0;

        graph.begin_configuration();

        let input = session.input().cloned();
        let video_output = session.video_output().cloned();
        match (input, video_output) {
            (Some(input), Some(video_output))
                if graph.can_add_input(&input) && graph.can_add_output(&video_output) =>
            {
                graph.add_input_with_no_connections(&input);
                graph.add_output_with_no_connections(&video_output);

                if let Some(connection) = session.video_connection().copied() {
                    if graph.can_add_connection(&connection) {
                        graph.add_connection(&connection);
                    } else {
                        log::warn!("Can't add video connection for {}", session.unique_id());
                        skipped += 1;
                    }
                }

                if let Some(preview) = session.attach_preview(graph) {
                    if graph.can_add_connection(&preview) {
                        graph.add_connection(&preview);
                    } else {
                        log::warn!("Can't add preview connection for {}", session.unique_id());
                        skipped += 1;
                    }
                }
            }
            _ => {
                log::warn!(
                    "Input/output check failed for {}, attach aborted",
                    session.unique_id()
                );
                graph.commit_configuration();
                return None;
            }
        }

        let preview_tap = session.audio_preview_output().cloned();
        let audio_output = match preview_tap {
            Some(tap) if graph.can_add_output(&tap) => Some(tap),
            Some(_) => {
                log::warn!(
                    "Can't add audio preview for {}, using audio data output",
                    session.unique_id()
                );
                session.fallback_audio_to_data_output();
                session
                    .audio_output()
                    .filter(|tap| graph.can_add_output(tap))
                    .cloned()
            }
            None => session
                .audio_output()
                .filter(|tap| graph.can_add_output(tap))
                .cloned(),
        };
        if let Some(tap) = audio_output {
            graph.add_output_with_no_connections(&tap);
            if let Some(connection) = session.audio_connection().copied() {
                if graph.can_add_connection(&connection) {
                    graph.add_connection(&connection);
                } else {
                    log::warn!("Can't add audio connection for {}", session.unique_id());
                    skipped += 1;
                }
            }
        }

        graph.commit_configuration();
        session.mark_active();
        Some(skipped)
    }

    /// Remove the session's graph objects inside one configuration bracket.
    fn detach(&self, session: &CaptureDeviceSession) {
        let graph = self.graph.as_ref();
        graph.begin_configuration();

        if let Some(connection) = session.audio_connection() {
            graph.remove_connection(connection.id);
        }
        if let Some(connection) = session.video_connection() {
            graph.remove_connection(connection.id);
        }
        if session.is_preview_active() {
            if let Some(connection) = session.preview_connection() {
                graph.remove_connection(connection.id);
            }
        }

        let owned: Vec<_> = [
            session.video_output(),
            session.audio_output(),
            session.audio_preview_output(),
        ]
        .into_iter()
        .flatten()
        .map(|tap| tap.id())
        .collect();
        for output in graph.outputs() {
            if owned.contains(&output) {
                graph.remove_output(output);
            }
        }

        if let Some(input) = session.input() {
            graph.remove_input(input.id);
        }
        graph.commit_configuration();
    }

    fn release(&self, mut active: ActiveSession) {
        self.detach(&active.session);
        active.session.teardown();
        self.router.unregister(active.session.id());
        self.state.lock().detach_count += 1;
        log::info!("Removed {}", active.session.unique_id());
    }

    fn device_lost(&self, unique_id: &str) {
        let Some(active) = self.state.lock().take_slotted(unique_id) else {
            log::warn!("Remove requested but no device found for {}", unique_id);
            return;
        };
        let kind = active.kind;
        self.release(active);

        if kind.is_primary() {
            if let Some(delegate) = self.delegate() {
                delegate.on_primary_lost();
                delegate.on_primary_active_changed(false);
            }
        }
    }

    fn stop(&self) {
        let sessions = {
            let mut state = self.state.lock();
            state.primary = None;
            state.secondary = None;
            std::mem::take(&mut state.sessions)
        };
        let had_primary = sessions.iter().any(|active| active.kind.is_primary());
        for active in sessions {
            self.release(active);
        }
        self.graph.stop_running();
        log::info!("Shared capture session stopped");

        if had_primary {
            if let Some(delegate) = self.delegate() {
                delegate.on_primary_active_changed(false);
            }
        }
    }

    /// Drain every device queue without holding the state lock; device jobs
    /// reach the delegate, which may call back into the orchestrator.
    fn flush_devices(&self) {
        let queues: Vec<QueueHandle> = self
            .state
            .lock()
            .sessions
            .iter()
            .filter_map(|active| active.session.queue_handle())
            .collect();
        for queue in queues {
            queue.sync(|| ());
        }
    }
}

/// Owns the shared capture session and the primary/secondary device slots.
///
/// Every attach, detach and slot decision runs on one serial configuration
/// queue, so requests are applied in the order they were made:
///
/// ```text
/// on_device_found ─┐                       ┌→ CaptureDeviceSession (primary)
/// on_device_lost  ─┼→ [capture-session-config] ┤
/// start / stop    ─┘                       └→ CaptureDeviceSession (secondary)
///
/// device queues → SignalRouter → DeviceEvents
/// ```
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct CaptureOrchestrator {
    core: Arc<OrchestratorCore>,
    queue: Arc<SerialQueue>,
}

impl CaptureOrchestrator {
    pub fn new(
        graph: Arc<dyn SharedCaptureSession>,
        discovery: Arc<dyn DeviceDiscovery>,
        config: OrchestratorConfiguration,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let queue = SerialQueue::new(CONFIGURATION_QUEUE_LABEL)?;

        let state = OrchestratorState {
            audio_passthrough: config.audio_passthrough,
            ..Default::default()
        };
        Ok(Self {
            core: Arc::new(OrchestratorCore {
                graph,
                discovery,
                config,
                state: Mutex::new(state),
                router: Arc::new(SignalRouter::default()),
            }),
            queue: Arc::new(queue),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn DeviceEvents>) {
        *self.core.router.delegate.write() = Some(delegate);
    }

    pub fn configuration(&self) -> &OrchestratorConfiguration {
        &self.core.config
    }

    fn enqueue(&self, job: impl FnOnce(&OrchestratorCore) + Send + 'static) {
        let core = Arc::clone(&self.core);
        if !self.queue.dispatch(move || job(&core)) {
            log::error!("Configuration queue stopped, request dropped");
        }
    }

    /// Apply the session preset and start the shared session.
    pub fn start(&self) {
        self.enqueue(OrchestratorCore::start);
    }

    /// Detach every device and stop the shared session.
    pub fn stop(&self) {
        self.enqueue(OrchestratorCore::stop);
    }

    /// Video-capable and muxed devices of every supported type, without
    /// duplicates.
    pub fn discover(&self) -> Vec<Arc<dyn CaptureDevice>> {
        let mut devices: Vec<Arc<dyn CaptureDevice>> = Vec::new();
        for media_type in [MediaType::Video, MediaType::Muxed] {
            let query = DiscoveryQuery::cameras(media_type);
            for device in self.core.discovery.devices(&query) {
                if !devices.iter().any(|d| d.unique_id() == device.unique_id()) {
                    devices.push(device);
                }
            }
        }
        devices
    }

    /// Offer every discovered device to [`CaptureOrchestrator::on_device_found`].
    pub fn refresh_devices(&self) {
        let devices = self.discover();
        log::debug!("Refreshing {} devices", devices.len());
        for device in devices {
            self.on_device_found(device);
        }
    }

    /// Classify `device` and attach it if its slot is free. Idempotent.
    pub fn on_device_found(&self, device: Arc<dyn CaptureDevice>) {
        self.enqueue(move |core| core.device_found(device));
    }

    /// Detach and tear down the device in the primary or secondary slot
    /// with this identity. The delegate is notified after removal.
    pub fn on_device_lost(&self, unique_id: &str) {
        let unique_id = unique_id.to_string();
        self.enqueue(move |core| core.device_lost(&unique_id));
    }

    /// Mute (`false`) or unmute (`true`) the primary device's audio preview.
    /// The audio connection stays in place.
    pub fn set_audio_passthrough(&self, enabled: bool) {
        let mut state = self.core.state.lock();
        state.audio_passthrough = enabled;
        if let Some(primary) = state.find(SourceKind::Primary) {
            primary
                .session
                .set_audio_preview_volume(passthrough_volume(enabled));
        }
    }

    pub fn audio_passthrough(&self) -> bool {
        self.core.state.lock().audio_passthrough
    }

    pub fn is_primary_active(&self) -> bool {
        self.core.state.lock().primary.is_some()
    }

    pub fn primary(&self) -> Option<ActiveDevice> {
        let state = self.core.state.lock();
        state
            .find(SourceKind::Primary)
            .map(|active| active.session.snapshot(active.kind))
    }

    pub fn secondary(&self) -> Option<ActiveDevice> {
        let state = self.core.state.lock();
        state
            .find(SourceKind::Secondary)
            .map(|active| active.session.snapshot(active.kind))
    }

    /// Snapshots of the active sessions, in attach order.
    pub fn active_devices(&self) -> Vec<ActiveDevice> {
        self.core
            .state
            .lock()
            .sessions
            .iter()
            .map(|active| active.session.snapshot(active.kind))
            .collect()
    }

    pub fn diagnostics(&self) -> CaptureDiagnostics {
        let state = self.core.state.lock();
        CaptureDiagnostics {
            attach_count: state.attach_count,
            detach_count: state.detach_count,
            skipped_attach_steps: state.skipped_attach_steps,
            devices: state
                .sessions
                .iter()
                .map(|active| DeviceDiagnostics {
                    unique_id: active.session.unique_id().to_string(),
                    kind: active.kind,
                    frames_delivered: self.core.router.frames_delivered(active.session.id()),
                    attached_at: Some(active.attached_at),
                })
                .collect(),
        }
    }

    /// Wait until every request made so far has been applied and the device
    /// queues have drained.
    pub fn flush(&self) {
        let core = Arc::clone(&self.core);
        self.queue.sync(move || core.flush_devices());
    }
}
