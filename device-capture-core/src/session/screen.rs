use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::models::config::ScreenCaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::sample_buffer::SampleBuffer;
use crate::models::screen::{
    ContentFilter, Display, DisplayId, ShareableApplication, StreamConfiguration, StreamOutputType,
};
use crate::models::state::ScreenCaptureState;
use crate::processing::serial_queue::{QueueHandle, SerialQueue};
use crate::traits::screen_capture::{ScreenCaptureBackend, ScreenEvents, ScreenStream};

/// Label of the queue screen samples and stream errors are handled on.
pub const SCREEN_QUEUE_LABEL: &str = "screen-sample-buffer";

/// Identifies one stream created by [`ScreenCaptureSession::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(Uuid);

impl StreamId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct StreamSlot {
    state: ScreenCaptureState,
    stream_id: Option<StreamId>,
    stream: Option<Box<dyn ScreenStream>>,
}

struct ScreenShared {
    slot: Mutex<StreamSlot>,
    delegate: RwLock<Option<Arc<dyn ScreenEvents>>>,
    frames: AtomicU64,
}

impl ScreenShared {
    fn is_current(&self, stream_id: StreamId) -> bool {
        self.slot.lock().stream_id == Some(stream_id)
    }

    fn handle_sample(&self, stream_id: StreamId, buffer: SampleBuffer, kind: StreamOutputType) {
        if !self.is_current(stream_id) {
            log::trace!("Ignoring sample from stale stream {}", stream_id);
            return;
        }
        if !buffer.is_valid() {
            log::trace!("Dropping invalid screen sample {}", buffer.sequence);
            return;
        }
        match kind {
            StreamOutputType::Screen => {
                self.frames.fetch_add(1, Ordering::Relaxed);
                let delegate = self.delegate.read().clone();
                if let Some(delegate) = delegate {
                    delegate.on_screen_frame(&buffer);
                }
            }
            StreamOutputType::Audio => {
                log::trace!("Dropping screen audio sample {}", buffer.sequence);
            }
        }
    }

    fn handle_error(&self, stream_id: StreamId, error: CaptureError) {
        let stream = {
            let mut slot = self.slot.lock();
            if slot.stream_id != Some(stream_id) {
                log::debug!("Ignoring error from stale stream {}: {}", stream_id, error);
                return;
            }
            slot.stream_id = None;
            slot.state = ScreenCaptureState::StoppedWithError(error.clone());
            slot.stream.take()
        };
        drop(stream);

        log::error!("Screen stream stopped with error: {}", error);
        let delegate = self.delegate.read().clone();
        if let Some(delegate) = delegate {
            delegate.on_stream_stopped(&error);
        }
    }
}

/// Callback side of one screen stream, handed to the backend.
///
/// Both callbacks return immediately; the work runs on the screen queue.
/// Callbacks from a stream that is no longer current are ignored.
#[derive(Clone)]
pub struct ScreenStreamOutput {
    stream_id: StreamId,
    shared: Arc<ScreenShared>,
    queue: QueueHandle,
}

impl ScreenStreamOutput {
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn did_output_sample_buffer(&self, buffer: SampleBuffer, kind: StreamOutputType) {
        let shared = Arc::clone(&self.shared);
        let stream_id = self.stream_id;
        self.queue
            .dispatch(move || shared.handle_sample(stream_id, buffer, kind));
    }

    pub fn did_stop_with_error(&self, error: CaptureError) {
        let shared = Arc::clone(&self.shared);
        let stream_id = self.stream_id;
        self.queue
            .dispatch(move || shared.handle_error(stream_id, error));
    }
}

/// Captures one display through a [`ScreenCaptureBackend`].
///
/// ```text
/// idle → enumerating → configured → streaming → stopped
///             ↓             ↓            ↓
///             └─────────────┴──→ stopped with error
/// ```
///
/// A stream that fails stays stopped; call [`ScreenCaptureSession::start`]
/// again to restart it.
pub struct ScreenCaptureSession {
    backend: Arc<dyn ScreenCaptureBackend>,
    config: ScreenCaptureConfiguration,
    shared: Arc<ScreenShared>,
    queue: SerialQueue,
    available_displays: Mutex<Vec<Display>>,
    selected_display: Mutex<Option<DisplayId>>,
}

impl ScreenCaptureSession {
    pub fn new(
        backend: Arc<dyn ScreenCaptureBackend>,
        config: ScreenCaptureConfiguration,
    ) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        let queue = SerialQueue::new(SCREEN_QUEUE_LABEL)?;
        let selected_display = config.display_id;

        Ok(Self {
            backend,
            config,
            shared: Arc::new(ScreenShared {
                slot: Mutex::new(StreamSlot {
                    state: ScreenCaptureState::Idle,
                    stream_id: None,
                    stream: None,
                }),
                delegate: RwLock::new(None),
                frames: AtomicU64::new(0),
            }),
            queue,
            available_displays: Mutex::new(Vec::new()),
            selected_display: Mutex::new(selected_display),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn ScreenEvents>) {
        *self.shared.delegate.write() = Some(delegate);
    }

    pub fn state(&self) -> ScreenCaptureState {
        self.shared.slot.lock().state.clone()
    }

    pub fn configuration(&self) -> &ScreenCaptureConfiguration {
        &self.config
    }

    /// Displays seen by the last enumeration.
    pub fn available_displays(&self) -> Vec<Display> {
        self.available_displays.lock().clone()
    }

    /// Re-enumerate shareable displays without starting a stream.
    pub fn refresh_displays(&self) -> Result<Vec<Display>, CaptureError> {
        let content = self.backend.shareable_content()?;
        *self.available_displays.lock() = content.displays.clone();
        Ok(content.displays)
    }

    /// Display used by the next [`ScreenCaptureSession::start`].
    pub fn select_display(&self, display: DisplayId) {
        *self.selected_display.lock() = Some(display);
    }

    pub fn selected_display(&self) -> Option<DisplayId> {
        *self.selected_display.lock()
    }

    /// Screen frames forwarded to the delegate so far.
    pub fn frames_delivered(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    fn fail(&self, error: CaptureError) -> CaptureError {
        let mut slot = self.shared.slot.lock();
        slot.stream_id = None;
        slot.state = ScreenCaptureState::StoppedWithError(error.clone());
        error
    }

    fn choose_display(&self, displays: &[Display]) -> Option<Display> {
        if let Some(wanted) = self.selected_display() {
            match displays.iter().find(|d| d.id == wanted) {
                Some(display) => return Some(display.clone()),
                None => log::warn!(
                    "Display {:?} is not shareable, using the first display",
                    wanted
                ),
            }
        }
        displays.first().cloned()
    }

    fn excluded_applications(&self, applications: &[ShareableApplication]) -> Vec<ShareableApplication> {
        let Some(own) = self.config.excluded_bundle_identifier.as_deref() else {
            return Vec::new();
        };
        let excluded: Vec<_> = applications
            .iter()
            .filter(|app| app.bundle_identifier == own)
            .cloned()
            .collect();
        if excluded.is_empty() {
            log::warn!("{} is not among shareable applications", own);
        }
        excluded
    }

    /// Enumerate content, pick a display and start streaming it.
    ///
    /// Fails with [`CaptureError::NoShareableDisplay`] when nothing can be
    /// captured. Any failure leaves the session in
    /// [`ScreenCaptureState::StoppedWithError`].
    pub fn start(&self) -> Result<(), CaptureError> {
        let stream_id = StreamId::new();
        {
            let mut slot = self.shared.slot.lock();
            if !slot.state.can_start() {
                return Err(CaptureError::ConfigurationFailed(format!(
                    "cannot start screen capture from {:?}",
                    slot.state
                )));
            }
            slot.state = ScreenCaptureState::Enumerating;
            slot.stream_id = Some(stream_id);
        }

        let content = self.backend.shareable_content().map_err(|e| self.fail(e))?;
        *self.available_displays.lock() = content.displays.clone();

        let Some(display) = self.choose_display(&content.displays) else {
            log::error!("No shareable display available");
            return Err(self.fail(CaptureError::NoShareableDisplay));
        };

        let filter = ContentFilter {
            excluded_applications: self.excluded_applications(&content.applications),
            display,
        };
        let configuration = StreamConfiguration::from(&self.config);

        {
            let mut slot = self.shared.slot.lock();
            if slot.stream_id != Some(stream_id) {
                log::info!("Screen capture stopped while enumerating");
                return Err(CaptureError::StreamFailed("stream stopped during start".into()));
            }
            slot.state = ScreenCaptureState::Configured;
        }

        let output = ScreenStreamOutput {
            stream_id,
            shared: Arc::clone(&self.shared),
            queue: self.queue.handle(),
        };
        let mut stream = self
            .backend
            .create_stream(&filter, &configuration, output)
            .map_err(|e| self.fail(e))?;
        stream.start_capture().map_err(|e| self.fail(e))?;

        let mut slot = self.shared.slot.lock();
        if slot.stream_id != Some(stream_id) {
            // Stopped, or failed, before start returned.
            let error = match &slot.state {
                ScreenCaptureState::StoppedWithError(e) => e.clone(),
                _ => CaptureError::StreamFailed("stream stopped during start".into()),
            };
            drop(slot);
            if let Err(e) = stream.stop_capture() {
                log::error!("Failed to stop screen stream: {}", e);
            }
            return Err(error);
        }
        slot.stream = Some(stream);
        slot.state = ScreenCaptureState::Streaming;
        log::info!(
            "Screen capture started on display {:?} at {}x{}",
            filter.display.id,
            configuration.width,
            configuration.height
        );
        Ok(())
    }

    /// Stop the current stream. Samples already queued are discarded.
    ///
    /// Also cancels a [`ScreenCaptureSession::start`] still in progress; that
    /// call then returns an error and the session can be started again.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let stream = {
            let mut slot = self.shared.slot.lock();
            slot.stream_id = None;
            if !slot.state.can_start() {
                slot.state = ScreenCaptureState::Stopped;
            }
            slot.stream.take()
        };
        let Some(mut stream) = stream else {
            return Ok(());
        };
        let result = stream.stop_capture();
        if let Err(e) = &result {
            log::error!("Failed to stop screen stream: {}", e);
        }
        log::info!("Screen capture stopped");
        result
    }

    /// Wait until queued samples and errors have been handled.
    pub fn flush(&self) {
        self.queue.sync(|| ());
    }
}

impl Drop for ScreenCaptureSession {
    fn drop(&mut self) {
        if self.state().is_streaming() {
            let _ = self.stop();
        }
    }
}
