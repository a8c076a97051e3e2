//! In-memory screen capture backend.
//!
//! Each stream renders frames of the configured size on its own thread at
//! the configured minimum frame interval. Failures can be injected at stream
//! creation, at start, or while streaming (the display going away).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use device_capture_core::models::graph::Rect;
use device_capture_core::models::sample_buffer::ScreenAttachments;
use device_capture_core::models::screen::ShareableApplication;
use device_capture_core::{
    CaptureError, ContentFilter, Display, DisplayId, SampleBuffer, ScreenCaptureBackend,
    ScreenStream, ScreenStreamOutput, ShareableContent, StreamConfiguration, StreamOutputType,
};

/// Control block shared between the backend and one stream's thread.
#[derive(Default)]
struct StreamControl {
    running: AtomicBool,
    interrupt: Mutex<Option<CaptureError>>,
    frames: AtomicU64,
}

#[derive(Default)]
struct BackendState {
    content: ShareableContent,
    fail_create: Option<CaptureError>,
    fail_start: Option<CaptureError>,
    filters: Vec<ContentFilter>,
    streams: Vec<Arc<StreamControl>>,
}

/// A [`ScreenCaptureBackend`] serving synthetic displays.
#[derive(Default)]
pub struct VirtualScreenBackend {
    state: Mutex<BackendState>,
}

impl VirtualScreenBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with one display of `width`x`height`.
    pub fn with_display(width: u32, height: u32) -> Self {
        let backend = Self::default();
        backend.add_display(DisplayId(1), width, height);
        backend
    }

    pub fn add_display(&self, id: DisplayId, width: u32, height: u32) {
        self.state
            .lock()
            .content
            .displays
            .push(Display { id, width, height });
    }

    pub fn remove_display(&self, id: DisplayId) {
        self.state.lock().content.displays.retain(|d| d.id != id);
    }

    pub fn add_application(&self, bundle_identifier: &str, application_name: &str, process_id: i32) {
        self.state
            .lock()
            .content
            .applications
            .push(ShareableApplication {
                bundle_identifier: bundle_identifier.into(),
                application_name: application_name.into(),
                process_id,
            });
    }

    /// Make the next stream creation fail with `error`.
    pub fn fail_next_create(&self, error: CaptureError) {
        self.state.lock().fail_create = Some(error);
    }

    /// Make the next `start_capture` fail with `error`.
    pub fn fail_next_start(&self, error: CaptureError) {
        self.state.lock().fail_start = Some(error);
    }

    /// Stop every live stream with `error`, as if the display went away.
    pub fn interrupt_streams(&self, error: CaptureError) {
        for control in &self.state.lock().streams {
            if control.running.load(Ordering::SeqCst) {
                *control.interrupt.lock() = Some(error.clone());
            }
        }
    }

    /// Filters of every stream created so far, oldest first.
    pub fn filters(&self) -> Vec<ContentFilter> {
        self.state.lock().filters.clone()
    }

    /// Streams currently rendering.
    pub fn live_streams(&self) -> usize {
        self.state
            .lock()
            .streams
            .iter()
            .filter(|c| c.running.load(Ordering::SeqCst))
            .count()
    }

    /// Frames rendered across every stream, including ones the session has
    /// since discarded.
    pub fn frames_rendered(&self) -> u64 {
        self.state
            .lock()
            .streams
            .iter()
            .map(|c| c.frames.load(Ordering::Relaxed))
            .sum()
    }
}

impl ScreenCaptureBackend for VirtualScreenBackend {
    fn shareable_content(&self) -> Result<ShareableContent, CaptureError> {
        Ok(self.state.lock().content.clone())
    }

    fn create_stream(
        &self,
        filter: &ContentFilter,
        configuration: &StreamConfiguration,
        output: ScreenStreamOutput,
    ) -> Result<Box<dyn ScreenStream>, CaptureError> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_create.take() {
            return Err(error);
        }
        state.filters.push(filter.clone());

        let control = Arc::new(StreamControl::default());
        state.streams.push(Arc::clone(&control));
        log::debug!(
            "Created stream {} for display {:?}",
            output.stream_id(),
            filter.display.id
        );
        Ok(Box::new(VirtualScreenStream {
            configuration: *configuration,
            output,
            control,
            fail_start: state.fail_start.take(),
            handle: None,
        }))
    }
}

/// One synthetic screen stream.
pub struct VirtualScreenStream {
    configuration: StreamConfiguration,
    output: ScreenStreamOutput,
    control: Arc<StreamControl>,
    fail_start: Option<CaptureError>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ScreenStream for VirtualScreenStream {
    fn start_capture(&mut self) -> Result<(), CaptureError> {
        if let Some(error) = self.fail_start.take() {
            return Err(error);
        }
        if self.control.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::StreamFailed("stream already capturing".into()));
        }

        let control = Arc::clone(&self.control);
        let output = self.output.clone();
        let configuration = self.configuration;

        let handle = thread::Builder::new()
            .name("virtual-screen-stream".into())
            .spawn(move || render_loop(control, output, configuration))
            .map_err(|e| {
                self.control.running.store(false, Ordering::SeqCst);
                CaptureError::Unknown(format!("failed to spawn screen stream thread: {}", e))
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn stop_capture(&mut self) -> Result<(), CaptureError> {
        self.control.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| CaptureError::StreamFailed("screen stream thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for VirtualScreenStream {
    fn drop(&mut self) {
        let _ = self.stop_capture();
    }
}

fn render_loop(control: Arc<StreamControl>, output: ScreenStreamOutput, configuration: StreamConfiguration) {
    let interval = Duration::from_secs_f64(configuration.minimum_frame_interval.as_secs_f64());
    let attachments = ScreenAttachments {
        content_rect: Rect::from_size(configuration.width as f64, configuration.height as f64),
        content_scale: 1.0,
        scale_factor: 1.0,
    };
    let mut sequence = 0u64;

    while control.running.load(Ordering::SeqCst) {
        if let Some(error) = control.interrupt.lock().take() {
            control.running.store(false, Ordering::SeqCst);
            output.did_stop_with_error(error);
            break;
        }

        let frame = SampleBuffer::video(configuration.width, configuration.height, sequence)
            .with_presentation_time(interval * sequence as u32)
            .with_attachments(attachments);
        output.did_output_sample_buffer(frame, StreamOutputType::Screen);
        if configuration.captures_audio {
            output.did_output_sample_buffer(SampleBuffer::audio(sequence), StreamOutputType::Audio);
        }
        control.frames.fetch_add(1, Ordering::Relaxed);
        sequence += 1;
        thread::sleep(interval);
    }
    log::debug!("Screen stream {} rendered {} frames", output.stream_id(), sequence);
}
