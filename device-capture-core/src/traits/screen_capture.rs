use crate::models::error::CaptureError;
use crate::models::sample_buffer::SampleBuffer;
use crate::models::screen::{ContentFilter, ShareableContent, StreamConfiguration};
use crate::session::screen::ScreenStreamOutput;

/// Event delegate for screen capture.
///
/// Called from the screen session's sample queue, never concurrently.
pub trait ScreenEvents: Send + Sync {
    /// A valid screen frame.
    fn on_screen_frame(&self, buffer: &SampleBuffer);

    /// The stream stopped on its own. The session must be restarted by the
    /// caller.
    fn on_stream_stopped(&self, error: &CaptureError);
}

/// A live screen stream created by a [`ScreenCaptureBackend`].
pub trait ScreenStream: Send {
    fn start_capture(&mut self) -> Result<(), CaptureError>;

    fn stop_capture(&mut self) -> Result<(), CaptureError>;
}

/// Platform screen capture: shareable content enumeration and stream
/// creation.
pub trait ScreenCaptureBackend: Send + Sync {
    /// Displays and applications that can currently be captured.
    fn shareable_content(&self) -> Result<ShareableContent, CaptureError>;

    /// Create a stream for `filter`. The backend reports samples and
    /// asynchronous failures through `output`.
    fn create_stream(
        &self,
        filter: &ContentFilter,
        configuration: &StreamConfiguration,
        output: ScreenStreamOutput,
    ) -> Result<Box<dyn ScreenStream>, CaptureError>;
}
