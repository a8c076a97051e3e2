use std::sync::Arc;
use std::time::Duration;

use super::format::{Dimensions, PixelFormat};
use super::graph::{MediaType, Rect};

/// Per-frame metadata attached by screen streams.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenAttachments {
    pub content_rect: Rect,
    pub content_scale: f64,
    pub scale_factor: f64,
}

/// One media sample delivered by a tap or a screen stream.
///
/// Cheap to clone: the payload is shared, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub media_type: MediaType,
    pub sequence: u64,
    pub presentation_time: Duration,
    pub dimensions: Option<Dimensions>,
    pub pixel_format: Option<PixelFormat>,
    pub attachments: Option<ScreenAttachments>,
    pub data: Arc<[u8]>,
    valid: bool,
}

impl SampleBuffer {
    pub fn video(width: u32, height: u32, sequence: u64) -> Self {
        Self {
            media_type: MediaType::Video,
            sequence,
            presentation_time: Duration::ZERO,
            dimensions: Some(Dimensions::new(width, height)),
            pixel_format: Some(PixelFormat::Bgra32),
            attachments: None,
            data: Arc::from(Vec::new()),
            valid: true,
        }
    }

    pub fn audio(sequence: u64) -> Self {
        Self {
            media_type: MediaType::Audio,
            sequence,
            presentation_time: Duration::ZERO,
            dimensions: None,
            pixel_format: None,
            attachments: None,
            data: Arc::from(Vec::new()),
            valid: true,
        }
    }

    pub fn with_data(mut self, data: impl Into<Arc<[u8]>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn with_presentation_time(mut self, presentation_time: Duration) -> Self {
        self.presentation_time = presentation_time;
        self
    }

    pub fn with_attachments(mut self, attachments: ScreenAttachments) -> Self {
        self.attachments = Some(attachments);
        self
    }

    /// Marks the buffer as corrupt; consumers drop invalid buffers.
    pub fn invalidated(mut self) -> Self {
        self.valid = false;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Pixel storage behind a captured frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSurface {
    pub dimensions: Dimensions,
    pub pixel_format: PixelFormat,
    pub data: Arc<[u8]>,
}

/// Immutable view of one decoded frame plus its content rectangle and scale.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub surface: Option<FrameSurface>,
    pub content_rect: Rect,
    pub content_scale: f64,
    pub scale_factor: f64,
}

impl CapturedFrame {
    pub fn invalid() -> Self {
        Self {
            surface: None,
            content_rect: Rect::ZERO,
            content_scale: 0.0,
            scale_factor: 0.0,
        }
    }

    /// Frame view of a video sample. Samples without pixel data or dimensions
    /// give [`CapturedFrame::invalid`].
    pub fn from_sample(buffer: &SampleBuffer) -> Self {
        let (Some(dimensions), true) = (buffer.dimensions, buffer.is_valid()) else {
            return Self::invalid();
        };
        let attachments = buffer.attachments.unwrap_or(ScreenAttachments {
            content_rect: Rect::from_size(dimensions.width as f64, dimensions.height as f64),
            content_scale: 1.0,
            scale_factor: 1.0,
        });
        Self {
            surface: Some(FrameSurface {
                dimensions,
                pixel_format: buffer.pixel_format.unwrap_or_default(),
                data: Arc::clone(&buffer.data),
            }),
            content_rect: attachments.content_rect,
            content_scale: attachments.content_scale,
            scale_factor: attachments.scale_factor,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.surface.is_some()
    }

    pub fn size(&self) -> (f64, f64) {
        (self.content_rect.width, self.content_rect.height)
    }
}
