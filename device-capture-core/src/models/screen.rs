use serde::{Deserialize, Serialize};

use super::config::ScreenCaptureConfiguration;
use super::format::{FrameDuration, PixelFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisplayId(pub u32);

/// An on-screen display that can be captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    pub id: DisplayId,
    pub width: u32,
    pub height: u32,
}

/// A running application that can be excluded from screen capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareableApplication {
    pub bundle_identifier: String,
    pub application_name: String,
    pub process_id: i32,
}

/// Snapshot of everything currently shareable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShareableContent {
    pub displays: Vec<Display>,
    pub applications: Vec<ShareableApplication>,
}

/// What a screen stream captures: one display minus some applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub display: Display,
    pub excluded_applications: Vec<ShareableApplication>,
}

/// Parameters handed to the backend when a screen stream is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfiguration {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub minimum_frame_interval: FrameDuration,
    pub shows_cursor: bool,
    pub captures_audio: bool,
    pub sample_rate: u32,
    pub channel_count: u16,
}

impl From<&ScreenCaptureConfiguration> for StreamConfiguration {
    fn from(config: &ScreenCaptureConfiguration) -> Self {
        Self {
            width: config.width,
            height: config.height,
            pixel_format: config.pixel_format,
            minimum_frame_interval: FrameDuration::from_fps(config.max_frame_rate),
            shows_cursor: config.shows_cursor,
            captures_audio: config.captures_audio,
            sample_rate: config.sample_rate,
            channel_count: config.channel_count,
        }
    }
}

/// Kind of sample a screen stream produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOutputType {
    Screen,
    Audio,
}
