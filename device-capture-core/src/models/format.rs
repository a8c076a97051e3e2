use serde::{Deserialize, Serialize};

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether both sides are at least as large as `other`'s.
    pub fn covers(&self, other: &Dimensions) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

/// Pixel layouts requested from video taps and screen streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 32-bit BGRA, directly uploadable as a GPU texture.
    #[default]
    Bgra32,
    /// 8-bit 4:2:0 bi-planar, video range.
    YCbCr420BiPlanar,
}

impl PixelFormat {
    /// FourCC code of the layout.
    pub fn fourcc(&self) -> u32 {
        let code = match self {
            Self::Bgra32 => b"BGRA",
            Self::YCbCr420BiPlanar => b"420v",
        };
        u32::from_be_bytes(*code)
    }
}

/// Inclusive range of frame rates a format supports.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRateRange {
    pub min_frame_rate: f64,
    pub max_frame_rate: f64,
}

impl FrameRateRange {
    pub fn new(min_frame_rate: f64, max_frame_rate: f64) -> Self {
        Self {
            min_frame_rate,
            max_frame_rate,
        }
    }

    pub fn contains(&self, fps: f64) -> bool {
        self.min_frame_rate <= fps && fps <= self.max_frame_rate
    }
}

/// One format a physical device can be switched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub dimensions: Dimensions,
    pub pixel_format: PixelFormat,
    pub frame_rate_ranges: Vec<FrameRateRange>,
}

impl VideoFormat {
    pub fn new(width: u32, height: u32, frame_rate_ranges: Vec<FrameRateRange>) -> Self {
        Self {
            dimensions: Dimensions::new(width, height),
            pixel_format: PixelFormat::default(),
            frame_rate_ranges,
        }
    }

    pub fn supports_frame_rate(&self, fps: f64) -> bool {
        self.frame_rate_ranges.iter().any(|range| range.contains(fps))
    }
}

/// Requested capture format. Absent fields mean "use the default policy".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoSpec {
    pub fps: Option<u32>,
    pub size: Option<Dimensions>,
}

impl VideoSpec {
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(Dimensions::new(width, height));
        self
    }
}

/// Rational frame duration, `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDuration {
    pub value: i64,
    pub timescale: u32,
}

impl FrameDuration {
    /// Duration of one frame at `fps`.
    pub fn from_fps(fps: u32) -> Self {
        Self {
            value: 1,
            timescale: fps,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        if self.timescale == 0 {
            return 0.0;
        }
        self.value as f64 / self.timescale as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn frame_duration_from_fps() {
        let duration = FrameDuration::from_fps(60);
        assert_eq!(duration.value, 1);
        assert_eq!(duration.timescale, 60);
        assert_relative_eq!(duration.as_secs_f64(), 1.0 / 60.0);
    }

    #[test]
    fn frame_rate_range_is_inclusive() {
        let range = FrameRateRange::new(1.0, 30.0);
        assert!(range.contains(1.0));
        assert!(range.contains(30.0));
        assert!(!range.contains(30.5));
    }

    #[test]
    fn covers_requires_both_sides() {
        let hd = Dimensions::new(1280, 720);
        assert!(Dimensions::new(1920, 1080).covers(&hd));
        assert!(Dimensions::new(1280, 720).covers(&hd));
        assert!(!Dimensions::new(1920, 700).covers(&hd));
    }

    #[test]
    fn fourcc_codes() {
        assert_eq!(PixelFormat::Bgra32.fourcc(), 0x4247_5241);
        assert_eq!(PixelFormat::YCbCr420BiPlanar.fourcc(), 0x3432_3076);
    }
}
