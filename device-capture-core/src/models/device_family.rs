use serde::{Deserialize, Serialize};

/// Coarse classification of a mobile source's screen aspect ratio.
///
/// Derived purely from observed stream geometry, never from the identity the
/// device reports. Serialized with the same names as [`DeviceFamily::raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceFamily {
    #[default]
    #[serde(rename = "iPhoneLegacy")]
    IPhoneLegacy,
    #[serde(rename = "iPhoneXSeries")]
    IPhoneXSeries,
    #[serde(rename = "iPad")]
    IPad,
    #[serde(rename = "iPadPro")]
    IPadPro11,
}

/// Aspect ratios (×100) and the family each one maps to, in match order.
const RATIO_TABLE: [(u32, DeviceFamily); 5] = [
    (133, DeviceFamily::IPad),
    (143, DeviceFamily::IPadPro11),
    (150, DeviceFamily::IPhoneLegacy),
    (177, DeviceFamily::IPhoneLegacy),
    (216, DeviceFamily::IPhoneXSeries),
];

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 4] = [
        Self::IPhoneLegacy,
        Self::IPhoneXSeries,
        Self::IPad,
        Self::IPadPro11,
    ];

    /// Name used by renderers to pick bezel assets.
    pub fn raw(&self) -> &'static str {
        match self {
            Self::IPhoneLegacy => "iPhoneLegacy",
            Self::IPhoneXSeries => "iPhoneXSeries",
            Self::IPad => "iPad",
            Self::IPadPro11 => "iPadPro",
        }
    }

    /// Nearest table entry to `ratio_x100`. Exact ties keep the earlier entry.
    pub fn nearest(ratio_x100: u32) -> Self {
        RATIO_TABLE
            .iter()
            .min_by_key(|(ratio, _)| ratio.abs_diff(ratio_x100))
            .map(|(_, family)| *family)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Self::Landscape
        } else {
            Self::Portrait
        }
    }
}

/// Last observed stream geometry of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
}

impl VideoGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            orientation: Orientation::from_dimensions(width, height),
        }
    }

    /// Long side over short side, ×100, rounded. `None` for degenerate
    /// geometry.
    pub fn aspect_ratio_x100(&self) -> Option<u32> {
        let long = self.width.max(self.height);
        let short = self.width.min(self.height);
        if short == 0 {
            return None;
        }
        Some((long as f64 / short as f64 * 100.0).round() as u32)
    }
}
