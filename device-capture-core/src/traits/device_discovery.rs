use std::sync::Arc;

use crate::models::graph::MediaType;
use crate::traits::capture_device::CaptureDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// USB/Thunderbolt cameras, capture cards and tethered mobile devices.
    ExternalUnknown,
    BuiltInWideAngleCamera,
}

/// One enumeration request: devices of any of `device_types` that provide
/// `media_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub device_types: Vec<DeviceType>,
    pub media_type: MediaType,
}

impl DiscoveryQuery {
    pub fn cameras(media_type: MediaType) -> Self {
        Self {
            device_types: vec![DeviceType::ExternalUnknown, DeviceType::BuiltInWideAngleCamera],
            media_type,
        }
    }
}

/// Enumerates physical capture devices.
pub trait DeviceDiscovery: Send + Sync {
    fn devices(&self, query: &DiscoveryQuery) -> Vec<Arc<dyn CaptureDevice>>;

    /// Opt in or out of screen-capture devices. Tethered mobile devices are
    /// only enumerated once allowed. Backends without such a switch ignore it.
    fn allow_screen_capture_devices(&self, _allow: bool) {}
}
