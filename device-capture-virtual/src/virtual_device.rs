//! In-memory capture device.
//!
//! Stands in for a camera, capture card or tethered mobile device. Geometry
//! changes (rotation, a different app in the foreground) are simulated with
//! [`VirtualDevice::set_dimensions`], which fires the registered format
//! observers synchronously on the calling thread.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use device_capture_core::models::graph::{ObserverToken, PortId};
use device_capture_core::{
    CaptureDevice, CaptureError, DeviceConfiguration, DeviceType, Dimensions,
    FormatChangeCallback, FrameDuration, FrameRateRange, InputPort, MediaType, SampleBuffer,
    VideoFormat,
};

/// Model identity reported by tethered mobile devices.
pub const MOBILE_MODEL_ID: &str = "iOS Device";

/// Manufacturer reported by tethered mobile devices and host cameras.
pub const HOST_VENDOR: &str = "Apple Inc.";

#[derive(Default)]
struct DeviceState {
    active_format: Option<VideoFormat>,
    frame_durations: Option<(FrameDuration, FrameDuration)>,
    locked: bool,
    held_by: Option<String>,
    input_unavailable: bool,
    dimensions: Option<Dimensions>,
    observers: HashMap<ObserverToken, (PortId, FormatChangeCallback)>,
}

/// A capture device backed by memory.
pub struct VirtualDevice {
    unique_id: String,
    model_id: String,
    manufacturer: String,
    localized_name: String,
    device_type: DeviceType,
    advertised: Vec<MediaType>,
    screen_capture: bool,
    formats: Vec<VideoFormat>,
    ports: Vec<InputPort>,
    state: Mutex<DeviceState>,
}

impl VirtualDevice {
    fn new(
        unique_id: &str,
        model_id: &str,
        manufacturer: &str,
        device_type: DeviceType,
        ports: &[MediaType],
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            model_id: model_id.into(),
            manufacturer: manufacturer.into(),
            localized_name: model_id.into(),
            device_type,
            advertised: ports.to_vec(),
            screen_capture: false,
            formats: Vec::new(),
            ports: ports.iter().map(|m| InputPort::new(*m)).collect(),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// External camera or capture card with a video and an audio port.
    pub fn external_camera(unique_id: &str, model_id: &str, manufacturer: &str) -> Self {
        Self::new(
            unique_id,
            model_id,
            manufacturer,
            DeviceType::ExternalUnknown,
            &[MediaType::Video, MediaType::Audio],
        )
    }

    /// Built-in camera from the host vendor. Video only.
    pub fn built_in_camera(unique_id: &str) -> Self {
        Self::new(
            unique_id,
            "FaceTime HD Camera",
            HOST_VENDOR,
            DeviceType::BuiltInWideAngleCamera,
            &[MediaType::Video],
        )
    }

    /// Tethered mobile device streaming its screen at `width`x`height`.
    ///
    /// Enumerated as a muxed screen-capture device: it is only visible once
    /// screen-capture devices are allowed.
    pub fn mobile(unique_id: &str, width: u32, height: u32) -> Self {
        let mut device = Self::new(
            unique_id,
            MOBILE_MODEL_ID,
            HOST_VENDOR,
            DeviceType::ExternalUnknown,
            &[MediaType::Muxed, MediaType::Audio],
        );
        device.advertised = vec![MediaType::Muxed];
        device.screen_capture = true;
        device.formats = vec![VideoFormat::new(
            width,
            height,
            vec![FrameRateRange::new(1.0, 60.0)],
        )];
        device.state.get_mut().dimensions = Some(Dimensions::new(width, height));
        device
    }

    pub fn with_name(mut self, localized_name: &str) -> Self {
        self.localized_name = localized_name.into();
        self
    }

    pub fn with_formats(mut self, formats: Vec<VideoFormat>) -> Self {
        self.formats = formats;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Whether discovery hides this device until screen-capture devices are
    /// allowed.
    pub fn is_screen_capture_device(&self) -> bool {
        self.screen_capture
    }

    /// Whether a discovery query for `media_type` lists this device.
    pub fn provides(&self, media_type: MediaType) -> bool {
        self.advertised.contains(&media_type)
    }

    /// Simulate another client holding the device; configuration locks fail
    /// until cleared with `None`.
    pub fn set_held_by(&self, holder: Option<&str>) {
        self.state.lock().held_by = holder.map(str::to_string);
    }

    /// Make `input_ports` fail, as a device that is already in use would.
    pub fn set_input_unavailable(&self, unavailable: bool) {
        self.state.lock().input_unavailable = unavailable;
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn frame_durations(&self) -> Option<(FrameDuration, FrameDuration)> {
        self.state.lock().frame_durations
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    /// Current video geometry: the last dimensions set, else the active
    /// format's.
    pub fn dimensions(&self) -> Option<Dimensions> {
        let state = self.state.lock();
        state.dimensions.or_else(|| {
            state
                .active_format
                .as_ref()
                .map(|f| Dimensions::new(f.dimensions.width, f.dimensions.height))
        })
    }

    /// Change the streamed geometry and notify every video port observer.
    pub fn set_dimensions(&self, dimensions: Option<Dimensions>) {
        let callbacks: Vec<FormatChangeCallback> = {
            let mut state = self.state.lock();
            state.dimensions = dimensions;
            state
                .observers
                .values()
                .filter(|(port, _)| self.is_video_port(*port))
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };
        log::debug!(
            "{} now streaming {:?} ({} observers)",
            self.unique_id,
            dimensions,
            callbacks.len()
        );
        for callback in callbacks {
            callback(dimensions);
        }
    }

    /// Swap width and height.
    pub fn rotate(&self) {
        if let Some(current) = self.dimensions() {
            self.set_dimensions(Some(Dimensions::new(current.height, current.width)));
        }
    }

    /// Build the next frame for `media_type` at the current geometry.
    pub fn next_sample(&self, media_type: MediaType, sequence: u64) -> Option<SampleBuffer> {
        match media_type {
            MediaType::Audio => Some(SampleBuffer::audio(sequence)),
            MediaType::Video | MediaType::Muxed => self
                .dimensions()
                .map(|d| SampleBuffer::video(d.width, d.height, sequence)),
        }
    }

    fn is_video_port(&self, port: PortId) -> bool {
        self.ports
            .iter()
            .any(|p| p.id == port && p.media_type != MediaType::Audio)
    }
}

/// Configuration lock on a [`VirtualDevice`]. Unlocks on drop.
struct VirtualConfiguration<'a> {
    device: &'a VirtualDevice,
}

impl DeviceConfiguration for VirtualConfiguration<'_> {
    fn set_active_format(&mut self, format: &VideoFormat) {
        let mut state = self.device.state.lock();
        state.active_format = Some(format.clone());
        state.dimensions = Some(Dimensions::new(format.dimensions.width, format.dimensions.height));
    }

    fn set_active_frame_duration(&mut self, min: FrameDuration, max: FrameDuration) {
        self.device.state.lock().frame_durations = Some((min, max));
    }
}

impl Drop for VirtualConfiguration<'_> {
    fn drop(&mut self) {
        self.device.state.lock().locked = false;
    }
}

impl CaptureDevice for VirtualDevice {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn manufacturer(&self) -> &str {
        &self.manufacturer
    }

    fn localized_name(&self) -> &str {
        &self.localized_name
    }

    fn formats(&self) -> Vec<VideoFormat> {
        self.formats.clone()
    }

    fn active_format(&self) -> Option<VideoFormat> {
        self.state.lock().active_format.clone()
    }

    fn lock_for_configuration(&self) -> Result<Box<dyn DeviceConfiguration + '_>, CaptureError> {
        let mut state = self.state.lock();
        if let Some(holder) = &state.held_by {
            return Err(CaptureError::ConfigurationLockFailed {
                device: self.unique_id.clone(),
                reason: format!("held by {}", holder),
            });
        }
        if state.locked {
            return Err(CaptureError::ConfigurationLockFailed {
                device: self.unique_id.clone(),
                reason: "already locked".into(),
            });
        }
        state.locked = true;
        Ok(Box::new(VirtualConfiguration { device: self }))
    }

    fn input_ports(&self) -> Result<Vec<InputPort>, CaptureError> {
        if self.state.lock().input_unavailable {
            return Err(CaptureError::InputUnavailable(self.unique_id.clone()));
        }
        Ok(self.ports.clone())
    }

    fn format_description(&self, port: PortId) -> Option<Dimensions> {
        if self.is_video_port(port) {
            self.dimensions()
        } else {
            None
        }
    }

    fn add_format_observer(&self, port: PortId, callback: FormatChangeCallback) -> ObserverToken {
        let token = ObserverToken::new();
        self.state.lock().observers.insert(token, (port, callback));
        token
    }

    fn remove_format_observer(&self, token: ObserverToken) {
        self.state.lock().observers.remove(&token);
    }
}
