//! Virtual device enumeration and hotplug.
//!
//! Holds the set of connected [`VirtualDevice`]s, answers discovery queries
//! and reports connects and disconnects to every subscribed
//! [`ChannelHotplugSource`]. Screen-capture devices (tethered mobiles) stay
//! hidden until [`DeviceDiscovery::allow_screen_capture_devices`] opts in,
//! and are announced at that point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use device_capture_core::{
    CaptureDevice, ChannelHotplugSource, DeviceDiscovery, DiscoveryQuery, HotplugEvent,
    HotplugSender,
};

use crate::virtual_device::VirtualDevice;

/// Connected virtual devices.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Arc<VirtualDevice>>>,
    subscribers: Mutex<Vec<HotplugSender>>,
    screen_capture_allowed: AtomicBool,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that already holds `devices`, without announcing them.
    pub fn with_devices(devices: Vec<Arc<VirtualDevice>>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Self::default()
        }
    }

    /// New hotplug source fed by this registry, plus a sender for other
    /// producers (the shared session's lifecycle) to merge into it. The
    /// source closes once the registry and the returned sender are dropped.
    pub fn subscribe(&self) -> (HotplugSender, ChannelHotplugSource) {
        let (sender, source) = ChannelHotplugSource::new();
        self.subscribers.lock().push(sender.clone());
        (sender, source)
    }

    pub fn is_screen_capture_allowed(&self) -> bool {
        self.screen_capture_allowed.load(Ordering::SeqCst)
    }

    fn is_visible(&self, device: &VirtualDevice) -> bool {
        !device.is_screen_capture_device() || self.is_screen_capture_allowed()
    }

    pub fn device(&self, unique_id: &str) -> Option<Arc<VirtualDevice>> {
        self.devices
            .lock()
            .iter()
            .find(|d| d.unique_id() == unique_id)
            .cloned()
    }

    /// Every connected device, visible or not.
    pub fn connected(&self) -> Vec<Arc<VirtualDevice>> {
        self.devices.lock().clone()
    }

    /// Plug in `device`. Returns `false` when a device with the same
    /// identity is already connected.
    pub fn connect(&self, device: Arc<VirtualDevice>) -> bool {
        {
            let mut devices = self.devices.lock();
            if devices.iter().any(|d| d.unique_id() == device.unique_id()) {
                log::warn!("{} is already connected", device.unique_id());
                return false;
            }
            devices.push(Arc::clone(&device));
        }
        log::info!("Connected {} ({})", device.localized_name(), device.unique_id());
        if self.is_visible(&device) {
            self.publish(HotplugEvent::DeviceConnected(device as Arc<dyn CaptureDevice>));
        }
        true
    }

    /// Unplug the device with this identity.
    pub fn disconnect(&self, unique_id: &str) -> Option<Arc<VirtualDevice>> {
        let device = {
            let mut devices = self.devices.lock();
            let index = devices.iter().position(|d| d.unique_id() == unique_id)?;
            devices.remove(index)
        };
        log::info!("Disconnected {}", unique_id);
        if self.is_visible(&device) {
            self.publish(HotplugEvent::DeviceDisconnected(Arc::clone(&device) as Arc<dyn CaptureDevice>));
        }
        Some(device)
    }

    fn publish(&self, event: HotplugEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sender| sender.send(event.clone()));
    }
}

impl DeviceDiscovery for DeviceRegistry {
    fn devices(&self, query: &DiscoveryQuery) -> Vec<Arc<dyn CaptureDevice>> {
        self.devices
            .lock()
            .iter()
            .filter(|d| self.is_visible(d))
            .filter(|d| query.device_types.contains(&d.device_type()))
            .filter(|d| d.provides(query.media_type))
            .map(|d| Arc::clone(d) as Arc<dyn CaptureDevice>)
            .collect()
    }

    fn allow_screen_capture_devices(&self, allow: bool) {
        let was_allowed = self.screen_capture_allowed.swap(allow, Ordering::SeqCst);
        if was_allowed == allow {
            return;
        }
        log::debug!("Screen capture devices {}", if allow { "allowed" } else { "hidden" });

        let affected: Vec<Arc<VirtualDevice>> = self
            .devices
            .lock()
            .iter()
            .filter(|d| d.is_screen_capture_device())
            .cloned()
            .collect();
        for device in affected {
            let device = device as Arc<dyn CaptureDevice>;
            self.publish(if allow {
                HotplugEvent::DeviceConnected(device)
            } else {
                HotplugEvent::DeviceDisconnected(device)
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use device_capture_core::{DeviceType, HotplugPoll, HotplugSource, MediaType};

    fn next(source: &mut ChannelHotplugSource) -> HotplugPoll {
        source.poll_event(Duration::from_millis(5))
    }

    fn ids(devices: Vec<Arc<dyn CaptureDevice>>) -> Vec<String> {
        devices.iter().map(|d| d.unique_id().to_string()).collect()
    }

    #[test]
    fn queries_filter_by_type_and_media() {
        let registry = DeviceRegistry::with_devices(vec![
            VirtualDevice::external_camera("cam-1", "Cam Link 4K", "Elgato").into_arc(),
            VirtualDevice::built_in_camera("facetime").into_arc(),
        ]);

        assert_eq!(
            ids(registry.devices(&DiscoveryQuery::cameras(MediaType::Video))),
            vec!["cam-1", "facetime"]
        );
        assert!(registry
            .devices(&DiscoveryQuery::cameras(MediaType::Muxed))
            .is_empty());

        let external_only = DiscoveryQuery {
            device_types: vec![DeviceType::ExternalUnknown],
            media_type: MediaType::Video,
        };
        assert_eq!(ids(registry.devices(&external_only)), vec!["cam-1"]);
    }

    #[test]
    fn mobile_hidden_until_screen_capture_allowed() {
        let registry = DeviceRegistry::with_devices(vec![
            VirtualDevice::mobile("phone-1", 1170, 2532).into_arc(),
        ]);
        let (_sender, mut source) = registry.subscribe();
        let muxed = DiscoveryQuery::cameras(MediaType::Muxed);

        assert!(registry.devices(&muxed).is_empty());
        registry.allow_screen_capture_devices(true);
        assert_eq!(ids(registry.devices(&muxed)), vec!["phone-1"]);
        assert!(matches!(
            next(&mut source),
            HotplugPoll::Event(HotplugEvent::DeviceConnected(_))
        ));

        // Repeating the opt-in announces nothing.
        registry.allow_screen_capture_devices(true);
        assert!(matches!(next(&mut source), HotplugPoll::Idle));
    }

    #[test]
    fn connect_and_disconnect_are_published() {
        let registry = DeviceRegistry::new();
        let (_sender, mut source) = registry.subscribe();

        assert!(registry.connect(VirtualDevice::built_in_camera("facetime").into_arc()));
        assert!(!registry.connect(VirtualDevice::built_in_camera("facetime").into_arc()));
        assert!(registry.disconnect("facetime").is_some());
        assert!(registry.disconnect("facetime").is_none());

        match next(&mut source) {
            HotplugPoll::Event(HotplugEvent::DeviceConnected(d)) => assert_eq!(d.unique_id(), "facetime"),
            other => panic!("unexpected {:?}", other),
        }
        match next(&mut source) {
            HotplugPoll::Event(HotplugEvent::DeviceDisconnected(d)) => {
                assert_eq!(d.unique_id(), "facetime")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(next(&mut source), HotplugPoll::Idle));
    }

    #[test]
    fn hidden_mobile_connects_silently() {
        let registry = DeviceRegistry::new();
        let (_sender, mut source) = registry.subscribe();

        registry.connect(VirtualDevice::mobile("phone-1", 1170, 2532).into_arc());
        assert!(matches!(next(&mut source), HotplugPoll::Idle));
        assert!(registry.device("phone-1").is_some());
    }

    #[test]
    fn dropped_registry_closes_sources() {
        let registry = DeviceRegistry::new();
        let (sender, mut source) = registry.subscribe();
        drop(registry);
        assert!(matches!(next(&mut source), HotplugPoll::Idle));
        drop(sender);
        assert!(matches!(next(&mut source), HotplugPoll::Closed));
    }
}
