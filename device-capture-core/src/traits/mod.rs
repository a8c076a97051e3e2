pub mod capture_device;
pub mod device_discovery;
pub mod device_events;
pub mod hotplug_source;
pub mod screen_capture;
pub mod shared_session;
