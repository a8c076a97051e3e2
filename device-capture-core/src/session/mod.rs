pub mod device;
pub mod hotplug;
pub mod orchestrator;
pub mod screen;
