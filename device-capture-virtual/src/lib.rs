//! # device-capture-virtual
//!
//! In-memory backend for device-capture-kit.
//!
//! Provides:
//! - `VirtualDevice`: cameras, capture cards and tethered mobiles with simulated geometry
//! - `VirtualCaptureSession`: shared capture session with real graph bookkeeping
//! - `DeviceRegistry`: discovery plus connect/disconnect hotplug events
//! - `FramePump`: per-device frame generator thread
//! - `VirtualScreenBackend`: synthetic displays and screen streams
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use device_capture_core::{CaptureOrchestrator, HotplugWatcher, OrchestratorConfiguration};
//! use device_capture_virtual::{DeviceRegistry, VirtualCaptureSession, VirtualDevice};
//!
//! let registry = Arc::new(DeviceRegistry::new());
//! let graph = Arc::new(VirtualCaptureSession::new());
//! let (lifecycle, source) = registry.subscribe();
//! graph.set_lifecycle_sender(lifecycle);
//!
//! let orchestrator = CaptureOrchestrator::new(graph, registry.clone(), OrchestratorConfiguration::default())?;
//! let _watcher = HotplugWatcher::start(source, orchestrator.clone())?;
//! orchestrator.start();
//! registry.connect(VirtualDevice::mobile("phone-1", 1170, 2532).into_arc());
//! ```

pub mod device_registry;
pub mod frame_pump;
pub mod virtual_device;
pub mod virtual_screen;
pub mod virtual_session;

pub use device_registry::DeviceRegistry;
pub use frame_pump::FramePump;
pub use virtual_device::{VirtualDevice, HOST_VENDOR, MOBILE_MODEL_ID};
pub use virtual_screen::{VirtualScreenBackend, VirtualScreenStream};
pub use virtual_session::{GraphSummary, Rejection, VirtualCaptureSession};
