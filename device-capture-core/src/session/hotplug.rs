use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::models::error::CaptureError;
use crate::session::orchestrator::CaptureOrchestrator;
use crate::traits::hotplug_source::{HotplugEvent, HotplugPoll, HotplugSource};

/// How long the watcher blocks on its source before rechecking the run flag.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Drives an orchestrator from a [`HotplugSource`].
///
/// Events are consumed on one worker thread in arrival order:
/// - `SessionStarted` → [`CaptureOrchestrator::refresh_devices`]
/// - `SessionStopped` → logged
/// - `DeviceConnected` → [`CaptureOrchestrator::on_device_found`]
/// - `DeviceDisconnected` → [`CaptureOrchestrator::on_device_lost`]
pub struct HotplugWatcher {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl HotplugWatcher {
    pub fn start(
        mut source: impl HotplugSource,
        orchestrator: CaptureOrchestrator,
    ) -> Result<Self, CaptureError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("capture-hotplug".into())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    match source.poll_event(POLL_INTERVAL) {
                        HotplugPoll::Event(event) => dispatch(&orchestrator, event),
                        HotplugPoll::Idle => {}
                        HotplugPoll::Closed => {
                            log::info!("Hotplug source closed");
                            break;
                        }
                    }
                }
                flag.store(false, Ordering::SeqCst);
            })
            .map_err(|e| CaptureError::Unknown(format!("failed to spawn hotplug thread: {}", e)))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the watcher is still consuming events.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop consuming events and join the worker. Events not yet taken from
    /// the source are left there.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Hotplug watcher panicked");
            }
        }
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(orchestrator: &CaptureOrchestrator, event: HotplugEvent) {
    log::debug!("Hotplug event {:?}", event);
    match event {
        HotplugEvent::SessionStarted => orchestrator.refresh_devices(),
        HotplugEvent::SessionStopped => log::info!("Shared capture session stopped running"),
        HotplugEvent::DeviceConnected(device) => orchestrator.on_device_found(device),
        HotplugEvent::DeviceDisconnected(device) => orchestrator.on_device_lost(device.unique_id()),
    }
}
