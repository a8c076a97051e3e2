//! Frame generator for a virtual device.
//!
//! Pushes one video frame (and optionally one audio buffer) per tick from a
//! [`VirtualDevice`] into a [`VirtualCaptureSession`] on a dedicated thread,
//! the way a platform delivers buffers from its capture thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use device_capture_core::{CaptureDevice, CaptureError, MediaType};

use crate::virtual_device::VirtualDevice;
use crate::virtual_session::VirtualCaptureSession;

/// Streams frames from one device at a fixed rate.
pub struct FramePump {
    device: Arc<VirtualDevice>,
    graph: Arc<VirtualCaptureSession>,
    with_audio: bool,
    running: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    pump_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FramePump {
    pub fn new(device: Arc<VirtualDevice>, graph: Arc<VirtualCaptureSession>) -> Self {
        Self {
            device,
            graph,
            with_audio: false,
            running: Arc::new(AtomicBool::new(false)),
            delivered: Arc::new(AtomicU64::new(0)),
            pump_handle: Mutex::new(None),
        }
    }

    /// Also push one audio buffer per tick.
    pub fn with_audio(mut self) -> Self {
        self.with_audio = true;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Buffers taken by at least one tap so far.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Push one tick synchronously. Returns the number of taps reached.
    pub fn tick(&self, sequence: u64) -> usize {
        pump_tick(&self.device, &self.graph, self.with_audio, sequence, &self.delivered)
    }

    pub fn start(&self, fps: u32) -> Result<(), CaptureError> {
        if fps == 0 {
            return Err(CaptureError::ConfigurationFailed(
                "frame rate must be positive".into(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::ConfigurationFailed(format!(
                "frame pump for {} already running",
                self.device.unique_id()
            )));
        }

        let running = Arc::clone(&self.running);
        let delivered = Arc::clone(&self.delivered);
        let device = Arc::clone(&self.device);
        let graph = Arc::clone(&self.graph);
        let with_audio = self.with_audio;
        let interval = Duration::from_secs_f64(1.0 / fps as f64);

        let handle = thread::Builder::new()
            .name(format!("virtual-frames-{}", device.unique_id()))
            .spawn(move || {
                let mut sequence = 0u64;
                while running.load(Ordering::SeqCst) {
                    pump_tick(&device, &graph, with_audio, sequence, &delivered);
                    sequence += 1;
                    thread::sleep(interval);
                }
                log::debug!("Frame pump for {} stopped after {} ticks", device.unique_id(), sequence);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::Unknown(format!("failed to spawn frame pump thread: {}", e))
            })?;

        *self.pump_handle.lock() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump_handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Frame pump for {} panicked", self.device.unique_id());
            }
        }
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_tick(
    device: &VirtualDevice,
    graph: &VirtualCaptureSession,
    with_audio: bool,
    sequence: u64,
    delivered: &AtomicU64,
) -> usize {
    let mut reached = 0;
    let mut kinds = vec![MediaType::Video];
    if with_audio {
        kinds.push(MediaType::Audio);
    }
    for kind in kinds {
        let Some(sample) = device.next_sample(kind, sequence) else {
            continue;
        };
        let taps = graph.push_sample(device.unique_id(), sample);
        if taps > 0 {
            delivered.fetch_add(1, Ordering::Relaxed);
        }
        reached += taps;
    }
    reached
}
