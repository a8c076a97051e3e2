use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::traits::capture_device::CaptureDevice;

/// Device and session lifecycle signal.
#[derive(Clone)]
pub enum HotplugEvent {
    SessionStarted,
    SessionStopped,
    DeviceConnected(Arc<dyn CaptureDevice>),
    DeviceDisconnected(Arc<dyn CaptureDevice>),
}

impl fmt::Debug for HotplugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionStarted => write!(f, "SessionStarted"),
            Self::SessionStopped => write!(f, "SessionStopped"),
            Self::DeviceConnected(device) => write!(f, "DeviceConnected({})", device.unique_id()),
            Self::DeviceDisconnected(device) => {
                write!(f, "DeviceDisconnected({})", device.unique_id())
            }
        }
    }
}

/// Result of waiting on a [`HotplugSource`].
#[derive(Debug)]
pub enum HotplugPoll {
    Event(HotplugEvent),
    /// Nothing arrived within the timeout.
    Idle,
    /// The source will never produce another event.
    Closed,
}

/// Lazy sequence of hotplug events, consumed by one watcher.
pub trait HotplugSource: Send + 'static {
    /// Wait up to `timeout` for the next event.
    fn poll_event(&mut self, timeout: Duration) -> HotplugPoll;
}

/// Producer side of a [`ChannelHotplugSource`], handed to platform callbacks.
/// Cloneable; events from every clone are observed in send order.
#[derive(Clone)]
pub struct HotplugSender {
    sender: Sender<HotplugEvent>,
}

impl HotplugSender {
    /// Returns `false` once the source has been dropped.
    pub fn send(&self, event: HotplugEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// [`HotplugSource`] fed through a channel. Closes when every
/// [`HotplugSender`] is dropped.
pub struct ChannelHotplugSource {
    receiver: Receiver<HotplugEvent>,
}

impl ChannelHotplugSource {
    pub fn new() -> (HotplugSender, Self) {
        let (sender, receiver) = unbounded();
        (HotplugSender { sender }, Self { receiver })
    }
}

impl HotplugSource for ChannelHotplugSource {
    fn poll_event(&mut self, timeout: Duration) -> HotplugPoll {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => HotplugPoll::Event(event),
            Err(RecvTimeoutError::Timeout) => HotplugPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => HotplugPoll::Closed,
        }
    }
}
