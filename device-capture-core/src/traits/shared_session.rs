use crate::models::config::SessionPreset;
use crate::models::graph::{
    Connection, ConnectionId, DeviceInput, InputId, OutputId, OutputTap, PreviewLayerHandle,
};

/// The single multiplexed capture pipeline every device is composed into.
///
/// Structural changes are bracketed by `begin_configuration` /
/// `commit_configuration`. Brackets must not interleave across threads; the
/// orchestrator serializes them on its configuration queue. The API has no
/// multi-step rollback: each `add_*` applies immediately.
///
/// Removing an id the session does not hold is a no-op.
pub trait SharedCaptureSession: Send + Sync {
    fn set_session_preset(&self, preset: SessionPreset);

    fn start_running(&self);

    fn stop_running(&self);

    fn is_running(&self) -> bool;

    fn begin_configuration(&self);

    fn commit_configuration(&self);

    fn can_add_input(&self, input: &DeviceInput) -> bool;

    fn add_input_with_no_connections(&self, input: &DeviceInput);

    fn remove_input(&self, input: InputId);

    fn can_add_output(&self, output: &OutputTap) -> bool;

    fn add_output_with_no_connections(&self, output: &OutputTap);

    fn remove_output(&self, output: OutputId);

    fn outputs(&self) -> Vec<OutputId>;

    fn can_add_connection(&self, connection: &Connection) -> bool;

    fn add_connection(&self, connection: &Connection);

    fn remove_connection(&self, connection: ConnectionId);

    /// Create a video preview layer bound to this session without any
    /// implicit connection.
    fn create_preview_layer(&self) -> PreviewLayerHandle;
}
