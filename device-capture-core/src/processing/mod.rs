pub mod format_selector;
pub mod serial_queue;
