pub mod config;
pub mod device_family;
pub mod diagnostics;
pub mod error;
pub mod format;
pub mod graph;
pub mod sample_buffer;
pub mod screen;
pub mod source;
pub mod state;
