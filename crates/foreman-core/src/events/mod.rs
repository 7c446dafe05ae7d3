//! Event stream processor.

pub mod stream;

pub use stream::{EventHandler, EventStream, StreamConfig};
