//! Outbound messaging: the platform port and the paced delivery queue.

pub mod port;
pub mod queue;
pub mod types;
