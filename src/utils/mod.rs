//! Shared helpers

pub mod threads;
pub mod throttle;

pub use threads::{CallbackThreadRegistry, ThreadRegistry};
pub use throttle::LogThrottler;
