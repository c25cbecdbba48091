//! Pipeline configuration
//!
//! `PipelineConfig` is plain serde data; `ConfigStore` persists it as JSON.

mod schema;
mod store;

pub use schema::*;
pub use store::{ConfigChange, ConfigStore};
