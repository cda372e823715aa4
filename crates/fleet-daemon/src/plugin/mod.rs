pub mod context;
pub mod registry;
pub mod traits;
pub mod types;

pub use context::PluginContext;
pub use registry::{PluginRegistry, SharedPlugin};
pub use traits::{ErasedPlugin, Plugin};
pub use types::{Capability, PluginError, PluginMetadata, PluginState};
