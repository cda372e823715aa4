//! Platform adapter layer
//!
//! An adapter speaks one chat protocol (identified by its platform tag) on
//! behalf of every connected account of that platform.

pub mod accounts;
pub mod mock;
pub mod onebot;
pub mod registry;
pub mod traits;

pub use accounts::AccountDirectory;
pub use mock::{MockAdapter, MockCall};
pub use onebot::OneBotAdapter;
pub use registry::AdapterRegistry;
pub use traits::{AdapterError, ErasedPlatformAdapter, PlatformAdapter};
