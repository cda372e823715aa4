//! Built-in plugins

pub mod leave_duplicate;
pub mod req_forward;
