//! Schema types shared between the transport layer and the plugins
//!
//! These are value types: the transport layer owns the real account and
//! group objects, plugins only hold these references for the duration of a
//! run or a request lifecycle.

mod account;
mod group;
mod request;
mod target;

pub use account::Account;
pub use group::GroupRef;
pub use request::{
    DEFAULT_EXPIRE_MINUTES, REQUEST_ID_LEN, RequestKind, RequestRecord, RequestStatus,
    generate_request_id,
};
pub use target::{ForwardTarget, NotifyTarget, TargetParseError};
