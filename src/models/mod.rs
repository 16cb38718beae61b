pub mod approval_history;
pub mod approval_request;
pub mod paging;
pub mod script;
pub mod script_version;

pub use paging::{PageRequest, Paged};
