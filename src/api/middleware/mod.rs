//! API middleware

mod origin;

pub use origin::{is_local_origin, require_local_origin};
