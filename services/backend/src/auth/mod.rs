//! Authentication and authorization for the backend API.
//!
//! # Purpose
//! Groups bearer-credential resolution, role enforcement, and agent code
//! generation.
pub mod codes;
pub mod guard;

pub use guard::{Identity, can_access, require_admin, require_identity, require_self_or_admin};
