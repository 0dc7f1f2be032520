//! Named collections of policies and per-client resolution.

pub mod set;
pub mod store;

pub use set::{DEFAULT_PROFILE, ProfileSet};
pub use store::Profile;
