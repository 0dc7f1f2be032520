//! Domain and URL pattern matching used to select a policy for a request.

pub mod domain;
pub mod url;

pub use domain::{DomainPattern, normalize_domain};
pub use url::{UrlParts, UrlPattern};
