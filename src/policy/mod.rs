//! The policy command language: tokens, registry, leaf and composite policies.

pub mod delay;
pub mod domain;
pub mod leaf;
pub mod model;
pub mod registry;
pub mod tokens;
pub mod url;

pub use delay::{DelayKind, DelayPolicy, MAX_DELAY};
pub use domain::{DomainAction, DomainPolicy, DomainTarget};
pub use leaf::{
    ChunkedMode, ChunkedPolicy, DeletePolicy, FlagKind, FlagPolicy, MapPolicy, MapTarget, Marker,
    NPolicy, Scope, SpeedPolicy, StatusPolicy, Target, TextKind, TextPolicy,
};
pub use model::{Describe, Policy};
pub use registry::{Builder, Registry};
pub use tokens::{Tokens, quote, tokenize};
pub use url::{ContentPolicy, RemovePolicy, SubKey, SubPolicy, UrlMode, UrlPolicy, UrlSlot};
