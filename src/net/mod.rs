pub mod answer;
pub mod resolver;

// Re-export main types
pub use answer::DnsAnswerer;
pub use resolver::{DnsResolver, SystemDnsResolver};
