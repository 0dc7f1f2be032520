pub mod args;
pub mod commands;
pub mod config;
pub mod loader;

pub use args::{Args, Command};
pub use config::{ConfigFile, DnsConfig, ProfileConfig};
pub use loader::{ProfileLoader, Setup};
