pub mod cli;
pub mod error;
pub mod net;
pub mod pattern;
pub mod policy;
pub mod profile;
pub mod shaping;
pub mod value;
