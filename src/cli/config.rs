use std::{
    collections::BTreeMap,
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::error::TamperError;

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub dns: DnsConfig,
    /// Profiles by name. `default` serves clients without a binding.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct DnsConfig {
    /// Answer for domains pointed at the proxy with `domain proxy`
    #[serde(default)]
    pub proxy_ips: Vec<IpAddr>,
}

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ProfileConfig {
    /// Commands applied in order
    #[serde(default)]
    pub commands: Vec<String>,
    /// Command files applied after `commands`, relative to the config file
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Client addresses served by this profile
    #[serde(default)]
    pub clients: Vec<IpAddr>,
}

impl ConfigFile {
    /// Load configuration file
    pub fn load(path: &Path) -> Result<Self, TamperError> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| TamperError::ConfigParse {
            path: PathBuf::from(path),
            source,
        })
    }
}
