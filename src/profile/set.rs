use std::{collections::HashMap, net::IpAddr, sync::Arc};

use super::Profile;
use crate::{
    error::TamperError,
    policy::{DomainPolicy, Registry, UrlPolicy},
};

/// Name of the profile used for clients without a binding.
pub const DEFAULT_PROFILE: &str = "default";

/// Named profiles and the clients bound to them.
#[derive(Debug)]
pub struct ProfileSet {
    registry: Arc<Registry>,
    default: Arc<Profile>,
    profiles: HashMap<String, Arc<Profile>>,
    clients: HashMap<IpAddr, String>,
}

impl ProfileSet {
    /// A set holding only an empty default profile.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            default: Arc::new(Profile::new(DEFAULT_PROFILE, Arc::clone(&registry))),
            registry,
            profiles: HashMap::new(),
            clients: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Return the named profile, creating it empty if needed.
    pub fn profile_or_create(&mut self, name: &str) -> Arc<Profile> {
        if name == DEFAULT_PROFILE {
            return Arc::clone(&self.default);
        }
        let registry = &self.registry;
        Arc::clone(
            self.profiles
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Profile::new(name, Arc::clone(registry)))),
        )
    }

    pub fn profile(&self, name: &str) -> Option<Arc<Profile>> {
        if name == DEFAULT_PROFILE {
            return Some(Arc::clone(&self.default));
        }
        self.profiles.get(name).cloned()
    }

    /// Route `client` to the named profile.
    pub fn bind(&mut self, client: IpAddr, name: &str) -> Result<(), TamperError> {
        if self.profile(name).is_none() {
            return Err(TamperError::UnknownProfile {
                name: name.to_string(),
            });
        }
        if let Some(previous) = self.clients.insert(client, name.to_string()) {
            log::warn!("client {client} moved from profile {previous} to {name}");
        }
        Ok(())
    }

    /// Profile serving `client`; unknown or absent clients get the default.
    pub fn for_client(&self, client: Option<IpAddr>) -> Arc<Profile> {
        client
            .and_then(|ip| self.clients.get(&ip))
            .and_then(|name| self.profiles.get(name))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }

    pub fn resolve_url(&self, client: Option<IpAddr>, url: &str) -> Option<Arc<UrlPolicy>> {
        self.for_client(client).resolve_url(url)
    }

    pub fn resolve_domain(&self, client: Option<IpAddr>, domain: &str) -> Option<Arc<DomainPolicy>> {
        self.for_client(client).resolve_domain(domain)
    }

    /// Profile names, default first, the rest sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names.insert(0, DEFAULT_PROFILE.to_string());
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Describe;

    fn set() -> ProfileSet {
        let mut set = ProfileSet::new(Arc::new(Registry::with_defaults()));
        set.profile_or_create(DEFAULT_PROFILE)
            .apply("url status 500 g.cn")
            .unwrap();
        set.profile_or_create("mobile")
            .apply("url speed 10KB/s g.cn")
            .unwrap();
        set.bind("192.168.1.20".parse().unwrap(), "mobile").unwrap();
        set
    }

    fn command(policy: Option<Arc<UrlPolicy>>) -> Option<String> {
        policy.map(|p| p.command())
    }

    #[test]
    fn bound_client_uses_its_profile() {
        let set = set();
        let client = Some("192.168.1.20".parse().unwrap());
        assert_eq!(command(set.resolve_url(client, "g.cn")).as_deref(), Some("url speed 10KB/s g.cn"));
    }

    #[test]
    fn unknown_client_falls_back_to_default() {
        let set = set();
        let client = Some("10.0.0.1".parse().unwrap());
        assert_eq!(command(set.resolve_url(client, "g.cn")).as_deref(), Some("url status 500 g.cn"));
        assert_eq!(command(set.resolve_url(None, "g.cn")).as_deref(), Some("url status 500 g.cn"));
    }

    #[test]
    fn binding_requires_existing_profile() {
        let mut set = set();
        let result = set.bind("10.0.0.2".parse().unwrap(), "tablet");
        assert!(matches!(result, Err(TamperError::UnknownProfile { name }) if name == "tablet"));
    }

    #[test]
    fn names_start_with_default() {
        let mut set = set();
        set.profile_or_create("alpha");
        assert_eq!(set.names(), vec!["default", "alpha", "mobile"]);
    }

    #[test]
    fn domain_resolution_per_client() {
        let set = set();
        set.profile("mobile")
            .unwrap()
            .apply("domain null g.cn")
            .unwrap();
        let client = Some("192.168.1.20".parse().unwrap());
        assert!(set.resolve_domain(client, "g.cn").is_some());
        assert!(set.resolve_domain(None, "g.cn").is_none());
    }
}
