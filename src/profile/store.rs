use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    error::TamperError,
    pattern::{UrlParts, UrlPattern, normalize_domain},
    policy::{
        DeletePolicy, Describe, DomainPolicy, DomainTarget, Policy, Registry, RemovePolicy, Scope,
        Target, UrlPolicy,
    },
    shaping::DropTracker,
};

/// Drop tracker key for the catch-all url policy.
const DEFAULT_KEY: &str = "";

#[derive(Debug, Default)]
struct ProfileState {
    default_url: Option<Arc<UrlPolicy>>,
    /// In definition order.
    urls: Vec<Arc<UrlPolicy>>,
    default_domain: Option<Arc<DomainPolicy>>,
    domains: Vec<Arc<DomainPolicy>>,
}

impl ProfileState {
    fn url_index(&self, target: &str) -> Option<usize> {
        self.urls
            .iter()
            .position(|policy| policy.target().is_some_and(|t| t.as_str() == target))
    }

    fn domain_index(&self, key: &str) -> Option<usize> {
        self.domains
            .iter()
            .position(|policy| domain_key(policy.target().as_str()) == key)
    }

    /// Point every targeted policy at the current default.
    fn relink(&mut self) {
        for url in &mut self.urls {
            let mut linked = UrlPolicy::clone(url);
            linked.set_default(self.default_url.clone());
            *url = Arc::new(linked);
        }
    }
}

/// Policies applied for one group of clients.
///
/// Stored policies are immutable snapshots. Applying a command replaces the
/// affected snapshot, so resolution only holds the lock long enough to clone an
/// `Arc`.
#[derive(Debug)]
pub struct Profile {
    name: String,
    registry: Arc<Registry>,
    state: RwLock<ProfileState>,
    drops: DropTracker,
}

impl Profile {
    pub fn new(name: impl Into<String>, registry: Arc<Registry>) -> Self {
        Self {
            name: name.into(),
            registry,
            state: RwLock::new(ProfileState::default()),
            drops: DropTracker::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse `command` and apply it.
    pub fn apply(&self, command: &str) -> Result<(), TamperError> {
        let policy = self.registry.factory(command)?;
        self.apply_policy(policy)
    }

    pub fn apply_policy(&self, policy: Policy) -> Result<(), TamperError> {
        log::info!("profile {}: {}", self.name, policy.command());
        match policy {
            Policy::Url(url) => self.apply_url(url),
            Policy::Remove(remove) => self.apply_remove(&remove),
            Policy::Delete(delete) => self.apply_delete(&delete),
            Policy::Domain(domain) => self.apply_domain(domain),
            other => {
                return Err(TamperError::NotApplicable {
                    keyword: other.command(),
                });
            }
        }
        Ok(())
    }

    fn apply_url(&self, mut policy: UrlPolicy) {
        let mut state = self.state.write();
        let Some(target) = policy.target().map(|t| t.as_str().to_string()) else {
            let mut merged = state.default_url.as_deref().cloned().unwrap_or_default();
            merged.update(&policy);
            merged.set_mode(None);
            state.default_url = Some(Arc::new(merged));
            state.relink();
            self.drops.clear();
            return;
        };

        match state.url_index(&target) {
            Some(index) => {
                let mut merged = UrlPolicy::clone(&state.urls[index]);
                merged.update(&policy);
                merged.set_mode(None);
                state.urls[index] = Arc::new(merged);
            }
            None => {
                policy.set_mode(None);
                policy.set_default(state.default_url.clone());
                state.urls.push(Arc::new(policy));
            }
        }
        self.drops.reset(&target);
    }

    fn apply_remove(&self, remove: &RemovePolicy) {
        let mut state = self.state.write();
        match &remove.target {
            Target::All => {
                if let Some(default) = &state.default_url {
                    let mut trimmed = UrlPolicy::clone(default);
                    trimmed.remove(remove.slot);
                    state.default_url = Some(Arc::new(trimmed));
                }
                for url in &mut state.urls {
                    let mut trimmed = UrlPolicy::clone(url);
                    trimmed.remove(remove.slot);
                    *url = Arc::new(trimmed);
                }
                state.relink();
            }
            Target::Named(name) => {
                let Some(index) = url_key(name).and_then(|key| state.url_index(&key)) else {
                    log::debug!("profile {}: no url policy for {name}", self.name);
                    return;
                };
                let mut trimmed = UrlPolicy::clone(&state.urls[index]);
                trimmed.remove(remove.slot);
                state.urls[index] = Arc::new(trimmed);
            }
        }
    }

    fn apply_delete(&self, delete: &DeletePolicy) {
        let mut state = self.state.write();
        match (delete.scope, &delete.target) {
            (Scope::Url, Target::All) => {
                state.urls.clear();
                state.default_url = None;
                self.drops.clear();
            }
            (Scope::Url, Target::Named(name)) => {
                if let Some(key) = url_key(name) {
                    state
                        .urls
                        .retain(|policy| policy.target().is_none_or(|t| t.as_str() != key));
                    self.drops.reset(&key);
                }
            }
            (Scope::Domain, Target::All) => {
                state.domains.clear();
                state.default_domain = None;
            }
            (Scope::Domain, Target::Named(name)) => {
                let key = domain_key(name);
                state
                    .domains
                    .retain(|policy| domain_key(policy.target().as_str()) != key);
            }
        }
    }

    fn apply_domain(&self, policy: DomainPolicy) {
        let mut state = self.state.write();
        let is_all = matches!(policy.target(), DomainTarget::All);
        let index = state.domain_index(&domain_key(policy.target().as_str()));

        let current = if is_all {
            state.default_domain.clone()
        } else {
            index.map(|i| Arc::clone(&state.domains[i]))
        };
        let stored = match current {
            Some(current) => {
                let mut merged = DomainPolicy::clone(&current);
                merged.update(&policy);
                Arc::new(merged)
            }
            None => Arc::new(policy),
        };

        match (is_all, index) {
            (true, _) => state.default_domain = Some(stored),
            (false, Some(i)) => state.domains[i] = stored,
            (false, None) => state.domains.push(stored),
        }
    }

    /// The most specific url policy matching `url`, or the default.
    pub fn resolve_url(&self, url: &str) -> Option<Arc<UrlPolicy>> {
        let parts = UrlParts::parse(url);
        let state = self.state.read();

        let mut best: Option<&Arc<UrlPolicy>> = None;
        for policy in &state.urls {
            let Some(target) = policy.target() else {
                continue;
            };
            if !target.matches_parts(&parts) {
                continue;
            }
            let better = best
                .and_then(|b| b.target())
                .is_none_or(|current| target.specificity() > current.specificity());
            if better {
                best = Some(policy);
            }
        }

        let resolved = best.or(state.default_url.as_ref()).cloned();
        log::debug!(
            "profile {}: {url} -> {}",
            self.name,
            resolved
                .as_ref()
                .map_or_else(|| "pass through".to_string(), |p| p.command())
        );
        resolved
    }

    /// The best domain policy for `domain`: exact patterns beat wildcards,
    /// longer patterns beat shorter ones, then the `all` policy.
    pub fn resolve_domain(&self, domain: &str) -> Option<Arc<DomainPolicy>> {
        let state = self.state.read();

        let mut best: Option<(&Arc<DomainPolicy>, (bool, usize))> = None;
        for policy in &state.domains {
            let DomainTarget::Pattern(pattern) = policy.target() else {
                continue;
            };
            if !pattern.matches(domain) {
                continue;
            }
            let rank = (!pattern.is_wildcard(), pattern.as_str().len());
            if best.as_ref().is_none_or(|(_, current)| rank > *current) {
                best = Some((policy, rank));
            }
        }

        best.map(|(policy, _)| policy)
            .or(state.default_domain.as_ref())
            .cloned()
    }

    /// Whether a response resolved to `policy` should be swallowed.
    pub fn should_drop(&self, policy: &UrlPolicy) -> bool {
        let Some(drop) = policy.drop_policy() else {
            return false;
        };
        let key = policy.target().map_or(DEFAULT_KEY, UrlPattern::as_str);
        self.drops.should_drop(key, drop)
    }

    /// Url policies with the default first.
    pub fn url_policies(&self) -> Vec<Arc<UrlPolicy>> {
        let state = self.state.read();
        state
            .default_url
            .iter()
            .chain(state.urls.iter())
            .cloned()
            .collect()
    }

    /// Domain policies with the `all` policy first.
    pub fn domain_policies(&self) -> Vec<Arc<DomainPolicy>> {
        let state = self.state.read();
        state
            .default_domain
            .iter()
            .chain(state.domains.iter())
            .cloned()
            .collect()
    }

    /// Commands that rebuild this profile when applied in order.
    pub fn commands(&self) -> Vec<String> {
        let urls = self.url_policies().into_iter().map(|p| p.command());
        let domains = self.domain_policies().into_iter().map(|p| p.command());
        urls.chain(domains).collect()
    }
}

fn domain_key(name: &str) -> String {
    normalize_domain(name)
}

fn url_key(name: &str) -> Option<String> {
    UrlPattern::parse(name)
        .ok()
        .map(|pattern| pattern.as_str().to_string())
}
