use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;

use super::{
    delay::build_delay,
    domain::build_domain,
    leaf::{
        FlagKind, FlagPolicy, Marker, TextKind, build_chunked, build_map, build_marker, build_n,
        build_speed, build_status, build_text,
    },
    model::{Describe, Policy},
    tokens::Tokens,
    url::{UrlPolicy, build_url},
};
use crate::error::TamperError;

/// Builds a policy for `keyword`, consuming its arguments from the cursor.
pub type Builder =
    Arc<dyn Fn(&Registry, &str, &mut Tokens) -> Result<Policy, TamperError> + Send + Sync>;

/// Keyword to builder table.
///
/// Written while the process starts and read concurrently afterwards.
pub struct Registry {
    builders: RwLock<HashMap<String, Builder>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keywords: Vec<String> = self.builders.read().keys().cloned().collect();
        keywords.sort();
        f.debug_struct("Registry").field("keywords", &keywords).finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Registry {
    /// Create a registry with no keywords.
    pub fn empty() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry holding every keyword of the command language.
    pub fn with_defaults() -> Self {
        let registry = Self::empty();

        for marker in Marker::ALL {
            registry.register(marker.keyword(), build_marker);
        }
        registry.register_flag("dont302", FlagKind::Dont302, true, "do not follow 302 redirects");
        registry.register_flag("do302", FlagKind::Dont302, false, "follow 302 redirects");
        registry.register_flag("disable304", FlagKind::Disable304, true, "never answer 304");
        registry.register_flag("allow304", FlagKind::Disable304, false, "allow 304 answers");
        for kind in TextKind::ALL {
            registry.register(kind.keyword(), build_text);
        }
        registry.register("map", build_map);
        registry.register("chunked", build_chunked);
        registry.register("speed", build_speed);
        registry.register("status", build_status);
        registry.register("n", build_n);
        for keyword in ["drop", "delay", "timeout"] {
            registry.register(keyword, build_delay);
        }
        registry.register("url", build_url);
        registry.register("domain", build_domain);

        registry
    }

    /// Install a builder, replacing any previous one for the keyword.
    pub fn register<F>(&self, keyword: &str, builder: F)
    where
        F: Fn(&Registry, &str, &mut Tokens) -> Result<Policy, TamperError> + Send + Sync + 'static,
    {
        self.builders
            .write()
            .insert(keyword.to_string(), Arc::new(builder));
    }

    /// Install a boolean keyword whose value and description are fixed here.
    pub fn register_flag(
        &self,
        keyword: &'static str,
        kind: FlagKind,
        value: bool,
        description: &'static str,
    ) {
        self.register(keyword, move |_, _, _| {
            Ok(Policy::Flag(FlagPolicy::new(kind, keyword, value, description)))
        });
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.builders.read().contains_key(keyword)
    }

    /// Build the policy named by the next token, leaving unconsumed tokens in place.
    pub fn build(&self, tokens: &mut Tokens) -> Result<Policy, TamperError> {
        let keyword = tokens.next_token().ok_or(TamperError::EmptyCommand)?;
        // Clone the builder out so the lock is not held while it runs; builders recurse.
        let builder = self
            .builders
            .read()
            .get(&keyword)
            .cloned()
            .ok_or_else(|| TamperError::UnknownKeyword {
                keyword: keyword.clone(),
            })?;
        builder(self, &keyword, tokens)
    }

    /// Parse a whole command. Leftover tokens are an error.
    pub fn factory(&self, command: &str) -> Result<Policy, TamperError> {
        let mut tokens = Tokens::parse(command);
        if tokens.is_empty() {
            return Err(TamperError::EmptyCommand);
        }
        let policy = self.build(&mut tokens)?;
        tokens.finish(policy.keyword())?;
        log::debug!("parsed '{command}' as '{}'", policy.command());
        Ok(policy)
    }

    /// Parse a url command. The leading `url` keyword may be omitted.
    pub fn factory_url(&self, command: &str) -> Result<UrlPolicy, TamperError> {
        let mut tokens = Tokens::parse(command);
        if tokens.peek() != Some("url") {
            let mut items = vec!["url".to_string()];
            items.extend(tokens.remaining().iter().cloned());
            tokens = Tokens::new(items);
        }

        let policy = self.build(&mut tokens)?;
        tokens.finish("url")?;
        match policy {
            Policy::Url(url) => Ok(url),
            other => Err(TamperError::NotApplicable {
                keyword: other.command(),
            }),
        }
    }
}
