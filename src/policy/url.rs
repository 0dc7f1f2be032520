use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use super::{
    delay::{DelayKind, DelayPolicy},
    leaf::{
        ChunkedPolicy, DeletePolicy, FlagKind, FlagPolicy, MapPolicy, Marker, Scope, SpeedPolicy,
        StatusPolicy, Target, TextKind, TextPolicy,
    },
    model::{Describe, Policy},
    registry::Registry,
    tokens::{Tokens, quote},
};
use crate::{error::TamperError, pattern::UrlPattern};

/// Keywords a `url` command accepts before its target pattern.
pub const URL_KEYWORDS: &[&str] = &[
    "set",
    "update",
    "drop",
    "delay",
    "timeout",
    "proxy",
    "cache",
    "status",
    "map",
    "redirect",
    "rewrite",
    "restore",
    "tcpwrite",
    "chunked",
    "speed",
    "dont302",
    "do302",
    "disable304",
    "allow304",
    "content-type",
    "request-headers",
    "response-headers",
    "host",
    "plugin",
];

/// How a reissued command merges into an existing policy for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlMode {
    /// Replace every slot; slots the command leaves out are cleared.
    Set,
    /// Overwrite only the slots the command names.
    Update,
}

impl UrlMode {
    fn marker(self) -> Marker {
        match self {
            UrlMode::Set => Marker::Set,
            UrlMode::Update => Marker::Update,
        }
    }
}

/// Keys of the independent sub-policies, in serialization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubKey {
    Chunked,
    Speed,
    Dont302,
    Disable304,
    ContentType,
    RequestHeaders,
    ResponseHeaders,
    Host,
    Plugin,
}

impl SubKey {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let key = match keyword {
            "chunked" => SubKey::Chunked,
            "speed" => SubKey::Speed,
            "dont302" | "do302" => SubKey::Dont302,
            "disable304" | "allow304" => SubKey::Disable304,
            "content-type" => SubKey::ContentType,
            "request-headers" => SubKey::RequestHeaders,
            "response-headers" => SubKey::ResponseHeaders,
            "host" => SubKey::Host,
            "plugin" => SubKey::Plugin,
            _ => return None,
        };
        Some(key)
    }

    fn text_kind(self) -> Option<TextKind> {
        match self {
            SubKey::ContentType => Some(TextKind::ContentType),
            SubKey::RequestHeaders => Some(TextKind::RequestHeaders),
            SubKey::ResponseHeaders => Some(TextKind::ResponseHeaders),
            SubKey::Host => Some(TextKind::Host),
            SubKey::Plugin => Some(TextKind::Plugin),
            SubKey::Chunked | SubKey::Speed | SubKey::Dont302 | SubKey::Disable304 => None,
        }
    }
}

/// Occupant of the exclusive content slot.
#[derive(Debug, Clone)]
pub enum ContentPolicy {
    Proxy,
    Cache,
    Status(StatusPolicy),
    Map(MapPolicy),
    /// `redirect`, `rewrite`, `restore` or `tcpwrite`.
    Text(TextPolicy),
}

impl Describe for ContentPolicy {
    fn keyword(&self) -> &'static str {
        match self {
            ContentPolicy::Proxy => Marker::Proxy.keyword(),
            ContentPolicy::Cache => Marker::Cache.keyword(),
            ContentPolicy::Status(p) => p.keyword(),
            ContentPolicy::Map(p) => p.keyword(),
            ContentPolicy::Text(p) => p.keyword(),
        }
    }

    fn command(&self) -> String {
        match self {
            ContentPolicy::Proxy => Marker::Proxy.command(),
            ContentPolicy::Cache => Marker::Cache.command(),
            ContentPolicy::Status(p) => p.command(),
            ContentPolicy::Map(p) => p.command(),
            ContentPolicy::Text(p) => p.command(),
        }
    }

    fn comment(&self) -> String {
        match self {
            ContentPolicy::Proxy => Marker::Proxy.comment(),
            ContentPolicy::Cache => Marker::Cache.comment(),
            ContentPolicy::Status(p) => p.comment(),
            ContentPolicy::Map(p) => p.comment(),
            ContentPolicy::Text(p) => p.comment(),
        }
    }
}

/// An independent sub-policy, keyed by [`SubKey`].
#[derive(Debug, Clone)]
pub enum SubPolicy {
    Chunked(ChunkedPolicy),
    Speed(SpeedPolicy),
    Flag(FlagPolicy),
    Text(TextPolicy),
}

impl Describe for SubPolicy {
    fn keyword(&self) -> &'static str {
        match self {
            SubPolicy::Chunked(p) => p.keyword(),
            SubPolicy::Speed(p) => p.keyword(),
            SubPolicy::Flag(p) => p.keyword(),
            SubPolicy::Text(p) => p.keyword(),
        }
    }

    fn command(&self) -> String {
        match self {
            SubPolicy::Chunked(p) => p.command(),
            SubPolicy::Speed(p) => p.command(),
            SubPolicy::Flag(p) => p.command(),
            SubPolicy::Text(p) => p.command(),
        }
    }

    fn comment(&self) -> String {
        match self {
            SubPolicy::Chunked(p) => p.comment(),
            SubPolicy::Speed(p) => p.comment(),
            SubPolicy::Flag(p) => p.comment(),
            SubPolicy::Text(p) => p.comment(),
        }
    }
}

/// Addressable parts of a [`UrlPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSlot {
    Delay,
    Body,
    Content,
    Sub(SubKey),
}

impl UrlSlot {
    /// Slot a `url remove <keyword>` refers to.
    pub fn for_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "drop" | "delay" | "timeout" => Some(UrlSlot::Delay),
            "body" => Some(UrlSlot::Body),
            "proxy" | "cache" | "status" | "map" | "redirect" | "rewrite" | "restore"
            | "tcpwrite" => Some(UrlSlot::Content),
            other => SubKey::from_keyword(other).map(UrlSlot::Sub),
        }
    }
}

enum UrlPart {
    Mode(UrlMode),
    Delay(DelayPolicy),
    Body(DelayPolicy),
    Content(ContentPolicy),
    Sub(SubKey, SubPolicy),
}

/// Sort a sub-policy built for a `url` keyword into its slot.
fn classify(policy: Policy) -> Result<UrlPart, TamperError> {
    let part = match policy {
        Policy::Marker(Marker::Set) => UrlPart::Mode(UrlMode::Set),
        Policy::Marker(Marker::Update) => UrlPart::Mode(UrlMode::Update),
        Policy::Marker(Marker::Proxy) => UrlPart::Content(ContentPolicy::Proxy),
        Policy::Marker(Marker::Cache) => UrlPart::Content(ContentPolicy::Cache),
        Policy::Delay(delay) if delay.body => UrlPart::Body(delay),
        Policy::Delay(delay) => UrlPart::Delay(delay),
        Policy::Status(status) => UrlPart::Content(ContentPolicy::Status(status)),
        Policy::Map(map) => UrlPart::Content(ContentPolicy::Map(map)),
        Policy::Text(text) => match text.kind {
            TextKind::Redirect | TextKind::Rewrite | TextKind::Restore | TextKind::TcpWrite => {
                UrlPart::Content(ContentPolicy::Text(text))
            }
            TextKind::ContentType => UrlPart::Sub(SubKey::ContentType, SubPolicy::Text(text)),
            TextKind::RequestHeaders => {
                UrlPart::Sub(SubKey::RequestHeaders, SubPolicy::Text(text))
            }
            TextKind::ResponseHeaders => {
                UrlPart::Sub(SubKey::ResponseHeaders, SubPolicy::Text(text))
            }
            TextKind::Host => UrlPart::Sub(SubKey::Host, SubPolicy::Text(text)),
            TextKind::Plugin => UrlPart::Sub(SubKey::Plugin, SubPolicy::Text(text)),
        },
        Policy::Flag(flag) => {
            let key = match flag.kind {
                FlagKind::Dont302 => SubKey::Dont302,
                FlagKind::Disable304 => SubKey::Disable304,
            };
            UrlPart::Sub(key, SubPolicy::Flag(flag))
        }
        Policy::Chunked(chunked) => UrlPart::Sub(SubKey::Chunked, SubPolicy::Chunked(chunked)),
        Policy::Speed(speed) => UrlPart::Sub(SubKey::Speed, SubPolicy::Speed(speed)),
        other => {
            return Err(TamperError::internal(format!(
                "'{}' reached the url slot classifier",
                other.command()
            )));
        }
    };
    Ok(part)
}

/// Per-target HTTP policy.
///
/// Holds at most one occupant per exclusive slot (delay, body, content) plus
/// independent sub-policies. Unset slots fall back to the linked default
/// policy, recursively.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    mode: Option<UrlMode>,
    delay: Option<DelayPolicy>,
    body: Option<DelayPolicy>,
    content: Option<ContentPolicy>,
    subs: BTreeMap<SubKey, SubPolicy>,
    target: Option<UrlPattern>,
    default: Option<Arc<UrlPolicy>>,
}

impl UrlPolicy {
    /// Parse the part of a url command after the `url` keyword.
    pub fn parse(registry: &Registry, tokens: &mut Tokens) -> Result<Self, TamperError> {
        let mut policy = UrlPolicy::default();

        while let Some(token) = tokens.peek() {
            if !URL_KEYWORDS.contains(&token) {
                break;
            }
            let part = classify(registry.build(tokens)?)?;
            policy.place(part)?;
        }

        if let Some(target) = tokens.next_token() {
            policy.target = Some(UrlPattern::parse(&target)?);
        }
        tokens.finish("url")?;
        Ok(policy)
    }

    fn place(&mut self, part: UrlPart) -> Result<(), TamperError> {
        fn fill<T: Describe>(
            slot: &mut Option<T>,
            name: &'static str,
            value: T,
        ) -> Result<(), TamperError> {
            if let Some(first) = slot {
                return Err(TamperError::Conflict {
                    slot: name,
                    first: first.command(),
                    second: value.command(),
                });
            }
            *slot = Some(value);
            Ok(())
        }

        match part {
            UrlPart::Mode(mode) => {
                if let Some(first) = self.mode {
                    return Err(TamperError::Conflict {
                        slot: "mode",
                        first: first.marker().command(),
                        second: mode.marker().command(),
                    });
                }
                self.mode = Some(mode);
                Ok(())
            }
            UrlPart::Delay(delay) => fill(&mut self.delay, "delay", delay),
            UrlPart::Body(body) => fill(&mut self.body, "body", body),
            UrlPart::Content(content) => fill(&mut self.content, "content", content),
            UrlPart::Sub(key, sub) => {
                self.subs.insert(key, sub);
                Ok(())
            }
        }
    }

    /// Merge a reissued command for the same target into this policy.
    ///
    /// `set` (or no mode) replaces every slot; `update` only overwrites the
    /// slots `other` carries.
    pub fn update(&mut self, other: &UrlPolicy) {
        match other.mode.unwrap_or(UrlMode::Set) {
            UrlMode::Set => {
                self.delay = other.delay.clone();
                self.body = other.body.clone();
                self.content = other.content.clone();
                self.subs = other.subs.clone();
            }
            UrlMode::Update => {
                if let Some(delay) = &other.delay {
                    self.delay = Some(delay.clone());
                }
                if let Some(body) = &other.body {
                    self.body = Some(body.clone());
                }
                if let Some(content) = &other.content {
                    self.content = Some(content.clone());
                }
                for (key, sub) in &other.subs {
                    self.subs.insert(*key, sub.clone());
                }
            }
        }
    }

    /// Clear one slot. Returns whether anything was set.
    pub fn remove(&mut self, slot: UrlSlot) -> bool {
        match slot {
            UrlSlot::Delay => self.delay.take().is_some(),
            UrlSlot::Body => self.body.take().is_some(),
            UrlSlot::Content => self.content.take().is_some(),
            UrlSlot::Sub(key) => self.subs.remove(&key).is_some(),
        }
    }

    pub fn mode(&self) -> Option<UrlMode> {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Option<UrlMode>) {
        self.mode = mode;
    }

    pub fn target(&self) -> Option<&UrlPattern> {
        self.target.as_ref()
    }

    /// Whether this is the catch-all policy of a profile.
    pub fn is_default(&self) -> bool {
        self.target.is_none()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.target.as_ref().is_none_or(|target| target.matches(url))
    }

    pub fn default_policy(&self) -> Option<&Arc<UrlPolicy>> {
        self.default.as_ref()
    }

    pub fn set_default(&mut self, default: Option<Arc<UrlPolicy>>) {
        self.default = default;
    }

    fn inherited(&self) -> Option<&UrlPolicy> {
        self.default.as_deref()
    }

    /// Effective non-body delay-family policy.
    pub fn delay_policy(&self) -> Option<&DelayPolicy> {
        self.delay
            .as_ref()
            .or_else(|| self.inherited().and_then(UrlPolicy::delay_policy))
    }

    /// Effective body delay-family policy.
    pub fn body_policy(&self) -> Option<&DelayPolicy> {
        self.body
            .as_ref()
            .or_else(|| self.inherited().and_then(UrlPolicy::body_policy))
    }

    /// Effective content policy.
    pub fn content_policy(&self) -> Option<&ContentPolicy> {
        self.content
            .as_ref()
            .or_else(|| self.inherited().and_then(UrlPolicy::content_policy))
    }

    /// Effective sub-policy for `key`.
    pub fn sub(&self, key: SubKey) -> Option<&SubPolicy> {
        self.subs
            .get(&key)
            .or_else(|| self.inherited().and_then(|d| d.sub(key)))
    }

    fn effective_keys(&self) -> BTreeSet<SubKey> {
        let mut keys: BTreeSet<SubKey> = self.subs.keys().copied().collect();
        if let Some(default) = self.inherited() {
            keys.extend(default.effective_keys());
        }
        keys
    }

    pub fn speed(&self) -> Option<f64> {
        match self.sub(SubKey::Speed) {
            Some(SubPolicy::Speed(speed)) => Some(speed.bytes_per_sec),
            _ => None,
        }
    }

    pub fn chunked(&self) -> Option<&ChunkedPolicy> {
        match self.sub(SubKey::Chunked) {
            Some(SubPolicy::Chunked(chunked)) => Some(chunked),
            _ => None,
        }
    }

    fn flag(&self, key: SubKey) -> Option<bool> {
        match self.sub(key) {
            Some(SubPolicy::Flag(flag)) => Some(flag.value),
            _ => None,
        }
    }

    /// `Some(true)` for `dont302`, `Some(false)` for `do302`.
    pub fn dont302(&self) -> Option<bool> {
        self.flag(SubKey::Dont302)
    }

    /// `Some(true)` for `disable304`, `Some(false)` for `allow304`.
    pub fn disable304(&self) -> Option<bool> {
        self.flag(SubKey::Disable304)
    }

    /// Effective value of a string-valued sub-policy such as `host` or `content-type`.
    pub fn text(&self, key: SubKey) -> Option<&str> {
        key.text_kind()?;
        match self.sub(key) {
            Some(SubPolicy::Text(text)) => Some(text.value.as_str()),
            _ => None,
        }
    }

    pub fn drop_policy(&self) -> Option<&DelayPolicy> {
        self.delay_policy()
            .filter(|p| p.kind == DelayKind::Drop)
            .or_else(|| self.body_policy().filter(|p| p.kind == DelayKind::Drop))
    }
}

fn push_slot<T: Describe>(parts: &mut Vec<String>, local: Option<&T>, effective: Option<&T>) {
    match (local, effective) {
        (Some(local), _) => parts.push(local.comment()),
        (None, Some(inherited)) => parts.push(format!("[default: {}]", inherited.comment())),
        (None, None) => {}
    }
}

impl Describe for UrlPolicy {
    fn keyword(&self) -> &'static str {
        "url"
    }

    fn command(&self) -> String {
        let mut parts = vec!["url".to_string()];
        if let Some(mode) = self.mode {
            parts.push(mode.marker().command());
        }
        if let Some(delay) = &self.delay {
            parts.push(delay.command());
        }
        if let Some(body) = &self.body {
            parts.push(body.command());
        }
        if let Some(content) = &self.content {
            parts.push(content.command());
        }
        parts.extend(self.subs.values().map(Describe::command));
        if let Some(target) = &self.target {
            parts.push(quote(target.as_str()).into_owned());
        }
        parts.join(" ")
    }

    fn comment(&self) -> String {
        let mut parts = Vec::new();
        push_slot(&mut parts, self.delay.as_ref(), self.delay_policy());
        push_slot(&mut parts, self.body.as_ref(), self.body_policy());
        push_slot(&mut parts, self.content.as_ref(), self.content_policy());
        for key in self.effective_keys() {
            push_slot(&mut parts, self.subs.get(&key), self.sub(key));
        }

        let label = self.target.as_ref().map_or("default", UrlPattern::as_str);
        if parts.is_empty() {
            format!("{label}: pass through")
        } else {
            format!("{label}: {}", parts.join("; "))
        }
    }
}

/// `url remove <keyword> <url-pattern|all>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovePolicy {
    pub keyword: String,
    pub slot: UrlSlot,
    pub target: Target,
}

impl RemovePolicy {
    fn parse(tokens: &mut Tokens) -> Result<Self, TamperError> {
        let keyword = tokens.expect("url", "a keyword to remove")?;
        let slot = UrlSlot::for_keyword(&keyword).ok_or_else(|| TamperError::UnknownKeyword {
            keyword: keyword.clone(),
        })?;
        let target = Target::parse(tokens.expect("url", "a url pattern or all")?);
        if let Target::Named(pattern) = &target {
            UrlPattern::parse(pattern)?;
        }
        Ok(Self {
            keyword,
            slot,
            target,
        })
    }
}

impl Describe for RemovePolicy {
    fn keyword(&self) -> &'static str {
        "url"
    }

    fn command(&self) -> String {
        format!("url remove {} {}", self.keyword, quote(self.target.as_str()))
    }

    fn comment(&self) -> String {
        match &self.target {
            Target::All => format!("remove {} from every url policy", self.keyword),
            Target::Named(name) => format!("remove {} from {name}", self.keyword),
        }
    }
}

pub(super) fn build_url(
    registry: &Registry,
    _keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    match tokens.peek() {
        Some("remove") => {
            tokens.next_token();
            RemovePolicy::parse(tokens).map(Policy::Remove)
        }
        Some("delete") => {
            tokens.next_token();
            DeletePolicy::parse(Scope::Url, tokens).map(Policy::Delete)
        }
        _ => UrlPolicy::parse(registry, tokens).map(Policy::Url),
    }
}
