use std::net::SocketAddr;

use regex::Regex;

use super::{
    model::{Describe, Policy},
    registry::Registry,
    tokens::{Tokens, quote},
};
use crate::{
    error::TamperError,
    value::{format_chunk_sizes, format_speed, parse_chunk_sizes, parse_speed},
};

/// Payload-free policies whose keyword is the whole value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Proxy,
    Cache,
    Block,
    Default,
    Null,
    Circular,
    Shuffle,
    Restart,
    Set,
    Update,
}

impl Marker {
    pub const ALL: [Marker; 10] = [
        Marker::Proxy,
        Marker::Cache,
        Marker::Block,
        Marker::Default,
        Marker::Null,
        Marker::Circular,
        Marker::Shuffle,
        Marker::Restart,
        Marker::Set,
        Marker::Update,
    ];

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.keyword() == keyword)
    }
}

impl Describe for Marker {
    fn keyword(&self) -> &'static str {
        match self {
            Marker::Proxy => "proxy",
            Marker::Cache => "cache",
            Marker::Block => "block",
            Marker::Default => "default",
            Marker::Null => "null",
            Marker::Circular => "circular",
            Marker::Shuffle => "shuffle",
            Marker::Restart => "restart",
            Marker::Set => "set",
            Marker::Update => "update",
        }
    }

    fn command(&self) -> String {
        self.keyword().to_string()
    }

    fn comment(&self) -> String {
        match self {
            Marker::Proxy => "proxy to the real server",
            Marker::Cache => "serve from cache",
            Marker::Block => "block",
            Marker::Default => "default behavior",
            Marker::Null => "answer with no address",
            Marker::Circular => "rotate through addresses",
            Marker::Shuffle => "shuffle addresses once",
            Marker::Restart => "restart",
            Marker::Set => "replace the whole policy",
            Marker::Update => "change only the given parts",
        }
        .to_string()
    }
}

pub(super) fn build_marker(
    _registry: &Registry,
    keyword: &str,
    _tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    Marker::from_keyword(keyword)
        .map(Policy::Marker)
        .ok_or_else(|| TamperError::UnknownKeyword {
            keyword: keyword.to_string(),
        })
}

/// What a boolean policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// `dont302` (true) / `do302` (false): whether redirects from upstream are followed by the proxy.
    Dont302,
    /// `disable304` (true) / `allow304` (false): whether conditional requests may yield 304.
    Disable304,
}

/// A boolean policy. Two keywords share one kind with opposite values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagPolicy {
    pub kind: FlagKind,
    pub value: bool,
    keyword: &'static str,
    description: &'static str,
}

impl FlagPolicy {
    pub fn new(kind: FlagKind, keyword: &'static str, value: bool, description: &'static str) -> Self {
        Self {
            kind,
            value,
            keyword,
            description,
        }
    }
}

impl Describe for FlagPolicy {
    fn keyword(&self) -> &'static str {
        self.keyword
    }

    fn command(&self) -> String {
        self.keyword.to_string()
    }

    fn comment(&self) -> String {
        self.description.to_string()
    }
}

/// Kinds of string-valued policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Host,
    ContentType,
    Redirect,
    Rewrite,
    TcpWrite,
    Restore,
    Plugin,
    RequestHeaders,
    ResponseHeaders,
}

impl TextKind {
    pub const ALL: [TextKind; 9] = [
        TextKind::Host,
        TextKind::ContentType,
        TextKind::Redirect,
        TextKind::Rewrite,
        TextKind::TcpWrite,
        TextKind::Restore,
        TextKind::Plugin,
        TextKind::RequestHeaders,
        TextKind::ResponseHeaders,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            TextKind::Host => "host",
            TextKind::ContentType => "content-type",
            TextKind::Redirect => "redirect",
            TextKind::Rewrite => "rewrite",
            TextKind::TcpWrite => "tcpwrite",
            TextKind::Restore => "restore",
            TextKind::Plugin => "plugin",
            TextKind::RequestHeaders => "request-headers",
            TextKind::ResponseHeaders => "response-headers",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    fn expected(self) -> &'static str {
        match self {
            TextKind::Host => "an ip:port address",
            TextKind::ContentType => "a content type",
            TextKind::Redirect => "a url",
            TextKind::Rewrite | TextKind::TcpWrite => "url-encoded content",
            TextKind::Restore => "a saved response id",
            TextKind::Plugin => "a plugin name",
            TextKind::RequestHeaders | TextKind::ResponseHeaders => "header settings",
        }
    }

    fn validate(self, value: &str) -> Result<(), String> {
        if value.is_empty() {
            return Err("value must not be empty".to_string());
        }
        if value.contains('"') {
            return Err("value must not contain double quotes".to_string());
        }
        match self {
            TextKind::Host => value
                .parse::<SocketAddr>()
                .map(|_| ())
                .map_err(|_| "expected ip:port".to_string()),
            TextKind::Rewrite | TextKind::TcpWrite => check_percent_escapes(value),
            _ => Ok(()),
        }
    }
}

fn check_percent_escapes(value: &str) -> Result<(), String> {
    let bytes = value.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' {
            let escape = bytes.get(index + 1..index + 3);
            match escape {
                Some(pair) if pair.iter().all(u8::is_ascii_hexdigit) => index += 3,
                _ => return Err(format!("malformed percent escape at byte {index}")),
            }
        } else {
            index += 1;
        }
    }
    Ok(())
}

/// A keyword with an opaque string payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPolicy {
    pub kind: TextKind,
    pub value: String,
}

impl TextPolicy {
    pub fn new(kind: TextKind, value: impl Into<String>) -> Result<Self, TamperError> {
        let value = value.into();
        kind.validate(&value)
            .map_err(|reason| TamperError::invalid(kind.keyword(), &value, reason))?;
        Ok(Self { kind, value })
    }

    /// Payload with percent escapes decoded. Only meaningful for `rewrite` and `tcpwrite`.
    pub fn decoded(&self) -> Vec<u8> {
        urlencoding::decode_binary(self.value.as_bytes()).into_owned()
    }
}

impl Describe for TextPolicy {
    fn keyword(&self) -> &'static str {
        self.kind.keyword()
    }

    fn command(&self) -> String {
        format!("{} {}", self.kind.keyword(), quote(&self.value))
    }

    fn comment(&self) -> String {
        let value = &self.value;
        match self.kind {
            TextKind::Host => format!("connect to {value}"),
            TextKind::ContentType => format!("content type {value}"),
            TextKind::Redirect => format!("redirect to {value}"),
            TextKind::Rewrite => format!("respond with fixed content ({} bytes)", self.decoded().len()),
            TextKind::TcpWrite => format!("write raw bytes ({} bytes)", self.decoded().len()),
            TextKind::Restore => format!("restore saved response {value}"),
            TextKind::Plugin => format!("hand off to plugin {value}"),
            TextKind::RequestHeaders => format!("request headers {value}"),
            TextKind::ResponseHeaders => format!("response headers {value}"),
        }
    }
}

pub(super) fn build_text(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let kind = TextKind::from_keyword(keyword).ok_or_else(|| TamperError::UnknownKeyword {
        keyword: keyword.to_string(),
    })?;
    let value = tokens.expect(keyword, kind.expected())?;
    TextPolicy::new(kind, value).map(Policy::Text)
}

#[derive(Debug, Clone)]
pub enum MapTarget {
    /// `map <url>`
    Url(String),
    /// `map replace /<regex>/<replacement>/`
    Replace {
        raw: String,
        regex: Regex,
        replacement: String,
    },
}

/// Serve the response of another resource.
#[derive(Debug, Clone)]
pub struct MapPolicy {
    pub target: MapTarget,
}

impl MapPolicy {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            target: MapTarget::Url(url.into()),
        }
    }

    pub fn replace(raw: &str) -> Result<Self, TamperError> {
        let (expression, replacement) = split_replace(raw)
            .ok_or_else(|| TamperError::invalid("map", raw, "expected /<regex>/<replacement>/"))?;
        let regex =
            Regex::new(&expression).map_err(|err| TamperError::invalid("map", raw, err.to_string()))?;
        Ok(Self {
            target: MapTarget::Replace {
                raw: raw.to_string(),
                regex,
                replacement,
            },
        })
    }

    /// URL to fetch instead of `url`.
    pub fn apply(&self, url: &str) -> String {
        match &self.target {
            MapTarget::Url(target) => target.clone(),
            MapTarget::Replace {
                regex, replacement, ..
            } => regex.replace_all(url, replacement.as_str()).into_owned(),
        }
    }
}

/// Split `/<regex>/<replacement>/` at the first unescaped slash. `\/` in the regex is a literal slash.
fn split_replace(raw: &str) -> Option<(String, String)> {
    if raw.len() < 2 || !raw.starts_with('/') || !raw.ends_with('/') {
        return None;
    }
    let body = &raw[1..raw.len() - 1];

    let mut escaped = false;
    for (index, ch) in body.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '/' if !escaped => {
                let expression = body[..index].replace("\\/", "/");
                let replacement = body[index + 1..].to_string();
                return Some((expression, replacement));
            }
            _ => escaped = false,
        }
    }
    None
}

impl Describe for MapPolicy {
    fn keyword(&self) -> &'static str {
        "map"
    }

    fn command(&self) -> String {
        match &self.target {
            MapTarget::Url(url) => format!("map {}", quote(url)),
            MapTarget::Replace { raw, .. } => format!("map replace {}", quote(raw)),
        }
    }

    fn comment(&self) -> String {
        match &self.target {
            MapTarget::Url(url) => format!("map to {url}"),
            MapTarget::Replace {
                regex, replacement, ..
            } => format!("map by replacing /{}/ with {replacement}", regex.as_str()),
        }
    }
}

pub(super) fn build_map(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let target = tokens.expect(keyword, "a url or `replace /<regex>/<replacement>/`")?;
    if target == "replace" {
        let raw = tokens.expect(keyword, "/<regex>/<replacement>/")?;
        return MapPolicy::replace(&raw).map(Policy::Map);
    }
    if target.contains('"') {
        return Err(TamperError::invalid(keyword, &target, "url must not contain double quotes"));
    }
    Ok(Policy::Map(MapPolicy::url(target)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkedMode {
    /// Keep whatever framing upstream used.
    Default,
    On,
    Off,
    /// Split the body into this many chunks.
    Blocks(usize),
    /// Emit chunks of these sizes in turn.
    Sizes(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedPolicy {
    pub mode: ChunkedMode,
}

impl Describe for ChunkedPolicy {
    fn keyword(&self) -> &'static str {
        "chunked"
    }

    fn command(&self) -> String {
        match &self.mode {
            ChunkedMode::Default => "chunked default".to_string(),
            ChunkedMode::On => "chunked".to_string(),
            ChunkedMode::Off => "chunked off".to_string(),
            ChunkedMode::Blocks(count) => format!("chunked block {count}"),
            ChunkedMode::Sizes(sizes) => format!("chunked size {}", format_chunk_sizes(sizes)),
        }
    }

    fn comment(&self) -> String {
        match &self.mode {
            ChunkedMode::Default => "keep upstream framing".to_string(),
            ChunkedMode::On => "force chunked encoding".to_string(),
            ChunkedMode::Off => "disable chunked encoding".to_string(),
            ChunkedMode::Blocks(count) => format!("split body into {count} chunks"),
            ChunkedMode::Sizes(sizes) => {
                format!("send chunks of {} bytes", format_chunk_sizes(sizes))
            }
        }
    }
}

pub(super) fn build_chunked(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let mode = match tokens.peek() {
        Some("default") => {
            tokens.next_token();
            ChunkedMode::Default
        }
        Some("on") => {
            tokens.next_token();
            ChunkedMode::On
        }
        Some("off") => {
            tokens.next_token();
            ChunkedMode::Off
        }
        Some("block") => {
            tokens.next_token();
            let raw = tokens.expect(keyword, "a block count")?;
            let count = raw
                .parse::<i64>()
                .map_err(|_| TamperError::invalid(keyword, &raw, "block count must be an integer"))?;
            if count <= 0 {
                return Err(TamperError::out_of_range(keyword, &raw, "block count must be positive"));
            }
            let count = usize::try_from(count)
                .map_err(|_| TamperError::out_of_range(keyword, &raw, "block count is too large"))?;
            ChunkedMode::Blocks(count)
        }
        Some("size") => {
            tokens.next_token();
            let raw = tokens.expect(keyword, "a comma separated size list")?;
            let sizes =
                parse_chunk_sizes(&raw).map_err(|reason| TamperError::invalid(keyword, &raw, reason))?;
            ChunkedMode::Sizes(sizes)
        }
        _ => ChunkedMode::On,
    };
    Ok(Policy::Chunked(ChunkedPolicy { mode }))
}

/// Slowest accepted rate.
pub const MIN_BYTES_PER_SEC: f64 = 1.0;

/// Bandwidth limit in bytes per second.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedPolicy {
    pub bytes_per_sec: f64,
}

impl Describe for SpeedPolicy {
    fn keyword(&self) -> &'static str {
        "speed"
    }

    fn command(&self) -> String {
        format!("speed {}", format_speed(self.bytes_per_sec))
    }

    fn comment(&self) -> String {
        format!("limit speed to {}", format_speed(self.bytes_per_sec))
    }
}

pub(super) fn build_speed(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let raw = tokens.expect(keyword, "a rate like 1KB/s")?;
    let bytes_per_sec = parse_speed(&raw).map_err(|reason| TamperError::invalid(keyword, &raw, reason))?;
    if bytes_per_sec < MIN_BYTES_PER_SEC {
        return Err(TamperError::out_of_range(keyword, &raw, "rate must be at least 1B/s"));
    }
    Ok(Policy::Speed(SpeedPolicy { bytes_per_sec }))
}

/// Forced HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    pub code: u16,
}

impl Describe for StatusPolicy {
    fn keyword(&self) -> &'static str {
        "status"
    }

    fn command(&self) -> String {
        format!("status {}", self.code)
    }

    fn comment(&self) -> String {
        format!("respond with status {}", self.code)
    }
}

pub(super) fn build_status(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let raw = tokens.expect(keyword, "a status code")?;
    let code = raw
        .parse::<i64>()
        .map_err(|_| TamperError::invalid(keyword, &raw, "status code must be an integer"))?;
    if !(100..=999).contains(&code) {
        return Err(TamperError::out_of_range(keyword, &raw, "status code must be within 100-999"));
    }
    Ok(Policy::Status(StatusPolicy { code: code as u16 }))
}

/// Upper bound on the number of addresses handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NPolicy {
    pub n: usize,
}

impl Describe for NPolicy {
    fn keyword(&self) -> &'static str {
        "n"
    }

    fn command(&self) -> String {
        format!("n {}", self.n)
    }

    fn comment(&self) -> String {
        format!("answer at most {} addresses", self.n)
    }
}

pub(super) fn build_n(
    _registry: &Registry,
    keyword: &str,
    tokens: &mut Tokens,
) -> Result<Policy, TamperError> {
    let raw = tokens.expect(keyword, "a count")?;
    let n = raw
        .parse::<i64>()
        .map_err(|_| TamperError::invalid(keyword, &raw, "count must be an integer"))?;
    if n < 0 {
        return Err(TamperError::out_of_range(keyword, &raw, "count must not be negative"));
    }
    Ok(Policy::N(NPolicy { n: n as usize }))
}

/// `all` or one named target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    All,
    Named(String),
}

impl Target {
    pub fn parse(token: String) -> Self {
        if token == "all" {
            Target::All
        } else {
            Target::Named(token)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Target::All => "all",
            Target::Named(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Url,
    Domain,
}

impl Scope {
    pub fn keyword(self) -> &'static str {
        match self {
            Scope::Url => "url",
            Scope::Domain => "domain",
        }
    }
}

/// `url delete <target|all>` / `domain delete <target|all>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePolicy {
    pub scope: Scope,
    pub target: Target,
}

impl DeletePolicy {
    pub(super) fn parse(scope: Scope, tokens: &mut Tokens) -> Result<Self, TamperError> {
        let expected = match scope {
            Scope::Url => "a url pattern or all",
            Scope::Domain => "a domain or all",
        };
        let token = tokens.expect(scope.keyword(), expected)?;
        Ok(Self {
            scope,
            target: Target::parse(token),
        })
    }
}

impl Describe for DeletePolicy {
    fn keyword(&self) -> &'static str {
        self.scope.keyword()
    }

    fn command(&self) -> String {
        format!("{} delete {}", self.scope.keyword(), quote(self.target.as_str()))
    }

    fn comment(&self) -> String {
        match &self.target {
            Target::All => format!("delete every {} policy", self.scope.keyword()),
            Target::Named(name) => format!("delete the {} policy for {name}", self.scope.keyword()),
        }
    }
}
