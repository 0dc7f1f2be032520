use std::fmt;

use super::domain::DomainPattern;
use crate::error::TamperError;

/// A URL split into the pieces the matcher compares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParts {
    pub domain: Option<String>,
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl UrlParts {
    /// Split `[http://]domain[/path][?query]` at the first `/` and `?`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let rest = input.strip_prefix("http://").unwrap_or(input);

        let domain_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let (domain, rest) = rest.split_at(domain_end);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        Self {
            domain: (!domain.is_empty()).then(|| domain.to_string()),
            path: path.to_string(),
            query: parse_query(query),
        }
    }
}

/// Split a query into unescaped key/value pairs.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (unescape(key), unescape(value)),
            None => (unescape(pair), String::new()),
        })
        .collect()
}

/// Percent-decode a query component, reading `+` as a space.
///
/// Escapes that do not decode to UTF-8 are kept as written.
fn unescape(component: &str) -> String {
    let spaced = component.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Compiled URL pattern: optional domain pattern, literal path prefix and a required query subset.
///
/// Path matching is a plain string prefix: `/api` also matches `/apis`.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    domain: Option<DomainPattern>,
    path: String,
    query: Vec<(String, String)>,
}

impl UrlPattern {
    pub fn parse(pattern: &str) -> Result<Self, TamperError> {
        if pattern.trim().is_empty() {
            return Err(TamperError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty url pattern".to_string(),
            });
        }

        let parts = UrlParts::parse(pattern);
        let domain = parts
            .domain
            .as_deref()
            .map(DomainPattern::parse)
            .transpose()?;

        Ok(Self {
            raw: pattern.to_string(),
            domain,
            path: parts.path,
            query: parts.query,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.matches_parts(&UrlParts::parse(candidate))
    }

    pub fn matches_parts(&self, candidate: &UrlParts) -> bool {
        if let Some(domain) = &self.domain {
            match &candidate.domain {
                Some(candidate_domain) if domain.matches(candidate_domain) => {}
                _ => return false,
            }
        }

        let path = if candidate.path.is_empty() {
            "/"
        } else {
            candidate.path.as_str()
        };
        if !path.starts_with(&self.path) {
            return false;
        }

        self.query
            .iter()
            .all(|required| candidate.query.iter().any(|pair| pair == required))
    }

    /// Ordering key used to pick the best of several matching patterns.
    pub fn specificity(&self) -> (bool, bool, usize, usize) {
        (
            self.domain.is_some(),
            self.domain.as_ref().is_some_and(|d| !d.is_wildcard()),
            self.path.len(),
            self.query.len(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
