use std::fmt;

use regex::Regex;

use crate::error::TamperError;

/// Lowercase a domain and strip a trailing root dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Plain domain compared for equality.
    Exact(String),
    /// Pattern containing `*`, compiled to an anchored expression.
    Wildcard(Regex),
}

/// Compiled domain pattern such as `g.cn`, `*.domain.com`, `domain.*` or `cdn*.domain.com`.
#[derive(Debug, Clone)]
pub struct DomainPattern {
    raw: String,
    matcher: Matcher,
}

impl DomainPattern {
    pub fn parse(pattern: &str) -> Result<Self, TamperError> {
        let normalized = normalize_domain(pattern);
        if normalized.is_empty() {
            return Err(TamperError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty domain".to_string(),
            });
        }

        if !normalized.contains('*') {
            return Ok(Self {
                raw: pattern.to_string(),
                matcher: Matcher::Exact(normalized),
            });
        }

        let expression = wildcard_expression(&normalized);
        let regex = Regex::new(&expression).map_err(|err| TamperError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            matcher: Matcher::Wildcard(regex),
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = normalize_domain(candidate);
        match &self.matcher {
            Matcher::Exact(domain) => *domain == candidate,
            Matcher::Wildcard(regex) => regex.is_match(&candidate),
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.matcher, Matcher::Wildcard(_))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Translate a wildcard domain into an anchored expression, label by label.
///
/// A leading `*` label matches zero or more labels, a middle one one or more,
/// a trailing one exactly one label. A `*` inside a label matches any run of
/// non-dot characters.
fn wildcard_expression(pattern: &str) -> String {
    if pattern == "*" {
        return "^.*$".to_string();
    }

    let labels: Vec<&str> = pattern.split('.').collect();
    let last = labels.len() - 1;
    let mut expression = String::from("^");

    for (index, label) in labels.iter().enumerate() {
        if *label == "*" {
            if index == 0 {
                expression.push_str(r"(?:[^.]+\.)*");
            } else if index == last {
                expression.push_str(r"[^.]+");
            } else {
                expression.push_str(r"(?:[^.]+\.)+");
            }
            continue;
        }

        let escaped = label
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^.]*");
        expression.push_str(&escaped);
        if index != last {
            expression.push_str(r"\.");
        }
    }

    expression.push('$');
    expression
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("domain.*", "domain.com", true)]
    #[case("domain.*", "domain.net", true)]
    #[case("domain.*", "domain.net.com", false)]
    #[case("*.domain.com", "domain.com", true)]
    #[case("*.domain.com", "a.domain.com", true)]
    #[case("*.domain.com", "b.a.domain.com", true)]
    #[case("*.domain.com", "x-domain.com", false)]
    #[case("cdn.*.*.domain.com", "cdn.a.b.domain.com", true)]
    #[case("cdn.*.*.domain.com", "cdn.a.domain.com", false)]
    fn test_domain_pattern_table(
        #[case] pattern: &str,
        #[case] candidate: &str,
        #[case] expected: bool,
    ) {
        let pattern = DomainPattern::parse(pattern).unwrap();
        assert_eq!(pattern.matches(candidate), expected);
    }

    #[rstest]
    #[case("cdn*.domain.com", "cdn.domain.com", true)]
    #[case("cdn*.domain.com", "cdn01.domain.com", true)]
    #[case("cdn*.domain.com", "cdn.a.domain.com", false)]
    #[case("*cdn*.domain.com", "img-cdn-1.domain.com", true)]
    #[case("*cdn*.domain.com", "img.domain.com", false)]
    #[case("*", "anything.example", true)]
    fn test_embedded_wildcards(
        #[case] pattern: &str,
        #[case] candidate: &str,
        #[case] expected: bool,
    ) {
        let pattern = DomainPattern::parse(pattern).unwrap();
        assert_eq!(pattern.matches(candidate), expected);
    }

    #[rstest]
    #[case("g.cn", "g.cn", true)]
    #[case("g.cn", "g.cn.", true)]
    #[case("g.cn.", "G.CN", true)]
    #[case("g.cn", "a.g.cn", false)]
    #[case("g.cn", "gxcn", false)]
    fn test_exact_patterns(#[case] pattern: &str, #[case] candidate: &str, #[case] expected: bool) {
        let pattern = DomainPattern::parse(pattern).unwrap();
        assert!(!pattern.is_wildcard());
        assert_eq!(pattern.matches(candidate), expected);
    }

    #[test]
    fn dots_are_literal() {
        let pattern = DomainPattern::parse("a.*").unwrap();
        assert!(!pattern.matches("abc"));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        assert!(matches!(
            DomainPattern::parse("."),
            Err(TamperError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn display_keeps_original_text() {
        let pattern = DomainPattern::parse("*.Domain.com").unwrap();
        assert_eq!(pattern.to_string(), "*.Domain.com");
    }
}
