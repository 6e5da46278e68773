//! Cache Rules Module
//!
//! Decides whether a request URL is cacheable by evaluating an ordered list
//! of URL patterns. First enabled match wins; no match means not cacheable.

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::error::ProxyError;

// == Cache Rule ==
/// A URL pattern plus an enabled flag, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheRule {
    /// Regular expression matched against the full request URL
    pub pattern: String,
    /// Disabled rules are never evaluated
    #[serde(default)]
    pub enabled: bool,
}

impl CacheRule {
    /// Creates an enabled rule.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: true,
        }
    }

    /// Creates a disabled rule.
    pub fn disabled(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            enabled: false,
        }
    }
}

// == Compiled Rule ==
/// An enabled rule after compilation.
///
/// A pattern that fails to compile is kept with its error so the failure is
/// contained to that one rule.
#[derive(Debug, Clone)]
pub enum CompiledRule {
    Pattern(Regex),
    Invalid(InvalidPattern),
}

/// Cloneable description of a pattern compilation failure.
#[derive(Debug, Clone)]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

impl From<InvalidPattern> for ProxyError {
    fn from(info: InvalidPattern) -> Self {
        ProxyError::Pattern {
            pattern: info.pattern,
            reason: info.reason,
        }
    }
}

impl CompiledRule {
    fn compile(pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => CompiledRule::Pattern(re),
            Err(e) => CompiledRule::Invalid(InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Returns true only for a compiled pattern that matches the URL.
    pub fn matches(&self, url: &str) -> bool {
        match self {
            CompiledRule::Pattern(re) => re.is_match(url),
            CompiledRule::Invalid(_) => false,
        }
    }
}

// == Rule Set ==
/// Enabled rules compiled once, in configured order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compiles the enabled rules. Disabled rules are dropped without being
    /// compiled; invalid patterns are logged once and kept as non-matching.
    pub fn compile(rules: &[CacheRule]) -> Self {
        let rules = rules
            .iter()
            .filter(|rule| rule.enabled)
            .map(|rule| {
                let compiled = CompiledRule::compile(&rule.pattern);
                if let CompiledRule::Invalid(info) = &compiled {
                    let err: ProxyError = info.clone().into();
                    warn!(pattern = %rule.pattern, error = %err, "skipping invalid cache rule");
                }
                compiled
            })
            .collect();
        Self { rules }
    }

    /// Returns true if any enabled rule matches the URL.
    pub fn is_eligible(&self, url: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(url))
    }

    /// Number of enabled rules, including invalid ones.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no enabled rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Patterns that failed to compile.
    pub fn invalid(&self) -> impl Iterator<Item = &InvalidPattern> {
        self.rules.iter().filter_map(|rule| match rule {
            CompiledRule::Invalid(info) => Some(info),
            CompiledRule::Pattern(_) => None,
        })
    }
}

// == Is Eligible ==
/// Evaluates rules against a URL, compiling each enabled pattern on the fly.
///
/// A pattern that fails to compile counts as no match for that rule and
/// evaluation continues with the next one.
pub fn is_eligible(url: &str, rules: &[CacheRule]) -> bool {
    rules
        .iter()
        .filter(|rule| rule.enabled)
        .any(|rule| CompiledRule::compile(&rule.pattern).matches(url))
}
