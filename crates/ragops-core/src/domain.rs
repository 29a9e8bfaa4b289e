//! Validated domain names and the per-domain routing registry.
//!
//! A domain names a knowledge partition (legal, hr, engineering, ...). It keys
//! cache namespaces and vector filters, so the accepted alphabet is kept small:
//! lowercase ASCII letters, digits, `_` and `-`, at most 64 bytes. Anything else
//! is rejected with [`Error::Validation`]. An *absent* domain is not an error
//! and resolves to [`DEFAULT_DOMAIN`].
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_DOMAIN: &str = "general";
pub const MAX_DOMAIN_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Domain(String);

impl Domain {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::Validation("domain must not be empty".into()));
        }
        if raw.len() > MAX_DOMAIN_LEN {
            return Err(Error::Validation(format!(
                "domain '{raw}' exceeds {MAX_DOMAIN_LEN} bytes"
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        {
            return Err(Error::Validation(format!(
                "domain '{raw}' contains invalid character {bad:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// `None` means "no domain given" and maps to the default domain.
    pub fn from_optional(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Ok(Self::general()),
        }
    }

    pub fn general() -> Self {
        Self(DEFAULT_DOMAIN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_DOMAIN
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(value: Domain) -> Self {
        value.0
    }
}

/// How a domain turns query features into a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum DomainRule {
    /// `lite` only for short queries without conditional language.
    SimpleUnlessConditional { simple_threshold: usize },
    /// `pro` for long queries or more than one question.
    ComplexIfLongOrMultiQuestion { complex_threshold: usize },
    /// Weighted feature score, `pro` at or above the score cut.
    WeightedScore { complex_threshold: usize },
}

impl DomainRule {
    pub fn threshold(&self) -> usize {
        match *self {
            Self::SimpleUnlessConditional { simple_threshold } => simple_threshold,
            Self::ComplexIfLongOrMultiQuestion { complex_threshold }
            | Self::WeightedScore { complex_threshold } => complex_threshold,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SimpleUnlessConditional { .. } => "simple_unless_conditional",
            Self::ComplexIfLongOrMultiQuestion { .. } => "complex_if_long_or_multi_question",
            Self::WeightedScore { .. } => "weighted_score",
        }
    }
}

pub fn default_domain_rules() -> BTreeMap<String, DomainRule> {
    BTreeMap::from([
        ("legal".to_string(), DomainRule::SimpleUnlessConditional { simple_threshold: 20 }),
        ("hr".to_string(), DomainRule::ComplexIfLongOrMultiQuestion { complex_threshold: 100 }),
        ("engineering".to_string(), DomainRule::WeightedScore { complex_threshold: 75 }),
        (DEFAULT_DOMAIN.to_string(), DomainRule::WeightedScore { complex_threshold: 50 }),
    ])
}

/// Validated routing rules, one per configured domain, with an explicit
/// fallback for domains that are well-formed but not configured.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainRegistry {
    rules: BTreeMap<Domain, DomainRule>,
    fallback: DomainRule,
}

impl DomainRegistry {
    pub fn from_rules(raw: &BTreeMap<String, DomainRule>) -> Result<Self> {
        let mut rules = BTreeMap::new();
        for (name, rule) in raw {
            let domain = Domain::parse(name)
                .map_err(|e| Error::InvalidConfig(format!("routing.domains: {e}")))?;
            if rule.threshold() == 0 {
                return Err(Error::InvalidConfig(format!(
                    "routing.domains.{name}: threshold must be greater than zero"
                )));
            }
            rules.insert(domain, *rule);
        }
        let fallback = rules.get(&Domain::general()).copied().ok_or_else(|| {
            Error::InvalidConfig(format!("routing.domains must configure '{DEFAULT_DOMAIN}'"))
        })?;
        if !matches!(fallback, DomainRule::WeightedScore { .. }) {
            return Err(Error::InvalidConfig(format!(
                "routing.domains.{DEFAULT_DOMAIN} must use the weighted_score rule"
            )));
        }
        Ok(Self { rules, fallback })
    }

    /// Rule for `domain`, and whether it came from the fallback.
    pub fn rule_for(&self, domain: &Domain) -> (DomainRule, bool) {
        match self.rules.get(domain) {
            Some(rule) => (*rule, false),
            None => (self.fallback, true),
        }
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.rules.keys()
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        let rules = default_domain_rules()
            .into_iter()
            .map(|(name, rule)| (Domain(name), rule))
            .collect::<BTreeMap<_, _>>();
        Self { rules, fallback: DomainRule::WeightedScore { complex_threshold: 50 } }
    }
}
