//! Versioned prompt templates with weighted A/B selection.
use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;

use ragops_core::domain::Domain;

pub const FALLBACK_VERSION: &str = "fallback";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptVersion {
    pub version_id: String,
    pub name: String,
    pub system_prompt: String,
    /// Carries `{context}` and `{question}` placeholders.
    pub user_template: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
    /// Relative share of traffic among the domain's active versions.
    pub weight: f64,
}

impl PromptVersion {
    pub fn new(version_id: &str, name: &str, system_prompt: &str, user_template: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            version_id: version_id.to_string(),
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
            user_template: user_template.to_string(),
            created_at,
            active: true,
            weight: 1.0,
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        self.user_template.replace("{context}", context).replace("{question}", question)
    }

    fn selectable(&self) -> bool {
        self.active && self.weight.is_finite() && self.weight > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
    pub version_id: String,
}

/// Prompt versions keyed by domain, then by version id.
#[derive(Debug, Clone, Default)]
pub struct PromptRegistry {
    versions: BTreeMap<Domain, BTreeMap<String, PromptVersion>>,
}

impl PromptRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The shipped prompt set: one balanced version per built-in domain.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (domain, version) in builtin_versions() {
            registry.add_version(&domain, version);
        }
        registry
    }

    /// Insert or replace a version.
    pub fn add_version(&mut self, domain: &Domain, version: PromptVersion) {
        self.versions.entry(domain.clone()).or_default().insert(version.version_id.clone(), version);
    }

    /// Returns whether the version existed.
    pub fn deactivate_version(&mut self, domain: &Domain, version_id: &str) -> bool {
        match self.versions.get_mut(domain).and_then(|v| v.get_mut(version_id)) {
            Some(version) => {
                version.active = false;
                true
            }
            None => false,
        }
    }

    pub fn versions(&self, domain: &Domain) -> impl Iterator<Item = &PromptVersion> {
        self.versions.get(domain).into_iter().flat_map(|v| v.values())
    }

    fn versions_for(&self, domain: &Domain) -> Option<&BTreeMap<String, PromptVersion>> {
        self.versions.get(domain).or_else(|| self.versions.get(&Domain::general()))
    }

    /// Cumulative-weight draw over the domain's active, positively weighted
    /// versions (the general set when the domain has none registered).
    pub fn select<R: Rng>(&self, domain: &Domain, rng: &mut R) -> Option<&PromptVersion> {
        let candidates: Vec<&PromptVersion> = self.versions_for(domain)?.values().filter(|v| v.selectable()).collect();
        let total: f64 = candidates.iter().map(|v| v.weight).sum();
        if candidates.is_empty() || total <= 0.0 {
            return None;
        }
        let draw = rng.gen::<f64>() * total;
        let mut cumulative = 0.0;
        for version in &candidates {
            cumulative += version.weight;
            if draw < cumulative {
                return Some(*version);
            }
        }
        candidates.last().copied()
    }

    /// Render a prompt, pinning `version_id` when it names a known version.
    pub fn render<R: Rng>(
        &self,
        domain: &Domain,
        context: &str,
        question: &str,
        version_id: Option<&str>,
        rng: &mut R,
    ) -> RenderedPrompt {
        let pinned = version_id.and_then(|id| self.versions_for(domain)?.get(id));
        match pinned.or_else(|| self.select(domain, rng)) {
            Some(v) => RenderedPrompt { system: v.system_prompt.clone(), user: v.render(context, question), version_id: v.version_id.clone() },
            None => RenderedPrompt {
                system: String::new(),
                user: format!("Context: {context}\n\nQuestion: {question}"),
                version_id: FALLBACK_VERSION.to_string(),
            },
        }
    }
}

fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn builtin_versions() -> Vec<(Domain, PromptVersion)> {
    let legal = PromptVersion::new(
        "legal_v1",
        "Balanced Legal",
        "You are a legal document assistant. Provide concise, citation-based answers.\n\
         Always reference specific sections or clauses using numeric tags like [1], [2], referencing the source order below.\n\
         Provide a high-level summary rather than an exhaustive research-style answer.",
        "Based on the following legal documents:\n\n{context}\n\nQuestion: {question}\n\n\
         Provide a concise answer with numeric citations (e.g., [1]).",
        day(2026, 1, 1),
    );
    let hr = PromptVersion::new(
        "hr_v1",
        "Balanced HR",
        "You are an HR Policy Assistant. Provide clear, empathetic, and concise guidance.\n\
         Focus on high-level summaries. Always include numeric citations like [1], [2] to relevant policy sections from the context.\n\
         Provide a high-level summary rather than an exhaustive research-style answer.",
        "Policy Sections:\n{context}\n\nEmployee Question: {question}\n\n\
         Guidance (concise with numeric citations like [1]):",
        day(2026, 1, 10),
    );
    let engineering = PromptVersion::new(
        "engineering_v1",
        "Balanced Engineering",
        "You are a technical documentation assistant. Provide accurate, actionable guidance.\n\
         Be concise. Provide a high-level summary rather than an exhaustive research-style answer.\n\
         Include code examples when relevant and cite sources with numeric tags like [1].",
        "Based on the following technical documentation:\n\n{context}\n\nQuestion: {question}\n\n\
         Provide a technical, concise answer with numeric citations (e.g., [1]).",
        day(2026, 1, 1),
    );
    let general = PromptVersion::new(
        "general_v1",
        "Balanced General",
        "You are a helpful AI assistant. Provide concise, high-level summaries based on the provided context.\n\
         Always include numeric citations like [1], [2], referring to the sources in the context. Avoid exhaustive research-style answers.",
        "Context:\n{context}\n\nQuestion: {question}\n\nAnswer (concise with numeric citations like [1]):",
        day(2026, 1, 1),
    );
    [("legal", legal), ("hr", hr), ("engineering", engineering)]
        .into_iter()
        .filter_map(|(name, v)| Domain::parse(name).ok().map(|d| (d, v)))
        .chain(std::iter::once((Domain::general(), general)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hr() -> Domain {
        Domain::parse("hr").unwrap()
    }

    fn variant(id: &str, weight: f64) -> PromptVersion {
        PromptVersion::new(id, id, "sys", "{context}|{question}", day(2026, 2, 1)).with_weight(weight)
    }

    #[test]
    fn builtin_covers_known_domains_and_falls_back_to_general() {
        let registry = PromptRegistry::builtin();
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(registry.render(&hr(), "ctx", "q", None, &mut rng).version_id, "hr_v1");
        let other = registry.render(&Domain::parse("finance").unwrap(), "ctx", "why?", None, &mut rng);
        assert_eq!(other.version_id, "general_v1");
        assert!(other.user.contains("Question: why?"));
        assert!(other.user.contains("Context:\nctx"));
    }

    #[test]
    fn fixed_seed_selection_is_reproducible() {
        let mut registry = PromptRegistry::empty();
        registry.add_version(&hr(), variant("a", 1.0));
        registry.add_version(&hr(), variant("b", 3.0));
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50).map(|_| registry.select(&hr(), &mut rng).unwrap().version_id.clone()).collect::<Vec<_>>()
        };
        assert_eq!(draw(42), draw(42));
        let picks = draw(42);
        let b = picks.iter().filter(|id| *id == "b").count();
        assert!(b > 25, "weight 3 arm picked {b}/50");
    }

    #[test]
    fn zero_weight_and_inactive_versions_are_never_selected() {
        let mut registry = PromptRegistry::empty();
        registry.add_version(&hr(), variant("live", 1.0));
        registry.add_version(&hr(), variant("muted", 0.0));
        registry.add_version(&hr(), variant("retired", 5.0));
        assert!(registry.deactivate_version(&hr(), "retired"));
        assert!(!registry.deactivate_version(&hr(), "missing"));

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..200 {
            assert_eq!(registry.select(&hr(), &mut rng).unwrap().version_id, "live");
        }
    }

    #[test]
    fn pinned_version_and_fallback_prompt() {
        let mut registry = PromptRegistry::empty();
        let mut rng = StdRng::seed_from_u64(1);
        let fallback = registry.render(&hr(), "ctx", "q", None, &mut rng);
        assert_eq!(fallback.version_id, FALLBACK_VERSION);
        assert_eq!(fallback.user, "Context: ctx\n\nQuestion: q");

        registry.add_version(&hr(), variant("a", 1.0));
        registry.add_version(&hr(), variant("b", 1.0));
        let pinned = registry.render(&hr(), "c", "q", Some("b"), &mut rng);
        assert_eq!(pinned.version_id, "b");
        assert_eq!(pinned.user, "c|q");
    }
}
