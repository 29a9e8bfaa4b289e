use ragops_core::config::{ModelMap, RoutingSettings};
use ragops_core::domain::{Domain, DomainRegistry, DomainRule};
use ragops_core::error::Result;
use ragops_core::types::{QueryFeatures, RoutingDecision, Tier};

use crate::features::extract_features;

/// Weighted score at which a query goes to the pro tier.
pub const PRO_SCORE_CUT: u32 = 3;

/// Pure, deterministic tier selection.
#[derive(Debug, Clone)]
pub struct ComplexityRouter {
    registry: DomainRegistry,
    models: ModelMap,
    sentence_threshold: usize,
}

impl Default for ComplexityRouter {
    fn default() -> Self {
        let settings = RoutingSettings::default();
        Self { registry: DomainRegistry::default(), models: settings.models, sentence_threshold: settings.sentence_threshold }
    }
}

impl ComplexityRouter {
    pub fn from_settings(settings: &RoutingSettings) -> Result<Self> {
        Ok(Self { registry: settings.registry()?, models: settings.models.clone(), sentence_threshold: settings.sentence_threshold })
    }

    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    pub fn classify(&self, query: &str, domain: &Domain) -> RoutingDecision {
        let features = extract_features(query);
        let (rule, fallback) = self.registry.rule_for(domain);
        let (tier, complexity_score, mut rationale) = self.decide(rule, &features);
        if fallback {
            rationale = format!("{domain} not configured, using {} rule; {rationale}", Domain::general());
        }
        tracing::debug!(domain = %domain, tier = %tier, score = complexity_score, "routed query");
        RoutingDecision {
            tier,
            model_id: self.models.model_for(tier).to_string(),
            rationale,
            complexity_score,
            domain: domain.clone(),
            features,
        }
    }

    fn decide(&self, rule: DomainRule, f: &QueryFeatures) -> (Tier, f64, String) {
        match rule {
            DomainRule::SimpleUnlessConditional { simple_threshold } => {
                let short = f.word_count < simple_threshold;
                let tier = if short && !f.has_conditional_language { Tier::Lite } else { Tier::Pro };
                let why = match (short, f.has_conditional_language) {
                    (true, false) => format!("{} words < {simple_threshold} and no conditional language", f.word_count),
                    (true, true) => "conditional language present".to_string(),
                    (false, _) => format!("{} words >= {simple_threshold}", f.word_count),
                };
                (tier, f.word_count as f64, format!("{}: {why}", rule.name()))
            }
            DomainRule::ComplexIfLongOrMultiQuestion { complex_threshold } => {
                let long = f.word_count > complex_threshold;
                let tier = if long || f.has_multiple_questions { Tier::Pro } else { Tier::Lite };
                let why = match (long, f.has_multiple_questions) {
                    (true, _) => format!("{} words > {complex_threshold}", f.word_count),
                    (false, true) => "multiple questions".to_string(),
                    (false, false) => format!("{} words <= {complex_threshold}, single question", f.word_count),
                };
                (tier, f.word_count as f64, format!("{}: {why}", rule.name()))
            }
            DomainRule::WeightedScore { complex_threshold } => {
                let mut score = 0u32;
                let mut facts = Vec::new();
                if f.word_count > complex_threshold {
                    score += 2;
                    facts.push(format!("{} words > {complex_threshold}", f.word_count));
                }
                if f.sentence_count > self.sentence_threshold {
                    score += 1;
                    facts.push(format!("{} sentences", f.sentence_count));
                }
                if f.has_technical_terms {
                    score += 1;
                    facts.push("technical terms".to_string());
                }
                if f.has_multiple_questions {
                    score += 1;
                    facts.push("multiple questions".to_string());
                }
                if f.has_conditional_language {
                    score += 1;
                    facts.push("conditional language".to_string());
                }
                let tier = if score >= PRO_SCORE_CUT { Tier::Pro } else { Tier::Lite };
                let facts = if facts.is_empty() { "no complexity signals".to_string() } else { facts.join(", ") };
                (tier, f64::from(score), format!("{}: score {score} ({facts})", rule.name()))
            }
        }
    }
}
