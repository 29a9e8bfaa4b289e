//! Lightweight configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nesting, e.g.
//! `APP_CACHE__SIMILARITY_THRESHOLD=0.9`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{default_domain_rules, DomainRegistry, DomainRule};
use crate::error::Error;
use crate::types::Tier;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Like [`Config::load`], reading the TOML files from `dir`.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wrap an already-assembled figment; defaults are layered underneath.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the full typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub cache: CacheSettings,
    pub drift: DriftSettings,
    pub routing: RoutingSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        fn check(ok: bool, msg: &str) -> Result<(), Error> {
            if ok { Ok(()) } else { Err(Error::InvalidConfig(msg.to_string())) }
        }
        check(self.embedding.dimension > 0, "embedding.dimension must be > 0")?;
        check((0.0..=1.0).contains(&self.retrieval.alpha), "retrieval.alpha must be within [0, 1]")?;
        check(self.retrieval.top_k > 0, "retrieval.top_k must be > 0")?;
        check(self.retrieval.candidate_multiplier > 0, "retrieval.candidate_multiplier must be > 0")?;
        check(self.retrieval.timeout_ms > 0, "retrieval.timeout_ms must be > 0")?;
        check(
            self.cache.similarity_threshold > 0.0 && self.cache.similarity_threshold <= 1.0,
            "cache.similarity_threshold must be within (0, 1]",
        )?;
        check(self.cache.scan_limit > 0, "cache.scan_limit must be > 0")?;
        check(
            self.cache.response_ttl_secs > 0 && self.cache.embedding_ttl_secs > 0,
            "cache TTLs must be > 0",
        )?;
        check(self.cache.timeout_ms > 0, "cache.timeout_ms must be > 0")?;
        check(self.drift.window_days > 0, "drift.window_days must be > 0")?;
        check(
            self.drift.retention_days >= 2 * self.drift.window_days,
            "drift.retention_days must cover two windows",
        )?;
        check(self.drift.min_samples > 0, "drift.min_samples must be > 0")?;
        check(
            self.drift.significance > 0.0 && self.drift.significance < 1.0,
            "drift.significance must be within (0, 1)",
        )?;
        check(
            !self.routing.models.lite.is_empty() && !self.routing.models.pro.is_empty(),
            "routing.models.lite and routing.models.pro must be set",
        )?;
        check(self.routing.sentence_threshold > 0, "routing.sentence_threshold must be > 0")?;
        check(self.generation.timeout_ms > 0, "generation.timeout_ms must be > 0")?;
        self.routing.registry().map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub raw_txt_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { raw_txt_dir: "./data/txt".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub dimension: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { dimension: 1024, timeout_ms: 5_000 }
    }
}

impl EmbeddingSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Weight of the vector component; `1 - alpha` goes to the lexical score.
    pub alpha: f32,
    /// Vector shortlist size is `top_k * candidate_multiplier`.
    pub candidate_multiplier: usize,
    pub timeout_ms: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, alpha: 0.7, candidate_multiplier: 2, timeout_ms: 5_000 }
    }
}

impl RetrievalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub similarity_threshold: f32,
    pub scan_limit: usize,
    pub response_ttl_secs: u64,
    pub embedding_ttl_secs: u64,
    pub timeout_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.95,
            scan_limit: 100,
            response_ttl_secs: 3_600,
            embedding_ttl_secs: 86_400,
            timeout_ms: 250,
        }
    }
}

impl CacheSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    pub fn embedding_ttl(&self) -> Duration {
        Duration::from_secs(self.embedding_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftSettings {
    pub window_days: u32,
    pub retention_days: u32,
    pub min_samples: usize,
    pub significance: f64,
    pub alert_topic: Option<String>,
    pub alert_timeout_ms: u64,
}

impl Default for DriftSettings {
    fn default() -> Self {
        Self {
            window_days: 7,
            retention_days: 30,
            min_samples: 30,
            significance: 0.05,
            alert_topic: None,
            alert_timeout_ms: 2_000,
        }
    }
}

impl DriftSettings {
    pub fn alert_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMap {
    pub lite: String,
    pub pro: String,
    pub lite_cost_per_1k_tokens: f64,
    pub pro_cost_per_1k_tokens: f64,
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            lite: "global.amazon.nova-2-lite-v1:0".to_string(),
            pro: "global.amazon.nova-2-pro-v1:0".to_string(),
            lite_cost_per_1k_tokens: 0.000_06,
            pro_cost_per_1k_tokens: 0.000_8,
        }
    }
}

impl ModelMap {
    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Lite => &self.lite,
            Tier::Pro => &self.pro,
        }
    }

    pub fn cost_per_1k_tokens(&self, tier: Tier) -> f64 {
        match tier {
            Tier::Lite => self.lite_cost_per_1k_tokens,
            Tier::Pro => self.pro_cost_per_1k_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    pub models: ModelMap,
    pub sentence_threshold: usize,
    pub domains: BTreeMap<String, DomainRule>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self { models: ModelMap::default(), sentence_threshold: 3, domains: default_domain_rules() }
    }
}

impl RoutingSettings {
    pub fn registry(&self) -> Result<DomainRegistry, Error> {
        DomainRegistry::from_rules(&self.domains)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub timeout_ms: u64,
    /// Seeds prompt A/B selection; `None` draws from OS entropy.
    pub ab_seed: Option<u64>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self { timeout_ms: 30_000, ab_seed: None }
    }
}

impl GenerationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
