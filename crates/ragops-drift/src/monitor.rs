use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use statrs::statistics::Statistics;

use ragops_core::config::DriftSettings;
use ragops_core::domain::Domain;
use ragops_core::traits::{Clock, SystemClock};
use ragops_core::types::QuerySample;

use crate::ks::ks_two_sample;

pub const INSUFFICIENT_DATA: &str = "insufficient data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftStats {
    pub p_value: f64,
    pub statistic: f64,
    pub current_mean_length: f64,
    pub previous_mean_length: f64,
}

/// Outcome of comparing a domain's current window with the one before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftResult {
    pub domain: Domain,
    pub drift_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub stats: Option<DriftStats>,
    pub current_samples: usize,
    pub previous_samples: usize,
}

fn days_before(t: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    t.checked_sub_signed(Duration::days(i64::from(days))).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Rolling per-domain query-length windows.
///
/// Appends for one domain serialize on that domain's map entry, so concurrent
/// writers never drop samples; `detect` works on a copy.
pub struct DriftMonitor {
    samples: DashMap<Domain, Vec<QuerySample>>,
    settings: DriftSettings,
    clock: Arc<dyn Clock>,
}

impl DriftMonitor {
    pub fn new(settings: DriftSettings) -> Self {
        Self { samples: DashMap::new(), settings, clock: Arc::new(SystemClock) }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &DriftSettings {
        &self.settings
    }

    pub fn record(&self, domain: &Domain, query: &str) {
        self.record_at(domain, query, self.clock.now());
    }

    /// Record a query observed at `at`. Blank queries are ignored; samples
    /// older than the retention period are pruned on every write.
    pub fn record_at(&self, domain: &Domain, query: &str, at: DateTime<Utc>) {
        let word_count = query.split_whitespace().count();
        if word_count == 0 {
            return;
        }
        let cutoff = days_before(self.clock.now(), self.settings.retention_days);
        let mut window = self.samples.entry(domain.clone()).or_default();
        window.push(QuerySample { timestamp: at, domain: domain.clone(), word_count });
        window.retain(|s| s.timestamp > cutoff);
    }

    pub fn sample_count(&self, domain: &Domain) -> usize {
        self.samples.get(domain).map_or(0, |w| w.len())
    }

    pub fn domains(&self) -> Vec<Domain> {
        let mut out: Vec<Domain> = self.samples.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    pub fn detect(&self, domain: &Domain) -> DriftResult {
        self.detect_with_window(domain, self.settings.window_days)
    }

    pub fn detect_with_window(&self, domain: &Domain, window_days: u32) -> DriftResult {
        let now = self.clock.now();
        let current_start = days_before(now, window_days);
        let previous_start = days_before(current_start, window_days);
        let snapshot = self.samples.get(domain).map(|w| w.clone()).unwrap_or_default();

        let current: Vec<f64> = snapshot
            .iter()
            .filter(|s| s.timestamp >= current_start && s.timestamp <= now)
            .map(|s| s.word_count as f64)
            .collect();
        let previous: Vec<f64> = snapshot
            .iter()
            .filter(|s| s.timestamp >= previous_start && s.timestamp < current_start)
            .map(|s| s.word_count as f64)
            .collect();

        let mut result = DriftResult {
            domain: domain.clone(),
            drift_detected: false,
            reason: None,
            stats: None,
            current_samples: current.len(),
            previous_samples: previous.len(),
        };
        let min = self.settings.min_samples;
        let outcome = if current.len() < min || previous.len() < min { None } else { ks_two_sample(&current, &previous) };
        let Some(ks) = outcome else {
            result.reason = Some(INSUFFICIENT_DATA.to_string());
            return result;
        };

        result.drift_detected = ks.p_value < self.settings.significance;
        result.stats = Some(DriftStats {
            p_value: ks.p_value,
            statistic: ks.statistic,
            current_mean_length: current.iter().mean(),
            previous_mean_length: previous.iter().mean(),
        });
        tracing::debug!(domain = %domain, drift = result.drift_detected, p_value = ks.p_value, "drift check");
        result
    }
}
