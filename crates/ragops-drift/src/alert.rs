use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use ragops_core::config::DriftSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{with_deadline, Result};
use ragops_core::traits::AlertSink;

use crate::monitor::{DriftMonitor, DriftResult, DriftStats};

pub const SINK_NOT_CONFIGURED: &str = "alert sink not configured";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftAlertReport {
    #[serde(flatten)]
    pub result: DriftResult,
    pub alert_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

pub fn alert_subject(domain: &Domain) -> String {
    format!("[ragops] Data drift alert - {domain}")
}

pub fn format_alert(domain: &Domain, stats: &DriftStats, current_samples: usize, previous_samples: usize) -> String {
    format!(
        "Data drift detected for domain: {domain}\n\
         ----------------------------------------\n\
         P-value: {:.4} (significant shift)\n\
         Current mean query length: {:.2} words\n\
         Previous mean query length: {:.2} words\n\
         Sample sizes: current={current_samples}, previous={previous_samples}\n\
         \n\
         Recommendation:\n\
         - Review recent query logs for changing user behaviour.\n\
         - Evaluate whether retrieval or prompt strategies need adjustment.\n\
         - Consider re-embedding the corpus if vocabulary has shifted.\n",
        stats.p_value, stats.current_mean_length, stats.previous_mean_length,
    )
}

/// Runs drift detection and pushes an alert when a domain has drifted.
/// Publishing is best-effort; failures land in the report.
pub struct DriftAlerter {
    monitor: Arc<DriftMonitor>,
    sink: Option<Arc<dyn AlertSink>>,
    topic: Option<String>,
    timeout: Duration,
}

impl DriftAlerter {
    pub fn new(monitor: Arc<DriftMonitor>, sink: Option<Arc<dyn AlertSink>>, settings: &DriftSettings) -> Self {
        Self { monitor, sink, topic: settings.alert_topic.clone(), timeout: settings.alert_timeout() }
    }

    pub async fn check(&self, domain: &Domain) -> DriftAlertReport {
        let result = self.monitor.detect(domain);
        let mut report = DriftAlertReport { result, alert_sent: false, alert_error: None, note: None };
        let (true, Some(stats)) = (report.result.drift_detected, report.result.stats.as_ref()) else {
            return report;
        };

        let message = format_alert(domain, stats, report.result.current_samples, report.result.previous_samples);
        tracing::warn!(domain = %domain, p_value = stats.p_value, "{message}");

        let (Some(sink), Some(topic)) = (&self.sink, &self.topic) else {
            report.note = Some(SINK_NOT_CONFIGURED.to_string());
            return report;
        };
        match with_deadline("alert-sink", self.timeout, sink.publish(topic, &alert_subject(domain), &message)).await {
            Ok(()) => report.alert_sent = true,
            Err(e) => {
                tracing::error!(domain = %domain, error = %e, "failed to publish drift alert");
                report.alert_error = Some(e.to_string());
            }
        }
        report
    }
}

/// Sink that only writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> Result<()> {
        tracing::warn!(topic, subject, "{message}");
        Ok(())
    }
}
