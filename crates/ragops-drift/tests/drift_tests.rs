use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use ragops_core::config::DriftSettings;
use ragops_core::domain::Domain;
use ragops_core::error::{Error, Result};
use ragops_core::traits::{AlertSink, Clock};
use ragops_drift::{DriftAlerter, DriftMonitor, INSUFFICIENT_DATA};

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn monitor() -> DriftMonitor {
    DriftMonitor::new(DriftSettings::default()).with_clock(Arc::new(FixedClock(now())))
}

fn hr() -> Domain {
    Domain::parse("hr").unwrap()
}

fn query(words: usize) -> String {
    vec!["w"; words].join(" ")
}

/// 40 samples in each window: previous 8-13 days ago, current 0-5 days ago.
fn fill(m: &DriftMonitor, rng: &mut StdRng, previous: (usize, usize), current: (usize, usize)) {
    for i in 0..40 {
        let at = now() - Duration::days(8) - Duration::hours(i);
        m.record_at(&hr(), &query(rng.gen_range(previous.0..=previous.1)), at);
        let at = now() - Duration::hours(1 + i);
        m.record_at(&hr(), &query(rng.gen_range(current.0..=current.1)), at);
    }
}

#[test]
fn shifted_lengths_are_detected() {
    let m = monitor();
    fill(&m, &mut StdRng::seed_from_u64(7), (2, 4), (15, 20));

    let result = m.detect(&hr());
    assert!(result.drift_detected);
    assert_eq!(result.current_samples, 40);
    assert_eq!(result.previous_samples, 40);
    let stats = result.stats.expect("stats");
    assert!(stats.p_value < 0.05);
    assert_eq!(stats.statistic, 1.0);
    assert!(stats.current_mean_length >= 15.0 && stats.current_mean_length <= 20.0);
    assert!(stats.previous_mean_length >= 2.0 && stats.previous_mean_length <= 4.0);
    assert!(result.reason.is_none());
}

#[test]
fn borderline_shift_uses_exact_small_sample_p_value() {
    let m = monitor();
    for (i, words) in (1..=40).enumerate() {
        let hours = i64::try_from(i).unwrap();
        m.record_at(&hr(), &query(words), now() - Duration::hours(1 + hours));
        m.record_at(&hr(), &query(words + 12), now() - Duration::days(8) - Duration::hours(hours));
    }
    let result = m.detect(&hr());
    let stats = result.stats.expect("stats");
    assert_eq!(stats.statistic, 0.3);
    assert!(stats.p_value > 0.05 && stats.p_value < 0.055, "p = {}", stats.p_value);
    assert!(!result.drift_detected);
}

#[test]
fn same_distribution_rarely_flags_drift() {
    let mut flagged = 0;
    for seed in 0..20 {
        let m = monitor();
        fill(&m, &mut StdRng::seed_from_u64(seed), (5, 15), (5, 15));
        if m.detect(&hr()).drift_detected {
            flagged += 1;
        }
    }
    assert!(flagged <= 3, "flagged {flagged} of 20 identical-distribution runs");
}

#[test]
fn too_few_samples_is_a_status_not_an_error() {
    let m = monitor();
    for i in 0..29 {
        m.record_at(&hr(), "short query", now() - Duration::hours(i));
        m.record_at(&hr(), "short query", now() - Duration::days(9) - Duration::hours(i));
    }
    let result = m.detect(&hr());
    assert!(!result.drift_detected);
    assert_eq!(result.reason.as_deref(), Some(INSUFFICIENT_DATA));
    assert_eq!(result.current_samples, 29);
    assert_eq!(result.previous_samples, 29);
    assert!(result.stats.is_none());

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["reason"], "insufficient data");
    assert!(json.get("p_value").is_none());

    let unseen = m.detect(&Domain::parse("legal").unwrap());
    assert_eq!(unseen.current_samples, 0);
}

#[test]
fn blank_queries_are_ignored() {
    let m = monitor();
    m.record(&hr(), "one two three");
    m.record(&hr(), "");
    m.record(&hr(), "   \t ");
    assert_eq!(m.sample_count(&hr()), 1);
}

#[test]
fn old_samples_are_pruned_on_write() {
    let m = monitor();
    m.record_at(&hr(), "ancient", now() - Duration::days(31));
    m.record_at(&hr(), "edge", now() - Duration::days(30));
    m.record_at(&hr(), "recent", now() - Duration::days(29));
    assert_eq!(m.sample_count(&hr()), 1);
}

#[test]
fn window_boundaries_follow_the_clock() {
    let m = monitor();
    m.record_at(&hr(), "exactly at the boundary", now() - Duration::days(7));
    m.record_at(&hr(), "just before", now() - Duration::days(7) - Duration::seconds(1));
    m.record_at(&hr(), "in the future", now() + Duration::hours(1));
    let result = m.detect_with_window(&hr(), 7);
    assert_eq!(result.current_samples, 1);
    assert_eq!(result.previous_samples, 1);
}

#[test]
fn concurrent_records_are_not_lost() {
    let m = Arc::new(monitor());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let m = Arc::clone(&m);
            std::thread::spawn(move || {
                for _ in 0..250 {
                    m.record(&hr(), "a b c");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(m.sample_count(&hr()), 2_000);
    assert_eq!(m.domains(), vec![hr()]);
}

#[derive(Default)]
struct RecordingSink {
    published: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn publish(&self, topic: &str, subject: &str, _message: &str) -> Result<()> {
        if self.fail {
            return Err(Error::connectivity("test-sink", "topic does not exist"));
        }
        self.published.lock().unwrap().push((topic.to_string(), subject.to_string()));
        Ok(())
    }
}

fn drifted_monitor() -> Arc<DriftMonitor> {
    let m = monitor();
    fill(&m, &mut StdRng::seed_from_u64(1), (2, 4), (15, 20));
    Arc::new(m)
}

#[tokio::test]
async fn alert_is_published_when_drift_is_found() {
    let sink = Arc::new(RecordingSink::default());
    let settings = DriftSettings { alert_topic: Some("ops-alerts".into()), ..DriftSettings::default() };
    let alerter = DriftAlerter::new(drifted_monitor(), Some(sink.clone()), &settings);

    let report = alerter.check(&hr()).await;
    assert!(report.result.drift_detected);
    assert!(report.alert_sent);
    assert!(report.alert_error.is_none());
    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "ops-alerts");
    assert!(published[0].1.contains("hr"));
}

#[tokio::test]
async fn alert_reports_missing_or_failing_sink() {
    let settings = DriftSettings { alert_topic: Some("ops-alerts".into()), ..DriftSettings::default() };
    let report = DriftAlerter::new(drifted_monitor(), None, &settings).check(&hr()).await;
    assert!(!report.alert_sent);
    assert_eq!(report.note.as_deref(), Some("alert sink not configured"));

    let failing = Arc::new(RecordingSink { fail: true, ..RecordingSink::default() });
    let report = DriftAlerter::new(drifted_monitor(), Some(failing), &settings).check(&hr()).await;
    assert!(!report.alert_sent);
    assert!(report.alert_error.unwrap().contains("topic does not exist"));
}

#[tokio::test]
async fn no_alert_without_drift() {
    let sink = Arc::new(RecordingSink::default());
    let settings = DriftSettings { alert_topic: Some("ops-alerts".into()), ..DriftSettings::default() };
    let report = DriftAlerter::new(Arc::new(monitor()), Some(sink.clone()), &settings).check(&hr()).await;
    assert!(!report.alert_sent);
    assert!(report.note.is_none());
    assert!(sink.published.lock().unwrap().is_empty());
}
