//! Query-length drift detection per domain, with optional alerting.
pub mod alert;
pub mod ks;
mod monitor;

pub use alert::{DriftAlertReport, DriftAlerter, TracingAlertSink};
pub use ks::{ks_two_sample, KsOutcome};
pub use monitor::{DriftMonitor, DriftResult, DriftStats, INSUFFICIENT_DATA};
