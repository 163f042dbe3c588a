//! ## Purpose
//!
//! Republishes the statistics of `kopia` backup snapshots as Prometheus gauges.
//!
//! For every backup source (`user@host:path`), the latest snapshot's size,
//! file and directory counts, error count, duration, and start/end times are
//! published in one of two modes:
//! - **serve**: a long-lived process polls `kopia snapshot list` and exposes the
//!   gauges on a pull endpoint (see [`Metrics::serve`] and [`exporter::poll_cycle`])
//! - **push-once**: one `kopia snapshot create` (optionally inside a temporary
//!   ZFS snapshot) whose statistics are pushed to a Pushgateway from an isolated
//!   registry (see [`Metrics::update_and_push`] and [`exporter::snapshot_and_push`])
//!
//! ## Metrics
//!
//! The gauges and their label schemas are defined in the [`metrics`] module.

pub use crate::assert_contains::AssertContains;
pub use crate::kopia::{BackupReport, ReportError};
pub use crate::metrics::{LabelSchema, MetricKey, Metrics, MetricsConfig, MetricsRegistry};
pub use crate::report_source::{KopiaCommand, ReportSource, ZfsCommand};

pub mod exporter;
pub mod kopia;
pub mod metrics;
pub mod report_source;
pub mod test_util;

mod assert_contains;
