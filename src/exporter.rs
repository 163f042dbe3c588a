//! Glue between a [`ReportSource`] and the [`Metrics`] publisher, for both modes

use crate::metrics::{Gateway, MetricKey, Metrics, MetricsConfig};
use crate::report_source::{ReportSource, ZfsCommand};
use eyre::{Result, WrapErr as _};
use std::path::Path;

/// Updates `metrics` from the latest report of every source, returning the number applied
///
/// The first invalid report aborts the cycle; reports before it stay applied.
///
/// # Errors
///
/// Returns an error if the reports cannot be listed or one of them is invalid
pub fn poll_cycle(metrics: &Metrics, source: &impl ReportSource) -> Result<usize> {
    let reports = source.list_latest()?;
    for report in &reports {
        if let Err(e) = metrics.update(report) {
            tracing::error!(?report, "rejected backup report: {e}");
            return Err(e.into());
        }
    }
    Ok(reports.len())
}

/// One push-once invocation: snapshot a path, then push its statistics
#[derive(Clone, Copy, Debug)]
pub struct SnapshotJob<'a> {
    /// Directory to snapshot
    pub path: &'a Path,
    /// Passed to `kopia snapshot create --override-source`
    pub override_source: Option<&'a str>,
    /// ZFS snapshot wrapped around the `kopia` invocation, and the `zfs` binary to manage it
    pub zfs: Option<(&'a ZfsCommand, &'a str)>,
    /// Destination for the pushed metrics
    pub gateway: &'a Gateway,
    /// Pushgateway job name
    pub job_name: &'a str,
    /// Gauge options for the isolated registry
    pub config: &'a MetricsConfig,
}

/// Runs the snapshot described by `job` and pushes the resulting gauges
///
/// # Errors
///
/// Returns an error if any command fails, the report is invalid, or the push fails
pub fn snapshot_and_push(source: &impl ReportSource, job: &SnapshotJob<'_>) -> Result<MetricKey> {
    let SnapshotJob {
        path,
        override_source,
        zfs,
        gateway,
        job_name,
        config,
    } = *job;

    let create = || source.create_snapshot(path, override_source);
    let report = match zfs {
        Some((zfs, name)) => zfs.with_snapshot(name, create)?,
        None => create()?,
    };

    Metrics::update_and_push(&report, gateway, job_name, config)
        .wrap_err_with(|| format!("failed to publish snapshot of {}", path.display()))
}
