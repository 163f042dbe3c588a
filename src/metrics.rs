//! Prometheus gauges republishing the latest [`BackupReport`] per source
//!
//! Seven gauges share one label schema:
//!
//! | gauge              | value                                  |
//! |--------------------|----------------------------------------|
//! | `total_size_bytes` | `stats.totalSize`                      |
//! | `file_count`       | `stats.fileCount`                      |
//! | `dir_count`        | `stats.dirCount`                       |
//! | `error_count`      | `stats.errorCount`                     |
//! | `duration_seconds` | `endTime - startTime`, whole seconds   |
//! | `start_time`       | `startTime` as unix seconds            |
//! | `end_time`         | `endTime` as unix seconds              |
//!
//! Values are overwritten on every update for the same [`MetricKey`], never
//! accumulated, and never evicted.

use crate::kopia::{self, BackupReport, ReportError, Sample, Source, required};
use prometheus::GaugeVec;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

pub use self::push::{Gateway, PushError};
pub use self::registry::{MetricsRegistry, RegistrationError, Scope};
pub use self::serve::{BindError, ServeHandle};

mod push;
mod registry;
mod serve;

/// Name and help text of one gauge
#[derive(Clone, Copy, Debug)]
pub struct GaugeDef {
    /// Metric name, before any namespace prefix
    pub name: &'static str,
    /// `# HELP` text
    pub help: &'static str,
}

/// All gauges, in the order they are registered
pub const GAUGES: [GaugeDef; 7] = [
    GaugeDef {
        name: "total_size_bytes",
        help: "Total size of the backup in bytes",
    },
    GaugeDef {
        name: "file_count",
        help: "Number of files in the backup",
    },
    GaugeDef {
        name: "dir_count",
        help: "Number of directories in the backup",
    },
    GaugeDef {
        name: "error_count",
        help: "Number of errors encountered during the backup",
    },
    GaugeDef {
        name: "duration_seconds",
        help: "Duration of the backup in seconds",
    },
    GaugeDef {
        name: "start_time",
        help: "Backup start time as unix timestamp",
    },
    GaugeDef {
        name: "end_time",
        help: "Backup end time as unix timestamp",
    },
];

/// Label set identifying one independently tracked backup target
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LabelSchema {
    /// `{host, path, user}`
    #[default]
    Source,
    /// `{host, id, path, user}`, so distinct snapshots of one source do not overwrite each other
    Snapshot,
}
impl LabelSchema {
    /// Label names, sorted
    #[must_use]
    pub fn label_names(self) -> &'static [&'static str] {
        match self {
            Self::Source => &["host", "path", "user"],
            Self::Snapshot => &["host", "id", "path", "user"],
        }
    }
}

/// Label values for one time series of each gauge
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    /// Snapshot id, only set under [`LabelSchema::Snapshot`]
    pub id: Option<String>,
    /// `source.host`
    pub host: String,
    /// `source.path`
    pub path: String,
    /// `source.userName`
    pub user: String,
}
impl MetricKey {
    /// Builds the key for `schema` from a report's `id` and `source`
    ///
    /// # Errors
    ///
    /// Returns an error if any source field is missing, or `id` is missing
    /// under [`LabelSchema::Snapshot`]
    pub fn from_source(
        schema: LabelSchema,
        id: Option<&str>,
        source: &Source,
    ) -> Result<Self, ReportError> {
        let Source {
            host,
            user_name,
            path,
        } = source;
        let id = match schema {
            LabelSchema::Source => None,
            LabelSchema::Snapshot => Some(required("id", id)?.to_string()),
        };
        Ok(Self {
            id,
            host: required("source.host", host.clone())?,
            path: required("source.path", path.clone())?,
            user: required("source.userName", user_name.clone())?,
        })
    }

    /// Label name/value pairs, in the order of [`LabelSchema::label_names`]
    #[must_use]
    pub fn label_pairs(&self) -> Vec<(&'static str, &str)> {
        let Self {
            id,
            host,
            path,
            user,
        } = self;
        let mut pairs = Vec::with_capacity(4);
        pairs.push(("host", host.as_str()));
        if let Some(id) = id {
            pairs.push(("id", id.as_str()));
        }
        pairs.push(("path", path.as_str()));
        pairs.push(("user", user.as_str()));
        pairs
    }

    fn label_values(&self) -> Vec<&str> {
        self.label_pairs()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }
}
impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in self.label_pairs() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{name}={value:?}")?;
        }
        Ok(())
    }
}

/// Options shared by every gauge of a [`Metrics`] set
#[derive(Clone, Debug, Default)]
pub struct MetricsConfig {
    /// Label schema, fixed for the lifetime of the gauges
    pub schema: LabelSchema,
    /// Optional prefix, rendered as `<namespace>_<name>`
    pub namespace: Option<String>,
}

struct GaugeSet {
    total_size_bytes: GaugeVec,
    file_count: GaugeVec,
    dir_count: GaugeVec,
    error_count: GaugeVec,
    duration_seconds: GaugeVec,
    start_time: GaugeVec,
    end_time: GaugeVec,
}
impl GaugeSet {
    fn register(
        registry: &MetricsRegistry,
        config: &MetricsConfig,
    ) -> Result<Self, RegistrationError> {
        let mut registration = registry.begin_registration(config);
        let [
            total_size_bytes,
            file_count,
            dir_count,
            error_count,
            duration_seconds,
            start_time,
            end_time,
        ] = &GAUGES;
        let gauges = Self {
            total_size_bytes: registration.gauge(total_size_bytes)?,
            file_count: registration.gauge(file_count)?,
            dir_count: registration.gauge(dir_count)?,
            error_count: registration.gauge(error_count)?,
            duration_seconds: registration.gauge(duration_seconds)?,
            start_time: registration.gauge(start_time)?,
            end_time: registration.gauge(end_time)?,
        };
        registration.commit();
        Ok(gauges)
    }
}

/// Publisher owning the backup gauges in one [`MetricsRegistry`]
pub struct Metrics {
    registry: MetricsRegistry,
    schema: LabelSchema,
    gauges: GaugeSet,
    update_lock: Mutex<()>,
}
impl Metrics {
    /// Registers all [`GAUGES`] into `registry`
    ///
    /// # Errors
    ///
    /// Returns an error if any gauge name is already registered (e.g. a second
    /// publisher on the [process-wide](MetricsRegistry::process_wide) registry).
    /// Gauges registered before the failure are removed again.
    pub fn new(
        registry: MetricsRegistry,
        config: &MetricsConfig,
    ) -> Result<Self, RegistrationError> {
        let gauges = GaugeSet::register(&registry, config)?;
        Ok(Self {
            registry,
            schema: config.schema,
            gauges,
            update_lock: Mutex::new(()),
        })
    }

    /// Sets all gauges for the report's [`MetricKey`], returning that key
    ///
    /// The report is fully validated first, so on error no gauge is created or modified.
    ///
    /// # Errors
    ///
    /// Returns an error if the report is missing required fields, has a
    /// malformed timestamp, or has a negative duration
    pub fn update(&self, report: &BackupReport) -> Result<MetricKey, ReportError> {
        let sample = report.sample(self.schema)?;
        self.apply(&sample);
        tracing::debug!(key = %sample.key, "updated backup gauges");
        Ok(sample.key)
    }

    #[expect(clippy::cast_precision_loss)] // gauges are f64
    fn apply(&self, sample: &Sample) {
        let Sample {
            key,
            total_size_bytes,
            file_count,
            dir_count,
            error_count,
            duration_seconds,
            start_time,
            end_time,
        } = sample;
        let GaugeSet {
            total_size_bytes: total_size_bytes_gauge,
            file_count: file_count_gauge,
            dir_count: dir_count_gauge,
            error_count: error_count_gauge,
            duration_seconds: duration_seconds_gauge,
            start_time: start_time_gauge,
            end_time: end_time_gauge,
        } = &self.gauges;

        let values = key.label_values();
        let values = values.as_slice();

        // the lock only orders writers against each other, the guarded data is the gauges
        let _guard = self
            .update_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        total_size_bytes_gauge
            .with_label_values(values)
            .set(*total_size_bytes as f64);
        file_count_gauge
            .with_label_values(values)
            .set(*file_count as f64);
        dir_count_gauge.with_label_values(values).set(*dir_count as f64);
        error_count_gauge
            .with_label_values(values)
            .set(*error_count as f64);
        duration_seconds_gauge
            .with_label_values(values)
            .set(*duration_seconds as f64);
        start_time_gauge
            .with_label_values(values)
            .set(kopia::unix_seconds(*start_time));
        end_time_gauge
            .with_label_values(values)
            .set(kopia::unix_seconds(*end_time));
    }

    /// Binds the pull endpoint on `0.0.0.0:port` and serves it from a background thread
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be bound
    pub fn serve(&self, port: u16) -> Result<ServeHandle, BindError> {
        serve::bind(self.registry.clone(), SocketAddr::from(([0, 0, 0, 0], port)))
    }

    /// Pushes every gauge in this publisher's registry to `gateway`
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway is unreachable or rejects the payload
    pub fn push(
        &self,
        gateway: &Gateway,
        job: &str,
        grouping: &MetricKey,
    ) -> Result<(), PushError> {
        gateway.push(&self.registry, job, grouping)
    }

    /// Updates a fresh [isolated](MetricsRegistry::isolated) publisher from
    /// `report` and pushes it to `gateway`, grouped by the report's [`MetricKey`]
    ///
    /// The isolated registry is dropped on return, on success and failure alike.
    ///
    /// # Errors
    ///
    /// Returns an error if the report is invalid or the push fails
    pub fn update_and_push(
        report: &BackupReport,
        gateway: &Gateway,
        job: &str,
        config: &MetricsConfig,
    ) -> Result<MetricKey, PushOnceError> {
        let metrics = Self::new(MetricsRegistry::isolated(), config)?;
        let key = metrics.update(report)?;
        metrics.push(gateway, job, &key)?;
        tracing::info!(%key, job, "pushed backup metrics");
        Ok(key)
    }

    /// Registry holding this publisher's gauges
    #[must_use]
    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }
}

/// Failure of [`Metrics::update_and_push`]
#[derive(Debug)]
pub enum PushOnceError {
    /// Gauges could not be registered in the isolated registry
    Registration(RegistrationError),
    /// Report was rejected before any push
    Report(ReportError),
    /// Gateway was unreachable or rejected the payload
    Push(PushError),
}
impl From<RegistrationError> for PushOnceError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}
impl From<ReportError> for PushOnceError {
    fn from(value: ReportError) -> Self {
        Self::Report(value)
    }
}
impl From<PushError> for PushOnceError {
    fn from(value: PushError) -> Self {
        Self::Push(value)
    }
}
impl std::error::Error for PushOnceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Registration(e) => Some(e),
            Self::Report(e) => Some(e),
            Self::Push(e) => Some(e),
        }
    }
}
impl fmt::Display for PushOnceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration(_) => write!(f, "failed to prepare isolated registry"),
            Self::Report(_) => write!(f, "invalid backup report"),
            Self::Push(_) => write!(f, "failed to push metrics"),
        }
    }
}
