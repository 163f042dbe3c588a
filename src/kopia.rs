//! Parsed types for `kopia` snapshot reports in JSON format
//!
//! Every field is decoded as optional, since the shape differs between
//! `kopia snapshot list --json` and `kopia snapshot create --json` (and across
//! kopia versions). Presence is checked explicitly in [`BackupReport::sample`],
//! so a missing field is reported instead of being silently defaulted.

use crate::metrics::{LabelSchema, MetricKey};
use serde::Deserialize;

pub use self::error::ReportError;
pub use self::timestamp::{parse_timestamp, unix_seconds, whole_seconds_between};

mod error;
mod timestamp;

/// One snapshot record printed by `kopia`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(missing_docs)] // no need to document all fields
pub struct BackupReport {
    pub id: Option<String>,
    pub source: Option<Source>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub stats: Option<Stats>,
    pub root_entry: Option<RootEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(missing_docs)] // no need to document all fields
pub struct Source {
    pub host: Option<String>,
    pub user_name: Option<String>,
    pub path: Option<String>,
}

/// Upload statistics, present on most `kopia` versions
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(missing_docs)] // no need to document all fields
pub struct Stats {
    pub total_size: Option<u64>,
    pub file_count: Option<u64>,
    pub dir_count: Option<u64>,
    pub error_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(missing_docs)] // no need to document all fields
pub struct RootEntry {
    pub summ: Option<Summary>,
}

/// Directory summary of the snapshot root, used when [`Stats`] is absent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
#[expect(missing_docs)] // no need to document all fields
pub struct Summary {
    pub size: Option<u64>,
    pub files: Option<u64>,
    pub dirs: Option<u64>,
    pub num_failed: Option<u64>,
}

/// Validated gauge values for one [`BackupReport`]
#[derive(Clone, Debug, PartialEq)]
#[expect(missing_docs)] // fields mirror the gauge names
pub struct Sample {
    pub key: MetricKey,
    pub total_size_bytes: u64,
    pub file_count: u64,
    pub dir_count: u64,
    pub error_count: u64,
    pub duration_seconds: i64,
    pub start_time: jiff::Timestamp,
    pub end_time: jiff::Timestamp,
}

struct Counts {
    total_size: u64,
    files: u64,
    dirs: u64,
    errors: u64,
}

/// Parses the output of `kopia snapshot list --json` or `kopia snapshot create --json`
///
/// Accepts either a JSON array of snapshots or a single snapshot object.
///
/// # Errors
///
/// Returns an error if the content is not JSON of the expected shape
pub fn parse_reports(json_content: &str) -> Result<Vec<BackupReport>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<BackupReport>),
        One(Box<BackupReport>),
    }

    Ok(match serde_json::from_str(json_content)? {
        OneOrMany::Many(reports) => reports,
        OneOrMany::One(report) => vec![*report],
    })
}

pub(crate) fn required<T>(field: &'static str, value: Option<T>) -> Result<T, ReportError> {
    value.ok_or(ReportError::MissingField(field))
}

impl BackupReport {
    /// Extracts the label key and all gauge values
    ///
    /// Nothing is defaulted: every value must be present, both timestamps must
    /// parse, and the end time must not precede the start time.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, a timestamp is
    /// malformed, or the duration is negative
    pub fn sample(&self, schema: LabelSchema) -> Result<Sample, ReportError> {
        let source = required("source", self.source.as_ref())?;
        let key = MetricKey::from_source(schema, self.id.as_deref(), source)?;

        let Counts {
            total_size,
            files,
            dirs,
            errors,
        } = self.counts()?;

        let start_time = parse_timestamp(
            "startTime",
            required("startTime", self.start_time.as_deref())?,
        )?;
        let end_time = parse_timestamp("endTime", required("endTime", self.end_time.as_deref())?)?;
        let duration_seconds = whole_seconds_between(start_time, end_time)?;

        Ok(Sample {
            key,
            total_size_bytes: total_size,
            file_count: files,
            dir_count: dirs,
            error_count: errors,
            duration_seconds,
            start_time,
            end_time,
        })
    }

    fn counts(&self) -> Result<Counts, ReportError> {
        match (&self.stats, &self.root_entry) {
            (Some(stats), _) => stats.counts(),
            (None, Some(root_entry)) => {
                required("rootEntry.summ", root_entry.summ.as_ref())?.counts()
            }
            (None, None) => Err(ReportError::MissingField("stats")),
        }
    }
}

impl Stats {
    fn counts(&self) -> Result<Counts, ReportError> {
        let Self {
            total_size,
            file_count,
            dir_count,
            error_count,
        } = *self;
        Ok(Counts {
            total_size: required("stats.totalSize", total_size)?,
            files: required("stats.fileCount", file_count)?,
            dirs: required("stats.dirCount", dir_count)?,
            errors: required("stats.errorCount", error_count)?,
        })
    }
}

impl Summary {
    fn counts(&self) -> Result<Counts, ReportError> {
        let Self {
            size,
            files,
            dirs,
            num_failed,
        } = *self;
        Ok(Counts {
            total_size: required("rootEntry.summ.size", size)?,
            files: required("rootEntry.summ.files", files)?,
            dirs: required("rootEntry.summ.dirs", dirs)?,
            errors: required("rootEntry.summ.numFailed", num_failed)?,
        })
    }
}
