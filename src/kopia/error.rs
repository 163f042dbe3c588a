/// Reason a [`BackupReport`](crate::BackupReport) cannot be turned into gauge values
#[derive(Debug)]
pub enum ReportError {
    /// A required field is absent (named by its JSON path)
    MissingField(&'static str),
    /// A timestamp does not match the RFC 3339 format `kopia` prints
    InvalidTimestamp {
        /// JSON field name
        field: &'static str,
        /// Raw offending value
        value: String,
        /// Underlying parse failure
        source: jiff::Error,
    },
    /// The snapshot ends before it starts
    NegativeDuration {
        /// Parsed `startTime`
        start: jiff::Timestamp,
        /// Parsed `endTime`
        end: jiff::Timestamp,
    },
}
impl ReportError {
    /// Returns `true` for malformed values, `false` for absent or inconsistent ones
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        match self {
            Self::InvalidTimestamp { .. } => true,
            Self::MissingField(_) | Self::NegativeDuration { .. } => false,
        }
    }
}
impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidTimestamp { source, .. } => Some(source),
            Self::MissingField(_) | Self::NegativeDuration { .. } => None,
        }
    }
}
impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => {
                write!(f, "missing required field {field:?} in backup report")
            }
            Self::InvalidTimestamp { field, value, .. } => {
                write!(f, "invalid timestamp in {field:?}: {value:?}")
            }
            Self::NegativeDuration { start, end } => {
                write!(f, "negative backup duration: endTime {end} is before startTime {start}")
            }
        }
    }
}
