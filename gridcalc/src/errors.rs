use std::result;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// An array's shape does not agree with the dimensions it is bound to
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A subset operation selected nothing
    #[error("empty subset from {0} selection")]
    EmptySubset(&'static str),

    /// Some but not all variables in a collection are empty
    #[error("collection mixes empty and non-empty variables (adding {0})")]
    InconsistentEmptyState(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// No identifier row matches the requested key
    #[error("no identifier for key {0}")]
    LookupMiss(String),

    /// A key's width or column kinds do not agree with the table
    #[error("key mismatch: {0}")]
    KeyMismatch(String),

    /// Values requested from a dimension that has neither resident values nor a usable source
    #[error("dimension {0} has no data source")]
    NoDataSource(String),

    #[error("unsupported grouping: {0:?}")]
    UnsupportedGrouping(Vec<String>),

    #[error("invalid date {year}-{month}-{day}")]
    InvalidDate { year: i32, month: u32, day: u32 },

    /// A generated timestamp falls outside the representable calendar
    #[error("time out of range: {0}")]
    TimeOutOfRange(String),

    #[error("invalid time region: {0}")]
    InvalidTimeRegion(String),

    #[error("unknown statistic: {0}")]
    UnknownStatistic(String),

    #[error("invalid parameter for {statistic}: {reason}")]
    InvalidParameter { statistic: String, reason: String },

    /// Variables calculated together must share a time axis
    #[error("variable {0} does not share the calculation's time axis")]
    TemporalMismatch(String),

    #[error("variable {0} has no aggregated values")]
    MissingAggregate(String),

    #[error("no variable with alias {0}")]
    BadName(String),

    /// Failure reported by a dimension source while loading values
    #[error("source error: {0}")]
    Source(String),
}

impl Error {
    pub(crate) fn shape_mismatch<S: Into<String>>(
        what: S,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Self::ShapeMismatch {
            what: what.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

pub type Result<T> = result::Result<T, Error>;
