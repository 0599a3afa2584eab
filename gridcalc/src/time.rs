use chrono::{Duration, Months, NaiveDateTime};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::{
    dimension::TemporalDimension,
    errors::{Error, Result},
};

/// Spacing between consecutive timestamps of a regular time axis.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeStep {
    Hours(u32),
    Days(u32),
    Months(u32),
}

/// A regular time axis starting at `start`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDateTime,
    pub step: TimeStep,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, step: TimeStep) -> Self {
        Self { start, step }
    }

    /// Timestamp at `index`, or `None` if it cannot be represented.
    ///
    /// Monthly steps keep the start's day of month, clamped to the length of shorter months.
    ///
    pub fn get(&self, index: usize) -> Option<NaiveDateTime> {
        let index = i64::try_from(index).ok()?;
        match self.step {
            TimeStep::Hours(n) => self
                .start
                .checked_add_signed(Duration::try_hours(index.checked_mul(n as i64)?)?),
            TimeStep::Days(n) => self
                .start
                .checked_add_signed(Duration::try_days(index.checked_mul(n as i64)?)?),
            TimeStep::Months(n) => {
                let months = u32::try_from(index.checked_mul(n as i64)?).ok()?;
                self.start.checked_add_months(Months::new(months))
            }
        }
    }

    fn checked(&self, index: usize) -> Result<NaiveDateTime> {
        self.get(index)
            .ok_or_else(|| Error::TimeOutOfRange(format!("{:?} at index {index}", self)))
    }

    pub fn slice(&self, start: usize, stop: usize) -> Result<Array1<NaiveDateTime>> {
        (start..stop).map(|i| self.checked(i)).collect()
    }

    /// Bounds for `start..stop`, each interval running from its timestamp to the next one.
    ///
    /// A `stop` before `start` gives no rows, as with `slice`.
    ///
    pub fn bounds(&self, start: usize, stop: usize) -> Result<Array2<NaiveDateTime>> {
        let stop = stop.max(start);
        let edges = self.slice(start, stop + 1)?;
        Ok(Array2::from_shape_fn((stop - start, 2), |(row, col)| {
            edges[row + col]
        }))
    }

    /// The first `len` timestamps of this range as a time dimension.
    ///
    pub fn dimension<S: Into<String>>(
        &self,
        name: S,
        len: usize,
        bounded: bool,
    ) -> Result<TemporalDimension> {
        let bounds = if bounded {
            Some(self.bounds(0, len)?)
        } else {
            None
        };

        TemporalDimension::new(name, self.slice(0, len)?, bounds)
    }
}
