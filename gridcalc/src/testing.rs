use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{ArrayD, IxDyn};

use crate::{
    dimension::{CalendarPart, Grouping, TemporalDimension, VectorDimension},
    geom::SpatialExtent,
    masked::MaskedArray,
    time::{TimeRange, TimeStep},
    variable::Variable,
};

pub(crate) fn dt(year: i32, month: u32, day: u32) -> NaiveDateTime {
    dth(year, month, day, 0)
}

pub(crate) fn dth(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .unwrap()
}

pub(crate) fn grouping(parts: &[CalendarPart]) -> Grouping {
    parts.iter().copied().collect()
}

/// `n` months starting in January of `year`, stamped on the 15th, without bounds.
pub(crate) fn monthly(year: i32, n: usize) -> TemporalDimension {
    TimeRange::new(dt(year, 1, 15), TimeStep::Months(1))
        .dimension("time", n, false)
        .unwrap()
}

/// `n` months starting in January of `year`, stamped on the 1st, bounded by the 1st of each
/// month and the 1st of the next.
pub(crate) fn monthly_bounded(year: i32, n: usize) -> TemporalDimension {
    TimeRange::new(dt(year, 1, 1), TimeStep::Months(1))
        .dimension("time", n, true)
        .unwrap()
}

/// `n` consecutive days at midnight, without bounds.
pub(crate) fn daily(year: i32, month: u32, day: u32, n: usize) -> TemporalDimension {
    TimeRange::new(dt(year, month, day), TimeStep::Days(1))
        .dimension("time", n, false)
        .unwrap()
}

/// Point grid with `rows` x `cols` cells, one degree apart.
pub(crate) fn grid(rows: usize, cols: usize) -> SpatialExtent {
    let x: Vec<f64> = (0..cols).map(|col| col as f64).collect();
    let y: Vec<f64> = (0..rows).map(|row| row as f64).collect();
    SpatialExtent::points(&x, &y)
}

/// A variable whose value at (t, l, row, col) is `100 * t + 10 * l + row * cols + col`.
pub(crate) fn ramp(
    name: &str,
    time: TemporalDimension,
    level: Option<VectorDimension<f64>>,
    rows: usize,
    cols: usize,
) -> Variable {
    let levels = level.as_ref().map(|level| level.len()).unwrap_or(1);
    let data = ArrayD::from_shape_fn(IxDyn(&[time.len(), levels, rows, cols]), |index| {
        (100 * index[0] + 10 * index[1] + index[2] * cols + index[3]) as f64
    });

    Variable::new(name, MaskedArray::from_data(data), time, level, grid(rows, cols)).unwrap()
}
