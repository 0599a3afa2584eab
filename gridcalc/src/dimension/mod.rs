//! One-dimensional coordinates with optional interval bounds.
//!
//! A `VectorDimension` is either resident, holding its values in memory, or deferred, holding only
//! the indices of its values in some external source. Deferred dimensions are loaded explicitly
//! with `materialize`. Every slicing operation returns a new, independent dimension.

pub mod group;
pub mod temporal;

use std::{fmt::Debug, ops::Range, sync::Arc};

use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use num_traits::ToPrimitive;

use crate::{
    errors::{Error, Result},
    helpers::{mask_indices, rearrange, uid_range},
    identifier::{KeyValue, Uid},
};

pub use group::{GroupKey, TemporalGroupDimension};
pub use temporal::{CalendarPart, Grouping, TemporalDimension, TimeRegion};

/// Maximum number of leading rows looked at when computing a dimension's resolution
pub const RESOLUTION_LIMIT: usize = 10;

/// Element type of a dimension.
///
pub trait Coordinate: Copy + Debug + PartialOrd + Send + Sync + 'static {
    /// Distance from `lower` to `upper` in the dimension's natural unit. Time is measured in days.
    fn delta(lower: Self, upper: Self) -> f64;

    /// Identifier key column for this value
    fn key(self) -> KeyValue;
}

macro_rules! numeric_coordinate {
    ($type:ty) => {
        impl Coordinate for $type {
            fn delta(lower: Self, upper: Self) -> f64 {
                upper.to_f64().unwrap_or(f64::NAN) - lower.to_f64().unwrap_or(f64::NAN)
            }

            fn key(self) -> KeyValue {
                self.into()
            }
        }
    };
}

numeric_coordinate!(i32);
numeric_coordinate!(i64);
numeric_coordinate!(f32);
numeric_coordinate!(f64);

impl Coordinate for NaiveDateTime {
    fn delta(lower: Self, upper: Self) -> f64 {
        let delta = upper - lower;
        delta.num_milliseconds() as f64 / 86_400_000.0
    }

    fn key(self) -> KeyValue {
        KeyValue::DateTime(self)
    }
}

/// External provider of dimension values, eg a file reader.
///
pub trait DimensionSource<T>: Debug + Send + Sync
where
    T: Coordinate,
{
    /// Load the values, and bounds if the source has them, at the given source indices.
    fn load(&self, src_idx: ArrayView1<usize>) -> Result<(Array1<T>, Option<Array2<T>>)>;
}

#[derive(Clone, Debug)]
pub enum DimensionValue<T>
where
    T: Coordinate,
{
    Resident(Array1<T>),
    Deferred {
        source: Option<Arc<dyn DimensionSource<T>>>,
        src_idx: Array1<usize>,
    },
}

/// A single row of a dimension, as handed to writers.
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DimensionRow<T> {
    pub uid: Uid,
    pub value: T,
    pub lower: T,
    pub upper: T,
}

#[derive(Clone, Debug)]
pub struct VectorDimension<T>
where
    T: Coordinate,
{
    pub name: String,
    pub units: Option<String>,

    value: DimensionValue<T>,
    bounds: Option<Array2<T>>,
    uid: Array1<Uid>,
}

impl<T> VectorDimension<T>
where
    T: Coordinate,
{
    /// A resident dimension.
    ///
    /// `bounds`, if given, must have shape (n, 2). Bound pairs are reordered so that the lower
    /// bound comes first.
    ///
    pub fn new<S: Into<String>>(name: S, value: Array1<T>, bounds: Option<Array2<T>>) -> Result<Self> {
        let name = name.into();
        let bounds = match bounds {
            Some(bounds) => Some(check_bounds(&name, value.len(), bounds)?),
            None => None,
        };

        Ok(Self {
            uid: uid_range(value.len()),
            value: DimensionValue::Resident(value),
            bounds,
            name,
            units: None,
        })
    }

    /// A dimension whose values still live in `source` at `src_idx`.
    ///
    /// A missing `source` is allowed so that a reader can hand out index-only dimensions, but
    /// such a dimension can never be materialized.
    ///
    pub fn deferred<S: Into<String>>(
        name: S,
        source: Option<Arc<dyn DimensionSource<T>>>,
        src_idx: Array1<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            units: None,
            uid: uid_range(src_idx.len()),
            value: DimensionValue::Deferred { source, src_idx },
            bounds: None,
        }
    }

    pub fn empty<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            units: None,
            uid: uid_range(0),
            value: DimensionValue::Resident(Array1::from_vec(vec![])),
            bounds: None,
        }
    }

    /// Replace the automatically assigned surrogate ids.
    ///
    pub fn with_uid(mut self, uid: Array1<Uid>) -> Result<Self> {
        if uid.len() != self.len() {
            return Err(Error::shape_mismatch(
                format!("{} uid", self.name),
                &[self.len()],
                uid.shape(),
            ));
        }
        self.uid = uid;

        Ok(self)
    }

    pub fn with_units<S: Into<String>>(mut self, units: S) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn len(&self) -> usize {
        self.uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_empty()
    }

    pub fn shape(&self) -> [usize; 1] {
        [self.len()]
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.value, DimensionValue::Resident(_))
    }

    pub fn has_bounds(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn uid(&self) -> ArrayView1<Uid> {
        self.uid.view()
    }

    /// Source indices of a deferred dimension
    pub fn src_idx(&self) -> Option<ArrayView1<usize>> {
        match &self.value {
            DimensionValue::Resident(_) => None,
            DimensionValue::Deferred { src_idx, .. } => Some(src_idx.view()),
        }
    }

    /// Load values from the source of a deferred dimension. Does nothing for a resident one.
    ///
    pub fn materialize(&mut self) -> Result<()> {
        let (value, bounds) = match &self.value {
            DimensionValue::Resident(_) => return Ok(()),
            DimensionValue::Deferred { source: None, .. } => {
                return Err(Error::NoDataSource(self.name.clone()));
            }
            DimensionValue::Deferred {
                source: Some(source),
                src_idx,
            } => source.load(src_idx.view())?,
        };

        if value.len() != self.len() {
            return Err(Error::shape_mismatch(
                format!("{} source values", self.name),
                &[self.len()],
                value.shape(),
            ));
        }
        self.bounds = match bounds {
            Some(bounds) => Some(check_bounds(&self.name, value.len(), bounds)?),
            None => None,
        };
        self.value = DimensionValue::Resident(value);

        Ok(())
    }

    /// The dimension's values. Fails for a deferred dimension that has not been materialized.
    ///
    pub fn value(&self) -> Result<ArrayView1<T>> {
        match &self.value {
            DimensionValue::Resident(value) => Ok(value.view()),
            DimensionValue::Deferred { .. } => Err(Error::NoDataSource(self.name.clone())),
        }
    }

    /// The dimension's bounds. Without explicit bounds every value is its own degenerate
    /// interval.
    ///
    pub fn bounds(&self) -> Result<Array2<T>> {
        match &self.bounds {
            Some(bounds) => Ok(bounds.clone()),
            None => {
                let value = self.value()?;
                Ok(Array2::from_shape_fn((value.len(), 2), |(row, _)| value[row]))
            }
        }
    }

    /// Average interval width over the leading rows, or `None` with fewer than two values.
    ///
    /// When the first row has degenerate bounds the spacing between consecutive values is used
    /// instead of bound widths.
    ///
    pub fn resolution(&self) -> Result<Option<f64>> {
        let value = self.value()?;
        if value.len() < 2 {
            return Ok(None);
        }
        let bounds = self.bounds()?;
        let limit = value.len().min(RESOLUTION_LIMIT);

        let deltas: Vec<f64> = if bounds[[0, 0]] == bounds[[0, 1]] {
            (1..limit)
                .map(|i| T::delta(value[i - 1], value[i]))
                .collect()
        } else {
            (0..limit)
                .map(|i| T::delta(bounds[[i, 0]], bounds[[i, 1]]))
                .collect()
        };

        Ok(Some(deltas.iter().sum::<f64>() / deltas.len() as f64))
    }

    /// New dimension made of the rows at `indices`, in that order.
    ///
    pub fn take(&self, indices: &[usize]) -> Self {
        let value = match &self.value {
            DimensionValue::Resident(value) => {
                DimensionValue::Resident(value.select(Axis(0), indices))
            }
            DimensionValue::Deferred { source, src_idx } => DimensionValue::Deferred {
                source: source.clone(),
                src_idx: src_idx.select(Axis(0), indices),
            },
        };

        Self {
            name: self.name.clone(),
            units: self.units.clone(),
            value,
            bounds: self
                .bounds
                .as_ref()
                .map(|bounds| bounds.select(Axis(0), indices)),
            uid: self.uid.select(Axis(0), indices),
        }
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        let indices: Vec<usize> = range.collect();
        self.take(&indices)
    }

    /// New dimension made of the rows where `mask` is `true`.
    ///
    pub fn select(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.len() {
            return Err(Error::shape_mismatch(
                format!("{} selection", self.name),
                &[self.len()],
                &[mask.len()],
            ));
        }

        Ok(self.take(&mask_indices(mask)))
    }

    /// Rows whose bounds interval contains either `lower` or `upper`.
    ///
    pub fn get_between(&self, lower: T, upper: T) -> Result<Self> {
        if self.is_empty() {
            return Ok(self.clone());
        }

        let bounds = self.bounds()?;
        let mask: Vec<bool> = bounds
            .outer_iter()
            .map(|row| {
                let contains = |n: T| row[0] <= n && n <= row[1];
                contains(lower) || contains(upper)
            })
            .collect();

        self.select(&mask)
    }

    /// Iterate over rows of a resident dimension.
    ///
    pub fn rows(&self) -> Result<impl Iterator<Item = DimensionRow<T>> + '_> {
        let value = self.value()?;
        let bounds = self.bounds()?;

        Ok((0..self.len()).map(move |i| DimensionRow {
            uid: self.uid[i],
            value: value[i],
            lower: bounds[[i, 0]],
            upper: bounds[[i, 1]],
        }))
    }
}

fn check_bounds<T>(name: &str, len: usize, mut bounds: Array2<T>) -> Result<Array2<T>>
where
    T: Coordinate,
{
    if bounds.shape() != [len, 2] {
        return Err(Error::shape_mismatch(
            format!("{name} bounds"),
            &[len, 2],
            bounds.shape(),
        ));
    }
    for mut row in bounds.outer_iter_mut() {
        let (lower, upper) = rearrange(row[0], row[1]);
        row[0] = lower;
        row[1] = upper;
    }

    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::dt;
    use ndarray::{arr2, array};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct Squares {
        loads: AtomicUsize,
    }

    impl DimensionSource<f64> for Squares {
        fn load(&self, src_idx: ArrayView1<usize>) -> Result<(Array1<f64>, Option<Array2<f64>>)> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok((src_idx.mapv(|i| (i * i) as f64), None))
        }
    }

    #[test]
    fn test_one_value() -> Result<()> {
        let dim = VectorDimension::new("level", array![5.0], None)?;
        assert_eq!(dim.value()?[0], 5.0);
        assert_eq!(dim.uid(), array![1]);
        assert_eq!(dim.shape(), [1]);
        assert_eq!(dim.bounds()?, arr2(&[[5.0, 5.0]]));
        assert_eq!(dim.resolution()?, None);

        let first = dim.slice(0..1);
        assert_eq!(first.value()?[0], 5.0);
        assert_eq!(first.uid()[0], 1);

        Ok(())
    }

    #[test]
    fn test_with_bounds() -> Result<()> {
        let dim = VectorDimension::new(
            "level",
            array![4.0, 5.0, 6.0],
            Some(arr2(&[[3.0, 5.0], [4.0, 6.0], [7.0, 5.0]])),
        )?;
        assert_eq!(dim.bounds()?, arr2(&[[3.0, 5.0], [4.0, 6.0], [5.0, 7.0]]));
        assert_eq!(dim.uid(), array![1, 2, 3]);
        assert_eq!(dim.rows()?.count(), 3);
        assert_eq!(dim.resolution()?, Some(2.0));

        Ok(())
    }

    #[test]
    fn test_bounds_shape_checked() {
        let dim = VectorDimension::new("level", array![4.0, 5.0], Some(arr2(&[[3.0, 5.0]])));
        assert!(matches!(dim, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_resolution_from_values() -> Result<()> {
        let dim = VectorDimension::new("level", array![5, 10, 15], None)?.with_units("large");
        assert_eq!(dim.resolution()?, Some(5.0));
        assert_eq!(dim.units.as_deref(), Some("large"));

        Ok(())
    }

    #[test]
    fn test_resolution_uses_leading_rows() -> Result<()> {
        let mut values: Vec<f64> = (0..RESOLUTION_LIMIT).map(|i| i as f64).collect();
        values.push(1000.0);
        let dim = VectorDimension::new("x", Array1::from_vec(values), None)?;
        assert_eq!(dim.resolution()?, Some(1.0));

        Ok(())
    }

    #[test]
    fn test_deferred() -> Result<()> {
        let source = Arc::new(Squares::default());
        let mut dim = VectorDimension::deferred(
            "x",
            Some(source.clone() as Arc<dyn DimensionSource<f64>>),
            array![0, 1, 2, 3],
        );
        assert_eq!(dim.uid(), array![1, 2, 3, 4]);
        assert!(!dim.is_resident());
        assert!(matches!(dim.value(), Err(Error::NoDataSource(_))));
        assert!(matches!(dim.resolution(), Err(Error::NoDataSource(_))));

        let mut tail = dim.slice(2..4);
        assert_eq!(tail.src_idx().unwrap(), array![2, 3]);

        dim.materialize()?;
        assert_eq!(dim.value()?, array![0.0, 1.0, 4.0, 9.0]);

        tail.materialize()?;
        assert_eq!(tail.value()?, array![4.0, 9.0]);
        assert_eq!(tail.uid(), array![3, 4]);
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        // Materializing again is a no-op
        dim.materialize()?;
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[test]
    fn test_deferred_without_source() {
        let mut dim: VectorDimension<f64> = VectorDimension::deferred("x", None, array![0, 1]);
        assert_eq!(dim.len(), 2);
        assert!(matches!(dim.materialize(), Err(Error::NoDataSource(_))));
    }

    #[test]
    fn test_empty() -> Result<()> {
        let dim: VectorDimension<f64> = VectorDimension::empty("x");
        assert_eq!(dim.uid().len(), 0);
        assert!(dim.is_empty());
        assert!(dim.get_between(0.0, 1.0)?.is_empty());

        Ok(())
    }

    #[test]
    fn test_get_between_overlap() -> Result<()> {
        let dim = VectorDimension::new(
            "time",
            array![dt(2000, 6, 15), dt(2000, 7, 16)],
            Some(arr2(&[
                [dt(2000, 6, 1), dt(2000, 6, 30)],
                [dt(2000, 7, 1), dt(2000, 7, 31)],
            ])),
        )?;
        let sub = dim.get_between(dt(2000, 6, 15), dt(2000, 6, 15))?;
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.uid(), array![1]);

        let sub = dim.get_between(dt(2000, 6, 20), dt(2000, 7, 2))?;
        assert_eq!(sub.uid(), array![1, 2]);

        // Query interval strictly containing a row's bounds does not select it
        let sub = dim.get_between(dt(2000, 5, 1), dt(2000, 8, 15))?;
        assert!(sub.is_empty());

        Ok(())
    }

    #[test]
    fn test_slices_are_independent() -> Result<()> {
        let dim = VectorDimension::new("x", array![1.0, 2.0, 3.0], None)?;
        let sub = dim.select(&[true, false, true])?;
        let sub = sub.with_uid(array![7, 8])?;
        assert_eq!(sub.value()?, array![1.0, 3.0]);
        assert_eq!(dim.uid(), array![1, 2, 3]);
        assert!(dim.select(&[true]).is_err());

        Ok(())
    }

    #[test]
    fn test_datetime_resolution_in_days() -> Result<()> {
        let dim = VectorDimension::new("time", array![dt(2000, 1, 1), dt(2000, 1, 2)], None)?;
        assert_eq!(dim.resolution()?, Some(1.0));

        Ok(())
    }
}
