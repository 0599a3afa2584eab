//! Reductions applied to each temporal group of a variable.

use std::{cmp::Ordering, collections::BTreeMap, fmt::Debug, sync::Arc};

use ndarray::{ArrayD, Axis, IxDyn, Zip};
use num_traits::Float;

use crate::{
    errors::{Error, Result},
    masked::{MaskedArray, FILL_VALUE},
};

/// Numeric parameters of a statistic, by name
pub type Parameters = BTreeMap<String, f64>;

/// A reduction over the leading (time) axis of a masked array.
///
pub trait Statistic: Debug + Send + Sync {
    /// Registry key
    fn key(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Names of the parameters this statistic requires
    fn parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Check `params` before any data is touched.
    fn validate(&self, params: &Parameters) -> Result<()> {
        let invalid = |reason: String| Error::InvalidParameter {
            statistic: self.key().to_string(),
            reason,
        };
        for name in params.keys() {
            if !self.parameters().contains(&name.as_str()) {
                return Err(invalid(format!("unexpected parameter {name}")));
            }
        }
        for &name in self.parameters() {
            match params.get(name) {
                Some(value) if value.is_finite() => {}
                Some(value) => return Err(invalid(format!("{name} is {value}"))),
                None => return Err(invalid(format!("missing parameter {name}"))),
            }
        }

        Ok(())
    }

    /// Reduce `data`, shaped (n, level, spatial...), to an array shaped `out_shape`, which is
    /// (1, level, spatial...).
    ///
    /// A cell whose values are all masked comes out masked.
    ///
    fn calculate(
        &self,
        data: &MaskedArray,
        out_shape: &[usize],
        params: &Parameters,
    ) -> Result<MaskedArray>;
}

/// Apply `f` to the unmasked values of each cell along axis 0. `f` returning `None` masks the
/// cell.
///
fn reduce<F>(data: &MaskedArray, out_shape: &[usize], mut f: F) -> Result<MaskedArray>
where
    F: FnMut(&mut Vec<f64>) -> Option<f64>,
{
    if data.ndim() == 0 {
        return Err(Error::shape_mismatch("reduction input", out_shape, data.shape()));
    }
    let cell_shape = &data.shape()[1..];
    let mut expected = vec![1];
    expected.extend_from_slice(cell_shape);
    if out_shape != expected.as_slice() {
        return Err(Error::shape_mismatch("reduction output", &expected, out_shape));
    }

    let mut values = ArrayD::from_elem(IxDyn(cell_shape), FILL_VALUE);
    let mut mask = ArrayD::from_elem(IxDyn(cell_shape), true);
    let mut valid = Vec::with_capacity(data.shape()[0]);
    Zip::from(&mut values)
        .and(&mut mask)
        .and(data.data.lanes(Axis(0)))
        .and(data.mask.lanes(Axis(0)))
        .for_each(|value, masked, lane, lane_mask| {
            valid.clear();
            valid.extend(
                lane.iter()
                    .zip(lane_mask.iter())
                    .filter(|&(_, &missing)| !missing)
                    .map(|(&x, _)| x),
            );
            if let Some(result) = f(&mut valid) {
                *value = result;
                *masked = false;
            }
        });

    MaskedArray::new(values.insert_axis(Axis(0)), mask.insert_axis(Axis(0)))
}

fn mean<N: Float>(values: &[N]) -> Option<N> {
    if values.is_empty() {
        return None;
    }
    let sum = values.iter().fold(N::zero(), |sum, &x| sum + x);

    Some(sum / N::from(values.len())?)
}

/// Population standard deviation
fn std<N: Float>(values: &[N]) -> Option<N> {
    let mean = mean(values)?;
    let squares: Vec<N> = values.iter().map(|&x| (x - mean) * (x - mean)).collect();

    Some(self::mean(&squares)?.sqrt())
}

/// Percentile `q` in [0, 100], interpolating linearly between closest ranks.
fn percentile<N: Float>(values: &mut [N], q: N) -> Option<N> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = q / N::from(100)? * N::from(values.len() - 1)?;
    let below = rank.floor();
    let lower = values[below.to_usize()?];
    let upper = values[rank.ceil().to_usize()?];

    Some(lower + (upper - lower) * (rank - below))
}

fn min<N: Float>(values: &[N]) -> Option<N> {
    values.iter().copied().reduce(N::min)
}

fn max<N: Float>(values: &[N]) -> Option<N> {
    values.iter().copied().reduce(N::max)
}

macro_rules! statistic {
    ($type:ident, $key:literal, $description:literal, |$values:ident| $body:expr) => {
        #[derive(Debug, Default)]
        pub struct $type;

        impl Statistic for $type {
            fn key(&self) -> &'static str {
                $key
            }

            fn description(&self) -> &'static str {
                $description
            }

            fn calculate(
                &self,
                data: &MaskedArray,
                out_shape: &[usize],
                params: &Parameters,
            ) -> Result<MaskedArray> {
                self.validate(params)?;
                reduce(data, out_shape, |$values| $body)
            }
        }
    };
}

statistic!(Mean, "mean", "Mean of the values in each group", |values| mean(values));
statistic!(Median, "median", "Median of the values in each group", |values| {
    percentile(values, 50.0)
});
statistic!(
    StandardDeviation,
    "std",
    "Population standard deviation of the values in each group",
    |values| std(values)
);
statistic!(Min, "min", "Smallest value in each group", |values| min(values));
statistic!(Max, "max", "Largest value in each group", |values| max(values));
statistic!(SampleSize, "n", "Number of unmasked values in each group", |values| {
    Some(values.len() as f64)
});

/// Value below which `percentile` percent of each group's values fall.
///
#[derive(Debug, Default)]
pub struct FrequencyPercentile;

impl Statistic for FrequencyPercentile {
    fn key(&self) -> &'static str {
        "freq_perc"
    }

    fn description(&self) -> &'static str {
        "Percentile of the values in each group"
    }

    fn parameters(&self) -> &'static [&'static str] {
        &["percentile"]
    }

    fn validate(&self, params: &Parameters) -> Result<()> {
        let q = params.get("percentile").copied();
        match q {
            Some(q) if (0.0..=100.0).contains(&q) => {}
            Some(q) => {
                return Err(Error::InvalidParameter {
                    statistic: self.key().to_string(),
                    reason: format!("percentile {q} is outside [0, 100]"),
                })
            }
            None => {}
        }
        if let Some(name) = params.keys().find(|name| *name != "percentile") {
            return Err(Error::InvalidParameter {
                statistic: self.key().to_string(),
                reason: format!("unexpected parameter {name}"),
            });
        }

        q.map(|_| ()).ok_or_else(|| Error::InvalidParameter {
            statistic: self.key().to_string(),
            reason: "missing parameter percentile".to_string(),
        })
    }

    fn calculate(
        &self,
        data: &MaskedArray,
        out_shape: &[usize],
        params: &Parameters,
    ) -> Result<MaskedArray> {
        self.validate(params)?;
        let q = params.get("percentile").copied().unwrap_or_default();

        reduce(data, out_shape, |values| percentile(values, q))
    }
}

/// Statistics available to a calculation, by key.
///
#[derive(Clone, Debug)]
pub struct Registry {
    statistics: BTreeMap<&'static str, Arc<dyn Statistic>>,
}

impl Registry {
    /// A registry with no statistics.
    pub fn new() -> Self {
        Self {
            statistics: BTreeMap::new(),
        }
    }

    /// Add `statistic`, replacing any registered under the same key.
    pub fn register(&mut self, statistic: Arc<dyn Statistic>) {
        self.statistics.insert(statistic.key(), statistic);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn Statistic>> {
        self.statistics
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownStatistic(key.to_string()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.statistics.keys().copied()
    }
}

impl Default for Registry {
    /// A registry with the built in statistics.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Mean));
        registry.register(Arc::new(Median));
        registry.register(Arc::new(StandardDeviation));
        registry.register(Arc::new(Min));
        registry.register(Arc::new(Max));
        registry.register(Arc::new(SampleSize));
        registry.register(Arc::new(FrequencyPercentile));

        registry
    }
}
