//! Grouped temporal calculations over the variables of a collection.
//!
//! A calculation groups the shared time axis by calendar parts, then applies each requested
//! statistic to every group of every variable. Results are attached to the variables and
//! registered in the collection's calculation and group tables.

pub mod library;

use std::sync::Arc;

use chrono::NaiveDateTime;
use ndarray::{Axis, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    collection::CollectionIndex,
    dimension::{Grouping, TemporalGroupDimension},
    errors::{Error, Result},
    geom::SpatialExtent,
    helpers::mask_indices,
    masked::MaskedArray,
    variable::{CalcSource, Variable},
};

pub use library::{Parameters, Registry, Statistic};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalculationMode {
    /// Each statistic reads one variable
    #[default]
    Univariate,

    /// Statistics read several variables at once
    Multivariate,
}

/// One requested statistic.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatisticSpec {
    /// Registry key of the statistic
    pub func: String,

    /// Name of the output. Defaults to `func`.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub params: Parameters,
}

impl StatisticSpec {
    pub fn new<S: Into<String>>(func: S) -> Self {
        Self {
            func: func.into(),
            name: None,
            params: Parameters::new(),
        }
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }
}

/// Everything needed to set up a calculation, in a form that can be read from configuration.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculationRequest {
    pub grouping: Grouping,
    pub time_range: Option<(NaiveDateTime, NaiveDateTime)>,
    pub calc: Vec<StatisticSpec>,
    pub mode: CalculationMode,
    pub use_aggregated: bool,
}

#[derive(Clone, Debug)]
struct Function {
    name: String,
    params: Parameters,
    statistic: Arc<dyn Statistic>,
}

/// Applies statistics to temporal groups.
///
/// Statistic keys and parameters are resolved against a registry when the engine is built, so a
/// bad request fails before any data is touched.
///
#[derive(Clone, Debug)]
pub struct CalculationEngine {
    grouping: Grouping,
    time_range: Option<(NaiveDateTime, NaiveDateTime)>,
    functions: Vec<Function>,
    mode: CalculationMode,
    use_aggregated: bool,
}

impl CalculationEngine {
    pub fn new(grouping: Grouping, calc: &[StatisticSpec], registry: &Registry) -> Result<Self> {
        let functions = calc
            .iter()
            .map(|spec| {
                let statistic = registry.get(&spec.func)?;
                statistic.validate(&spec.params)?;

                Ok(Function {
                    name: spec.name.clone().unwrap_or_else(|| spec.func.clone()),
                    params: spec.params.clone(),
                    statistic,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            grouping,
            time_range: None,
            functions,
            mode: CalculationMode::Univariate,
            use_aggregated: false,
        })
    }

    pub fn from_request(request: &CalculationRequest, registry: &Registry) -> Result<Self> {
        let engine = Self::new(request.grouping.clone(), &request.calc, registry)?
            .with_mode(request.mode)
            .with_aggregated(request.use_aggregated);

        Ok(match request.time_range {
            Some((lower, upper)) => engine.with_time_range(lower, upper),
            None => engine,
        })
    }

    /// Only group timestamps within `lower..=upper`.
    pub fn with_time_range(mut self, lower: NaiveDateTime, upper: NaiveDateTime) -> Self {
        self.time_range = Some((lower, upper));
        self
    }

    pub fn with_mode(mut self, mode: CalculationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Compute on spatially aggregated values instead of raw ones.
    pub fn with_aggregated(mut self, use_aggregated: bool) -> Self {
        self.use_aggregated = use_aggregated;
        self
    }

    /// Compute every statistic for every variable of `coll`.
    ///
    /// Output arrays are shaped (group, level, spatial...). Cells masked in the spatial extent
    /// stay masked. Nothing is attached unless every computation succeeds. A collection of empty
    /// variables is left untouched.
    ///
    pub fn execute(&self, coll: &mut CollectionIndex) -> Result<()> {
        if coll.is_empty() {
            info!("collection is empty, skipping calculation");
            return Ok(());
        }

        let groups = self.groups(coll.variables())?;
        let source = if self.use_aggregated {
            CalcSource::Aggregated
        } else {
            CalcSource::Raw
        };

        let mut staged: Vec<Vec<(String, MaskedArray, usize)>> = vec![vec![]; coll.len()];
        for (seq, function) in self.functions.iter().enumerate() {
            if self.mode == CalculationMode::Multivariate {
                return Err(Error::NotImplemented(
                    "multivariate calculations".to_string(),
                ));
            }

            for (var, results) in coll.variables().iter().zip(staged.iter_mut()) {
                let (value, spatial) = self.source(var)?;
                let result = calculate(function, value, spatial, &groups)?;
                debug!(
                    "{}: computed {} over {} groups",
                    var.alias,
                    function.name,
                    groups.len()
                );
                results.push((function.name.clone(), result, seq + 1));
            }
        }

        let aliases: Vec<String> = coll.variables().iter().map(|var| var.alias.clone()).collect();
        for (alias, results) in aliases.iter().zip(staged) {
            let var = coll
                .variable_mut(alias)
                .ok_or_else(|| Error::BadName(alias.clone()))?;
            var.set_temporal_group(groups.clone(), source);
            for (name, value, seq) in results {
                var.attach_calculation(name, value, seq);
            }
            coll.add_calculation(alias)?;
        }

        info!(
            "calculated {} statistics for {} variables",
            self.functions.len(),
            aliases.len()
        );

        Ok(())
    }

    /// Group the time axis shared by `vars`, with masks over the full axis.
    ///
    fn groups(&self, vars: &[Variable]) -> Result<TemporalGroupDimension> {
        let reference = match vars.first() {
            Some(var) => var.temporal(),
            None => return Err(Error::EmptySubset("collection variables")),
        };
        let times = reference.value()?;
        for var in &vars[1..] {
            if var.temporal().value()? != times {
                return Err(Error::TemporalMismatch(var.alias.clone()));
            }
        }

        match self.time_range {
            Some((lower, upper)) => {
                let (subset, indices) = reference.get_time_range(lower, upper)?;
                subset
                    .get_grouping(&self.grouping)?
                    .expand(&indices, reference.len())
            }
            None => reference.get_grouping(&self.grouping),
        }
    }

    fn source<'a>(&self, var: &'a Variable) -> Result<(&'a MaskedArray, &'a SpatialExtent)> {
        if self.use_aggregated {
            var.aggregate()
                .map(|aggregate| (&aggregate.value, &aggregate.spatial))
                .ok_or_else(|| Error::MissingAggregate(var.alias.clone()))
        } else {
            Ok((var.value(), var.spatial()))
        }
    }
}

/// Apply `function` to each group of `value`.
///
fn calculate(
    function: &Function,
    value: &MaskedArray,
    spatial: &SpatialExtent,
    groups: &TemporalGroupDimension,
) -> Result<MaskedArray> {
    let mut out_shape = value.shape().to_vec();
    out_shape[0] = groups.len();
    let mut group_shape = out_shape.clone();
    group_shape[0] = 1;

    let mut out = MaskedArray::masked(&out_shape);
    out.mask.fill(false);
    out.mask_where(spatial.mask())?;

    for (index, dgroup) in groups.dgroups().iter().enumerate() {
        let members = value.select(Axis(0), &mask_indices(dgroup));
        let reduced = function
            .statistic
            .calculate(&members, &group_shape, &function.params)?;
        if reduced.shape() != group_shape.as_slice() {
            return Err(Error::shape_mismatch(
                format!("{} output", function.name),
                &group_shape,
                reduced.shape(),
            ));
        }

        out.data
            .index_axis_mut(Axis(0), index)
            .assign(&reduced.data.index_axis(Axis(0), 0));
        Zip::from(out.mask.index_axis_mut(Axis(0), index))
            .and(reduced.mask.index_axis(Axis(0), 0))
            .for_each(|masked, &missing| *masked = *masked || missing);
    }

    Ok(out)
}
