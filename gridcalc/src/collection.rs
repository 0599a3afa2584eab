use chrono::NaiveDateTime;
use ndarray::Axis;
use paste::paste;
use tracing::{debug, warn};

use crate::{
    dimension::{Coordinate, Grouping, VectorDimension},
    errors::{Error, Result},
    geom::SpatialExtent,
    identifier::{IdentifierTable, Key, KeyValue, Uid},
    masked::MaskedArray,
    variable::Variable,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Only raw values have been registered
    Raw,

    /// At least one calculation has been registered
    Calc,
}

/// One unmasked output cell, tagged with the ids of everything it belongs to.
///
/// Raw records carry a time id; calculated records carry a time group id and calculation id.
///
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub did: Uid,
    pub vid: Uid,
    pub alias: String,
    pub cid: Option<Uid>,
    pub calc: Option<String>,
    pub tid: Option<Uid>,
    pub tgid: Option<Uid>,
    pub time: Option<NaiveDateTime>,
    pub lid: Uid,
    pub gid: Uid,
    pub value: f64,
}

/// Identifier tables for every dimension of the variables added to a collection, plus the
/// variables themselves.
///
#[derive(Clone, Debug)]
pub struct CollectionIndex {
    mode: Mode,

    time: IdentifierTable,
    time_bounds: IdentifierTable,
    time_group: IdentifierTable,
    time_group_bounds: IdentifierTable,
    level: IdentifierTable,
    level_bounds: IdentifierTable,
    geometry: IdentifierTable,
    variable: IdentifierTable,
    dataset: IdentifierTable,
    calculation: IdentifierTable,

    /// In insertion order, addressed by alias
    variables: Vec<Variable>,
}

macro_rules! tables {
    ($($table:ident),*) => {
        paste! {
            impl CollectionIndex {
                $(
                    pub fn [<$table _ids>](&self) -> &IdentifierTable {
                        &self.$table
                    }
                )*
            }
        }
    };
}

tables!(
    time,
    time_bounds,
    time_group,
    time_group_bounds,
    level,
    level_bounds,
    geometry,
    variable,
    dataset,
    calculation
);

/// Keys a variable contributes to the collection's tables, computed up front so that a variable
/// whose dimensions cannot be read leaves the collection unchanged.
///
struct VariableKeys {
    time: Vec<Key>,
    time_bounds: Vec<Key>,
    level: Vec<Key>,
    level_bounds: Vec<Key>,
    geometry: Vec<Key>,
}

impl VariableKeys {
    fn new(var: &Variable) -> Result<Self> {
        let time = values(var.temporal())?;
        let time_bounds = bounds(var.temporal())?;
        let (level, level_bounds) = match var.level() {
            Some(level) => (values(level)?, bounds(level)?),
            None => (vec![vec![KeyValue::Null]], null_pair()),
        };

        let mut geometry = geometry_keys(var.spatial());
        if let Some(aggregate) = var.aggregate() {
            geometry.extend(geometry_keys(&aggregate.spatial));
        }

        Ok(Self {
            time,
            time_bounds,
            level,
            level_bounds,
            geometry,
        })
    }
}

fn values<T: Coordinate>(dim: &VectorDimension<T>) -> Result<Vec<Key>> {
    Ok(dim.value()?.iter().map(|value| vec![value.key()]).collect())
}

fn bounds<T: Coordinate>(dim: &VectorDimension<T>) -> Result<Vec<Key>> {
    if !dim.has_bounds() {
        return Ok(null_pair());
    }

    Ok(dim
        .bounds()?
        .outer_iter()
        .map(|row| vec![row[0].key(), row[1].key()])
        .collect())
}

fn null_pair() -> Vec<Key> {
    vec![vec![KeyValue::Null, KeyValue::Null]]
}

fn geometry_keys(spatial: &SpatialExtent) -> Vec<Key> {
    spatial
        .distinct_wkb()
        .into_iter()
        .map(|wkb| vec![KeyValue::Bytes(wkb)])
        .collect()
}

impl CollectionIndex {
    pub fn new() -> Self {
        Self {
            mode: Mode::Raw,
            time: IdentifierTable::new("tid"),
            time_bounds: IdentifierTable::new("tbid"),
            time_group: IdentifierTable::new("tgid"),
            time_group_bounds: IdentifierTable::new("tgbid"),
            level: IdentifierTable::new("lid"),
            level_bounds: IdentifierTable::new("lbid"),
            geometry: IdentifierTable::new("gid"),
            variable: IdentifierTable::new("vid"),
            dataset: IdentifierTable::new("did"),
            calculation: IdentifierTable::new("cid"),
            variables: vec![],
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True when every variable is empty, including when there are no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.iter().all(Variable::is_empty)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, alias: &str) -> Option<&Variable> {
        self.variables.iter().find(|var| var.alias == alias)
    }

    pub(crate) fn variable_mut(&mut self, alias: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|var| var.alias == alias)
    }

    /// Store `var` and register its dimensions.
    ///
    /// A variable with the alias of one already stored replaces it. Empty and non-empty
    /// variables cannot be mixed in one collection.
    ///
    pub fn add_variable(&mut self, var: Variable) -> Result<()> {
        let mixed = self
            .variables
            .iter()
            .any(|other| other.alias != var.alias && other.is_empty() != var.is_empty());
        if mixed {
            return Err(Error::InconsistentEmptyState(var.alias.clone()));
        }

        let keys = if var.is_empty() {
            None
        } else {
            Some(VariableKeys::new(&var)?)
        };

        self.variable.add([vec![KeyValue::from(var.name.as_str())]])?;
        self.dataset.add([vec![KeyValue::from(var.uri.clone())]])?;
        if let Some(keys) = keys {
            self.time.add(keys.time)?;
            self.time_bounds.add(keys.time_bounds)?;
            self.level.add(keys.level)?;
            self.level_bounds.add(keys.level_bounds)?;
            self.geometry.add(keys.geometry)?;
        }

        match self.variables.iter().position(|other| other.alias == var.alias) {
            Some(position) => {
                warn!("replacing variable {}", var.alias);
                self.variables[position] = var;
            }
            None => {
                debug!("added variable {}", var.alias);
                self.variables.push(var);
            }
        }

        Ok(())
    }

    /// Register the calculations and temporal groups of the variable with `alias`.
    ///
    pub fn add_calculation(&mut self, alias: &str) -> Result<()> {
        let var = self
            .variable(alias)
            .ok_or_else(|| Error::BadName(alias.to_string()))?;
        let names: Vec<Key> = var
            .calc_value()
            .iter()
            .map(|(name, _)| vec![KeyValue::from(name.as_str())])
            .collect();
        let groups = var
            .temporal_group()
            .map(|group| (group.value_keys(), group.bounds_keys()));

        self.calculation.add(names)?;
        if let Some((value, bounds)) = groups {
            self.time_group.add(value)?;
            self.time_group_bounds.add(bounds)?;
        }
        self.mode = Mode::Calc;

        Ok(())
    }

    /// Regroup calculated output by another set of calendar parts.
    ///
    pub fn group_output(&self, grouping: &Grouping) -> Result<CollectionIndex> {
        Err(Error::NotImplemented(format!(
            "regrouping output by {:?}",
            grouping
        )))
    }

    /// Flatten stored values into one record per unmasked cell.
    ///
    /// In raw mode every variable's raw values are flattened. In calc mode every calculated array
    /// is flattened, one record per group. Cells masked in the data or in the spatial extent are
    /// skipped.
    ///
    pub fn records(&self) -> Result<Vec<Record>> {
        let mut records = vec![];
        for var in self.variables.iter().filter(|var| !var.is_empty()) {
            let did = self.dataset.get(&[KeyValue::from(var.uri.clone())])?;
            let vid = self.variable.get(&[KeyValue::from(var.name.as_str())])?;
            let lids = match var.level() {
                Some(level) => values(level)?
                    .iter()
                    .map(|key| self.level.get(key))
                    .collect::<Result<Vec<_>>>()?,
                None => vec![self.level.get(&[KeyValue::Null])?],
            };
            let base = Record {
                did,
                vid,
                alias: var.alias.clone(),
                cid: None,
                calc: None,
                tid: None,
                tgid: None,
                time: None,
                lid: 0,
                gid: 0,
                value: 0.0,
            };

            match self.mode {
                Mode::Raw => {
                    let gids = self.gids(var.spatial())?;
                    let times = var.temporal().value()?;
                    let steps = times
                        .iter()
                        .map(|time| {
                            Ok((Some(self.time.get(&[time.key()])?), None, Some(*time)))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    flatten(&mut records, &base, var.value(), &steps, &lids, &gids);
                }
                Mode::Calc => {
                    let group = match var.temporal_group() {
                        Some(group) => group,
                        None => {
                            warn!("{} has no calculations, skipping its records", var.alias);
                            continue;
                        }
                    };
                    let gids = self.gids(var.calc_spatial())?;
                    let labels = group.representative_datetime().ok();
                    let steps = group
                        .value_keys()
                        .iter()
                        .enumerate()
                        .map(|(index, key)| {
                            let time = labels.as_ref().map(|labels| labels[index]);
                            Ok((None, Some(self.time_group.get(key)?), time))
                        })
                        .collect::<Result<Vec<_>>>()?;
                    for (name, value) in var.calc_value() {
                        let base = Record {
                            cid: Some(self.calculation.get(&[KeyValue::from(name.as_str())])?),
                            calc: Some(name.clone()),
                            ..base.clone()
                        };
                        flatten(&mut records, &base, value, &steps, &lids, &gids);
                    }
                }
            }
        }

        Ok(records)
    }

    /// Geometry ids of each cell in row major order, `None` for masked cells.
    fn gids(&self, spatial: &SpatialExtent) -> Result<Vec<Option<Uid>>> {
        spatial
            .wkb()
            .into_iter()
            .map(|wkb| match wkb {
                Some(wkb) => Ok(Some(self.geometry.get(&[KeyValue::Bytes(wkb)])?)),
                None => Ok(None),
            })
            .collect()
    }
}

impl Default for CollectionIndex {
    fn default() -> Self {
        Self::new()
    }
}

type Step = (Option<Uid>, Option<Uid>, Option<NaiveDateTime>);

fn flatten(
    records: &mut Vec<Record>,
    base: &Record,
    value: &MaskedArray,
    steps: &[Step],
    lids: &[Uid],
    gids: &[Option<Uid>],
) {
    for (step, &(tid, tgid, time)) in steps.iter().enumerate() {
        for (level, &lid) in lids.iter().enumerate() {
            let data = value.data.index_axis(Axis(0), step).index_axis_move(Axis(0), level);
            let mask = value.mask.index_axis(Axis(0), step).index_axis_move(Axis(0), level);

            for ((&x, &masked), gid) in data.iter().zip(mask.iter()).zip(gids) {
                if let (false, Some(gid)) = (masked, gid) {
                    records.push(Record {
                        tid,
                        tgid,
                        time,
                        lid,
                        gid: *gid,
                        value: x,
                        ..base.clone()
                    });
                }
            }
        }
    }
}
