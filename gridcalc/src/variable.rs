use ndarray::ArrayD;
use tracing::debug;

use crate::{
    dimension::{TemporalDimension, TemporalGroupDimension, VectorDimension},
    errors::{Error, Result},
    geom::SpatialExtent,
    masked::MaskedArray,
};

/// Values of a variable after spatial aggregation, with the extent they were aggregated to.
///
#[derive(Clone, Debug)]
pub struct Aggregate {
    pub value: MaskedArray,
    pub spatial: SpatialExtent,
}

/// Which values a variable's calculations were computed from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalcSource {
    Raw,
    Aggregated,
}

/// A named data field laid out as (time, level, spatial...).
///
/// A variable with no data carries empty dimensions and is flagged with `is_empty`.
///
#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub alias: String,
    pub uri: Option<String>,
    pub units: Option<String>,

    temporal: TemporalDimension,
    level: Option<VectorDimension<f64>>,
    spatial: SpatialExtent,

    value: MaskedArray,
    aggregate: Option<Aggregate>,

    calc_value: Vec<(String, MaskedArray)>,
    calc_source: CalcSource,
    cid: Vec<usize>,
    temporal_group: Option<TemporalGroupDimension>,

    is_empty: bool,
}

impl Variable {
    /// A variable with data.
    ///
    /// `value` must have shape (time, level, spatial...) where an absent level dimension counts
    /// as a single level.
    ///
    pub fn new<S: Into<String>>(
        name: S,
        value: MaskedArray,
        temporal: TemporalDimension,
        level: Option<VectorDimension<f64>>,
        spatial: SpatialExtent,
    ) -> Result<Self> {
        let name = name.into();
        let levels = level.as_ref().map(|level| level.len()).unwrap_or(1);
        let expected = expected_shape(temporal.len(), levels, spatial.shape());
        if value.shape() != expected.as_slice() {
            return Err(Error::shape_mismatch(
                format!("variable {name}"),
                &expected,
                value.shape(),
            ));
        }

        Ok(Self {
            alias: name.clone(),
            name,
            uri: None,
            units: None,
            temporal,
            level,
            spatial,
            value,
            aggregate: None,
            calc_value: vec![],
            calc_source: CalcSource::Raw,
            cid: vec![],
            temporal_group: None,
            is_empty: false,
        })
    }

    /// A variable for which a subset found no data.
    ///
    pub fn empty<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            uri: None,
            units: None,
            temporal: TemporalDimension::empty("time"),
            level: None,
            spatial: SpatialExtent::empty(),
            value: MaskedArray::masked(&[0, 1, 0, 0]),
            aggregate: None,
            calc_value: vec![],
            calc_source: CalcSource::Raw,
            cid: vec![],
            temporal_group: None,
            is_empty: true,
        }
    }

    pub fn with_alias<S: Into<String>>(mut self, alias: S) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_units<S: Into<String>>(mut self, units: S) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Mask spatial cells outside the area of interest. `mask` must match the spatial shape.
    ///
    pub fn with_spatial_mask(mut self, mask: ArrayD<bool>) -> Result<Self> {
        self.spatial = self.spatial.with_mask(mask)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    pub fn temporal(&self) -> &TemporalDimension {
        &self.temporal
    }

    pub fn level(&self) -> Option<&VectorDimension<f64>> {
        self.level.as_ref()
    }

    pub fn spatial(&self) -> &SpatialExtent {
        &self.spatial
    }

    /// Number of levels, counting an absent level dimension as one
    pub fn levels(&self) -> usize {
        self.level.as_ref().map(|level| level.len()).unwrap_or(1)
    }

    pub fn value(&self) -> &MaskedArray {
        &self.value
    }

    /// Attach values aggregated to `spatial`. Time and level extents must match the raw values.
    ///
    pub fn set_aggregate(&mut self, value: MaskedArray, spatial: SpatialExtent) -> Result<()> {
        let expected = expected_shape(self.temporal.len(), self.levels(), spatial.shape());
        if value.shape() != expected.as_slice() {
            return Err(Error::shape_mismatch(
                format!("aggregate of {}", self.alias),
                &expected,
                value.shape(),
            ));
        }
        self.aggregate = Some(Aggregate { value, spatial });

        Ok(())
    }

    pub fn aggregate(&self) -> Option<&Aggregate> {
        self.aggregate.as_ref()
    }

    /// Calculated arrays in the order they were computed
    pub fn calc_value(&self) -> &[(String, MaskedArray)] {
        &self.calc_value
    }

    pub fn calc(&self, name: &str) -> Option<&MaskedArray> {
        self.calc_value
            .iter()
            .find(|(calc, _)| calc == name)
            .map(|(_, value)| value)
    }

    pub fn calc_source(&self) -> CalcSource {
        self.calc_source
    }

    /// Spatial extent the calculated arrays are laid out on
    pub fn calc_spatial(&self) -> &SpatialExtent {
        match (self.calc_source, &self.aggregate) {
            (CalcSource::Aggregated, Some(aggregate)) => &aggregate.spatial,
            _ => &self.spatial,
        }
    }

    /// Sequence numbers of the calculations, one per calculated array
    pub fn cid(&self) -> &[usize] {
        &self.cid
    }

    pub fn temporal_group(&self) -> Option<&TemporalGroupDimension> {
        self.temporal_group.as_ref()
    }

    /// Store a calculated array. A calculation of the same name is replaced in place.
    ///
    pub(crate) fn attach_calculation(&mut self, name: String, value: MaskedArray, seq: usize) {
        match self.calc_value.iter().position(|(calc, _)| *calc == name) {
            Some(position) => {
                self.calc_value[position].1 = value;
                self.cid[position] = seq;
            }
            None => {
                self.calc_value.push((name, value));
                self.cid.push(seq);
            }
        }
    }

    /// Lay calculated arrays out on `group`, computed from `source`.
    ///
    /// Arrays computed over other groups or from another source no longer line up and are
    /// dropped.
    ///
    pub(crate) fn set_temporal_group(&mut self, group: TemporalGroupDimension, source: CalcSource) {
        let unchanged = self.calc_source == source
            && self.temporal_group.as_ref().is_some_and(|current| {
                current.value() == group.value() && current.dgroups() == group.dgroups()
            });
        if !unchanged && !self.calc_value.is_empty() {
            debug!(
                "{}: dropping {} calculations over previous groups",
                self.alias,
                self.calc_value.len()
            );
            self.calc_value.clear();
            self.cid.clear();
        }
        self.temporal_group = Some(group);
        self.calc_source = source;
    }
}

fn expected_shape(time: usize, levels: usize, spatial: &[usize]) -> Vec<usize> {
    let mut shape = vec![time, levels];
    shape.extend_from_slice(spatial);
    shape
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dimension::CalendarPart,
        testing::{grid, grouping, monthly, ramp},
    };
    use ndarray::{array, IxDyn};

    #[test]
    fn test_new() -> Result<()> {
        let var = ramp("tas", monthly(2000, 3), None, 2, 3);
        assert_eq!(var.value().shape(), &[3, 1, 2, 3]);
        assert_eq!(var.alias, "tas");
        assert!(!var.is_empty());
        assert_eq!(var.levels(), 1);

        Ok(())
    }

    #[test]
    fn test_new_checks_shape() {
        let value = MaskedArray::from_data(ArrayD::zeros(IxDyn(&[3, 2, 2, 3])));
        let result = Variable::new("tas", value, monthly(2000, 3), None, grid(2, 3));
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_new_with_level() -> Result<()> {
        let level = VectorDimension::new("level", array![100.0, 500.0], None)?;
        let value = MaskedArray::from_data(ArrayD::zeros(IxDyn(&[3, 2, 2, 3])));
        let var = Variable::new("tas", value, monthly(2000, 3), Some(level), grid(2, 3))?;
        assert_eq!(var.levels(), 2);

        Ok(())
    }

    #[test]
    fn test_empty() {
        let var = Variable::empty("tas").with_uri("file.nc");
        assert!(var.is_empty());
        assert!(var.temporal().is_empty());
        assert_eq!(var.uri.as_deref(), Some("file.nc"));
    }

    #[test]
    fn test_with_spatial_mask() -> Result<()> {
        let var = ramp("tas", monthly(2000, 3), None, 1, 2)
            .with_spatial_mask(ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![false, true]).unwrap())?;
        assert!(var.spatial().mask()[[0, 1]]);
        assert_eq!(var.value().shape(), &[3, 1, 1, 2]);

        let bad = ArrayD::from_elem(IxDyn(&[2, 2]), false);
        let result = ramp("tas", monthly(2000, 3), None, 1, 2).with_spatial_mask(bad);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));

        Ok(())
    }

    #[test]
    fn test_set_aggregate() -> Result<()> {
        let mut var = ramp("tas", monthly(2000, 3), None, 2, 3);
        let bad = MaskedArray::from_data(ArrayD::zeros(IxDyn(&[2, 1, 1, 1])));
        assert!(var.set_aggregate(bad, grid(1, 1)).is_err());

        let good = MaskedArray::from_data(ArrayD::zeros(IxDyn(&[3, 1, 1, 1])));
        var.set_aggregate(good, grid(1, 1))?;
        assert_eq!(var.aggregate().map(|a| a.spatial.shape()), Some(&[1, 1][..]));

        Ok(())
    }

    #[test]
    fn test_attach_calculation_replaces_by_name() {
        let mut var = ramp("tas", monthly(2000, 3), None, 1, 1);
        var.attach_calculation("mean".into(), MaskedArray::masked(&[1, 1, 1, 1]), 1);
        var.attach_calculation("max".into(), MaskedArray::masked(&[1, 1, 1, 1]), 2);
        var.attach_calculation("mean".into(), MaskedArray::masked(&[2, 1, 1, 1]), 3);

        let names: Vec<&str> = var.calc_value().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["mean", "max"]);
        assert_eq!(var.cid(), &[3, 2]);
        assert_eq!(var.calc("mean").map(|v| v.shape()[0]), Some(2));
        assert!(var.calc("min").is_none());
    }

    #[test]
    fn test_new_group_drops_stale_calculations() -> Result<()> {
        let mut var = ramp("tas", monthly(2000, 24), None, 1, 1);
        let yearly = var.temporal().get_grouping(&grouping(&[CalendarPart::Year]))?;
        let monthly_groups = var.temporal().get_grouping(&grouping(&[CalendarPart::Month]))?;

        var.set_temporal_group(yearly.clone(), CalcSource::Raw);
        var.attach_calculation("mean".into(), MaskedArray::masked(&[2, 1, 1, 1]), 1);

        // Same groups keep what is there
        var.set_temporal_group(yearly, CalcSource::Raw);
        assert_eq!(var.calc_value().len(), 1);

        var.set_temporal_group(monthly_groups, CalcSource::Raw);
        assert!(var.calc_value().is_empty());
        assert!(var.cid().is_empty());
        assert_eq!(var.temporal_group().map(|group| group.len()), Some(12));

        Ok(())
    }
}
