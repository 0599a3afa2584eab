use chrono::{Datelike, NaiveDate, NaiveDateTime};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::{
    config::CalendarConfig,
    dimension::{
        temporal::{CalendarPart, Grouping, PARTS},
        Coordinate,
    },
    errors::{Error, Result},
    helpers::uid_range,
    identifier::{Key, KeyValue, Uid},
};

/// Calendar parts identifying one group. Parts the grouping does not use are `None`.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey([Option<i32>; PARTS]);

impl GroupKey {
    pub fn new(parts: [Option<i32>; PARTS]) -> Self {
        Self(parts)
    }

    pub fn get(&self, part: CalendarPart) -> Option<i32> {
        self.0[part.index()]
    }

    pub fn year(&self) -> Option<i32> {
        self.get(CalendarPart::Year)
    }

    pub fn month(&self) -> Option<i32> {
        self.get(CalendarPart::Month)
    }

    pub fn day(&self) -> Option<i32> {
        self.get(CalendarPart::Day)
    }

    /// Identifier key, one column per calendar part
    pub fn key(&self) -> Key {
        self.0.iter().map(|part| KeyValue::from(*part)).collect()
    }
}

/// Result of grouping a time dimension by calendar parts.
///
/// Row `i` describes group `i`: its calendar key, the span of time covered by its members and the
/// mask selecting its members on the source time axis.
///
#[derive(Clone, Debug)]
pub struct TemporalGroupDimension {
    pub grouping: Grouping,

    value: Vec<GroupKey>,
    bounds: Array2<NaiveDateTime>,
    uid: Array1<Uid>,

    /// One membership mask per group over the source time axis
    dgroups: Vec<Array1<bool>>,
}

impl TemporalGroupDimension {
    pub fn new(
        grouping: Grouping,
        value: Vec<GroupKey>,
        bounds: Array2<NaiveDateTime>,
        dgroups: Vec<Array1<bool>>,
    ) -> Result<Self> {
        let n = value.len();
        if bounds.shape() != [n, 2] {
            return Err(Error::shape_mismatch("group bounds", &[n, 2], bounds.shape()));
        }
        if dgroups.len() != n {
            return Err(Error::shape_mismatch("group masks", &[n], &[dgroups.len()]));
        }

        Ok(Self {
            grouping,
            value,
            bounds,
            uid: uid_range(n),
            dgroups,
        })
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn value(&self) -> &[GroupKey] {
        &self.value
    }

    pub fn bounds(&self) -> ArrayView2<NaiveDateTime> {
        self.bounds.view()
    }

    pub fn uid(&self) -> ArrayView1<Uid> {
        self.uid.view()
    }

    pub fn dgroups(&self) -> &[Array1<bool>] {
        &self.dgroups
    }

    /// Identifier keys for the groups' calendar values
    pub fn value_keys(&self) -> Vec<Key> {
        self.value.iter().map(GroupKey::key).collect()
    }

    /// Identifier keys for the groups' bounds
    pub fn bounds_keys(&self) -> Vec<Key> {
        self.bounds
            .outer_iter()
            .map(|row| vec![row[0].key(), row[1].key()])
            .collect()
    }

    /// Re-express masks computed over a subset of a time axis in terms of the full axis.
    ///
    /// `indices` are the positions of the subset's rows in the full axis of length `len`.
    ///
    pub(crate) fn expand(mut self, indices: &[usize], len: usize) -> Result<Self> {
        for mask in self.dgroups.iter_mut() {
            if mask.len() != indices.len() {
                return Err(Error::shape_mismatch(
                    "group mask",
                    &[indices.len()],
                    mask.shape(),
                ));
            }
            let mut full = Array1::from_elem(len, false);
            for (&member, &index) in mask.iter().zip(indices) {
                full[index] = member;
            }
            *mask = full;
        }

        Ok(self)
    }

    /// One timestamp per group to label it with, using default calendar constants.
    ///
    pub fn representative_datetime(&self) -> Result<Vec<NaiveDateTime>> {
        self.representative_datetime_with(&CalendarConfig::default())
    }

    /// One timestamp per group to label it with.
    ///
    /// Only groupings made of year, month and day are supported. Parts the grouping leaves open
    /// are filled from the start of the group's bounds or from `config`.
    ///
    pub fn representative_datetime_with(
        &self,
        config: &CalendarConfig,
    ) -> Result<Vec<NaiveDateTime>> {
        let unsupported = || {
            Error::UnsupportedGrouping(
                self.grouping
                    .iter()
                    .map(|part| part.name().to_string())
                    .collect(),
            )
        };

        let calendar = [CalendarPart::Year, CalendarPart::Month, CalendarPart::Day];
        if self.grouping.iter().any(|part| !calendar.contains(part)) {
            return Err(unsupported());
        }
        let has = |part| self.grouping.contains(&part);
        let layout = (
            has(CalendarPart::Year),
            has(CalendarPart::Month),
            has(CalendarPart::Day),
        );

        let noon = config.day_centroid_hour;
        self.value
            .iter()
            .zip(self.bounds.axis_iter(Axis(0)))
            .map(|(key, bounds)| {
                let start = bounds[0];
                let year = key.year().unwrap_or_else(|| start.year());
                let month = key.month().map(|m| m as u32);
                let day = key.day().map(|d| d as u32);

                match (layout, month, day) {
                    ((true, false, false), _, _) => datetime(
                        year,
                        config.year_centroid_month,
                        config.year_centroid_day,
                        0,
                    ),
                    ((_, true, false), Some(month), _) => {
                        datetime(year, month, config.month_centroid_day, 0)
                    }
                    ((false, false, true), _, Some(day)) => {
                        datetime(year, start.month(), day, noon)
                    }
                    ((true, false, true), _, Some(day)) => datetime(year, 1, day, noon),
                    ((_, true, true), Some(month), Some(day)) => datetime(year, month, day, noon),
                    _ => Err(unsupported()),
                }
            })
            .collect()
    }
}

fn datetime(year: i32, month: u32, day: u32, hour: u32) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, 0, 0))
        .ok_or(Error::InvalidDate { year, month, day })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{daily, dt, dth, grouping, monthly};
    use paste::paste;

    use CalendarPart::{Day, Hour, Month, Year};

    #[test]
    fn test_key() {
        let key = GroupKey::new([Some(2000), Some(3), None, None, None, None, None]);
        assert_eq!(key.year(), Some(2000));
        assert_eq!(key.day(), None);
        assert_eq!(key.key()[1], KeyValue::Int(3));
        assert_eq!(key.key()[2], KeyValue::Null);
        assert_eq!(key.key().len(), PARTS);
    }

    #[test]
    fn test_new_checks_shapes() {
        let bounds = Array2::from_elem((2, 2), dt(2000, 1, 1));
        let result = TemporalGroupDimension::new(
            grouping(&[Year]),
            vec![GroupKey::new([Some(2000), None, None, None, None, None, None])],
            bounds,
            vec![Array1::from_elem(3, true)],
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_expand() -> Result<()> {
        let groups = monthly(2000, 2).get_grouping(&grouping(&[Month]))?;
        let groups = groups.expand(&[1, 3], 5)?;
        assert_eq!(
            groups.dgroups()[0].to_vec(),
            vec![false, true, false, false, false]
        );
        assert_eq!(
            groups.dgroups()[1].to_vec(),
            vec![false, false, false, true, false]
        );

        Ok(())
    }

    macro_rules! representative_tests {
        ($name:ident, $time:expr, [$($part:ident),*], $first:expr, $count:expr) => {
            paste! {
                #[test]
                fn [<test_representative_ $name>]() -> Result<()> {
                    let groups = $time.get_grouping(&grouping(&[$($part),*]))?;
                    let labels = groups.representative_datetime()?;
                    assert_eq!(labels.len(), $count);
                    assert_eq!(labels[0], $first);

                    Ok(())
                }
            }
        };
    }

    representative_tests!(year, monthly(2000, 24), [Year], dt(2000, 7, 2), 2);
    representative_tests!(month, monthly(2003, 24), [Month], dt(2003, 1, 16), 12);
    representative_tests!(year_month, monthly(2000, 24), [Year, Month], dt(2000, 1, 16), 24);
    representative_tests!(day, daily(2001, 3, 1, 40), [Day], dth(2001, 3, 1, 12), 31);
    representative_tests!(day_month, daily(2001, 3, 1, 40), [Day, Month], dth(2001, 3, 1, 12), 40);
    representative_tests!(day_year, daily(2001, 3, 1, 40), [Day, Year], dth(2001, 1, 1, 12), 31);
    representative_tests!(
        day_month_year,
        daily(2001, 3, 1, 40),
        [Day, Month, Year],
        dth(2001, 3, 1, 12),
        40
    );

    #[test]
    fn test_representative_with_config() -> Result<()> {
        let groups = monthly(2000, 3).get_grouping(&grouping(&[Year, Month]))?;
        let config = CalendarConfig {
            month_centroid_day: 1,
            ..Default::default()
        };
        assert_eq!(
            groups.representative_datetime_with(&config)?,
            vec![dt(2000, 1, 1), dt(2000, 2, 1), dt(2000, 3, 1)]
        );

        Ok(())
    }

    #[test]
    fn test_representative_unsupported() -> Result<()> {
        let time = daily(2001, 3, 1, 3);
        let groups = time.get_grouping(&grouping(&[Day, Hour]))?;
        assert!(matches!(
            groups.representative_datetime(),
            Err(Error::UnsupportedGrouping(_))
        ));

        let groups = time.get_grouping(&grouping(&[]))?;
        assert!(matches!(
            groups.representative_datetime(),
            Err(Error::UnsupportedGrouping(_))
        ));

        Ok(())
    }
}
