//! Calendar decomposition, grouping and filtering of time dimensions.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDateTime, Timelike};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    dimension::{group::GroupKey, TemporalGroupDimension, VectorDimension},
    errors::{Error, Result},
    helpers::mask_indices,
};

pub type TemporalDimension = VectorDimension<NaiveDateTime>;

/// Calendar parts to group by
pub type Grouping = BTreeSet<CalendarPart>;

/// Allowed values per calendar part. `None` entries place no restriction.
pub type TimeRegion = BTreeMap<CalendarPart, Option<Vec<i32>>>;

/// Number of calendar parts a timestamp decomposes into
pub const PARTS: usize = 7;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CalendarPart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Microsecond,
}

impl CalendarPart {
    /// All parts, most significant first
    pub const ALL: [CalendarPart; PARTS] = [
        CalendarPart::Year,
        CalendarPart::Month,
        CalendarPart::Day,
        CalendarPart::Hour,
        CalendarPart::Minute,
        CalendarPart::Second,
        CalendarPart::Microsecond,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Microsecond => "microsecond",
        }
    }
}

/// Split a timestamp into its calendar parts, ordered as `CalendarPart::ALL`.
///
pub fn decompose(dt: &NaiveDateTime) -> [i32; PARTS] {
    [
        dt.year(),
        dt.month() as i32,
        dt.day() as i32,
        dt.hour() as i32,
        dt.minute() as i32,
        dt.second() as i32,
        (dt.nanosecond() / 1000) as i32,
    ]
}

impl VectorDimension<NaiveDateTime> {
    /// Partition the time axis into calendar groups.
    ///
    /// Candidate groups are the cross product of the sorted distinct values observed for each
    /// part in `grouping`, with parts not in `grouping` left open. Candidates are enumerated with
    /// year outermost and candidates matching no timestamp are dropped, so group order (and thus
    /// group id) depends only on the set of observed values, not on the order of the timestamps.
    ///
    pub fn get_grouping(&self, grouping: &Grouping) -> Result<TemporalGroupDimension> {
        let value = self.value()?;
        if value.is_empty() {
            return Err(Error::EmptySubset("temporal grouping"));
        }
        let bounds = self.bounds()?;
        let parts: Vec<[i32; PARTS]> = value.iter().map(decompose).collect();

        let mut candidates = vec![[None; PARTS]];
        for part in CalendarPart::ALL {
            let choices: Vec<Option<i32>> = if grouping.contains(&part) {
                let distinct: BTreeSet<i32> = parts.iter().map(|p| p[part.index()]).collect();
                distinct.into_iter().map(Some).collect()
            } else {
                vec![None]
            };

            candidates = candidates
                .into_iter()
                .flat_map(|candidate| {
                    choices.iter().map(move |&choice| {
                        let mut candidate = candidate;
                        candidate[part.index()] = choice;
                        candidate
                    })
                })
                .collect();
        }

        let mut keys = vec![];
        let mut dgroups = vec![];
        let mut spans = vec![];
        for candidate in candidates {
            let mask: Vec<bool> = parts
                .iter()
                .map(|p| {
                    grouping
                        .iter()
                        .all(|part| candidate[part.index()] == Some(p[part.index()]))
                })
                .collect();

            let members = mask_indices(&mask);
            if members.is_empty() {
                continue;
            }

            let lower = members.iter().map(|&i| bounds[[i, 0]]).min();
            let upper = members.iter().map(|&i| bounds[[i, 1]]).max();
            if let (Some(lower), Some(upper)) = (lower, upper) {
                spans.push([lower, upper]);
            }
            keys.push(GroupKey::new(candidate));
            dgroups.push(mask.into_iter().collect());
        }

        debug!(
            "{}: grouped {} timestamps into {} groups by {:?}",
            self.name,
            value.len(),
            keys.len(),
            grouping
        );

        let bounds = Array2::from_shape_fn((spans.len(), 2), |(row, col)| spans[row][col]);
        TemporalGroupDimension::new(grouping.clone(), keys, bounds, dgroups)
    }

    /// Keep timestamps whose calendar parts are all within the region's allowed values.
    ///
    /// Returns the subset and the selected indices into this dimension.
    ///
    pub fn get_time_region(&self, region: &TimeRegion) -> Result<(Self, Vec<usize>)> {
        let region: Vec<(CalendarPart, &Vec<i32>)> = region
            .iter()
            .filter_map(|(part, allowed)| allowed.as_ref().map(|allowed| (*part, allowed)))
            .collect();
        if region.is_empty() {
            return Err(Error::InvalidTimeRegion(
                "no calendar part has a value restriction".to_string(),
            ));
        }

        let mask: Vec<bool> = self
            .value()?
            .iter()
            .map(|dt| {
                let parts = decompose(dt);
                region
                    .iter()
                    .all(|(part, allowed)| allowed.contains(&parts[part.index()]))
            })
            .collect();

        let indices = mask_indices(&mask);
        if indices.is_empty() {
            return Err(Error::EmptySubset("temporal region"));
        }

        Ok((self.take(&indices), indices))
    }

    /// Keep timestamps within `lower..=upper`.
    ///
    /// Returns the subset and the selected indices into this dimension.
    ///
    pub fn get_time_range(
        &self,
        lower: NaiveDateTime,
        upper: NaiveDateTime,
    ) -> Result<(Self, Vec<usize>)> {
        let mask: Vec<bool> = self
            .value()?
            .iter()
            .map(|dt| lower <= *dt && *dt <= upper)
            .collect();

        let indices = mask_indices(&mask);
        if indices.is_empty() {
            return Err(Error::EmptySubset("temporal range"));
        }

        Ok((self.take(&indices), indices))
    }
}
