use serde::{Deserialize, Serialize};

/// Calendar constants used to place a representative timestamp inside a calendar group.
///
/// A month group is labelled with `month_centroid_day` of that month, a year group with
/// `year_centroid_month`/`year_centroid_day` of that year, and any group keyed by day at
/// `day_centroid_hour` of that day.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub month_centroid_day: u32,
    pub year_centroid_month: u32,
    pub year_centroid_day: u32,
    pub day_centroid_hour: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            month_centroid_day: 16,
            year_centroid_month: 7,
            year_centroid_day: 2,
            day_centroid_hour: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CalendarConfig::default();
        assert_eq!(config.month_centroid_day, 16);
        assert_eq!(config.year_centroid_month, 7);
        assert_eq!(config.year_centroid_day, 2);
        assert_eq!(config.day_centroid_hour, 12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: CalendarConfig = serde_json::from_str(r#"{"month_centroid_day": 15}"#).unwrap();
        assert_eq!(config.month_centroid_day, 15);
        assert_eq!(config.year_centroid_month, 7);
    }
}
