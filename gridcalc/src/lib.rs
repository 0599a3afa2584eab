pub mod calc;
mod collection;
mod config;
pub mod dimension;
mod errors;
mod geom;
mod helpers;
mod identifier;
mod masked;
mod time;
mod variable;

#[cfg(test)]
mod testing;

pub use calc::{
    CalculationEngine, CalculationMode, CalculationRequest, Parameters, Registry, Statistic,
    StatisticSpec,
};
pub use collection::{CollectionIndex, Mode, Record};
pub use config::CalendarConfig;
pub use dimension::{
    CalendarPart, Coordinate, DimensionRow, DimensionSource, DimensionValue, GroupKey, Grouping,
    TemporalDimension, TemporalGroupDimension, TimeRegion, VectorDimension, RESOLUTION_LIMIT,
};
pub use errors::{Error, Result};
pub use geom::{Geometry, SpatialExtent};
pub use helpers::rearrange;
pub use identifier::{IdentifierTable, Key, KeyKind, KeyValue, Uid};
pub use masked::{MaskedArray, FILL_VALUE};
pub use time::{TimeRange, TimeStep};
pub use variable::{Aggregate, CalcSource, Variable};
