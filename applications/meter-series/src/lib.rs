pub mod bucket;
pub mod config;
pub mod error;
pub mod expander;
pub mod generators;
pub mod input;
pub mod normalize;
pub mod obis;
pub mod reading;
pub mod series;
pub mod units;

// Re-export commonly used items
pub use bucket::{Divider, Period, Resolution, TimeBucketer};
pub use config::Config;
pub use error::{AppError, Result};
pub use expander::{CumulativeSeriesExpander, Expansion};
pub use generators::{
    AverageRateGenerator, CodeValues, CrossSeriesDifferenceGenerator, DeltaGenerator,
    PeriodGenerator, RateTolerance, ReadingGenerator,
};
pub use obis::{RegisterCode, RegisterTable};
pub use reading::{DurationValue, NormalizedReading, RawReading};
pub use series::{DerivedSeries, LabelSeries, LabelSeriesSet};
pub use units::{PhysicalUnit, UnitValue};
