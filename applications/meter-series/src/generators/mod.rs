//! Single-pass generators turning ordered readings into interval values.
//!
//! Every generator instance owns the accumulator state of exactly one
//! stream. Feed it readings of one series in true timestamp order and
//! discard it afterwards; an instance is not meant to be shared between
//! streams.

mod average;
mod delta;
mod difference;
mod period;

pub use average::{AverageRateGenerator, RateTolerance};
pub use delta::DeltaGenerator;
pub use difference::{CodeValues, CrossSeriesDifferenceGenerator};
pub use period::PeriodGenerator;

use crate::error::Result;
use crate::reading::{DurationValue, NormalizedReading};
use crate::units::UnitValue;

/// Generator consuming one normalized reading at a time.
pub trait ReadingGenerator {
    fn calculate_next(&mut self, reading: &NormalizedReading) -> Result<Option<DurationValue>>;

    /// Runs the generator over a whole ordered series.
    fn generate_all<'a, I>(&mut self, readings: I) -> Result<Vec<DurationValue>>
    where
        I: IntoIterator<Item = &'a NormalizedReading>,
        Self: Sized,
    {
        let mut out = Vec::new();
        for reading in readings {
            if let Some(value) = self.calculate_next(reading)? {
                out.push(value);
            }
        }
        Ok(out)
    }
}

/// Increment between two consecutive readings of a series.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transition {
    pub value: UnitValue,
    pub device_ids: Vec<String>,
    pub crossing: bool,
}

/// Counters reset when a meter is exchanged, so a change of device yields a
/// zero increment in the new device's unit instead of a difference.
pub(crate) fn transition(prev: &NormalizedReading, cur: &NormalizedReading) -> Result<Transition> {
    if cur.is_same_device(prev) {
        Ok(Transition {
            value: cur.unit_value().subtract(&prev.unit_value())?,
            device_ids: vec![prev.device_id().to_string()],
            crossing: false,
        })
    } else {
        Ok(Transition {
            value: UnitValue::zero(cur.unit_value().unit),
            device_ids: vec![prev.device_id().to_string(), cur.device_id().to_string()],
            crossing: true,
        })
    }
}

/// Zero-valued interval opening a series at its first reading.
pub(crate) fn bootstrap(cur: &NormalizedReading) -> DurationValue {
    DurationValue {
        start: cur.timestamp(),
        end: cur.timestamp(),
        normalized_start: cur.normalized_timestamp(),
        normalized_end: cur.normalized_timestamp(),
        value: UnitValue::zero(cur.unit_value().unit),
        device_ids: vec![cur.device_id().to_string()],
    }
}
