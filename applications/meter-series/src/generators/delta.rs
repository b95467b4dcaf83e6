use super::{bootstrap, transition, ReadingGenerator};
use crate::error::Result;
use crate::reading::{DurationValue, NormalizedReading};
use tracing::trace;

/// Change of a cumulative register between consecutive readings.
#[derive(Debug, Default)]
pub struct DeltaGenerator {
    previous: Option<NormalizedReading>,
}

impl DeltaGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one value per reading; the first reading yields a zero-width,
    /// zero-valued interval.
    pub fn calculate_next(&mut self, cur: &NormalizedReading) -> Result<DurationValue> {
        let out = match &self.previous {
            None => bootstrap(cur),
            Some(prev) => {
                let step = transition(prev, cur)?;
                trace!(
                    device_ids = ?step.device_ids,
                    crossing = step.crossing,
                    value = step.value.value,
                    "delta step"
                );
                DurationValue::between(prev, cur, step.value, step.device_ids)
            }
        };
        self.previous = Some(cur.clone());
        Ok(out)
    }
}

impl ReadingGenerator for DeltaGenerator {
    fn calculate_next(&mut self, reading: &NormalizedReading) -> Result<Option<DurationValue>> {
        DeltaGenerator::calculate_next(self, reading).map(Some)
    }
}
