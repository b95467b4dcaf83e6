use super::{bootstrap, transition, ReadingGenerator};
use crate::error::Result;
use crate::reading::{same_device, DurationValue, NormalizedReading};
use crate::units::UnitValue;
use tracing::trace;

/// Running total of a cumulative register since the first reading of the
/// series.
///
/// Increments follow the delta rule: zero across a meter exchange, the
/// counter difference otherwise. The device list is every distinct device
/// seen so far, in first-seen order.
#[derive(Debug, Default)]
pub struct PeriodGenerator {
    run: Option<Run>,
}

#[derive(Debug)]
struct Run {
    first: NormalizedReading,
    previous: NormalizedReading,
    total: UnitValue,
    device_ids: Vec<String>,
}

impl PeriodGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calculate_next(&mut self, cur: &NormalizedReading) -> Result<DurationValue> {
        let Some(run) = self.run.as_mut() else {
            let out = bootstrap(cur);
            self.run = Some(Run {
                first: cur.clone(),
                previous: cur.clone(),
                total: out.value,
                device_ids: out.device_ids.clone(),
            });
            return Ok(out);
        };

        let step = transition(&run.previous, cur)?;
        // A crossing contributes nothing, whatever unit the new meter uses.
        if !step.crossing {
            run.total = run.total.checked_add(&step.value)?;
        }
        if !run.device_ids.iter().any(|id| same_device(id, cur.device_id())) {
            run.device_ids.push(cur.device_id().to_string());
        }
        run.previous = cur.clone();
        trace!(total = run.total.value, devices = run.device_ids.len(), "period step");

        Ok(DurationValue {
            start: run.first.timestamp(),
            end: cur.timestamp(),
            normalized_start: run.first.normalized_timestamp(),
            normalized_end: cur.normalized_timestamp(),
            value: run.total,
            device_ids: run.device_ids.clone(),
        })
    }
}

impl ReadingGenerator for PeriodGenerator {
    fn calculate_next(&mut self, reading: &NormalizedReading) -> Result<Option<DurationValue>> {
        PeriodGenerator::calculate_next(self, reading).map(Some)
    }
}
