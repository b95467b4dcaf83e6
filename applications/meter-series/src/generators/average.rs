use super::{transition, ReadingGenerator};
use crate::error::{AppError, Result};
use crate::reading::{DurationValue, NormalizedReading};
use crate::units::UnitValue;
use chrono::TimeDelta;
use tracing::debug;

/// Accepted spacing between two readings for an average rate to be
/// computed. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTolerance {
    min: TimeDelta,
    max: TimeDelta,
}

impl RateTolerance {
    pub fn new(min: TimeDelta, max: TimeDelta) -> Result<Self> {
        if min < TimeDelta::zero() || max <= TimeDelta::zero() || min > max {
            return Err(AppError::Validation(format!(
                "invalid rate tolerance [{}s, {}s]",
                min.num_seconds(),
                max.num_seconds()
            )));
        }
        Ok(Self { min, max })
    }

    /// Band of -20%/+20% around the nominal reporting cadence.
    pub fn around(nominal: TimeDelta) -> Self {
        Self {
            min: nominal * 4 / 5,
            max: nominal * 6 / 5,
        }
    }

    pub fn min(&self) -> TimeDelta {
        self.min
    }

    pub fn max(&self) -> TimeDelta {
        self.max
    }

    pub fn contains(&self, elapsed: TimeDelta) -> bool {
        elapsed >= self.min && elapsed <= self.max
    }
}

impl Default for RateTolerance {
    /// Meters report every 5 minutes.
    fn default() -> Self {
        Self::around(TimeDelta::minutes(5))
    }
}

/// Average rate (power, flow) between consecutive readings of a cumulative
/// register.
///
/// The rate unit follows the unit of the current reading, so a unit change
/// shows up on the very interval where it happens. Steps whose spacing is
/// outside the tolerance band emit nothing.
#[derive(Debug, Default)]
pub struct AverageRateGenerator {
    tolerance: RateTolerance,
    previous: Option<NormalizedReading>,
}

impl AverageRateGenerator {
    pub fn new(tolerance: RateTolerance) -> Self {
        Self {
            tolerance,
            previous: None,
        }
    }

    /// A reading that fails leaves the previous reading in place.
    pub fn calculate_next(&mut self, cur: &NormalizedReading) -> Result<Option<DurationValue>> {
        let out = match &self.previous {
            None => None,
            Some(prev) => self.rate_between(prev, cur)?,
        };
        self.previous = Some(cur.clone());
        Ok(out)
    }

    fn rate_between(
        &self,
        prev: &NormalizedReading,
        cur: &NormalizedReading,
    ) -> Result<Option<DurationValue>> {
        let elapsed = cur.timestamp() - prev.timestamp();
        if elapsed <= TimeDelta::zero() || !self.tolerance.contains(elapsed) {
            debug!(
                device_id = %cur.device_id(),
                ts = %cur.timestamp(),
                elapsed_secs = elapsed.num_seconds(),
                "skipping average rate outside tolerance"
            );
            return Ok(None);
        }

        let step = transition(prev, cur)?;
        let source_unit = cur.unit_value().unit;
        let (rate_unit, factor) = source_unit.rate_unit().ok_or_else(|| {
            AppError::Consistency(format!("no rate unit for {}", source_unit))
        })?;

        let hours = elapsed.num_milliseconds() as f64 / 3_600_000.0;
        let rate = UnitValue::new(step.value.value / hours * factor, rate_unit);
        Ok(Some(DurationValue::between(prev, cur, rate, step.device_ids)))
    }
}

impl ReadingGenerator for AverageRateGenerator {
    fn calculate_next(&mut self, reading: &NormalizedReading) -> Result<Option<DurationValue>> {
        AverageRateGenerator::calculate_next(self, reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::test_support::{reading_at, wh_at};
    use crate::units::PhysicalUnit;
    use pretty_assertions::assert_eq;

    fn five_minute_generator() -> AverageRateGenerator {
        AverageRateGenerator::new(RateTolerance::default())
    }

    #[test]
    fn test_first_reading_never_emits() {
        let mut generator = five_minute_generator();
        assert_eq!(generator.calculate_next(&wh_at(0, "sn-1", 10.0)).unwrap(), None);
    }

    #[test]
    fn test_rate_is_delta_over_elapsed_hours() {
        let mut generator = five_minute_generator();
        let prev = wh_at(0, "sn-1", 10_000.0);
        let cur = wh_at(5, "sn-1", 10_250.0);

        generator.calculate_next(&prev).unwrap();
        let out = generator.calculate_next(&cur).unwrap().unwrap();

        // 250 Wh over 1/12 h
        assert!((out.value.value - 3000.0).abs() < 1e-9);
        assert_eq!(out.value.unit, PhysicalUnit::Watt);
        assert_eq!(out.start, prev.timestamp());
        assert_eq!(out.end, cur.timestamp());
        assert_eq!(out.device_ids, vec!["sn-1".to_string()]);
    }

    #[test]
    fn test_volume_maps_to_flow() {
        let mut generator = five_minute_generator();
        generator
            .calculate_next(&reading_at(0, "w-1", 12.0, PhysicalUnit::CubicMetre))
            .unwrap();
        let out = generator
            .calculate_next(&reading_at(6, "w-1", 12.05, PhysicalUnit::CubicMetre))
            .unwrap()
            .unwrap();

        assert!((out.value.value - 0.5).abs() < 1e-9);
        assert_eq!(out.value.unit, PhysicalUnit::CubicMetrePrHour);
    }

    #[test]
    fn test_gaps_outside_tolerance_are_suppressed() {
        let mut generator = five_minute_generator();
        let readings = [
            wh_at(0, "sn-1", 100.0),
            wh_at(2, "sn-1", 101.0),
            wh_at(7, "sn-1", 102.0),
            wh_at(20, "sn-1", 103.0),
            wh_at(25, "sn-1", 104.0),
        ];
        let out = generator.generate_all(&readings).unwrap();

        let ends: Vec<_> = out.iter().map(|v| v.end).collect();
        assert_eq!(ends, vec![readings[2].timestamp(), readings[4].timestamp()]);
    }

    #[test]
    fn test_device_crossing_yields_zero_rate_in_new_unit() {
        let mut generator = five_minute_generator();
        generator.calculate_next(&wh_at(0, "old", 9_000.0)).unwrap();
        let out = generator
            .calculate_next(&reading_at(5, "new", 4.0, PhysicalUnit::Joule))
            .unwrap()
            .unwrap();

        assert_eq!(out.value, UnitValue::zero(PhysicalUnit::Watt));
        assert_eq!(out.device_ids, vec!["old".to_string(), "new".to_string()]);
    }

    #[test]
    fn test_unit_without_rate_is_an_error() {
        let mut generator = five_minute_generator();
        generator
            .calculate_next(&reading_at(0, "t", 20.0, PhysicalUnit::DegreeCelsius))
            .unwrap();
        let err = generator
            .calculate_next(&reading_at(5, "t", 21.0, PhysicalUnit::DegreeCelsius))
            .unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));
    }

    #[test]
    fn test_failed_reading_keeps_previous() {
        let tolerance = RateTolerance::new(TimeDelta::minutes(1), TimeDelta::minutes(20)).unwrap();
        let mut generator = AverageRateGenerator::new(tolerance);
        let first = wh_at(0, "sn-1", 5000.0);

        generator.calculate_next(&first).unwrap();
        let err = generator
            .calculate_next(&wh_at(5, "sn-1", 3000.0))
            .unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));

        // 100 Wh over 10 minutes, measured from the last good reading
        let out = generator
            .calculate_next(&wh_at(10, "sn-1", 5100.0))
            .unwrap()
            .unwrap();
        assert!((out.value.value - 600.0).abs() < 1e-9);
        assert_eq!(out.start, first.timestamp());
    }

    #[test]
    fn test_tolerance_validation() {
        assert!(RateTolerance::new(TimeDelta::minutes(6), TimeDelta::minutes(4)).is_err());
        assert!(RateTolerance::new(TimeDelta::zero(), TimeDelta::zero()).is_err());

        let tolerance = RateTolerance::new(TimeDelta::zero(), TimeDelta::minutes(6)).unwrap();
        assert!(tolerance.contains(TimeDelta::seconds(30)));
        assert!(tolerance.contains(TimeDelta::minutes(6)));
        assert!(!tolerance.contains(TimeDelta::seconds(361)));
    }

    #[test]
    fn test_default_tolerance_brackets_five_minutes() {
        let tolerance = RateTolerance::default();
        assert_eq!(tolerance.min(), TimeDelta::minutes(4));
        assert_eq!(tolerance.max(), TimeDelta::minutes(6));
    }
}
