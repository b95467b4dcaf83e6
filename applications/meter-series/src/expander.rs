use crate::bucket::Divider;
use crate::error::Result;
use crate::generators::{
    AverageRateGenerator, CrossSeriesDifferenceGenerator, DeltaGenerator, PeriodGenerator,
    RateTolerance, ReadingGenerator,
};
use crate::normalize::normalize_all;
use crate::obis::{DerivedCodes, RegisterCode, RegisterTable};
use crate::reading::{DurationValue, RawReading};
use crate::series::{DerivedSeries, LabelSeries, LabelSeriesSet};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Companion series produced for one cumulative register.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub codes: DerivedCodes,
    pub delta: Vec<DurationValue>,
    pub period: Vec<DurationValue>,
    pub average: Vec<DurationValue>,
}

/// Expands cumulative registers into their delta, period and average-rate
/// companions.
pub struct CumulativeSeriesExpander<'a> {
    table: &'a RegisterTable,
    divider: &'a Divider,
    tolerance: RateTolerance,
}

impl<'a> CumulativeSeriesExpander<'a> {
    pub fn new(table: &'a RegisterTable, divider: &'a Divider) -> Self {
        Self {
            table,
            divider,
            tolerance: RateTolerance::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: RateTolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Expands one register of `series` over `[start, end)`.
    ///
    /// The latest reading before `start` is kept as the baseline for the
    /// first in-window step; values ending before `start` are dropped.
    /// Returns `None` for non-cumulative codes and when fewer than two
    /// readings remain.
    pub fn expand_code(
        &self,
        series: &LabelSeries,
        code: &RegisterCode,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<Expansion>> {
        series.unit_of(code)?;

        let Some(codes) = self.table.derived(code) else {
            return Ok(None);
        };

        let readings = window(series.readings(code), start, end);
        if readings.len() < 2 {
            debug!(
                label = %series.label,
                code = %code,
                readings = readings.len(),
                "not enough readings to expand"
            );
            return Ok(None);
        }

        let normalized = normalize_all(readings, self.divider)?;
        let in_window = |values: Vec<DurationValue>| -> Vec<DurationValue> {
            values.into_iter().filter(|v| v.end >= start).collect()
        };

        Ok(Some(Expansion {
            codes: *codes,
            delta: in_window(DeltaGenerator::new().generate_all(&normalized)?),
            period: in_window(PeriodGenerator::new().generate_all(&normalized)?),
            average: in_window(
                AverageRateGenerator::new(self.tolerance).generate_all(&normalized)?,
            ),
        }))
    }

    /// Expands every cumulative register of `series`.
    pub fn expand(
        &self,
        series: &LabelSeries,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DerivedSeries> {
        let mut derived = DerivedSeries::new(series.label.clone());
        for code in series.codes() {
            if let Some(expansion) = self.expand_code(series, code, start, end)? {
                derived.registers.insert(expansion.codes.delta, expansion.delta);
                derived.registers.insert(expansion.codes.period, expansion.period);
                derived.registers.insert(expansion.codes.average, expansion.average);
            }
        }
        Ok(derived)
    }

    /// Expands every label of `set` and adds the net series of the table's
    /// differences whose inputs were produced.
    pub fn expand_set(&self, set: &LabelSeriesSet) -> Result<Vec<DerivedSeries>> {
        let mut out = Vec::with_capacity(set.series().len());
        for series in set.series() {
            let mut derived = self.expand(series, set.start(), set.end())?;
            self.apply_differences(&mut derived);
            info!(
                label = %derived.label,
                registers = derived.registers.len(),
                "expanded label"
            );
            out.push(derived);
        }
        Ok(out)
    }

    fn apply_differences(&self, derived: &mut DerivedSeries) {
        for definition in self.table.differences() {
            let mut generator =
                CrossSeriesDifferenceGenerator::new(definition.minuend, definition.subtrahend);
            if !generator.is_satisfied_by(derived.registers.keys()) {
                continue;
            }
            generator.calculate_series(
                derived.values(&definition.minuend),
                derived.values(&definition.subtrahend),
            );
            derived
                .registers
                .insert(definition.code, generator.into_values());
        }
    }
}

/// Readings in `[start, end)` plus the latest one before `start`, ordered by
/// timestamp.
fn window(readings: &[RawReading], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<RawReading> {
    let mut sorted: Vec<&RawReading> = readings.iter().filter(|r| r.timestamp() < end).collect();
    sorted.sort_by_key(|r| r.timestamp());

    let first_in_window = sorted.partition_point(|r| r.timestamp() < start);
    let from = first_in_window.saturating_sub(1);
    sorted[from..].iter().map(|r| (*r).clone()).collect()
}
