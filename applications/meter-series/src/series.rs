use crate::error::{AppError, Result};
use crate::obis::RegisterCode;
use crate::reading::{ensure_utc, DurationValue, RawReading};
use crate::units::PhysicalUnit;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Raw readings of one label (an installation, a submeter), per register.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSeries {
    pub label: String,
    pub registers: BTreeMap<RegisterCode, Vec<RawReading>>,
}

impl LabelSeries {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            registers: BTreeMap::new(),
        }
    }

    pub fn with_readings(
        mut self,
        code: RegisterCode,
        readings: impl IntoIterator<Item = RawReading>,
    ) -> Self {
        self.push_all(code, readings);
        self
    }

    pub fn push(&mut self, code: RegisterCode, reading: RawReading) {
        self.registers.entry(code).or_default().push(reading);
    }

    pub fn push_all(&mut self, code: RegisterCode, readings: impl IntoIterator<Item = RawReading>) {
        self.registers.entry(code).or_default().extend(readings);
    }

    pub fn readings(&self, code: &RegisterCode) -> &[RawReading] {
        self.registers.get(code).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn codes(&self) -> impl Iterator<Item = &RegisterCode> {
        self.registers.keys()
    }

    /// The single unit `code` is reported in, `None` without readings.
    pub fn unit_of(&self, code: &RegisterCode) -> Result<Option<PhysicalUnit>> {
        let mut readings = self.readings(code).iter();
        let Some(first) = readings.next() else {
            return Ok(None);
        };
        let unit = first.unit_value().unit;
        if let Some(other) = readings.find(|r| r.unit_value().unit != unit) {
            return Err(AppError::Consistency(format!(
                "label '{}' register {} seen in both {} and {}",
                self.label,
                code,
                unit,
                other.unit_value().unit
            )));
        }
        Ok(Some(unit))
    }
}

/// Labels sharing one query window `[start, end)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSeriesSet {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    series: Vec<LabelSeries>,
}

impl LabelSeriesSet {
    pub fn new<Tz: TimeZone>(
        start: DateTime<Tz>,
        end: DateTime<Tz>,
        series: Vec<LabelSeries>,
    ) -> Result<Self> {
        let start = ensure_utc(&start, "window start")?;
        let end = ensure_utc(&end, "window end")?;
        if start >= end {
            return Err(AppError::Validation(format!(
                "empty window: start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end, series })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn series(&self) -> &[LabelSeries] {
        &self.series
    }

    pub fn get(&self, label: &str) -> Option<&LabelSeries> {
        self.series.iter().find(|s| s.label == label)
    }
}

/// Derived values of one label, keyed by derived register code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedSeries {
    pub label: String,
    pub registers: BTreeMap<RegisterCode, Vec<DurationValue>>,
}

impl DerivedSeries {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            registers: BTreeMap::new(),
        }
    }

    pub fn values(&self, code: &RegisterCode) -> &[DurationValue] {
        self.registers.get(code).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}
