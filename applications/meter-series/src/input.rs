//! JSON document accepted by the `meter-series` binary.
//!
//! ```json
//! {
//!   "start": "2024-06-01T00:00:00Z",
//!   "end": "2024-06-02T00:00:00Z",
//!   "labels": [
//!     { "label": "house",
//!       "registers": {
//!         "1-0:1.8.0*255": [
//!           { "device_id": "sn-1", "timestamp": "2024-06-01T00:00:00Z", "value": 1000.0, "unit": "Wh" }
//!         ]
//!       } }
//!   ]
//! }
//! ```

use crate::error::Result;
use crate::obis::RegisterCode;
use crate::reading::RawReading;
use crate::series::{LabelSeries, LabelSeriesSet};
use crate::units::{PhysicalUnit, UnitValue};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesDocument {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(default)]
    pub labels: Vec<LabelDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LabelDocument {
    pub label: String,
    #[serde(default)]
    pub registers: BTreeMap<RegisterCode, Vec<ReadingDocument>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadingDocument {
    pub device_id: String,
    /// Must carry a zero UTC offset
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
    pub unit: PhysicalUnit,
}

impl SeriesDocument {
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Validates timestamps and the window.
    pub fn into_set(self) -> Result<LabelSeriesSet> {
        let series = self
            .labels
            .into_iter()
            .map(LabelDocument::into_series)
            .collect::<Result<Vec<_>>>()?;
        LabelSeriesSet::new(self.start, self.end, series)
    }
}

impl LabelDocument {
    fn into_series(self) -> Result<LabelSeries> {
        let mut series = LabelSeries::new(self.label);
        for (code, readings) in self.registers {
            let readings = readings
                .into_iter()
                .map(|r| RawReading::new(r.device_id, r.timestamp, UnitValue::new(r.value, r.unit)))
                .collect::<Result<Vec<_>>>()?;
            series.push_all(code, readings);
        }
        Ok(series)
    }
}
