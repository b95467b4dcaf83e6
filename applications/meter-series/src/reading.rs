use crate::error::{AppError, Result};
use crate::units::UnitValue;
use chrono::{DateTime, Offset, TimeZone, Utc};
use serde::Serialize;

/// Converts `ts` to `DateTime<Utc>`, rejecting any non-zero offset.
pub fn ensure_utc<Tz: TimeZone>(ts: &DateTime<Tz>, what: &str) -> Result<DateTime<Utc>> {
    let offset = ts.offset().fix().local_minus_utc();
    if offset != 0 {
        return Err(AppError::Validation(format!(
            "{} must be UTC, got offset {}s",
            what, offset
        )));
    }
    Ok(ts.with_timezone(&Utc))
}

/// Device serial numbers compare case-insensitively.
pub fn same_device(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A register value as reported by a meter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    device_id: String,
    timestamp: DateTime<Utc>,
    unit_value: UnitValue,
}

impl RawReading {
    pub fn new<Tz: TimeZone>(
        device_id: impl Into<String>,
        timestamp: DateTime<Tz>,
        unit_value: UnitValue,
    ) -> Result<Self> {
        Ok(Self {
            device_id: device_id.into(),
            timestamp: ensure_utc(&timestamp, "reading timestamp")?,
            unit_value,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn unit_value(&self) -> UnitValue {
        self.unit_value
    }
}

/// A reading tagged with the start of the interval it falls in.
///
/// Processing order is always the true `timestamp`; the normalized one only
/// groups outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReading {
    reading: RawReading,
    normalized_timestamp: DateTime<Utc>,
}

impl NormalizedReading {
    pub fn new<Tz: TimeZone>(reading: RawReading, normalized_timestamp: DateTime<Tz>) -> Result<Self> {
        Ok(Self {
            reading,
            normalized_timestamp: ensure_utc(&normalized_timestamp, "normalized timestamp")?,
        })
    }

    pub fn device_id(&self) -> &str {
        self.reading.device_id()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.reading.timestamp()
    }

    pub fn normalized_timestamp(&self) -> DateTime<Utc> {
        self.normalized_timestamp
    }

    pub fn unit_value(&self) -> UnitValue {
        self.reading.unit_value()
    }

    pub fn reading(&self) -> &RawReading {
        &self.reading
    }

    pub fn is_same_device(&self, other: &NormalizedReading) -> bool {
        same_device(self.device_id(), other.device_id())
    }
}

/// A derived value covering `[start, end]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurationValue {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub normalized_start: DateTime<Utc>,
    pub normalized_end: DateTime<Utc>,
    pub value: UnitValue,
    pub device_ids: Vec<String>,
}

impl DurationValue {
    /// Interval spanning two consecutive readings.
    pub fn between(
        prev: &NormalizedReading,
        cur: &NormalizedReading,
        value: UnitValue,
        device_ids: Vec<String>,
    ) -> Self {
        Self {
            start: prev.timestamp(),
            end: cur.timestamp(),
            normalized_start: prev.normalized_timestamp(),
            normalized_end: cur.normalized_timestamp(),
            value,
            device_ids,
        }
    }

    pub fn duration(&self) -> chrono::TimeDelta {
        self.end - self.start
    }
}
