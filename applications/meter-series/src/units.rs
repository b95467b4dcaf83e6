//! Physical units and unit-tagged values.
//!
//! Arithmetic between two [`UnitValue`]s is only defined for identical units;
//! nothing in this crate converts between units.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A decrease of at most this fraction of the earlier counter value is a
/// register quirk and is clamped to zero.
pub const QUIRK_FRACTION: f64 = 0.001;

/// A decrease is treated as a register wraparound when the wrapped distance
/// is at most this fraction of the power-of-ten boundary.
pub const WRAP_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PhysicalUnit {
    #[serde(rename = "W")]
    Watt,
    #[serde(rename = "Wh")]
    WattHour,
    #[serde(rename = "m3")]
    CubicMetre,
    #[serde(rename = "m3/h")]
    CubicMetrePrHour,
    #[serde(rename = "J")]
    Joule,
    #[serde(rename = "C")]
    DegreeCelsius,
    #[serde(rename = "%")]
    Percentage,
    #[serde(rename = "DKK")]
    Dkk,
    #[serde(rename = "EUR")]
    Eur,
    #[serde(rename = "NoUnit")]
    NoUnit,
}

impl PhysicalUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            PhysicalUnit::Watt => "W",
            PhysicalUnit::WattHour => "Wh",
            PhysicalUnit::CubicMetre => "m3",
            PhysicalUnit::CubicMetrePrHour => "m3/h",
            PhysicalUnit::Joule => "J",
            PhysicalUnit::DegreeCelsius => "C",
            PhysicalUnit::Percentage => "%",
            PhysicalUnit::Dkk => "DKK",
            PhysicalUnit::Eur => "EUR",
            PhysicalUnit::NoUnit => "NoUnit",
        }
    }

    /// Rate unit implied by a cumulative unit, with the factor converting
    /// "amount per hour" into that unit.
    ///
    /// Energy maps to power and volume to flow. Units that are not
    /// cumulative quantities have no rate.
    pub fn rate_unit(&self) -> Option<(PhysicalUnit, f64)> {
        match self {
            PhysicalUnit::WattHour => Some((PhysicalUnit::Watt, 1.0)),
            PhysicalUnit::CubicMetre => Some((PhysicalUnit::CubicMetrePrHour, 1.0)),
            // J/h to W
            PhysicalUnit::Joule => Some((PhysicalUnit::Watt, 1.0 / 3600.0)),
            _ => None,
        }
    }
}

impl fmt::Display for PhysicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for PhysicalUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let unit = match s {
            "W" => PhysicalUnit::Watt,
            "Wh" => PhysicalUnit::WattHour,
            "m3" => PhysicalUnit::CubicMetre,
            "m3/h" => PhysicalUnit::CubicMetrePrHour,
            "J" => PhysicalUnit::Joule,
            "C" => PhysicalUnit::DegreeCelsius,
            "%" => PhysicalUnit::Percentage,
            "DKK" => PhysicalUnit::Dkk,
            "EUR" => PhysicalUnit::Eur,
            "NoUnit" => PhysicalUnit::NoUnit,
            other => return Err(AppError::Format(format!("unknown unit: {}", other))),
        };
        Ok(unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitValue {
    pub value: f64,
    pub unit: PhysicalUnit,
}

impl UnitValue {
    pub fn new(value: f64, unit: PhysicalUnit) -> Self {
        Self { value, unit }
    }

    pub fn zero(unit: PhysicalUnit) -> Self {
        Self { value: 0.0, unit }
    }

    /// Value reported as an integer mantissa and a decimal scale,
    /// i.e. `raw * 10^scale`.
    pub fn from_scaled(raw: i64, scale: i32, unit: PhysicalUnit) -> Self {
        Self {
            value: raw as f64 * 10f64.powi(scale),
            unit,
        }
    }

    fn ensure_same_unit(&self, other: &UnitValue) -> Result<()> {
        if self.unit != other.unit {
            return Err(AppError::UnitMismatch {
                left: self.unit,
                right: other.unit,
            });
        }
        Ok(())
    }

    /// Plain difference `self - other`.
    pub fn checked_sub(&self, other: &UnitValue) -> Result<UnitValue> {
        self.ensure_same_unit(other)?;
        Ok(UnitValue::new(self.value - other.value, self.unit))
    }

    pub fn checked_add(&self, other: &UnitValue) -> Result<UnitValue> {
        self.ensure_same_unit(other)?;
        Ok(UnitValue::new(self.value + other.value, self.unit))
    }

    /// Counter difference `self - earlier` where both values come from a
    /// cumulative register.
    ///
    /// A small decrease is clamped to zero and a decrease explained by the
    /// register rolling over at a power of ten is unwrapped. Any other
    /// decrease is a [`AppError::Consistency`] error.
    pub fn subtract(&self, earlier: &UnitValue) -> Result<UnitValue> {
        self.ensure_same_unit(earlier)?;

        let later = self.value;
        let before = earlier.value;
        if !later.is_finite() || !before.is_finite() {
            return Err(AppError::Consistency(format!(
                "counter values must be finite, got {} and {} {}",
                before, later, self.unit
            )));
        }
        if later >= before {
            return Ok(UnitValue::new(later - before, self.unit));
        }

        let decrease = before - later;
        if decrease <= before.abs() * QUIRK_FRACTION {
            return Ok(UnitValue::zero(self.unit));
        }

        if before > 0.0 && later >= 0.0 {
            let wrap = wrap_boundary(before);
            let wrapped = wrap - before + later;
            if wrapped <= wrap * WRAP_FRACTION {
                return Ok(UnitValue::new(wrapped, self.unit));
            }
        }

        Err(AppError::Consistency(format!(
            "counter decreased from {} to {} {}",
            before, later, self.unit
        )))
    }
}

/// Smallest power of ten strictly greater than `value`.
fn wrap_boundary(value: f64) -> f64 {
    let mut wrap = 1.0;
    while wrap <= value {
        wrap *= 10.0;
    }
    wrap
}

impl fmt::Display for UnitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wh(value: f64) -> UnitValue {
        UnitValue::new(value, PhysicalUnit::WattHour)
    }

    #[test]
    fn test_subtract_increasing_counter() {
        let diff = wh(1250.0).subtract(&wh(1200.0)).unwrap();
        assert_eq!(diff, wh(50.0));
    }

    #[test]
    fn test_subtract_unit_mismatch() {
        let err = wh(10.0)
            .subtract(&UnitValue::new(5.0, PhysicalUnit::CubicMetre))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UnitMismatch {
                left: PhysicalUnit::WattHour,
                right: PhysicalUnit::CubicMetre
            }
        ));
    }

    #[test]
    fn test_subtract_small_decrease_is_clamped() {
        let diff = wh(99_999.0).subtract(&wh(100_000.0)).unwrap();
        assert_eq!(diff, wh(0.0));
    }

    #[test]
    fn test_subtract_wraparound() {
        let diff = wh(5.0).subtract(&wh(99_990.0)).unwrap();
        assert_eq!(diff, wh(15.0));
    }

    #[test]
    fn test_subtract_unexplained_decrease() {
        let err = wh(2.0).subtract(&wh(1000.0)).unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));

        let err = wh(50_000.0).subtract(&wh(99_990.0)).unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));
    }

    #[test]
    fn test_subtract_non_finite_values() {
        let overflowed = UnitValue::from_scaled(1, 400, PhysicalUnit::WattHour);
        assert!(overflowed.value.is_infinite());

        for (later, earlier) in [
            (wh(1.0), overflowed),
            (overflowed, wh(1.0)),
            (wh(f64::NAN), wh(1.0)),
            (wh(1.0), wh(f64::NEG_INFINITY)),
        ] {
            let err = later.subtract(&earlier).unwrap_err();
            assert!(matches!(err, AppError::Consistency(_)), "{} - {}", later, earlier);
        }
    }

    #[test]
    fn test_from_scaled() {
        assert_eq!(UnitValue::from_scaled(210, 1, PhysicalUnit::WattHour), wh(2100.0));
        let v = UnitValue::from_scaled(1234, -3, PhysicalUnit::CubicMetre);
        assert!((v.value - 1.234).abs() < 1e-12);
    }

    #[test]
    fn test_rate_unit_mapping() {
        assert_eq!(
            PhysicalUnit::WattHour.rate_unit(),
            Some((PhysicalUnit::Watt, 1.0))
        );
        assert_eq!(
            PhysicalUnit::CubicMetre.rate_unit().map(|(u, _)| u),
            Some(PhysicalUnit::CubicMetrePrHour)
        );
        assert_eq!(PhysicalUnit::DegreeCelsius.rate_unit(), None);
    }

    #[test]
    fn test_unit_roundtrip_through_str() {
        for unit in [
            PhysicalUnit::Watt,
            PhysicalUnit::WattHour,
            PhysicalUnit::CubicMetrePrHour,
            PhysicalUnit::Percentage,
        ] {
            assert_eq!(unit.symbol().parse::<PhysicalUnit>().unwrap(), unit);
        }
        assert!("kWh".parse::<PhysicalUnit>().is_err());
    }
}
