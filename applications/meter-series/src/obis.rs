//! OBIS-style register codes and the cumulative-code classification table.

use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Value group B marking a delta series.
pub const DELTA_CHANNEL: u8 = 65;
/// Value group B marking a running period series.
pub const PERIOD_CHANNEL: u8 = 66;
/// Value group B marking an average-rate series.
pub const AVERAGE_CHANNEL: u8 = 67;

/// Six-component register code `A.B.C.D.E.F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterCode([u8; 6]);

impl RegisterCode {
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8, f: u8) -> Self {
        Self([a, b, c, d, e, f])
    }

    pub fn components(&self) -> [u8; 6] {
        self.0
    }

    /// Same code on another value group B channel.
    pub const fn with_channel(&self, b: u8) -> Self {
        let [a, _, c, d, e, f] = self.0;
        Self([a, b, c, d, e, f])
    }

    pub const fn with_quantity(&self, c: u8, d: u8) -> Self {
        let [a, b, _, _, e, f] = self.0;
        Self([a, b, c, d, e, f])
    }
}

impl fmt::Display for RegisterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{}.{}.{}.{}.{}.{}", a, b, c, d, e, g)
    }
}

/// Accepts the dotted form `1.0.1.8.0.255` and the IEC form `1-0:1.8.0*255`.
impl FromStr for RegisterCode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(['.', '-', ':', '*']).collect();
        if parts.len() != 6 {
            return Err(AppError::Format(format!("invalid register code: {}", s)));
        }

        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = part.parse::<u8>().map_err(|_| {
                AppError::Range(format!("register code component '{}' in {}", part, s))
            })?;
        }
        Ok(Self(out))
    }
}

impl Serialize for RegisterCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegisterCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

pub const ELECTR_ACTIVE_ENERGY_IMPORT: RegisterCode = RegisterCode::new(1, 0, 1, 8, 0, 255);
pub const ELECTR_ACTIVE_ENERGY_EXPORT: RegisterCode = RegisterCode::new(1, 0, 2, 8, 0, 255);
pub const ELECTR_ACTIVE_ENERGY_IMPORT_L1: RegisterCode = RegisterCode::new(1, 0, 21, 8, 0, 255);
pub const ELECTR_ACTIVE_ENERGY_IMPORT_L2: RegisterCode = RegisterCode::new(1, 0, 41, 8, 0, 255);
pub const ELECTR_ACTIVE_ENERGY_IMPORT_L3: RegisterCode = RegisterCode::new(1, 0, 61, 8, 0, 255);
pub const ELECTR_ACTIVE_POWER_IMPORT: RegisterCode = RegisterCode::new(1, 0, 1, 7, 0, 255);
pub const ELECTR_ACTIVE_POWER_EXPORT: RegisterCode = RegisterCode::new(1, 0, 2, 7, 0, 255);
pub const ELECTR_NET_ENERGY_DELTA: RegisterCode = RegisterCode::new(1, DELTA_CHANNEL, 16, 8, 0, 255);
pub const ELECTR_NET_ENERGY_PERIOD: RegisterCode =
    RegisterCode::new(1, PERIOD_CHANNEL, 16, 8, 0, 255);

pub const HEAT_ENERGY: RegisterCode = RegisterCode::new(6, 0, 1, 0, 0, 255);
pub const HEAT_VOLUME: RegisterCode = RegisterCode::new(6, 0, 2, 0, 0, 255);
pub const HEAT_POWER: RegisterCode = RegisterCode::new(6, 0, 8, 0, 0, 255);
pub const HEAT_FLOW: RegisterCode = RegisterCode::new(6, 0, 9, 0, 0, 255);
pub const HEAT_FLOW_TEMPERATURE: RegisterCode = RegisterCode::new(6, 0, 10, 0, 0, 255);
pub const HEAT_RETURN_TEMPERATURE: RegisterCode = RegisterCode::new(6, 0, 11, 0, 0, 255);

pub const COLD_WATER_VOLUME: RegisterCode = RegisterCode::new(8, 0, 1, 0, 0, 255);
pub const COLD_WATER_FLOW: RegisterCode = RegisterCode::new(8, 0, 2, 0, 0, 255);
pub const HOT_WATER_VOLUME: RegisterCode = RegisterCode::new(9, 0, 1, 0, 0, 255);
pub const HOT_WATER_FLOW: RegisterCode = RegisterCode::new(9, 0, 2, 0, 0, 255);

pub const ROOM_TEMPERATURE: RegisterCode = RegisterCode::new(15, 0, 223, 0, 0, 255);
pub const ROOM_RELATIVE_HUMIDITY: RegisterCode = RegisterCode::new(15, 0, 223, 0, 2, 255);

/// Companion codes implied by a cumulative register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedCodes {
    pub delta: RegisterCode,
    pub period: RegisterCode,
    pub average: RegisterCode,
}

/// Net series computed as `minuend - subtrahend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DifferenceDefinition {
    pub code: RegisterCode,
    pub minuend: RegisterCode,
    pub subtrahend: RegisterCode,
}

/// Immutable register classification table. Build it once and pass it by
/// reference to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct RegisterTable {
    cumulative: BTreeMap<RegisterCode, DerivedCodes>,
    differences: Vec<DifferenceDefinition>,
}

impl RegisterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering the electricity, heat and water registers the meters
    /// in this installation report.
    pub fn standard() -> Self {
        let mut table = Self::new();

        for energy in [
            ELECTR_ACTIVE_ENERGY_IMPORT,
            ELECTR_ACTIVE_ENERGY_EXPORT,
            ELECTR_ACTIVE_ENERGY_IMPORT_L1,
            ELECTR_ACTIVE_ENERGY_IMPORT_L2,
            ELECTR_ACTIVE_ENERGY_IMPORT_L3,
        ] {
            let [_, _, c, _, _, _] = energy.components();
            table = table.with_cumulative(energy, energy.with_quantity(c, 7));
        }

        table = table
            .with_cumulative(HEAT_ENERGY, HEAT_POWER)
            .with_cumulative(HEAT_VOLUME, HEAT_FLOW)
            .with_cumulative(COLD_WATER_VOLUME, COLD_WATER_FLOW)
            .with_cumulative(HOT_WATER_VOLUME, HOT_WATER_FLOW);

        let import = table.cumulative[&ELECTR_ACTIVE_ENERGY_IMPORT];
        let export = table.cumulative[&ELECTR_ACTIVE_ENERGY_EXPORT];
        table
            .with_difference(ELECTR_NET_ENERGY_DELTA, import.delta, export.delta)
            .with_difference(ELECTR_NET_ENERGY_PERIOD, import.period, export.period)
    }

    /// Registers `source` as cumulative. `rate` is the instantaneous
    /// quantity whose average channel receives the average-rate series.
    pub fn with_cumulative(mut self, source: RegisterCode, rate: RegisterCode) -> Self {
        self.cumulative.insert(
            source,
            DerivedCodes {
                delta: source.with_channel(DELTA_CHANNEL),
                period: source.with_channel(PERIOD_CHANNEL),
                average: rate.with_channel(AVERAGE_CHANNEL),
            },
        );
        self
    }

    pub fn with_difference(
        mut self,
        code: RegisterCode,
        minuend: RegisterCode,
        subtrahend: RegisterCode,
    ) -> Self {
        self.differences.push(DifferenceDefinition {
            code,
            minuend,
            subtrahend,
        });
        self
    }

    pub fn is_cumulative(&self, code: &RegisterCode) -> bool {
        self.cumulative.contains_key(code)
    }

    pub fn derived(&self, code: &RegisterCode) -> Option<&DerivedCodes> {
        self.cumulative.get(code)
    }

    pub fn differences(&self) -> &[DifferenceDefinition] {
        &self.differences
    }
}
