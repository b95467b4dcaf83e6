use crate::bucket::Divider;
use crate::error::Result;
use crate::reading::{NormalizedReading, RawReading};

/// Tags `reading` with the start of its interval under `divider`.
pub fn normalize(reading: RawReading, divider: &Divider) -> Result<NormalizedReading> {
    let normalized = divider.divide(reading.timestamp());
    NormalizedReading::new(reading, normalized)
}

/// Normalizes a series and orders it by true timestamp.
pub fn normalize_all<I>(readings: I, divider: &Divider) -> Result<Vec<NormalizedReading>>
where
    I: IntoIterator<Item = RawReading>,
{
    let mut out = readings
        .into_iter()
        .map(|r| normalize(r, divider))
        .collect::<Result<Vec<_>>>()?;
    out.sort_by_key(|r| r.timestamp());
    Ok(out)
}
