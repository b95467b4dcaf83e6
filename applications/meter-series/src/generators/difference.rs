use crate::obis::RegisterCode;
use crate::reading::DurationValue;
use crate::units::UnitValue;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::trace;

/// The values of one tick, keyed by register code.
pub type CodeValues = BTreeMap<RegisterCode, DurationValue>;

/// `minuend - subtrahend` across two derived series, floored at zero.
///
/// Ticks are matched on their normalized bounds. The only state is the
/// output accumulated so far.
#[derive(Debug, Clone)]
pub struct CrossSeriesDifferenceGenerator {
    minuend: RegisterCode,
    subtrahend: RegisterCode,
    values: Vec<DurationValue>,
}

impl CrossSeriesDifferenceGenerator {
    pub fn new(minuend: RegisterCode, subtrahend: RegisterCode) -> Self {
        Self {
            minuend,
            subtrahend,
            values: Vec::new(),
        }
    }

    pub fn minuend(&self) -> RegisterCode {
        self.minuend
    }

    pub fn subtrahend(&self) -> RegisterCode {
        self.subtrahend
    }

    /// True when both input codes are among `codes`.
    pub fn is_satisfied_by<'a, I>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = &'a RegisterCode>,
    {
        let (mut has_minuend, mut has_subtrahend) = (false, false);
        for code in codes {
            has_minuend |= *code == self.minuend;
            has_subtrahend |= *code == self.subtrahend;
        }
        has_minuend && has_subtrahend
    }

    /// Consumes one tick and returns the value it produced, if any.
    pub fn calculate_next(&mut self, tick: &CodeValues) -> Option<&DurationValue> {
        let minuend = tick.get(&self.minuend)?;
        let subtrahend = tick.get(&self.subtrahend)?;

        if minuend.value.unit != subtrahend.value.unit
            || minuend.normalized_start != subtrahend.normalized_start
            || minuend.normalized_end != subtrahend.normalized_end
        {
            trace!(minuend = %self.minuend, subtrahend = %self.subtrahend, "difference inputs do not line up");
            return None;
        }

        let value = (minuend.value.value - subtrahend.value.value).max(0.0);
        let mut device_ids = minuend.device_ids.clone();
        device_ids.extend(subtrahend.device_ids.iter().cloned());

        self.values.push(DurationValue {
            start: minuend.start.min(subtrahend.start),
            end: minuend.end.max(subtrahend.end),
            normalized_start: minuend.normalized_start,
            normalized_end: minuend.normalized_end,
            value: UnitValue::new(value, minuend.value.unit),
            device_ids,
        });
        self.values.last()
    }

    /// Pairs two whole series on normalized bounds and feeds every minuend
    /// tick through [`calculate_next`](Self::calculate_next).
    ///
    /// Several ticks can share the same bounds (period values inside one
    /// day bucket). Within such a group a subtrahend tick ending at the same
    /// instant is preferred, otherwise the ticks pair in order.
    pub fn calculate_series(
        &mut self,
        minuend: &[DurationValue],
        subtrahend: &[DurationValue],
    ) -> &[DurationValue] {
        let mut by_bounds: HashMap<(DateTime<Utc>, DateTime<Utc>), VecDeque<&DurationValue>> =
            HashMap::new();
        for value in subtrahend {
            by_bounds
                .entry((value.normalized_start, value.normalized_end))
                .or_default()
                .push_back(value);
        }

        for value in minuend {
            let mut tick = CodeValues::new();
            tick.insert(self.minuend, value.clone());
            if let Some(group) = by_bounds.get_mut(&(value.normalized_start, value.normalized_end)) {
                let other = match group.iter().position(|o| o.end == value.end) {
                    Some(at) => group.remove(at),
                    None => group.pop_front(),
                };
                if let Some(other) = other {
                    tick.insert(self.subtrahend, other.clone());
                }
            }
            self.calculate_next(&tick);
        }
        &self.values
    }

    pub fn values(&self) -> &[DurationValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<DurationValue> {
        self.values
    }
}
