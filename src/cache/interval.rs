//! Interval decomposition
//!
//! Splits a query interval into calendar-aligned buckets so that each bucket
//! can be cached independently and reused by overlapping queries:
//!
//! ```text
//! 2024-01-01T22:00Z ───────────────────────────────────────────── 2024-01-03T02:00Z
//! │ 22h │ 23h │              2024-01-02 (86400 s)              │ 00h │ 01h │
//! ```
//!
//! Whole days become day buckets; the partial day at either end is split
//! into hour buckets. Alignment is computed in the UTC offset the interval
//! was written in. A leftover shorter than an hour (only possible at the
//! very start or end of an unaligned interval) is folded into a neighbouring
//! hour bucket. Day buckets are never widened: a leftover whose only
//! neighbour is a day stays a short bucket of its own.

use crate::cache::error::IntervalError;
use chrono::{DateTime, Duration, FixedOffset, SecondsFormat, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const SECONDS_PER_HOUR: i64 = 3_600;
pub const SECONDS_PER_DAY: i64 = 86_400;

/// A half-open time range `[start, start + duration_seconds)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSlot {
    pub start: DateTime<FixedOffset>,
    pub duration_seconds: i64,
}

impl IntervalSlot {
    pub fn new(start: DateTime<FixedOffset>, duration_seconds: i64) -> Self {
        Self {
            start,
            duration_seconds,
        }
    }

    /// Parse `"<RFC3339 start>/<RFC3339 end>"`
    pub fn parse(interval: &str) -> Result<Self, IntervalError> {
        let (start, end) = interval
            .split_once('/')
            .ok_or_else(|| IntervalError::parse(interval, "expected `start/end`"))?;

        let start = DateTime::parse_from_rfc3339(start.trim())
            .map_err(|e| IntervalError::parse(interval, format!("start: {}", e)))?;
        let end = DateTime::parse_from_rfc3339(end.trim())
            .map_err(|e| IntervalError::parse(interval, format!("end: {}", e)))?;

        let duration_seconds = (end - start).num_seconds();
        if duration_seconds < 0 {
            return Err(IntervalError::parse(interval, "end is before start"));
        }

        Ok(Self::new(start, duration_seconds))
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.start + Duration::seconds(self.duration_seconds)
    }

    /// Start as Unix epoch seconds
    pub fn epoch_start(&self) -> i64 {
        self.start.timestamp()
    }

    /// Druid interval string, second precision
    pub fn to_interval(&self) -> String {
        format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end().to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    fn offset_by(&self, seconds: i64, duration_seconds: i64) -> Self {
        Self::new(self.start + Duration::seconds(seconds), duration_seconds)
    }
}

impl fmt::Display for IntervalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_interval())
    }
}

impl FromStr for IntervalSlot {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for IntervalSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_interval())
    }
}

impl<'de> Deserialize<'de> for IntervalSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Split one interval string into day and hour buckets, in ascending order
pub fn decompose(interval: &str) -> Result<Vec<IntervalSlot>, IntervalError> {
    Ok(decompose_slot(&IntervalSlot::parse(interval)?))
}

/// Decompose every interval independently and concatenate in input order
pub fn decompose_all<S: AsRef<str>>(intervals: &[S]) -> Result<Vec<IntervalSlot>, IntervalError> {
    let mut slots = Vec::new();
    for interval in intervals {
        slots.extend(decompose(interval.as_ref())?);
    }
    Ok(slots)
}

/// Split a parsed slot into day and hour buckets
pub fn decompose_slot(slot: &IntervalSlot) -> Vec<IntervalSlot> {
    if slot.duration_seconds == 0 {
        return Vec::new();
    }
    if slot.duration_seconds < SECONDS_PER_HOUR {
        return vec![*slot];
    }

    let since_midnight = slot.start.num_seconds_from_midnight() as i64;
    let (head, days, tail) = split_aligned(slot, since_midnight, SECONDS_PER_DAY);

    let mut slots = Vec::new();
    if let Some(head) = head {
        slots.extend(split_hours(&head));
    }
    slots.extend(days);
    if let Some(tail) = tail {
        slots.extend(split_hours(&tail));
    }

    absorb_fragments(&mut slots);
    slots
}

fn split_hours(slot: &IntervalSlot) -> Vec<IntervalSlot> {
    let since_hour = (slot.start.num_seconds_from_midnight() as i64) % SECONDS_PER_HOUR;
    let (head, hours, tail) = split_aligned(slot, since_hour, SECONDS_PER_HOUR);

    head.into_iter().chain(hours).chain(tail).collect()
}

/// Split `slot` into a head up to the next multiple of `unit`, whole units,
/// and a tail. `offset` is how far `slot.start` lies past a unit boundary.
fn split_aligned(
    slot: &IntervalSlot,
    offset: i64,
    unit: i64,
) -> (Option<IntervalSlot>, Vec<IntervalSlot>, Option<IntervalSlot>) {
    let total = slot.duration_seconds;
    let mut position = 0;

    let head = if offset > 0 {
        let length = (unit - offset).min(total);
        position = length;
        Some(slot.offset_by(0, length))
    } else {
        None
    };

    let mut whole = Vec::new();
    while total - position >= unit {
        whole.push(slot.offset_by(position, unit));
        position += unit;
    }

    let tail = (total > position).then(|| slot.offset_by(position, total - position));

    (head, whole, tail)
}

/// Fold a sub-hour head or tail into its hour-level neighbour. A day bucket
/// is never widened, so a fragment next to one stays a bucket of its own.
fn absorb_fragments(slots: &mut Vec<IntervalSlot>) {
    let hour_level = |slot: &IntervalSlot| slot.duration_seconds < SECONDS_PER_DAY;

    if slots.len() > 1 && slots[0].duration_seconds < SECONDS_PER_HOUR && hour_level(&slots[1]) {
        let first = slots.remove(0);
        slots[0].start = first.start;
        slots[0].duration_seconds += first.duration_seconds;
    }

    let n = slots.len();
    if n > 1 && slots[n - 1].duration_seconds < SECONDS_PER_HOUR && hour_level(&slots[n - 2]) {
        if let Some(last) = slots.pop() {
            slots[n - 2].duration_seconds += last.duration_seconds;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervals(slots: &[IntervalSlot]) -> Vec<String> {
        slots.iter().map(|s| s.to_interval()).collect()
    }

    fn assert_exact_cover(input: &str, slots: &[IntervalSlot]) {
        let whole = IntervalSlot::parse(input).unwrap();
        if whole.duration_seconds == 0 {
            assert!(slots.is_empty());
            return;
        }
        assert_eq!(slots[0].start, whole.start, "{}", input);
        assert_eq!(slots.last().unwrap().end(), whole.end(), "{}", input);
        for pair in slots.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start, "gap or overlap in {}", input);
        }
        let total: i64 = slots.iter().map(|s| s.duration_seconds).sum();
        assert_eq!(total, whole.duration_seconds, "{}", input);
    }

    #[test]
    fn test_single_day() {
        let slots = decompose("2024-01-01T00:00:00Z/2024-01-02T00:00:00Z").unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].duration_seconds, SECONDS_PER_DAY);
        assert_eq!(
            slots[0].to_interval(),
            "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z"
        );
    }

    #[test]
    fn test_days_with_hour_edges() {
        let slots = decompose("2024-01-01T22:00:00Z/2024-01-03T02:00:00Z").unwrap();
        assert_eq!(
            intervals(&slots),
            vec![
                "2024-01-01T22:00:00Z/2024-01-01T23:00:00Z",
                "2024-01-01T23:00:00Z/2024-01-02T00:00:00Z",
                "2024-01-02T00:00:00Z/2024-01-03T00:00:00Z",
                "2024-01-03T00:00:00Z/2024-01-03T01:00:00Z",
                "2024-01-03T01:00:00Z/2024-01-03T02:00:00Z",
            ]
        );
    }

    #[test]
    fn test_hours_within_one_day() {
        let slots = decompose("2024-01-01T10:00:00Z/2024-01-01T13:00:00Z").unwrap();
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| s.duration_seconds == SECONDS_PER_HOUR));
        assert_eq!(slots[2].end().to_rfc3339(), "2024-01-01T13:00:00+00:00");
    }

    #[test]
    fn test_fragments_absorbed() {
        let input = "2024-01-01T10:30:00Z/2024-01-01T13:15:00Z";
        let slots = decompose(input).unwrap();
        assert_eq!(
            intervals(&slots),
            vec![
                "2024-01-01T10:30:00Z/2024-01-01T12:00:00Z",
                "2024-01-01T12:00:00Z/2024-01-01T13:15:00Z",
            ]
        );
        assert_exact_cover(input, &slots);
    }

    #[test]
    fn test_short_and_empty() {
        let slots = decompose("2024-01-01T10:10:00Z/2024-01-01T10:40:00Z").unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].duration_seconds, 1800);

        assert!(decompose("2024-01-01T10:00:00Z/2024-01-01T10:00:00Z")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_offset_preserved() {
        let slots = decompose("2024-01-01T00:00:00+08:00/2024-01-02T01:00:00+08:00").unwrap();
        assert_eq!(
            intervals(&slots),
            vec![
                "2024-01-01T00:00:00+08:00/2024-01-02T00:00:00+08:00",
                "2024-01-02T00:00:00+08:00/2024-01-02T01:00:00+08:00",
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "2024-01-01T00:00:00Z",
            "2024-01-01/2024-01-02",
            "2024-01-02T00:00:00Z/2024-01-01T00:00:00Z",
        ] {
            let err = decompose(bad).unwrap_err();
            let IntervalError::Parse { interval, .. } = err;
            assert_eq!(interval, bad);
        }
    }

    #[test]
    fn test_decompose_all_keeps_order() {
        let slots = decompose_all(&[
            "2024-02-01T00:00:00Z/2024-02-02T00:00:00Z",
            "2024-01-01T05:00:00Z/2024-01-01T06:00:00Z",
        ])
        .unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].duration_seconds, SECONDS_PER_DAY);
        assert_eq!(slots[1].duration_seconds, SECONDS_PER_HOUR);

        assert!(decompose_all(&["2024-01-01T00:00:00Z/2024-01-02T00:00:00Z", "nope"]).is_err());
    }

    #[test]
    fn test_fragment_next_to_day_kept_separate() {
        let input = "2024-01-01T23:30:00Z/2024-01-03T00:00:00Z";
        let slots = decompose(input).unwrap();
        assert_eq!(
            intervals(&slots),
            vec![
                "2024-01-01T23:30:00Z/2024-01-02T00:00:00Z",
                "2024-01-02T00:00:00Z/2024-01-03T00:00:00Z",
            ]
        );
        assert_exact_cover(input, &slots);

        let input = "2024-01-01T00:00:00Z/2024-01-02T00:30:00Z";
        let slots = decompose(input).unwrap();
        assert_eq!(
            intervals(&slots),
            vec![
                "2024-01-01T00:00:00Z/2024-01-02T00:00:00Z",
                "2024-01-02T00:00:00Z/2024-01-02T00:30:00Z",
            ]
        );
        assert_exact_cover(input, &slots);
    }

    #[test]
    fn test_coverage_properties() {
        let starts = [
            "2024-01-01T00:00:00Z",
            "2024-01-01T00:00:01Z",
            "2024-01-01T23:30:00Z",
            "2024-03-10T07:45:30Z",
            "2024-06-30T23:59:59+05:30",
            "2023-12-31T12:00:00-03:00",
        ];
        let durations = [
            1, 59, 1_800, 3_599, 3_600, 3_601, 7_261, 86_399, 86_400, 88_200, 90_061, 400_000,
        ];

        for start in starts {
            let start = DateTime::parse_from_rfc3339(start).unwrap();
            for &duration in &durations {
                let input = IntervalSlot::new(start, duration).to_interval();
                let slots = decompose(&input).unwrap();
                assert_exact_cover(&input, &slots);

                for (i, slot) in slots.iter().enumerate() {
                    // day buckets are exactly one aligned day
                    if slot.duration_seconds >= SECONDS_PER_DAY {
                        assert_eq!(slot.duration_seconds, SECONDS_PER_DAY, "{}: {}", input, slot);
                        assert_eq!(slot.start.num_seconds_from_midnight(), 0, "{}: {}", input, slot);
                    } else {
                        // at most one hour plus a fragment on either side
                        assert!(
                            slot.duration_seconds < 3 * SECONDS_PER_HOUR,
                            "{}: {}",
                            input,
                            slot
                        );
                    }

                    // a short bucket in a long input sits at an edge, next to a day
                    if duration >= SECONDS_PER_HOUR && slot.duration_seconds < SECONDS_PER_HOUR {
                        let neighbour = if i == 0 { slots.get(1) } else { slots.get(i - 1) };
                        assert!(
                            (i == 0 || i == slots.len() - 1)
                                && neighbour.is_some_and(|n| n.duration_seconds == SECONDS_PER_DAY),
                            "short slot in {}: {:?}",
                            input,
                            intervals(&slots)
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_hour_aligned_inputs_use_exact_units() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T07:00:00Z").unwrap();
        for hours in 1..=80 {
            let slot = IntervalSlot::new(start, hours * SECONDS_PER_HOUR);
            for piece in decompose_slot(&slot) {
                assert!(
                    piece.duration_seconds == SECONDS_PER_HOUR
                        || piece.duration_seconds == SECONDS_PER_DAY,
                    "{} hours produced {}",
                    hours,
                    piece
                );
                if piece.duration_seconds == SECONDS_PER_DAY {
                    assert_eq!(piece.start.num_seconds_from_midnight(), 0);
                }
            }
        }
    }

    #[test]
    fn test_serde_as_string() {
        let slot = IntervalSlot::parse("2024-01-01T00:00:00Z/2024-01-01T01:00:00Z").unwrap();
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(json, "\"2024-01-01T00:00:00Z/2024-01-01T01:00:00Z\"");
        let back: IntervalSlot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slot);
    }
}
