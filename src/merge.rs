//! Per-group max reduction and the inbound/outbound merge.

use crate::samples::{SampleRow, SampleTable, SampleType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// One row per (time, device, interface, sample_type) after reduction
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub time: DateTime<Utc>,
    pub device: String,
    pub interface: String,
    pub sample_type: SampleType,
    pub d_octets_in: f64,
    pub d_octets_out: f64,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("unrecognized timestamp '{time}' for {device}:{interface}")]
    Timestamp {
        time: String,
        device: String,
        interface: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct GroupKey<'a> {
    time: DateTime<Utc>,
    device: &'a str,
    interface: &'a str,
    sample_type: SampleType,
}

impl<'a> GroupKey<'a> {
    fn of(row: &'a SampleRow, time: DateTime<Utc>) -> Self {
        Self {
            time,
            device: &row.device,
            interface: &row.interface,
            sample_type: row.sample_type,
        }
    }
}

/// Indices of the rows holding each direction's maximum within a group
#[derive(Debug, Clone, Copy)]
struct Selection {
    max_in: usize,
    max_out: usize,
}

/// Whether `candidate` should replace `current` as the running maximum.
/// Strict comparison keeps the first of equal values; NaN never wins.
fn beats(candidate: f64, current: f64) -> bool {
    if candidate.is_nan() {
        return false;
    }
    current.is_nan() || candidate > current
}

/// UTC instant of every row, in row order.
fn normalized_times(rows: &[SampleRow]) -> Result<Vec<DateTime<Utc>>, MergeError> {
    rows.iter()
        .map(|row| {
            parse_timestamp(&row.time).ok_or_else(|| MergeError::Timestamp {
                time: row.time.clone(),
                device: row.device.clone(),
                interface: row.interface.clone(),
            })
        })
        .collect()
}

fn select_maxima<'a>(
    rows: &'a [SampleRow],
    times: &[DateTime<Utc>],
) -> BTreeMap<GroupKey<'a>, Selection> {
    let mut groups: BTreeMap<GroupKey<'a>, Selection> = BTreeMap::new();
    for (idx, (row, &time)) in rows.iter().zip(times).enumerate() {
        groups
            .entry(GroupKey::of(row, time))
            .and_modify(|sel| {
                if beats(row.d_octets_in, rows[sel.max_in].d_octets_in) {
                    sel.max_in = idx;
                }
                if beats(row.d_octets_out, rows[sel.max_out].d_octets_out) {
                    sel.max_out = idx;
                }
            })
            .or_insert(Selection {
                max_in: idx,
                max_out: idx,
            });
    }
    groups
}

/// Reduce rows to one merged row per group.
///
/// Each group takes d_octets_in from its max-inbound row and d_octets_out
/// from its max-outbound row. Output is ordered by group key.
pub fn reduce_and_merge(table: &SampleTable) -> Result<Vec<MergedRow>, MergeError> {
    let times = normalized_times(&table.rows)?;
    let merged: Vec<MergedRow> = select_maxima(&table.rows, &times)
        .into_iter()
        .map(|(key, sel)| MergedRow {
            time: key.time,
            device: key.device.to_string(),
            interface: key.interface.to_string(),
            sample_type: key.sample_type,
            d_octets_in: table.rows[sel.max_in].d_octets_in,
            d_octets_out: table.rows[sel.max_out].d_octets_out,
        })
        .collect();

    tracing::debug!(
        "Reduced {} samples to {} merged rows",
        table.len(),
        merged.len()
    );
    Ok(merged)
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Normalize a sample timestamp to UTC.
///
/// Offsets are honoured; times without one are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(time: &str, device: &str, st: SampleType, octets_in: f64, octets_out: f64) -> SampleRow {
        SampleRow {
            time: time.to_string(),
            device: device.to_string(),
            interface: "Gi0/1".to_string(),
            interface_speed: Some(1_000_000_000.0),
            sample_type: st,
            d_octets_in: octets_in,
            d_octets_out: octets_out,
        }
    }

    const T0: &str = "2021-01-01T00:00:00";
    const T1: &str = "2021-01-01T00:05:00";

    #[test]
    fn larger_inbound_value_wins() {
        let table = SampleTable {
            rows: vec![
                row(T0, "R1", SampleType::Avg, 100.0, 50.0),
                row(T0, "R1", SampleType::Avg, 400.0, 50.0),
            ],
        };
        let merged = reduce_and_merge(&table).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].d_octets_in, 400.0);
        assert_eq!(merged[0].d_octets_out, 50.0);
    }

    #[test]
    fn directions_are_selected_independently() {
        let table = SampleTable {
            rows: vec![
                row(T0, "R1", SampleType::Max, 900.0, 10.0),
                row(T0, "R1", SampleType::Max, 20.0, 800.0),
                row(T0, "R1", SampleType::Max, 30.0, 30.0),
            ],
        };
        let merged = reduce_and_merge(&table).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].d_octets_in, 900.0);
        assert_eq!(merged[0].d_octets_out, 800.0);
    }

    #[test]
    fn ties_resolve_to_first_row() {
        let table = SampleTable {
            rows: vec![
                row(T0, "R1", SampleType::Avg, 100.0, 7.0),
                row(T0, "R1", SampleType::Avg, 100.0, 7.0),
            ],
        };

        let times = normalized_times(&table.rows).unwrap();
        let groups = select_maxima(&table.rows, &times);
        assert_eq!(groups.len(), 1);
        let sel = groups.values().next().unwrap();
        assert_eq!(sel.max_in, 0);
        assert_eq!(sel.max_out, 0);

        // Duplicates never fan out the join
        assert_eq!(reduce_and_merge(&table).unwrap().len(), 1);
    }

    #[test]
    fn nan_never_beats_a_number() {
        assert!(!beats(f64::NAN, 1.0));
        assert!(beats(1.0, f64::NAN));
        assert!(!beats(5.0, 5.0));
        assert!(beats(6.0, 5.0));
    }

    #[test]
    fn single_row_group_round_trips() {
        let table = SampleTable {
            rows: vec![row(T0, "R1", SampleType::Min, 123.5, 67.25)],
        };
        let merged = reduce_and_merge(&table).unwrap();
        assert_eq!(merged[0].d_octets_in, 123.5);
        assert_eq!(merged[0].d_octets_out, 67.25);
        assert_eq!(merged[0].sample_type, SampleType::Min);
    }

    #[test]
    fn rows_are_unique_and_sorted_per_group() {
        let table = SampleTable {
            rows: vec![
                row(T1, "R2", SampleType::Avg, 1.0, 1.0),
                row(T0, "R2", SampleType::Max, 2.0, 2.0),
                row(T0, "R1", SampleType::Avg, 3.0, 3.0),
                row(T0, "R2", SampleType::Avg, 4.0, 4.0),
                row(T0, "R2", SampleType::Avg, 5.0, 0.5),
            ],
        };
        let merged = reduce_and_merge(&table).unwrap();
        let keys: Vec<_> = merged
            .iter()
            .map(|m| (m.time, m.device.as_str(), m.sample_type))
            .collect();
        let t0 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2021, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(
            keys,
            vec![
                (t0, "R1", SampleType::Avg),
                (t0, "R2", SampleType::Avg),
                (t0, "R2", SampleType::Max),
                (t1, "R2", SampleType::Avg),
            ]
        );
        assert_eq!(merged[1].d_octets_in, 5.0);
        assert_eq!(merged[1].d_octets_out, 4.0);
    }

    #[test]
    fn equal_instants_share_a_group_whatever_the_spelling() {
        let table = SampleTable {
            rows: vec![
                row("2021-01-01T00:00:00", "R1", SampleType::Avg, 10.0, 90.0),
                row("2021-01-01 00:00:00", "R1", SampleType::Avg, 80.0, 20.0),
                row("2021-01-01T01:00:00+01:00", "R1", SampleType::Avg, 30.0, 30.0),
            ],
        };
        let merged = reduce_and_merge(&table).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].d_octets_in, 80.0);
        assert_eq!(merged[0].d_octets_out, 90.0);
    }

    #[test]
    fn blank_octets_are_skipped_in_favour_of_numbers() {
        let table = SampleTable {
            rows: vec![
                row(T0, "R1", SampleType::Max, f64::NAN, 40.0),
                row(T0, "R1", SampleType::Max, 25.0, f64::NAN),
            ],
        };
        let merged = reduce_and_merge(&table).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].d_octets_in, 25.0);
        assert_eq!(merged[0].d_octets_out, 40.0);
    }

    #[test]
    fn empty_table_merges_to_nothing() {
        assert!(reduce_and_merge(&SampleTable::empty()).unwrap().is_empty());
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let table = SampleTable {
            rows: vec![row("yesterday", "R1", SampleType::Avg, 1.0, 1.0)],
        };
        let err = reduce_and_merge(&table).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
        assert!(err.to_string().contains("R1:Gi0/1"));
    }

    #[test]
    fn timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2021-01-01T00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01 00:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01 00:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2021-01-01T02:00:00+02:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2021-01-01 00:00:00.500").map(|t| t.timestamp_subsec_millis()),
            Some(500)
        );
        assert_eq!(parse_timestamp("01/01/2021"), None);
    }
}
