//! History statistics.
//!
//! Always derived from the full record set; nothing here is persisted or
//! cached between calls.

use bindscope_common::time::millis_to_utc;
use bindscope_common::{DailyCount, HistoryStats, PredictionRecord, PredictionSource, SourceBreakdown};
use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use std::collections::HashMap;

/// Length of the activity series.
pub const ACTIVITY_WINDOW_DAYS: i64 = 30;

const NO_PROTEIN: &str = "N/A";

/// Summarize `records` relative to `now`.
///
/// Day buckets follow the calendar of `now`'s time zone.
pub fn compute_stats<Tz: TimeZone>(records: &[PredictionRecord], now: &DateTime<Tz>) -> HistoryStats {
    let total = records.len();

    let (average_pk, average_confidence) = if total == 0 {
        (0.0, 0.0)
    } else {
        let pk_sum: f64 = records.iter().map(|r| r.predicted_pk).sum();
        let conf_sum: f64 = records.iter().map(|r| r.confidence_score).sum();
        (pk_sum / total as f64, conf_sum / total as f64)
    };

    let mut by_source = SourceBreakdown::default();
    for record in records {
        match record.source {
            PredictionSource::Single => by_source.single += 1,
            PredictionSource::Batch => by_source.batch += 1,
        }
    }

    HistoryStats {
        total_predictions: total,
        average_pk,
        average_confidence,
        most_tested_protein: most_tested_protein(records),
        predictions_by_day: daily_counts(records, now),
        predictions_by_source: by_source,
    }
}

/// Protein with the most records; ties go to the one seen first.
fn most_tested_protein(records: &[PredictionRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for record in records {
        let name = record.protein_name.as_str();
        let entry = counts.entry(name).or_insert(0);
        if *entry == 0 {
            order.push(name);
        }
        *entry += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for name in order {
        let count = counts[name];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((name, count));
        }
    }
    best.map(|(name, _)| name.to_string())
        .unwrap_or_else(|| NO_PROTEIN.to_string())
}

fn daily_counts<Tz: TimeZone>(records: &[PredictionRecord], now: &DateTime<Tz>) -> Vec<DailyCount> {
    let tz = now.timezone();
    let today = now.date_naive();

    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for record in records {
        let day = millis_to_utc(record.timestamp).with_timezone(&tz).date_naive();
        *per_day.entry(day).or_insert(0) += 1;
    }

    (0..ACTIVITY_WINDOW_DAYS)
        .rev()
        .map(|days_ago| {
            let date = today - Duration::days(days_ago);
            DailyCount {
                date,
                count: per_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bindscope_common::NewPrediction;
    use chrono::{FixedOffset, Utc};

    fn record(protein: &str, source: PredictionSource, pk: f64, conf: f64, ts: i64) -> PredictionRecord {
        NewPrediction::new(source, "drug", "C", protein, "MKT", pk, conf)
            .into_record(format!("{protein}-{ts}"), ts)
    }

    #[test]
    fn test_empty_history() {
        let stats = compute_stats(&[], &Utc::now());
        assert_eq!(stats.total_predictions, 0);
        assert_eq!(stats.average_pk, 0.0);
        assert_eq!(stats.average_confidence, 0.0);
        assert_eq!(stats.most_tested_protein, "N/A");
        assert_eq!(stats.predictions_by_day.len(), 30);
        assert!(stats.predictions_by_day.iter().all(|d| d.count == 0));
        assert_eq!(stats.predictions_by_source, SourceBreakdown::default());
    }

    #[test]
    fn test_averages_and_sources() {
        let now = Utc::now();
        let ts = now.timestamp_millis();
        let records = vec![
            record("EGFR", PredictionSource::Single, 6.0, 80.0, ts),
            record("EGFR", PredictionSource::Batch, 8.0, 90.0, ts),
            record("ABL1", PredictionSource::Batch, 7.0, 70.0, ts),
        ];
        let stats = compute_stats(&records, &now);
        assert_eq!(stats.total_predictions, 3);
        assert!((stats.average_pk - 7.0).abs() < 1e-9);
        assert!((stats.average_confidence - 80.0).abs() < 1e-9);
        assert_eq!(stats.most_tested_protein, "EGFR");
        assert_eq!(stats.predictions_by_source, SourceBreakdown { single: 1, batch: 2 });
    }

    #[test]
    fn test_protein_tie_goes_to_first_seen() {
        let ts = 0;
        let records = vec![
            record("KRAS", PredictionSource::Single, 1.0, 1.0, ts),
            record("TP53", PredictionSource::Single, 1.0, 1.0, ts),
            record("TP53", PredictionSource::Single, 1.0, 1.0, ts),
            record("KRAS", PredictionSource::Single, 1.0, 1.0, ts),
        ];
        assert_eq!(most_tested_protein(&records), "KRAS");
    }

    #[test]
    fn test_day_series_buckets_by_local_calendar() {
        // 2025-06-15 10:00 at UTC+02:00
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let today_start = tz.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap().timestamp_millis();

        let records = vec![
            // 00:30 local today (still the previous day in UTC)
            record("A", PredictionSource::Single, 1.0, 1.0, today_start + 30 * 60 * 1000),
            // one minute before local midnight -> yesterday
            record("A", PredictionSource::Single, 1.0, 1.0, today_start - 60 * 1000),
            // 29 days ago, the first bucket
            record("A", PredictionSource::Single, 1.0, 1.0, today_start - 29 * 86_400_000),
            // 30 days ago, outside the window
            record("A", PredictionSource::Single, 1.0, 1.0, today_start - 30 * 86_400_000),
        ];

        let series = compute_stats(&records, &now).predictions_by_day;
        assert_eq!(series.len(), 30);
        assert_eq!(series[0].date, NaiveDate::from_ymd_opt(2025, 5, 17).unwrap());
        assert_eq!(series[29].date, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(series[29].count, 1);
        assert_eq!(series[28].count, 1);
        assert_eq!(series[0].count, 1);
        assert_eq!(series.iter().map(|d| d.count).sum::<usize>(), 3);
    }
}
