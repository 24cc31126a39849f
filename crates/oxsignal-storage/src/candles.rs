//! Fixed-width OHLC aggregation of raw samples.

use chrono::{DateTime, Utc};
use oxsignal_common::types::{Candle, MetricSample, MetricType};

/// Start of the `width_secs` bucket containing `ts`, aligned to the epoch.
pub fn bucket_start(ts: DateTime<Utc>, width_secs: u64) -> DateTime<Utc> {
    let width_ms = (width_secs.max(1) * 1000) as i64;
    let ms = ts.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(width_ms)).unwrap_or_default()
}

/// Buckets `samples` (oldest first) into candles. Empty buckets are not
/// materialized, so consecutive candles may be more than one width apart.
pub fn aggregate(samples: &[MetricSample], width_secs: u64) -> Vec<Candle> {
    let mut candles: Vec<Candle> = Vec::new();
    for sample in samples {
        let open_time = bucket_start(sample.timestamp, width_secs);
        match candles.last_mut() {
            Some(c) if c.open_time == open_time => {
                c.high = c.high.max(sample.value);
                c.low = c.low.min(sample.value);
                c.close = sample.value;
                c.count += 1;
            }
            _ => candles.push(Candle {
                open_time,
                open: sample.value,
                high: sample.value,
                low: sample.value,
                close: sample.value,
                count: 1,
            }),
        }
    }
    candles
}

/// Candle closes as window samples stamped with the bucket open time.
pub fn closes(agent_id: &str, metric: MetricType, candles: &[Candle]) -> Vec<MetricSample> {
    candles
        .iter()
        .map(|c| MetricSample {
            agent_id: agent_id.to_string(),
            metric,
            value: c.close,
            timestamp: c.open_time,
        })
        .collect()
}
