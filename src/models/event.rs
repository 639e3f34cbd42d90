use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

/// Fields describing one finalized item, as reported by the upstream node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationPayload {
    pub vertex_hash: String,
    pub vertex_type: String,
    pub finalization_time: String,
}

impl FinalizationPayload {
    /// Build a payload from a raw upstream notification
    pub fn new(
        vertex_hash: impl Into<String>,
        vertex_type: impl Into<String>,
        latency: Duration,
    ) -> Self {
        Self {
            vertex_hash: vertex_hash.into(),
            vertex_type: vertex_type.into(),
            finalization_time: format_latency(latency),
        }
    }
}

/// A payload stamped with its position in the relay's history.
///
/// Only the payload fields go over the wire; the sequence is internal ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    #[serde(skip)]
    sequence: u64,
    #[serde(flatten)]
    payload: FinalizationPayload,
}

impl EventRecord {
    pub(crate) fn new(sequence: u64, payload: FinalizationPayload) -> Self {
        Self { sequence, payload }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &FinalizationPayload {
        &self.payload
    }
}

/// Render a latency the way the upstream node prints durations
/// (`"0s"`, `"850ns"`, `"1.5ms"`, `"2m3.25s"`, `"1h0m0s"`).
pub fn format_latency(d: Duration) -> String {
    let nanos = d.as_nanos();
    match nanos {
        0 => "0s".to_string(),
        1..=999 => format!("{}ns", nanos),
        1_000..=999_999 => format!("{}µs", decimal(nanos, 1_000, 3)),
        1_000_000..=999_999_999 => format!("{}ms", decimal(nanos, 1_000_000, 6)),
        _ => {
            let total_secs = d.as_secs();
            let hours = total_secs / 3600;
            let minutes = (total_secs % 3600) / 60;
            let sec_nanos = u128::from(total_secs % 60) * 1_000_000_000
                + u128::from(d.subsec_nanos());

            let mut out = String::new();
            if hours > 0 {
                let _ = write!(out, "{}h", hours);
            }
            if hours > 0 || minutes > 0 {
                let _ = write!(out, "{}m", minutes);
            }
            let _ = write!(out, "{}s", decimal(sec_nanos, 1_000_000_000, 9));
            out
        }
    }
}

fn decimal(value: u128, unit: u128, width: usize) -> String {
    let whole = value / unit;
    let rem = value % unit;
    if rem == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", rem, width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_wire_shape() {
        let record = EventRecord::new(
            7,
            FinalizationPayload {
                vertex_hash: "abc".to_string(),
                vertex_type: "tx".to_string(),
                finalization_time: "1.5s".to_string(),
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "vertex_hash": "abc",
                "vertex_type": "tx",
                "finalization_time": "1.5s"
            })
        );
    }

    #[test]
    fn test_format_latency_small_units() {
        assert_eq!(format_latency(Duration::ZERO), "0s");
        assert_eq!(format_latency(Duration::from_nanos(850)), "850ns");
        assert_eq!(format_latency(Duration::from_nanos(1_500)), "1.5µs");
        assert_eq!(format_latency(Duration::from_millis(250)), "250ms");
        assert_eq!(format_latency(Duration::from_micros(1_250)), "1.25ms");
    }

    #[test]
    fn test_format_latency_compound() {
        assert_eq!(format_latency(Duration::from_millis(1_500)), "1.5s");
        assert_eq!(format_latency(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_latency(Duration::from_millis(123_250)), "2m3.25s");
        assert_eq!(format_latency(Duration::from_secs(3600)), "1h0m0s");
    }

    #[test]
    fn test_payload_new_formats_latency() {
        let payload = FinalizationPayload::new("h", "block", Duration::from_secs(2));
        assert_eq!(payload.finalization_time, "2s");
        assert_eq!(payload.vertex_type, "block");
    }
}
