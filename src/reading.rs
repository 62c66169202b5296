//! Wire records from the telemetry API and their normalization into typed
//! readings.
//!
//! ThingSpeak returns field values as strings (or occasionally bare numbers,
//! depending on channel settings), so raw entries keep them as JSON values
//! until normalization coerces them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TelemetryError;

/// Channel field assignment, fixed by convention on the harvester firmware.
///
/// Replaces the `"field1"`..`"field5"` string keys of the wire format with a
/// closed set the compiler can check exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Voltage,
    Events,
    Temperature,
    Humidity,
    Light,
}

impl FieldId {
    /// Field number used in the `fields/{n}.json` endpoint path.
    pub fn index(self) -> u8 {
        match self {
            FieldId::Voltage => 1,
            FieldId::Events => 2,
            FieldId::Temperature => 3,
            FieldId::Humidity => 4,
            FieldId::Light => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FieldId::Voltage => "voltage",
            FieldId::Events => "event count",
            FieldId::Temperature => "temperature",
            FieldId::Humidity => "humidity",
            FieldId::Light => "light level",
        }
    }
}

/// One raw feed entry exactly as the API serialized it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFeed {
    pub created_at: String,
    #[serde(default)]
    pub field1: Option<Value>,
    #[serde(default)]
    pub field2: Option<Value>,
    #[serde(default)]
    pub field3: Option<Value>,
    #[serde(default)]
    pub field4: Option<Value>,
    #[serde(default)]
    pub field5: Option<Value>,
}

/// One normalized telemetry sample. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub voltage: f64,
    pub events: i64,
    pub temperature: f64,
    pub humidity: f64,
    pub light: i64,
}

/// An ordered batch of readings from a single fetch, oldest first.
pub type ReadingWindow = Vec<Reading>;

// Anything that does not coerce to a finite number becomes 0. Matches the
// harvester dashboard convention for missing/garbled channel fields.
fn lenient_float(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

// Integer fields tolerate a fractional wire value ("3.7" -> 3).
fn lenient_int(value: Option<&Value>) -> i64 {
    lenient_float(value).trunc() as i64
}

impl Reading {
    /// Normalize one raw entry.
    ///
    /// Numeric fields have a safe default and zero-fill on parse failure;
    /// the timestamp does not, so an unparseable `created_at` fails the whole
    /// record rather than silently corrupting day/hour aggregation.
    pub fn from_raw(raw: &RawFeed) -> Result<Self, TelemetryError> {
        let timestamp = DateTime::parse_from_rfc3339(&raw.created_at)
            .map_err(|_| TelemetryError::MalformedRecord {
                value: raw.created_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            timestamp,
            voltage: lenient_float(raw.field1.as_ref()),
            events: lenient_int(raw.field2.as_ref()),
            temperature: lenient_float(raw.field3.as_ref()),
            humidity: lenient_float(raw.field4.as_ref()),
            light: lenient_int(raw.field5.as_ref()),
        })
    }

    /// Value of one channel field on this reading, as a display scalar.
    pub fn field_value(&self, field: FieldId) -> f64 {
        match field {
            FieldId::Voltage => self.voltage,
            FieldId::Events => self.events as f64,
            FieldId::Temperature => self.temperature,
            FieldId::Humidity => self.humidity,
            FieldId::Light => self.light as f64,
        }
    }
}

/// Normalize a whole fetch result, preserving order.
pub fn normalize_window(feeds: &[RawFeed]) -> Result<ReadingWindow, TelemetryError> {
    feeds.iter().map(Reading::from_raw).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    fn raw(created_at: &str, voltage: Value) -> RawFeed {
        RawFeed {
            created_at: created_at.to_string(),
            field1: Some(voltage),
            field2: Some(json!("12")),
            field3: Some(json!("26.8")),
            field4: Some(json!(65)),
            field5: Some(json!("420")),
        }
    }

    #[test]
    fn normalizes_string_and_numeric_fields() {
        let reading = Reading::from_raw(&raw("2024-01-03T08:00:00Z", json!("2.5"))).unwrap();
        assert_relative_eq!(reading.voltage, 2.5);
        assert_eq!(reading.events, 12);
        assert_relative_eq!(reading.temperature, 26.8);
        assert_relative_eq!(reading.humidity, 65.0);
        assert_eq!(reading.light, 420);
    }

    #[test]
    fn garbage_numeric_fields_default_to_zero() {
        let entry = RawFeed {
            created_at: "2024-01-03T08:00:00Z".to_string(),
            field1: Some(json!("not-a-number")),
            field2: None,
            field3: Some(json!("")),
            field4: Some(Value::Null),
            field5: Some(json!("NaN")),
        };
        let reading = Reading::from_raw(&entry).unwrap();
        assert_relative_eq!(reading.voltage, 0.0);
        assert_eq!(reading.events, 0);
        assert_relative_eq!(reading.temperature, 0.0);
        assert_relative_eq!(reading.humidity, 0.0);
        assert_eq!(reading.light, 0);
    }

    #[test]
    fn fractional_integer_fields_truncate() {
        let entry = raw("2024-01-03T08:00:00Z", json!("1.0"));
        let entry = RawFeed {
            field2: Some(json!("3.7")),
            ..entry
        };
        assert_eq!(Reading::from_raw(&entry).unwrap().events, 3);
    }

    #[test]
    fn unparseable_timestamp_fails_fast() {
        let entry = raw("yesterday-ish", json!("2.5"));
        let err = Reading::from_raw(&entry).unwrap_err();
        assert!(matches!(err, TelemetryError::MalformedRecord { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn window_normalization_preserves_order() {
        let feeds = vec![
            raw("2024-01-01T00:00:00Z", json!("1.0")),
            raw("2024-01-02T00:00:00Z", json!("2.0")),
        ];
        let window = normalize_window(&feeds).unwrap();
        assert_eq!(window.len(), 2);
        assert!(window[0].timestamp < window[1].timestamp);
    }

    #[test]
    fn field_ids_map_to_wire_indices() {
        assert_eq!(FieldId::Voltage.index(), 1);
        assert_eq!(FieldId::Light.index(), 5);
    }
}
