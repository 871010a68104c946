// ── Payload decoding ──
//
// Scalars are UTF-8 decimal text. Record topics carry fields separated by
// U+0002; a payload with several records separates them with U+0001. Every
// topic this client reads carries exactly one record.

use crate::error::DecodeError;
use crate::model::{PublisherMetric, TelemetryTopic, TelemetryValue};
use crate::refresh::RefreshInterval;

pub const FIELD_DELIMITER: char = '\u{2}';
pub const RECORD_DELIMITER: char = '\u{1}';

/// Resolve `path` against `root` and decode `payload` for that topic.
pub fn decode_topic(
    root: &str,
    path: &str,
    payload: &[u8],
) -> Result<TelemetryValue, DecodeError> {
    let topic = TelemetryTopic::resolve(root, path).ok_or_else(|| DecodeError::UnknownTopic {
        path: path.to_owned(),
    })?;
    decode(topic, payload)
}

/// Decode a raw payload for a known topic.
pub fn decode(topic: TelemetryTopic, payload: &[u8]) -> Result<TelemetryValue, DecodeError> {
    let label = topic.label();
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::NotUtf8 { topic: label })?;

    match topic {
        TelemetryTopic::Steering => bounded(label, text, -1.0, 1.0).map(TelemetryValue::Steering),
        TelemetryTopic::Braking => bounded(label, text, 0.0, 1.0).map(TelemetryValue::Braking),
        TelemetryTopic::Acceleration => {
            bounded(label, text, 0.0, 1.0).map(TelemetryValue::Acceleration)
        }
        TelemetryTopic::Gear => unsigned(label, text).map(TelemetryValue::Gear),
        TelemetryTopic::PublisherMetric(metric) => decode_metric(metric, label, text),
        TelemetryTopic::ButtonStates => fields(label, text)?
            .into_iter()
            .map(|field| match field.trim() {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(malformed(label, format!("expected 0 or 1, got '{other}'"))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TelemetryValue::ButtonStates),
        TelemetryTopic::ButtonNames => fields(label, text)?
            .into_iter()
            .map(|field| {
                let name = field.trim();
                if name.is_empty() {
                    Err(malformed(label, "button name is empty".into()))
                } else {
                    Ok(name.to_owned())
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TelemetryValue::ButtonNames),
        TelemetryTopic::RefreshInterval => {
            let fields = fields(label, text)?;
            let [frequency, sleep] = fields.as_slice() else {
                return Err(malformed(
                    label,
                    format!("expected 2 fields, got {}", fields.len()),
                ));
            };
            let frequency: u32 = unsigned(label, frequency)?;
            if frequency == 0 {
                return Err(malformed(label, "frequency must be positive".into()));
            }
            let sleep: u32 = unsigned(label, sleep)?;
            Ok(TelemetryValue::RefreshInterval(RefreshInterval::new(
                frequency, sleep,
            )))
        }
    }
}

fn decode_metric(
    metric: PublisherMetric,
    label: &'static str,
    text: &str,
) -> Result<TelemetryValue, DecodeError> {
    unsigned(label, text).map(|value| TelemetryValue::PublisherMetric(metric, value))
}

fn malformed(topic: &'static str, reason: String) -> DecodeError {
    DecodeError::Malformed { topic, reason }
}

fn bounded(topic: &'static str, text: &str, min: f64, max: f64) -> Result<f64, DecodeError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|e| malformed(topic, format!("'{}' is not a number ({e})", text.trim())))?;
    if !value.is_finite() {
        return Err(malformed(topic, format!("'{}' is not finite", text.trim())));
    }
    if !(min..=max).contains(&value) {
        return Err(DecodeError::OutOfRange {
            topic,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn unsigned<T>(topic: &'static str, text: &str) -> Result<T, DecodeError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let trimmed = text.trim();
    trimmed
        .parse()
        .map_err(|e| malformed(topic, format!("'{trimmed}' is not an unsigned integer ({e})")))
}

/// Split a single-record payload into its fields. Empty payload means an
/// empty record.
fn fields<'a>(topic: &'static str, text: &'a str) -> Result<Vec<&'a str>, DecodeError> {
    let record = text.trim_end_matches(RECORD_DELIMITER);
    if record.contains(RECORD_DELIMITER) {
        let records = record.split(RECORD_DELIMITER).count();
        return Err(malformed(
            topic,
            format!("expected a single record, got {records}"),
        ));
    }
    if record.is_empty() {
        return Ok(Vec::new());
    }
    Ok(record.split(FIELD_DELIMITER).collect())
}
