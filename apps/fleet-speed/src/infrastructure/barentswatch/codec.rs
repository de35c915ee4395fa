//! BarentsWatch Frame Codec
//!
//! Decodes one line of the live AIS stream. Each line is a JSON object
//! tagged by `"type"`:
//!
//! ```json
//! {"type":"Position","mmsi":257123456,"msgtime":"2024-05-01T12:00:00+00:00",
//!  "latitude":60.1,"longitude":5.2,"speedOverGround":12.3,"courseOverGround":87.0}
//! {"type":"Staticdata","mmsi":257123456,"name":"NORDLYS","callSign":"LHZX",...}
//! ```
//!
//! Objects without a tag are treated as positions. Static data only carries
//! its MMSI forward. Unknown tags decode to `Frame::Unknown`. Fields not
//! listed here are ignored.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::application::ports::{DecodeError, Frame, FrameDecoder};
use crate::domain::vessel::{AisMessage, Mmsi, VesselDataError};

type Object = Map<String, Value>;

/// JSON decoder for the BarentsWatch live AIS stream.
#[derive(Debug, Default, Clone)]
pub struct JsonFrameDecoder;

impl JsonFrameDecoder {
    /// Create a decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FrameDecoder for JsonFrameDecoder {
    fn decode(&self, frame: &str) -> Result<Frame, DecodeError> {
        let value: Value = serde_json::from_str(frame.trim())?;
        let Value::Object(object) = value else {
            return Err(DecodeError::NotAnObject);
        };

        match object.get("type").and_then(Value::as_str) {
            Some("Position") | None => decode_position(&object).map(Frame::Position),
            Some("Staticdata") => mmsi(&object).map(Frame::Static),
            Some(other) => Ok(Frame::Unknown(other.to_string())),
        }
    }
}

// =============================================================================
// Per-type decoders
// =============================================================================

fn decode_position(object: &Object) -> Result<AisMessage, DecodeError> {
    let mmsi = mmsi(object)?;
    let timestamp = msgtime(object)?;
    let latitude = optional_f64(object, "latitude")?;
    let longitude = optional_f64(object, "longitude")?;
    let speed = required_f64(object, "speedOverGround")?;
    let course = optional_f64(object, "courseOverGround")?;

    AisMessage::new(mmsi, timestamp, latitude, longitude, speed, course).map_err(|e| {
        let field = match e {
            VesselDataError::InvalidMmsi(_) => "mmsi",
            VesselDataError::InvalidSpeed(_) => "speedOverGround",
        };
        invalid(field, e.to_string())
    })
}

// =============================================================================
// Field helpers
// =============================================================================

fn invalid(field: &'static str, reason: impl Into<String>) -> DecodeError {
    DecodeError::InvalidField {
        field,
        reason: reason.into(),
    }
}

fn required<'a>(object: &'a Object, field: &'static str) -> Result<&'a Value, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_f64(object: &Object, field: &'static str) -> Result<f64, DecodeError> {
    required(object, field)?
        .as_f64()
        .ok_or_else(|| invalid(field, "expected a number"))
}

fn optional_f64(object: &Object, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid(field, "expected a number")),
    }
}

fn mmsi(object: &Object) -> Result<Mmsi, DecodeError> {
    Mmsi::deserialize(required(object, "mmsi")?).map_err(|e| invalid("mmsi", e.to_string()))
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn msgtime(object: &Object) -> Result<DateTime<Utc>, DecodeError> {
    let raw = required(object, "msgtime")?
        .as_str()
        .ok_or_else(|| invalid("msgtime", "expected a string"))?;

    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc()))
        .map_err(|e| invalid("msgtime", format!("{raw}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn decode(line: &str) -> Result<Frame, DecodeError> {
        JsonFrameDecoder::new().decode(line)
    }

    fn position(line: &str) -> AisMessage {
        match decode(line) {
            Ok(Frame::Position(message)) => message,
            other => panic!("expected position, got {other:?}"),
        }
    }

    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"# ; "string mmsi")]
    #[test_case(r#"{"mmsi": 123456789, "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"# ; "integer mmsi")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 5.0, "extra": "field", "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"# ; "extra fields ignored")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10.123456", "latitude": 60.0, "longitude": 5.0}"# ; "subseconds truncated")]
    #[test_case(r#"{"type": "Position", "mmsi": 123456789, "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10+00:00", "latitude": 60.0, "longitude": 5.0}"# ; "tagged with offset")]
    fn accepts_valid_positions(line: &str) {
        let message = position(line);
        assert_eq!(message.mmsi().value(), 123_456_789);
        assert!((message.speed_over_ground() - 5.0).abs() < f64::EPSILON);
        assert_eq!(
            message.timestamp(),
            Utc.with_ymd_and_hms(2022, 12, 12, 10, 10, 10).unwrap()
        );
    }

    #[test_case(r#"{"mmsi": "abcd", "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "invalid_field" ; "non-digit mmsi")]
    #[test_case(r#"{"mmsi": "123", "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "invalid_field" ; "short mmsi")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": -5.0, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "invalid_field" ; "negative speed")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 102.3, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "invalid_field" ; "speed not available")]
    #[test_case(r#"{"mmsi": "123456789", "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "missing_field" ; "missing speed")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": null, "msgtime": "2022-12-12T10:10:10", "latitude": 60.0, "longitude": 5.0}"#, "missing_field" ; "null speed")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 5.0, "msgtime": "yesterday", "latitude": 60.0, "longitude": 5.0}"#, "invalid_field" ; "bad timestamp")]
    #[test_case(r#"{"mmsi": "123456789", "speedOverGround": 5.0, "msgtime": "2022-12-12T10:10:10", "latitude": "north", "longitude": 5.0}"#, "invalid_field" ; "non-numeric latitude")]
    #[test_case("not_a_valid_json", "json" ; "malformed json")]
    #[test_case("[1, 2, 3]", "not_an_object" ; "array")]
    fn rejects_invalid_frames(line: &str, reason: &str) {
        let err = decode(line).unwrap_err();
        assert_eq!(err.reason(), reason, "{err}");
    }

    #[test]
    fn static_data_carries_its_mmsi() {
        let line = r#"{"type":"Staticdata","mmsi":257123456,"msgtime":"2024-05-01T12:00:00+00:00","name":"NORDLYS ","callSign":"LHZX","shipType":60}"#;
        assert_eq!(
            decode(line).unwrap(),
            Frame::Static(Mmsi::new(257_123_456).unwrap())
        );
        assert!(decode(r#"{"type":"Staticdata","name":"NORDLYS"}"#).is_err());
    }

    #[test_case(r#"{"mmsi":257123456,"msgtime":"2024-05-01T12:00:00Z","latitude":91,"longitude":181,"speedOverGround":7.5}"# ; "not available sentinels")]
    #[test_case(r#"{"mmsi":257123456,"msgtime":"2024-05-01T12:00:00Z","latitude":60.0,"speedOverGround":7.5}"# ; "missing longitude")]
    #[test_case(r#"{"mmsi":257123456,"msgtime":"2024-05-01T12:00:00Z","latitude":null,"longitude":null,"speedOverGround":7.5}"# ; "null coordinates")]
    fn positions_without_coordinates_still_rank(line: &str) {
        let message = position(line);
        assert_eq!(message.longitude(), None);
        assert!((message.speed_over_ground() - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_type_is_tagged() {
        let frame = decode(r#"{"type":"Aton","mmsi":992576001}"#).unwrap();
        assert_eq!(frame, Frame::Unknown("Aton".to_string()));
    }

    #[test]
    fn course_is_optional() {
        let message = position(
            r#"{"mmsi":257123456,"msgtime":"2024-05-01T12:00:00Z","latitude":60.0,"longitude":5.0,"speedOverGround":0.0,"courseOverGround":360.0}"#,
        );
        assert_eq!(message.course_over_ground(), None);
    }
}
