//! JSON messages exchanged with the phone.
//!
//! Inbound messages use a `{"type": ..., "data": {...}}` envelope. Outbound
//! messages are flat objects tagged with `type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::SessionError;
use super::gps::GpsFix;
use crate::radio::RadioStatus;
use crate::store::{FieldTestId, SampleId};

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    GpsData(GpsPayload),
    RequestMeasurement { field_test_id: Option<FieldTestId> },
    RadioStatusRequest,
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl Inbound {
    pub fn parse(text: &str) -> Result<Self, SessionError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|_| SessionError::Protocol("Invalid message format".into()))?;

        let message = match envelope.kind.as_str() {
            "gps_data" => {
                let data = match envelope.data {
                    Value::Null => Value::Object(Map::new()),
                    data => data,
                };
                let payload = serde_json::from_value(data)
                    .map_err(|e| SessionError::Validation(format!("Invalid GPS data: {}", e)))?;
                Inbound::GpsData(payload)
            }
            "request_measurement" => {
                // older clients put the id next to `type` instead of inside `data`
                let raw = envelope
                    .data
                    .get("field_test_id")
                    .or_else(|| envelope.rest.get("field_test_id"))
                    .filter(|v| !v.is_null())
                    .cloned();
                let field_test_id = raw
                    .map(serde_json::from_value::<FieldTestId>)
                    .transpose()
                    .map_err(|_| SessionError::Validation("Invalid field_test_id".into()))?
                    .filter(|id| !id.0.is_empty());
                Inbound::RequestMeasurement { field_test_id }
            }
            "radio_status_request" => Inbound::RadioStatusRequest,
            other => Inbound::Unknown(other.to_string()),
        };
        Ok(message)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GpsPayload {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub timestamp: Option<ClientTime>,
}

/// Capture time as sent by the browser: epoch milliseconds or an RFC 3339 string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClientTime {
    Millis(f64),
    Text(String),
}

impl ClientTime {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            ClientTime::Millis(ms) if ms.is_finite() => DateTime::from_timestamp_millis(*ms as i64),
            ClientTime::Millis(_) => None,
            ClientTime::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl GpsPayload {
    pub fn into_fix(self) -> Result<GpsFix, SessionError> {
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                return Err(SessionError::Validation(
                    "GPS data requires latitude and longitude".into(),
                ))
            }
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(SessionError::Validation(format!(
                "GPS coordinates out of range: {}, {}",
                latitude, longitude
            )));
        }

        Ok(GpsFix {
            latitude,
            longitude,
            altitude: self.altitude.filter(|v| v.is_finite()),
            accuracy: self.accuracy.filter(|v| v.is_finite()),
            captured_at: self.timestamp.as_ref().and_then(ClientTime::to_datetime),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Connected {
        message: String,
    },
    RadioStatus(RadioStatus),
    MeasurementSaved {
        sample_id: SampleId,
        snr_to_target: f32,
        snr_from_target: f32,
        latitude: f64,
        longitude: f64,
        trace_success: bool,
    },
    Error {
        message: String,
    },
}
