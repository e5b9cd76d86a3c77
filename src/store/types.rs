use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::radio::TraceResult;
use crate::session::GpsFix;

pub type SampleId = String;

/// Field test identifier. Clients may send it as a JSON string or number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct FieldTestId(pub String);

impl<'de> Deserialize<'de> for FieldTestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => FieldTestId(s.trim().to_string()),
            RawId::Number(n) => FieldTestId(n.to_string()),
        })
    }
}

impl fmt::Display for FieldTestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldTestId {
    fn from(s: &str) -> Self {
        FieldTestId(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TargetNode {
    #[serde(default)]
    pub name: Option<String>,
    /// Full mesh identity (hex public key hash) of the node.
    pub mesh_identity: String,
}

/// A walk-around session characterizing one target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldTest {
    pub id: FieldTestId,
    pub target_node: TargetNode,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
}

impl FieldTest {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// A fused GPS + trace measurement, before it has been assigned an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSample {
    pub field_test_id: FieldTestId,
    pub target_node_identity: String,
    pub fix: GpsFix,
    pub signal: TraceResult,
    pub trace_success: bool,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    pub id: SampleId,
    pub field_test_id: FieldTestId,
    pub target_node_identity: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub gps_accuracy: Option<f64>,
    pub gps_timestamp: Option<DateTime<Utc>>,
    pub snr_to_target: f32,
    pub snr_from_target: f32,
    pub trace_success: bool,
    pub captured_at: DateTime<Utc>,
}

impl SignalSample {
    pub fn new(id: SampleId, sample: NewSample) -> Self {
        SignalSample {
            id,
            field_test_id: sample.field_test_id,
            target_node_identity: sample.target_node_identity,
            latitude: sample.fix.latitude,
            longitude: sample.fix.longitude,
            altitude: sample.fix.altitude,
            gps_accuracy: sample.fix.accuracy,
            gps_timestamp: sample.fix.captured_at,
            snr_to_target: sample.signal.snr_to_target,
            snr_from_target: sample.signal.snr_from_target,
            trace_success: sample.trace_success,
            captured_at: sample.captured_at,
        }
    }
}
