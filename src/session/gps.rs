use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters, as reported by the phone.
    pub accuracy: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// Latest fix for one connection. Newer fixes replace older ones outright.
#[derive(Debug, Default)]
pub struct GpsState {
    current: Option<GpsFix>,
}

impl GpsState {
    pub fn update(&mut self, fix: GpsFix) {
        self.current = Some(fix);
    }

    pub fn current(&self) -> Option<GpsFix> {
        self.current
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
