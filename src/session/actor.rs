use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;

use super::error::SessionError;
use super::gps::GpsState;
use super::messages::{GpsPayload, Inbound, Outbound};
use crate::radio::{RadioLease, RadioManager, RadioStatus, TraceError, TraceResult};
use crate::store::{FieldTestId, MeasurementStore, NewSample, StoreError};

const GREETING: &str = "Connected to base station";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionPhase {
    GpsUnknown,
    GpsKnown,
    Closed,
}

/// Everything a connection remembers between messages.
#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    gps: GpsState,
}

/// Per-connection controller between the phone, the radio and the store.
///
/// Messages are handled one at a time; the caller awaits each reply before
/// feeding the next message.
pub struct SessionActor {
    name: String,
    state: SessionState,
    radio: RadioManager,
    lease: Option<RadioLease>,
    store: Arc<dyn MeasurementStore>,
}

impl SessionActor {
    pub fn new(name: String, radio: RadioManager, store: Arc<dyn MeasurementStore>) -> Self {
        Self {
            name,
            state: SessionState {
                phase: SessionPhase::GpsUnknown,
                gps: GpsState::default(),
            },
            radio,
            lease: None,
            store,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    /// Greets the client and tries to claim the radio. A missing radio is
    /// reported but does not end the session.
    pub async fn open(&mut self) -> Vec<Outbound> {
        info!("[{}] Phone connected", self.name);
        self.state.phase = SessionPhase::GpsUnknown;

        let status = match self.radio.acquire().await {
            Ok(lease) => {
                self.lease = Some(lease);
                self.radio_status()
            }
            Err(e) => {
                warn!("[{}] Failed to connect to radio: {}", self.name, e);
                RadioStatus {
                    connected: false,
                    error: Some(e.to_string()),
                }
            }
        };

        vec![
            Outbound::Connected {
                message: GREETING.into(),
            },
            Outbound::RadioStatus(status),
        ]
    }

    /// Handles one raw text frame, turning every failure into an `error` reply.
    pub async fn handle_text(&mut self, text: &str) -> Option<Outbound> {
        let result = match Inbound::parse(text) {
            Ok(message) => self.handle(message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{}] {}", self.name, e);
                Some(Outbound::Error {
                    message: e.to_string(),
                })
            }
        }
    }

    pub async fn handle(&mut self, message: Inbound) -> Result<Option<Outbound>, SessionError> {
        if self.state.phase == SessionPhase::Closed {
            return Err(SessionError::Protocol("Session closed".into()));
        }

        match message {
            Inbound::GpsData(payload) => {
                self.update_gps(payload)?;
                Ok(None)
            }
            Inbound::RequestMeasurement { field_test_id } => {
                self.measure(field_test_id).await.map(Some)
            }
            Inbound::RadioStatusRequest => {
                let status = self.radio_status();
                debug!(
                    "[{}] Radio status: connected={}, error={:?}",
                    self.name, status.connected, status.error
                );
                Ok(Some(Outbound::RadioStatus(status)))
            }
            Inbound::Unknown(kind) => {
                warn!("[{}] Unknown message type: {}", self.name, kind);
                Ok(None)
            }
        }
    }

    /// Releases the radio and forgets all connection state.
    pub fn close(&mut self) {
        if self.state.phase == SessionPhase::Closed {
            return;
        }
        let last_phase = self.state.phase;
        self.lease = None;
        self.state.gps.clear();
        self.state.phase = SessionPhase::Closed;
        info!("[{}] Phone disconnected ({})", self.name, last_phase);
    }

    fn update_gps(&mut self, payload: GpsPayload) -> Result<(), SessionError> {
        let fix = payload.into_fix()?;
        debug!(
            "[{}] GPS updated: {}, {}",
            self.name, fix.latitude, fix.longitude
        );
        self.state.gps.update(fix);
        self.state.phase = SessionPhase::GpsKnown;
        Ok(())
    }

    async fn measure(
        &mut self,
        field_test_id: Option<FieldTestId>,
    ) -> Result<Outbound, SessionError> {
        let field_test_id = field_test_id
            .ok_or_else(|| SessionError::Validation("Missing field_test_id".into()))?;
        let fix = match (self.state.phase, self.state.gps.current()) {
            (SessionPhase::GpsKnown, Some(fix)) => fix,
            _ => return Err(SessionError::Validation("No GPS data available".into())),
        };

        let not_found =
            || SessionError::Validation(format!("Field test {} not found", field_test_id));
        let field_test = match self.store.lookup_active_session(&field_test_id).await {
            Ok(found) => found.ok_or_else(not_found)?,
            // an id the store cannot even hold names no field test
            Err(StoreError::InvalidId(_)) => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        if !field_test.is_active() {
            return Err(SessionError::Validation(format!(
                "Field test {} is not active",
                field_test_id
            )));
        }

        let identity = field_test.target_node.mesh_identity;
        let (signal, trace_success) = match self.trace(&identity).await {
            Ok(signal) => (signal, true),
            Err(e) => {
                warn!(
                    "[{}] Trace to {} failed ({}), saving measurement with default values",
                    self.name, identity, e
                );
                (TraceResult::FAILED, false)
            }
        };

        let sample_id = self
            .store
            .create_sample(NewSample {
                field_test_id,
                target_node_identity: identity,
                fix,
                signal,
                trace_success,
                captured_at: Utc::now(),
            })
            .await?;
        info!("[{}] Trace saved: {}", self.name, sample_id);

        Ok(Outbound::MeasurementSaved {
            sample_id,
            snr_to_target: signal.snr_to_target,
            snr_from_target: signal.snr_from_target,
            latitude: fix.latitude,
            longitude: fix.longitude,
            trace_success,
        })
    }

    async fn trace(&mut self, identity: &str) -> Result<TraceResult, TraceError> {
        let lease = match self.lease.take() {
            Some(lease) if !lease.is_faulted() => lease,
            _ => self.radio.acquire().await?,
        };
        let result = lease.measure(identity).await;
        self.lease = Some(lease);
        result
    }

    fn radio_status(&self) -> RadioStatus {
        match &self.lease {
            Some(lease) if lease.is_alive() => RadioStatus {
                connected: true,
                error: None,
            },
            Some(_) => RadioStatus {
                connected: false,
                error: Some("Radio link lost".into()),
            },
            None => RadioStatus {
                connected: false,
                error: Some("Radio not initialized".into()),
            },
        }
    }
}
