use std::ops::Deref;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use log::{debug, info};
use serde::Serialize;
use tokio::sync::Mutex;
use utoipa::ToSchema;

use super::error::LinkError;
use super::link::Connector;
use super::trace::TraceClient;

/// Shared access point to the radio.
///
/// Sessions hold a [`RadioLease`] while connected. The link is opened by the
/// first lease and closed when the last lease is dropped.
#[derive(Clone)]
pub struct RadioManager {
    inner: Arc<Inner>,
}

struct Inner {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    current: StdMutex<Weak<TraceClient>>,
    opening: Mutex<()>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RadioStatus {
    pub connected: bool,
    pub error: Option<String>,
}

impl RadioManager {
    pub fn new(connector: Arc<dyn Connector>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                timeout,
                current: StdMutex::new(Weak::new()),
                opening: Mutex::new(()),
            }),
        }
    }

    pub fn device(&self) -> String {
        self.inner.connector.describe()
    }

    pub async fn acquire(&self) -> Result<RadioLease, LinkError> {
        if let Some(lease) = self.existing() {
            return Ok(lease);
        }

        let _opening = self.inner.opening.lock().await;
        if let Some(lease) = self.existing() {
            return Ok(lease);
        }

        info!("Opening radio link on {}", self.device());
        let client = Arc::new(
            TraceClient::open(self.inner.connector.as_ref(), self.inner.timeout).await?,
        );
        *self.current() = Arc::downgrade(&client);
        Ok(RadioLease { client })
    }

    /// Liveness of the currently open link, without opening one.
    pub fn status(&self) -> RadioStatus {
        let client = self.current().upgrade();
        match client {
            Some(client) if client.is_alive() => RadioStatus {
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

    pub fn holders(&self) -> usize {
        self.current().strong_count()
    }

    fn existing(&self) -> Option<RadioLease> {
        let client = self.current().upgrade()?;
        if client.is_faulted() {
            return None;
        }
        Some(RadioLease { client })
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Weak<TraceClient>> {
        self.inner.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A session's claim on the shared radio.
pub struct RadioLease {
    client: Arc<TraceClient>,
}

impl RadioLease {
    pub fn is_faulted(&self) -> bool {
        self.client.is_faulted()
    }
}

impl Deref for RadioLease {
    type Target = TraceClient;

    fn deref(&self) -> &TraceClient {
        &self.client
    }
}

impl Drop for RadioLease {
    fn drop(&mut self) {
        debug!(
            "Radio lease released ({} other holders)",
            Arc::strong_count(&self.client) - 1
        );
    }
}
