//! In-memory store for session tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::error::StoreError;
use super::types::{FieldTest, FieldTestId, NewSample, SampleId, SignalSample, TargetNode};
use super::MeasurementStore;

#[derive(Default)]
pub struct MemoryStore {
    field_tests: Mutex<HashMap<FieldTestId, FieldTest>>,
    samples: Mutex<Vec<SignalSample>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn with_field_test(id: &str, mesh_identity: &str, active: bool) -> Self {
        let store = Self::default();
        store.insert(id, mesh_identity, active);
        store
    }

    pub fn insert(&self, id: &str, mesh_identity: &str, active: bool) {
        let field_test = FieldTest {
            id: FieldTestId::from(id),
            target_node: TargetNode {
                name: None,
                mesh_identity: mesh_identity.into(),
            },
            start_time: Utc::now(),
            end_time: if active { None } else { Some(Utc::now()) },
            notes: String::new(),
        };
        self.field_tests
            .lock()
            .unwrap()
            .insert(field_test.id.clone(), field_test);
    }

    pub fn samples(&self) -> Vec<SignalSample> {
        self.samples.lock().unwrap().clone()
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    async fn lookup_active_session(
        &self,
        id: &FieldTestId,
    ) -> Result<Option<FieldTest>, StoreError> {
        Ok(self.field_tests.lock().unwrap().get(id).cloned())
    }

    async fn create_sample(&self, sample: NewSample) -> Result<SampleId, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        let mut samples = self.samples.lock().unwrap();
        let id = format!("sample-{}", samples.len() + 1);
        samples.push(SignalSample::new(id.clone(), sample));
        Ok(id)
    }
}
