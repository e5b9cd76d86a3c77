mod error;
#[cfg(test)]
pub(crate) mod memory;
mod storage;
mod types;

use async_trait::async_trait;

pub use error::StoreError;
pub use storage::FileStore;
pub use types::{FieldTest, FieldTestId, NewSample, SampleId, TargetNode};

/// Persistence consumed by measurement sessions.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// `Ok(None)` when no field test has this id.
    async fn lookup_active_session(&self, id: &FieldTestId)
        -> Result<Option<FieldTest>, StoreError>;

    async fn create_sample(&self, sample: NewSample) -> Result<SampleId, StoreError>;
}
