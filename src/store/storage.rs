use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::error::StoreError;
use super::types::{FieldTest, FieldTestId, NewSample, SampleId, SignalSample, TargetNode};
use super::MeasurementStore;

const FIELD_TESTS: &str = "field_tests";
const SAMPLES: &str = "samples";

/// YAML-file storage rooted at a base folder.
///
/// `field_tests/{id}.yaml` holds one field test, `samples/{field_test}/{id}.yaml`
/// one signal sample. Samples are written once and never rewritten.
#[derive(Clone)]
pub struct FileStore {
    base: PathBuf,
}

impl FileStore {
    pub fn new(base: PathBuf) -> Self {
        FileStore { base }
    }

    fn field_test_path(&self, id: &FieldTestId) -> Result<PathBuf, StoreError> {
        check_id(&id.0)?;
        Ok(self.base.join(FIELD_TESTS).join(format!("{}.yaml", id)))
    }

    fn samples_path(&self, id: &FieldTestId) -> Result<PathBuf, StoreError> {
        check_id(&id.0)?;
        Ok(self.base.join(SAMPLES).join(&id.0))
    }

    pub fn create_field_test(
        &self,
        target_node: TargetNode,
        notes: String,
    ) -> Result<FieldTest, StoreError> {
        let start_time = Utc::now();
        let field_test = FieldTest {
            id: FieldTestId(generate_id(start_time)),
            target_node,
            start_time,
            end_time: None,
            notes,
        };
        write_new(&self.field_test_path(&field_test.id)?, &field_test)?;
        info!(
            "Field test {} started for node {}",
            field_test.id, field_test.target_node.mesh_identity
        );
        Ok(field_test)
    }

    pub fn get_field_test(&self, id: &FieldTestId) -> Result<FieldTest, StoreError> {
        let path = self.field_test_path(id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        read(&path)
    }

    pub fn end_field_test(&self, id: &FieldTestId) -> Result<FieldTest, StoreError> {
        let mut field_test = self.get_field_test(id)?;
        if !field_test.is_active() {
            return Err(StoreError::AlreadyEnded(id.to_string()));
        }
        field_test.end_time = Some(Utc::now());

        let path = self.field_test_path(id)?;
        std::fs::write(&path, serde_yaml::to_string(&field_test)?)?;
        info!("Field test {} ended", id);
        Ok(field_test)
    }

    pub fn save_sample(&self, sample: NewSample) -> Result<SignalSample, StoreError> {
        let folder = self.samples_path(&sample.field_test_id)?;
        let sample = SignalSample::new(generate_id(sample.captured_at), sample);
        write_new(&folder.join(format!("{}.yaml", sample.id)), &sample)?;
        debug!(
            "Stored sample {} for field test {}",
            sample.id, sample.field_test_id
        );
        Ok(sample)
    }
}

#[async_trait]
impl MeasurementStore for FileStore {
    async fn lookup_active_session(
        &self,
        id: &FieldTestId,
    ) -> Result<Option<FieldTest>, StoreError> {
        let store = self.clone();
        let id = id.clone();
        match blocking(move || store.get_field_test(&id)).await {
            Ok(field_test) => Ok(Some(field_test)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_sample(&self, sample: NewSample) -> Result<SampleId, StoreError> {
        let store = self.clone();
        blocking(move || store.save_sample(sample))
            .await
            .map(|s| s.id)
    }
}

/// Runs file I/O on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

fn check_id(id: &str) -> Result<(), StoreError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

fn generate_id(at: DateTime<Utc>) -> String {
    let uuid = uuid::Uuid::new_v4();
    let timestamp = at.format("%Y%m%dT%H%M%SZ");
    format!("{}_{}", timestamp, uuid)
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn write_new<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(folder) = path.parent() {
        std::fs::create_dir_all(folder)?;
    }
    let content = serde_yaml::to_string(value)?;
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
