//! File-backed record store.
//!
//! Layout under the data directory:
//!
//! ```text
//! patients/<id>.json                  medications, conditions, observations
//! patients/<id>.observations.csv      optional bulk observation export
//! ```
//!
//! Patient files are read under a shared lock. Observations from the CSV
//! export are merged with the JSON ones, de-duplicated by observation id.

use crate::records::{PatientRecord, RecordQuery};
use crate::{
    ActiveCondition, Error, MedicationState, ObservationComponent, ObservationRecord,
    ObservationValue, Result,
};
use async_trait::async_trait;
use csv::ReaderBuilder;
use fs2::FileExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// CSV row format for bulk observation exports
#[derive(Debug, Deserialize)]
struct CsvRow {
    id: Option<String>,
    code: String,
    display: Option<String>,
    value: Option<f64>,
    unit: Option<String>,
    systolic: Option<f64>,
    diastolic: Option<f64>,
    effective: Option<String>,
}

impl TryFrom<CsvRow> for ObservationRecord {
    type Error = crate::Error;

    fn try_from(row: CsvRow) -> Result<Self> {
        if row.code.trim().is_empty() {
            return Err(Error::Other("Observation row has empty code".into()));
        }

        let value = if row.systolic.is_some() || row.diastolic.is_some() {
            Some(ObservationValue::Components(vec![
                ObservationComponent {
                    code: crate::rules::codes::SYSTOLIC_BP.into(),
                    value: row.systolic,
                    unit: row.unit.clone(),
                },
                ObservationComponent {
                    code: crate::rules::codes::DIASTOLIC_BP.into(),
                    value: row.diastolic,
                    unit: row.unit.clone(),
                },
            ]))
        } else {
            row.value.map(ObservationValue::Quantity)
        };

        Ok(ObservationRecord {
            id: row.id,
            code: row.code,
            display: row.display.unwrap_or_default(),
            value,
            unit: row.unit,
            // Kept raw: malformed timestamps are a care-gap signal, not a load error
            effective: row.effective,
        })
    }
}

/// Record store reading per-patient files from a data directory
#[derive(Clone, Debug)]
pub struct FileRecordStore {
    data_dir: PathBuf,
}

impl FileRecordStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn patients_dir(&self) -> PathBuf {
        self.data_dir.join("patients")
    }

    /// Load a patient's full record synchronously
    pub fn load_patient(&self, patient_id: &str) -> Result<PatientRecord> {
        load_patient(&self.patients_dir(), patient_id)
    }

    /// Write a patient's record atomically
    ///
    /// Writes to a temp file under an exclusive lock, syncs it, then renames
    /// over the original.
    pub fn write_patient(&self, patient_id: &str, record: &PatientRecord) -> Result<()> {
        validate_patient_id(patient_id)?;
        let dir = self.patients_dir();
        std::fs::create_dir_all(&dir)?;

        let temp = NamedTempFile::new_in(&dir)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string_pretty(record)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        let path = dir.join(format!("{}.json", patient_id));
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote patient record to {:?}", path);
        Ok(())
    }

    async fn load_blocking(&self, patient_id: &str) -> Result<PatientRecord> {
        let dir = self.patients_dir();
        let id = patient_id.to_string();
        tokio::task::spawn_blocking(move || load_patient(&dir, &id))
            .await
            .map_err(|e| Error::RecordStore(format!("record load task failed: {}", e)))?
    }
}

#[async_trait]
impl RecordQuery for FileRecordStore {
    async fn active_medications(&self, patient_id: &str) -> Result<MedicationState> {
        Ok(self.load_blocking(patient_id).await?.active_medications())
    }

    async fn active_conditions(&self, patient_id: &str) -> Result<Vec<ActiveCondition>> {
        Ok(self.load_blocking(patient_id).await?.active_conditions())
    }

    async fn observations(
        &self,
        patient_id: &str,
        test_codes: Option<&[&str]>,
    ) -> Result<Vec<ObservationRecord>> {
        Ok(self
            .load_blocking(patient_id)
            .await?
            .observations_matching(test_codes))
    }
}

/// Patient ids become file names; refuse anything that could escape the directory
fn validate_patient_id(patient_id: &str) -> Result<()> {
    let ok = !patient_id.is_empty()
        && patient_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !patient_id.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(Error::RecordStore(format!(
            "invalid patient id '{}'",
            patient_id
        )))
    }
}

fn load_patient(dir: &Path, patient_id: &str) -> Result<PatientRecord> {
    validate_patient_id(patient_id)?;

    let json_path = dir.join(format!("{}.json", patient_id));
    if !json_path.exists() {
        return Err(Error::PatientNotFound(patient_id.to_string()));
    }

    let file = File::open(&json_path)?;
    file.lock_shared()?;

    let mut contents = String::new();
    let read = std::io::BufReader::new(&file).read_to_string(&mut contents);
    file.unlock()?;
    read?;

    // A corrupt record is a hard failure; treating it as empty would fail open
    let mut record: PatientRecord = serde_json::from_str(&contents).map_err(|e| {
        Error::RecordStore(format!("unreadable patient file {:?}: {}", json_path, e))
    })?;

    let csv_path = dir.join(format!("{}.observations.csv", patient_id));
    if csv_path.exists() {
        let mut seen_ids: HashSet<String> = record
            .observations
            .iter()
            .filter_map(|o| o.id.clone())
            .collect();

        let mut merged = 0;
        for obs in load_observations_from_csv(&csv_path)? {
            if let Some(id) = &obs.id {
                if !seen_ids.insert(id.clone()) {
                    continue;
                }
            }
            record.observations.push(obs);
            merged += 1;
        }
        tracing::debug!("Merged {} observations from {:?}", merged, csv_path);
    }

    tracing::debug!(
        "Loaded patient {}: {} requests, {} statements, {} conditions, {} observations",
        patient_id,
        record.medication_requests.len(),
        record.medication_statements.len(),
        record.conditions.len(),
        record.observations.len()
    );

    Ok(record)
}

/// Load all observations from a CSV export, skipping rows that cannot be read
fn load_observations_from_csv(path: &Path) -> Result<Vec<ObservationRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut observations = Vec::new();
    for result in reader.deserialize::<CsvRow>() {
        match result {
            Ok(row) => match ObservationRecord::try_from(row) {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    tracing::warn!("Failed to parse observation row: {}", e);
                }
            },
            Err(e) => {
                tracing::warn!("Failed to deserialize observation row: {}", e);
            }
        }
    }

    Ok(observations)
}
