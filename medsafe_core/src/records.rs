//! Read-only port onto the clinical record store.
//!
//! The engine never persists anything; it asks a [`RecordQuery`]
//! implementation for a patient's current state and evaluates that snapshot.

use crate::{
    ActiveCondition, Error, MedicationEntry, MedicationState, MedicationStatus, ObservationRecord,
    Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Queries the engine needs from the clinical record store
///
/// Retries, timeouts and connection handling belong to implementations.
#[async_trait]
pub trait RecordQuery: Send + Sync {
    /// Active prescriptions and active patient-reported statements
    async fn active_medications(&self, patient_id: &str) -> Result<MedicationState>;

    /// Conditions currently on the problem list
    async fn active_conditions(&self, patient_id: &str) -> Result<Vec<ActiveCondition>>;

    /// Observations, optionally restricted to the given test codes
    async fn observations(
        &self,
        patient_id: &str,
        test_codes: Option<&[&str]>,
    ) -> Result<Vec<ObservationRecord>>;
}

/// Clinical status of a problem-list entry
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalStatus {
    #[default]
    Active,
    Recurrence,
    Relapse,
    Inactive,
    Remission,
    Resolved,
}

impl ClinicalStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ClinicalStatus::Active | ClinicalStatus::Recurrence | ClinicalStatus::Relapse
        )
    }
}

/// A problem-list entry as stored, including inactive history
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConditionEntry {
    #[serde(flatten)]
    pub condition: ActiveCondition,
    #[serde(default)]
    pub clinical_status: ClinicalStatus,
}

/// Everything the store holds for one patient
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct PatientRecord {
    #[serde(default)]
    pub medication_requests: Vec<MedicationEntry>,
    #[serde(default)]
    pub medication_statements: Vec<MedicationEntry>,
    #[serde(default)]
    pub conditions: Vec<ConditionEntry>,
    #[serde(default)]
    pub observations: Vec<ObservationRecord>,
}

impl PatientRecord {
    pub fn active_medications(&self) -> MedicationState {
        let active = |entries: &[MedicationEntry]| -> Vec<MedicationEntry> {
            entries
                .iter()
                .filter(|m| m.status == MedicationStatus::Active)
                .cloned()
                .collect()
        };
        MedicationState {
            prescriptions: active(&self.medication_requests),
            statements: active(&self.medication_statements),
        }
    }

    pub fn active_conditions(&self) -> Vec<ActiveCondition> {
        self.conditions
            .iter()
            .filter(|c| c.clinical_status.is_active())
            .map(|c| c.condition.clone())
            .collect()
    }

    pub fn observations_matching(&self, test_codes: Option<&[&str]>) -> Vec<ObservationRecord> {
        self.observations
            .iter()
            .filter(|o| test_codes.map_or(true, |codes| codes.contains(&o.code.as_str())))
            .cloned()
            .collect()
    }

    /// Builder helpers used by embedders and tests
    pub fn with_prescription(mut self, code: &str, display: &str) -> Self {
        self.medication_requests
            .push(MedicationEntry::active(code, display));
        self
    }

    pub fn with_statement(mut self, code: &str, display: &str) -> Self {
        self.medication_statements
            .push(MedicationEntry::active(code, display));
        self
    }

    pub fn with_condition(mut self, code: &str, display: &str) -> Self {
        self.conditions.push(ConditionEntry {
            condition: ActiveCondition::new(code, display),
            clinical_status: ClinicalStatus::Active,
        });
        self
    }

    pub fn with_observation(mut self, observation: ObservationRecord) -> Self {
        self.observations.push(observation);
        self
    }
}

/// Record store held entirely in memory
#[derive(Clone, Debug, Default)]
pub struct InMemoryRecords {
    patients: HashMap<String, PatientRecord>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, patient_id: impl Into<String>, record: PatientRecord) {
        self.patients.insert(patient_id.into(), record);
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>, record: PatientRecord) -> Self {
        self.insert(patient_id, record);
        self
    }

    fn patient(&self, patient_id: &str) -> Result<&PatientRecord> {
        self.patients
            .get(patient_id)
            .ok_or_else(|| Error::PatientNotFound(patient_id.to_string()))
    }
}

#[async_trait]
impl RecordQuery for InMemoryRecords {
    async fn active_medications(&self, patient_id: &str) -> Result<MedicationState> {
        Ok(self.patient(patient_id)?.active_medications())
    }

    async fn active_conditions(&self, patient_id: &str) -> Result<Vec<ActiveCondition>> {
        Ok(self.patient(patient_id)?.active_conditions())
    }

    async fn observations(
        &self,
        patient_id: &str,
        test_codes: Option<&[&str]>,
    ) -> Result<Vec<ObservationRecord>> {
        Ok(self.patient(patient_id)?.observations_matching(test_codes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::codes::*;

    fn record() -> PatientRecord {
        let mut record = PatientRecord::default()
            .with_prescription(WARFARIN, "Warfarin")
            .with_statement(ASPIRIN, "Aspirin")
            .with_condition(HYPERTENSION, "Hypertension")
            .with_observation(ObservationRecord::quantity(HBA1C, 7.0, None))
            .with_observation(ObservationRecord::quantity(FASTING_GLUCOSE, 110.0, None));

        let mut stopped = MedicationEntry::active(METFORMIN, "Metformin");
        stopped.status = MedicationStatus::Stopped;
        record.medication_requests.push(stopped);

        record.conditions.push(ConditionEntry {
            condition: ActiveCondition::new(ASTHMA, "Asthma"),
            clinical_status: ClinicalStatus::Resolved,
        });
        record
    }

    #[tokio::test]
    async fn test_only_active_medications_returned() {
        let store = InMemoryRecords::new().with_patient("p1", record());
        let meds = store.active_medications("p1").await.unwrap();
        assert!(meds.is_taking(WARFARIN));
        assert!(meds.is_taking(ASPIRIN));
        assert!(!meds.is_taking(METFORMIN));
        assert_eq!(meds.statements.len(), 1);
    }

    #[tokio::test]
    async fn test_only_active_conditions_returned() {
        let store = InMemoryRecords::new().with_patient("p1", record());
        let conditions = store.active_conditions("p1").await.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].code, HYPERTENSION);
    }

    #[tokio::test]
    async fn test_observation_filter() {
        let store = InMemoryRecords::new().with_patient("p1", record());
        let all = store.observations("p1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let hba1c = store.observations("p1", Some(&[HBA1C][..])).await.unwrap();
        assert_eq!(hba1c.len(), 1);
        assert_eq!(hba1c[0].code, HBA1C);
    }

    #[tokio::test]
    async fn test_unknown_patient() {
        let store = InMemoryRecords::new();
        let err = store.active_conditions("nobody").await.unwrap_err();
        assert!(matches!(err, Error::PatientNotFound(ref id) if id == "nobody"));
    }

    #[test]
    fn test_condition_status_defaults_to_active() {
        let json = r#"{ "code": "38341003", "display": "Hypertension" }"#;
        let entry: ConditionEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.clinical_status, ClinicalStatus::Active);
        assert_eq!(entry.condition.code, HYPERTENSION);
    }
}
