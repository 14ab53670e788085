//! Decision aggregation over the individual checks.
//!
//! Patient state is fetched once per request, with the independent record
//! queries in flight together, and every check evaluates that one snapshot.
//! Every result is returned even when one check already blocks.
//!
//! If a check's record query fails the whole request fails with
//! [`crate::Error::CheckFailed`] naming that check, and the sibling checks are
//! dropped with it. A missing answer is never reported as "safe".

use crate::care_gap::identify_care_gaps;
use crate::contraindication::check_contraindications;
use crate::critical::check_critical_values;
use crate::duplicate::check_duplicate_therapy;
use crate::interaction::check_interactions;
use crate::records::RecordQuery;
use crate::rules::{self, RuleTable, BLOOD_PRESSURE_THRESHOLD, MONITORING_SCHEDULES, SCALAR_THRESHOLDS};
use crate::{
    AggregateDecision, CheckKind, ContraindicationResult, DuplicateResult, InteractionResult, MonitoringReport, ObservationRecord, Result,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Attached to every decision
pub const SCREENING_NOTE: &str =
    "Rules-based screening, not exhaustive: absence of a rule is not evidence of safety.";

/// Default look-back for the critical value scan
pub const DEFAULT_CRITICAL_WINDOW_DAYS: i64 = 30;

/// Evaluates prescribing safety and monitoring alerts for patients
#[derive(Clone)]
pub struct SafetyEngine {
    records: Arc<dyn RecordQuery>,
    rules: Arc<dyn RuleTable>,
    critical_window: Duration,
}

impl SafetyEngine {
    pub fn new(records: Arc<dyn RecordQuery>, rules: Arc<dyn RuleTable>) -> Self {
        Self {
            records,
            rules,
            critical_window: Duration::days(DEFAULT_CRITICAL_WINDOW_DAYS),
        }
    }

    /// Engine over the built-in rule tables
    pub fn with_default_rules(records: Arc<dyn RecordQuery>) -> Self {
        Self::new(records, Arc::new(rules::default_rules().clone()))
    }

    /// How far back the critical value scan looks
    pub fn with_critical_window(mut self, window: Duration) -> Self {
        self.critical_window = window;
        self
    }

    pub fn rules(&self) -> &dyn RuleTable {
        self.rules.as_ref()
    }

    pub async fn check_interactions(
        &self,
        patient_id: &str,
        candidate: &str,
    ) -> Result<InteractionResult> {
        let medications = self
            .records
            .active_medications(patient_id)
            .await
            .map_err(|e| e.in_check(CheckKind::Interaction))?;
        Ok(check_interactions(self.rules.as_ref(), &medications, candidate))
    }

    pub async fn check_contraindications(
        &self,
        patient_id: &str,
        candidate: &str,
    ) -> Result<ContraindicationResult> {
        let conditions = self
            .records
            .active_conditions(patient_id)
            .await
            .map_err(|e| e.in_check(CheckKind::Contraindication))?;
        Ok(check_contraindications(
            self.rules.as_ref(),
            &conditions,
            candidate,
        ))
    }

    pub async fn check_duplicate_therapy(
        &self,
        patient_id: &str,
        candidate: &str,
        candidate_name: &str,
    ) -> Result<DuplicateResult> {
        let medications = self
            .records
            .active_medications(patient_id)
            .await
            .map_err(|e| e.in_check(CheckKind::Duplicate))?;
        Ok(check_duplicate_therapy(&medications, candidate, candidate_name))
    }

    /// Run all prescribing checks and combine them into one verdict
    ///
    /// The rationale names the highest-priority failure: duplicate therapy,
    /// then contraindication, then interaction.
    pub async fn comprehensive_prescription_check(
        &self,
        patient_id: &str,
        candidate: &str,
        candidate_name: &str,
    ) -> Result<AggregateDecision> {
        let decision_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "prescription_check",
            %decision_id,
            patient_id,
            candidate
        );

        async move {
            // Medications feed both the interaction and duplicate checks;
            // a failed medication query is reported against the first
            let (medications, conditions) = tokio::try_join!(
                async {
                    self.records
                        .active_medications(patient_id)
                        .await
                        .map_err(|e| e.in_check(CheckKind::Interaction))
                },
                async {
                    self.records
                        .active_conditions(patient_id)
                        .await
                        .map_err(|e| e.in_check(CheckKind::Contraindication))
                },
            )
            .inspect_err(|e| tracing::error!("Prescription check aborted: {}", e))?;

            let drug_interactions =
                check_interactions(self.rules.as_ref(), &medications, candidate);
            let contraindications =
                check_contraindications(self.rules.as_ref(), &conditions, candidate);
            let duplicate_therapy =
                check_duplicate_therapy(&medications, candidate, candidate_name);

            let overall_safe = drug_interactions.safe_to_prescribe
                && contraindications.safe_to_prescribe
                && duplicate_therapy.safe_to_prescribe;

            let recommendation =
                recommend(&duplicate_therapy, &contraindications, &drug_interactions);

            tracing::info!(overall_safe, "{}", recommendation);

            Ok(AggregateDecision {
                decision_id,
                patient_id: patient_id.to_string(),
                medication_code: candidate.to_string(),
                medication_name: candidate_name.to_string(),
                overall_safe,
                duplicate_therapy,
                drug_interactions,
                contraindications,
                recommendation,
                screening_note: SCREENING_NOTE.to_string(),
                checked_at: Utc::now(),
            })
        }
        .instrument(span)
        .await
    }

    /// Critical values and care gaps for a patient
    ///
    /// Conditions and observations are fetched concurrently, once, and both
    /// scans run over that snapshot.
    pub async fn monitor_patient(
        &self,
        patient_id: &str,
        now: DateTime<Utc>,
    ) -> Result<MonitoringReport> {
        let test_codes = monitored_test_codes();
        let (conditions, observations) = tokio::try_join!(
            async {
                self.records
                    .active_conditions(patient_id)
                    .await
                    .map_err(|e| e.in_check(CheckKind::CareGaps))
            },
            async {
                self.records
                    .observations(patient_id, Some(test_codes.as_slice()))
                    .await
                    .map_err(|e| e.in_check(CheckKind::CriticalValues))
            },
        )?;

        let recent: Vec<ObservationRecord> = observations
            .iter()
            .filter(|o| self.within_critical_window(o, now))
            .cloned()
            .collect();
        let critical_alerts = check_critical_values(&recent);
        let care_gaps = identify_care_gaps(&conditions, &observations, now);

        tracing::info!(
            "Monitoring for {}: {} critical alert(s), {} care gap(s)",
            patient_id,
            critical_alerts.len(),
            care_gaps.len()
        );

        Ok(MonitoringReport {
            patient_id: patient_id.to_string(),
            critical_alerts,
            care_gaps,
            generated_at: now,
        })
    }

    /// Undated readings are kept so a dangerous value is never hidden
    fn within_critical_window(&self, obs: &ObservationRecord, now: DateTime<Utc>) -> bool {
        obs.effective_at()
            .map_or(true, |at| now - at <= self.critical_window)
    }
}

fn recommend(
    duplicate: &DuplicateResult,
    contraindications: &ContraindicationResult,
    interactions: &InteractionResult,
) -> String {
    if !duplicate.safe_to_prescribe {
        format!(
            "DO NOT PRESCRIBE - duplicate therapy. {}",
            duplicate.warning_message
        )
    } else if !contraindications.safe_to_prescribe {
        format!(
            "DO NOT PRESCRIBE - contraindication. {}",
            contraindications.warning_message
        )
    } else if !interactions.safe_to_prescribe {
        format!(
            "DO NOT PRESCRIBE - major drug interaction. {}",
            interactions.warning_message
        )
    } else if interactions.found() {
        format!(
            "Safe to prescribe with caution. {}",
            interactions.warning_message
        )
    } else {
        "Safe to prescribe. No duplicate therapy, contraindications or drug interactions found."
            .to_string()
    }
}

/// Every test code either monitoring scan looks at
fn monitored_test_codes() -> Vec<&'static str> {
    let mut codes: Vec<&'static str> = SCALAR_THRESHOLDS.iter().map(|t| t.test_code).collect();
    codes.extend(BLOOD_PRESSURE_THRESHOLD.test_codes.iter().copied());
    codes.extend(
        MONITORING_SCHEDULES
            .iter()
            .flat_map(|s| s.test_codes.iter().copied()),
    );
    codes.sort_unstable();
    codes.dedup();
    codes
}
