//! Core domain types for the medication safety engine.
//!
//! This module defines the fundamental types used throughout the system:
//! - Severity scales for interactions and clinical alerts
//! - Patient state snapshots (medications, conditions, observations)
//! - Per-check results and the composite prescribing decision
//! - Monitoring-side alerts (critical values, care gaps)

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// Opaque drug identifier, unique within the caller's terminology.
pub type MedicationCode = String;

/// Opaque diagnosis identifier.
pub type ConditionCode = String;

// ============================================================================
// Severity Scales
// ============================================================================

/// Severity of a drug-drug interaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionSeverity {
    Minor,
    Moderate,
    Major,
}

impl InteractionSeverity {
    /// Explicit clinical ranking; higher is worse.
    pub fn rank(&self) -> u8 {
        match self {
            InteractionSeverity::Minor => 1,
            InteractionSeverity::Moderate => 2,
            InteractionSeverity::Major => 3,
        }
    }

    /// Only major interactions block a prescription.
    pub fn is_blocking(&self) -> bool {
        matches!(self, InteractionSeverity::Major)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionSeverity::Minor => "Minor",
            InteractionSeverity::Moderate => "Moderate",
            InteractionSeverity::Major => "Major",
        }
    }

    /// Parse a severity name, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "minor" => Some(InteractionSeverity::Minor),
            "moderate" => Some(InteractionSeverity::Moderate),
            "major" | "severe" => Some(InteractionSeverity::Major),
            _ => None,
        }
    }
}

impl Ord for InteractionSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for InteractionSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InteractionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a clinical alert raised from an observation
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Low => 1,
            AlertSeverity::Medium => 2,
            AlertSeverity::High => 3,
            AlertSeverity::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "Low",
            AlertSeverity::Medium => "Medium",
            AlertSeverity::High => "High",
            AlertSeverity::Critical => "Critical",
        }
    }
}

impl Ord for AlertSeverity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for AlertSeverity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority attached to a care gap
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CareGapPriority {
    Low,
    Medium,
    High,
}

impl CareGapPriority {
    pub fn rank(&self) -> u8 {
        match self {
            CareGapPriority::Low => 1,
            CareGapPriority::Medium => 2,
            CareGapPriority::High => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CareGapPriority::Low => "Low",
            CareGapPriority::Medium => "Medium",
            CareGapPriority::High => "High",
        }
    }
}

impl fmt::Display for CareGapPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Patient State
// ============================================================================

/// Lifecycle status of a medication request or statement
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MedicationStatus {
    #[default]
    Active,
    OnHold,
    Completed,
    Stopped,
    EnteredInError,
}

/// A single medication the patient is recorded against
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MedicationEntry {
    pub code: MedicationCode,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub status: MedicationStatus,
}

impl MedicationEntry {
    pub fn active(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
            status: MedicationStatus::Active,
        }
    }

    /// Display text, falling back to the code when none was recorded
    pub fn label(&self) -> &str {
        if self.display.is_empty() {
            &self.code
        } else {
            &self.display
        }
    }
}

/// The patient's current medications from both provenances.
///
/// A code in either list counts as "currently taking".
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
pub struct MedicationState {
    /// Clinician-initiated active prescriptions
    #[serde(default)]
    pub prescriptions: Vec<MedicationEntry>,
    /// Patient-reported medications
    #[serde(default)]
    pub statements: Vec<MedicationEntry>,
}

impl MedicationState {
    /// Every code the patient is taking, prescriptions first, each code once
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for entry in self.prescriptions.iter().chain(self.statements.iter()) {
            if !codes.contains(&entry.code.as_str()) {
                codes.push(&entry.code);
            }
        }
        codes
    }

    pub fn is_taking(&self, code: &str) -> bool {
        self.prescriptions
            .iter()
            .chain(self.statements.iter())
            .any(|m| m.code == code)
    }

    /// Display name for a code, if any entry recorded one
    pub fn display_for(&self, code: &str) -> Option<&str> {
        self.prescriptions
            .iter()
            .chain(self.statements.iter())
            .find(|m| m.code == code && !m.display.is_empty())
            .map(|m| m.display.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.prescriptions.is_empty() && self.statements.is_empty()
    }
}

/// An active diagnosis on the patient's problem list
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActiveCondition {
    pub code: ConditionCode,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub onset: Option<String>,
}

impl ActiveCondition {
    pub fn new(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
            onset: None,
        }
    }

    pub fn label(&self) -> &str {
        if self.display.is_empty() {
            &self.code
        } else {
            &self.display
        }
    }
}

/// A named sub-component of a compound observation (e.g. systolic pressure)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObservationComponent {
    pub code: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Measured value of an observation: a single quantity or named components
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationValue {
    Quantity(f64),
    Components(Vec<ObservationComponent>),
}

/// A recorded measurement
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ObservationRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub value: Option<ObservationValue>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Raw effective timestamp as recorded; may be missing or malformed
    #[serde(default)]
    pub effective: Option<String>,
}

impl ObservationRecord {
    pub fn quantity(code: impl Into<String>, value: f64, effective: Option<&str>) -> Self {
        Self {
            id: None,
            code: code.into(),
            display: String::new(),
            value: Some(ObservationValue::Quantity(value)),
            unit: None,
            effective: effective.map(str::to_string),
        }
    }

    pub fn compound(
        code: impl Into<String>,
        components: Vec<ObservationComponent>,
        effective: Option<&str>,
    ) -> Self {
        Self {
            id: None,
            code: code.into(),
            display: String::new(),
            value: Some(ObservationValue::Components(components)),
            unit: None,
            effective: effective.map(str::to_string),
        }
    }

    /// Scalar value, if this observation carries one
    pub fn scalar(&self) -> Option<f64> {
        match &self.value {
            Some(ObservationValue::Quantity(v)) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    /// Value of a named component, if present
    pub fn component(&self, code: &str) -> Option<f64> {
        match &self.value {
            Some(ObservationValue::Components(parts)) => parts
                .iter()
                .find(|c| c.code == code)
                .and_then(|c| c.value)
                .filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Parsed effective time; None when missing or unparseable
    pub fn effective_at(&self) -> Option<DateTime<Utc>> {
        self.effective.as_deref().and_then(parse_timestamp)
    }
}

/// Parse the timestamp shapes clinical records use in practice.
///
/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and a bare
/// `YYYY-MM-DD` date (midnight UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Rules
// ============================================================================

/// A directed interaction rule, stored under its subject medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InteractionRule {
    pub partner: MedicationCode,
    pub severity: InteractionSeverity,
    pub description: String,
}

// ============================================================================
// Check Results
// ============================================================================

/// One interaction found between the candidate and a current medication
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DrugInteraction {
    pub candidate_code: MedicationCode,
    pub current_code: MedicationCode,
    pub current_display: Option<String>,
    pub severity: InteractionSeverity,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct InteractionResult {
    pub safe_to_prescribe: bool,
    pub interactions: Vec<DrugInteraction>,
    pub warning_message: String,
}

impl InteractionResult {
    pub fn found(&self) -> bool {
        !self.interactions.is_empty()
    }

    /// Worst severity among the findings
    pub fn highest_severity(&self) -> Option<InteractionSeverity> {
        self.interactions.iter().map(|i| i.severity).max()
    }

    pub fn count_by_severity(&self, severity: InteractionSeverity) -> usize {
        self.interactions
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    }
}

/// An active condition that makes the candidate unsafe
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Contraindication {
    pub medication_code: MedicationCode,
    pub condition_code: ConditionCode,
    pub condition_display: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ContraindicationResult {
    pub safe_to_prescribe: bool,
    pub contraindications: Vec<Contraindication>,
    pub warning_message: String,
}

impl ContraindicationResult {
    pub fn found(&self) -> bool {
        !self.contraindications.is_empty()
    }
}

/// Where a "currently taking" record came from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MedicationSource {
    /// Clinician-initiated prescription
    Prescription,
    /// Patient-reported statement
    Statement,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DuplicateFinding {
    pub source: MedicationSource,
    pub code: MedicationCode,
    pub description: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DuplicateResult {
    pub is_duplicate: bool,
    pub safe_to_prescribe: bool,
    pub duplicates: Vec<DuplicateFinding>,
    pub warning_message: String,
}

/// Composite verdict of the three prescribing checks
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregateDecision {
    pub decision_id: Uuid,
    pub patient_id: String,
    pub medication_code: MedicationCode,
    pub medication_name: String,
    pub overall_safe: bool,
    pub duplicate_therapy: DuplicateResult,
    pub drug_interactions: InteractionResult,
    pub contraindications: ContraindicationResult,
    pub recommendation: String,
    pub screening_note: String,
    pub checked_at: DateTime<Utc>,
}

// ============================================================================
// Monitoring Alerts
// ============================================================================

/// An observation value breaching a clinical danger threshold
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClinicalAlert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub action_required: bool,
    pub recommendation: String,
    pub observation_code: String,
    pub observed_at: Option<String>,
}

/// Kind of condition-driven monitoring that is overdue
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CareGapType {
    Hba1cMonitoring,
    BloodPressureMonitoring,
}

impl CareGapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CareGapType::Hba1cMonitoring => "HbA1c Monitoring",
            CareGapType::BloodPressureMonitoring => "Blood Pressure Monitoring",
        }
    }
}

impl fmt::Display for CareGapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CareGapAlert {
    pub gap_type: CareGapType,
    pub message: String,
    /// Days since the test was last done; the never/unknown sentinel otherwise
    pub days_since_last_completed: i64,
    pub priority: CareGapPriority,
}

/// Monitoring-side findings for a patient
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub patient_id: String,
    pub critical_alerts: Vec<ClinicalAlert>,
    pub care_gaps: Vec<CareGapAlert>,
    pub generated_at: DateTime<Utc>,
}
