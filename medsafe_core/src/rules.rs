//! Rule tables: interactions, contraindications and clinical thresholds.
//!
//! Interaction rules are a directed adjacency list. A rule registered as
//! `A -> B` says nothing about `B -> A`; checkers probe both directions
//! explicitly and the table is never symmetrized on load.

use crate::types::*;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Well-known codes used by the built-in tables.
///
/// Medications are RxNorm ingredient codes, conditions SNOMED CT, and
/// observations LOINC.
pub mod codes {
    pub const WARFARIN: &str = "11289";
    pub const ASPIRIN: &str = "1191";
    pub const IBUPROFEN: &str = "5640";
    pub const LISINOPRIL: &str = "29046";
    pub const SPIRONOLACTONE: &str = "9997";
    pub const SIMVASTATIN: &str = "36567";
    pub const CLARITHROMYCIN: &str = "21212";
    pub const AMIODARONE: &str = "703";
    pub const DIGOXIN: &str = "3407";
    pub const METFORMIN: &str = "6809";
    pub const PROPRANOLOL: &str = "8787";
    pub const LEVOTHYROXINE: &str = "10582";
    pub const CALCIUM_CARBONATE: &str = "1897";

    pub const DIABETES_MELLITUS: &str = "73211009";
    pub const TYPE_1_DIABETES: &str = "46635009";
    pub const TYPE_2_DIABETES: &str = "44054006";
    pub const HYPERTENSION: &str = "38341003";
    pub const ESSENTIAL_HYPERTENSION: &str = "59621000";
    pub const CHRONIC_KIDNEY_DISEASE: &str = "709044004";
    pub const PEPTIC_ULCER: &str = "13200003";
    pub const HEART_FAILURE: &str = "84114007";
    pub const ASTHMA: &str = "195967001";
    pub const PREGNANCY: &str = "77386006";

    pub const FASTING_GLUCOSE: &str = "1558-6";
    pub const HBA1C: &str = "4548-4";
    pub const BLOOD_PRESSURE_PANEL: &str = "85354-9";
    pub const BLOOD_PRESSURE_SYS_DIA: &str = "55284-4";
    pub const SYSTOLIC_BP: &str = "8480-6";
    pub const DIASTOLIC_BP: &str = "8462-4";
}

// ============================================================================
// Rule Table Port
// ============================================================================

/// Read-only access to interaction and contraindication rules.
///
/// Implementations must be immutable once shared; the engine reads them
/// from concurrent checks without locking.
pub trait RuleTable: Send + Sync {
    /// All rules registered under `subject`
    fn interactions_for(&self, subject: &str) -> &[InteractionRule];

    /// Conditions under which `medication` must not be prescribed
    fn contraindicated_conditions(&self, medication: &str) -> Option<&HashSet<ConditionCode>>;

    /// Single directed probe: the rule registered as `subject -> partner`
    fn interaction(&self, subject: &str, partner: &str) -> Option<&InteractionRule> {
        self.interactions_for(subject)
            .iter()
            .find(|rule| rule.partner == partner)
    }
}

/// In-memory rule table
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    pub interactions: HashMap<MedicationCode, Vec<InteractionRule>>,
    pub contraindications: HashMap<MedicationCode, HashSet<ConditionCode>>,
    /// Free-text rationale attached to a medication's contraindication entry
    pub contraindication_notes: HashMap<MedicationCode, String>,
}

impl RuleTable for RuleSet {
    fn interactions_for(&self, subject: &str) -> &[InteractionRule] {
        self.interactions
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn contraindicated_conditions(&self, medication: &str) -> Option<&HashSet<ConditionCode>> {
        self.contraindications.get(medication)
    }
}

/// Cached built-in rules, built once per process
static DEFAULT_RULES: Lazy<RuleSet> = Lazy::new(build_default_rules);

/// Get a reference to the built-in rule tables
pub fn default_rules() -> &'static RuleSet {
    &DEFAULT_RULES
}

impl RuleSet {
    /// Register `subject -> partner`. Does not add the reverse edge.
    pub fn add_interaction(
        &mut self,
        subject: &str,
        partner: &str,
        severity: InteractionSeverity,
        description: &str,
    ) {
        self.interactions
            .entry(subject.to_string())
            .or_default()
            .push(InteractionRule {
                partner: partner.to_string(),
                severity,
                description: description.to_string(),
            });
    }

    pub fn add_contraindication(&mut self, medication: &str, conditions: &[&str]) {
        self.contraindications
            .entry(medication.to_string())
            .or_default()
            .extend(conditions.iter().map(|c| c.to_string()));
    }

    pub fn contraindication_note(&self, medication: &str) -> Option<&str> {
        self.contraindication_notes.get(medication).map(String::as_str)
    }

    /// Rules elsewhere in the table that name `code` as their partner
    pub fn rules_naming(&self, code: &str) -> Vec<(&str, &InteractionRule)> {
        let mut found: Vec<(&str, &InteractionRule)> = self
            .interactions
            .iter()
            .flat_map(|(subject, rules)| {
                rules
                    .iter()
                    .filter(move |r| r.partner == code)
                    .map(move |r| (subject.as_str(), r))
            })
            .collect();
        found.sort_by(|a, b| a.0.cmp(b.0));
        found
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.values().map(Vec::len).sum()
    }

    /// Load rule tables from a TOML rule file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let rules = Self::from_toml(&contents)?;
        tracing::info!(
            "Loaded {} interaction rules and {} contraindication entries from {:?}",
            rules.interaction_count(),
            rules.contraindications.len(),
            path
        );
        Ok(rules)
    }

    /// Parse rule tables from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(contents)?;
        let mut rules = RuleSet::default();

        for entry in file.interactions {
            let severity = InteractionSeverity::parse(&entry.severity).ok_or_else(|| {
                Error::RuleValidation(format!(
                    "Interaction {} -> {} has unknown severity '{}'",
                    entry.subject, entry.partner, entry.severity
                ))
            })?;
            rules.add_interaction(&entry.subject, &entry.partner, severity, &entry.description);
        }

        for entry in file.contraindications {
            let conditions: Vec<&str> = entry.conditions.iter().map(String::as_str).collect();
            // An entry with no conditions still lands in the table so validate() sees it
            rules.add_contraindication(&entry.medication, &conditions);
            if let Some(note) = entry.note.filter(|n| !n.trim().is_empty()) {
                rules.contraindication_notes.insert(entry.medication, note);
            }
        }

        Ok(rules)
    }

    /// Validate the tables for consistency
    ///
    /// Returns a list of validation errors, or empty Vec if valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (subject, rules) in &self.interactions {
            if subject.trim().is_empty() {
                errors.push("Interaction rule has empty subject code".to_string());
            }

            let mut partners = HashSet::new();
            for rule in rules {
                if rule.partner.trim().is_empty() {
                    errors.push(format!(
                        "Interaction under '{}' has empty partner code",
                        subject
                    ));
                }
                if &rule.partner == subject {
                    errors.push(format!("Medication '{}' interacts with itself", subject));
                }
                if rule.description.trim().is_empty() {
                    errors.push(format!(
                        "Interaction '{}' -> '{}' has empty description",
                        subject, rule.partner
                    ));
                }
                if !partners.insert(rule.partner.as_str()) {
                    errors.push(format!(
                        "Interaction '{}' -> '{}' registered more than once",
                        subject, rule.partner
                    ));
                }
            }
        }

        for (medication, conditions) in &self.contraindications {
            if medication.trim().is_empty() {
                errors.push("Contraindication entry has empty medication code".to_string());
            }
            if conditions.is_empty() {
                errors.push(format!(
                    "Contraindication entry for '{}' lists no conditions",
                    medication
                ));
            }
            if conditions.iter().any(|c| c.trim().is_empty()) {
                errors.push(format!(
                    "Contraindication entry for '{}' has an empty condition code",
                    medication
                ));
            }
        }

        errors.sort();
        errors
    }
}

/// On-disk rule file layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct RuleFile {
    #[serde(default)]
    interactions: Vec<InteractionEntry>,
    #[serde(default)]
    contraindications: Vec<ContraindicationEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InteractionEntry {
    subject: String,
    partner: String,
    severity: String,
    description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContraindicationEntry {
    medication: String,
    #[serde(default)]
    conditions: Vec<String>,
    #[serde(default)]
    note: Option<String>,
}

fn build_default_rules() -> RuleSet {
    use codes::*;
    let mut rules = RuleSet::default();

    // ========================================================================
    // Interactions (directed, as authored)
    // ========================================================================

    rules.add_interaction(
        WARFARIN,
        ASPIRIN,
        InteractionSeverity::Major,
        "Increased risk of bleeding when warfarin is combined with aspirin",
    );
    rules.add_interaction(
        WARFARIN,
        IBUPROFEN,
        InteractionSeverity::Major,
        "NSAIDs increase bleeding risk and may raise INR in patients on warfarin",
    );
    rules.add_interaction(
        WARFARIN,
        AMIODARONE,
        InteractionSeverity::Major,
        "Amiodarone inhibits warfarin metabolism; INR may rise sharply",
    );
    rules.add_interaction(
        WARFARIN,
        CLARITHROMYCIN,
        InteractionSeverity::Moderate,
        "Clarithromycin may potentiate the anticoagulant effect of warfarin; monitor INR",
    );
    rules.add_interaction(
        LISINOPRIL,
        SPIRONOLACTONE,
        InteractionSeverity::Major,
        "Risk of severe hyperkalemia with ACE inhibitor and potassium-sparing diuretic",
    );
    rules.add_interaction(
        LISINOPRIL,
        IBUPROFEN,
        InteractionSeverity::Moderate,
        "NSAIDs may reduce the antihypertensive effect of lisinopril and impair renal function",
    );
    rules.add_interaction(
        SIMVASTATIN,
        CLARITHROMYCIN,
        InteractionSeverity::Major,
        "Strong CYP3A4 inhibition raises simvastatin levels; risk of rhabdomyolysis",
    );
    rules.add_interaction(
        SIMVASTATIN,
        AMIODARONE,
        InteractionSeverity::Moderate,
        "Amiodarone increases simvastatin exposure; limit simvastatin dose",
    );
    rules.add_interaction(
        DIGOXIN,
        AMIODARONE,
        InteractionSeverity::Major,
        "Amiodarone raises digoxin concentration; risk of digoxin toxicity",
    );
    rules.add_interaction(
        ASPIRIN,
        IBUPROFEN,
        InteractionSeverity::Moderate,
        "Ibuprofen may interfere with the antiplatelet effect of aspirin",
    );
    rules.add_interaction(
        LEVOTHYROXINE,
        CALCIUM_CARBONATE,
        InteractionSeverity::Minor,
        "Calcium reduces levothyroxine absorption; separate doses by 4 hours",
    );

    // ========================================================================
    // Contraindications
    // ========================================================================

    rules.add_contraindication(METFORMIN, &[CHRONIC_KIDNEY_DISEASE]);
    rules.add_contraindication(IBUPROFEN, &[PEPTIC_ULCER, CHRONIC_KIDNEY_DISEASE, HEART_FAILURE]);
    rules.add_contraindication(ASPIRIN, &[PEPTIC_ULCER]);
    rules.add_contraindication(PROPRANOLOL, &[ASTHMA]);
    rules.add_contraindication(LISINOPRIL, &[PREGNANCY]);
    rules.add_contraindication(WARFARIN, &[PREGNANCY]);
    rules.add_contraindication(SIMVASTATIN, &[PREGNANCY]);

    rules
}

// ============================================================================
// Critical Value Thresholds
// ============================================================================

/// Which side of a cutoff is dangerous. Both comparisons are strict.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Bound {
    Above(f64),
    Below(f64),
}

impl Bound {
    pub fn breached_by(&self, value: f64) -> bool {
        match *self {
            Bound::Above(limit) => value > limit,
            Bound::Below(limit) => value < limit,
        }
    }
}

/// A scalar danger threshold for one test
#[derive(Clone, Debug)]
pub struct ScalarThreshold {
    pub test_code: &'static str,
    pub bound: Bound,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub unit: &'static str,
    pub recommendation: &'static str,
}

/// Danger thresholds for compound blood pressure readings
#[derive(Clone, Debug)]
pub struct BloodPressureThreshold {
    pub test_codes: &'static [&'static str],
    pub systolic_code: &'static str,
    pub diastolic_code: &'static str,
    pub systolic_above: f64,
    pub diastolic_above: f64,
    pub severity: AlertSeverity,
    pub title: &'static str,
    pub recommendation: &'static str,
}

pub const SCALAR_THRESHOLDS: &[ScalarThreshold] = &[
    ScalarThreshold {
        test_code: codes::FASTING_GLUCOSE,
        bound: Bound::Above(300.0),
        severity: AlertSeverity::Critical,
        title: "Critical High Glucose",
        unit: "mg/dL",
        recommendation: "Immediate medical intervention required",
    },
    ScalarThreshold {
        test_code: codes::FASTING_GLUCOSE,
        bound: Bound::Below(50.0),
        severity: AlertSeverity::Critical,
        title: "Critical Low Glucose",
        unit: "mg/dL",
        recommendation: "Immediate glucose administration required",
    },
    ScalarThreshold {
        test_code: codes::HBA1C,
        bound: Bound::Above(10.0),
        severity: AlertSeverity::High,
        title: "Poorly Controlled Diabetes",
        unit: "%",
        recommendation: "Urgent medication adjustment needed",
    },
];

pub const BLOOD_PRESSURE_THRESHOLD: BloodPressureThreshold = BloodPressureThreshold {
    test_codes: &[codes::BLOOD_PRESSURE_PANEL, codes::BLOOD_PRESSURE_SYS_DIA],
    systolic_code: codes::SYSTOLIC_BP,
    diastolic_code: codes::DIASTOLIC_BP,
    systolic_above: 180.0,
    diastolic_above: 120.0,
    severity: AlertSeverity::Critical,
    title: "Hypertensive Crisis",
    recommendation: "Immediate blood pressure reduction required; risk of organ damage",
};

// ============================================================================
// Monitoring Schedules
// ============================================================================

/// Condition-driven monitoring requirement used for care gaps
#[derive(Clone, Debug)]
pub struct MonitoringSchedule {
    pub gap_type: CareGapType,
    /// The gap only applies when the patient has one of these conditions
    pub condition_codes: &'static [&'static str],
    /// Observations that satisfy the requirement
    pub test_codes: &'static [&'static str],
    pub max_age_days: i64,
    pub priority: CareGapPriority,
    pub test_name: &'static str,
    pub condition_name: &'static str,
}

pub const MONITORING_SCHEDULES: &[MonitoringSchedule] = &[
    MonitoringSchedule {
        gap_type: CareGapType::Hba1cMonitoring,
        condition_codes: &[
            codes::DIABETES_MELLITUS,
            codes::TYPE_1_DIABETES,
            codes::TYPE_2_DIABETES,
        ],
        test_codes: &[codes::HBA1C],
        max_age_days: 90,
        priority: CareGapPriority::High,
        test_name: "HbA1c",
        condition_name: "Diabetic",
    },
    MonitoringSchedule {
        gap_type: CareGapType::BloodPressureMonitoring,
        condition_codes: &[codes::HYPERTENSION, codes::ESSENTIAL_HYPERTENSION],
        test_codes: &[codes::BLOOD_PRESSURE_PANEL, codes::BLOOD_PRESSURE_SYS_DIA],
        max_age_days: 30,
        priority: CareGapPriority::Medium,
        test_name: "Blood pressure check",
        condition_name: "Hypertensive",
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use codes::*;

    #[test]
    fn test_default_rules_validate() {
        let errors = default_rules().validate();
        assert!(
            errors.is_empty(),
            "Default rules have validation errors: {:?}",
            errors
        );
    }

    #[test]
    fn test_warfarin_aspirin_registered_one_way() {
        let rules = default_rules();
        assert!(rules.interaction(WARFARIN, ASPIRIN).is_some());
        assert!(rules.interaction(ASPIRIN, WARFARIN).is_none());
    }

    #[test]
    fn test_unknown_medication_has_no_rules() {
        let rules = default_rules();
        assert!(rules.interactions_for("does-not-exist").is_empty());
        assert!(rules.contraindicated_conditions("does-not-exist").is_none());
    }

    #[test]
    fn test_rules_naming_partner() {
        let naming = default_rules().rules_naming(AMIODARONE);
        let subjects: Vec<&str> = naming.iter().map(|(s, _)| *s).collect();
        // sorted by subject code
        assert_eq!(subjects, vec![WARFARIN, DIGOXIN, SIMVASTATIN]);
    }

    #[test]
    fn test_load_rule_file_keeps_direction() {
        let toml_str = r#"
[[interactions]]
subject = "A"
partner = "B"
severity = "major"
description = "A and B together"

[[contraindications]]
medication = "A"
conditions = ["K1", "K2"]
note = "renal"
"#;
        let rules = RuleSet::from_toml(toml_str).unwrap();
        assert!(rules.interaction("A", "B").is_some());
        assert!(rules.interaction("B", "A").is_none());
        assert_eq!(rules.contraindicated_conditions("A").unwrap().len(), 2);
        assert_eq!(rules.contraindication_note("A"), Some("renal"));
        assert_eq!(rules.contraindication_note("B"), None);
        assert!(rules.validate().is_empty());
    }

    #[test]
    fn test_unknown_severity_rejected() {
        let toml_str = r#"
[[interactions]]
subject = "A"
partner = "B"
severity = "apocalyptic"
description = "?"
"#;
        let err = RuleSet::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, Error::RuleValidation(_)));
    }

    #[test]
    fn test_validate_flags_bad_rules() {
        let mut rules = RuleSet::default();
        rules.add_interaction("A", "A", InteractionSeverity::Minor, "self");
        rules.add_interaction("B", "C", InteractionSeverity::Minor, "");
        rules.add_interaction("B", "C", InteractionSeverity::Major, "again");
        rules.contraindications.insert("D".into(), HashSet::new());

        let errors = rules.validate();
        assert!(errors.iter().any(|e| e.contains("interacts with itself")));
        assert!(errors.iter().any(|e| e.contains("empty description")));
        assert!(errors.iter().any(|e| e.contains("more than once")));
        assert!(errors.iter().any(|e| e.contains("lists no conditions")));
    }

    #[test]
    fn test_bounds_are_strict() {
        assert!(!Bound::Above(300.0).breached_by(300.0));
        assert!(Bound::Above(300.0).breached_by(300.5));
        assert!(!Bound::Below(50.0).breached_by(50.0));
        assert!(Bound::Below(50.0).breached_by(49.9));
    }
}
