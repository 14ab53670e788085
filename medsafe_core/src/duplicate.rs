//! Duplicate therapy detection.
//!
//! Re-prescribing something the patient already takes always blocks, unlike
//! interactions which only block on major severity.

use crate::{DuplicateFinding, DuplicateResult, MedicationSource, MedicationState};

/// Check whether the patient is already taking the candidate
///
/// Both active prescriptions and patient-reported statements are searched;
/// each match records where it came from.
pub fn check_duplicate_therapy(
    medications: &MedicationState,
    candidate: &str,
    candidate_name: &str,
) -> DuplicateResult {
    let name = if candidate_name.trim().is_empty() {
        candidate
    } else {
        candidate_name
    };

    let mut duplicates = Vec::new();

    for entry in medications.prescriptions.iter().filter(|m| m.code == candidate) {
        duplicates.push(DuplicateFinding {
            source: MedicationSource::Prescription,
            code: entry.code.clone(),
            description: format!("Active prescription for {}", entry_label(&entry.display, name)),
        });
    }

    for entry in medications.statements.iter().filter(|m| m.code == candidate) {
        duplicates.push(DuplicateFinding {
            source: MedicationSource::Statement,
            code: entry.code.clone(),
            description: format!("Patient reports taking {}", entry_label(&entry.display, name)),
        });
    }

    let is_duplicate = !duplicates.is_empty();
    let warning_message = if is_duplicate {
        let sources: Vec<&str> = duplicates.iter().map(|d| d.description.as_str()).collect();
        format!(
            "Duplicate therapy: patient is already taking {} ({}). Re-prescribing risks overdose.",
            name,
            sources.join("; ")
        )
    } else {
        format!("No existing therapy with {} found.", name)
    };

    if is_duplicate {
        tracing::info!(
            "Duplicate therapy for {}: {} existing record(s)",
            candidate,
            duplicates.len()
        );
    }

    DuplicateResult {
        is_duplicate,
        safe_to_prescribe: !is_duplicate,
        duplicates,
        warning_message,
    }
}

fn entry_label<'a>(recorded: &'a str, fallback: &'a str) -> &'a str {
    if recorded.trim().is_empty() {
        fallback
    } else {
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::codes::*;
    use crate::{MedicationEntry, MedicationStatus};

    #[test]
    fn test_prescription_duplicate() {
        let meds = MedicationState {
            prescriptions: vec![MedicationEntry::active(METFORMIN, "Metformin 500mg")],
            statements: vec![],
        };
        let result = check_duplicate_therapy(&meds, METFORMIN, "Metformin");
        assert!(result.is_duplicate);
        assert!(!result.safe_to_prescribe);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].source, MedicationSource::Prescription);
        assert_eq!(
            result.duplicates[0].description,
            "Active prescription for Metformin 500mg"
        );
    }

    #[test]
    fn test_statement_duplicate_records_provenance() {
        let meds = MedicationState {
            prescriptions: vec![],
            statements: vec![MedicationEntry::active(ASPIRIN, "")],
        };
        let result = check_duplicate_therapy(&meds, ASPIRIN, "Aspirin");
        assert!(result.is_duplicate);
        assert_eq!(result.duplicates[0].source, MedicationSource::Statement);
        assert_eq!(result.duplicates[0].description, "Patient reports taking Aspirin");
    }

    #[test]
    fn test_both_sources_reported() {
        let meds = MedicationState {
            prescriptions: vec![MedicationEntry::active(WARFARIN, "Warfarin")],
            statements: vec![MedicationEntry::active(WARFARIN, "Warfarin")],
        };
        let result = check_duplicate_therapy(&meds, WARFARIN, "Warfarin");
        assert_eq!(result.duplicates.len(), 2);
        assert!(result.warning_message.contains("overdose"));
    }

    #[test]
    fn test_no_duplicate() {
        let meds = MedicationState {
            prescriptions: vec![MedicationEntry::active(WARFARIN, "Warfarin")],
            statements: vec![],
        };
        let result = check_duplicate_therapy(&meds, ASPIRIN, "Aspirin");
        assert!(!result.is_duplicate);
        assert!(result.safe_to_prescribe);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn test_exact_code_match_only() {
        let meds = MedicationState {
            prescriptions: vec![MedicationEntry::active("11289", "Warfarin")],
            statements: vec![],
        };
        let result = check_duplicate_therapy(&meds, "112890", "Other");
        assert!(!result.is_duplicate);
    }

    #[test]
    fn test_status_is_the_stores_concern() {
        // The checker trusts the snapshot it is given
        let mut entry = MedicationEntry::active(METFORMIN, "Metformin");
        entry.status = MedicationStatus::Stopped;
        let meds = MedicationState {
            prescriptions: vec![entry],
            statements: vec![],
        };
        assert!(check_duplicate_therapy(&meds, METFORMIN, "Metformin").is_duplicate);
    }
}
