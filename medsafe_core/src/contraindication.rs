//! Condition-based contraindication screening.

use crate::rules::RuleTable;
use crate::{ActiveCondition, Contraindication, ContraindicationResult};

/// Check a candidate medication against the patient's active conditions
///
/// A medication with no entry in the rule table has no known
/// contraindications and is safe by default.
pub fn check_contraindications(
    rules: &dyn RuleTable,
    conditions: &[ActiveCondition],
    candidate: &str,
) -> ContraindicationResult {
    let contraindications: Vec<Contraindication> = match rules.contraindicated_conditions(candidate)
    {
        Some(unsafe_for) => conditions
            .iter()
            .filter(|c| unsafe_for.contains(&c.code))
            .map(|c| {
                tracing::debug!("{} contraindicated by condition {}", candidate, c.code);
                Contraindication {
                    medication_code: candidate.to_string(),
                    condition_code: c.code.clone(),
                    condition_display: c.label().to_string(),
                }
            })
            .collect(),
        None => Vec::new(),
    };

    let safe_to_prescribe = contraindications.is_empty();
    let warning_message = if safe_to_prescribe {
        "No contraindications found for the patient's active conditions (rules-based screening, not exhaustive).".to_string()
    } else {
        let names: Vec<&str> = contraindications
            .iter()
            .map(|c| c.condition_display.as_str())
            .collect();
        format!(
            "Contraindicated: medication is unsafe with the patient's active condition(s): {}",
            names.join(", ")
        )
    };

    tracing::info!(
        "Contraindication check for {}: {} finding(s)",
        candidate,
        contraindications.len()
    );

    ContraindicationResult {
        safe_to_prescribe,
        contraindications,
        warning_message,
    }
}
