//! Drug-drug interaction screening.
//!
//! Rule data is authored asymmetrically, so for each current medication `c`
//! the checker probes `candidate -> c` first and falls back to
//! `c -> candidate`. A hit in either direction is reported the same way.

use crate::rules::RuleTable;
use crate::{DrugInteraction, InteractionResult, InteractionSeverity, MedicationState};

/// Check a candidate medication against everything the patient is taking
///
/// Only `Major` interactions block; `Moderate` and `Minor` are reported as
/// cautions. Codes absent from the rule table produce no findings.
pub fn check_interactions(
    rules: &dyn RuleTable,
    medications: &MedicationState,
    candidate: &str,
) -> InteractionResult {
    let mut interactions = Vec::new();

    for current in medications.codes() {
        if current == candidate {
            // Same drug is duplicate therapy, not an interaction
            continue;
        }

        let rule = match rules.interaction(candidate, current) {
            Some(rule) => Some(rule),
            None => {
                let reverse = rules.interaction(current, candidate);
                if reverse.is_some() {
                    tracing::debug!(
                        "Interaction {} <-> {} found under reverse entry",
                        candidate,
                        current
                    );
                }
                reverse
            }
        };

        if let Some(rule) = rule {
            tracing::debug!(
                "Interaction found: {} with {} ({})",
                candidate,
                current,
                rule.severity
            );
            interactions.push(DrugInteraction {
                candidate_code: candidate.to_string(),
                current_code: current.to_string(),
                current_display: medications.display_for(current).map(str::to_string),
                severity: rule.severity,
                description: rule.description.clone(),
            });
        }
    }

    let safe_to_prescribe = !interactions.iter().any(|i| i.severity.is_blocking());
    let warning_message = build_warning(&interactions, safe_to_prescribe);

    tracing::info!(
        "Interaction check for {}: {} finding(s), safe={}",
        candidate,
        interactions.len(),
        safe_to_prescribe
    );

    InteractionResult {
        safe_to_prescribe,
        interactions,
        warning_message,
    }
}

fn build_warning(interactions: &[DrugInteraction], safe: bool) -> String {
    if interactions.is_empty() {
        return "No known drug interactions detected (rules-based screening, not exhaustive)."
            .to_string();
    }

    let count = |severity: InteractionSeverity| {
        interactions
            .iter()
            .filter(|i| i.severity == severity)
            .count()
    };

    let summary = format!(
        "{} interaction(s) found: {} major, {} moderate, {} minor",
        interactions.len(),
        count(InteractionSeverity::Major),
        count(InteractionSeverity::Moderate),
        count(InteractionSeverity::Minor)
    );

    let details: Vec<String> = interactions
        .iter()
        .map(|i| {
            let with = i.current_display.as_deref().unwrap_or(&i.current_code);
            format!("[{}] with {}: {}", i.severity, with, i.description)
        })
        .collect();

    if safe {
        format!("Proceed with caution. {}. {}", summary, details.join("; "))
    } else {
        format!(
            "Major interaction - do not prescribe. {}. {}",
            summary,
            details.join("; ")
        )
    }
}
