//! Critical value analysis for recent observations.
//!
//! Each observation is matched against the threshold tables by test code.
//! Scalar tests compare a single value; blood pressure is compound and is
//! evaluated from its systolic and diastolic components. Anything without a
//! matching rule, or without a usable value, is treated as normal.

use crate::rules::{Bound, BLOOD_PRESSURE_THRESHOLD, SCALAR_THRESHOLDS};
use crate::{ClinicalAlert, ObservationRecord};

/// Scan observations for values past clinical danger thresholds
///
/// Produces at most one alert per observation. Repeat tests are not
/// de-duplicated.
pub fn check_critical_values(observations: &[ObservationRecord]) -> Vec<ClinicalAlert> {
    let alerts: Vec<ClinicalAlert> = observations.iter().filter_map(evaluate).collect();

    tracing::info!(
        "Critical value scan: {} observation(s), {} alert(s)",
        observations.len(),
        alerts.len()
    );

    alerts
}

fn evaluate(obs: &ObservationRecord) -> Option<ClinicalAlert> {
    if BLOOD_PRESSURE_THRESHOLD.test_codes.contains(&obs.code.as_str()) {
        return evaluate_blood_pressure(obs);
    }

    let value = match obs.scalar() {
        Some(v) => v,
        None => {
            tracing::debug!("Observation {} has no usable value, skipping", obs.code);
            return None;
        }
    };

    let threshold = SCALAR_THRESHOLDS
        .iter()
        .filter(|t| t.test_code == obs.code)
        .find(|t| t.bound.breached_by(value))?;

    let limit = match threshold.bound {
        Bound::Above(limit) => format!("> {} {}", limit, threshold.unit),
        Bound::Below(limit) => format!("< {} {}", limit, threshold.unit),
    };

    tracing::warn!(
        "Critical value: {} = {} ({})",
        obs.code,
        value,
        threshold.title
    );

    Some(ClinicalAlert {
        severity: threshold.severity,
        title: threshold.title.to_string(),
        message: format!(
            "{} value of {} {} is outside the safe range ({})",
            label(obs),
            value,
            obs.unit.as_deref().unwrap_or(threshold.unit),
            limit
        ),
        action_required: true,
        recommendation: threshold.recommendation.to_string(),
        observation_code: obs.code.clone(),
        observed_at: obs.effective.clone(),
    })
}

fn evaluate_blood_pressure(obs: &ObservationRecord) -> Option<ClinicalAlert> {
    let rule = &BLOOD_PRESSURE_THRESHOLD;
    let systolic = obs.component(rule.systolic_code);
    let diastolic = obs.component(rule.diastolic_code);

    if systolic.is_none() && diastolic.is_none() {
        tracing::debug!("Blood pressure {} has no usable components, skipping", obs.code);
        return None;
    }

    let breached = systolic.is_some_and(|s| s > rule.systolic_above)
        || diastolic.is_some_and(|d| d > rule.diastolic_above);
    if !breached {
        return None;
    }

    let show = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "?".into());
    let reading = format!("{}/{}", show(systolic), show(diastolic));

    tracing::warn!("Hypertensive crisis reading: {} mmHg", reading);

    Some(ClinicalAlert {
        severity: rule.severity,
        title: rule.title.to_string(),
        message: format!(
            "Blood pressure {} mmHg exceeds crisis threshold (systolic > {} or diastolic > {})",
            reading, rule.systolic_above, rule.diastolic_above
        ),
        action_required: true,
        recommendation: rule.recommendation.to_string(),
        observation_code: obs.code.clone(),
        observed_at: obs.effective.clone(),
    })
}

fn label(obs: &ObservationRecord) -> &str {
    if obs.display.is_empty() {
        &obs.code
    } else {
        &obs.display
    }
}
