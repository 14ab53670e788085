//! Care gap identification for condition-driven monitoring.
//!
//! A monitoring schedule only applies when the patient has one of its
//! conditions. The most recent matching observation decides whether the
//! test is overdue; observations without a usable timestamp never count as
//! recent.

use crate::rules::{MonitoringSchedule, MONITORING_SCHEDULES};
use crate::{ActiveCondition, CareGapAlert, ObservationRecord};
use chrono::{DateTime, Utc};

/// Reported as days-since-last when the test was never done or its date is unknown
pub const NEVER_COMPLETED_DAYS: i64 = 999;

/// Compare monitoring schedules against observation recency
pub fn identify_care_gaps(
    conditions: &[ActiveCondition],
    observations: &[ObservationRecord],
    now: DateTime<Utc>,
) -> Vec<CareGapAlert> {
    let gaps: Vec<CareGapAlert> = MONITORING_SCHEDULES
        .iter()
        .filter(|schedule| applies_to(schedule, conditions))
        .filter_map(|schedule| evaluate(schedule, observations, now))
        .collect();

    tracing::info!("Care gap scan: {} gap(s) identified", gaps.len());
    gaps
}

fn applies_to(schedule: &MonitoringSchedule, conditions: &[ActiveCondition]) -> bool {
    conditions
        .iter()
        .any(|c| schedule.condition_codes.contains(&c.code.as_str()))
}

fn evaluate(
    schedule: &MonitoringSchedule,
    observations: &[ObservationRecord],
    now: DateTime<Utc>,
) -> Option<CareGapAlert> {
    let matching: Vec<&ObservationRecord> = observations
        .iter()
        .filter(|o| schedule.test_codes.contains(&o.code.as_str()))
        .collect();

    let unparseable = matching.iter().filter(|o| o.effective_at().is_none()).count();
    if unparseable > 0 {
        tracing::warn!(
            "{} {} observation(s) without a usable timestamp",
            unparseable,
            schedule.test_name
        );
    }

    let last_done = matching.iter().filter_map(|o| o.effective_at()).max();

    let (days, message) = match last_done {
        Some(at) => {
            let days = (now - at).num_days();
            if days <= schedule.max_age_days {
                return None;
            }
            (
                days,
                format!(
                    "{} patient has not had {} in {} days (recommended every {} days)",
                    schedule.condition_name, schedule.test_name, days, schedule.max_age_days
                ),
            )
        }
        None => (
            NEVER_COMPLETED_DAYS,
            format!(
                "{} patient has no recorded {} (recommended every {} days)",
                schedule.condition_name, schedule.test_name, schedule.max_age_days
            ),
        ),
    };

    tracing::debug!("Care gap: {} ({} days)", schedule.gap_type, days);

    Some(CareGapAlert {
        gap_type: schedule.gap_type,
        message,
        days_since_last_completed: days,
        priority: schedule.priority,
    })
}
