#![forbid(unsafe_code)]

//! Core domain model and decision logic for medication safety screening.
//!
//! This crate provides:
//! - Domain types (medications, conditions, observations, results)
//! - Rule tables for interactions, contraindications and thresholds
//! - Prescribing checks (interactions, contraindications, duplicate therapy)
//! - Monitoring checks (critical values, care gaps)
//! - The record query port and a file-backed store
//! - The concurrent decision aggregator

pub mod types;
pub mod error;
pub mod rules;
pub mod config;
pub mod logging;
pub mod records;
pub mod store;
pub mod interaction;
pub mod contraindication;
pub mod duplicate;
pub mod critical;
pub mod care_gap;
pub mod engine;

// Re-export commonly used types
pub use error::{CheckKind, Error, Result};
pub use types::*;
pub use config::Config;
pub use rules::{default_rules, RuleSet, RuleTable};
pub use records::{InMemoryRecords, PatientRecord, RecordQuery};
pub use store::FileRecordStore;
pub use engine::SafetyEngine;
