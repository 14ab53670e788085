use chrono::Utc;
use clap::{Parser, Subcommand};
use medsafe_core::*;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Exit status when a prescription is judged unsafe
const EXIT_NOT_SAFE: u8 = 2;

#[derive(Parser)]
#[command(name = "medsafe")]
#[command(about = "Clinical medication safety screening", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Load rule tables from this TOML file instead of the built-in set
    #[arg(long, global = true)]
    rules: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen a candidate medication for a patient
    Check {
        #[arg(long)]
        patient: String,

        /// Medication code of the candidate
        #[arg(long)]
        code: String,

        /// Display name of the candidate
        #[arg(long)]
        name: String,

        /// Print the full decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report critical values and overdue monitoring for a patient
    Alerts {
        #[arg(long)]
        patient: String,

        #[arg(long)]
        json: bool,
    },

    /// Inspect the active rule tables
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// Check the rule tables for consistency
    Validate,

    /// Show every rule that mentions a code
    Show { code: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Loaded before logging exists, so its own events are not shown
    let config = Config::load()?;
    config.validate()?;
    medsafe_core::logging::init_with_level(&config.logging.level);
    tracing::debug!(
        "Using config {:?} (data dir {:?})",
        Config::default_config_path(),
        config.data.data_dir
    );

    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let rules_path = cli.rules.or_else(|| config.rules.path.clone());
    let rules = load_rules(rules_path.as_deref())?;

    match cli.command {
        Commands::Check {
            patient,
            code,
            name,
            json,
        } => {
            ensure_valid(&rules)?;
            let engine = build_engine(data_dir, rules, &config)?;
            cmd_check(&engine, &patient, &code, &name, json).await
        }
        Commands::Alerts { patient, json } => {
            ensure_valid(&rules)?;
            let engine = build_engine(data_dir, rules, &config)?;
            cmd_alerts(&engine, &patient, json).await
        }
        Commands::Rules { action } => match action {
            RulesAction::Validate => cmd_rules_validate(&rules, rules_path.as_deref()),
            RulesAction::Show { code } => cmd_rules_show(&rules, &code),
        },
    }
}

fn load_rules(path: Option<&std::path::Path>) -> Result<RuleSet> {
    match path {
        Some(path) => RuleSet::load_from(path)
            .inspect_err(|e| tracing::error!("Failed to load rules from {:?}: {}", path, e)),
        None => Ok(default_rules().clone()),
    }
}

/// Refuse to screen against a table that fails validation
fn ensure_valid(rules: &RuleSet) -> Result<()> {
    let errors = rules.validate();
    if !errors.is_empty() {
        tracing::error!("Rule table has {} validation error(s)", errors.len());
        eprintln!("Rule table validation errors:");
        for error in &errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::RuleValidation(format!(
            "Invalid rule table ({} error(s))",
            errors.len()
        )));
    }
    Ok(())
}

fn build_engine(data_dir: PathBuf, rules: RuleSet, config: &Config) -> Result<SafetyEngine> {
    let window = config.critical_window()?;
    let store = FileRecordStore::new(data_dir);
    Ok(SafetyEngine::new(Arc::new(store), Arc::new(rules)).with_critical_window(window))
}

async fn cmd_check(
    engine: &SafetyEngine,
    patient: &str,
    code: &str,
    name: &str,
    json: bool,
) -> Result<ExitCode> {
    let decision = engine
        .comprehensive_prescription_check(patient, code, name)
        .await?;

    tracing::info!(
        "Decision {} for {} on patient {}: overall_safe={}",
        decision.decision_id,
        code,
        patient,
        decision.overall_safe
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        display_decision(&decision);
    }

    Ok(if decision.overall_safe {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_SAFE)
    })
}

async fn cmd_alerts(engine: &SafetyEngine, patient: &str, json: bool) -> Result<ExitCode> {
    let report = engine.monitor_patient(patient, Utc::now()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display_report(&report);
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_rules_validate(rules: &RuleSet, path: Option<&std::path::Path>) -> Result<ExitCode> {
    ensure_valid(rules)?;

    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "built-in tables".into());
    println!("✓ Rule tables valid ({})", source);
    println!("  {} interaction rules", rules.interaction_count());
    Ok(ExitCode::SUCCESS)
}

fn cmd_rules_show(rules: &RuleSet, code: &str) -> Result<ExitCode> {
    ensure_valid(rules)?;

    let forward = rules.interactions_for(code);
    let reverse = rules.rules_naming(code);
    let contraindicated = rules.contraindicated_conditions(code);

    if forward.is_empty() && reverse.is_empty() && contraindicated.is_none() {
        println!("No rules mention {}", code);
        return Ok(ExitCode::SUCCESS);
    }

    if !forward.is_empty() || !reverse.is_empty() {
        println!("Interactions:");
        for rule in forward {
            println!(
                "  {} -> {} [{}] {}",
                code, rule.partner, rule.severity, rule.description
            );
        }
        for (subject, rule) in reverse {
            println!(
                "  {} -> {} [{}] {}",
                subject, code, rule.severity, rule.description
            );
        }
    }

    if let Some(conditions) = contraindicated {
        let mut conditions: Vec<&str> = conditions.iter().map(String::as_str).collect();
        conditions.sort_unstable();
        println!("Contraindicated with conditions:");
        for condition in conditions {
            println!("  {}", condition);
        }
        if let Some(note) = rules.contraindication_note(code) {
            println!("  Note: {}", note);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn status_line(safe: bool, found: bool) -> &'static str {
    match (safe, found) {
        (false, _) => "BLOCKED",
        (true, true) => "CAUTION",
        (true, false) => "OK",
    }
}

fn display_decision(decision: &AggregateDecision) {
    println!("\n╭─────────────────────────────────────────╮");
    if decision.overall_safe {
        println!("│  SAFE TO PRESCRIBE");
    } else {
        println!("│  NOT SAFE TO PRESCRIBE");
    }
    println!("╰─────────────────────────────────────────╯");
    println!();
    println!(
        "  {} ({}) for patient {}",
        decision.medication_name, decision.medication_code, decision.patient_id
    );
    println!();

    let dup = &decision.duplicate_therapy;
    let ci = &decision.contraindications;
    let ix = &decision.drug_interactions;

    println!(
        "  Duplicate therapy:  {}",
        status_line(dup.safe_to_prescribe, dup.is_duplicate)
    );
    if dup.is_duplicate {
        println!("    {}", dup.warning_message);
    }
    println!(
        "  Contraindications:  {}",
        status_line(ci.safe_to_prescribe, ci.found())
    );
    if ci.found() {
        println!("    {}", ci.warning_message);
    }
    println!(
        "  Drug interactions:  {}",
        status_line(ix.safe_to_prescribe, ix.found())
    );
    if ix.found() {
        println!("    {}", ix.warning_message);
    }

    println!();
    println!("  → {}", decision.recommendation);
    println!();
    println!("  ℹ {}", decision.screening_note);
    println!("  Decision {}", decision.decision_id);
    println!();
}

fn display_report(report: &MonitoringReport) {
    println!("\nMonitoring report for patient {}", report.patient_id);
    println!("─────────────────────────────────────────");

    if report.critical_alerts.is_empty() {
        println!("  No critical values");
    } else {
        println!("  Critical values:");
        for alert in &report.critical_alerts {
            println!("  [{}] {}", alert.severity, alert.title);
            println!("    {}", alert.message);
            println!("    → {}", alert.recommendation);
        }
    }

    println!();

    if report.care_gaps.is_empty() {
        println!("  No care gaps");
    } else {
        println!("  Care gaps:");
        for gap in &report.care_gaps {
            println!("  [{}] {}", gap.priority, gap.gap_type);
            println!("    {}", gap.message);
        }
    }

    println!();
}
