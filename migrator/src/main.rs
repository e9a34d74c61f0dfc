//! Billing account migrator.
//!
//! Moves projects onto a single target billing account, labels each one with
//! the account it came from, and records every applied change in an operation
//! log that `--revert` can replay backwards. Everything defaults to dry run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{ArgGroup, Parser};

use billing_migrator::core::types::{BillingAccountRef, ProjectRef};
use billing_migrator::exit_codes;
use billing_migrator::inspect::{audit_billing_info, describe_project};
use billing_migrator::io::cloud::StateFileCloud;
use billing_migrator::io::config::{DEFAULT_CONFIG_FILE, MigratorConfig, load_config};
use billing_migrator::logging;
use billing_migrator::migrate::{MigrationOutcome, MigrationRequest, run_migration};
use billing_migrator::revert::{RevertOutcome, RevertRequest, run_revert};

#[derive(Parser, Debug)]
#[command(
    name = "billing-migrator",
    version,
    about = "Migrate projects to a target billing account, labeling each with its original billing account id"
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["migrate", "revert", "audit", "describe_project"])
))]
struct Cli {
    /// Move projects to the target billing account.
    #[arg(long)]
    migrate: bool,

    /// Revert the changes recorded in an operation log.
    #[arg(long, value_name = "LOG")]
    revert: Option<PathBuf>,

    /// Report projects whose billing info cannot be retrieved.
    #[arg(long)]
    audit: bool,

    /// Print a project's billing account and labels.
    #[arg(long, value_name = "PROJECT_ID")]
    describe_project: Option<String>,

    /// Target billing account (e.g. billingAccounts/0X0X0X-0X0X0X-0X0X0X).
    #[arg(long, value_name = "ID", required_if_eq("migrate", "true"))]
    target_billing_id: Option<String>,

    /// Only process projects on this source billing account.
    #[arg(long, value_name = "ID", conflicts_with_all = ["revert", "describe_project"])]
    source_billing_id: Option<String>,

    /// Label key for storing the original billing id.
    #[arg(long, value_name = "KEY")]
    original_billing_id_label_key: Option<String>,

    /// Apply changes. Without this flag every action is a dry run.
    #[arg(long)]
    no_dry_run: bool,

    /// Configuration file (TOML).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// JSON document holding the billing account and project state.
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Directory for operation logs.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

/// Settings after merging the config file with CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    label_key: String,
    log_dir: PathBuf,
    state_file: PathBuf,
}

fn main() {
    logging::init();
    let code = match Cli::try_parse() {
        Ok(cli) => match run(cli) {
            Ok(code) => code,
            Err(err) => {
                eprintln!("error: {err:#}");
                exit_codes::INVALID
            }
        },
        Err(err) => {
            let _ = err.print();
            if err.use_stderr() {
                exit_codes::INVALID
            } else {
                exit_codes::OK
            }
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let cfg = load_config(&config_path)?;
    let settings = resolve_settings(&cli, cfg)?;
    let cloud = StateFileCloud::new(&settings.state_file);
    let dry_run = !cli.no_dry_run;

    if cli.migrate {
        let target = cli
            .target_billing_id
            .as_deref()
            .context("--target-billing-id is required with --migrate")?;
        let request = MigrationRequest {
            target: BillingAccountRef::new(target),
            source: cli.source_billing_id.as_deref().map(BillingAccountRef::new),
            label_key: settings.label_key,
            dry_run,
            log_dir: settings.log_dir,
        };
        let outcome = run_migration(&cloud, &request)?;
        print_migration(&outcome);
        return Ok(exit_code(outcome.is_success()));
    }

    if let Some(log_path) = &cli.revert {
        let outcome = run_revert(
            &cloud,
            &RevertRequest {
                log_path: log_path.clone(),
                dry_run,
            },
        )?;
        print_revert(log_path, &outcome);
        return Ok(exit_code(outcome.is_success()));
    }

    if cli.audit {
        let source = cli.source_billing_id.as_deref().map(BillingAccountRef::new);
        let report = audit_billing_info(&cloud, source.as_ref())?;
        println!(
            "audit: accounts={} projects={} inaccessible={} failed_sources={}",
            report.accounts_scanned,
            report.projects_scanned,
            report.inaccessible.len(),
            report.failed_sources.len()
        );
        for entry in &report.inaccessible {
            println!(
                "inaccessible: project={} listed_under={} error={}",
                entry.project, entry.listed_under, entry.message
            );
        }
        for failure in &report.failed_sources {
            println!("failed-source: {failure}");
        }
        return Ok(exit_code(report.is_clean()));
    }

    if let Some(project) = &cli.describe_project {
        let details = describe_project(&cloud, &ProjectRef::new(project.as_str()))?;
        print!("{}", details.render());
        return Ok(exit_codes::OK);
    }

    Err(anyhow!("no action selected"))
}

fn resolve_settings(cli: &Cli, cfg: MigratorConfig) -> Result<Settings> {
    let merged = MigratorConfig {
        label_key: cli
            .original_billing_id_label_key
            .clone()
            .unwrap_or(cfg.label_key),
        log_dir: cli.log_dir.clone().unwrap_or(cfg.log_dir),
        state_file: cli.state_file.clone().or(cfg.state_file),
    };
    merged.validate()?;
    let state_file = merged
        .state_file
        .context("no state file configured (pass --state-file or set state_file in the config)")?;
    Ok(Settings {
        label_key: merged.label_key,
        log_dir: merged.log_dir,
        state_file,
    })
}

fn exit_code(success: bool) -> i32 {
    if success {
        exit_codes::OK
    } else {
        exit_codes::PARTIAL_FAILURE
    }
}

fn print_migration(outcome: &MigrationOutcome) {
    let mode = if outcome.dry_run { "dry-run" } else { "live" };
    println!(
        "migrate: mode={} candidates={} planned={}",
        mode,
        outcome.candidates,
        outcome.plans.len()
    );
    if outcome.dry_run {
        for plan in &outcome.plans {
            let label = plan
                .label
                .as_ref()
                .map(|label| format!("{}:{}", label.key, label.value))
                .unwrap_or_else(|| "unchanged".to_string());
            let billing = plan
                .billing
                .as_ref()
                .map(|billing| format!("{}->{}", billing.from, billing.to))
                .unwrap_or_else(|| "unchanged".to_string());
            println!(
                "plan: project={} label={} billing={}",
                plan.project, label, billing
            );
        }
    } else {
        println!(
            "migrate: completed={} applied={}",
            outcome.completed, outcome.applied
        );
    }
    if let Some(path) = &outcome.log_path {
        println!("migrate: log={}", path.display());
    }
    println!(
        "migrate: failed_sources={} failed_projects={}",
        outcome.failed_sources.len(),
        outcome.failed_projects.len()
    );
    for failure in &outcome.failed_sources {
        println!("failed-source: {failure}");
    }
    for failure in &outcome.failed_projects {
        println!("failed-project: {failure}");
    }
}

fn print_revert(log_path: &Path, outcome: &RevertOutcome) {
    let mode = if outcome.dry_run { "dry-run" } else { "live" };
    println!(
        "revert: mode={} log={} actions={}",
        mode,
        log_path.display(),
        outcome.actions.len()
    );
    if outcome.dry_run {
        for action in &outcome.actions {
            println!("plan: {}", action.describe());
        }
    } else {
        println!(
            "revert: applied={} unchanged={} failed={}",
            outcome.applied,
            outcome.unchanged,
            outcome.failures.len()
        );
    }
    for failure in &outcome.failures {
        println!("failed-project: {failure}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_migrate() {
        let cli = Cli::parse_from([
            "billing-migrator",
            "--migrate",
            "--target-billing-id",
            "999-ZZZ",
        ]);
        assert!(cli.migrate);
        assert!(!cli.no_dry_run);
        assert_eq!(cli.target_billing_id.as_deref(), Some("999-ZZZ"));
    }

    #[test]
    fn migrate_requires_target() {
        let err = Cli::try_parse_from(["billing-migrator", "--migrate"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn actions_are_mutually_exclusive() {
        let err = Cli::try_parse_from([
            "billing-migrator",
            "--migrate",
            "--target-billing-id",
            "999-ZZZ",
            "--revert",
            "log.json",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn an_action_is_required() {
        let err = Cli::try_parse_from(["billing-migrator", "--no-dry-run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn source_filter_conflicts_with_revert() {
        let err = Cli::try_parse_from([
            "billing-migrator",
            "--revert",
            "log.json",
            "--source-billing-id",
            "111-AAA",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "billing-migrator",
            "--audit",
            "--original-billing-id-label-key",
            "prev-billing",
            "--state-file",
            "cli.json",
        ]);
        let cfg = MigratorConfig {
            label_key: "from-config".to_string(),
            log_dir: PathBuf::from("logs"),
            state_file: Some(PathBuf::from("config.json")),
        };
        let settings = resolve_settings(&cli, cfg).expect("settings");
        assert_eq!(
            settings,
            Settings {
                label_key: "prev-billing".to_string(),
                log_dir: PathBuf::from("logs"),
                state_file: PathBuf::from("cli.json"),
            }
        );
    }

    #[test]
    fn missing_state_file_is_an_error() {
        let cli = Cli::parse_from(["billing-migrator", "--audit"]);
        let err = resolve_settings(&cli, MigratorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("no state file"));
    }
}
