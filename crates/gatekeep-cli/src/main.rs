//! Gatekeep - governed, audited AI-assisted repository changes
//!
//! The `gatekeep` command walks a repository through the governed workflow:
//! plans are registered as artifacts, approved, and only then executed.
//!
//! ## Commands
//!
//! - `init` / `status` / `diagnose` / `resume`: set up and inspect the project
//! - `plan` / `approve` / `revoke` / `modify` / `lock`: artifact lifecycle
//! - `scaffold` / `refactor`: run an approved plan, dry-run by default
//! - `impl` / `review` / `apply`: propose, review and apply raw diffs
//! - `validate` / `log`: run the test suite and read the audit trail

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gatekeep_core::{
    DiffStatus, ExecutionMode, ExecutionResult, GatedCommand, GatekeepError, Project,
};
use gatekeep_state::ArtifactType;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::Level;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "gatekeep")]
#[command(author = "Gatekeep Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Governed, audited AI-assisted repository modification", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output and JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Repository root to govern
    #[arg(long, global = true, default_value = ".", env = "GATEKEEP_ROOT")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the governance directories and default config
    Init,

    /// Show the current phase, artifacts and lock state
    Status,

    /// Register a DRAFT plan artifact from a JSON payload file
    Plan {
        /// Artifact type: project, architecture, scaffold, tests, implementation, refactor, reconciliation
        artifact_type: String,

        /// JSON file holding the payload
        #[arg(short, long)]
        payload: PathBuf,

        /// Ids of APPROVED artifacts this one depends on
        #[arg(long = "depends-on")]
        depends_on: Vec<Uuid>,

        /// Author recorded on the artifact
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Approve a DRAFT artifact
    Approve {
        id: Uuid,

        /// Approver recorded in the approval log
        #[arg(long)]
        by: Option<String>,
    },

    /// Return an APPROVED artifact to DRAFT
    Revoke {
        id: Uuid,

        /// Confirm the revocation
        #[arg(long)]
        yes: bool,
    },

    /// Merge a JSON object into a DRAFT artifact's payload
    Modify {
        id: Uuid,

        /// JSON file holding the fields to update
        #[arg(short, long)]
        updates: PathBuf,
    },

    /// Run an APPROVED scaffold plan (dry-run unless --apply)
    Scaffold {
        /// Artifact id or path relative to the root
        reference: String,

        #[arg(long)]
        apply: bool,
    },

    /// Lock an APPROVED test plan and snapshot its test files. Irreversible.
    Lock {
        id: Uuid,

        /// Confirm the lock
        #[arg(long)]
        yes: bool,
    },

    /// Propose a raw diff for review
    Impl {
        /// File the diff is aimed at
        #[arg(long)]
        target: String,

        /// Unified diff file
        #[arg(long)]
        patch: PathBuf,

        /// APPROVED implementation plan authorizing extra files
        #[arg(long)]
        plan: Option<Uuid>,
    },

    /// Review proposed diffs
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Apply an APPROVED diff
    Apply {
        diff_id: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// Check or run an APPROVED refactor plan
    Refactor {
        #[command(subcommand)]
        action: RefactorAction,
    },

    /// Run the test suite and record a VALIDATION_RESULT
    Validate {
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Report language, capabilities, phase and lock state
    Diagnose,

    /// Show the current phase and the suggested next command
    Resume,

    /// Show executor audit history
    Log {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Only entries for this artifact or diff reference
        #[arg(long)]
        artifact: Option<String>,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// List diffs, optionally by status
    List {
        #[arg(long, value_enum)]
        status: Option<ReviewStatus>,
    },
    /// Approve a PENDING diff
    Approve { id: Uuid },
    /// Reject a PENDING diff
    Reject { id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

impl From<ReviewStatus> for DiffStatus {
    fn from(status: ReviewStatus) -> Self {
        match status {
            ReviewStatus::Pending => DiffStatus::Pending,
            ReviewStatus::Approved => DiffStatus::Approved,
            ReviewStatus::Rejected => DiffStatus::Rejected,
            ReviewStatus::Applied => DiffStatus::Applied,
        }
    }
}

#[derive(Subcommand)]
enum RefactorAction {
    /// Validate the plan without archiving a diff
    Check { reference: String },
    /// Archive the diff and preview the changes
    DryRun { reference: String },
    /// Archive the diff and apply the changes
    Apply { reference: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gatekeep_core::init_tracing(cli.json, level);

    if let Err(err) = run(cli).await {
        std::process::exit(report(&err));
    }
}

/// Print a failed command and pick its exit code.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<GatekeepError>() {
        Some(e) => {
            eprintln!("error: {e}");
            if let Some(remedy) = e.remedy() {
                eprintln!("  next: {remedy}");
            }
            e.exit_code()
        }
        None => {
            eprintln!("error: {err:#}");
            1
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let project = Project::open(&cli.root)?;
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            project.check(GatedCommand::Init)?;
            cmd_init(&project, json)
        }
        Commands::Status => {
            project.check(GatedCommand::Status)?;
            let status = project.status()?;
            print_or_json(json, &status, || {
                println!("Phase: {}", status.phase);
                println!("Next:  {}", status.next_step);
                println!(
                    "Lock:  {}",
                    if status.lock.valid { "intact" } else { "MODIFIED" }
                );
                for file in &status.lock.modified {
                    println!("  modified: {file}");
                }
                println!("Pending diffs: {}", status.pending_diffs);
                println!("Artifacts:");
                for entry in &status.artifacts {
                    println!("  {} {:<20} {}", entry.id, entry.artifact_type, entry.status);
                }
            })
        }
        Commands::Plan {
            artifact_type,
            payload,
            depends_on,
            author,
        } => {
            let artifact_type: ArtifactType =
                artifact_type.parse().map_err(GatekeepError::Storage)?;
            if let Some(command) = GatedCommand::plan(artifact_type) {
                project.check(command)?;
            }
            let payload = read_json(&payload)?;
            let env = project.register(artifact_type, payload, author.as_deref(), depends_on)?;
            print_or_json(json, &env.to_raw()?, || {
                println!("Registered {} {} (DRAFT)", env.artifact_type(), env.id());
                println!("Approve with: gatekeep approve {}", env.id());
            })
        }
        Commands::Approve { id, by } => {
            project.check(GatedCommand::Approve)?;
            let env = project.approve(id, by.as_deref())?;
            print_or_json(json, &env.to_raw()?, || {
                println!("Approved {} {}", env.artifact_type(), env.id());
            })
        }
        Commands::Revoke { id, yes } => {
            project.check(GatedCommand::Revoke)?;
            let env = project.revoke(id, yes)?;
            print_or_json(json, &env.to_raw()?, || {
                println!("Revoked {} {} (back to DRAFT)", env.artifact_type(), env.id());
            })
        }
        Commands::Modify { id, updates } => {
            project.check(GatedCommand::Modify)?;
            let updates = read_json(&updates)?;
            let env = project.modify(id, &updates)?;
            print_or_json(json, &env.to_raw()?, || {
                println!("Modified {} (version {})", env.id(), env.version());
            })
        }
        Commands::Scaffold { reference, apply } => {
            project.check(GatedCommand::Scaffold)?;
            let mode = if apply {
                ExecutionMode::Apply
            } else {
                ExecutionMode::DryRun
            };
            let result = project.scaffold(&reference, mode).await;
            finish(json, result)
        }
        Commands::Lock { id, yes } => {
            project.check(GatedCommand::Lock)?;
            let env = project.lock_tests(id, yes)?;
            print_or_json(json, &env.to_raw()?, || {
                println!("Locked test plan {}", env.id());
            })
        }
        Commands::Impl {
            target,
            patch,
            plan,
        } => {
            project.check(GatedCommand::Impl)?;
            let content = std::fs::read_to_string(&patch)
                .with_context(|| format!("Failed to read patch file: {}", patch.display()))?;
            let diff = project.propose_diff(&target, &content, plan)?;
            print_or_json(json, &diff, || {
                println!("Proposed diff {} for {} (PENDING)", diff.id, diff.target_file);
                println!("Review with: gatekeep review approve {}", diff.id);
            })
        }
        Commands::Review { action } => {
            project.check(GatedCommand::Review)?;
            cmd_review(&project, action, json)
        }
        Commands::Apply { diff_id, dry_run } => {
            project.check(GatedCommand::Apply)?;
            let mode = if dry_run {
                ExecutionMode::DryRun
            } else {
                ExecutionMode::Apply
            };
            let result = project.apply_diff(&diff_id, mode).await;
            finish(json, result)
        }
        Commands::Refactor { action } => cmd_refactor(&project, action, json).await,
        Commands::Validate { author } => {
            project.check(GatedCommand::Validate)?;
            let env = project.validate(author.as_deref()).await?;
            print_or_json(json, &env.to_raw()?, || {
                if let gatekeep_state::ArtifactPayload::ValidationResult(r) = env.payload() {
                    println!(
                        "Validation {}: exit code {:?}, lock {}",
                        if r.passed { "PASSED" } else { "FAILED" },
                        r.exit_code,
                        if r.lock_valid { "intact" } else { "MODIFIED" }
                    );
                    if !r.output_tail.is_empty() {
                        println!("{}", r.output_tail.trim_end());
                    }
                }
                println!("Recorded as {} (DRAFT)", env.id());
            })
        }
        Commands::Diagnose => {
            project.check(GatedCommand::Diagnose)?;
            let report = project.diagnose()?;
            print_or_json(json, &report, || {
                println!("Language: {}", report.language);
                println!("Phase:    {}", report.phase);
                println!("Capabilities:");
                for (op, status) in &report.capabilities {
                    println!("  {op:<14} {status}");
                }
                println!(
                    "Lock:     {}",
                    if report.lock.valid { "intact" } else { "MODIFIED" }
                );
                println!("Artifacts:");
                for (artifact_type, counts) in &report.artifact_counts {
                    for (status, n) in counts {
                        println!("  {artifact_type:<20} {status:<9} {n}");
                    }
                }
                println!("Pending diffs: {}", report.pending_diffs);
                println!("Recent executions:");
                for e in &report.recent_executions {
                    println!(
                        "  {} {} {} {:?}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        e.executor,
                        e.artifact_ref,
                        e.outcome
                    );
                }
            })
        }
        Commands::Resume => {
            project.check(GatedCommand::Resume)?;
            let resume = project.resume()?;
            print_or_json(json, &resume, || {
                println!("Phase: {}", resume.phase);
                println!("Next:  {}", resume.next_step);
            })
        }
        Commands::Log { limit, artifact } => {
            project.check(GatedCommand::Log)?;
            let entries = project.log(limit, artifact.as_deref())?;
            print_or_json(json, &entries, || {
                if entries.is_empty() {
                    println!("No executions recorded");
                }
                for e in &entries {
                    println!(
                        "{} {:<9} {:<8} {:?} {}",
                        e.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                        e.executor,
                        e.mode,
                        e.outcome,
                        e.artifact_ref
                    );
                    if let Some(err) = &e.error {
                        println!("    error: {err}");
                    }
                    if let Some(path) = &e.diff_path {
                        println!("    diff:  {path}");
                    }
                }
            })
        }
    }
}

fn cmd_init(project: &Project, json: bool) -> Result<()> {
    let created = project.init()?;
    print_or_json(json, &created, || {
        println!("Initialized Gatekeep project at {}", project.root().display());
        for path in &created {
            println!("  created {}", path.display());
        }
    })
}

fn cmd_review(project: &Project, action: ReviewAction, json: bool) -> Result<()> {
    match action {
        ReviewAction::List { status } => {
            let diffs = project.review_list(status.map(DiffStatus::from))?;
            print_or_json(json, &diffs, || {
                if diffs.is_empty() {
                    println!("No diffs");
                }
                for d in &diffs {
                    println!("{} {:<8} {}", d.id, d.status, d.target_file);
                }
            })
        }
        ReviewAction::Approve { id } => {
            let diff = project.review_approve(id)?;
            print_or_json(json, &diff, || println!("Diff {} APPROVED", diff.id))
        }
        ReviewAction::Reject { id } => {
            let diff = project.review_reject(id)?;
            print_or_json(json, &diff, || println!("Diff {} REJECTED", diff.id))
        }
    }
}

async fn cmd_refactor(project: &Project, action: RefactorAction, json: bool) -> Result<()> {
    match action {
        RefactorAction::Check { reference } => {
            project.check(GatedCommand::RefactorCheck)?;
            let files = project
                .refactor_check(&reference)
                .await
                .map_err(GatekeepError::from)?;
            print_or_json(json, &files, || {
                println!("Refactor plan {reference} passes all checks");
                for f in &files {
                    println!("  would touch {f}");
                }
            })
        }
        RefactorAction::DryRun { reference } => {
            project.check(GatedCommand::RefactorDryRun)?;
            finish(json, project.refactor(&reference, ExecutionMode::DryRun).await)
        }
        RefactorAction::Apply { reference } => {
            project.check(GatedCommand::RefactorApply)?;
            finish(json, project.refactor(&reference, ExecutionMode::Apply).await)
        }
    }
}

/// Print an execution result and turn a failure into the command's error.
fn finish(json: bool, mut result: ExecutionResult) -> Result<()> {
    let error = result.error.take();
    print_or_json(json, &result, || {
        for line in &result.logs {
            println!("{line}");
        }
        for path in &result.diff_paths {
            println!("Diff: {}", path.display());
        }
    })?;
    match error {
        Some(e) => Err(GatekeepError::from(e).into()),
        None => Ok(()),
    }
}

fn print_or_json<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_refactor_subcommands_parse() {
        let cli = Cli::try_parse_from(["gatekeep", "refactor", "dry-run", "plans/r.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Refactor {
                action: RefactorAction::DryRun { .. }
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gatekeep", "status", "--json", "--root", "/tmp/x"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.root, PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_gatekeep_errors_keep_their_exit_code() {
        let err: anyhow::Error = GatekeepError::Phase(gatekeep_core::PhaseError::ConfirmationRequired {
            action: "lock".into(),
        })
        .into();
        assert_eq!(report(&err), 2);
        assert_eq!(report(&anyhow::anyhow!("plain failure")), 1);
    }
}
