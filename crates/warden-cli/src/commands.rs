use chrono::Utc;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_autonomy::{ExecutePlanOptions, PlanExecutionResult};
use warden_config::{ConfigLoader, WardenConfig, WarningSeverity};
use warden_core::{Initiator, Result, WardenError};
use warden_goals::{DispatchOptions, DispatchOutcome, GoalDriver, GoalManagerState, TickSummary};

use crate::context::{ControlPlane, init_tracing};

/// Warden: autonomous goal control plane for L2 infrastructure operations
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file describing the simulated environment; written back after
    /// commands that execute plans
    #[arg(short, long, global = true)]
    world: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect signals, generate and prioritize candidates, enqueue admitted goals
    Tick {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the top queued goal (or a named one) through plan and execution
    Dispatch {
        /// Dispatch this goal instead of the highest-priority one
        #[arg(long)]
        goal_id: Option<String>,
        /// Grant human approval up front
        #[arg(long)]
        approve: bool,
        /// Execute for real instead of a dry run
        #[arg(long)]
        execute: bool,
        /// Permit write steps
        #[arg(long)]
        allow_writes: bool,
        /// Never prompt for approval
        #[arg(long)]
        no_prompt: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the queue, recent candidates and suppressions
    State {
        /// Number of records per collection
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a plan for a free-text goal, optionally executing it
    Plan {
        /// The goal, e.g. "stabilize the sequencer under load"
        goal: String,
        /// Execute the plan (dry run unless --allow-writes)
        #[arg(long)]
        execute: bool,
        /// Permit write steps when executing
        #[arg(long, requires = "execute")]
        allow_writes: bool,
        /// Grant human approval for write steps
        #[arg(long, requires = "execute")]
        approve: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the tick and dispatch loops until Ctrl+C
    Run,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Audit configuration for unsafe or inconsistent settings
    Doctor,
    /// Show version and build info
    Version,
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level.clone().unwrap_or_else(|| config.logging.level.clone())
        };
        init_tracing(&log_level, &config.logging.format);

        let world = self.world;
        match self.command {
            Commands::Tick { json } => {
                let plane = ControlPlane::build(config, world.as_deref())?;
                Self::cmd_tick(&plane, json).await
            }
            Commands::Dispatch {
                goal_id,
                approve,
                execute,
                allow_writes,
                no_prompt,
                json,
            } => {
                let plane = ControlPlane::build(config, world.as_deref())?;
                let options = DispatchOptions {
                    goal_id,
                    approved: approve,
                    dry_run: execute.then_some(false),
                    allow_writes: allow_writes.then_some(true),
                    ..DispatchOptions::operator()
                };
                let prompt = !no_prompt && !json && std::io::stdin().is_terminal();
                Self::cmd_dispatch(&plane, options, prompt, json).await?;
                plane.save_world(world.as_deref())
            }
            Commands::State { limit, json } => {
                let plane = ControlPlane::build(config, world.as_deref())?;
                Self::cmd_state(&plane, limit, json)
            }
            Commands::Plan {
                goal,
                execute,
                allow_writes,
                approve,
                json,
            } => {
                let plane = ControlPlane::build(config, world.as_deref())?;
                let options = execute.then_some(ExecutePlanOptions {
                    dry_run: !allow_writes,
                    allow_writes,
                    initiated_by: Initiator::Operator,
                    approved: approve,
                    confidence: None,
                });
                Self::cmd_plan(&plane, &goal, options, json).await?;
                plane.save_world(world.as_deref())
            }
            Commands::Run => {
                let plane = ControlPlane::build(config, world.as_deref())?;
                Self::cmd_run(&plane).await?;
                plane.save_world(world.as_deref())
            }
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config, world.as_deref()),
            Commands::Version => Self::cmd_version(),
        }
    }

    async fn cmd_tick(plane: &ControlPlane, json: bool) -> Result<()> {
        let summary = plane.manager.tick_goal_manager(Utc::now()).await?;
        if json {
            return print_json(&summary);
        }
        print_tick(&summary);
        Ok(())
    }

    async fn cmd_dispatch(
        plane: &ControlPlane,
        options: DispatchOptions,
        prompt: bool,
        json: bool,
    ) -> Result<()> {
        let mut outcome = plane.manager.dispatch_top_goal(&options).await?;

        if let DispatchOutcome::ApprovalRequired { goal_id, decision } = &outcome
            && prompt
        {
            println!("Goal {goal_id} needs approval: {}", decision.message);
            let approved = dialoguer::Confirm::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .with_prompt("Approve and dispatch now?")
                .default(false)
                .interact()
                .map_err(|e| WardenError::Other(e.into()))?;
            if approved {
                info!(goal_id = %goal_id, "approval granted interactively");
                let retry = DispatchOptions {
                    goal_id: Some(goal_id.clone()),
                    approved: true,
                    ..options
                };
                outcome = plane.manager.dispatch_top_goal(&retry).await?;
            }
        }

        if json {
            return print_json(&outcome);
        }
        print_outcome(&outcome);
        Ok(())
    }

    fn cmd_state(plane: &ControlPlane, limit: Option<usize>, json: bool) -> Result<()> {
        let state = plane.manager.list_goal_manager_state(limit)?;
        if json {
            return print_json(&state);
        }
        print_state(&state);
        Ok(())
    }

    async fn cmd_plan(
        plane: &ControlPlane,
        goal: &str,
        execute: Option<ExecutePlanOptions>,
        json: bool,
    ) -> Result<()> {
        let dry_run = execute.as_ref().is_none_or(|o| o.dry_run);
        let plan = plane.manager.build_goal_plan(goal, dry_run).await;

        let Some(options) = execute else {
            if json {
                return print_json(&plan);
            }
            println!("Plan {} ({}, {:?}, source {:?})", plan.plan_id, plan.intent, plan.status, plan.source);
            println!("   {}", plan.summary);
            for (i, step) in plan.steps.iter().enumerate() {
                let approval = if step.requires_approval { "  [approval]" } else { "" };
                println!("   {}. {} ({} risk): {}{}", i + 1, step.action, step.risk, step.title, approval);
            }
            for issue in &plan.issues {
                println!("   ! {issue}");
            }
            if let Some(reason) = &plan.llm_fallback_reason {
                println!("   model fallback: {reason}");
            }
            return Ok(());
        };

        let result = plane.manager.execute_goal_plan(&plan, &options).await;
        if json {
            return print_json(&result);
        }
        print_execution(&result);
        Ok(())
    }

    async fn cmd_run(plane: &ControlPlane) -> Result<()> {
        let goals = &plane.config.goal_manager;
        println!("Warden v{}", env!("CARGO_PKG_VERSION"));
        println!("   Model: {}", plane.config.agent.model);
        println!("   Autonomy: A{}", plane.config.autonomy.level);
        println!(
            "   Dispatch: {} (dry run {}, writes {})",
            if goals.dispatch_enabled { "enabled" } else { "disabled" },
            goals.dry_run,
            goals.allow_writes
        );
        println!();

        let token = CancellationToken::new();
        let ctrl_c = token.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received, shutting down");
            ctrl_c.cancel();
        });

        GoalDriver::from_config(Arc::clone(&plane.manager), goals)
            .run(token)
            .await;
        Ok(())
    }

    fn cmd_config(config: &WardenConfig, json: bool) -> Result<()> {
        if json {
            return print_json(config);
        }
        println!(
            "{}",
            toml::to_string_pretty(config).map_err(|e| WardenError::Config(e.to_string()))?
        );
        Ok(())
    }

    fn cmd_doctor(config: &WardenConfig, world: Option<&std::path::Path>) -> Result<()> {
        println!("Warden Doctor: configuration audit");
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        let mut ok_count = 0;
        if config.services.has_ai_provider_key() {
            ok_count += 1;
        } else {
            println!("  [info] services: no model provider key, candidates and plans stay rule-based");
            info_count += 1;
        }
        if config.autonomy.read_only_mode {
            println!("  [info] autonomy.read_only_mode: stabilize, recover and cost goals will be suppressed");
            info_count += 1;
        } else {
            ok_count += 1;
        }
        match world {
            Some(path) if !path.exists() => {
                println!("  [warning] --world: {} does not exist", path.display());
                warn_count += 1;
            }
            Some(_) => ok_count += 1,
            None => {}
        }

        println!();
        println!("  {ok_count} checks passed, {warn_count} warnings, {info_count} suggestions");
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("warden {}", env!("CARGO_PKG_VERSION"));
        println!("   target: {}", std::env::consts::ARCH);
        println!("   os: {}", std::env::consts::OS);
        Ok(())
    }
}

fn print_tick(summary: &TickSummary) {
    if !summary.ran {
        println!("Goal manager is disabled (goal_manager.enabled = false)");
        return;
    }
    println!("Tick on snapshot {}", summary.snapshot_id.as_deref().unwrap_or("-"));
    println!(
        "   generated {}, queued {}, suppressed {}, expired {}",
        summary.generated_count, summary.queued_count, summary.suppressed_count, summary.expired_count
    );
    println!("   queue depth: {}", summary.queue_depth);
    if summary.llm_enhanced {
        println!("   candidates rewritten by model");
    } else if let Some(reason) = &summary.llm_fallback_reason {
        println!("   model enhancement skipped: {reason}");
    }
}

fn print_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Disabled => {
            println!("Dispatch is disabled (goal_manager.dispatch_enabled = false)")
        }
        DispatchOutcome::Idle => println!("Nothing to dispatch"),
        DispatchOutcome::Busy { active_goal_id } => {
            println!("Busy: {active_goal_id} is still running")
        }
        DispatchOutcome::Denied { goal_id, decision } => println!(
            "Denied {goal_id}: {} ({})",
            decision.message, decision.reason_code
        ),
        DispatchOutcome::ApprovalRequired { goal_id, decision } => {
            println!("Approval required for {goal_id}: {}", decision.message);
            println!("   Re-run with: warden dispatch --goal-id {goal_id} --approve");
        }
        DispatchOutcome::Completed { goal_id, execution } => {
            println!("Completed {goal_id}");
            print_execution(execution);
        }
        DispatchOutcome::Failed {
            goal_id,
            reason,
            execution,
        } => {
            println!("Failed {goal_id}: {reason}");
            if let Some(execution) = execution {
                print_execution(execution);
            }
        }
    }
}

fn print_execution(result: &PlanExecutionResult) {
    println!(
        "   plan {} ({:?}, dry run {})",
        result.plan.plan_id, result.plan.status, result.plan.dry_run
    );
    for entry in &result.log {
        println!("   - {} [{:?}] {}", entry.action, entry.status, entry.message);
        if let Some(rollback) = &entry.rollback {
            println!("     rollback: {}", rollback.message);
        }
    }
    if let Some(reason) = &result.abort_reason {
        println!("   aborted: {reason}");
    }
}

fn print_state(state: &GoalManagerState) {
    match (&state.active_goal_id, state.active_since) {
        (Some(id), Some(since)) => println!("Active goal: {id} (since {since})"),
        (Some(id), None) => println!("Active goal: {id}"),
        _ => println!("Active goal: none"),
    }
    println!("Queue depth: {}", state.queue_depth);
    println!();

    println!("Queue:");
    if state.queue.is_empty() {
        println!("   (empty)");
    }
    for item in &state.queue {
        let pending = if item.approval_pending { "  [awaiting approval]" } else { "" };
        println!(
            "   {} {:>3} {:<9} {} ({} risk){}",
            item.goal_id, item.score.total, item.status, item.goal, item.risk, pending
        );
        if let Some(err) = &item.last_error {
            println!("      last error: {err}");
        }
    }
    println!();

    println!("Recent candidates:");
    for c in &state.candidates {
        let reason = c
            .suppression_reason
            .map(|r| format!(" ({r})"))
            .unwrap_or_default();
        println!(
            "   {} {:?}{} {} [{} / {}]",
            c.id, c.status, reason, c.goal, c.intent, c.source
        );
    }
    println!();

    println!("Recent suppressions:");
    for s in &state.suppressions {
        println!("   {} {}: {}", s.timestamp.format("%H:%M:%S"), s.reason_code, s.message);
    }
}
