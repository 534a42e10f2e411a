//! # Agent Workflows
//!
//! Command-line runner for the sample workflows built on `workflow-engine`.
//!
//! Every sample uses offline agents, so the commands run without any model
//! provider:
//! - `sequential`: a three stage text pipeline
//! - `concurrent`: fan-out statistics joined by a fan-in aggregator
//! - `branching`: spam detection routed through a switch-case
//! - `multi-selection`: spam detection where every matching branch runs
//! - `checkpoints`: file checkpointing and resume
//! - `guessing`: a request/response loop with a human in it
//! - `world-cup`: a pundit panel joined with the user's own prediction
//! - `magentic`: a manager-led team with plan review
//! - `visualize`: Mermaid or DOT diagrams of any sample
//!
//! ## Quick Start
//! ```bash
//! cargo run -- sequential "hello world"
//! cargo run -- guessing --answers lower,higher,correct
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Offline sample agents
mod agents;

/// Configuration management
mod config;

/// Sample workflow graphs
mod scenarios;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use workflow_engine::magentic::ORCHESTRATOR_EVENT;
use workflow_engine::{
    FileCheckpointStore, MagenticPlanReviewReply, MagenticPlanReviewRequest, Message, RunState, Workflow,
    WorkflowEvent, WorkflowEventStream, WorkflowRunResult,
};

use crate::config::Config;
use crate::scenarios::{HumanFeedbackRequest, PredictionRequest, Sample};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "agent-workflows",
    version,
    about = "Run and visualize sample agent workflows",
    long_about = r#"
Agent Workflows - typed executor graphs on a superstep runtime.

Each subcommand builds one sample workflow, runs it and prints the event
stream as it happens. Human input (guess feedback, plan review) is read from
stdin unless scripted on the command line.

EXAMPLES:
  agent-workflows sequential "hello world"
  agent-workflows concurrent 3 5 8 13
  agent-workflows branching ./email.txt
  agent-workflows multi-selection ./email.txt
  agent-workflows world-cup --prediction "Brazil, France, Spain"
  agent-workflows checkpoints "resume me" --checkpoint-dir /tmp/cp
  agent-workflows magentic "Compare GPU energy use" --auto-approve
  agent-workflows visualize branching --format dot
"#
)]
struct Args {
    /// Enable verbose/debug logging and print every event
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,

    /// YAML file overlaying the runtime settings
    #[arg(long = "config", global = true, env = "WORKFLOW_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for file checkpoints (overrides WORKFLOW_CHECKPOINT_DIR)
    #[arg(long = "checkpoint-dir", global = true, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Uppercase twice, then reverse
    Sequential {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Average, sum and count computed in parallel
    Concurrent {
        #[arg(value_name = "NUMBERS", required = true, num_args = 1.., allow_negative_numbers = true)]
        numbers: Vec<i64>,
    },

    /// Classify an email and route it to the matching handler
    Branching {
        /// Path to an email file, or the email text itself
        #[arg(value_name = "EMAIL")]
        input: String,
    },

    /// Classify an email and run every branch that matches
    MultiSelection {
        /// Path to an email file, or the email text itself
        #[arg(value_name = "EMAIL")]
        input: String,
    },

    /// Run with file checkpoints, then resume from one
    Checkpoints {
        #[arg(value_name = "TEXT", required_unless_present = "resume")]
        text: Option<String>,

        /// Resume a checkpoint written by an earlier run instead
        #[arg(long, value_name = "CHECKPOINT_ID")]
        resume: Option<String>,
    },

    /// The agent guesses a number between 1 and 20
    Guessing {
        /// Scripted replies (higher, lower, correct), comma separated
        #[arg(long, value_delimiter = ',')]
        answers: Vec<String>,
    },

    /// Pundits and you predict the 2026 World Cup favorites
    WorldCup {
        /// Your top three, comma separated; an empty value keeps the default
        #[arg(long, value_name = "TEAMS")]
        prediction: Option<String>,
    },

    /// Manager-led team with plan review
    Magentic {
        #[arg(value_name = "TASK")]
        task: String,

        /// Approve the plan without asking
        #[arg(long)]
        auto_approve: bool,
    },

    /// Print the diagram of a sample workflow
    Visualize {
        #[arg(value_enum)]
        workflow: Sample,

        #[arg(long, value_enum, default_value_t = DiagramFormat::Mermaid)]
        format: DiagramFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DiagramFormat {
    Mermaid,
    Dot,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = &args.config {
        config.load_yaml(path)?;
    }
    if let Some(dir) = &args.checkpoint_dir {
        config.checkpoint_dir = dir.clone();
    }

    init_logging(&config.log_level, args.verbose)?;
    config.validate()?;

    info!(
        max_supersteps = config.workflow.max_supersteps,
        parallelism = config.workflow.parallelism,
        checkpoint_dir = %config.checkpoint_dir.display(),
        "Configuration loaded"
    );

    let started = Instant::now();
    let runner = Runner {
        config,
        verbose: args.verbose,
    };

    match runner.execute(args.command).await {
        Ok(()) => {
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "Command completed");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("\n{} {}", "❌ Workflow failed:".red().bold(), e);
            Err(e)
        }
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================

/// RUST_LOG wins over `--verbose`, which wins over LOG_LEVEL.
fn log_filter(level: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { level }))
}

fn init_logging(level: &str, verbose: bool) -> Result<()> {
    // Logs go to stderr so sample output stays readable on stdout
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(level, verbose))
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

// =============================================================================
// COMMANDS
// =============================================================================
struct Runner {
    config: Config,
    verbose: bool,
}

impl Runner {
    async fn execute(&self, command: Command) -> Result<()> {
        match command {
            Command::Sequential { text } => {
                print_header("Sequential Workflow", "➡️");
                let workflow = scenarios::sequential(&self.config.workflow)?;
                let _interrupt = InterruptGuard::watch(&workflow);
                let result = self.drive(workflow.run_streaming(text)).await?;
                print_outputs(&result);
            }

            Command::Concurrent { numbers } => {
                print_header("Concurrent Workflow", "🔀");
                let workflow = scenarios::concurrent(&self.config.workflow)?;
                let _interrupt = InterruptGuard::watch(&workflow);
                let result = self.drive(workflow.run_streaming(Message::json(json!(numbers)))).await?;
                print_outputs(&result);
            }

            Command::Branching { input } => {
                print_header("Branching Workflow", "🌿");
                let email = load_email(&input)?;
                print_box("Email", &email);
                let workflow = scenarios::branching(&self.config.workflow)?;
                let _interrupt = InterruptGuard::watch(&workflow);
                let result = self.drive(workflow.run_streaming(scenarios::email_request(&email)?)).await?;
                print_outputs(&result);
            }

            Command::MultiSelection { input } => {
                print_header("Multi-Selection Workflow", "🌳");
                let email = load_email(&input)?;
                print_box("Email", &email);
                let workflow = scenarios::multi_selection(&self.config.workflow)?;
                let _interrupt = InterruptGuard::watch(&workflow);
                let result = self.drive(workflow.run_streaming(scenarios::email_request(&email)?)).await?;
                print_outputs(&result);
            }

            Command::WorldCup { prediction } => {
                print_header("World Cup 2026 Panel", "⚽");
                self.world_cup(prediction).await?;
            }

            Command::Checkpoints { text, resume } => {
                print_header("Checkpointed Workflow", "💾");
                self.checkpoints(text, resume).await?;
            }

            Command::Guessing { answers } => {
                print_header("Number Guessing Workflow", "🎯");
                self.guessing(answers).await?;
            }

            Command::Magentic { task, auto_approve } => {
                print_header("Magentic Workflow", "🧭");
                self.magentic(task, auto_approve).await?;
            }

            Command::Visualize { workflow, format } => {
                let workflow = scenarios::build(workflow, &self.config.workflow)?;
                let diagram = match format {
                    DiagramFormat::Mermaid => workflow.to_mermaid(),
                    DiagramFormat::Dot => workflow.to_dot(),
                };
                println!("{}", diagram);
            }
        }

        Ok(())
    }

    /// Print events as they arrive and collect them.
    ///
    /// A failed or exhausted run becomes an error; cancellation does not.
    async fn drive(&self, mut stream: WorkflowEventStream) -> Result<WorkflowRunResult> {
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            let event = item?;
            print_event(&event, self.verbose);
            events.push(event);
        }

        let result = WorkflowRunResult::new(events);
        match (result.final_state(), result.error()) {
            (RunState::Failed | RunState::Exhausted, Some(error)) => Err(anyhow::Error::from(error.clone())),
            _ => Ok(result),
        }
    }

    async fn checkpoints(&self, text: Option<String>, resume: Option<String>) -> Result<()> {
        let store = Arc::new(FileCheckpointStore::new(
            &self.config.checkpoint_dir,
            self.config.checkpoint_compression,
        ));

        if let Some(checkpoint_id) = resume {
            print_section("Resuming", "⏪");
            let workflow = scenarios::checkpointed(&self.config.workflow, store)?;
            let _interrupt = InterruptGuard::watch(&workflow);
            let result = self.drive(workflow.run_from_checkpoint_streaming(&checkpoint_id)).await?;
            print_outputs(&result);
            return Ok(());
        }

        let text = text.context("text is required unless --resume is given")?;
        let workflow = scenarios::checkpointed(&self.config.workflow, store.clone())?;
        let _interrupt = InterruptGuard::watch(&workflow);
        let result = self.drive(workflow.run_streaming(text)).await?;
        print_outputs(&result);

        print_section("Checkpoints", "📋");
        let written: Vec<String> = result
            .events()
            .iter()
            .filter_map(|event| match event {
                WorkflowEvent::CheckpointCreated { checkpoint_id, .. } => Some(checkpoint_id.clone()),
                _ => None,
            })
            .collect();

        for meta in workflow.list_checkpoints().await? {
            let marker = if written.contains(&meta.checkpoint_id) { "*" } else { " " };
            println!(
                " {} {}  superstep {}  {}  {} queued",
                marker,
                meta.checkpoint_id.yellow(),
                meta.superstep,
                meta.state,
                meta.pending_messages
            );
        }
        println!("   {}", "* written by this run".dimmed());

        // Resume the earliest checkpoint of this run in a fresh instance
        if let Some(first) = written.first() {
            print_section(&format!("Resuming from {}", first), "⏪");
            let fresh = scenarios::checkpointed(&self.config.workflow, store)?;
            let _interrupt = InterruptGuard::watch(&fresh);
            let resumed = self.drive(fresh.run_from_checkpoint_streaming(first)).await?;
            print_outputs(&resumed);
        }

        Ok(())
    }

    async fn guessing(&self, answers: Vec<String>) -> Result<()> {
        println!(
            "Think of a number between {} and {}, and the agent will try to guess it.",
            scenarios::GUESS_LOW,
            scenarios::GUESS_HIGH
        );

        let mut input = HumanInput::new(answers);
        let workflow = scenarios::guessing(&self.config.workflow)?;
        let _interrupt = InterruptGuard::watch(&workflow);
        let mut result = self.drive(workflow.run_streaming("start")).await?;

        while result.final_state() == RunState::Suspended {
            let mut replies = HashMap::new();
            for request in workflow.pending_requests().await {
                let question: HumanFeedbackRequest = serde_json::from_value(request.data.clone())
                    .context("unexpected request payload")?;
                println!("\n🤖 {}", question.prompt.cyan());
                let answer = input.next("👤 Enter your answer: ").await?;
                replies.insert(request.request_id, Value::String(answer));
            }
            result = self.drive(workflow.send_responses_streaming(replies)).await?;
        }

        print_outputs(&result);
        Ok(())
    }

    async fn world_cup(&self, prediction: Option<String>) -> Result<()> {
        print_box("Question", scenarios::WORLD_CUP_PROMPT);

        let mut input = HumanInput::new(prediction.into_iter().collect());
        let workflow = scenarios::world_cup(&self.config.workflow)?;
        let _interrupt = InterruptGuard::watch(&workflow);
        let mut result = self.drive(workflow.run_streaming(scenarios::WORLD_CUP_PROMPT)).await?;

        while result.final_state() == RunState::Suspended {
            let mut replies = HashMap::new();
            for request in workflow.pending_requests().await {
                let question: PredictionRequest = serde_json::from_value(request.data.clone())
                    .context("unexpected request payload")?;
                println!("\n🤖 {}", question.prompt.cyan());
                let answer = input.next("👤 Your top three: ").await?;
                replies.insert(request.request_id, Value::String(answer));
            }
            result = self.drive(workflow.send_responses_streaming(replies)).await?;
        }

        print_outputs(&result);
        Ok(())
    }

    async fn magentic(&self, task: String, auto_approve: bool) -> Result<()> {
        print_box("Task", &task);

        let mut input = HumanInput::new(Vec::new());
        let workflow = scenarios::magentic(&self.config.workflow, true)?;
        let _interrupt = InterruptGuard::watch(&workflow);
        let mut result = self.drive(workflow.run_streaming(task)).await?;

        while result.final_state() == RunState::Suspended {
            let mut replies = HashMap::new();
            for request in workflow.pending_requests().await {
                let review: MagenticPlanReviewRequest = serde_json::from_value(request.data.clone())
                    .context("unexpected request payload")?;
                print_box(&format!("Plan review (revision {})", review.revision), &review.plan_text);

                let reply = if auto_approve {
                    println!("{}", "[INFO] Plan approved automatically".dimmed());
                    MagenticPlanReviewReply::approve()
                } else {
                    let answer = input
                        .next("👤 Press Enter to approve, or type requested changes: ")
                        .await?;
                    review_reply(&answer)
                };
                replies.insert(request.request_id, serde_json::to_value(reply)?);
            }
            result = self.drive(workflow.send_responses_streaming(replies)).await?;
        }

        print_outputs(&result);
        Ok(())
    }
}

// =============================================================================
// INTERRUPTS
// =============================================================================

/// Cancels a workflow on Ctrl-C while alive
struct InterruptGuard(tokio::task::JoinHandle<()>);

impl InterruptGuard {
    fn watch(workflow: &Workflow) -> Self {
        let handle = workflow.cancellation_handle();
        let workflow_id = workflow.id().to_string();
        Self(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(workflow_id = %workflow_id, "Interrupted; stopping at the next superstep boundary");
                handle.cancel();
            }
        }))
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// =============================================================================
// HUMAN INPUT
// =============================================================================

/// Scripted answers when given, stdin otherwise
struct HumanInput {
    scripted: Option<std::vec::IntoIter<String>>,
    stdin: Lines<BufReader<Stdin>>,
}

impl HumanInput {
    fn new(scripted: Vec<String>) -> Self {
        Self {
            scripted: (!scripted.is_empty()).then(|| scripted.into_iter()),
            stdin: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn next(&mut self, prompt: &str) -> Result<String> {
        if let Some(scripted) = &mut self.scripted {
            let answer = scripted.next().context("ran out of scripted answers")?;
            println!("{}{}", prompt, answer.green());
            return Ok(answer);
        }

        print!("{}", prompt);
        std::io::Write::flush(&mut std::io::stdout())?;
        let line = self.stdin.next_line().await?.context("stdin closed before an answer was given")?;
        Ok(line.trim().to_string())
    }
}

fn review_reply(answer: &str) -> MagenticPlanReviewReply {
    let answer = answer.trim();
    if answer.is_empty() || matches!(answer.to_lowercase().as_str(), "y" | "yes" | "approve") {
        MagenticPlanReviewReply::approve()
    } else {
        MagenticPlanReviewReply::revise(answer)
    }
}

fn load_email(input: &str) -> Result<String> {
    let path = Path::new(input);
    if path.is_file() {
        std::fs::read_to_string(path).with_context(|| format!("failed to read email file {}", path.display()))
    } else {
        Ok(input.to_string())
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_header(title: &str, emoji: &str) {
    let separator = "━".repeat(60);
    println!();
    println!("{}", separator.cyan());
    println!("{}", format!("{} {}", emoji, title).cyan().bold());
    println!("{}", separator.cyan());
    println!();
}

fn print_section(title: &str, emoji: &str) {
    let separator = "─".repeat(60);
    println!();
    println!("{}", separator.white());
    println!(" {} {}", emoji, title.white().bold());
    println!("{}", separator.white());
}

fn print_box(title: &str, content: &str) {
    println!("+- {} {}+", title.white().bold(), "-".repeat(55usize.saturating_sub(title.chars().count())));
    for line in content.lines() {
        println!("| {}", line);
    }
    println!("+{}+", "-".repeat(58));
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn print_event(event: &WorkflowEvent, verbose: bool) {
    match event {
        WorkflowEvent::Output { executor_id, data } => {
            println!("{} {} {}", "▶".green(), executor_id.to_string().green(), display_value(data));
        }
        WorkflowEvent::RequestInfo(request) => {
            println!(
                "{} request {} from {}",
                "?".yellow().bold(),
                request.request_id.yellow(),
                request.source_executor_id
            );
        }
        WorkflowEvent::CheckpointCreated {
            checkpoint_id,
            superstep,
        } => {
            println!("💾 checkpoint {} after superstep {}", checkpoint_id.yellow(), superstep);
        }
        WorkflowEvent::Custom { name, data, .. } if name == ORCHESTRATOR_EVENT => {
            let kind = data["kind"].as_str().unwrap_or("message");
            let text = data["text"].as_str().unwrap_or_default();
            println!("\n{}\n{}", format!("[ORCH:{}]", kind).magenta().bold(), text);
        }
        WorkflowEvent::AgentResponse { executor_id, response } => {
            println!("{} {}", format!("[AGENT:{}]", executor_id).blue().bold(), response.text());
        }
        WorkflowEvent::MessageDropped { source_id, kind, reason } => {
            let source = source_id.as_ref().map(ToString::to_string).unwrap_or_else(|| "input".into());
            println!("{} {} message from {} dropped: {:?}", "⚠".yellow(), kind, source, reason);
        }
        WorkflowEvent::PredicateFailed { error } => {
            println!("{} {}", "⚠".yellow(), error);
        }
        WorkflowEvent::RequestsDiscarded { request_ids } => {
            println!("{} unanswered requests discarded: {}", "⚠".yellow(), request_ids.join(", "));
        }
        WorkflowEvent::Failed { error } => {
            println!("{} {}", "✗".red().bold(), error.to_string().red());
        }
        WorkflowEvent::RunStateChanged { state } if verbose || state.is_terminal() || state.is_suspended() => {
            println!("{}", format!("[state] {}", state).dimmed());
        }
        other if verbose => {
            println!("{}", format!("[event] {:?}", other).dimmed());
        }
        _ => {}
    }
}

fn print_outputs(result: &WorkflowRunResult) {
    let outputs = result.outputs();
    if outputs.is_empty() {
        return;
    }

    print_section("Result", "✅");
    for output in outputs {
        for line in display_value(output).lines() {
            println!("  {}", line);
        }
    }
    println!();
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_args() {
        let args = Args::parse_from(["test", "sequential", "hello world"]);
        assert!(!args.verbose);
        assert!(matches!(args.command, Command::Sequential { text } if text == "hello world"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from([
            "test",
            "concurrent",
            "1",
            "-2",
            "3",
            "--verbose",
            "--checkpoint-dir",
            "/tmp/cp",
        ]);

        assert!(args.verbose);
        assert_eq!(args.checkpoint_dir, Some(PathBuf::from("/tmp/cp")));
        assert!(matches!(args.command, Command::Concurrent { numbers } if numbers == vec![1, -2, 3]));
    }

    #[test]
    fn test_concurrent_requires_numbers() {
        assert!(Args::try_parse_from(["test", "concurrent"]).is_err());
    }

    #[test]
    fn test_checkpoints_resume_without_text() {
        let args = Args::parse_from(["test", "checkpoints", "--resume", "abc"]);
        assert!(matches!(
            args.command,
            Command::Checkpoints { text: None, resume: Some(id) } if id == "abc"
        ));

        assert!(Args::try_parse_from(["test", "checkpoints"]).is_err());
    }

    #[test]
    fn test_guessing_answers_are_comma_separated() {
        let args = Args::parse_from(["test", "guessing", "--answers", "lower,higher,correct"]);
        assert!(matches!(
            args.command,
            Command::Guessing { answers } if answers == vec!["lower", "higher", "correct"]
        ));
    }

    #[test]
    fn test_visualize_args() {
        let args = Args::parse_from(["test", "visualize", "branching", "--format", "dot"]);
        assert!(matches!(
            args.command,
            Command::Visualize {
                workflow: Sample::Branching,
                format: DiagramFormat::Dot
            }
        ));
    }

    #[test]
    fn test_multi_selection_args() {
        let args = Args::parse_from(["test", "multi-selection", "./email.txt"]);
        assert!(matches!(args.command, Command::MultiSelection { input } if input == "./email.txt"));

        let args = Args::parse_from(["test", "visualize", "multi-selection"]);
        assert!(matches!(
            args.command,
            Command::Visualize {
                workflow: Sample::MultiSelection,
                format: DiagramFormat::Mermaid
            }
        ));
    }

    #[test]
    fn test_world_cup_args() {
        let args = Args::parse_from(["test", "world-cup", "--prediction", "Brazil, France, Spain"]);
        assert!(matches!(
            args.command,
            Command::WorldCup { prediction: Some(p) } if p == "Brazil, France, Spain"
        ));

        let args = Args::parse_from(["test", "world-cup"]);
        assert!(matches!(args.command, Command::WorldCup { prediction: None }));

        let args = Args::parse_from(["test", "visualize", "world-cup", "--format", "dot"]);
        assert!(matches!(
            args.command,
            Command::Visualize {
                workflow: Sample::WorldCup,
                format: DiagramFormat::Dot
            }
        ));
    }

    #[tokio::test]
    async fn test_interrupt_guard_leaves_workflow_untouched() {
        let workflow = scenarios::sequential(&workflow_engine::WorkflowConfig::default()).unwrap();
        let handle = workflow.cancellation_handle();
        drop(InterruptGuard::watch(&workflow));

        assert!(!handle.is_cancelled());
        let result = workflow.run("still runs").await.unwrap();
        assert!(result.is_completed());
    }

    #[test]
    fn test_magentic_args() {
        let args = Args::parse_from(["test", "magentic", "Compare models", "--auto-approve"]);
        assert!(matches!(
            args.command,
            Command::Magentic { task, auto_approve: true } if task == "Compare models"
        ));
    }

    #[test]
    fn test_review_reply() {
        assert_eq!(review_reply(""), MagenticPlanReviewReply::approve());
        assert_eq!(review_reply(" Yes "), MagenticPlanReviewReply::approve());
        assert_eq!(review_reply("add a budget"), MagenticPlanReviewReply::revise("add a budget"));
    }

    #[test]
    fn test_load_email_falls_back_to_text() {
        let email = load_email("Meeting at noon, not a file").unwrap();
        assert_eq!(email, "Meeting at noon, not a file");
    }

    #[tokio::test]
    async fn test_scripted_input_runs_out() {
        let mut input = HumanInput::new(vec!["higher".to_string()]);
        assert_eq!(input.next("> ").await.unwrap(), "higher");
        assert!(input.next("> ").await.is_err());
    }
}
