//! # Sample Workflows
//!
//! Graph builders for every sample the CLI can run or draw. Each builder
//! takes the runtime `WorkflowConfig` so YAML and environment settings apply
//! uniformly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use workflow_engine::{
    AgentExecutor, AgentExecutorRequest, AgentExecutorResponse, AgentRunResponse, Case, ChatMessage,
    CheckpointStore, Condition, Executor, ExecutorId, ExecutorKind, FanInMessage, FunctionExecutor, MagenticBuilder,
    MagenticLimits, Message, MessagePayload, Predicate, RequestInfoExecutor, RequestResponse, Workflow,
    WorkflowBuilder, WorkflowConfig, WorkflowContext, WorkflowError, TEXT_KIND,
};

use crate::agents::{
    ConsensusAgent, DetectionResult, EmailAssistantAgent, EmailResponse, GuessOutput, GuessingAgent, PunditAgent,
    RoundRobinManager, ScriptedParticipant, SpamDetectorAgent,
};

/// Workflow id shared by every run of the checkpoint sample, so a later
/// process can resume checkpoints written by an earlier one.
pub const CHECKPOINT_WORKFLOW_ID: &str = "checkpoint_pipeline";

/// Lower bound of the guessing game
pub const GUESS_LOW: i64 = 1;

/// Upper bound of the guessing game
pub const GUESS_HIGH: i64 = 20;

/// Sample workflows available to `visualize`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Sample {
    Sequential,
    Concurrent,
    Branching,
    Checkpoints,
    Guessing,
    Magentic,
    MultiSelection,
    WorldCup,
}

/// Build a sample by name, with checkpoints kept in memory
pub fn build(sample: Sample, config: &WorkflowConfig) -> Result<Workflow> {
    match sample {
        Sample::Sequential => sequential(config),
        Sample::Concurrent => concurrent(config),
        Sample::Branching => branching(config),
        Sample::MultiSelection => multi_selection(config),
        Sample::WorldCup => world_cup(config),
        Sample::Checkpoints => checkpointed(config, Arc::new(workflow_engine::MemoryCheckpointStore::new())),
        Sample::Guessing => guessing(config),
        Sample::Magentic => magentic(config, true),
    }
}

// =============================================================================
// SEQUENTIAL
// =============================================================================

/// upper_case_executor -> another_upper -> reverse_text_executor
pub fn sequential(config: &WorkflowConfig) -> Result<Workflow> {
    let workflow = WorkflowBuilder::new()
        .with_id("sequential")
        .with_name("Sequential text pipeline")
        .add_executor(FunctionExecutor::typed::<String, _>("upper_case_executor", |text, ctx| {
            ctx.send(&text.to_uppercase())
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("another_upper", |text, ctx| {
            ctx.send(&text.to_uppercase())
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("reverse_text_executor", |text, ctx| {
            ctx.yield_output(text.chars().rev().collect::<String>());
            Ok(())
        }))
        .set_start("upper_case_executor")
        .add_chain(["upper_case_executor", "another_upper", "reverse_text_executor"])
        .with_config(config.clone())
        .build()?;

    Ok(workflow)
}

// =============================================================================
// CONCURRENT
// =============================================================================

fn numbers_of(executor_id: &str, value: &Value) -> Result<Vec<i64>, WorkflowError> {
    let numbers: Vec<i64> = serde_json::from_value(value.clone())
        .map_err(|e| WorkflowError::executor_failure(executor_id, format!("expected a list of integers: {}", e)))?;
    if numbers.is_empty() {
        return Err(WorkflowError::executor_failure(
            executor_id,
            "input must be a non-empty list of integers",
        ));
    }
    Ok(numbers)
}

/// dispatcher fans out to average, summation and count; aggregator joins them
pub fn concurrent(config: &WorkflowConfig) -> Result<Workflow> {
    let workflow = WorkflowBuilder::new()
        .with_id("concurrent")
        .with_name("Concurrent statistics")
        .add_executor(FunctionExecutor::typed::<Value, _>("dispatcher", |value, ctx| {
            numbers_of("dispatcher", &value)?;
            ctx.send(&value)
        }))
        .add_executor(FunctionExecutor::typed::<Value, _>("average", |value, ctx| {
            let numbers = numbers_of("average", &value)?;
            let average = numbers.iter().sum::<i64>() as f64 / numbers.len() as f64;
            ctx.send(&json!(average))
        }))
        .add_executor(FunctionExecutor::typed::<Value, _>("summation", |value, ctx| {
            let numbers = numbers_of("summation", &value)?;
            ctx.send(&json!(numbers.iter().sum::<i64>()))
        }))
        .add_executor(FunctionExecutor::typed::<Value, _>("count", |value, ctx| {
            let numbers = numbers_of("count", &value)?;
            ctx.send(&json!(numbers.len()))
        }))
        .add_executor(
            FunctionExecutor::typed::<FanInMessage, _>("aggregator", |fan_in, ctx| {
                let results: Vec<Value> = fan_in.values().into_iter().cloned().collect();
                ctx.yield_output(Value::Array(results));
                Ok(())
            })
            .with_kind(ExecutorKind::Aggregator),
        )
        .set_start("dispatcher")
        .add_fan_out("dispatcher", ["average", "summation", "count"])
        .add_fan_in(["average", "summation", "count"], "aggregator")
        .with_config(config.clone())
        .build()?;

    Ok(workflow)
}

// =============================================================================
// BRANCHING
// =============================================================================

/// Start message for the branching sample
pub fn email_request(email: &str) -> Result<Message> {
    let request = AgentExecutorRequest::respond_to(vec![ChatMessage::user(email)]);
    Message::from_payload(&request).context("failed to encode email request")
}

fn to_detection_result() -> FunctionExecutor {
    FunctionExecutor::typed::<AgentExecutorResponse, _>("to_detection_result", |response, ctx| {
        let result: DetectionResult = serde_json::from_str(&response.agent_run_response.text())
            .map_err(|e| WorkflowError::executor_failure("to_detection_result", e.to_string()))?;
        ctx.send(&result)
    })
}

fn handle_spam() -> FunctionExecutor {
    FunctionExecutor::typed::<DetectionResult, _>("handle_spam", |result, ctx| {
        ctx.yield_output(format!("Email marked as spam: {}", result.reason));
        Ok(())
    })
}

fn submit_to_email_assistant() -> FunctionExecutor {
    FunctionExecutor::typed::<DetectionResult, _>("submit_to_email_assistant", |result, ctx| {
        ctx.send(&AgentExecutorRequest::respond_to(vec![ChatMessage::user(result.email_content)]))
    })
}

fn finalize_and_send() -> FunctionExecutor {
    FunctionExecutor::typed::<AgentExecutorResponse, _>("finalize_and_send", |response, ctx| {
        let email: EmailResponse = serde_json::from_str(&response.agent_run_response.text())
            .map_err(|e| WorkflowError::executor_failure("finalize_and_send", e.to_string()))?;
        ctx.yield_output(format!("Email sent:\n{}", email.response));
        Ok(())
    })
}

fn handle_uncertain() -> FunctionExecutor {
    FunctionExecutor::typed::<DetectionResult, _>("handle_uncertain", |result, ctx| {
        ctx.yield_output(format!(
            "Email flagged for manual review: {}\nOriginal content:\n{}",
            result.reason, result.email_content
        ));
        Ok(())
    })
}

/// Spam detector agent, then a switch-case over its decision
///
/// ```text
/// spam_detection_agent -> to_detection_result -> Spam     -> handle_spam
///                                               NotSpam  -> submit_to_email_assistant
///                                                           -> email_assistant_agent -> finalize_and_send
///                                               default  -> handle_uncertain
/// ```
pub fn branching(config: &WorkflowConfig) -> Result<Workflow> {
    let workflow = WorkflowBuilder::new()
        .with_id("branching")
        .with_name("Spam detection switch-case")
        .add_executor(AgentExecutor::new("spam_detection_agent", Arc::new(SpamDetectorAgent)))
        .add_executor(to_detection_result())
        .add_executor(handle_spam())
        .add_executor(submit_to_email_assistant())
        .add_executor(AgentExecutor::new("email_assistant_agent", Arc::new(EmailAssistantAgent)))
        .add_executor(finalize_and_send())
        .add_executor(handle_uncertain())
        .set_start("spam_detection_agent")
        .add_edge("spam_detection_agent", "to_detection_result")
        .add_switch_case(
            "to_detection_result",
            vec![
                Case::new("handle_spam", Predicate::field("spam_decision", Condition::equals("Spam"))),
                Case::new(
                    "submit_to_email_assistant",
                    Predicate::field("spam_decision", Condition::equals("NotSpam")),
                ),
            ],
            Some("handle_uncertain".into()),
        )
        .add_edge("submit_to_email_assistant", "email_assistant_agent")
        .add_edge("email_assistant_agent", "finalize_and_send")
        .with_config(config.clone())
        .build()?;

    Ok(workflow)
}

/// Emails at least this long are also summarized by the multi-selection sample
pub const LONG_EMAIL_CHARS: usize = 200;

/// Spam detector agent, then a multi-selection over its decision
///
/// Unlike [`branching`], every matching case fires: each email is routed by
/// its decision, and long emails are summarized as well. Outputs from all
/// branches are collected, so the run does not stop at the first one.
///
/// ```text
/// spam_detection_agent -> to_detection_result -> NotSpam   -> submit_to_email_assistant -> ...
///                                               Spam      -> handle_spam
///                                               Uncertain -> handle_uncertain
///                                               long      -> summarize_email
/// ```
pub fn multi_selection(config: &WorkflowConfig) -> Result<Workflow> {
    let summarize = FunctionExecutor::typed::<DetectionResult, _>("summarize_email", |result, ctx| {
        let first_line = result
            .email_content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default();
        ctx.yield_output(format!(
            "Summary of a {} character email: {}",
            result.email_content.chars().count(),
            first_line
        ));
        Ok(())
    });

    let long_email = format!(r"^(?s).{{{},}}$", LONG_EMAIL_CHARS);

    let workflow = WorkflowBuilder::new()
        .with_id("multi_selection")
        .with_name("Spam detection multi-selection")
        .add_executor(AgentExecutor::new("spam_detection_agent", Arc::new(SpamDetectorAgent)))
        .add_executor(to_detection_result())
        .add_executor(handle_spam())
        .add_executor(submit_to_email_assistant())
        .add_executor(AgentExecutor::new("email_assistant_agent", Arc::new(EmailAssistantAgent)))
        .add_executor(finalize_and_send())
        .add_executor(handle_uncertain())
        .add_executor(summarize)
        .set_start("spam_detection_agent")
        .add_edge("spam_detection_agent", "to_detection_result")
        .add_multi_selection(
            "to_detection_result",
            vec![
                Case::new(
                    "submit_to_email_assistant",
                    Predicate::field("spam_decision", Condition::equals("NotSpam")),
                ),
                Case::new("handle_spam", Predicate::field("spam_decision", Condition::equals("Spam"))),
                Case::new(
                    "handle_uncertain",
                    Predicate::field("spam_decision", Condition::equals("Uncertain")),
                ),
                Case::new(
                    "summarize_email",
                    Predicate::field("email_content", Condition::matches(long_email)).with_label("long email"),
                ),
            ],
        )
        .add_edge("submit_to_email_assistant", "email_assistant_agent")
        .add_edge("email_assistant_agent", "finalize_and_send")
        .with_config(config.clone().with_stop_on_output(false))
        .build()?;

    Ok(workflow)
}

// =============================================================================
// CHECKPOINTS
// =============================================================================

/// Four text stages with a checkpoint store attached
pub fn checkpointed(config: &WorkflowConfig, store: Arc<dyn CheckpointStore>) -> Result<Workflow> {
    let workflow = WorkflowBuilder::new()
        .with_id(CHECKPOINT_WORKFLOW_ID)
        .with_name("Checkpointed text pipeline")
        .add_executor(FunctionExecutor::typed::<String, _>("first_executor", |text, ctx| {
            ctx.send(&text.replace(' ', "_"))
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("second_executor", |text, ctx| {
            ctx.send(&text.to_uppercase())
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("third_executor", |text, ctx| {
            let dotted = text.chars().map(String::from).collect::<Vec<_>>().join(".");
            ctx.send(&dotted)
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("final_executor", |text, ctx| {
            ctx.yield_output(text);
            Ok(())
        }))
        .set_start("first_executor")
        .add_chain(["first_executor", "second_executor", "third_executor", "final_executor"])
        .with_config(config.clone())
        .with_checkpointing(store)
        .build()?;

    Ok(workflow)
}

// =============================================================================
// GUESSING GAME
// =============================================================================

/// Question put to the human after each guess
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanFeedbackRequest {
    pub prompt: String,
    pub guess: i64,
}

impl MessagePayload for HumanFeedbackRequest {
    const KIND: &'static str = "human_feedback_request";
}

/// Normalized human reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Higher,
    Lower,
    Correct,
    Exit,
}

impl Feedback {
    pub fn parse(reply: &str) -> Option<Self> {
        match reply.trim().to_lowercase().as_str() {
            "higher" | "high" | "h" => Some(Feedback::Higher),
            "lower" | "low" | "l" => Some(Feedback::Lower),
            "correct" | "ok" | "yes" => Some(Feedback::Correct),
            "exit" | "quit" => Some(Feedback::Exit),
            _ => None,
        }
    }
}

/// Alternates turns between the guessing agent and the human
struct TurnManager {
    id: ExecutorId,
}

impl TurnManager {
    fn ask(&self, guess: i64, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        ctx.send(&HumanFeedbackRequest {
            prompt: format!(
                "The agent guessed: {}. Type 'higher' or 'lower' if your number differs, 'correct' if it matches, or 'exit'.",
                guess
            ),
            guess,
        })
    }
}

#[async_trait]
impl Executor for TurnManager {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        vec![
            TEXT_KIND.to_string(),
            AgentExecutorResponse::KIND.to_string(),
            RequestResponse::KIND.to_string(),
        ]
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        if message.is::<AgentExecutorResponse>() {
            let response: AgentExecutorResponse = message.decode()?;
            let output: GuessOutput = serde_json::from_str(&response.agent_run_response.text())
                .map_err(|e| WorkflowError::executor_failure(self.id.clone(), e.to_string()))?;
            return self.ask(output.guess, ctx);
        }

        if message.is::<RequestResponse>() {
            let response: RequestResponse = message.decode()?;
            let request: HumanFeedbackRequest = response.request_as()?;
            let reply: String = response.data_as()?;

            return match Feedback::parse(&reply) {
                Some(Feedback::Correct) => {
                    ctx.yield_output(format!("Guessed correctly: {}", request.guess));
                    Ok(())
                }
                Some(Feedback::Exit) => {
                    ctx.yield_output("Game ended by the player");
                    Ok(())
                }
                Some(direction) => {
                    let word = if direction == Feedback::Higher { "higher" } else { "lower" };
                    let feedback = ChatMessage::user(format!("Feedback: {}. Your next guess?", word));
                    ctx.send(&AgentExecutorRequest::respond_to(vec![feedback]))
                }
                // Unrecognized replies repeat the question
                None => self.ask(request.guess, ctx),
            };
        }

        let start = ChatMessage::user(format!(
            "Guess a number between {} and {}. Start by making your first guess.",
            GUESS_LOW, GUESS_HIGH
        ));
        ctx.send(&AgentExecutorRequest::respond_to(vec![start]))
    }
}

/// turn_manager <-> guessing_agent, turn_manager <-> request_info
pub fn guessing(config: &WorkflowConfig) -> Result<Workflow> {
    let workflow = WorkflowBuilder::new()
        .with_id("guessing_game")
        .with_name("Number guessing with human feedback")
        .add_executor(TurnManager {
            id: "turn_manager".into(),
        })
        .add_executor(AgentExecutor::new(
            "guessing_agent",
            Arc::new(GuessingAgent::new(GUESS_LOW, GUESS_HIGH)),
        ))
        .add_executor(RequestInfoExecutor::for_payload::<HumanFeedbackRequest>("request_info"))
        .set_start("turn_manager")
        .add_edge("turn_manager", "guessing_agent")
        .add_edge("guessing_agent", "turn_manager")
        .add_edge("turn_manager", "request_info")
        .add_edge("request_info", "turn_manager")
        .with_config(config.clone())
        .build()?;

    Ok(workflow)
}

// =============================================================================
// WORLD CUP PANEL
// =============================================================================

/// Question the panel sends to every pundit
pub const WORLD_CUP_PROMPT: &str = "Who are the top three favorites to win the 2026 World Cup? \
Rank them from first to third with a short reason for each.";

/// The user's prediction until they replace it
pub const DEFAULT_PREDICTION: &str = "1. Argentina: defending champions\n2. France: deepest squad\n3. Spain: young generation coming up strong";

/// Shared state key holding the user's current prediction
pub const PREDICTION_KEY: &str = "my_prediction";

/// Asks the user to confirm or replace their prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub prompt: String,
    pub current: String,
}

impl MessagePayload for PredictionRequest {
    const KIND: &'static str = "prediction_request";
}

/// Turn a reply into a numbered ranking; blank keeps the current one
///
/// A single line is read as comma separated teams.
pub fn normalize_prediction(reply: &str) -> Option<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }
    if reply.contains('\n') {
        return Some(reply.to_string());
    }
    let teams: Vec<String> = reply
        .split(',')
        .map(str::trim)
        .filter(|team| !team.is_empty())
        .enumerate()
        .map(|(i, team)| format!("{}. {}", i + 1, team))
        .collect();
    Some(teams.join("\n"))
}

/// Puts the stored prediction to the user, then hands the confirmed one to
/// the panel as if it were one more pundit
struct PredictionManager {
    id: ExecutorId,
}

impl PredictionManager {
    async fn current(&self, ctx: &WorkflowContext) -> Result<String, WorkflowError> {
        Ok(ctx
            .get_shared_state_as::<String>(PREDICTION_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_PREDICTION.to_string()))
    }
}

#[async_trait]
impl Executor for PredictionManager {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_kinds(&self) -> Vec<String> {
        vec![TEXT_KIND.to_string(), RequestResponse::KIND.to_string()]
    }

    async fn handle(&self, message: Message, ctx: &mut WorkflowContext) -> Result<(), WorkflowError> {
        if message.is::<RequestResponse>() {
            let response: RequestResponse = message.decode()?;
            let reply: String = response.data_as()?;
            if let Some(updated) = normalize_prediction(&reply) {
                ctx.set_shared_state(PREDICTION_KEY, &updated).await?;
            }

            let prediction = ChatMessage::user(self.current(ctx).await?).with_author("user");
            return ctx.send(&AgentExecutorResponse {
                executor_id: self.id.clone(),
                agent_run_response: AgentRunResponse::new(vec![prediction.clone()]),
                full_conversation: vec![prediction],
            });
        }

        let current = self.current(ctx).await?;
        ctx.send(&PredictionRequest {
            prompt: format!(
                "Your current prediction is:\n{}\n\nEnter an updated top three (comma separated), or leave blank to keep it.",
                current
            ),
            current,
        })
    }
}

/// Pundits on the panel: executor id, focus, top three
const PUNDITS: [(&str, &str, [&str; 3]); 3] = [
    ("expert_form", "recent form", ["France", "Argentina", "Spain"]),
    ("expert_ranking", "ranking points", ["Argentina", "France", "Brazil"]),
    ("expert_squad", "squad depth", ["Spain", "France", "England"]),
];

/// Pundits and the user predict in parallel; a consensus agent merges them
///
/// ```text
/// dispatcher -> expert_form ------------\
///            -> expert_ranking ----------+-> aggregator -> consensus_agent -> publish_consensus
///            -> expert_squad ------------+
///            -> user_prediction_manager -/
///               user_prediction_manager <-> request_info
/// ```
///
/// The fan-in collects agent responses only, so the manager's question to
/// the user does not count as its contribution.
pub fn world_cup(config: &WorkflowConfig) -> Result<Workflow> {
    let dispatcher = FunctionExecutor::new_async("dispatcher", |message, ctx| {
        Box::pin(async move {
            if ctx.get_shared_state(PREDICTION_KEY).await.is_none() {
                ctx.set_shared_state(PREDICTION_KEY, &DEFAULT_PREDICTION).await?;
            }
            ctx.send_message(message);
            Ok(())
        })
    })
    .accepting([TEXT_KIND]);

    let aggregator = FunctionExecutor::new_async("aggregator", |message, ctx| {
        Box::pin(async move {
            let fan_in: FanInMessage = message.decode()?;
            let responses: Vec<AgentExecutorResponse> = fan_in.payloads()?;

            let mut sections = Vec::new();
            let mut expert = 0;
            for response in responses {
                if response.executor_id.as_str() == "user_prediction_manager" {
                    continue;
                }
                expert += 1;
                sections.push(format!(
                    "Expert number {} ({}):\n{}",
                    expert,
                    response.executor_id,
                    response.agent_run_response.text()
                ));
            }
            let mine: String = ctx
                .get_shared_state_as(PREDICTION_KEY)
                .await?
                .unwrap_or_else(|| DEFAULT_PREDICTION.to_string());
            sections.push(format!("My own prediction:\n{}", mine));

            let prompt = format!(
                "Here are all the predictions for the 2026 World Cup favorites:\n\n{}\n\nMerge them into a single final ranking of three teams.",
                sections.join("\n\n")
            );
            ctx.send(&AgentExecutorRequest::respond_to(vec![ChatMessage::user(prompt)]))
        })
    })
    .accepting([FanInMessage::KIND])
    .with_kind(ExecutorKind::Aggregator);

    let mut builder = WorkflowBuilder::new()
        .with_id("world_cup")
        .with_name("World Cup 2026 favorites panel")
        .add_executor(dispatcher)
        .add_executor(PredictionManager {
            id: "user_prediction_manager".into(),
        })
        .add_executor(RequestInfoExecutor::for_payload::<PredictionRequest>("request_info"))
        .add_executor(aggregator)
        .add_executor(AgentExecutor::new("consensus_agent", Arc::new(ConsensusAgent)))
        .add_executor(FunctionExecutor::typed::<AgentExecutorResponse, _>("publish_consensus", |response, ctx| {
            ctx.yield_output(response.agent_run_response.text());
            Ok(())
        }));

    for (id, focus, ranking) in PUNDITS {
        builder = builder.add_executor(AgentExecutor::new(id, Arc::new(PunditAgent::new(id, focus, ranking))));
    }

    let experts = PUNDITS.map(|(id, _, _)| id);
    let mut panel = vec!["user_prediction_manager"];
    panel.extend(experts);

    let workflow = builder
        .set_start("dispatcher")
        .add_fan_out("dispatcher", panel.clone())
        .add_edge("user_prediction_manager", "request_info")
        .add_edge("request_info", "user_prediction_manager")
        .add_fan_in_of::<AgentExecutorResponse, _, _>(panel, "aggregator")
        .add_chain(["aggregator", "consensus_agent", "publish_consensus"])
        .with_config(config.clone())
        .build()?;

    Ok(workflow)
}

// =============================================================================
// MAGENTIC
// =============================================================================

/// Researcher and analyst led by a round-robin manager
pub fn magentic(config: &WorkflowConfig, plan_review: bool) -> Result<Workflow> {
    const RESEARCHER: &str = "Specialist in research and information gathering";
    const ANALYST: &str = "Turns gathered facts into estimates and comparison tables";

    let researcher = ScriptedParticipant::new(
        "researcher",
        RESEARCHER,
        "Published figures put training energy in the thousands of MWh and inference cost per query in Wh.",
    );
    let analyst = ScriptedParticipant::new(
        "analyst",
        ANALYST,
        "Multiplying energy by grid carbon intensity gives the CO2 estimate; the smaller model wins per task.",
    );

    let mut builder = MagenticBuilder::new()
        .with_id("magentic")
        .participant("researcher", RESEARCHER, Arc::new(researcher))
        .participant("analyst", ANALYST, Arc::new(analyst))
        .manager(Arc::new(RoundRobinManager))
        .limits(MagenticLimits::default())
        .with_streaming(true)
        .with_config(config.clone());

    if plan_review {
        builder = builder.with_plan_review();
    }

    Ok(builder.build()?)
}
