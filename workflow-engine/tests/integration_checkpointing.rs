//! Integration tests for checkpointing
//!
//! These tests verify checkpoint behavior end to end:
//! - Checkpoint creation at superstep boundaries
//! - Resume from checkpoint in a fresh workflow instance
//! - Pending message, fan-in buffer and shared state preservation
//! - Suspension checkpoints and answering restored requests
//! - Partial answers surviving a restore
//! - Resumed event sequences matching the uninterrupted run
//! - Memory and file backends
//! - Error handling for mismatched or missing checkpoints

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use workflow_engine::{
    Checkpoint, CheckpointStore, FanInMessage, FileCheckpointStore, FunctionExecutor, MemoryCheckpointStore,
    Message, RequestInfoExecutor, RequestResponse, RunState, Workflow, WorkflowBuilder, WorkflowConfig,
    WorkflowError, WorkflowEvent,
};

// =============================================================================
// Fixtures
// =============================================================================

/// "abc def" -> "A.B.C._.D.E.F" over four supersteps
fn text_pipeline(store: Arc<dyn CheckpointStore>) -> Workflow {
    WorkflowBuilder::new()
        .with_id("checkpointed_pipeline")
        .add_executor(FunctionExecutor::typed::<String, _>("first", |text, ctx| {
            ctx.send(&text.replace(' ', "_"))
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("second", |text, ctx| {
            ctx.send(&text.to_uppercase())
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("third", |text, ctx| {
            let dotted: Vec<String> = text.chars().map(String::from).collect();
            ctx.send(&dotted.join("."))
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("final", |text, ctx| {
            ctx.yield_output(text);
            Ok(())
        }))
        .set_start("first")
        .add_chain(["first", "second", "third", "final"])
        .with_checkpointing(store)
        .build()
        .expect("valid graph")
}

/// ask -> gate -> answer, suspending at the gate
fn review_workflow(store: Arc<dyn CheckpointStore>) -> Workflow {
    WorkflowBuilder::new()
        .with_id("review")
        .add_executor(FunctionExecutor::new_async("ask", |message, ctx| {
            Box::pin(async move {
                ctx.set_shared_state("asked", &message.payload).await?;
                ctx.send_message(message);
                Ok(())
            })
        }))
        .add_executor(RequestInfoExecutor::new("gate"))
        .add_executor(FunctionExecutor::new_async("answer", |message, ctx| {
            Box::pin(async move {
                let response: RequestResponse = message.decode()?;
                let asked = ctx.get_shared_state("asked").await.unwrap_or(Value::Null);
                ctx.yield_output(json!({ "asked": asked, "answer": response.data }));
                Ok(())
            })
        }))
        .set_start("ask")
        .add_edge("ask", "gate")
        .add_edge("gate", "answer")
        .with_checkpointing(store)
        .build()
        .expect("valid graph")
}

/// dispatch -> (left, right) gates -> collect, raising two requests in one batch
fn twin_gates(store: Arc<dyn CheckpointStore>) -> Workflow {
    WorkflowBuilder::new()
        .with_id("twin_gates")
        .add_executor(FunctionExecutor::typed::<String, _>("dispatch", |text, ctx| ctx.send(&text)))
        .add_executor(RequestInfoExecutor::new("left"))
        .add_executor(RequestInfoExecutor::new("right"))
        .add_executor(FunctionExecutor::typed::<RequestResponse, _>("collect", |response, ctx| {
            ctx.yield_output(response.data);
            Ok(())
        }))
        .set_start("dispatch")
        .add_fan_out("dispatch", ["left", "right"])
        .add_edge("left", "collect")
        .add_edge("right", "collect")
        .with_checkpointing(store)
        .build()
        .expect("valid graph")
}

/// Fan-in whose sources finish in different supersteps
fn staggered_fan_in(store: Arc<dyn CheckpointStore>) -> Workflow {
    WorkflowBuilder::new()
        .with_id("staggered")
        .add_executor(FunctionExecutor::typed::<String, _>("dispatch", |text, ctx| ctx.send(&text)))
        .add_executor(FunctionExecutor::typed::<String, _>("fast", |text, ctx| {
            ctx.send(&format!("fast:{}", text))
        }))
        .add_executor(FunctionExecutor::typed::<String, _>("slow", |text, ctx| ctx.send(&text)))
        .add_executor(FunctionExecutor::typed::<String, _>("slower", |text, ctx| {
            ctx.send(&format!("slow:{}", text))
        }))
        .add_executor(FunctionExecutor::typed::<FanInMessage, _>("join", |fan_in, ctx| {
            let parts: Vec<String> = fan_in.payloads()?;
            ctx.yield_output(parts.join("+"));
            Ok(())
        }))
        .set_start("dispatch")
        .add_fan_out("dispatch", ["fast", "slow"])
        .add_edge("slow", "slower")
        .add_fan_in(["fast", "slower"], "join")
        .with_checkpointing(store)
        .build()
        .expect("valid graph")
}

fn checkpoint_ids(events: &[WorkflowEvent]) -> Vec<(String, usize)> {
    events
        .iter()
        .filter_map(|e| match e {
            WorkflowEvent::CheckpointCreated {
                checkpoint_id,
                superstep,
            } => Some((checkpoint_id.clone(), *superstep)),
            _ => None,
        })
        .collect()
}

/// Event names and contents with checkpoint ids erased
fn normalized(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            WorkflowEvent::CheckpointCreated { superstep, .. } => format!("checkpoint@{}", superstep),
            other => format!("{:?}", other),
        })
        .collect()
}

// =============================================================================
// Checkpoint creation
// =============================================================================

/// A checkpoint is written at every superstep boundary with work queued
#[tokio::test]
async fn test_checkpoints_created_between_supersteps() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let workflow = text_pipeline(store.clone());

    let result = workflow.run("abc def").await.expect("run succeeds");
    assert_eq!(result.outputs(), vec![&json!("A.B.C._.D.E.F")]);

    let created = checkpoint_ids(result.events());
    let supersteps: Vec<usize> = created.iter().map(|(_, s)| *s).collect();
    assert_eq!(supersteps, vec![1, 2, 3]);

    let listed = workflow.list_checkpoints().await.expect("list succeeds");
    assert_eq!(listed.len(), 3);
    for entry in &listed {
        assert_eq!(entry.workflow_id, "checkpointed_pipeline");
        assert_eq!(entry.state, RunState::Running);
        assert_eq!(entry.pending_messages, 1);
        assert_eq!(entry.pending_requests, 0);
    }
}

/// A checkpoint interval of zero disables periodic checkpoints
#[tokio::test]
async fn test_checkpoint_interval_zero_disables_checkpoints() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let workflow = WorkflowBuilder::new()
        .with_id("quiet")
        .add_executor(FunctionExecutor::typed::<String, _>("a", |text, ctx| ctx.send(&text)))
        .add_executor(FunctionExecutor::typed::<String, _>("b", |text, ctx| {
            ctx.yield_output(text);
            Ok(())
        }))
        .set_start("a")
        .add_edge("a", "b")
        .with_config(WorkflowConfig::new().with_checkpoint_interval(0))
        .with_checkpointing(store.clone())
        .build()
        .expect("valid graph");

    let result = workflow.run("x").await.expect("run succeeds");
    assert!(checkpoint_ids(result.events()).is_empty());
    assert!(store.list("quiet").await.expect("list succeeds").is_empty());
}

/// The stored snapshot holds the queued message with its sequence number
#[tokio::test]
async fn test_checkpoint_contents() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let workflow = text_pipeline(store.clone());
    workflow.run("abc def").await.expect("run succeeds");

    let first = store
        .list("checkpointed_pipeline")
        .await
        .expect("list succeeds")
        .into_iter()
        .find(|m| m.superstep == 1)
        .expect("checkpoint after superstep 1");
    let checkpoint = store.load(&first.checkpoint_id).await.expect("load succeeds");

    let queued = checkpoint.queued_deliveries();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].0.as_str(), "second");
    assert_eq!(queued[0].1.as_text(), Some("abc_def"));
    assert_eq!(queued[0].1.source_id.as_ref().map(|s| s.as_str()), Some("first"));
    assert!(checkpoint.next_seq > queued[0].1.seq);

    // Survives a JSON round trip unchanged
    let encoded = serde_json::to_string(&checkpoint).expect("encode");
    let decoded: Checkpoint = serde_json::from_str(&encoded).expect("decode");
    assert_eq!(decoded, checkpoint);
}

// =============================================================================
// Resume
// =============================================================================

/// A fresh workflow with the same id continues from any checkpoint
#[tokio::test]
async fn test_resume_in_fresh_workflow() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let original = text_pipeline(store.clone());
    original.run("abc def").await.expect("run succeeds");

    let listed = original.list_checkpoints().await.expect("list succeeds");
    for entry in listed {
        let restored = text_pipeline(store.clone());
        let result = restored
            .run_from_checkpoint(&entry.checkpoint_id)
            .await
            .expect("resume succeeds");

        assert_eq!(result.outputs(), vec![&json!("A.B.C._.D.E.F")]);
        assert_eq!(result.final_state(), RunState::Completed);

        // Work before the checkpoint is not repeated
        let invoked = result
            .events()
            .iter()
            .filter(|e| matches!(e, WorkflowEvent::ExecutorInvoked { .. }))
            .count();
        assert_eq!(invoked, 4 - entry.superstep);
    }
}

/// A resumed run replays exactly what the uninterrupted run did after the checkpoint
#[tokio::test]
async fn test_resumed_events_match_uninterrupted_tail() {
    type Fixture = fn(Arc<dyn CheckpointStore>) -> Workflow;
    let fixtures: [(Fixture, &str); 2] = [(text_pipeline, "abc def"), (staggered_fan_in, "x")];

    for (fixture, input) in fixtures {
        let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
        let original = fixture(store.clone());
        let full = original.run(input).await.expect("run succeeds");
        let full_events = normalized(full.events());

        let created = checkpoint_ids(full.events());
        assert!(!created.is_empty());
        for (checkpoint_id, superstep) in created {
            let marker = format!("checkpoint@{}", superstep);
            let at = full_events
                .iter()
                .position(|e| *e == marker)
                .expect("checkpoint event in the uninterrupted run");

            let restored = fixture(store.clone());
            let resumed = restored
                .run_from_checkpoint(&checkpoint_id)
                .await
                .expect("resume succeeds");
            let resumed_events = normalized(resumed.events());

            let running = format!("{:?}", WorkflowEvent::RunStateChanged { state: RunState::Running });
            assert_eq!(resumed_events[0], running);
            assert_eq!(
                &resumed_events[1..],
                &full_events[at + 1..],
                "resuming {} from superstep {}",
                restored.id(),
                superstep
            );
        }
    }
}

/// Partially filled fan-in buffers are restored
#[tokio::test]
async fn test_resume_preserves_fan_in_buffer() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let original = staggered_fan_in(store.clone());
    let result = original.run("x").await.expect("run succeeds");
    assert_eq!(result.outputs(), vec![&json!("fast:x+slow:x")]);

    let mid = original
        .list_checkpoints()
        .await
        .expect("list succeeds")
        .into_iter()
        .find(|m| m.superstep == 2)
        .expect("checkpoint after superstep 2");
    let checkpoint = store.load(&mid.checkpoint_id).await.expect("load succeeds");
    assert_eq!(checkpoint.fan_in_buffers.len(), 1);

    let restored = staggered_fan_in(store.clone());
    let result = restored
        .run_from_checkpoint(&mid.checkpoint_id)
        .await
        .expect("resume succeeds");
    assert_eq!(result.outputs(), vec![&json!("fast:x+slow:x")]);
}

/// A suspended run is checkpointed and can be answered after restore
#[tokio::test]
async fn test_suspension_checkpoint_and_restored_answer() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let workflow = review_workflow(store.clone());

    let result = workflow.run("ship it?").await.expect("run succeeds");
    assert_eq!(result.final_state(), RunState::Suspended);
    let request_id = result.request_info_events()[0].request_id.clone();

    let latest = store
        .latest("review")
        .await
        .expect("latest succeeds")
        .expect("suspension checkpoint");
    assert_eq!(latest.state, RunState::Suspended);
    assert_eq!(latest.outstanding_requests.len(), 1);
    assert_eq!(latest.shared_state.get("asked"), Some(&json!("ship it?")));

    // A new process: same id, same store
    let restored = review_workflow(store.clone());
    let result = restored
        .run_from_checkpoint(&latest.checkpoint_id)
        .await
        .expect("restore succeeds");
    assert_eq!(result.final_state(), RunState::Suspended);
    let reissued = result.request_info_events();
    assert_eq!(reissued.len(), 1);
    assert_eq!(reissued[0].request_id, request_id);
    assert_eq!(reissued[0].data, json!("ship it?"));

    // Restoring an already-stored suspension does not write a duplicate
    assert!(checkpoint_ids(result.events()).is_empty());

    let result = restored
        .send_responses(HashMap::from([(request_id, json!("approved"))]))
        .await
        .expect("answer succeeds");
    assert_eq!(result.final_state(), RunState::Completed);
    assert_eq!(
        result.outputs(),
        vec![&json!({ "asked": "ship it?", "answer": "approved" })]
    );
}

/// A partial answer is checkpointed so a restore does not ask for it again
#[tokio::test]
async fn test_partial_answer_is_checkpointed() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let workflow = twin_gates(store.clone());

    let result = workflow.run("pick one").await.expect("run succeeds");
    assert_eq!(result.final_state(), RunState::Suspended);
    let raised: Vec<String> = result
        .request_info_events()
        .iter()
        .map(|r| r.request_id.clone())
        .collect();
    assert_eq!(raised.len(), 2);

    let partial = workflow
        .send_responses(HashMap::from([(raised[0].clone(), json!("left answer"))]))
        .await
        .expect("partial answer accepted");
    assert_eq!(partial.final_state(), RunState::Suspended);
    assert!(partial.outputs().is_empty());

    let created = checkpoint_ids(partial.events());
    assert_eq!(created.len(), 1);
    let checkpoint = store.load(&created[0].0).await.expect("load succeeds");
    assert_eq!(checkpoint.state, RunState::Suspended);
    let answered: Vec<&str> = checkpoint
        .outstanding_requests
        .iter()
        .filter(|r| r.is_answered())
        .map(|r| r.request_id())
        .collect();
    assert_eq!(answered, vec![raised[0].as_str()]);

    let restored = twin_gates(store.clone());
    let result = restored
        .run_from_checkpoint(&created[0].0)
        .await
        .expect("restore succeeds");
    assert_eq!(result.final_state(), RunState::Suspended);
    let pending = restored.pending_requests().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request_id, raised[1]);

    let result = restored
        .send_responses(HashMap::from([(raised[1].clone(), json!("right answer"))]))
        .await
        .expect("answer succeeds");
    assert_eq!(result.final_state(), RunState::Completed);
    let mut outputs: Vec<&Value> = result.outputs();
    outputs.sort_by_key(|v| v.to_string());
    assert_eq!(outputs, vec![&json!("left answer"), &json!("right answer")]);
}

/// Manual checkpoints capture the current run
#[tokio::test]
async fn test_checkpoint_now_on_suspended_run() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let workflow = review_workflow(store.clone());
    workflow.run("question").await.expect("run succeeds");

    let id = workflow.checkpoint_now().await.expect("checkpoint succeeds");
    let checkpoint = store.load(&id).await.expect("load succeeds");
    assert_eq!(checkpoint.state, RunState::Suspended);
    assert_eq!(checkpoint.outstanding_requests.len(), 1);
}

// =============================================================================
// Backends
// =============================================================================

/// File store writes compressed files and reads them back
#[tokio::test]
async fn test_file_store_resume() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path(), true));
    let workflow = text_pipeline(store);

    let result = workflow.run("abc def").await.expect("run succeeds");
    let created = checkpoint_ids(result.events());
    assert_eq!(created.len(), 3);

    let files: Vec<String> = std::fs::read_dir(dir.path().join("checkpointed_pipeline"))
        .expect("workflow directory")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|name| name.ends_with(".json.zst")));

    // The extension decides how a file is read, not the store setting
    let plain: Arc<dyn CheckpointStore> = Arc::new(FileCheckpointStore::new(dir.path(), false));
    let restored = text_pipeline(plain);
    let result = restored
        .run_from_checkpoint(&created[0].0)
        .await
        .expect("resume succeeds");
    assert_eq!(result.outputs(), vec![&json!("A.B.C._.D.E.F")]);
}

/// Saving an existing checkpoint id stores a copy under a fresh id
#[tokio::test]
async fn test_store_never_overwrites() {
    let store = MemoryCheckpointStore::new();
    let checkpoint = Checkpoint::new("wf", "run", 1);

    let first = store.save(&checkpoint).await.expect("save succeeds");
    let second = store.save(&checkpoint).await.expect("save succeeds");

    assert_eq!(first, checkpoint.checkpoint_id);
    assert_ne!(first, second);
    assert_eq!(store.list("wf").await.expect("list succeeds").len(), 2);
}

// =============================================================================
// Error handling
// =============================================================================

/// Restoring without a store is a configuration error
#[tokio::test]
async fn test_restore_without_store() {
    let workflow = WorkflowBuilder::new()
        .add_executor(FunctionExecutor::new("only", |_message, _ctx| Ok(())))
        .set_start("only")
        .build()
        .expect("valid graph");

    let err = workflow.run_from_checkpoint("anything").await.unwrap_err();
    assert!(matches!(err, WorkflowError::Config(_)));
    assert!(matches!(workflow.list_checkpoints().await, Err(WorkflowError::Config(_))));
}

/// Unknown ids and foreign checkpoints are rejected before anything runs
#[tokio::test]
async fn test_restore_rejects_missing_and_foreign_checkpoints() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let pipeline = text_pipeline(store.clone());
    pipeline.run("abc def").await.expect("run succeeds");

    let err = pipeline.run_from_checkpoint("missing").await.unwrap_err();
    assert!(matches!(err, WorkflowError::CheckpointNotFound(id) if id == "missing"));

    let foreign = pipeline.list_checkpoints().await.expect("list succeeds")[0]
        .checkpoint_id
        .clone();
    let review = review_workflow(store.clone());
    let err = review.run_from_checkpoint(&foreign).await.unwrap_err();
    assert!(matches!(err, WorkflowError::CheckpointMismatch { .. }));
    assert_eq!(review.state(), RunState::NotStarted);
}

/// A checkpoint naming an executor the graph lacks is rejected
#[tokio::test]
async fn test_restore_rejects_unknown_executor() {
    let store: Arc<dyn CheckpointStore> = Arc::new(MemoryCheckpointStore::new());
    let mut checkpoint = Checkpoint::new("checkpointed_pipeline", "run", 1);
    checkpoint
        .in_flight_messages
        .insert("ghost".into(), vec![Message::text("boo").with_source("first")]);
    let id = store.save(&checkpoint).await.expect("save succeeds");

    let workflow = text_pipeline(store);
    let err = workflow.run_from_checkpoint(&id).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Checkpoint(_)));
}
