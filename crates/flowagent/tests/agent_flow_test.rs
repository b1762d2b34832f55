// crates/flowagent/tests/agent_flow_test.rs

mod common;

use common::{init_tracing, BrokenDecider, FixedDecider, ScriptedAssistant};
use flowagent::{
    coding_agent_flow, iterative_coding_flow, simple_coding_flow, AgentConfig, AssistantTask,
    Collaborators, Step,
};
use flowcore::{Action, ActionSet, FatalCause, NodeError, Phase, Requirements, SharedContext};
use flowruntime::{BatchConfig, BatchFlow, RunConfig, Termination};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.py"), "print('hi')\n# TODO: args\n").unwrap();
    dir
}

#[tokio::test]
async fn test_happy_path_completes() {
    init_tracing();
    let dir = project();
    let assistant = Arc::new(ScriptedAssistant::passing());
    let flow = coding_agent_flow(&Collaborators::local(assistant.clone()), &AgentConfig::default()).unwrap();

    let ctx = SharedContext::new("Build a todo CLI\n- add items\n- list items")
        .with_project_path(dir.path());
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert!(matches!(run.termination, Termination::EndOfGraph { .. }));
    assert_eq!(run.activations, 18);

    let visited = run.visited();
    assert_eq!(
        &visited[..4],
        &["understand_requirements", "analyze_context", "decide_action", "create_plan"]
    );
    assert_eq!(&visited[14..], &["decide_action", "test_implementation", "decide_action", "finalize_project"]);

    let ctx = &run.context;
    assert_eq!(ctx.state, "completed");
    assert_eq!(ctx.requirements.main_goal, "Build a todo CLI");
    assert_eq!(ctx.requirements.features, vec!["add items", "list items"]);
    assert_eq!(ctx.context.entry_points, vec!["main.py"]);
    assert_eq!(ctx.context.todos.len(), 1);
    assert_eq!(ctx.plan.current_step, 5);
    assert!(ctx.plan.validation.is_valid);
    assert_eq!(ctx.implementation.files_created.len(), 5);
    assert_eq!(ctx.implementation.tool_uses.len(), 5);

    let summary = ctx.summary.as_ref().unwrap();
    assert!(summary.tests_passed);
    assert_eq!(summary.status, "completed");
    assert_eq!(summary.total_actions, 17);

    assert_eq!(assistant.count(AssistantTask::Implement), 5);
    assert_eq!(assistant.count(AssistantTask::Test), 1);
    assert_eq!(assistant.count(AssistantTask::Refactor), 0);
}

#[tokio::test]
async fn test_failed_tests_trigger_refactor() {
    init_tracing();
    let dir = project();
    let assistant = Arc::new(ScriptedAssistant::with_test_logs(&[
        "1 test FAILED: assertion error",
        "2 tests ran, all ok",
    ]));
    let flow = coding_agent_flow(&Collaborators::local(assistant.clone()), &AgentConfig::default()).unwrap();

    let ctx = SharedContext::new("Build a todo CLI")
        .with_project_path(dir.path())
        .with_max_iterations(20);
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert_eq!(run.activations, 22);
    assert_eq!(
        &run.visited()[14..],
        &[
            "decide_action",
            "test_implementation",
            "decide_action",
            "refactor_code",
            "decide_action",
            "test_implementation",
            "decide_action",
            "finalize_project",
        ]
    );
    assert!(run.context.errors.is_empty());
    assert!(run.context.test_results.as_ref().unwrap().success);
    assert_eq!(run.context.implementation.files_modified, vec!["src/step_1.py"]);
    assert_eq!(assistant.count(AssistantTask::Refactor), 1);
    assert_eq!(assistant.count(AssistantTask::Test), 2);
}

#[tokio::test]
async fn test_iteration_limit_forces_complete() {
    let assistant = Arc::new(ScriptedAssistant::passing());
    let flow = coding_agent_flow(&Collaborators::local(assistant), &AgentConfig::default()).unwrap();

    let ctx = SharedContext::new("task").with_max_iterations(3);
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert_eq!(run.activations, 8);
    assert_eq!(run.context.current_iteration, 3);
    assert_eq!(run.context.state, "completed");
    assert!(!run.context.summary.as_ref().unwrap().tests_passed);

    let last_decision = run
        .trail()
        .iter()
        .rev()
        .find(|r| r.node == "decide_action")
        .unwrap();
    assert_eq!(last_decision.action_emitted, Some(Step::Complete.action()));
    assert!(last_decision.summary.contains("maximum iterations"));
}

#[tokio::test]
async fn test_unknown_decision_is_unrouted() {
    let collaborators = Collaborators::local(Arc::new(ScriptedAssistant::passing()))
        .with_decider(Arc::new(FixedDecider("deploy")));
    let flow = coding_agent_flow(&collaborators, &AgentConfig::default()).unwrap();

    let run = flow.run(SharedContext::new("task"), &RunConfig::default()).await.unwrap();

    assert_eq!(run.activations, 3);
    let routing = run.termination.routing_error().unwrap();
    assert_eq!(routing.node, "decide_action");
    assert_eq!(routing.action, Action::from("deploy".to_string()));
    assert_eq!(run.last_action.as_str(), "deploy");
}

#[tokio::test(start_paused = true)]
async fn test_broken_decider_falls_back_to_rules() {
    init_tracing();
    let decider = Arc::new(BrokenDecider::default());
    let collaborators = Collaborators::local(Arc::new(ScriptedAssistant::passing()))
        .with_decider(decider.clone());
    let flow = coding_agent_flow(&collaborators, &AgentConfig::default()).unwrap();

    let started = tokio::time::Instant::now();
    let run = flow.run(SharedContext::new("task"), &RunConfig::default()).await.unwrap();

    assert_eq!(run.context.state, "completed");
    assert_eq!(run.activations, 18);
    // Eight decisions, three attempts each, two 2s waits between them.
    assert_eq!(decider.calls.load(Ordering::SeqCst), 24);
    assert!(started.elapsed() >= Duration::from_secs(32));

    let decisions: Vec<_> = run
        .trail()
        .iter()
        .filter(|r| r.node == "decide_action")
        .map(|r| r.attempts)
        .collect();
    assert_eq!(decisions, vec![3; 8]);
}

#[tokio::test]
async fn test_repeated_plan_decisions_move_to_implement() {
    let collaborators = Collaborators::local(Arc::new(ScriptedAssistant::passing()))
        .with_decider(Arc::new(FixedDecider("plan")));
    let flow = coding_agent_flow(&collaborators, &AgentConfig::default()).unwrap();

    let ctx = SharedContext::new("task").with_max_iterations(5);
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert_eq!(run.activations, 12);
    assert_eq!(run.context.history().count_action(&Step::Plan.action()), 3);
    assert_eq!(run.context.history().count_node("create_plan"), 3);

    let coerced = run
        .trail()
        .iter()
        .filter(|r| r.node == "decide_action")
        .nth(3)
        .unwrap();
    assert_eq!(coerced.action_emitted, Some(Step::Implement.action()));
    assert!(coerced.summary.contains("multiple planning attempts"));
}

#[tokio::test(start_paused = true)]
async fn test_implement_timeout_emits_error() {
    init_tracing();
    let assistant = Arc::new(ScriptedAssistant::passing().slow_implement(Duration::from_secs(10)));
    let config = AgentConfig {
        implement_timeout_secs: 1,
        ..AgentConfig::default()
    };
    let flow = iterative_coding_flow(&Collaborators::local(assistant.clone()), &config).unwrap();

    let mut ctx = SharedContext::new("task");
    ctx.requirements = Requirements {
        main_goal: "task".to_string(),
        ..Requirements::default()
    };
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert_eq!(run.activations, 4);
    let routing = run.termination.routing_error().unwrap();
    assert_eq!(routing.node, "implement_code");
    assert_eq!(routing.action.as_str(), "error");
    assert_eq!(run.context.errors, vec!["Implementation failed: Timeout after 1s"]);
    assert_eq!(run.context.plan.current_step, 0);
    assert_eq!(assistant.count(AssistantTask::Implement), 5);
}

#[tokio::test]
async fn test_implement_errors_route_to_refactor() {
    let collaborators = Collaborators::local(Arc::new(ScriptedAssistant::passing()))
        .with_decider(Arc::new(FixedDecider("implement")));
    let flow = coding_agent_flow(&collaborators, &AgentConfig::default()).unwrap();

    // Every step is already done, so there is nothing left to implement.
    let mut ctx = SharedContext::new("task").with_max_iterations(2);
    ctx.plan.steps = flowagent::default_plan("task");
    ctx.plan.current_step = ctx.plan.steps.len();
    let run = flow.run(ctx, &RunConfig::default()).await.unwrap();

    assert_eq!(
        run.visited(),
        vec![
            "understand_requirements",
            "analyze_context",
            "decide_action",
            "implement_code",
            "refactor_code",
            "decide_action",
            "finalize_project",
        ]
    );
    assert_eq!(run.trail()[3].action_emitted, Some(Action::from("error")));
    assert_eq!(run.context.implementation.errors, vec!["No step to implement"]);
    assert!(run.context.errors.is_empty());
    assert_eq!(run.context.state, "completed");
}

#[tokio::test]
async fn test_empty_task_is_fatal() {
    let flow = simple_coding_flow(
        &Collaborators::local(Arc::new(ScriptedAssistant::passing())),
        &AgentConfig::default(),
    )
    .unwrap();

    let err = flow.run(SharedContext::new("   "), &RunConfig::default()).await.unwrap_err();
    let fatal = err.as_fatal().unwrap();
    match &fatal.cause {
        FatalCause::Node { node, phase, error, .. } => {
            assert_eq!(node, "understand_requirements");
            assert_eq!(*phase, Phase::Prepare);
            assert_eq!(*error, NodeError::MissingInput("task".to_string()));
        }
        other => panic!("unexpected cause: {:?}", other),
    }
    assert_eq!(fatal.activation, 1);
    assert_eq!(fatal.trail.len(), 1);
}

#[tokio::test]
async fn test_simple_flow_runs_linearly() {
    let assistant = Arc::new(ScriptedAssistant::passing());
    let flow = simple_coding_flow(&Collaborators::local(assistant.clone()), &AgentConfig::default()).unwrap();

    let run = flow.run(SharedContext::new("task"), &RunConfig::default()).await.unwrap();

    assert_eq!(
        run.visited(),
        vec![
            "understand_requirements",
            "analyze_context",
            "create_plan",
            "implement_code",
            "test_implementation",
            "finalize_project",
        ]
    );
    assert_eq!(run.context.plan.current_step, 1);
    assert_eq!(run.context.implementation.files_created, vec!["src/step_1.py"]);
    assert!(run.context.summary.unwrap().tests_passed);
}

#[tokio::test]
async fn test_batch_of_agent_runs() {
    let flow = simple_coding_flow(
        &Collaborators::local(Arc::new(ScriptedAssistant::passing())),
        &AgentConfig::default(),
    )
    .unwrap();
    let batch = BatchFlow::new(&flow, BatchConfig::concurrent(2));

    let mut base = SharedContext::default();
    let report = batch
        .run(&base, vec!["first task", "", "third task"], |ctx, task| {
            ctx.task = task.to_string();
        })
        .await;

    assert_eq!(report.failed_indices(), vec![1]);
    assert_eq!(report.items[2].run().unwrap().context.requirements.main_goal, "third task");

    report.merge_into(&mut base);
    assert_eq!(base.implementation.files_created.len(), 2);
}
