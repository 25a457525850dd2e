mod common;

use std::sync::Arc;

use common::{abc_crew, setup, CrewBuilder, ScriptedRunner};
use crewline_core::api::{
    CrewStatus, EngineError, ErrorKind, ExecutionStore, GraphError, RunMode, TriggerRequest,
};

async fn rejected(crew: crewline_core::api::Crew, request: TriggerRequest) -> EngineError {
    let runner = Arc::new(ScriptedRunner::new("ok", 1));
    let crew_id = crew.id.clone();
    let (store, engine) = setup(vec![crew], runner.clone()).await;

    let err = engine.trigger(request).await.unwrap_err();

    // nothing is written for a rejected launch
    assert!(store.list_executions(&crew_id).await.unwrap().is_empty());
    assert!(runner.calls().is_empty());
    err
}

#[tokio::test]
async fn cycle_is_rejected_before_anything_is_written() {
    let crew = CrewBuilder::sequential("loop")
        .agent("w", "writer")
        .task("A", Some("w"), &["C"])
        .task("B", Some("w"), &["A"])
        .task("C", Some("w"), &["B"])
        .build();

    let err = rejected(crew, TriggerRequest::new("loop")).await;
    assert_eq!(err.kind(), ErrorKind::Configuration);
    match err {
        EngineError::Graph(GraphError::Cycle(ids)) => {
            assert_eq!(ids, vec!["A", "C", "B", "A"]);
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
}

#[tokio::test]
async fn sequential_task_without_agent_is_rejected() {
    let crew = CrewBuilder::sequential("orphan")
        .agent("w", "writer")
        .task("A", Some("w"), &[])
        .task("B", None, &["A"])
        .build();

    let err = rejected(crew, TriggerRequest::new("orphan")).await;
    assert!(matches!(err, EngineError::Graph(GraphError::UnassignedTask(ref id)) if id == "B"));
}

#[tokio::test]
async fn dependency_outside_the_crew_is_rejected() {
    let crew = CrewBuilder::sequential("dangling")
        .agent("w", "writer")
        .task("A", Some("w"), &["ghost"])
        .build();

    let err = rejected(crew, TriggerRequest::new("dangling")).await;
    assert!(matches!(err, EngineError::Graph(GraphError::DependencyNotFound { .. })));
}

#[tokio::test]
async fn inactive_crew_is_rejected() {
    for status in [CrewStatus::Draft, CrewStatus::Archived] {
        let crew = CrewBuilder::sequential("idle")
            .agent("w", "writer")
            .task("A", Some("w"), &[])
            .status(status)
            .build();
        let err = rejected(crew, TriggerRequest::new("idle")).await;
        assert!(matches!(err, EngineError::CrewNotActive { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[tokio::test]
async fn mode_without_runner_is_rejected() {
    let err = rejected(abc_crew("abc"), TriggerRequest::new("abc").mode(RunMode::Real)).await;
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn unknown_crew_is_not_found() {
    let runner = Arc::new(ScriptedRunner::new("ok", 1));
    let (_store, engine) = setup(vec![], runner).await;
    let err = engine.trigger(TriggerRequest::new("nope")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn validate_crew_reports_the_plan() {
    let runner = Arc::new(ScriptedRunner::new("ok", 1));
    let (_store, engine) = setup(vec![], runner).await;
    let summary = engine.validate_crew(&abc_crew("abc")).unwrap();
    assert_eq!(summary.steps, vec![vec!["A", "B", "C"]]);
    assert_eq!(summary.manager, None);
}
