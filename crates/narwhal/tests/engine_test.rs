use std::thread;
use std::time::{Duration, Instant};

use narwhal::{
    Constraint, ConstraintKind, ConstraintParams, ConstraintSpec, EdgeSpec, EngineConfig, Error,
    LayoutEngine, NodeSpec, Phase, PipelineState, PolishMode,
};

fn square() -> (Vec<NodeSpec>, Vec<EdgeSpec>) {
    (
        vec![
            NodeSpec::new("a"),
            NodeSpec::new("b"),
            NodeSpec::new("c"),
            NodeSpec::new("d"),
        ],
        vec![
            EdgeSpec::new("ab", "a", "b"),
            EdgeSpec::new("bc", "b", "c"),
            EdgeSpec::new("cd", "c", "d"),
            EdgeSpec::new("da", "d", "a"),
        ],
    )
}

fn engine() -> LayoutEngine {
    let engine = LayoutEngine::spawn(EngineConfig::default()).unwrap();
    let (nodes, edges) = square();
    engine.sync_graph(nodes, edges).unwrap();
    engine
}

fn wait_for(engine: &LayoutEngine, state: PipelineState) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if engine.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn one_shot_phase_publishes_a_snapshot() {
    let engine = engine();

    let report = engine.run_phase_and_wait(Phase::Draft).unwrap();
    assert_eq!(report.phase, Phase::Draft);
    assert_eq!(report.embed.map(|e| e.leaves), Some(4));

    let snapshot = engine.position_snapshot();
    assert!(snapshot.generation >= 1);
    assert_eq!(snapshot.nodes.len(), 4);
    assert_eq!(engine.state(), PipelineState::Idle);
}

#[test]
fn snapshot_generations_increase() {
    let engine = engine();
    let mut last = engine.position_snapshot().generation;
    for _ in 0..5 {
        engine.flush().unwrap();
        let generation = engine.position_snapshot().generation;
        assert!(generation > last);
        last = generation;
    }
}

#[test]
fn stop_polish_halts_ticking() {
    let engine = engine();
    engine.run_phase_and_wait(Phase::Randomize).unwrap();
    engine.start_polish().unwrap();
    assert!(wait_for(
        &engine,
        PipelineState::Polishing(PolishMode::Continuous)
    ));
    thread::sleep(Duration::from_millis(20));

    engine.stop_polish().unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.state(), PipelineState::Idle);
    let stopped = engine.position_snapshot();

    thread::sleep(Duration::from_millis(50));
    engine.flush().unwrap();
    let later = engine.position_snapshot();
    assert!(later.generation > stopped.generation);
    assert_eq!(later.nodes, stopped.nodes);
}

#[test]
fn dragged_nodes_follow_the_pointer_not_the_physics() {
    let engine = engine();
    engine.run_phase_and_wait(Phase::Draft).unwrap();
    let start = engine.position_snapshot().get("a").cloned().unwrap();

    engine.on_drag_start("a").unwrap();
    engine.start_polish().unwrap();
    engine.on_drag("a", 15.0, -5.0).unwrap();
    thread::sleep(Duration::from_millis(30));
    engine.flush().unwrap();

    let dragged = engine.position_snapshot().get("a").cloned().unwrap();
    assert!(dragged.fixed);
    assert!((dragged.x - (start.x + 15.0)).abs() < 1e-9);
    assert!((dragged.y - (start.y - 5.0)).abs() < 1e-9);

    engine.stop_polish().unwrap();
    engine.on_drag_end("a").unwrap();
    engine.flush().unwrap();
    assert!(!engine.position_snapshot().get("a").unwrap().fixed);
    // the release burst runs down on its own
    assert!(wait_for(&engine, PipelineState::Idle));
}

#[test]
fn constraint_records_are_applied_by_enforce() {
    let engine = engine();
    engine.run_phase_and_wait(Phase::Draft).unwrap();
    engine
        .sync_constraint_specs(vec![
            ConstraintSpec {
                kind: ConstraintKind::AlignVertical,
                node_ids: vec!["a".into(), "c".into(), "ghost".into()],
                params: ConstraintParams::default(),
            },
            ConstraintSpec {
                kind: ConstraintKind::RelativeLeftRight,
                node_ids: vec!["b".into()],
                params: ConstraintParams { gap: 10.0 },
            },
        ])
        .unwrap();

    let report = engine.run_phase_and_wait(Phase::Enforce).unwrap();
    let enforce = report.enforce.unwrap();
    assert!(enforce.converged);
    assert_eq!(enforce.unknown_ids, 1);

    let snapshot = engine.position_snapshot();
    let (a, c) = (snapshot.get("a").unwrap(), snapshot.get("c").unwrap());
    assert!((a.x - c.x).abs() < 1e-5);
}

#[test]
fn resyncing_the_same_graph_keeps_positions() {
    let engine = engine();
    engine.run_phase_and_wait(Phase::Draft).unwrap();
    let before = engine.position_snapshot();

    let (nodes, edges) = square();
    engine.sync_graph(nodes, edges).unwrap();
    engine.flush().unwrap();
    assert_eq!(engine.position_snapshot().nodes, before.nodes);
}

#[test]
fn calls_after_shutdown_fail() {
    let mut engine = engine();
    engine.flush().unwrap();
    assert!(engine.is_running());

    engine.shutdown();
    assert!(!engine.is_running());
    assert!(matches!(engine.flush(), Err(Error::EngineStopped)));
    assert!(matches!(
        engine.run_phase(Phase::Polish),
        Err(Error::EngineStopped)
    ));
    // the last snapshot stays readable
    assert_eq!(engine.position_snapshot().nodes.len(), 4);
    engine.shutdown();
}

#[test]
fn dropping_a_polishing_engine_joins_the_worker() {
    let engine = engine();
    engine.start_polish().unwrap();
    thread::sleep(Duration::from_millis(10));
    drop(engine);
}

#[test]
fn syncing_constraints_enforces_them_right_away() {
    let engine = LayoutEngine::spawn(EngineConfig::default()).unwrap();
    engine
        .sync_graph(
            vec![NodeSpec::new("a").at(0.0, 0.0), NodeSpec::new("c").at(100.0, 50.0)],
            vec![],
        )
        .unwrap();
    engine.flush().unwrap();

    engine
        .sync_constraints(vec![Constraint::AlignVertical(vec!["a".into(), "c".into()])])
        .unwrap();
    engine.flush().unwrap();

    let snapshot = engine.position_snapshot();
    let (a, c) = (snapshot.get("a").unwrap(), snapshot.get("c").unwrap());
    assert!((a.x - 50.0).abs() < 1e-9);
    assert!((c.x - 50.0).abs() < 1e-9);
    assert_eq!((a.y, c.y), (0.0, 50.0));
    assert_eq!(engine.state(), PipelineState::Idle);
}

#[test]
fn polish_ticks_are_paced_by_max_tick_hz() {
    let engine = LayoutEngine::spawn(EngineConfig {
        release_ticks: 10,
        max_tick_hz: 50.0,
        ..EngineConfig::default()
    })
    .unwrap();
    let (nodes, edges) = square();
    engine.sync_graph(nodes, edges).unwrap();
    engine.on_drag_start("a").unwrap();

    let started = Instant::now();
    engine.on_drag_end("a").unwrap();
    engine.flush().unwrap();
    assert!(matches!(
        engine.state(),
        PipelineState::Polishing(PolishMode::Burst { .. })
    ));
    assert!(wait_for(&engine, PipelineState::Idle));
    // ten ticks at most fifty per second
    assert!(started.elapsed() >= Duration::from_millis(150));
}
