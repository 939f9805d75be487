use narwhal::{
    Constraint, CoordinateTransform, EdgeSpec, EngineConfig, GraphModel, LayoutPipeline,
    NodeSpec, Phase, PipelineState, PolishMode,
};

fn specs() -> (Vec<NodeSpec>, Vec<EdgeSpec>) {
    let nodes = vec![
        NodeSpec::new("hub"),
        NodeSpec::new("left"),
        NodeSpec::new("right"),
        NodeSpec::new("group"),
        NodeSpec::new("g1").with_parent("group"),
        NodeSpec::new("g2").with_parent("group"),
    ];
    let edges = vec![
        EdgeSpec::new("hl", "hub", "left"),
        EdgeSpec::new("hr", "hub", "right"),
        EdgeSpec::new("hg", "hub", "group"),
        EdgeSpec::new("g12", "g1", "g2"),
    ];
    (nodes, edges)
}

fn model() -> GraphModel {
    let (nodes, edges) = specs();
    let mut g = GraphModel::new();
    g.reconcile(&nodes, &edges);
    g
}

fn constraints() -> Vec<Constraint> {
    vec![
        Constraint::RelativeLeftRight {
            left: "left".into(),
            right: "right".into(),
            gap: 100.0,
        },
        Constraint::AlignHorizontal(vec!["left".into(), "right".into()]),
    ]
}

#[test]
fn full_run_visits_every_phase_in_order() {
    let mut g = model();
    let mut pipeline = LayoutPipeline::new(EngineConfig {
        polish_ticks: 100,
        ..EngineConfig::default()
    });
    let reports = pipeline.run_full(&mut g, &constraints());
    let phases: Vec<Phase> = reports.iter().map(|r| r.phase).collect();
    assert_eq!(phases, Phase::ALL.to_vec());
    assert_eq!(pipeline.state(), PipelineState::Idle);

    let polish = &reports[4];
    assert_eq!(polish.ticks, 100);
    assert!(polish.enforce.is_some());
    assert!(reports[1].embed.is_some());
}

#[test]
fn full_run_satisfies_constraints_and_compound_bounds() {
    let mut g = model();
    let mut pipeline = LayoutPipeline::new(EngineConfig::default());
    pipeline.run_full(&mut g, &constraints());

    let left = g.node("left").unwrap();
    let right = g.node("right").unwrap();
    assert!(right.x - left.x >= 100.0 - 1e-6);
    assert!((right.y - left.y).abs() < 1e-5);

    let group = g.node("group").unwrap().rect();
    for id in ["g1", "g2"] {
        assert!(group.contains_rect(&g.node(id).unwrap().rect(), 1e-9));
    }
    for n in g.nodes() {
        assert!(n.x.is_finite() && n.y.is_finite());
    }
}

#[test]
fn same_seed_gives_the_same_layout() {
    let run = || {
        let mut g = model();
        let mut pipeline = LayoutPipeline::new(EngineConfig {
            polish_ticks: 50,
            ..EngineConfig::default()
        });
        pipeline.run_full(&mut g, &constraints());
        g.snapshot(0)
    };
    assert_eq!(run(), run());
}

#[test]
fn transform_phase_rotates_the_layout() {
    let mut g = GraphModel::new();
    g.reconcile(
        &[NodeSpec::new("a").at(-10.0, 0.0), NodeSpec::new("b").at(10.0, 0.0)],
        &[],
    );
    let mut pipeline = LayoutPipeline::new(EngineConfig::default());
    assert_eq!(pipeline.run_phase(&mut g, &[], Phase::Transform).moved, 0);

    pipeline.set_transform(CoordinateTransform::Rotate90);
    let report = pipeline.run_phase(&mut g, &[], Phase::Transform);
    assert_eq!(report.moved, 2);
    let a = g.node("a").unwrap();
    assert!(a.x.abs() < 1e-9 && (a.y + 10.0).abs() < 1e-9);
}

#[test]
fn randomize_scatters_only_free_leaves() {
    let mut g = GraphModel::new();
    g.reconcile(
        &[
            NodeSpec::new("pin").at(5.0, 5.0).pinned(),
            NodeSpec::new("a").at(0.0, 0.0),
            NodeSpec::new("b").at(0.0, 0.0),
        ],
        &[],
    );
    let mut pipeline = LayoutPipeline::new(EngineConfig::default());
    let report = pipeline.run_phase(&mut g, &[], Phase::Randomize);
    assert_eq!(report.moved, 2);
    let pin = g.node("pin").unwrap();
    assert_eq!((pin.x, pin.y), (5.0, 5.0));
    assert_ne!(g.node("a").unwrap().position(), g.node("b").unwrap().position());
}

#[test]
fn continuous_polish_steps_until_stopped() {
    let mut g = model();
    let mut pipeline = LayoutPipeline::new(EngineConfig::default());
    pipeline.start_polishing();
    assert!(pipeline.is_polishing());
    for _ in 0..10 {
        let stats = pipeline.step(&mut g, &constraints()).unwrap();
        assert!(stats.moved > 0);
    }
    assert_eq!(
        pipeline.state(),
        PipelineState::Polishing(PolishMode::Continuous)
    );

    pipeline.stop_polishing();
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(pipeline.step(&mut g, &constraints()).is_none());
}

#[test]
fn headless_layout_returns_every_node() {
    let (nodes, edges) = specs();
    let snapshot = narwhal::layout(&nodes, &edges, &constraints(), EngineConfig::default());
    assert_eq!(snapshot.nodes.len(), nodes.len());
    let left = snapshot.get("left").unwrap();
    let right = snapshot.get("right").unwrap();
    assert!(right.x - left.x >= 100.0 - 1e-6);
}

#[test]
fn config_reads_partial_json_and_rejects_unknown_fields() {
    let config =
        EngineConfig::from_json_str(r#"{ "polishTicks": 12, "physics": { "gravity": 0.5 } }"#)
            .unwrap();
    assert_eq!(config.polish_ticks, 12);
    assert_eq!(config.physics.gravity, 0.5);
    assert_eq!(config.physics.repulsion, EngineConfig::default().physics.repulsion);

    let err = EngineConfig::from_json_str(r#"{ "polishTick": 12 }"#).unwrap_err();
    assert!(matches!(err, narwhal::Error::Config(_)));

    let json = EngineConfig::default().to_json_string().unwrap();
    assert_eq!(
        EngineConfig::from_json_str(&json).unwrap(),
        EngineConfig::default()
    );
}
