use mesh_amr::prelude::*;

const CONFIG: &str = r#"[
    {
        "kind": "gradient",
        "name": "T front",
        "variable": "T",
        "cmax": 0.01,
        "maxlevel": 4,
        "maxcells": 500,
        "cost_export": "cost"
    },
    {
        "kind": "function",
        "variable": "T",
        "active": false
    }
]"#;

/// Step in T across x = 0.5.
fn step_forest() -> QuadForest {
    let mut forest = QuadForest::uniform(ForestLayout::default(), 2).unwrap();
    forest.add_variable("T", "temperature").unwrap();
    for leaf in forest.leaves() {
        let t = if forest.center(leaf)[0] > 0.5 { 1.0 } else { 0.0 };
        forest.set_value("T", leaf, t).unwrap();
    }
    forest
}

#[test]
fn criteria_built_from_json_track_a_front() {
    let configs: Vec<CriterionConfig> = serde_json::from_str(CONFIG).unwrap();
    assert_eq!(configs[0].minlevel, 0);
    assert_eq!(configs[1].maxlevel, 5);

    let registry = CriterionRegistry::<QuadForest>::with_builtin();
    let mut adaptor = MeshAdaptor::new();
    for config in &configs {
        adaptor.add_criterion(registry.build(config).unwrap()).unwrap();
    }
    assert_eq!(adaptor.criteria()[0].name(), "T front");

    let mut forest = step_forest();
    for _ in 0..4 {
        adaptor.adapt(&mut forest, &NoComm).unwrap();
    }
    assert!(forest.leaf_count() <= 500);
    let front = forest.locate(4, [7, 4]).unwrap();
    assert_eq!(forest.level(front), 4);
    let far = forest.locate(4, [0, 0]).unwrap();
    assert!(forest.level(far) < 4);
    assert!(forest.fields().contains("cost"));
    assert!(forest.validate_grading().is_ok());

    let stats = adaptor.stats();
    assert_eq!(stats.ncells.n(), 4);
    assert_eq!(stats.cmax.n(), 4);
    assert!(stats.created > 0);
}

#[test]
fn unknown_fields_are_rejected() {
    let bad = r#"{ "kind": "gradient", "variable": "T", "cmx": 0.1 }"#;
    assert!(serde_json::from_str::<CriterionConfig>(bad).is_err());
}

#[test]
fn stats_report_and_reset() {
    let mut forest = QuadForest::uniform(ForestLayout::default(), 1).unwrap();
    let mut adaptor = MeshAdaptor::new();
    adaptor
        .add_criterion(
            Criterion::new("all")
                .with_model(FunctionCost::<2>::new(|_, _| 1.0))
                .with_cmax(0.5)
                .with_max_level(2),
        )
        .unwrap();
    adaptor.adapt(&mut forest, &NoComm).unwrap();
    let report = adaptor.stats().to_string();
    assert!(report.starts_with("Adaptive mesh refinement statistics"));
    assert!(report.contains("Cells created:         12"));
    // the local balancer records no cost threshold
    assert!(!report.contains("Max cost"));

    let json = serde_json::to_string(adaptor.stats()).unwrap();
    let back: AdaptStats = serde_json::from_str(&json).unwrap();
    assert_eq!(back.created, 12);

    adaptor.reset_stats();
    assert_eq!(adaptor.stats(), &AdaptStats::default());
}
