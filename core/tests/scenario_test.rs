use aquanet_core::graph::{
    classify_pipe, diagram_edges, resolve_edges, Activation, EdgeLink, EdgeResolver, Graph, Node,
    NodeKind, PipeSize, Scenario, ScenarioCatalog, DYNAMIC_SCENARIO,
};

fn base_edges() -> Vec<EdgeLink> {
    vec![
        EdgeLink::new("T1", "P1").with_priority(10),
        EdgeLink::new("P1", "V1").with_priority(8).with_flowing(true),
        EdgeLink::new("V1", "T2").with_relation("Gravedad"),
        EdgeLink::new("T2", "M1").with_flowing(false),
    ]
}

#[test]
fn no_scenario_activates_everything() {
    let edges = resolve_edges(&base_edges(), &Activation::All);
    assert_eq!(edges.len(), 4);
    assert!(edges.iter().all(|e| e.active));
    assert_eq!(Activation::default(), Activation::All);
}

#[test]
fn scenario_membership_decides_active() {
    let scenario = Scenario::new("night", ["T1>P1", "V1>T2", "X>Y"]);
    let edges = resolve_edges(&base_edges(), &Activation::Scenario(scenario.clone()));
    for edge in &edges {
        assert_eq!(edge.active, scenario.contains(&edge.key()), "{}", edge.key());
    }
    assert!(edges[0].active);
    assert!(!edges[1].active);
    assert!(edges[2].active);
    assert!(!edges[3].active);
}

#[test]
fn key_is_ordered_pair() {
    let scenario = Scenario::new("reverse", ["P1>T1"]);
    let edges = resolve_edges(&base_edges(), &Activation::Scenario(scenario));
    assert!(!edges[0].active);
}

#[test]
fn dynamic_activation_follows_backend_flag() {
    let edges = resolve_edges(&base_edges(), &Activation::Dynamic);
    let active: Vec<bool> = edges.iter().map(|e| e.active).collect();
    // A missing flag counts as not flowing
    assert_eq!(active, vec![false, true, false, false]);
}

#[test]
fn pipe_classification_table() {
    assert_eq!(classify_pipe(Some("gravity main"), Some(10)), Some(PipeSize::Gravity));
    assert_eq!(classify_pipe(Some("linea por GRAVEDAD"), Some(8)), Some(PipeSize::Gravity));
    assert_eq!(classify_pipe(Some("gravity"), None), Some(PipeSize::Gravity));
    assert_eq!(classify_pipe(None, Some(10)), Some(PipeSize::Ten));
    assert_eq!(classify_pipe(Some("bombeo"), Some(10)), Some(PipeSize::Ten));
    assert_eq!(classify_pipe(Some("bombeo"), Some(8)), Some(PipeSize::Eight));
    assert_eq!(classify_pipe(None, Some(9)), None);
    assert_eq!(classify_pipe(Some("bombeo"), None), None);
    assert_eq!(classify_pipe(None, None), None);
}

#[test]
fn pipe_serializes_as_short_label() {
    let edges = resolve_edges(&base_edges(), &Activation::All);
    let json = serde_json::to_value(&edges).unwrap();
    assert_eq!(json[0]["pipe"], "10");
    assert_eq!(json[1]["pipe"], "8");
    assert_eq!(json[2]["pipe"], "G");
    assert!(json[3].get("pipe").is_none());
    assert_eq!(PipeSize::Gravity.as_str(), "G");
}

#[test]
fn resolver_memoizes_on_inputs() {
    let mut resolver = EdgeResolver::new();
    let edges = base_edges();
    let night = Activation::Scenario(Scenario::new("night", ["T1>P1"]));

    let first = resolver.resolve(&edges, &Activation::All);
    let again = resolver.resolve(&edges, &Activation::All);
    assert_eq!(resolver.computations(), 1);
    assert!(std::sync::Arc::ptr_eq(&first, &again));

    let scoped = resolver.resolve(&edges, &night);
    assert_eq!(resolver.computations(), 2);
    assert!(!scoped[1].active);

    let mut changed = edges.clone();
    changed.push(EdgeLink::new("M1", "T1"));
    let grown = resolver.resolve(&changed, &night);
    assert_eq!(resolver.computations(), 3);
    assert_eq!(grown.len(), 5);
}

#[test]
fn diagram_edges_skip_unresolvable_endpoints() {
    let graph = Graph::new(
        vec![
            Node::new("T1", NodeKind::from_label("tank"), 0.0, 0.0),
            Node::new("P1", NodeKind::from_label("pump"), 80.0, 20.0),
        ],
        vec![EdgeLink::new("T1", "P1"), EdgeLink::new("P1", "V9")],
    );
    let resolved = resolve_edges(graph.edges(), &Activation::All);
    let views = diagram_edges(&graph, &resolved);
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].key, "T1>P1");
    assert_eq!(views[0].path, "M 0 0 H 40 V 20 H 80");
}

#[test]
fn catalog_loads_from_json() {
    let catalog =
        ScenarioCatalog::from_json(r#"{"day": ["T1>P1", "P1>V1"], "night": ["V1>T2"]}"#).unwrap();
    assert_eq!(catalog.names(), vec!["day".to_string(), "night".to_string()]);
    assert!(catalog.get("day").unwrap().contains("P1>V1"));
    assert!(catalog.get("dawn").is_none());
    assert!(ScenarioCatalog::from_json("[1,2]").is_err());
}

#[test]
fn resolver_keeps_results_for_alternating_scenarios() {
    let mut resolver = EdgeResolver::new();
    let edges = base_edges();
    let night = Activation::Scenario(Scenario::new("night", ["T1>P1"]));

    for _ in 0..5 {
        resolver.resolve(&edges, &Activation::All);
        resolver.resolve(&edges, &night);
        resolver.resolve(&edges, &Activation::Dynamic);
    }
    assert_eq!(resolver.computations(), 3);
    assert_eq!(resolver.cached_len(), 3);
}

#[test]
fn resolver_evicts_least_recently_used() {
    let mut resolver = EdgeResolver::with_capacity(2);
    let edges = base_edges();
    let night = Activation::Scenario(Scenario::new("night", ["T1>P1"]));

    resolver.resolve(&edges, &Activation::All);
    resolver.resolve(&edges, &night);
    // Touch All so night becomes the oldest entry
    resolver.resolve(&edges, &Activation::All);
    resolver.resolve(&edges, &Activation::Dynamic);
    assert_eq!(resolver.computations(), 3);
    assert_eq!(resolver.cached_len(), 2);

    resolver.resolve(&edges, &Activation::All);
    assert_eq!(resolver.computations(), 3);
    resolver.resolve(&edges, &night);
    assert_eq!(resolver.computations(), 4);
}

#[test]
fn dynamic_name_is_reserved_in_catalog() {
    let catalog =
        ScenarioCatalog::from_json(r#"{"dynamic": ["T1>P1"], "Dynamic": [], "night": ["V1>T2"]}"#)
            .unwrap();
    assert_eq!(catalog.names(), vec!["night".to_string()]);
    assert!(catalog.get(DYNAMIC_SCENARIO).is_none());

    let mut catalog = ScenarioCatalog::new();
    assert!(!catalog.insert(Scenario::new(DYNAMIC_SCENARIO, ["T1>P1"])));
    assert!(catalog.insert(Scenario::new("day", ["T1>P1"])));
    assert_eq!(catalog.len(), 1);
}
