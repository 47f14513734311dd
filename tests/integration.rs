//! # SENTINEL Vantage - Integration Tests
//!
//! End-to-end tests that verify the complete analysis pipeline:
//! reasoner XML -> graph -> pruning -> path enumeration -> scoring ->
//! remediation synthesis -> what-if simulation.
//!
//! These tests write real files (attack-graph XML, topology TOML, an
//! SQLite vulnerability store, cost parameter files), load them through
//! the actual AnalysisSession entry point, and check the results against
//! hand-computed expectations.
//!
//! Unlike unit tests (which test components in isolation), these tests
//! exercise the pipeline exactly as the CLI would use it.

use std::fs;
use std::path::PathBuf;

use sentinel_vantage::graph::xml::{load_attack_graph, save_attack_graph};
use sentinel_vantage::paths::load_paths_xml;
use sentinel_vantage::remediation::{ActionType, VulnerabilityStore};
use sentinel_vantage::session::AnalysisSession;
use sentinel_vantage::{VantageConfig, VantageError};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Create a temporary directory for test files. Returns the path.
/// The caller is responsible for cleanup.
fn create_test_dir(test_name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join("sentinel-vantage-test")
        .join(test_name);
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("create test dir");
    dir
}

fn cleanup_test_dir(dir: &PathBuf) {
    let _ = fs::remove_dir_all(dir);
}

/// A reasoner graph of the demo exploit: the attacker on the internet
/// reaches execCode on the web server through an httpd vulnerability.
///
/// Wire format note: the reasoner swaps src and dst, so <src> carries the
/// derived vertex and <dst> the prerequisite.
const EXPLOIT_GRAPH_XML: &str = r#"<attack_graph>
  <arcs>
    <arc><src>2</src><dst>1</dst></arc>
    <arc><src>2</src><dst>4</dst></arc>
    <arc><src>3</src><dst>2</dst></arc>
    <arc><src>4</src><dst>5</dst></arc>
    <arc><src>5</src><dst>6</dst></arc>
    <arc><src>5</src><dst>7</dst></arc>
  </arcs>
  <vertices>
    <vertex><id>1</id><fact>vulExists(webServer,'CVE-2012-3951',httpd)</fact><metric>0</metric><type>LEAF</type></vertex>
    <vertex><id>2</id><fact>RULE 2 (remote exploit of a server program)</fact><metric>0.8</metric><type>AND</type></vertex>
    <vertex><id>3</id><fact>execCode(webServer,root)</fact><metric>1</metric><type>OR</type></vertex>
    <vertex><id>4</id><fact>netAccess(webServer,tcp,80)</fact><metric>0.6</metric><type>OR</type></vertex>
    <vertex><id>5</id><fact>RULE 6 (direct network access)</fact><metric>0.5</metric><type>AND</type></vertex>
    <vertex><id>6</id><fact>hacl(internet,webServer,tcp,80)</fact><metric>0</metric><type>LEAF</type></vertex>
    <vertex><id>7</id><fact>attackerLocated(internet)</fact><metric>0</metric><type>LEAF</type></vertex>
  </vertices>
</attack_graph>"#;

const TOPOLOGY_TOML: &str = r#"internet_host = "internet_host"

[[hosts]]
name = "internet_host"
ips = ["1.1.1.1"]
metric = 0.0

[[hosts]]
name = "gateway"
ips = ["192.168.240.1"]
metric = 1.0

[[hosts]]
name = "webServer"
ips = ["192.168.240.200"]
metric = 5.0
services = ["httpd"]

[[routes]]
hops = ["internet_host", "gateway", "webServer"]
"#;

/// Write every collaborator file and return a ready configuration.
fn write_environment(dir: &PathBuf) -> VantageConfig {
    fs::write(dir.join("attack-graph.xml"), EXPLOIT_GRAPH_XML).expect("write graph");
    fs::write(dir.join("topology.toml"), TOPOLOGY_TOML).expect("write topology");

    let cost_dir = dir.join("cost-parameters");
    fs::create_dir_all(&cost_dir).expect("create cost dir");
    fs::write(
        cost_dir.join("patch.toml"),
        "remediation_cost = 400.0\ndeployment_duration = 2.0\nwork_cost = 50.0\n",
    )
    .expect("write patch costs");
    fs::write(
        cost_dir.join("firewall-rule.toml"),
        "deployment_duration = 0.5\nwork_cost = 50.0\n",
    )
    .expect("write firewall costs");

    let db_path = dir.join("vulnerabilities.db");
    {
        let store = VulnerabilityStore::open(&db_path).expect("open store");
        let vuln = store
            .insert_vulnerability("CVE-2012-3951", "Scrutinizer SQL injection")
            .expect("insert vulnerability");
        store
            .insert_patch(vuln, "https://vendor.example/scrutinizer-fix", "upgrade to 9.5.2")
            .expect("insert patch");
        store
            .insert_rule(
                vuln,
                "alert tcp any any -> any 80 (msg:\"scrutinizer exploit\"; sid:99;)",
                "detects the exploit",
                Some(99),
                Some(1),
            )
            .expect("insert rule");
    }

    let mut config = VantageConfig::default();
    config.general.topology_file = dir.join("topology.toml");
    config.general.vulnerability_db = db_path;
    config.general.cost_parameters_dir = cost_dir;
    config
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_full_pipeline_from_files() {
    let dir = create_test_dir("full_pipeline");
    let config = write_environment(&dir);

    let session =
        AnalysisSession::load(config, &dir.join("attack-graph.xml")).expect("load session");

    // One goal, one way in: a single path covering the whole chain.
    assert_eq!(session.paths.len(), 1);
    let path = session.path(0).expect("path 0");
    assert_eq!(path.goal(), Some(3));
    assert_eq!(path.vertex_count(), 7);
    // vulExists halves the score once.
    assert!((path.scoring - 0.5).abs() < f64::EPSILON);

    // The web server's impact metric reached the execCode vertex.
    assert!((session.graph.vertex(3).expect("vertex 3").impact() - 5.0).abs() < f64::EPSILON);
    assert!(session.graph.global_score > 0.0);

    cleanup_test_dir(&dir);
}

#[test]
fn test_remediations_end_to_end() {
    let dir = create_test_dir("remediations");
    let config = write_environment(&dir);
    let session =
        AnalysisSession::load(config, &dir.join("attack-graph.xml")).expect("load session");

    let remediations = session.remediations_for_path(0).expect("path exists");
    assert!(!remediations.is_empty(), "the demo path must be remediable");

    // Ascending by cost, and the priced patch is not the cheapest plan.
    for pair in remediations.windows(2) {
        assert!(pair[0].cost <= pair[1].cost);
    }
    assert_ne!(remediations[0].actions[0].action.action_type, ActionType::ApplyPatch);

    // Patch, firewall and snort options all appear across the plans.
    let kinds: Vec<ActionType> = remediations
        .iter()
        .flat_map(|r| r.actions.iter().map(|a| a.action.action_type))
        .collect();
    assert!(kinds.contains(&ActionType::ApplyPatch));
    assert!(kinds.contains(&ActionType::DeployFirewallRule));
    assert!(kinds.contains(&ActionType::DeploySnortRule));

    // Every single plan breaks the only path when simulated.
    for remediation in &remediations {
        let outcome = session.simulate_remediation(remediation);
        assert!(
            outcome.remaining_paths.is_empty(),
            "plan with cost {} left the path standing",
            remediation.cost
        );
        assert!(outcome.graph.vertex_count() < session.graph.vertex_count());
    }
    // The live session is untouched by all those simulations.
    assert_eq!(session.graph.vertex_count(), 7);
    assert_eq!(session.paths.len(), 1);

    cleanup_test_dir(&dir);
}

#[test]
fn test_missing_graph_file_is_a_terminal_error() {
    let dir = create_test_dir("missing_graph");
    let config = write_environment(&dir);

    let result = AnalysisSession::load(config, &dir.join("no-such-file.xml"));
    assert!(matches!(result, Err(VantageError::Io(_))));

    cleanup_test_dir(&dir);
}

// ---------------------------------------------------------------------------
// File round-trips
// ---------------------------------------------------------------------------

#[test]
fn test_attack_graph_file_roundtrip() {
    let dir = create_test_dir("graph_roundtrip");
    fs::write(dir.join("attack-graph.xml"), EXPLOIT_GRAPH_XML).expect("write graph");

    let graph = load_attack_graph(&dir.join("attack-graph.xml")).expect("load");
    save_attack_graph(&graph, &dir.join("again.xml")).expect("save");
    let reloaded = load_attack_graph(&dir.join("again.xml")).expect("reload");

    assert_eq!(reloaded.vertex_count(), graph.vertex_count());
    assert_eq!(reloaded.arcs().len(), graph.arcs().len());
    for vertex in graph.vertices() {
        let copy = reloaded.vertex(vertex.id).expect("same vertex set");
        assert_eq!(copy.fact.raw, vertex.fact.raw);
        assert_eq!(copy.vertex_type, vertex.vertex_type);
        assert_eq!(copy.metric, vertex.metric);
    }
    for arc in graph.arcs() {
        assert!(reloaded.arcs().contains(arc));
    }

    cleanup_test_dir(&dir);
}

#[test]
fn test_scored_paths_file_rehydrates_against_live_graph() {
    let dir = create_test_dir("paths_roundtrip");
    let config = write_environment(&dir);
    let session =
        AnalysisSession::load(config, &dir.join("attack-graph.xml")).expect("load session");

    let out = dir.join("scored-paths.xml");
    session.save_scored_paths(&out).expect("save paths");

    let rehydrated = load_paths_xml(&out, &session.graph).expect("rehydrate");
    assert_eq!(rehydrated.len(), session.paths.len());
    assert_eq!(rehydrated[0].scoring, session.paths[0].scoring);
    assert_eq!(rehydrated[0].goal(), session.paths[0].goal());
    // Vertex identities line up with the live graph.
    for id in rehydrated[0].graph.ids() {
        assert!(session.graph.contains(id));
    }

    cleanup_test_dir(&dir);
}

// ---------------------------------------------------------------------------
// Scenario from the drawing board: LEAF(1)->AND(2)->OR(3)<-LEAF(4)
// ---------------------------------------------------------------------------

const SCENARIO_GRAPH_XML: &str = r#"<attack_graph>
  <arcs>
    <arc><src>2</src><dst>1</dst></arc>
    <arc><src>3</src><dst>2</dst></arc>
    <arc><src>3</src><dst>4</dst></arc>
  </arcs>
  <vertices>
    <vertex><id>1</id><fact>vulExists(webServer,'CVE-2012-3951',httpd)</fact><metric>0</metric><type>LEAF</type></vertex>
    <vertex><id>2</id><fact>RULE 2 (remote exploit of a server program)</fact><metric>0.5</metric><type>AND</type></vertex>
    <vertex><id>3</id><fact>execCode(webServer,root)</fact><metric>1</metric><type>OR</type></vertex>
    <vertex><id>4</id><fact>attackerLocated(webServer)</fact><metric>0</metric><type>LEAF</type></vertex>
  </vertices>
</attack_graph>"#;

#[test]
fn test_scenario_two_paths_and_cascade() {
    let dir = create_test_dir("scenario");
    fs::write(dir.join("attack-graph.xml"), SCENARIO_GRAPH_XML).expect("write graph");
    fs::write(dir.join("topology.toml"), TOPOLOGY_TOML).expect("write topology");

    let mut config = VantageConfig::default();
    config.general.topology_file = dir.join("topology.toml");
    config.general.vulnerability_db = dir.join("vulnerabilities.db");
    config.general.cost_parameters_dir = dir.join("cost-parameters");

    let session =
        AnalysisSession::load(config, &dir.join("attack-graph.xml")).expect("load session");

    // Exactly two ways to the goal: {1,2,3} and {4,3}.
    assert_eq!(session.paths.len(), 2);
    let mut vertex_sets: Vec<Vec<u32>> =
        session.paths.iter().map(|p| p.graph.ids()).collect();
    vertex_sets.sort();
    assert_eq!(vertex_sets, vec![vec![1, 2, 3], vec![3, 4]]);

    // Deleting vertex 1 kills the AND but the OR survives on leaf 4.
    let mut simulated = session.graph.clone();
    simulated.delete_vertex(1);
    assert!(!simulated.contains(1));
    assert!(!simulated.contains(2));
    assert!(simulated.contains(3));
    assert!(simulated.contains(4));

    // Deleting twice is a no-op.
    let vertices = simulated.vertex_count();
    simulated.delete_vertex(1);
    assert_eq!(simulated.vertex_count(), vertices);

    cleanup_test_dir(&dir);
}

#[test]
fn test_path_without_viable_cut_reports_no_remediation() {
    // The only remediable leaf is attackerLocated, which has no concrete
    // countermeasure: the answer is an empty list, not a failure.
    let dir = create_test_dir("no_remediation");
    let graph_xml = r#"<attack_graph>
  <arcs>
    <arc><src>2</src><dst>1</dst></arc>
  </arcs>
  <vertices>
    <vertex><id>1</id><fact>attackerLocated(internet)</fact><metric>0</metric><type>LEAF</type></vertex>
    <vertex><id>2</id><fact>execCode(webServer,root)</fact><metric>1</metric><type>OR</type></vertex>
  </vertices>
</attack_graph>"#;
    fs::write(dir.join("attack-graph.xml"), graph_xml).expect("write graph");
    fs::write(dir.join("topology.toml"), TOPOLOGY_TOML).expect("write topology");

    let mut config = VantageConfig::default();
    config.general.topology_file = dir.join("topology.toml");
    config.general.vulnerability_db = dir.join("vulnerabilities.db");
    config.general.cost_parameters_dir = dir.join("cost-parameters");

    let session =
        AnalysisSession::load(config, &dir.join("attack-graph.xml")).expect("load session");
    assert_eq!(session.paths.len(), 1);

    let remediations = session.remediations_for_path(0).expect("path exists");
    assert!(remediations.is_empty(), "no viable cut set for this path");

    cleanup_test_dir(&dir);
}
