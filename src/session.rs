//! # Analysis Session
//!
//! The explicit context for one analysis run: the attack graph, the
//! topology, the vulnerability store and the configuration, plus the
//! scored attack paths derived from them. Nothing here is global; a
//! caller owns the session and passes it where needed.
//!
//! Pipeline on load: parse reasoner XML, prune unreachable vertices,
//! attach impact metrics from the topology, compute the global score,
//! enumerate attack paths, score and rank them. Either the whole
//! pipeline succeeds or the caller gets one terminal error; an empty
//! graph is not an error and simply yields zero paths.
//!
//! "What happens if I deploy this" questions never touch the live graph:
//! the session clones it, deletes the remediated leaves on the clone and
//! rescores the result.

use std::path::Path;

use log::info;

use crate::graph::{xml, AttackGraph};
use crate::paths::{generate_attack_paths, sort_paths_by_score, AttackPath, EnumerationLimits};
use crate::remediation::{DeployableRemediation, RemediationPlanner, VulnerabilityStore};
use crate::scoring;
use crate::topology::Topology;
use crate::{VantageConfig, VantageResult};

/// One loaded analysis: graph, collaborators, and derived paths.
pub struct AnalysisSession {
    pub config: VantageConfig,
    pub topology: Topology,
    pub graph: AttackGraph,

    /// Attack paths, sorted descending by score.
    pub paths: Vec<AttackPath>,

    store: VulnerabilityStore,
}

/// The result of simulating a remediation deployment.
pub struct SimulationOutcome {
    /// The post-remediation graph (the live graph is untouched).
    pub graph: AttackGraph,

    /// Global score of the post-remediation graph.
    pub global_score: f64,

    /// Attack paths that survive the remediation, sorted by score.
    pub remaining_paths: Vec<AttackPath>,
}

impl AnalysisSession {
    /// Load a full session from the files named in the configuration.
    pub fn load(config: VantageConfig, graph_file: &Path) -> VantageResult<Self> {
        let topology = Topology::from_file(&config.general.topology_file)?;
        let store = VulnerabilityStore::open(&config.general.vulnerability_db)?;
        let graph = xml::load_attack_graph(graph_file)?;
        Self::from_parts(config, topology, store, graph)
    }

    /// Assemble a session from already-loaded collaborators.
    pub fn from_parts(
        config: VantageConfig,
        topology: Topology,
        store: VulnerabilityStore,
        mut graph: AttackGraph,
    ) -> VantageResult<Self> {
        let before = graph.vertex_count();
        graph.delete_unreachable_vertices();
        let pruned = before - graph.vertex_count();
        if pruned > 0 {
            info!("pruned {} unreachable vertices", pruned);
        }

        graph.load_metrics_from_topology(&topology);
        graph.global_score = scoring::global_score(&graph);

        let limits = EnumerationLimits {
            max_and_fanin: config.general.max_and_fanin,
            max_paths_per_goal: config.general.max_paths_per_goal,
        };
        let mut paths = generate_attack_paths(&graph, &limits);
        scoring::score_paths(&mut paths, &config.scoring.rules);
        sort_paths_by_score(&mut paths);

        info!(
            "session ready: {} vertices, {} arcs, global score {:.3}, {} paths",
            graph.vertex_count(),
            graph.arcs().len(),
            graph.global_score,
            paths.len(),
        );

        Ok(Self {
            config,
            topology,
            graph,
            paths,
            store,
        })
    }

    /// The path at `index` in score order, if it exists.
    pub fn path(&self, index: usize) -> Option<&AttackPath> {
        self.paths.get(index)
    }

    /// Deployable remediations for the path at `index`, cheapest first.
    /// An empty list means no viable remediation was found.
    pub fn remediations_for_path(&self, index: usize) -> Option<Vec<DeployableRemediation>> {
        let path = self.path(index)?;
        let planner = RemediationPlanner::new(
            &self.topology,
            &self.store,
            &self.config.general.cost_parameters_dir,
            &self.config.remediation,
        );
        Some(planner.deployable_remediations(path))
    }

    /// Simulate deploying a remediation: clone the graph, delete every
    /// leaf the remediation's actions touch, prune, and rescore.
    pub fn simulate_remediation(&self, remediation: &DeployableRemediation) -> SimulationOutcome {
        let mut simulated = self.graph.clone();
        for deployable in &remediation.actions {
            simulated.delete_vertex(deployable.action.remediated_vertex);
        }
        simulated.global_score = scoring::global_score(&simulated);

        let limits = EnumerationLimits {
            max_and_fanin: self.config.general.max_and_fanin,
            max_paths_per_goal: self.config.general.max_paths_per_goal,
        };
        let mut remaining = generate_attack_paths(&simulated, &limits);
        scoring::score_paths(&mut remaining, &self.config.scoring.rules);
        sort_paths_by_score(&mut remaining);

        let global_score = simulated.global_score;
        SimulationOutcome {
            graph: simulated,
            global_score,
            remaining_paths: remaining,
        }
    }

    /// Persist the scored paths in the XML exchange format.
    pub fn save_scored_paths(&self, path: &Path) -> VantageResult<()> {
        crate::paths::save_paths_xml(&self.paths, path)
    }
}
