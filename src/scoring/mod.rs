//! # Scoring
//!
//! Two scoring levels:
//!
//! 1. A global risk/impact score over the whole graph: structural risk
//!    terms per vertex type (AND terms reward converging derivations, OR
//!    terms reward widely connected alternatives, LEAF terms count
//!    exploitable entry points) plus the weighted impact metrics attached
//!    to code-execution vertices.
//! 2. A per-path heuristic score: start at 1.0 and multiply a factor for
//!    every vertex fact matching a rule of the configured weight table.
//!
//! The weight table is declarative on purpose. Earlier engines carried
//! hardcoded boosts for literal CVE ids and IP addresses; those were
//! scenario tuning, not policy, and are not replicated. An operator who
//! wants them back adds table rows.

use serde::{Deserialize, Serialize};

use crate::graph::{AttackGraph, VertexType};
use crate::paths::AttackPath;

/// One row of the path-scoring weight table: a multiplicative factor
/// applied once per vertex whose fact matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    /// Datalog predicate to match, e.g. "vulExists".
    pub command: String,

    /// Optional positional parameter constraint: the rule only matches
    /// when parameter `param_index` equals `param_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_index: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_value: Option<String>,

    /// Multiplicative factor, > 0.
    pub factor: f64,
}

impl ScoringRule {
    pub fn command(command: &str, factor: f64) -> Self {
        Self {
            command: command.to_string(),
            param_index: None,
            param_value: None,
            factor,
        }
    }

    pub fn with_param(command: &str, index: usize, value: &str, factor: f64) -> Self {
        Self {
            command: command.to_string(),
            param_index: Some(index),
            param_value: Some(value.to_string()),
            factor,
        }
    }

    /// The stock table: vulnerability existence halves confidence, CVSS
    /// difficulty classes damp progressively, an incompetent principal is
    /// a long shot.
    pub fn default_table() -> Vec<ScoringRule> {
        vec![
            ScoringRule::command("vulExists", 0.5),
            ScoringRule::with_param("cvss", 1, "l", 0.2),
            ScoringRule::with_param("cvss", 1, "m", 0.1),
            ScoringRule::with_param("cvss", 1, "h", 0.05),
            ScoringRule::command("inCompetent", 0.01),
        ]
    }

    /// True if the rule applies to the given fact.
    pub fn matches(&self, fact: &crate::graph::Fact) -> bool {
        let Some(datalog) = fact.datalog() else {
            return false;
        };
        if datalog.command != self.command {
            return false;
        }
        match (self.param_index, self.param_value.as_deref()) {
            (Some(index), Some(value)) => datalog.param(index) == Some(value),
            _ => true,
        }
    }
}

/// Score one path against the weight table.
///
/// Starts at 1.0; every vertex multiplies in the factor of every rule its
/// fact matches. Vertices are visited in id order, so the result is
/// deterministic for a given path.
pub fn score_path(path: &AttackPath, rules: &[ScoringRule]) -> f64 {
    let mut scoring = 1.0;
    for vertex in path.graph.vertices() {
        for rule in rules {
            if rule.matches(&vertex.fact) {
                scoring *= rule.factor;
            }
        }
    }
    scoring
}

/// Score every path and stamp the result on it.
pub fn score_paths(paths: &mut [AttackPath], rules: &[ScoringRule]) {
    for path in paths.iter_mut() {
        path.scoring = score_path(path, rules);
    }
}

/// Structural risk score of a graph.
///
/// Per-type terms, each normalized by the population of its type:
/// AND: metric * (outgoing/ingoing) / |AND| -- a derivation step that
/// fans out relative to its prerequisites is riskier.
/// OR: metric * outgoing * ingoing * |OR| -- widely connected
/// alternatives multiply exposure.
/// LEAF: outgoing / |LEAF| -- entry points weighted by use.
pub fn risk_score(graph: &AttackGraph) -> f64 {
    let mut and_count = 0usize;
    let mut or_count = 0usize;
    let mut leaf_count = 0usize;
    for vertex in graph.vertices() {
        match vertex.vertex_type {
            VertexType::And => and_count += 1,
            VertexType::Or => or_count += 1,
            VertexType::Leaf => leaf_count += 1,
        }
    }

    let mut r_and = 0.0;
    let mut r_or = 0.0;
    let mut r_leaf = 0.0;
    for vertex in graph.vertices() {
        let outgoing = graph.children(vertex.id).len() as f64;
        let ingoing = graph.parents(vertex.id).len() as f64;
        match vertex.vertex_type {
            VertexType::And => {
                if ingoing > 0.0 {
                    r_and += (vertex.metric * (outgoing / ingoing)) / and_count as f64;
                }
            }
            VertexType::Or => {
                r_or += vertex.metric * outgoing * ingoing * or_count as f64;
            }
            VertexType::Leaf => {
                r_leaf += outgoing / leaf_count as f64;
            }
        }
    }
    r_and + r_or + r_leaf
}

/// Total weighted impact attached to the graph's vertices.
pub fn impact_score(graph: &AttackGraph) -> f64 {
    graph.vertices().map(|v| v.impact()).sum()
}

/// Global score: structural risk plus impact.
pub fn global_score(graph: &AttackGraph) -> f64 {
    risk_score(graph) + impact_score(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Fact, ImpactMetric, Vertex, VertexId};
    use crate::paths::{generate_attack_paths, EnumerationLimits};

    fn vertex(id: VertexId, vtype: VertexType, fact: &str) -> Vertex {
        Vertex::new(id, vtype, Fact::parse(fact).unwrap())
    }

    #[test]
    fn test_rule_matching_with_and_without_params() {
        let plain = ScoringRule::command("vulExists", 0.5);
        let param = ScoringRule::with_param("cvss", 1, "h", 0.05);

        let vul = Fact::parse("vulExists(a,'CVE-1',s)").unwrap();
        let cvss_h = Fact::parse("cvss('CVE-1',h)").unwrap();
        let cvss_l = Fact::parse("cvss('CVE-1',l)").unwrap();
        let rule_fact = Fact::parse("RULE 1 (whatever)").unwrap();

        assert!(plain.matches(&vul));
        assert!(!plain.matches(&cvss_h));
        assert!(param.matches(&cvss_h));
        assert!(!param.matches(&cvss_l));
        assert!(!plain.matches(&rule_fact));
    }

    #[test]
    fn test_path_score_multiplies_matching_factors() {
        let mut g = AttackGraph::new();
        g.insert_vertex(vertex(1, VertexType::Leaf, "vulExists(a,'CVE-1',s)"));
        g.insert_vertex(vertex(2, VertexType::And, "RULE 1 (exploit)"));
        g.insert_vertex(vertex(3, VertexType::Or, "execCode(a,root)"));
        g.add_arc(1, 2);
        g.add_arc(2, 3);

        let mut paths = generate_attack_paths(&g, &EnumerationLimits::default());
        assert_eq!(paths.len(), 1);
        score_paths(&mut paths, &ScoringRule::default_table());
        // Only the vulExists vertex matches: 1.0 * 0.5.
        assert!((paths[0].scoring - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_path_score_without_matches_stays_one() {
        let mut g = AttackGraph::new();
        g.insert_vertex(vertex(1, VertexType::Leaf, "attackerLocated(internet)"));
        g.insert_vertex(vertex(2, VertexType::Or, "execCode(a,root)"));
        g.add_arc(1, 2);

        let mut paths = generate_attack_paths(&g, &EnumerationLimits::default());
        score_paths(&mut paths, &ScoringRule::default_table());
        assert_eq!(paths[0].scoring, 1.0);
    }

    #[test]
    fn test_operator_added_boost_row() {
        let mut rules = ScoringRule::default_table();
        rules.push(ScoringRule::with_param("vulExists", 1, "CVE-2012-3951", 10.0));

        let mut g = AttackGraph::new();
        g.insert_vertex(vertex(1, VertexType::Leaf, "vulExists(a,'CVE-2012-3951',s)"));
        g.insert_vertex(vertex(2, VertexType::Or, "execCode(a,root)"));
        g.add_arc(1, 2);

        let mut paths = generate_attack_paths(&g, &EnumerationLimits::default());
        score_paths(&mut paths, &rules);
        // 0.5 from vulExists, times the 10x table boost.
        assert!((paths[0].scoring - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_risk_score_terms() {
        // LEAF(1) -> AND(2) -> OR(3); single vertex of each type.
        let mut g = AttackGraph::new();
        let mut and_v = vertex(2, VertexType::And, "RULE 1 (r)");
        and_v.metric = 2.0;
        let mut or_v = vertex(3, VertexType::Or, "execCode(a,root)");
        or_v.metric = 3.0;
        g.insert_vertex(vertex(1, VertexType::Leaf, "attackerLocated(internet)"));
        g.insert_vertex(and_v);
        g.insert_vertex(or_v);
        g.add_arc(1, 2);
        g.add_arc(2, 3);

        // LEAF: out 1 / 1 leaf = 1. AND: 2*(1/1)/1 = 2. OR: 3*0*1*1 = 0.
        assert!((risk_score(&g) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_impact_score_sums_weighted_metrics() {
        let mut g = AttackGraph::new();
        let mut v = vertex(1, VertexType::Or, "execCode(db,root)");
        v.impact_metrics.push(ImpactMetric::new(10.0, 1.0));
        v.impact_metrics.push(ImpactMetric::new(5.0, 2.0));
        g.insert_vertex(v);
        assert!((impact_score(&g) - 20.0).abs() < 1e-9);
        assert!((global_score(&g) - 20.0).abs() < 1e-9);
    }
}
