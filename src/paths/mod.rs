//! # Attack Path Enumerator
//!
//! Extracts every distinct attack path that reaches an attacker goal from
//! the full derivation graph. A path is itself a small graph: the subset
//! of vertices and arcs relevant to one way of reaching one goal, keyed by
//! the same vertex identities as the source graph.
//!
//! Backward expansion over AND/OR semantics:
//! - an OR vertex yields one path per viable alternative precondition,
//! - an AND vertex yields the Cartesian product of its parents' path sets
//!   (all preconditions must jointly hold), short-circuiting to nothing as
//!   soon as one mandatory parent has no paths,
//! - a vertex already on the recursion stack yields the cycle sentinel,
//!   which is distinct from "genuinely no paths".
//!
//! The Cartesian product is the dominant cost center; enumeration is
//! bounded by [`EnumerationLimits`] and aborts a goal rather than blowing
//! up the process.

use std::cell::OnceCell;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use log::{info, warn};
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::graph::xml::{end, parse_id, start, text_element};
use crate::graph::{AttackGraph, VertexId, VertexType};
use crate::{VantageError, VantageResult};

/// Datalog predicates that mark a vertex as an attacker goal.
const GOAL_COMMANDS: [&str; 3] = ["execCode", "accessFile", "principalCompromised"];

/// Caller-supplied bounds on the combinatorial expansion.
#[derive(Debug, Clone, Copy)]
pub struct EnumerationLimits {
    /// An AND vertex with more parents than this aborts its goal.
    pub max_and_fanin: usize,
    /// A goal is abandoned once its path count passes this.
    pub max_paths_per_goal: usize,
}

impl Default for EnumerationLimits {
    fn default() -> Self {
        Self {
            max_and_fanin: 12,
            max_paths_per_goal: 10_000,
        }
    }
}

/// One attack path: a goal-reaching sub-graph with a heuristic score.
///
/// Derived once per scoring run and not mutated afterwards. Vertices are
/// copies keyed by the source graph's ids, so deletions on the source
/// graph remain observable through id lookup while the path keeps its own
/// private arc list.
#[derive(Debug, Clone, Default)]
pub struct AttackPath {
    pub graph: AttackGraph,

    /// Likelihood/severity score, in [0, +inf); higher ranks first.
    pub scoring: f64,

    goal: OnceCell<Option<VertexId>>,
}

impl AttackPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// The goal vertex: the unique sink with no children. Cached.
    pub fn goal(&self) -> Option<VertexId> {
        *self.goal.get_or_init(|| {
            self.graph
                .ids()
                .into_iter()
                .find(|&id| self.graph.children(id).is_empty())
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.vertex_count()
    }

    /// Merge another path's vertices and arcs into this one.
    fn absorb(&mut self, other: &AttackPath) {
        for vertex in other.graph.vertices() {
            self.graph.insert_vertex(vertex.clone());
        }
        for arc in other.graph.arcs() {
            self.graph.add_arc(arc.source, arc.destination);
        }
    }

    /// Add one vertex (copied from the source graph) and the arc that
    /// connects the expansion step.
    fn push_step(&mut self, graph: &AttackGraph, parent: VertexId, vertex: VertexId) {
        if let Ok(v) = graph.vertex(vertex) {
            self.graph.insert_vertex(v.clone());
        }
        self.graph.add_arc(parent, vertex);
    }
}

/// Raised internally when a goal's expansion exceeds the limits.
struct PathExplosion {
    vertex: VertexId,
    reason: &'static str,
}

/// Enumerate every attack path of the graph, across all attacker goals.
///
/// Goals whose expansion exceeds `limits` are skipped with a warning;
/// the remaining goals still produce their paths.
pub fn generate_attack_paths(graph: &AttackGraph, limits: &EnumerationLimits) -> Vec<AttackPath> {
    let goals: Vec<VertexId> = graph
        .vertices()
        .filter(|v| {
            v.fact
                .datalog()
                .map(|d| GOAL_COMMANDS.contains(&d.command.as_str()))
                .unwrap_or(false)
        })
        .map(|v| v.id)
        .collect();

    let mut result = Vec::new();
    for goal in goals {
        let mut seen = HashSet::new();
        match paths_to(graph, goal, &mut seen, limits) {
            Ok(Some(paths)) => result.extend(paths),
            Ok(None) => {}
            Err(explosion) => {
                warn!(
                    "goal {} abandoned: {} at vertex {}",
                    goal, explosion.reason, explosion.vertex
                );
            }
        }
    }
    info!("enumerated {} attack paths", result.len());
    result
}

/// Recursive backward expansion.
///
/// `Ok(None)` is the cycle sentinel: this vertex is already on the current
/// recursion stack, so the caller must abandon this branch. That is not
/// the same as `Ok(Some(vec![]))`, which means "genuinely no paths" and
/// propagates emptiness per AND/OR rules.
fn paths_to(
    graph: &AttackGraph,
    id: VertexId,
    seen: &mut HashSet<VertexId>,
    limits: &EnumerationLimits,
) -> Result<Option<Vec<AttackPath>>, PathExplosion> {
    if seen.contains(&id) {
        return Ok(None);
    }
    let Ok(vertex) = graph.vertex(id) else {
        return Ok(Some(Vec::new()));
    };

    match vertex.vertex_type {
        VertexType::Leaf => {
            let mut path = AttackPath::new();
            path.graph.insert_vertex(vertex.clone());
            Ok(Some(vec![path]))
        }
        VertexType::Or => {
            seen.insert(id);
            let mut result: Vec<AttackPath> = Vec::new();
            for parent in graph.parents(id).to_vec() {
                let from_parent = match paths_to(graph, parent, seen, limits) {
                    Ok(Some(paths)) => paths,
                    // Cycle-blocked alternative: abandon this branch only.
                    Ok(None) => continue,
                    Err(e) => {
                        seen.remove(&id);
                        return Err(e);
                    }
                };
                for mut path in from_parent {
                    path.push_step(graph, parent, id);
                    result.push(path);
                }
                if result.len() > limits.max_paths_per_goal {
                    seen.remove(&id);
                    return Err(PathExplosion {
                        vertex: id,
                        reason: "path count limit exceeded",
                    });
                }
            }
            seen.remove(&id);
            Ok(Some(result))
        }
        VertexType::And => {
            let parents = graph.parents(id).to_vec();
            if parents.len() > limits.max_and_fanin {
                return Err(PathExplosion {
                    vertex: id,
                    reason: "AND fan-in limit exceeded",
                });
            }
            seen.insert(id);
            let mut per_parent: Vec<Vec<AttackPath>> = Vec::with_capacity(parents.len());
            for parent in parents {
                let from_parent = match paths_to(graph, parent, seen, limits) {
                    Ok(Some(paths)) => paths,
                    // A mandatory precondition is cycle-blocked: the AND
                    // contributes no paths at all.
                    Ok(None) => {
                        seen.remove(&id);
                        return Ok(Some(Vec::new()));
                    }
                    Err(e) => {
                        seen.remove(&id);
                        return Err(e);
                    }
                };
                // A mandatory precondition with no paths: stop combining.
                if from_parent.is_empty() {
                    seen.remove(&id);
                    return Ok(Some(Vec::new()));
                }
                let mut augmented = from_parent;
                for path in &mut augmented {
                    path.push_step(graph, parent, id);
                }
                per_parent.push(augmented);
            }
            seen.remove(&id);
            let product = cartesian_product(per_parent, limits).map_err(|reason| PathExplosion {
                vertex: id,
                reason,
            })?;
            Ok(Some(product))
        }
    }
}

/// Combine the per-parent path sets of an AND vertex: every combination
/// picks one path per parent and merges their vertex/arc sets.
fn cartesian_product(
    per_parent: Vec<Vec<AttackPath>>,
    limits: &EnumerationLimits,
) -> Result<Vec<AttackPath>, &'static str> {
    let mut iter = per_parent.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Vec::new());
    };

    let mut combined = first;
    for parent_paths in iter {
        if combined.len().saturating_mul(parent_paths.len()) > limits.max_paths_per_goal {
            return Err("path count limit exceeded");
        }
        let mut next = Vec::with_capacity(combined.len() * parent_paths.len());
        for existing in &combined {
            for addition in &parent_paths {
                let mut merged = existing.clone();
                merged.absorb(addition);
                next.push(merged);
            }
        }
        combined = next;
    }
    Ok(combined)
}

/// Stable descending sort by score. Equal scores keep insertion order, so
/// repeated runs over the same graph rank identically.
pub fn sort_paths_by_score(paths: &mut [AttackPath]) {
    paths.sort_by(|a, b| {
        b.scoring
            .partial_cmp(&a.scoring)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ---------------------------------------------------------------------------
// Scored-paths file
// ---------------------------------------------------------------------------

/// Save scored paths as XML (same src/dst inversion as the graph files).
pub fn save_paths_xml(paths: &[AttackPath], path: &Path) -> VantageResult<()> {
    let xml = paths_to_xml(paths)?;
    std::fs::write(path, xml)?;
    Ok(())
}

/// Render scored paths as XML text.
pub fn paths_to_xml(paths: &[AttackPath]) -> VantageResult<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    start(&mut writer, "attack_paths")?;
    for attack_path in paths {
        start(&mut writer, "attack_path")?;
        text_element(&mut writer, "scoring", &attack_path.scoring.to_string())?;
        start(&mut writer, "arcs")?;
        for arc in attack_path.graph.arcs() {
            start(&mut writer, "arc")?;
            text_element(&mut writer, "src", &arc.destination.to_string())?;
            text_element(&mut writer, "dst", &arc.source.to_string())?;
            end(&mut writer, "arc")?;
        }
        end(&mut writer, "arcs")?;
        end(&mut writer, "attack_path")?;
    }
    end(&mut writer, "attack_paths")?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| VantageError::GraphXml(e.to_string()))
}

/// Load scored paths from a file and re-associate them with the live
/// graph's vertices by id. The result is sorted descending by score.
pub fn load_paths_xml(path: &Path, graph: &AttackGraph) -> VantageResult<Vec<AttackPath>> {
    let content = std::fs::read_to_string(path)?;
    load_paths_from_str(&content, graph)
}

/// Load scored paths from XML text, rebinding arcs to `graph` by id.
pub fn load_paths_from_str(content: &str, graph: &AttackGraph) -> VantageResult<Vec<AttackPath>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut result: Vec<AttackPath> = Vec::new();
    let mut current: Option<AttackPath> = None;
    let mut current_tag = String::new();
    let mut arc_src: Option<VertexId> = None;
    let mut arc_dst: Option<VertexId> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current_tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match current_tag.as_str() {
                    "attack_path" => current = Some(AttackPath::new()),
                    "arc" => {
                        arc_src = None;
                        arc_dst = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| VantageError::GraphXml(e.to_string()))?
                    .to_string();
                match current_tag.as_str() {
                    "scoring" => {
                        if let Some(path) = current.as_mut() {
                            path.scoring = text.parse::<f64>().map_err(|_| {
                                VantageError::GraphXml(format!("bad scoring: {text}"))
                            })?;
                        }
                    }
                    "src" => arc_src = Some(parse_id(&text)?),
                    "dst" => arc_dst = Some(parse_id(&text)?),
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "arc" => {
                        let (Some(wire_src), Some(wire_dst)) = (arc_src.take(), arc_dst.take())
                        else {
                            return Err(VantageError::GraphXml(
                                "arc element missing src or dst".to_string(),
                            ));
                        };
                        let Some(path) = current.as_mut() else {
                            return Err(VantageError::GraphXml(
                                "arc outside attack_path".to_string(),
                            ));
                        };
                        // Same inversion as the attack-graph files.
                        let source = wire_dst;
                        let destination = wire_src;
                        path.graph.insert_vertex(graph.vertex(source)?.clone());
                        path.graph.insert_vertex(graph.vertex(destination)?.clone());
                        path.graph.add_arc(source, destination);
                    }
                    "attack_path" => {
                        if let Some(path) = current.take() {
                            result.push(path);
                        }
                    }
                    _ => {}
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(VantageError::Xml(e)),
        }
    }

    sort_paths_by_score(&mut result);
    Ok(result)
}
