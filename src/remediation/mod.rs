//! # Remediation Synthesizer
//!
//! Given one attack path, computes what to deploy, where, and at what
//! cost, to break every derivation route to the path's goal:
//!
//! 1. find the remediable leaves (facts an operator can actually change),
//! 2. search increasing-size leaf combinations for minimal cut sets,
//! 3. resolve each leaf into concrete countermeasure alternatives through
//!    the vulnerability store and the topology,
//! 4. combine: AND across the leaves of a cut set, OR across each leaf's
//!    own alternatives,
//! 5. bind every action to one host of its candidate set and price the
//!    result, cheapest first.
//!
//! A leaf that resolves to nothing (unknown CVE, unresolvable host) makes
//! cut sets containing it non-viable; it never fails the whole path.

pub mod cost;
pub mod firewall;
pub mod vulndb;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::graph::VertexId;
use crate::paths::AttackPath;
use crate::topology::{Host, Topology};
use crate::{RemediationConfig, VantageError, VantageResult};

pub use cost::CostParameters;
pub use firewall::{FirewallAction, FirewallRule, PortRange, Protocol, Table};
pub use vulndb::{Patch, SnortRule, Vulnerability, VulnerabilityStore};

/// Datalog predicates a parentless leaf must carry to be remediable.
const REMEDIABLE_LEAF_COMMANDS: [&str; 3] = ["vulExists", "hacl", "haclprimit"];

/// One atomic countermeasure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    ApplyPatch,
    DeploySnortRule,
    TrainUser,
    DeployFirewallRule,
}

/// A parameter of a remediation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionParameter {
    Patch(Patch),
    SnortRule(SnortRule),
    FirewallRule(FirewallRule),
    Username(String),
}

/// One atomic countermeasure: what to do, its parameters, and the hosts
/// it could be deployed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub action_type: ActionType,
    pub parameters: Vec<ActionParameter>,
    pub possible_hosts: Vec<Host>,

    /// The leaf this action remediates.
    pub remediated_vertex: VertexId,

    pub cost_parameters: CostParameters,
}

impl RemediationAction {
    fn new(
        action_type: ActionType,
        remediated_vertex: VertexId,
        cost_dir: &Path,
    ) -> VantageResult<Self> {
        Ok(Self {
            action_type,
            parameters: Vec::new(),
            possible_hosts: Vec::new(),
            remediated_vertex,
            cost_parameters: CostParameters::load_for_action(cost_dir, action_type)?,
        })
    }

    /// Total operational cost of deploying this action once.
    pub fn operational_cost(&self) -> f64 {
        self.cost_parameters.operational_cost()
    }
}

/// A remediation action bound to the specific host it runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableAction {
    pub action: RemediationAction,
    pub host: Host,
}

/// One concrete AND-combination of host-bound actions with its total cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployableRemediation {
    pub actions: Vec<DeployableAction>,
    pub cost: f64,
}

/// Computes remediations for attack paths against a fixed set of
/// collaborators: the topology, the vulnerability store, and the cost
/// parameter folder.
pub struct RemediationPlanner<'a> {
    topology: &'a Topology,
    store: &'a VulnerabilityStore,
    cost_dir: &'a Path,
    config: &'a RemediationConfig,
}

impl<'a> RemediationPlanner<'a> {
    pub fn new(
        topology: &'a Topology,
        store: &'a VulnerabilityStore,
        cost_dir: &'a Path,
        config: &'a RemediationConfig,
    ) -> Self {
        Self {
            topology,
            store,
            cost_dir,
            config,
        }
    }

    // -----------------------------------------------------------------------
    // Cut sets
    // -----------------------------------------------------------------------

    /// The leaves of a path an operator can act on: parentless vertices
    /// carrying a vulnerability, reachability or attacker-location fact,
    /// plus every host-access-control vertex regardless of position
    /// (those can always be firewalled).
    pub fn remediable_leaves(&self, path: &AttackPath) -> Vec<VertexId> {
        let mut result = Vec::new();
        for id in path.graph.ids() {
            let Ok(vertex) = path.graph.vertex(id) else {
                continue;
            };
            let Some(datalog) = vertex.fact.datalog() else {
                continue;
            };
            let command = datalog.command.as_str();
            if path.graph.parents(id).is_empty() {
                if REMEDIABLE_LEAF_COMMANDS.contains(&command)
                    || command.to_lowercase().contains("vlan")
                    || command.contains("attackerLocated")
                {
                    result.push(id);
                }
            } else if command == "hacl" {
                result.push(id);
            }
        }
        result
    }

    /// All minimal cut sets of the path, smallest first.
    ///
    /// Combinations are tested by increasing size; once a combination is
    /// accepted its leaves leave the pool, so supersets of an accepted
    /// cut are never re-derived.
    pub fn cut_sets(&self, path: &AttackPath) -> Vec<Vec<VertexId>> {
        let mut remaining = self.remediable_leaves(path);
        let mut cuts: Vec<Vec<VertexId>> = Vec::new();
        let mut size = 1;

        while size <= remaining.len() && size <= self.config.max_cut_set_size {
            let mut accepted: Vec<VertexId> = Vec::new();
            for combo in combinations(size, remaining.len()) {
                let candidate: Vec<VertexId> = combo.iter().map(|&i| remaining[i]).collect();
                if leaves_mandatory_for_goal(path, &candidate) {
                    accepted.extend(candidate.iter().copied());
                    cuts.push(candidate);
                }
            }
            remaining.retain(|id| !accepted.contains(id));
            size += 1;
        }
        cuts
    }

    // -----------------------------------------------------------------------
    // Per-leaf actions
    // -----------------------------------------------------------------------

    /// The countermeasure alternatives for one leaf, as an OR of ANDs:
    /// outer list = alternatives, inner list = actions that must all be
    /// deployed together. Empty when nothing resolves.
    pub fn actions_for_leaf(&self, path: &AttackPath, leaf: VertexId) -> Vec<Vec<RemediationAction>> {
        match self.try_actions_for_leaf(path, leaf) {
            Ok(alternatives) => alternatives,
            Err(e) => {
                warn!("leaf {} has no computable remediation: {}", leaf, e);
                Vec::new()
            }
        }
    }

    fn try_actions_for_leaf(
        &self,
        path: &AttackPath,
        leaf: VertexId,
    ) -> VantageResult<Vec<Vec<RemediationAction>>> {
        let vertex = path.graph.vertex(leaf)?;
        let Some(datalog) = vertex.fact.datalog().cloned() else {
            return Ok(Vec::new());
        };

        match datalog.command.as_str() {
            "vulExists" => self.vulnerability_actions(path, leaf, &datalog),
            "inCompetent" => {
                let username = datalog
                    .param(0)
                    .ok_or_else(|| VantageError::Remediation("inCompetent without user".into()))?;
                let mut action = RemediationAction::new(ActionType::TrainUser, leaf, self.cost_dir)?;
                action.parameters.push(ActionParameter::Username(username.to_string()));
                Ok(vec![vec![action]])
            }
            "hacl" | "haclprimit" => self.firewall_actions(leaf, &datalog),
            other => {
                debug!("leaf {} command {} has no remediation mapping", leaf, other);
                Ok(Vec::new())
            }
        }
    }

    /// vulExists: patches on the vulnerable host, or IDS rules rejecting
    /// the exploit along every attacker route.
    fn vulnerability_actions(
        &self,
        path: &AttackPath,
        leaf: VertexId,
        datalog: &crate::graph::DatalogFact,
    ) -> VantageResult<Vec<Vec<RemediationAction>>> {
        let cve = datalog
            .param(1)
            .ok_or_else(|| VantageError::Remediation("vulExists without CVE".into()))?;
        let Some(vulnerability) = self.store.vulnerability_by_cve(cve)? else {
            warn!("CVE {} not in the vulnerability store", cve);
            return Ok(Vec::new());
        };

        let mut alternatives: Vec<Vec<RemediationAction>> = Vec::new();

        let patches = self.store.patches_for(vulnerability.id)?;
        if !patches.is_empty() {
            let host_key = datalog
                .param(0)
                .ok_or_else(|| VantageError::Remediation("vulExists without host".into()))?;
            match self.topology.host_by_name_or_ip(host_key) {
                Some(host) => {
                    let mut action =
                        RemediationAction::new(ActionType::ApplyPatch, leaf, self.cost_dir)?;
                    action.possible_hosts.push(host.clone());
                    action
                        .parameters
                        .extend(patches.into_iter().map(ActionParameter::Patch));
                    alternatives.push(vec![action]);
                }
                None => {
                    warn!("host {} of CVE {} not in topology, patch skipped", host_key, cve);
                }
            }
        }

        let rules = self.store.rules_for(vulnerability.id)?;
        if !rules.is_empty() && self.config.use_snort_rules {
            match self.attacker_routes_to_vulnerability(path, leaf) {
                Ok(routes) => {
                    // One action per route: the rule set must reject the
                    // exploit on every path the packets can take.
                    let mut on_all_routes: Vec<RemediationAction> = Vec::new();
                    for route in routes {
                        let mut action =
                            RemediationAction::new(ActionType::DeploySnortRule, leaf, self.cost_dir)?;
                        for rule in &rules {
                            let mut rejecting = rule.clone();
                            rejecting.rule = rejecting.rule.replacen("alert", "reject", 1);
                            action.parameters.push(ActionParameter::SnortRule(rejecting));
                        }
                        action.possible_hosts.extend(route.into_iter());
                        on_all_routes.push(action);
                    }
                    if !on_all_routes.is_empty() {
                        alternatives.push(on_all_routes);
                    }
                }
                Err(e) => {
                    warn!("no attacker route for CVE {} leaf {}: {}", cve, leaf, e);
                }
            }
        }

        Ok(alternatives)
    }

    /// hacl/haclprimit: DROP the attacker's traffic, either on the INPUT
    /// chains or on the OUTPUT chains of the hosts along the routes. The
    /// two chains are separate alternatives.
    fn firewall_actions(
        &self,
        leaf: VertexId,
        datalog: &crate::graph::DatalogFact,
    ) -> VantageResult<Vec<Vec<RemediationAction>>> {
        let from_key = datalog
            .param(0)
            .ok_or_else(|| VantageError::Remediation("hacl without source".into()))?;
        let to_key = datalog
            .param(1)
            .ok_or_else(|| VantageError::Remediation("hacl without destination".into()))?;
        let protocol = Protocol::from_fact_param(datalog.param(2).unwrap_or("_"));
        let port = PortRange::from_fact_param(datalog.param(3).unwrap_or("_"))?;

        let from = self.topology.require_host(from_key)?.clone();
        let to = self.topology.require_host(to_key)?.clone();
        let routes = self.topology.routes_between(&from, &to);

        let from_internet = self.topology.is_internet_alias(from_key);
        let to_internet = self.topology.is_internet_alias(to_key);

        let build_rule = |table: Table| -> VantageResult<FirewallRule> {
            if from_internet {
                let to_ip = to.first_ip().ok_or_else(|| {
                    VantageError::Remediation(format!("host {} has no address", to.name))
                })?;
                Ok(FirewallRule::drop_rule(protocol, "0.0.0.0", 0, to_ip, 32, port, table))
            } else if to_internet {
                let from_ip = from.first_ip().ok_or_else(|| {
                    VantageError::Remediation(format!("host {} has no address", from.name))
                })?;
                Ok(FirewallRule::drop_rule(protocol, from_ip, 32, "0.0.0.0", 0, port, table))
            } else {
                let from_ip = from.first_ip().ok_or_else(|| {
                    VantageError::Remediation(format!("host {} has no address", from.name))
                })?;
                let to_ip = to.first_ip().ok_or_else(|| {
                    VantageError::Remediation(format!("host {} has no address", to.name))
                })?;
                Ok(FirewallRule::drop_rule(protocol, from_ip, 32, to_ip, 32, port, table))
            }
        };

        let mut alternatives = Vec::new();
        for table in [Table::Input, Table::Output] {
            let rule = build_rule(table)?;
            let mut on_all_routes: Vec<RemediationAction> = Vec::new();
            for route in &routes {
                let mut action =
                    RemediationAction::new(ActionType::DeployFirewallRule, leaf, self.cost_dir)?;
                action.parameters.push(ActionParameter::FirewallRule(rule.clone()));
                for host in route {
                    // The sender cannot block its own outgoing packets on
                    // INPUT, nor the receiver on OUTPUT.
                    let excluded = match table {
                        Table::Input => !from_internet && host.name == from.name,
                        Table::Output => !to_internet && host.name == to.name,
                    };
                    if !excluded {
                        action.possible_hosts.push(host.clone());
                    }
                }
                on_all_routes.push(action);
            }
            alternatives.push(on_all_routes);
        }
        Ok(alternatives)
    }

    /// Walk the path from a vulnerability leaf up to the hacl fact that
    /// carried the attacker's packets, and resolve its routes.
    fn attacker_routes_to_vulnerability(
        &self,
        path: &AttackPath,
        leaf: VertexId,
    ) -> VantageResult<Vec<Vec<Host>>> {
        let child = path
            .graph
            .children(leaf)
            .first()
            .copied()
            .ok_or_else(|| VantageError::Remediation(format!("leaf {leaf} has no child")))?;
        let net_access = path
            .graph
            .parent_with_command(child, "netAccess")
            .or_else(|| path.graph.parent_with_command(child, "accessMaliciousInput"))
            .ok_or_else(|| {
                VantageError::Remediation(format!("no network access above leaf {leaf}"))
            })?;
        let rule_vertex = path
            .graph
            .parents(net_access)
            .first()
            .copied()
            .ok_or_else(|| {
                VantageError::Remediation(format!("network access {net_access} has no parent"))
            })?;
        let hacl = path
            .graph
            .parent_with_command(rule_vertex, "hacl")
            .ok_or_else(|| VantageError::Remediation(format!("no hacl above leaf {leaf}")))?;

        let hacl_fact = path
            .graph
            .vertex(hacl)?
            .fact
            .datalog()
            .cloned()
            .ok_or_else(|| VantageError::Remediation("hacl vertex without fact".into()))?;
        let from = hacl_fact
            .param(0)
            .ok_or_else(|| VantageError::Remediation("hacl without source".into()))?;
        let to = hacl_fact
            .param(1)
            .ok_or_else(|| VantageError::Remediation("hacl without destination".into()))?;
        self.topology.routes_between_endpoints(from, to)
    }

    // -----------------------------------------------------------------------
    // Path-level combination
    // -----------------------------------------------------------------------

    /// Every remediation strategy for the path, as an OR of ANDs: outer
    /// list = alternative strategies, inner list = actions that must be
    /// deployed simultaneously.
    pub fn remediations_for_path(&self, path: &AttackPath) -> Vec<Vec<RemediationAction>> {
        let leaves = self.remediable_leaves(path);
        let cuts = self.cut_sets(path);

        let mut how_to_remediate: HashMap<VertexId, Vec<Vec<RemediationAction>>> = HashMap::new();
        for &leaf in &leaves {
            how_to_remediate.insert(leaf, self.actions_for_leaf(path, leaf));
        }

        let mut result = Vec::new();
        for cut in cuts {
            // A cut containing an unremediable leaf is not viable.
            if cut
                .iter()
                .any(|leaf| how_to_remediate.get(leaf).map(Vec::is_empty).unwrap_or(true))
            {
                continue;
            }
            result.extend(combine_cut_remediations(&cut, &how_to_remediate));
        }
        result
    }

    /// Concrete deployable remediations for the path, cheapest first.
    pub fn deployable_remediations(&self, path: &AttackPath) -> Vec<DeployableRemediation> {
        let strategies = self.remediations_for_path(path);
        let mut result: Vec<DeployableRemediation> = Vec::new();

        for strategy in strategies {
            result.extend(bind_hosts(&strategy));
        }

        for remediation in &mut result {
            remediation.cost = remediation
                .actions
                .iter()
                .map(|a| a.action.operational_cost())
                .sum();
        }
        result.sort_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal));
        result
    }
}

/// AND across the cut's leaves, OR across each leaf's alternatives:
/// the Cartesian product of alternatives, concatenating action lists.
fn combine_cut_remediations(
    cut: &[VertexId],
    how_to_remediate: &HashMap<VertexId, Vec<Vec<RemediationAction>>>,
) -> Vec<Vec<RemediationAction>> {
    let mut result: Vec<Vec<RemediationAction>> = vec![Vec::new()];
    for leaf in cut {
        let Some(alternatives) = how_to_remediate.get(leaf) else {
            return Vec::new();
        };
        let mut next = Vec::with_capacity(result.len() * alternatives.len());
        for existing in &result {
            for alternative in alternatives {
                let mut plan = existing.clone();
                plan.extend(alternative.iter().cloned());
                next.push(plan);
            }
        }
        result = next;
    }
    result
}

/// Expand one AND-strategy into concrete plans by binding each action to
/// one host. Actions with several candidate hosts branch the partial plan
/// once per extra host; actions with no candidate host are dropped.
fn bind_hosts(strategy: &[RemediationAction]) -> Vec<DeployableRemediation> {
    let mut plans: Vec<Vec<DeployableAction>> = vec![Vec::new()];

    for action in strategy {
        match action.possible_hosts.len() {
            0 => {}
            1 => {
                let host = action.possible_hosts[0].clone();
                for plan in &mut plans {
                    plan.push(DeployableAction {
                        action: action.clone(),
                        host: host.clone(),
                    });
                }
            }
            n => {
                let mut branched: Vec<Vec<DeployableAction>> = Vec::new();
                for host in &action.possible_hosts[1..n] {
                    for plan in &plans {
                        let mut new_plan = plan.clone();
                        new_plan.push(DeployableAction {
                            action: action.clone(),
                            host: host.clone(),
                        });
                        branched.push(new_plan);
                    }
                }
                let first = action.possible_hosts[0].clone();
                for plan in &mut plans {
                    plan.push(DeployableAction {
                        action: action.clone(),
                        host: first.clone(),
                    });
                }
                plans.extend(branched);
            }
        }
    }

    plans
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|actions| DeployableRemediation { actions, cost: 0.0 })
        .collect()
}

/// True iff removing the given leaves breaks every derivation route to
/// the path's goal.
///
/// Coverage rules (the dual of minimum-prerequisite-leaves): a vertex in
/// the set is covered; an AND vertex is covered if ANY parent is covered
/// (one missing input breaks it); an OR vertex is covered only if ALL
/// parents are covered (every alternative must be blocked).
pub fn leaves_mandatory_for_goal(path: &AttackPath, leaves: &[VertexId]) -> bool {
    let Some(goal) = path.goal() else {
        return false;
    };
    let mut seen = HashSet::new();
    leaves_mandatory_for_vertex(path, leaves, goal, &mut seen)
}

fn leaves_mandatory_for_vertex(
    path: &AttackPath,
    leaves: &[VertexId],
    id: VertexId,
    seen: &mut HashSet<VertexId>,
) -> bool {
    if leaves.contains(&id) {
        return true;
    }
    let Ok(vertex) = path.graph.vertex(id) else {
        return false;
    };
    match vertex.vertex_type {
        crate::graph::VertexType::And => {
            seen.insert(id);
            let mut covered = false;
            for parent in path.graph.parents(id).to_vec() {
                if !seen.contains(&parent) {
                    covered = covered || leaves_mandatory_for_vertex(path, leaves, parent, seen);
                }
            }
            seen.remove(&id);
            covered
        }
        crate::graph::VertexType::Or => {
            seen.insert(id);
            let mut covered = true;
            for parent in path.graph.parents(id).to_vec() {
                if !seen.contains(&parent) {
                    covered = covered && leaves_mandatory_for_vertex(path, leaves, parent, seen);
                }
            }
            seen.remove(&id);
            covered
        }
        crate::graph::VertexType::Leaf => false,
    }
}

/// All k-combinations of indices 0..n, in lexicographic order.
pub fn combinations(k: usize, n: usize) -> Vec<Vec<usize>> {
    let mut result = Vec::new();
    if k == 0 || k > n {
        return result;
    }
    let mut current: Vec<usize> = Vec::with_capacity(k);
    combinations_recursive(k, n, 0, &mut current, &mut result);
    result
}

fn combinations_recursive(
    k: usize,
    n: usize,
    start: usize,
    current: &mut Vec<usize>,
    result: &mut Vec<Vec<usize>>,
) {
    if current.len() == k {
        result.push(current.clone());
        return;
    }
    for i in start..n {
        current.push(i);
        combinations_recursive(k, n, i + 1, current, result);
        current.pop();
    }
}
