//! # SENTINEL Vantage - CLI Entry Point
//!
//! Command-line interface for the Vantage analysis engine.
//!
//! Commands:
//! - `analyze`      - Full pipeline: load, score, list paths and remediations
//! - `paths`        - List the scored attack paths of a graph
//! - `remediations` - Deployable remediations for one attack path
//! - `simulate`     - What-if: apply a remediation on a clone and rescore
//! - `init-config`  - Generate a default configuration file

use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use sentinel_vantage::remediation::{ActionParameter, DeployableRemediation};
use sentinel_vantage::session::AnalysisSession;
use sentinel_vantage::{VantageConfig, VantageError, VantageResult};

/// SENTINEL Vantage - attack path risk scoring and remediation planning.
///
/// Loads a reasoner-produced attack graph, derives and ranks the attack
/// paths through the modeled network, and computes the cheapest sets of
/// countermeasures that break them.
#[derive(Parser, Debug)]
#[command(name = "sentinel-vantage")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "sentinel-vantage.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full analysis pipeline on a reasoner attack-graph file.
    Analyze {
        /// The reasoner XML attack-graph file.
        graph: PathBuf,

        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Also write the scored paths to this XML file.
        #[arg(long)]
        save_paths: Option<PathBuf>,
    },

    /// List the scored attack paths of a graph.
    Paths {
        /// The reasoner XML attack-graph file.
        graph: PathBuf,
    },

    /// Compute deployable remediations for one attack path.
    Remediations {
        /// The reasoner XML attack-graph file.
        graph: PathBuf,

        /// Path index in score order (0 = highest risk).
        #[arg(long)]
        path: usize,

        /// Emit the report as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Simulate deploying a remediation and report the residual risk.
    Simulate {
        /// The reasoner XML attack-graph file.
        graph: PathBuf,

        /// Path index in score order.
        #[arg(long)]
        path: usize,

        /// Remediation index in cost order (0 = cheapest).
        #[arg(long)]
        remediation: usize,
    },

    /// Generate a default configuration file.
    InitConfig,
}

fn main() -> VantageResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            graph,
            json,
            save_paths,
        } => cmd_analyze(&cli.config, &graph, json, save_paths.as_deref()),
        Commands::Paths { graph } => cmd_paths(&cli.config, &graph),
        Commands::Remediations { graph, path, json } => {
            cmd_remediations(&cli.config, &graph, path, json)
        }
        Commands::Simulate {
            graph,
            path,
            remediation,
        } => cmd_simulate(&cli.config, &graph, path, remediation),
        Commands::InitConfig => cmd_init_config(&cli.config),
    }
}

// ---------------------------------------------------------------------------
// Report shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct PathReport {
    rank: usize,
    scoring: f64,
    goal: Option<String>,
    goal_host: Option<String>,
    vertices: usize,
}

#[derive(Debug, Serialize)]
struct ActionReport {
    action: String,
    host: String,
    parameters: Vec<String>,
}

#[derive(Debug, Serialize)]
struct RemediationReport {
    rank: usize,
    cost: f64,
    actions: Vec<ActionReport>,
}

#[derive(Debug, Serialize)]
struct AnalysisReport {
    generated_at: chrono::DateTime<chrono::Utc>,
    global_score: f64,
    vertices: usize,
    arcs: usize,
    paths: Vec<PathReport>,
}

fn path_reports(session: &AnalysisSession) -> Vec<PathReport> {
    session
        .paths
        .iter()
        .enumerate()
        .map(|(rank, path)| {
            let goal_vertex = path.goal().and_then(|id| session.graph.vertex(id).ok());
            PathReport {
                rank,
                scoring: path.scoring,
                goal: goal_vertex.map(|v| v.fact.raw.clone()),
                goal_host: goal_vertex.and_then(|v| v.concerned_host.clone()),
                vertices: path.vertex_count(),
            }
        })
        .collect()
}

fn remediation_reports(remediations: &[DeployableRemediation]) -> Vec<RemediationReport> {
    remediations
        .iter()
        .enumerate()
        .map(|(rank, remediation)| RemediationReport {
            rank,
            cost: remediation.cost,
            actions: remediation
                .actions
                .iter()
                .map(|deployable| ActionReport {
                    action: format!("{:?}", deployable.action.action_type),
                    host: deployable.host.name.clone(),
                    parameters: deployable
                        .action
                        .parameters
                        .iter()
                        .map(render_parameter)
                        .collect(),
                })
                .collect(),
        })
        .collect()
}

fn render_parameter(parameter: &ActionParameter) -> String {
    match parameter {
        ActionParameter::Patch(patch) => patch.link.clone(),
        ActionParameter::SnortRule(rule) => rule.rule.clone(),
        ActionParameter::FirewallRule(rule) => rule.to_iptables(),
        ActionParameter::Username(user) => user.clone(),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn load_session(config_path: &Path, graph_file: &Path) -> VantageResult<AnalysisSession> {
    let config = if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
        VantageConfig::from_file(config_path)?
    } else {
        info!("No config file found, using defaults. Run 'init-config' to generate one.");
        VantageConfig::default()
    };
    AnalysisSession::load(config, graph_file)
}

fn cmd_analyze(
    config_path: &Path,
    graph_file: &Path,
    json: bool,
    save_paths: Option<&Path>,
) -> VantageResult<()> {
    let session = load_session(config_path, graph_file)?;

    if let Some(out) = save_paths {
        session.save_scored_paths(out)?;
        info!("Scored paths written to: {}", out.display());
    }

    let report = AnalysisReport {
        generated_at: chrono::Utc::now(),
        global_score: session.graph.global_score,
        vertices: session.graph.vertex_count(),
        arcs: session.graph.arcs().len(),
        paths: path_reports(&session),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Attack graph: {} vertices, {} arcs", report.vertices, report.arcs);
    println!("Global score: {:.3}", report.global_score);
    println!("Attack paths: {}", report.paths.len());
    for path in &report.paths {
        println!(
            "  [{}] score {:.6}  {} vertices  goal: {}",
            path.rank,
            path.scoring,
            path.vertices,
            path.goal.as_deref().unwrap_or("(none)"),
        );
    }
    if report.paths.is_empty() {
        println!("No attacker goal is reachable in this graph.");
    }
    Ok(())
}

fn cmd_paths(config_path: &Path, graph_file: &Path) -> VantageResult<()> {
    let session = load_session(config_path, graph_file)?;
    for path in path_reports(&session) {
        println!(
            "[{}] score {:.6}  {} vertices  goal: {}",
            path.rank,
            path.scoring,
            path.vertices,
            path.goal.as_deref().unwrap_or("(none)"),
        );
    }
    Ok(())
}

fn cmd_remediations(
    config_path: &Path,
    graph_file: &Path,
    path_index: usize,
    json: bool,
) -> VantageResult<()> {
    let session = load_session(config_path, graph_file)?;
    let remediations = session.remediations_for_path(path_index).ok_or_else(|| {
        VantageError::Config(format!(
            "path index {} out of range ({} paths)",
            path_index,
            session.paths.len()
        ))
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&remediation_reports(&remediations))?
        );
        return Ok(());
    }

    if remediations.is_empty() {
        println!("No remediation found for path {}.", path_index);
        return Ok(());
    }
    println!(
        "{} deployable remediations for path {} (cheapest first):",
        remediations.len(),
        path_index
    );
    for report in remediation_reports(&remediations) {
        println!("  [{}] cost {:.2}", report.rank, report.cost);
        for action in &report.actions {
            println!("      {} on {}", action.action, action.host);
            for parameter in &action.parameters {
                println!("        {}", parameter);
            }
        }
    }
    Ok(())
}

fn cmd_simulate(
    config_path: &Path,
    graph_file: &Path,
    path_index: usize,
    remediation_index: usize,
) -> VantageResult<()> {
    let session = load_session(config_path, graph_file)?;
    let remediations = session.remediations_for_path(path_index).ok_or_else(|| {
        VantageError::Config(format!(
            "path index {} out of range ({} paths)",
            path_index,
            session.paths.len()
        ))
    })?;
    let remediation = remediations.get(remediation_index).ok_or_else(|| {
        VantageError::Config(format!(
            "remediation index {} out of range ({} remediations)",
            remediation_index,
            remediations.len()
        ))
    })?;

    let outcome = session.simulate_remediation(remediation);

    println!("Before: global score {:.3}, {} paths", session.graph.global_score, session.paths.len());
    println!(
        "After:  global score {:.3}, {} paths",
        outcome.global_score,
        outcome.remaining_paths.len()
    );
    println!(
        "Vertices removed by the remediation: {}",
        session.graph.vertex_count() - outcome.graph.vertex_count()
    );
    if outcome.remaining_paths.is_empty() {
        println!("No attack path survives this remediation.");
    } else {
        for path in &outcome.remaining_paths {
            let goal = path
                .goal()
                .and_then(|id| path.graph.vertex(id).ok())
                .map(|v| v.fact.raw.clone());
            println!(
                "  surviving path: score {:.6}, goal {}",
                path.scoring,
                goal.as_deref().unwrap_or("(none)"),
            );
        }
    }
    Ok(())
}

fn cmd_init_config(config_path: &Path) -> VantageResult<()> {
    if config_path.exists() {
        return Err(VantageError::Config(format!(
            "Configuration file already exists: {}. Remove it first or use a different path.",
            config_path.display()
        )));
    }

    VantageConfig::write_default(config_path)?;
    println!("Default configuration written to: {}", config_path.display());
    println!("Key settings to configure:");
    println!("  [general]     - topology_file, vulnerability_db, cost_parameters_dir");
    println!("  [scoring]     - the per-predicate weight table");
    println!("  [remediation] - max_cut_set_size, use_snort_rules");
    Ok(())
}
