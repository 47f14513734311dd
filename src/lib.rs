//! # SENTINEL Vantage - Core Library
//!
//! Attack path risk scoring and remediation planning for modeled
//! information systems.
//!
//! Vantage consumes the AND/OR derivation graph produced by an external
//! logic-programming reasoner, derives every multi-step attack path that
//! reaches an attacker goal, scores the paths, and computes minimal sets
//! of countermeasures (patches, IDS rules, firewall rules, user training)
//! that break each path, priced against operational cost parameters.
//!
//! ## Design Philosophy
//! - The graph algorithms are the product. Everything around them
//!   (reasoner, topology simulator, vulnerability database) is a
//!   collaborator consumed through a narrow contract.
//! - No session globals: every operation takes its context explicitly
//!   (see [`session::AnalysisSession`]).
//! - Destructive "what if" questions run on clones, never on the live graph.

pub mod graph;
pub mod paths;
pub mod remediation;
pub mod scoring;
pub mod session;
pub mod topology;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use scoring::ScoringRule;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Unified error type for SENTINEL Vantage.
#[derive(Error, Debug)]
pub enum VantageError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vertex {0} is not in this attack graph")]
    VertexNotFound(u32),

    #[error("Malformed fact: {0}")]
    MalformedFact(String),

    #[error("Attack graph XML error: {0}")]
    GraphXml(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Remediation error: {0}")]
    Remediation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

pub type VantageResult<T> = Result<T, VantageError>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Top-level configuration for SENTINEL Vantage.
///
/// Loaded from `sentinel-vantage.toml` in the working directory or a path
/// supplied via CLI flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VantageConfig {
    /// General analysis settings.
    pub general: GeneralConfig,

    /// Path scoring weight table.
    pub scoring: ScoringConfig,

    /// Remediation computation settings.
    pub remediation: RemediationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Path to the network topology description (hosts and routes).
    pub topology_file: std::path::PathBuf,

    /// Path to the vulnerability/patch/rule SQLite database.
    pub vulnerability_db: std::path::PathBuf,

    /// Folder holding per-action-type operational cost parameter files.
    pub cost_parameters_dir: std::path::PathBuf,

    /// Abort enumeration of a goal whose AND vertices exceed this fan-in.
    /// Guards against combinatorial blow-up in the Cartesian product.
    pub max_and_fanin: usize,

    /// Abort enumeration of a goal once this many paths have been produced
    /// for it.
    pub max_paths_per_goal: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiplicative factors applied per matching vertex fact.
    /// Replaces the hardcoded per-scenario boosts of earlier engines with
    /// a declarative table an operator can extend.
    pub rules: Vec<ScoringRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Largest leaf combination tested as a cut set.
    pub max_cut_set_size: usize,

    /// Whether IDS (snort) rule deployment is offered as a remediation
    /// alternative for vulnerability leaves.
    pub use_snort_rules: bool,
}

impl Default for VantageConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig {
                topology_file: std::path::PathBuf::from("./topology.toml"),
                vulnerability_db: std::path::PathBuf::from("./vantage-data/vulnerabilities.db"),
                cost_parameters_dir: std::path::PathBuf::from("./vantage-data/cost-parameters"),
                max_and_fanin: 12,
                max_paths_per_goal: 10_000,
            },
            scoring: ScoringConfig {
                rules: ScoringRule::default_table(),
            },
            remediation: RemediationConfig {
                max_cut_set_size: 4,
                use_snort_rules: true,
            },
        }
    }
}

impl VantageConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> VantageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: VantageConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Write the default configuration to a TOML file.
    pub fn write_default(path: &Path) -> VantageResult<()> {
        let config = Self::default();
        let content =
            toml::to_string_pretty(&config).map_err(|e| VantageError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
