//! # Topology Service
//!
//! The consumed contract of the network model: resolve hosts by name or
//! IP address, and resolve the host sequences an attacker's packets
//! traverse between two endpoints. The packet-path simulator itself is an
//! external collaborator; Vantage only reads its answers, here backed by
//! an explicit route table with a direct-hop fallback.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! internet_host = "internet_host"
//!
//! [[hosts]]
//! name = "webServer"
//! ips = ["192.168.240.200"]
//! metric = 5.0
//! services = ["httpd"]
//!
//! [[routes]]
//! hops = ["internet_host", "gateway", "webServer"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{VantageError, VantageResult};

/// Names the attacker's origin may carry in reasoner facts.
const INTERNET_ALIASES: [&str; 3] = ["internet", "1.1.1.1", "internet_host"];

/// A host of the modeled information system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub name: String,

    /// All IP addresses of the host's interfaces.
    #[serde(default)]
    pub ips: Vec<String>,

    /// Business impact weight of code execution on this host.
    #[serde(default)]
    pub metric: f64,

    /// Service names running on the host.
    #[serde(default)]
    pub services: Vec<String>,
}

impl Host {
    /// The address used when rendering firewall rules for this host.
    pub fn first_ip(&self) -> Option<&str> {
        self.ips.first().map(String::as_str)
    }
}

/// An explicit packet route: host names in traversal order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub hops: Vec<String>,
}

/// The network topology, as far as Vantage consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// The host standing in for the internet in reasoner facts.
    #[serde(default = "default_internet_host")]
    pub internet_host: String,

    #[serde(default)]
    pub hosts: Vec<Host>,

    #[serde(default)]
    pub routes: Vec<Route>,
}

fn default_internet_host() -> String {
    "internet_host".to_string()
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            internet_host: default_internet_host(),
            hosts: Vec::new(),
            routes: Vec::new(),
        }
    }
}

impl Topology {
    /// Load a topology description from a TOML file.
    pub fn from_file(path: &Path) -> VantageResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let topology: Topology = toml::from_str(&content)?;
        Ok(topology)
    }

    /// Resolve a host by name or by any of its IP addresses.
    /// Internet aliases resolve to the designated internet host.
    pub fn host_by_name_or_ip(&self, key: &str) -> Option<&Host> {
        let key = if self.is_internet_alias(key) {
            self.internet_host.as_str()
        } else {
            key
        };
        self.hosts
            .iter()
            .find(|h| h.name == key || h.ips.iter().any(|ip| ip == key))
    }

    /// Like [`host_by_name_or_ip`], but a missing host is an error.
    pub fn require_host(&self, key: &str) -> VantageResult<&Host> {
        self.host_by_name_or_ip(key)
            .ok_or_else(|| VantageError::Topology(format!("unknown host: {key}")))
    }

    pub fn is_internet_alias(&self, key: &str) -> bool {
        key == self.internet_host || INTERNET_ALIASES.contains(&key)
    }

    /// All routes whose endpoints are the given hosts, as host sequences.
    /// Falls back to a single direct hop when no explicit route matches.
    pub fn routes_between(&self, from: &Host, to: &Host) -> Vec<Vec<Host>> {
        let matching: Vec<Vec<Host>> = self
            .routes
            .iter()
            .filter(|r| {
                r.hops.first().map(String::as_str) == Some(from.name.as_str())
                    && r.hops.last().map(String::as_str) == Some(to.name.as_str())
            })
            .filter_map(|r| self.resolve_hops(&r.hops))
            .collect();

        if matching.is_empty() {
            vec![vec![from.clone(), to.clone()]]
        } else {
            matching
        }
    }

    /// The host sequences an attacker's packets can traverse between two
    /// fact endpoints, honoring internet aliases on either side.
    pub fn routes_between_endpoints(
        &self,
        from_key: &str,
        to_key: &str,
    ) -> VantageResult<Vec<Vec<Host>>> {
        let from = self.require_host(from_key)?;
        let to = self.require_host(to_key)?;
        Ok(self.routes_between(from, to))
    }

    /// Resolve every hop name of a route; None if any hop is unknown.
    fn resolve_hops(&self, hops: &[String]) -> Option<Vec<Host>> {
        hops.iter()
            .map(|name| self.host_by_name_or_ip(name).cloned())
            .collect()
    }
}
