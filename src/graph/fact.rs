// SENTINEL Vantage - Attack Graph Core
// fact.rs - Vertex facts: Datalog predicates and derivation rule markers
//
// Every vertex of the reasoner output carries a fact string. It is either
// a Datalog predicate ("execCode(webServer,root)") or a derivation rule
// marker ("RULE 2 (remote exploit of a server program)"). Anything else
// is rejected at load time.
//
// Copyright (c) 2026 CIPS Corps. All rights reserved.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::{VantageError, VantageResult};

/// "command(param1,param2,...)"
static RE_DATALOG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z\\=]+)\((.*)\)$").expect("regex"));

/// "RULE <n> (<text>)"
static RE_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^RULE (\d+) \((.*)\)$").expect("regex"));

/// A Datalog predicate with its ordered parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatalogFact {
    /// Predicate name, e.g. "vulExists", "hacl", "execCode".
    pub command: String,
    /// Ordered parameters with surrounding quotes stripped.
    pub params: Vec<String>,
}

impl DatalogFact {
    /// Positional parameter access; None past the end.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// An opaque derivation-rule marker emitted by the reasoner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationRule {
    pub number: u32,
    pub text: String,
}

/// The parsed content of a fact string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactKind {
    Datalog(DatalogFact),
    Rule(DerivationRule),
}

/// A vertex fact: the raw reasoner string plus its parsed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// The fact exactly as the reasoner emitted it.
    pub raw: String,
    pub kind: FactKind,
}

impl Fact {
    /// Parse a reasoner fact string.
    ///
    /// Rule markers are tried first: "RULE 4 (...)" would otherwise never
    /// match since the Datalog pattern requires a bare command name.
    pub fn parse(raw: &str) -> VantageResult<Self> {
        if let Some(caps) = RE_RULE.captures(raw) {
            let number = caps[1]
                .parse::<u32>()
                .map_err(|_| VantageError::MalformedFact(raw.to_string()))?;
            return Ok(Self {
                raw: raw.to_string(),
                kind: FactKind::Rule(DerivationRule {
                    number,
                    text: caps[2].to_string(),
                }),
            });
        }

        if let Some(caps) = RE_DATALOG.captures(raw) {
            let command = caps[1].to_string();
            let params = caps[2]
                .split(',')
                .map(|p| strip_quotes(p).to_string())
                .collect();
            return Ok(Self {
                raw: raw.to_string(),
                kind: FactKind::Datalog(DatalogFact { command, params }),
            });
        }

        Err(VantageError::MalformedFact(raw.to_string()))
    }

    /// The Datalog fact, if this is one.
    pub fn datalog(&self) -> Option<&DatalogFact> {
        match &self.kind {
            FactKind::Datalog(d) => Some(d),
            FactKind::Rule(_) => None,
        }
    }

    /// The derivation rule, if this is one.
    pub fn rule(&self) -> Option<&DerivationRule> {
        match &self.kind {
            FactKind::Rule(r) => Some(r),
            FactKind::Datalog(_) => None,
        }
    }

    /// True if this fact is the Datalog predicate `command`.
    pub fn is_command(&self, command: &str) -> bool {
        self.datalog().map(|d| d.command == command).unwrap_or(false)
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Strip one matching pair of single or double quotes.
fn strip_quotes(param: &str) -> &str {
    let p = param.trim();
    if (p.starts_with('\'') && p.ends_with('\'') && p.len() >= 2)
        || (p.starts_with('"') && p.ends_with('"') && p.len() >= 2)
    {
        &p[1..p.len() - 1]
    } else {
        p
    }
}
