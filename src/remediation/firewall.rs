//! # Firewall Rules
//!
//! The concrete parameter of a DeployFirewallRule action: a DROP rule for
//! the attacker's traffic, renderable in iptables form for reports and
//! deployment scripts.

use serde::{Deserialize, Serialize};

use crate::{VantageError, VantageResult};

/// What the rule does with matching packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FirewallAction {
    Drop,
    Accept,
}

impl FirewallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallAction::Drop => "DROP",
            FirewallAction::Accept => "ACCEPT",
        }
    }
}

/// Transport protocol matched by the rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Tcp,
    Udp,
    Any,
}

impl Protocol {
    /// Parse the protocol parameter of a reasoner fact. Unknown strings
    /// fall back to matching any protocol.
    pub fn from_fact_param(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => Protocol::Any,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Any => "all",
        }
    }
}

/// Which chain the rule is installed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Table {
    Input,
    Output,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Input => "INPUT",
            Table::Output => "OUTPUT",
        }
    }
}

/// An inclusive port range. `any()` matches every port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn any() -> Self {
        Self { min: 0, max: 65535 }
    }

    pub fn single(port: u16) -> Self {
        Self { min: port, max: port }
    }

    pub fn is_any(&self) -> bool {
        self.min == 0 && self.max == 65535
    }

    /// Parse a reasoner port parameter: "80", "8000-8080", or "_"/"any".
    pub fn from_fact_param(s: &str) -> VantageResult<Self> {
        let s = s.trim();
        if s.is_empty() || s == "_" || s.eq_ignore_ascii_case("any") {
            return Ok(Self::any());
        }
        if let Some((low, high)) = s.split_once('-') {
            let min = low
                .trim()
                .parse::<u16>()
                .map_err(|_| VantageError::Remediation(format!("bad port range: {s}")))?;
            let max = high
                .trim()
                .parse::<u16>()
                .map_err(|_| VantageError::Remediation(format!("bad port range: {s}")))?;
            return Ok(Self { min, max });
        }
        let port = s
            .parse::<u16>()
            .map_err(|_| VantageError::Remediation(format!("bad port: {s}")))?;
        Ok(Self::single(port))
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            write!(f, "any")
        } else if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}:{}", self.min, self.max)
        }
    }
}

/// A concrete firewall rule.
///
/// Addresses are plain strings with a prefix length; "0.0.0.0/0" is the
/// wildcard used when one side of the traffic is the internet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub action: FirewallAction,
    pub protocol: Protocol,
    pub source: String,
    pub source_prefix: u8,
    pub source_port: PortRange,
    pub destination: String,
    pub destination_prefix: u8,
    pub destination_port: PortRange,
    pub table: Table,
}

impl FirewallRule {
    /// A DROP rule for traffic from `source` to `destination`.
    /// Prefix 0 on either side means "anywhere".
    pub fn drop_rule(
        protocol: Protocol,
        source: &str,
        source_prefix: u8,
        destination: &str,
        destination_prefix: u8,
        destination_port: PortRange,
        table: Table,
    ) -> Self {
        Self {
            action: FirewallAction::Drop,
            protocol,
            source: source.to_string(),
            source_prefix,
            source_port: PortRange::any(),
            destination: destination.to_string(),
            destination_prefix,
            destination_port,
            table,
        }
    }

    /// Render as an iptables append command.
    pub fn to_iptables(&self) -> String {
        let mut rule = format!(
            "iptables -A {} -j {} -p {} -s {}/{} -d {}/{}",
            self.table.as_str(),
            self.action.as_str(),
            self.protocol.as_str(),
            self.source,
            self.source_prefix,
            self.destination,
            self.destination_prefix,
        );
        if !self.source_port.is_any() {
            rule.push_str(&format!(" --sport {}", self.source_port));
        }
        if !self.destination_port.is_any() {
            rule.push_str(&format!(" --dport {}", self.destination_port));
        }
        rule
    }
}

impl std::fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}/{}\t{}/{}\tdpt:{}",
            self.action.as_str(),
            self.protocol.as_str(),
            self.source,
            self.source_prefix,
            self.destination,
            self.destination_prefix,
            self.destination_port,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_parsing() {
        assert_eq!(PortRange::from_fact_param("80").unwrap(), PortRange::single(80));
        assert_eq!(
            PortRange::from_fact_param("8000-8080").unwrap(),
            PortRange { min: 8000, max: 8080 }
        );
        assert!(PortRange::from_fact_param("_").unwrap().is_any());
        assert!(PortRange::from_fact_param("any").unwrap().is_any());
        assert!(PortRange::from_fact_param("not-a-port").is_err());
    }

    #[test]
    fn test_protocol_parsing_falls_back_to_any() {
        assert_eq!(Protocol::from_fact_param("tcp"), Protocol::Tcp);
        assert_eq!(Protocol::from_fact_param("UDP"), Protocol::Udp);
        assert_eq!(Protocol::from_fact_param("icmp"), Protocol::Any);
    }

    #[test]
    fn test_iptables_rendering() {
        let rule = FirewallRule::drop_rule(
            Protocol::Tcp,
            "0.0.0.0",
            0,
            "192.168.240.200",
            32,
            PortRange::single(80),
            Table::Input,
        );
        assert_eq!(
            rule.to_iptables(),
            "iptables -A INPUT -j DROP -p tcp -s 0.0.0.0/0 -d 192.168.240.200/32 --dport 80"
        );
    }

    #[test]
    fn test_display_matches_report_format() {
        let rule = FirewallRule::drop_rule(
            Protocol::Tcp,
            "192.168.240.200",
            32,
            "192.168.240.100",
            32,
            PortRange::single(3306),
            Table::Output,
        );
        let text = rule.to_string();
        assert!(text.starts_with("DROP\ttcp"));
        assert!(text.ends_with("dpt:3306"));
    }
}
