//! # Operational Cost Parameters
//!
//! Every remediation action type carries a set of operational cost
//! parameters loaded from a per-type TOML file in the configured cost
//! folder (`patch.toml`, `firewall-rule.toml`, `snort-rule.toml`,
//! `user-training.toml`). Missing files fall back to defaults, so a bare
//! deployment still produces ranked remediations, just with flat costs.
//!
//! The cost model is a sum of component costs, each rounded to cents:
//! direct remediation cost, deployment (duration x skill rate x work
//! cost), production tests, service restart, and steady-state
//! maintenance (power, storage, maintenance labor).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::remediation::ActionType;
use crate::VantageResult;

/// Cost parameters for one remediation action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostParameters {
    /// Direct cost of the remediation itself (license, patch purchase...).
    pub remediation_cost: f64,

    /// Hours of business-application testing after deployment.
    pub business_applications_tests_duration: f64,

    /// Hourly cost of one unit of work.
    pub work_cost: f64,

    /// Cost of one unit of computation power.
    pub computation_power_cost: f64,

    /// Cost of one unit of storage.
    pub storage_cost: f64,

    /// Hours needed to deploy the remediation.
    pub deployment_duration: f64,

    /// Hours needed to uninstall the remediation.
    pub remediation_uninstall_duration: f64,

    /// Hours of service unavailability during deployment.
    pub service_unavailability_duration: f64,

    /// Flat cost of restarting the impacted service.
    pub restart_cost: f64,

    /// Hours the restart takes.
    pub restart_duration: f64,

    /// Computation power the deployed remediation consumes.
    pub used_power: f64,

    /// Storage the deployed remediation consumes.
    pub used_storage: f64,

    /// Hours of maintenance per accounting period.
    pub maintenance_duration: f64,

    /// Skill multiplier of the staff running tests.
    pub skill_rate_tests: f64,

    /// Skill multiplier of the staff deploying.
    pub skill_rate_deployment: f64,

    /// Skill multiplier of the staff maintaining.
    pub skill_rate_maintenance: f64,
}

impl Default for CostParameters {
    fn default() -> Self {
        Self {
            remediation_cost: 0.0,
            business_applications_tests_duration: 0.0,
            work_cost: 0.0,
            computation_power_cost: 0.0,
            storage_cost: 0.0,
            deployment_duration: 0.0,
            remediation_uninstall_duration: 0.0,
            service_unavailability_duration: 0.0,
            restart_cost: 0.0,
            restart_duration: 0.0,
            used_power: 0.0,
            used_storage: 0.0,
            maintenance_duration: 0.0,
            skill_rate_tests: 1.0,
            skill_rate_deployment: 1.0,
            skill_rate_maintenance: 1.0,
        }
    }
}

/// Round a cost to cents.
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl CostParameters {
    /// The parameter file name for an action type.
    pub fn file_name(action_type: ActionType) -> &'static str {
        match action_type {
            ActionType::ApplyPatch => "patch.toml",
            ActionType::DeployFirewallRule => "firewall-rule.toml",
            ActionType::DeploySnortRule => "snort-rule.toml",
            ActionType::TrainUser => "user-training.toml",
        }
    }

    /// Load the parameters for an action type from the cost folder,
    /// falling back to defaults when the file does not exist.
    pub fn load_for_action(dir: &Path, action_type: ActionType) -> VantageResult<Self> {
        let path = dir.join(Self::file_name(action_type));
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        let params: CostParameters = toml::from_str(&content)?;
        Ok(params)
    }

    /// Cost of validating the remediation before rollout.
    pub fn test_cost(&self) -> f64 {
        round_cents(
            (self.deployment_duration
                + self.business_applications_tests_duration
                + self.remediation_uninstall_duration)
                * self.skill_rate_tests
                * self.work_cost,
        )
    }

    /// Cost of rolling the remediation out, including production tests.
    pub fn deployment_cost(&self) -> f64 {
        let deployment = self.deployment_duration * self.skill_rate_deployment * self.work_cost;
        let production_tests =
            self.business_applications_tests_duration * self.skill_rate_tests * self.work_cost;
        round_cents(deployment + production_tests)
    }

    /// Cost of restarting the impacted service.
    pub fn restart_cost(&self) -> f64 {
        round_cents(self.restart_cost)
    }

    /// Steady-state cost of keeping the remediation in place.
    pub fn maintenance_cost(&self) -> f64 {
        round_cents(
            self.used_power * self.computation_power_cost
                + self.used_storage * self.storage_cost
                + self.maintenance_duration * self.work_cost * self.skill_rate_maintenance,
        )
    }

    /// Total operational cost of one deployment of the action.
    pub fn operational_cost(&self) -> f64 {
        round_cents(
            round_cents(self.remediation_cost)
                + self.maintenance_cost()
                + self.restart_cost()
                + self.deployment_cost()
                + self.test_cost(),
        )
    }
}
