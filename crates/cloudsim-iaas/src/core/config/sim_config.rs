//! Simulation configuration read from YAML.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::CloudError;
use crate::core::host::HostSpec;
use crate::core::provisioner::ProvisionerKind;
use crate::core::vm_allocation_policy::allocation_policy_resolver;
use crate::core::vm_scheduler::VmSchedulerPolicy;

/// Holds raw simulation config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
struct RawSimulationConfig {
    pub message_delay: Option<f64>,
    pub network_latency: Option<f64>,
    pub end_time: Option<f64>,
    pub seed: Option<u64>,
    pub allocation_policy: Option<String>,
    pub vm_scheduler: Option<VmSchedulerPolicy>,
    pub datacenters: Option<Vec<DatacenterConfig>>,
}

/// Holds configuration of a single datacenter.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DatacenterConfig {
    /// Datacenter name.
    pub name: String,
    /// VM allocation policy, overrides the global one.
    pub allocation_policy: Option<String>,
    /// Configurations of datacenter hosts.
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of PEs.
    pub pes: u32,
    /// MIPS capacity of each PE.
    pub mips: f64,
    /// RAM capacity in MB.
    #[serde(default)]
    pub ram: u64,
    /// Bandwidth capacity in Mbit/s.
    #[serde(default)]
    pub bw: u64,
    /// Storage capacity in MB.
    #[serde(default)]
    pub storage: u64,
    /// PE sharing policy, overrides the global one.
    pub vm_scheduler: Option<VmSchedulerPolicy>,
    #[serde(default)]
    pub ram_provisioner: ProvisionerKind,
    #[serde(default)]
    pub bw_provisioner: ProvisionerKind,
    /// Number of such hosts.
    pub count: Option<u32>,
}

impl HostConfig {
    /// Returns names of hosts described by this config.
    pub fn host_names(&self) -> Vec<String> {
        let count = self.count.unwrap_or(1);
        match (&self.name, &self.name_prefix) {
            (Some(name), _) if count == 1 => vec![name.clone()],
            (_, Some(prefix)) => (1..=count).map(|i| format!("{}{}", prefix, i)).collect(),
            (Some(name), None) => (1..=count).map(|i| format!("{}{}", name, i)).collect(),
            (None, None) => (1..=count).map(|i| format!("host{}", i)).collect(),
        }
    }

    /// Returns host spec using the default PE sharing policy unless overridden.
    pub fn spec(&self, default_vm_scheduler: VmSchedulerPolicy) -> HostSpec {
        HostSpec::new(self.pes, self.mips, self.ram, self.bw, self.storage)
            .with_vm_scheduler(self.vm_scheduler.unwrap_or(default_vm_scheduler))
            .with_provisioners(self.ram_provisioner, self.bw_provisioner)
    }
}

/// Represents simulation configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct SimulationConfig {
    /// Delay in seconds for messages between brokers and datacenters.
    pub message_delay: f64,
    /// Latency in seconds of packet transfer between network cloudlets.
    pub network_latency: f64,
    /// Simulation stops at this time if set.
    pub end_time: Option<f64>,
    /// Random seed.
    pub seed: u64,
    /// Default VM allocation policy.
    pub allocation_policy: String,
    /// Default PE sharing policy of hosts.
    pub vm_scheduler: VmSchedulerPolicy,
    /// Configurations of datacenters.
    pub datacenters: Vec<DatacenterConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::from_raw(RawSimulationConfig::default())
    }
}

impl SimulationConfig {
    fn from_raw(raw: RawSimulationConfig) -> Self {
        Self {
            message_delay: raw.message_delay.unwrap_or(0.),
            network_latency: raw.network_latency.unwrap_or(0.),
            end_time: raw.end_time,
            seed: raw.seed.unwrap_or(123),
            allocation_policy: raw.allocation_policy.unwrap_or_else(|| "FirstFit".to_string()),
            vm_scheduler: raw.vm_scheduler.unwrap_or_default(),
            datacenters: raw.datacenters.unwrap_or_default(),
        }
    }

    /// Creates simulation config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, CloudError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| CloudError::Io {
            path: file_name.to_string(),
            source,
        })?;
        data.parse()
    }

    /// Checks that the config describes a valid topology.
    pub fn validate(&self) -> Result<(), CloudError> {
        for (name, value) in [("message_delay", self.message_delay), ("network_latency", self.network_latency)] {
            if !value.is_finite() || value < 0. {
                return Err(CloudError::invalid_spec("config", format!("{} must be non-negative", name)));
            }
        }
        if let Some(end_time) = self.end_time {
            if !(end_time >= 0.) {
                return Err(CloudError::invalid_spec("config", "end_time must be non-negative"));
            }
        }
        allocation_policy_resolver(&self.allocation_policy)?;
        for dc in self.datacenters.iter() {
            if let Some(policy) = &dc.allocation_policy {
                allocation_policy_resolver(policy)?;
            }
            for host in dc.hosts.iter() {
                if host.count == Some(0) {
                    return Err(CloudError::invalid_spec(
                        format!("datacenter {}", dc.name),
                        "host count must be positive",
                    ));
                }
                if host.pes == 0 || !(host.mips > 0.) {
                    return Err(CloudError::invalid_spec(
                        format!("datacenter {}", dc.name),
                        "hosts must have positive PE count and MIPS",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl FromStr for SimulationConfig {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawSimulationConfig = serde_yaml::from_str(s)?;
        let config = Self::from_raw(raw);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SimulationConfig = "seed: 42".parse().unwrap();
        assert_eq!(config.seed, 42);
        assert_eq!(config.message_delay, 0.);
        assert_eq!(config.allocation_policy, "FirstFit");
        assert_eq!(config.vm_scheduler, VmSchedulerPolicy::TimeShared);
        assert!(config.datacenters.is_empty());
        assert_eq!(SimulationConfig::default().seed, 123);
    }

    #[test]
    fn test_hosts() {
        let config: SimulationConfig = r#"
vm_scheduler: SpaceShared
datacenters:
  - name: dc
    hosts:
      - name_prefix: small
        pes: 2
        mips: 1000
        ram: 2048
        count: 3
      - name: big
        pes: 8
        mips: 2500
        vm_scheduler: TimeSharedOverSubscription
        bw_provisioner: BestEffort
"#
        .parse()
        .unwrap();
        let hosts = &config.datacenters[0].hosts;
        assert_eq!(hosts[0].host_names(), vec!["small1", "small2", "small3"]);
        assert_eq!(hosts[1].host_names(), vec!["big"]);
        assert_eq!(hosts[0].spec(config.vm_scheduler).vm_scheduler, VmSchedulerPolicy::SpaceShared);
        let big = hosts[1].spec(config.vm_scheduler);
        assert_eq!(big.vm_scheduler, VmSchedulerPolicy::TimeSharedOverSubscription);
        assert_eq!(big.bw_provisioner, ProvisionerKind::BestEffort);
        assert_eq!(big.pe_count, 8);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            "message_delay: -1".parse::<SimulationConfig>(),
            Err(CloudError::InvalidSpec { .. })
        ));
        assert!(matches!(
            "allocation_policy: Unknown".parse::<SimulationConfig>(),
            Err(CloudError::InvalidSpec { .. })
        ));
        assert!(matches!("message_delay: [1".parse::<SimulationConfig>(), Err(CloudError::Yaml(_))));
        assert!(matches!(
            SimulationConfig::from_file("no-such-file.yaml"),
            Err(CloudError::Io { .. })
        ));
    }
}
