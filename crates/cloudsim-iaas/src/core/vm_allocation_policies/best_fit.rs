//! Best Fit policy.

use std::collections::HashMap;

use crate::core::error::CloudError;
use crate::core::host::Host;
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::VmAllocationPolicy;

/// Uses the most loaded (by allocated MIPS) suitable host.
///
/// With `threshold` option set, hosts whose MIPS load after placement would exceed the threshold are skipped.
pub struct BestFit {
    threshold: f64,
}

impl BestFit {
    pub fn new() -> Self {
        Self { threshold: 1. }
    }

    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_options(options: &HashMap<String, String>) -> Result<Self, CloudError> {
        match options.get("threshold") {
            Some(value) => {
                let threshold = value.parse::<f64>().map_err(|_| {
                    CloudError::invalid_spec("BestFit", format!("can't parse threshold value {}", value))
                })?;
                if !(threshold > 0. && threshold <= 1.) {
                    return Err(CloudError::invalid_spec(
                        "BestFit",
                        format!("threshold must be in (0, 1], got {}", threshold),
                    ));
                }
                Ok(Self::with_threshold(threshold))
            }
            None => Ok(Self::new()),
        }
    }
}

impl Default for BestFit {
    fn default() -> Self {
        Self::new()
    }
}

impl VmAllocationPolicy for BestFit {
    fn select_host(&self, vm: &VmSpec, hosts: &[&Host]) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_available_mips = f64::MAX;

        for host in hosts {
            if !host.is_suitable(vm) {
                continue;
            }
            let available = host.available_mips();
            let load = (host.total_mips() - available + vm.total_mips()) / host.total_mips();
            if load <= self.threshold && available < min_available_mips {
                min_available_mips = available;
                result = Some(host.id);
            }
        }
        result
    }
}
