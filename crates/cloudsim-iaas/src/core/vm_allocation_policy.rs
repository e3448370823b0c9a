//! VM allocation policies.

use crate::core::config::options::{parse_config_value, parse_options};
use crate::core::error::CloudError;
use crate::core::host::Host;
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policies::best_fit::BestFit;
use crate::core::vm_allocation_policies::first_fit::FirstFit;
use crate::core::vm_allocation_policies::worst_fit::WorstFit;

/// Trait for implementation of VM allocation policies.
///
/// The policy is defined as a function of VM requirements and candidate hosts, which returns an ID of host selected
/// for VM placement or `None` if there is no suitable host. Hosts are passed in ascending order of their IDs.
///
/// The selected host must be suitable for the VM, the actual allocation is performed by the host pool.
pub trait VmAllocationPolicy {
    fn select_host(&self, vm: &VmSpec, hosts: &[&Host]) -> Option<u32>;
}

/// Creates allocation policy from its config string, e.g. `FirstFit` or `BestFit[threshold=0.9]`.
pub fn allocation_policy_resolver(config_str: &str) -> Result<Box<dyn VmAllocationPolicy>, CloudError> {
    let (name, options) = parse_config_value(config_str);
    let options = parse_options(options.as_deref().unwrap_or(""));
    match name.as_str() {
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        "BestFit" => Ok(Box::new(BestFit::from_options(&options)?)),
        "WorstFit" => Ok(Box::new(WorstFit::new())),
        _ => Err(CloudError::invalid_spec(
            "allocation policy",
            format!("can't resolve {}", config_str),
        )),
    }
}
