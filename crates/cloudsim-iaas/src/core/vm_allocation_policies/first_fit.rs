//! First Fit policy.

use crate::core::host::Host;
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::VmAllocationPolicy;

/// Uses the first suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for FirstFit {
    fn select_host(&self, vm: &VmSpec, hosts: &[&Host]) -> Option<u32> {
        hosts.iter().find(|host| host.is_suitable(vm)).map(|host| host.id)
    }
}
