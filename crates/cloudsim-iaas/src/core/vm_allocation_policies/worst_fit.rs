//! Worst Fit policy.

use crate::core::host::Host;
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::VmAllocationPolicy;

/// Uses the least loaded (by allocated MIPS) suitable host.
#[derive(Default)]
pub struct WorstFit;

impl WorstFit {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmAllocationPolicy for WorstFit {
    fn select_host(&self, vm: &VmSpec, hosts: &[&Host]) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut max_available_mips = f64::MIN;

        for host in hosts {
            if host.is_suitable(vm) && host.available_mips() > max_available_mips {
                max_available_mips = host.available_mips();
                result = Some(host.id);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::core::host::HostSpec;
    use crate::core::vm_allocation_policies::best_fit::BestFit;
    use crate::core::vm_allocation_policies::first_fit::FirstFit;

    use super::*;

    fn hosts() -> Vec<Host> {
        let spec = HostSpec::new(4, 1000., 4096, 1000, 10000);
        let mut hosts: Vec<Host> = (0..3).map(|id| Host::new(id, &format!("h{}", id), &spec).unwrap()).collect();
        hosts[0].allocate(&VmSpec::new(100, 1, 1000.)).unwrap();
        hosts[1].allocate(&VmSpec::new(101, 3, 1000.)).unwrap();
        hosts
    }

    #[test]
    fn test_policies_pick_hosts_by_free_mips() {
        let hosts = hosts();
        let refs: Vec<&Host> = hosts.iter().collect();
        let vm = VmSpec::new(1, 1, 1000.);
        assert_eq!(FirstFit::new().select_host(&vm, &refs), Some(0));
        assert_eq!(BestFit::new().select_host(&vm, &refs), Some(1));
        assert_eq!(WorstFit::new().select_host(&vm, &refs), Some(2));
        assert_eq!(BestFit::with_threshold(0.6).select_host(&vm, &refs), Some(0));

        let big = VmSpec::new(2, 4, 1000.);
        assert_eq!(FirstFit::new().select_host(&big, &refs), Some(2));
        assert_eq!(BestFit::new().select_host(&big, &refs), Some(2));
        let huge = VmSpec::new(3, 5, 1000.);
        assert_eq!(WorstFit::new().select_host(&huge, &refs), None);
    }
}
