//! Hosts of a datacenter and placement of VMs onto them.

use std::collections::BTreeMap;

use crate::core::error::CloudError;
use crate::core::host::Host;
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::VmAllocationPolicy;
use crate::core::vm_scheduler::CapacityChanges;

/// Result of successful VM placement.
#[derive(Clone, Debug, PartialEq)]
pub struct Placement {
    pub host_id: u32,
    pub changes: CapacityChanges,
}

/// Owns the hosts and keeps the VM to host relation.
#[derive(Clone, Default)]
pub struct HostPool {
    hosts: BTreeMap<u32, Host>,
    vm_hosts: BTreeMap<u32, u32>,
}

impl HostPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&mut self, host: Host) -> Result<(), CloudError> {
        if self.hosts.contains_key(&host.id) {
            return Err(CloudError::invalid_spec(
                format!("host {}", host.id),
                "host with this id already exists",
            ));
        }
        self.hosts.insert(host.id, host);
        Ok(())
    }

    pub fn host(&self, id: u32) -> Option<&Host> {
        self.hosts.get(&id)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn host_of(&self, vm_id: u32) -> Option<u32> {
        self.vm_hosts.get(&vm_id).copied()
    }

    /// Places the VM on the host selected by the policy.
    ///
    /// Fails with [`CloudError::NoSuitableHost`] if the policy finds no host, all hosts are left unchanged.
    pub fn allocate(&mut self, vm: &VmSpec, policy: &dyn VmAllocationPolicy) -> Result<Placement, CloudError> {
        if self.vm_hosts.contains_key(&vm.id) {
            return Err(CloudError::invalid_spec(format!("vm {}", vm.id), "vm is already placed"));
        }
        let host_id = self
            .select_host(vm, None, policy)
            .ok_or(CloudError::NoSuitableHost { vm_id: vm.id })?;
        self.allocate_on(vm, host_id)
    }

    fn select_host(&self, vm: &VmSpec, exclude: Option<u32>, policy: &dyn VmAllocationPolicy) -> Option<u32> {
        let candidates: Vec<&Host> = self.hosts.values().filter(|h| Some(h.id) != exclude).collect();
        policy.select_host(vm, &candidates)
    }

    /// Places the VM on the specified host.
    pub fn allocate_on(&mut self, vm: &VmSpec, host_id: u32) -> Result<Placement, CloudError> {
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(CloudError::UnknownEntity { kind: "host", id: host_id })?;
        let changes = host.allocate(vm)?;
        self.vm_hosts.insert(vm.id, host_id);
        Ok(Placement { host_id, changes })
    }

    /// Returns the resources of the VM to its host. Idempotent.
    ///
    /// Returns the host and the changed grants of the VMs remaining on it.
    pub fn deallocate(&mut self, vm_id: u32) -> Option<(u32, CapacityChanges)> {
        let host_id = self.vm_hosts.remove(&vm_id)?;
        let changes = self.hosts.get_mut(&host_id).map(|h| h.deallocate(vm_id)).unwrap_or_default();
        Some((host_id, changes))
    }

    /// Moves the VM to another host as a single step.
    ///
    /// The target host is selected by the policy among the hosts other than the source one unless specified.
    /// If the VM can't be placed on the target, the pool is restored to its state before migration.
    ///
    /// Returns the source host with the changed grants of the VMs remaining on it, and the new placement.
    pub fn migrate(
        &mut self,
        vm: &VmSpec,
        target: Option<u32>,
        policy: &dyn VmAllocationPolicy,
    ) -> Result<(u32, CapacityChanges, Placement), CloudError> {
        let source = self
            .host_of(vm.id)
            .ok_or(CloudError::UnknownEntity { kind: "vm", id: vm.id })?;
        if target == Some(source) {
            return Err(CloudError::invalid_spec(
                format!("vm {}", vm.id),
                format!("vm is already placed on host {}", source),
            ));
        }
        let snapshot = self.hosts.get(&source).cloned();
        let (_, source_changes) = self
            .deallocate(vm.id)
            .ok_or(CloudError::UnknownEntity { kind: "vm", id: vm.id })?;
        let result = match target {
            Some(host_id) => self.allocate_on(vm, host_id),
            None => match self.select_host(vm, Some(source), policy) {
                Some(host_id) => self.allocate_on(vm, host_id),
                None => Err(CloudError::NoSuitableHost { vm_id: vm.id }),
            },
        };
        match result {
            Ok(placement) => Ok((source, source_changes, placement)),
            Err(e) => {
                if let Some(host) = snapshot {
                    self.hosts.insert(source, host);
                }
                self.vm_hosts.insert(vm.id, source);
                Err(e)
            }
        }
    }

    /// Changes the per-PE MIPS of the VM on its host.
    pub fn resize_vm_mips(&mut self, vm_id: u32, mips_per_pe: f64) -> Result<(u32, CapacityChanges), CloudError> {
        let host_id = self
            .host_of(vm_id)
            .ok_or(CloudError::UnknownEntity { kind: "vm", id: vm_id })?;
        let host = self
            .hosts
            .get_mut(&host_id)
            .ok_or(CloudError::UnknownEntity { kind: "host", id: host_id })?;
        host.resize_vm_mips(vm_id, mips_per_pe).map(|changes| (host_id, changes))
    }
}

#[cfg(test)]
mod tests {
    use crate::core::host::HostSpec;
    use crate::core::vm_allocation_policies::first_fit::FirstFit;
    use crate::core::vm_scheduler::VmSchedulerPolicy;

    use super::*;

    fn pool() -> HostPool {
        let mut pool = HostPool::new();
        pool.add_host(Host::new(0, "h0", &HostSpec::new(4, 1000., 4096, 1000, 10000)).unwrap())
            .unwrap();
        pool.add_host(Host::new(1, "h1", &HostSpec::new(2, 1000., 2048, 1000, 10000)).unwrap())
            .unwrap();
        pool
    }

    #[test]
    fn test_no_suitable_host_leaves_hosts_unchanged() {
        let mut pool = pool();
        let before: Vec<_> = pool.hosts().map(|h| h.usage()).collect();
        let err = pool.allocate(&VmSpec::new(1, 8, 1000.), &FirstFit::new()).unwrap_err();
        assert!(matches!(err, CloudError::NoSuitableHost { vm_id: 1 }));
        let after: Vec<_> = pool.hosts().map(|h| h.usage()).collect();
        assert_eq!(before, after);
        assert!(pool.host_of(1).is_none());
    }

    #[test]
    fn test_deallocate_is_idempotent() {
        let mut pool = pool();
        let placement = pool.allocate(&VmSpec::new(1, 2, 1000.), &FirstFit::new()).unwrap();
        assert_eq!(placement.host_id, 0);
        assert_eq!(pool.deallocate(1).map(|(host, _)| host), Some(0));
        assert!(pool.deallocate(1).is_none());
        assert_eq!(pool.host(0).unwrap().available_mips(), 4000.);
    }

    #[test]
    fn test_migration() {
        let mut pool = pool();
        let policy = FirstFit::new();
        let vm = VmSpec::new(1, 2, 1000.).with_ram(1024);
        pool.allocate(&vm, &policy).unwrap();

        let (source, _, placement) = pool.migrate(&vm, None, &policy).unwrap();
        assert_eq!(source, 0);
        assert_eq!(placement.host_id, 1);
        assert_eq!(pool.host_of(1), Some(1));
        assert_eq!(pool.host(0).unwrap().available_mips(), 4000.);
        assert_eq!(pool.host(1).unwrap().allocated_ram(1), 1024);

        let big = VmSpec::new(2, 3, 1000.);
        pool.allocate(&big, &policy).unwrap();
        let before: Vec<_> = pool.hosts().map(|h| h.usage()).collect();
        assert!(pool.migrate(&big, Some(1), &policy).is_err());
        assert!(pool.migrate(&big, None, &policy).is_err());
        let after: Vec<_> = pool.hosts().map(|h| h.usage()).collect();
        assert_eq!(before, after);
        assert_eq!(pool.host_of(2), Some(0));
    }

    #[test]
    fn test_over_subscription_changes_on_deallocate() {
        let mut pool = HostPool::new();
        let spec =
            HostSpec::new(1, 1000., 1024, 100, 100).with_vm_scheduler(VmSchedulerPolicy::TimeSharedOverSubscription);
        pool.add_host(Host::new(0, "h0", &spec).unwrap()).unwrap();
        let policy = FirstFit::new();
        pool.allocate(&VmSpec::new(1, 1, 1000.), &policy).unwrap();
        let placement = pool.allocate(&VmSpec::new(2, 1, 1000.), &policy).unwrap();
        assert_eq!(placement.changes, CapacityChanges::from([(1, 500.), (2, 500.)]));
        let (_, changes) = pool.deallocate(2).unwrap();
        assert_eq!(changes, CapacityChanges::from([(1, 1000.)]));
    }
}
