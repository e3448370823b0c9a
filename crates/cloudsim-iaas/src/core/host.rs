//! Physical host leasing its resources to VMs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::common::ResourceKind;
use crate::core::error::CloudError;
use crate::core::ledger::ResourceLedger;
use crate::core::provisioner::{ProvisionerKind, ResourceProvisioner};
use crate::core::vm::VmSpec;
use crate::core::vm_scheduler::{CapacityChanges, VmScheduler, VmSchedulerPolicy};

/// Host hardware and its resource sharing policies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub pe_count: u32,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    #[serde(default)]
    pub vm_scheduler: VmSchedulerPolicy,
    #[serde(default)]
    pub ram_provisioner: ProvisionerKind,
    #[serde(default)]
    pub bw_provisioner: ProvisionerKind,
}

impl HostSpec {
    pub fn new(pe_count: u32, mips_per_pe: f64, ram: u64, bw: u64, storage: u64) -> Self {
        Self {
            pe_count,
            mips_per_pe,
            ram,
            bw,
            storage,
            vm_scheduler: VmSchedulerPolicy::TimeShared,
            ram_provisioner: ProvisionerKind::Simple,
            bw_provisioner: ProvisionerKind::Simple,
        }
    }

    pub fn with_vm_scheduler(mut self, policy: VmSchedulerPolicy) -> Self {
        self.vm_scheduler = policy;
        self
    }

    pub fn with_provisioners(mut self, ram: ProvisionerKind, bw: ProvisionerKind) -> Self {
        self.ram_provisioner = ram;
        self.bw_provisioner = bw;
        self
    }
}

/// Snapshot of host resource availability.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HostUsage {
    pub available_mips: f64,
    pub free_pes: u32,
    pub available_ram: u64,
    pub available_bw: u64,
    pub available_storage: u64,
    pub vm_count: usize,
}

#[derive(Clone)]
pub struct Host {
    pub id: u32,
    pub name: String,
    vm_scheduler: VmScheduler,
    ram: Box<dyn ResourceProvisioner<u64>>,
    bw: Box<dyn ResourceProvisioner<u64>>,
    storage: ResourceLedger<u64>,
    vms: BTreeSet<u32>,
}

impl Host {
    pub fn new(id: u32, name: &str, spec: &HostSpec) -> Result<Self, CloudError> {
        Ok(Self {
            id,
            name: name.to_string(),
            vm_scheduler: VmScheduler::new(spec.vm_scheduler, spec.pe_count, spec.mips_per_pe)?,
            ram: spec.ram_provisioner.build(ResourceKind::Ram, spec.ram)?,
            bw: spec.bw_provisioner.build(ResourceKind::Bandwidth, spec.bw)?,
            storage: ResourceLedger::new(ResourceKind::Storage, spec.storage)?,
            vms: BTreeSet::new(),
        })
    }

    pub fn vm_scheduler(&self) -> &VmScheduler {
        &self.vm_scheduler
    }

    pub fn vms(&self) -> impl Iterator<Item = u32> + '_ {
        self.vms.iter().copied()
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.vms.contains(&vm_id)
    }

    pub fn total_mips(&self) -> f64 {
        self.vm_scheduler.total_mips()
    }

    pub fn available_mips(&self) -> f64 {
        self.vm_scheduler.available_mips()
    }

    pub fn granted_mips(&self, vm_id: u32) -> f64 {
        self.vm_scheduler.granted_mips(vm_id)
    }

    pub fn allocated_ram(&self, vm_id: u32) -> u64 {
        self.ram.allocated_for(vm_id)
    }

    pub fn allocated_bw(&self, vm_id: u32) -> u64 {
        self.bw.allocated_for(vm_id)
    }

    pub fn usage(&self) -> HostUsage {
        HostUsage {
            available_mips: self.vm_scheduler.available_mips(),
            free_pes: self.vm_scheduler.free_pe_count(),
            available_ram: self.ram.available(),
            available_bw: self.bw.available(),
            available_storage: self.storage.available(),
            vm_count: self.vms.len(),
        }
    }

    /// Checks that every resource required by the VM can be allocated, returns the first missing one.
    pub fn check(&self, vm: &VmSpec) -> Result<(), CloudError> {
        if self.vms.contains(&vm.id) {
            return Err(CloudError::invalid_spec(
                format!("vm {}", vm.id),
                format!("vm is already placed on host {}", self.id),
            ));
        }
        if !self.vm_scheduler.is_suitable(vm.pe_count, vm.mips_per_pe) {
            return Err(CloudError::insufficient(
                ResourceKind::Mips,
                vm.total_mips(),
                self.vm_scheduler.available_mips(),
            ));
        }
        if !self.ram.is_suitable(vm.ram) {
            return Err(CloudError::insufficient(ResourceKind::Ram, vm.ram as f64, self.ram.available() as f64));
        }
        if !self.bw.is_suitable(vm.bw) {
            return Err(CloudError::insufficient(
                ResourceKind::Bandwidth,
                vm.bw as f64,
                self.bw.available() as f64,
            ));
        }
        if !self.storage.is_suitable(vm.size) {
            return Err(CloudError::insufficient(
                ResourceKind::Storage,
                vm.size as f64,
                self.storage.available() as f64,
            ));
        }
        Ok(())
    }

    pub fn is_suitable(&self, vm: &VmSpec) -> bool {
        self.check(vm).is_ok()
    }

    /// Allocates all resources required by the VM or none of them.
    ///
    /// Returns the MIPS grants of VMs affected by the allocation, including the new VM.
    pub fn allocate(&mut self, vm: &VmSpec) -> Result<CapacityChanges, CloudError> {
        self.check(vm)?;
        self.storage.allocate(vm.id, vm.size)?;
        if let Err(e) = self.ram.allocate(vm.id, vm.ram) {
            self.storage.deallocate(vm.id);
            return Err(e);
        }
        if let Err(e) = self.bw.allocate(vm.id, vm.bw) {
            self.ram.deallocate(vm.id);
            self.storage.deallocate(vm.id);
            return Err(e);
        }
        match self.vm_scheduler.allocate(vm.id, vm.pe_count, vm.mips_per_pe) {
            Ok(changes) => {
                self.vms.insert(vm.id);
                Ok(changes)
            }
            Err(e) => {
                self.bw.deallocate(vm.id);
                self.ram.deallocate(vm.id);
                self.storage.deallocate(vm.id);
                Err(e)
            }
        }
    }

    /// Returns all resources of the VM, releasing a VM which is not placed here is a no-op.
    ///
    /// Returns the changed MIPS grants of the remaining VMs.
    pub fn deallocate(&mut self, vm_id: u32) -> CapacityChanges {
        if !self.vms.remove(&vm_id) {
            return CapacityChanges::new();
        }
        self.storage.deallocate(vm_id);
        self.ram.deallocate(vm_id);
        self.bw.deallocate(vm_id);
        self.vm_scheduler.deallocate(vm_id)
    }

    /// Changes the per-PE MIPS allocated to the VM.
    pub fn resize_vm_mips(&mut self, vm_id: u32, mips_per_pe: f64) -> Result<CapacityChanges, CloudError> {
        if !self.vms.contains(&vm_id) {
            return Err(CloudError::UnknownEntity { kind: "vm", id: vm_id });
        }
        self.vm_scheduler.resize(vm_id, mips_per_pe)
    }
}
