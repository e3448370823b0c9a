//! Host-level scheduling of VMs onto processing elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{fits, is_negligible, ResourceKind};
use crate::core::error::CloudError;
use crate::core::pe::Pe;

/// Policy of sharing host PEs among VMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VmSchedulerPolicy {
    /// Virtual PEs are packed onto the spare capacity of physical PEs, a virtual PE may span several physical PEs.
    #[default]
    TimeShared,
    /// Each virtual PE exclusively takes a whole free physical PE.
    SpaceShared,
    /// Any VM whose per-PE MIPS fit a physical PE is admitted,
    /// all grants are scaled down proportionally when the host is oversubscribed.
    TimeSharedOverSubscription,
}

/// Total MIPS granted to VMs whose grant was changed by an operation: VM id -> MIPS.
pub type CapacityChanges = BTreeMap<u32, f64>;

#[derive(Clone, Debug, Serialize)]
struct VmShare {
    pe_count: u32,
    requested_per_pe: f64,
    granted_per_pe: f64,
}

impl VmShare {
    fn granted(&self) -> f64 {
        self.granted_per_pe * self.pe_count as f64
    }

    fn requested(&self) -> f64 {
        self.requested_per_pe * self.pe_count as f64
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct VmScheduler {
    policy: VmSchedulerPolicy,
    pes: Vec<Pe>,
    vms: BTreeMap<u32, VmShare>,
}

impl VmScheduler {
    pub fn new(policy: VmSchedulerPolicy, pe_count: u32, mips_per_pe: f64) -> Result<Self, CloudError> {
        if pe_count == 0 {
            return Err(CloudError::invalid_spec("host", "host must have at least one PE"));
        }
        let pes = (0..pe_count)
            .map(|id| Pe::new(id, mips_per_pe))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            policy,
            pes,
            vms: BTreeMap::new(),
        })
    }

    pub fn policy(&self) -> VmSchedulerPolicy {
        self.policy
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    pub fn pe_count(&self) -> u32 {
        self.pes.len() as u32
    }

    pub fn total_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.capacity()).sum()
    }

    pub fn available_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.available()).sum()
    }

    pub fn free_pe_count(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.is_free()).count() as u32
    }

    fn max_pe_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.capacity()).fold(0., f64::max)
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.vms.contains_key(&vm_id)
    }

    /// Returns the total MIPS currently granted to the VM.
    pub fn granted_mips(&self, vm_id: u32) -> f64 {
        self.vms.get(&vm_id).map_or(0., |share| share.granted())
    }

    /// Returns the total MIPS requested by all VMs.
    pub fn requested_mips(&self) -> f64 {
        self.vms.values().map(|share| share.requested()).sum()
    }

    pub fn is_suitable(&self, pe_count: u32, mips_per_pe: f64) -> bool {
        if pe_count == 0 || !mips_per_pe.is_finite() || mips_per_pe <= 0. {
            return false;
        }
        if pe_count > self.pe_count() || !fits(mips_per_pe, self.max_pe_mips()) {
            return false;
        }
        match self.policy {
            VmSchedulerPolicy::TimeShared => fits(mips_per_pe * pe_count as f64, self.available_mips()),
            VmSchedulerPolicy::SpaceShared => {
                let free = self
                    .pes
                    .iter()
                    .filter(|pe| pe.is_free() && fits(mips_per_pe, pe.capacity()))
                    .count();
                free >= pe_count as usize
            }
            VmSchedulerPolicy::TimeSharedOverSubscription => true,
        }
    }

    /// Allocates PEs for the VM.
    ///
    /// Returns the grants of all VMs affected by the allocation, including the new one.
    pub fn allocate(&mut self, vm_id: u32, pe_count: u32, mips_per_pe: f64) -> Result<CapacityChanges, CloudError> {
        if self.has_vm(vm_id) {
            return Err(CloudError::invalid_spec(
                format!("vm {}", vm_id),
                "vm is already allocated on this host",
            ));
        }
        if !self.is_suitable(pe_count, mips_per_pe) {
            return Err(match self.policy {
                VmSchedulerPolicy::SpaceShared if self.free_pe_count() < pe_count => {
                    CloudError::insufficient(ResourceKind::Pe, pe_count as f64, self.free_pe_count() as f64)
                }
                _ => CloudError::insufficient(
                    ResourceKind::Mips,
                    mips_per_pe * pe_count as f64,
                    self.available_mips(),
                ),
            });
        }
        let mut share = VmShare {
            pe_count,
            requested_per_pe: mips_per_pe,
            granted_per_pe: mips_per_pe,
        };
        match self.policy {
            VmSchedulerPolicy::TimeShared => {
                let snapshot = self.pes.clone();
                let unplaced = pack(&mut self.pes, vm_id, pe_count, mips_per_pe);
                if !is_negligible(unplaced, mips_per_pe) {
                    self.pes = snapshot;
                    return Err(CloudError::insufficient(
                        ResourceKind::Mips,
                        mips_per_pe * pe_count as f64,
                        self.available_mips(),
                    ));
                }
            }
            VmSchedulerPolicy::SpaceShared => {
                let selected: Vec<usize> = self
                    .pes
                    .iter()
                    .enumerate()
                    .filter(|(_, pe)| pe.is_free() && fits(mips_per_pe, pe.capacity()))
                    .map(|(i, _)| i)
                    .take(pe_count as usize)
                    .collect();
                for i in selected {
                    self.pes[i].reserve(vm_id)?;
                }
            }
            VmSchedulerPolicy::TimeSharedOverSubscription => {
                share.granted_per_pe = 0.;
                self.vms.insert(vm_id, share);
                return Ok(self.rebalance());
            }
        }
        let granted = share.granted();
        self.vms.insert(vm_id, share);
        Ok(CapacityChanges::from([(vm_id, granted)]))
    }

    /// Releases PEs of the VM, returns the changed grants of the remaining VMs.
    ///
    /// Releasing a VM which is not allocated is a no-op.
    pub fn deallocate(&mut self, vm_id: u32) -> CapacityChanges {
        if self.vms.remove(&vm_id).is_none() {
            return CapacityChanges::new();
        }
        for pe in self.pes.iter_mut() {
            pe.release(vm_id);
        }
        match self.policy {
            VmSchedulerPolicy::TimeSharedOverSubscription => self.rebalance(),
            _ => CapacityChanges::new(),
        }
    }

    /// Changes the per-PE MIPS of the VM.
    ///
    /// On failure the previous allocation of all VMs is restored.
    pub fn resize(&mut self, vm_id: u32, mips_per_pe: f64) -> Result<CapacityChanges, CloudError> {
        let pe_count = match self.vms.get(&vm_id) {
            Some(share) => share.pe_count,
            None => return Err(CloudError::UnknownEntity { kind: "vm", id: vm_id }),
        };
        let snapshot = self.clone();
        self.deallocate(vm_id);
        if let Err(e) = self.allocate(vm_id, pe_count, mips_per_pe) {
            *self = snapshot;
            return Err(e);
        }
        let mut changes = CapacityChanges::new();
        for (&id, share) in self.vms.iter() {
            if !is_negligible(share.granted() - snapshot.granted_mips(id), share.granted()) {
                changes.insert(id, share.granted());
            }
        }
        Ok(changes)
    }

    fn rebalance(&mut self) -> CapacityChanges {
        let requested = self.requested_mips();
        let capacity = self.total_mips();
        let factor = if requested > capacity { capacity / requested } else { 1. };
        for pe in self.pes.iter_mut() {
            pe.release_all();
        }
        let mut changes = CapacityChanges::new();
        for (&vm_id, share) in self.vms.iter_mut() {
            let old = share.granted();
            share.granted_per_pe = share.requested_per_pe * factor;
            pack(&mut self.pes, vm_id, share.pe_count, share.granted_per_pe);
            if !is_negligible(share.granted() - old, share.granted()) {
                changes.insert(vm_id, share.granted());
            }
        }
        changes
    }
}

/// Places virtual PEs onto the spare capacity of physical PEs in order, returns the largest unplaced remainder.
fn pack(pes: &mut [Pe], vm_id: u32, pe_count: u32, mips_per_pe: f64) -> f64 {
    let mut unplaced: f64 = 0.;
    for _ in 0..pe_count {
        let mut remaining = mips_per_pe;
        for pe in pes.iter_mut() {
            if is_negligible(remaining, mips_per_pe) {
                break;
            }
            let take = pe.available().min(remaining);
            if take > 0. && pe.add_share(vm_id, take).is_ok() {
                remaining -= take;
            }
        }
        unplaced = unplaced.max(remaining);
    }
    unplaced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_float_eq(x: f64, y: f64, eps: f64) {
        assert!((x - y).abs() < eps, "Values do not match: {:.15} vs {:.15}", x, y);
    }

    #[test]
    fn test_time_shared_spans_pes() {
        let mut scheduler = VmScheduler::new(VmSchedulerPolicy::TimeShared, 2, 1000.).unwrap();
        scheduler.allocate(1, 1, 600.).unwrap();
        let changes = scheduler.allocate(2, 1, 800.).unwrap();
        assert_eq!(changes, CapacityChanges::from([(2, 800.)]));
        assert_float_eq(scheduler.pes()[0].allocated_for(2), 400., 1e-9);
        assert_float_eq(scheduler.pes()[1].allocated_for(2), 400., 1e-9);
        assert_float_eq(scheduler.available_mips(), 600., 1e-9);

        assert!(!scheduler.is_suitable(1, 700.));
        assert!(scheduler.allocate(3, 1, 700.).is_err());
        assert_float_eq(scheduler.available_mips(), 600., 1e-9);

        assert!(scheduler.deallocate(2).is_empty());
        assert!(scheduler.deallocate(2).is_empty());
        assert_float_eq(scheduler.available_mips(), 1400., 1e-9);
    }

    #[test]
    fn test_vm_pe_must_fit_physical_pe() {
        let scheduler = VmScheduler::new(VmSchedulerPolicy::TimeShared, 4, 1000.).unwrap();
        assert!(!scheduler.is_suitable(1, 1500.));
        assert!(!scheduler.is_suitable(5, 100.));
        assert!(scheduler.is_suitable(4, 1000.));
    }

    #[test]
    fn test_space_shared_reserves_whole_pes() {
        let mut scheduler = VmScheduler::new(VmSchedulerPolicy::SpaceShared, 2, 1000.).unwrap();
        scheduler.allocate(1, 1, 500.).unwrap();
        assert_eq!(scheduler.free_pe_count(), 1);
        assert_float_eq(scheduler.granted_mips(1), 500., 1e-9);

        let err = scheduler.allocate(2, 2, 500.).unwrap_err();
        assert!(matches!(
            err,
            CloudError::InsufficientCapacity {
                resource: ResourceKind::Pe,
                ..
            }
        ));
        scheduler.allocate(3, 1, 1000.).unwrap();
        assert_eq!(scheduler.free_pe_count(), 0);
        assert!(!scheduler.is_suitable(1, 1.));

        scheduler.deallocate(1);
        assert_eq!(scheduler.free_pe_count(), 1);
    }

    #[test]
    fn test_over_subscription_scales_grants() {
        let mut scheduler = VmScheduler::new(VmSchedulerPolicy::TimeSharedOverSubscription, 2, 1000.).unwrap();
        let changes = scheduler.allocate(1, 2, 1000.).unwrap();
        assert_eq!(changes, CapacityChanges::from([(1, 2000.)]));

        let changes = scheduler.allocate(2, 1, 1000.).unwrap();
        assert_eq!(changes.len(), 2);
        assert_float_eq(changes[&1], 4000. / 3., 1e-9);
        assert_float_eq(changes[&2], 2000. / 3., 1e-9);
        assert!(fits(2000. - scheduler.available_mips(), scheduler.total_mips()));

        let changes = scheduler.deallocate(2);
        assert_eq!(changes.len(), 1);
        assert_float_eq(changes[&1], 2000., 1e-9);
    }

    #[test]
    fn test_failed_resize_restores_allocation() {
        let mut scheduler = VmScheduler::new(VmSchedulerPolicy::TimeShared, 2, 1000.).unwrap();
        scheduler.allocate(1, 1, 1000.).unwrap();
        scheduler.allocate(2, 1, 500.).unwrap();

        assert!(scheduler.resize(2, 1200.).is_err());
        assert_float_eq(scheduler.granted_mips(2), 500., 1e-9);
        assert_float_eq(scheduler.available_mips(), 500., 1e-9);

        let changes = scheduler.resize(2, 1000.).unwrap();
        assert_eq!(changes, CapacityChanges::from([(2, 1000.)]));
        assert_float_eq(scheduler.available_mips(), 0., 1e-9);
    }
}
