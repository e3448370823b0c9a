//! Processing element.

use serde::Serialize;

use crate::core::common::{is_negligible, ResourceKind};
use crate::core::error::CloudError;
use crate::core::ledger::ResourceLedger;

/// Physical CPU core of a host with fixed MIPS capacity shared among VMs.
#[derive(Clone, Debug, Serialize)]
pub struct Pe {
    pub id: u32,
    mips: ResourceLedger<f64>,
}

impl Pe {
    pub fn new(id: u32, mips: f64) -> Result<Self, CloudError> {
        if mips <= 0. {
            return Err(CloudError::invalid_spec("PE", format!("capacity must be positive, got {}", mips)));
        }
        Ok(Self {
            id,
            mips: ResourceLedger::new(ResourceKind::Mips, mips)?,
        })
    }

    pub fn capacity(&self) -> f64 {
        self.mips.capacity()
    }

    pub fn available(&self) -> f64 {
        self.mips.available()
    }

    pub fn allocated_for(&self, vm_id: u32) -> f64 {
        self.mips.allocated_for(vm_id)
    }

    /// Returns true if no VM holds a share of this PE.
    pub fn is_free(&self) -> bool {
        self.mips.requesters().next().is_none()
    }

    /// Adds the amount to the VM's share.
    pub fn add_share(&mut self, vm_id: u32, mips: f64) -> Result<(), CloudError> {
        let current = self.mips.allocated_for(vm_id);
        self.mips.resize(vm_id, current + mips)
    }

    /// Takes the whole PE for the VM.
    pub fn reserve(&mut self, vm_id: u32) -> Result<(), CloudError> {
        if !self.is_free() {
            return Err(CloudError::insufficient(ResourceKind::Pe, 1., 0.));
        }
        self.mips.allocate(vm_id, self.mips.capacity()).map(|_| ())
    }

    pub fn release(&mut self, vm_id: u32) -> f64 {
        self.mips.deallocate(vm_id)
    }

    pub fn release_all(&mut self) {
        self.mips.clear();
    }

    pub fn is_exhausted(&self) -> bool {
        is_negligible(self.available(), self.capacity())
    }
}
