//! Resource provisioners.

use dyn_clone::{clone_trait_object, DynClone};
use serde::{Deserialize, Serialize};

use crate::core::common::ResourceKind;
use crate::core::error::CloudError;
use crate::core::ledger::{Amount, ResourceLedger};

/// Policy deciding whether and how much of a resource a VM receives.
///
/// Each provisioner exclusively owns its [`ResourceLedger`].
pub trait ResourceProvisioner<A: Amount>: DynClone {
    fn ledger(&self) -> &ResourceLedger<A>;

    fn ledger_mut(&mut self) -> &mut ResourceLedger<A>;

    /// Checks whether the request would be granted.
    fn is_suitable(&self, requested: A) -> bool;

    /// Grants the resource to the VM, returns the granted amount.
    fn allocate(&mut self, vm_id: u32, requested: A) -> Result<A, CloudError>;

    /// Returns the VM's allocation to the ledger. Idempotent.
    fn deallocate(&mut self, vm_id: u32) -> A {
        self.ledger_mut().deallocate(vm_id)
    }

    fn allocated_for(&self, vm_id: u32) -> A {
        self.ledger().allocated_for(vm_id)
    }

    fn available(&self) -> A {
        self.ledger().available()
    }
}

clone_trait_object!(<A> ResourceProvisioner<A> where A: Amount);

/// Grants exactly the requested amount or nothing.
#[derive(Clone)]
pub struct SimpleProvisioner<A: Amount> {
    ledger: ResourceLedger<A>,
}

impl<A: Amount> SimpleProvisioner<A> {
    pub fn new(ledger: ResourceLedger<A>) -> Self {
        Self { ledger }
    }
}

impl<A: Amount> ResourceProvisioner<A> for SimpleProvisioner<A> {
    fn ledger(&self) -> &ResourceLedger<A> {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut ResourceLedger<A> {
        &mut self.ledger
    }

    fn is_suitable(&self, requested: A) -> bool {
        self.ledger.is_suitable(requested)
    }

    fn allocate(&mut self, vm_id: u32, requested: A) -> Result<A, CloudError> {
        self.ledger.allocate(vm_id, requested)
    }
}

/// Over-subscription variant: grants whatever is available, never more than requested.
#[derive(Clone)]
pub struct BestEffortProvisioner<A: Amount> {
    ledger: ResourceLedger<A>,
}

impl<A: Amount> BestEffortProvisioner<A> {
    pub fn new(ledger: ResourceLedger<A>) -> Self {
        Self { ledger }
    }
}

impl<A: Amount> ResourceProvisioner<A> for BestEffortProvisioner<A> {
    fn ledger(&self) -> &ResourceLedger<A> {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut ResourceLedger<A> {
        &mut self.ledger
    }

    fn is_suitable(&self, requested: A) -> bool {
        requested.is_valid()
    }

    fn allocate(&mut self, vm_id: u32, requested: A) -> Result<A, CloudError> {
        let granted = requested.min_amount(self.ledger.available());
        self.ledger.allocate(vm_id, granted)
    }
}

/// Provisioner kinds selectable in config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProvisionerKind {
    #[default]
    Simple,
    BestEffort,
}

impl ProvisionerKind {
    /// Creates provisioner of this kind with a fresh ledger of specified capacity.
    pub fn build<A: Amount>(
        self,
        kind: ResourceKind,
        capacity: A,
    ) -> Result<Box<dyn ResourceProvisioner<A>>, CloudError> {
        let ledger = ResourceLedger::new(kind, capacity)?;
        Ok(match self {
            ProvisionerKind::Simple => Box::new(SimpleProvisioner::new(ledger)),
            ProvisionerKind::BestEffort => Box::new(BestEffortProvisioner::new(ledger)),
        })
    }
}
