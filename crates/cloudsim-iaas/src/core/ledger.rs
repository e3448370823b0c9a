//! Resource capacity ledger.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::ops::{Add, Sub};

use serde::Serialize;

use crate::core::common::{fits, ResourceKind};
use crate::core::error::CloudError;

/// Amount of some resource: integral (`u64`) for RAM, bandwidth, storage and PE counts,
/// fractional (`f64`) for MIPS.
pub trait Amount:
    Copy + Debug + Display + PartialOrd + Add<Output = Self> + Sub<Output = Self> + Serialize + 'static
{
    fn zero() -> Self;

    /// Returns false for negative or NaN amounts.
    fn is_valid(self) -> bool;

    /// Returns true if `self` can be taken out of `available`.
    fn fits_into(self, available: Self) -> bool;

    fn saturating_sub(self, other: Self) -> Self;

    fn min_amount(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }

    fn to_f64(self) -> f64;
}

impl Amount for u64 {
    fn zero() -> Self {
        0
    }

    fn is_valid(self) -> bool {
        true
    }

    fn fits_into(self, available: Self) -> bool {
        self <= available
    }

    fn saturating_sub(self, other: Self) -> Self {
        u64::saturating_sub(self, other)
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Amount for f64 {
    fn zero() -> Self {
        0.
    }

    fn is_valid(self) -> bool {
        self.is_finite() && self >= 0.
    }

    fn fits_into(self, available: Self) -> bool {
        fits(self, available)
    }

    fn saturating_sub(self, other: Self) -> Self {
        (self - other).max(0.)
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// Tracks the capacity of a single resource and its allocations to requesters (VMs).
///
/// The sum of allocations never exceeds the capacity. For `f64` amounts the comparison is done with [`fits`],
/// so the sum may exceed the capacity by the relative tolerance of `1e-9`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceLedger<A: Amount> {
    kind: ResourceKind,
    capacity: A,
    allocations: BTreeMap<u32, A>,
}

impl<A: Amount> ResourceLedger<A> {
    /// Creates ledger with specified capacity, fails on negative or NaN capacity.
    pub fn new(kind: ResourceKind, capacity: A) -> Result<Self, CloudError> {
        if !capacity.is_valid() {
            return Err(CloudError::invalid_spec(kind, format!("capacity {} is not allowed", capacity)));
        }
        Ok(Self {
            kind,
            capacity,
            allocations: BTreeMap::new(),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn capacity(&self) -> A {
        self.capacity
    }

    /// Returns the total allocated amount.
    pub fn allocated(&self) -> A {
        self.allocations.values().fold(A::zero(), |acc, &x| acc + x)
    }

    pub fn available(&self) -> A {
        self.capacity.saturating_sub(self.allocated())
    }

    /// Returns the amount allocated to the requester (zero if there is no allocation).
    pub fn allocated_for(&self, requester: u32) -> A {
        self.allocations.get(&requester).copied().unwrap_or_else(A::zero)
    }

    pub fn has_allocation(&self, requester: u32) -> bool {
        self.allocations.contains_key(&requester)
    }

    pub fn requesters(&self) -> impl Iterator<Item = u32> + '_ {
        self.allocations.keys().copied()
    }

    /// Checks whether the amount can be allocated to a new requester.
    pub fn is_suitable(&self, amount: A) -> bool {
        amount.is_valid() && amount.fits_into(self.available())
    }

    /// Allocates the amount to the requester and returns the granted amount.
    ///
    /// Fails if the requester already holds an allocation, use [`resize`](Self::resize) to change it.
    pub fn allocate(&mut self, requester: u32, amount: A) -> Result<A, CloudError> {
        if self.has_allocation(requester) {
            return Err(CloudError::invalid_spec(
                self.kind,
                format!("requester {} already holds an allocation", requester),
            ));
        }
        self.resize(requester, amount)?;
        Ok(amount)
    }

    /// Removes the allocation of the requester and returns the released amount.
    ///
    /// Releasing a missing allocation is a no-op.
    pub fn deallocate(&mut self, requester: u32) -> A {
        self.allocations.remove(&requester).unwrap_or_else(A::zero)
    }

    /// Atomically changes the allocation of the requester.
    ///
    /// On failure the previous allocation stays unchanged.
    pub fn resize(&mut self, requester: u32, amount: A) -> Result<(), CloudError> {
        if !amount.is_valid() {
            return Err(CloudError::invalid_spec(
                self.kind,
                format!("requested amount {} is not allowed", amount),
            ));
        }
        let available = self.available() + self.allocated_for(requester);
        if !amount.fits_into(available) {
            return Err(CloudError::insufficient(self.kind, amount.to_f64(), available.to_f64()));
        }
        self.allocations.insert(requester, amount);
        Ok(())
    }

    /// Removes all allocations.
    pub fn clear(&mut self) {
        self.allocations.clear();
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_allocate_and_release() {
        let mut ledger = ResourceLedger::new(ResourceKind::Ram, 2048u64).unwrap();
        assert_eq!(ledger.allocate(1, 512).unwrap(), 512);
        assert_eq!(ledger.allocate(2, 1024).unwrap(), 1024);
        assert_eq!(ledger.available(), 512);
        assert_eq!(ledger.allocated_for(2), 1024);

        let err = ledger.allocate(3, 1024).unwrap_err();
        assert!(matches!(err, CloudError::InsufficientCapacity { .. }));
        assert!(!ledger.has_allocation(3));

        assert_eq!(ledger.deallocate(2), 1024);
        assert_eq!(ledger.available(), 1536);
    }

    #[test]
    fn test_deallocate_is_idempotent() {
        let mut ledger = ResourceLedger::new(ResourceKind::Mips, 1000.).unwrap();
        ledger.allocate(1, 300.).unwrap();
        ledger.allocate(2, 200.).unwrap();
        ledger.deallocate(1);
        let once = ledger.clone();
        assert_eq!(ledger.deallocate(1), 0.);
        assert_eq!(ledger, once);
    }

    #[test]
    fn test_failed_resize_keeps_allocation() {
        let mut ledger = ResourceLedger::new(ResourceKind::Bandwidth, 100u64).unwrap();
        ledger.allocate(1, 40).unwrap();
        ledger.allocate(2, 40).unwrap();
        assert!(ledger.resize(1, 61).is_err());
        assert_eq!(ledger.allocated_for(1), 40);
        ledger.resize(1, 60).unwrap();
        assert_eq!(ledger.available(), 0);
        ledger.resize(1, 10).unwrap();
        assert_eq!(ledger.available(), 50);
    }

    #[test]
    fn test_invalid_capacity() {
        assert!(ResourceLedger::new(ResourceKind::Mips, -1.).is_err());
        assert!(ResourceLedger::new(ResourceKind::Mips, f64::NAN).is_err());
        let mut ledger = ResourceLedger::new(ResourceKind::Mips, 10.).unwrap();
        assert!(ledger.allocate(1, -2.).is_err());
    }

    #[test]
    fn test_allocate_twice_fails() {
        let mut ledger = ResourceLedger::new(ResourceKind::Ram, 1024u64).unwrap();
        ledger.allocate(1, 256).unwrap();
        let err = ledger.allocate(1, 512).unwrap_err();
        assert!(matches!(err, CloudError::InvalidSpec { .. }));
        assert_eq!(ledger.allocated_for(1), 256);
        assert_eq!(ledger.available(), 768);
    }

    #[test]
    fn test_allocations_never_exceed_capacity() {
        let mut rng = StdRng::seed_from_u64(123);
        let mut ledger = ResourceLedger::new(ResourceKind::Mips, 4000.).unwrap();
        for _ in 0..1000 {
            let requester = rng.gen_range(0..20);
            match rng.gen_range(0..3) {
                0 => {
                    let _ = ledger.allocate(requester, rng.gen_range(0. ..1500.));
                }
                1 => {
                    let _ = ledger.resize(requester, rng.gen_range(0. ..1500.));
                }
                _ => {
                    ledger.deallocate(requester);
                }
            }
            assert!(fits(ledger.allocated(), ledger.capacity()));
        }
    }
}
