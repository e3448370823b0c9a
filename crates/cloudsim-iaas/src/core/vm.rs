//! Representations of virtual machine and its status.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use cloudsim_core::EventId;

use crate::core::cloudlet_scheduler::{CloudletScheduler, CloudletSchedulerPolicy};
use crate::core::error::CloudError;

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    Created,
    Running,
    Migrating,
    Destroyed,
    FailedToAllocate,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Created => write!(f, "created"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Migrating => write!(f, "migrating"),
            VmStatus::Destroyed => write!(f, "destroyed"),
            VmStatus::FailedToAllocate => write!(f, "failed_to_allocate"),
        }
    }
}

/// Resource requirements of virtual machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    pub id: u32,
    pub pe_count: u32,
    pub mips_per_pe: f64,
    pub ram: u64,
    pub bw: u64,
    pub size: u64,
    #[serde(default)]
    pub cloudlet_scheduler: CloudletSchedulerPolicy,
}

impl VmSpec {
    /// Creates VM spec with the specified processing capacity and no memory, bandwidth or storage requirements.
    pub fn new(id: u32, pe_count: u32, mips_per_pe: f64) -> Self {
        Self {
            id,
            pe_count,
            mips_per_pe,
            ram: 0,
            bw: 0,
            size: 0,
            cloudlet_scheduler: CloudletSchedulerPolicy::TimeShared,
        }
    }

    pub fn with_ram(mut self, ram: u64) -> Self {
        self.ram = ram;
        self
    }

    pub fn with_bw(mut self, bw: u64) -> Self {
        self.bw = bw;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_cloudlet_scheduler(mut self, policy: CloudletSchedulerPolicy) -> Self {
        self.cloudlet_scheduler = policy;
        self
    }

    pub fn total_mips(&self) -> f64 {
        self.mips_per_pe * self.pe_count as f64
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        let entity = format!("vm {}", self.id);
        if self.pe_count == 0 {
            return Err(CloudError::invalid_spec(entity, "pe_count must be positive"));
        }
        if !self.mips_per_pe.is_finite() || self.mips_per_pe <= 0. {
            return Err(CloudError::invalid_spec(
                entity,
                format!("mips_per_pe must be positive, got {}", self.mips_per_pe),
            ));
        }
        Ok(())
    }
}

/// Virtual machine placed in a datacenter.
///
/// The VM refers to its host by ID, the host itself is owned by the datacenter's host pool.
#[derive(Clone, Debug)]
pub struct Vm {
    pub spec: VmSpec,
    pub host_id: Option<u32>,
    pub status: VmStatus,
    pub scheduler: CloudletScheduler,
    // pending CloudletFinish event
    pub(crate) next_event: Option<EventId>,
}

impl Vm {
    /// Creates VM whose cloudlet scheduler is given the specified capacity.
    pub fn new(spec: VmSpec, host_id: u32, granted_mips: f64) -> Self {
        let scheduler = CloudletScheduler::new(spec.cloudlet_scheduler, granted_mips, spec.pe_count);
        Self {
            spec,
            host_id: Some(host_id),
            status: VmStatus::Running,
            scheduler,
            next_event: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.spec.id
    }
}
