//! Model of virtualized data center.

pub mod broker;
pub mod cloudlet;
pub mod cloudlet_scheduler;
pub mod common;
pub mod config;
pub mod datacenter;
pub mod error;
pub mod events;
pub mod host;
pub mod host_pool;
pub mod ledger;
pub mod pe;
pub mod provisioner;
pub mod task;
pub mod utilization;
pub mod vm;
pub mod vm_allocation_policies;
pub mod vm_allocation_policy;
pub mod vm_scheduler;
