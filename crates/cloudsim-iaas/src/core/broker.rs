//! Broker component submitting workload of a user to datacenters.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use cloudsim_core::{cast, log_debug, log_info, log_warn};
use cloudsim_core::{Event, EventHandler, Id, SimulationContext, SimulationError};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::cloudlet_scheduler::Packet;
use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{
    CloudletCancel, CloudletPause, CloudletRejected, CloudletResume, CloudletReturn, CloudletSubmit,
};
use crate::core::events::network::{PacketForward, PacketRouted};
use crate::core::events::vm::{
    VmAllocationFailed, VmCreateRequest, VmCreated, VmDestroy, VmDestroyed, VmMigrated, VmMigrationFailed,
    VmMigrationRequest, VmScaleFailed, VmScaleRequest, VmScaled,
};
use crate::core::vm::VmSpec;

/// Receives notifications about workload life-cycle.
pub trait LifecycleListener {
    fn on_cloudlet_finished(
        &mut self,
        _cloudlet_id: u32,
        _start_time: f64,
        _finish_time: f64,
        _host_id: Option<u32>,
    ) {
    }

    fn on_cloudlet_failed(&mut self, _cloudlet_id: u32, _reason: &str) {}

    fn on_vm_allocation_failed(&mut self, _vm_id: u32, _reason: &str) {}
}

/// Placement of created VM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VmPlacement {
    pub datacenter: Id,
    pub host_id: u32,
}

struct VmRequest {
    spec: VmSpec,
    // index of the datacenter processing the request
    attempt: usize,
}

/// Acts on behalf of a user: places VMs into datacenters, binds cloudlets to created VMs
/// and destroys the VMs once all cloudlets are returned.
pub struct Broker {
    datacenters: Vec<Id>,
    vm_requests: BTreeMap<u32, VmRequest>,
    vm_specs: BTreeMap<u32, VmSpec>,
    created_vms: BTreeMap<u32, VmPlacement>,
    failed_vms: BTreeSet<u32>,
    destroyed_vms: BTreeSet<u32>,
    cloudlet_ids: BTreeSet<u32>,
    pending_cloudlets: Vec<Cloudlet>,
    cloudlet_locations: BTreeMap<u32, Id>,
    // packets for cloudlets waiting for dispatch
    undelivered_packets: BTreeMap<u32, Vec<Packet>>,
    finished_cloudlets: Vec<Cloudlet>,
    failed_cloudlets: Vec<Cloudlet>,
    next_vm_index: usize,
    destroy_requested: bool,
    listeners: Vec<Box<dyn LifecycleListener>>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Broker {
    pub fn new(ctx: SimulationContext, sim_config: Rc<SimulationConfig>) -> Self {
        Self {
            datacenters: Vec::new(),
            vm_requests: BTreeMap::new(),
            vm_specs: BTreeMap::new(),
            created_vms: BTreeMap::new(),
            failed_vms: BTreeSet::new(),
            destroyed_vms: BTreeSet::new(),
            cloudlet_ids: BTreeSet::new(),
            pending_cloudlets: Vec::new(),
            cloudlet_locations: BTreeMap::new(),
            undelivered_packets: BTreeMap::new(),
            finished_cloudlets: Vec::new(),
            failed_cloudlets: Vec::new(),
            next_vm_index: 0,
            destroy_requested: false,
            listeners: Vec::new(),
            ctx,
            sim_config,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    /// Adds datacenter to the list of datacenters tried in order when placing VMs.
    pub fn add_datacenter(&mut self, id: Id) {
        self.datacenters.push(id);
    }

    pub fn add_listener(&mut self, listener: Box<dyn LifecycleListener>) {
        self.listeners.push(listener);
    }

    // Workload API ////////////////////////////////////////////////////////////////////////////////

    /// Submits VMs for creation.
    ///
    /// The whole list is rejected with [`CloudError::InvalidSpec`] if some VM is malformed or reuses an ID.
    pub fn submit_vms(&mut self, vms: Vec<VmSpec>) -> Result<(), CloudError> {
        if self.datacenters.is_empty() {
            return Err(CloudError::invalid_spec("broker", "no datacenters to place vms"));
        }
        let mut ids = BTreeSet::new();
        for vm in vms.iter() {
            vm.validate()?;
            if self.vm_specs.contains_key(&vm.id) || !ids.insert(vm.id) {
                return Err(CloudError::invalid_spec(format!("vm {}", vm.id), "duplicate vm id"));
            }
        }
        for vm in vms {
            self.vm_specs.insert(vm.id, vm.clone());
            self.request_vm(vm, 0)?;
        }
        Ok(())
    }

    /// Submits cloudlets for execution.
    ///
    /// Cloudlets are dispatched once all submitted VMs are processed by datacenters.
    /// Cloudlets without a VM binding are bound to created VMs in round-robin order.
    pub fn submit_cloudlets(&mut self, cloudlets: Vec<Cloudlet>) -> Result<(), CloudError> {
        let mut ids = BTreeSet::new();
        for cloudlet in cloudlets.iter() {
            cloudlet.validate()?;
            if self.cloudlet_ids.contains(&cloudlet.id) || !ids.insert(cloudlet.id) {
                return Err(CloudError::invalid_spec(
                    format!("cloudlet {}", cloudlet.id),
                    "duplicate cloudlet id",
                ));
            }
            if let Some(vm_id) = cloudlet.vm_id {
                if !self.vm_specs.contains_key(&vm_id) {
                    return Err(CloudError::invalid_spec(
                        format!("cloudlet {}", cloudlet.id),
                        format!("unknown vm {}", vm_id),
                    ));
                }
            }
        }
        for cloudlet in cloudlets {
            self.cloudlet_ids.insert(cloudlet.id);
            self.pending_cloudlets.push(cloudlet);
        }
        self.dispatch_cloudlets()?;
        Ok(())
    }

    /// Requests migration of the VM to the specified host or to the host selected by the datacenter.
    pub fn migrate_vm(&mut self, vm_id: u32, target_host: Option<u32>) -> Result<(), CloudError> {
        let datacenter = self.vm_datacenter(vm_id)?;
        self.ctx
            .emit(VmMigrationRequest { vm_id, target_host }, datacenter, self.sim_config.message_delay)?;
        Ok(())
    }

    /// Requests change of the VM per-PE MIPS.
    pub fn scale_vm(&mut self, vm_id: u32, mips_per_pe: f64) -> Result<(), CloudError> {
        let datacenter = self.vm_datacenter(vm_id)?;
        self.ctx
            .emit(VmScaleRequest { vm_id, mips_per_pe }, datacenter, self.sim_config.message_delay)?;
        Ok(())
    }

    pub fn pause_cloudlet(&mut self, cloudlet_id: u32) -> Result<(), CloudError> {
        let datacenter = self.cloudlet_datacenter(cloudlet_id)?;
        self.ctx
            .emit(CloudletPause { cloudlet_id }, datacenter, self.sim_config.message_delay)?;
        Ok(())
    }

    pub fn resume_cloudlet(&mut self, cloudlet_id: u32) -> Result<(), CloudError> {
        let datacenter = self.cloudlet_datacenter(cloudlet_id)?;
        self.ctx
            .emit(CloudletResume { cloudlet_id }, datacenter, self.sim_config.message_delay)?;
        Ok(())
    }

    pub fn cancel_cloudlet(&mut self, cloudlet_id: u32) -> Result<(), CloudError> {
        let datacenter = self.cloudlet_datacenter(cloudlet_id)?;
        self.ctx
            .emit(CloudletCancel { cloudlet_id }, datacenter, self.sim_config.message_delay)?;
        Ok(())
    }

    // Accessors ///////////////////////////////////////////////////////////////////////////////////

    pub fn created_vms(&self) -> Vec<u32> {
        self.created_vms.keys().copied().collect()
    }

    pub fn failed_vms(&self) -> Vec<u32> {
        self.failed_vms.iter().copied().collect()
    }

    pub fn destroyed_vms(&self) -> Vec<u32> {
        self.destroyed_vms.iter().copied().collect()
    }

    pub fn vm_placement(&self, vm_id: u32) -> Option<VmPlacement> {
        self.created_vms.get(&vm_id).copied()
    }

    pub fn vm_spec(&self, vm_id: u32) -> Option<&VmSpec> {
        self.vm_specs.get(&vm_id)
    }

    pub fn finished_cloudlets(&self) -> &[Cloudlet] {
        &self.finished_cloudlets
    }

    pub fn failed_cloudlets(&self) -> &[Cloudlet] {
        &self.failed_cloudlets
    }

    /// Returns the number of cloudlets submitted but not returned yet.
    pub fn active_cloudlet_count(&self) -> usize {
        self.cloudlet_ids.len() - self.finished_cloudlets.len() - self.failed_cloudlets.len()
    }

    /// Returns the latest finish time among finished cloudlets.
    pub fn makespan(&self) -> f64 {
        self.finished_cloudlets
            .iter()
            .filter_map(|c| c.finish_time)
            .fold(0., f64::max)
    }

    fn vm_datacenter(&self, vm_id: u32) -> Result<Id, CloudError> {
        self.created_vms
            .get(&vm_id)
            .map(|p| p.datacenter)
            .ok_or(CloudError::UnknownEntity { kind: "vm", id: vm_id })
    }

    fn cloudlet_datacenter(&self, cloudlet_id: u32) -> Result<Id, CloudError> {
        self.cloudlet_locations
            .get(&cloudlet_id)
            .copied()
            .ok_or(CloudError::UnknownEntity {
                kind: "cloudlet",
                id: cloudlet_id,
            })
    }

    // VMs /////////////////////////////////////////////////////////////////////////////////////////

    fn request_vm(&mut self, spec: VmSpec, attempt: usize) -> Result<(), SimulationError> {
        let datacenter = self.datacenters[attempt];
        log_debug!(
            self.ctx,
            "requesting vm {} in {}",
            spec.id,
            self.ctx.lookup_name(datacenter)
        );
        self.ctx.emit(
            VmCreateRequest { vm: spec.clone() },
            datacenter,
            self.sim_config.message_delay,
        )?;
        self.vm_requests.insert(spec.id, VmRequest { spec, attempt });
        Ok(())
    }

    fn on_vm_created(&mut self, vm_id: u32, host_id: u32, datacenter: Id) -> Result<(), SimulationError> {
        if self.vm_requests.remove(&vm_id).is_none() {
            log_warn!(self.ctx, "unexpected creation of vm {}", vm_id);
        }
        log_info!(
            self.ctx,
            "vm {} created in {} on host {}",
            vm_id,
            self.ctx.lookup_name(datacenter),
            host_id
        );
        self.created_vms.insert(vm_id, VmPlacement { datacenter, host_id });
        self.dispatch_cloudlets()
    }

    fn on_vm_allocation_failed(&mut self, vm_id: u32, reason: String) -> Result<(), SimulationError> {
        let request = match self.vm_requests.remove(&vm_id) {
            Some(request) => request,
            None => return Ok(()),
        };
        let attempt = request.attempt + 1;
        if attempt < self.datacenters.len() {
            log_debug!(self.ctx, "vm {} is not created: {}, trying next datacenter", vm_id, reason);
            return self.request_vm(request.spec, attempt);
        }
        log_warn!(self.ctx, "vm {} is not created: {}", vm_id, reason);
        self.failed_vms.insert(vm_id);
        for listener in self.listeners.iter_mut() {
            listener.on_vm_allocation_failed(vm_id, &reason);
        }
        self.dispatch_cloudlets()
    }

    fn on_vm_destroyed(&mut self, vm_id: u32) {
        log_debug!(self.ctx, "vm {} destroyed", vm_id);
        self.created_vms.remove(&vm_id);
        self.destroyed_vms.insert(vm_id);
        if self.destroy_requested && self.created_vms.is_empty() {
            log_info!(self.ctx, "all vms are destroyed");
            self.ctx.finish();
        }
    }

    // Cloudlets ///////////////////////////////////////////////////////////////////////////////////

    fn dispatch_cloudlets(&mut self) -> Result<(), SimulationError> {
        if !self.vm_requests.is_empty() || self.pending_cloudlets.is_empty() {
            return Ok(());
        }
        let vm_ids = self.created_vms();
        for mut cloudlet in std::mem::take(&mut self.pending_cloudlets) {
            let bound = cloudlet.vm_id.filter(|vm_id| self.created_vms.contains_key(vm_id));
            let vm_id = match bound {
                Some(vm_id) => vm_id,
                None if vm_ids.is_empty() => {
                    self.undelivered_packets.remove(&cloudlet.id);
                    cloudlet.status = CloudletStatus::Failed;
                    self.fail_cloudlet(cloudlet, "no vms are created");
                    continue;
                }
                None => {
                    let vm_id = vm_ids[self.next_vm_index % vm_ids.len()];
                    self.next_vm_index += 1;
                    vm_id
                }
            };
            let datacenter = self.created_vms[&vm_id].datacenter;
            cloudlet.vm_id = Some(vm_id);
            log_debug!(self.ctx, "sending cloudlet {} to vm {}", cloudlet.id, vm_id);
            self.cloudlet_locations.insert(cloudlet.id, datacenter);
            let packets = self.undelivered_packets.remove(&cloudlet.id).unwrap_or_default();
            self.ctx
                .emit(CloudletSubmit { cloudlet }, datacenter, self.sim_config.message_delay)?;
            for packet in packets {
                self.ctx.emit_now(PacketRouted { packet }, datacenter)?;
            }
        }
        self.check_completion()
    }

    // Passes the packet to the datacenter hosting its destination, the datacenter buffers it until submission.
    fn on_packet_forward(&mut self, packet: Packet) -> Result<(), SimulationError> {
        let dst_cloudlet = packet.dst_cloudlet;
        if let Some(&datacenter) = self.cloudlet_locations.get(&dst_cloudlet) {
            self.ctx.emit_now(PacketRouted { packet }, datacenter)?;
        } else if self.pending_cloudlets.iter().any(|c| c.id == dst_cloudlet) {
            self.undelivered_packets.entry(dst_cloudlet).or_default().push(packet);
        } else {
            log_warn!(
                self.ctx,
                "packet from cloudlet {} is dropped: cloudlet {} is not active",
                packet.src_cloudlet,
                dst_cloudlet
            );
        }
        Ok(())
    }

    fn on_cloudlet_return(&mut self, cloudlet: Cloudlet) -> Result<(), SimulationError> {
        self.cloudlet_locations.remove(&cloudlet.id);
        if cloudlet.status == CloudletStatus::Success {
            log_info!(self.ctx, "cloudlet {} finished", cloudlet.id);
            for listener in self.listeners.iter_mut() {
                listener.on_cloudlet_finished(
                    cloudlet.id,
                    cloudlet.exec_start_time.unwrap_or_default(),
                    cloudlet.finish_time.unwrap_or_default(),
                    cloudlet.host_id,
                );
            }
            self.finished_cloudlets.push(cloudlet);
        } else {
            let reason = format!("cloudlet is {:?}", cloudlet.status);
            self.fail_cloudlet(cloudlet, &reason);
        }
        self.check_completion()
    }

    fn on_cloudlet_rejected(&mut self, cloudlet: Cloudlet, reason: String) -> Result<(), SimulationError> {
        self.cloudlet_locations.remove(&cloudlet.id);
        self.fail_cloudlet(cloudlet, &reason);
        self.check_completion()
    }

    fn fail_cloudlet(&mut self, cloudlet: Cloudlet, reason: &str) {
        log_warn!(self.ctx, "cloudlet {} failed: {}", cloudlet.id, reason);
        for listener in self.listeners.iter_mut() {
            listener.on_cloudlet_failed(cloudlet.id, reason);
        }
        self.failed_cloudlets.push(cloudlet);
    }

    // Destroys VMs when all submitted cloudlets are returned.
    fn check_completion(&mut self) -> Result<(), SimulationError> {
        if self.destroy_requested
            || self.cloudlet_ids.is_empty()
            || !self.vm_requests.is_empty()
            || !self.pending_cloudlets.is_empty()
            || self.active_cloudlet_count() > 0
        {
            return Ok(());
        }
        self.destroy_requested = true;
        log_info!(self.ctx, "all cloudlets are returned, destroying vms");
        if self.created_vms.is_empty() {
            self.ctx.finish();
            return Ok(());
        }
        for (&vm_id, placement) in self.created_vms.iter() {
            self.ctx
                .emit(VmDestroy { vm_id }, placement.datacenter, self.sim_config.message_delay)?;
        }
        Ok(())
    }
}

impl EventHandler for Broker {
    fn on(&mut self, event: Event) -> Result<(), SimulationError> {
        let src = event.src;
        cast!(match event.data {
            VmCreated { vm_id, host_id } => {
                self.on_vm_created(vm_id, host_id, src)?;
            }
            VmAllocationFailed { vm_id, reason } => {
                self.on_vm_allocation_failed(vm_id, reason)?;
            }
            VmDestroyed { vm_id } => {
                self.on_vm_destroyed(vm_id);
            }
            VmMigrated {
                vm_id,
                source_host,
                target_host,
            } => {
                log_info!(self.ctx, "vm {} migrated from host {} to {}", vm_id, source_host, target_host);
                if let Some(placement) = self.created_vms.get_mut(&vm_id) {
                    placement.host_id = target_host;
                }
            }
            VmMigrationFailed { vm_id, reason } => {
                log_warn!(self.ctx, "vm {} is not migrated: {}", vm_id, reason);
            }
            VmScaled { vm_id, mips_per_pe } => {
                log_info!(self.ctx, "vm {} scaled to {} MIPS per PE", vm_id, mips_per_pe);
                if let Some(spec) = self.vm_specs.get_mut(&vm_id) {
                    spec.mips_per_pe = mips_per_pe;
                }
            }
            VmScaleFailed { vm_id, reason } => {
                log_warn!(self.ctx, "vm {} is not scaled: {}", vm_id, reason);
            }
            CloudletReturn { cloudlet } => {
                self.on_cloudlet_return(cloudlet)?;
            }
            CloudletRejected { cloudlet, reason } => {
                self.on_cloudlet_rejected(cloudlet, reason)?;
            }
            PacketForward { packet } => {
                self.on_packet_forward(packet)?;
            }
        });
        Ok(())
    }
}
