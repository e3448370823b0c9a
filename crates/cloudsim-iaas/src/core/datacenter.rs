//! Datacenter component hosting VMs and executing cloudlets.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use cloudsim_core::{cast, log_debug, log_info, log_warn};
use cloudsim_core::{Event, EventHandler, Id, SimulationContext, SimulationError};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::cloudlet_scheduler::Packet;
use crate::core::config::SimulationConfig;
use crate::core::error::CloudError;
use crate::core::events::cloudlet::{
    CloudletCancel, CloudletFinish, CloudletPause, CloudletRejected, CloudletResume, CloudletReturn, CloudletSubmit,
};
use crate::core::events::network::{PacketDelivered, PacketForward, PacketRouted};
use crate::core::events::vm::{
    VmAllocationFailed, VmCreateRequest, VmCreated, VmDestroy, VmDestroyed, VmMigrated, VmMigrationFailed,
    VmMigrationRequest, VmScaleFailed, VmScaleRequest, VmScaled, VmUpdate,
};
use crate::core::host::Host;
use crate::core::host_pool::HostPool;
use crate::core::vm::{Vm, VmSpec, VmStatus};
use crate::core::vm_allocation_policy::VmAllocationPolicy;
use crate::core::vm_scheduler::CapacityChanges;

/// Owns hosts and VMs placed on them, executes cloudlets submitted by brokers.
///
/// Every change of a VM's cloudlet set or capacity is followed by the update of its cloudlet scheduler,
/// which re-issues the pending [`CloudletFinish`] event of the VM.
pub struct Datacenter {
    pool: HostPool,
    allocation_policy: Box<dyn VmAllocationPolicy>,
    vms: BTreeMap<u32, Vm>,
    vm_owners: HashMap<u32, Id>,
    cloudlet_vms: HashMap<u32, u32>,
    cloudlet_owners: HashMap<u32, Id>,
    // packets routed to cloudlets not submitted yet
    undelivered_packets: HashMap<u32, Vec<Packet>>,
    returned_cloudlets: HashSet<u32>,
    pending_updates: HashSet<u32>,
    ctx: SimulationContext,
    sim_config: Rc<SimulationConfig>,
}

impl Datacenter {
    pub fn new(
        allocation_policy: Box<dyn VmAllocationPolicy>,
        ctx: SimulationContext,
        sim_config: Rc<SimulationConfig>,
    ) -> Self {
        Self {
            pool: HostPool::new(),
            allocation_policy,
            vms: BTreeMap::new(),
            vm_owners: HashMap::new(),
            cloudlet_vms: HashMap::new(),
            cloudlet_owners: HashMap::new(),
            undelivered_packets: HashMap::new(),
            returned_cloudlets: HashSet::new(),
            pending_updates: HashSet::new(),
            ctx,
            sim_config,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn name(&self) -> &str {
        self.ctx.name()
    }

    pub fn add_host(&mut self, host: Host) -> Result<(), CloudError> {
        log_debug!(self.ctx, "added host {} ({})", host.id, host.name);
        self.pool.add_host(host)
    }

    pub fn host_pool(&self) -> &HostPool {
        &self.pool
    }

    pub fn host(&self, id: u32) -> Option<&Host> {
        self.pool.host(id)
    }

    pub fn vm(&self, id: u32) -> Option<&Vm> {
        self.vms.get(&id)
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    /// Returns the number of packets waiting for submission of their destination cloudlets.
    pub fn buffered_packet_count(&self) -> usize {
        self.undelivered_packets.values().map(|packets| packets.len()).sum()
    }

    pub fn cloudlet(&self, id: u32) -> Option<&Cloudlet> {
        let vm_id = self.cloudlet_vms.get(&id)?;
        self.vms.get(vm_id)?.scheduler.cloudlet(id)
    }

    // VM lifecycle ////////////////////////////////////////////////////////////////////////////////

    fn on_vm_create_request(&mut self, vm: VmSpec, requester: Id) -> Result<(), SimulationError> {
        let vm_id = vm.id;
        let result = if self.vms.contains_key(&vm_id) {
            Err(CloudError::invalid_spec(format!("vm {}", vm_id), "vm already exists"))
        } else {
            vm.validate()
                .and_then(|_| self.pool.allocate(&vm, self.allocation_policy.as_ref()))
        };
        match result {
            Ok(placement) => {
                let granted = self
                    .pool
                    .host(placement.host_id)
                    .map_or(0., |host| host.granted_mips(vm_id));
                log_info!(
                    self.ctx,
                    "vm {} created on host {} with {} MIPS",
                    vm_id,
                    placement.host_id,
                    granted
                );
                self.vms.insert(vm_id, Vm::new(vm, placement.host_id, granted));
                self.vm_owners.insert(vm_id, requester);
                self.apply_capacity_changes(placement.changes)?;
                self.ctx.emit(
                    VmCreated {
                        vm_id,
                        host_id: placement.host_id,
                    },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
            Err(e) => {
                log_warn!(self.ctx, "failed to create vm {}: {}", vm_id, e);
                self.ctx.emit(
                    VmAllocationFailed {
                        vm_id,
                        reason: e.to_string(),
                    },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
        }
        Ok(())
    }

    fn on_vm_destroy(&mut self, vm_id: u32, requester: Id) -> Result<(), SimulationError> {
        let mut vm = match self.vms.remove(&vm_id) {
            Some(vm) => vm,
            None => {
                log_warn!(self.ctx, "can't destroy unknown vm {}", vm_id);
                return Ok(());
            }
        };
        if let Some(event_id) = vm.next_event.take() {
            self.ctx.cancel_event(event_id);
        }
        self.pending_updates.remove(&vm_id);
        vm.status = VmStatus::Destroyed;
        for mut cloudlet in vm.scheduler.take_all(self.ctx.time()) {
            cloudlet.status = CloudletStatus::Canceled;
            self.return_cloudlet(cloudlet)?;
        }
        if let Some((host_id, changes)) = self.pool.deallocate(vm_id) {
            log_info!(self.ctx, "vm {} destroyed on host {}", vm_id, host_id);
            self.apply_capacity_changes(changes)?;
        }
        let owner = self.vm_owners.remove(&vm_id).unwrap_or(requester);
        self.ctx
            .emit(VmDestroyed { vm_id }, owner, self.sim_config.message_delay)?;
        Ok(())
    }

    fn on_vm_migration_request(
        &mut self,
        vm_id: u32,
        target_host: Option<u32>,
        requester: Id,
    ) -> Result<(), SimulationError> {
        let result = match self.vms.get(&vm_id) {
            Some(vm) => self
                .pool
                .migrate(&vm.spec, target_host, self.allocation_policy.as_ref()),
            None => Err(CloudError::UnknownEntity { kind: "vm", id: vm_id }),
        };
        match result {
            Ok((source_host, source_changes, placement)) => {
                log_info!(
                    self.ctx,
                    "vm {} migrated from host {} to host {}",
                    vm_id,
                    source_host,
                    placement.host_id
                );
                if let Some(vm) = self.vms.get_mut(&vm_id) {
                    vm.host_id = Some(placement.host_id);
                }
                self.apply_capacity_changes(source_changes)?;
                self.apply_capacity_changes(placement.changes)?;
                self.ctx.emit(
                    VmMigrated {
                        vm_id,
                        source_host,
                        target_host: placement.host_id,
                    },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
            Err(e) => {
                log_warn!(self.ctx, "failed to migrate vm {}: {}", vm_id, e);
                self.ctx.emit(
                    VmMigrationFailed {
                        vm_id,
                        reason: e.to_string(),
                    },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
        }
        Ok(())
    }

    fn on_vm_scale_request(&mut self, vm_id: u32, mips_per_pe: f64, requester: Id) -> Result<(), SimulationError> {
        let result = if self.vms.contains_key(&vm_id) {
            self.pool.resize_vm_mips(vm_id, mips_per_pe)
        } else {
            Err(CloudError::UnknownEntity { kind: "vm", id: vm_id })
        };
        match result {
            Ok((_, changes)) => {
                log_info!(self.ctx, "vm {} scaled to {} MIPS per PE", vm_id, mips_per_pe);
                if let Some(vm) = self.vms.get_mut(&vm_id) {
                    vm.spec.mips_per_pe = mips_per_pe;
                }
                self.apply_capacity_changes(changes)?;
                self.ctx.emit(
                    VmScaled { vm_id, mips_per_pe },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
            Err(e) => {
                log_warn!(self.ctx, "failed to scale vm {}: {}", vm_id, e);
                self.ctx.emit(
                    VmScaleFailed {
                        vm_id,
                        reason: e.to_string(),
                    },
                    requester,
                    self.sim_config.message_delay,
                )?;
            }
        }
        Ok(())
    }

    fn apply_capacity_changes(&mut self, changes: CapacityChanges) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        for (vm_id, mips) in changes {
            if let Some(vm) = self.vms.get_mut(&vm_id) {
                vm.scheduler.set_capacity(mips, time);
                log_debug!(self.ctx, "capacity of vm {} changed to {}", vm_id, mips);
                self.request_update(vm_id)?;
            }
        }
        Ok(())
    }

    // Cloudlets ///////////////////////////////////////////////////////////////////////////////////

    fn on_cloudlet_submit(&mut self, mut cloudlet: Cloudlet, requester: Id) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        let check = match cloudlet.vm_id.and_then(|vm_id| self.vms.get(&vm_id)) {
            Some(vm) if self.cloudlet_vms.contains_key(&cloudlet.id) => Err(CloudError::invalid_spec(
                format!("cloudlet {}", cloudlet.id),
                format!("cloudlet is already submitted to vm {}", vm.id()),
            )),
            Some(vm) => cloudlet.validate().and_then(|_| vm.scheduler.check(&cloudlet)),
            None => Err(CloudError::UnknownEntity {
                kind: "vm",
                id: cloudlet.vm_id.unwrap_or_default(),
            }),
        };
        if let Err(e) = check {
            log_warn!(self.ctx, "cloudlet {} rejected: {}", cloudlet.id, e);
            if !self.cloudlet_vms.contains_key(&cloudlet.id) {
                self.undelivered_packets.remove(&cloudlet.id);
                self.returned_cloudlets.insert(cloudlet.id);
            }
            cloudlet.status = CloudletStatus::Failed;
            self.ctx.emit(
                CloudletRejected {
                    cloudlet,
                    reason: e.to_string(),
                },
                requester,
                self.sim_config.message_delay,
            )?;
            return Ok(());
        }

        let cloudlet_id = cloudlet.id;
        let vm_id = cloudlet.vm_id.unwrap_or_default();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return Ok(()),
        };
        cloudlet.host_id = vm.host_id;
        cloudlet.datacenter_id = Some(self.ctx.id());
        cloudlet.submission_time = Some(time);
        log_debug!(self.ctx, "cloudlet {} submitted to vm {}", cloudlet_id, vm_id);
        vm.scheduler
            .submit(cloudlet, time)
            .map_err(|e| SimulationError::handler(self.ctx.name(), e))?;
        for packet in self.undelivered_packets.remove(&cloudlet_id).unwrap_or_default() {
            vm.scheduler.deliver_packet(packet, time);
        }
        self.cloudlet_vms.insert(cloudlet_id, vm_id);
        self.cloudlet_owners.insert(cloudlet_id, requester);
        self.returned_cloudlets.remove(&cloudlet_id);
        self.request_update(vm_id)
    }

    fn on_cloudlet_pause(&mut self, cloudlet_id: u32) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        let vm_id = self
            .cloudlet_vm_mut(cloudlet_id)
            .and_then(|vm| vm.scheduler.pause(cloudlet_id, time).then(|| vm.id()));
        match vm_id {
            Some(vm_id) => {
                log_debug!(self.ctx, "cloudlet {} paused", cloudlet_id);
                self.request_update(vm_id)
            }
            None => {
                log_warn!(self.ctx, "can't pause cloudlet {}", cloudlet_id);
                Ok(())
            }
        }
    }

    fn on_cloudlet_resume(&mut self, cloudlet_id: u32) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        let vm_id = self
            .cloudlet_vm_mut(cloudlet_id)
            .and_then(|vm| vm.scheduler.resume(cloudlet_id, time).then(|| vm.id()));
        match vm_id {
            Some(vm_id) => {
                log_debug!(self.ctx, "cloudlet {} resumed", cloudlet_id);
                self.request_update(vm_id)
            }
            None => {
                log_warn!(self.ctx, "can't resume cloudlet {}", cloudlet_id);
                Ok(())
            }
        }
    }

    fn on_cloudlet_cancel(&mut self, cloudlet_id: u32) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        let canceled = self
            .cloudlet_vm_mut(cloudlet_id)
            .and_then(|vm| vm.scheduler.cancel(cloudlet_id, time).map(|c| (vm.id(), c)));
        match canceled {
            Some((vm_id, cloudlet)) => {
                log_debug!(self.ctx, "cloudlet {} canceled", cloudlet_id);
                self.return_cloudlet(cloudlet)?;
                self.request_update(vm_id)
            }
            None => {
                log_warn!(self.ctx, "can't cancel cloudlet {}", cloudlet_id);
                Ok(())
            }
        }
    }

    fn cloudlet_vm_mut(&mut self, cloudlet_id: u32) -> Option<&mut Vm> {
        let vm_id = self.cloudlet_vms.get(&cloudlet_id)?;
        self.vms.get_mut(vm_id)
    }

    fn return_cloudlet(&mut self, cloudlet: Cloudlet) -> Result<(), SimulationError> {
        self.cloudlet_vms.remove(&cloudlet.id);
        self.undelivered_packets.remove(&cloudlet.id);
        self.returned_cloudlets.insert(cloudlet.id);
        match self.cloudlet_owners.remove(&cloudlet.id) {
            Some(owner) => {
                self.ctx
                    .emit(CloudletReturn { cloudlet }, owner, self.sim_config.message_delay)?;
            }
            None => log_warn!(self.ctx, "no owner for cloudlet {}", cloudlet.id),
        }
        Ok(())
    }

    // Network /////////////////////////////////////////////////////////////////////////////////////

    fn send_packet(&mut self, packet: Packet, sender_bw: u64) -> Result<(), SimulationError> {
        let mut delay = self.sim_config.network_latency;
        if sender_bw > 0 {
            delay += packet.payload as f64 / sender_bw as f64;
        }
        log_debug!(
            self.ctx,
            "cloudlet {} sends {} to cloudlet {}",
            packet.src_cloudlet,
            packet.payload,
            packet.dst_cloudlet
        );
        self.ctx.emit_self(PacketDelivered { packet }, delay)?;
        Ok(())
    }

    fn on_packet_delivered(&mut self, packet: Packet) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        let (src_cloudlet, dst_cloudlet) = (packet.src_cloudlet, packet.dst_cloudlet);
        if self.cloudlet_vms.contains_key(&dst_cloudlet) {
            self.deliver_packet(packet)?;
        } else {
            match self.cloudlet_owners.get(&src_cloudlet) {
                Some(&owner) => {
                    log_debug!(self.ctx, "packet for cloudlet {} is forwarded to broker", dst_cloudlet);
                    self.ctx.emit_now(PacketForward { packet }, owner)?;
                }
                None => log_warn!(self.ctx, "packet from cloudlet {} is dropped: no owner", src_cloudlet),
            }
        }
        if let Some(vm) = self.cloudlet_vm_mut(src_cloudlet) {
            if vm.scheduler.complete_send(src_cloudlet, dst_cloudlet, time) {
                let vm_id = vm.id();
                self.request_update(vm_id)?;
            }
        }
        Ok(())
    }

    fn on_packet_routed(&mut self, packet: Packet) -> Result<(), SimulationError> {
        let dst_cloudlet = packet.dst_cloudlet;
        if self.cloudlet_vms.contains_key(&dst_cloudlet) {
            self.deliver_packet(packet)
        } else if self.returned_cloudlets.contains(&dst_cloudlet) {
            log_warn!(self.ctx, "packet for returned cloudlet {} is dropped", dst_cloudlet);
            Ok(())
        } else {
            log_debug!(self.ctx, "packet for cloudlet {} is buffered", dst_cloudlet);
            self.undelivered_packets.entry(dst_cloudlet).or_default().push(packet);
            Ok(())
        }
    }

    fn deliver_packet(&mut self, packet: Packet) -> Result<(), SimulationError> {
        let time = self.ctx.time();
        match self.cloudlet_vm_mut(packet.dst_cloudlet) {
            Some(vm) => {
                vm.scheduler.deliver_packet(packet, time);
                let vm_id = vm.id();
                self.request_update(vm_id)
            }
            None => Ok(()),
        }
    }

    // Scheduler updates ///////////////////////////////////////////////////////////////////////////

    fn request_update(&mut self, vm_id: u32) -> Result<(), SimulationError> {
        if self.pending_updates.insert(vm_id) {
            self.ctx.emit_self_now(VmUpdate { vm_id })?;
        }
        Ok(())
    }

    fn update_vm(&mut self, vm_id: u32) -> Result<(), SimulationError> {
        self.pending_updates.remove(&vm_id);
        let time = self.ctx.time();
        let vm = match self.vms.get_mut(&vm_id) {
            Some(vm) => vm,
            None => return Ok(()),
        };
        let update = vm.scheduler.update(time);
        if let Some(event_id) = vm.next_event.take() {
            self.ctx.cancel_event(event_id);
        }
        if let Some(next_time) = update.next_event {
            vm.next_event = Some(self.ctx.emit_self(CloudletFinish { vm_id }, next_time - time)?);
        }
        let sender_bw = vm.spec.bw;
        let host_id = vm.host_id;
        for packet in update.packets {
            self.send_packet(packet, sender_bw)?;
        }
        for mut cloudlet in update.finished {
            log_info!(self.ctx, "cloudlet {} finished on vm {}", cloudlet.id, vm_id);
            cloudlet.host_id = host_id;
            self.return_cloudlet(cloudlet)?;
        }
        Ok(())
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) -> Result<(), SimulationError> {
        let src = event.src;
        cast!(match event.data {
            VmCreateRequest { vm } => {
                self.on_vm_create_request(vm, src)?;
            }
            VmDestroy { vm_id } => {
                self.on_vm_destroy(vm_id, src)?;
            }
            VmMigrationRequest { vm_id, target_host } => {
                self.on_vm_migration_request(vm_id, target_host, src)?;
            }
            VmScaleRequest { vm_id, mips_per_pe } => {
                self.on_vm_scale_request(vm_id, mips_per_pe, src)?;
            }
            VmUpdate { vm_id } => {
                self.update_vm(vm_id)?;
            }
            CloudletSubmit { cloudlet } => {
                self.on_cloudlet_submit(cloudlet, src)?;
            }
            CloudletFinish { vm_id } => {
                if let Some(vm) = self.vms.get_mut(&vm_id) {
                    vm.next_event = None;
                }
                self.update_vm(vm_id)?;
            }
            CloudletPause { cloudlet_id } => {
                self.on_cloudlet_pause(cloudlet_id)?;
            }
            CloudletResume { cloudlet_id } => {
                self.on_cloudlet_resume(cloudlet_id)?;
            }
            CloudletCancel { cloudlet_id } => {
                self.on_cloudlet_cancel(cloudlet_id)?;
            }
            PacketDelivered { packet } => {
                self.on_packet_delivered(packet)?;
            }
            PacketRouted { packet } => {
                self.on_packet_routed(packet)?;
            }
        });
        Ok(())
    }
}
