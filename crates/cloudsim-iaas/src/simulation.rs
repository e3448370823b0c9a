//! Facade for building and running cloud simulations.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use sugars::{rc, refcell};

use cloudsim_core::{Id, Simulation};

use crate::core::broker::Broker;
use crate::core::cloudlet::Cloudlet;
use crate::core::config::SimulationConfig;
use crate::core::datacenter::Datacenter;
use crate::core::error::CloudError;
use crate::core::host::{Host, HostSpec};
use crate::core::vm::VmSpec;
use crate::core::vm_allocation_policy::{allocation_policy_resolver, VmAllocationPolicy};

pub struct CloudSimulation {
    datacenters: BTreeMap<Id, Rc<RefCell<Datacenter>>>,
    brokers: BTreeMap<Id, Rc<RefCell<Broker>>>,
    next_host_id: u32,
    sim: Simulation,
    sim_config: Rc<SimulationConfig>,
}

impl CloudSimulation {
    /// Creates simulation with datacenters and hosts described in the config.
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig) -> Result<Self, CloudError> {
        sim_config.validate()?;
        if let Some(end_time) = sim_config.end_time {
            sim.set_end_time(end_time);
        }
        let mut cloud_sim = Self {
            datacenters: BTreeMap::new(),
            brokers: BTreeMap::new(),
            next_host_id: 0,
            sim,
            sim_config: rc!(sim_config),
        };
        let config = cloud_sim.sim_config.clone();
        for dc_config in config.datacenters.iter() {
            let policy = dc_config
                .allocation_policy
                .as_deref()
                .unwrap_or(&config.allocation_policy);
            let dc_id = cloud_sim.add_datacenter(&dc_config.name, allocation_policy_resolver(policy)?);
            for host_config in dc_config.hosts.iter() {
                let spec = host_config.spec(config.vm_scheduler);
                for name in host_config.host_names() {
                    cloud_sim.add_host(dc_id, &name, &spec)?;
                }
            }
        }
        Ok(cloud_sim)
    }

    /// Creates simulation seeded from the config.
    pub fn from_config(sim_config: SimulationConfig) -> Result<Self, CloudError> {
        let sim = Simulation::new(sim_config.seed);
        Self::new(sim, sim_config)
    }

    /// Adds datacenter, which becomes available to all brokers.
    pub fn add_datacenter(&mut self, name: &str, allocation_policy: Box<dyn VmAllocationPolicy>) -> Id {
        let datacenter = rc!(refcell!(Datacenter::new(
            allocation_policy,
            self.sim.create_context(name),
            self.sim_config.clone(),
        )));
        let id = self.sim.add_handler(name, datacenter.clone());
        self.datacenters.insert(id, datacenter);
        for broker in self.brokers.values() {
            broker.borrow_mut().add_datacenter(id);
        }
        id
    }

    /// Adds host to the datacenter, returns the host ID unique within the simulation.
    pub fn add_host(&mut self, datacenter_id: Id, name: &str, spec: &HostSpec) -> Result<u32, CloudError> {
        let datacenter = self.datacenters.get(&datacenter_id).ok_or(CloudError::UnknownEntity {
            kind: "datacenter",
            id: datacenter_id,
        })?;
        let host_id = self.next_host_id;
        datacenter.borrow_mut().add_host(Host::new(host_id, name, spec)?)?;
        self.next_host_id += 1;
        Ok(host_id)
    }

    /// Adds broker, which places VMs into the datacenters in the order of their creation.
    pub fn add_broker(&mut self, name: &str) -> Id {
        let broker = rc!(refcell!(Broker::new(
            self.sim.create_context(name),
            self.sim_config.clone()
        )));
        for &dc_id in self.datacenters.keys() {
            broker.borrow_mut().add_datacenter(dc_id);
        }
        let id = self.sim.add_handler(name, broker.clone());
        self.brokers.insert(id, broker);
        id
    }

    pub fn broker(&self, id: Id) -> Option<Rc<RefCell<Broker>>> {
        self.brokers.get(&id).cloned()
    }

    pub fn datacenter(&self, id: Id) -> Option<Rc<RefCell<Datacenter>>> {
        self.datacenters.get(&id).cloned()
    }

    pub fn datacenter_ids(&self) -> Vec<Id> {
        self.datacenters.keys().copied().collect()
    }

    pub fn lookup_id(&self, name: &str) -> Option<Id> {
        self.sim.lookup_id(name)
    }

    pub fn submit_vms(&mut self, broker_id: Id, vms: Vec<VmSpec>) -> Result<(), CloudError> {
        self.broker_ref(broker_id)?.borrow_mut().submit_vms(vms)
    }

    pub fn submit_cloudlets(&mut self, broker_id: Id, cloudlets: Vec<Cloudlet>) -> Result<(), CloudError> {
        self.broker_ref(broker_id)?.borrow_mut().submit_cloudlets(cloudlets)
    }

    fn broker_ref(&self, id: Id) -> Result<&Rc<RefCell<Broker>>, CloudError> {
        self.brokers
            .get(&id)
            .ok_or(CloudError::UnknownEntity { kind: "broker", id })
    }

    /// Runs the simulation until there are no pending events or the configured end time is reached.
    pub fn run(&mut self) -> Result<(), CloudError> {
        self.sim.run()?;
        Ok(())
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `Ok(true)` if there could be more pending events and `Ok(false)` otherwise.
    pub fn steps(&mut self, step_count: u64) -> Result<bool, CloudError> {
        Ok(self.sim.steps(step_count)?)
    }

    /// Steps through the simulation with duration limit.
    ///
    /// Returns `Ok(true)` if there could be more pending events and `Ok(false)` otherwise.
    pub fn step_for_duration(&mut self, duration: f64) -> Result<bool, CloudError> {
        Ok(self.sim.step_for_duration(duration)?)
    }

    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    pub fn sim_config(&self) -> Rc<SimulationConfig> {
        self.sim_config.clone()
    }
}
