use std::cell::RefCell;
use std::rc::Rc;

use cloudsim_core::Id;

use cloudsim_iaas::core::broker::LifecycleListener;
use cloudsim_iaas::core::cloudlet::{Cloudlet, CloudletStatus};
use cloudsim_iaas::core::cloudlet_scheduler::CloudletSchedulerPolicy;
use cloudsim_iaas::core::config::SimulationConfig;
use cloudsim_iaas::core::error::CloudError;
use cloudsim_iaas::core::host::HostSpec;
use cloudsim_iaas::core::task::Task;
use cloudsim_iaas::core::utilization::UtilizationModel;
use cloudsim_iaas::core::vm::VmSpec;
use cloudsim_iaas::core::vm_allocation_policies::first_fit::FirstFit;
use cloudsim_iaas::core::vm_scheduler::VmSchedulerPolicy;
use cloudsim_iaas::simulation::CloudSimulation;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assert_float_eq(x: f64, y: f64, eps: f64) {
    assert!((x - y).abs() < eps, "Values do not match: {:.15} vs {:.15}", x, y);
}

fn finish_time(cloud_sim: &CloudSimulation, broker: Id, cloudlet_id: u32) -> f64 {
    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    let cloudlet = broker.finished_cloudlets().iter().find(|c| c.id == cloudlet_id).unwrap();
    cloudlet.finish_time.unwrap()
}

/// Simulation with a single datacenter and hosts of the specified PE counts (1000 MIPS per PE).
fn simple_sim(
    config: SimulationConfig,
    host_pes: &[u32],
    vm_scheduler: VmSchedulerPolicy,
) -> (CloudSimulation, Id, Id) {
    init_logger();
    let mut cloud_sim = CloudSimulation::from_config(config).unwrap();
    let dc = cloud_sim.add_datacenter("dc", Box::new(FirstFit::new()));
    for (i, pes) in host_pes.iter().enumerate() {
        let spec = HostSpec::new(*pes, 1000., 16384, 10000, 100000).with_vm_scheduler(vm_scheduler);
        cloud_sim.add_host(dc, &format!("h{}", i), &spec).unwrap();
    }
    let broker = cloud_sim.add_broker("broker");
    (cloud_sim, dc, broker)
}

#[derive(Clone, Default)]
struct Recorder {
    finished: Rc<RefCell<Vec<(u32, f64, Option<u32>)>>>,
    failed_vms: Rc<RefCell<Vec<(u32, String)>>>,
    failed_cloudlets: Rc<RefCell<Vec<u32>>>,
}

impl LifecycleListener for Recorder {
    fn on_cloudlet_finished(&mut self, cloudlet_id: u32, _start_time: f64, finish_time: f64, host_id: Option<u32>) {
        self.finished.borrow_mut().push((cloudlet_id, finish_time, host_id));
    }

    fn on_cloudlet_failed(&mut self, cloudlet_id: u32, _reason: &str) {
        self.failed_cloudlets.borrow_mut().push(cloudlet_id);
    }

    fn on_vm_allocation_failed(&mut self, vm_id: u32, reason: &str) {
        self.failed_vms.borrow_mut().push((vm_id, reason.to_string()));
    }
}

#[test]
// 2 hosts with 4 and 2 PEs fit 6 of 20 single-PE VMs.
// 40 cloudlets are bound to 6 VMs in round-robin order (7, 7, 7, 7, 6, 6 cloudlets),
// each VM shares 1000 MIPS among its cloudlets, so the busiest VMs finish at 7000 / 1000 = 7.
fn test_end_to_end() {
    init_logger();
    let config = SimulationConfig::from_file(&name_wrapper("two-hosts.yaml")).unwrap();
    let mut cloud_sim = CloudSimulation::from_config(config).unwrap();
    let dc = cloud_sim.lookup_id("dc").unwrap();
    let broker = cloud_sim.add_broker("broker");
    let recorder = Recorder::default();
    cloud_sim
        .broker(broker)
        .unwrap()
        .borrow_mut()
        .add_listener(Box::new(recorder.clone()));

    let vms = (0..20)
        .map(|id| VmSpec::new(id, 1, 1000.).with_ram(512).with_bw(100).with_size(1000))
        .collect();
    cloud_sim.submit_vms(broker, vms).unwrap();
    let cloudlets = (0..40).map(|id| Cloudlet::new(id, 1000., 1)).collect();
    cloud_sim.submit_cloudlets(broker, cloudlets).unwrap();
    cloud_sim.run().unwrap();

    let broker_ref = cloud_sim.broker(broker).unwrap();
    let broker_ref = broker_ref.borrow();
    assert_eq!(broker_ref.destroyed_vms(), (0..6).collect::<Vec<u32>>());
    assert_eq!(broker_ref.failed_vms(), (6..20).collect::<Vec<u32>>());
    assert_eq!(broker_ref.finished_cloudlets().len(), 40);
    assert!(broker_ref.failed_cloudlets().is_empty());
    assert!(broker_ref
        .finished_cloudlets()
        .iter()
        .all(|c| c.status == CloudletStatus::Success && c.remaining_length() == 0.));
    assert_float_eq(broker_ref.makespan(), 7., 1e-9);
    assert_float_eq(cloud_sim.current_time(), 7., 1e-9);

    // cloudlet 4 is executed by VM 4 placed on the second host
    let cloudlet = broker_ref.finished_cloudlets().iter().find(|c| c.id == 4).unwrap();
    assert_eq!(cloudlet.vm_id, Some(4));
    assert_eq!(cloudlet.host_id, Some(1));
    assert_eq!(cloudlet.exec_start_time, Some(0.));
    assert_float_eq(cloudlet.finish_time.unwrap(), 6., 1e-9);

    assert_eq!(recorder.finished.borrow().len(), 40);
    assert_eq!(recorder.failed_vms.borrow().len(), 14);
    assert!(recorder.failed_vms.borrow()[0].1.contains("no suitable host"));

    let dc = cloud_sim.datacenter(dc).unwrap();
    let dc = dc.borrow();
    assert_eq!(dc.vm_count(), 0);
    assert_eq!(dc.host(0).unwrap().available_mips(), 4000.);
    assert_eq!(dc.host(1).unwrap().usage().available_ram, 8192);
}

#[test]
// With one cloudlet per VM there is no contention and every cloudlet takes 1000 / 1000 = 1.
fn test_no_contention() {
    let (mut cloud_sim, _, broker) = simple_sim(SimulationConfig::default(), &[4, 2], VmSchedulerPolicy::TimeShared);
    cloud_sim
        .submit_vms(broker, (0..6).map(|id| VmSpec::new(id, 1, 1000.)).collect())
        .unwrap();
    cloud_sim
        .submit_cloudlets(broker, (0..6).map(|id| Cloudlet::new(id, 1000., 1)).collect())
        .unwrap();
    cloud_sim.run().unwrap();

    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    assert_eq!(broker.finished_cloudlets().len(), 6);
    for cloudlet in broker.finished_cloudlets() {
        assert_eq!(cloudlet.vm_id, Some(cloudlet.id));
        assert_float_eq(cloudlet.finish_time.unwrap(), 1., 1e-12);
    }
}

#[test]
// VM with 8 PEs doesn't fit any host, the cloudlet bound to nothing fails.
fn test_no_suitable_host() {
    let (mut cloud_sim, dc, broker) = simple_sim(SimulationConfig::default(), &[4, 2], VmSchedulerPolicy::TimeShared);
    let recorder = Recorder::default();
    cloud_sim
        .broker(broker)
        .unwrap()
        .borrow_mut()
        .add_listener(Box::new(recorder.clone()));
    let before: Vec<_> = {
        let dc = cloud_sim.datacenter(dc).unwrap();
        let dc = dc.borrow();
        let usage: Vec<_> = dc.host_pool().hosts().map(|h| h.usage()).collect();
        usage
    };

    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 8, 1000.)]).unwrap();
    cloud_sim.submit_cloudlets(broker, vec![Cloudlet::new(0, 1000., 1)]).unwrap();
    cloud_sim.run().unwrap();

    let after: Vec<_> = {
        let dc = cloud_sim.datacenter(dc).unwrap();
        let dc = dc.borrow();
        let usage: Vec<_> = dc.host_pool().hosts().map(|h| h.usage()).collect();
        usage
    };
    assert_eq!(before, after);
    assert_eq!(recorder.failed_vms.borrow().as_slice(), &[(0, "no suitable host for vm 0".to_string())]);
    assert_eq!(recorder.failed_cloudlets.borrow().as_slice(), &[0]);

    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    assert_eq!(broker.failed_vms(), vec![0]);
    assert!(broker.created_vms().is_empty());
    assert_eq!(broker.failed_cloudlets()[0].status, CloudletStatus::Failed);
    assert_eq!(broker.active_cloudlet_count(), 0);
}

#[test]
fn test_invalid_workload() {
    let (mut cloud_sim, _, broker) = simple_sim(SimulationConfig::default(), &[4], VmSchedulerPolicy::TimeShared);
    assert!(matches!(
        cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 0, 1000.)]),
        Err(CloudError::InvalidSpec { .. })
    ));
    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 1, 1000.)]).unwrap();
    assert!(matches!(
        cloud_sim.submit_cloudlets(broker, vec![Cloudlet::new(0, -1., 1)]),
        Err(CloudError::InvalidSpec { .. })
    ));
    assert!(matches!(
        cloud_sim.submit_cloudlets(broker, vec![Cloudlet::new(0, 10., 0)]),
        Err(CloudError::InvalidSpec { .. })
    ));
    let idle = Cloudlet::new(0, 1000., 1).with_utilization(
        UtilizationModel::Constant(0.),
        UtilizationModel::Full,
        UtilizationModel::Full,
    );
    assert!(matches!(
        cloud_sim.submit_cloudlets(broker, vec![idle]),
        Err(CloudError::InvalidSpec { .. })
    ));
    assert!(matches!(
        cloud_sim.submit_cloudlets(broker, vec![Cloudlet::new(1, 10., 1).with_vm(5)]),
        Err(CloudError::InvalidSpec { .. })
    ));
    assert!(matches!(
        cloud_sim.submit_vms(100, vec![]),
        Err(CloudError::UnknownEntity { kind: "broker", id: 100 })
    ));
}

#[test]
// Space-shared VM with a single PE runs cloudlets one after another.
fn test_space_shared_cloudlets() {
    let (mut cloud_sim, _, broker) = simple_sim(SimulationConfig::default(), &[1], VmSchedulerPolicy::SpaceShared);
    let vm = VmSpec::new(0, 1, 1000.).with_cloudlet_scheduler(CloudletSchedulerPolicy::SpaceShared);
    cloud_sim.submit_vms(broker, vec![vm]).unwrap();
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(1, 500., 1), Cloudlet::new(0, 500., 1)])
        .unwrap();
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 0), 0.5, 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 1), 1., 1e-12);
    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    let second = broker.finished_cloudlets().iter().find(|c| c.id == 1).unwrap();
    assert_float_eq(second.exec_start_time.unwrap(), 0.5, 1e-12);
}

#[test]
// Two VMs requesting 1000 MIPS share a single 1000 MIPS PE, so each cloudlet runs at 500 MIPS.
fn test_over_subscription() {
    let (mut cloud_sim, dc, broker) = simple_sim(
        SimulationConfig::default(),
        &[1],
        VmSchedulerPolicy::TimeSharedOverSubscription,
    );
    cloud_sim
        .submit_vms(broker, vec![VmSpec::new(0, 1, 1000.), VmSpec::new(1, 1, 1000.)])
        .unwrap();
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(0, 1000., 1), Cloudlet::new(1, 1000., 1)])
        .unwrap();

    cloud_sim.step_for_duration(0.).unwrap();
    {
        let dc = cloud_sim.datacenter(dc).unwrap();
        let dc = dc.borrow();
        assert_eq!(dc.vm(0).unwrap().scheduler.capacity(), 500.);
        assert_eq!(dc.vm(1).unwrap().scheduler.capacity(), 500.);
    }
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 0), 2., 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 1), 2., 1e-12);
}

#[test]
// Cloudlet 0 computes for 1 second, then sends 500 units to cloudlet 1 over 1000 units/s link with 0.5 latency.
// Cloudlet 1 waits for the message, so both cloudlets compute their second part from 2 to 3.
fn test_network_cloudlets() {
    let config = SimulationConfig {
        network_latency: 0.5,
        ..Default::default()
    };
    let (mut cloud_sim, _, broker) = simple_sim(config, &[4], VmSchedulerPolicy::TimeShared);
    cloud_sim
        .submit_vms(
            broker,
            vec![VmSpec::new(0, 1, 1000.).with_bw(1000), VmSpec::new(1, 1, 1000.).with_bw(1000)],
        )
        .unwrap();
    let sender = Cloudlet::network(
        0,
        1,
        vec![Task::execution(1000.), Task::send(1, 500), Task::execution(1000.)],
    )
    .with_vm(0);
    let receiver = Cloudlet::network(1, 1, vec![Task::receive(0), Task::execution(1000.)]).with_vm(1);
    assert_eq!(sender.length(), 2000.);
    cloud_sim.submit_cloudlets(broker, vec![receiver, sender]).unwrap();
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 0), 3., 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 1), 3., 1e-12);

    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    let receiver = broker.finished_cloudlets().iter().find(|c| c.id == 1).unwrap();
    let tasks = receiver.tasks().unwrap();
    assert!(receiver.is_finished());
    assert_eq!(tasks.tasks()[0].finish_time, Some(2.));
    assert_eq!(tasks.tasks()[1].start_time, Some(2.));
    assert_eq!(receiver.length(), 1000.);
}

#[test]
// Communicating cloudlets placed in different datacenters exchange packets through their broker.
fn test_network_cloudlets_across_datacenters() {
    let config = SimulationConfig {
        network_latency: 0.5,
        ..Default::default()
    };
    let (mut cloud_sim, dc, broker) = simple_sim(config, &[1], VmSchedulerPolicy::TimeShared);
    let dc2 = cloud_sim.add_datacenter("dc2", Box::new(FirstFit::new()));
    let spec = HostSpec::new(1, 1000., 16384, 10000, 100000);
    cloud_sim.add_host(dc2, "h1", &spec).unwrap();
    cloud_sim
        .submit_vms(
            broker,
            vec![VmSpec::new(0, 1, 1000.).with_bw(1000), VmSpec::new(1, 1, 1000.).with_bw(1000)],
        )
        .unwrap();
    let sender = Cloudlet::network(
        0,
        1,
        vec![Task::execution(1000.), Task::send(1, 500), Task::execution(1000.)],
    )
    .with_vm(0);
    let receiver = Cloudlet::network(1, 1, vec![Task::receive(0), Task::execution(1000.)]).with_vm(1);
    cloud_sim.submit_cloudlets(broker, vec![sender, receiver]).unwrap();
    cloud_sim.run().unwrap();

    {
        let broker = cloud_sim.broker(broker).unwrap();
        let broker = broker.borrow();
        assert_eq!(broker.destroyed_vms(), vec![0, 1]);
        assert_eq!(broker.finished_cloudlets().len(), 2);
        let receiver = broker.finished_cloudlets().iter().find(|c| c.id == 1).unwrap();
        assert_eq!(receiver.datacenter_id, Some(dc2));
        assert_eq!(receiver.tasks().unwrap().tasks()[0].finish_time, Some(2.));
        let sender = broker.finished_cloudlets().iter().find(|c| c.id == 0).unwrap();
        assert_eq!(sender.datacenter_id, Some(dc));
    }
    assert_float_eq(finish_time(&cloud_sim, broker, 0), 3., 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 1), 3., 1e-12);
    assert_eq!(cloud_sim.datacenter(dc).unwrap().borrow().buffered_packet_count(), 0);
    assert_eq!(cloud_sim.datacenter(dc2).unwrap().borrow().buffered_packet_count(), 0);
}

#[test]
// Packet sent to a cloudlet which has already finished is dropped, the sender completes normally.
fn test_packet_to_returned_cloudlet() {
    let (mut cloud_sim, dc, broker) = simple_sim(SimulationConfig::default(), &[2], VmSchedulerPolicy::TimeShared);
    cloud_sim
        .submit_vms(broker, vec![VmSpec::new(0, 1, 1000.), VmSpec::new(1, 1, 1000.)])
        .unwrap();
    let sender = Cloudlet::network(1, 1, vec![Task::execution(2000.), Task::send(0, 100)]).with_vm(1);
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(0, 1000., 1).with_vm(0), sender])
        .unwrap();
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 0), 1., 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 1), 2., 1e-12);
    assert_eq!(cloud_sim.broker(broker).unwrap().borrow().active_cloudlet_count(), 0);
    assert_eq!(cloud_sim.datacenter(dc).unwrap().borrow().buffered_packet_count(), 0);
}

#[test]
fn test_migration() {
    let (mut cloud_sim, dc, broker) =
        simple_sim(SimulationConfig::default(), &[4, 4, 1], VmSchedulerPolicy::TimeShared);
    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 2, 1000.)]).unwrap();
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(0, 4000., 2)])
        .unwrap();
    assert!(cloud_sim.step_for_duration(1.).unwrap());
    assert_eq!(
        cloud_sim.broker(broker).unwrap().borrow().vm_placement(0).unwrap().host_id,
        0
    );

    {
        let broker = cloud_sim.broker(broker).unwrap();
        let mut broker = broker.borrow_mut();
        broker.migrate_vm(0, Some(1)).unwrap();
        // host 2 is too small, the VM stays on host 1
        broker.migrate_vm(0, Some(2)).unwrap();
        assert!(broker.migrate_vm(7, None).is_err());
    }
    assert!(cloud_sim.step_for_duration(1.).unwrap());
    {
        let dc = cloud_sim.datacenter(dc).unwrap();
        let dc = dc.borrow();
        assert_eq!(dc.host_pool().host_of(0), Some(1));
        assert_eq!(dc.host(0).unwrap().available_mips(), 4000.);
        assert_eq!(dc.host(1).unwrap().available_mips(), 2000.);
        assert_eq!(dc.host(2).unwrap().available_mips(), 1000.);
        assert_eq!(dc.vm(0).unwrap().host_id, Some(1));
    }
    assert_eq!(
        cloud_sim.broker(broker).unwrap().borrow().vm_placement(0).unwrap().host_id,
        1
    );

    cloud_sim.run().unwrap();
    assert_float_eq(finish_time(&cloud_sim, broker, 0), 2., 1e-12);
    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    assert_eq!(broker.finished_cloudlets()[0].host_id, Some(1));
}

#[test]
// Cloudlets 0 and 1 share VM with 500 MIPS, so cloudlet 0 finishes at 500 / 250 = 2.
// Then the VM is scaled to 1000 MIPS and cloudlet 1 processes the remaining 1500 instructions in 1.5 seconds.
fn test_vertical_scaling() {
    let (mut cloud_sim, _, broker) = simple_sim(SimulationConfig::default(), &[1], VmSchedulerPolicy::TimeShared);
    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 1, 500.)]).unwrap();
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(0, 500., 1), Cloudlet::new(1, 2000., 1)])
        .unwrap();
    while cloud_sim.broker(broker).unwrap().borrow().finished_cloudlets().is_empty() {
        assert!(cloud_sim.steps(1).unwrap());
    }
    assert_float_eq(cloud_sim.current_time(), 2., 1e-12);
    {
        let broker = cloud_sim.broker(broker).unwrap();
        let mut broker = broker.borrow_mut();
        broker.scale_vm(0, 1000.).unwrap();
    }
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 1), 3.5, 1e-9);
    let broker = cloud_sim.broker(broker).unwrap();
    assert_eq!(broker.borrow().vm_spec(0).unwrap().mips_per_pe, 1000.);
}

#[test]
// Cloudlet 0 is paused and cloudlet 2 is canceled right after submission, so cloudlet 1 runs alone until 1.
// Cloudlet 0 is resumed at 1 and finishes at 2.
fn test_pause_resume_cancel() {
    let (mut cloud_sim, dc, broker) = simple_sim(SimulationConfig::default(), &[1], VmSchedulerPolicy::TimeShared);
    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 1, 1000.)]).unwrap();
    cloud_sim
        .submit_cloudlets(broker, (0..3).map(|id| Cloudlet::new(id, 1000., 1)).collect())
        .unwrap();
    while cloud_sim.datacenter(dc).unwrap().borrow().cloudlet(0).is_none() {
        assert!(cloud_sim.steps(1).unwrap());
    }
    {
        let broker = cloud_sim.broker(broker).unwrap();
        let mut broker = broker.borrow_mut();
        broker.pause_cloudlet(0).unwrap();
        broker.cancel_cloudlet(2).unwrap();
        assert!(broker.pause_cloudlet(5).is_err());
    }
    while cloud_sim.broker(broker).unwrap().borrow().finished_cloudlets().is_empty() {
        assert!(cloud_sim.steps(1).unwrap());
    }
    assert_float_eq(cloud_sim.current_time(), 1., 1e-12);
    assert_eq!(
        cloud_sim.datacenter(dc).unwrap().borrow().cloudlet(0).unwrap().status,
        CloudletStatus::Paused
    );
    cloud_sim.broker(broker).unwrap().borrow_mut().resume_cloudlet(0).unwrap();
    cloud_sim.run().unwrap();

    assert_float_eq(finish_time(&cloud_sim, broker, 1), 1., 1e-12);
    assert_float_eq(finish_time(&cloud_sim, broker, 0), 2., 1e-12);
    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    assert_eq!(broker.failed_cloudlets().len(), 1);
    assert_eq!(broker.failed_cloudlets()[0].id, 2);
    assert_eq!(broker.failed_cloudlets()[0].status, CloudletStatus::Canceled);
    assert_eq!(broker.destroyed_vms(), vec![0]);
}

#[test]
// VMs which don't fit the small datacenter are created in the big one.
fn test_datacenter_retry() {
    init_logger();
    let config = SimulationConfig::from_file(&name_wrapper("two-datacenters.yaml")).unwrap();
    let mut cloud_sim = CloudSimulation::from_config(config).unwrap();
    let small_dc = cloud_sim.lookup_id("small-dc").unwrap();
    let big_dc = cloud_sim.lookup_id("big-dc").unwrap();
    assert_eq!(cloud_sim.datacenter_ids(), vec![small_dc, big_dc]);
    {
        let small = cloud_sim.datacenter(small_dc).unwrap();
        let small = small.borrow();
        let names: Vec<_> = small.host_pool().hosts().map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["small1", "small2"]);
        let big = cloud_sim.datacenter(big_dc).unwrap();
        assert_eq!(big.borrow().host(2).unwrap().name, "big");
    }

    let broker = cloud_sim.add_broker("broker");
    let vms = vec![
        VmSpec::new(0, 2, 1000.),
        VmSpec::new(1, 4, 1000.),
        VmSpec::new(2, 2, 1000.),
        VmSpec::new(3, 2, 1000.),
        VmSpec::new(4, 16, 1000.),
    ];
    cloud_sim.submit_vms(broker, vms).unwrap();
    cloud_sim
        .submit_cloudlets(broker, (0..4).map(|id| Cloudlet::new(id, 1000., 1)).collect())
        .unwrap();
    assert!(cloud_sim.step_for_duration(0.).unwrap());

    {
        let broker = cloud_sim.broker(broker).unwrap();
        let broker = broker.borrow();
        assert_eq!(broker.created_vms(), vec![0, 1, 2, 3]);
        assert_eq!(broker.failed_vms(), vec![4]);
        let placements: Vec<_> = (0..4).map(|id| broker.vm_placement(id).unwrap()).collect();
        assert_eq!(placements[0].datacenter, small_dc);
        assert_eq!(placements[2].datacenter, small_dc);
        assert_ne!(placements[0].host_id, placements[2].host_id);
        assert_eq!(placements[1].datacenter, big_dc);
        assert_eq!(placements[1].host_id, 2);
        assert_eq!(placements[3].datacenter, big_dc);
    }

    cloud_sim.run().unwrap();
    let broker = cloud_sim.broker(broker).unwrap();
    let broker = broker.borrow();
    assert_eq!(broker.finished_cloudlets().len(), 4);
    for cloudlet in broker.finished_cloudlets() {
        let placement = broker.vm_placement(cloudlet.vm_id.unwrap());
        // VMs are destroyed by now
        assert!(placement.is_none());
        let expected_dc = if cloudlet.vm_id == Some(1) || cloudlet.vm_id == Some(3) {
            big_dc
        } else {
            small_dc
        };
        assert_eq!(cloudlet.datacenter_id, Some(expected_dc));
    }
    assert_eq!(broker.destroyed_vms(), vec![0, 1, 2, 3]);
}

#[test]
// Simulation stops at the configured end time leaving the cloudlet unfinished.
fn test_end_time() {
    let config = SimulationConfig {
        end_time: Some(5.),
        ..Default::default()
    };
    let (mut cloud_sim, dc, broker) = simple_sim(config, &[1], VmSchedulerPolicy::TimeShared);
    cloud_sim.submit_vms(broker, vec![VmSpec::new(0, 1, 1000.)]).unwrap();
    cloud_sim
        .submit_cloudlets(broker, vec![Cloudlet::new(0, 10000., 1)])
        .unwrap();
    cloud_sim.run().unwrap();

    assert!(cloud_sim.current_time() <= 5.);
    let broker = cloud_sim.broker(broker).unwrap();
    assert!(broker.borrow().finished_cloudlets().is_empty());
    assert_eq!(broker.borrow().active_cloudlet_count(), 1);
    let dc = cloud_sim.datacenter(dc).unwrap();
    assert_eq!(dc.borrow().cloudlet(0).unwrap().status, CloudletStatus::InExec);
}
