//! Tests of event cancellation by components and on event handler removal.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde::Serialize;

use cloudsim_core::{Event, EventCancellationPolicy, EventHandler, EventId, Simulation, SimulationError};

#[derive(Clone, Serialize)]
struct Ping {}

#[derive(Clone, Serialize)]
struct Pong {}

struct Recorder {
    received: Vec<EventId>,
}

impl EventHandler for Recorder {
    fn on(&mut self, event: Event) -> Result<(), SimulationError> {
        self.received.push(event.id);
        Ok(())
    }
}

fn prepare_test(comp1_name: &str, comp2_name: &str) -> Simulation {
    let mut sim = Simulation::new(123);
    let ctx1 = sim.create_context(comp1_name);
    let ctx2 = sim.create_context(comp2_name);
    for name in [comp1_name, comp2_name] {
        sim.add_handler(name, Rc::new(RefCell::new(Recorder { received: Vec::new() })));
    }
    ctx1.emit(Ping {}, ctx2.id(), 0.).unwrap();
    ctx2.emit(Ping {}, ctx1.id(), 0.).unwrap();
    ctx2.emit_self(Ping {}, 0.).unwrap();
    ctx1.emit_self(Ping {}, 0.).unwrap();
    sim
}

fn event_ids_where<F: Fn(&Event) -> bool>(sim: &Simulation, pred: F) -> HashSet<EventId> {
    sim.dump_events().iter().filter(|e| pred(e)).map(|e| e.id).collect()
}

#[test]
fn test_none_policy() {
    let mut sim = prepare_test("comp1", "comp2");
    let events = sim.dump_events();
    sim.remove_handler("comp1", EventCancellationPolicy::None);
    assert_eq!(sim.dump_events().len(), events.len());
}

#[test]
fn test_incoming_policy() {
    let mut sim = prepare_test("comp1", "comp2");
    let comp1_id = sim.lookup_id("comp1").unwrap();
    let expected = event_ids_where(&sim, |e| e.dst != comp1_id);
    sim.remove_handler("comp1", EventCancellationPolicy::Incoming);
    assert_eq!(event_ids_where(&sim, |_| true), expected);
}

#[test]
fn test_outgoing_policy() {
    let mut sim = prepare_test("comp1", "comp2");
    let comp1_id = sim.lookup_id("comp1").unwrap();
    let expected = event_ids_where(&sim, |e| e.src != comp1_id);
    sim.remove_handler("comp1", EventCancellationPolicy::Outgoing);
    assert_eq!(event_ids_where(&sim, |_| true), expected);
}

#[test]
fn test_all_policy() {
    let mut sim = prepare_test("comp1", "comp2");
    let comp1_id = sim.lookup_id("comp1").unwrap();
    let expected = event_ids_where(&sim, |e| e.src != comp1_id && e.dst != comp1_id);
    sim.remove_handler("comp1", EventCancellationPolicy::All);
    assert_eq!(event_ids_where(&sim, |_| true), expected);
}

#[test]
fn test_cancel_only_own_pending_events() {
    let mut sim = Simulation::new(123);
    let ctx1 = sim.create_context("comp1");
    let ctx2 = sim.create_context("comp2");
    let recorder = Rc::new(RefCell::new(Recorder { received: Vec::new() }));
    sim.add_handler("comp2", recorder.clone());

    let first = ctx1.emit(Ping {}, ctx2.id(), 1.).unwrap();
    let second = ctx1.emit(Ping {}, ctx2.id(), 2.).unwrap();

    // another component cannot cancel the event
    assert!(!ctx2.cancel_event(first));
    assert!(ctx1.cancel_event(first));
    // second cancellation is a no-op
    assert!(!ctx1.cancel_event(first));

    sim.step_until_no_events().unwrap();
    assert_eq!(recorder.borrow().received, vec![second]);
    // delivered events cannot be cancelled
    assert!(!ctx1.cancel_event(second));
}

#[test]
fn test_cancel_by_target_and_tag() {
    let mut sim = Simulation::new(123);
    let ctx1 = sim.create_context("comp1");
    let ctx2 = sim.create_context("comp2");
    let recorder = Rc::new(RefCell::new(Recorder { received: Vec::new() }));
    sim.add_handler("comp2", recorder.clone());

    ctx1.emit(Ping {}, ctx2.id(), 1.).unwrap();
    let pong = ctx1.emit(Pong {}, ctx2.id(), 1.).unwrap();
    ctx1.emit(Ping {}, ctx2.id(), 3.).unwrap();
    ctx1.emit(Ping {}, ctx1.id(), 3.).unwrap();

    assert_eq!(ctx1.cancel_events_to::<Ping>(ctx2.id()), 2);
    assert_eq!(sim.pending_event_count(), 2);

    sim.step_until_no_events().unwrap();
    assert_eq!(recorder.borrow().received, vec![pong]);
}
