use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Alphanumeric, DistString};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::component::{ComponentState, Id};
use crate::error::SimulationError;
use crate::event::{Event, EventData, EventId};
use crate::log::log_incorrect_event;

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

pub struct SimulationState {
    clock: f64,
    rand: Pcg64,
    events: BinaryHeap<Event>,
    canceled_events: HashSet<EventId>,
    // issuer of each undelivered event
    pending_events: HashMap<EventId, Id>,
    event_count: u64,

    component_name_to_id: HashMap<String, Id>,
    component_names: Vec<String>,
    component_states: Vec<ComponentState>,
}

impl SimulationState {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.0,
            rand: Pcg64::seed_from_u64(seed),
            events: BinaryHeap::new(),
            canceled_events: HashSet::new(),
            pending_events: HashMap::new(),
            event_count: 0,
            component_name_to_id: HashMap::new(),
            component_names: Vec::new(),
            component_states: Vec::new(),
        }
    }

    // Components ------------------------------------------------------------------------------------------------------

    pub fn register(&mut self, name: &str) -> Id {
        if let Some(&id) = self.component_name_to_id.get(name) {
            return id;
        }
        let id = self.component_names.len() as Id;
        self.component_name_to_id.insert(name.to_owned(), id);
        self.component_names.push(name.to_owned());
        self.component_states.push(ComponentState::Created);
        id
    }

    pub fn lookup_id(&self, name: &str) -> Option<Id> {
        self.component_name_to_id.get(name).copied()
    }

    pub fn lookup_name(&self, id: Id) -> Option<&str> {
        self.component_names.get(id as usize).map(|s| s.as_str())
    }

    pub fn is_registered(&self, id: Id) -> bool {
        (id as usize) < self.component_names.len()
    }

    pub fn component_state(&self, id: Id) -> Option<ComponentState> {
        self.component_states.get(id as usize).copied()
    }

    pub fn set_component_state(&mut self, id: Id, state: ComponentState) {
        if let Some(s) = self.component_states.get_mut(id as usize) {
            *s = state;
        }
    }

    /// Moves all created components into running state.
    pub fn start_components(&mut self) {
        for state in self.component_states.iter_mut() {
            if *state == ComponentState::Created {
                *state = ComponentState::Running;
            }
        }
    }

    pub fn finish_components(&mut self) {
        for state in self.component_states.iter_mut() {
            *state = ComponentState::Finished;
        }
    }

    // Clock and randomness --------------------------------------------------------------------------------------------

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rand.gen_range(range)
    }

    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        dist.sample(&mut self.rand)
    }

    pub fn random_string(&mut self, len: usize) -> String {
        Alphanumeric.sample_string(&mut self.rand, len)
    }

    // Events ----------------------------------------------------------------------------------------------------------

    pub fn add_event<T>(&mut self, data: T, src: Id, dst: Id, delay: f64) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        let event_id = self.event_count;
        let event = Event {
            id: event_id,
            // max is used to absorb tiny negative delays caused by floating-point errors
            time: self.clock + delay.max(0.),
            src,
            dst,
            data: Box::new(data),
        };
        if delay.is_nan() || delay < -EPSILON {
            log_incorrect_event(event, &format!("negative delay {}", delay));
            return Err(SimulationError::InvalidDelay { delay });
        }
        if !self.is_registered(dst) {
            log_incorrect_event(event, "unknown destination");
            return Err(SimulationError::UnknownEntity { id: dst });
        }
        self.events.push(event);
        self.pending_events.insert(event_id, src);
        self.event_count += 1;
        Ok(event_id)
    }

    pub fn next_event(&mut self) -> Option<Event> {
        while let Some(event) = self.events.pop() {
            if !self.canceled_events.remove(&event.id) {
                self.pending_events.remove(&event.id);
                self.clock = event.time;
                return Some(event);
            }
        }
        None
    }

    pub fn peek_event(&mut self) -> Option<&Event> {
        while let Some(id) = self.events.peek().map(|e| e.id) {
            if self.canceled_events.remove(&id) {
                self.events.pop();
            } else {
                break;
            }
        }
        self.events.peek()
    }

    /// Cancels the pending event if it was emitted by `requester`.
    pub fn cancel_event(&mut self, id: EventId, requester: Id) -> bool {
        if self.pending_events.get(&id) == Some(&requester) {
            self.pending_events.remove(&id);
            self.canceled_events.insert(id);
            true
        } else {
            false
        }
    }

    pub fn cancel_events<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        let mut count = 0;
        for event in self.events.iter() {
            if self.pending_events.contains_key(&event.id) && pred(event) {
                self.pending_events.remove(&event.id);
                self.canceled_events.insert(event.id);
                count += 1;
            }
        }
        count
    }

    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    pub fn dump_events(&self) -> Vec<Event> {
        let mut output: Vec<Event> = self
            .events
            .iter()
            .filter(|e| !self.canceled_events.contains(&e.id))
            .cloned()
            .collect();
        output.sort();
        // Because the sorting order of events is inverted to be used with BinaryHeap
        output.reverse();
        output
    }
}
