//! Accessing simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;

use crate::component::{ComponentState, Id};
use crate::error::SimulationError;
use crate::event::{EventData, EventId};
use crate::state::SimulationState;

/// A facade for accessing the simulation state and producing events from simulation components.
pub struct SimulationContext {
    id: Id,
    name: String,
    sim_state: Rc<RefCell<SimulationState>>,
}

impl SimulationContext {
    pub(crate) fn new(id: Id, name: &str, sim_state: Rc<RefCell<SimulationState>>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            sim_state,
        }
    }

    /// Returns the identifier of component associated with this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of component associated with this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random float in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution
    /// using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Creates new event with specified payload, destination and delay.
    ///
    /// Fails if the delay is negative or the destination is not registered in the simulation.
    pub fn emit<T>(&self, data: T, dst: Id, delay: f64) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, delay)
    }

    /// Creates new immediate (zero-delay) event with specified payload and destination.
    pub fn emit_now<T>(&self, data: T, dst: Id) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, dst, 0.)
    }

    /// Creates new event for itself with specified payload and delay.
    pub fn emit_self<T>(&self, data: T, delay: f64) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, delay)
    }

    /// Creates new immediate event for itself with specified payload.
    pub fn emit_self_now<T>(&self, data: T) -> Result<EventId, SimulationError>
    where
        T: EventData,
    {
        self.sim_state.borrow_mut().add_event(data, self.id, self.id, 0.)
    }

    /// Cancels the specified event.
    ///
    /// Only pending events emitted by this component can be cancelled.
    /// Returns `false` if the event was already delivered, cancelled or emitted by another component.
    pub fn cancel_event(&self, id: EventId) -> bool {
        self.sim_state.borrow_mut().cancel_event(id, self.id)
    }

    /// Cancels all pending events with payload type `T` emitted by this component to `dst`.
    ///
    /// Returns the number of cancelled events.
    pub fn cancel_events_to<T>(&self, dst: Id) -> usize
    where
        T: EventData,
    {
        let src = self.id;
        self.sim_state
            .borrow_mut()
            .cancel_events(|e| e.src == src && e.dst == dst && e.data.is::<T>())
    }

    /// Marks the component as finished, so that subsequent events addressed to it are not delivered.
    pub fn finish(&self) {
        self.sim_state
            .borrow_mut()
            .set_component_state(self.id, ComponentState::Finished);
    }

    /// Returns the lifecycle state of the component.
    pub fn state(&self) -> ComponentState {
        self.sim_state
            .borrow()
            .component_state(self.id)
            .unwrap_or(ComponentState::Finished)
    }

    /// Lookup component name by its identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.sim_state
            .borrow()
            .lookup_name(id)
            .map(|s| s.to_owned())
            .unwrap_or_else(|| format!("#{}", id))
    }
}
