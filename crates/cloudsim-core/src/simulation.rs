//! Simulation configuration and execution.

use std::cell::RefCell;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, error, log_enabled, trace};
use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::prelude::Distribution;
use serde_json::json;
use serde_type_name::type_name;

use crate::component::{ComponentState, Id};
use crate::context::SimulationContext;
use crate::error::SimulationError;
use crate::event::Event;
use crate::handler::{EventCancellationPolicy, EventHandler};
use crate::log::{get_colored, log_undelivered_event};
use crate::state::SimulationState;

/// Represents a simulation, provides methods for its configuration and execution.
///
/// The simulation is single-threaded: handlers are invoked one at a time in the order of event times,
/// with ties resolved by event creation order.
pub struct Simulation {
    sim_state: Rc<RefCell<SimulationState>>,
    handlers: Vec<Option<Rc<RefCell<dyn EventHandler>>>>,
    end_time: Option<f64>,
    started: bool,
}

impl Simulation {
    /// Creates a new simulation with specified random seed.
    pub fn new(seed: u64) -> Self {
        Self {
            sim_state: Rc::new(RefCell::new(SimulationState::new(seed))),
            handlers: Vec::new(),
            end_time: None,
            started: false,
        }
    }

    fn register(&mut self, name: &str) -> Id {
        let id = self.sim_state.borrow_mut().register(name);
        if self.handlers.len() <= id as usize {
            self.handlers.resize_with(id as usize + 1, || None);
        }
        id
    }

    /// Returns the identifier of component by its name.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cloudsim_core::Simulation;
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// assert_eq!(sim.lookup_id(comp_ctx.name()), Some(0));
    /// assert_eq!(sim.lookup_id("other"), None);
    /// ```
    pub fn lookup_id(&self, name: &str) -> Option<Id> {
        self.sim_state.borrow().lookup_id(name)
    }

    /// Returns the name of component by its identifier.
    pub fn lookup_name(&self, id: Id) -> Option<String> {
        self.sim_state.borrow().lookup_name(id).map(|s| s.to_owned())
    }

    /// Creates a new simulation context with specified name.
    ///
    /// Component ids are assigned sequentially starting from 0.
    pub fn create_context<S>(&mut self, name: S) -> SimulationContext
    where
        S: AsRef<str>,
    {
        let ctx = SimulationContext::new(self.register(name.as_ref()), name.as_ref(), self.sim_state.clone());
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Created context: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": ctx.name(), "id": ctx.id()})
        );
        ctx
    }

    /// Registers the event handler implementation for component with specified name, returns the component Id.
    ///
    /// If the context for this name was created before, its Id is reused.
    pub fn add_handler<S>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler>>) -> Id
    where
        S: AsRef<str>,
    {
        let id = self.register(name.as_ref());
        self.handlers[id as usize] = Some(handler);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Added handler: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Removes the event handler for component with specified name and cancels pending events
    /// according to the specified policy.
    ///
    /// Subsequent events destined for this component will not be delivered until the handler is added again.
    pub fn remove_handler<S>(&mut self, name: S, cancel_policy: EventCancellationPolicy)
    where
        S: AsRef<str>,
    {
        let id = match self.lookup_id(name.as_ref()) {
            Some(id) => id,
            None => return,
        };
        self.handlers[id as usize] = None;
        let mut state = self.sim_state.borrow_mut();
        match cancel_policy {
            EventCancellationPolicy::Incoming => state.cancel_events(|e| e.dst == id),
            EventCancellationPolicy::Outgoing => state.cancel_events(|e| e.src == id),
            EventCancellationPolicy::All => state.cancel_events(|e| e.src == id || e.dst == id),
            EventCancellationPolicy::None => 0,
        };
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Removed handler: {}",
            state.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
    }

    /// Returns the lifecycle state of the component.
    pub fn component_state(&self, id: Id) -> Option<ComponentState> {
        self.sim_state.borrow().component_state(id)
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.sim_state.borrow().time()
    }

    /// Sets the time after which [`run()`](Self::run()) stops processing events.
    pub fn set_end_time(&mut self, end_time: f64) {
        self.end_time = Some(end_time);
    }

    /// Performs a single step through the simulation.
    ///
    /// Takes the next event from the queue, advances the simulation time to event time and tries to process it
    /// by invoking the [`EventHandler::on()`](crate::EventHandler::on()) method of the corresponding event handler.
    /// If there is no handler registered for component with Id `event.dst` or the component is finished,
    /// logs the undelivered event and discards it.
    ///
    /// Returns `Ok(true)` if some pending event was found and `Ok(false)` if there are no pending events.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use cloudsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct SomeEvent {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// comp_ctx.emit_self(SomeEvent {}, 1.2).unwrap();
    /// assert!(sim.step().unwrap());
    /// assert_eq!(sim.time(), 1.2);
    /// assert!(!sim.step().unwrap());
    /// ```
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        if !self.started {
            self.started = true;
            self.sim_state.borrow_mut().start_components();
        }
        let next = self.sim_state.borrow_mut().next_event();
        let event = match next {
            Some(event) => event,
            None => return Ok(false),
        };
        if log_enabled!(Trace) {
            self.trace_event(&event);
        }
        let finished = self.component_state(event.dst) == Some(ComponentState::Finished);
        let handler = self.handlers.get(event.dst as usize).cloned().flatten();
        match handler {
            Some(handler) if !finished => {
                let dst = event.dst;
                if let Err(e) = handler.borrow_mut().on(event) {
                    error!(
                        target: "simulation",
                        "[{:.3} {} simulation] Run aborted by {}: {}",
                        self.time(),
                        get_colored("ERROR", colored::Color::Red),
                        self.lookup_name(dst).unwrap_or_default(),
                        e
                    );
                    return Err(e);
                }
            }
            _ => log_undelivered_event(event),
        }
        Ok(true)
    }

    fn trace_event(&self, event: &Event) {
        let src_name = self.lookup_name(event.src).unwrap_or_default();
        let dst_name = self.lookup_name(event.dst).unwrap_or_default();
        trace!(
            target: &dst_name,
            "[{:.3} {} {}] {}",
            event.time,
            get_colored("EVENT", colored::Color::BrightBlack),
            dst_name,
            json!({"type": type_name(&event.data).unwrap_or("?"), "data": event.data, "src": src_name})
        );
    }

    /// Performs the specified number of steps through the simulation.
    ///
    /// Returns `Ok(true)` if there could be more pending events and `Ok(false)` otherwise.
    pub fn steps(&mut self, step_count: u64) -> Result<bool, SimulationError> {
        for _ in 0..step_count {
            if !self.step()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Steps through the simulation until there are no pending events left.
    pub fn step_until_no_events(&mut self) -> Result<(), SimulationError> {
        while self.step()? {}
        Ok(())
    }

    /// Steps through the simulation with duration limit.
    ///
    /// Processes events until the next event time is above `current_time + duration`
    /// or there are no pending events left.
    ///
    /// Returns `Ok(true)` if there could be more pending events and `Ok(false)` otherwise.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use serde::Serialize;
    /// use cloudsim_core::Simulation;
    ///
    /// #[derive(Clone, Serialize)]
    /// pub struct SomeEvent {}
    ///
    /// let mut sim = Simulation::new(123);
    /// let comp_ctx = sim.create_context("comp");
    /// comp_ctx.emit_self(SomeEvent {}, 1.0).unwrap();
    /// comp_ctx.emit_self(SomeEvent {}, 2.0).unwrap();
    /// comp_ctx.emit_self(SomeEvent {}, 3.5).unwrap();
    /// assert!(sim.step_for_duration(1.5).unwrap());
    /// assert_eq!(sim.time(), 1.0);
    /// assert!(!sim.step_for_duration(3.0).unwrap());
    /// assert_eq!(sim.time(), 3.5);
    /// ```
    pub fn step_for_duration(&mut self, duration: f64) -> Result<bool, SimulationError> {
        let end_time = self.time() + duration;
        loop {
            match self.next_event_time() {
                Some(time) if time > end_time => return Ok(true),
                Some(_) => {
                    self.step()?;
                }
                None => return Ok(false),
            }
        }
    }

    /// Runs the simulation until there are no pending events or the configured end time is reached.
    ///
    /// Upon return all components are marked as finished.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        loop {
            if let (Some(end_time), Some(next_time)) = (self.end_time, self.next_event_time()) {
                if next_time > end_time {
                    break;
                }
            }
            if !self.step()? {
                break;
            }
        }
        self.sim_state.borrow_mut().finish_components();
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Finished run after {} events",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            self.event_count()
        );
        Ok(())
    }

    fn next_event_time(&self) -> Option<f64> {
        self.sim_state.borrow_mut().peek_event().map(|e| e.time)
    }

    /// Returns a random float in the range _[0, 1)_
    /// using the simulation-wide random number generator.
    pub fn rand(&mut self) -> f64 {
        self.sim_state.borrow_mut().rand()
    }

    /// Returns a random number in the specified range
    /// using the simulation-wide random number generator.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.sim_state.borrow_mut().gen_range(range)
    }

    /// Returns a random value from the specified distribution
    /// using the simulation-wide random number generator.
    pub fn sample_from_distribution<T, Dist: Distribution<T>>(&mut self, dist: &Dist) -> T {
        self.sim_state.borrow_mut().sample_from_distribution(dist)
    }

    /// Returns a random alphanumeric string of specified length
    /// using the simulation-wide random number generator.
    pub fn random_string(&mut self, len: usize) -> String {
        self.sim_state.borrow_mut().random_string(len)
    }

    /// Returns the total number of created events.
    ///
    /// Note that cancelled events are also counted here.
    pub fn event_count(&self) -> u64 {
        self.sim_state.borrow().event_count()
    }

    /// Returns the number of events which are neither delivered nor cancelled.
    pub fn pending_event_count(&self) -> usize {
        self.sim_state.borrow().pending_event_count()
    }

    /// Returns a copy of pending events ordered by delivery time.
    pub fn dump_events(&self) -> Vec<Event> {
        self.sim_state.borrow().dump_events()
    }

    /// Cancels pending events that satisfy the given predicate function, returns the number of cancelled events.
    ///
    /// Note that already processed events cannot be cancelled.
    pub fn cancel_events<F>(&mut self, pred: F) -> usize
    where
        F: Fn(&Event) -> bool,
    {
        self.sim_state.borrow_mut().cancel_events(pred)
    }
}
