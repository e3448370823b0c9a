//! Simulation components.

use serde::Serialize;

/// Identifier of simulation component.
pub type Id = u32;

/// Lifecycle state of simulation component.
///
/// Components are `Created` upon registration, become `Running` when the simulation makes its first step
/// and are `Finished` either on their own request (see [`SimulationContext::finish`](crate::SimulationContext::finish))
/// or when [`Simulation::run`](crate::Simulation::run) completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ComponentState {
    /// Registered, simulation is not started yet.
    Created,
    /// Receives and processes events.
    Running,
    /// Does not receive events anymore.
    Finished,
}
