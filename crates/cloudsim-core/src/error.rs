//! Simulation errors.

use thiserror::Error;

use crate::component::Id;

/// Errors produced by the simulation kernel.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Event was emitted with negative delay.
    #[error("negative event delay {delay} is not allowed")]
    InvalidDelay {
        /// Requested delay.
        delay: f64,
    },
    /// Event was addressed to a component which is not registered.
    #[error("component #{id} is not registered")]
    UnknownEntity {
        /// Requested destination.
        id: Id,
    },
    /// Event handler failed with an unrecoverable error.
    #[error("event handler of `{component}` failed: {source}")]
    Handler {
        /// Name of the failed component.
        component: String,
        /// Underlying error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SimulationError {
    /// Wraps an error raised inside the event handler of specified component.
    pub fn handler<E>(component: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Handler {
            component: component.to_owned(),
            source: Box::new(source),
        }
    }
}
