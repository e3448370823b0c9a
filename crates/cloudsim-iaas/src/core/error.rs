//! Model errors.

use thiserror::Error;

use cloudsim_core::SimulationError;

use crate::core::common::ResourceKind;

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("negative delay {delay} is not allowed")]
    InvalidDelay { delay: f64 },

    #[error("invalid {entity} spec: {reason}")]
    InvalidSpec { entity: String, reason: String },

    #[error("insufficient {resource} capacity: requested {requested}, available {available}")]
    InsufficientCapacity {
        resource: ResourceKind,
        requested: f64,
        available: f64,
    },

    #[error("no suitable host for vm {vm_id}")]
    NoSuitableHost { vm_id: u32 },

    #[error("unknown {kind} {id}")]
    UnknownEntity { kind: &'static str, id: u32 },

    #[error("can't read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("can't serialize results: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Simulation(SimulationError),
}

impl CloudError {
    pub fn invalid_spec<E: ToString, R: ToString>(entity: E, reason: R) -> Self {
        Self::InvalidSpec {
            entity: entity.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn insufficient(resource: ResourceKind, requested: f64, available: f64) -> Self {
        Self::InsufficientCapacity {
            resource,
            requested,
            available,
        }
    }
}

impl From<SimulationError> for CloudError {
    fn from(e: SimulationError) -> Self {
        match e {
            SimulationError::InvalidDelay { delay } => Self::InvalidDelay { delay },
            SimulationError::UnknownEntity { id } => Self::UnknownEntity { kind: "component", id },
            e => Self::Simulation(e),
        }
    }
}
