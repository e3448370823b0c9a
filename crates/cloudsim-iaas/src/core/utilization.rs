//! Resource utilization models of cloudlets.

use serde::{Deserialize, Serialize};

use crate::core::error::CloudError;

/// Fraction of the granted resource actually used by a cloudlet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum UtilizationModel {
    #[default]
    Full,
    Constant(f64),
}

impl UtilizationModel {
    /// Returns utilization in _[0, 1]_ at the specified time.
    pub fn utilization(&self, _time: f64) -> f64 {
        match self {
            UtilizationModel::Full => 1.,
            UtilizationModel::Constant(fraction) => *fraction,
        }
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        match self {
            UtilizationModel::Constant(fraction) if !(0. ..=1.).contains(fraction) => Err(CloudError::invalid_spec(
                "utilization model",
                format!("fraction {} is outside of [0, 1]", fraction),
            )),
            _ => Ok(()),
        }
    }
}
