use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Relative tolerance used when comparing amounts of work and MIPS shares.
pub const WORK_EPSILON: f64 = 1e-9;

/// Types of resources leased by hosts to virtual machines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Pe,
    Mips,
    Ram,
    Bandwidth,
    Storage,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Pe => write!(f, "PE"),
            ResourceKind::Mips => write!(f, "MIPS"),
            ResourceKind::Ram => write!(f, "RAM"),
            ResourceKind::Bandwidth => write!(f, "bandwidth"),
            ResourceKind::Storage => write!(f, "storage"),
        }
    }
}

/// Returns true if `x` does not exceed `limit` up to the relative tolerance.
pub fn fits(x: f64, limit: f64) -> bool {
    x <= limit + WORK_EPSILON * limit.abs().max(1.)
}

/// Returns true if `x` is zero up to the tolerance scaled by `scale`.
pub fn is_negligible(x: f64, scale: f64) -> bool {
    x.abs() <= WORK_EPSILON * scale.abs().max(1.)
}
