use serde::{Deserialize, Serialize};

use scene_recon_core::Real;

/// Floor the learning rate decays to at the end of the budget.
pub const LR_MIN: Real = 1e-6;

/// Learning-rate decay over the iteration budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    #[default]
    Linear,
    Cosine,
}

impl Schedule {
    /// Learning rate at `iteration` out of `total`.
    ///
    /// Interpolates from `lr_start` at iteration 0 to `lr_end` at `total`.
    pub fn learning_rate(self, iteration: usize, total: usize, lr_start: Real, lr_end: Real) -> Real {
        let t = if total == 0 {
            1.0
        } else {
            (iteration as Real / total as Real).clamp(0.0, 1.0)
        };
        match self {
            Self::Linear => lr_start + (lr_end - lr_start) * t,
            Self::Cosine => {
                lr_end + (lr_start - lr_end) * (1.0 + (t * std::f64::consts::PI).cos()) / 2.0
            }
        }
    }
}

impl std::str::FromStr for Schedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "linear" => Ok(Self::Linear),
            "cosine" => Ok(Self::Cosine),
            other => anyhow::bail!("unknown schedule '{other}' (expected linear or cosine)"),
        }
    }
}
