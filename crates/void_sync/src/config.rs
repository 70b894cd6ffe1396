//! Filter tuning

use serde::{Deserialize, Serialize};

/// Noise and rate parameters shared by every property filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Variance added per measurement; higher follows changes faster
    pub process_noise: f32,
    /// Variance of incoming measurements; higher smooths harder
    pub measurement_noise: f32,
    /// Weight of the newest interval in the rate estimate, in `(0, 1]`
    pub rate_smoothing: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            process_noise: 0.05,
            measurement_noise: 0.01,
            rate_smoothing: 0.25,
        }
    }
}

impl SyncConfig {
    /// Copy with every parameter forced into its valid range
    pub fn sanitized(self) -> Self {
        Self {
            process_noise: self.process_noise.max(0.0),
            measurement_noise: self.measurement_noise.max(f32::EPSILON),
            rate_smoothing: self.rate_smoothing.clamp(f32::EPSILON, 1.0),
        }
    }
}
