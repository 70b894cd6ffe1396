//! Scalar Kalman filter
//!
//! Each channel models its value as a random walk: the prediction step only
//! grows the uncertainty by the process noise, the update step blends the
//! measurement in by the Kalman gain.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelFilter {
    estimate: f32,
    covariance: f32,
    process_noise: f32,
    measurement_noise: f32,
}

impl ChannelFilter {
    pub fn new(initial: f32, process_noise: f32, measurement_noise: f32) -> Self {
        Self {
            estimate: initial,
            covariance: measurement_noise,
            process_noise,
            measurement_noise,
        }
    }

    pub fn estimate(&self) -> f32 {
        self.estimate
    }

    pub fn covariance(&self) -> f32 {
        self.covariance
    }

    /// Fold in a measurement and return the new estimate
    pub fn update(&mut self, measurement: f32) -> f32 {
        if !measurement.is_finite() {
            log::warn!("Ignoring non-finite measurement {}", measurement);
            return self.estimate;
        }
        let predicted = self.covariance + self.process_noise;
        let gain = predicted / (predicted + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.covariance = (1.0 - gain) * predicted;
        self.estimate
    }
}
