// src/gesture/smoothing.rs
// Scalar Kalman smoothing for continuous gesture signals

/// One-dimensional Kalman filter with a constant-value process model.
///
/// Lower `q` gives smoother but slower output; higher `r` trusts the
/// running estimate more than each new measurement.
#[derive(Debug, Clone)]
pub struct ScalarKalman {
    q: f32,
    r: f32,
    x: Option<f32>,
    p: f32,
}

impl ScalarKalman {
    const INITIAL_COVARIANCE: f32 = 1.0;

    pub fn new(q: f32, r: f32) -> Self {
        Self {
            q,
            r,
            x: None,
            p: Self::INITIAL_COVARIANCE,
        }
    }

    /// Feed one measurement and return the filtered value.
    ///
    /// The first measurement after construction or `reset` is returned as-is.
    pub fn filter(&mut self, measurement: f32) -> f32 {
        let Some(x) = self.x else {
            self.x = Some(measurement);
            return measurement;
        };

        self.p += self.q;
        let k = self.p / (self.p + self.r);
        let next = x + k * (measurement - x);
        self.p *= 1.0 - k;

        self.x = Some(next);
        next
    }

    /// Current estimate without updating.
    pub fn value(&self) -> Option<f32> {
        self.x
    }

    pub fn reset(&mut self) {
        self.x = None;
        self.p = Self::INITIAL_COVARIANCE;
    }
}

pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

/// Snap values within `dead_zone` of `center` onto `center`.
pub fn apply_dead_zone(value: f32, center: f32, dead_zone: f32) -> f32 {
    if (value - center).abs() < dead_zone {
        center
    } else {
        value
    }
}

pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let normalized = (value - in_min) / (in_max - in_min);
    out_min + normalized * (out_max - out_min)
}
