//! # Kalman / Rauch–Tung–Striebel smoothing
//!
//! Denoises one coordinate series at a time with a constant-velocity state-space model.
//!
//! Model
//! -----------------
//! * State `x = [position, velocity]ᵀ`, unit time step.
//! * Transition `F = [[1, 1], [0, 1]]`, observation `H = [1, 0]`.
//! * Process noise `Q = q · [[1/4, 1/2], [1/2, 1]]` (white acceleration), measurement noise `R`.
//!
//! The forward pass is the usual Kalman recursion, seeded with the first measurement as
//! position, the first difference as velocity and a large diagonal covariance. The first
//! sample is taken as the seed and not fused a second time. Missing measurements (`NaN`)
//! turn a step into a pure prediction. Leading missing measurements have no state to predict
//! from and are returned as `NaN`; the recursion starts at the first finite sample.
//!
//! The backward pass walks from the last filtered state with the RTS gain
//! `C_t = P_t Fᵀ P⁻_{t+1}⁻¹` and returns the smoothed positions.
//!
//! Inverting `P⁻_{t+1}` (and the innovation variance) is guarded: a singular matrix is retried
//! once with `COVARIANCE_REGULARIZATION · I` added, then reported as
//! [`RepairError::Numerical`].
use std::fmt;

use nalgebra::{Matrix1x2, Matrix2, Vector2};

use crate::{
    constants::{
        COVARIANCE_REGULARIZATION, KALMAN_INITIAL_COVARIANCE, KALMAN_MEASUREMENT_NOISE,
        KALMAN_PROCESS_NOISE,
    },
    repair_errors::RepairError,
    track::Track,
};

/// Noise model of the [`KalmanSmoother`].
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanParams {
    /// Scale `q` of the process-noise covariance
    pub process_noise: f64,
    /// Measurement variance `R`
    pub measurement_noise: f64,
    /// Diagonal of the initial state covariance
    pub initial_covariance: f64,
    /// Jitter added before retrying a singular inversion
    pub regularization: f64,
}

impl Default for KalmanParams {
    fn default() -> Self {
        KalmanParams {
            process_noise: KALMAN_PROCESS_NOISE,
            measurement_noise: KALMAN_MEASUREMENT_NOISE,
            initial_covariance: KALMAN_INITIAL_COVARIANCE,
            regularization: COVARIANCE_REGULARIZATION,
        }
    }
}

impl KalmanParams {
    pub fn builder() -> KalmanParamsBuilder {
        KalmanParamsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KalmanParamsBuilder {
    params: KalmanParams,
}

impl KalmanParamsBuilder {
    pub fn process_noise(mut self, v: f64) -> Self {
        self.params.process_noise = v;
        self
    }
    pub fn measurement_noise(mut self, v: f64) -> Self {
        self.params.measurement_noise = v;
        self
    }
    pub fn initial_covariance(mut self, v: f64) -> Self {
        self.params.initial_covariance = v;
        self
    }
    pub fn regularization(mut self, v: f64) -> Self {
        self.params.regularization = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// Every variance must be finite; `process_noise` and `regularization` may be zero, the
    /// other two must be strictly positive.
    pub fn build(self) -> Result<KalmanParams, RepairError> {
        let p = &self.params;
        let ge0 = |v: f64| v.is_finite() && v >= 0.0;
        let gt0 = |v: f64| v.is_finite() && v > 0.0;

        if !ge0(p.process_noise) {
            return Err(RepairError::InvalidRepairParameter(
                "process_noise must be finite and >= 0".into(),
            ));
        }
        if !gt0(p.measurement_noise) {
            return Err(RepairError::InvalidRepairParameter(
                "measurement_noise must be finite and > 0".into(),
            ));
        }
        if !gt0(p.initial_covariance) {
            return Err(RepairError::InvalidRepairParameter(
                "initial_covariance must be finite and > 0".into(),
            ));
        }
        if !ge0(p.regularization) {
            return Err(RepairError::InvalidRepairParameter(
                "regularization must be finite and >= 0".into(),
            ));
        }
        Ok(self.params)
    }
}

impl fmt::Display for KalmanParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "KalmanParams(q={:.3e}, R={:.3e}, P0={:.1}, reg={:.1e})",
            self.process_noise, self.measurement_noise, self.initial_covariance, self.regularization
        )
    }
}

/// Forward Kalman filter + backward RTS smoother for one-dimensional series.
#[derive(Debug, Clone)]
pub struct KalmanSmoother {
    params: KalmanParams,
    transition: Matrix2<f64>,
    observation: Matrix1x2<f64>,
    process_cov: Matrix2<f64>,
}

impl Default for KalmanSmoother {
    fn default() -> Self {
        KalmanSmoother::new(KalmanParams::default())
    }
}

impl KalmanSmoother {
    pub fn new(params: KalmanParams) -> Self {
        let q = params.process_noise;
        KalmanSmoother {
            transition: Matrix2::new(1.0, 1.0, 0.0, 1.0),
            observation: Matrix1x2::new(1.0, 0.0),
            process_cov: Matrix2::new(0.25, 0.5, 0.5, 1.0) * q,
            params,
        }
    }

    pub fn params(&self) -> &KalmanParams {
        &self.params
    }

    /// Smooth a single coordinate series.
    ///
    /// Arguments
    /// -----------------
    /// * `series`: Positions at consecutive frames; `NaN` marks a missing measurement.
    ///
    /// Return
    /// ----------
    /// * The smoothed positions (same length), or [`RepairError::Numerical`] with the step at
    ///   which a covariance stayed singular after regularization.
    ///
    /// A series of length `0` or `1` is returned unchanged. A series without any finite
    /// measurement is returned unchanged as well, there is nothing to anchor the state on.
    /// Entries before the first finite measurement are copied through as they are.
    pub fn smooth(&self, series: &[f64]) -> Result<Vec<f64>, RepairError> {
        let Some(first) = series.iter().position(|v| v.is_finite()) else {
            return Ok(series.to_vec());
        };
        if first > 0 {
            let mut out = series[..first].to_vec();
            let tail = self.smooth(&series[first..]).map_err(|err| match err {
                RepairError::Numerical { step } => RepairError::Numerical { step: step + first },
                other => other,
            })?;
            out.extend(tail);
            return Ok(out);
        }
        let n = series.len();
        if n <= 1 {
            return Ok(series.to_vec());
        }

        let f = &self.transition;
        let h = &self.observation;

        let velocity = match series.get(1) {
            Some(next) if next.is_finite() => next - series[0],
            _ => 0.0,
        };
        let mut state = Vector2::new(series[0], velocity);
        let mut cov = Matrix2::identity() * self.params.initial_covariance;

        let mut filtered_x = Vec::with_capacity(n);
        let mut filtered_p = Vec::with_capacity(n);
        let mut predicted_x = Vec::with_capacity(n);
        let mut predicted_p = Vec::with_capacity(n);

        filtered_x.push(state);
        filtered_p.push(cov);
        predicted_x.push(state);
        predicted_p.push(cov);

        for (step, &z) in series.iter().enumerate().skip(1) {
            let x_pred = f * state;
            let p_pred = f * cov * f.transpose() + self.process_cov;
            predicted_x.push(x_pred);
            predicted_p.push(p_pred);

            if z.is_finite() {
                let innovation_var = (h * p_pred * h.transpose())[(0, 0)] + self.params.measurement_noise;
                if !(innovation_var.is_finite() && innovation_var > 0.0) {
                    return Err(RepairError::Numerical { step });
                }
                let gain = p_pred * h.transpose() / innovation_var;
                let residual = z - (h * x_pred)[(0, 0)];
                state = x_pred + gain * residual;
                cov = (Matrix2::identity() - gain * h) * p_pred;
            } else {
                state = x_pred;
                cov = p_pred;
            }
            filtered_x.push(state);
            filtered_p.push(cov);
        }

        let mut smoothed = vec![0.0; n];
        let mut next = filtered_x[n - 1];
        smoothed[n - 1] = next.x;
        for t in (0..n - 1).rev() {
            let p_next_inv = self.invert(&predicted_p[t + 1], t + 1)?;
            let gain = filtered_p[t] * f.transpose() * p_next_inv;
            next = filtered_x[t] + gain * (next - predicted_x[t + 1]);
            smoothed[t] = next.x;
        }

        if smoothed.iter().any(|v| !v.is_finite()) {
            return Err(RepairError::Numerical { step: 0 });
        }
        Ok(smoothed)
    }

    fn invert(&self, m: &Matrix2<f64>, step: usize) -> Result<Matrix2<f64>, RepairError> {
        m.try_inverse()
            .or_else(|| {
                tracing::debug!(step, "singular predicted covariance, regularizing");
                (m + Matrix2::identity() * self.params.regularization).try_inverse()
            })
            .filter(|inv| inv.iter().all(|v| v.is_finite()))
            .ok_or(RepairError::Numerical { step })
    }

    /// Smooth the listed channels of `track`, leaving the others as they are.
    ///
    /// Return
    /// ----------
    /// * A new [`Track`], or the first [`RepairError::Numerical`] raised by a channel.
    pub fn smooth_track(&self, track: &Track, channels: &[usize]) -> Result<Track, RepairError> {
        let mut out = track.clone();
        for &channel in channels {
            let series: Vec<f64> = track.channel(channel).iter().copied().collect();
            let smoothed = self.smooth(&series)?;
            out.values_mut()
                .column_mut(channel)
                .iter_mut()
                .zip(smoothed)
                .for_each(|(dst, v)| *dst = v);
        }
        tracing::debug!(n_channels = channels.len(), "kalman smoothing done");
        Ok(out)
    }
}
