//! # Iterative multivariate imputation
//!
//! Fills the gaps that short-gap interpolation leaves behind by exploiting the strong
//! correlations between body-part coordinates of the same animal.
//!
//! ## Algorithm
//!
//! Given a `rows × features` matrix with `NaN` holes:
//!
//! 1. **Standardize** every feature on its observed entries ([`scaler::StandardScaler`]).
//! 2. **Initial fill** of each hole with its column mean (`0` in standardized units).
//! 3. **Predictor selection** – for each incomplete feature, keep the
//!    `n_nearest_features` other features with the highest absolute Pearson correlation
//!    on the initially filled data.
//! 4. **Round robin** – incomplete features, in ascending order of missing count, are each
//!    regressed (ridge regression with intercept) on the rows where they are observed and their
//!    holes are overwritten with the predictions. Updates are visible to the next feature.
//! 5. **Stopping rule** – stop after the first round where
//!    `max |X_t − X_{t−1}| < tol · max |X_observed|`, or after `max_iter` rounds.
//! 6. **Unscale** and copy the observed entries back bit for bit.
//!
//! Complete features are never modified; they only serve as predictors.
//!
//! ## Errors
//!
//! Any sub-model failure is a hard error for the whole call
//! ([`RepairError::ImputationFailed`]): a feature without a single observation, or normal
//! equations that cannot be factorized.
//!
//! ## See also
//! ------------
//! * [`repair`](crate::repair::repair) – Chooses which rows are imputed.
use std::fmt;

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use smallvec::SmallVec;

use crate::{
    constants::{
        DEFAULT_IMPUTER_MAX_ITER, DEFAULT_IMPUTER_TOL, DEFAULT_N_NEAREST_FEATURES,
        DEFAULT_RIDGE_ALPHA,
    },
    repair_errors::RepairError,
};

pub mod scaler;

use scaler::StandardScaler;

/// Predictor columns of one feature.
type Predictors = SmallVec<[usize; DEFAULT_N_NEAREST_FEATURES]>;

/// Tuning of the [`IterativeImputer`].
///
/// Defaults
/// -----------------
/// * `max_iter`: 100
/// * `n_nearest_features`: 8
/// * `tol`: 0.1
/// * `ridge_alpha`: 1e-3
#[derive(Debug, Clone, PartialEq)]
pub struct ImputerParams {
    /// Maximum number of round-robin passes.
    pub max_iter: usize,
    /// Maximum number of predictors per regression.
    pub n_nearest_features: usize,
    /// Relative stopping tolerance.
    pub tol: f64,
    /// Ridge penalty on standardized predictors.
    pub ridge_alpha: f64,
}

impl Default for ImputerParams {
    fn default() -> Self {
        ImputerParams {
            max_iter: DEFAULT_IMPUTER_MAX_ITER,
            n_nearest_features: DEFAULT_N_NEAREST_FEATURES,
            tol: DEFAULT_IMPUTER_TOL,
            ridge_alpha: DEFAULT_RIDGE_ALPHA,
        }
    }
}

impl ImputerParams {
    pub fn builder() -> ImputerParamsBuilder {
        ImputerParamsBuilder::default()
    }
}

/// Builder for [`ImputerParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct ImputerParamsBuilder {
    params: ImputerParams,
}

impl ImputerParamsBuilder {
    pub fn max_iter(mut self, v: usize) -> Self {
        self.params.max_iter = v;
        self
    }
    pub fn n_nearest_features(mut self, v: usize) -> Self {
        self.params.n_nearest_features = v;
        self
    }
    pub fn tol(mut self, v: f64) -> Self {
        self.params.tol = v;
        self
    }
    pub fn ridge_alpha(mut self, v: f64) -> Self {
        self.params.ridge_alpha = v;
        self
    }

    /// Validate and return the parameters.
    ///
    /// * `max_iter ≥ 1`, `n_nearest_features ≥ 1`
    /// * `tol ≥ 0`, `ridge_alpha > 0` (keeps the normal equations positive definite)
    pub fn build(self) -> Result<ImputerParams, RepairError> {
        let p = &self.params;
        if p.max_iter == 0 {
            return Err(RepairError::InvalidRepairParameter(
                "max_iter must be >= 1".into(),
            ));
        }
        if p.n_nearest_features == 0 {
            return Err(RepairError::InvalidRepairParameter(
                "n_nearest_features must be >= 1".into(),
            ));
        }
        if !(p.tol >= 0.0) {
            return Err(RepairError::InvalidRepairParameter(
                "tol must be >= 0".into(),
            ));
        }
        if !(p.ridge_alpha > 0.0) {
            return Err(RepairError::InvalidRepairParameter(
                "ridge_alpha must be > 0".into(),
            ));
        }
        Ok(self.params)
    }
}

/// How a call to [`IterativeImputer::impute_with_stats`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImputationStats {
    /// Round-robin passes performed
    pub n_iter: usize,
    /// The stopping rule fired before `max_iter`
    pub converged: bool,
    /// Entries filled
    pub n_imputed: usize,
}

impl fmt::Display for ImputationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "imputed {} entries in {} passes ({})",
            self.n_imputed,
            self.n_iter,
            if self.converged {
                "converged"
            } else {
                "iteration cap reached"
            }
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct IterativeImputer {
    params: ImputerParams,
}

impl IterativeImputer {
    pub fn new(params: ImputerParams) -> Self {
        IterativeImputer { params }
    }

    pub fn params(&self) -> &ImputerParams {
        &self.params
    }

    /// Fill every `NaN` of `data`. See the [module docs](crate::imputation) for the algorithm.
    pub fn impute(&self, data: &DMatrix<f64>) -> Result<DMatrix<f64>, RepairError> {
        self.impute_with_stats(data).map(|(filled, _)| filled)
    }

    /// Same as [`impute`](Self::impute), also reporting iteration statistics.
    pub fn impute_with_stats(
        &self,
        data: &DMatrix<f64>,
    ) -> Result<(DMatrix<f64>, ImputationStats), RepairError> {
        let missing = data.map(|v| v.is_nan());
        let missing_counts: Vec<usize> = missing
            .column_iter()
            .map(|col| col.iter().filter(|&&m| m).count())
            .collect();

        if let Some(column) = missing_counts
            .iter()
            .position(|&n| n == data.nrows() && n > 0)
        {
            return Err(RepairError::ImputationFailed {
                column,
                reason: "feature has no observed value".into(),
            });
        }

        // ascending missing count, ties by column index
        let targets = (0..data.ncols())
            .filter(|&c| missing_counts[c] > 0)
            .sorted_by_key(|&c| (missing_counts[c], c))
            .collect_vec();
        let n_imputed: usize = missing_counts.iter().sum();
        if targets.is_empty() {
            return Ok((
                data.clone(),
                ImputationStats {
                    n_iter: 0,
                    converged: true,
                    n_imputed: 0,
                },
            ));
        }

        let scaler = StandardScaler::fit(data);
        let mut x = scaler.transform(data);
        let observed_max = x
            .iter()
            .filter(|v| !v.is_nan())
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let threshold = self.params.tol * observed_max;

        x.apply(|v| {
            if v.is_nan() {
                *v = 0.0
            }
        });

        let correlation = abs_correlation(&x);
        let predictors: Vec<Predictors> = targets
            .iter()
            .map(|&c| self.select_predictors(&correlation, c))
            .collect();

        let mut n_iter = 0;
        let mut converged = false;
        while n_iter < self.params.max_iter {
            n_iter += 1;
            let mut delta = 0.0f64;
            for (&target, preds) in targets.iter().zip(&predictors) {
                delta = delta.max(self.fit_predict(&mut x, &missing, target, preds)?);
            }
            if delta < threshold {
                converged = true;
                break;
            }
        }

        if converged {
            tracing::debug!(n_iter, n_imputed, "iterative imputation converged");
        } else {
            tracing::debug!(
                n_iter,
                n_imputed,
                "iterative imputation stopped at the iteration cap"
            );
        }

        let mut filled = scaler.inverse_transform(&x);
        for (idx, &is_missing) in missing.iter().enumerate() {
            if !is_missing {
                filled[idx] = data[idx];
            }
        }

        Ok((
            filled,
            ImputationStats {
                n_iter,
                converged,
                n_imputed,
            },
        ))
    }

    /// The `n_nearest_features` columns most correlated with `target`.
    fn select_predictors(&self, correlation: &DMatrix<f64>, target: usize) -> Predictors {
        (0..correlation.ncols())
            .filter(|&j| j != target)
            .sorted_by(|&a, &b| {
                correlation[(target, b)]
                    .total_cmp(&correlation[(target, a)])
                    .then(a.cmp(&b))
            })
            .take(self.params.n_nearest_features)
            .collect()
    }

    /// Regress `target` on `predictors` over its observed rows and overwrite its missing rows.
    ///
    /// Return
    /// ----------
    /// * The largest absolute change written into `x`.
    fn fit_predict(
        &self,
        x: &mut DMatrix<f64>,
        missing: &DMatrix<bool>,
        target: usize,
        predictors: &[usize],
    ) -> Result<f64, RepairError> {
        let (train_rows, fill_rows): (Vec<usize>, Vec<usize>) =
            (0..x.nrows()).partition(|&r| !missing[(r, target)]);

        let n_train = train_rows.len() as f64;
        let y_mean = train_rows.iter().map(|&r| x[(r, target)]).sum::<f64>() / n_train;

        // empty predictor set degenerates to the mean
        let p = predictors.len();
        let x_mean = DVector::from_iterator(
            p,
            predictors
                .iter()
                .map(|&j| train_rows.iter().map(|&r| x[(r, j)]).sum::<f64>() / n_train),
        );
        let beta = if p == 0 {
            DVector::zeros(0)
        } else {
            let design = DMatrix::from_fn(train_rows.len(), p, |i, k| {
                x[(train_rows[i], predictors[k])] - x_mean[k]
            });
            let response = DVector::from_iterator(
                train_rows.len(),
                train_rows.iter().map(|&r| x[(r, target)] - y_mean),
            );

            let gram = design.tr_mul(&design) + DMatrix::identity(p, p) * self.params.ridge_alpha;
            let rhs = design.tr_mul(&response);
            gram.cholesky()
                .ok_or_else(|| RepairError::ImputationFailed {
                    column: target,
                    reason: "normal equations are not positive definite".into(),
                })?
                .solve(&rhs)
        };
        if beta.iter().any(|b| !b.is_finite()) {
            return Err(RepairError::ImputationFailed {
                column: target,
                reason: "regression produced non-finite coefficients".into(),
            });
        }

        let mut delta = 0.0f64;
        for r in fill_rows {
            let value = y_mean
                + predictors
                    .iter()
                    .enumerate()
                    .map(|(k, &j)| (x[(r, j)] - x_mean[k]) * beta[k])
                    .sum::<f64>();
            delta = delta.max((value - x[(r, target)]).abs());
            x[(r, target)] = value;
        }
        Ok(delta)
    }
}

/// Absolute Pearson correlation between columns; constant columns correlate with nothing.
fn abs_correlation(x: &DMatrix<f64>) -> DMatrix<f64> {
    let n = x.nrows().max(1) as f64;
    let mut centered = x.clone();
    for mut column in centered.column_iter_mut() {
        let m = column.sum() / n;
        column.add_scalar_mut(-m);
    }
    let norms: Vec<f64> = centered.column_iter().map(|c| c.norm()).collect();
    let cov = centered.tr_mul(&centered);
    DMatrix::from_fn(x.ncols(), x.ncols(), |i, j| {
        let denom = norms[i] * norms[j];
        if denom > 0.0 {
            (cov[(i, j)] / denom).abs()
        } else {
            0.0
        }
    })
}

#[cfg(test)]
mod imputation_test {
    use super::*;
    use approx::assert_relative_eq;

    /// Four perfectly collinear features: x, 2x + 1, -x + 3, 0.5x.
    fn collinear(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(n, 4, |r, c| {
            let t = (r as f64 * 0.37).sin() * 10.0 + r as f64 * 0.1;
            match c {
                0 => t,
                1 => 2.0 * t + 1.0,
                2 => -t + 3.0,
                _ => 0.5 * t,
            }
        })
    }

    #[test]
    fn test_recovers_linear_relationship() {
        let truth = collinear(60);
        let mut holed = truth.clone();
        for r in 20..26 {
            holed[(r, 1)] = f64::NAN;
        }
        holed[(40, 3)] = f64::NAN;

        let (filled, stats) = IterativeImputer::default()
            .impute_with_stats(&holed)
            .unwrap();
        assert_eq!(stats.n_imputed, 7);
        assert!(stats.n_iter >= 1);
        for r in 20..26 {
            assert_relative_eq!(filled[(r, 1)], truth[(r, 1)], epsilon = 1e-2);
        }
        assert_relative_eq!(filled[(40, 3)], truth[(40, 3)], epsilon = 1e-2);
    }

    #[test]
    fn test_observed_entries_untouched() {
        let truth = collinear(30);
        let mut holed = truth.clone();
        holed[(5, 0)] = f64::NAN;
        holed[(6, 2)] = f64::NAN;
        let filled = IterativeImputer::default().impute(&holed).unwrap();
        for (idx, v) in holed.iter().enumerate() {
            if !v.is_nan() {
                assert_eq!(filled[idx].to_bits(), v.to_bits());
            }
        }
        assert!(filled.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_complete_input_is_returned_as_is() {
        let truth = collinear(10);
        let (filled, stats) = IterativeImputer::default()
            .impute_with_stats(&truth)
            .unwrap();
        assert_eq!(filled, truth);
        assert_eq!(stats.n_iter, 0);
    }

    #[test]
    fn test_empty_feature_is_an_error() {
        let mut data = collinear(10);
        data.column_mut(2).fill(f64::NAN);
        assert_eq!(
            IterativeImputer::default().impute(&data),
            Err(RepairError::ImputationFailed {
                column: 2,
                reason: "feature has no observed value".into()
            })
        );
    }

    #[test]
    fn test_predictor_cap() {
        let params = ImputerParams::builder().n_nearest_features(2).build().unwrap();
        let imputer = IterativeImputer::new(params);
        let corr = abs_correlation(&collinear(20));
        let preds = imputer.select_predictors(&corr, 0);
        assert_eq!(preds.len(), 2);
        assert!(!preds.contains(&0));
    }

    #[test]
    fn test_builder_validation() {
        assert!(ImputerParams::builder().max_iter(0).build().is_err());
        assert!(ImputerParams::builder().ridge_alpha(0.0).build().is_err());
        assert!(ImputerParams::builder().tol(f64::NAN).build().is_err());
        assert!(ImputerParams::builder().tol(0.0).build().is_ok());
    }
}
