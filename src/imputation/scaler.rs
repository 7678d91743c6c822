//! Column standardization that ignores missing (`NaN`) entries.
use nalgebra::{DMatrix, DVector};

/// Per-column mean and scale, fitted on observed entries only.
///
/// The scale is the population standard deviation; a constant column gets a scale of `1`
/// so that the transform stays invertible. A column without any observation has a `NaN` mean.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: DVector<f64>,
    scale: DVector<f64>,
}

impl StandardScaler {
    pub fn fit(data: &DMatrix<f64>) -> Self {
        let n_cols = data.ncols();
        let mut mean = DVector::from_element(n_cols, f64::NAN);
        let mut scale = DVector::from_element(n_cols, 1.0);

        for (c, column) in data.column_iter().enumerate() {
            let (count, sum) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0usize, 0.0), |(n, s), v| (n + 1, s + v));
            if count == 0 {
                continue;
            }
            let m = sum / count as f64;
            let var = column
                .iter()
                .filter(|v| !v.is_nan())
                .map(|v| (v - m).powi(2))
                .sum::<f64>()
                / count as f64;
            mean[c] = m;
            if var > 0.0 {
                scale[c] = var.sqrt();
            }
        }
        StandardScaler { mean, scale }
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &DVector<f64> {
        &self.scale
    }

    /// `(x - mean) / scale`, column-wise. `NaN` stays `NaN`.
    pub fn transform(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = data.clone();
        for (c, mut column) in out.column_iter_mut().enumerate() {
            let (m, s) = (self.mean[c], self.scale[c]);
            column.apply(|v| *v = (*v - m) / s);
        }
        out
    }

    /// `x * scale + mean`, column-wise.
    pub fn inverse_transform(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = data.clone();
        for (c, mut column) in out.column_iter_mut().enumerate() {
            let (m, s) = (self.mean[c], self.scale[c]);
            column.apply(|v| *v = *v * s + m);
        }
        out
    }
}

#[cfg(test)]
mod scaler_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_ignores_nan() {
        let data = DMatrix::from_row_slice(4, 2, &[1.0, 5.0, f64::NAN, 5.0, 3.0, 5.0, 5.0, 5.0]);
        let scaler = StandardScaler::fit(&data);
        assert_relative_eq!(scaler.mean()[0], 3.0);
        assert_relative_eq!(scaler.scale()[0], (8.0f64 / 3.0).sqrt());
        // constant column keeps a unit scale
        assert_eq!(scaler.scale()[1], 1.0);

        let z = scaler.transform(&data);
        assert!(z[(1, 0)].is_nan());
        assert_relative_eq!(z[(0, 1)], 0.0);

        let back = scaler.inverse_transform(&z);
        assert_relative_eq!(back[(3, 0)], 5.0, epsilon = 1e-12);
    }
}
