use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Zero-mean, unit-variance transform fitted on the training split only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Array1<f64>,
    scales: Array1<f64>,
}

impl StandardScaler {
    /// Fits per-column means and population standard deviations. Constant
    /// columns get a scale of one.
    #[must_use]
    pub fn fit(x: ArrayView2<'_, f64>) -> Self {
        let columns = x.ncols();
        let means = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(columns));
        let scales = x.std_axis(Axis(0), 0.0).mapv(|std| {
            if std.is_finite() && std > f64::EPSILON {
                std
            } else {
                1.0
            }
        });
        Self { means, scales }
    }

    /// Number of columns the scaler expects.
    #[must_use]
    pub fn width(&self) -> usize {
        self.means.len()
    }

    /// Scales every row.
    #[must_use]
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        (&x - &self.means) / &self.scales
    }

    /// Scales one row.
    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(self.scales.iter()))
            .map(|(value, (mean, scale))| (value - mean) / scale)
            .collect()
    }
}
