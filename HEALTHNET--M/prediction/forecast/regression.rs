use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Ridge added to the normal equations so rank-deficient designs still solve.
const RIDGE: f64 = 1e-8;
const PIVOT_EPS: f64 = 1e-300;

/// All monomials of degree 1..=`degree` over the inputs, without a bias
/// column. Terms of equal degree are ordered lexicographically by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolynomialExpansion {
    inputs: usize,
    terms: Vec<Vec<usize>>,
}

impl PolynomialExpansion {
    /// Builds the term list.
    #[must_use]
    pub fn new(inputs: usize, degree: usize) -> Self {
        let mut terms = Vec::new();
        let mut frontier: Vec<Vec<usize>> = vec![Vec::new()];
        for _ in 0..degree {
            let mut next = Vec::new();
            for term in &frontier {
                let start = term.last().copied().unwrap_or(0);
                for idx in start..inputs {
                    let mut grown = term.clone();
                    grown.push(idx);
                    next.push(grown);
                }
            }
            terms.extend(next.iter().cloned());
            frontier = next;
        }
        Self { inputs, terms }
    }

    /// Width of the expanded row.
    #[must_use]
    pub fn output_width(&self) -> usize {
        self.terms.len()
    }

    /// Expected input width.
    #[must_use]
    pub const fn input_width(&self) -> usize {
        self.inputs
    }

    /// Expands one row of [`PolynomialExpansion::input_width`] values.
    #[must_use]
    pub fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        debug_assert_eq!(row.len(), self.inputs, "row width does not match the expansion");
        self.terms
            .iter()
            .map(|term| term.iter().map(|&idx| row.get(idx).copied().unwrap_or(0.0)).product())
            .collect()
    }

    /// Expands every row.
    #[must_use]
    pub fn transform(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.terms.len()));
        for (src, mut dst) in x.outer_iter().zip(out.outer_iter_mut()) {
            let row = src.to_vec();
            for (slot, value) in dst.iter_mut().zip(self.transform_row(&row)) {
                *slot = value;
            }
        }
        out
    }
}

/// Least-squares linear model with intercept.
///
/// Columns are standardized internally. Over-determined systems solve the
/// primal normal equations; under-determined ones solve the dual system so
/// that the minimum-norm solution is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsModel {
    intercept: f64,
    coefficients: Array1<f64>,
}

impl OlsModel {
    /// Fits `y ≈ intercept + x · coefficients`.
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<Self, TrainingError> {
        let (n, p) = x.dim();
        if n == 0 || n != y.len() {
            return Err(TrainingError::Numerical(format!(
                "design has {n} rows for {} targets",
                y.len()
            )));
        }
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(p));
        let y_mean = y.mean().unwrap_or(0.0);
        let scales = x.std_axis(Axis(0), 0.0).mapv(|s| if s > 1e-12 { s } else { 0.0 });
        let mut z = &x - &x_mean;
        for (mut column, &scale) in z.axis_iter_mut(Axis(1)).zip(scales.iter()) {
            if scale > 0.0 {
                column.mapv_inplace(|v| v / scale);
            } else {
                column.fill(0.0);
            }
        }
        let yc = &y - y_mean;
        let ridge = RIDGE * n as f64;

        let beta_scaled = if n >= p {
            let mut gram = z.t().dot(&z);
            gram.diag_mut().mapv_inplace(|v| v + ridge);
            solve(gram, z.t().dot(&yc))?
        } else {
            let mut gram = z.dot(&z.t());
            gram.diag_mut().mapv_inplace(|v| v + ridge);
            z.t().dot(&solve(gram, yc)?)
        };

        let coefficients: Array1<f64> = beta_scaled
            .iter()
            .zip(scales.iter())
            .map(|(b, &s)| if s > 0.0 { b / s } else { 0.0 })
            .collect();
        let intercept = y_mean - coefficients.dot(&x_mean);
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TrainingError::Numerical("non-finite regression coefficients".into()));
        }
        Ok(Self {
            intercept,
            coefficients,
        })
    }

    /// Evaluates one expanded row.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + row
                .iter()
                .zip(self.coefficients.iter())
                .map(|(x, c)| x * c)
                .sum::<f64>()
    }

    /// Evaluates every row.
    #[must_use]
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.dot(&self.coefficients) + self.intercept
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, TrainingError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < PIVOT_EPS || !a[[pivot, col]].is_finite() {
            return Err(TrainingError::Numerical("singular normal equations".into()));
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut out = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * out[k]).sum();
        out[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(out)
}

/// Mean squared error.
#[must_use]
pub fn mean_squared_error(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / truth.len() as f64
}

/// Coefficient of determination. A constant target scores 1 when fitted
/// exactly and 0 otherwise.
#[must_use]
pub fn r2_score(truth: &[f64], predicted: &[f64]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let ss_res: f64 = truth.iter().zip(predicted).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        if ss_res <= f64::EPSILON {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}
