//! Per-series model fitting and daily projection.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, TrainingError};

use super::{
    regression::{mean_squared_error, r2_score, OlsModel, PolynomialExpansion},
    series::MonthlyPoint,
    types::{horizon_dates, DiseaseForecast, ModelPerformance, SeriesKey, Trend},
};

const CONFIDENCE_CAP: f64 = 0.9;
const CONFIDENCE_LIFT: f64 = 0.3;

/// Fitted regression for one (district, disease) series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesModel {
    /// Registry key.
    pub key: SeriesKey,
    expansion: PolynomialExpansion,
    ols: OlsModel,
    /// In-sample fit.
    pub performance: ModelPerformance,
    /// Last observed month; the base of every projected row.
    pub last: MonthlyPoint,
    /// Direction of the monthly case series.
    pub trend: Trend,
    /// Monthly points used in the fit.
    pub points: usize,
}

impl SeriesModel {
    /// Fits the polynomial regression of monthly cases on the monthly
    /// features.
    pub fn fit(
        key: SeriesKey,
        points: &[MonthlyPoint],
        degree: usize,
    ) -> Result<Self, TrainingError> {
        let Some(last) = points.last().copied() else {
            return Err(TrainingError::NoEligibleSeries(1));
        };
        let expansion = PolynomialExpansion::new(5, degree);
        let raw: Vec<f64> = points.iter().flat_map(MonthlyPoint::features).collect();
        let raw = Array2::from_shape_vec((points.len(), expansion.input_width()), raw)
            .map_err(|err| TrainingError::Numerical(err.to_string()))?;
        let x = expansion.transform(raw.view());
        let y: Array1<f64> = points.iter().map(|p| p.cases).collect();
        let ols = OlsModel::fit(x.view(), y.view())?;
        let fitted = ols.predict(x.view()).to_vec();
        let truth = y.to_vec();
        Ok(Self {
            key,
            expansion,
            ols,
            performance: ModelPerformance {
                mse: mean_squared_error(&truth, &fitted),
                r2: r2_score(&truth, &fitted),
            },
            last,
            trend: Trend::from_series(&truth),
            points: points.len(),
        })
    }

    /// `min(0.9, r2 + 0.3)`, floored at zero.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        (self.performance.r2 + CONFIDENCE_LIFT).clamp(0.0, CONFIDENCE_CAP)
    }

    /// Projects `days` daily values starting at `start`.
    pub fn project(&self, start: NaiveDate, days: u32) -> Result<DiseaseForecast, InferenceError> {
        let dates = horizon_dates(start, days);
        let ramp = ramp(self.trend, dates.len());
        let mut predicted_cases = Vec::with_capacity(dates.len());
        for (date, factor) in dates.iter().zip(ramp) {
            let row = self.expansion.transform_row(&seasonal_row(&self.last, *date));
            let value = self.ols.predict_row(&row) * factor;
            if !value.is_finite() {
                return Err(InferenceError::NonFiniteProjection(self.key.to_string()));
            }
            predicted_cases.push(value.max(0.0));
        }
        Ok(DiseaseForecast {
            disease: self.key.disease.clone(),
            dates,
            predicted_cases,
            trend: self.trend,
            confidence: self.confidence(),
            model_performance: self.performance,
        })
    }
}

/// Feature row for a future day: the last observed month shifted by a
/// sinusoid over the calendar month of `date`.
#[must_use]
pub fn seasonal_row(last: &MonthlyPoint, date: NaiveDate) -> [f64; 5] {
    let month = f64::from(date.month());
    let phase = 2.0 * PI * month / 12.0;
    [
        month,
        last.temperature + 5.0 * phase.sin(),
        last.humidity + 10.0 * phase.cos(),
        last.rainfall * 0.3f64.mul_add(phase.sin(), 1.0),
        last.water_quality,
    ]
}

/// Linear multiplier from 1.0 to the trend's end value over `len` points.
#[must_use]
pub fn ramp(trend: Trend, len: usize) -> Vec<f64> {
    let end = trend.ramp_end();
    match len {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let step = (end - 1.0) / (len - 1) as f64;
            (0..len).map(|i| step.mul_add(i as f64, 1.0)).collect()
        }
    }
}
