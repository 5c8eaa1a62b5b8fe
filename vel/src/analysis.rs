//! Statistical summaries of the joined table: the elasticity of VEL with respect to total health
//! spending, and the decomposition of total spending variance into sector contributions.

use itertools::izip;
use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use strum::IntoEnumIterator;

use crate::error::{VelError, VelResult};
use crate::indicators::{normalize_expenditure, Sector};
use crate::COL;

/// Two-sided confidence level reported for the slope.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Ordinary least squares fit of `y = intercept + slope * x`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub n: usize,
    pub intercept: f64,
    /// Elasticity of VEL with respect to total spending
    pub slope: f64,
    pub slope_std_error: f64,
    /// Residual degrees of freedom, `n - 2`
    pub degrees_of_freedom: usize,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl Regression {
    pub fn ci_width(&self) -> f64 {
        self.ci_upper - self.ci_lower
    }
}

/// Fit OLS of `y` on `x` with a `CONFIDENCE_LEVEL` Student t interval for the slope.
pub fn ols(x: &[f64], y: &[f64]) -> VelResult<Regression> {
    if x.len() != y.len() {
        return Err(VelError::InsufficientData(format!(
            "regressor and response lengths differ ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    if n < 3 {
        return Err(VelError::InsufficientData(format!(
            "regression needs at least 3 observations, got {n}"
        )));
    }
    let n_f = n as f64;
    let mean_x = x.iter().sum::<f64>() / n_f;
    let mean_y = y.iter().sum::<f64>() / n_f;
    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let sxy: f64 = izip!(x, y).map(|(xi, yi)| (xi - mean_x) * (yi - mean_y)).sum();
    if !sxx.is_finite() || sxx <= 0.0 {
        return Err(VelError::InsufficientData(
            "regressor has no variance".into(),
        ));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let rss: f64 = izip!(x, y)
        .map(|(xi, yi)| (yi - intercept - slope * xi).powi(2))
        .sum();
    let degrees_of_freedom = n - 2;
    let sigma2 = rss / degrees_of_freedom as f64;
    let slope_std_error = (sigma2 / sxx).sqrt();

    let t = StudentsT::new(0.0, 1.0, degrees_of_freedom as f64)
        .map_err(|e| VelError::InsufficientData(format!("invalid t distribution: {e}")))?
        .inverse_cdf(1.0 - (1.0 - CONFIDENCE_LEVEL) / 2.0);
    debug!("t critical value with {degrees_of_freedom} df: {t}");

    Ok(Regression {
        n,
        intercept,
        slope,
        slope_std_error,
        degrees_of_freedom,
        ci_lower: slope - t * slope_std_error,
        ci_upper: slope + t * slope_std_error,
    })
}

/// Regress `mean_log_vel` on `log_total_spending` over the joined rows where both are present.
pub fn regress(joined: &DataFrame) -> VelResult<Regression> {
    let complete = joined
        .clone()
        .lazy()
        .filter(
            col(COL::LOG_TOTAL_SPENDING)
                .is_not_null()
                .and(col(COL::MEAN_LOG_VEL).is_not_null()),
        )
        .collect()?;
    let x: Vec<f64> = complete
        .column(COL::LOG_TOTAL_SPENDING)?
        .f64()?
        .into_no_null_iter()
        .collect();
    let y: Vec<f64> = complete
        .column(COL::MEAN_LOG_VEL)?
        .f64()?
        .into_no_null_iter()
        .collect();
    let regression = ols(&x, &y)?;
    info!(
        "Elasticity of VEL w.r.t. spending: {:.4} (SE {:.4}, 95% CI [{:.4}, {:.4}], n = {})",
        regression.slope,
        regression.slope_std_error,
        regression.ci_lower,
        regression.ci_upper,
        regression.n
    );
    Ok(regression)
}

/// Sector covariance normalized by the variance of total spending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CovarianceDecomposition {
    /// Complete-case rows used
    pub n: usize,
    /// Sample covariance of (public, private, non_profit), row-major
    pub covariance: [[f64; 3]; 3],
    /// `covariance` divided by the sum of all its entries
    pub normalized: [[f64; 3]; 3],
}

impl CovarianceDecomposition {
    /// Sum of every normalized entry; 1.0 up to rounding.
    pub fn total(&self) -> f64 {
        self.normalized.iter().flatten().sum()
    }
}

/// Decompose the variance of total spending into within- and between-sector contributions.
///
/// The 3×3 sample covariance of the sectors over complete-case expenditure rows is divided
/// entry-wise by its grand total (which equals the variance of the summed spending). This is
/// not a correlation matrix: rows and columns are not normalized separately.
pub fn covariance_decomposition(expenditure: &DataFrame) -> VelResult<CovarianceDecomposition> {
    let complete = normalize_expenditure(expenditure)?
        .filter(
            col(COL::PUBLIC)
                .is_not_null()
                .and(col(COL::PRIVATE).is_not_null())
                .and(col(COL::NON_PROFIT).is_not_null()),
        )
        .collect()?;
    let columns: Vec<Vec<f64>> = Sector::iter()
        .map(|sector| -> VelResult<Vec<f64>> {
            Ok(complete
                .column(sector.column())?
                .f64()?
                .into_no_null_iter()
                .collect())
        })
        .collect::<VelResult<_>>()?;

    let n = complete.height();
    if n < 2 {
        return Err(VelError::InsufficientData(format!(
            "covariance needs at least 2 complete expenditure rows, got {n}"
        )));
    }
    let means: Vec<f64> = columns
        .iter()
        .map(|values| values.iter().sum::<f64>() / n as f64)
        .collect();

    let mut covariance = [[0.0; 3]; 3];
    for (i, row) in covariance.iter_mut().enumerate() {
        for (j, entry) in row.iter_mut().enumerate() {
            *entry = izip!(&columns[i], &columns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum::<f64>()
                / (n - 1) as f64;
        }
    }

    let grand_total: f64 = covariance.iter().flatten().sum();
    if !grand_total.is_finite() || grand_total == 0.0 {
        return Err(VelError::InsufficientData(
            "total spending has no variance".into(),
        ));
    }
    let normalized = covariance.map(|row| row.map(|entry| entry / grand_total));
    debug!("Normalized sector covariance: {normalized:?}");
    Ok(CovarianceDecomposition {
        n,
        covariance,
        normalized,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fixed disturbance pattern, scaled per test.
    fn disturbance(i: usize) -> f64 {
        ((i * 7919) % 13) as f64 - 6.0
    }

    #[test]
    fn ols_should_recover_exact_line() -> anyhow::Result<()> {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|xi| 2.0 + 0.5 * xi).collect();
        let fit = ols(&x, &y)?;
        assert!((fit.slope - 0.5).abs() < 1e-12);
        assert!((fit.intercept - 2.0).abs() < 1e-12);
        assert!(fit.slope_std_error < 1e-9);
        assert_eq!(fit.degrees_of_freedom, 8);
        Ok(())
    }

    #[test]
    fn ols_should_match_reference_values() -> anyhow::Result<()> {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = ols(&x, &y)?;
        // slope = 6 / 10, intercept = 4.0 - 0.6 * 3, rss = 2.4, se = sqrt(0.8 / 10)
        assert!((fit.slope - 0.6).abs() < 1e-12);
        assert!((fit.intercept - 2.2).abs() < 1e-12);
        assert!((fit.slope_std_error - 0.08f64.sqrt()).abs() < 1e-12);
        // t(0.975, 3) = 3.182446
        let half_width = fit.ci_width() / 2.0;
        assert!((half_width - 3.182_446 * 0.08f64.sqrt()).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn confidence_interval_should_widen_with_noise() -> anyhow::Result<()> {
        let x: Vec<f64> = (0..40).map(|i| 3.0 + 0.1 * f64::from(i)).collect();
        let mut previous_width = 0.0;
        for noise in [0.05, 0.1, 0.5, 1.0, 2.0] {
            let y: Vec<f64> = x
                .iter()
                .enumerate()
                .map(|(i, xi)| 1.0 + 0.8 * xi + noise * disturbance(i))
                .collect();
            let fit = ols(&x, &y)?;
            assert!(fit.ci_lower < fit.slope && fit.slope < fit.ci_upper);
            assert!(
                fit.ci_width() > previous_width,
                "width {} at noise {noise} should exceed {previous_width}",
                fit.ci_width()
            );
            previous_width = fit.ci_width();
        }
        Ok(())
    }

    #[test]
    fn degenerate_regressions_should_fail() {
        assert!(matches!(
            ols(&[1.0, 2.0], &[1.0, 2.0]),
            Err(VelError::InsufficientData(_))
        ));
        assert!(matches!(
            ols(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(VelError::InsufficientData(_))
        ));
    }

    #[test]
    fn regress_should_use_complete_rows_only() -> anyhow::Result<()> {
        let joined = df!(
            COL::MEAN_LOG_VEL => &[Some(1.0), Some(2.0), Some(3.0), Some(4.0), None],
            COL::LOG_TOTAL_SPENDING => &[Some(1.0), Some(2.0), Some(3.0), None, Some(5.0)]
        )?;
        let fit = regress(&joined)?;
        assert_eq!(fit.n, 3);
        assert!((fit.slope - 1.0).abs() < 1e-12);
        Ok(())
    }

    fn expenditure() -> DataFrame {
        df!(
            COL::YEAR => &[2010, 2011, 2012, 2013, 2014, 2015],
            COL::COUNTRY_CODE => &["KE", "KE", "GH", "GH", "IN", "IN"],
            COL::PUBLIC => &[Some(10.0), Some(12.0), Some(30.0), Some(33.0), Some(20.0), None],
            COL::PRIVATE => &[Some(5.0), Some(9.0), Some(4.0), Some(7.0), Some(15.0), Some(1.0)],
            COL::NON_PROFIT => &[Some(1.0), Some(0.5), Some(2.0), Some(2.5), Some(0.2), Some(3.0)]
        )
        .unwrap()
    }

    #[test]
    fn decomposition_should_sum_to_one() -> anyhow::Result<()> {
        let decomposition = covariance_decomposition(&expenditure())?;
        assert_eq!(decomposition.n, 5);
        assert!((decomposition.total() - 1.0).abs() < 1e-9);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (decomposition.normalized[i][j] - decomposition.normalized[j][i]).abs()
                        < 1e-12
                );
            }
        }
        Ok(())
    }

    #[test]
    fn decomposition_should_match_variance_of_total() -> anyhow::Result<()> {
        let decomposition = covariance_decomposition(&expenditure())?;
        let totals: [f64; 5] = [16.0, 21.5, 36.0, 42.5, 35.2];
        let mean = totals.iter().sum::<f64>() / 5.0;
        let variance = totals.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / 4.0;
        let grand_total: f64 = decomposition.covariance.iter().flatten().sum();
        assert!((grand_total - variance).abs() < 1e-9);
        // Not a correlation matrix: the diagonal is not all ones
        assert!(decomposition.normalized[0][0] < 1.0);
        Ok(())
    }

    #[test]
    fn degenerate_decompositions_should_fail() {
        let single = expenditure().head(Some(1));
        assert!(matches!(
            covariance_decomposition(&single),
            Err(VelError::InsufficientData(_))
        ));
        let constant = df!(
            COL::YEAR => &[2010, 2011],
            COL::COUNTRY_CODE => &["KE", "KE"],
            COL::PUBLIC => &[1.0, 1.0],
            COL::PRIVATE => &[2.0, 2.0],
            COL::NON_PROFIT => &[3.0, 3.0]
        )
        .unwrap();
        assert!(matches!(
            covariance_decomposition(&constant),
            Err(VelError::InsufficientData(_))
        ));
    }
}
