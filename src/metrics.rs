use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegressionMetrics {
    pub samples: usize,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn empty() -> Self {
        Self {
            samples: 0,
            rmse: 0.0,
            mae: 0.0,
            r2: 0.0,
        }
    }
}

/// RMSE, MAE and R² of `predictions` against `targets`.
///
/// Mismatched or empty inputs give `samples == 0`. R² is 0 when the targets
/// have no variance.
pub fn evaluate_regression(predictions: &[f64], targets: &[f64]) -> RegressionMetrics {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return RegressionMetrics::empty();
    }

    let n = targets.len() as f64;
    let mean = targets.iter().sum::<f64>() / n;

    let mut sq_err = 0.0_f64;
    let mut abs_err = 0.0_f64;
    let mut sq_tot = 0.0_f64;
    for (p, y) in predictions.iter().zip(targets) {
        let err = p - y;
        sq_err += err * err;
        abs_err += err.abs();
        sq_tot += (y - mean).powi(2);
    }

    RegressionMetrics {
        samples: targets.len(),
        rmse: (sq_err / n).sqrt(),
        mae: abs_err / n,
        r2: if sq_tot > 0.0 { 1.0 - sq_err / sq_tot } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::evaluate_regression;

    #[test]
    fn perfect_predictions_have_zero_error() {
        let y = vec![1.0, 4.0, 9.0];
        let m = evaluate_regression(&y, &y);
        assert_eq!(m.samples, 3);
        assert!(m.rmse < 1e-12);
        assert!(m.mae < 1e-12);
        assert!((m.r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn mean_predictor_has_zero_r2() {
        let y = vec![2.0, 4.0, 6.0];
        let m = evaluate_regression(&[4.0, 4.0, 4.0], &y);
        assert!(m.r2.abs() < 1e-12);
        assert!((m.mae - 4.0 / 3.0).abs() < 1e-12);
        assert!((m.rmse - (8.0_f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_are_empty() {
        assert_eq!(evaluate_regression(&[1.0], &[1.0, 2.0]).samples, 0);
        assert_eq!(evaluate_regression(&[], &[]).samples, 0);
    }
}
