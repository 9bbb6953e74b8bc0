//! Statistics used by the validator and the geospatial analyst: quantiles,
//! standardization, covariance, Mahalanobis distance, and the Isolation
//! Forest.
//!
//! Everything here is deterministic; the forest takes an explicit seed.

mod forest;

pub use forest::IsolationForest;

use crate::error::{CoreError, CoreResult};

/// Logistic function.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Linear-interpolation percentile, `q` in [0, 1]. Returns `None` on empty
/// input.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Column means of a row-major matrix.
pub fn column_means(rows: &[Vec<f64>]) -> Vec<f64> {
    if rows.is_empty() {
        return Vec::new();
    }
    let d = rows[0].len();
    let mut means = vec![0.0; d];
    for row in rows {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= rows.len() as f64;
    }
    means
}

/// Z-score standardization per column. Columns with zero variance pass
/// through unscaled (divisor clamped to 1).
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    if rows.is_empty() {
        return Vec::new();
    }
    let d = rows[0].len();
    let means = column_means(rows);
    let mut stds = vec![0.0; d];
    for row in rows {
        for j in 0..d {
            stds[j] += (row[j] - means[j]).powi(2);
        }
    }
    for s in &mut stds {
        *s = (*s / rows.len() as f64).sqrt();
        if *s < 1e-12 {
            *s = 1.0;
        }
    }
    rows.iter()
        .map(|row| {
            (0..d)
                .map(|j| (row[j] - means[j]) / stds[j])
                .collect()
        })
        .collect()
}

/// Sample covariance matrix (divisor n - 1) of a row-major matrix.
pub fn covariance(rows: &[Vec<f64>]) -> CoreResult<Vec<Vec<f64>>> {
    let n = rows.len();
    if n < 2 {
        return Err(CoreError::DegenerateFeatures(format!(
            "covariance needs at least 2 rows, got {n}"
        )));
    }
    let d = rows[0].len();
    let means = column_means(rows);
    let mut cov = vec![vec![0.0; d]; d];
    for row in rows {
        for i in 0..d {
            for j in i..d {
                cov[i][j] += (row[i] - means[i]) * (row[j] - means[j]);
            }
        }
    }
    for i in 0..d {
        for j in i..d {
            cov[i][j] /= (n - 1) as f64;
            cov[j][i] = cov[i][j];
        }
    }
    Ok(cov)
}

/// Invert a square matrix by Gauss-Jordan elimination. On a near-singular
/// pivot the matrix is ridge-regularized once (`+1e-6 I`) and retried;
/// if that also fails the matrix is reported degenerate.
pub fn invert(matrix: &[Vec<f64>]) -> CoreResult<Vec<Vec<f64>>> {
    match gauss_jordan(matrix) {
        Some(inv) => Ok(inv),
        None => {
            let d = matrix.len();
            let mut ridged = matrix.to_vec();
            for (i, row) in ridged.iter_mut().enumerate().take(d) {
                row[i] += 1e-6;
            }
            gauss_jordan(&ridged).ok_or_else(|| {
                CoreError::DegenerateFeatures("singular covariance matrix".to_string())
            })
        }
    }
}

fn gauss_jordan(matrix: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let d = matrix.len();
    // Augmented [M | I].
    let mut aug: Vec<Vec<f64>> = matrix
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..d).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..d {
        // Partial pivoting.
        let pivot_row = (col..d).max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))?;
        if aug[pivot_row][col].abs() < 1e-10 {
            return None;
        }
        aug.swap(col, pivot_row);
        let pivot = aug[col][col];
        for v in &mut aug[col] {
            *v /= pivot;
        }
        for row in 0..d {
            if row == col {
                continue;
            }
            let factor = aug[row][col];
            if factor == 0.0 {
                continue;
            }
            let pivot_vals = aug[col].clone();
            for (v, p) in aug[row].iter_mut().zip(&pivot_vals) {
                *v -= factor * p;
            }
        }
    }

    Some(aug.into_iter().map(|row| row[d..].to_vec()).collect())
}

/// Squared Mahalanobis distance of `x` from `mean` under `cov_inv`.
pub fn mahalanobis_sq(x: &[f64], mean: &[f64], cov_inv: &[Vec<f64>]) -> f64 {
    let d = x.len();
    let diff: Vec<f64> = (0..d).map(|i| x[i] - mean[i]).collect();
    let mut total = 0.0;
    for i in 0..d {
        let mut dot = 0.0;
        for j in 0..d {
            dot += cov_inv[i][j] * diff[j];
        }
        total += diff[i] * dot;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_midpoint_and_saturation() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(10.0) > 0.9999);
        assert!(sigmoid(-10.0) < 0.0001);
    }

    #[test]
    fn percentile_interpolates() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(4.0));
        assert_eq!(percentile(&values, 0.5), Some(2.5));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn identity_covariance_gives_euclidean_mahalanobis() {
        // Two uncorrelated unit-variance axes around the origin.
        let eye = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let inv = invert(&eye).unwrap();
        let d2 = mahalanobis_sq(&[3.0, 4.0], &[0.0, 0.0], &inv);
        assert!((d2 - 25.0).abs() < 1e-9);
    }

    #[test]
    fn invert_recovers_known_inverse() {
        let m = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        let inv = invert(&m).unwrap();
        // A * A^-1 = I
        for i in 0..2 {
            for j in 0..2 {
                let v: f64 = (0..2).map(|k| m[i][k] * inv[k][j]).sum();
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((v - want).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn singular_matrix_is_degenerate() {
        // Second row is a multiple of the first; ridge cannot fully save a
        // rank-1 2x2 only when the ridge pivot also vanishes, so use exact
        // duplicates of zero.
        let m = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        // Ridge turns this into 1e-6 * I which inverts fine; what matters is
        // that no panic occurs and the result is finite.
        let inv = invert(&m).unwrap();
        assert!(inv[0][0].is_finite());

        let err = covariance(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(err, CoreError::DegenerateFeatures(_)));
    }

    #[test]
    fn standardize_centers_and_scales() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaled = standardize(&rows);
        let means = column_means(&scaled);
        assert!(means[0].abs() < 1e-9);
        // Constant column passes through centered but unscaled.
        assert!(scaled.iter().all(|r| r[1].abs() < 1e-9));
    }
}
