//! Small dense linear algebra used by the regression providers

/// Per-column standardization fitted on a training matrix
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; width];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scales = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        // Constant columns keep unit scale so they standardize to zero
        for s in scales.iter_mut() {
            *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Solve `a · x = b` by Gaussian elimination with partial pivoting
///
/// Returns `None` for a singular system.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let upper = a[col][k];
                a[row][k] -= factor * upper;
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Ridge regression with an unpenalized intercept
///
/// Returns `[intercept, w_1, .., w_d]`.
pub fn ridge(x: &[Vec<f64>], y: &[f64], lambda: f64) -> Option<Vec<f64>> {
    let d = x.first()?.len() + 1;
    let mut xtx = vec![vec![0.0; d]; d];
    let mut xty = vec![0.0; d];

    for (row, target) in x.iter().zip(y) {
        let augmented: Vec<f64> = std::iter::once(1.0).chain(row.iter().copied()).collect();
        for i in 0..d {
            xty[i] += augmented[i] * target;
            for j in i..d {
                xtx[i][j] += augmented[i] * augmented[j];
            }
        }
    }
    for i in 0..d {
        for j in 0..i {
            xtx[i][j] = xtx[j][i];
        }
        if i > 0 {
            xtx[i][i] += lambda;
        }
    }
    solve(xtx, xty)
}

/// Evaluate `[intercept, w..]` against one feature row
pub fn dot_with_intercept(weights: &[f64], row: &[f64]) -> f64 {
    match weights.split_first() {
        Some((intercept, w)) => intercept + w.iter().zip(row).map(|(a, b)| a * b).sum::<f64>(),
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_two_by_two() {
        let x = solve(vec![vec![2.0, 1.0], vec![1.0, 3.0]], vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-9);
        assert!((x[1] - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_solve_needs_pivoting() {
        let x = solve(vec![vec![0.0, 1.0], vec![1.0, 0.0]], vec![2.0, 3.0]).unwrap();
        assert_eq!(x, vec![3.0, 2.0]);
    }

    #[test]
    fn test_singular_system() {
        assert!(solve(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_ridge_recovers_linear_relation() {
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 4.0 + 2.0 * r[0] - r[1]).collect();
        let w = ridge(&x, &y, 1e-9).unwrap();
        assert!((w[0] - 4.0).abs() < 1e-4);
        assert!((w[1] - 2.0).abs() < 1e-4);
        assert!((w[2] + 1.0).abs() < 1e-4);
        assert!((dot_with_intercept(&w, &[10.0, 1.0]) - 23.0).abs() < 1e-3);
    }

    #[test]
    fn test_standardizer_handles_constant_column() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&rows);
        assert_eq!(s.transform(&[2.0, 5.0]), vec![0.0, 0.0]);
        assert_eq!(s.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }
}
