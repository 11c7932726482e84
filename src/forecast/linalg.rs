//! Dense ridge least squares for the forecaster's small design matrices.

/// Solve `(XᵀX + diag(penalty)) β = Xᵀy` by Gaussian elimination with
/// partial pivoting. Returns `None` when the system is numerically singular.
pub(crate) fn ridge_solve(design: &[Vec<f64>], y: &[f64], penalty: &[f64]) -> Option<Vec<f64>> {
    let p = penalty.len();
    let mut a = vec![vec![0.0; p + 1]; p];

    for (row, &target) in design.iter().zip(y) {
        for j in 0..p {
            let xj = row[j];
            if xj == 0.0 {
                continue;
            }
            for k in j..p {
                a[j][k] += xj * row[k];
            }
            a[j][p] += xj * target;
        }
    }
    for j in 0..p {
        for k in 0..j {
            a[j][k] = a[k][j];
        }
        a[j][j] += penalty[j];
    }

    let scale = (0..p).map(|j| a[j][j].abs()).fold(0.0, f64::max).max(1.0);
    let tol = scale * 1e-12;

    for col in 0..p {
        let pivot = (col..p).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() <= tol {
            return None;
        }
        a.swap(col, pivot);
        for r in col + 1..p {
            let factor = a[r][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=p {
                a[r][c] -= factor * a[col][c];
            }
        }
    }

    let mut beta = vec![0.0; p];
    for r in (0..p).rev() {
        let tail: f64 = (r + 1..p).map(|c| a[r][c] * beta[c]).sum();
        beta[r] = (a[r][p] - tail) / a[r][r];
    }
    beta.iter().all(|b| b.is_finite()).then_some(beta)
}
