//! Small dense linear algebra helpers for the reducers and linear classifiers.

use ndarray::{Array1, Array2, Axis};

/// Eigenvalue decomposition of a symmetric matrix.
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues, sorted in descending order
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors, one per column, matching `eigenvalues`
    pub eigenvectors: Array2<f64>,
}

impl EigenDecomposition {
    /// Cyclic Jacobi rotations until the off-diagonal mass vanishes.
    pub fn from_symmetric(matrix: &Array2<f64>) -> Self {
        let n = matrix.nrows();
        let mut a = matrix.clone();
        let mut v = Array2::<f64>::eye(n);

        for _sweep in 0..100 {
            let off: f64 = (0..n)
                .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
                .map(|(i, j)| a[[i, j]] * a[[i, j]])
                .sum();
            let scale: f64 = a.diag().iter().map(|d| d * d).sum::<f64>().max(1e-300);
            if off <= 1e-22 * scale {
                break;
            }

            for p in 0..n {
                for q in (p + 1)..n {
                    let apq = a[[p, q]];
                    if apq.abs() < 1e-300 {
                        continue;
                    }
                    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let t = if theta == 0.0 { 1.0 } else { t };
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    for k in 0..n {
                        let akp = a[[k, p]];
                        let akq = a[[k, q]];
                        a[[k, p]] = c * akp - s * akq;
                        a[[k, q]] = s * akp + c * akq;
                    }
                    for k in 0..n {
                        let apk = a[[p, k]];
                        let aqk = a[[q, k]];
                        a[[p, k]] = c * apk - s * aqk;
                        a[[q, k]] = s * apk + c * aqk;
                    }
                    for k in 0..n {
                        let vkp = v[[k, p]];
                        let vkq = v[[k, q]];
                        v[[k, p]] = c * vkp - s * vkq;
                        v[[k, q]] = s * vkp + c * vkq;
                    }
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&x, &y| a[[y, y]].total_cmp(&a[[x, x]]));

        let eigenvalues = Array1::from_iter(order.iter().map(|&i| a[[i, i]]));
        let mut eigenvectors = Array2::zeros((n, n));
        for (new_idx, &old_idx) in order.iter().enumerate() {
            eigenvectors.column_mut(new_idx).assign(&v.column(old_idx));
        }

        Self {
            eigenvalues,
            eigenvectors,
        }
    }
}

pub fn column_means(data: &Array2<f64>) -> Array1<f64> {
    data.mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(data.ncols()))
}

/// Sample covariance (n - 1 denominator).
pub fn covariance_matrix(data: &Array2<f64>) -> Array2<f64> {
    let n = data.nrows();
    let mean = column_means(data);
    let centered = data - &mean;
    centered.t().dot(&centered) / (n.saturating_sub(1).max(1)) as f64
}

/// Solve `a x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` when the system is singular.
pub fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| m[[x, col]].abs().total_cmp(&m[[y, col]].abs()))?;
        if m[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
            }
            rhs.swap(col, pivot);
        }
        for row in (col + 1)..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| m[[row, k]] * x[k]).sum();
        x[row] = (rhs[row] - tail) / m[[row, row]];
    }
    Some(x)
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
