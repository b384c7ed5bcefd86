//! Cross-path basis-function regression for conditional expectations.
//!
//! `CondExpectation(y, x)` estimates `E[y | x]` per path by least-squares
//! projection of `y` onto a monomial basis in `x`: the forward value is
//! the fitted value `ŷ = B (BᵀB)⁻¹ Bᵀ y` per path. The fit is a *linear*
//! map of `y` (the projection depends only on `x`), so the adjoint is the
//! transpose of that same map; the projection matrix is symmetric, and the
//! backward routine applies it to the upstream adjoint.
//!
//! The normal matrix is factored once per fit (Cholesky) and the factor is
//! cached with the basis so forward and backward use exactly the same
//! linear map. An ill-conditioned fit is not an error: a non-positive
//! pivot marks the fit singular and both directions yield NaN, surfaced by
//! downstream finiteness checks at the orchestration layer.

use std::collections::HashMap;

use aad_core::types::{NodeId, RandomVariable};

/// Default monomial degree: basis `{1, x, x2}`.
pub const DEFAULT_DEGREE: usize = 2;

/// Pivot floor below which the normal matrix is treated as singular.
const PIVOT_FLOOR: f64 = 1e-300;

/// One fitted regression: basis matrix and factored normal matrix.
///
/// Reproducible by construction: the fit is pure sequential `f64`
/// arithmetic over its inputs, and the cached factor guarantees backward
/// applies the transpose of the exact forward map.
#[derive(Debug, Clone)]
pub struct FittedRegression {
    /// `n_paths x k` basis matrix, row-major.
    basis: Vec<f64>,
    n_paths: usize,
    k: usize,
    /// Lower Cholesky factor of `BᵀB`, row-major `k x k`; `None` when the
    /// normal matrix was not positive definite.
    chol: Option<Vec<f64>>,
}

impl FittedRegression {
    /// Fits the monomial basis of `degree` in `x` to `y`.
    ///
    /// Deterministic operands broadcast; two deterministic operands
    /// degenerate to a single-path fit.
    pub fn fit(y: &RandomVariable, x: &RandomVariable, degree: usize) -> Self {
        let n_paths = y.len().max(x.len()).max(1);
        let k = degree + 1;

        let mut basis = vec![0.0; n_paths * k];
        for path in 0..n_paths {
            let xi = x.at(path);
            let mut monomial = 1.0;
            for j in 0..k {
                basis[path * k + j] = monomial;
                monomial *= xi;
            }
        }

        let fit = Self {
            basis,
            n_paths,
            k,
            chol: None,
        };
        let normal = fit.normal_matrix();
        let chol = cholesky(&normal, k);
        Self { chol, ..fit }
    }

    /// `BᵀB`, row-major `k x k`.
    fn normal_matrix(&self) -> Vec<f64> {
        let k = self.k;
        let mut a = vec![0.0; k * k];
        for path in 0..self.n_paths {
            let row = &self.basis[path * k..(path + 1) * k];
            for i in 0..k {
                for j in 0..k {
                    a[i * k + j] += row[i] * row[j];
                }
            }
        }
        a
    }

    /// Applies the projection `B (BᵀB)⁻¹ Bᵀ` to `input`.
    ///
    /// This is both the forward fit (applied to the regressand) and, the
    /// projection being symmetric, the transposed adjoint map (applied to
    /// the upstream adjoint). A singular fit yields NaN on every path.
    pub fn project(&self, input: &RandomVariable) -> RandomVariable {
        let k = self.k;

        let Some(chol) = &self.chol else {
            return RandomVariable::from_paths(vec![f64::NAN; self.n_paths]);
        };

        // v = Bᵀ input
        let mut v = vec![0.0; k];
        for path in 0..self.n_paths {
            let u = input.at(path);
            let row = &self.basis[path * k..(path + 1) * k];
            for j in 0..k {
                v[j] += row[j] * u;
            }
        }

        // Solve (BᵀB) w = v via the cached factor.
        let w = cholesky_solve(chol, &v, k);

        // out = B w
        let out = (0..self.n_paths)
            .map(|path| {
                let row = &self.basis[path * k..(path + 1) * k];
                row.iter().zip(&w).map(|(b, c)| b * c).sum()
            })
            .collect();
        RandomVariable::from_paths(out)
    }

    /// Path count of the fit.
    pub fn n_paths(&self) -> usize {
        self.n_paths
    }

    /// `true` when the normal matrix was not positive definite.
    pub fn is_singular(&self) -> bool {
        self.chol.is_none()
    }
}

/// Lower Cholesky factor of a row-major `k x k` matrix, or `None` when a
/// pivot falls below the positive floor.
fn cholesky(a: &[f64], k: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; k * k];
    for j in 0..k {
        for i in j..k {
            let mut sum = a[i * k + j];
            for p in 0..j {
                sum -= l[i * k + p] * l[j * k + p];
            }
            if i == j {
                if !(sum > PIVOT_FLOOR) {
                    return None;
                }
                l[j * k + j] = sum.sqrt();
            } else {
                l[i * k + j] = sum / l[j * k + j];
            }
        }
    }
    Some(l)
}

/// Solves `L Lᵀ w = v` given the lower factor.
fn cholesky_solve(l: &[f64], v: &[f64], k: usize) -> Vec<f64> {
    // Forward substitution: L z = v
    let mut z = vec![0.0; k];
    for i in 0..k {
        let mut sum = v[i];
        for p in 0..i {
            sum -= l[i * k + p] * z[p];
        }
        z[i] = sum / l[i * k + i];
    }
    // Back substitution: Lᵀ w = z
    let mut w = vec![0.0; k];
    for i in (0..k).rev() {
        let mut sum = z[i];
        for p in i + 1..k {
            sum -= l[p * k + i] * w[p];
        }
        w[i] = sum / l[i * k + i];
    }
    w
}

/// Per-node cache of fitted regressions for one forward/backward pair.
///
/// Forward inserts the fit when it evaluates a conditional-expectation
/// node; backward looks it up to apply the transpose. Cleared between
/// full passes; restricted replays reuse whatever fits their active range
/// recomputes.
#[derive(Debug, Default)]
pub struct RegressionCache {
    degree: usize,
    fits: HashMap<NodeId, FittedRegression>,
}

impl RegressionCache {
    /// Cache with the default basis degree.
    pub fn new() -> Self {
        Self {
            degree: DEFAULT_DEGREE,
            fits: HashMap::new(),
        }
    }

    /// Cache with an explicit basis degree.
    pub fn with_degree(degree: usize) -> Self {
        Self {
            degree,
            fits: HashMap::new(),
        }
    }

    /// Basis degree used for new fits.
    pub fn degree(&self) -> usize {
        self.degree
    }

    /// Records the fit for a node, replacing any earlier one.
    pub fn insert(&mut self, id: NodeId, fit: FittedRegression) {
        self.fits.insert(id, fit);
    }

    /// The cached fit for a node, if its forward has run.
    pub fn get(&self, id: NodeId) -> Option<&FittedRegression> {
        self.fits.get(&id)
    }

    /// Drops all cached fits.
    pub fn clear(&mut self) {
        self.fits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_polynomial_is_reproduced() {
        // y is exactly quadratic in x, so the degree-2 fit is exact.
        let xs: Vec<f64> = (0..50).map(|i| -2.0 + 0.08 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 1.5 - 0.7 * x + 0.3 * x * x).collect();
        let x = RandomVariable::from_paths(xs);
        let y = RandomVariable::from_paths(ys.clone());

        let fit = FittedRegression::fit(&y, &x, 2);
        let fitted = fit.project(&y);
        for (i, expected) in ys.iter().enumerate() {
            assert_relative_eq!(fitted.at(i), *expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_regressand() {
        let x = RandomVariable::from_paths(vec![1.0, 2.0, 3.0, 4.0]);
        let y = RandomVariable::scalar(5.0);
        let fit = FittedRegression::fit(&y, &x, 2);
        let fitted = fit.project(&y);
        for i in 0..4 {
            assert_relative_eq!(fitted.at(i), 5.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_adjoint_is_transpose_of_forward_map() {
        // The projection depends only on x, so projecting any vector u
        // through the cached fit must equal a fresh fit of u on x. And the
        // map is symmetric: <P a, b> == <a, P b>.
        let xs: Vec<f64> = (0..32).map(|i| (i as f64 * 0.37).sin() * 2.0).collect();
        let x = RandomVariable::from_paths(xs);
        let y = RandomVariable::from_paths((0..32).map(|i| (i as f64).cos()).collect());
        let u = RandomVariable::from_paths((0..32).map(|i| 0.1 * i as f64 - 1.3).collect());

        let fit = FittedRegression::fit(&y, &x, 2);
        let through_cache = fit.project(&u);
        let fresh = FittedRegression::fit(&u, &x, 2).project(&u);
        for i in 0..32 {
            assert_relative_eq!(through_cache.at(i), fresh.at(i), epsilon = 1e-9);
        }

        let pa = fit.project(&y);
        let pb = fit.project(&u);
        let lhs: f64 = (0..32).map(|i| pa.at(i) * u.at(i)).sum();
        let rhs: f64 = (0..32).map(|i| y.at(i) * pb.at(i)).sum();
        assert_relative_eq!(lhs, rhs, max_relative = 1e-9);
    }

    #[test]
    fn test_degenerate_fit_yields_nan() {
        // Fewer paths than basis columns: the normal matrix is singular.
        let x = RandomVariable::from_paths(vec![1.0, 1.0]);
        let y = RandomVariable::from_paths(vec![3.0, 4.0]);
        let fit = FittedRegression::fit(&y, &x, 2);
        assert!(fit.is_singular());
        let fitted = fit.project(&y);
        assert!(fitted.at(0).is_nan());
    }

    #[test]
    fn test_fit_is_deterministic() {
        let x = RandomVariable::from_paths((0..64).map(|i| (i as f64 * 0.11).cos()).collect());
        let y = RandomVariable::from_paths((0..64).map(|i| (i as f64 * 0.07).sin()).collect());
        let a = FittedRegression::fit(&y, &x, 3).project(&y);
        let b = FittedRegression::fit(&y, &x, 3).project(&y);
        for i in 0..64 {
            assert_eq!(a.at(i).to_bits(), b.at(i).to_bits());
        }
    }

    #[test]
    fn test_cache_insert_get_clear() {
        let mut cache = RegressionCache::new();
        assert_eq!(cache.degree(), DEFAULT_DEGREE);

        let x = RandomVariable::from_paths(vec![1.0, 2.0, 3.0, 4.0]);
        let y = RandomVariable::from_paths(vec![1.0, 4.0, 9.0, 16.0]);
        let id = NodeId::new(7);
        cache.insert(id, FittedRegression::fit(&y, &x, 2));
        assert!(cache.get(id).is_some());
        assert!(cache.get(NodeId::new(8)).is_none());

        cache.clear();
        assert!(cache.get(id).is_none());
    }
}
