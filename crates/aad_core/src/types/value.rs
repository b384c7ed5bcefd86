//! Path-vectorised values.
//!
//! A `RandomVariable` is the unit of storage in the engine: one value per
//! simulated Monte-Carlo path, or a single deterministic scalar broadcast
//! across all paths. Every elementwise kernel is embarrassingly parallel
//! across paths; large payloads are split across the rayon pool while small
//! ones stay serial, with identical results either way.
//!
//! # Memory
//!
//! Graphs reach 10^5..10^7 nodes over up to 10^6 paths, so per-path
//! storage dominates. `release` drops a slot back to a deterministic
//! placeholder so the slot stays addressable while its path buffer is
//! returned to the allocator.

use rayon::prelude::*;

use super::error::ValueError;

/// Path counts at or above this run elementwise kernels on the rayon pool.
const PAR_THRESHOLD: usize = 16_384;

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    /// Scalar broadcast over every path.
    Deterministic(f64),
    /// One value per path.
    Paths(Vec<f64>),
}

/// A value vectorised over Monte-Carlo paths.
///
/// Arithmetic between two path-vectorised operands requires equal path
/// counts; mixing with a deterministic operand broadcasts the scalar.
/// Comparisons encode truth as 1.0/0.0 (there is no distinct boolean
/// payload). Division, NaN and Inf follow plain IEEE-754 semantics and are
/// never guarded.
///
/// An optional valuation-time tag travels with the value as metadata only;
/// binary operations keep the left operand's tag, falling back to the
/// right's.
///
/// # Examples
///
/// ```
/// use aad_core::types::RandomVariable;
///
/// let s = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
/// let k = RandomVariable::scalar(4.0);
/// let v = k.mul(&s).unwrap();
/// assert_eq!(v.at(1), 8.0);
/// assert_eq!(v.mean(), 8.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RandomVariable {
    payload: Payload,
    time: Option<f64>,
}

impl RandomVariable {
    /// Creates a deterministic value broadcast over every path.
    #[inline]
    pub fn scalar(value: f64) -> Self {
        Self {
            payload: Payload::Deterministic(value),
            time: None,
        }
    }

    /// Creates a path-vectorised value from per-path entries.
    #[inline]
    pub fn from_paths(values: Vec<f64>) -> Self {
        Self {
            payload: Payload::Paths(values),
            time: None,
        }
    }

    /// The minimal placeholder a released slot holds.
    #[inline]
    pub fn placeholder() -> Self {
        Self::scalar(0.0)
    }

    /// Attaches a valuation-time tag (metadata only).
    #[inline]
    pub fn with_time(mut self, time: f64) -> Self {
        self.time = Some(time);
        self
    }

    /// Returns the valuation-time tag, if any.
    #[inline]
    pub fn time(&self) -> Option<f64> {
        self.time
    }

    /// Returns `true` for a scalar broadcast payload.
    #[inline]
    pub fn deterministic(&self) -> bool {
        matches!(self.payload, Payload::Deterministic(_))
    }

    /// Path count; 0 for a deterministic value.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.payload {
            Payload::Deterministic(_) => 0,
            Payload::Paths(v) => v.len(),
        }
    }

    /// Returns `true` when no per-path storage is held.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value on path `i`. Deterministic payloads answer for any index.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range for a path-vectorised payload.
    #[inline]
    pub fn at(&self, i: usize) -> f64 {
        match &self.payload {
            Payload::Deterministic(v) => *v,
            Payload::Paths(vals) => vals[i],
        }
    }

    /// Writes the value on path `i`.
    ///
    /// This is the path-generator interface: draw arrays are filled in
    /// place, one `(path, value)` write at a time.
    ///
    /// # Errors
    ///
    /// `ValueError::Deterministic` when the payload is a scalar broadcast.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range for a path-vectorised payload.
    #[inline]
    pub fn set(&mut self, i: usize, value: f64) -> Result<(), ValueError> {
        match &mut self.payload {
            Payload::Deterministic(_) => Err(ValueError::Deterministic { index: i }),
            Payload::Paths(vals) => {
                vals[i] = value;
                Ok(())
            }
        }
    }

    /// Per-path slice; `None` for a deterministic payload.
    #[inline]
    pub fn paths(&self) -> Option<&[f64]> {
        match &self.payload {
            Payload::Deterministic(_) => None,
            Payload::Paths(vals) => Some(vals),
        }
    }

    /// Expectation across paths (the value itself when deterministic).
    pub fn mean(&self) -> f64 {
        match &self.payload {
            Payload::Deterministic(v) => *v,
            Payload::Paths(vals) => {
                if vals.is_empty() {
                    0.0
                } else {
                    vals.iter().sum::<f64>() / vals.len() as f64
                }
            }
        }
    }

    /// Resets the payload to the deterministic placeholder, releasing
    /// per-path storage. The slot stays addressable.
    #[inline]
    pub fn release(&mut self) {
        self.payload = Payload::Deterministic(0.0);
        self.time = None;
    }

    // -------------------------------------------------------------------
    // Elementwise kernels
    // -------------------------------------------------------------------

    fn map<F>(&self, f: F) -> Self
    where
        F: Fn(f64) -> f64 + Sync,
    {
        let payload = match &self.payload {
            Payload::Deterministic(v) => Payload::Deterministic(f(*v)),
            Payload::Paths(vals) => {
                if vals.len() >= PAR_THRESHOLD {
                    Payload::Paths(vals.par_iter().map(|&x| f(x)).collect())
                } else {
                    Payload::Paths(vals.iter().map(|&x| f(x)).collect())
                }
            }
        };
        Self {
            payload,
            time: self.time,
        }
    }

    fn map2<F>(&self, rhs: &Self, f: F) -> Result<Self, ValueError>
    where
        F: Fn(f64, f64) -> f64 + Sync,
    {
        let payload = match (&self.payload, &rhs.payload) {
            (Payload::Deterministic(a), Payload::Deterministic(b)) => {
                Payload::Deterministic(f(*a, *b))
            }
            (Payload::Deterministic(a), Payload::Paths(bs)) => {
                if bs.len() >= PAR_THRESHOLD {
                    Payload::Paths(bs.par_iter().map(|&b| f(*a, b)).collect())
                } else {
                    Payload::Paths(bs.iter().map(|&b| f(*a, b)).collect())
                }
            }
            (Payload::Paths(xs), Payload::Deterministic(b)) => {
                if xs.len() >= PAR_THRESHOLD {
                    Payload::Paths(xs.par_iter().map(|&a| f(a, *b)).collect())
                } else {
                    Payload::Paths(xs.iter().map(|&a| f(a, *b)).collect())
                }
            }
            (Payload::Paths(xs), Payload::Paths(ys)) => {
                if xs.len() != ys.len() {
                    return Err(ValueError::PathCountMismatch {
                        left: xs.len(),
                        right: ys.len(),
                    });
                }
                if xs.len() >= PAR_THRESHOLD {
                    Payload::Paths(
                        xs.par_iter()
                            .zip(ys.par_iter())
                            .map(|(&a, &b)| f(a, b))
                            .collect(),
                    )
                } else {
                    Payload::Paths(xs.iter().zip(ys.iter()).map(|(&a, &b)| f(a, b)).collect())
                }
            }
        };
        Ok(Self {
            payload,
            time: self.time.or(rhs.time),
        })
    }

    /// Elementwise addition.
    pub fn add(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| a + b)
    }

    /// Elementwise subtraction.
    pub fn sub(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| a - b)
    }

    /// Elementwise multiplication.
    pub fn mul(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| a * b)
    }

    /// Elementwise division. A zero divisor yields IEEE Inf/NaN.
    pub fn div(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| a / b)
    }

    /// Elementwise maximum.
    pub fn max(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, f64::max)
    }

    /// Elementwise minimum.
    pub fn min(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, f64::min)
    }

    /// Elementwise `>` encoded as 1.0/0.0.
    pub fn gt(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| if a > b { 1.0 } else { 0.0 })
    }

    /// Elementwise `<` encoded as 1.0/0.0.
    pub fn lt(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| if a < b { 1.0 } else { 0.0 })
    }

    /// Elementwise `>=` encoded as 1.0/0.0.
    pub fn ge(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| if a >= b { 1.0 } else { 0.0 })
    }

    /// Elementwise `<=` encoded as 1.0/0.0.
    pub fn le(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| if a <= b { 1.0 } else { 0.0 })
    }

    /// Elementwise `==` encoded as 1.0/0.0. Exact IEEE comparison; NaN
    /// compares unequal to everything, itself included.
    pub fn eq_cmp(&self, rhs: &Self) -> Result<Self, ValueError> {
        self.map2(rhs, |a, b| if a == b { 1.0 } else { 0.0 })
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Self {
        self.map(|a| -a)
    }

    /// Elementwise exponential.
    pub fn exp(&self) -> Self {
        self.map(f64::exp)
    }

    /// Elementwise natural logarithm.
    pub fn ln(&self) -> Self {
        self.map(f64::ln)
    }

    /// Elementwise square root.
    pub fn sqrt(&self) -> Self {
        self.map(f64::sqrt)
    }

    /// In-place accumulation: `self += rhs`.
    ///
    /// The adjoint accumulator for a node starts as the deterministic
    /// placeholder and is promoted to a path payload on the first
    /// path-vectorised contribution.
    pub fn add_assign(&mut self, rhs: &Self) -> Result<(), ValueError> {
        *self = self.add(rhs)?;
        Ok(())
    }
}

impl Default for RandomVariable {
    fn default() -> Self {
        Self::placeholder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_broadcast() {
        let s = RandomVariable::scalar(2.5);
        assert!(s.deterministic());
        assert_eq!(s.len(), 0);
        assert_eq!(s.at(0), 2.5);
        assert_eq!(s.at(999), 2.5);
    }

    #[test]
    fn test_paths_accessors() {
        let mut v = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        assert!(!v.deterministic());
        assert_eq!(v.len(), 3);
        v.set(1, 5.0).unwrap();
        assert_eq!(v.at(1), 5.0);
        assert_eq!(v.paths().unwrap(), &[1.0, 5.0, 3.0]);
    }

    #[test]
    fn test_set_on_deterministic_fails() {
        let mut s = RandomVariable::scalar(1.0);
        assert_eq!(
            s.set(3, 2.0),
            Err(ValueError::Deterministic { index: 3 })
        );
    }

    #[test]
    fn test_broadcast_arithmetic() {
        let v = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        let s = RandomVariable::scalar(4.0);

        let sum = v.add(&s).unwrap();
        assert_eq!(sum.paths().unwrap(), &[5.0, 6.0, 7.0]);

        let prod = s.mul(&v).unwrap();
        assert_eq!(prod.paths().unwrap(), &[4.0, 8.0, 12.0]);

        let both = RandomVariable::scalar(2.0)
            .sub(&RandomVariable::scalar(0.5))
            .unwrap();
        assert!(both.deterministic());
        assert_eq!(both.at(0), 1.5);
    }

    #[test]
    fn test_path_count_mismatch() {
        let a = RandomVariable::from_paths(vec![1.0, 2.0]);
        let b = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        assert_eq!(
            a.mul(&b),
            Err(ValueError::PathCountMismatch { left: 2, right: 3 })
        );
    }

    #[test]
    fn test_comparisons_encode_as_indicator() {
        let a = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
        let b = RandomVariable::scalar(2.0);

        assert_eq!(a.gt(&b).unwrap().paths().unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(a.lt(&b).unwrap().paths().unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(a.ge(&b).unwrap().paths().unwrap(), &[0.0, 1.0, 1.0]);
        assert_eq!(a.le(&b).unwrap().paths().unwrap(), &[1.0, 1.0, 0.0]);
        assert_eq!(a.eq_cmp(&b).unwrap().paths().unwrap(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_equality_comparison_is_exact_ieee() {
        let a = RandomVariable::from_paths(vec![1.0, -0.0, f64::NAN]);
        let b = RandomVariable::from_paths(vec![1.0 + 1e-16, 0.0, f64::NAN]);
        let eq = a.eq_cmp(&b).unwrap();
        // 1.0 + 1e-16 rounds back to 1.0; -0.0 == 0.0; NaN != NaN.
        assert_eq!(eq.paths().unwrap(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unary_ops() {
        let v = RandomVariable::from_paths(vec![1.0, 4.0]);
        assert_eq!(v.neg().paths().unwrap(), &[-1.0, -4.0]);
        assert_eq!(v.sqrt().paths().unwrap(), &[1.0, 2.0]);
        assert_relative_eq!(v.exp().at(0), std::f64::consts::E, epsilon = 1e-12);
        assert_relative_eq!(v.ln().at(1), 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_ieee_semantics_unguarded() {
        let a = RandomVariable::from_paths(vec![1.0, -1.0, 0.0]);
        let zero = RandomVariable::scalar(0.0);
        let q = a.div(&zero).unwrap();
        assert_eq!(q.at(0), f64::INFINITY);
        assert_eq!(q.at(1), f64::NEG_INFINITY);
        assert!(q.at(2).is_nan());
    }

    #[test]
    fn test_time_tag_passthrough() {
        let a = RandomVariable::from_paths(vec![1.0, 2.0]).with_time(0.25);
        let b = RandomVariable::scalar(3.0).with_time(0.5);

        assert_eq!(a.add(&b).unwrap().time(), Some(0.25));
        assert_eq!(b.add(&a).unwrap().time(), Some(0.5));
        let untagged = RandomVariable::scalar(1.0);
        assert_eq!(untagged.add(&b).unwrap().time(), Some(0.5));
    }

    #[test]
    fn test_release_keeps_slot_addressable() {
        let mut v = RandomVariable::from_paths(vec![1.0; 1024]).with_time(1.0);
        v.release();
        assert!(v.deterministic());
        assert_eq!(v.at(500), 0.0);
        assert_eq!(v.time(), None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(RandomVariable::scalar(7.0).mean(), 7.0);
        let v = RandomVariable::from_paths(vec![1.0, 2.0, 3.0, 6.0]);
        assert_relative_eq!(v.mean(), 3.0, epsilon = 1e-15);
    }

    #[test]
    fn test_add_assign_promotes_accumulator() {
        let mut acc = RandomVariable::placeholder();
        acc.add_assign(&RandomVariable::from_paths(vec![1.0, 2.0]))
            .unwrap();
        acc.add_assign(&RandomVariable::scalar(0.5)).unwrap();
        assert_eq!(acc.paths().unwrap(), &[1.5, 2.5]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn broadcast_agrees_with_elementwise(
                scalar in -1e3f64..1e3f64,
                xs in proptest::collection::vec(-1e3f64..1e3f64, 1..64),
            ) {
                let v = RandomVariable::from_paths(xs.clone());
                let s = RandomVariable::scalar(scalar);
                let expanded = RandomVariable::from_paths(vec![scalar; xs.len()]);

                let broadcast = v.mul(&s).unwrap();
                let elementwise = v.mul(&expanded).unwrap();
                for i in 0..xs.len() {
                    prop_assert_eq!(broadcast.at(i).to_bits(), elementwise.at(i).to_bits());
                }
            }

            #[test]
            fn gt_and_le_partition_paths(
                xs in proptest::collection::vec(-10.0f64..10.0, 1..64),
                pivot in -10.0f64..10.0,
            ) {
                let v = RandomVariable::from_paths(xs);
                let p = RandomVariable::scalar(pivot);
                let above = v.gt(&p).unwrap();
                let at_or_below = v.le(&p).unwrap();
                for i in 0..v.len() {
                    prop_assert_eq!(above.at(i) + at_or_below.at(i), 1.0);
                }
            }
        }
    }

    #[test]
    fn test_parallel_kernel_matches_serial() {
        // Straddles the rayon threshold; results must be identical.
        let n = PAR_THRESHOLD + 17;
        let xs: Vec<f64> = (0..n).map(|i| i as f64 * 0.5).collect();
        let ys: Vec<f64> = (0..n).map(|i| (n - i) as f64).collect();
        let a = RandomVariable::from_paths(xs.clone());
        let b = RandomVariable::from_paths(ys.clone());

        let sum = a.add(&b).unwrap();
        for i in (0..n).step_by(1000) {
            assert_eq!(sum.at(i), xs[i] + ys[i]);
        }
    }
}
