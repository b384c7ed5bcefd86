//! The shared model layer: named parameters and simulated market draws.
//!
//! The model layer is the prefix of the graph every trade reads from. Its
//! leaves come in two kinds: sensitivity parameters, seeded with a scalar
//! and queried for adjoints after the backward pass, and draw leaves,
//! seeded with one standard normal per path from a [`PathRng`]. Draws are
//! simulated once per run and reused across every replay so restricted
//! passes reproduce the full pass bit for bit.

use aad_core::types::{NodeId, RandomVariable};
use aad_engine::store::ValueStore;

use crate::rng::PathRng;

/// A named model parameter: a leaf node seeded with a deterministic scalar.
///
/// Parameters are the sensitivity targets. Bump one and rerun, or read its
/// adjoint after a backward pass, and you get the same number.
#[derive(Debug, Clone)]
pub struct ModelParameter {
    name: String,
    node: NodeId,
    value: f64,
}

impl ModelParameter {
    pub(crate) fn new(name: String, node: NodeId, value: f64) -> Self {
        Self { name, node, value }
    }

    /// The parameter's name, unique within the portfolio.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The leaf node carrying this parameter.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The scalar the leaf is seeded with.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// One run's worth of simulated draws, pinned to their leaf nodes.
///
/// Holding the arrays outside the value store is what makes replay
/// possible: liveness frees draw slots mid-pass, and each restricted pass
/// reseeds from here.
#[derive(Debug)]
pub struct SimulatedDraws {
    n_paths: usize,
    draws: Vec<(NodeId, Vec<f64>)>,
}

impl SimulatedDraws {
    /// Simulates `n_paths` standard normals for each draw leaf, in leaf
    /// registration order so the result depends only on the seed.
    pub fn simulate(rng: &mut PathRng, draw_leaves: &[NodeId], n_paths: usize) -> Self {
        let mut draws = Vec::with_capacity(draw_leaves.len());
        for &leaf in draw_leaves {
            let mut buffer = vec![0.0; n_paths];
            rng.fill_normal(&mut buffer);
            draws.push((leaf, buffer));
        }
        Self { n_paths, draws }
    }

    /// Number of Monte Carlo paths per draw.
    #[inline]
    pub fn n_paths(&self) -> usize {
        self.n_paths
    }

    /// Seeds every draw leaf's value slot from the stored arrays.
    pub fn seed(&self, values: &mut ValueStore) {
        for (leaf, paths) in &self.draws {
            values.set(*leaf, RandomVariable::from_paths(paths.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_is_deterministic_in_the_seed() {
        let leaves = [NodeId::new(0), NodeId::new(1)];
        let a = SimulatedDraws::simulate(&mut PathRng::from_seed(9), &leaves, 32);
        let b = SimulatedDraws::simulate(&mut PathRng::from_seed(9), &leaves, 32);
        assert_eq!(a.draws, b.draws);
    }

    #[test]
    fn seed_places_path_vectors() {
        let leaves = [NodeId::new(1)];
        let draws = SimulatedDraws::simulate(&mut PathRng::from_seed(3), &leaves, 8);
        let mut store = ValueStore::new(2);
        draws.seed(&mut store);
        assert!(store.is_present(NodeId::new(1)));
        assert_eq!(store.get(NodeId::new(1)).len(), 8);
        assert!(!store.is_present(NodeId::new(0)));
    }

    #[test]
    fn reseeding_reproduces_released_draws() {
        let leaves = [NodeId::new(0)];
        let draws = SimulatedDraws::simulate(&mut PathRng::from_seed(11), &leaves, 16);
        let mut store = ValueStore::new(1);
        draws.seed(&mut store);
        let first: Vec<f64> = store.get(NodeId::new(0)).paths().unwrap().to_vec();

        store.release(NodeId::new(0));
        draws.seed(&mut store);
        assert_eq!(store.get(NodeId::new(0)).paths().unwrap(), &first[..]);
    }
}
