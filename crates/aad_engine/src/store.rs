//! Value and derivative storage for evaluation passes.
//!
//! A [`ValueStore`] is one array of [`RandomVariable`] slots parallel to
//! the graph's node list. The same type backs forward values and backward
//! adjoints; an adjoint store starts with every slot on the deterministic
//! 0.0 placeholder and is promoted per slot on first accumulation, so
//! restricted passes never zero-fill ranges they do not touch.
//!
//! A store is exclusively owned by the single active pass invocation.
//! [`PassGuard`] scopes that ownership: whoever runs a restricted replay
//! declares up front which node ranges the pass may populate, and those
//! ranges are released when the guard drops — on success, early `?` return
//! or panic alike. Forgetting to zero a replayed trade's entries is a
//! compile-shape problem, not a runtime leak.

use std::ops::{Deref, DerefMut};

use aad_core::types::{NodeId, RandomVariable, ValueError};

/// Per-node value slots for one pass.
///
/// Slots track presence separately from payload so a seeded 0.0 parameter
/// is distinguishable from a released slot.
#[derive(Debug)]
pub struct ValueStore {
    slots: Vec<RandomVariable>,
    present: Vec<bool>,
}

impl ValueStore {
    /// Creates a store of `n` placeholder slots.
    pub fn new(n: usize) -> Self {
        Self {
            slots: vec![RandomVariable::placeholder(); n],
            present: vec![false; n],
        }
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` for a zero-length store.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reads a slot. Released slots read as the deterministic placeholder.
    #[inline]
    pub fn get(&self, id: NodeId) -> &RandomVariable {
        &self.slots[id.index()]
    }

    /// `true` once a slot has been seeded, computed or accumulated into,
    /// and until it is released.
    #[inline]
    pub fn is_present(&self, id: NodeId) -> bool {
        self.present[id.index()]
    }

    /// Writes a slot.
    #[inline]
    pub fn set(&mut self, id: NodeId, value: RandomVariable) {
        self.slots[id.index()] = value;
        self.present[id.index()] = true;
    }

    /// Seeds a slot with a deterministic scalar (constants table, model
    /// parameters).
    #[inline]
    pub fn seed_scalar(&mut self, id: NodeId, value: f64) {
        self.set(id, RandomVariable::scalar(value));
    }

    /// Accumulates `contribution` into a slot: `slot += contribution`.
    ///
    /// # Errors
    ///
    /// `ValueError::PathCountMismatch` when the slot and the contribution
    /// carry different path counts.
    pub fn accumulate(&mut self, id: NodeId, contribution: &RandomVariable) -> Result<(), ValueError> {
        self.slots[id.index()].add_assign(contribution)?;
        self.present[id.index()] = true;
        Ok(())
    }

    /// Releases a slot back to the placeholder, freeing per-path storage.
    /// The slot stays addressable and reads as deterministic 0.0.
    #[inline]
    pub fn release(&mut self, id: NodeId) {
        self.slots[id.index()].release();
        self.present[id.index()] = false;
    }

    /// Releases every slot in `[first, last)`.
    pub fn release_range(&mut self, first: NodeId, last: NodeId) {
        for i in first.index()..last.index() {
            self.release(NodeId::new(i));
        }
    }

    /// Releases every slot.
    pub fn reset(&mut self) {
        let n = self.len();
        self.release_range(NodeId::new(0), NodeId::new(n));
    }

    /// Expectation across paths of a slot's value.
    #[inline]
    pub fn mean(&self, id: NodeId) -> f64 {
        self.get(id).mean()
    }
}

/// Scoped ownership of a [`ValueStore`] for one restricted pass.
///
/// Declared ranges are released when the guard drops, whatever the exit
/// path. Derefs to the underlying store so passes take `&mut guard`
/// exactly where they would take `&mut store`.
///
/// # Examples
///
/// ```
/// use aad_core::types::{NodeId, RandomVariable};
/// use aad_engine::store::{PassGuard, ValueStore};
///
/// let mut store = ValueStore::new(4);
/// {
///     let mut pass = PassGuard::new(&mut store).with_range(NodeId::new(1), NodeId::new(3));
///     pass.set(NodeId::new(1), RandomVariable::from_paths(vec![1.0, 2.0]));
///     assert!(pass.is_present(NodeId::new(1)));
/// }
/// // Scope exit released the declared range.
/// assert!(!store.is_present(NodeId::new(1)));
/// ```
pub struct PassGuard<'a> {
    store: &'a mut ValueStore,
    scope: Vec<(NodeId, NodeId)>,
}

impl<'a> PassGuard<'a> {
    /// Takes the store for one scoped pass, with an empty release scope.
    pub fn new(store: &'a mut ValueStore) -> Self {
        Self {
            store,
            scope: Vec::new(),
        }
    }

    /// Adds the half-open range `[first, last)` to the release scope.
    pub fn with_range(mut self, first: NodeId, last: NodeId) -> Self {
        self.scope.push((first, last));
        self
    }

    /// Adds a single node to the release scope.
    pub fn with_node(self, id: NodeId) -> Self {
        let next = id.next();
        self.with_range(id, next)
    }
}

impl Deref for PassGuard<'_> {
    type Target = ValueStore;

    fn deref(&self) -> &ValueStore {
        self.store
    }
}

impl DerefMut for PassGuard<'_> {
    fn deref_mut(&mut self) -> &mut ValueStore {
        self.store
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        for &(first, last) in &self.scope {
            self.store.release_range(first, last);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_slot_reads_as_zero() {
        let mut store = ValueStore::new(2);
        store.set(NodeId::new(0), RandomVariable::from_paths(vec![1.0, 2.0]));
        assert!(store.is_present(NodeId::new(0)));

        store.release(NodeId::new(0));
        assert!(!store.is_present(NodeId::new(0)));
        assert!(store.get(NodeId::new(0)).deterministic());
        assert_eq!(store.get(NodeId::new(0)).at(7), 0.0);
    }

    #[test]
    fn test_seeded_zero_is_present() {
        let mut store = ValueStore::new(1);
        store.seed_scalar(NodeId::new(0), 0.0);
        assert!(store.is_present(NodeId::new(0)));
    }

    #[test]
    fn test_reset_releases_every_slot() {
        let mut store = ValueStore::new(3);
        store.seed_scalar(NodeId::new(0), 1.0);
        store.set(NodeId::new(2), RandomVariable::from_paths(vec![1.0, 2.0]));

        store.reset();
        for i in 0..3 {
            assert!(!store.is_present(NodeId::new(i)));
            assert_eq!(store.get(NodeId::new(i)).at(0), 0.0);
        }
    }

    #[test]
    fn test_accumulate_promotes_placeholder() {
        let mut store = ValueStore::new(1);
        let id = NodeId::new(0);
        store
            .accumulate(id, &RandomVariable::from_paths(vec![1.0, 2.0]))
            .unwrap();
        store
            .accumulate(id, &RandomVariable::from_paths(vec![0.5, 0.5]))
            .unwrap();
        assert_eq!(store.get(id).paths().unwrap(), &[1.5, 2.5]);
    }

    #[test]
    fn test_guard_releases_scope_on_drop() {
        let mut store = ValueStore::new(5);
        store.seed_scalar(NodeId::new(0), 1.0);
        {
            let mut pass = PassGuard::new(&mut store)
                .with_range(NodeId::new(2), NodeId::new(4))
                .with_node(NodeId::new(4));
            pass.set(NodeId::new(2), RandomVariable::from_paths(vec![1.0; 64]));
            pass.set(NodeId::new(4), RandomVariable::from_paths(vec![2.0; 64]));
        }
        // Out-of-scope slot survives; scoped slots are released.
        assert!(store.is_present(NodeId::new(0)));
        assert!(!store.is_present(NodeId::new(2)));
        assert!(!store.is_present(NodeId::new(4)));
    }

    #[test]
    fn test_guard_releases_on_early_exit() {
        let mut store = ValueStore::new(3);

        fn failing(store: &mut ValueStore) -> Result<(), ValueError> {
            let mut pass = PassGuard::new(store).with_range(NodeId::new(0), NodeId::new(3));
            pass.set(NodeId::new(0), RandomVariable::from_paths(vec![1.0, 2.0]));
            // Shape error propagates out through the guard's scope.
            let bad = RandomVariable::from_paths(vec![1.0, 2.0, 3.0]);
            pass.accumulate(NodeId::new(0), &bad)?;
            Ok(())
        }

        assert!(failing(&mut store).is_err());
        assert!(!store.is_present(NodeId::new(0)));
    }
}
