//! Binary min-heap over dense integer ids.
//!
//! The heap stores ids only. Ordering keys are read through a key function over a working array
//! owned by the caller, so the same cost array is shared between the heap and the search state.
//! A slot table maps every id to its current position in the heap, which makes
//! [decrease_key](IndexedHeap::decrease_key) O(log n) instead of a linear scan.

const NOT_IN_HEAP: usize = usize::MAX;

#[derive(Clone, Debug, Default)]
pub struct IndexedHeap {
    items: Vec<usize>,
    slots: Vec<usize>,
}

impl IndexedHeap {
    /// Creates a heap able to hold the ids `0..capacity`.
    pub fn new(capacity: usize) -> IndexedHeap {
        IndexedHeap {
            items: Vec::with_capacity(capacity),
            slots: vec![NOT_IN_HEAP; capacity],
        }
    }

    /// Empties the heap and makes room for the ids `0..capacity`.
    pub fn reset(&mut self, capacity: usize) {
        for &id in &self.items {
            self.slots[id] = NOT_IN_HEAP;
        }
        self.items.clear();
        if self.slots.len() != capacity {
            self.slots.clear();
            self.slots.resize(capacity, NOT_IN_HEAP);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn contains(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|&slot| slot != NOT_IN_HEAP)
    }

    /// The id with the smallest key, if any.
    pub fn peek(&self) -> Option<usize> {
        self.items.first().copied()
    }

    /// Inserts an id whose key is already set in the working array.
    pub fn push<K, F>(&mut self, id: usize, key: F)
    where
        K: Ord,
        F: Fn(usize) -> K,
    {
        debug_assert!(!self.contains(id), "id {id} pushed twice");
        let slot = self.items.len();
        self.items.push(id);
        self.slots[id] = slot;
        self.sift_up(slot, &key);
    }

    /// Removes and returns the id with the smallest key.
    pub fn pop<K, F>(&mut self, key: F) -> Option<usize>
    where
        K: Ord,
        F: Fn(usize) -> K,
    {
        let last = self.items.pop()?;
        if self.items.is_empty() {
            self.slots[last] = NOT_IN_HEAP;
            return Some(last);
        }
        let first = self.items[0];
        self.items[0] = last;
        self.slots[last] = 0;
        self.slots[first] = NOT_IN_HEAP;
        self.sift_down(0, &key);
        Some(first)
    }

    /// Restores the heap order after the key of `id` decreased.
    pub fn decrease_key<K, F>(&mut self, id: usize, key: F)
    where
        K: Ord,
        F: Fn(usize) -> K,
    {
        let slot = self.slots[id];
        debug_assert!(slot != NOT_IN_HEAP, "id {id} is not in the heap");
        if slot != NOT_IN_HEAP {
            self.sift_up(slot, &key);
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.items.swap(a, b);
        self.slots[self.items[a]] = a;
        self.slots[self.items[b]] = b;
    }

    fn sift_up<K: Ord, F: Fn(usize) -> K>(&mut self, mut slot: usize, key: &F) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if key(self.items[parent]) > key(self.items[slot]) {
                self.swap(parent, slot);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down<K: Ord, F: Fn(usize) -> K>(&mut self, mut slot: usize, key: &F) {
        let len = self.items.len();
        loop {
            let left = slot * 2 + 1;
            let right = left + 1;
            if left >= len {
                return;
            }
            let mut child = left;
            if right < len && key(self.items[right]) < key(self.items[left]) {
                child = right;
            }
            if key(self.items[child]) < key(self.items[slot]) {
                self.swap(child, slot);
                slot = child;
            } else {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn assert_consistent(heap: &IndexedHeap, costs: &[i32]) {
        for (slot, &id) in heap.items.iter().enumerate() {
            assert_eq!(heap.slots[id], slot);
            if slot > 0 {
                assert!(costs[heap.items[(slot - 1) / 2]] <= costs[id]);
            }
        }
        let tracked = heap.slots.iter().filter(|&&s| s != NOT_IN_HEAP).count();
        assert_eq!(tracked, heap.len());
    }

    #[test]
    fn pops_in_cost_order() {
        let costs = vec![50, 10, 40, 30, 20];
        let mut heap = IndexedHeap::new(costs.len());
        for id in 0..costs.len() {
            heap.push(id, |i| costs[i]);
        }
        let mut popped = Vec::new();
        while let Some(id) = heap.pop(|i| costs[i]) {
            popped.push(costs[id]);
        }
        assert_eq!(popped, vec![10, 20, 30, 40, 50]);
        assert!(!heap.contains(0));
    }

    #[test]
    fn decrease_key_moves_to_root() {
        let mut costs = vec![5, 6, 7, 8];
        let mut heap = IndexedHeap::new(costs.len());
        for id in 0..costs.len() {
            heap.push(id, |i| costs[i]);
        }
        costs[3] = 1;
        heap.decrease_key(3, |i| costs[i]);
        assert_eq!(heap.peek(), Some(3));
        assert_consistent(&heap, &costs);
    }

    /// Random push/pop/decrease-key sequences keep the root minimal and the slot table in sync.
    #[test]
    fn random_operations_keep_invariant() {
        const N: usize = 64;
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let mut costs: Vec<i32> = (0..N).map(|_| rng.gen_range(0..1000)).collect();
            let mut heap = IndexedHeap::new(N);
            for _ in 0..300 {
                let id = rng.gen_range(0..N);
                match rng.gen_range(0..3) {
                    0 if !heap.contains(id) => heap.push(id, |i| costs[i]),
                    1 if heap.contains(id) => {
                        costs[id] -= rng.gen_range(0..100);
                        heap.decrease_key(id, |i| costs[i]);
                    }
                    _ => {
                        if let Some(min) = heap.pop(|i| costs[i]) {
                            assert!(heap.items.iter().all(|&other| costs[min] <= costs[other]));
                        }
                    }
                }
                assert_consistent(&heap, &costs);
                if let Some(root) = heap.peek() {
                    assert!(heap.items.iter().all(|&other| costs[root] <= costs[other]));
                }
            }
        }
    }

    #[test]
    fn reset_forgets_members() {
        let costs = vec![3, 2, 1];
        let mut heap = IndexedHeap::new(3);
        heap.push(0, |i| costs[i]);
        heap.push(2, |i| costs[i]);
        heap.reset(5);
        assert!(heap.is_empty());
        assert!(!heap.contains(2));
        assert_eq!(heap.capacity(), 5);
    }
}
