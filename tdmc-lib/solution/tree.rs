use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Sparse solution table: a bit-trie over the binary expansion of the
/// assignment id, packed into a flat vector of 64-bit words.
///
/// Word 0 is the root. An interior word holds two 32-bit child indices, the
/// lower half for bit 0 and the upper half for bit 1; index 0 means "no such
/// assignment". The word reached after `num_vars` steps holds the bit
/// pattern of the count as a double. Only assignments with a positive count
/// occupy nodes, which makes this the layout of choice for sparse tables.
///
/// Nodes are bump-allocated from a shared atomic counter; child links are
/// published with 64-bit compare-and-swap so concurrent inserts of distinct
/// ids may share prefixes. A lost allocation race leaves a hole in the
/// vector, never a dangling link.
#[derive(Debug)]
pub struct TreeSolution {
    elements: Vec<AtomicU64>,
    size: AtomicU64,
    num_vars: usize,
    min_id: u64,
    max_id: u64,
    num_solutions: u64,
    overflow: AtomicBool,
}

impl TreeSolution {
    /// Empty trie over `[min_id, max_id)` with room for `capacity` words.
    #[must_use]
    pub fn with_capacity(
        capacity: usize,
        num_vars: usize,
        min_id: u64,
        max_id: u64,
    ) -> TreeSolution {
        debug_assert!(min_id < max_id);
        let capacity = capacity.max(2);
        let mut elements = Vec::with_capacity(capacity);
        elements.resize_with(capacity, || AtomicU64::new(0));
        TreeSolution {
            elements,
            size: AtomicU64::new(0),
            num_vars,
            min_id,
            max_id,
            num_solutions: 0,
            overflow: AtomicBool::new(false),
        }
    }

    /// Copy of `self` with enough headroom to additionally absorb every node
    /// of `other`, used by the tree-combine step.
    #[must_use]
    pub fn with_room_for(&self, other: &TreeSolution, slack: usize) -> TreeSolution {
        let used = self.allocated_words();
        let capacity = used + other.allocated_words() + slack;
        let mut merged = TreeSolution::with_capacity(
            capacity,
            self.num_vars,
            self.min_id.min(other.min_id),
            self.max_id.max(other.max_id),
        );
        for (slot, word) in merged.elements[..used].iter_mut().zip(&self.elements[..used]) {
            *slot = AtomicU64::new(word.load(Ordering::Relaxed));
        }
        merged.size = AtomicU64::new(self.size.load(Ordering::Relaxed));
        merged.num_solutions = self.num_solutions;
        merged
    }

    #[must_use]
    pub fn min_id(&self) -> u64 {
        self.min_id
    }

    #[must_use]
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        (self.min_id..self.max_id).contains(&id)
    }

    #[must_use]
    pub fn num_solutions(&self) -> u64 {
        self.num_solutions
    }

    pub fn set_num_solutions(&mut self, num_solutions: u64) {
        self.num_solutions = num_solutions;
    }

    /// Root plus every word handed out so far, capped at the capacity.
    #[must_use]
    pub fn allocated_words(&self) -> usize {
        let handed_out = 1 + self.size.load(Ordering::Relaxed) as usize;
        handed_out.min(self.elements.len())
    }

    #[must_use]
    pub fn words(&self) -> usize {
        self.elements.len()
    }

    /// True once an insert ran out of preallocated words; the fragment's
    /// contents are unusable and the launch must be redone with more room.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Count stored for `id`, 0.0 when no path exists.
    #[must_use]
    pub fn get_count(&self, id: u64) -> f64 {
        debug_assert!(self.contains(id));
        if self.num_vars == 0 {
            return f64::from_bits(self.elements[0].load(Ordering::Acquire));
        }

        let mut node = 0usize;
        for step in 0..self.num_vars {
            let bit = (id >> (self.num_vars - step - 1)) & 1;
            let word = self.elements[node].load(Ordering::Acquire);
            let child = if bit == 0 { word & 0xffff_ffff } else { word >> 32 };
            if child == 0 {
                return 0.0;
            }
            node = child as usize;
        }
        f64::from_bits(self.elements[node].load(Ordering::Acquire))
    }

    /// Store `count` for `id`, allocating missing trie nodes on the way
    /// down. Concurrent calls for distinct ids are safe; the caller must not
    /// write the same id from two lanes within one launch.
    pub fn set_count(&self, id: u64, count: f64) {
        debug_assert!(self.contains(id));
        if self.num_vars == 0 {
            self.elements[0].store(count.to_bits(), Ordering::Release);
            self.size.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut node = 0usize;
        for step in 0..self.num_vars {
            let bit = (id >> (self.num_vars - step - 1)) & 1;
            let mut reserved: Option<u64> = None;
            loop {
                let word = self.elements[node].load(Ordering::Acquire);
                let child = if bit == 0 { word & 0xffff_ffff } else { word >> 32 };
                if child != 0 {
                    // Either it already existed or another lane won the
                    // race; a reservation of ours stays an unused hole.
                    node = child as usize;
                    break;
                }

                let fresh = match reserved {
                    Some(fresh) => fresh,
                    None => {
                        let fresh = self.size.fetch_add(1, Ordering::Relaxed) + 1;
                        if fresh as usize >= self.elements.len() {
                            self.overflow.store(true, Ordering::Relaxed);
                            return;
                        }
                        reserved = Some(fresh);
                        fresh
                    }
                };
                let linked = if bit == 0 { word | fresh } else { word | (fresh << 32) };
                if self.elements[node]
                    .compare_exchange(word, linked, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    node = fresh as usize;
                    break;
                }
            }
        }
        self.elements[node].store(count.to_bits(), Ordering::Release);
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::TreeSolution;

    #[test]
    fn set_then_get_roundtrips() {
        let trie = TreeSolution::with_capacity(64, 3, 0, 8);
        trie.set_count(0b101, 4.5);
        trie.set_count(0b000, 1.0);
        assert_eq!(trie.get_count(0b101), 4.5);
        assert_eq!(trie.get_count(0b000), 1.0);
        assert_eq!(trie.get_count(0b111), 0.0);
        assert_eq!(trie.get_count(0b001), 0.0);
    }

    #[test]
    fn overwrite_keeps_the_path() {
        let trie = TreeSolution::with_capacity(64, 2, 0, 4);
        trie.set_count(2, 1.0);
        trie.set_count(2, 3.0);
        assert_eq!(trie.get_count(2), 3.0);
    }

    #[test]
    fn zero_width_trie_holds_a_single_value() {
        let trie = TreeSolution::with_capacity(2, 0, 0, 1);
        assert_eq!(trie.get_count(0), 0.0);
        trie.set_count(0, 7.25);
        assert_eq!(trie.get_count(0), 7.25);
        assert_eq!(trie.allocated_words(), 2);
    }

    #[test]
    fn exhausted_capacity_raises_the_overflow_flag() {
        let trie = TreeSolution::with_capacity(3, 4, 0, 16);
        trie.set_count(0b1010, 1.0);
        assert!(trie.overflowed());
    }

    #[test]
    fn dense_inserts_fit_the_worst_case_bound() {
        let num_vars = 4;
        let capacity = 16 * (num_vars + 1) + 2;
        let trie = TreeSolution::with_capacity(capacity, num_vars, 0, 16);
        for id in 0..16 {
            trie.set_count(id, (id + 1) as f64);
        }
        assert!(!trie.overflowed());
        for id in 0..16 {
            assert_eq!(trie.get_count(id), (id + 1) as f64);
        }
    }
}
