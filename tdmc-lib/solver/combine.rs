use rayon::prelude::*;

use crate::solution::TreeSolution;

/// Re-insert every positive entry of `source` into `target`. Used to merge
/// the trie fragments a chunked bag produced into one trie over the full
/// assignment space; the fragments cover disjoint id ranges, so the merge is
/// a point-wise union and the insert order does not matter.
///
/// `target` must have been allocated with room for `source`'s nodes (see
/// [`TreeSolution::with_room_for`]); the caller checks the overflow flag.
pub(crate) fn combine_tree(target: &TreeSolution, source: &TreeSolution) {
    (source.min_id()..source.max_id())
        .into_par_iter()
        .for_each(|id| {
            let count = source.get_count(id);
            if count > 0.0 {
                target.set_count(id, count);
            }
        });
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::combine_tree;
    use crate::solution::TreeSolution;

    #[test]
    fn merging_disjoint_tries_sums_pointwise() {
        let first = TreeSolution::with_capacity(64, 3, 0, 4);
        first.set_count(1, 2.0);
        first.set_count(3, 4.0);
        let second = TreeSolution::with_capacity(64, 3, 4, 8);
        second.set_count(5, 8.0);
        second.set_count(7, 16.0);

        let merged = first.with_room_for(&second, 16);
        combine_tree(&merged, &second);

        assert!(!merged.overflowed());
        assert_eq!(merged.min_id(), 0);
        assert_eq!(merged.max_id(), 8);
        for (id, expected) in [
            (0, 0.0),
            (1, 2.0),
            (3, 4.0),
            (5, 8.0),
            (7, 16.0),
            (6, 0.0),
        ] {
            assert_eq!(merged.get_count(id), expected);
        }
    }

    #[test]
    fn merging_an_empty_source_changes_nothing() {
        let first = TreeSolution::with_capacity(64, 2, 0, 2);
        first.set_count(1, 3.0);
        let empty = TreeSolution::with_capacity(8, 2, 2, 4);

        let merged = first.with_room_for(&empty, 8);
        combine_tree(&merged, &empty);
        assert_eq!(merged.get_count(1), 3.0);
        assert_eq!(merged.get_count(2), 0.0);
    }
}
