use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rayon::prelude::*;

use crate::formula::SatFormula;
use crate::solution::{ArraySolution, SolutionTable};
use crate::util::{ilogb, sorted_intersection};

/// The join kernel: multiplies the tables of two solved subtrees over the
/// union of their bag variables. Output is always a dense array.
///
/// Child fragments are visited pairwise by index; for a fixed assignment,
/// exactly one visit finds its projection inside each child's loaded range.
/// When both land in the same visit the slot is written in one go; when they
/// land in different visits the first one stores its factor (with the
/// division applied) and the later one folds the other factor in by plain
/// multiplication, so `value` and the weight divisor are applied exactly
/// once per slot.
pub(crate) struct JoinKernel<'a> {
    formula: &'a SatFormula,
    /// Position in the union of the b-th variable of either child.
    child1_positions: Vec<usize>,
    child2_positions: Vec<usize>,
    /// Variables present in both children with their union position; their
    /// weights were multiplied in on both sides and are divided out once.
    shared: Vec<(usize, u64)>,
    weighted: bool,
    with_exponent: bool,
}

impl<'a> JoinKernel<'a> {
    pub(crate) fn new(
        formula: &'a SatFormula,
        union_vars: &[u64],
        child1_vars: &[u64],
        child2_vars: &[u64],
        weighted: bool,
        with_exponent: bool,
    ) -> JoinKernel<'a> {
        let positions_of = |child: &[u64]| {
            let mut positions = Vec::with_capacity(child.len());
            let mut b = 0;
            for (i, v) in union_vars.iter().enumerate() {
                if b < child.len() && child[b] == *v {
                    positions.push(i);
                    b += 1;
                }
            }
            debug_assert_eq!(positions.len(), child.len());
            positions
        };

        let shared = sorted_intersection(child1_vars, child2_vars)
            .into_iter()
            .map(|var| (union_vars.binary_search(&var).unwrap(), var))
            .collect();

        JoinKernel {
            formula,
            child1_positions: positions_of(child1_vars),
            child2_positions: positions_of(child2_vars),
            shared,
            weighted,
            with_exponent,
        }
    }

    fn project(positions: &[usize], id: u64) -> u64 {
        positions
            .iter()
            .enumerate()
            .fold(0, |acc, (b, pos)| acc | (((id >> pos) & 1) << b))
    }

    fn weight_divisor(&self, id: u64) -> f64 {
        if !self.weighted {
            return 1.0;
        }
        self.shared
            .iter()
            .map(|(pos, var)| self.formula.weight_of_assignment(*var, (id >> pos) & 1))
            .product()
    }

    /// One launch over the target fragment against the i-th fragment of
    /// each child (either side may be exhausted and absent). A slot that is
    /// still non-finite after the division by `value` raises `overflow`.
    pub(crate) fn launch(
        &self,
        edge1: Option<&SolutionTable>,
        edge2: Option<&SolutionTable>,
        target: &mut ArraySolution,
        value: f64,
        exponent: &AtomicI64,
        tally: &AtomicI64,
        overflow: &AtomicBool,
    ) {
        let with_exponent = self.with_exponent;
        let min_id = target.min_id();
        target
            .elements_mut()
            .par_iter_mut()
            .enumerate()
            .for_each(|(offset, slot)| {
                let id = min_id + offset as u64;
                let tmp1 = edge1.and_then(|t| t.fetch(Self::project(&self.child1_positions, id)));
                let tmp2 = edge2.and_then(|t| t.fetch(Self::project(&self.child2_positions, id)));

                let previous = *slot;
                let updated = match (tmp1, tmp2) {
                    (Some(first), Some(second)) => {
                        let stored = first * second / value / self.weight_divisor(id);
                        if stored > 0.0 {
                            tally.fetch_add(1, Ordering::Relaxed);
                        }
                        Some(stored)
                    }
                    (Some(only), None) | (None, Some(only)) => {
                        if previous < 0.0 {
                            let stored = only / value / self.weight_divisor(id);
                            if stored > 0.0 {
                                tally.fetch_add(1, Ordering::Relaxed);
                            }
                            Some(stored)
                        } else {
                            let stored = previous * only;
                            if previous > 0.0 && stored == 0.0 {
                                tally.fetch_sub(1, Ordering::Relaxed);
                            }
                            Some(stored)
                        }
                    }
                    (None, None) => None,
                };

                if let Some(updated) = updated {
                    *slot = updated;
                    if !updated.is_finite() {
                        overflow.store(true, Ordering::Relaxed);
                    } else if with_exponent && updated > 0.0 {
                        exponent.fetch_max(ilogb(updated), Ordering::Relaxed);
                    }
                }
            });
    }
}
