use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use rayon::prelude::*;

use crate::formula::{Polarity, SatFormula};
use crate::solution::SolutionTable;
use crate::util::{ilogb, sorted_union};

/// The introduce-forget kernel of one bag.
///
/// The kernel works over the *intermediate* variable set I = F ∪ E, where F
/// is the bag's own variable list and E the child's. Variables in I \ E are
/// introduced here (their weights enter the product), variables in I \ F are
/// forgotten here (the kernel sums over their `2^|I\F|` extensions). All bit
/// positions refer to the ascending order of the respective list.
pub(crate) struct IntroduceForgetKernel<'a> {
    formula: &'a SatFormula,
    /// Position in I of the a-th bag variable.
    bag_positions: Vec<usize>,
    /// Position in I of the b-th child variable.
    child_positions: Vec<usize>,
    /// Positions in I of the forgotten variables.
    forgotten_positions: Vec<usize>,
    /// Introduced variables with their position in I.
    introduced: Vec<(usize, u64)>,
    /// Clauses fully covered by I, literals mapped to (position, polarity).
    clauses: Vec<Vec<(usize, bool)>>,
    weighted: bool,
    with_exponent: bool,
}

impl<'a> IntroduceForgetKernel<'a> {
    pub(crate) fn new(
        formula: &'a SatFormula,
        bag_vars: &[u64],
        child_vars: &[u64],
        weighted: bool,
        with_exponent: bool,
    ) -> IntroduceForgetKernel<'a> {
        let intermediate = sorted_union(bag_vars, child_vars);

        let mut bag_positions = Vec::with_capacity(bag_vars.len());
        let mut forgotten_positions = Vec::new();
        let mut a = 0;
        for (i, v) in intermediate.iter().enumerate() {
            if a < bag_vars.len() && bag_vars[a] == *v {
                bag_positions.push(i);
                a += 1;
            } else {
                forgotten_positions.push(i);
            }
        }

        let mut child_positions = Vec::with_capacity(child_vars.len());
        let mut introduced = Vec::new();
        let mut b = 0;
        for (i, v) in intermediate.iter().enumerate() {
            if b < child_vars.len() && child_vars[b] == *v {
                child_positions.push(i);
                b += 1;
            } else {
                introduced.push((i, *v));
            }
        }

        let mut clauses = Vec::new();
        for clause in formula.clauses() {
            let mut mapped = Vec::with_capacity(clause.len());
            let mut covered = true;
            for lit in clause {
                match intermediate.binary_search(&lit.variable()) {
                    Ok(pos) => mapped.push((pos, lit.polarity() == Polarity::Positive)),
                    Err(_) => {
                        covered = false;
                        break;
                    }
                }
            }
            if covered {
                clauses.push(mapped);
            }
        }

        IntroduceForgetKernel {
            formula,
            bag_positions,
            child_positions,
            forgotten_positions,
            introduced,
            clauses,
            weighted,
            with_exponent,
        }
    }

    fn combinations(&self) -> u64 {
        1u64 << self.forgotten_positions.len()
    }

    /// Spread the bits of a bag assignment onto their positions in I.
    fn template_id(&self, id: u64) -> u64 {
        self.bag_positions
            .iter()
            .enumerate()
            .fold(0, |acc, (a, pos)| acc | (((id >> a) & 1) << pos))
    }

    /// Fill the forgotten positions of a template with combination `combo`.
    fn extend(&self, template: u64, combo: u64) -> u64 {
        self.forgotten_positions
            .iter()
            .enumerate()
            .fold(template, |acc, (k, pos)| acc | (((combo >> k) & 1) << pos))
    }

    /// Project an intermediate assignment down to the child's id space.
    fn project_to_child(&self, id: u64) -> u64 {
        self.child_positions
            .iter()
            .enumerate()
            .fold(0, |acc, (b, pos)| acc | (((id >> pos) & 1) << b))
    }

    /// Every covered clause must have a satisfied literal under `id`.
    fn check_bag(&self, id: u64) -> bool {
        self.clauses.iter().all(|clause| {
            clause
                .iter()
                .any(|(pos, positive)| (((id >> pos) & 1) == 1) == *positive)
        })
    }

    /// Weight product over the variables introduced at this bag.
    fn introduce_weight(&self, id: u64) -> f64 {
        if !self.weighted {
            return 1.0;
        }
        self.introduced
            .iter()
            .map(|(pos, var)| self.formula.weight_of_assignment(*var, (id >> pos) & 1))
            .product()
    }

    /// Contribution of one extended assignment: child count times the
    /// introduced weights, 1 times the weights at a leaf. `None` when the
    /// child id lies in a fragment that is not loaded in this launch.
    fn solve_introduce(&self, child: Option<&SolutionTable>, id: u64) -> Option<f64> {
        let weight = self.introduce_weight(id);
        match child {
            Some(table) => table
                .fetch(self.project_to_child(id))
                .map(|count| count * weight),
            None => Some(weight),
        }
    }

    fn accumulate(&self, child: Option<&SolutionTable>, id: u64) -> f64 {
        let template = self.template_id(id);
        let mut tmp = 0.0;
        for combo in 0..self.combinations() {
            let extended = self.extend(template, combo);
            if !self.check_bag(extended) {
                continue;
            }
            if let Some(contribution) = self.solve_introduce(child, extended) {
                tmp += contribution;
            }
        }
        tmp
    }

    /// One launch over the target fragment's id range against one child
    /// fragment (or no child for leaves). Contributions are divided by the
    /// exponent correction `value` and added onto whatever previous launches
    /// stored. A value that is still non-finite after the division raises
    /// `overflow`; the driver decides whether correction can be applied or
    /// the solve must abort.
    pub(crate) fn launch(
        &self,
        child: Option<&SolutionTable>,
        target: &mut SolutionTable,
        value: f64,
        exponent: &AtomicI64,
        tally: &AtomicU64,
        overflow: &AtomicBool,
    ) {
        let with_exponent = self.with_exponent;
        match target {
            SolutionTable::Array(table) => {
                let min_id = table.min_id();
                table
                    .elements_mut()
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(offset, slot)| {
                        let id = min_id + offset as u64;
                        let tmp = self.accumulate(child, id);
                        if tmp > 0.0 {
                            let previous = *slot;
                            let updated = tmp / value + previous;
                            if updated.is_finite() {
                                if previous == 0.0 && updated > 0.0 {
                                    tally.fetch_add(1, Ordering::Relaxed);
                                }
                                if with_exponent && updated > 0.0 {
                                    exponent.fetch_max(ilogb(updated), Ordering::Relaxed);
                                }
                            } else {
                                overflow.store(true, Ordering::Relaxed);
                            }
                            *slot = updated;
                        }
                    });
            }
            SolutionTable::Tree(trie) => {
                let trie = &*trie;
                (trie.min_id()..trie.max_id()).into_par_iter().for_each(|id| {
                    let tmp = self.accumulate(child, id);
                    if tmp > 0.0 {
                        let previous = trie.get_count(id);
                        let updated = tmp / value + previous;
                        if updated.is_finite() {
                            if previous == 0.0 && updated > 0.0 {
                                tally.fetch_add(1, Ordering::Relaxed);
                            }
                            if with_exponent && updated > 0.0 {
                                exponent.fetch_max(ilogb(updated), Ordering::Relaxed);
                            }
                        } else {
                            overflow.store(true, Ordering::Relaxed);
                        }
                        trie.set_count(id, updated);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::IntroduceForgetKernel;
    use crate::formula::SatFormula;

    #[test]
    fn bit_templates_respect_orderings() {
        let formula = SatFormula::new(5, &[]);
        // F = {2, 5}, E = {2, 3}, I = {2, 3, 5}: position 0 holds 2,
        // position 1 holds 3 (forgotten), position 2 holds 5 (introduced).
        let kernel = IntroduceForgetKernel::new(&formula, &[2, 5], &[2, 3], false, false);
        assert_eq!(kernel.bag_positions, vec![0, 2]);
        assert_eq!(kernel.forgotten_positions, vec![1]);
        assert_eq!(kernel.introduced, vec![(2, 5)]);
        assert_eq!(kernel.combinations(), 2);

        // Bag id 0b10 assigns 2 := 0, 5 := 1.
        let template = kernel.template_id(0b10);
        assert_eq!(template, 0b100);
        assert_eq!(kernel.extend(template, 0), 0b100);
        assert_eq!(kernel.extend(template, 1), 0b110);
        // Child sees {2, 3} of the extended assignment.
        assert_eq!(kernel.project_to_child(0b110), 0b10);
        assert_eq!(kernel.project_to_child(0b101), 0b01);
    }

    #[test]
    fn clause_checks_cover_only_contained_clauses() {
        let formula = SatFormula::new(4, &[vec![1, -2], vec![3, 4]]);
        let kernel = IntroduceForgetKernel::new(&formula, &[1, 2], &[], false, false);
        // Only the first clause fits inside I = {1, 2}.
        assert_eq!(kernel.clauses.len(), 1);
        assert!(kernel.check_bag(0b01)); // 1 := 1 satisfies it
        assert!(kernel.check_bag(0b00)); // 2 := 0 satisfies it
        assert!(!kernel.check_bag(0b10)); // 1 := 0, 2 := 1 falsifies it
    }
}
