//! The dynamic-programming engine: a post-order walk over the decomposition
//! that fills per-bag solution tables through data-parallel kernel launches.
mod combine;
mod introduce_forget;
mod join;
pub mod options;

pub use options::{DataStructure, SolveConfig};

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use anyhow::{bail, Result};

use crate::decomposition::{BagIdx, TreeDecomposition};
use crate::formula::SatFormula;
use crate::solution::{ArraySolution, SolutionTable, TreeSolution};
use crate::solver::introduce_forget::IntroduceForgetKernel;
use crate::solver::join::JoinKernel;
use crate::util::sorted_union;

/// Ids are packed into 64-bit integers; one bit is kept in reserve so that
/// `1 << width` cannot wrap.
const MAX_ASSIGNMENT_BITS: usize = 61;

/// Counters accumulated over one solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolveStats {
    pub num_join: u64,
    pub num_introduce_forget: u64,
    /// Largest number of 64-bit words any single fragment occupied.
    pub max_table_size: usize,
}

/// Outcome of a solve. The exact count is `value * 2^exponent`; in
/// no-exponent mode `exponent` is 0 and `value` is the count itself.
#[derive(Debug, Clone, Copy)]
pub struct SolveResult {
    pub is_sat: bool,
    pub value: f64,
    pub exponent: i64,
    pub stats: SolveStats,
}

impl SolveResult {
    /// The count folded back into a single double; may overflow to infinity
    /// for astronomically large counts.
    #[must_use]
    pub fn model_count(&self) -> f64 {
        if !self.is_sat {
            return 0.0;
        }
        let exponent = self.exponent.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.value * 2f64.powi(exponent)
    }

    /// Decimal logarithm of the count, usable even when `model_count`
    /// overflows.
    #[must_use]
    pub fn log10_count(&self) -> Option<f64> {
        if !self.is_sat || self.value <= 0.0 {
            return None;
        }
        Some(self.value.log10() + self.exponent as f64 * 2f64.log10())
    }
}

/// A solved subtree: the solution-table fragments of its topmost bag plus
/// the exponent bookkeeping needed to interpret them. The true count behind
/// an entry is `stored * 2^(correction + exponent)`; `exponent` alone is the
/// normalisation the parent's kernel divides out.
struct SolvedBag {
    variables: Vec<u64>,
    fragments: Vec<SolutionTable>,
    exponent: i64,
    correction: i64,
}

impl SolvedBag {
    fn unsat() -> SolvedBag {
        SolvedBag {
            variables: Vec::new(),
            fragments: Vec::new(),
            exponent: 0,
            correction: 0,
        }
    }

    fn total_solutions(&self) -> u64 {
        self.fragments.iter().map(SolutionTable::num_solutions).sum()
    }
}

struct Solver<'a> {
    formula: &'a SatFormula,
    config: SolveConfig,
    weighted: bool,
    with_exponent: bool,
    is_sat: bool,
    stats: SolveStats,
}

/// Count the models of `formula` along `decomposition`.
///
/// # Errors
///
/// Returns an error when a bag (or the variable union met at a join)
/// exceeds the configured width caps, or when a trie fragment cannot be
/// fitted into the memory budget even after re-allocation.
pub fn solve(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    config: &SolveConfig,
) -> Result<SolveResult> {
    let weighted = config.weighted || formula.is_weighted();
    let solver = Solver {
        formula,
        config: config.clone(),
        weighted,
        // Counts can reach 2^n and join launches square intermediate
        // magnitudes, so normalisation kicks in early; weighted counts can
        // also underflow, which the negative exponents absorb.
        with_exponent: weighted || formula.num_vars() >= 40,
        is_sat: true,
        stats: SolveStats::default(),
    };
    solver.run(decomposition)
}

impl Solver<'_> {
    fn run(mut self, decomposition: &TreeDecomposition) -> Result<SolveResult> {
        for bag in decomposition.bags() {
            if bag.variables().len() > self.config.max_bag {
                bail!(
                    "bag {} spans {} variables, above the cap of {}",
                    bag.id(),
                    bag.variables().len(),
                    self.config.max_bag
                );
            }
        }
        let mentioned = decomposition.variables_in_bags();
        if let Some(&max_var) = mentioned.iter().next_back() {
            if max_var > self.formula.num_vars() {
                bail!(
                    "decomposition mentions variable {max_var} but the formula declares {}",
                    self.formula.num_vars()
                );
            }
        }
        for (idx, clause) in self.formula.clauses().enumerate() {
            let covered = decomposition.bags().any(|bag| {
                clause
                    .iter()
                    .all(|lit| bag.variables().binary_search(&lit.variable()).is_ok())
            });
            if !covered {
                bail!("no bag covers clause {}", idx + 1);
            }
        }

        tracing::info!(
            bags = decomposition.num_bags(),
            width = decomposition.width(),
            vars = self.formula.num_vars(),
            clauses = self.formula.num_clauses(),
            weighted = self.weighted,
            with_exponent = self.with_exponent,
            "starting solve"
        );

        let solved = self.solve_problem(decomposition, decomposition.root())?;
        if !self.is_sat {
            return Ok(self.unsat_result());
        }

        // Final introduce-forget into an empty pseudo-root: its single entry
        // sums the whole table of the real root.
        let root = self.introduce_forget_bag(&[], Some(solved))?;
        if !self.is_sat {
            return Ok(self.unsat_result());
        }

        let mut value = root.fragments[0].fetch(0).unwrap_or(0.0);
        let mut exponent = root.correction;
        if value <= 0.0 {
            self.is_sat = false;
            return Ok(self.unsat_result());
        }

        // Variables that occur in no bag are free: each doubles the count,
        // or contributes the sum of its two weights.
        for var in 1..=self.formula.num_vars() {
            if mentioned.contains(&var) {
                continue;
            }
            if self.weighted {
                value *= self.formula.weight_of_assignment(var, 1)
                    + self.formula.weight_of_assignment(var, 0);
            } else {
                exponent += 1;
            }
        }

        Ok(SolveResult {
            is_sat: true,
            value,
            exponent,
            stats: self.stats,
        })
    }

    fn unsat_result(&self) -> SolveResult {
        SolveResult {
            is_sat: false,
            value: 0.0,
            exponent: 0,
            stats: self.stats,
        }
    }

    /// Post-order walk. Multi-child bags are folded through pairwise joins
    /// before the bag's own introduce-forget pass.
    fn solve_problem(
        &mut self,
        decomposition: &TreeDecomposition,
        at: BagIdx,
    ) -> Result<SolvedBag> {
        let bag = decomposition.bag(at);
        tracing::debug!(
            bag = %at,
            kind = %decomposition.kind_of(at),
            vars = bag.variables().len(),
            "entering bag"
        );

        match bag.children() {
            [] => self.introduce_forget_bag(bag.variables(), None),
            [only] => {
                let child = self.solve_problem(decomposition, *only)?;
                if !self.is_sat {
                    return Ok(SolvedBag::unsat());
                }
                self.introduce_forget_bag(bag.variables(), Some(child))
            }
            [first, rest @ ..] => {
                let mut folded = self.solve_problem(decomposition, *first)?;
                for next in rest {
                    if !self.is_sat {
                        return Ok(SolvedBag::unsat());
                    }
                    let rhs = self.solve_problem(decomposition, *next)?;
                    if !self.is_sat {
                        return Ok(SolvedBag::unsat());
                    }
                    folded = self.join_bags(folded, rhs)?;
                    if !self.is_sat {
                        return Ok(SolvedBag::unsat());
                    }
                }
                self.introduce_forget_bag(bag.variables(), Some(folded))
            }
        }
    }

    /// Number of assignments a single fragment may cover. Trie fragments
    /// reserve room for their worst case, one path per assignment of the
    /// chunk.
    fn chunk_len(&self, total: u64, trie_depth: Option<usize>) -> u64 {
        let mut budget = (self.config.max_memory_buffer / std::mem::size_of::<f64>()) as u64;
        if let Some(depth) = trie_depth {
            budget /= depth as u64 + 2;
        }
        budget.clamp(1, total)
    }

    fn buffer_words(&self) -> usize {
        (self.config.max_memory_buffer / std::mem::size_of::<u64>()).max(2)
    }

    fn introduce_forget_bag(
        &mut self,
        bag_vars: &[u64],
        child: Option<SolvedBag>,
    ) -> Result<SolvedBag> {
        let child_vars = child.as_ref().map_or(&[][..], |c| c.variables.as_slice());
        let intermediate = sorted_union(bag_vars, child_vars);
        if intermediate.len() > MAX_ASSIGNMENT_BITS {
            bail!(
                "introduce-forget spans {} variables, above the assignment-id limit of {}",
                intermediate.len(),
                MAX_ASSIGNMENT_BITS
            );
        }

        let value = child.as_ref().map_or(1.0, |c| (c.exponent as f64).exp2());
        let correction = child.as_ref().map_or(0, |c| c.correction + c.exponent);
        let total = 1u64 << bag_vars.len();
        let trie_depth = matches!(self.config.data_structure, DataStructure::Tree)
            .then_some(bag_vars.len());
        let chunk_len = self.chunk_len(total, trie_depth);

        // A numeric overflow on the first pass switches the solve into
        // exponent mode and redoes the bag; overflow that persists after
        // correction is fatal.
        loop {
            let kernel = IntroduceForgetKernel::new(
                self.formula,
                bag_vars,
                child_vars,
                self.weighted,
                self.with_exponent,
            );
            let exponent_acc = AtomicI64::new(i64::MIN);
            let overflow = AtomicBool::new(false);

            let mut fragments = Vec::new();
            let mut start = 0u64;
            while start < total {
                let end = total.min(start + chunk_len);
                let tally = AtomicU64::new(0);
                let mut fragment = match self.config.data_structure {
                    DataStructure::Array => {
                        let mut table = SolutionTable::Array(ArraySolution::zeroed(start, end));
                        self.launch_introduce_forget(
                            &kernel,
                            child.as_ref(),
                            &mut table,
                            value,
                            &exponent_acc,
                            &tally,
                            &overflow,
                        );
                        table
                    }
                    DataStructure::Tree => self.build_tree_fragment(
                        &kernel,
                        child.as_ref(),
                        bag_vars.len(),
                        start,
                        end,
                        value,
                        &exponent_acc,
                        &tally,
                        &overflow,
                    )?,
                };

                fragment.set_num_solutions(tally.load(Ordering::Relaxed));
                self.stats.max_table_size = self.stats.max_table_size.max(fragment.words());
                fragments.push(fragment);
                start = end;
            }

            if overflow.load(Ordering::Relaxed) {
                if self.with_exponent {
                    bail!(
                        "numeric overflow over {} variables persists after exponent correction",
                        intermediate.len()
                    );
                }
                tracing::warn!("numeric overflow, redoing the bag with exponent correction");
                self.with_exponent = true;
                continue;
            }

            if matches!(self.config.data_structure, DataStructure::Tree) && fragments.len() > 1 {
                fragments = vec![self.combine_fragments(fragments)?];
            }

            self.stats.num_introduce_forget += 1;
            let solved = self.finish_bag(bag_vars, fragments, correction, &exponent_acc);
            tracing::debug!(
                solutions = solved.total_solutions(),
                exponent = solved.exponent,
                "introduce-forget done"
            );
            return Ok(solved);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_introduce_forget(
        &self,
        kernel: &IntroduceForgetKernel,
        child: Option<&SolvedBag>,
        target: &mut SolutionTable,
        value: f64,
        exponent: &AtomicI64,
        tally: &AtomicU64,
        overflow: &AtomicBool,
    ) {
        match child {
            None => {
                if self.config.do_trace {
                    tracing::trace!(
                        min_id = target.min_id(),
                        max_id = target.max_id(),
                        "launching leaf introduce-forget"
                    );
                }
                kernel.launch(None, target, value, exponent, tally, overflow);
            }
            Some(solved) => {
                for fragment in &solved.fragments {
                    if self.config.do_trace {
                        tracing::trace!(
                            min_id = target.min_id(),
                            max_id = target.max_id(),
                            child_min = fragment.min_id(),
                            child_max = fragment.max_id(),
                            "launching introduce-forget"
                        );
                    }
                    kernel.launch(Some(fragment), target, value, exponent, tally, overflow);
                    if let SolutionTable::Tree(trie) = target {
                        if trie.overflowed() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Allocate a trie fragment and run the launches over it, re-allocating
    /// with doubled capacity until the inserts fit or the memory budget is
    /// exhausted.
    #[allow(clippy::too_many_arguments)]
    fn build_tree_fragment(
        &self,
        kernel: &IntroduceForgetKernel,
        child: Option<&SolvedBag>,
        num_vars: usize,
        start: u64,
        end: u64,
        value: f64,
        exponent: &AtomicI64,
        tally: &AtomicU64,
        overflow: &AtomicBool,
    ) -> Result<SolutionTable> {
        let span = end - start;
        let estimate = child
            .map(SolvedBag::total_solutions)
            .unwrap_or(span)
            .clamp(1, span);
        let mut capacity = ((estimate as usize + 2).saturating_mul(num_vars + 1) + 2)
            .min(self.buffer_words());

        loop {
            let trie = TreeSolution::with_capacity(capacity, num_vars, start, end);
            let mut table = SolutionTable::Tree(trie);
            tally.store(0, Ordering::Relaxed);
            self.launch_introduce_forget(
                kernel, child, &mut table, value, exponent, tally, overflow,
            );

            let SolutionTable::Tree(trie) = &table else {
                unreachable!()
            };
            if !trie.overflowed() {
                return Ok(table);
            }
            if capacity >= self.buffer_words() {
                bail!(
                    "trie fragment over [{start}, {end}) exceeds the memory budget of {} bytes",
                    self.config.max_memory_buffer
                );
            }
            capacity = (capacity * 2).min(self.buffer_words());
            tracing::debug!(capacity, "trie overflow, re-launching with more room");
        }
    }

    /// Fold chunked trie fragments into a single trie over the bag's whole
    /// assignment space.
    fn combine_fragments(&mut self, fragments: Vec<SolutionTable>) -> Result<SolutionTable> {
        let mut tries = fragments.into_iter().map(|fragment| match fragment {
            SolutionTable::Tree(trie) => trie,
            SolutionTable::Array(_) => unreachable!("only tree fragments are combined"),
        });
        let mut accumulated = tries.next().expect("chunking produced no fragments");

        for source in tries {
            let mut slack = 64;
            accumulated = loop {
                let merged = accumulated.with_room_for(&source, slack);
                combine::combine_tree(&merged, &source);
                if !merged.overflowed() {
                    break merged;
                }
                slack = slack * 2 + source.words();
                if accumulated.words() + source.words() + slack > 2 * self.buffer_words() {
                    bail!("combined trie exceeds the memory budget");
                }
            };
            accumulated
                .set_num_solutions(accumulated.num_solutions() + source.num_solutions());
            if self.config.do_trace {
                tracing::trace!(
                    min_id = accumulated.min_id(),
                    max_id = accumulated.max_id(),
                    words = accumulated.allocated_words(),
                    "combined trie fragments"
                );
            }
        }

        self.stats.max_table_size = self.stats.max_table_size.max(accumulated.words());
        Ok(SolutionTable::Tree(accumulated))
    }

    fn join_bags(&mut self, lhs: SolvedBag, rhs: SolvedBag) -> Result<SolvedBag> {
        let union_vars = sorted_union(&lhs.variables, &rhs.variables);
        if union_vars.len() > MAX_ASSIGNMENT_BITS {
            bail!(
                "join spans {} variables, above the assignment-id limit of {}",
                union_vars.len(),
                MAX_ASSIGNMENT_BITS
            );
        }
        let value = ((lhs.exponent + rhs.exponent) as f64).exp2();
        let correction = lhs.correction + lhs.exponent + rhs.correction + rhs.exponent;
        let total = 1u64 << union_vars.len();
        let chunk_len = self.chunk_len(total, None);

        loop {
            let kernel = JoinKernel::new(
                self.formula,
                &union_vars,
                &lhs.variables,
                &rhs.variables,
                self.weighted,
                self.with_exponent,
            );
            let exponent_acc = AtomicI64::new(i64::MIN);
            let overflow = AtomicBool::new(false);

            let mut fragments = Vec::new();
            let mut start = 0u64;
            while start < total {
                let end = total.min(start + chunk_len);
                let mut target = ArraySolution::filled(-1.0, start, end);
                let tally = AtomicI64::new(0);

                let visits = lhs.fragments.len().max(rhs.fragments.len());
                for visit in 0..visits {
                    if self.config.do_trace {
                        tracing::trace!(min_id = start, max_id = end, visit, "launching join");
                    }
                    kernel.launch(
                        lhs.fragments.get(visit),
                        rhs.fragments.get(visit),
                        &mut target,
                        value,
                        &exponent_acc,
                        &tally,
                        &overflow,
                    );
                }

                target.set_num_solutions(tally.load(Ordering::Relaxed).max(0) as u64);
                self.stats.max_table_size = self.stats.max_table_size.max(target.words());
                fragments.push(SolutionTable::Array(target));
                start = end;
            }

            if overflow.load(Ordering::Relaxed) {
                if self.with_exponent {
                    bail!(
                        "numeric overflow over {} variables persists after exponent correction",
                        union_vars.len()
                    );
                }
                tracing::warn!("numeric overflow, redoing the join with exponent correction");
                self.with_exponent = true;
                continue;
            }

            self.stats.num_join += 1;
            let solved = self.finish_bag(&union_vars, fragments, correction, &exponent_acc);
            tracing::debug!(
                solutions = solved.total_solutions(),
                exponent = solved.exponent,
                "join done"
            );
            return Ok(solved);
        }
    }

    /// Close out a bag: read back the exponent, detect an unsatisfiable
    /// subtree, and hand the fragments to the parent.
    fn finish_bag(
        &mut self,
        variables: &[u64],
        fragments: Vec<SolutionTable>,
        correction: i64,
        exponent_acc: &AtomicI64,
    ) -> SolvedBag {
        let solved = SolvedBag {
            variables: variables.to_vec(),
            fragments,
            exponent: match exponent_acc.load(Ordering::Relaxed) {
                i64::MIN => 0,
                raw if self.with_exponent => raw,
                _ => 0,
            },
            correction,
        };
        if solved.total_solutions() == 0 {
            tracing::info!("bag finished with no surviving assignments");
            self.is_sat = false;
        }
        solved
    }
}
