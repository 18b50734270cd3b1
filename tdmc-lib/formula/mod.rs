//! CNF formulas: flat clause storage, optional per-literal weights and the
//! DIMACS front-end for reading them.
pub mod dimacs;
mod literal;

pub use literal::{Literal, Polarity};

/// A CNF formula over variables `1..=num_vars`.
///
/// Clauses are stored as one flat literal array with a parallel array of
/// per-clause lengths. The optional weight table has two entries per
/// variable: `weights[2 * v]` is the weight of the positive literal of `v`,
/// `weights[2 * v + 1]` the weight of the negative one. Missing weights
/// default to 1.0, which makes the weighted and unweighted paths agree.
#[derive(Debug, Clone, PartialEq)]
pub struct SatFormula {
    num_vars: u64,
    literals: Vec<Literal>,
    clause_lens: Vec<usize>,
    clause_offsets: Vec<usize>,
    weights: Option<Vec<f64>>,
}

impl SatFormula {
    /// Build a formula from per-clause literal lists. Intended for tests and
    /// programmatic construction; the DIMACS parser fills the flat arrays
    /// directly.
    #[must_use]
    pub fn new(num_vars: u64, clauses: &[Vec<i64>]) -> SatFormula {
        let mut literals = Vec::new();
        let mut clause_lens = Vec::with_capacity(clauses.len());
        for clause in clauses {
            clause_lens.push(clause.len());
            literals.extend(clause.iter().map(|lit| Literal(*lit)));
        }
        SatFormula::from_flat(num_vars, literals, clause_lens, None)
    }

    pub(crate) fn from_flat(
        num_vars: u64,
        literals: Vec<Literal>,
        clause_lens: Vec<usize>,
        weights: Option<Vec<f64>>,
    ) -> SatFormula {
        debug_assert_eq!(clause_lens.iter().sum::<usize>(), literals.len());
        let mut clause_offsets = Vec::with_capacity(clause_lens.len());
        let mut offset = 0;
        for len in &clause_lens {
            clause_offsets.push(offset);
            offset += len;
        }
        SatFormula {
            num_vars,
            literals,
            clause_lens,
            clause_offsets,
            weights,
        }
    }

    /// Attach a full weight table (`2 * (num_vars + 1)` entries, variables
    /// are 1-based so the first two slots are unused).
    pub fn set_weights(&mut self, weights: Vec<f64>) {
        debug_assert_eq!(weights.len(), 2 * (self.num_vars as usize + 1));
        self.weights = Some(weights);
    }

    /// Set the weight of a single literal, materialising the default table
    /// on first use.
    pub fn set_literal_weight(&mut self, lit: Literal, weight: f64) {
        let len = 2 * (self.num_vars as usize + 1);
        let table = self.weights.get_or_insert_with(|| vec![1.0; len]);
        let slot = 2 * lit.variable() as usize + usize::from(lit.polarity() == Polarity::Negative);
        table[slot] = weight;
    }

    #[must_use]
    pub fn num_vars(&self) -> u64 {
        self.num_vars
    }

    #[must_use]
    pub fn num_clauses(&self) -> usize {
        self.clause_lens.len()
    }

    #[must_use]
    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    /// The literals of clause `idx`.
    #[must_use]
    pub fn clause(&self, idx: usize) -> &[Literal] {
        let offset = self.clause_offsets[idx];
        &self.literals[offset..offset + self.clause_lens[idx]]
    }

    pub fn clauses(&self) -> impl Iterator<Item = &[Literal]> {
        (0..self.num_clauses()).map(|idx| self.clause(idx))
    }

    /// Weight of `lit`, 1.0 when the formula carries no weight table.
    #[must_use]
    pub fn weight(&self, lit: Literal) -> f64 {
        match &self.weights {
            None => 1.0,
            Some(table) => {
                table[2 * lit.variable() as usize
                    + usize::from(lit.polarity() == Polarity::Negative)]
            }
        }
    }

    /// Weight of variable `var` under assignment bit `bit` (1 = positive).
    #[must_use]
    pub fn weight_of_assignment(&self, var: u64, bit: u64) -> f64 {
        match &self.weights {
            None => 1.0,
            Some(table) => table[2 * var as usize + usize::from(bit == 0)],
        }
    }
}
