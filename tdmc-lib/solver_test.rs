use pretty_assertions::assert_eq;

use crate::decomposition::TreeDecomposition;
use crate::formula::{Literal, SatFormula};
use crate::solver::{self, DataStructure, SolveConfig, SolveResult};

/// Weighted count by enumerating all assignments; the reference for every
/// scenario below.
fn brute_force(formula: &SatFormula) -> f64 {
    let num_vars = formula.num_vars();
    let mut total = 0.0;
    for model in 0u64..(1 << num_vars) {
        let satisfied = formula.clauses().all(|clause| {
            clause
                .iter()
                .any(|lit| lit.satisfied_by((model >> (lit.variable() - 1)) & 1))
        });
        if satisfied {
            let mut weight = 1.0;
            for var in 1..=num_vars {
                weight *= formula.weight_of_assignment(var, (model >> (var - 1)) & 1);
            }
            total += weight;
        }
    }
    total
}

/// The trivial decomposition: one bag holding every variable.
fn single_bag(formula: &SatFormula) -> TreeDecomposition {
    let vars: Vec<u64> = (1..=formula.num_vars()).collect();
    TreeDecomposition::from_adjacency(vec![vars], &[], formula.num_vars()).unwrap()
}

/// `{2}` on top of the two leaves `{1, 2}` and `{2, 3}`: the smallest
/// decomposition with a genuine join.
fn join_decomposition(swapped: bool) -> TreeDecomposition {
    let edges: &[(usize, usize)] = if swapped {
        &[(1, 3), (1, 2)]
    } else {
        &[(1, 2), (1, 3)]
    };
    TreeDecomposition::from_adjacency(vec![vec![2], vec![1, 2], vec![2, 3]], edges, 3).unwrap()
}

fn config(data_structure: DataStructure) -> SolveConfig {
    SolveConfig::builder().data_structure(data_structure).build()
}

fn solve_with(
    formula: &SatFormula,
    decomposition: &TreeDecomposition,
    data_structure: DataStructure,
) -> SolveResult {
    solver::solve(formula, decomposition, &config(data_structure)).unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    let tolerance = 1e-9 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn single_variable_has_one_model() {
    let formula = SatFormula::new(1, &[vec![1]]);
    let decomposition = single_bag(&formula);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solve_with(&formula, &decomposition, data_structure);
        assert!(result.is_sat);
        assert_eq!(result.model_count(), 1.0);
    }
}

#[test]
fn weighted_single_variable() {
    let mut formula = SatFormula::new(1, &[vec![1]]);
    formula.set_literal_weight(Literal(1), 0.3);
    formula.set_literal_weight(Literal(-1), 0.7);
    let decomposition = single_bag(&formula);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solve_with(&formula, &decomposition, data_structure);
        assert_close(result.model_count(), 0.3);
    }
}

#[test]
fn antivalence_has_two_models() {
    let formula = SatFormula::new(2, &[vec![1, 2], vec![-1, -2]]);
    let result = solve_with(&formula, &single_bag(&formula), DataStructure::Array);
    assert_eq!(result.model_count(), 2.0);
    assert_eq!(brute_force(&formula), 2.0);
}

#[test]
fn chain_decomposition_counts_five_models() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    let decomposition = TreeDecomposition::from_adjacency(
        vec![vec![1, 2], vec![2, 3]],
        &[(1, 2)],
        3,
    )
    .unwrap();

    let array = solve_with(&formula, &decomposition, DataStructure::Array);
    let tree = solve_with(&formula, &decomposition, DataStructure::Tree);
    assert_eq!(array.model_count(), 5.0);
    assert_eq!(tree.model_count(), 5.0);
    assert_eq!(brute_force(&formula), 5.0);
}

#[test]
fn contradiction_is_unsat() {
    let formula = SatFormula::new(1, &[vec![1], vec![-1]]);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solve_with(&formula, &single_bag(&formula), data_structure);
        assert!(!result.is_sat);
        assert_eq!(result.model_count(), 0.0);
    }
}

#[test]
fn join_counts_match_and_children_commute() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let plain = solve_with(&formula, &join_decomposition(false), data_structure);
        let swapped = solve_with(&formula, &join_decomposition(true), data_structure);
        assert_eq!(plain.model_count(), 5.0);
        assert_eq!(swapped.model_count(), plain.model_count());
        assert_eq!(plain.stats.num_join, 1);
    }
}

#[test]
fn weighted_join_matches_brute_force() {
    let mut formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    formula.set_literal_weight(Literal(2), 0.3);
    formula.set_literal_weight(Literal(-2), 0.7);
    formula.set_literal_weight(Literal(3), 0.2);
    formula.set_literal_weight(Literal(-3), 0.8);

    let expected = brute_force(&formula);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solve_with(&formula, &join_decomposition(false), data_structure);
        assert_close(result.model_count(), expected);
    }
}

#[test]
fn weighted_path_with_uniform_weights_matches_unweighted() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    let unweighted = solve_with(&formula, &join_decomposition(false), DataStructure::Array);

    let forced = SolveConfig::builder()
        .data_structure(DataStructure::Array)
        .weighted(true)
        .build();
    let weighted = solver::solve(&formula, &join_decomposition(false), &forced).unwrap();
    assert_eq!(weighted.model_count(), unweighted.model_count());
}

#[test]
fn chunking_does_not_change_array_counts() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    let decomposition = join_decomposition(false);
    let unchunked = solve_with(&formula, &decomposition, DataStructure::Array);

    // Two doubles per fragment: every bag including the join gets split.
    let tiny = SolveConfig::builder()
        .data_structure(DataStructure::Array)
        .max_memory_buffer(16)
        .build();
    let chunked = solver::solve(&formula, &decomposition, &tiny).unwrap();
    assert_eq!(chunked.model_count(), unchunked.model_count());
    assert_eq!(chunked.model_count(), 5.0);
}

#[test]
fn chunking_does_not_change_tree_counts() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    let decomposition = join_decomposition(false);
    let unchunked = solve_with(&formula, &decomposition, DataStructure::Tree);

    // Eight words per fragment: two-variable bags split into two trie
    // fragments each, which the combine step folds back together.
    let tiny = SolveConfig::builder()
        .data_structure(DataStructure::Tree)
        .max_memory_buffer(64)
        .build();
    let chunked = solver::solve(&formula, &decomposition, &tiny).unwrap();
    assert_eq!(chunked.model_count(), unchunked.model_count());
    assert_eq!(chunked.model_count(), 5.0);
}

#[test]
fn unused_variables_double_the_count() {
    // Variable 3 appears in no clause and no bag.
    let formula = SatFormula::new(3, &[vec![1, 2]]);
    let decomposition =
        TreeDecomposition::from_adjacency(vec![vec![1, 2]], &[], 3).unwrap();
    let result = solve_with(&formula, &decomposition, DataStructure::Array);
    assert_eq!(result.model_count(), 6.0);
}

#[test]
fn long_chain_activates_exponent_normalisation() {
    // 45 variables force the exponent path; the two clauses knock out a
    // quarter of the assignments each: 2^45 * (3/4)^2 = 9 * 2^41.
    let formula = SatFormula::new(45, &[vec![1, 2], vec![-44, -45]]);
    let bags: Vec<Vec<u64>> = (1..=44).map(|i| vec![i, i + 1]).collect();
    let edges: Vec<(usize, usize)> = (1..44).map(|i| (i, i + 1)).collect();
    let decomposition = TreeDecomposition::from_adjacency(bags, &edges, 45).unwrap();

    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solve_with(&formula, &decomposition, data_structure);
        assert!(result.is_sat);
        assert!(result.exponent > 0, "normalisation left exponent at zero");
        assert_eq!(result.model_count(), 9.0 * 2f64.powi(41));
    }
}

#[test]
fn persistent_weight_overflow_is_fatal() {
    // The weight product of a single assignment exceeds double range, so
    // the overflow recurs even with exponent correction active.
    let mut formula = SatFormula::new(2, &[vec![1, 2]]);
    formula.set_literal_weight(Literal(1), 1e308);
    formula.set_literal_weight(Literal(2), 1e308);
    let decomposition = single_bag(&formula);
    for data_structure in [DataStructure::Array, DataStructure::Tree] {
        let result = solver::solve(&formula, &decomposition, &config(data_structure));
        assert!(result.is_err());
    }
}

#[test]
fn combining_chains_preserves_counts() {
    let formula = SatFormula::new(4, &[vec![1, 2], vec![2, 3], vec![3, 4]]);
    let decomposition = TreeDecomposition::from_adjacency(
        vec![vec![1, 2], vec![2, 3], vec![3, 4]],
        &[(1, 2), (2, 3)],
        4,
    )
    .unwrap();
    let expected = brute_force(&formula);

    let plain = solve_with(&formula, &decomposition, DataStructure::Tree);
    let mut combined = decomposition.clone();
    combined.combine_chains(4);
    let merged = solve_with(&formula, &combined, DataStructure::Tree);

    assert_close(plain.model_count(), expected);
    assert_eq!(plain.model_count(), merged.model_count());
}

#[test]
fn wide_join_bag_agrees_across_layouts() {
    // One join bag of width 20 with identical children.
    let formula = SatFormula::new(20, &[vec![1, 2], vec![-19, -20]]);
    let all: Vec<u64> = (1..=20).collect();
    let decomposition = TreeDecomposition::from_adjacency(
        vec![all.clone(), all.clone(), all],
        &[(1, 2), (1, 3)],
        20,
    )
    .unwrap();

    let array = solve_with(&formula, &decomposition, DataStructure::Array);
    let tree = solve_with(&formula, &decomposition, DataStructure::Tree);
    // 2^20 * (3/4)^2
    assert_eq!(array.model_count(), 589_824.0);
    assert_eq!(tree.model_count(), array.model_count());
    assert_eq!(array.stats.num_join, 1);
}

#[test]
fn stats_count_kernel_passes() {
    let formula = SatFormula::new(3, &[vec![1, 2], vec![2, 3]]);
    let result = solve_with(&formula, &join_decomposition(false), DataStructure::Array);
    // Two leaves, the join bag's pass and the pseudo-root.
    assert_eq!(result.stats.num_introduce_forget, 4);
    assert_eq!(result.stats.num_join, 1);
    assert!(result.stats.max_table_size >= 8);
}
