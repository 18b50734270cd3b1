//! Rooted tree decompositions: the bag arena the solver traverses, plus the
//! PACE-format front-end and the width-bounded chain combining step.
pub mod td;

use std::collections::{BTreeSet, VecDeque};
use std::fmt::Display;

use anyhow::{bail, Result};
use derive_more::derive::From;

use crate::util::sorted_union;

/// Position of a bag inside the decomposition arena.
#[derive(PartialEq, Eq, Clone, PartialOrd, Ord, Debug, Copy, Hash, From)]
pub struct BagIdx(pub u32);

impl Display for BagIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical decomposition node kinds. The solver derives its behaviour
/// from child counts and variable sets; the kind is what a bag *looks* like
/// relative to its children and is used for rendering and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BagKind {
    Leaf,
    Introduce,
    Forget,
    IntroduceForget,
    Join,
}

impl Display for BagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BagKind::Leaf => "leaf",
            BagKind::Introduce => "introduce",
            BagKind::Forget => "forget",
            BagKind::IntroduceForget => "introduce-forget",
            BagKind::Join => "join",
        };
        write!(f, "{name}")
    }
}

/// A node of the tree decomposition. Variables are kept deduplicated and
/// sorted ascending; bit `a` of an assignment id always refers to the `a`-th
/// variable of this list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag {
    id: BagIdx,
    variables: Vec<u64>,
    children: Vec<BagIdx>,
}

impl Bag {
    #[must_use]
    pub fn id(&self) -> BagIdx {
        self.id
    }

    #[must_use]
    pub fn variables(&self) -> &[u64] {
        &self.variables
    }

    #[must_use]
    pub fn children(&self) -> &[BagIdx] {
        &self.children
    }
}

/// A tree decomposition rooted at its first bag, stored as an arena with
/// child indices only. Parent pointers exist solely on the traversal stack.
#[derive(Debug, Clone)]
pub struct TreeDecomposition {
    bags: Vec<Bag>,
    root: BagIdx,
    declared_vars: u64,
}

impl TreeDecomposition {
    /// Build a rooted decomposition from per-bag variable lists (indexed by
    /// 1-based bag id) and undirected edges. The tree is rooted at bag 1 by
    /// a breadth-first orientation; children keep the order in which their
    /// edges appear.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no bags, an edge references an unknown
    /// bag, the edges form a cycle, or the bags are not connected.
    pub fn from_adjacency(
        bag_variables: Vec<Vec<u64>>,
        edges: &[(usize, usize)],
        declared_vars: u64,
    ) -> Result<TreeDecomposition> {
        if bag_variables.is_empty() {
            bail!("decomposition contains no bags");
        }
        let num_bags = bag_variables.len();

        let mut adjacency = vec![Vec::new(); num_bags];
        for &(a, b) in edges {
            if a == 0 || b == 0 || a > num_bags || b > num_bags {
                bail!("edge ({a}, {b}) references a bag outside [1, {num_bags}]");
            }
            adjacency[a - 1].push(b - 1);
            adjacency[b - 1].push(a - 1);
        }

        let mut bags: Vec<Bag> = bag_variables
            .into_iter()
            .enumerate()
            .map(|(idx, mut variables)| {
                variables.sort_unstable();
                variables.dedup();
                Bag {
                    id: BagIdx(u32::try_from(idx).unwrap()),
                    variables,
                    children: Vec::new(),
                }
            })
            .collect();

        // Orient away from the root.
        let mut parent = vec![usize::MAX; num_bags];
        let mut visited = vec![false; num_bags];
        let mut queue = VecDeque::from([0usize]);
        visited[0] = true;
        while let Some(at) = queue.pop_front() {
            for &next in &adjacency[at] {
                if next == parent[at] {
                    continue;
                }
                if visited[next] {
                    bail!("decomposition edges contain a cycle through bag {}", at + 1);
                }
                visited[next] = true;
                parent[next] = at;
                bags[at].children.push(BagIdx(u32::try_from(next).unwrap()));
                queue.push_back(next);
            }
        }
        if visited.iter().any(|seen| !seen) {
            bail!("decomposition is not connected");
        }

        Ok(TreeDecomposition {
            bags,
            root: BagIdx(0),
            declared_vars,
        })
    }

    #[must_use]
    pub fn root(&self) -> BagIdx {
        self.root
    }

    #[must_use]
    pub fn bag(&self, idx: BagIdx) -> &Bag {
        &self.bags[idx.0 as usize]
    }

    pub fn bags(&self) -> impl Iterator<Item = &Bag> {
        self.bags.iter()
    }

    #[must_use]
    pub fn num_bags(&self) -> usize {
        self.bags.len()
    }

    #[must_use]
    pub fn declared_vars(&self) -> u64 {
        self.declared_vars
    }

    /// Largest bag cardinality.
    #[must_use]
    pub fn width(&self) -> usize {
        self.bags
            .iter()
            .map(|bag| bag.variables.len())
            .max()
            .unwrap_or(0)
    }

    /// Every variable mentioned by some bag.
    #[must_use]
    pub fn variables_in_bags(&self) -> BTreeSet<u64> {
        self.bags
            .iter()
            .flat_map(|bag| bag.variables.iter().copied())
            .collect()
    }

    /// What this bag looks like relative to its children.
    #[must_use]
    pub fn kind_of(&self, idx: BagIdx) -> BagKind {
        let bag = self.bag(idx);
        match bag.children.len() {
            0 => BagKind::Leaf,
            1 => {
                let child = self.bag(bag.children[0]);
                let introduces = bag
                    .variables
                    .iter()
                    .any(|v| child.variables.binary_search(v).is_err());
                let forgets = child
                    .variables
                    .iter()
                    .any(|v| bag.variables.binary_search(v).is_err());
                match (introduces, forgets) {
                    (true, false) => BagKind::Introduce,
                    (false, true) => BagKind::Forget,
                    _ => BagKind::IntroduceForget,
                }
            }
            _ => BagKind::Join,
        }
    }

    /// Merge single-child chains whose combined variable set stays within
    /// `max_width` variables. `max_width == 0` disables combining. Joins and
    /// their children are never merged across.
    pub fn combine_chains(&mut self, max_width: usize) {
        if max_width == 0 {
            return;
        }

        let mut rebuilt = Vec::with_capacity(self.bags.len());
        let root = self.collapse_into(self.root, max_width, &mut rebuilt);
        debug_assert_eq!(root, BagIdx(0));
        tracing::debug!(
            before = self.bags.len(),
            after = rebuilt.len(),
            "combined decomposition chains"
        );
        self.bags = rebuilt;
        self.root = root;
    }

    fn collapse_into(&self, at: BagIdx, max_width: usize, rebuilt: &mut Vec<Bag>) -> BagIdx {
        let mut variables = self.bag(at).variables.clone();
        let mut children = self.bag(at).children.to_vec();

        while children.len() == 1 {
            let child = self.bag(children[0]);
            let union = sorted_union(&variables, &child.variables);
            if union.len() > max_width {
                break;
            }
            variables = union;
            children = child.children.clone();
        }

        let slot = BagIdx(u32::try_from(rebuilt.len()).unwrap());
        rebuilt.push(Bag {
            id: slot,
            variables,
            children: Vec::new(),
        });
        let new_children: Vec<BagIdx> = children
            .iter()
            .map(|&child| self.collapse_into(child, max_width, rebuilt))
            .collect();
        rebuilt[slot.0 as usize].children = new_children;
        slot
    }
}
