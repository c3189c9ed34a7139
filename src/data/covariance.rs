//! # Phylogenetic Covariance Matrix
//!
//! Converts a rooted tree into a taxon-by-taxon variance-covariance matrix:
//! entry (i, j) is the branch length shared by the root-to-tip paths of taxa
//! i and j, i.e. the depth of their most recent common ancestor; the diagonal
//! is the full root-to-tip distance. Shared ancestry becomes shared
//! random-effect variance in the model.
//!
//! The construction is one pre-order pass for node depths (O(n)) plus, per
//! internal node, the cross-pairing of leaves from distinct child subtrees
//! (O(n²) total over the tree). It does not require a binary topology, so the
//! matrix is identical before and after polytomy resolution.

use std::collections::HashMap;
use std::path::Path;

use nalgebra::DMatrix;

use crate::data::tree::PhyloTree;
use crate::error::{PhyloError, Result};

/// Symmetric positive-semidefinite covariance matrix indexed by taxon label.
///
/// Consumed read-only after construction; all MCMC chains within one fit
/// share it by reference.
#[derive(Debug, Clone)]
pub struct CovarianceMatrix {
    labels: Vec<String>,
    index: HashMap<String, usize>,
    matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    /// Parse a tree file, resolve polytomies with the given seed, and build
    /// the covariance matrix.
    pub fn from_tree_file(path: &Path, seed: u64) -> Result<Self> {
        let mut tree = PhyloTree::from_path(path)?;
        if tree.has_polytomies() {
            tree.resolve_polytomies(seed);
        }
        Self::from_tree(&tree)
    }

    /// Build the covariance matrix from an already-parsed tree.
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let leaves = tree.leaves();
        if leaves.is_empty() {
            return Err(PhyloError::input("tree has no leaves"));
        }
        let mut labels = Vec::with_capacity(leaves.len());
        let mut index = HashMap::with_capacity(leaves.len());
        let mut leaf_col = HashMap::with_capacity(leaves.len());
        for (col, &leaf) in leaves.iter().enumerate() {
            let label = tree.nodes()[leaf]
                .label
                .clone()
                .ok_or_else(|| PhyloError::input("tree contains an unlabeled leaf"))?;
            index.insert(label.clone(), col);
            labels.push(label);
            leaf_col.insert(leaf, col);
        }

        let n = labels.len();
        let mut matrix = DMatrix::zeros(n, n);

        // Pre-order depths from the root.
        let mut depth = vec![0.0f64; tree.nodes().len()];
        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            for &child in &tree.nodes()[node].children {
                depth[child] = depth[node] + tree.nodes()[child].length;
                stack.push(child);
            }
        }

        // Post-order leaf sets; cross-child pairs share the depth of their MRCA.
        fn collect(
            node: usize,
            tree: &PhyloTree,
            depth: &[f64],
            leaf_col: &HashMap<usize, usize>,
            matrix: &mut DMatrix<f64>,
        ) -> Vec<usize> {
            let children = &tree.nodes()[node].children;
            if children.is_empty() {
                let col = leaf_col[&node];
                matrix[(col, col)] = depth[node];
                return vec![col];
            }
            let sets: Vec<Vec<usize>> = children
                .iter()
                .map(|&c| collect(c, tree, depth, leaf_col, matrix))
                .collect();
            for a in 0..sets.len() {
                for b in (a + 1)..sets.len() {
                    for &i in &sets[a] {
                        for &j in &sets[b] {
                            matrix[(i, j)] = depth[node];
                            matrix[(j, i)] = depth[node];
                        }
                    }
                }
            }
            sets.into_iter().flatten().collect()
        }
        collect(tree.root(), tree, &depth, &leaf_col, &mut matrix);

        Ok(Self {
            labels,
            index,
            matrix,
        })
    }

    /// Number of taxa.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Taxon labels in matrix order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Whether a taxon is present in the index.
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Matrix row/column for a taxon label.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    /// Covariance entry by matrix position.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// The raw matrix, for the model's precision computation.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Restrict the matrix to the given taxa (in the given order).
    ///
    /// Used to drop tree leaves that carry no observations before fitting.
    pub fn subset(&self, labels: &[String]) -> Result<Self> {
        let mut rows = Vec::with_capacity(labels.len());
        for label in labels {
            let idx = self.index_of(label).ok_or_else(|| {
                PhyloError::input(format!("taxon '{}' absent from covariance matrix", label))
            })?;
            rows.push(idx);
        }
        let n = rows.len();
        let mut matrix = DMatrix::zeros(n, n);
        for (a, &i) in rows.iter().enumerate() {
            for (b, &j) in rows.iter().enumerate() {
                matrix[(a, b)] = self.matrix[(i, j)];
            }
        }
        let labels = labels.to_vec();
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Ok(Self {
            labels,
            index,
            matrix,
        })
    }
}
