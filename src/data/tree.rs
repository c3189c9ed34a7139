//! # Newick Tree Parsing and Resolution
//!
//! Parses a phylogenetic tree into a flat node arena and resolves polytomies
//! (nodes with more than two children) into a strictly bifurcating topology
//! using zero-length internal edges. Resolution only changes the topology
//! representation; root-to-MRCA path lengths, and therefore the covariance
//! matrix derived from them, are unchanged.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{PhyloError, Result};

/// Branch length assigned when the Newick text carries none.
///
/// Matches the convention of the upstream tree-building tooling, which
/// defaults unannotated edges to unit length.
const DEFAULT_BRANCH_LENGTH: f64 = 1.0;

/// One node in the tree arena. Leaves have an empty `children` list and a
/// `label`; internal nodes may be unlabeled.
#[derive(Debug, Default, Clone)]
pub struct TreeNode {
    pub children: Vec<usize>,
    pub label: Option<String>,
    /// Length of the branch connecting this node to its parent.
    /// Unused for the root.
    pub length: f64,
}

/// A rooted phylogenetic tree stored as a node arena.
#[derive(Debug, Clone)]
pub struct PhyloTree {
    nodes: Vec<TreeNode>,
    root: usize,
}

fn is_delim(b: u8) -> bool {
    matches!(b, b'(' | b')' | b',' | b':' | b';' | b'[' | b']')
}

fn skip_ws(bytes: &[u8], idx: &mut usize) {
    while *idx < bytes.len() && bytes[*idx].is_ascii_whitespace() {
        *idx += 1;
    }
}

/// Skip a `[...]` comment/annotation block if one starts at the cursor.
fn skip_annotation(bytes: &[u8], idx: &mut usize) {
    if *idx < bytes.len() && bytes[*idx] == b'[' {
        *idx += 1;
        while *idx < bytes.len() && bytes[*idx] != b']' {
            *idx += 1;
        }
        if *idx < bytes.len() {
            *idx += 1;
        }
    }
}

fn parse_label(bytes: &[u8], idx: &mut usize) -> Option<String> {
    skip_ws(bytes, idx);
    if *idx >= bytes.len() || is_delim(bytes[*idx]) {
        return None;
    }
    let start = *idx;
    while *idx < bytes.len() && !is_delim(bytes[*idx]) {
        *idx += 1;
    }
    if *idx > start {
        Some(
            String::from_utf8_lossy(&bytes[start..*idx])
                .trim()
                .to_string(),
        )
    } else {
        None
    }
}

/// Parse a `:length` suffix. Returns the default length when absent.
fn parse_branch_length(bytes: &[u8], idx: &mut usize) -> Result<f64> {
    skip_ws(bytes, idx);
    if *idx >= bytes.len() || bytes[*idx] != b':' {
        return Ok(DEFAULT_BRANCH_LENGTH);
    }
    *idx += 1;
    skip_ws(bytes, idx);
    let start = *idx;
    while *idx < bytes.len() && !is_delim(bytes[*idx]) {
        *idx += 1;
    }
    let text = String::from_utf8_lossy(&bytes[start..*idx]);
    let length: f64 = text.trim().parse().map_err(|_| {
        PhyloError::input(format!("invalid branch length '{}' in Newick tree", text.trim()))
    })?;
    if !length.is_finite() || length < 0.0 {
        return Err(PhyloError::input(format!(
            "branch length {} is negative or non-finite",
            length
        )));
    }
    Ok(length)
}

fn parse_subtree(bytes: &[u8], idx: &mut usize, nodes: &mut Vec<TreeNode>) -> Result<usize> {
    skip_ws(bytes, idx);
    if *idx >= bytes.len() {
        return Err(PhyloError::input("unexpected end of Newick tree"));
    }

    if bytes[*idx] == b'(' {
        *idx += 1;
        let mut children = Vec::new();
        loop {
            let child = parse_subtree(bytes, idx, nodes)?;
            children.push(child);
            skip_ws(bytes, idx);
            if *idx >= bytes.len() {
                return Err(PhyloError::input("unterminated group in Newick tree"));
            }
            if bytes[*idx] == b',' {
                *idx += 1;
                continue;
            }
            if bytes[*idx] == b')' {
                *idx += 1;
                break;
            }
            return Err(PhyloError::input("invalid separator in Newick group"));
        }

        let label = parse_label(bytes, idx);
        skip_ws(bytes, idx);
        skip_annotation(bytes, idx);
        let length = parse_branch_length(bytes, idx)?;
        skip_annotation(bytes, idx);

        nodes.push(TreeNode {
            children,
            label,
            length,
        });
        Ok(nodes.len() - 1)
    } else {
        let label = parse_label(bytes, idx)
            .ok_or_else(|| PhyloError::input("expected leaf label in Newick tree"))?;
        skip_ws(bytes, idx);
        skip_annotation(bytes, idx);
        let length = parse_branch_length(bytes, idx)?;
        skip_annotation(bytes, idx);

        nodes.push(TreeNode {
            children: Vec::new(),
            label: Some(label),
            length,
        });
        Ok(nodes.len() - 1)
    }
}

impl PhyloTree {
    /// Parse a Newick string into a tree, rejecting duplicate leaf labels.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.trim().as_bytes();
        if bytes.is_empty() {
            return Err(PhyloError::input("empty Newick tree"));
        }
        let mut idx = 0usize;
        let mut nodes = Vec::new();
        let root = parse_subtree(bytes, &mut idx, &mut nodes)?;
        skip_ws(bytes, &mut idx);
        if idx < bytes.len() && bytes[idx] != b';' {
            return Err(PhyloError::input("trailing characters after Newick tree"));
        }
        // The root's own branch length carries no information.
        nodes[root].length = 0.0;

        let tree = Self { nodes, root };
        tree.check_duplicate_leaves()?;
        Ok(tree)
    }

    /// Read the first tree from a Newick file.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PhyloError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        let line = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| {
                PhyloError::input(format!("tree file {} is empty", path.display()))
            })?;
        Self::parse(line)
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Arena indices of all leaves, in parse order.
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].children.is_empty())
            .collect()
    }

    /// Leaf labels in parse order.
    pub fn leaf_labels(&self) -> Vec<String> {
        self.leaves()
            .into_iter()
            .filter_map(|i| self.nodes[i].label.clone())
            .collect()
    }

    /// Whether any node has more than two children.
    pub fn has_polytomies(&self) -> bool {
        self.nodes.iter().any(|n| n.children.len() > 2)
    }

    /// Resolve every polytomy into a cascade of bifurcations joined by
    /// zero-length internal edges.
    ///
    /// Tie-breaking (which children are grouped first) is controlled by the
    /// seed, so identical inputs and seeds give identical topologies. Since
    /// the inserted edges have zero length, all root-to-MRCA distances are
    /// preserved.
    pub fn resolve_polytomies(&mut self, seed: u64) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let original = self.nodes.len();
        for idx in 0..original {
            if self.nodes[idx].children.len() <= 2 {
                continue;
            }
            let mut pending = std::mem::take(&mut self.nodes[idx].children);
            pending.shuffle(&mut rng);
            while pending.len() > 2 {
                let a = pending.pop().expect("len > 2");
                let b = pending.pop().expect("len > 1");
                self.nodes.push(TreeNode {
                    children: vec![a, b],
                    label: None,
                    length: 0.0,
                });
                pending.push(self.nodes.len() - 1);
            }
            self.nodes[idx].children = pending;
        }
    }

    fn check_duplicate_leaves(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for label in self.leaf_labels() {
            if !seen.insert(label.clone()) {
                return Err(PhyloError::input(format!(
                    "duplicate leaf label '{}' in tree",
                    label
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_and_lengths() {
        let tree = PhyloTree::parse("((A:1,B:1):2,C:3);").unwrap();
        let labels = tree.leaf_labels();
        assert_eq!(labels, vec!["A", "B", "C"]);
        let leaves = tree.leaves();
        assert_eq!(tree.nodes()[leaves[2]].length, 3.0);
    }

    #[test]
    fn missing_lengths_default_to_unit() {
        let tree = PhyloTree::parse("((A,B),C);").unwrap();
        for &leaf in &tree.leaves() {
            assert_eq!(tree.nodes()[leaf].length, 1.0);
        }
    }

    #[test]
    fn rejects_duplicate_leaves() {
        let err = PhyloTree::parse("((A:1,A:1):1,C:1);").unwrap_err();
        assert!(err.to_string().contains("duplicate leaf label"));
    }

    #[test]
    fn rejects_negative_branch_length() {
        assert!(PhyloTree::parse("(A:-1,B:1);").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(PhyloTree::parse("((A:1,B:1").is_err());
        assert!(PhyloTree::parse("").is_err());
    }

    #[test]
    fn bare_label_parses_as_single_leaf() {
        let tree = PhyloTree::parse("not a tree").unwrap();
        assert_eq!(tree.leaf_labels(), vec!["not a tree"]);
        assert_eq!(tree.leaves().len(), 1);
    }

    #[test]
    fn skips_annotations() {
        let tree = PhyloTree::parse("((A[&rate=1]:1,B:1)[&support=0.9]:2,C:3);").unwrap();
        assert_eq!(tree.leaf_labels(), vec!["A", "B", "C"]);
    }

    #[test]
    fn resolution_is_binary_and_deterministic() {
        let mut a = PhyloTree::parse("(A:1,B:1,C:1,D:1,E:1);").unwrap();
        let mut b = a.clone();
        assert!(a.has_polytomies());
        a.resolve_polytomies(7);
        b.resolve_polytomies(7);
        assert!(!a.has_polytomies());
        for (na, nb) in a.nodes().iter().zip(b.nodes()) {
            assert_eq!(na.children, nb.children);
        }
    }

    #[test]
    fn resolution_inserts_zero_length_edges() {
        let mut tree = PhyloTree::parse("(A:1,B:1,C:1);").unwrap();
        let before = tree.nodes().len();
        tree.resolve_polytomies(0);
        for node in &tree.nodes()[before..] {
            assert_eq!(node.length, 0.0);
        }
    }
}
