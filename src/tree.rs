//! Phylogenetic tree (Newick) and branch-length coverage
//!
//! Array-based rooted tree. Tips are matched to community-matrix species by
//! label, and phylogenetic diversity is the total length of the branches
//! connecting a set of tips to the root.

use crate::error::{NullModelError, Result};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone)]
struct TreeNode {
    parent: Option<usize>,
    branch_length: f64,
    label: String,
    children: Vec<usize>,
}

impl TreeNode {
    fn new(parent: Option<usize>) -> Self {
        Self {
            parent,
            branch_length: 0.0,
            label: String::new(),
            children: Vec::new(),
        }
    }
}

/// Rooted phylogenetic tree
#[derive(Debug, Clone)]
pub struct PhyloTree {
    nodes: Vec<TreeNode>,
    root: usize,
    tips: FxHashMap<String, usize>,
}

impl PhyloTree {
    /// Parse a Newick string, e.g. `((A:0.1,B:0.2):0.3,(C:0.4,D:0.5):0.6);`
    ///
    /// Bracketed comments are skipped. Single-quoted labels are unquoted.
    /// Missing branch lengths are read as zero.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let mut in_quotes = false;
        let chars: Vec<char> = newick
            .trim()
            .trim_end_matches(';')
            .chars()
            .filter(|&c| {
                if c == '\'' {
                    in_quotes = !in_quotes;
                }
                in_quotes || !c.is_whitespace()
            })
            .collect();
        if chars.is_empty() {
            return Err(NullModelError::Parse("empty Newick string".to_string()));
        }

        let mut nodes = vec![TreeNode::new(None)];
        let root = 0;
        // Open internal nodes, innermost last
        let mut stack: Vec<usize> = Vec::new();
        let mut i = 0;
        let mut opened_root = false;

        while i < chars.len() {
            match chars[i] {
                '(' => {
                    if !opened_root && stack.is_empty() {
                        opened_root = true;
                        stack.push(root);
                    } else {
                        let parent = *stack.last().ok_or_else(|| {
                            NullModelError::Parse(format!("unexpected '(' at position {}", i))
                        })?;
                        let idx = nodes.len();
                        nodes.push(TreeNode::new(Some(parent)));
                        nodes[parent].children.push(idx);
                        stack.push(idx);
                    }
                    i += 1;
                }
                ')' => {
                    let closed = stack.pop().ok_or_else(|| {
                        NullModelError::Parse(format!("unbalanced ')' at position {}", i))
                    })?;
                    i += 1;
                    let (label, length, consumed) = parse_label_length(&chars[i..])?;
                    nodes[closed].label = label;
                    nodes[closed].branch_length = length;
                    i += consumed;
                }
                ',' => {
                    i += 1;
                }
                '[' => {
                    i = skip_comment(&chars, i)?;
                }
                _ => {
                    let parent = match stack.last() {
                        Some(&p) => p,
                        // Single-tip tree without parentheses
                        None if !opened_root => {
                            opened_root = true;
                            let (label, length, consumed) = parse_label_length(&chars[i..])?;
                            nodes[root].label = label;
                            nodes[root].branch_length = length;
                            i += consumed;
                            continue;
                        }
                        None => {
                            return Err(NullModelError::Parse(format!(
                                "unexpected text after tree end at position {}",
                                i
                            )))
                        }
                    };
                    let (label, length, consumed) = parse_label_length(&chars[i..])?;
                    let idx = nodes.len();
                    let mut node = TreeNode::new(Some(parent));
                    node.label = label;
                    node.branch_length = length;
                    nodes.push(node);
                    nodes[parent].children.push(idx);
                    i += consumed.max(1);
                }
            }
        }

        if !stack.is_empty() {
            return Err(NullModelError::Parse(format!(
                "unbalanced Newick: {} unclosed '('",
                stack.len()
            )));
        }

        let mut tips = FxHashMap::default();
        for (idx, node) in nodes.iter().enumerate() {
            if node.children.is_empty() {
                if node.label.is_empty() {
                    return Err(NullModelError::Parse(format!("tip node {} has no label", idx)));
                }
                if tips.insert(node.label.clone(), idx).is_some() {
                    return Err(NullModelError::Parse(format!("duplicate tip label '{}'", node.label)));
                }
            }
        }

        Ok(Self { nodes, root, tips })
    }

    /// Load a Newick file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| NullModelError::io(path, e))?;
        let tree = Self::from_newick(&contents)?;
        tracing::info!("Loaded tree {:?}: {} nodes, {} tips", path, tree.n_nodes(), tree.n_tips());
        Ok(tree)
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_tips(&self) -> usize {
        self.tips.len()
    }

    pub fn tip_index(&self, label: &str) -> Option<usize> {
        self.tips.get(label).copied()
    }

    pub fn branch_length(&self, node: usize) -> f64 {
        self.nodes[node].branch_length
    }

    /// Tip node for each species label, in the same order
    ///
    /// Fails with `InputShapeMismatch` listing the species that have no tip.
    pub fn tips_for(&self, species: &[String]) -> Result<Vec<usize>> {
        let mut found = Vec::with_capacity(species.len());
        let mut missing = Vec::new();
        for name in species {
            match self.tip_index(name) {
                Some(idx) => found.push(idx),
                None => missing.push(name.as_str()),
            }
        }

        if !missing.is_empty() {
            let preview: Vec<&str> = missing.iter().take(5).copied().collect();
            return Err(NullModelError::InputShapeMismatch(format!(
                "{} of {} species have no matching tree tip (e.g. {:?})",
                missing.len(),
                species.len(),
                preview
            )));
        }
        Ok(found)
    }

    /// Mark every node whose branch lies on a path from one of `tips` to the root
    ///
    /// The root's own branch is never marked.
    pub fn covered_branches(&self, tips: &[usize]) -> Vec<bool> {
        let mut covered = vec![false; self.nodes.len()];
        for &tip in tips {
            let mut node = tip;
            while node != self.root && !covered[node] {
                covered[node] = true;
                match self.nodes[node].parent {
                    Some(parent) => node = parent,
                    None => break,
                }
            }
        }
        covered
    }

    /// Total branch length of the marked nodes
    fn covered_length(&self, covered: &[bool]) -> f64 {
        covered
            .iter()
            .zip(&self.nodes)
            .filter(|(&c, _)| c)
            .map(|(_, node)| node.branch_length)
            .sum()
    }

    /// Faith's phylogenetic diversity of a tip set (rooted)
    pub fn faith_pd(&self, tips: &[usize]) -> f64 {
        self.covered_length(&self.covered_branches(tips))
    }
}

fn skip_comment(chars: &[char], start: usize) -> Result<usize> {
    chars[start..]
        .iter()
        .position(|&c| c == ']')
        .map(|offset| start + offset + 1)
        .ok_or_else(|| NullModelError::Parse(format!("unterminated comment at position {}", start)))
}

/// Read `label[:length]` up to the next structural character
fn parse_label_length(chars: &[char]) -> Result<(String, f64, usize)> {
    let mut label = String::new();
    let mut length_str = String::new();
    let mut in_length = false;
    let mut i = 0;

    if chars.first() == Some(&'\'') {
        let close = chars[1..].iter().position(|&c| c == '\'').ok_or_else(|| {
            NullModelError::Parse("unterminated quoted label".to_string())
        })?;
        label = chars[1..1 + close].iter().collect();
        i = close + 2;
    }

    while i < chars.len() {
        match chars[i] {
            '(' | ')' | ',' | ';' => break,
            '[' => {
                i = skip_comment(chars, i)?;
            }
            ':' => {
                in_length = true;
                i += 1;
            }
            c => {
                if in_length {
                    length_str.push(c);
                } else {
                    label.push(c);
                }
                i += 1;
            }
        }
    }

    let length = if length_str.is_empty() {
        0.0
    } else {
        length_str
            .parse::<f64>()
            .map_err(|_| NullModelError::Parse(format!("invalid branch length '{}'", length_str)))?
    };

    Ok((label, length, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NEWICK: &str = "((A:0.1,B:0.2):0.3,(C:0.4,D:0.5):0.6);";

    #[test]
    fn test_parse_tips_and_nodes() {
        let tree = PhyloTree::from_newick(NEWICK).unwrap();
        assert_eq!(tree.n_tips(), 4);
        assert_eq!(tree.n_nodes(), 7);
        let a = tree.tip_index("A").unwrap();
        assert_relative_eq!(tree.branch_length(a), 0.1);
    }

    #[test]
    fn test_faith_pd() {
        let tree = PhyloTree::from_newick(NEWICK).unwrap();
        let ab = [tree.tip_index("A").unwrap(), tree.tip_index("B").unwrap()];
        assert_relative_eq!(tree.faith_pd(&ab), 0.6, epsilon = 1e-12);

        let ac = [tree.tip_index("A").unwrap(), tree.tip_index("C").unwrap()];
        assert_relative_eq!(tree.faith_pd(&ac), 0.1 + 0.3 + 0.4 + 0.6, epsilon = 1e-12);

        let all: Vec<usize> = ["A", "B", "C", "D"].iter().map(|t| tree.tip_index(t).unwrap()).collect();
        assert_relative_eq!(tree.faith_pd(&all), 2.1, epsilon = 1e-12);
    }

    #[test]
    fn test_comments_quotes_and_whitespace() {
        let tree = PhyloTree::from_newick("(('Homo sapiens':1.0,Pan_troglodytes:1.0)[&support=99]:2.0,\n Gorilla:3.0);")
            .unwrap();
        assert_eq!(tree.n_tips(), 3);
        assert!(tree.tip_index("Homo sapiens").is_some());
        assert!(tree.tip_index("Pan_troglodytes").is_some());
    }

    #[test]
    fn test_tips_for_reports_missing_species() {
        let tree = PhyloTree::from_newick(NEWICK).unwrap();
        let species: Vec<String> = ["A", "X", "D"].iter().map(|s| s.to_string()).collect();
        let err = tree.tips_for(&species).unwrap_err();
        assert!(matches!(err, NullModelError::InputShapeMismatch(_)));
        assert!(err.to_string().contains("1 of 3"));
    }

    #[test]
    fn test_malformed_trees_rejected() {
        assert!(PhyloTree::from_newick("").is_err());
        assert!(PhyloTree::from_newick("((A:1,B:1);").is_err());
        assert!(PhyloTree::from_newick("(A:1,B:x);").is_err());
        assert!(PhyloTree::from_newick("(A:1,A:2);").is_err());
    }
}
