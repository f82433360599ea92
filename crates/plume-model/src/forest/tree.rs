//! Regression tree
//!
//! Greedy binary splits minimising the weighted variance of the children.
//! Leaves predict the mean label of their samples. Nodes live in one flat
//! vector with the root first; every child sits after its parent, so growing,
//! walking and measuring a tree never recurses however deep it gets.

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf with its prediction
    Leaf {
        /// Mean label of the samples reaching this leaf
        value: f64,
        /// Samples reaching this leaf
        n_samples: usize,
    },
    /// Internal split; `x[feature] <= threshold` goes left
    Split {
        /// Feature column
        feature: usize,
        /// Split threshold
        threshold: f64,
        /// Index of the left child
        left: usize,
        /// Index of the right child
        right: usize,
    },
}

/// Stopping rules shared by every tree of a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    /// Maximum depth, root at depth 0
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs to be split
    pub min_samples_split: usize,
    /// Minimum samples on each side of a split
    pub min_samples_leaf: usize,
}

/// Fitted regression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeList")]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

#[derive(Deserialize)]
struct NodeList {
    nodes: Vec<TreeNode>,
}

impl TryFrom<NodeList> for RegressionTree {
    type Error = String;

    fn try_from(list: NodeList) -> Result<Self, Self::Error> {
        if list.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        let len = list.nodes.len();
        for (id, node) in list.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = node {
                if !(id < *left && *left < len && id < *right && *right < len) {
                    return Err(format!("node {id} points outside the tree"));
                }
            }
        }
        Ok(Self { nodes: list.nodes })
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// A node still to be grown: its slot and its range of `indices`.
struct Pending {
    slot: usize,
    start: usize,
    end: usize,
    depth: usize,
}

impl RegressionTree {
    /// Grow a tree on the rows of `x` listed in `indices`.
    ///
    /// Indices may repeat (bootstrap samples). `indices` must not be empty.
    pub(crate) fn grow(
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        limits: &TreeLimits,
    ) -> Self {
        let mut indices = indices.to_vec();
        let mut nodes = vec![placeholder()];
        let mut pending = vec![Pending {
            slot: 0,
            start: 0,
            end: indices.len(),
            depth: 0,
        }];

        while let Some(Pending {
            slot,
            start,
            end,
            depth,
        }) = pending.pop()
        {
            let node = &mut indices[start..end];
            match split_node(x, y, node, depth, limits) {
                Grown::Leaf(leaf) => nodes[slot] = leaf,
                Grown::Split {
                    feature,
                    threshold,
                    boundary,
                } => {
                    let (left, right) = (nodes.len(), nodes.len() + 1);
                    nodes.push(placeholder());
                    nodes.push(placeholder());
                    nodes[slot] = TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                    // Right first so the left subtree is grown first.
                    pending.push(Pending {
                        slot: right,
                        start: start + boundary,
                        end,
                        depth: depth + 1,
                    });
                    pending.push(Pending {
                        slot: left,
                        start,
                        end: start + boundary,
                        depth: depth + 1,
                    });
                }
            }
        }

        Self { nodes }
    }

    /// Predict one sample.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut node = self.root();
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let next = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                    node = &self.nodes[next];
                }
            }
        }
    }

    /// Root node.
    pub fn root(&self) -> &TreeNode {
        &self.nodes[0]
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Depth of the tree; a single leaf has depth 0.
    pub fn depth(&self) -> usize {
        // Children follow their parents, so one forward pass sees every
        // parent's depth before its children.
        let mut depths = vec![0usize; self.nodes.len()];
        let mut deepest = 0;
        for (id, node) in self.nodes.iter().enumerate() {
            deepest = deepest.max(depths[id]);
            if let TreeNode::Split { left, right, .. } = node {
                depths[*left] = depths[id] + 1;
                depths[*right] = depths[id] + 1;
            }
        }
        deepest
    }

    /// Number of leaves.
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, TreeNode::Leaf { .. }))
            .count()
    }
}

enum Grown {
    Leaf(TreeNode),
    Split {
        feature: usize,
        threshold: f64,
        boundary: usize,
    },
}

const fn placeholder() -> TreeNode {
    TreeNode::Leaf {
        value: 0.0,
        n_samples: 0,
    }
}

/// Decide one node: a mean leaf, or a split with `indices` partitioned in
/// place so the left side comes first.
fn split_node(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &mut [usize],
    depth: usize,
    limits: &TreeLimits,
) -> Grown {
    let n = indices.len();
    let mean = indices.iter().map(|&i| y[i]).sum::<f64>() / n as f64;
    let leaf = Grown::Leaf(TreeNode::Leaf {
        value: mean,
        n_samples: n,
    });

    let depth_reached = limits.max_depth.is_some_and(|d| depth >= d);
    if depth_reached || n < limits.min_samples_split || n < 2 * limits.min_samples_leaf {
        return leaf;
    }

    let Some(best) = best_split(x, y, indices, limits.min_samples_leaf) else {
        return leaf;
    };

    let mut boundary = 0;
    for k in 0..n {
        if x[[indices[k], best.feature]] <= best.threshold {
            indices.swap(k, boundary);
            boundary += 1;
        }
    }
    if boundary == 0 || boundary == n {
        return leaf;
    }

    Grown::Split {
        feature: best.feature,
        threshold: best.threshold,
        boundary,
    }
}

/// Best variance-reducing split over all features.
///
/// Scores are the sum of squared errors of the two children, so a lower
/// score is better. Ties keep the lowest feature index and threshold.
fn best_split(
    x: &Array2<f64>,
    y: &Array1<f64>,
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<Candidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;
    if parent_sse <= f64::EPSILON * total_sq.max(1.0) {
        return None;
    }

    let mut best: Option<Candidate> = None;
    let mut order: Vec<usize> = indices.to_vec();

    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..n - 1 {
            let yi = y[order[k]];
            left_sum += yi;
            left_sq += yi * yi;

            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < min_samples_leaf || right_n < min_samples_leaf {
                continue;
            }

            let here = x[[order[k], feature]];
            let next = x[[order[k + 1], feature]];
            if here >= next {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let score = (left_sq - left_sum * left_sum / left_n as f64)
                + (right_sq - right_sum * right_sum / right_n as f64);

            if best.is_none_or(|b| score < b.score) {
                let mid = here + (next - here) / 2.0;
                let threshold = if mid < next { mid } else { here };
                best = Some(Candidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
    }

    best.filter(|b| b.score < parent_sse)
}
