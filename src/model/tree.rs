//! CART regression tree
//!
//! Greedy binary splits minimising the summed squared error of the two
//! children. Every split considers all features; thresholds sit halfway
//! between adjacent distinct values.

use serde::{Deserialize, Serialize};

use super::Regressor;
use crate::types::{FeatureVector, FEATURE_COUNT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

/// Best split found for one node
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

impl RegressionTree {
    /// Single-leaf tree that always predicts `value`.
    pub fn constant(value: f64) -> Self {
        Self { root: Node::Leaf { value } }
    }

    /// Fit on the rows named by `sample` (may repeat, as in a bootstrap).
    pub fn fit(x: &[FeatureVector], y: &[f64], sample: &[usize], max_depth: usize) -> Self {
        let mut indices = sample.to_vec();
        Self {
            root: build_node(x, y, &mut indices, max_depth),
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

impl Regressor for RegressionTree {
    fn predict(&self, features: &FeatureVector) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split { feature, threshold, left, right } => {
                    node = if features.0[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }
}

fn mean_of(y: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
}

fn sse_of(y: &[f64], indices: &[usize]) -> f64 {
    let mean = mean_of(y, indices);
    indices.iter().map(|&i| (y[i] - mean).powi(2)).sum()
}

fn build_node(x: &[FeatureVector], y: &[f64], indices: &mut [usize], depth_left: usize) -> Node {
    let value = mean_of(y, indices);
    if depth_left == 0 || indices.len() < 2 {
        return Node::Leaf { value };
    }

    let parent_sse = sse_of(y, indices);
    if parent_sse <= f64::EPSILON {
        return Node::Leaf { value };
    }

    let best = match best_split(x, y, indices) {
        Some(split) if split.sse < parent_sse => split,
        _ => return Node::Leaf { value },
    };

    // Partition in place: left side first
    let mut boundary = 0;
    for i in 0..indices.len() {
        if x[indices[i]].0[best.feature] <= best.threshold {
            indices.swap(i, boundary);
            boundary += 1;
        }
    }
    if boundary == 0 || boundary == indices.len() {
        return Node::Leaf { value };
    }

    let (left, right) = indices.split_at_mut(boundary);
    Node::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(build_node(x, y, left, depth_left - 1)),
        right: Box::new(build_node(x, y, right, depth_left - 1)),
    }
}

fn best_split(x: &[FeatureVector], y: &[f64], indices: &[usize]) -> Option<SplitCandidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature in 0..FEATURE_COUNT {
        order.sort_by(|&a, &b| x[a].0[feature].total_cmp(&x[b].0[feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..n - 1 {
            let yi = y[order[k]];
            left_sum += yi;
            left_sq += yi * yi;

            let here = x[order[k]].0[feature];
            let next = x[order[k + 1]].0[feature];
            if next <= here {
                continue;
            }

            let left_n = (k + 1) as f64;
            let right_n = (n - k - 1) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if best.as_ref().map_or(true, |b| sse < b.sse) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: here + (next - here) / 2.0,
                    sse,
                });
            }
        }
    }

    best
}
