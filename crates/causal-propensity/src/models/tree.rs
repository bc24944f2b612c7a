//! Regression trees grown on gradient/hessian statistics for boosting.
use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    /// Rows with `x[feature] < threshold` go left, everything else
    /// (including NaN) goes right.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single boosted regression tree. Leaf values already include the
/// learning rate.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + depth_of(nodes, left).max(depth_of(nodes, right)),
            }
        }
        depth_of(&self.nodes, 0)
    }
}

/// Growth parameters for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: u32,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeGrower<'a> {
    x: ArrayView2<'a, f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
    nodes: Vec<Node>,
}

impl<'a> TreeGrower<'a> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.reg_lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.reg_lambda)
    }

    fn best_split_for_feature(&self, feature: usize, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let mut sorted = rows.to_vec();
        sorted.sort_unstable_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

        let parent = self.score(g_total, h_total);
        let mut best: Option<SplitCandidate> = None;
        let mut g_left = 0.0;
        let mut h_left = 0.0;

        for k in 0..sorted.len() - 1 {
            let row = sorted[k];
            g_left += self.grad[row];
            h_left += self.hess[row];

            let lo = self.x[[row, feature]];
            let hi = self.x[[sorted[k + 1], feature]];
            if lo == hi {
                continue;
            }

            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                continue;
            }

            let gain = 0.5 * (self.score(g_left, h_left) + self.score(g_right, h_right) - parent) - self.params.gamma;
            if gain > 0.0 && best.map_or(true, |b| gain > b.gain) {
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid > lo { mid } else { hi };
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
        best
    }

    fn find_split(&self, rows: &[usize], g_total: f64, h_total: f64) -> Option<SplitCandidate> {
        let candidates: Vec<Option<SplitCandidate>> = self
            .features
            .par_iter()
            .map(|&f| self.best_split_for_feature(f, rows, g_total, h_total))
            .collect();

        // Sequential reduction keeps the lowest feature index on equal gain.
        candidates.into_iter().flatten().fold(None, |best: Option<SplitCandidate>, c| match best {
            Some(b) if b.gain >= c.gain => Some(b),
            _ => Some(c),
        })
    }

    fn grow(&mut self, rows: Vec<usize>, depth: u32) -> usize {
        let g_total: f64 = rows.iter().map(|&r| self.grad[r]).sum();
        let h_total: f64 = rows.iter().map(|&r| self.hess[r]).sum();

        let idx = self.nodes.len();
        let value = self.leaf_weight(g_total, h_total);
        self.nodes.push(Node::Leaf { value });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(split) = self.find_split(&rows, g_total, h_total) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[[r, split.feature]] < split.threshold);

        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }
}

/// Grow one tree on all rows of `x`, restricted to the sampled `features`.
pub(crate) fn grow_tree(
    x: ArrayView2<f64>,
    grad: &[f64],
    hess: &[f64],
    features: &[usize],
    params: TreeParams,
) -> RegressionTree {
    let mut grower = TreeGrower {
        x: x.view(),
        grad,
        hess,
        features,
        params,
        nodes: Vec::new(),
    };
    grower.grow((0..x.nrows()).collect(), 0);
    RegressionTree { nodes: grower.nodes }
}
