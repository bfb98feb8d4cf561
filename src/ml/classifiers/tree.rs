//! Histogram-binned regression trees fitted to gradient statistics. Shared by
//! the boosting classifiers.

use ndarray::{Array2, ArrayView1, Axis};

pub const MAX_BINS: usize = 32;

/// Features quantized to at most [`MAX_BINS`] buckets each.
#[derive(Debug, Clone)]
pub struct BinnedFeatures {
    /// Upper edge of every bucket but the last, per feature
    pub thresholds: Vec<Vec<f64>>,
    /// Bucket code per feature, per row
    codes: Vec<Vec<u8>>,
}

impl BinnedFeatures {
    pub fn new(x: &Array2<f64>) -> Self {
        let mut thresholds = Vec::with_capacity(x.ncols());
        let mut codes = Vec::with_capacity(x.ncols());
        for col in x.axis_iter(Axis(1)) {
            let mut sorted: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let mut edges = Vec::new();
            if !sorted.is_empty() {
                for b in 1..MAX_BINS {
                    let edge = sorted[(b * (sorted.len() - 1)) / MAX_BINS];
                    if edges.last().map_or(true, |last| edge > *last) {
                        edges.push(edge);
                    }
                }
                // the top edge would leave an empty bucket
                if edges.last() == sorted.last() {
                    edges.pop();
                }
            }
            let col_codes = col.iter().map(|v| Self::code(&edges, *v)).collect();
            thresholds.push(edges);
            codes.push(col_codes);
        }
        Self { thresholds, codes }
    }

    fn code(edges: &[f64], value: f64) -> u8 {
        edges.partition_point(|e| *e < value) as u8
    }

    pub fn features(&self) -> usize {
        self.thresholds.len()
    }

    fn bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Minimum hessian mass per child
    pub min_child_weight: f64,
    /// L2 penalty on leaf values
    pub lambda: f64,
    /// Minimum gain to split
    pub gamma: f64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Leaves hold Newton steps `-G / (H + lambda)`.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    root: Node,
}

struct BestSplit {
    feature: usize,
    bin: usize,
    gain: f64,
}

impl RegressionTree {
    pub fn fit(binned: &BinnedFeatures, grad: &[f64], hess: &[f64], rows: Vec<usize>, params: &TreeParams) -> Self {
        Self {
            root: Self::build(binned, grad, hess, rows, 0, params),
        }
    }

    fn leaf_value(g: f64, h: f64, lambda: f64) -> f64 {
        -g / (h + lambda).max(1e-12)
    }

    fn score(g: f64, h: f64, lambda: f64) -> f64 {
        g * g / (h + lambda).max(1e-12)
    }

    fn build(
        binned: &BinnedFeatures,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
    ) -> Node {
        let g: f64 = rows.iter().map(|&i| grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| hess[i]).sum();
        let leaf = Node::Leaf(Self::leaf_value(g, h, params.lambda));
        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return leaf;
        }

        let parent = Self::score(g, h, params.lambda);
        let mut best: Option<BestSplit> = None;
        for feature in 0..binned.features() {
            let bins = binned.bins(feature);
            if bins < 2 {
                continue;
            }
            let codes = &binned.codes[feature];
            let mut hist = vec![(0.0f64, 0.0f64, 0usize); bins];
            for &i in &rows {
                let slot = &mut hist[codes[i] as usize];
                slot.0 += grad[i];
                slot.1 += hess[i];
                slot.2 += 1;
            }
            let (mut gl, mut hl, mut nl) = (0.0, 0.0, 0usize);
            for (bin, (bg, bh, bn)) in hist.iter().enumerate().take(bins - 1) {
                gl += bg;
                hl += bh;
                nl += bn;
                let nr = rows.len() - nl;
                let (gr, hr) = (g - gl, h - hl);
                if nl < params.min_samples_leaf.max(1) || nr < params.min_samples_leaf.max(1) {
                    continue;
                }
                if hl < params.min_child_weight || hr < params.min_child_weight {
                    continue;
                }
                let gain = Self::score(gl, hl, params.lambda) + Self::score(gr, hr, params.lambda) - parent;
                if gain > params.gamma + 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit { feature, bin, gain });
                }
            }
        }

        let Some(split) = best else {
            return leaf;
        };
        let codes = &binned.codes[split.feature];
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&i| (codes[i] as usize) <= split.bin);
        Node::Split {
            feature: split.feature,
            threshold: binned.thresholds[split.feature][split.bin],
            left: Box::new(Self::build(binned, grad, hess, left_rows, depth + 1, params)),
            right: Box::new(Self::build(binned, grad, hess, right_rows, depth + 1, params)),
        }
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    /// Rewrite every leaf value, keeping the splits.
    pub fn map_leaves(self, f: impl Fn(f64) -> f64 + Copy) -> Self {
        fn walk(node: Node, f: impl Fn(f64) -> f64 + Copy) -> Node {
            match node {
                Node::Leaf(value) => Node::Leaf(f(value)),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => Node::Split {
                    feature,
                    threshold,
                    left: Box::new(walk(*left, f)),
                    right: Box::new(walk(*right, f)),
                },
            }
        }
        Self {
            root: walk(self.root, f),
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}
