use anyhow::{Result, ensure};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Features tried at each split; `None` tries all of them.
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 8,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree; rows with `x[feature] <= threshold` go left.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn fit(
        features: &[Vec<f64>],
        targets: &[f64],
        sample: Vec<usize>,
        config: &ForestConfig,
        rng: StdRng,
    ) -> Self {
        let mut builder = TreeBuilder {
            features,
            targets,
            config,
            rng,
            nodes: Vec::new(),
        };
        builder.grow(sample, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        while let Some(node) = self.nodes.get(idx) {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if x <= *threshold { *left } else { *right };
                }
            }
        }
        0.0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(Node::Split { left, right, .. }) => {
                    1 + walk(nodes, *left).max(walk(nodes, *right))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    sse: f64,
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    targets: &'a [f64],
    config: &'a ForestConfig,
    rng: StdRng,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn grow(&mut self, sample: Vec<usize>, depth: usize) -> usize {
        let value = mean(sample.iter().map(|&i| self.targets[i]));
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        let min_leaf = self.config.min_samples_leaf.max(1);
        if depth >= self.config.max_depth || sample.len() < 2 * min_leaf {
            return id;
        }
        let Some(split) = self.best_split(&sample, min_leaf) else {
            return id;
        };

        let features = self.features;
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = sample
            .into_iter()
            .partition(|&i| features[i][split.feature] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&mut self, sample: &[usize], min_leaf: usize) -> Option<SplitCandidate> {
        let n_features = self.features.first().map_or(0, Vec::len);
        let mut candidates: Vec<usize> = (0..n_features).collect();
        if let Some(k) = self.config.max_features {
            if k < n_features {
                candidates.shuffle(&mut self.rng);
                candidates.truncate(k.max(1));
            }
        }

        let n = sample.len();
        let total_sum: f64 = sample.iter().map(|&i| self.targets[i]).sum();
        let total_sq: f64 = sample.iter().map(|&i| self.targets[i].powi(2)).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut best: Option<SplitCandidate> = None;
        for feature in candidates {
            let mut ordered: Vec<(f64, f64)> = sample
                .iter()
                .map(|&i| (self.features[i][feature], self.targets[i]))
                .collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let (x, y) = ordered[k];
                left_sum += y;
                left_sq += y * y;
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let next_x = ordered[k + 1].0;
                // Equal values cannot be separated.
                if next_x <= x {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                if best.as_ref().is_none_or(|b| sse < b.sse - 1e-12) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (x + next_x) / 2.0,
                        sse,
                    });
                }
            }
        }
        best.filter(|b| b.sse < parent_sse - 1e-12)
    }
}

/// Bagged regression trees averaged at prediction time.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Trees are built in parallel; tree `i` draws its bootstrap sample from
    /// `seed + i`, so results do not depend on the thread count.
    pub fn fit(features: &[Vec<f64>], targets: &[f64], config: &ForestConfig) -> Result<Self> {
        ensure!(!features.is_empty(), "cannot fit a forest on zero rows");
        ensure!(
            features.len() == targets.len(),
            "feature rows ({}) and targets ({}) differ in length",
            features.len(),
            targets.len()
        );
        ensure!(config.n_trees > 0, "forest needs at least one tree");
        let n_features = features.first().map_or(0, Vec::len);
        ensure!(
            features.iter().all(|row| row.len() == n_features),
            "feature rows have differing widths"
        );

        let n = features.len();
        let trees: Vec<RegressionTree> = (0..config.n_trees)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(features, targets, sample, config, rng)
            })
            .collect();

        debug!(
            trees = trees.len(),
            rows = n,
            features = n_features,
            "fitted random forest"
        );
        Ok(Self { trees, n_features })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        mean(self.trees.iter().map(|t| t.predict(row)))
    }

    pub fn predict_many(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}
