// In crates/strategies/src/forest.rs

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

const MIN_SAMPLES_SPLIT: usize = 4;
const MIN_SAMPLES_LEAF: usize = 2;

#[derive(Debug, Clone)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub seed: u64,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        /// Share of class 1 among the samples that reached this leaf.
        p_one: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn p_one(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { p_one } => *p_one,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.p_one(row)
                } else {
                    right.p_one(row)
                }
            }
        }
    }
}

fn gini(ones: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = ones as f64 / total as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

struct TreeBuilder<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [u8],
    max_depth: usize,
    max_features: usize,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &[usize], depth: usize, rng: &mut StdRng) -> Node {
        let total = indices.len();
        let ones = indices.iter().filter(|&&i| self.labels[i] == 1).count();
        let leaf = Node::Leaf {
            p_one: if total == 0 { 0.5 } else { ones as f64 / total as f64 },
        };

        if depth >= self.max_depth || total < MIN_SAMPLES_SPLIT || ones == 0 || ones == total {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(indices, gini(ones, total), rng) else {
            return leaf;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.features[i][feature] <= threshold);
        if left.len() < MIN_SAMPLES_LEAF || right.len() < MIN_SAMPLES_LEAF {
            return leaf;
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(&left, depth + 1, rng)),
            right: Box::new(self.build(&right, depth + 1, rng)),
        }
    }

    /// Best Gini gain over a random subset of features, trying midpoints between sorted values.
    fn best_split(&self, indices: &[usize], parent: f64, rng: &mut StdRng) -> Option<(usize, f64)> {
        let width = self.features[indices[0]].len();
        let mut candidates: Vec<usize> = (0..width).collect();
        candidates.shuffle(rng);
        candidates.truncate(self.max_features);

        let total = indices.len();
        let total_ones = indices.iter().filter(|&&i| self.labels[i] == 1).count();
        let mut best: Option<(usize, f64)> = None;
        let mut best_gain = 0.0;

        for feature in candidates {
            let mut sorted: Vec<(f64, u8)> = indices
                .iter()
                .map(|&i| (self.features[i][feature], self.labels[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            // Sweep left to right, keeping running class counts.
            let mut left_ones = 0;
            for k in 1..total {
                left_ones += usize::from(sorted[k - 1].1);
                if sorted[k - 1].0 == sorted[k].0 {
                    continue;
                }
                let left_n = k;
                let right_n = total - k;
                let weighted = (left_n as f64 * gini(left_ones, left_n)
                    + right_n as f64 * gini(total_ones - left_ones, right_n))
                    / total as f64;
                let gain = parent - weighted;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feature, (sorted[k - 1].0 + sorted[k].0) / 2.0));
                }
            }
        }
        best
    }
}

/// A bagged ensemble of Gini decision trees for a binary label.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<Node>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Fits every tree on a bootstrap sample. `features` must be non-empty and rectangular.
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) {
        let n = features.len();
        if n == 0 {
            self.trees.clear();
            return;
        }
        self.n_features = features[0].len();
        let max_features = ((self.n_features as f64).sqrt().ceil() as usize).max(1);
        let builder = TreeBuilder {
            features,
            labels,
            max_depth: self.config.max_depth,
            max_features,
        };

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.trees = (0..self.config.n_trees)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                builder.build(&sample, 0, &mut rng)
            })
            .collect();
    }

    /// Mean probability of class 1 across the trees.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        self.trees.iter().map(|t| t.p_one(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn predict(&self, row: &[f64]) -> u8 {
        u8::from(self.predict_proba(row) > 0.5)
    }

    /// Share of rows whose predicted class matches the label.
    pub fn accuracy(&self, features: &[Vec<f64>], labels: &[u8]) -> f64 {
        if features.is_empty() {
            return 0.0;
        }
        let correct = features
            .iter()
            .zip(labels)
            .filter(|(row, label)| self.predict(row) == **label)
            .count();
        correct as f64 / features.len() as f64
    }
}
