//! Isolation Forest.
//!
//! Unsupervised outlier scoring: points isolated by fewer random splits get
//! higher anomaly scores. Scores follow the standard normalization
//! `s(x) = 2^(-E[h(x)] / c(psi))`, so scores near 1 are anomalous and
//! scores near 0.5 and below are normal.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Subsample size per tree, as in the original formulation.
const SUBSAMPLE: usize = 256;

/// Euler-Mascheroni constant for the average path length estimate.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug)]
enum Tree {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Tree>,
        right: Box<Tree>,
    },
}

/// A fitted Isolation Forest.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Tree>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit `n_trees` trees on `data` (row-major), deterministically seeded.
    pub fn fit(data: &[Vec<f64>], n_trees: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let subsample = SUBSAMPLE.min(data.len());
        if subsample == 0 {
            return Self {
                trees: Vec::new(),
                subsample: 0,
            };
        }
        let height_limit = (subsample as f64).log2().ceil().max(1.0) as usize;

        let mut trees = Vec::with_capacity(n_trees);
        let mut indices: Vec<usize> = (0..data.len()).collect();
        for _ in 0..n_trees {
            indices.shuffle(&mut rng);
            let sample: Vec<&Vec<f64>> =
                indices[..subsample].iter().map(|&i| &data[i]).collect();
            trees.push(build_tree(&sample, 0, height_limit, &mut rng));
        }

        Self { trees, subsample }
    }

    /// Anomaly score of one point, in (0, 1); higher is more anomalous.
    pub fn score(&self, point: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|t| path_length(t, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.subsample);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    /// Flag the top `contamination` fraction of `data` as outliers.
    ///
    /// Returns `(scores, outlier_mask)`. At least one point is flagged
    /// whenever `contamination > 0` and the data is non-empty.
    pub fn outliers(&self, data: &[Vec<f64>], contamination: f64) -> (Vec<f64>, Vec<bool>) {
        let scores: Vec<f64> = data.iter().map(|row| self.score(row)).collect();
        if data.is_empty() || contamination <= 0.0 {
            return (scores, vec![false; data.len()]);
        }
        let flag_count = ((data.len() as f64 * contamination).ceil() as usize).max(1);
        let mut ranked: Vec<usize> = (0..scores.len()).collect();
        ranked.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        let mut mask = vec![false; data.len()];
        for &i in ranked.iter().take(flag_count) {
            mask[i] = true;
        }
        (scores, mask)
    }
}

fn build_tree(
    sample: &[&Vec<f64>],
    depth: usize,
    height_limit: usize,
    rng: &mut ChaCha8Rng,
) -> Tree {
    if depth >= height_limit || sample.len() <= 1 {
        return Tree::Leaf { size: sample.len() };
    }
    let dims = sample[0].len();

    // Pick a feature that still varies within this node; give up after a
    // few blind draws (constant node).
    for _ in 0..dims.max(4) {
        let feature = rng.gen_range(0..dims);
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for row in sample {
            lo = lo.min(row[feature]);
            hi = hi.max(row[feature]);
        }
        if hi - lo < 1e-12 {
            continue;
        }
        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<&Vec<f64>>, Vec<&Vec<f64>>) =
            sample.iter().partition(|row| row[feature] < threshold);
        if left.is_empty() || right.is_empty() {
            continue;
        }
        return Tree::Split {
            feature,
            threshold,
            left: Box::new(build_tree(&left, depth + 1, height_limit, rng)),
            right: Box::new(build_tree(&right, depth + 1, height_limit, rng)),
        };
    }
    Tree::Leaf { size: sample.len() }
}

fn path_length(tree: &Tree, point: &[f64], depth: usize) -> f64 {
    match tree {
        Tree::Leaf { size } => depth as f64 + average_path_length(*size),
        Tree::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] < *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// `c(n)`: expected path length of an unsuccessful BST search over n points.
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Vec<f64>> {
        // Tight cluster near the origin plus one extreme point.
        let mut data: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let t = i as f64 * 0.01;
                vec![t, 1.0 - t, t * 0.5]
            })
            .collect();
        data.push(vec![50.0, -40.0, 90.0]);
        data
    }

    #[test]
    fn extreme_point_scores_highest() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 42);
        let scores: Vec<f64> = data.iter().map(|r| forest.score(r)).collect();
        let max_idx = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(max_idx, data.len() - 1);
    }

    #[test]
    fn contamination_bounds_the_flag_count() {
        let data = cluster_with_outlier();
        let forest = IsolationForest::fit(&data, 100, 42);
        let (_, mask) = forest.outliers(&data, 0.05);
        let flagged = mask.iter().filter(|&&b| b).count();
        assert!(flagged >= 1);
        assert!(flagged <= (data.len() as f64 * 0.05).ceil() as usize);
        assert!(mask[data.len() - 1], "the planted outlier must be flagged");
    }

    #[test]
    fn deterministic_under_fixed_seed() {
        let data = cluster_with_outlier();
        let a = IsolationForest::fit(&data, 50, 7);
        let b = IsolationForest::fit(&data, 50, 7);
        for row in &data {
            assert_eq!(a.score(row), b.score(row));
        }
    }

    #[test]
    fn uniform_data_flags_nothing_extreme() {
        let data: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 % 2.0, 0.0]).collect();
        let forest = IsolationForest::fit(&data, 50, 3);
        let (scores, _) = forest.outliers(&data, 0.05);
        // No point should look dramatically more isolated than the rest.
        let max = scores.iter().cloned().fold(f64::MIN, f64::max);
        let min = scores.iter().cloned().fold(f64::MAX, f64::min);
        assert!(max - min < 0.2, "spread {}", max - min);
    }
}
