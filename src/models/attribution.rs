//! Exact per-feature attribution for tree ensembles (path-dependent TreeSHAP).
//!
//! For every tree the algorithm walks all root-to-leaf paths once, tracking
//! for each feature on the path the fraction of training cover that flows
//! through ("zero fraction") and whether the explained input follows the
//! path ("one fraction"). The resulting values are the exact Shapley values
//! of the tree's cover-conditional expectation, so for every input
//!
//! `baseline + sum(contributions) == raw_score`
//!
//! where the baseline is the ensemble's cover-weighted expected raw score.
//! Attributions are in log-odds space; positive values push toward approval.

use crate::error::{PipelineError, Result};
use crate::models::booster::GradientBoostedClassifier;
use crate::models::tree::{Node, RegressionTree};
use crate::preprocessor::FeatureVector;
use std::sync::Arc;

/// Signed contribution per feature plus the baseline they are measured from.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionResult {
    names: Arc<[String]>,
    contributions: Vec<f64>,
    baseline: f64,
}

impl AttributionResult {
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contributions(&self) -> &[f64] {
        &self.contributions
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.contributions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.contributions.iter().copied())
    }

    /// Baseline plus every contribution; equals the explained raw score.
    pub fn reconstructed_score(&self) -> f64 {
        self.baseline + self.contributions.iter().sum::<f64>()
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// `None` marks the root placeholder
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

/// TreeSHAP attributor bound to one classifier's expected value.
#[derive(Debug, Clone)]
pub struct TreeShapAttributor {
    baseline: f64,
}

impl TreeShapAttributor {
    pub fn new(model: &GradientBoostedClassifier) -> Self {
        Self {
            baseline: expected_value(model),
        }
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Attribute the raw score of `vector` to its features.
    pub fn attribute(
        &self,
        vector: &FeatureVector,
        model: &GradientBoostedClassifier,
    ) -> Result<AttributionResult> {
        if vector.len() != model.num_features() {
            return Err(PipelineError::Explanation(format!(
                "cannot attribute {} features with a classifier over {}",
                vector.len(),
                model.num_features()
            )));
        }

        let mut phi = vec![0.0; vector.len()];
        for tree in model.trees() {
            tree_shap(tree, vector.values(), &mut phi);
        }

        Ok(AttributionResult {
            names: vector.shared_names(),
            contributions: phi,
            baseline: self.baseline,
        })
    }
}

/// Expected raw score of the ensemble over the training distribution.
pub fn expected_value(model: &GradientBoostedClassifier) -> f64 {
    model.base_margin()
        + model
            .trees()
            .iter()
            .map(RegressionTree::expected_value)
            .sum::<f64>()
}

/// Add the Shapley values of one tree for input `x` into `phi`.
pub fn tree_shap(tree: &RegressionTree, x: &[f64], phi: &mut [f64]) {
    let path = Vec::with_capacity(tree.depth() + 2);
    recurse(tree, 0, x, phi, path, 1.0, 1.0, None);
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &RegressionTree,
    index: usize,
    x: &[f64],
    phi: &mut [f64],
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    extend(&mut path, zero_fraction, one_fraction, feature);

    match tree.node(index) {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let element = path[i];
                if let Some(f) = element.feature {
                    let w = unwound_sum(&path, i);
                    phi[f] += w * (element.one_fraction - element.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature: split,
            threshold,
            left,
            right,
            cover,
        } => {
            let (hot, cold) = if x[*split] < *threshold {
                (*left, *right)
            } else {
                (*right, *left)
            };
            let hot_zero = tree.node(hot).cover() / cover;
            let cold_zero = tree.node(cold).cover() / cover;

            // A feature split on twice along a path is tracked once.
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = path.iter().position(|e| e.feature == Some(*split)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind(&mut path, k);
            }

            recurse(
                tree,
                hot,
                x,
                phi,
                path.clone(),
                hot_zero * incoming_zero,
                incoming_one,
                Some(*split),
            );
            recurse(
                tree,
                cold,
                x,
                phi,
                path,
                cold_zero * incoming_zero,
                0.0,
                Some(*split),
            );
        }
    }
}

/// Append a feature to the path, updating the permutation weights.
fn extend(
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let scale = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i + 1) as f64 / scale;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / scale;
    }
}

/// Remove element `index` from the path, undoing its effect on the weights.
fn unwind(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one = path[depth].weight;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let previous = path[i].weight;
            path[i].weight = next_one * scale / ((i + 1) as f64 * one_fraction);
            next_one = previous - path[i].weight * zero_fraction * (depth - i) as f64 / scale;
        } else {
            path[i].weight = path[i].weight * scale / (zero_fraction * (depth - i) as f64);
        }
    }

    // Weights stay in place; only the feature bookkeeping shifts down.
    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight of the path with element `index` removed.
fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let scale = (depth + 1) as f64;
    let mut next_one = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = next_one * scale / ((i + 1) as f64 * one_fraction);
            total += tmp;
            next_one = path[i].weight - tmp * zero_fraction * (depth - i) as f64 / scale;
        } else if zero_fraction != 0.0 {
            total += path[i].weight / zero_fraction / ((depth - i) as f64 / scale);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: f64, cover: f64) -> Node {
        Node::Leaf { value, cover }
    }

    fn split(feature: usize, threshold: f64, left: usize, right: usize, cover: f64) -> Node {
        Node::Split {
            feature,
            threshold,
            left,
            right,
            cover,
        }
    }

    /// Depth-3 tree over 3 features that splits on feature 0 twice along one
    /// path.
    fn tree() -> RegressionTree {
        RegressionTree::new(vec![
            split(0, 0.5, 1, 2, 100.0),
            split(1, 0.5, 3, 4, 60.0),
            split(2, 0.5, 5, 6, 40.0),
            split(0, 0.25, 7, 8, 35.0),
            leaf(0.8, 25.0),
            leaf(-0.4, 10.0),
            leaf(1.2, 30.0),
            leaf(-1.0, 20.0),
            leaf(0.3, 15.0),
        ])
    }

    /// Cover-conditional expectation with the features in `known` fixed to x.
    fn conditional_expectation(
        tree: &RegressionTree,
        index: usize,
        x: &[f64],
        known: &[bool],
    ) -> f64 {
        match tree.node(index) {
            Node::Leaf { value, .. } => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
                cover,
            } => {
                if known[*feature] {
                    let next = if x[*feature] < *threshold { *left } else { *right };
                    conditional_expectation(tree, next, x, known)
                } else {
                    let left_value = conditional_expectation(tree, *left, x, known);
                    let right_value = conditional_expectation(tree, *right, x, known);
                    (tree.node(*left).cover() * left_value
                        + tree.node(*right).cover() * right_value)
                        / cover
                }
            }
        }
    }

    fn factorial(n: usize) -> f64 {
        (1..=n).map(|k| k as f64).product()
    }

    /// Shapley values by enumerating every coalition.
    fn brute_force(tree: &RegressionTree, x: &[f64]) -> Vec<f64> {
        let n = x.len();
        let mut phi = vec![0.0; n];
        for i in 0..n {
            for mask in 0..(1usize << n) {
                if mask & (1 << i) != 0 {
                    continue;
                }
                let size = mask.count_ones() as usize;
                let weight = factorial(size) * factorial(n - size - 1) / factorial(n);
                let without: Vec<bool> = (0..n).map(|j| mask & (1 << j) != 0).collect();
                let mut with = without.clone();
                with[i] = true;
                phi[i] += weight
                    * (conditional_expectation(tree, 0, x, &with)
                        - conditional_expectation(tree, 0, x, &without));
            }
        }
        phi
    }

    #[test]
    fn test_matches_brute_force_shapley_values() {
        let tree = tree();
        let inputs = [
            [0.1, 0.2, 0.9],
            [0.4, 0.2, 0.1],
            [0.7, 0.9, 0.1],
            [0.9, 0.1, 0.9],
            [0.3, 0.8, 0.3],
        ];
        for x in inputs {
            let mut phi = vec![0.0; 3];
            tree_shap(&tree, &x, &mut phi);
            let expected = brute_force(&tree, &x);
            for (got, want) in phi.iter().zip(&expected) {
                assert!(
                    (got - want).abs() < 1e-9,
                    "x = {:?}: got {:?}, want {:?}",
                    x,
                    phi,
                    expected
                );
            }
        }
    }

    #[test]
    fn test_local_accuracy_single_tree() {
        let tree = tree();
        for x in [[0.1, 0.2, 0.9], [0.6, 0.6, 0.6], [0.3, 0.9, 0.0]] {
            let mut phi = vec![0.0; 3];
            tree_shap(&tree, &x, &mut phi);
            let total = tree.expected_value() + phi.iter().sum::<f64>();
            assert!((total - tree.predict(&x)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_stump_attribution() {
        let tree = RegressionTree::new(vec![
            split(1, 0.5, 1, 2, 10.0),
            leaf(-1.0, 4.0),
            leaf(2.0, 6.0),
        ]);
        let mut phi = vec![0.0; 2];
        tree_shap(&tree, &[5.0, 0.0], &mut phi);

        // Only feature 1 is used: its value moves the output from 0.8 to -1.0
        assert_eq!(phi[0], 0.0);
        assert!((phi[1] - (-1.8)).abs() < 1e-12);
    }

    #[test]
    fn test_single_leaf_tree_contributes_nothing() {
        let tree = RegressionTree::new(vec![leaf(0.7, 3.0)]);
        let mut phi = vec![0.0; 2];
        tree_shap(&tree, &[1.0, 2.0], &mut phi);
        assert_eq!(phi, vec![0.0, 0.0]);
        assert_eq!(tree.expected_value(), 0.7);
    }
}
