//! Stratified, seeded train/test split.

use crate::error::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Row indices of each partition, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split rows so both partitions keep the class proportions of `labels`.
///
/// Each class contributes `round(count * test_fraction)` rows to the test
/// partition, chosen by a shuffle seeded with `seed`.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::TrainingData(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_class: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }
    if by_class.len() < 2 {
        return Err(PipelineError::TrainingData(
            "stratified split needs at least two classes".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for (label, mut indices) in by_class {
        if indices.len() < 2 {
            return Err(PipelineError::TrainingData(format!(
                "class {} has {} row(s); at least 2 are needed to stratify",
                label,
                indices.len()
            )));
        }
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64) * test_fraction).round() as usize;
        let n_test = n_test.clamp(1, indices.len() - 1);
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(SplitIndices { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(approved: usize, rejected: usize) -> Vec<u8> {
        let mut labels = vec![1; approved];
        labels.extend(vec![0; rejected]);
        labels
    }

    #[test]
    fn test_preserves_class_proportions() {
        let labels = labels(70, 30);
        let split = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_approved = split.test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(test_approved, 14);
        let train_approved = split.train.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(train_approved, 56);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let labels = labels(13, 9);
        let split = stratified_split(&labels, 0.25, 7).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_reproducible_for_fixed_seed() {
        let labels = labels(50, 50);
        let a = stratified_split(&labels, 0.2, 42).unwrap();
        let b = stratified_split(&labels, 0.2, 42).unwrap();
        let c = stratified_split(&labels, 0.2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rejects_single_class() {
        assert!(stratified_split(&labels(10, 0), 0.2, 42).is_err());
        assert!(stratified_split(&labels(10, 1), 0.2, 42).is_err());
        assert!(stratified_split(&labels(10, 10), 1.0, 42).is_err());
    }
}
