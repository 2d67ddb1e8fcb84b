//! Seeded stratified train/held-out partitioning

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Index sets for the two partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub held_out: Vec<usize>,
}

/// Partition indices of `labels` so each class keeps its share in both halves
///
/// Each class is shuffled with an RNG seeded from `seed` and contributes
/// `round(class_size * test_size)` members to the held-out partition, always
/// leaving at least one member for training. Indices within each partition
/// are returned in ascending order.
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> StratifiedSplit {
    let test_size = test_size.clamp(0.0, 1.0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut held_out = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label == class)
            .map(|(index, _)| index)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let n_held_out = ((members.len() as f64 * test_size).round() as usize)
            .min(members.len() - 1);
        held_out.extend_from_slice(&members[..n_held_out]);
        train.extend_from_slice(&members[n_held_out..]);
    }

    train.sort_unstable();
    held_out.sort_unstable();
    StratifiedSplit { train, held_out }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<u8> {
        let mut labels = vec![0u8; 70];
        labels.extend(vec![1u8; 30]);
        labels
    }

    #[test]
    fn test_split_preserves_class_ratio() {
        let labels = labels();
        let split = stratified_split(&labels, 0.3, 42);

        assert_eq!(split.train.len() + split.held_out.len(), labels.len());
        let held_out_churn = split.held_out.iter().filter(|&&i| labels[i] == 1).count();
        let train_churn = split.train.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(held_out_churn, 9);
        assert_eq!(train_churn, 21);
        assert_eq!(split.held_out.len(), 30);
    }

    #[test]
    fn test_split_is_reproducible() {
        let labels = labels();
        assert_eq!(
            stratified_split(&labels, 0.3, 42),
            stratified_split(&labels, 0.3, 42)
        );
        assert_ne!(
            stratified_split(&labels, 0.3, 42).held_out,
            stratified_split(&labels, 0.3, 7).held_out
        );
    }

    #[test]
    fn test_singleton_class_stays_in_training() {
        let labels = vec![0, 0, 0, 0, 1];
        let split = stratified_split(&labels, 0.5, 1);
        assert!(split.train.contains(&4));
    }

    #[test]
    fn test_partitions_are_disjoint() {
        let labels = labels();
        let split = stratified_split(&labels, 0.25, 3);
        assert!(split.train.iter().all(|i| !split.held_out.contains(i)));
    }
}
