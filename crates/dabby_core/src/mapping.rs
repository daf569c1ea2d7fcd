use crate::error::{ChaosError, Result};
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A value tagged with its position in the source trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndexedValue {
    pub original_index: usize,
    pub value: f64,
}

/// One entry of a mapping: B's temporal index and the index into A chosen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPair {
    pub source_index: usize,
    pub target_index: usize,
}

impl IndexPair {
    /// A self-mapped entry means "no substitution" to consumers.
    pub fn is_self_mapping(&self) -> bool {
        self.source_index == self.target_index
    }
}

/// Per-index correspondence between two trajectories, one pair per sample of B.
///
/// Not a permutation: several sources may share a target, and any source may map to itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChaoticMapping {
    pairs: Vec<IndexPair>,
}

impl ChaoticMapping {
    pub fn pairs(&self) -> &[IndexPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, source_index: usize) -> Option<IndexPair> {
        self.pairs.get(source_index).copied()
    }

    pub fn target_of(&self, source_index: usize) -> Option<usize> {
        self.get(source_index).map(|pair| pair.target_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexPair> + '_ {
        self.pairs.iter().copied()
    }

    /// Number of entries whose target differs from their source.
    pub fn variation_count(&self) -> usize {
        self.pairs.iter().filter(|p| !p.is_self_mapping()).count()
    }

    pub fn variation_ratio(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        self.variation_count() as f64 / self.pairs.len() as f64
    }

    /// Distinct targets among the varied entries.
    pub fn distinct_targets(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| !p.is_self_mapping())
            .map(|p| p.target_index)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// For every sample of `b`, finds the index into `a` of the smallest value not less
/// than it.
///
/// An exact match wins over a strictly greater value. When the only candidate is the
/// last sorted position (or there is none), the entry maps to itself.
pub fn map_indices(a: &Trajectory, b: &Trajectory) -> Result<ChaoticMapping> {
    if a.is_empty() {
        return Err(ChaosError::invalid("Trajectory A must not be empty."));
    }
    if b.is_empty() {
        return Err(ChaosError::invalid("Trajectory B must not be empty."));
    }

    let sorted = sorted_by_value(a);
    let pairs: Vec<IndexPair> = b
        .iter()
        .enumerate()
        .map(|(j, v)| IndexPair {
            source_index: j,
            target_index: nearest_successor(&sorted, v).unwrap_or(j),
        })
        .collect();

    let mapping = ChaoticMapping { pairs };
    debug!(
        len_a = a.len(),
        len_b = b.len(),
        variations = mapping.variation_count(),
        distinct_targets = mapping.distinct_targets(),
        "mapped trajectory indices"
    );
    Ok(mapping)
}

/// Stable ascending sort, so equal values keep their temporal order.
fn sorted_by_value(trajectory: &Trajectory) -> Vec<IndexedValue> {
    let mut sorted: Vec<IndexedValue> = trajectory
        .iter()
        .enumerate()
        .map(|(original_index, value)| IndexedValue {
            original_index,
            value,
        })
        .collect();
    sorted.sort_by(|lhs, rhs| lhs.value.total_cmp(&rhs.value));
    sorted
}

fn nearest_successor(sorted: &[IndexedValue], value: f64) -> Option<usize> {
    // Leftmost position whose value is strictly greater.
    let upper = sorted.partition_point(|entry| entry.value <= value);

    if let Some(previous) = upper.checked_sub(1).map(|p| sorted[p]) {
        if previous.value == value {
            return Some(previous.original_index);
        }
    }
    if upper + 1 < sorted.len() {
        return Some(sorted[upper].original_index);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{map_indices, ChaoticMapping, IndexPair};
    use crate::error::ChaosError;
    use crate::trajectory::Trajectory;

    fn targets(mapping: &ChaoticMapping) -> Vec<usize> {
        mapping.iter().map(|pair| pair.target_index).collect()
    }

    #[test]
    fn picks_least_greater_exact_or_self() {
        let a = Trajectory::from(vec![1.0, 3.0, 5.0, 7.0]);

        let between = map_indices(&a, &Trajectory::from(vec![4.0])).expect("maps");
        assert_eq!(between.target_of(0), Some(2));

        let exact = map_indices(&a, &Trajectory::from(vec![5.0])).expect("maps");
        assert_eq!(exact.target_of(0), Some(2));

        let above = map_indices(&a, &Trajectory::from(vec![8.0])).expect("maps");
        assert_eq!(above.target_of(0), Some(0));
        assert!(above.pairs()[0].is_self_mapping());
    }

    #[test]
    fn boundary_policy() {
        let a = Trajectory::from(vec![1.0, 3.0, 5.0, 7.0]);
        let b = Trajectory::from(vec![4.0, 5.0, 8.0, 6.0, 0.5, 1.0, 7.0]);
        let mapping = map_indices(&a, &b).expect("maps");
        // 6.0 only has the maximum above it, which is not eligible as a successor.
        // 0.5 is below everything, 1.0 and 7.0 hit the extremes exactly.
        assert_eq!(targets(&mapping), vec![2, 2, 2, 3, 0, 0, 3]);
    }

    #[test]
    fn unsorted_source_reports_temporal_indices() {
        let a = Trajectory::from(vec![7.0, 1.0, 5.0, 3.0, 9.0]);
        let b = Trajectory::from(vec![2.0, 4.0, 5.0]);
        let mapping = map_indices(&a, &b).expect("maps");
        assert_eq!(targets(&mapping), vec![3, 2, 2]);
    }

    #[test]
    fn ties_resolve_to_the_latest_equal_sample() {
        let a = Trajectory::from(vec![2.0, 1.0, 2.0, 4.0, 6.0]);
        let b = Trajectory::from(vec![2.0, 1.5]);
        let mapping = map_indices(&a, &b).expect("maps");
        // Exact match takes the last of the equal run; the successor search takes the first.
        assert_eq!(targets(&mapping), vec![2, 0]);
    }

    #[test]
    fn source_indices_run_in_order() {
        let a = Trajectory::from((0..50).map(|i| (i as f64 * 0.37).sin()).collect::<Vec<_>>());
        let b = Trajectory::from((0..9).map(|i| (i as f64 * 1.3).cos()).collect::<Vec<_>>());
        let mapping = map_indices(&a, &b).expect("unequal lengths are legal");
        assert_eq!(mapping.len(), 9);
        for (expected, pair) in mapping.iter().enumerate() {
            assert_eq!(pair.source_index, expected);
            assert!(pair.target_index < a.len());
        }
    }

    #[test]
    fn repeated_mapping_is_identical() {
        let a = Trajectory::from(vec![0.3, -1.2, 4.4, 4.4, 2.0, -0.1]);
        let b = Trajectory::from(vec![4.4, 0.0, -5.0, 1.9, 3.0]);
        let first = map_indices(&a, &b).expect("maps");
        let second = map_indices(&a, &b).expect("maps");
        assert_eq!(first, second);
    }

    #[test]
    fn identical_trajectories_map_to_identity() {
        let values: Vec<f64> = (0..200).map(|i| (i as f64 * 0.21).sin() * 17.0).collect();
        let a = Trajectory::from(values.clone());
        let b = Trajectory::from(values);
        let mapping = map_indices(&a, &b).expect("maps");
        assert_eq!(mapping.variation_count(), 0);
    }

    #[test]
    fn empty_trajectories_are_rejected() {
        let some = Trajectory::from(vec![1.0]);
        let none = Trajectory::from(Vec::new());
        assert!(matches!(map_indices(&none, &some), Err(ChaosError::InvalidInput(_))));
        assert!(matches!(map_indices(&some, &none), Err(ChaosError::InvalidInput(_))));
    }

    #[test]
    fn statistics_count_only_varied_entries() {
        let a = Trajectory::from(vec![1.0, 3.0, 5.0, 7.0]);
        let b = Trajectory::from(vec![4.0, 4.5, 1.0, 9.0]);
        let mapping = map_indices(&a, &b).expect("maps");
        assert_eq!(
            mapping.pairs(),
            &[
                IndexPair { source_index: 0, target_index: 2 },
                IndexPair { source_index: 1, target_index: 2 },
                IndexPair { source_index: 2, target_index: 0 },
                IndexPair { source_index: 3, target_index: 3 },
            ]
        );
        assert_eq!(mapping.variation_count(), 3);
        assert_eq!(mapping.distinct_targets(), 2);
        assert!((mapping.variation_ratio() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn mapping_serializes_as_pair_list() {
        let a = Trajectory::from(vec![1.0, 3.0, 5.0]);
        let b = Trajectory::from(vec![2.0]);
        let mapping = map_indices(&a, &b).expect("maps");
        let json = serde_json::to_string(&mapping).expect("serialize");
        assert_eq!(json, r#"[{"sourceIndex":0,"targetIndex":1}]"#);
    }
}
