use sparsecube_base::{Id, Set, WeightedSet, NO_ID};
use test_log::test;

use super::{diamond, grouped};
use crate::{AggregationMap, AggregationMapBuilder, TargetReader};

fn collect(r: TargetReader) -> Vec<(Id, f64)> {
    r.collect()
}

#[test]
fn test_diamond_targets() {
    let m = diamond();
    assert!(m.has_multi_map());
    assert!(m.has_weights());
    assert_eq!(m.single_target(), None);
    assert!(m.base_params().is_none());
    assert_eq!((m.min_base(), m.max_base()), (Some(0), Some(3)));
    assert_eq!(collect(m.get_targets(0).unwrap()), vec![(10, 1.0)]);
    assert_eq!(collect(m.get_targets(1).unwrap()), vec![(10, 1.0)]);
    assert_eq!(collect(m.get_targets(2).unwrap()), vec![(10, 0.3), (11, 0.7)]);
    assert_eq!(collect(m.get_targets(3).unwrap()), vec![(11, 1.0)]);
    assert!(m.get_targets(4).is_err());
    assert!(m.targets(NO_ID).is_none());
    // 0..=1, 2, 3
    assert_eq!(m.sequence_count(), 3);

    let mut r = m.get_targets(2).unwrap();
    assert_eq!(r.len(), 2);
    assert_eq!(r.next(), Some((10, 0.3)));
    r.reset();
    assert_eq!(r.count(), 2);
}

#[test]
fn test_self_parents() {
    let mut b = AggregationMapBuilder::new();
    b.set_bases(5, None).unwrap();
    b.set_bases(6, None).unwrap();
    b.set_bases(9, None).unwrap();
    b.set_bases(20, Some(WeightedSet::unit(5, 6).unwrap())).unwrap();
    assert!(b.set_bases(NO_ID, None).is_err());
    let m = b.build().unwrap();
    assert_eq!(collect(m.get_targets(5).unwrap()), vec![(20, 1.0), (5, 1.0)]);
    assert_eq!(collect(m.get_targets(6).unwrap()), vec![(20, 1.0), (6, 1.0)]);
    assert_eq!(collect(m.get_targets(9).unwrap()), vec![(9, 1.0)]);
    assert!(m.get_targets(7).unwrap().is_empty());
    // 5..=6, the 7..=8 gap, 9
    assert_eq!(m.sequence_count(), 3);
    assert_eq!(m.base_set(), Set::from_ranges([(5, 6), (9, 9)]));
    assert_eq!(m.base_set_for(&Set::from_ranges([(9, 9)])), Set::from_ranges([(9, 9)]));
    assert_eq!(m.base_set_for(&Set::from_ranges([(20, 20)])), Set::from_ranges([(5, 6)]));
    let sources: Vec<Id> = m.sources().map(|(id, _)| id).collect();
    assert_eq!(sources, vec![5, 6, 9]);
}

#[test]
fn test_single_target() {
    let m = grouped(100, 199, 1000, 7);
    assert_eq!(m.single_target(), Some(7));
    assert!(!m.has_multi_map());
    let params = m.base_params().unwrap();
    assert_eq!((params.min_base, params.max_base), (100, 199));
    assert_eq!(params.parents.len(), 100);
    assert!(params.parents.iter().all(|&p| p == 7));
    assert!(!m.is_dense());

    let mut b = AggregationMapBuilder::new();
    b.set_bases(4, None).unwrap();
    let m = b.build().unwrap();
    assert_eq!(m.single_target(), Some(4));
    assert_eq!(collect(m.get_targets(4).unwrap()), vec![(4, 1.0)]);
    assert_eq!(m.base_params().unwrap().parents, &[4]);
}

#[test]
fn test_dense_and_sparse_agree() {
    // alternating parents: one run per base id, cheaper as a dense array
    let mut b = AggregationMapBuilder::new();
    let mut odd = WeightedSet::new();
    let mut even = WeightedSet::new();
    for id in 0..40 {
        if id % 2 == 0 {
            even.push(id, 1.0).unwrap();
        } else {
            odd.push(id, 1.0).unwrap();
        }
    }
    b.set_bases(1, Some(odd)).unwrap();
    b.set_bases(2, Some(even)).unwrap();
    let dense = b.clone().build().unwrap();
    assert!(dense.is_dense());
    assert_eq!(dense.sequence_count(), 40);
    let params = dense.base_params().unwrap();
    for id in 0..40 {
        let expected = if id % 2 == 0 { 2 } else { 1 };
        assert_eq!(collect(dense.get_targets(id).unwrap()), vec![(expected, 1.0)]);
        assert_eq!(params.parents[id as usize], expected);
    }

    let deduped = b.with_dedup(true).build().unwrap();
    assert_eq!(deduped.sequence_count(), 2);
    for id in 0..40 {
        assert_eq!(
            collect(deduped.get_targets(id).unwrap()),
            collect(dense.get_targets(id).unwrap())
        );
    }
}

#[test]
fn test_overlapping_weighted_ranges() {
    let mut b = AggregationMapBuilder::new();
    let mut a = WeightedSet::new();
    a.push_range(0, 9, 1.0).unwrap();
    a.push_range(10, 19, 0.5).unwrap();
    let mut c = WeightedSet::new();
    c.push_range(5, 14, 2.0).unwrap();
    b.set_bases(100, Some(a)).unwrap();
    b.set_bases(200, Some(c)).unwrap();
    let m = b.build().unwrap();
    // 0..=4, 5..=9, 10..=14, 15..=19
    assert_eq!(m.sequence_count(), 4);
    assert_eq!(collect(m.get_targets(3).unwrap()), vec![(100, 1.0)]);
    assert_eq!(collect(m.get_targets(7).unwrap()), vec![(100, 1.0), (200, 2.0)]);
    assert_eq!(collect(m.get_targets(12).unwrap()), vec![(100, 0.5), (200, 2.0)]);
    assert_eq!(collect(m.get_targets(19).unwrap()), vec![(100, 0.5)]);
    assert!(!m.is_dense());
}

#[test]
fn test_weights_sum() {
    let m = diamond();
    assert!((m.weights_sum(None) - 4.0).abs() < 1e-12);
    let restricted = Set::from_ranges([(2, 3)]);
    assert!((m.weights_sum(Some(&restricted)) - 2.0).abs() < 1e-12);

    let mut b = AggregationMapBuilder::new();
    b.set_bases(3, None).unwrap();
    assert_eq!(b.build().unwrap().weights_sum(None), 1.0);
    assert_eq!(AggregationMapBuilder::new().build().unwrap().weights_sum(None), 1.0);
}

#[test]
fn test_empty_map() {
    let m: AggregationMap = AggregationMapBuilder::new().build().unwrap();
    assert!(m.is_empty());
    assert_eq!(m.min_base(), None);
    assert!(m.get_targets(0).is_err());
    assert_eq!(m.sources().count(), 0);
    assert!(m.base_params().is_none());
}
