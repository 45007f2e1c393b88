use sparsecube_base::{Id, Set, WeightedSet};
use sparsecube_store::{Storage, StorageConfig, ValueKind};
use test_log::test;

use super::{diamond, grouped};
use crate::{consolidate, Aggregation, AggregationMapBuilder, HashStorage};

fn storage<const N: usize>(cells: &[([Id; N], f64)]) -> Storage {
    let mut s = Storage::new(ValueKind::Numeric, N, StorageConfig::default()).unwrap();
    for (key, v) in cells {
        s.set_cell(key, *v).unwrap();
    }
    s.commit().unwrap();
    s
}

#[test]
fn test_diamond_weights() {
    let s = storage(&[([0], 1.0), ([1], 2.0), ([2], 10.0), ([3], 4.0)]);
    let maps = [diamond()];
    let targets = [Set::from_ranges([(10, 11)])];
    let got = consolidate(&s, &maps, &targets).unwrap();
    assert_eq!(got, vec![(vec![10], 1.0 + 2.0 + 0.3 * 10.0), (vec![11], 0.7 * 10.0 + 4.0)]);

    // a single base cell splits exactly by weight
    let s = storage(&[([2], 10.0)]);
    let got = consolidate(&s, &maps, &targets).unwrap();
    assert_eq!(got, vec![(vec![10], 0.3 * 10.0), (vec![11], 0.7 * 10.0)]);
}

#[test]
fn test_fan_out_products() {
    let mut a = AggregationMapBuilder::new();
    a.set_bases(10, Some(WeightedSet::unit(0, 0).unwrap())).unwrap();
    a.set_bases(11, Some(WeightedSet::unit(0, 0).unwrap())).unwrap();
    let mut b = AggregationMapBuilder::new();
    for (parent, w) in [(20, 1.0), (21, 2.0), (22, 3.0)] {
        let mut ws = WeightedSet::new();
        ws.push(0, w).unwrap();
        b.set_bases(parent, Some(ws)).unwrap();
    }
    let maps = [a.build().unwrap(), b.build().unwrap()];
    let targets = [Set::from_ranges([(10, 11)]), Set::from_ranges([(20, 22)])];
    let s = storage(&[([0, 0], 5.0)]);
    let got = consolidate(&s, &maps, &targets).unwrap();
    assert_eq!(
        got,
        vec![
            (vec![10, 20], 5.0),
            (vec![10, 21], 10.0),
            (vec![10, 22], 15.0),
            (vec![11, 20], 5.0),
            (vec![11, 21], 10.0),
            (vec![11, 22], 15.0),
        ]
    );

    // asking for a subset of parents only fills those
    let targets = [Set::from_ranges([(11, 11)]), Set::from_ranges([(22, 22)])];
    assert_eq!(consolidate(&s, &maps, &targets).unwrap(), vec![(vec![11, 22], 15.0)]);
}

#[test]
fn test_fast_path_matches_general_path() {
    let maps = [grouped(0, 49, 10, 100), grouped(0, 29, 7, 200)];
    assert!(maps.iter().all(|m| m.base_params().is_some()));
    let mut s = Storage::new(ValueKind::Numeric, 2, StorageConfig::default()).unwrap();
    for a in 0..50 {
        for b in 0..30 {
            if (a * 7 + b * 3) % 4 != 0 {
                s.set_cell(&[a, b], (a as f64 + 0.1) / (b as f64 + 3.0)).unwrap();
            }
        }
    }
    s.commit().unwrap();
    let targets = [maps[0].parents().collect::<Set>(), maps[1].parents().collect::<Set>()];

    let mut fast = Aggregation::new(&maps, &targets).unwrap();
    fast.sweep(&mut s.cursor(None).unwrap()).unwrap();
    let mut general = Aggregation::new(&maps, &targets).unwrap();
    general.set_fast_path(false);
    general.sweep(&mut s.cursor(None).unwrap()).unwrap();

    let a = fast.results();
    let b = general.results();
    assert_eq!(a.len(), 5 * 5);
    assert_eq!(a.len(), b.len());
    for ((ka, va), (kb, vb)) in a.iter().zip(&b) {
        assert_eq!(ka, kb);
        assert_eq!(va.to_bits(), vb.to_bits());
    }
    assert_eq!(consolidate(&s, &maps, &targets).unwrap(), a);
}

#[test]
fn test_unmapped_cells_are_skipped() {
    let maps = [grouped(0, 9, 5, 100)];
    let targets = [Set::from_ranges([(100, 101)])];
    let s = storage(&[([1], 1.0), ([7], 2.0), ([12], 40.0), ([50], 8.0)]);
    for fast in [true, false] {
        let mut agg = Aggregation::new(&maps, &targets).unwrap();
        agg.set_fast_path(fast);
        agg.sweep(&mut s.cursor(None).unwrap()).unwrap();
        assert_eq!(agg.skipped(), 2);
        assert_eq!(agg.results(), vec![(vec![100], 1.0), (vec![101], 2.0)]);
    }
    // consolidate only reads the bases the maps know about
    assert_eq!(
        consolidate(&s, &maps, &targets).unwrap(),
        vec![(vec![100], 1.0), (vec![101], 2.0)]
    );
}

#[test]
fn test_untouched_and_zero_sums_differ() {
    let maps = [grouped(0, 9, 5, 100)];
    let targets = [Set::from_ranges([(100, 101)])];
    let s = storage(&[([0], 5.0), ([1], -5.0)]);
    let mut agg = Aggregation::new(&maps, &targets).unwrap();
    agg.sweep(&mut s.cursor(None).unwrap()).unwrap();
    assert_eq!(agg.value_at(&[100]), Some(0.0));
    assert_eq!(agg.value_at(&[101]), None);
    assert_eq!(agg.value_at(&[102]), None);
    assert_eq!(agg.storage().touched(), 1);
}

#[test]
fn test_hash_storage_layout() {
    let targets = [Set::from_ranges([(3, 4)]), Set::from_ranges([(10, 12)])];
    let mut hs = HashStorage::new(&targets).unwrap();
    assert_eq!(hs.offset(0, 4), Some(3));
    assert_eq!(hs.offset(1, 12), Some(2));
    assert_eq!(hs.offset(1, 13), None);
    hs.add(3 + 1, 2.0);
    hs.add(0, 1.0);
    hs.add(3 + 1, 0.5);
    assert_eq!(hs.results(), vec![(vec![3, 10], 1.0), (vec![4, 11], 2.5)]);

    let huge = [Set::full(), Set::full()];
    assert!(HashStorage::new(&huge).unwrap_err().is_capacity());
}

#[test]
fn test_dimension_mismatch() {
    let maps = [diamond()];
    let targets = [Set::from_ranges([(10, 11)]), Set::from_ranges([(10, 11)])];
    assert!(Aggregation::new(&maps, &targets).is_err());
    let s = storage(&[([0, 0], 1.0)]);
    assert!(consolidate(&s, &maps, &targets[..1]).is_err());
    let mut agg = Aggregation::new(&maps, &targets[..1]).unwrap();
    assert!(agg.add_cell(&[0, 0], 1.0).is_err());
}
