use std::collections::BTreeMap;

use test_log::test;

use crate::{
    consolidate, Aggregation, AggregationMap, AggregationMapBuilder, Area, CellSource, Id, Set,
    Storage, StorageConfig, ValueKind, WeightedSet, FILE_VERSION,
};

fn drain(src: &mut impl CellSource) -> Vec<(Vec<Id>, f64)> {
    let mut out = Vec::new();
    while src.next().unwrap() {
        out.push((src.key().to_vec(), src.value()));
    }
    out
}

/// Bases `0..n` rolled up in groups of `group` under parents from `offset`.
fn groups(n: Id, group: Id, offset: Id) -> AggregationMap {
    let mut b = AggregationMapBuilder::new();
    for lo in (0..n).step_by(group as usize) {
        let hi = (lo + group - 1).min(n - 1);
        b.set_bases(lo / group + offset, Some(WeightedSet::unit(lo, hi).unwrap()))
            .unwrap();
    }
    b.build().unwrap()
}

fn rollup(model: &BTreeMap<Vec<Id>, f64>, group: [Id; 2], offset: [Id; 2]) -> Vec<(Vec<Id>, f64)> {
    let mut sums = BTreeMap::new();
    for (key, v) in model {
        let parent = vec![key[0] / group[0] + offset[0], key[1] / group[1] + offset[1]];
        *sums.entry(parent).or_insert(0.0) += *v;
    }
    sums.into_iter().collect()
}

fn small_pages() -> StorageConfig {
    StorageConfig {
        page_size: 256,
        min_values_for_incremental: 0,
        min_copy_pages: 1,
        ..StorageConfig::default()
    }
}

#[test]
fn test_cube_2x2x2() {
    let mut s = Storage::new(ValueKind::Numeric, 3, StorageConfig::default()).unwrap();
    s.set_cell(&[1, 0, 0], 4.0).unwrap();
    s.set_cell(&[0, 1, 0], 3.0).unwrap();
    s.set_cell(&[0, 0, 1], 2.0).unwrap();
    s.set_cell(&[0, 0, 0], 1.0).unwrap();
    assert!(s.commit().unwrap());

    let stored = vec![
        (vec![0, 0, 0], 1.0),
        (vec![0, 0, 1], 2.0),
        (vec![0, 1, 0], 3.0),
        (vec![1, 0, 0], 4.0),
    ];
    let area = Area::new(vec![Set::from_ranges([(0, 1)]); 3]).unwrap();
    assert_eq!(drain(&mut s.cursor(Some(&area)).unwrap()), stored);

    let filled = drain(&mut s.fill_cursor(&area, 0.0).unwrap());
    assert_eq!(
        filled,
        vec![
            (vec![0, 0, 0], 1.0),
            (vec![0, 0, 1], 2.0),
            (vec![0, 1, 0], 3.0),
            (vec![0, 1, 1], 0.0),
            (vec![1, 0, 0], 4.0),
            (vec![1, 0, 1], 0.0),
            (vec![1, 1, 0], 0.0),
            (vec![1, 1, 1], 0.0),
        ]
    );
}

#[test]
fn test_commit_rounds_then_consolidate() {
    let mut s = Storage::new(ValueKind::Numeric, 2, small_pages()).unwrap();
    let mut model = BTreeMap::new();
    let maps = [groups(60, 8, 100), groups(30, 5, 200)];
    let targets = [maps[0].parents().collect::<Set>(), maps[1].parents().collect::<Set>()];

    for round in 0..6u32 {
        for a in 0..60 {
            for b in 0..30 {
                let key = vec![a, b];
                match (a * 31 + b * 17 + round * 7) % 11 {
                    0 => {
                        s.set_cell(&key, 0.0).unwrap();
                        model.remove(&key);
                    }
                    1 | 2 => {
                        let v = (a + b + round) as f64;
                        s.set_cell(&key, v).unwrap();
                        model.insert(key, v);
                    }
                    3 => {
                        s.add_cell(&key, 2.0).unwrap();
                        let v = model.get(&key).copied().unwrap_or(0.0) + 2.0;
                        model.insert(key, v);
                    }
                    _ => {}
                }
            }
        }
        s.commit().unwrap();
        assert!(s.validate().unwrap());
        assert_eq!(s.value_count(), model.len() as u64);

        let got = consolidate(&s, &maps, &targets).unwrap();
        assert_eq!(got, rollup(&model, [8, 5], [100, 200]));
    }
}

#[test]
fn test_saved_cube_consolidates_the_same() {
    let mut s = Storage::new(ValueKind::Numeric, 2, small_pages()).unwrap();
    for a in 0..40 {
        for b in (a % 3..25).step_by(3) {
            s.set_cell(&[a, b], (a * b + 1) as f64).unwrap();
        }
    }
    s.commit().unwrap();
    let maps = [groups(40, 10, 0), groups(25, 25, 50)];
    let targets = [Set::from_ranges([(0, 3)]), Set::from_ranges([(50, 50)])];
    let before = consolidate(&s, &maps, &targets).unwrap();
    assert_eq!(before.len(), 4);

    let mut buf = Vec::new();
    s.save(&mut buf, FILE_VERSION).unwrap();
    let t = Storage::load(&mut buf.as_slice(), ValueKind::Numeric, 2, small_pages(), FILE_VERSION)
        .unwrap();
    assert!(t.validate().unwrap());
    assert_eq!(consolidate(&t, &maps, &targets).unwrap(), before);
}

#[test]
fn test_sweep_over_defaults_counts_cells() {
    let mut s = Storage::new(ValueKind::Numeric, 1, StorageConfig::default()).unwrap();
    s.set_cell(&[0], 5.0).unwrap();
    s.commit().unwrap();
    let maps = [groups(4, 2, 100)];
    let targets = [Set::from_ranges([(100, 101)])];
    let area = Area::new(vec![maps[0].base_set()]).unwrap();

    let mut agg = Aggregation::new(&maps, &targets).unwrap();
    agg.sweep(&mut s.fill_cursor(&area, 1.0).unwrap()).unwrap();
    assert_eq!(agg.results(), vec![(vec![100], 6.0), (vec![101], 2.0)]);
}
