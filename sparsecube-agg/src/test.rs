use sparsecube_base::{Id, WeightedSet};

use crate::{AggregationMap, AggregationMapBuilder};

mod map;
mod sweep;

/// Parent 10 holds bases 0, 1 and 30% of 2; parent 11 holds the other 70%
/// of 2 and base 3.
pub(crate) fn diamond() -> AggregationMap {
    let mut b = AggregationMapBuilder::new();
    let mut p10 = WeightedSet::unit(0, 1).unwrap();
    p10.push(2, 0.3).unwrap();
    let mut p11 = WeightedSet::new();
    p11.push(2, 0.7).unwrap();
    p11.push(3, 1.0).unwrap();
    b.set_bases(10, Some(p10)).unwrap();
    b.set_bases(11, Some(p11)).unwrap();
    b.build().unwrap()
}

/// Every base in `lo..=hi` under parent `base / group + offset`.
pub(crate) fn grouped(lo: Id, hi: Id, group: Id, offset: Id) -> AggregationMap {
    let mut b = AggregationMapBuilder::new();
    let mut id = lo;
    while id <= hi {
        let end = (id / group * group + group - 1).min(hi);
        b.set_bases(id / group + offset, Some(WeightedSet::unit(id, end).unwrap())).unwrap();
        id = end + 1;
    }
    b.build().unwrap()
}
