use sparsecube_base::{err, Id, Result, Set};
use sparsecube_store::{Area, Storage};
use tracing::debug;

use crate::{map::AggregationMap, sweep::Aggregation};

/// Computes the consolidated cells over `targets` (one set of parents per
/// dimension) from the base cells of `storage`. Only cells some base value
/// reached are returned, in key order.
pub fn consolidate(storage: &Storage, maps: &[AggregationMap], targets: &[Set]) -> Result<Vec<(Vec<Id>, f64)>> {
    if maps.len() != storage.dims() || targets.len() != storage.dims() {
        return Err(err("consolidation needs one map and one target set per dimension"));
    }
    let bases: Vec<Set> = maps.iter().zip(targets).map(|(m, t)| m.base_set_for(t)).collect();
    let area = Area::new(bases)?;
    let mut agg = Aggregation::new(maps, targets)?;
    if area.is_empty() {
        debug!("no base cells under the requested targets");
        return Ok(Vec::new());
    }
    let mut cur = storage.cursor(Some(&area))?;
    agg.sweep(&mut cur)?;
    Ok(agg.results())
}
