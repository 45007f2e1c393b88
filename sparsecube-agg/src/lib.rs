// Consolidation of base cells along per-dimension hierarchies.
//
// Each dimension has an AggregationMap taking a base element to the
// parents it rolls up into, each with a weight. A base element may have
// several parents (and then contributes to all of them), and a parent may
// stand for itself as a base element.
//
// The sweep reads base cells in key order and adds each one, times the
// product of its weights, to every combination of parents it reaches.
// The consolidated cells are accumulated in a dense array with one slot
// per combination of requested parents.

mod consolidate;
mod map;
mod sweep;

#[cfg(test)]
mod test;

pub use consolidate::consolidate;
pub use map::{AggregationMap, AggregationMapBuilder, BaseParams, TargetReader};
pub use sweep::{Aggregation, HashStorage};
