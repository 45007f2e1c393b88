// A sparse multidimensional cube: cells addressed by one element id per
// dimension, held in a paged byte stream that commits incrementally, and
// consolidated along per-dimension hierarchies on the fly.
//
// The pieces live in their own crates; this one gathers them so a client
// needs a single dependency.
//
//  - sparsecube-base: ids, element sets, errors.
//  - sparsecube-store: the cell stream, cursors, commits, persistence.
//  - sparsecube-agg: aggregation maps and the consolidation sweep.

pub use sparsecube_agg::{
    consolidate, Aggregation, AggregationMap, AggregationMapBuilder, BaseParams, HashStorage,
    TargetReader,
};
pub use sparsecube_base::{
    capacity_err, err, DimMask, Error, ErrorKind, Id, Result, Set, WeightedRange, WeightedSet,
    DIM_MAX, NO_ID,
};
pub use sparsecube_store::{
    compare_double, Area, Bookmark, CellSource, CellStream, Cursor, FillCursor, Storage,
    StorageConfig, ValueKind, FILE_VERSION,
};

#[cfg(test)]
mod test;
