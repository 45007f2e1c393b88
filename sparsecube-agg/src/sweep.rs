use std::{collections::HashMap, hash::BuildHasherDefault};

use rapidhash::RapidHasher;
use sparsecube_base::{capacity_err, err, Id, Result, Set, NO_ID};
use sparsecube_store::CellSource;
use tracing::{debug, error};

use crate::map::AggregationMap;

type RapidMap<K, V> = HashMap<K, V, BuildHasherDefault<RapidHasher>>;

const MAX_CELLS: u64 = 1 << 30;

/// Dense accumulator for the consolidated cells of a target area.
///
/// Each requested parent has a precomputed offset (its rank in the
/// dimension's target set times the dimension's stride), so a cell's slot
/// is the sum of one offset per dimension. Slots start out untouched, which
/// keeps them apart from slots that summed to zero.
#[derive(Clone, Debug)]
pub struct HashStorage {
    parents: Vec<Vec<Id>>,
    strides: Vec<usize>,
    offsets: Vec<RapidMap<Id, usize>>,
    values: Vec<f64>,
    set: Vec<bool>,
    touched: usize,
}

impl HashStorage {
    pub fn new(targets: &[Set]) -> Result<Self> {
        if targets.is_empty() {
            return Err(err("hash storage needs at least one dimension"));
        }
        let mut size: u64 = 1;
        for t in targets {
            size = size
                .checked_mul(t.len())
                .filter(|n| *n <= MAX_CELLS)
                .ok_or_else(|| capacity_err("too many consolidated cells"))?;
        }
        let parents: Vec<Vec<Id>> = targets.iter().map(|t| t.iter().collect()).collect();
        let mut strides = vec![1_usize; targets.len()];
        for d in (0..targets.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * parents[d + 1].len();
        }
        let offsets = parents
            .iter()
            .zip(&strides)
            .map(|(ps, &stride)| ps.iter().enumerate().map(|(i, p)| (*p, i * stride)).collect())
            .collect();
        Ok(HashStorage {
            parents,
            strides,
            offsets,
            values: vec![0.0; size as usize],
            set: vec![false; size as usize],
            touched: 0,
        })
    }

    pub fn dims(&self) -> usize {
        self.parents.len()
    }

    /// Offset contribution of `parent` in dimension `dim`, if requested.
    pub fn offset(&self, dim: usize, parent: Id) -> Option<usize> {
        self.offsets.get(dim)?.get(&parent).copied()
    }

    pub fn add(&mut self, slot: usize, value: f64) {
        if self.set[slot] {
            self.values[slot] += value;
        } else {
            self.set[slot] = true;
            self.values[slot] = value;
            self.touched += 1;
        }
    }

    pub fn touched(&self) -> usize {
        self.touched
    }

    fn slot_of(&self, key: &[Id]) -> Option<usize> {
        if key.len() != self.dims() {
            return None;
        }
        key.iter()
            .enumerate()
            .try_fold(0, |acc, (d, id)| Some(acc + self.offset(d, *id)?))
    }

    /// The sum at `key`; `None` if nothing contributed to it.
    pub fn value_at(&self, key: &[Id]) -> Option<f64> {
        let slot = self.slot_of(key)?;
        self.set[slot].then(|| self.values[slot])
    }

    /// Every touched cell, in key order.
    pub fn results(&self) -> Vec<(Vec<Id>, f64)> {
        let mut out = Vec::with_capacity(self.touched);
        for (slot, _) in self.set.iter().enumerate().filter(|(_, s)| **s) {
            let key = self
                .parents
                .iter()
                .zip(&self.strides)
                .map(|(ps, stride)| ps[(slot / stride) % ps.len()])
                .collect();
            out.push((key, self.values[slot]));
        }
        out
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Slot {
    /// The base has no parent in the map.
    Unmapped,
    /// The parent is not among the requested targets.
    Outside,
    At(usize),
}

/// Per-base slot contributions of a dimension on the single-parent path.
struct FastDim {
    min_base: Id,
    slots: Vec<Slot>,
}

/// Sums base cells into their consolidated parents.
///
/// Dimensions whose map gives every base at most one parent at weight 1.0
/// resolve a base to its slot offset with one array lookup. The others go
/// through the map's target lists, and a base cell contributes to every
/// combination of one parent per dimension, weighted by the product of the
/// parents' weights.
pub struct Aggregation<'m> {
    maps: &'m [AggregationMap],
    storage: HashStorage,
    fast: Vec<Option<FastDim>>,
    use_fast: bool,
    lists: Vec<Vec<(usize, f64)>>,
    cells: u64,
    skipped: u64,
}

impl<'m> Aggregation<'m> {
    pub fn new(maps: &'m [AggregationMap], targets: &[Set]) -> Result<Self> {
        if maps.len() != targets.len() {
            return Err(err("one aggregation map per target dimension needed"));
        }
        let storage = HashStorage::new(targets)?;
        let fast = maps
            .iter()
            .enumerate()
            .map(|(d, map)| {
                map.base_params().map(|params| FastDim {
                    min_base: params.min_base,
                    slots: params
                        .parents
                        .iter()
                        .map(|&p| match p {
                            NO_ID => Slot::Unmapped,
                            p => storage.offset(d, p).map_or(Slot::Outside, Slot::At),
                        })
                        .collect(),
                })
            })
            .collect();
        Ok(Aggregation {
            maps,
            storage,
            fast,
            use_fast: true,
            lists: vec![Vec::new(); maps.len()],
            cells: 0,
            skipped: 0,
        })
    }

    /// Turns the single-parent path off, so that every dimension goes
    /// through the general path.
    pub fn set_fast_path(&mut self, on: bool) {
        self.use_fast = on;
    }

    /// Base cells dropped because some element had no parent.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn storage(&self) -> &HashStorage {
        &self.storage
    }

    pub fn value_at(&self, key: &[Id]) -> Option<f64> {
        self.storage.value_at(key)
    }

    pub fn results(&self) -> Vec<(Vec<Id>, f64)> {
        self.storage.results()
    }

    fn unmapped(&mut self, key: &[Id], dim: usize) {
        error!(?key, dim, "base element has no parent in aggregation map, skipping cell");
        self.skipped += 1;
    }

    /// Adds one base cell.
    pub fn add_cell(&mut self, key: &[Id], value: f64) -> Result<()> {
        if key.len() != self.maps.len() {
            return Err(err("base key has wrong dimension count"));
        }
        self.cells += 1;
        let mut lists = std::mem::take(&mut self.lists);
        if self.fill_lists(key, &mut lists) {
            self.accumulate(&lists, value);
        }
        self.lists = lists;
        Ok(())
    }

    // False if the cell contributes nothing.
    fn fill_lists(&mut self, key: &[Id], lists: &mut [Vec<(usize, f64)>]) -> bool {
        let maps = self.maps;
        for (d, &base) in key.iter().enumerate() {
            let list = &mut lists[d];
            list.clear();
            if let (true, Some(fast)) = (self.use_fast, &self.fast[d]) {
                let slot = base
                    .checked_sub(fast.min_base)
                    .and_then(|i| fast.slots.get(i as usize))
                    .copied()
                    .unwrap_or(Slot::Unmapped);
                match slot {
                    Slot::At(off) => list.push((off, 1.0)),
                    Slot::Outside => return false,
                    Slot::Unmapped => {
                        self.unmapped(key, d);
                        return false;
                    }
                }
                continue;
            }
            let reader = match maps[d].targets(base) {
                Some(reader) if !reader.is_empty() => reader,
                _ => {
                    self.unmapped(key, d);
                    return false;
                }
            };
            for (parent, weight) in reader {
                if let Some(off) = self.storage.offset(d, parent) {
                    list.push((off, weight));
                }
            }
            if list.is_empty() {
                return false;
            }
        }
        true
    }

    // Walks every combination of one entry per list.
    fn accumulate(&mut self, lists: &[Vec<(usize, f64)>], value: f64) {
        let dims = lists.len();
        let mut idx = vec![0_usize; dims];
        loop {
            let mut slot = 0;
            let mut weight = 1.0;
            for (list, &i) in lists.iter().zip(&idx) {
                let (off, w) = list[i];
                slot += off;
                weight *= w;
            }
            self.storage.add(slot, value * weight);
            let mut d = dims;
            loop {
                if d == 0 {
                    return;
                }
                d -= 1;
                idx[d] += 1;
                if idx[d] < lists[d].len() {
                    break;
                }
                idx[d] = 0;
            }
        }
    }

    /// Adds every cell `src` yields.
    pub fn sweep(&mut self, src: &mut impl CellSource) -> Result<()> {
        while src.next()? {
            self.add_cell(src.key(), src.value())?;
        }
        debug!(
            cells = self.cells,
            skipped = self.skipped,
            touched = self.storage.touched(),
            "aggregation sweep finished"
        );
        Ok(())
    }
}
