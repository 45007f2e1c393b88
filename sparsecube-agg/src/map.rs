use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasherDefault,
};

use ordered_float::OrderedFloat;
use rapidhash::RapidHasher;
use sparsecube_base::{capacity_err, err, Id, Result, Set, WeightedRange, WeightedSet, NO_ID};
use tracing::debug;

type RapidMap<K, V> = HashMap<K, V, BuildHasherDefault<RapidHasher>>;

/// A run of `target_ids` (and, if present, `weights`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct TargetSequence {
    start: u32,
    len: u32,
}

/// Which sequence each source id uses.
#[derive(Clone, PartialEq, Eq, Debug)]
enum SourceMap {
    /// First source id of each run and its sequence, sorted by id.
    Sparse(Vec<(Id, u32)>),
    /// Sequence of every id from `min_base` on.
    Dense(Vec<u32>),
}

/// Collects parent definitions for one dimension.
///
/// A parent maps to the weighted base ranges it consolidates, or to `None`
/// when the parent is a base element standing for itself.
#[derive(Clone, Default, Debug)]
pub struct AggregationMapBuilder {
    parents: BTreeMap<Id, Option<WeightedSet>>,
    dedup: bool,
}

impl AggregationMapBuilder {
    pub fn new() -> Self {
        AggregationMapBuilder::default()
    }

    /// Share identical target sequences instead of appending each one.
    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn set_bases(&mut self, parent: Id, bases: Option<WeightedSet>) -> Result<()> {
        if parent == NO_ID {
            return Err(err("NO_ID cannot be a parent"));
        }
        self.parents.insert(parent, bases);
        Ok(())
    }

    pub fn build(self) -> Result<AggregationMap> {
        let AggregationMapBuilder { parents, dedup } = self;

        // Self-standing parents share one pseudo-target that the reader
        // replaces with the source id; NO_ID sorts it after every parent.
        let mut selves = WeightedSet::new();
        for (&parent, bases) in &parents {
            if bases.is_none() {
                selves.push(parent, 1.0)?;
            }
        }
        let mut entries: Vec<(Id, &[WeightedRange])> = parents
            .iter()
            .filter_map(|(&parent, bases)| bases.as_ref().map(|b| (parent, b.ranges())))
            .filter(|(_, ranges)| !ranges.is_empty())
            .collect();
        if !selves.is_empty() {
            entries.push((NO_ID, selves.ranges()));
        }

        let mut map = AggregationMap {
            min_base: NO_ID,
            max_base: 0,
            target_ids: Vec::new(),
            weights: Vec::new(),
            sequences: Vec::new(),
            source_map: SourceMap::Sparse(Vec::new()),
            multi_map: false,
            any_weights: false,
            single_target: None,
            single_parents: Vec::new(),
            parents: BTreeMap::new(),
        };
        if parents.len() == 1 {
            map.single_target = parents.keys().next().copied();
        }

        let mut breaks: Vec<u64> = Vec::new();
        for (_, ranges) in &entries {
            for r in *ranges {
                breaks.push(r.low as u64);
                breaks.push(r.high as u64 + 1);
            }
        }
        breaks.sort_unstable();
        breaks.dedup();

        let mut store = SequenceStore::new(dedup);
        let mut sparse: Vec<(Id, u32)> = Vec::new();
        if let (Some(&first), Some(&last)) = (breaks.first(), breaks.last()) {
            map.min_base = first as Id;
            map.max_base = (last - 1) as Id;
            let mut cursors = vec![0_usize; entries.len()];
            let mut targets: Vec<Id> = Vec::new();
            let mut weights: Vec<f64> = Vec::new();
            let mut prev: Option<(Vec<Id>, Vec<f64>)> = None;
            for pair in breaks.windows(2) {
                let start = pair[0];
                targets.clear();
                weights.clear();
                for (e, (target, ranges)) in entries.iter().enumerate() {
                    let i = &mut cursors[e];
                    while *i < ranges.len() && (ranges[*i].high as u64) < start {
                        *i += 1;
                    }
                    if let Some(r) = ranges.get(*i) {
                        if r.low as u64 <= start {
                            targets.push(*target);
                            weights.push(r.weight);
                        }
                    }
                }
                if let Some((t, w)) = &prev {
                    if *t == targets && *w == weights {
                        continue;
                    }
                }
                let seq = store.store(&mut map, &targets, &weights)?;
                sparse.push((start as Id, seq));
                prev = Some((targets.clone(), weights.clone()));
            }
        }

        let span = if sparse.is_empty() {
            0
        } else {
            map.max_base as u64 - map.min_base as u64 + 1
        };
        map.source_map = if sparse.len() as u64 * 8 > span * 4 {
            let mut dense = Vec::with_capacity(span as usize);
            for (i, &(start, seq)) in sparse.iter().enumerate() {
                let end = match sparse.get(i + 1) {
                    Some(&(next, _)) => next as u64,
                    None => map.max_base as u64 + 1,
                };
                dense.extend(std::iter::repeat(seq).take((end - start as u64) as usize));
            }
            SourceMap::Dense(dense)
        } else {
            SourceMap::Sparse(sparse)
        };

        if !map.multi_map && !map.any_weights && !map.sequences.is_empty() {
            let mut single = Vec::with_capacity(span as usize);
            for id in map.min_base..=map.max_base {
                let parent = match map.targets(id) {
                    Some(mut reader) => reader.next().map_or(NO_ID, |(p, _)| p),
                    None => NO_ID,
                };
                single.push(parent);
            }
            map.single_parents = single;
        }
        map.parents = parents;
        debug!(
            parents = map.parents.len(),
            sequences = map.sequences.len(),
            targets = map.target_ids.len(),
            dense = matches!(map.source_map, SourceMap::Dense(_)),
            multi = map.multi_map,
            weights = map.any_weights,
            "built aggregation map"
        );
        Ok(map)
    }
}

type SequenceKey = (Vec<Id>, Vec<OrderedFloat<f64>>);

struct SequenceStore {
    seen: Option<RapidMap<SequenceKey, u32>>,
}

impl SequenceStore {
    fn new(dedup: bool) -> Self {
        SequenceStore {
            seen: dedup.then(RapidMap::default),
        }
    }

    /// Appends one target sequence to the map's buffers and returns its
    /// index, or the index of an equal sequence when deduplicating.
    fn store(&mut self, map: &mut AggregationMap, targets: &[Id], weights: &[f64]) -> Result<u32> {
        let key = self
            .seen
            .as_ref()
            .map(|_| (targets.to_vec(), weights.iter().map(|w| OrderedFloat(*w)).collect::<Vec<_>>()));
        if let (Some(seen), Some(key)) = (&self.seen, &key) {
            if let Some(&idx) = seen.get(key) {
                return Ok(idx);
            }
        }
        let start = u32::try_from(map.target_ids.len()).map_err(|_| capacity_err("target buffer full"))?;
        let len = targets.len() as u32;
        let idx = u32::try_from(map.sequences.len()).map_err(|_| capacity_err("too many target sequences"))?;
        map.target_ids.extend_from_slice(targets);
        if weights.iter().any(|w| *w != 1.0) {
            map.weights.resize(start as usize, 1.0);
            map.weights.extend_from_slice(weights);
            map.any_weights = true;
        }
        if targets.len() > 1 {
            map.multi_map = true;
        }
        map.sequences.push(TargetSequence { start, len });
        if let (Some(seen), Some(key)) = (&mut self.seen, key) {
            seen.insert(key, idx);
        }
        Ok(idx)
    }
}

/// For one dimension, the consolidation parents each base element
/// contributes to, with weights.
///
/// Base ids in `[min_base, max_base]` are split into runs that share the
/// same target list; the lists live in one flat buffer. Weights are only
/// stored for lists that have a weight other than 1.0.
#[derive(Clone, PartialEq, Debug)]
pub struct AggregationMap {
    min_base: Id,
    max_base: Id,
    target_ids: Vec<Id>,
    weights: Vec<f64>,
    sequences: Vec<TargetSequence>,
    source_map: SourceMap,
    multi_map: bool,
    any_weights: bool,
    single_target: Option<Id>,
    single_parents: Vec<Id>,
    parents: BTreeMap<Id, Option<WeightedSet>>,
}

/// The raw base-to-parent array of a map where every base has at most one
/// parent, all with weight 1.0. `parents[id - min_base]` is the parent of
/// `id`, or `NO_ID`.
#[derive(Clone, Copy, Debug)]
pub struct BaseParams<'a> {
    pub min_base: Id,
    pub max_base: Id,
    pub parents: &'a [Id],
}

impl AggregationMap {
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn min_base(&self) -> Option<Id> {
        (!self.is_empty()).then_some(self.min_base)
    }

    pub fn max_base(&self) -> Option<Id> {
        (!self.is_empty()).then_some(self.max_base)
    }

    /// True if some base has more than one parent.
    pub fn has_multi_map(&self) -> bool {
        self.multi_map
    }

    pub fn has_weights(&self) -> bool {
        self.any_weights
    }

    /// The parent, if the map was built from exactly one.
    pub fn single_target(&self) -> Option<Id> {
        self.single_target
    }

    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Whether source ids are looked up in a per-id array rather than by
    /// binary search over run starts.
    pub fn is_dense(&self) -> bool {
        matches!(self.source_map, SourceMap::Dense(_))
    }

    pub fn bases_of(&self, parent: Id) -> Option<&WeightedSet> {
        self.parents.get(&parent).and_then(|b| b.as_ref())
    }

    pub fn parents(&self) -> impl Iterator<Item = Id> + '_ {
        self.parents.keys().copied()
    }

    pub fn base_params(&self) -> Option<BaseParams<'_>> {
        if self.single_parents.is_empty() {
            return None;
        }
        Some(BaseParams {
            min_base: self.min_base,
            max_base: self.max_base,
            parents: &self.single_parents,
        })
    }

    /// The targets of `source`; `None` outside `[min_base, max_base]`.
    pub fn targets(&self, source: Id) -> Option<TargetReader<'_>> {
        if self.is_empty() || source < self.min_base || source > self.max_base {
            return None;
        }
        let seq = match &self.source_map {
            SourceMap::Dense(v) => *v.get((source - self.min_base) as usize)?,
            SourceMap::Sparse(v) => {
                let i = v.partition_point(|&(start, _)| start <= source).checked_sub(1)?;
                v[i].1
            }
        };
        let TargetSequence { start, len } = *self.sequences.get(seq as usize)?;
        let range = start as usize..(start + len) as usize;
        Some(TargetReader {
            targets: &self.target_ids[range.clone()],
            weights: self.weights.get(range),
            pos: 0,
            self_id: source,
        })
    }

    pub fn get_targets(&self, source: Id) -> Result<TargetReader<'_>> {
        self.targets(source)
            .ok_or_else(|| err(format!("source {} outside aggregation map", source)))
    }

    /// Every base id that has at least one target, with its targets.
    pub fn sources(&self) -> impl Iterator<Item = (Id, TargetReader<'_>)> + '_ {
        let ids = if self.is_empty() { 1..=0 } else { self.min_base..=self.max_base };
        ids.filter_map(move |id| self.targets(id).filter(|r| !r.is_empty()).map(|r| (id, r)))
    }

    /// Every base id covered by the map.
    pub fn base_set(&self) -> Set {
        let mut set = Set::new();
        for (&parent, bases) in &self.parents {
            add_bases(&mut set, parent, bases.as_ref());
        }
        set
    }

    /// The base ids that contribute to any of `parents`.
    pub fn base_set_for(&self, parents: &Set) -> Set {
        let mut set = Set::new();
        for (&parent, bases) in &self.parents {
            if parents.contains(parent) {
                add_bases(&mut set, parent, bases.as_ref());
            }
        }
        set
    }

    /// Sum of the weights of every (parent, base) pair, optionally counting
    /// only bases in `restricted`. Self-standing parents do not count; a map
    /// with nothing else weighs 1.
    pub fn weights_sum(&self, restricted: Option<&Set>) -> f64 {
        let mut sum = 0.0;
        let mut any = false;
        for bases in self.parents.values().flatten() {
            any = true;
            for r in bases.ranges() {
                let n = match restricted {
                    None => r.high as u64 - r.low as u64 + 1,
                    Some(set) => overlap(set, r.low, r.high),
                };
                sum += r.weight * n as f64;
            }
        }
        if any {
            sum
        } else {
            1.0
        }
    }
}

fn add_bases(set: &mut Set, parent: Id, bases: Option<&WeightedSet>) {
    match bases {
        None => {
            set.insert(parent);
        }
        Some(ws) => {
            for r in ws.ranges() {
                set.insert_range(r.low, r.high);
            }
        }
    }
}

fn overlap(set: &Set, lo: Id, hi: Id) -> u64 {
    set.ranges()
        .iter()
        .filter(|&&(a, b)| a <= hi && b >= lo)
        .map(|&(a, b)| b.min(hi) as u64 - a.max(lo) as u64 + 1)
        .sum()
}

/// The (parent, weight) pairs of one source id.
#[derive(Clone, Debug)]
pub struct TargetReader<'a> {
    targets: &'a [Id],
    weights: Option<&'a [f64]>,
    pos: usize,
    self_id: Id,
}

impl TargetReader<'_> {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn reset(&mut self) {
        self.pos = 0;
    }
}

impl Iterator for TargetReader<'_> {
    type Item = (Id, f64);

    fn next(&mut self) -> Option<(Id, f64)> {
        let target = *self.targets.get(self.pos)?;
        let weight = self.weights.map_or(1.0, |w| w[self.pos]);
        self.pos += 1;
        let target = if target == NO_ID { self.self_id } else { target };
        Some((target, weight))
    }
}
