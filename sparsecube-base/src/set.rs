use crate::{err, Id, Result, NO_ID};

/// An ordered set of identifiers stored as sorted, disjoint, non-adjacent
/// inclusive ranges. `NO_ID` is never a member.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub struct Set {
    ranges: Vec<(Id, Id)>,
    // members in ranges[..i], parallel to `ranges`
    before: Vec<u64>,
    size: u64,
}

impl Set {
    pub fn new() -> Self {
        Set::default()
    }

    /// Every valid identifier.
    pub fn full() -> Self {
        let mut s = Set::new();
        s.insert_range(0, NO_ID - 1);
        s
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = (Id, Id)>) -> Self {
        // sorted input only ever splices at the tail
        let mut ranges: Vec<_> = ranges.into_iter().collect();
        ranges.sort_unstable();
        let mut s = Set::new();
        for (lo, hi) in ranges {
            s.insert_range(lo, hi);
        }
        s
    }

    pub fn insert(&mut self, id: Id) -> bool {
        self.insert_range(id, id)
    }

    /// Adds `lo..=hi`, coalescing with neighbours. `NO_ID` is clipped off
    /// the top. Returns true if any identifier was new.
    pub fn insert_range(&mut self, lo: Id, hi: Id) -> bool {
        let hi = hi.min(NO_ID - 1);
        if lo > hi {
            return false;
        }
        let (lo64, hi64) = (lo as u64, hi as u64);
        let start = self.ranges.partition_point(|&(_, h)| (h as u64) + 1 < lo64);
        let end = self.ranges.partition_point(|&(l, _)| (l as u64) <= hi64 + 1);
        let (mut nlo, mut nhi) = (lo, hi);
        if start < end {
            nlo = nlo.min(self.ranges[start].0);
            nhi = nhi.max(self.ranges[end - 1].1);
        }
        self.ranges.splice(start..end, [(nlo, nhi)]);
        let old = self.size;
        self.recount_from(start);
        self.size != old
    }

    /// Rebuilds the prefix counts of `ranges[start..]`.
    fn recount_from(&mut self, start: usize) {
        self.before.truncate(start);
        let mut n = match start.checked_sub(1) {
            Some(i) => self.before[i] + (self.ranges[i].1 - self.ranges[i].0) as u64 + 1,
            None => 0,
        };
        for &(lo, hi) in &self.ranges[start..] {
            self.before.push(n);
            n += (hi - lo) as u64 + 1;
        }
        self.size = n;
    }

    pub fn len(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == NO_ID as u64
    }

    pub fn ranges(&self) -> &[(Id, Id)] {
        &self.ranges
    }

    /// Index of the first range whose upper end is `>= id`; equal to the
    /// range count when `id` is above every member.
    pub fn range_lower_bound(&self, id: Id) -> usize {
        self.ranges.partition_point(|&(_, hi)| hi < id)
    }

    pub fn contains(&self, id: Id) -> bool {
        let i = self.range_lower_bound(id);
        i < self.ranges.len() && self.ranges[i].0 <= id
    }

    pub fn first(&self) -> Option<Id> {
        self.ranges.first().map(|r| r.0)
    }

    pub fn last(&self) -> Option<Id> {
        self.ranges.last().map(|r| r.1)
    }

    /// Smallest member strictly greater than `id`.
    pub fn next_after(&self, id: Id) -> Option<Id> {
        if id >= NO_ID - 1 {
            return None;
        }
        let next = id + 1;
        let i = self.range_lower_bound(next);
        self.ranges.get(i).map(|&(lo, _)| lo.max(next))
    }

    /// Number of members below `id`, if `id` is a member.
    pub fn rank(&self, id: Id) -> Option<u64> {
        let i = self.range_lower_bound(id);
        match self.ranges.get(i) {
            Some(&(lo, _)) if lo <= id => Some(self.before[i] + (id - lo) as u64),
            _ => None,
        }
    }

    /// The member with `rank` members below it.
    pub fn nth(&self, rank: u64) -> Option<Id> {
        if rank >= self.size {
            return None;
        }
        let i = self.before.partition_point(|&b| b <= rank) - 1;
        Some(self.ranges[i].0 + (rank - self.before[i]) as Id)
    }

    pub fn iter(&self) -> impl Iterator<Item = Id> + '_ {
        self.ranges.iter().flat_map(|&(lo, hi)| lo..=hi)
    }
}

impl FromIterator<Id> for Set {
    fn from_iter<T: IntoIterator<Item = Id>>(iter: T) -> Self {
        Set::from_ranges(iter.into_iter().map(|id| (id, id)))
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct WeightedRange {
    pub low: Id,
    pub high: Id,
    pub weight: f64,
}

/// Ranges of identifiers, each with a weight. Built by pushing in ascending
/// order; adjacent ranges with equal weight are merged.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct WeightedSet {
    ranges: Vec<WeightedRange>,
}

impl WeightedSet {
    pub fn new() -> Self {
        WeightedSet::default()
    }

    /// Unit weight over `lo..=hi`.
    pub fn unit(lo: Id, hi: Id) -> Result<Self> {
        let mut ws = WeightedSet::new();
        ws.push_range(lo, hi, 1.0)?;
        Ok(ws)
    }

    pub fn push(&mut self, id: Id, weight: f64) -> Result<()> {
        self.push_range(id, id, weight)
    }

    pub fn push_range(&mut self, low: Id, high: Id, weight: f64) -> Result<()> {
        if low > high || high == NO_ID {
            return Err(err("invalid weighted range"));
        }
        if let Some(last) = self.ranges.last_mut() {
            if low <= last.high {
                return Err(err("weighted ranges must be pushed in ascending order"));
            }
            if last.high + 1 == low && last.weight == weight {
                last.high = high;
                return Ok(());
            }
        }
        self.ranges.push(WeightedRange { low, high, weight });
        Ok(())
    }

    pub fn ranges(&self) -> &[WeightedRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn has_weights(&self) -> bool {
        self.ranges.iter().any(|r| r.weight != 1.0)
    }

    pub fn weight(&self, id: Id) -> Option<f64> {
        let i = self.ranges.partition_point(|r| r.high < id);
        match self.ranges.get(i) {
            Some(r) if r.low <= id => Some(r.weight),
            _ => None,
        }
    }

    pub fn to_set(&self) -> Set {
        Set::from_ranges(self.ranges.iter().map(|r| (r.low, r.high)))
    }
}
