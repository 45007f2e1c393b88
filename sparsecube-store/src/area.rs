use sparsecube_base::{capacity_err, err, DimMask, Id, Result, Set, DIM_MAX};

/// Where an element id falls relative to a dimension's candidate set.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Filter {
    /// Not a member, but some member is larger.
    Below,
    In,
    /// Larger than every member.
    Above,
}

/// A query restriction: one candidate set per dimension. The cells of the
/// area are the cartesian product of the sets, ordered like keys.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Area {
    sets: Vec<Set>,
    restricted: DimMask,
}

impl Area {
    pub fn full(dims: usize) -> Result<Self> {
        Area::new(vec![Set::full(); dims])
    }

    pub fn new(sets: Vec<Set>) -> Result<Self> {
        if sets.is_empty() || sets.len() > DIM_MAX {
            return Err(err("area dimension count out of range"));
        }
        let mut restricted = DimMask::new();
        for (d, s) in sets.iter().enumerate() {
            restricted.set(d, !s.is_full());
        }
        Ok(Area { sets, restricted })
    }

    pub fn dims(&self) -> usize {
        self.sets.len()
    }

    pub fn set(&self, dim: usize) -> &Set {
        &self.sets[dim]
    }

    pub fn is_restricted(&self, dim: usize) -> bool {
        self.restricted.get(dim)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().any(|s| s.is_empty())
    }

    pub fn contains_path(&self, path: &[Id]) -> bool {
        path.len() == self.sets.len() && path.iter().zip(&self.sets).all(|(id, s)| s.contains(*id))
    }

    pub(crate) fn classify(&self, dim: usize, id: Id) -> Filter {
        if !self.restricted.get(dim) {
            return Filter::In;
        }
        let set = &self.sets[dim];
        let ranges = set.ranges();
        let i = set.range_lower_bound(id);
        if i == ranges.len() {
            Filter::Above
        } else if ranges[i].0 <= id {
            Filter::In
        } else {
            Filter::Below
        }
    }

    pub fn first_path(&self) -> Option<Vec<Id>> {
        self.sets.iter().map(|s| s.first()).collect()
    }

    /// Steps `path` to the next cell of the area; false past the last one.
    pub fn next_path(&self, path: &mut [Id]) -> bool {
        for d in (0..self.sets.len()).rev() {
            if let Some(next) = self.sets[d].next_after(path[d]) {
                path[d] = next;
                for (i, s) in self.sets.iter().enumerate().skip(d + 1) {
                    if let Some(first) = s.first() {
                        path[i] = first;
                    }
                }
                return true;
            }
        }
        false
    }

    /// The smallest cell of the area that is `>= target`.
    pub fn ceil_path(&self, target: &[Id]) -> Option<Vec<Id>> {
        if self.is_empty() || target.len() != self.sets.len() {
            return None;
        }
        let mut m = 0;
        while m < target.len() && self.sets[m].contains(target[m]) {
            m += 1;
        }
        if m == target.len() {
            return Some(target.to_vec());
        }
        for d in (0..=m).rev() {
            if let Some(next) = self.sets[d].next_after(target[d]) {
                let mut path = target[..d].to_vec();
                path.push(next);
                for s in &self.sets[d + 1..] {
                    path.push(s.first()?);
                }
                return Some(path);
            }
        }
        None
    }

    /// Number of cells in the area.
    pub fn size(&self) -> Result<u128> {
        let mut n: u128 = 1;
        for s in &self.sets {
            n = n
                .checked_mul(s.len() as u128)
                .ok_or_else(|| capacity_err("area cell count overflows"))?;
        }
        Ok(n)
    }

    /// Position of `path` among the cells of the area.
    pub fn ordinal(&self, path: &[Id]) -> Result<u128> {
        if path.len() != self.sets.len() {
            return Err(err("path has wrong dimension count"));
        }
        let mut n: u128 = 0;
        for (id, s) in path.iter().zip(&self.sets) {
            let rank = s.rank(*id).ok_or_else(|| err("path outside area"))?;
            n = n
                .checked_mul(s.len() as u128)
                .and_then(|n| n.checked_add(rank as u128))
                .ok_or_else(|| capacity_err("area cell ordinal overflows"))?;
        }
        Ok(n)
    }

    /// Number of area cells strictly between `after` and `to`; `None`
    /// stands for the start and the end of the area respectively.
    pub fn distance(&self, after: Option<&[Id]>, to: Option<&[Id]>) -> Result<u64> {
        let start = match after {
            Some(p) => self.ordinal(p)? + 1,
            None => 0,
        };
        let stop = match to {
            Some(p) => self.ordinal(p)?,
            None => self.size()?,
        };
        let dist = stop
            .checked_sub(start)
            .ok_or_else(|| err("repetition bounds out of order"))?;
        u64::try_from(dist).map_err(|_| capacity_err("too many generated constant values"))
    }
}
