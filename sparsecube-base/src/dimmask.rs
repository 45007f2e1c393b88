/// A 256-bit mask over dimension positions. Dimension counts are capped at
/// 256, so one mask covers any cube; bits count up from the least
/// significant bit of the first word.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct DimMask {
    bits: [u64; 4],
}

impl DimMask {
    pub fn new() -> Self {
        DimMask { bits: [0; 4] }
    }
    pub fn set(&mut self, dim: usize, val: bool) {
        if val {
            self.bits[dim / 64] |= 1 << (dim % 64);
        } else {
            self.bits[dim / 64] &= !(1 << (dim % 64));
        }
    }
    pub fn get(&self, dim: usize) -> bool {
        (self.bits[dim / 64] & (1 << (dim % 64))) != 0
    }
    pub fn count(&self) -> u32 {
        self.bits.iter().map(|x| x.count_ones()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|x| *x == 0)
    }
    pub fn any(&self) -> bool {
        !self.is_empty()
    }
    pub fn union(&mut self, other: &Self) {
        for i in 0..4 {
            self.bits[i] |= other.bits[i];
        }
    }

    /// Positions of the set bits, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().flat_map(|(w, word)| {
            let mut word = *word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(w * 64 + bit)
            })
        })
    }
}
