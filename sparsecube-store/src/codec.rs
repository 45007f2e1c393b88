use std::{collections::HashMap, hash::BuildHasherDefault};

use rapidhash::RapidHasher;
use serde::{Deserialize, Serialize};
use sparsecube_base::{capacity_err, err, Result};

/// What the doubles in a stream stand for.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Numeric,
    /// Interned strings, stored as their table id.
    Strings,
    /// Presence flags, stored as 1.0.
    Marker,
}

type RapidMap<K, V> = HashMap<K, V, BuildHasherDefault<RapidHasher>>;

#[derive(Clone, Default, Debug)]
pub(crate) struct StringTable {
    strings: Vec<String>,
    ids: RapidMap<String, u32>,
}

impl StringTable {
    /// Ids start at 1 so that no string encodes as the deleting 0.0.
    pub(crate) fn intern(&mut self, s: &str) -> Result<f64> {
        if let Some(id) = self.ids.get(s) {
            return Ok(*id as f64);
        }
        let id = u32::try_from(self.strings.len() + 1).map_err(|_| capacity_err("string table full"))?;
        self.strings.push(s.to_owned());
        self.ids.insert(s.to_owned(), id);
        Ok(id as f64)
    }

    pub(crate) fn get(&self, val: f64) -> Result<&str> {
        if val < 1.0 || val.fract() != 0.0 {
            return Err(err(format!("{} is not a string id", val)));
        }
        self.strings
            .get(val as usize - 1)
            .map(String::as_str)
            .ok_or_else(|| err(format!("unknown string id {}", val)))
    }

    pub(crate) fn len(&self) -> usize {
        self.strings.len()
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self.strings)?)
    }

    pub(crate) fn from_bytes(buf: &[u8]) -> Result<Self> {
        let strings: Vec<String> = rmp_serde::from_slice(buf)?;
        let mut ids = RapidMap::default();
        for (i, s) in strings.iter().enumerate() {
            ids.insert(s.clone(), i as u32 + 1);
        }
        Ok(StringTable { strings, ids })
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ValueCodec {
    Numeric,
    Strings(StringTable),
    Marker,
}

impl ValueCodec {
    pub(crate) fn new(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Numeric => ValueCodec::Numeric,
            ValueKind::Strings => ValueCodec::Strings(StringTable::default()),
            ValueKind::Marker => ValueCodec::Marker,
        }
    }

    pub(crate) fn kind(&self) -> ValueKind {
        match self {
            ValueCodec::Numeric => ValueKind::Numeric,
            ValueCodec::Strings(_) => ValueKind::Strings,
            ValueCodec::Marker => ValueKind::Marker,
        }
    }

    /// String ids always take the full f64 width.
    pub(crate) fn compress(&self) -> bool {
        !matches!(self, ValueCodec::Strings(_))
    }

    /// Whether nearly-equal values count as unchanged on commit.
    pub(crate) fn tolerant(&self) -> bool {
        !matches!(self, ValueCodec::Strings(_))
    }
}

/// True when `d1` and `d2` are less than 8 units in the last place apart.
///
/// The IEEE bit patterns are mapped onto one monotonic signed scale
/// (negative values reflected below zero) and subtracted. A difference of
/// exactly `i64::MIN` has no absolute value and is reported as unequal;
/// `2.0` against `-2.0` lands there.
pub fn compare_double(d1: f64, d2: f64) -> bool {
    fn scaled(d: f64) -> i64 {
        let i = d.to_bits() as i64;
        if i < 0 {
            i64::MIN.wrapping_sub(i)
        } else {
            i
        }
    }
    let diff = scaled(d1).wrapping_sub(scaled(d2));
    if diff == i64::MIN {
        return false;
    }
    diff.abs() < 8
}
