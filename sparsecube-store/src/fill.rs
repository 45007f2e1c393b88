use sparsecube_base::{err, Id, Result};

use crate::{area::Area, cursor::{CellSource, Cursor}};

/// Yields every cell of an area: stored values where they exist and a
/// default value for the cells between them.
///
/// The synthesized cells are never materialized; between two stored
/// records the cursor only counts down the number of area cells that lie
/// strictly between them.
pub struct FillCursor<'a> {
    inner: Cursor<'a>,
    area: &'a Area,
    default: f64,
    key: Vec<Id>,
    have_key: bool,
    value: f64,
    repeat: u64,
    upcoming: Vec<Id>,
    upcoming_value: f64,
    have_upcoming: bool,
    repeat_emitted: bool,
    started: bool,
}

impl<'a> FillCursor<'a> {
    /// `inner` must be restricted to `area`.
    pub(crate) fn new(inner: Cursor<'a>, area: &'a Area, default: f64) -> Self {
        let dims = area.dims();
        FillCursor {
            inner,
            area,
            default,
            key: vec![0; dims],
            have_key: false,
            value: default,
            repeat: 0,
            upcoming: vec![0; dims],
            upcoming_value: 0.0,
            have_upcoming: false,
            repeat_emitted: false,
            started: false,
        }
    }

    pub fn reset(&mut self) {
        self.inner.reset();
        self.have_key = false;
        self.repeat = 0;
        self.have_upcoming = false;
        self.started = false;
    }

    pub fn key(&self) -> &[Id] {
        &self.key
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Whether the current cell holds the default rather than a stored value.
    pub fn is_default(&self) -> bool {
        self.repeat_emitted
    }

    fn fetch(&mut self) -> Result<()> {
        self.have_upcoming = self.inner.next()?;
        if self.have_upcoming {
            self.upcoming.copy_from_slice(self.inner.key());
            self.upcoming_value = self.inner.value();
        }
        Ok(())
    }

    fn set_repetition(&mut self) -> Result<()> {
        let after = self.have_key.then_some(self.key.as_slice());
        let to = self.have_upcoming.then_some(self.upcoming.as_slice());
        self.repeat = self.area.distance(after, to)?;
        Ok(())
    }

    pub fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            if self.area.is_empty() {
                return Ok(false);
            }
            self.fetch()?;
            self.set_repetition()?;
        }
        if self.repeat > 0 {
            if self.have_key {
                if !self.area.next_path(&mut self.key) {
                    return Err(err("repetition ran past the end of the area"));
                }
            } else {
                match self.area.first_path() {
                    Some(first) => self.key.copy_from_slice(&first),
                    None => return Ok(false),
                }
                self.have_key = true;
            }
            self.repeat -= 1;
            self.value = self.default;
            self.repeat_emitted = true;
            return Ok(true);
        }
        if !self.have_upcoming {
            return Ok(false);
        }
        self.key.copy_from_slice(&self.upcoming);
        self.have_key = true;
        self.value = self.upcoming_value;
        self.repeat_emitted = false;
        self.fetch()?;
        self.set_repetition()?;
        Ok(true)
    }
}

impl CellSource for FillCursor<'_> {
    fn next(&mut self) -> Result<bool> {
        FillCursor::next(self)
    }
    fn key(&self) -> &[Id] {
        FillCursor::key(self)
    }
    fn value(&self) -> f64 {
        FillCursor::value(self)
    }
}
