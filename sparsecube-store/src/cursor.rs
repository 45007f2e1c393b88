use std::borrow::Cow;

use sparsecube_base::{err, Id, Result, DIM_MAX, NO_ID};

use crate::{
    area::{Area, Filter},
    bookmark::{self, Bookmark},
    instr::{Instr, NOP},
    page::CellStream,
};

/// Anything that yields cells in ascending key order.
pub trait CellSource {
    fn next(&mut self) -> Result<bool>;
    fn key(&self) -> &[Id];
    fn value(&self) -> f64;
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Before,
    At,
    End,
}

/// Forward reader over a cell stream.
///
/// The cursor keeps one slot per level of the record it is on: the element
/// id, the offset of that level's instruction, and the end of that level's
/// subtree. Levels whose subtree ends at or before the read position are
/// popped, so moving on to a sibling never re-parses the levels above it.
/// The id slot of a popped level is kept, since an implicit id in the next
/// instruction at that level is relative to it.
pub struct Cursor<'a> {
    stream: &'a CellStream,
    marks: &'a [Bookmark],
    area: Option<&'a Area>,
    dims: usize,
    key: [Id; DIM_MAX],
    off: [u64; DIM_MAX],
    end: [u64; DIM_MAX],
    len: usize,
    pos: u64,
    stream_len: u64,
    end_pos: u64,
    rec_start: u64,
    at_boundary: bool,
    value: f64,
    state: State,
}

impl<'a> Cursor<'a> {
    pub fn new(stream: &'a CellStream, marks: &'a [Bookmark], area: Option<&'a Area>) -> Self {
        let stream_len = stream.len();
        Cursor {
            stream,
            marks,
            area,
            dims: stream.dims,
            key: [NO_ID; DIM_MAX],
            off: [0; DIM_MAX],
            end: [0; DIM_MAX],
            len: 0,
            pos: 0,
            stream_len,
            end_pos: stream_len,
            rec_start: 0,
            at_boundary: true,
            value: 0.0,
            state: State::Before,
        }
    }

    pub fn reset(&mut self) {
        self.key[..self.dims].fill(NO_ID);
        self.len = 0;
        self.pos = 0;
        self.rec_start = 0;
        self.at_boundary = true;
        self.value = 0.0;
        self.state = State::Before;
    }

    /// Stops iteration at byte offset `pos` instead of the stream end.
    pub fn set_end_offset(&mut self, pos: u64) {
        self.end_pos = pos.min(self.stream_len);
    }

    pub fn key(&self) -> &[Id] {
        &self.key[..self.dims]
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_at_end(&self) -> bool {
        self.state == State::End
    }

    /// Offset of the first instruction of the current record.
    pub fn record_start(&self) -> u64 {
        self.rec_start
    }

    /// Instruction offsets of the current record, one per level.
    pub fn offsets(&self) -> &[u64] {
        &self.off[..self.dims]
    }

    /// Subtree ends of the levels currently open.
    pub(crate) fn level_ends(&self) -> &[u64] {
        &self.end[..self.len]
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.state == State::End {
            return Ok(false);
        }
        self.advance()
    }

    fn filter(&self, depth: usize, id: Id) -> Filter {
        match self.area {
            None => Filter::In,
            Some(area) => area.classify(depth, id),
        }
    }

    fn in_area(&self, path: &[Id]) -> bool {
        self.area.map_or(true, |a| a.contains_path(path))
    }

    fn pop_finished(&mut self) {
        while self.len > 0 && self.end[self.len - 1] <= self.pos {
            self.len -= 1;
        }
    }

    /// Reads the instruction at the current position for level `depth` and
    /// checks it has the shape that level requires.
    fn read(&self, depth: usize) -> Result<(Instr, u64)> {
        if depth >= self.dims {
            return Err(err(format!("record at {} deeper than dimension count", self.pos)));
        }
        let ins = self.stream.decode(self.pos, self.key[depth])?;
        let leaf = depth + 1 == self.dims;
        let subtree_end = if leaf {
            if ins.jump.is_some() || ins.value.is_none() {
                return Err(err(format!("malformed leaf instruction at {}", self.pos)));
            }
            self.pos + ins.len as u64
        } else {
            if ins.value.is_some() {
                return Err(err(format!("value on non-leaf instruction at {}", self.pos)));
            }
            match ins.jump {
                Some(raw) => {
                    let dist = self.stream.jump_distance(raw)?;
                    if dist < ins.len as u64 {
                        return Err(err(format!("jump at {} lands inside its instruction", self.pos)));
                    }
                    self.pos + dist
                }
                None => return Err(err(format!("non-leaf instruction without jump at {}", self.pos))),
            }
        };
        if subtree_end > self.stream_len {
            return Err(err(format!("jump at {} out of bounds", self.pos)));
        }
        Ok((ins, subtree_end))
    }

    /// Skips NOP padding; false if the end was reached.
    fn skip_padding(&mut self) -> Result<bool> {
        loop {
            if self.pos >= self.end_pos {
                self.state = State::End;
                return Ok(false);
            }
            if self.stream.byte(self.pos)? != NOP {
                if self.at_boundary {
                    self.rec_start = self.pos;
                    self.at_boundary = false;
                }
                return Ok(true);
            }
            // Levels a page break closes end at the next page, past the padding.
            self.pos = self.stream.next_page_start(self.pos);
            self.pop_finished();
        }
    }

    fn enter(&mut self, depth: usize, ins: &Instr, subtree_end: u64) -> bool {
        self.key[depth] = ins.id;
        self.off[depth] = self.pos;
        self.end[depth] = subtree_end;
        self.len = depth + 1;
        self.pos += ins.len as u64;
        if depth + 1 == self.dims {
            self.value = ins.value.unwrap_or(0.0);
            self.state = State::At;
            self.at_boundary = true;
            return true;
        }
        self.key[depth + 1] = NO_ID;
        false
    }

    fn advance(&mut self) -> Result<bool> {
        loop {
            self.pop_finished();
            if !self.skip_padding()? {
                return Ok(false);
            }
            let depth = self.len;
            let (ins, subtree_end) = self.read(depth)?;
            match self.filter(depth, ins.id) {
                Filter::In => {
                    if self.enter(depth, &ins, subtree_end) {
                        return Ok(true);
                    }
                }
                Filter::Below => {
                    self.key[depth] = ins.id;
                    self.pos = subtree_end;
                    self.at_boundary = true;
                }
                Filter::Above => {
                    self.key[depth] = ins.id;
                    self.pos = if depth > 0 { self.end[depth - 1] } else { self.end_pos };
                    self.at_boundary = true;
                }
            }
        }
    }

    /// Fills every level from a bookmark; positions at the bookmark's page.
    fn load_bookmark(&mut self, mark: &Bookmark) -> Result<()> {
        if mark.key.len() != self.dims || mark.offsets.len() != self.dims {
            return Err(err("bookmark has wrong dimension count"));
        }
        for d in 0..self.dims {
            self.pos = mark.offsets[d];
            self.key[d] = mark.key[d].wrapping_sub(1);
            let (ins, subtree_end) = self.read(d)?;
            if ins.id != mark.key[d] {
                return Err(err(format!("bookmark at {} disagrees with stream", mark.pos)));
            }
            self.key[d] = ins.id;
            self.off[d] = mark.offsets[d];
            self.end[d] = subtree_end;
            if let Some(v) = ins.value {
                self.value = v;
            }
        }
        self.len = self.dims;
        self.pos = mark.pos;
        self.at_boundary = true;
        Ok(())
    }

    /// Positions the cursor so that `next` yields the first record of
    /// `page` that lies in the area.
    pub(crate) fn seek_page(&mut self, page: usize) -> Result<()> {
        self.reset();
        if page == 0 {
            return Ok(());
        }
        let marks = self.marks;
        let mark = marks
            .get(page - 1)
            .ok_or_else(|| err(format!("no bookmark for page {}", page)))?;
        self.load_bookmark(mark)?;
        // Levels loaded from the bookmark were never filtered.
        if let Some(area) = self.area {
            for d in 0..self.dims - 1 {
                if area.classify(d, self.key[d]) != Filter::In {
                    self.len = d;
                    self.pos = self.pos.max(self.end[d]);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Moves to the smallest record `>= target` within the area. Returns
    /// true iff that record's key equals `target`.
    pub fn seek(&mut self, target: &[Id]) -> Result<bool> {
        if target.len() != self.dims {
            return Err(err("seek key has wrong dimension count"));
        }
        let goal = match self.area {
            None => Cow::Borrowed(target),
            Some(area) => match area.ceil_path(target) {
                Some(path) => Cow::Owned(path),
                None => {
                    self.reset();
                    self.state = State::End;
                    return Ok(false);
                }
            },
        };
        let found = self.seek_in_area(&goal)?;
        Ok(found && goal.as_ref() == target)
    }

    // `goal` lies in the area, so every level matched on the way down does.
    fn seek_in_area(&mut self, goal: &[Id]) -> Result<bool> {
        self.reset();
        let marks = self.marks;
        if let Some(i) = bookmark::find(marks, goal) {
            let mark = &marks[i];
            if mark.pos < self.end_pos {
                self.load_bookmark(mark)?;
                let common = mark.key.iter().zip(goal).take_while(|(a, b)| a == b).count();
                // The bookmark key sorts below the goal, so the subtree at
                // the first differing level holds nothing we want.
                self.len = common;
                self.pos = self.pos.max(self.end[common]);
            }
        }
        loop {
            if self.len > 0 && self.end[self.len - 1] <= self.pos {
                // Subtree of the goal prefix exhausted: the answer follows it.
                return self.advance().map(|_| false);
            }
            if !self.skip_padding()? {
                return Ok(false);
            }
            let depth = self.len;
            let (ins, subtree_end) = self.read(depth)?;
            let want = goal[depth];
            if ins.id < want {
                self.key[depth] = ins.id;
                self.pos = subtree_end;
                self.at_boundary = true;
                continue;
            }
            if ins.id > want || self.filter(depth, ins.id) != Filter::In {
                return self.advance().map(|_| false);
            }
            if self.enter(depth, &ins, subtree_end) {
                return Ok(true);
            }
        }
    }

    /// Moves to the last record `< target` within the area. Returns false,
    /// leaving the cursor reset, if there is none.
    pub fn seek_before(&mut self, target: &[Id]) -> Result<bool> {
        if target.len() != self.dims {
            return Err(err("seek key has wrong dimension count"));
        }
        let marks = self.marks;
        let mut start = bookmark::find(marks, target);
        let best = loop {
            let mut best: Option<Vec<Id>> = None;
            match start {
                Some(i) => {
                    self.seek_page(i + 1)?;
                    if self.in_area(&marks[i].key) {
                        best = Some(marks[i].key.clone());
                    }
                }
                None => self.reset(),
            }
            while self.next()? {
                if self.key() >= target {
                    break;
                }
                best = Some(self.key().to_vec());
            }
            if best.is_some() || start.is_none() {
                break best;
            }
            // Nothing in the area on this stretch; start one page earlier.
            start = start.and_then(|i| i.checked_sub(1));
        };
        match best {
            Some(key) => {
                if !self.seek(&key)? {
                    return Err(err("record vanished during seek"));
                }
                Ok(true)
            }
            None => {
                self.reset();
                Ok(false)
            }
        }
    }
}

impl CellSource for Cursor<'_> {
    fn next(&mut self) -> Result<bool> {
        Cursor::next(self)
    }
    fn key(&self) -> &[Id] {
        Cursor::key(self)
    }
    fn value(&self) -> f64 {
        Cursor::value(self)
    }
}
