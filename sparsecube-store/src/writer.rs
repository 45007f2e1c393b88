use std::sync::Arc;

use sparsecube_base::{err, Id, Result, DIM_MAX, NO_ID};
use tracing::trace;

use crate::{
    bookmark::Bookmark,
    instr::{ElemWidth, Instr, ValueWidth, NOP},
    page::{CellStream, Page},
};

pub(crate) struct Written {
    pub(crate) stream: CellStream,
    pub(crate) marks: Vec<Bookmark>,
    pub(crate) end_path: Vec<(Id, u64)>,
    pub(crate) nops: u64,
    pub(crate) pushed: u64,
}

/// Appends records in strictly increasing key order.
///
/// The writer keeps the path of the last record (ids and instruction
/// offsets per level). A new record only encodes the levels below the
/// first one that differs, and the levels of the last path it diverges
/// from are closed: their jumps are pointed at the new record's start,
/// past any NOP padding. Levels still open get their jumps at `finish`,
/// so the stream is not readable before then.
pub(crate) struct StreamWriter {
    stream: CellStream,
    marks: Vec<Bookmark>,
    index: bool,
    compress: bool,
    path_id: [Id; DIM_MAX],
    path_off: [u64; DIM_MAX],
    has_last: bool,
    nops: u64,
    pushed: u64,
    buf: Vec<u8>,
}

impl StreamWriter {
    pub(crate) fn new(
        dims: usize,
        page_size: usize,
        threshold: u64,
        long_jumps: Vec<u64>,
        index: bool,
        compress: bool,
    ) -> Self {
        let mut stream = CellStream::new(dims, page_size, threshold);
        stream.long_jumps = long_jumps;
        StreamWriter {
            stream,
            marks: Vec::new(),
            index,
            compress,
            path_id: [NO_ID; DIM_MAX],
            path_off: [0; DIM_MAX],
            has_last: false,
            nops: 0,
            pushed: 0,
            buf: Vec::with_capacity(64),
        }
    }

    fn dims(&self) -> usize {
        self.stream.dims
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.has_last
    }

    pub(crate) fn last_key(&self) -> Option<&[Id]> {
        self.has_last.then(|| &self.path_id[..self.stream.dims])
    }

    fn mark_page(&mut self, pos: u64) {
        if self.index && self.has_last {
            let dims = self.dims();
            self.marks.push(Bookmark {
                pos,
                key: self.path_id[..dims].to_vec(),
                offsets: self.path_off[..dims].to_vec(),
            });
        }
    }

    /// Points the jumps of the last path's levels `from..` at `end`.
    fn close_levels(&mut self, from: usize, end: u64) -> Result<()> {
        for d in from..self.dims() - 1 {
            let off = self.path_off[d];
            self.stream.set_jump(off, end - off)?;
        }
        Ok(())
    }

    /// Fills the rest of the current page with NOPs.
    pub(crate) fn pad_page(&mut self) {
        let ps = self.stream.page_size;
        if let Some(last) = self.stream.pages.last_mut() {
            let used = last.data.len();
            if used < ps {
                let page = Arc::make_mut(last);
                page.data.resize(ps, NOP);
                page.nops += (ps - used) as u32;
                self.nops += (ps - used) as u64;
            }
        }
    }

    pub(crate) fn push_back(&mut self, key: &[Id], val: f64) -> Result<()> {
        let dims = self.dims();
        if key.len() != dims {
            return Err(err("key has wrong dimension count"));
        }
        if key.contains(&NO_ID) {
            return Err(err("NO_ID is not a valid element"));
        }
        if val == 0.0 {
            return Err(err("zero values are not stored"));
        }
        let depth = if self.has_last {
            let last = &self.path_id[..dims];
            match key.iter().zip(last).position(|(a, b)| a != b) {
                Some(d) if key[d] > last[d] => d,
                _ => return Err(err("keys must be pushed in strictly increasing order")),
            }
        } else {
            0
        };

        self.buf.clear();
        let mut starts = [0_usize; DIM_MAX];
        for d in depth..dims {
            let prev = if d == depth && self.has_last { self.path_id[d] } else { NO_ID };
            let elem = ElemWidth::select(prev, key[d]);
            starts[d] = self.buf.len();
            if d + 1 == dims {
                let width = ValueWidth::select(val, self.compress);
                Instr::encode(&mut self.buf, elem, key[d], None, width, val);
            } else {
                Instr::encode(&mut self.buf, elem, key[d], Some(0), ValueWidth::None, 0.0);
            }
        }

        let ps = self.stream.page_size;
        let fits = match self.stream.pages.last() {
            Some(last) => last.data.len() + self.buf.len() <= ps,
            None => false,
        };
        if !fits {
            self.pad_page();
            let start = self.stream.len();
            self.mark_page(start);
            self.stream.pages.push(Arc::new(Page {
                data: Vec::with_capacity(ps),
                nops: 0,
            }));
        }

        let start = self.stream.len();
        if self.has_last {
            self.close_levels(depth, start)?;
        }
        if let Some(last) = self.stream.pages.last_mut() {
            Arc::make_mut(last).data.extend_from_slice(&self.buf);
        }
        for d in depth..dims {
            self.path_id[d] = key[d];
            self.path_off[d] = start + starts[d] as u64;
        }
        self.has_last = true;
        self.pushed += 1;
        trace!(?key, depth, len = self.buf.len(), "pushed record");
        Ok(())
    }

    /// Appends old pages `first..last` verbatim. The writer's last key must
    /// be the key of the record just before page `first` in `old` (or the
    /// writer empty and `first == 0`), so the implicit ids and the diverging
    /// level of the first copied record still decode the same way.
    pub(crate) fn copy_pages(
        &mut self,
        old: &CellStream,
        old_marks: &[Bookmark],
        old_end_path: &[(Id, u64)],
        first: usize,
        last: usize,
    ) -> Result<()> {
        let dims = self.dims();
        let ps = self.stream.page_size as u64;
        if old.page_size as u64 != ps || old.dims != dims || first >= last || last > old.page_count() {
            return Err(err("bad page copy request"));
        }
        let old_start = first as u64 * ps;
        let old_end = if last == old.page_count() { old.len() } else { last as u64 * ps };

        self.pad_page();
        let new_start = self.stream.len();
        let moved = |off: u64| off - old_start + new_start;

        if self.has_last {
            let ctx = match first.checked_sub(1).and_then(|i| old_marks.get(i)) {
                Some(mark) => mark,
                None => return Err(err("page copy without a bookmark for its predecessor")),
            };
            self.mark_page(new_start);
            // Levels that close inside the copied run now close at the
            // moved position; the rest stay open.
            for d in 0..dims - 1 {
                let target = old.subtree_end(ctx.offsets[d])?;
                if target < old_start {
                    return Err(err("subtree closes before the next record"));
                }
                if target < old_end {
                    let off = self.path_off[d];
                    self.stream.set_jump(off, moved(target) - off)?;
                }
            }
        } else if first != 0 {
            return Err(err("page copy into an empty writer must start at page 0"));
        }

        for page in &old.pages[first..last] {
            self.nops += page.nops as u64;
            self.stream.pages.push(page.clone());
        }

        let prev_off = self.path_off;
        let relocate = |d: usize, off: u64| if off < old_start { prev_off[d] } else { moved(off) };
        if self.index {
            let interior = old_marks
                .get(first..last - 1)
                .ok_or_else(|| err("missing bookmarks for copied pages"))?;
            for mark in interior {
                self.marks.push(Bookmark {
                    pos: moved(mark.pos),
                    key: mark.key.clone(),
                    offsets: mark.offsets.iter().enumerate().map(|(d, &o)| relocate(d, o)).collect(),
                });
            }
        }
        if last < old.page_count() {
            let mark = old_marks
                .get(last - 1)
                .ok_or_else(|| err("missing bookmark after copied pages"))?;
            for d in 0..dims {
                self.path_id[d] = mark.key[d];
                self.path_off[d] = relocate(d, mark.offsets[d]);
            }
        } else {
            if old_end_path.len() != dims {
                return Err(err("end path has wrong dimension count"));
            }
            for (d, &(id, off)) in old_end_path.iter().enumerate() {
                self.path_id[d] = id;
                self.path_off[d] = relocate(d, off);
            }
        }
        // The copied pages keep their jumps: the open levels among them are
        // closed by whatever follows, and subtrees ending inside the run
        // moved together with it.
        self.has_last = true;
        trace!(first, last, new_start, "copied pages");
        Ok(())
    }

    /// Closes the open levels at the end of the stream.
    pub(crate) fn finish(mut self) -> Result<Written> {
        let dims = self.stream.dims;
        let end_path = if self.has_last {
            let end = self.stream.len();
            self.close_levels(0, end)?;
            (0..dims).map(|d| (self.path_id[d], self.path_off[d])).collect()
        } else {
            Vec::new()
        };
        Ok(Written {
            stream: self.stream,
            marks: self.marks,
            end_path,
            nops: self.nops,
            pushed: self.pushed,
        })
    }
}
