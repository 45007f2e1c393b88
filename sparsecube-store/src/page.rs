use std::sync::Arc;

use sparsecube_base::{capacity_err, err, Id, Result};
use tracing::warn;

use crate::instr::{Instr, JUMP};

/// One page of the cell stream. Every page but the last is exactly
/// `page_size` bytes, NOP padding included; every page starts with the
/// first instruction of a record.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub(crate) struct Page {
    pub(crate) data: Vec<u8>,
    pub(crate) nops: u32,
}

/// The encoded cell stream: a list of shared pages plus the long-jump table
/// that oversized jump fields refer to. Cloning shares every page; writers
/// go through `Arc::make_mut`, so a page held by another clone is copied
/// before it is touched.
#[derive(Clone, Debug)]
pub struct CellStream {
    pub(crate) dims: usize,
    pub(crate) page_size: usize,
    pub(crate) threshold: u64,
    pub(crate) pages: Vec<Arc<Page>>,
    pub(crate) long_jumps: Vec<u64>,
}

impl CellStream {
    pub(crate) fn new(dims: usize, page_size: usize, threshold: u64) -> Self {
        CellStream {
            dims,
            page_size,
            threshold,
            pages: Vec::new(),
            long_jumps: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn long_jump_count(&self) -> usize {
        self.long_jumps.len()
    }

    /// Total bytes, including NOP padding.
    pub fn len(&self) -> u64 {
        match self.pages.last() {
            None => 0,
            Some(last) => ((self.pages.len() - 1) * self.page_size + last.data.len()) as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub(crate) fn page_nops(&self, range: std::ops::Range<usize>) -> u64 {
        self.pages[range].iter().map(|p| p.nops as u64).sum()
    }

    pub(crate) fn page_bytes(&self, range: std::ops::Range<usize>) -> u64 {
        self.pages[range].iter().map(|p| p.data.len() as u64).sum()
    }

    fn locate(&self, pos: u64) -> (usize, usize) {
        let ps = self.page_size as u64;
        ((pos / ps) as usize, (pos % ps) as usize)
    }

    /// The rest of the page holding `pos`.
    pub(crate) fn tail_at(&self, pos: u64) -> Result<&[u8]> {
        let (pi, po) = self.locate(pos);
        match self.pages.get(pi) {
            Some(page) if po < page.data.len() => Ok(&page.data[po..]),
            _ => Err(err(format!("offset {} past end of stream", pos))),
        }
    }

    pub(crate) fn byte(&self, pos: u64) -> Result<u8> {
        Ok(self.tail_at(pos)?[0])
    }

    pub(crate) fn next_page_start(&self, pos: u64) -> u64 {
        let ps = self.page_size as u64;
        (pos / ps + 1) * ps
    }

    pub(crate) fn decode(&self, pos: u64, prev: Id) -> Result<Instr> {
        Instr::decode(self.tail_at(pos)?, prev)
    }

    /// Resolves a raw jump field to a byte distance.
    pub(crate) fn jump_distance(&self, raw: u32) -> Result<u64> {
        let raw = raw as u64;
        if raw < self.threshold {
            return Ok(raw);
        }
        let idx = (raw - self.threshold) as usize;
        match self.long_jumps.get(idx) {
            Some(dist) => Ok(*dist),
            None => Err(err(format!("long jump index {} out of range", idx))),
        }
    }

    /// Absolute end of the subtree whose instruction starts at `pos`.
    pub(crate) fn subtree_end(&self, pos: u64) -> Result<u64> {
        match self.decode(pos, 0)?.jump {
            Some(raw) => Ok(pos + self.jump_distance(raw)?),
            None => Err(err(format!("instruction at {} has no jump", pos))),
        }
    }

    /// Points the jump of the instruction at `pos` `dist` bytes forward,
    /// moving it into or updating the long-jump table as needed. The page is
    /// only copied (if shared) when the jump field itself changes.
    pub(crate) fn set_jump(&mut self, pos: u64, dist: u64) -> Result<()> {
        let (pi, po) = self.locate(pos);
        let threshold = self.threshold;
        let data = match self.pages.get(pi) {
            Some(page) => &page.data,
            None => return Err(err(format!("jump patch at {} past end of stream", pos))),
        };
        let code = match data.get(po) {
            Some(code) => *code,
            None => return Err(err(format!("jump patch at {} past end of stream", pos))),
        };
        if code & JUMP == 0 {
            return Err(err(format!("jump patch at {} on instruction without jump", pos)));
        }
        let fo = po + Instr::jump_field_offset(code);
        let cur = match data.get(fo..fo + 4) {
            Some(f) => u32::from_le_bytes([f[0], f[1], f[2], f[3]]) as u64,
            None => return Err(err(format!("jump field at {} runs past end of page", pos))),
        };
        let raw = if cur >= threshold {
            // The field keeps referring to its table entry.
            let idx = (cur - threshold) as usize;
            if dist < threshold {
                warn!(pos, dist, "long jump shrank below threshold, keeping long-jump entry");
            }
            return match self.long_jumps.get_mut(idx) {
                Some(slot) => {
                    *slot = dist;
                    Ok(())
                }
                None => Err(err(format!("long jump index {} out of range", idx))),
            };
        } else if dist < threshold {
            dist
        } else {
            let raw = threshold + self.long_jumps.len() as u64;
            if raw > u32::MAX as u64 {
                return Err(capacity_err("long jump table full"));
            }
            self.long_jumps.push(dist);
            raw
        };
        if raw != cur {
            let page = Arc::make_mut(&mut self.pages[pi]);
            page.data[fo..fo + 4].copy_from_slice(&(raw as u32).to_le_bytes());
        }
        Ok(())
    }
}
