use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use sparsecube_base::{Id, Result};
use tracing::debug;

use crate::{
    codec::compare_double,
    config::StorageConfig,
    cursor::Cursor,
    instr::max_record_len,
    storage::Committed,
    writer::{StreamWriter, Written},
};

/// A pending write to one cell.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum Change {
    Set(f64),
    /// Added to whatever value is committed when the batch is applied.
    Add(f64),
}

pub(crate) struct MergeParams<'c> {
    pub(crate) config: &'c StorageConfig,
    pub(crate) compress: bool,
    pub(crate) tolerant: bool,
    pub(crate) index: bool,
}

struct Effective {
    changes: Vec<(Vec<Id>, f64)>,
    inserted: u64,
    deleted: u64,
}

/// Looks up the committed value for each change and drops the ones that
/// would not alter the stream: deletes of absent cells and rewrites with an
/// equal (or, for numbers, nearly equal) value.
fn resolve(old: &Committed, batch: &BTreeMap<Vec<Id>, Change>, tolerant: bool) -> Result<Effective> {
    let mut lookup = Cursor::new(&old.stream, &old.marks, None);
    let mut eff = Effective {
        changes: Vec::with_capacity(batch.len()),
        inserted: 0,
        deleted: 0,
    };
    for (key, change) in batch {
        let current = if old.stream.is_empty() {
            None
        } else if lookup.seek(key)? {
            Some(lookup.value())
        } else {
            None
        };
        let val = match (*change, current) {
            (Change::Set(v), _) => v,
            (Change::Add(d), Some(c)) => c + d,
            (Change::Add(d), None) => d,
        };
        match current {
            Some(c) if c == val || (tolerant && compare_double(c, val)) => continue,
            Some(_) if val == 0.0 => eff.deleted += 1,
            Some(_) => {}
            None if val == 0.0 => continue,
            None => eff.inserted += 1,
        }
        eff.changes.push((key.clone(), val));
    }
    Ok(eff)
}

fn should_rebuild(old: &Committed, eff: &Effective, p: &MergeParams) -> bool {
    let cfg = p.config;
    let len = old.stream.len();
    if !p.index || old.stream.is_empty() {
        return true;
    }
    if old.val_count < cfg.min_values_for_incremental {
        return true;
    }
    if old.empty_space * 100 > len * cfg.rebuild_empty_percent {
        return true;
    }
    let growth = eff.changes.len() as u64 * max_record_len(old.stream.dims) as u64;
    !old.stream.long_jumps.is_empty() && len + growth >= cfg.long_jump_threshold
}

/// The run of old pages starting at the cursor's record that can be copied
/// verbatim ahead of the next change, as `first..last`.
fn copyable_run(
    old: &Committed,
    rd: &Cursor,
    w: &StreamWriter,
    limit: Option<&[Id]>,
    cfg: &StorageConfig,
) -> Option<(usize, usize)> {
    let ps = old.stream.page_size as u64;
    let start = rd.record_start();
    if start % ps != 0 {
        return None;
    }
    let first = (start / ps) as usize;
    let in_context = match first.checked_sub(1) {
        None => w.is_empty(),
        Some(i) => w.last_key() == old.marks.get(i).map(|m| m.key.as_slice()),
    };
    if !in_context {
        return None;
    }
    let npages = old.stream.page_count();
    // marks[j] holds the last key of page j
    let last = match limit {
        None => npages,
        Some(lim) => {
            let mut last = first + old.marks[first..].partition_point(|m| m.key.as_slice() < lim);
            let end_key: Vec<Id> = old.end_path.iter().map(|(id, _)| *id).collect();
            if last == npages - 1 && end_key.as_slice() < lim {
                last = npages;
            }
            last
        }
    };
    if last <= first || last - first < cfg.min_copy_pages {
        return None;
    }
    let nops = old.stream.page_nops(first..last);
    let bytes = old.stream.page_bytes(first..last);
    if nops > cfg.block_nop_limit && nops * 100 > bytes * cfg.rebuild_empty_percent {
        return None;
    }
    Some((first, last))
}

/// Applies a sorted batch to `old`, returning the new committed state, or
/// `None` if the batch changes nothing.
pub(crate) fn commit(old: &Committed, batch: &BTreeMap<Vec<Id>, Change>, p: &MergeParams) -> Result<Option<Committed>> {
    let eff = resolve(old, batch, p.tolerant)?;
    if eff.changes.is_empty() {
        debug!(batch = batch.len(), "commit changes nothing");
        return Ok(None);
    }
    let rebuild = should_rebuild(old, &eff, p);
    debug!(
        changes = eff.changes.len(),
        inserted = eff.inserted,
        deleted = eff.deleted,
        rebuild,
        "committing"
    );
    let written = write_merged(old, &eff.changes, rebuild, p)?;
    let val_count = old.val_count + eff.inserted - eff.deleted;
    if rebuild && written.pushed != val_count {
        debug!(written = written.pushed, val_count, "value count drifted, using written count");
    }
    debug!(pages = written.stream.page_count(), "commit finished");
    Ok(Some(Committed {
        val_count: if rebuild { written.pushed } else { val_count },
        empty_space: written.nops,
        del_count: old.del_count + eff.deleted,
        stream: written.stream,
        marks: Arc::new(written.marks),
        end_path: written.end_path,
    }))
}

/// Re-encodes every surviving record of `old` into a fresh stream.
pub(crate) fn rebuild(old: &Committed, p: &MergeParams) -> Result<Committed> {
    let written = write_merged(old, &[], true, p)?;
    debug!(pages = written.stream.page_count(), "rebuilt stream");
    Ok(Committed {
        val_count: written.pushed,
        empty_space: written.nops,
        del_count: 0,
        stream: written.stream,
        marks: Arc::new(written.marks),
        end_path: written.end_path,
    })
}

/// Merge-joins the old records with `changes` into a new writer. Unless
/// `rebuild` is set, runs of old pages that no change touches are copied
/// rather than re-encoded.
fn write_merged(old: &Committed, changes: &[(Vec<Id>, f64)], rebuild: bool, p: &MergeParams) -> Result<Written> {
    let cfg = p.config;
    let dims = old.stream.dims;
    // Copied pages refer to long-jump entries by index, so an incremental
    // commit carries the whole table over and entries of re-encoded records
    // linger until the next rebuild. should_rebuild forces one whenever the
    // table is non-empty, so this clone is normally of an empty table.
    let long_jumps = if rebuild { Vec::new() } else { old.stream.long_jumps.clone() };
    let mut w = StreamWriter::new(
        dims,
        old.stream.page_size,
        cfg.long_jump_threshold,
        long_jumps,
        p.index,
        p.compress,
    );
    let mut rd = Cursor::new(&old.stream, &old.marks, None);
    let mut has_old = rd.next()?;
    let mut ci = 0;
    let mut copied = 0;
    loop {
        let change = changes.get(ci);
        if !rebuild && has_old {
            let limit = change.map(|(k, _)| k.as_slice());
            if let Some((first, last)) = copyable_run(old, &rd, &w, limit, cfg) {
                w.copy_pages(&old.stream, &old.marks, &old.end_path, first, last)?;
                copied += last - first;
                has_old = if last < old.stream.page_count() {
                    rd.seek_page(last)?;
                    rd.next()?
                } else {
                    false
                };
                continue;
            }
        }
        match (has_old, change) {
            (false, None) => {
                debug!(copied, "merge finished");
                break;
            }
            (true, None) => {
                w.push_back(rd.key(), rd.value())?;
                has_old = rd.next()?;
            }
            (false, Some((key, val))) => {
                if *val != 0.0 {
                    w.push_back(key, *val)?;
                }
                ci += 1;
            }
            (true, Some((key, val))) => match rd.key().cmp(key.as_slice()) {
                Ordering::Less => {
                    w.push_back(rd.key(), rd.value())?;
                    has_old = rd.next()?;
                }
                Ordering::Greater => {
                    if *val != 0.0 {
                        w.push_back(key, *val)?;
                    }
                    ci += 1;
                }
                Ordering::Equal => {
                    if *val != 0.0 {
                        w.push_back(key, *val)?;
                    }
                    ci += 1;
                    has_old = rd.next()?;
                }
            },
        }
    }
    w.finish()
}
