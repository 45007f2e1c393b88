use sparsecube_base::{Id, Result};
use tracing::{debug, error};

use crate::{bookmark::scan_index, cursor::Cursor, instr::NOP, storage::Committed};

/// Walks the whole stream checking its structural invariants. Problems are
/// logged; the result says whether there were any. Only unreadable
/// encodings come back as errors.
pub(crate) fn validate(c: &Committed, index: bool) -> Result<bool> {
    let stream = &c.stream;
    let dims = stream.dims;
    let len = stream.len();
    let mut ok = true;

    let mut cur = Cursor::new(stream, &c.marks, None);
    let mut prev: Option<Vec<Id>> = None;
    let mut last_offsets: Vec<u64> = Vec::new();
    let mut count = 0_u64;
    while cur.next()? {
        count += 1;
        if let Some(p) = &prev {
            if p.as_slice() >= cur.key() {
                error!(prev = ?p, key = ?cur.key(), "keys out of order");
                ok = false;
            }
        }
        for (d, &end) in cur.level_ends().iter().take(dims - 1).enumerate() {
            if end < len && stream.byte(end)? == NOP {
                error!(key = ?cur.key(), level = d, end, "subtree ends on padding");
                ok = false;
            }
        }
        prev = Some(cur.key().to_vec());
        last_offsets = cur.offsets().to_vec();
    }

    if count != c.val_count {
        error!(count, expected = c.val_count, "value count mismatch");
        ok = false;
    }

    match &prev {
        None => {
            if !c.end_path.is_empty() || len != 0 {
                error!(len, "empty stream with leftover end path or bytes");
                ok = false;
            }
        }
        Some(key) => {
            let ids: Vec<Id> = c.end_path.iter().map(|(id, _)| *id).collect();
            let offs: Vec<u64> = c.end_path.iter().map(|(_, off)| *off).collect();
            if ids != *key || offs != last_offsets {
                error!(?ids, ?key, "end path does not match last record");
                ok = false;
            } else {
                for &(_, off) in &c.end_path[..dims - 1] {
                    let end = stream.subtree_end(off)?;
                    if end != len {
                        error!(off, end, len, "open level does not reach stream end");
                        ok = false;
                    }
                }
            }
        }
    }

    if index {
        let scanned = scan_index(stream)?;
        if scanned != *c.marks {
            error!(
                scanned = scanned.len(),
                held = c.marks.len(),
                "bookmark index differs from a fresh scan"
            );
            ok = false;
        }
    }

    cur.reset();
    let mut lookup = Cursor::new(stream, &c.marks, None);
    let mut prev: Option<Vec<Id>> = None;
    while cur.next()? {
        let key = cur.key();
        if !lookup.seek(key)? || lookup.key() != key {
            error!(?key, "seek misses stored key");
            ok = false;
        }
        let before = lookup.seek_before(key)?;
        match &prev {
            None if before => {
                error!(?key, found = ?lookup.key(), "seek before first key found a record");
                ok = false;
            }
            Some(p) if !before || lookup.key() != p.as_slice() => {
                error!(?key, expected = ?p, "seek before misses previous key");
                ok = false;
            }
            _ => {}
        }
        prev = Some(key.to_vec());
    }

    debug!(count, ok, "validated stream");
    Ok(ok)
}
