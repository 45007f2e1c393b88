use sparsecube_base::{err, Id, Result};
use tracing::debug;

use crate::{cursor::Cursor, page::CellStream};

/// A seek checkpoint at the start of a page: the key of the last record
/// before `pos` and the offsets of that record's instructions, one per
/// level. Bookmark `i` describes page `i + 1`.
#[derive(Clone, PartialEq, Eq, Debug, Hash, PartialOrd, Ord)]
pub struct Bookmark {
    pub pos: u64,
    pub key: Vec<Id>,
    pub offsets: Vec<u64>,
}

/// The last bookmark whose key is strictly below `target`. A bookmark whose
/// key equals `target` is no use: that record lies before the bookmark.
pub(crate) fn find(marks: &[Bookmark], target: &[Id]) -> Option<usize> {
    marks
        .partition_point(|b| b.key.as_slice() < target)
        .checked_sub(1)
}

/// Builds the index by walking the whole stream.
pub(crate) fn scan_index(stream: &CellStream) -> Result<Vec<Bookmark>> {
    let ps = stream.page_size as u64;
    let mut marks = Vec::with_capacity(stream.page_count().saturating_sub(1));
    let mut cur = Cursor::new(stream, &[], None);
    let mut prev: Option<(Vec<Id>, Vec<u64>, u64)> = None;
    while cur.next()? {
        let page = cur.record_start() / ps;
        match &prev {
            None if page != 0 => return Err(err("stream does not start with a record")),
            Some((key, offsets, prev_page)) => {
                for p in prev_page + 1..=page {
                    marks.push(Bookmark {
                        pos: p * ps,
                        key: key.clone(),
                        offsets: offsets.clone(),
                    });
                }
            }
            None => {}
        }
        prev = Some((cur.key().to_vec(), cur.offsets().to_vec(), page));
    }
    debug!(pages = stream.page_count(), marks = marks.len(), "scanned bookmark index");
    Ok(marks)
}
