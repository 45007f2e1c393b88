// A cube is stored as one byte stream of nested instructions, one level
// per dimension, in ascending key order:
//
//   [instr][element id][jump][value]
//
// - The instruction byte says which fields follow and how wide they are.
//   Element ids are 0, 1, 2 or 4 bytes; width 0 means "previous id + 1".
// - Every level but the last carries a 4-byte jump: the distance from the
//   instruction to the end of its subtree. Distances too large for the
//   field go to a side table of long jumps and the field holds an index.
// - The last level carries the value: absent, u8, i32, f32 or f64,
//   whichever is the narrowest that holds it exactly.
//
// A record only encodes the levels below the first one where its key
// differs from the previous record, so siblings share their prefix.
//
// The stream is cut into fixed-size pages. A record never straddles a
// page; the rest of a page that cannot hold the next record is padded
// with NOP bytes. For every page after the first a bookmark remembers the
// key and instruction offsets of the record just before it, which lets a
// cursor start decoding at any page.
//
// Commits merge a sorted batch of writes into the stream. Pages that lie
// entirely between two changes are copied as they are (the page buffers
// are shared, not duplicated) and only the pages around changes are
// re-encoded.

mod area;
mod bookmark;
mod codec;
mod config;
mod cursor;
mod fill;
mod instr;
mod ioutil;
mod merge;
mod page;
mod persist;
mod storage;
mod validate;
mod writer;


pub use area::Area;
pub use bookmark::Bookmark;
pub use codec::{compare_double, ValueKind};
pub use config::StorageConfig;
pub use cursor::{CellSource, Cursor};
pub use fill::FillCursor;
pub use page::CellStream;
pub use storage::{Storage, FILE_VERSION};
