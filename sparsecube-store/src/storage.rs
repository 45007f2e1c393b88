use std::{
    collections::{btree_map::Entry, BTreeMap},
    io::{Read, Write},
    sync::Arc,
};

use sparsecube_base::{err, Id, Result, DIM_MAX, NO_ID};
use tracing::{debug, info, warn};

use crate::{
    area::Area,
    bookmark::{scan_index, Bookmark},
    codec::{StringTable, ValueCodec, ValueKind},
    config::StorageConfig,
    cursor::Cursor,
    fill::FillCursor,
    ioutil::{ReadLeExt, WriteLeExt},
    merge::{self, Change, MergeParams},
    page::CellStream,
    persist, validate,
};

/// Newest layout `save` can write.
pub const FILE_VERSION: u32 = persist::MAX_FILE_VERSION;

const MAX_STRING_TABLE: u64 = 1 << 32;

/// The state readers see: a stream, its index and its bookkeeping. Commits
/// build a new one and swap it in whole.
#[derive(Clone, Debug)]
pub(crate) struct Committed {
    pub(crate) stream: CellStream,
    pub(crate) marks: Arc<Vec<Bookmark>>,
    /// Id and instruction offset of the last record, per level.
    pub(crate) end_path: Vec<(Id, u64)>,
    pub(crate) val_count: u64,
    pub(crate) empty_space: u64,
    /// Deletions since the last rebuild.
    pub(crate) del_count: u64,
}

impl Committed {
    fn empty(dims: usize, config: &StorageConfig) -> Self {
        Committed {
            stream: CellStream::new(dims, config.page_size, config.long_jump_threshold),
            marks: Arc::new(Vec::new()),
            end_path: Vec::new(),
            val_count: 0,
            empty_space: 0,
            del_count: 0,
        }
    }
}

/// A sparse cube of doubles addressed by one element id per dimension.
///
/// Writes are buffered until `commit`, which folds them into the encoded
/// stream either by rewriting it or by copying the untouched pages and
/// re-encoding only the ones around the changes. Reads only ever see
/// committed data. Cloning is cheap (pages are shared) and gives an
/// independent snapshot.
#[derive(Clone, Debug)]
pub struct Storage {
    config: StorageConfig,
    codec: ValueCodec,
    committed: Committed,
    pending: BTreeMap<Vec<Id>, Change>,
}

impl Storage {
    pub fn new(kind: ValueKind, dims: usize, config: StorageConfig) -> Result<Self> {
        if dims == 0 || dims > DIM_MAX {
            return Err(err(format!("dimension count {} out of range", dims)));
        }
        config.check(dims)?;
        let committed = Committed::empty(dims, &config);
        Ok(Storage {
            config,
            codec: ValueCodec::new(kind),
            committed,
            pending: BTreeMap::new(),
        })
    }

    pub fn dims(&self) -> usize {
        self.committed.stream.dims
    }

    pub fn kind(&self) -> ValueKind {
        self.codec.kind()
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Markers only ever hold 1.0, so their streams are not worth indexing.
    pub fn index_enabled(&self) -> bool {
        self.config.index_enabled && self.kind() != ValueKind::Marker
    }

    fn check_key(&self, key: &[Id]) -> Result<()> {
        if key.len() != self.dims() {
            return Err(err(format!(
                "key has {} elements, cube has {} dimensions",
                key.len(),
                self.dims()
            )));
        }
        if key.contains(&NO_ID) {
            return Err(err("NO_ID is not a valid element"));
        }
        Ok(())
    }

    /// Buffers a write; 0.0 deletes the cell. On a marker cube any nonzero
    /// value sets the marker.
    pub fn set_cell(&mut self, key: &[Id], val: f64) -> Result<()> {
        self.check_key(key)?;
        if val.is_nan() {
            return Err(err("NaN cannot be stored"));
        }
        let val = match self.kind() {
            ValueKind::Numeric => val,
            ValueKind::Marker if val != 0.0 => 1.0,
            ValueKind::Marker => 0.0,
            ValueKind::Strings => return Err(err("set_cell on a string cube")),
        };
        self.pending.insert(key.to_vec(), Change::Set(val));
        Ok(())
    }

    /// Buffers an addition to whatever the cell holds at commit time.
    pub fn add_cell(&mut self, key: &[Id], delta: f64) -> Result<()> {
        self.check_key(key)?;
        if self.kind() != ValueKind::Numeric {
            return Err(err("add_cell needs a numeric cube"));
        }
        if delta.is_nan() {
            return Err(err("NaN cannot be stored"));
        }
        match self.pending.entry(key.to_vec()) {
            Entry::Vacant(e) => {
                e.insert(Change::Add(delta));
            }
            Entry::Occupied(mut e) => {
                let next = match *e.get() {
                    Change::Set(v) => Change::Set(v + delta),
                    Change::Add(d) => Change::Add(d + delta),
                };
                e.insert(next);
            }
        }
        Ok(())
    }

    /// Buffers a string write; the empty string deletes the cell.
    pub fn set_string(&mut self, key: &[Id], s: &str) -> Result<()> {
        self.check_key(key)?;
        let table = match &mut self.codec {
            ValueCodec::Strings(table) => table,
            _ => return Err(err("set_string needs a string cube")),
        };
        let val = if s.is_empty() { 0.0 } else { table.intern(s)? };
        self.pending.insert(key.to_vec(), Change::Set(val));
        Ok(())
    }

    pub fn set_marker(&mut self, key: &[Id], on: bool) -> Result<()> {
        if self.kind() != ValueKind::Marker {
            return Err(err("set_marker needs a marker cube"));
        }
        self.set_cell(key, if on { 1.0 } else { 0.0 })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops every buffered write.
    pub fn rollback(&mut self) {
        debug!(dropped = self.pending.len(), "rolled back pending writes");
        self.pending.clear();
    }

    fn params(&self) -> MergeParams<'_> {
        MergeParams {
            config: &self.config,
            compress: self.codec.compress(),
            tolerant: self.codec.tolerant(),
            index: self.index_enabled(),
        }
    }

    /// Applies the buffered writes. Returns whether the committed state
    /// changed. On error the buffer is kept and nothing is applied.
    pub fn commit(&mut self) -> Result<bool> {
        if self.pending.is_empty() {
            return Ok(false);
        }
        let next = merge::commit(&self.committed, &self.pending, &self.params())?;
        self.pending.clear();
        match next {
            Some(next) => {
                self.committed = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-encodes the committed stream from scratch, dropping all padding
    /// and long jumps.
    pub fn rebuild(&mut self) -> Result<()> {
        if self.committed.stream.is_empty() {
            return Ok(());
        }
        let next = merge::rebuild(&self.committed, &self.params())?;
        info!(
            old_len = self.committed.stream.len(),
            new_len = next.stream.len(),
            "rebuilt storage"
        );
        self.committed = next;
        Ok(())
    }

    /// The committed value of a cell, 0.0 if absent.
    pub fn get_cell(&self, key: &[Id]) -> Result<f64> {
        self.check_key(key)?;
        if self.committed.stream.is_empty() {
            return Ok(0.0);
        }
        let mut cur = Cursor::new(&self.committed.stream, &self.committed.marks, None);
        if cur.seek(key)? {
            Ok(cur.value())
        } else {
            Ok(0.0)
        }
    }

    pub fn get_string(&self, key: &[Id]) -> Result<Option<&str>> {
        let table = match &self.codec {
            ValueCodec::Strings(table) => table,
            _ => return Err(err("get_string needs a string cube")),
        };
        match self.get_cell(key)? {
            v if v == 0.0 => Ok(None),
            v => table.get(v).map(Some),
        }
    }

    pub fn has_marker(&self, key: &[Id]) -> Result<bool> {
        Ok(self.get_cell(key)? != 0.0)
    }

    /// Number of distinct strings ever interned.
    pub fn string_count(&self) -> usize {
        match &self.codec {
            ValueCodec::Strings(table) => table.len(),
            _ => 0,
        }
    }

    fn check_area(&self, area: &Area) -> Result<()> {
        if area.dims() != self.dims() {
            return Err(err("area has wrong dimension count"));
        }
        Ok(())
    }

    /// A cursor over the committed cells, optionally restricted to `area`.
    pub fn cursor<'a>(&'a self, area: Option<&'a Area>) -> Result<Cursor<'a>> {
        if let Some(area) = area {
            self.check_area(area)?;
        }
        Ok(Cursor::new(&self.committed.stream, &self.committed.marks, area))
    }

    /// A cursor over every cell of `area`, yielding `default` for the
    /// cells that hold nothing.
    pub fn fill_cursor<'a>(&'a self, area: &'a Area, default: f64) -> Result<FillCursor<'a>> {
        let inner = self.cursor(Some(area))?;
        Ok(FillCursor::new(inner, area, default))
    }

    pub fn value_count(&self) -> u64 {
        self.committed.val_count
    }

    /// NOP padding bytes in the stream.
    pub fn empty_space(&self) -> u64 {
        self.committed.empty_space
    }

    pub fn del_count(&self) -> u64 {
        self.committed.del_count
    }

    pub fn page_count(&self) -> usize {
        self.committed.stream.page_count()
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        &self.committed.marks
    }

    pub fn stream(&self) -> &CellStream {
        &self.committed.stream
    }

    /// Writes the committed state. Buffered writes are not saved.
    pub fn save(&self, wr: &mut impl Write, file_version: u32) -> Result<()> {
        if !self.pending.is_empty() {
            warn!(pending = self.pending.len(), "saving with uncommitted writes");
        }
        persist::write_committed(&self.committed, wr, file_version)?;
        if let ValueCodec::Strings(table) = &self.codec {
            let blob = table.to_bytes()?;
            wr.write_len(blob.len())?;
            wr.write_all(&blob)?;
        }
        debug!(
            file_version,
            pages = self.page_count(),
            values = self.value_count(),
            "saved storage"
        );
        Ok(())
    }

    /// Reads a storage written by `save`. The bookmark index is not stored;
    /// it is rebuilt here.
    pub fn load(
        rd: &mut impl Read,
        kind: ValueKind,
        dims: usize,
        config: StorageConfig,
        file_version: u32,
    ) -> Result<Self> {
        let mut storage = Storage::new(kind, dims, config)?;
        let loaded = persist::read_committed(rd, dims, storage.config.long_jump_threshold, file_version)?;
        if loaded.stream.page_size != storage.config.page_size {
            info!(
                stored = loaded.stream.page_size,
                configured = storage.config.page_size,
                "using stored page size"
            );
            storage.config.page_size = loaded.stream.page_size;
        }
        let marks = if storage.index_enabled() {
            scan_index(&loaded.stream)?
        } else {
            Vec::new()
        };
        storage.committed = Committed {
            stream: loaded.stream,
            marks: Arc::new(marks),
            end_path: loaded.end_path,
            val_count: loaded.val_count,
            empty_space: loaded.empty_space,
            del_count: 0,
        };
        if let ValueCodec::Strings(table) = &mut storage.codec {
            let len = rd.read_len(MAX_STRING_TABLE)?;
            *table = StringTable::from_bytes(&rd.read_bytes(len)?)?;
        }
        debug!(
            file_version,
            pages = storage.page_count(),
            values = storage.value_count(),
            "loaded storage"
        );
        Ok(storage)
    }

    /// Checks the committed stream's structure; problems are logged.
    pub fn validate(&self) -> Result<bool> {
        validate::validate(&self.committed, self.index_enabled())
    }
}
