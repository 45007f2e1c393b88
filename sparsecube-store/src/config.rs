use serde::{Deserialize, Serialize};
use sparsecube_base::{err, Result};

use crate::instr::max_record_len;

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bytes per page. Records never straddle a page, so a page must hold
    /// the longest record a cube of the given dimensionality can produce.
    pub page_size: usize,
    /// Jump fields at or above this value index the long-jump table.
    pub long_jump_threshold: u64,
    /// Commits against fewer committed values than this always rebuild.
    pub min_values_for_incremental: u64,
    /// Empty (NOP) space, in percent of the stream, that forces a rebuild.
    /// Also the per-run ratio above which a run of pages is re-encoded
    /// rather than copied.
    pub rebuild_empty_percent: u64,
    /// Runs of pages with fewer NOP bytes than this are always copyable.
    pub block_nop_limit: u64,
    /// Runs shorter than this many pages are re-encoded rather than copied.
    pub min_copy_pages: usize,
    pub index_enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            page_size: 16 * 1024,
            long_jump_threshold: 4_000_000_000,
            min_values_for_incremental: 1000,
            rebuild_empty_percent: 40,
            block_nop_limit: 100,
            min_copy_pages: 2,
            index_enabled: true,
        }
    }
}

impl StorageConfig {
    pub fn check(&self, dims: usize) -> Result<()> {
        if self.page_size < max_record_len(dims) {
            return Err(err("page size too small for dimension count"));
        }
        if self.long_jump_threshold == 0 || self.long_jump_threshold > u32::MAX as u64 {
            return Err(err("long jump threshold must fit a 32-bit jump field"));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(buf)?)
    }
}
