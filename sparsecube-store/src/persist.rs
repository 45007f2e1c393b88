use std::{
    io::{Read, Write},
    sync::Arc,
};

use sparsecube_base::{err, Id, Result};

use crate::{
    instr::max_record_len,
    ioutil::{ReadLeExt, WriteLeExt},
    page::{CellStream, Page},
    storage::Committed,
};

pub(crate) const TAG: &[u8; 4] = b"MDS1";
pub(crate) const MIN_FILE_VERSION: u32 = 1;
pub(crate) const MAX_FILE_VERSION: u32 = 2;

/// Pages with no more NOP bytes than this are left out of the NOP table.
const NOP_TABLE_MIN: u32 = 64;

const MAX_PAGE_SIZE: u64 = 1 << 30;

fn check_version(file_version: u32) -> Result<()> {
    if !(MIN_FILE_VERSION..=MAX_FILE_VERSION).contains(&file_version) {
        return Err(err(format!("unsupported file version {}", file_version)));
    }
    Ok(())
}

pub(crate) fn write_tag(wr: &mut impl Write) -> Result<()> {
    wr.write_all(TAG)?;
    Ok(())
}

pub(crate) fn read_and_check_tag(rd: &mut impl Read) -> Result<()> {
    let mut buf = [0_u8; 4];
    rd.read_exact(&mut buf)?;
    if buf != *TAG {
        return Err(err("bad storage tag"));
    }
    Ok(())
}

// Layout after the tag:
//   u64 page size, u64 page count, per page u32 length + bytes
//   u64 value count
//   u64 empty space
//   u64 count + (u32 page, u32 nops) per page with more than 64 NOPs
//   u64 count + (u32 id, u64 offset) per end-path level (u32 offset before v2)
//   v2+: u64 count + u64 per long jump
pub(crate) fn write_committed(c: &Committed, wr: &mut impl Write, file_version: u32) -> Result<()> {
    check_version(file_version)?;
    let stream = &c.stream;
    if file_version < 2 && !stream.long_jumps.is_empty() {
        return Err(err("long jumps need file version 2"));
    }
    write_tag(wr)?;
    wr.write_len(stream.page_size)?;
    wr.write_len(stream.page_count())?;
    for page in &stream.pages {
        wr.write_le_u32(page.data.len() as u32)?;
        wr.write_all(&page.data)?;
    }
    wr.write_le_u64(c.val_count)?;
    wr.write_le_u64(c.empty_space)?;

    let nop_pages: Vec<(u32, u32)> = stream
        .pages
        .iter()
        .enumerate()
        .filter(|(_, p)| p.nops > NOP_TABLE_MIN)
        .map(|(i, p)| (i as u32, p.nops))
        .collect();
    wr.write_len(nop_pages.len())?;
    for (page, nops) in nop_pages {
        wr.write_le_u32(page)?;
        wr.write_le_u32(nops)?;
    }

    wr.write_len(c.end_path.len())?;
    for &(id, off) in &c.end_path {
        wr.write_le_u32(id)?;
        if file_version < 2 {
            let off = u32::try_from(off).map_err(|_| err("end path offset needs file version 2"))?;
            wr.write_le_u32(off)?;
        } else {
            wr.write_le_u64(off)?;
        }
    }

    if file_version >= 2 {
        wr.write_len(stream.long_jumps.len())?;
        for j in &stream.long_jumps {
            wr.write_le_u64(*j)?;
        }
    }
    Ok(())
}

pub(crate) struct Loaded {
    pub(crate) stream: CellStream,
    pub(crate) val_count: u64,
    pub(crate) empty_space: u64,
    pub(crate) end_path: Vec<(Id, u64)>,
}

pub(crate) fn read_committed(
    rd: &mut impl Read,
    dims: usize,
    threshold: u64,
    file_version: u32,
) -> Result<Loaded> {
    check_version(file_version)?;
    read_and_check_tag(rd)?;
    let page_size = rd.read_len(MAX_PAGE_SIZE)?;
    if page_size < max_record_len(dims) {
        return Err(err("stored page size too small for dimension count"));
    }
    let page_count = rd.read_len(u32::MAX as u64)?;
    let mut stream = CellStream::new(dims, page_size, threshold);
    for i in 0..page_count {
        let len = rd.read_le_u32()? as usize;
        if len > page_size || (i + 1 < page_count && len != page_size) || len == 0 {
            return Err(err(format!("page {} has bad length {}", i, len)));
        }
        let data = rd.read_bytes(len)?;
        stream.pages.push(Arc::new(Page { data, nops: 0 }));
    }
    let val_count = rd.read_le_u64()?;
    let empty_space = rd.read_le_u64()?;

    let nop_pages = rd.read_len(page_count as u64)?;
    for _ in 0..nop_pages {
        let page = rd.read_le_u32()? as usize;
        let nops = rd.read_le_u32()?;
        match stream.pages.get_mut(page) {
            Some(p) if nops as usize <= page_size => Arc::make_mut(p).nops = nops,
            _ => return Err(err(format!("bad NOP table entry for page {}", page))),
        }
    }

    let levels = rd.read_len(dims as u64)?;
    if levels != 0 && levels != dims {
        return Err(err("end path has wrong dimension count"));
    }
    let mut end_path = Vec::with_capacity(levels);
    for _ in 0..levels {
        let id = rd.read_le_u32()?;
        let off = if file_version < 2 {
            rd.read_le_u32()? as u64
        } else {
            rd.read_le_u64()?
        };
        end_path.push((id, off));
    }

    if file_version >= 2 {
        let count = rd.read_len(u32::MAX as u64)?;
        let mut long_jumps = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            long_jumps.push(rd.read_le_u64()?);
        }
        stream.long_jumps = long_jumps;
    }
    Ok(Loaded {
        stream,
        val_count,
        empty_space,
        end_path,
    })
}
