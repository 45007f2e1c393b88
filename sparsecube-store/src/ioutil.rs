use std::io::{Read, Write};

use sparsecube_base::{err, Result};

pub(crate) trait WriteLeExt: Write {
    fn write_le_u32(&mut self, v: u32) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }
    fn write_le_u64(&mut self, v: u64) -> Result<()> {
        self.write_all(&v.to_le_bytes())?;
        Ok(())
    }
    fn write_len(&mut self, len: usize) -> Result<()> {
        self.write_le_u64(len as u64)
    }
}

impl<W: Write + ?Sized> WriteLeExt for W {}

pub(crate) trait ReadLeExt: Read {
    fn read_le_u32(&mut self) -> Result<u32> {
        let mut buf = [0_u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
    fn read_le_u64(&mut self) -> Result<u64> {
        let mut buf = [0_u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }
    /// Reads a length that must not exceed `max`.
    fn read_len(&mut self, max: u64) -> Result<usize> {
        let len = self.read_le_u64()?;
        if len > max {
            return Err(err(format!("length {} exceeds limit {}", len, max)));
        }
        usize::try_from(len).map_err(|_| err("length does not fit in memory"))
    }
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0_u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

impl<R: Read + ?Sized> ReadLeExt for R {}
