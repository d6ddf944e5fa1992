//! A flat block of bytes where every byte carries its own known-mask.

use serde::{Deserialize, Serialize};

use crate::value::{PartialInteger, Word};
use crate::Error;

/// A contiguous block of unmanaged memory, as produced by `localloc` or
/// handed to the interpreter by a caller.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MemoryBlock {
    data: Vec<u8>,
    known: Vec<u8>,
}

impl MemoryBlock {
    /// Create a zero-filled block where every byte is known.
    pub fn new(size: usize) -> MemoryBlock {
        MemoryBlock {
            data: vec![0; size],
            known: vec![0xff; size],
        }
    }

    /// Create a block whose contents are entirely unknown.
    pub fn uninitialized(size: usize) -> MemoryBlock {
        MemoryBlock {
            data: vec![0; size],
            known: vec![0; size],
        }
    }

    /// Create a fully known block holding `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> MemoryBlock {
        MemoryBlock {
            data: bytes.to_vec(),
            known: vec![0xff; bytes.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn known(&self) -> &[u8] {
        &self.known
    }

    fn range(&self, offset: i64, size: usize) -> Result<std::ops::Range<usize>, Error> {
        let out_of_bounds = Error::MemoryAccessOutOfBounds { offset, size };
        if offset < 0 {
            return Err(out_of_bounds);
        }
        let start = offset as usize;
        match start.checked_add(size) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(out_of_bounds),
        }
    }

    /// Copy `bits.len()` bytes starting at `offset` into `bits` and their
    /// known-masks into `mask`, which must be at least as long as `bits`.
    pub fn read_bytes(&self, offset: i64, bits: &mut [u8], mask: &mut [u8]) -> Result<(), Error> {
        if mask.len() < bits.len() {
            return Err(Error::Custom(format!(
                "mask of {} bytes cannot hold a read of {}",
                mask.len(),
                bits.len()
            )));
        }
        let range = self.range(offset, bits.len())?;
        bits.copy_from_slice(&self.data[range.clone()]);
        mask[..bits.len()].copy_from_slice(&self.known[range]);
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: i64, bits: &[u8], mask: &[u8]) -> Result<(), Error> {
        let range = self.range(offset, bits.len())?;
        for (i, index) in range.enumerate() {
            let known = mask.get(i).copied().unwrap_or(0);
            self.data[index] = bits[i] & known;
            self.known[index] = known;
        }
        Ok(())
    }

    pub fn read_integer<T: Word>(&self, offset: i64) -> Result<PartialInteger<T>, Error> {
        let size = (T::BITS / 8) as usize;
        let mut bits = vec![0; size];
        let mut mask = vec![0; size];
        self.read_bytes(offset, &mut bits, &mut mask)?;
        Ok(PartialInteger::from_le_bytes(&bits, &mask))
    }

    pub fn write_integer<T: Word>(&mut self, offset: i64, value: &PartialInteger<T>) -> Result<(), Error> {
        let (bits, mask) = value.to_le_bytes();
        self.write_bytes(offset, &bits, &mask)
    }

    /// Forget the contents of `size` bytes starting at `offset`.
    pub fn mark_unknown(&mut self, offset: i64, size: usize) -> Result<(), Error> {
        let range = self.range(offset, size)?;
        for index in range {
            self.data[index] = 0;
            self.known[index] = 0;
        }
        Ok(())
    }
}
