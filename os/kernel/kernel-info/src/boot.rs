//! # Boot Data
//!
//! The loader leaves a small block at [`BOOT_DATA_ADDRESS`](crate::memory::BOOT_DATA_ADDRESS)
//! holding four physical pointers. Two of them reference count-prefixed
//! tables of `u32` words:
//!
//! ```text
//! headers: [n, start0, end0, entry0, start1, end1, entry1, ...]
//! mmap:    [n, start0, end0, start1, end1, ...]
//! ```
//!
//! All ranges are inclusive. The other two pointers reference NUL-terminated
//! strings (the boot command line and the image line).
//!
//! Nothing here touches memory on its own. The kernel resolves the pointers
//! through its physical window and hands the resulting word slices to
//! [`HeaderTable::parse`] and [`MemoryMapTable::parse`].

use core::ffi::CStr;
use kernel_memory_addresses::{PhysicalAddress, PhysicalRegion, VirtualAddress};

/// The raw block found at the boot data address.
#[repr(C)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootDataRaw {
    /// Physical address of the loaded-image header table.
    pub headers: u32,
    /// Physical address of the memory map table.
    pub mmap: u32,
    /// Physical address of the command line string.
    pub cmdline: u32,
    /// Physical address of the image line string.
    pub imgline: u32,
}

impl BootDataRaw {
    #[must_use]
    pub const fn headers(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.headers)
    }

    #[must_use]
    pub const fn mmap(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.mmap)
    }

    #[must_use]
    pub const fn cmdline(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.cmdline)
    }

    #[must_use]
    pub const fn imgline(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.imgline)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootDataError {
    #[error("{table} table is truncated: {needed} words needed, {available} available")]
    Truncated {
        table: &'static str,
        needed: usize,
        available: usize,
    },
    #[error("no loaded image with index {index} ({count} headers present)")]
    MissingHeader { index: usize, count: usize },
}

/// One loaded image: where it sits in physical memory and where it starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HeaderRange {
    pub start: PhysicalAddress,
    /// Last byte of the image.
    pub end: PhysicalAddress,
    /// Entry point, valid once the image is mapped at its load address.
    pub entry: VirtualAddress,
}

impl HeaderRange {
    #[must_use]
    pub const fn region(&self) -> PhysicalRegion {
        PhysicalRegion::new(self.start, self.end)
    }

    /// Offset of the entry point from the image start.
    #[must_use]
    pub const fn entry_offset(&self) -> u32 {
        self.entry.as_u32().wrapping_sub(self.start.as_u32())
    }
}

/// One range of usable RAM as reported by the firmware.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRange {
    pub start: PhysicalAddress,
    /// Last byte of the range.
    pub end: PhysicalAddress,
}

impl MemoryRange {
    #[must_use]
    pub const fn region(&self) -> PhysicalRegion {
        PhysicalRegion::new(self.start, self.end)
    }
}

/// Words taken by a table of `count` records of `stride` words, count included.
///
/// Computed in 32 bits so a garbage count is rejected the same way on every
/// target.
const fn table_words(
    table: &'static str,
    count: u32,
    stride: u32,
) -> Result<usize, BootDataError> {
    match count.checked_mul(stride) {
        Some(n) if n < u32::MAX => Ok(n as usize + 1),
        _ => Err(BootDataError::Truncated {
            table,
            needed: usize::MAX,
            available: 0,
        }),
    }
}

/// Split a count-prefixed table into its record words.
fn records<'a>(
    table: &'static str,
    words: &'a [u32],
    stride: u32,
) -> Result<&'a [u32], BootDataError> {
    let Some(&count) = words.first() else {
        return Err(BootDataError::Truncated {
            table,
            needed: 1,
            available: 0,
        });
    };
    let needed = table_words(table, count, stride)?;
    words.get(1..needed).ok_or(BootDataError::Truncated {
        table,
        needed,
        available: words.len(),
    })
}

/// Loaded-image headers, three words per record.
#[derive(Copy, Clone, Debug)]
pub struct HeaderTable<'a> {
    words: &'a [u32],
}

impl<'a> HeaderTable<'a> {
    const STRIDE: u32 = 3;
    const NAME: &'static str = "header";

    /// Parse a header table starting at its count word.
    ///
    /// # Errors
    /// [`BootDataError::Truncated`] if `words` is shorter than the count claims.
    pub fn parse(words: &'a [u32]) -> Result<Self, BootDataError> {
        Ok(Self {
            words: records(Self::NAME, words, Self::STRIDE)?,
        })
    }

    /// Number of words occupied by a table with `count` records, count included.
    ///
    /// # Errors
    /// [`BootDataError::Truncated`] if no table that large fits in 32 bits.
    pub const fn words_for(count: u32) -> Result<usize, BootDataError> {
        table_words(Self::NAME, count, Self::STRIDE)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.words.len() / Self::STRIDE as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<HeaderRange> {
        self.words
            .chunks_exact(Self::STRIDE as usize)
            .nth(index)
            .map(Self::decode)
    }

    pub fn iter(&self) -> impl Iterator<Item = HeaderRange> + 'a {
        self.words.chunks_exact(Self::STRIDE as usize).map(Self::decode)
    }

    /// The header at `index`, or [`BootDataError::MissingHeader`].
    ///
    /// # Errors
    /// If fewer than `index + 1` images were loaded.
    pub fn require(&self, index: usize) -> Result<HeaderRange, BootDataError> {
        self.get(index).ok_or(BootDataError::MissingHeader {
            index,
            count: self.len(),
        })
    }

    fn decode(rec: &[u32]) -> HeaderRange {
        HeaderRange {
            start: PhysicalAddress::new(rec[0]),
            end: PhysicalAddress::new(rec[1]),
            entry: VirtualAddress::new(rec[2]),
        }
    }
}

/// Memory map ranges, two words per record.
#[derive(Copy, Clone, Debug)]
pub struct MemoryMapTable<'a> {
    words: &'a [u32],
}

impl<'a> MemoryMapTable<'a> {
    const STRIDE: u32 = 2;
    const NAME: &'static str = "memory map";

    /// Parse a memory map table starting at its count word.
    ///
    /// # Errors
    /// [`BootDataError::Truncated`] if `words` is shorter than the count claims.
    pub fn parse(words: &'a [u32]) -> Result<Self, BootDataError> {
        Ok(Self {
            words: records(Self::NAME, words, Self::STRIDE)?,
        })
    }

    /// Number of words occupied by a table with `count` records, count included.
    ///
    /// # Errors
    /// [`BootDataError::Truncated`] if no table that large fits in 32 bits.
    pub const fn words_for(count: u32) -> Result<usize, BootDataError> {
        table_words(Self::NAME, count, Self::STRIDE)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.words.len() / Self::STRIDE as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MemoryRange> + 'a {
        self.words.chunks_exact(Self::STRIDE as usize).map(|rec| MemoryRange {
            start: PhysicalAddress::new(rec[0]),
            end: PhysicalAddress::new(rec[1]),
        })
    }
}

/// Parsed boot data.
#[derive(Copy, Clone, Debug)]
pub struct BootData<'a> {
    pub headers: HeaderTable<'a>,
    pub mmap: MemoryMapTable<'a>,
    pub cmdline: &'a CStr,
    pub imgline: &'a CStr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers() {
        let words = [
            3, 0x0010_0000, 0x0010_3fff, 0x0010_0000, 0x0010_4000, 0x0010_4fff, 0x0010_4000,
            0x0010_5000, 0x0010_6fff, 0x0010_5020,
        ];
        let table = HeaderTable::parse(&words).expect("valid table");
        assert_eq!(table.len(), 3);
        let user = table.require(2).expect("user image");
        assert_eq!(user.start, PhysicalAddress::new(0x0010_5000));
        assert_eq!(user.end, PhysicalAddress::new(0x0010_6fff));
        assert_eq!(user.entry, VirtualAddress::new(0x0010_5020));
        assert_eq!(user.entry_offset(), 0x20);
        assert_eq!(table.iter().count(), 3);
        assert_eq!(HeaderTable::words_for(3), Ok(words.len()));
    }

    #[test]
    fn missing_header() {
        let words = [1, 0x1000, 0x1fff, 0x1000];
        let table = HeaderTable::parse(&words).expect("valid table");
        assert_eq!(
            table.require(2),
            Err(BootDataError::MissingHeader { index: 2, count: 1 })
        );
    }

    #[test]
    fn parse_memory_map_ignores_trailing_words() {
        let words = [2, 0, 0x9_fbff, 0x0010_0000, 0x07fd_ffff, 0xdead_beef];
        let mmap = MemoryMapTable::parse(&words).expect("valid table");
        let ranges: [MemoryRange; 2] = {
            let mut it = mmap.iter();
            [it.next().expect("first"), it.next().expect("second")]
        };
        assert_eq!(ranges[0].end, PhysicalAddress::new(0x9_fbff));
        assert_eq!(ranges[1].region().pages(), (0x07fe_0000 - 0x0010_0000) / 4096);
        assert_eq!(mmap.len(), 2);
    }

    #[test]
    fn truncated_tables_are_rejected() {
        assert_eq!(
            MemoryMapTable::parse(&[2, 0, 0xfff]).map(|t| t.len()),
            Err(BootDataError::Truncated {
                table: "memory map",
                needed: 5,
                available: 3
            })
        );
        assert!(matches!(
            HeaderTable::parse(&[]),
            Err(BootDataError::Truncated { needed: 1, .. })
        ));
    }

    #[test]
    fn oversized_counts_are_rejected() {
        assert_eq!(MemoryMapTable::words_for(0x7FFF_FFFE), Ok(0xFFFF_FFFD));
        assert_eq!(
            HeaderTable::words_for(0x5555_5555),
            Err(BootDataError::Truncated {
                table: "header",
                needed: usize::MAX,
                available: 0
            })
        );
        assert!(matches!(
            MemoryMapTable::parse(&[0xFFFF_FFFF, 0, 0xfff]),
            Err(BootDataError::Truncated {
                table: "memory map",
                needed: usize::MAX,
                ..
            })
        ));
    }

    #[test]
    fn empty_table() {
        let mmap = MemoryMapTable::parse(&[0]).expect("valid table");
        assert!(mmap.is_empty());
        assert_eq!(mmap.iter().count(), 0);
    }
}
