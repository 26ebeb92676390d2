//! # 32-bit Page Tables
//!
//! Without PAE, a 32-bit virtual address is split in three:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! Both levels hold 1024 four-byte entries and fill exactly one 4 KiB page.
//! A directory entry either points at a [`PageTable`](pt::PageTable) or, with
//! the PS bit set (and `CR4.PSE` enabled), maps a 4 MiB superpage directly.

pub mod pd;
pub mod pt;

use kernel_memory_addresses::VirtualAddress;
use pd::PdIndex;
use pt::PtIndex;

/// Number of entries in a page directory or page table.
pub const ENTRIES: usize = 1024;

/// Present bit (bit 0), identical in every entry format.
const PRESENT_BIT: u32 = 1 << 0;

/// Page Size bit (bit 7). Only meaningful in a directory entry.
const PS_BIT: u32 = 1 << 7;

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from(va), PtIndex::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_ok() {
        let (pd, pt) = split_indices(VirtualAddress::new(0xC040_1234));
        assert_eq!(pd.as_usize(), 0x301);
        assert_eq!(pt.as_usize(), 0x001);

        let (pd, pt) = split_indices(VirtualAddress::new(0xFFFF_FFFF));
        assert_eq!(pd.as_usize(), ENTRIES - 1);
        assert_eq!(pt.as_usize(), ENTRIES - 1);
    }

    #[test]
    fn tables_fill_one_page() {
        assert_eq!(size_of::<pd::PageDirectory>(), 4096);
        assert_eq!(align_of::<pd::PageDirectory>(), 4096);
        assert_eq!(size_of::<pt::PageTable>(), 4096);
        assert_eq!(align_of::<pt::PageTable>(), 4096);
    }
}
