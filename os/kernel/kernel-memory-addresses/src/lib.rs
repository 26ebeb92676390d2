//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw 32-bit memory addresses and page bases used
//! by the two-level paging code.
//!
//! ## Overview
//!
//! The whole point of this crate is that a physical address can never be
//! passed where a virtual one is expected (or the other way around) without
//! an explicit translation step. Everything is built from a few principal
//! types:
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//! | [`MemoryAddressOffset<S>`] | [`S: PageSize`](PageSize) | An offset within a page of size `S`. |
//!
//! These are then wrapped to distinguish between virtual and physical spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory or MMIO regions. |
//! | [`PhysicalRegion`] | An inclusive `[start, end]` range of physical bytes. |
//!
//! ## Page Sizes
//!
//! The two 32-bit (non-PAE) page sizes are supported via marker types that
//! implement [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, mapped by a page table entry
//! - [`Size4M`]: 4 MiB superpages, mapped directly by a page directory entry
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC012_3456);
//!
//! // Split it into a page base and an in-page offset
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xC012_3000);
//! assert_eq!(off.as_u32(), 0x456);
//!
//! // Join them back to the same address
//! assert_eq!(page.join(off), va);
//!
//! // Physical addresses behave the same way, but never compare to virtual ones.
//! let pa = PhysicalAddress::new(0x0012_3456);
//! assert_eq!(pa.page::<Size4M>().base().as_u32(), 0);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod memory_address_offset;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod physical_region;
mod virtual_address;
mod virtual_page;

pub use crate::memory_address::MemoryAddress;
pub use crate::memory_address_offset::MemoryAddressOffset;
pub use crate::memory_page::MemoryPage;
pub use crate::page_size::{PageSize, Size4K, Size4M};
pub use crate::physical_address::PhysicalAddress;
pub use crate::physical_page::PhysicalPage;
pub use crate::physical_region::PhysicalRegion;
pub use crate::virtual_address::VirtualAddress;
pub use crate::virtual_page::VirtualPage;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_4k() {
        let a = MemoryAddress::new(0x1234_5678);
        let (p, o) = a.split::<Size4K>();
        assert_eq!(p.base().as_u32(), 0x1234_5000);
        assert_eq!(o.as_u32(), 0x678);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn split_and_join_4m() {
        let a = MemoryAddress::new(0xC0AB_CDEF);
        let (p, o) = a.split::<Size4M>();
        assert_eq!(p.base().as_u32(), 0xC080_0000);
        assert_eq!(o.as_u32(), 0x2B_CDEF);
        assert_eq!(p.join(o), a);
    }

    #[test]
    fn virtual_vs_physical_wrappers() {
        let va = VirtualAddress::new(0xC000_1234);
        let (vp, vo) = va.split::<Size4K>();
        assert_eq!(vp.base().as_u32(), 0xC000_1000);
        assert_eq!(vo.as_u32(), 0x234);
        assert_eq!(vp.join(vo), va);

        let pa = PhysicalAddress::new(0x0020_0042);
        let (pp, po) = pa.split::<Size4K>();
        assert_eq!(pp.base().as_u32(), 0x0020_0000);
        assert_eq!(po.as_u32(), 0x42);
        assert_eq!(pp.join(po), pa);
    }

    #[test]
    fn alignment_helpers() {
        let a = MemoryAddress::new(0x12345);
        assert_eq!(a.align_down::<Size4K>().as_u32(), 0x12000);
        assert_eq!(a.page_end::<Size4K>().as_u32(), 0x12FFF);
        assert_eq!(a.page_up::<Size4K>().map(MemoryAddress::as_u32), Some(0x13000));
        assert_eq!(a.page_end_down::<Size4K>().map(MemoryAddress::as_u32), Some(0x11FFF));
    }

    #[test]
    fn rounding_at_the_edges() {
        assert_eq!(
            MemoryAddress::new(0x2000).page_up::<Size4K>(),
            Some(MemoryAddress::new(0x2000))
        );
        assert_eq!(MemoryAddress::new(0xFFFF_F001).page_up::<Size4K>(), None);

        assert_eq!(
            MemoryAddress::new(0x5FFF).page_end_down::<Size4K>(),
            Some(MemoryAddress::new(0x5FFF))
        );
        assert_eq!(
            MemoryAddress::new(u32::MAX).page_end_down::<Size4K>(),
            Some(MemoryAddress::new(u32::MAX))
        );
        assert_eq!(MemoryAddress::new(0x0FFE).page_end_down::<Size4K>(), None);
    }
}
