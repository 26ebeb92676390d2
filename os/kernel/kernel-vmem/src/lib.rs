//! # Virtual Memory Support
//!
//! Two-level x86 paging (32-bit, no PAE) for a small protected-mode kernel.
//!
//! ## What you get
//! - Typed [`PageDirectory`] / [`PageTable`] layouts with `bitfield-struct`
//!   entry formats ([`Pde`], [`Pde4M`], [`Pte`]) and a decoded [`PdEntryKind`].
//! - An [`AddressSpace`] that owns one directory: it is created with a
//!   permanent superpage window over low physical memory and grows page tables
//!   on demand as single 4 KiB pages are mapped.
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Virtual Address → Physical Address Walk
//!
//! ```text
//!  CR3 ─► PD ──┬─► PDE (PS=1) ───────────────► 4 MiB superpage
//!              └─► PDE (PS=0) ─► PT ─► PTE ──► 4 KiB page
//! ```
//!
//! | Bits  | Field  | Selects                          |
//! |:------|:-------|:---------------------------------|
//! | 31‒22 | PD     | one of 1024 directory entries    |
//! | 21‒12 | PT     | one of 1024 table entries        |
//! | 11‒0  | Offset | byte within the 4 KiB page       |
//!
//! For a superpage the low 22 bits are the offset.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod address_space;
pub mod page_table;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub use crate::address_space::{AddressSpace, MapError};
pub use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex, Pde, Pde4M};
pub use crate::page_table::pt::{PageTable, PtEntry, PtIndex, Pte};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// Source of **physical** 4 KiB frames for page directories and tables.
///
/// Returned frames must be 4 KiB aligned and zero-filled.
pub trait FrameAlloc {
    /// Allocate one 4 KiB physical frame.
    ///
    /// # Errors
    /// [`FrameAllocError::Exhausted`] once no whole page is left.
    fn alloc_4k(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameAllocError {
    #[error("could not allocate a page of data, not enough memory")]
    Exhausted,
}

/// Converts physical addresses to usable references in the current virtual
/// address space (identity map, higher-half window, or simulated RAM in tests).
pub trait PhysMapper {
    /// Convert a *physical* address to a mutable reference.
    ///
    /// # Safety
    /// - `pa` must be reachable and writable through the current translation.
    /// - Type `T` must match the bytes at `pa` and fit before the end of
    ///   the reachable memory.
    /// - The caller must not create overlapping `&mut` to the same bytes.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Typed access to paging frames through any [`PhysMapper`].
pub trait PhysMapperExt: PhysMapper {
    /// Borrow the frame in `page` as a [`PageDirectory`].
    #[inline]
    fn pd_mut(&self, page: PhysicalPage<Size4K>) -> &mut PageDirectory {
        unsafe { self.phys_to_mut::<PageDirectory>(page.base()) }
    }

    /// Borrow the frame in `page` as a [`PageTable`].
    #[inline]
    fn pt_mut(&self, page: PhysicalPage<Size4K>) -> &mut PageTable {
        unsafe { self.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Fill the frame in `page` with zeros.
    #[inline]
    fn zero_page(&self, page: PhysicalPage<Size4K>) {
        let bytes = unsafe { self.phys_to_mut::<[u8; Size4K::SIZE as usize]>(page.base()) };
        bytes.fill(0);
    }
}

impl<M: PhysMapper + ?Sized> PhysMapperExt for M {}
