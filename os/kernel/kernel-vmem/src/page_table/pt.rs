//! # Page Table (PT)
//!
//! The second and last level of 32-bit paging.
//!
//! - [`PtIndex`]: index type for virtual-address bits `[21:12]`.
//! - [`Pte`]: bit layout of a page table entry.
//! - [`PtEntry`]: one entry, empty or mapping a single 4 KiB page.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 entries.
//!
//! After modifying active mappings, the caller must perform any required TLB
//! maintenance. This kernel only ever reloads CR3.

use crate::page_table::ENTRIES;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Index into a Page Table (virtual-address bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PtIndex(u16);

impl PtIndex {
    /// Extract bits `[21:12]` of `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> Size4K::SHIFT) & 0x3FF) as u16)
    }

    /// Construct from a raw value.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Page table entry bits.
///
/// Bits 12..31 hold the physical page base; the low 12 bits are flags.
#[doc(alias = "PTE")]
#[bitfield(u32)]
pub struct Pte {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2): accessible from ring 3.
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5), set by the CPU.
    pub accessed: bool,
    /// Dirty (bit 6), set by the CPU on the first write.
    pub dirty: bool,
    /// PAT (bit 7).
    pub pat: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// Physical page base >> 12.
    #[bits(20)]
    phys_addr_31_12: u32,
}

impl Pte {
    /// Leaf flags for pages reachable from user mode: present, writable, user.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new().with_present(true).with_writable(true).with_user(true)
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, page: PhysicalPage<Size4K>) -> Self {
        self.set_physical_page(page);
        self
    }

    #[inline]
    pub const fn set_physical_page(&mut self, page: PhysicalPage<Size4K>) {
        self.set_phys_addr_31_12(page.base().as_u32() >> Size4K::SHIFT);
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.phys_addr_31_12() << Size4K::SHIFT))
    }
}

/// A single Page Table entry.
#[repr(transparent)]
#[derive(Copy, Clone, Debug)]
pub struct PtEntry(Pte);

impl PtEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(Pte::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// If present, return the mapped 4 KiB physical page and its flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage<Size4K>, Pte)> {
        if !self.is_present() {
            return None;
        }
        Some((self.0.physical_page(), self.0))
    }

    /// Create a present 4 KiB mapping of `page` with `flags`.
    #[inline]
    #[must_use]
    pub const fn make_4k(page: PhysicalPage<Size4K>, flags: Pte) -> Self {
        Self(flags.with_present(true).with_physical_page(page))
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0.into_bits()
    }

    /// No validation is performed.
    #[inline]
    #[must_use]
    pub const fn from_bits(v: u32) -> Self {
        Self(Pte::from_bits(v))
    }
}

/// The Page Table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; ENTRIES],
}

impl PageTable {
    /// Create a fully zeroed Page Table (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PtIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: PtIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> PtIndex {
        PtIndex::from(va)
    }

    /// Iterate all entries with their index, present or not.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (PtIndex, PtEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (PtIndex::new(i as u16), *e))
    }
}
