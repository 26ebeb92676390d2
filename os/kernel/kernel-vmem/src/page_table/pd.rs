//! # Page Directory (PD)
//!
//! The root of 32-bit paging, referenced by CR3.
//!
//! - [`PdIndex`]: index type for virtual-address bits `[31:22]`.
//! - [`PdEntry`]: a PD entry that is either a pointer to a PT (`PS=0`) or a
//!   4 MiB superpage (`PS=1`).
//! - [`PdEntryKind`]: decoded view of a present entry.
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PD entries.
//!
//! ## Invariants & Notes
//!
//! - [`PdEntry::present_next_with`] forces `PS=0`; [`PdEntry::present_superpage_with`]
//!   forces `PS=1`.
//! - Raw constructors don't validate consistency; callers must ensure correctness.

use crate::page_table::{ENTRIES, PRESENT_BIT, PS_BIT};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress,
};

/// Index into the Page Directory (virtual-address bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

impl PdIndex {
    /// Extract bits `[31:22]` of `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> Size4M::SHIFT) as u16)
    }

    /// Checked construction from a raw slot number.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn try_new(v: usize) -> Option<Self> {
        if v < ENTRIES {
            Some(Self(v as u16))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << Size4M::SHIFT)
    }
}

/// **PDE**: pointer to a Page Table (`PS = 0`).
#[bitfield(u32)]
pub struct Pde {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Bit 6: ignored in this form.
    #[bits(1)]
    __ignored: u8,
    /// PS (bit 7): must be 0.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// Bit 8: ignored in this form.
    #[bits(1)]
    __g_ignored: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// Page Table physical base >> 12.
    #[bits(20)]
    phys_addr_31_12: u32,
}

impl Pde {
    /// Table link usable from user mode: present, writable, user.
    ///
    /// The effective permission of a page is the intersection of directory
    /// and table flags, so links are kept permissive and the leaf decides.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new().with_present(true).with_writable(true).with_user(true)
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4K>) -> Self {
        self.set_physical_page(phys);
        self
    }

    #[inline]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4K>) {
        self.set_phys_addr_31_12(phys.base().as_u32() >> Size4K::SHIFT);
    }

    /// Get the Page Table base.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.phys_addr_31_12() << Size4K::SHIFT))
    }
}

/// **PDE (4 MiB superpage)**: maps a single 4 MiB page (`PS = 1`).
///
/// Only honoured while `CR4.PSE` is set. Bits 13..21 carry PSE-36 high
/// address bits on some CPUs; they are kept at zero here.
#[bitfield(u32)]
pub struct Pde4M {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6).
    pub dirty: bool,
    /// **Page Size** (bit 7): must be 1.
    #[bits(default = true)]
    pub(crate) page_size: bool,
    /// Global (bit 8).
    pub global: bool,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// PAT (bit 12).
    pub pat_large: bool,
    #[bits(9)]
    __res13_21: u16,
    /// Superpage physical base >> 22.
    #[bits(10)]
    phys_addr_31_22: u16,
}

impl Pde4M {
    /// Supervisor-only read/write superpage.
    #[inline]
    #[must_use]
    pub const fn new_kernel_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user(false)
            .with_page_size(true)
    }

    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4M>) -> Self {
        self.set_physical_page(phys);
        self
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4M>) {
        self.set_phys_addr_31_22((phys.base().as_u32() >> Size4M::SHIFT) as u16);
        self.set_page_size(true);
    }

    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4M> {
        PhysicalPage::from_addr(PhysicalAddress::new(
            (self.phys_addr_31_22() as u32) << Size4M::SHIFT,
        ))
    }
}

/// Decoded kind of a present PDE.
#[derive(Copy, Clone, Debug)]
pub enum PdEntryKind {
    /// `PS=0`: the entry links a Page Table.
    NextPageTable(PhysicalPage<Size4K>, Pde),
    /// `PS=1`: the entry maps a 4 MiB superpage.
    Superpage(PhysicalPage<Size4M>, Pde4M),
}

/// A raw Page Directory entry; decode with [`PdEntry::kind`].
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub struct PdEntry(u32);

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn present(self) -> bool {
        self.0 & PRESENT_BIT != 0
    }

    #[inline]
    #[must_use]
    pub const fn is_superpage(self) -> bool {
        self.0 & PS_BIT != 0
    }

    /// Construct from raw `bits` (no validation).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        self.0
    }

    /// Decode the entry into its semantic kind, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdEntryKind> {
        if !self.present() {
            return None;
        }

        Some(if self.is_superpage() {
            let leaf = Pde4M::from_bits(self.0);
            PdEntryKind::Superpage(leaf.physical_page(), leaf)
        } else {
            let link = Pde::from_bits(self.0);
            PdEntryKind::NextPageTable(link.physical_page(), link)
        })
    }

    /// Create a present PDE that points to the Page Table in `page` (`PS=0`).
    #[inline]
    #[must_use]
    pub const fn present_next_with(flags: Pde, page: PhysicalPage<Size4K>) -> Self {
        Self(flags.with_present(true).with_physical_page(page).into_bits())
    }

    /// Create a present 4 MiB superpage PDE (`PS=1`).
    #[inline]
    #[must_use]
    pub const fn present_superpage_with(flags: Pde4M, page: PhysicalPage<Size4M>) -> Self {
        Self(flags.with_present(true).with_physical_page(page).into_bits())
    }
}

impl core::fmt::Debug for PdEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.kind() {
            None => write!(f, "PdEntry(empty)"),
            Some(kind) => core::fmt::Debug::fmt(&kind, f),
        }
    }
}

impl From<Pde> for PdEntry {
    #[inline]
    fn from(e: Pde) -> Self {
        Self(e.into_bits())
    }
}

impl From<Pde4M> for PdEntry {
    #[inline]
    fn from(e: Pde4M) -> Self {
        Self(e.into_bits())
    }
}

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; ENTRIES],
}

impl PageDirectory {
    /// Create a fully zeroed Page Directory (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); ENTRIES],
        }
    }

    /// Plain load; does not imply any TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> PdIndex {
        PdIndex::from(va)
    }

    /// Iterate all entries with their index, present or not.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (PdIndex, PdEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (PdIndex(i as u16), *e))
    }
}
