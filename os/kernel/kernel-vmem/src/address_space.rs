//! # Address Space (32-bit, directory-rooted)
//!
//! An [`AddressSpace`] owns one page directory and the page tables hanging
//! off it.
//!
//! - [`AddressSpace::allocate`] builds a fresh directory whose only entries are
//!   the superpages of a [`KernelWindow`].
//! - [`AddressSpace::map_page`] installs one 4 KiB mapping, allocating the page
//!   table on first use. It never overwrites: a superpage or an already present
//!   PTE in the way is an error.
//! - [`AddressSpace::query`] translates a VA to PA (handles superpages).
//! - [`AddressSpace::mappings`] / [`AddressSpace::dump`] enumerate what is
//!   mapped.
//! - [`AddressSpace::activate`] loads CR3 and turns paging on.
//!
//! There is no unmap or remap. Tables are created lazily and never freed.
//!
//! ## Safety
//!
//! The provided [`PhysMapper`] must yield **writable** references to every
//! frame handed out by the [`FrameAlloc`].

mod dump;

pub use dump::{Dump, Mapping, MappingKind, Mappings};

use crate::page_table::pd::{PageDirectory, PdEntry, PdEntryKind, PdIndex, Pde, Pde4M};
use crate::page_table::pt::{PtEntry, PtIndex, Pte};
use crate::{FrameAlloc, FrameAllocError, PhysMapper, PhysMapperExt};
use kernel_info::memory::KernelWindow;
use kernel_memory_addresses::{
    PageSize, PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress,
};
use log::{debug, info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("page directory index {index:#x} out of bounds")]
    DirectoryIndexOutOfBounds { index: usize },
    #[error("cannot allocate page table: {0}")]
    Alloc(#[from] FrameAllocError),
    #[error("{va} lies inside the superpage at directory index {index:#x}")]
    Superpage { va: VirtualAddress, index: usize },
    #[error("{va} is already mapped to {existing}")]
    DoubleMapping {
        va: VirtualAddress,
        existing: PhysicalAddress,
    },
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    window: KernelWindow,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate a new page directory and seed it with the superpages of
    /// `window`, supervisor read/write. All other entries are empty.
    ///
    /// # Errors
    /// Propagates allocation failure of the directory page.
    pub fn allocate<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &mut A,
        window: KernelWindow,
    ) -> Result<Self, FrameAllocError> {
        let root = alloc.alloc_4k()?;
        let pd = mapper.pd_mut(root);
        *pd = PageDirectory::zeroed();

        let first = PageDirectory::index_of(window.virt_base()).as_usize();
        for slot in 0..window.superpages() {
            // The window never wraps, so every slot exists.
            let Some(di) = PdIndex::try_new(first + slot as usize) else {
                break;
            };
            let phys = PhysicalPage::<Size4M>::from_addr(PhysicalAddress::new(slot << Size4M::SHIFT));
            pd.set(di, PdEntry::present_superpage_with(Pde4M::new_kernel_rw(), phys));
        }

        debug!(
            "Page directory at {root}, {} superpages from {}",
            window.superpages(),
            window.virt_base()
        );
        Ok(Self {
            root,
            window,
            mapper,
        })
    }

    /// Wrap an existing directory.
    #[inline]
    #[must_use]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>, window: KernelWindow) -> Self {
        Self {
            root,
            window,
            mapper,
        }
    }

    /// Physical page of the page directory.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> KernelWindow {
        self.window
    }

    #[inline]
    fn pd(&self) -> &PageDirectory {
        self.mapper.pd_mut(self.root)
    }

    #[inline]
    fn pd_mut(&mut self) -> &mut PageDirectory {
        self.mapper.pd_mut(self.root)
    }

    /// Take one zero-filled page from `alloc` for use as a page table.
    ///
    /// # Errors
    /// Propagates allocation failure.
    pub fn allocate_page_table<A: FrameAlloc>(
        &self,
        alloc: &mut A,
    ) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        let page = alloc.alloc_4k()?;
        self.mapper.zero_page(page);
        Ok(page)
    }

    /// Map the 4 KiB page containing `va` to the 4 KiB page containing `pa`,
    /// user accessible and writable. Offsets within the page are ignored.
    ///
    /// If the directory slot is empty a page table is allocated and linked
    /// first. Nothing else in the directory or table changes.
    ///
    /// # Errors
    /// - [`MapError::DirectoryIndexOutOfBounds`] if the slot does not exist.
    /// - [`MapError::Superpage`] if the slot holds a superpage.
    /// - [`MapError::DoubleMapping`] if the page is already mapped, even to
    ///   the same frame.
    /// - [`MapError::Alloc`] if a needed page table cannot be allocated.
    pub fn map_page<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        va: VirtualAddress,
        pa: PhysicalAddress,
    ) -> Result<(), MapError> {
        let va = va.page::<Size4K>().base();
        let frame = pa.page::<Size4K>();

        let index = (va.as_u32() >> Size4M::SHIFT) as usize;
        let Some(di) = PdIndex::try_new(index) else {
            return Err(MapError::DirectoryIndexOutOfBounds { index });
        };

        let table = match self.pd().get(di).kind() {
            Some(PdEntryKind::Superpage(..)) => {
                return Err(MapError::Superpage { va, index });
            }
            Some(PdEntryKind::NextPageTable(table, _)) => table,
            None => {
                let table = self.allocate_page_table(alloc)?;
                self.pd_mut()
                    .set(di, PdEntry::present_next_with(Pde::new_user_rw(), table));
                debug!("New page table at {table} for directory slot {index:#05x}");
                table
            }
        };

        let pt = self.mapper.pt_mut(table);
        let ti = PtIndex::from(va);
        if let Some((existing, _)) = pt.get(ti).page_4k() {
            return Err(MapError::DoubleMapping {
                va,
                existing: existing.base(),
            });
        }
        pt.set(ti, PtEntry::make_4k(frame, Pte::new_user_rw()));
        trace!("Mapped {va} => {}", frame.base());
        Ok(())
    }

    /// Identity-map every page overlapping `[lo, hi]` and return how many
    /// pages were mapped.
    ///
    /// # Errors
    /// Stops at the first [`MapError`]; pages mapped before it stay mapped.
    pub fn map_identity_range<A: FrameAlloc>(
        &mut self,
        alloc: &mut A,
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    ) -> Result<u32, MapError> {
        let mut page = lo.page::<Size4K>();
        let last = hi.page::<Size4K>();
        let mut count = 0;
        while page <= last {
            let pa = page.base();
            self.map_page(alloc, VirtualAddress::new(pa.as_u32()), pa)?;
            count += 1;
            match page.next() {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(count)
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match self.pd().get(PageDirectory::index_of(va)).kind()? {
            PdEntryKind::Superpage(base, _) => Some(base.join(va.offset::<Size4M>())),
            PdEntryKind::NextPageTable(table, _) => {
                let pt = self.mapper.pt_mut(table);
                let (base, _) = pt.get(PtIndex::from(va)).page_4k()?;
                Some(base.join(va.offset::<Size4K>()))
            }
        }
    }

    /// Iterate every present mapping in directory order.
    #[must_use]
    pub fn mappings(&self) -> Mappings<'_, M> {
        Mappings::new(self.mapper, self.pd())
    }

    /// [`Display`](core::fmt::Display) adapter describing the whole directory.
    #[must_use]
    pub fn dump(&self) -> Dump<'_, M> {
        Dump::new(self.mapper, self.root)
    }

    /// Log the [`dump`](Self::dump) at `info` level.
    pub fn show(&self) {
        info!("\n{}", self.dump());
    }

    /// Install this directory as translation root and enable paging with
    /// superpage support (`CR4.PSE`, `CR3`, `CR0.PG`).
    ///
    /// # Safety
    /// Must run at CPL0 in 32-bit protected mode. The code currently executing,
    /// its stack and everything reached through the [`PhysMapper`] must be
    /// mapped at the same virtual addresses in this space.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub unsafe fn activate(&self) {
        use kernel_registers::cr0::Cr0;
        use kernel_registers::cr3::Cr3;
        use kernel_registers::cr4::Cr4;
        use kernel_registers::{LoadRegisterUnsafe, StoreRegisterUnsafe};

        unsafe {
            Cr4::load_unsafe().with_pse(true).store_unsafe();
            Cr3::from_page_directory(self.root).store_unsafe();
            Cr0::load_unsafe().with_pg_paging(true).store_unsafe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedRam;

    /// Hands out the pages of simulated RAM from the bottom up, zeroed.
    struct BumpAlloc<'a> {
        ram: &'a SimulatedRam,
        next: u32,
        end: u32,
    }

    impl<'a> BumpAlloc<'a> {
        fn new(ram: &'a SimulatedRam, start: u32, end: u32) -> Self {
            Self {
                ram,
                next: start,
                end,
            }
        }
    }

    impl FrameAlloc for BumpAlloc<'_> {
        fn alloc_4k(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
            if self.next + Size4K::SIZE > self.end {
                return Err(FrameAllocError::Exhausted);
            }
            let page = PhysicalPage::from_addr(PhysicalAddress::new(self.next));
            self.ram.zero_page(page);
            self.next += Size4K::SIZE;
            Ok(page)
        }
    }

    const WINDOW: u32 = 0x0080_0000;

    fn ram() -> SimulatedRam {
        SimulatedRam::new(PhysicalAddress::zero(), 0x4_0000)
    }

    fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn pa(v: u32) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    #[test]
    fn fresh_directory_holds_only_the_window() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let space =
            AddressSpace::allocate(&ram, &mut alloc, KernelWindow::identity(WINDOW)).expect("pd");
        assert_eq!(space.root_page().base(), pa(0x2000));

        let pd = space.pd();
        for (i, e) in pd.iter() {
            match (i.as_usize(), e.kind()) {
                (slot @ 0..2, Some(PdEntryKind::Superpage(page, flags))) => {
                    assert_eq!(page.base().as_u32() as usize, slot << 22);
                    assert!(flags.writable());
                    assert!(!flags.user());
                }
                (0..2, other) => panic!("slot {i:?} should be a superpage, got {other:?}"),
                (_, None) => {}
                (_, Some(other)) => panic!("unexpected entry {other:?} at {i:?}"),
            }
        }
    }

    #[test]
    fn higher_half_window_lands_at_slot_0x300() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        assert_eq!(space.query(va(0xC000_1234)), Some(pa(0x1234)));
        assert_eq!(space.query(va(0xC07F_FFFF)), Some(pa(0x007F_FFFF)));
        assert_eq!(space.query(va(0x0000_1234)), None);
        assert_eq!(space.query(va(0xC080_0000)), None);
    }

    #[test]
    fn map_one_page_creates_table_and_leaf() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");

        // Offsets are ignored on both sides.
        space
            .map_page(&mut alloc, va(0x0040_1234), pa(0x0000_5678))
            .expect("map");

        let Some(PdEntryKind::NextPageTable(table, link)) = space.pd().get(PdIndex::from(va(0x0040_0000))).kind()
        else {
            panic!("expected a page table link");
        };
        assert_eq!(table.base(), pa(0x3000));
        assert!(link.user() && link.writable());

        let pte = ram.pt_mut(table).get(PtIndex::new(1));
        let (frame, flags) = pte.page_4k().expect("present");
        assert_eq!(frame.base(), pa(0x5000));
        assert!(flags.user() && flags.writable());
        assert_eq!(space.query(va(0x0040_1abc)), Some(pa(0x5abc)));
    }

    #[test]
    fn second_page_in_same_slot_reuses_table() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        space.map_page(&mut alloc, va(0x1000), pa(0x1000)).expect("first");
        let after_first = alloc.next;
        space.map_page(&mut alloc, va(0xB8000), pa(0xB8000)).expect("second");
        assert_eq!(alloc.next, after_first, "no new table expected");
        assert_eq!(space.mappings().count(), WINDOW as usize / 0x40_0000 + 2);
    }

    #[test]
    fn double_mapping_fails_every_time() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        space.map_page(&mut alloc, va(0x1000), pa(0x1000)).expect("first");

        for target in [0x1000, 0x1000, 0x9000] {
            assert_eq!(
                space.map_page(&mut alloc, va(0x1fff), pa(target)),
                Err(MapError::DoubleMapping {
                    va: va(0x1000),
                    existing: pa(0x1000)
                })
            );
        }
        assert_eq!(space.query(va(0x1000)), Some(pa(0x1000)));
    }

    #[test]
    fn mapping_inside_window_hits_superpage() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let mut space =
            AddressSpace::allocate(&ram, &mut alloc, KernelWindow::identity(WINDOW)).expect("pd");
        let before = alloc.next;
        assert_eq!(
            space.map_page(&mut alloc, va(0x0040_2000), pa(0x2000)),
            Err(MapError::Superpage {
                va: va(0x0040_2000),
                index: 1
            })
        );
        assert_eq!(alloc.next, before, "no table may be allocated");
    }

    #[test]
    fn table_allocation_failure_leaves_directory_untouched() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x3000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        assert_eq!(
            space.map_page(&mut alloc, va(0x1000), pa(0x1000)),
            Err(MapError::Alloc(FrameAllocError::Exhausted))
        );
        assert!(space.pd().get(PdIndex::from(va(0x1000))).kind().is_none());
    }

    #[test]
    fn identity_range_maps_every_page() {
        let ram = ram();
        let mut alloc = BumpAlloc::new(&ram, 0x2000, 0x4_0000);
        let window = KernelWindow::at(va(0xC000_0000), WINDOW);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        let n = space
            .map_identity_range(&mut alloc, pa(0x0010_5000), pa(0x0010_6fff))
            .expect("range");
        assert_eq!(n, 2);
        assert_eq!(space.query(va(0x0010_6ffc)), Some(pa(0x0010_6ffc)));
        assert_eq!(space.query(va(0x0010_7000)), None);
    }
}
