//! Read-only views over a page directory: a mapping iterator and a
//! human-readable dump.
//!
//! ```text
//!   Page directory at 0x00002000
//!     000: [00000000-003fffff] => page table at 0x00003000:
//!       001: [00001000-00001fff] => [00001000-00001fff] page
//!     300: [c0000000-c03fffff] => [00000000-003fffff], superpage
//! ```

use crate::page_table::ENTRIES;
use crate::page_table::pd::{PageDirectory, PdEntryKind, PdIndex};
use crate::page_table::pt::{PageTable, PtIndex};
use crate::{PhysMapper, PhysMapperExt};
use core::fmt;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MappingKind {
    /// 4 MiB directory leaf.
    Superpage,
    /// 4 KiB table leaf.
    Page,
}

impl MappingKind {
    /// Bytes covered by one mapping of this kind.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Superpage => Size4M::SIZE,
            Self::Page => Size4K::SIZE,
        }
    }
}

/// One present leaf entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mapping {
    pub directory: PdIndex,
    /// `None` for superpages.
    pub table: Option<PtIndex>,
    pub virt: VirtualAddress,
    pub phys: PhysicalAddress,
    pub kind: MappingKind,
    pub user: bool,
    pub writable: bool,
}

impl Mapping {
    /// Last virtual byte covered.
    #[must_use]
    pub const fn virt_end(&self) -> VirtualAddress {
        VirtualAddress::new(self.virt.as_u32() + (self.kind.size() - 1))
    }

    /// Last physical byte covered.
    #[must_use]
    pub const fn phys_end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys.as_u32() + (self.kind.size() - 1))
    }
}

/// Iterator over every present mapping, in directory then table order.
pub struct Mappings<'a, M: PhysMapper> {
    mapper: &'a M,
    pd: &'a PageDirectory,
    next_dir: usize,
    table: Option<(PdIndex, &'a PageTable)>,
    next_pte: usize,
}

impl<'a, M: PhysMapper> Mappings<'a, M> {
    pub(super) const fn new(mapper: &'a M, pd: &'a PageDirectory) -> Self {
        Self {
            mapper,
            pd,
            next_dir: 0,
            table: None,
            next_pte: 0,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn next_in_table(&mut self) -> Option<Mapping> {
        let (di, pt) = self.table?;
        while self.next_pte < ENTRIES {
            let ti = PtIndex::new(self.next_pte as u16);
            self.next_pte += 1;
            if let Some((page, flags)) = pt.get(ti).page_4k() {
                return Some(Mapping {
                    directory: di,
                    table: Some(ti),
                    virt: VirtualAddress::new(
                        di.base().as_u32() | ((ti.as_usize() as u32) << Size4K::SHIFT),
                    ),
                    phys: page.base(),
                    kind: MappingKind::Page,
                    user: flags.user(),
                    writable: flags.writable(),
                });
            }
        }
        self.table = None;
        None
    }
}

impl<M: PhysMapper> Iterator for Mappings<'_, M> {
    type Item = Mapping;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(m) = self.next_in_table() {
                return Some(m);
            }

            let di = PdIndex::try_new(self.next_dir)?;
            self.next_dir += 1;
            match self.pd.get(di).kind() {
                None => {}
                Some(PdEntryKind::Superpage(page, flags)) => {
                    return Some(Mapping {
                        directory: di,
                        table: None,
                        virt: di.base(),
                        phys: page.base(),
                        kind: MappingKind::Superpage,
                        user: flags.user(),
                        writable: flags.writable(),
                    });
                }
                Some(PdEntryKind::NextPageTable(table, _)) => {
                    let mapper = self.mapper;
                    self.table = Some((di, mapper.pt_mut(table)));
                    self.next_pte = 0;
                }
            }
        }
    }
}

/// [`Display`](fmt::Display) adapter returned by
/// [`AddressSpace::dump`](super::AddressSpace::dump).
pub struct Dump<'a, M: PhysMapper> {
    mapper: &'a M,
    root: PhysicalPage<Size4K>,
}

impl<'a, M: PhysMapper> Dump<'a, M> {
    pub(super) const fn new(mapper: &'a M, root: PhysicalPage<Size4K>) -> Self {
        Self { mapper, root }
    }
}

impl<M: PhysMapper> fmt::Display for Dump<'_, M> {
    #[allow(clippy::cast_possible_truncation)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Page directory at {:#010x}", self.root.base())?;
        let pd = self.mapper.pd_mut(self.root);
        for (di, entry) in pd.iter() {
            let base = di.base().as_u32();
            let last = base + (Size4M::SIZE - 1);
            match entry.kind() {
                None => {}
                Some(PdEntryKind::Superpage(page, _)) => writeln!(
                    f,
                    "    {:03x}: [{base:08x}-{last:08x}] => [{:08x}-{:08x}], superpage",
                    di.as_usize(),
                    page.base(),
                    page.end()
                )?,
                Some(PdEntryKind::NextPageTable(table, _)) => {
                    writeln!(
                        f,
                        "    {:03x}: [{base:08x}-{last:08x}] => page table at {:#010x}:",
                        di.as_usize(),
                        table.base()
                    )?;
                    for (ti, pte) in self.mapper.pt_mut(table).iter() {
                        let Some((page, _)) = pte.page_4k() else {
                            continue;
                        };
                        let va = VirtualAddress::new(base) + ((ti.as_usize() as u32) << Size4K::SHIFT);
                        let va_last = va + (Size4K::SIZE - 1);
                        writeln!(
                            f,
                            "      {:03x}: [{va:08x}-{va_last:08x}] => [{:08x}-{:08x}] page",
                            ti.as_usize(),
                            page.base(),
                            page.end()
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::address_space::{AddressSpace, MappingKind};
    use crate::sim::SimulatedRam;
    use crate::{FrameAlloc, FrameAllocError, PhysMapperExt};
    use kernel_info::memory::KernelWindow;
    use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

    struct Pages<'a>(&'a SimulatedRam, u32);

    impl FrameAlloc for Pages<'_> {
        fn alloc_4k(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
            let page = PhysicalPage::from_addr(PhysicalAddress::new(self.1));
            self.0.zero_page(page);
            self.1 += 0x1000;
            Ok(page)
        }
    }

    #[test]
    fn dump_matches_mappings() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        let mut alloc = Pages(&ram, 0x2000);
        let window = KernelWindow::at(VirtualAddress::new(0xC000_0000), 0x40_0000);
        let mut space = AddressSpace::allocate(&ram, &mut alloc, window).expect("pd");
        space
            .map_page(&mut alloc, VirtualAddress::new(0x1000), PhysicalAddress::new(0x1000))
            .expect("boot data");
        space
            .map_page(&mut alloc, VirtualAddress::new(0xB8000), PhysicalAddress::new(0xB8000))
            .expect("video");

        let text = space.dump().to_string();
        assert_eq!(
            text,
            "  Page directory at 0x00002000\n\
             \x20   000: [00000000-003fffff] => page table at 0x00003000:\n\
             \x20     001: [00001000-00001fff] => [00001000-00001fff] page\n\
             \x20     0b8: [000b8000-000b8fff] => [000b8000-000b8fff] page\n\
             \x20   300: [c0000000-c03fffff] => [00000000-003fffff], superpage\n"
        );

        let all: Vec<_> = space.mappings().collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].kind, MappingKind::Page);
        assert_eq!(all[0].virt, VirtualAddress::new(0x1000));
        assert!(all[0].user);
        assert_eq!(all[1].virt_end(), VirtualAddress::new(0xB8FFF));
        assert_eq!(all[2].kind, MappingKind::Superpage);
        assert_eq!(all[2].phys_end(), PhysicalAddress::new(0x3F_FFFF));
        assert!(!all[2].user && all[2].writable);
    }

    #[test]
    fn every_mapping_is_reported_once() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        let mut alloc = Pages(&ram, 0x1000);
        let mut space =
            AddressSpace::allocate(&ram, &mut alloc, KernelWindow::identity(0x80_0000)).expect("pd");

        let pairs = [
            (0x0080_0000, 0x0000_9000),
            (0x0080_1000, 0x0000_9000),
            (0xFFFF_F000, 0x0000_A000),
            (0x1234_5000, 0x00FF_E000),
        ];
        for (va, pa) in pairs {
            space
                .map_page(&mut alloc, VirtualAddress::new(va), PhysicalAddress::new(pa))
                .expect("map");
        }

        let pages: Vec<_> = space
            .mappings()
            .filter(|m| m.kind == MappingKind::Page)
            .map(|m| (m.virt.as_u32(), m.phys.as_u32()))
            .collect();
        let mut expected = pairs.to_vec();
        expected.sort_unstable();
        assert_eq!(pages, expected);
        assert_eq!(
            space.mappings().filter(|m| m.kind == MappingKind::Superpage).count(),
            2
        );
    }
}
