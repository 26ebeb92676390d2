//! Bump allocator over a single physical region.

use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, PhysicalRegion, Size4K};
use kernel_vmem::{FrameAlloc, FrameAllocError, PhysMapper, PhysMapperExt};
use log::{info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CopyRegionError {
    #[error("copy range [{lo}-{hi}] is empty or inverted")]
    InvalidRange {
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    },
    #[error("copy range [{lo}-{hi}] does not start and end on page boundaries")]
    Misaligned {
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    },
    #[error("copy range [{lo}-{hi}] overlaps the page pool")]
    Overlap {
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    },
    #[error("not enough memory to copy {needed} pages, {available} left")]
    Exhausted { needed: u32, available: u32 },
}

/// Hands out the pages of `[start, end]` from the bottom up.
///
/// `start` only ever grows by one page per allocation; pages are never
/// returned. Every page is zero-filled through the mapper before it is
/// handed out.
pub struct BumpFrameAlloc<'m, M: PhysMapper> {
    mapper: &'m M,
    start: PhysicalAddress,
    end: PhysicalAddress,
}

impl<'m, M: PhysMapper> BumpFrameAlloc<'m, M> {
    /// Create an allocator over `region`, usually the result of
    /// [`select_region`](crate::region::select_region).
    ///
    /// A start inside a page is rounded up to the next page boundary.
    pub const fn new(mapper: &'m M, region: PhysicalRegion) -> Self {
        let start = match region.start.page_up::<Size4K>() {
            Some(start) => start,
            None => PhysicalAddress::new(u32::MAX),
        };
        Self {
            mapper,
            start,
            end: region.end,
        }
    }

    /// What is left of the pool.
    #[must_use]
    pub const fn region(&self) -> PhysicalRegion {
        PhysicalRegion::new(self.start, self.end)
    }

    /// Number of whole pages that can still be allocated.
    #[must_use]
    pub const fn remaining_pages(&self) -> u32 {
        self.region().pages()
    }

    /// The page at `start`, if it fits below `end` completely.
    const fn next_page(&self) -> Option<PhysicalPage<Size4K>> {
        match self.start.checked_add(Size4K::MASK) {
            Some(last) if last.as_u32() <= self.end.as_u32() => {
                Some(PhysicalPage::from_addr(self.start))
            }
            _ => None,
        }
    }

    /// Copy the pages `[lo, hi]` into freshly allocated pages and return the
    /// physical start of the copy.
    ///
    /// The copy is contiguous: it occupies the next pages of the pool.
    ///
    /// # Errors
    /// - [`CopyRegionError::InvalidRange`] if `lo >= hi`.
    /// - [`CopyRegionError::Misaligned`] unless `lo` starts and `hi` ends a page.
    /// - [`CopyRegionError::Overlap`] if the source intersects the pool.
    /// - [`CopyRegionError::Exhausted`] if the pool is too small; nothing is
    ///   allocated in that case.
    pub fn copy_region(
        &mut self,
        lo: PhysicalAddress,
        hi: PhysicalAddress,
    ) -> Result<PhysicalAddress, CopyRegionError> {
        if lo >= hi {
            return Err(CopyRegionError::InvalidRange { lo, hi });
        }
        if !lo.is_aligned::<Size4K>() || !hi.is_page_end::<Size4K>() {
            return Err(CopyRegionError::Misaligned { lo, hi });
        }
        let source = PhysicalRegion::new(lo, hi);
        if source.overlaps(&self.region()) {
            return Err(CopyRegionError::Overlap { lo, hi });
        }

        let needed = source.pages();
        let available = self.remaining_pages();
        if needed > available {
            return Err(CopyRegionError::Exhausted { needed, available });
        }

        let copy = self.start;
        info!(
            "Copying [{lo:08x}-{hi:08x}] to [{copy:08x}-{:08x}]",
            copy.as_u32() + (hi.as_u32() - lo.as_u32())
        );

        let mut src = lo.page::<Size4K>();
        for _ in 0..needed {
            let dst = self
                .alloc_4k()
                .map_err(|FrameAllocError::Exhausted| CopyRegionError::Exhausted { needed, available })?;
            let from = unsafe { self.mapper.phys_to_mut::<[u8; Size4K::SIZE as usize]>(src.base()) };
            let to = unsafe { self.mapper.phys_to_mut::<[u8; Size4K::SIZE as usize]>(dst.base()) };
            to.copy_from_slice(from);
            match src.next() {
                Some(next) => src = next,
                None => break,
            }
        }

        Ok(copy)
    }
}

impl<M: PhysMapper> FrameAlloc for BumpFrameAlloc<'_, M> {
    fn alloc_4k(&mut self) -> Result<PhysicalPage<Size4K>, FrameAllocError> {
        let Some(page) = self.next_page() else {
            return Err(FrameAllocError::Exhausted);
        };

        trace!("Allocating page [{:08x}-{:08x}]", page.base(), page.end());
        self.mapper.zero_page(page);

        // The very last page of the 32-bit space leaves no representable
        // successor; park `start` where no whole page fits.
        self.start = page
            .next()
            .map_or(PhysicalAddress::new(u32::MAX), PhysicalPage::base);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::sim::SimulatedRam;

    fn pa(v: u32) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    fn pool(start: u32, end: u32) -> PhysicalRegion {
        PhysicalRegion::new(pa(start), pa(end))
    }

    #[test]
    fn exhausts_after_exactly_k_pages() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x4000, 0x7FFF));
        assert_eq!(alloc.remaining_pages(), 4);

        let mut previous = None;
        for i in 0..4 {
            let page = alloc.alloc_4k().expect("page");
            assert_eq!(page.base(), pa(0x4000 + i * 0x1000));
            if let Some(prev) = previous {
                assert!(page > prev, "allocations must be increasing");
            }
            previous = Some(page);
        }

        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
        assert_eq!(alloc.region().start, pa(0x8000));
        assert_eq!(alloc.remaining_pages(), 0);
    }

    #[test]
    fn partial_page_at_the_end_is_not_handed_out() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x4000, 0x5FFE));
        assert!(alloc.alloc_4k().is_ok());
        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
    }

    #[test]
    fn misaligned_start_never_reaches_below_the_pool() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        ram.write_u32(pa(0x4000), 0xdead_beef);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x4800, 0x6FFF));
        assert_eq!(alloc.region().start, pa(0x5000));
        assert_eq!(alloc.remaining_pages(), 2);

        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Ok(pa(0x5000)));
        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Ok(pa(0x6000)));
        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
        assert_eq!(ram.read_u32(pa(0x4000)), 0xdead_beef);
    }

    #[test]
    fn start_in_the_last_page_leaves_nothing() {
        let ram = SimulatedRam::new(pa(0xFFFF_F000), 0x1000);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0xFFFF_F800, 0xFFFF_FFFF));
        assert_eq!(alloc.remaining_pages(), 0);
        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
    }

    #[test]
    fn pages_are_zeroed() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        ram.write_words(pa(0x4000), &[0xdead_beef; 1024]);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x4000, 0x4FFF));
        let page = alloc.alloc_4k().expect("page");
        assert!(ram.read_bytes(page.base(), 4096).iter().all(|&b| b == 0));
    }

    #[test]
    fn top_of_address_space() {
        let ram = SimulatedRam::new(pa(0xFFFF_E000), 0x2000);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0xFFFF_E000, 0xFFFF_FFFF));
        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Ok(pa(0xFFFF_E000)));
        assert_eq!(alloc.alloc_4k().map(|p| p.base()), Ok(pa(0xFFFF_F000)));
        assert_eq!(alloc.alloc_4k(), Err(FrameAllocError::Exhausted));
    }

    #[test]
    fn copy_region_moves_pages_to_the_pool() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        ram.write_bytes(pa(0x1000), b"user program");
        ram.write_u32(pa(0x2ffc), 0x600d_f00d);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x8000, 0xFFFF));

        let copy = alloc.copy_region(pa(0x1000), pa(0x2FFF)).expect("copy");
        assert_eq!(copy, pa(0x8000));
        assert_eq!(alloc.region().start, pa(0xA000));
        assert_eq!(ram.read_bytes(pa(0x8000), 12), b"user program");
        assert_eq!(ram.read_u32(pa(0x9ffc)), 0x600d_f00d);
    }

    #[test]
    fn copy_region_rejects_bad_ranges() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1_0000);
        let mut alloc = BumpFrameAlloc::new(&ram, pool(0x8000, 0x9FFF));

        assert!(matches!(
            alloc.copy_region(pa(0x2000), pa(0x1FFF)),
            Err(CopyRegionError::InvalidRange { .. })
        ));
        assert!(matches!(
            alloc.copy_region(pa(0x1000), pa(0x1FFE)),
            Err(CopyRegionError::Misaligned { .. })
        ));
        assert!(matches!(
            alloc.copy_region(pa(0x9000), pa(0xAFFF)),
            Err(CopyRegionError::Overlap { .. })
        ));
        assert_eq!(
            alloc.copy_region(pa(0x1000), pa(0x3FFF)),
            Err(CopyRegionError::Exhausted {
                needed: 3,
                available: 2
            })
        );
        assert_eq!(alloc.remaining_pages(), 2, "failed copies allocate nothing");
    }
}
