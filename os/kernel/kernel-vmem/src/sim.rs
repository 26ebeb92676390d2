//! Simulated physical memory.
//!
//! [`SimulatedRam`] backs a physical range `[base, base + len)` with heap
//! frames so that page-table code can run unchanged on the host. Physical
//! addresses outside the range panic on access.

use crate::PhysMapper;
use alloc::vec::Vec;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalRegion, Size4K};

#[repr(C, align(4096))]
struct Frame(UnsafeCell<[u8; Size4K::SIZE as usize]>);

pub struct SimulatedRam {
    base: PhysicalAddress,
    frames: Vec<Frame>,
}

/// Every accessor panics when the accessed bytes leave the simulated range.
#[allow(clippy::missing_panics_doc)]
impl SimulatedRam {
    /// Back `len` bytes of physical memory starting at `base`.
    ///
    /// # Panics
    /// If `base` or `len` is not page aligned, or `len` is zero.
    #[must_use]
    pub fn new(base: PhysicalAddress, len: u32) -> Self {
        assert!(base.is_aligned::<Size4K>(), "base must be page aligned");
        assert_ne!(len, 0, "simulated RAM must not be empty");
        assert_eq!(len % Size4K::SIZE, 0, "length must be whole pages");
        let frames = (0..len / Size4K::SIZE)
            .map(|_| Frame(UnsafeCell::new([0; Size4K::SIZE as usize])))
            .collect();
        Self { base, frames }
    }

    /// The simulated range, inclusive.
    #[must_use]
    pub fn region(&self) -> PhysicalRegion {
        let len = u32::try_from(self.frames.len()).unwrap_or(u32::MAX) * Size4K::SIZE;
        PhysicalRegion::new(self.base, self.base + (len - 1))
    }

    fn ptr(&self, pa: PhysicalAddress, len: usize) -> *mut u8 {
        let region = self.region();
        let Some(off) = pa.as_u32().checked_sub(self.base.as_u32()) else {
            panic!("{pa} below simulated RAM {region}");
        };
        let off = off as usize;
        assert!(
            off + len <= region.len() as usize,
            "{pa} (+{len}) outside simulated RAM {region}"
        );
        self.frames.as_ptr().cast::<u8>().cast_mut().wrapping_add(off)
    }

    #[must_use]
    pub fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        unsafe { self.ptr(pa, 4).cast::<u32>().read_unaligned() }
    }

    pub fn write_u32(&self, pa: PhysicalAddress, value: u32) {
        unsafe { self.ptr(pa, 4).cast::<u32>().write_unaligned(value) }
    }

    pub fn write_words(&self, pa: PhysicalAddress, words: &[u32]) {
        for (pa, word) in (0..).map(|i| pa + 4 * i).zip(words) {
            self.write_u32(pa, *word);
        }
    }

    pub fn write_bytes(&self, pa: PhysicalAddress, bytes: &[u8]) {
        let dst = self.ptr(pa, bytes.len());
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) }
    }

    #[must_use]
    pub fn read_bytes(&self, pa: PhysicalAddress, len: usize) -> Vec<u8> {
        let src = self.ptr(pa, len);
        unsafe { core::slice::from_raw_parts(src, len) }.to_vec()
    }
}

impl PhysMapper for SimulatedRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.ptr(pa, size_of::<T>()).cast::<T>();
        debug_assert!(ptr.is_aligned(), "{pa} is misaligned for the requested type");
        unsafe { &mut *ptr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PhysMapperExt;
    use kernel_memory_addresses::PhysicalPage;

    #[test]
    fn words_and_bytes() {
        let ram = SimulatedRam::new(PhysicalAddress::new(0x10_0000), 0x2000);
        assert_eq!(ram.region().end, PhysicalAddress::new(0x10_1FFF));

        ram.write_words(PhysicalAddress::new(0x10_0ffc), &[0xdead_beef, 0x1234_5678]);
        assert_eq!(ram.read_u32(PhysicalAddress::new(0x10_1000)), 0x1234_5678);

        ram.write_bytes(PhysicalAddress::new(0x10_1000), b"ok");
        assert_eq!(ram.read_bytes(PhysicalAddress::new(0x10_1000), 3), b"ok\x34");

        let page = PhysicalPage::from_addr(PhysicalAddress::new(0x10_1000));
        ram.zero_page(page);
        assert_eq!(ram.read_u32(PhysicalAddress::new(0x10_1000)), 0);
        assert_eq!(ram.read_u32(PhysicalAddress::new(0x10_0ffc)), 0xdead_beef);
    }

    #[test]
    #[should_panic(expected = "outside simulated RAM")]
    fn out_of_range_access_panics() {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x1000);
        let _ = ram.read_u32(PhysicalAddress::new(0x1000));
    }
}
