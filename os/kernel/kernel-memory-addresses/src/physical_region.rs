use crate::{PageSize, PhysicalAddress, Size4K};
use core::fmt;

/// An inclusive range `[start, end]` of physical bytes.
///
/// Inclusive bounds let a region end at the very top of the 32-bit space
/// without overflow, which is also how the boot loader reports memory.
///
/// A region is *usable as a page pool* when `start` is a page start, `end` is
/// the last byte of a page and `start <= end`; see [`PhysicalRegion::is_page_pool`].
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// let r = PhysicalRegion::new(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x5FFF));
/// assert!(r.is_page_pool());
/// assert_eq!(r.pages(), 4);
/// assert_eq!(r.len(), 0x4000);
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct PhysicalRegion {
    pub start: PhysicalAddress,
    pub end: PhysicalAddress,
}

impl PhysicalRegion {
    #[inline]
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }
    }

    /// `true` if `end < start`.
    #[inline]
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.end.as_u32() < self.start.as_u32()
    }

    /// Number of bytes covered, saturating at `u32::MAX` for the full space.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        if self.is_inverted() {
            return 0;
        }
        (self.end.as_u32() - self.start.as_u32()).saturating_add(1)
    }

    /// Span `end - start`, used to rank candidate regions.
    #[inline]
    #[must_use]
    pub const fn span(&self) -> u32 {
        self.end.as_u32().saturating_sub(self.start.as_u32())
    }

    /// `true` if `start` is a page start, `end` a page end and `start <= end`.
    #[inline]
    #[must_use]
    pub const fn is_page_pool(&self) -> bool {
        self.start.is_aligned::<Size4K>()
            && self.end.is_page_end::<Size4K>()
            && !self.is_inverted()
    }

    /// Number of whole 4 KiB pages in the region.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u32 {
        if self.is_inverted() {
            return 0;
        }
        let span = self.end.as_u32() - self.start.as_u32();
        let whole = span >> Size4K::SHIFT;
        if span & Size4K::MASK == Size4K::MASK {
            whole + 1
        } else {
            whole
        }
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        self.start.as_u32() <= pa.as_u32() && pa.as_u32() <= self.end.as_u32()
    }

    /// `true` if the two inclusive ranges share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        !self.is_inverted()
            && !other.is_inverted()
            && self.start.as_u32() <= other.end.as_u32()
            && other.start.as_u32() <= self.end.as_u32()
    }
}

impl fmt::Debug for PhysicalRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalRegion[{:08x}-{:08x}]", self.start, self.end)
    }
}

impl fmt::Display for PhysicalRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:08x}-{:08x}]", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(start: u32, end: u32) -> PhysicalRegion {
        PhysicalRegion::new(PhysicalAddress::new(start), PhysicalAddress::new(end))
    }

    #[test]
    fn page_counting() {
        assert_eq!(region(0x2000, 0x2FFF).pages(), 1);
        assert_eq!(region(0x2000, 0x5FFF).pages(), 4);
        assert_eq!(region(0x3000, 0x2FFF).pages(), 0);
        assert_eq!(region(0, u32::MAX).pages(), 1 << 20);
    }

    #[test]
    fn pool_shape() {
        assert!(region(0x2000, 0x2FFF).is_page_pool());
        assert!(!region(0x2001, 0x2FFF).is_page_pool());
        assert!(!region(0x2000, 0x2FFE).is_page_pool());
        assert!(!region(0x4000, 0x2FFF).is_page_pool());
    }

    #[test]
    fn overlap_is_inclusive() {
        let r = region(0x2000, 0x5FFF);
        assert!(r.overlaps(&region(0x5FFF, 0x7000)));
        assert!(r.overlaps(&region(0x1000, 0x2000)));
        assert!(!r.overlaps(&region(0x6000, 0x7000)));
        assert!(!r.overlaps(&region(0x0000, 0x1FFF)));
    }

    #[test]
    fn len_saturates_for_the_whole_space() {
        assert_eq!(region(0, u32::MAX).len(), u32::MAX);
        assert_eq!(region(0x2000, 0x2FFF).len(), 0x1000);
    }
}
