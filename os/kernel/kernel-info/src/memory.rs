//! # Memory Layout

use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, Size4M, VirtualAddress};

/// Physical address of the boot data block handed over by the loader.
pub const BOOT_DATA_ADDRESS: u32 = 0x0000_1000;

/// Physical base of the VGA text-mode buffer.
pub const VIDEO_RAM: u32 = 0x000B_8000;

/// Lowest physical address the page pool may start at. Everything below
/// belongs to firmware, the boot data block and the loaded images.
pub const KERNEL_LOAD: u32 = 0x0010_0000; // 1 MiB

/// Size of the low physical window that every page directory maps with
/// superpages. The page pool must end below it so that freshly allocated
/// pages are reachable through the window.
pub const PHYSMAP: u32 = 0x0400_0000; // 64 MiB

/// Virtual base at which the kernel sees the physical window.
pub const KERNEL_SPACE: u32 = 0xC000_0000;

/// Index of the user program within the loaded-image headers
/// (0: kernel, 1: loader support, 2: first user program).
pub const USER_HEADER_INDEX: usize = 2;

/// The permanent superpage window of every page directory.
///
/// Physical `[0, len)` is reachable at virtual `[virt_base, virt_base + len)`.
/// With `virt_base == 0` this is a plain identity map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelWindow {
    virt_base: VirtualAddress,
    len: u32,
}

impl KernelWindow {
    /// Identity-map physical `[0, len)`.
    #[must_use]
    pub const fn identity(len: u32) -> Self {
        Self::at(VirtualAddress::zero(), len)
    }

    /// The window the kernel runs with: [`PHYSMAP`] bytes at [`KERNEL_SPACE`].
    #[must_use]
    pub const fn higher_half() -> Self {
        Self::at(VirtualAddress::new(KERNEL_SPACE), PHYSMAP)
    }

    /// Place physical `[0, len)` at `virt_base`.
    ///
    /// # Panics
    /// If `virt_base` or `len` is not superpage aligned, or the window would
    /// wrap past 4 GiB. Evaluated at compile time for `const` windows.
    #[must_use]
    pub const fn at(virt_base: VirtualAddress, len: u32) -> Self {
        assert!(virt_base.is_aligned::<Size4M>(), "window base must be 4 MiB aligned");
        assert!(len % Size4M::SIZE == 0, "window length must be a multiple of 4 MiB");
        assert!(
            len == 0 || virt_base.as_u32().checked_add(len - 1).is_some(),
            "window must not wrap"
        );
        Self { virt_base, len }
    }

    #[must_use]
    pub const fn virt_base(&self) -> VirtualAddress {
        self.virt_base
    }

    /// Window size in bytes.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of 4 MiB superpages needed to cover the window.
    #[must_use]
    pub const fn superpages(&self) -> u32 {
        self.len >> Size4M::SHIFT
    }

    /// Translate a physical address inside the window to its virtual alias.
    #[must_use]
    pub const fn to_virtual(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        if pa.as_u32() >= self.len {
            return None;
        }
        Some(VirtualAddress::new(self.virt_base.as_u32() + pa.as_u32()))
    }

    /// Translate a virtual address inside the window back to physical.
    #[must_use]
    pub const fn to_physical(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        match va.as_u32().checked_sub(self.virt_base.as_u32()) {
            Some(off) if off < self.len => Some(PhysicalAddress::new(off)),
            _ => None,
        }
    }
}

const _: () = {
    assert!(BOOT_DATA_ADDRESS.is_multiple_of(Size4K::SIZE));
    assert!(VIDEO_RAM.is_multiple_of(Size4K::SIZE));
    assert!(KERNEL_LOAD.is_multiple_of(Size4K::SIZE));
    assert!(PHYSMAP.is_multiple_of(Size4M::SIZE));
    assert!(KERNEL_SPACE.is_multiple_of(Size4M::SIZE));
    assert!(KERNEL_LOAD < PHYSMAP);
    assert!(KERNEL_SPACE >= PHYSMAP);
};
