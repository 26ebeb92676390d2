//! # Window-based PhysMapper
//!
//! Every page directory maps physical `[0, PHYSMAP)` with superpages at a
//! fixed virtual base (see [`KernelWindow`]). Once paging is on, the kernel
//! reaches any physical address below `PHYSMAP` by adding that base. Before
//! paging is on, the identity window does the same with a base of zero.
//!
//! The page pool is chosen to end below `PHYSMAP`, so every page the
//! allocator hands out is reachable this way.

use kernel_info::memory::KernelWindow;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] that goes through the kernel's superpage window.
///
/// # Safety
/// - The window must be mapped in the active address space (or paging must be
///   off and the window must be the identity window).
/// - Callers must only pass physical addresses inside the window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelPhysMapper {
    window: KernelWindow,
}

impl KernelPhysMapper {
    #[must_use]
    pub const fn new(window: KernelWindow) -> Self {
        Self { window }
    }

    /// The mapper the kernel uses once paging is enabled.
    #[must_use]
    pub const fn higher_half() -> Self {
        Self::new(KernelWindow::higher_half())
    }

    #[must_use]
    pub const fn window(&self) -> KernelWindow {
        self.window
    }

    /// Where `pa` is visible, or `None` if it lies outside the window.
    #[must_use]
    pub const fn to_virtual(&self, pa: PhysicalAddress) -> Option<VirtualAddress> {
        self.window.to_virtual(pa)
    }

    #[must_use]
    pub const fn to_physical(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.window.to_physical(va)
    }
}

impl Default for KernelPhysMapper {
    fn default() -> Self {
        Self::higher_half()
    }
}

#[allow(clippy::missing_panics_doc)]
impl PhysMapper for KernelPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let Some(va) = self.to_virtual(pa) else {
            panic!("physical address {pa} is outside the kernel window");
        };
        let ptr = va.as_u32() as usize as *mut T;
        // SAFETY: Caller must ensure the window is mapped and `pa` holds a `T`.
        unsafe { &mut *ptr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::{KERNEL_SPACE, PHYSMAP};

    #[test]
    fn translation_goes_through_the_window() {
        let m = KernelPhysMapper::default();
        assert_eq!(m.window(), KernelWindow::higher_half());
        assert_eq!(
            m.to_virtual(PhysicalAddress::new(0x0010_5000)),
            Some(VirtualAddress::new(KERNEL_SPACE + 0x0010_5000))
        );
        assert_eq!(m.to_virtual(PhysicalAddress::new(PHYSMAP)), None);
        assert_eq!(
            m.to_physical(VirtualAddress::new(0xC000_B800)),
            Some(PhysicalAddress::new(0xB800))
        );
    }

    #[test]
    #[should_panic(expected = "outside the kernel window")]
    fn addresses_past_the_window_are_rejected() {
        let m = KernelPhysMapper::new(KernelWindow::identity(0x40_0000));
        let _: &mut u32 = unsafe { m.phys_to_mut(PhysicalAddress::new(0x40_0000)) };
    }
}
