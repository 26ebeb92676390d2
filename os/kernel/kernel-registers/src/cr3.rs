use bitfield_struct::bitfield;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// CR3, page directory base register (32-bit paging, no PAE).
#[bitfield(u32)]
pub struct Cr3 {
    #[bits(3, default = 0)]
    _reserved0: u8,

    /// Bit 3, PWT: write-through for directory accesses.
    pub pwt: bool,

    /// Bit 4, PCD: cache disable for directory accesses.
    pub pcd: bool,

    #[bits(7, default = 0)]
    _reserved1: u8,

    /// Bits 12–31, physical page directory base >> 12.
    #[bits(20)]
    pd_base_4k: u32,
}

impl Cr3 {
    /// CR3 image pointing at the page directory in `pd`.
    #[must_use]
    pub const fn from_page_directory(pd: PhysicalPage<Size4K>) -> Self {
        Self::new().with_pd_base_4k(pd.base().as_u32() >> Size4K::SHIFT)
    }

    /// Physical address of the page directory.
    #[must_use]
    pub const fn page_directory(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_addr(PhysicalAddress::new(self.pd_base_4k() << Size4K::SHIFT))
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        Self::from_bits(crate::read_cr!("cr3"))
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::StoreRegisterUnsafe for Cr3 {
    /// Loading CR3 flushes every non-global TLB entry.
    unsafe fn store_unsafe(self) {
        crate::write_cr!("cr3", self.into_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_round_trip() {
        let pd = PhysicalPage::<Size4K>::from_addr(PhysicalAddress::new(0x0012_3000));
        let cr3 = Cr3::from_page_directory(pd).with_pcd(true);
        assert_eq!(cr3.into_bits(), 0x0012_3010);
        assert_eq!(cr3.page_directory(), pd);
    }
}
