use bitfield_struct::bitfield;

/// CR4, Control Register 4, 32-bit layout.
///
/// For this kernel only [`Cr4::pse`] matters: without it the PS bit in a
/// directory entry is ignored and superpages do not exist.
#[bitfield(u32, order = Lsb)]
pub struct Cr4 {
    /// Bit 0, VME: Virtual-8086 Mode Extensions.
    pub vme: bool,

    /// Bit 1, PVI: Protected-Mode Virtual Interrupts.
    pub pvi: bool,

    /// Bit 2, TSD: Time Stamp Disable.
    pub tsd: bool,

    /// Bit 3, DE: Debugging Extensions.
    pub de: bool,

    /// Bit 4, PSE: Page Size Extensions (4 MiB pages).
    pub pse: bool,

    /// Bit 5, PAE: Physical Address Extension. Must stay clear here.
    pub pae: bool,

    /// Bit 6, MCE: Machine-Check Enable.
    pub mce: bool,

    /// Bit 7, PGE: Page Global Enable.
    pub pge: bool,

    /// Bit 8, PCE: Performance-Monitoring Counter Enable.
    pub pce: bool,

    /// Bit 9, OSFXSR.
    pub osfxsr: bool,

    /// Bit 10, OSXMMEXCPT.
    pub osxmmexcpt: bool,

    #[bits(21, default = 0)]
    _reserved: u32,
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        Self::from_bits(crate::read_cr!("cr4"))
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::StoreRegisterUnsafe for Cr4 {
    unsafe fn store_unsafe(self) {
        crate::write_cr!("cr4", self.into_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pse_bit() {
        assert_eq!(Cr4::new().with_pse(true).into_bits(), 1 << 4);
        assert!(!Cr4::from_bits(1 << 4).pae());
    }
}
