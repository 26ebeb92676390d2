use bitfield_struct::bitfield;

/// CR0 in 32-bit protected mode.
///
/// Only the bits a paging kernel cares about are documented in detail;
/// reserved bits are private and forced to 0.
#[bitfield(u32)]
pub struct Cr0 {
    /// Bit 0, PE: protected mode enable. Must already be set before paging.
    pub pe_protection_enable: bool,

    /// Bit 1, MP: monitor coprocessor.
    pub mp_monitor_coprocessor: bool,

    /// Bit 2, EM: x87 emulation.
    pub em_emulation: bool,

    /// Bit 3, TS: task switched.
    pub ts_task_switched: bool,

    /// Bit 4, ET: extension type, hardwired to 1 on anything modern.
    pub et_extension_type: bool,

    /// Bit 5, NE: native x87 error reporting.
    pub ne_numeric_error: bool,

    #[bits(10, default = 0)]
    _reserved_6_15: u16,

    /// Bit 16, WP: supervisor writes honour read-only pages.
    pub wp_write_protect: bool,

    #[bits(default = 0)]
    _reserved_17: bool,

    /// Bit 18, AM: alignment mask.
    pub am_alignment_mask: bool,

    #[bits(10, default = 0)]
    _reserved_19_28: u16,

    /// Bit 29, NW: not write-through.
    pub nw_not_write_through: bool,

    /// Bit 30, CD: cache disable.
    pub cd_cache_disable: bool,

    /// Bit 31, PG: paging.
    ///
    /// Translation through the directory in CR3 starts with the next
    /// instruction fetch once this bit is set.
    pub pg_paging: bool,
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        Self::from_bits(crate::read_cr!("cr0"))
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl crate::StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        crate::write_cr!("cr0", self.into_bits());
    }
}
