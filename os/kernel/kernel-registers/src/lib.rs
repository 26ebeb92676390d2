//! # Typed 32-bit x86 Control Registers
//!
//! The paging switches of a protected-mode kernel: `CR0.PG` turns translation
//! on, `CR3` names the page directory and `CR4.PSE` allows 4 MiB superpages.
//!
//! Register images are plain [`bitfield`](bitfield_struct::bitfield) values;
//! moving them in and out of the CPU is gated behind the `asm` feature so the
//! layouts can be tested on any host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Control registers are privileged and require ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every following memory access
    /// is translated.
    unsafe fn store_unsafe(self);
}

/// Read a control register into a `usize` and narrow it to its 32-bit image.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
macro_rules! read_cr {
    ($reg:literal) => {{
        let value: usize;
        unsafe {
            core::arch::asm!(concat!("mov {}, ", $reg), out(reg) value, options(nomem, nostack, preserves_flags));
        }
        #[allow(clippy::cast_possible_truncation)]
        let value = value as u32;
        value
    }};
}

/// Widen a 32-bit image to `usize` and write it to a control register.
#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
macro_rules! write_cr {
    ($reg:literal, $value:expr) => {{
        let value = $value as usize;
        unsafe {
            core::arch::asm!(concat!("mov ", $reg, ", {}"), in(reg) value, options(nostack, preserves_flags));
        }
    }};
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
pub(crate) use {read_cr, write_cr};
