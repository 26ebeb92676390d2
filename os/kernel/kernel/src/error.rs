//! Everything that can stop the boot, and the place it stops.

use kernel_alloc::frame_alloc::CopyRegionError;
use kernel_alloc::region::RegionError;
use kernel_info::boot::BootDataError;
use kernel_vmem::{FrameAllocError, MapError};
use log::error;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    BootData(#[from] BootDataError),
    #[error(transparent)]
    Region(#[from] RegionError),
    #[error(transparent)]
    Alloc(#[from] FrameAllocError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("in copy_region: {0}")]
    CopyRegion(#[from] CopyRegionError),
}

/// Report `err` and stop the processor for good.
pub fn fatal(err: &KernelError) -> ! {
    error!("FATAL ERROR: {err}");
    halt()
}

/// Disable interrupts and halt, forever.
#[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
pub fn halt() -> ! {
    loop {
        // SAFETY: Ring 0 only; the kernel never leaves it.
        unsafe {
            core::arch::asm!("cli", "hlt", options(nomem, nostack));
        }
    }
}

/// Spin forever.
#[cfg(not(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64"))))]
pub fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
