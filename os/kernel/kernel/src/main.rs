//! # Kernel Entry Point

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(target_os = "none")]
mod entry {
    use core::convert::Infallible;
    use kernel::boot::{BootLayout, build_user_process, log_boot_data, read_boot_data};
    use kernel::{KernelError, fatal, halt};
    use kernel_alloc::phys_mapper::KernelPhysMapper;
    use kernel_qemu::QemuLogger;
    use kernel_registers::LoadRegisterUnsafe;
    use kernel_registers::cr3::Cr3;
    use kernel_vmem::AddressSpace;
    use log::{LevelFilter, error, info};

    static LOGGER: QemuLogger = QemuLogger::new(LevelFilter::Debug);

    /// Saved user-mode registers, laid out the way the trap trampoline
    /// pushes them: segments, general purpose registers, iret frame.
    #[repr(C)]
    struct Context {
        segments: [u32; 4],
        registers: [u32; 8],
        iret: [u32; 6],
    }

    static mut USER_CONTEXT: Context = Context {
        segments: [0; 4],
        registers: [0; 8],
        iret: [0; 6],
    };

    unsafe extern "C" {
        /// Prepare `ctxt` to enter user mode at `eip` with stack `esp`.
        fn init_context(ctxt: *mut Context, eip: u32, esp: u32);
        /// Restore `ctxt` and `iret` into user mode.
        fn switch_to_user(ctxt: *mut Context) -> !;
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        error!("{info}");
        halt()
    }

    /// Called by the loader with paging on and the kernel window mapped.
    #[unsafe(no_mangle)]
    extern "C" fn kernel() -> ! {
        let _ = LOGGER.install();
        info!("Paging kernel has booted!");

        match run(&KernelPhysMapper::higher_half()) {
            Ok(never) => match never {},
            Err(err) => fatal(&err),
        }
    }

    fn run(mapper: &KernelPhysMapper) -> Result<Infallible, KernelError> {
        let layout = BootLayout::kernel();

        // SAFETY: The loader maps low memory through the kernel window.
        let boot = unsafe { read_boot_data(mapper, layout.boot_data)? };
        log_boot_data(&boot);

        // SAFETY: Ring 0; CR3 holds the loader's directory.
        let initial = unsafe { Cr3::load_unsafe() }.page_directory();
        info!("initial page directory is at {:#010x}", initial.base());
        AddressSpace::from_root(mapper, initial, layout.window).show();

        let process = build_user_process(mapper, &boot, &layout)?;

        // SAFETY: The new directory carries the same kernel window as the
        // loader's, so kernel code, stack and data stay where they are.
        unsafe {
            process.space.activate();
            let ctxt = &raw mut USER_CONTEXT;
            init_context(ctxt, process.entry.as_u32(), 0);
            switch_to_user(ctxt)
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
