//! # Boot Flow
//!
//! From the loader's boot data to an address space the first user program
//! can run in:
//!
//! 1. [`read_boot_data`] resolves the boot block and its tables.
//! 2. [`select_region`] picks the page pool.
//! 3. A fresh [`AddressSpace`] gets the kernel window, the boot data page and
//!    video RAM.
//! 4. The user image is copied into the pool. Both the original and the copy
//!    are identity mapped, and the entry point is moved into the copy.
//!
//! The caller then activates the address space and switches to user mode.

use crate::error::KernelError;
use core::ffi::{CStr, c_char};
use kernel_alloc::frame_alloc::BumpFrameAlloc;
use kernel_alloc::region::{RegionConstraints, select_region};
use kernel_info::boot::{BootData, BootDataError, BootDataRaw, HeaderTable, MemoryMapTable};
use kernel_info::memory::{BOOT_DATA_ADDRESS, KernelWindow, USER_HEADER_INDEX, VIDEO_RAM};
use kernel_memory_addresses::{PhysicalAddress, PhysicalRegion, Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, PhysMapper};
use log::info;

/// Where things are during boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootLayout {
    /// The loader's boot data block.
    pub boot_data: PhysicalAddress,
    /// VGA text buffer, identity mapped for the user program.
    pub video_ram: PhysicalAddress,
    /// Header index of the user program.
    pub user_header: usize,
    pub constraints: RegionConstraints,
    pub window: KernelWindow,
}

impl BootLayout {
    /// The layout the kernel binary boots with.
    #[must_use]
    pub fn kernel() -> Self {
        Self {
            boot_data: PhysicalAddress::new(BOOT_DATA_ADDRESS),
            video_ram: PhysicalAddress::new(VIDEO_RAM),
            user_header: USER_HEADER_INDEX,
            constraints: RegionConstraints::default(),
            window: KernelWindow::higher_half(),
        }
    }
}

impl Default for BootLayout {
    fn default() -> Self {
        Self::kernel()
    }
}

/// Resolve the boot block at `at` and parse its tables.
///
/// # Safety
/// `mapper` must reach the block, both tables and both strings, each table
/// must be contiguous in the mapper's view, and both strings must be
/// NUL-terminated. The returned data borrows that memory for `'a`.
///
/// # Errors
/// [`BootDataError`] if a table cannot be parsed.
pub unsafe fn read_boot_data<'a, M: PhysMapper>(
    mapper: &M,
    at: PhysicalAddress,
) -> Result<BootData<'a>, KernelError> {
    unsafe {
        let raw = mapper.phys_to_mut::<BootDataRaw>(at);

        let headers = table_words(mapper, raw.headers(), HeaderTable::words_for)?;
        let mmap = table_words(mapper, raw.mmap(), MemoryMapTable::words_for)?;

        Ok(BootData {
            headers: HeaderTable::parse(headers)?,
            mmap: MemoryMapTable::parse(mmap)?,
            cmdline: c_str(mapper, raw.cmdline()),
            imgline: c_str(mapper, raw.imgline()),
        })
    }
}

/// The words of a count-prefixed table, count included.
unsafe fn table_words<'a, M: PhysMapper>(
    mapper: &M,
    at: PhysicalAddress,
    words_for: fn(u32) -> Result<usize, BootDataError>,
) -> Result<&'a [u32], BootDataError> {
    unsafe {
        let first: &mut u32 = mapper.phys_to_mut(at);
        let len = words_for(*first)?;
        Ok(core::slice::from_raw_parts(
            core::ptr::from_mut(first).cast_const(),
            len,
        ))
    }
}

unsafe fn c_str<'a, M: PhysMapper>(mapper: &M, at: PhysicalAddress) -> &'a CStr {
    unsafe {
        let first: &mut c_char = mapper.phys_to_mut(at);
        CStr::from_ptr(core::ptr::from_mut(first).cast_const())
    }
}

/// Log what the loader handed over.
pub fn log_boot_data(boot: &BootData<'_>) {
    info!("Headers:");
    for (i, h) in boot.headers.iter().enumerate() {
        info!(" header[{i}]: [{:x}-{:x}], entry {:x}", h.start, h.end, h.entry);
    }
    info!("Memory map:");
    for (i, r) in boot.mmap.iter().enumerate() {
        info!(" mmap[{i}]: [{:x}-{:x}]", r.start, r.end);
    }
    info!("Strings:");
    info!(" cmdline: {}", boot.cmdline.to_str().unwrap_or("<invalid utf-8>"));
    info!(" imgline: {}", boot.imgline.to_str().unwrap_or("<invalid utf-8>"));
}

/// The address space and pool state for the first user program.
pub struct UserProcess<'m, M: PhysMapper> {
    pub space: AddressSpace<'m, M>,
    /// What is left of the page pool.
    pub alloc: BumpFrameAlloc<'m, M>,
    /// Pages of the user image as loaded, inclusive.
    pub image: PhysicalRegion,
    /// Physical start of the relocated copy.
    pub copy: PhysicalAddress,
    /// Entry point inside the copy.
    pub entry: VirtualAddress,
}

/// Build the address space for the user program described by `boot`.
///
/// # Errors
/// Any [`KernelError`]; nothing is activated in that case.
pub fn build_user_process<'m, M: PhysMapper>(
    mapper: &'m M,
    boot: &BootData<'_>,
    layout: &BootLayout,
) -> Result<UserProcess<'m, M>, KernelError> {
    let pool = select_region(
        boot.mmap.iter().map(|r| r.region()),
        boot.headers.iter().map(|h| h.region()),
        layout.constraints,
    )?;
    info!("Page pool {pool}, {} pages", pool.pages());

    let mut alloc = BumpFrameAlloc::new(mapper, pool);
    let mut space = AddressSpace::allocate(mapper, &mut alloc, layout.window)?;

    // The new directory only carries the window; everything below it that is
    // still needed is mapped again explicitly.
    space.map_page(&mut alloc, identity(layout.video_ram), layout.video_ram)?;
    space.map_page(&mut alloc, identity(layout.boot_data), layout.boot_data)?;

    let user = boot.headers.require(layout.user_header)?;
    let lo = user.start.page::<Size4K>().base();
    let hi = user.end.page_end::<Size4K>();
    let copy = alloc.copy_region(lo, hi)?;
    let copy_end = PhysicalAddress::new(copy.as_u32() + (hi.as_u32() - lo.as_u32()));

    space.map_identity_range(&mut alloc, lo, hi)?;
    space.map_identity_range(&mut alloc, copy, copy_end)?;

    let entry = VirtualAddress::new(
        copy.as_u32()
            .wrapping_add(user.start.as_u32() - lo.as_u32())
            .wrapping_add(user.entry_offset()),
    );
    info!("Src user code is at {:#x}", user.entry);
    info!("Dst user code is at {entry:#x}");

    space.show();
    Ok(UserProcess {
        space,
        alloc,
        image: PhysicalRegion::new(lo, hi),
        copy,
        entry,
    })
}

const fn identity(pa: PhysicalAddress) -> VirtualAddress {
    VirtualAddress::new(pa.as_u32())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_alloc::region::RegionError;
    use kernel_info::memory::KERNEL_SPACE;
    use kernel_vmem::address_space::MappingKind;
    use kernel_vmem::sim::SimulatedRam;
    use kernel_vmem::{FrameAllocError, MapError};

    fn pa(v: u32) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    /// Kernel, loader support and one user program, as the loader leaves them.
    fn headers() -> [u32; 10] {
        [
            3, 0x0010_0000, 0x0010_3fff, 0x0010_0000, 0x0010_4000, 0x0010_4fff, 0x0010_4000,
            0x0010_5000, 0x0010_6fff, 0x0010_5020,
        ]
    }

    fn boot_ram(headers: &[u32], mmap: &[u32]) -> SimulatedRam {
        let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x0020_0000);
        ram.write_words(pa(0x1000), &[0x1100, 0x1200, 0x1300, 0x1340]);
        ram.write_words(pa(0x1100), headers);
        ram.write_words(pa(0x1200), mmap);
        ram.write_bytes(pa(0x1300), b"console=debug\0");
        ram.write_bytes(pa(0x1340), b"user.elf\0");
        ram.write_bytes(pa(0x0010_5000), b"user code page 0");
        ram.write_bytes(pa(0x0010_6000), b"user code page 1");
        ram
    }

    fn layout() -> BootLayout {
        BootLayout {
            window: KernelWindow::at(va(KERNEL_SPACE), 0x40_0000),
            ..BootLayout::kernel()
        }
    }

    #[test]
    fn boot_data_is_read_through_the_mapper() {
        let ram = boot_ram(&headers(), &[2, 0, 0x9_fbff, 0x0010_0000, 0x001f_ffff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");

        assert_eq!(boot.headers.len(), 3);
        assert_eq!(boot.mmap.len(), 2);
        assert_eq!(boot.cmdline, c"console=debug");
        assert_eq!(boot.imgline, c"user.elf");
        log_boot_data(&boot);
    }

    #[test]
    fn garbage_table_count_is_rejected() {
        let ram = boot_ram(&headers(), &[0xFFFF_FFFF, 0, 0x9_fbff]);
        assert!(matches!(
            unsafe { read_boot_data(&ram, pa(0x1000)) },
            Err(KernelError::BootData(BootDataError::Truncated {
                table: "memory map",
                ..
            }))
        ));
    }

    #[test]
    fn user_process_is_relocated_and_mapped() {
        let ram = boot_ram(&headers(), &[2, 0, 0x9_fbff, 0x0010_0000, 0x001f_ffff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        let process = build_user_process(&ram, &boot, &layout()).expect("user process");

        // Pool [00107000-001fffff]: directory, first table, then the copy.
        assert_eq!(process.space.root_page().base(), pa(0x0010_7000));
        assert_eq!(process.copy, pa(0x0010_9000));
        assert_eq!(process.image, PhysicalRegion::new(pa(0x0010_5000), pa(0x0010_6fff)));
        assert_eq!(process.entry, va(0x0010_9020));
        assert_eq!(process.alloc.region().start, pa(0x0010_b000));

        assert_eq!(ram.read_bytes(pa(0x0010_9000), 16), b"user code page 0");
        assert_eq!(ram.read_bytes(pa(0x0010_a000), 16), b"user code page 1");

        let space = &process.space;
        assert_eq!(space.query(va(0x000b_8123)), Some(pa(0x000b_8123)));
        assert_eq!(space.query(va(0x0000_1004)), Some(pa(0x0000_1004)));
        assert_eq!(space.query(va(0x0010_5020)), Some(pa(0x0010_5020)));
        assert_eq!(space.query(process.entry), Some(pa(0x0010_9020)));
        assert_eq!(space.query(va(KERNEL_SPACE + 0x1000)), Some(pa(0x1000)));
        assert_eq!(space.query(va(0x0010_7000)), None, "the pool itself stays unmapped");

        let pages = space
            .mappings()
            .filter(|m| m.kind == MappingKind::Page)
            .count();
        assert_eq!(pages, 6);
    }

    #[test]
    fn missing_user_image_is_reported() {
        let hdrs = [1, 0x0010_0000, 0x0010_3fff, 0x0010_0000];
        let ram = boot_ram(&hdrs, &[1, 0x0010_0000, 0x001f_ffff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        assert!(matches!(
            build_user_process(&ram, &boot, &layout()),
            Err(KernelError::BootData(BootDataError::MissingHeader { index: 2, count: 1 }))
        ));
    }

    #[test]
    fn memory_map_without_room_is_reported() {
        let ram = boot_ram(&headers(), &[1, 0, 0x9_fbff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        assert!(matches!(
            build_user_process(&ram, &boot, &layout()),
            Err(KernelError::Region(RegionError::NoValidRegion))
        ));
    }

    #[test]
    fn small_pool_runs_out_during_the_copy() {
        // Directory and one table fit; the two-page copy does not.
        let ram = boot_ram(&headers(), &[1, 0x0010_0000, 0x0010_8fff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        assert!(matches!(
            build_user_process(&ram, &boot, &layout()),
            Err(KernelError::CopyRegion(_))
        ));
    }

    #[test]
    fn single_page_pool_cannot_hold_a_page_table() {
        let ram = boot_ram(&headers(), &[1, 0x0010_0000, 0x0010_7fff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        assert!(matches!(
            build_user_process(&ram, &boot, &layout()),
            Err(KernelError::Map(MapError::Alloc(FrameAllocError::Exhausted)))
        ));
    }

    #[test]
    fn identity_window_over_low_memory_hits_a_superpage() {
        let ram = boot_ram(&headers(), &[2, 0, 0x9_fbff, 0x0010_0000, 0x001f_ffff]);
        let boot = unsafe { read_boot_data(&ram, pa(0x1000)) }.expect("boot data");
        let identity = BootLayout {
            window: KernelWindow::identity(0x40_0000),
            ..BootLayout::kernel()
        };
        assert!(matches!(
            build_user_process(&ram, &boot, &identity),
            Err(KernelError::Map(MapError::Superpage { index: 0, .. }))
        ));
    }
}
