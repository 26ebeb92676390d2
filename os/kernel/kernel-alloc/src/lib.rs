//! # Kernel Physical Memory
//!
//! Everything the kernel needs to get from a firmware memory map to pages it
//! can build page tables in:
//!
//! ```text
//! memory map + loaded images ──► region::select_region ──► PhysicalRegion
//!                                                              │
//!                                  frame_alloc::BumpFrameAlloc ◄┘
//!                                              │ alloc_4k / copy_region
//!                                              ▼
//!                               phys_mapper::KernelPhysMapper (zeroing, copying)
//! ```
//!
//! ### Memory-region selection ([`region`])
//!
//! Picks the largest stretch of whole pages between `KERNEL_LOAD` and
//! `PHYSMAP` and cuts out every loaded image that overlaps it.
//!
//! ### Bump allocation ([`frame_alloc`])
//!
//! Hands out zeroed 4 KiB pages from the front of the region, one after the
//! other. Pages are never returned.
//!
//! ### Physical mapping ([`phys_mapper`])
//!
//! Reaches physical memory through the superpage window every page directory
//! carries.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::frame_alloc::BumpFrameAlloc;
//! use kernel_memory_addresses::{PhysicalAddress, PhysicalRegion};
//! use kernel_vmem::FrameAlloc;
//! use kernel_vmem::sim::SimulatedRam;
//!
//! let ram = SimulatedRam::new(PhysicalAddress::zero(), 0x4000);
//! let pool = PhysicalRegion::new(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x3FFF));
//! let mut alloc = BumpFrameAlloc::new(&ram, pool);
//! assert_eq!(alloc.alloc_4k().unwrap().base().as_u32(), 0x2000);
//! assert_eq!(alloc.remaining_pages(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod frame_alloc;
pub mod phys_mapper;
pub mod region;
