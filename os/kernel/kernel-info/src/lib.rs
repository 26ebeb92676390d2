//! # Kernel Boot Information
//!
//! Shared vocabulary between the loader hand-off and the kernel proper:
//!
//! - [`boot`]: the raw boot data block at physical `0x1000` and typed views
//!   over the count-prefixed header and memory-map tables it points to.
//! - [`memory`]: compile-time layout constants and the [`KernelWindow`](memory::KernelWindow)
//!   every page directory carries.
//!
//! The crate is `no_std` outside of tests and contains no `unsafe` code.
//! Resolving the physical pointers in [`boot::BootDataRaw`] is left to the
//! kernel, which owns the physical-to-virtual translation.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
