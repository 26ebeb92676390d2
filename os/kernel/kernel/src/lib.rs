//! # Paging Kernel
//!
//! The boot driver of a small 32-bit protected-mode kernel: it reads what the
//! loader left behind, carves a page pool out of physical memory, builds the
//! first user address space and reports every failure through one place,
//! [`fatal`].
//!
//! ```text
//! boot data ─► read_boot_data ─► build_user_process ─► activate ─► user mode
//!                                        │
//!                                 Err(KernelError) ─► fatal ─► halt
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod boot;
pub mod error;

pub use error::{KernelError, fatal, halt};
