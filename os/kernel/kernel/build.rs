use kernel_info::memory;
use std::{env, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=kernel.ld");

    // Host builds (tests, docs) link normally.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let ld = manifest_dir.join("kernel.ld");

    let kernel_space = memory::KERNEL_SPACE;
    let kernel_load = memory::KERNEL_LOAD;
    assert_eq!(
        kernel_space & ((1u32 << 22) - 1),
        0,
        "KERNEL_SPACE must be 4 MiB aligned (got {kernel_space:#x})"
    );
    assert_eq!(
        kernel_load & 0xfff,
        0,
        "KERNEL_LOAD must be 4 KiB aligned (got {kernel_load:#x})"
    );

    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_SPACE={kernel_space:#x}");
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_LOAD={kernel_load:#x}");
}
